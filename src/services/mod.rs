pub mod display_sink;
pub mod indicator;
pub mod layout_source;
pub mod layout_table;
pub mod subscriber;

pub use display_sink::create_display_sink;
pub use indicator::KeyboardLayoutIndicator;
pub use layout_source::create_layout_source;

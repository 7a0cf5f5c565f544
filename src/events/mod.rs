pub mod lifecycle;
pub mod poll;

pub use lifecycle::{IndicatorState, LifecycleHook};
pub use poll::{NoUpdateReason, PollOutcome};

//! LayoutSource: где брать список раскладок и текущий индекс.
//!
//! Модуль только опрашивает внешние утилиты (или эмулирует их) и ничего не знает
//! о метках, отображении и планировании опросов - это делает KeyboardLayoutIndicator.

mod dry_run;
mod xkblayout_state;
mod r#trait;

pub use self::r#trait::{create_layout_source, LayoutSourceTrait};

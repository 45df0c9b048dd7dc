//! Utility functions for display formatting and timestamp parsing.

pub mod format;
pub mod time;

pub use format::{format_date, format_optional, format_score, truncate_string};

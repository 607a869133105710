// Re-export all types so callers can use `domain::types::*`
// while the code stays organized by concern internally.

pub use core::*;
pub use trust::*;
pub use config::*;
pub use binding::*;

// Module declarations
mod core;
mod trust;
mod config;
mod binding;

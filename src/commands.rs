//! Control surface consumed by a UI or HTTP shell
//!
//! Every command takes the shared [`AppState`](crate::application::AppState)
//! and returns a serializable DTO or a display string error.

pub mod scrape_commands;
pub mod session_commands;

// Re-export all commands for easy access
pub use scrape_commands::*;
pub use session_commands::*;

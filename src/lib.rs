// ABOUTME: Root library module for the parley binary
// ABOUTME: Console adapter, app wiring, logging setup and the offline reminder commands

pub mod app;
pub mod console;
pub mod logging;
pub mod reminders_cli;

// Re-export the core modules the binary uses
pub use parley_core::config;
pub use parley_core::metrics;
pub use parley_core::paths;

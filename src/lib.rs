pub mod catalog;
pub mod config;
pub mod driver;
pub mod metrics;
pub mod target;
pub mod waiter;

// Re-export for main.rs and integration tests
pub use crate::config::{Args, Config};
pub use crate::driver::{execute, Outcome, Phase};

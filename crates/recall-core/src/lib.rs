//! Configuration loading and store construction for recall.

pub mod bootstrap;
pub mod config;

pub use bootstrap::AppBuilder;
pub use config::Config;

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod econet;
pub mod error;
pub mod metrics;
pub mod mqtt;
pub mod poller;

pub use bridge::Bridge;
pub use config::Settings;
pub use error::{AppError, ConfigError, FetchError, Result};

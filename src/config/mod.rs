pub mod settings;

pub use settings::{ConfigError, GitSettings, LoggingSettings, Settings};

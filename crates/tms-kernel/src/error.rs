//! Kernel error types

use std::path::PathBuf;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment variable or field holds an unusable value
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Log buffer errors
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Export target could not be written
    #[error("log export failed: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be serialized
    #[error("log serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Periodic task errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The task panicked while running its body
    #[error("task {name} panicked")]
    Panicked { name: String },

    /// The task was aborted before it could finish
    #[error("task {name} was aborted")]
    Aborted { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "NOTIFICATIONS_ENABLED".to_string(),
            value: "maybe".to_string(),
        };
        assert!(err.to_string().contains("NOTIFICATIONS_ENABLED"));
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn scheduler_error_display() {
        let err = SchedulerError::Panicked {
            name: "poll".to_string(),
        };
        assert_eq!(err.to_string(), "task poll panicked");
    }
}

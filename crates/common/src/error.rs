use std::path::PathBuf;

use thiserror::Error;

/// Common error types used across the application.
///
/// Every variant is fatal when it surfaces during startup. Once the monitor is
/// running, database errors are logged by the queue gateway instead of being
/// propagated.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        AppError::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = AppError::config("database.host is required");
        assert_eq!(
            err.to_string(),
            "Configuration error: database.host is required"
        );
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = AppError::Io {
            path: PathBuf::from("config/config.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("config/config.toml"));
    }
}

//! Error types and exit codes for CLI operations.

use contracts::SimError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("configuration is invalid")]
    InvalidConfig,

    #[error("driver task failed: {message}")]
    Driver { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }
}

/// 2 for configuration problems, 3 for data and seek errors, 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return match cli {
                CliError::ConfigNotFound { .. } | CliError::InvalidConfig => 2,
                CliError::Driver { .. } => 1,
            };
        }
        if let Some(sim) = cause.downcast_ref::<SimError>() {
            return match sim {
                SimError::ConfigParse { .. }
                | SimError::ConfigValidation { .. }
                | SimError::CyclicDependency { .. } => 2,
                SimError::OutOfRange { .. }
                | SimError::NoCheckpointAvailable { .. }
                | SimError::Store { .. } => 3,
                _ => 1,
            };
        }
    }
    1
}

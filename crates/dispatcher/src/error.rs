//! Dispatcher error types

use contracts::SimError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}

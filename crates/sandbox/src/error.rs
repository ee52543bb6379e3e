//! Sandbox error types

use contracts::SimError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("unknown module '{module}' for component '{component}'")]
    UnknownModule { component: String, module: String },

    #[error("unknown component '{component}'")]
    UnknownComponent { component: String },

    #[error("invalid param '{name}' for component '{component}': {message}")]
    InvalidParam {
        component: String,
        name: String,
        message: String,
    },

    #[error("corrupt state for component '{component}': {message}")]
    CorruptState { component: String, message: String },

    #[error(transparent)]
    Sim(#[from] SimError),
}

impl SandboxError {
    pub fn invalid_param(
        component: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParam {
            component: component.into(),
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<SandboxError> for SimError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Sim(inner) => inner,
            SandboxError::UnknownModule { ref component, .. }
            | SandboxError::InvalidParam { ref component, .. } => {
                SimError::config_validation(format!("components[{component}]"), err.to_string())
            }
            SandboxError::UnknownComponent { ref component }
            | SandboxError::CorruptState { ref component, .. } => {
                SimError::component_execution(component.clone(), err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;

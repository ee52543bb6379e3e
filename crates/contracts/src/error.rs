//! Layered error definitions
//!
//! Categorized by source: control / load / tick / checkpoint / store / sink

use thiserror::Error;

use crate::Timestamp;

/// Unified error type
#[derive(Debug, Error)]
pub enum SimError {
    // ===== Control Errors =====
    /// Time outside the loaded data range
    #[error("time {requested}us is outside [{start}us, {end}us]")]
    OutOfRange {
        requested: Timestamp,
        start: Timestamp,
        end: Timestamp,
    },

    /// Bad argument to a control call or config value
    #[error("invalid argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },

    /// Operation not legal in the current engine state
    #[error("cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    // ===== Load Errors =====
    /// Dependency graph contains a cycle
    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Tick Errors =====
    /// No reading near the requested time, even after interpolation
    #[error("no data for channel '{channel}' near {at}us")]
    DataUnavailable { channel: String, at: Timestamp },

    /// Sandbox invocation failed
    #[error("component '{component}' failed: {message}")]
    ComponentExecution { component: String, message: String },

    /// Sandbox invocation exceeded its budget
    #[error("component '{component}' timed out after {timeout_ms}ms")]
    ComponentTimeout { component: String, timeout_ms: u64 },

    // ===== Checkpoint Errors =====
    /// No checkpoint at or before the requested time
    #[error("no checkpoint at or before {at}us")]
    NoCheckpointAvailable { at: Timestamp },

    /// Checkpoint encode/decode/storage failure
    #[error("checkpoint persistence error: {message}")]
    Persistence { message: String },

    // ===== Store / Sink Errors =====
    /// Sensor store failure
    #[error("sensor store error: {message}")]
    Store { message: String },

    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    pub fn out_of_range(requested: Timestamp, start: Timestamp, end: Timestamp) -> Self {
        Self::OutOfRange {
            requested,
            start,
            end,
        }
    }

    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(operation: impl Into<String>, state: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.into(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn data_unavailable(channel: impl Into<String>, at: Timestamp) -> Self {
        Self::DataUnavailable {
            channel: channel.into(),
            at,
        }
    }

    pub fn component_execution(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ComponentExecution {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn component_timeout(component: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ComponentTimeout {
            component: component.into(),
            timeout_ms,
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Per-tick errors that are recorded in the frame instead of aborting the tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. }
                | Self::ComponentExecution { .. }
                | Self::ComponentTimeout { .. }
        )
    }
}

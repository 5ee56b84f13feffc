use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the engine.
#[derive(Error, Debug)]
pub enum SimError {
    /// Unreadable or malformed layout, or no usable compute backend. Fatal at startup.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Structural model error: unknown component kind, bad name reference, missing parameter.
    #[error("Invalid model: {0}")]
    Configuration(String),

    #[error("I/O failure on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cell or region callback failed; the run stops at the tick it happened in.
    #[error("Runtime fault in '{component}' (cell {cell:?}): {message}")]
    RuntimeFault {
        cell: Option<u64>,
        component: String,
        message: String,
    },
}

impl SimError {
    pub fn fault(cell: Option<u64>, component: &str, message: impl Into<String>) -> Self {
        SimError::RuntimeFault {
            cell,
            component: component.to_string(),
            message: message.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;

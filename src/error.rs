//! Module errors
//!
//! Domain failures raised by the modules themselves. Anything coming out of
//! the cloud client is carried through `Api` untouched.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModuleError>;

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("missing required arguments: {}", .0.join(", "))]
    InvalidParameters(Vec<String>),

    #[error(transparent)]
    Api(#[from] anyhow::Error),
}

impl ModuleError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

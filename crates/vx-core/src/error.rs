//! Error types for the VX bus compressor

use thiserror::Error;

use crate::ParamId;

/// Core error type
#[derive(Error, Debug)]
pub enum VxError {
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(usize),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Parameter is read-only: {0}")]
    ReadOnlyParameter(ParamId),

    #[error("Processor is not initialized")]
    NotInitialized,

    #[error("Buffer mismatch: expected {expected}, got {got}")]
    BufferMismatch { expected: usize, got: usize },

    #[error("Frame count {got} exceeds maximum of {max}")]
    FrameCountExceeded { max: usize, got: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type VxResult<T> = Result<T, VxError>;

//! Error types for the MSM engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MsmError {
    #[error("Curve parameters rejected: {0}")]
    InvalidParameters(String),

    #[error("Thread pool already started")]
    ThreadsAlreadyStarted,

    #[error("Thread pool not running")]
    ThreadsNotStarted,

    #[error("Input length mismatch: {scalars} scalars vs {points} points")]
    LengthMismatch { scalars: usize, points: usize },

    #[error("Scalar at index {0} is not below the group order")]
    ScalarOutOfRange(usize),

    #[error("Point coordinates do not satisfy the curve equation")]
    PointNotOnCurve,

    #[error("Field encoding has wrong length: expected {expected} bytes, got {got}")]
    EncodingLength { expected: usize, got: usize },

    #[error("Field encoding is not below the modulus")]
    EncodingOutOfRange,
}

pub type Result<T> = std::result::Result<T, MsmError>;

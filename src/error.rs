//! Per-frame failure taxonomy.
//!
//! Every variant except `Transport` is contained to the frame (or region) that
//! produced it. `Transport` ends the session.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The transmitted image could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The detector or recognizer capability failed.
    #[error("model inference error: {0}")]
    ModelInference(String),

    /// Region geometry is empty after clamping to the frame.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// The record store or artifact storage rejected a write.
    #[error("store write error: {0}")]
    StoreWrite(String),

    /// The producer disconnected or the stream framing is broken.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Transport(err.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

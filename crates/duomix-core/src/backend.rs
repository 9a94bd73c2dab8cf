//! Playback backend interfaces
//!
//! The control plane never touches audio devices or decoders directly.
//! Generative material goes out as program text through
//! [`PatternBackend`]; sampled material comes in through
//! [`SampleDecoder`]. Both are fallible collaborators: errors are
//! logged by the caller and never propagate into control state.

use thiserror::Error;

use crate::types::AudioClip;

/// Errors surfaced by the playback collaborators
#[derive(Error, Debug)]
pub enum BackendError {
    /// Session has not completed its one-time initialization
    #[error("Audio session not initialized")]
    NotInitialized,

    /// Session was closed and will accept no further work
    #[error("Audio session closed")]
    Closed,

    /// Backend initialization failed
    #[error("Backend initialization failed: {0}")]
    Init(String),

    /// Program application failed on the pattern evaluator
    #[error("Failed to apply program: {0}")]
    Apply(String),

    /// Audio bytes could not be decoded
    #[error("Failed to decode audio: {0}")]
    Decode(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Evaluator for declarative pattern programs
///
/// Implementations queue or evaluate the program themselves; the call
/// returns once the text is accepted. Idempotent re-application of the
/// same text is the implementation's concern - the compiler already
/// skips calls whose text matches the last applied program.
pub trait PatternBackend: Send + Sync {
    /// One-time startup, shared across concurrent open() calls
    fn initialize(&self) -> BackendResult<()>;

    /// Replace the program on the given layer
    fn apply_program(&self, layer: &str, program: &str) -> BackendResult<()>;
}

/// Decoder for imported sample bytes
pub trait SampleDecoder: Send + Sync {
    /// Decode raw file bytes into a stereo clip
    fn decode(&self, bytes: &[u8]) -> BackendResult<AudioClip>;
}

/// Pattern backend that accepts everything and logs the program text
///
/// Useful for headless operation and as the default wiring until a
/// real evaluator is attached.
#[derive(Debug, Default)]
pub struct NullPatternBackend;

impl PatternBackend for NullPatternBackend {
    fn initialize(&self) -> BackendResult<()> {
        log::info!("backend: null pattern backend initialized");
        Ok(())
    }

    fn apply_program(&self, layer: &str, program: &str) -> BackendResult<()> {
        log::debug!("backend: [{}] {}", layer, program);
        Ok(())
    }
}

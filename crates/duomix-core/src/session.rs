//! Audio session - explicit backend lifecycle
//!
//! The session owns the two collaborator handles and the one-time
//! initialization state. It is constructed explicitly and passed into
//! the engine; there are no ambient lazily-constructed globals.
//! Concurrent `open()` calls share a single pending initialization
//! through `tokio::sync::OnceCell` instead of racing.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::OnceCell;

use crate::backend::{BackendError, BackendResult, PatternBackend, SampleDecoder};
use crate::types::AudioClip;

/// Owns the playback collaborators for one console session
pub struct AudioSession {
    pattern: Box<dyn PatternBackend>,
    decoder: Box<dyn SampleDecoder>,
    init: OnceCell<()>,
    closed: AtomicBool,
}

impl AudioSession {
    /// Create a session around the given collaborators (not yet open)
    pub fn new(pattern: Box<dyn PatternBackend>, decoder: Box<dyn SampleDecoder>) -> Self {
        Self {
            pattern,
            decoder,
            init: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Run the one-time backend initialization
    ///
    /// Safe to call repeatedly and from concurrent tasks: the first
    /// caller runs the init, everyone else awaits the same result.
    pub async fn open(&self) -> BackendResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Closed);
        }
        self.init
            .get_or_try_init(|| async {
                log::info!("session: initializing playback backend");
                self.pattern.initialize()
            })
            .await
            .map(|_| ())
    }

    /// Whether initialization has completed
    pub fn is_open(&self) -> bool {
        self.init.initialized() && !self.closed.load(Ordering::Acquire)
    }

    /// Mark the session closed; subsequent backend calls fail fast
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            log::info!("session: closed");
        }
    }

    /// Push a program to the pattern evaluator
    pub fn apply_program(&self, layer: &str, program: &str) -> BackendResult<()> {
        if !self.is_open() {
            return Err(BackendError::NotInitialized);
        }
        self.pattern.apply_program(layer, program)
    }

    /// Decode imported sample bytes
    pub fn decode(&self, bytes: &[u8]) -> BackendResult<AudioClip> {
        if !self.is_open() {
            return Err(BackendError::NotInitialized);
        }
        self.decoder.decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullPatternBackend;
    use std::sync::atomic::AtomicUsize;

    struct CountingInit {
        inits: std::sync::Arc<AtomicUsize>,
    }

    impl PatternBackend for CountingInit {
        fn initialize(&self) -> BackendResult<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn apply_program(&self, _layer: &str, _program: &str) -> BackendResult<()> {
            Ok(())
        }
    }

    struct FailingDecoder;

    impl SampleDecoder for FailingDecoder {
        fn decode(&self, _bytes: &[u8]) -> BackendResult<AudioClip> {
            Err(BackendError::Decode("unsupported".into()))
        }
    }

    #[tokio::test]
    async fn test_open_is_memoized() {
        let inits = std::sync::Arc::new(AtomicUsize::new(0));
        let session = AudioSession::new(
            Box::new(CountingInit {
                inits: std::sync::Arc::clone(&inits),
            }),
            Box::new(FailingDecoder),
        );

        session.open().await.unwrap();
        session.open().await.unwrap();
        assert!(session.is_open());
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_calls_fail_before_open() {
        let session = AudioSession::new(Box::new(NullPatternBackend), Box::new(FailingDecoder));
        assert!(matches!(
            session.apply_program("master", "silence"),
            Err(BackendError::NotInitialized)
        ));
        session.open().await.unwrap();
        assert!(session.apply_program("master", "silence").is_ok());
    }

    #[tokio::test]
    async fn test_closed_session_rejects_work() {
        let session = AudioSession::new(Box::new(NullPatternBackend), Box::new(FailingDecoder));
        session.open().await.unwrap();
        session.close();
        assert!(matches!(
            session.apply_program("master", "silence"),
            Err(BackendError::NotInitialized)
        ));
        assert!(matches!(session.open().await, Err(BackendError::Closed)));
    }
}

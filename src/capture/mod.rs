//! Capture Session: converts live speech to a stream of transcript updates.
//!
//! The conversation loop only depends on the [`SpeechCapture`] trait and the
//! [`CaptureEvent`] stream, so any recognition backend (remote streaming
//! service, local model, scripted test double) can stand in for the
//! microphone-plus-websocket implementation here.

pub mod microphone;
pub mod transcriber;

pub use microphone::{MicrophoneConfig, MicrophoneSource, PcmFrame};
pub use transcriber::{StreamingTranscriber, TranscriberConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// No recognition capability on this host. Surfaced once, voice input
    /// disabled, never retried.
    #[error("Speech capture unavailable: {0}")]
    Unavailable(String),

    /// The recognition backend ended unexpectedly mid-listen.
    #[error("Speech capture interrupted: {0}")]
    Interrupted(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Transcription connection failed: {0}")]
    Connection(String),
}

/// Events delivered by a capture session to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A new recognition hypothesis for the current utterance. Interim
    /// hypotheses replace each other; a final one closes the segment.
    Transcript { text: String, is_final: bool },
    /// The backend reported an error but the session may still recover.
    Error(String),
    /// The recognition pass ended (normally or not). The owner decides
    /// whether to restart based on its current phase.
    Ended,
}

/// Capability interface for a speech-to-text capture session.
///
/// `start` begins a continuous recognition pass; `stop` ends it and must be
/// idempotent. Transcript updates flow through the event channel the
/// implementation was constructed with.
#[async_trait::async_trait]
pub trait SpeechCapture: Send + Sync {
    async fn start(&self) -> Result<(), CaptureError>;
    async fn stop(&self);
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VoiceError>;

/// Crate-level error type. The conversation loop absorbs all of these
/// internally; they only escape through constructors and the binary.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Capture error: {0}")]
    Capture(#[from] crate::capture::CaptureError),

    #[error("Completion error: {0}")]
    Completion(#[from] crate::completion::CompletionError),

    #[error("Playback error: {0}")]
    Playback(#[from] crate::playback::PlaybackError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Conversation closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

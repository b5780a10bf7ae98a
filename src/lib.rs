pub mod capture;
pub mod completion;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod playback;
pub mod prompts;
pub mod transcript;

pub use controller::{ConversationSnapshot, Phase, TurnController};
pub use conversation::{Command, ConversationHandle};
pub use error::{Result, VoiceError};
pub use transcript::{Role, TranscriptLog, Turn};

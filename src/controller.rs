//! The turn-taking state machine for a half-duplex voice conversation.
//!
//! One phase enum replaces the listening/processing/speaking boolean flags a
//! UI would otherwise juggle; every mutation is guarded by the current phase,
//! so overlapping triggers (a second stop press, a stale completion result, a
//! late playback notification) fall through as no-ops instead of producing
//! invalid combinations like capture and playback running at once.

use serde::Serialize;
use std::sync::Arc;
use strum::Display;

use crate::capture::{CaptureError, CaptureEvent, SpeechCapture};
use crate::completion::CompletionError;
use crate::playback::{PlaybackOutcome, SpeechPlayback};
use crate::prompts::CannedPhrases;
use crate::transcript::{TranscriptBuffer, TranscriptLog, Turn};

/// Discrete state of the conversation. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum Phase {
    Idle,
    Listening,
    Processing,
    Speaking,
    PausedSpeaking,
    Closed,
}

/// Read-only view the host renders after every transition.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub phase: Phase,
    pub muted: bool,
    pub turns: Vec<Turn>,
    /// One-time notice when voice input had to be disabled
    pub capture_notice: Option<String>,
}

/// A user utterance handed off for completion. The driver runs the remote
/// call and feeds the result back through `handle_completion` with the same
/// sequence number, so results that outlive their conversation are discarded.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub seq: u64,
    pub prior: Vec<Turn>,
    pub text: String,
}

/// Owns the conversation state exclusively and drives the capture and
/// playback sessions so that at most one of them is ever active.
pub struct TurnController<C, P>
where
    C: SpeechCapture,
    P: SpeechPlayback,
{
    capture: Arc<C>,
    playback: Arc<P>,
    phase: Phase,
    muted: bool,
    /// Set once when the recognition backend turns out to be unavailable
    voice_disabled: bool,
    capture_notice: Option<String>,
    buffer: TranscriptBuffer,
    log: TranscriptLog,
    submit_seq: u64,
    /// User text of the in-flight submission, appended on resolution
    pending_user_text: Option<String>,
}

impl<C, P> TurnController<C, P>
where
    C: SpeechCapture,
    P: SpeechPlayback,
{
    pub fn new(capture: Arc<C>, playback: Arc<P>) -> Self {
        Self {
            capture,
            playback,
            phase: Phase::Idle,
            muted: false,
            voice_disabled: false,
            capture_notice: None,
            buffer: TranscriptBuffer::new(),
            log: TranscriptLog::new(),
            submit_seq: 0,
            pending_user_text: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            phase: self.phase,
            muted: self.muted,
            turns: self.log.turns().to_vec(),
            capture_notice: self.capture_notice.clone(),
        }
    }

    /// User pressed the talk control. Only meaningful from `Idle`.
    pub async fn press_talk(&mut self) {
        if self.phase != Phase::Idle {
            log::debug!("Talk ignored in phase {}", self.phase);
            return;
        }
        if self.voice_disabled {
            log::debug!("Talk ignored - voice input is disabled");
            return;
        }

        match self.capture.start().await {
            Ok(()) => {
                self.buffer.clear();
                self.phase = Phase::Listening;
                log::info!("👂 Listening");
            }
            Err(e) => self.disable_voice(e),
        }
    }

    /// User pressed the stop control. From `Listening` with accumulated text
    /// this hands back a submission for the driver to run; with an empty
    /// transcript it falls back to `Idle`. Anywhere else it is a no-op.
    pub async fn press_stop(&mut self) -> Option<PendingSubmission> {
        if self.phase != Phase::Listening {
            log::debug!("Stop ignored in phase {}", self.phase);
            return None;
        }

        self.capture.stop().await;

        if self.buffer.is_empty() {
            self.buffer.clear();
            self.phase = Phase::Idle;
            log::info!("Nothing captured, back to idle");
            return None;
        }

        let text = self.buffer.take();
        self.submit_seq += 1;
        self.pending_user_text = Some(text.clone());
        self.phase = Phase::Processing;
        log::info!("💭 Submitting: '{}'", text);

        Some(PendingSubmission {
            seq: self.submit_seq,
            prior: self.log.turns().to_vec(),
            text,
        })
    }

    /// A completion call resolved. Stale results (sequence mismatch, phase
    /// moved on, conversation closed) are discarded without touching the log.
    pub async fn handle_completion(
        &mut self,
        seq: u64,
        result: Result<String, CompletionError>,
    ) {
        if self.phase != Phase::Processing || seq != self.submit_seq {
            log::debug!("Discarding stale completion result (seq {})", seq);
            return;
        }

        let user_text = match self.pending_user_text.take() {
            Some(text) => text,
            None => {
                log::warn!("Completion resolved with no pending submission");
                return;
            }
        };
        self.log.push(Turn::user(user_text));

        match result {
            Ok(reply) => {
                self.log.push(Turn::assistant(reply.clone()));
                if self.muted {
                    self.resume_listening().await;
                } else {
                    match self.playback.speak(&reply).await {
                        Ok(()) => {
                            self.phase = Phase::Speaking;
                            log::info!("🗣️ Speaking");
                        }
                        Err(e) => {
                            // Playback failures are invisible: the text is
                            // already in the log
                            log::error!("Playback failed to start: {}", e);
                            self.resume_listening().await;
                        }
                    }
                }
            }
            Err(e) => {
                log::error!("Completion failed: {}", e);
                self.log
                    .push(Turn::assistant(CannedPhrases::completion_fallback()));
                self.resume_listening().await;
            }
        }
    }

    /// Playback reported its single outcome. Any outcome means the speaker
    /// is free again; late notifications after mute or close are no-ops.
    pub async fn handle_playback_outcome(&mut self, outcome: PlaybackOutcome) {
        match self.phase {
            Phase::Speaking | Phase::PausedSpeaking => {
                log::debug!("Playback outcome: {:?}", outcome);
                self.resume_listening().await;
            }
            _ => log::debug!("Playback outcome {:?} ignored in {}", outcome, self.phase),
        }
    }

    /// Mute suppresses playback but not capture or submission. Muting while
    /// speaking cancels the utterance and goes straight back to listening.
    pub async fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        log::info!("Muted: {}", self.muted);

        if self.muted && matches!(self.phase, Phase::Speaking | Phase::PausedSpeaking) {
            self.playback.cancel().await;
            self.resume_listening().await;
        }
    }

    pub async fn pause_speaking(&mut self) {
        if self.phase == Phase::Speaking {
            self.playback.pause().await;
            self.phase = Phase::PausedSpeaking;
        } else {
            log::debug!("Pause ignored in phase {}", self.phase);
        }
    }

    pub async fn resume_speaking(&mut self) {
        if self.phase == Phase::PausedSpeaking {
            self.playback.resume().await;
            self.phase = Phase::Speaking;
        } else {
            log::debug!("Resume ignored in phase {}", self.phase);
        }
    }

    /// Terminal transition: release both sessions and invalidate any
    /// in-flight submission.
    pub async fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.capture.stop().await;
        self.playback.cancel().await;
        self.buffer.clear();
        self.pending_user_text = None;
        self.submit_seq += 1; // any in-flight result no longer matches
        self.phase = Phase::Closed;
        log::info!("Conversation closed");
    }

    /// Feed a capture event through the phase guard.
    pub async fn handle_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Transcript { text, is_final } => {
                if self.phase == Phase::Listening {
                    self.buffer.apply(&text, is_final);
                }
            }
            CaptureEvent::Error(reason) => {
                // The backend follows errors with Ended; recovery happens
                // there
                log::warn!("Capture error: {}", reason);
            }
            CaptureEvent::Ended => {
                if self.phase == Phase::Listening {
                    log::info!("Capture ended unexpectedly, restarting");
                    if let Err(e) = self.capture.start().await {
                        self.disable_voice(e);
                    }
                } else {
                    log::debug!("Capture ended in phase {}, restart suppressed", self.phase);
                }
            }
        }
    }

    /// Re-enter `Listening` after processing or speaking, or fall back to
    /// `Idle` when voice input is gone.
    async fn resume_listening(&mut self) {
        if self.voice_disabled {
            self.phase = Phase::Idle;
            return;
        }
        self.buffer.clear();
        match self.capture.start().await {
            Ok(()) => {
                self.phase = Phase::Listening;
                log::info!("👂 Listening");
            }
            Err(e) => self.disable_voice(e),
        }
    }

    fn disable_voice(&mut self, error: CaptureError) {
        log::error!("Voice input disabled: {}", error);
        self.voice_disabled = true;
        if self.capture_notice.is_none() {
            self.capture_notice = Some(CannedPhrases::capture_unavailable().to_string());
        }
        if self.phase != Phase::Closed {
            self.phase = Phase::Idle;
        }
    }
}

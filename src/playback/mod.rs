//! Playback Session: speaks assistant text aloud.
//!
//! [`SpeechPlayback`] is the capability seam the conversation loop depends
//! on; [`VoicePlayback`] is the production implementation combining a remote
//! synthesizer with a local cpal output player.

pub mod player;
pub mod synthesizer;

pub use player::{CpalPlayer, PlayerConfig};
pub use synthesizer::{HttpSynthesizer, SynthesizerConfig, Voice};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Synthesis request failed: {0}")]
    Synthesis(String),
    #[error("Audio output error: {0}")]
    Output(String),
}

/// Exactly one of these is reported per `speak` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Errored,
    Cancelled,
}

/// Capability interface for speaking assistant text aloud.
///
/// Only one utterance may be active: `speak` while speaking cancels the prior
/// utterance first (last-write-wins, no queueing). `cancel` stops immediately
/// and replaces the pending finished notification with a cancelled one.
#[async_trait::async_trait]
pub trait SpeechPlayback: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), PlaybackError>;
    async fn pause(&self);
    async fn resume(&self);
    async fn cancel(&self);
}

/// Remote synthesis plus local playout, reporting one [`PlaybackOutcome`]
/// per utterance over the channel supplied at construction.
pub struct VoicePlayback {
    synthesizer: Arc<HttpSynthesizer>,
    player: Arc<CpalPlayer>,
    outcomes: mpsc::UnboundedSender<PlaybackOutcome>,
    /// Sequence number of the utterance currently owning the speaker, if any
    active: Arc<Mutex<Option<u64>>>,
    seq: AtomicU64,
}

impl VoicePlayback {
    /// Build the playback session. Fails when no output device exists; the
    /// host can still run the conversation text-only with mute engaged.
    pub fn new(
        synthesizer: HttpSynthesizer,
        player_config: PlayerConfig,
        outcomes: mpsc::UnboundedSender<PlaybackOutcome>,
    ) -> Result<Self, PlaybackError> {
        let (drained_tx, mut drained_rx) = mpsc::unbounded_channel();
        let player = Arc::new(CpalPlayer::new(player_config, drained_tx)?);

        let active = Arc::new(Mutex::new(None::<u64>));

        // Forward natural drain completions as Finished outcomes
        let forward_active = Arc::clone(&active);
        let forward_outcomes = outcomes.clone();
        tokio::spawn(async move {
            while drained_rx.recv().await.is_some() {
                let mut active = forward_active.lock().await;
                if active.take().is_some() {
                    let _ = forward_outcomes.send(PlaybackOutcome::Finished);
                }
            }
        });

        Ok(Self {
            synthesizer: Arc::new(synthesizer),
            player,
            outcomes,
            active,
            seq: AtomicU64::new(0),
        })
    }
}

#[async_trait::async_trait]
impl SpeechPlayback for VoicePlayback {
    async fn speak(&self, text: &str) -> Result<(), PlaybackError> {
        let seq = {
            let mut active = self.active.lock().await;
            // Last-write-wins: silence whatever is playing first
            if active.take().is_some() {
                self.player.clear();
                let _ = self.outcomes.send(PlaybackOutcome::Cancelled);
            }
            let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
            *active = Some(seq);
            seq
        };

        let synthesizer = Arc::clone(&self.synthesizer);
        let player = Arc::clone(&self.player);
        let active = Arc::clone(&self.active);
        let outcomes = self.outcomes.clone();
        let text = text.to_string();

        tokio::spawn(async move {
            let pcm = synthesizer.synthesize(&text).await;

            let mut guard = active.lock().await;
            if *guard != Some(seq) {
                // Cancelled while synthesizing; the canceller already
                // reported the outcome
                return;
            }

            match pcm {
                Ok(pcm) => {
                    log::debug!("Playback: playing {} bytes of synthesized audio", pcm.len());
                    player.play(&pcm);
                }
                Err(e) => {
                    log::error!("Playback: synthesis failed: {}", e);
                    *guard = None;
                    let _ = outcomes.send(PlaybackOutcome::Errored);
                }
            }
        });

        Ok(())
    }

    async fn pause(&self) {
        self.player.pause();
    }

    async fn resume(&self) {
        self.player.resume();
    }

    async fn cancel(&self) {
        let mut active = self.active.lock().await;
        if active.take().is_some() {
            self.player.clear();
            let _ = self.outcomes.send(PlaybackOutcome::Cancelled);
        }
    }
}

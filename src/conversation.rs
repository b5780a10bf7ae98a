//! Event-loop driver for one voice-conversation session.
//!
//! All triggers (user commands, capture events, completion resolutions,
//! playback outcomes) funnel through a single `select!` loop, so the
//! controller applies exactly one transition at a time and the host only
//! ever observes consistent snapshots.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::capture::{CaptureEvent, SpeechCapture};
use crate::completion::{complete_with_retry, CompletionClient, CompletionError};
use crate::controller::{ConversationSnapshot, TurnController};
use crate::playback::{PlaybackOutcome, SpeechPlayback};

/// User-facing controls of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Talk,
    Stop,
    ToggleMute,
    PauseSpeaking,
    ResumeSpeaking,
    Close,
}

/// Handle held by the host UI: send commands, watch snapshots.
pub struct ConversationHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<ConversationSnapshot>,
    task: JoinHandle<()>,
}

impl ConversationHandle {
    pub async fn send(&self, command: Command) -> crate::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| crate::VoiceError::Closed)
    }

    /// Latest state snapshot.
    pub fn snapshot(&self) -> ConversationSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch channel for rendering on every transition.
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshots.clone()
    }

    /// Request close and wait for the loop to wind down.
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close).await;
        let _ = self.task.await;
    }
}

/// Spawn the conversation loop over the three collaborators.
///
/// `capture_events` and `playback_outcomes` are the receiving ends of the
/// channels the capture and playback sessions were constructed with.
pub fn spawn<C, M, P>(
    capture: Arc<C>,
    completion: Arc<M>,
    playback: Arc<P>,
    mut capture_events: mpsc::Receiver<CaptureEvent>,
    mut playback_outcomes: mpsc::UnboundedReceiver<PlaybackOutcome>,
) -> ConversationHandle
where
    C: SpeechCapture + 'static,
    M: CompletionClient + 'static,
    P: SpeechPlayback + 'static,
{
    let (commands_tx, mut commands_rx) = mpsc::channel::<Command>(16);
    let (resolutions_tx, mut resolutions_rx) =
        mpsc::channel::<(u64, Result<String, CompletionError>)>(4);

    let mut controller = TurnController::new(capture, playback);
    let (snapshots_tx, snapshots_rx) = watch::channel(controller.snapshot());

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                command = commands_rx.recv() => {
                    match command {
                        Some(Command::Talk) => controller.press_talk().await,
                        Some(Command::Stop) => {
                            if let Some(submission) = controller.press_stop().await {
                                let completion = Arc::clone(&completion);
                                let resolutions = resolutions_tx.clone();
                                tokio::spawn(async move {
                                    let result = complete_with_retry(
                                        completion.as_ref(),
                                        &submission.prior,
                                        &submission.text,
                                    )
                                    .await;
                                    // Loop gone means the result is moot
                                    let _ = resolutions.send((submission.seq, result)).await;
                                });
                            }
                        }
                        Some(Command::ToggleMute) => controller.toggle_mute().await,
                        Some(Command::PauseSpeaking) => controller.pause_speaking().await,
                        Some(Command::ResumeSpeaking) => controller.resume_speaking().await,
                        Some(Command::Close) | None => {
                            controller.close().await;
                            let _ = snapshots_tx.send(controller.snapshot());
                            break;
                        }
                    }
                }

                Some(event) = capture_events.recv() => {
                    controller.handle_capture_event(event).await;
                }

                Some(outcome) = playback_outcomes.recv() => {
                    controller.handle_playback_outcome(outcome).await;
                }

                Some((seq, result)) = resolutions_rx.recv() => {
                    controller.handle_completion(seq, result).await;
                }
            }

            let _ = snapshots_tx.send(controller.snapshot());
        }

        log::debug!("Conversation loop exited");
    });

    ConversationHandle {
        commands: commands_tx,
        snapshots: snapshots_rx,
        task,
    }
}

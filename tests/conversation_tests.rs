//! End-to-end coverage of the conversation event loop with scripted
//! collaborators: commands in, snapshots out.

mod common;

use common::{MockCapture, MockPlayback, ScriptedCompletion};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tutor_voice::capture::CaptureEvent;
use tutor_voice::controller::ConversationSnapshot;
use tutor_voice::conversation::{self, Command, ConversationHandle};
use tutor_voice::playback::PlaybackOutcome;
use tutor_voice::{Phase, Role};

struct Session {
    handle: ConversationHandle,
    snapshots: watch::Receiver<ConversationSnapshot>,
    capture: Arc<MockCapture>,
    playback: Arc<MockPlayback>,
    capture_events: mpsc::Sender<CaptureEvent>,
    playback_outcomes: mpsc::UnboundedSender<PlaybackOutcome>,
}

fn session(completion: ScriptedCompletion) -> Session {
    let capture = Arc::new(MockCapture::default());
    let playback = Arc::new(MockPlayback::default());
    let (capture_events, capture_events_rx) = mpsc::channel(16);
    let (playback_outcomes, playback_outcomes_rx) = mpsc::unbounded_channel();

    let handle = conversation::spawn(
        Arc::clone(&capture),
        Arc::new(completion),
        Arc::clone(&playback),
        capture_events_rx,
        playback_outcomes_rx,
    );
    let snapshots = handle.subscribe();

    Session {
        handle,
        snapshots,
        capture,
        playback,
        capture_events,
        playback_outcomes,
    }
}

async fn wait_for_phase(snapshots: &mut watch::Receiver<ConversationSnapshot>, phase: Phase) {
    let deadline = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if snapshots.borrow_and_update().phase == phase {
                return;
            }
            if snapshots.changed().await.is_err() {
                panic!("conversation loop dropped while waiting for {}", phase);
            }
        }
    });
    deadline
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for phase {}", phase));
}

#[tokio::test]
async fn round_trip_through_the_loop() {
    let mut s = session(ScriptedCompletion::new(vec![Ok(
        "Photosynthesis is...".to_string()
    )]));

    s.handle.send(Command::Talk).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;

    s.capture_events
        .send(CaptureEvent::Transcript {
            text: "What is photosynthesis?".to_string(),
            is_final: true,
        })
        .await
        .unwrap();

    s.handle.send(Command::Stop).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Speaking).await;

    let snapshot = s.snapshots.borrow().clone();
    assert_eq!(snapshot.turns.len(), 2);
    assert_eq!(snapshot.turns[0].content, "What is photosynthesis?");
    assert_eq!(snapshot.turns[1].content, "Photosynthesis is...");
    assert_eq!(
        s.playback.spoken.lock().unwrap().as_slice(),
        ["Photosynthesis is..."]
    );

    // Speech ends; the loop resumes listening
    s.playback.finish();
    s.playback_outcomes.send(PlaybackOutcome::Finished).unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;

    s.handle.close().await;
}

#[tokio::test]
async fn completion_failure_surfaces_as_fallback_bubble() {
    // Both the call and its automatic retry fail
    let completion = ScriptedCompletion::new(vec![
        Err("503".to_string()),
        Err("503 again".to_string()),
    ]);
    let mut s = session(completion);

    s.handle.send(Command::Talk).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;
    s.capture_events
        .send(CaptureEvent::Transcript {
            text: "hello?".to_string(),
            is_final: true,
        })
        .await
        .unwrap();
    s.handle.send(Command::Stop).await.unwrap();

    // Failure path skips Speaking entirely
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;
    let snapshot = s.snapshots.borrow().clone();
    assert_eq!(snapshot.turns.len(), 2);
    assert_eq!(snapshot.turns[1].role, Role::Assistant);
    assert!(snapshot.turns[1].content.starts_with("I apologize"));
    assert!(s.playback.spoken.lock().unwrap().is_empty());

    s.handle.close().await;
}

#[tokio::test]
async fn retry_happens_exactly_once() {
    let completion = ScriptedCompletion::new(vec![
        Err("transient".to_string()),
        Ok("recovered".to_string()),
    ]);
    let mut s = session(completion);

    s.handle.send(Command::Talk).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;
    s.capture_events
        .send(CaptureEvent::Transcript {
            text: "try again".to_string(),
            is_final: true,
        })
        .await
        .unwrap();
    s.handle.send(Command::Stop).await.unwrap();

    wait_for_phase(&mut s.snapshots, Phase::Speaking).await;
    let snapshot = s.snapshots.borrow().clone();
    assert_eq!(snapshot.turns[1].content, "recovered");

    s.handle.close().await;
}

#[tokio::test]
async fn close_while_processing_discards_the_result() {
    let completion = ScriptedCompletion::new(vec![Ok("too late".to_string())])
        .with_delay(Duration::from_millis(150));
    let mut s = session(completion);

    s.handle.send(Command::Talk).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;
    s.capture_events
        .send(CaptureEvent::Transcript {
            text: "slow question".to_string(),
            is_final: true,
        })
        .await
        .unwrap();
    s.handle.send(Command::Stop).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Processing).await;

    // Close wins the race; the delayed resolution must be discarded
    let log_len_at_close = s.snapshots.borrow().turns.len();
    s.handle.close().await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = s.snapshots.borrow().clone();
    assert_eq!(snapshot.phase, Phase::Closed);
    assert_eq!(snapshot.turns.len(), log_len_at_close);
    assert!(!s.capture.active.load(Ordering::SeqCst));
    assert!(!s.playback.active.load(Ordering::SeqCst));
}

#[tokio::test]
async fn mute_during_speaking_goes_straight_to_listening() {
    let mut s = session(ScriptedCompletion::new(vec![Ok("a long reply".to_string())]));

    s.handle.send(Command::Talk).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;
    s.capture_events
        .send(CaptureEvent::Transcript {
            text: "talk to me".to_string(),
            is_final: true,
        })
        .await
        .unwrap();
    s.handle.send(Command::Stop).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Speaking).await;

    let turns_before = s.snapshots.borrow().turns.len();
    s.handle.send(Command::ToggleMute).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;

    let snapshot = s.snapshots.borrow().clone();
    assert!(snapshot.muted);
    assert_eq!(snapshot.turns.len(), turns_before);
    assert_eq!(s.playback.cancels.load(Ordering::SeqCst), 1);

    s.handle.close().await;
}

#[tokio::test]
async fn interrupted_capture_restarts_while_listening() {
    let mut s = session(ScriptedCompletion::new(vec![]));

    s.handle.send(Command::Talk).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;
    assert_eq!(s.capture.starts.load(Ordering::SeqCst), 1);

    s.capture_events.send(CaptureEvent::Ended).await.unwrap();
    wait_for_phase(&mut s.snapshots, Phase::Listening).await;

    // Give the loop a beat to process the event
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(s.capture.starts.load(Ordering::SeqCst), 2);

    s.handle.close().await;
}

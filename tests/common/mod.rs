//! Scripted collaborator doubles for exercising the turn controller and the
//! conversation loop without audio devices or network access.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tutor_voice::capture::{CaptureError, SpeechCapture};
use tutor_voice::completion::{CompletionClient, CompletionError};
use tutor_voice::playback::{PlaybackError, SpeechPlayback};

#[derive(Default)]
pub struct MockCapture {
    pub active: AtomicBool,
    pub fail_start: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

#[async_trait::async_trait]
impl SpeechCapture for MockCapture {
    async fn start(&self) -> Result<(), CaptureError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(CaptureError::Unavailable(
                "no recognition backend".to_string(),
            ));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockPlayback {
    pub active: AtomicBool,
    pub paused: AtomicBool,
    pub spoken: Mutex<Vec<String>>,
    pub cancels: AtomicUsize,
}

impl MockPlayback {
    /// Simulate the utterance finishing naturally.
    pub fn finish(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SpeechPlayback for MockPlayback {
    async fn speak(&self, text: &str) -> Result<(), PlaybackError> {
        self.spoken.lock().unwrap().push(text.to_string());
        self.active.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    async fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    async fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }
}

/// Hands out scripted replies in order; an exhausted script keeps failing.
pub struct ScriptedCompletion {
    pub replies: Mutex<VecDeque<Result<String, String>>>,
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait::async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        _prior: &[tutor_voice::Turn],
        _user_text: &str,
    ) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.replies.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(CompletionError::BadResponse(message)),
            None => Err(CompletionError::BadResponse("script exhausted".to_string())),
        }
    }
}

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{CaptureError, CaptureEvent, MicrophoneConfig, MicrophoneSource, SpeechCapture};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    /// Websocket endpoint of the streaming transcription service
    pub endpoint: String,
    pub language: Option<String>,
    /// Real-time pacing between audio chunks
    pub chunk_interval: Duration,
    pub microphone: MicrophoneConfig,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            endpoint:
                "wss://audio-streaming.us-virginia-1.direct.fireworks.ai/v1/audio/transcriptions/streaming"
                    .to_string(),
            language: Some("en".to_string()),
            chunk_interval: Duration::from_millis(80), // 80ms per chunk
            microphone: MicrophoneConfig::default(),
        }
    }
}

/// Incremental hypothesis message from the transcription service. The
/// service sends the cumulative transcript in `text` and id-keyed
/// `segments`; there is no explicit finality marker on the wire.
#[derive(Debug, Deserialize)]
struct HypothesisMessage {
    text: Option<String>,
    segments: Option<Vec<HypothesisSegment>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HypothesisSegment {
    id: u32,
    text: String,
}

/// Derives interim/final transcript updates from id-keyed segments. The
/// service revises the newest segment in place across messages; once a
/// higher id appears, every lower segment is settled for good.
#[derive(Debug, Default)]
struct SegmentTracker {
    current: Option<(u32, String)>,
}

impl SegmentTracker {
    /// Returns `(text, is_final)` updates in delivery order.
    fn apply(&mut self, segments: Vec<HypothesisSegment>) -> Vec<(String, bool)> {
        let mut updates = Vec::new();
        for segment in segments {
            match self.current.take() {
                None => {
                    updates.push((segment.text.clone(), false));
                    self.current = Some((segment.id, segment.text));
                }
                Some((id, settled)) => {
                    if segment.id == id {
                        updates.push((segment.text.clone(), false));
                        self.current = Some((id, segment.text));
                    } else if segment.id > id {
                        updates.push((settled, true));
                        updates.push((segment.text.clone(), false));
                        self.current = Some((segment.id, segment.text));
                    } else {
                        // Replay of a segment that already settled
                        self.current = Some((id, settled));
                    }
                }
            }
        }
        updates
    }
}

/// Continuous speech recognition over a streaming-transcription websocket.
///
/// Each `start` opens the microphone and a fresh websocket, forwards paced
/// PCM chunks, and turns incremental hypothesis messages into
/// [`CaptureEvent`]s. When the socket closes for any reason the session
/// reports `CaptureEvent::Ended` and leaves the restart decision to the
/// owner, so a restart is never resurrected into the wrong phase.
pub struct StreamingTranscriber {
    api_key: String,
    config: TranscriberConfig,
    events: mpsc::Sender<CaptureEvent>,
    session: Arc<Mutex<Option<ActiveSession>>>,
    next_session: AtomicU64,
}

struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
}

impl StreamingTranscriber {
    pub fn new(
        api_key: String,
        config: TranscriberConfig,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Self {
        Self {
            api_key,
            config,
            events,
            session: Arc::new(Mutex::new(None)),
            next_session: AtomicU64::new(0),
        }
    }

    fn session_url(&self) -> Result<Url, CaptureError> {
        let mut url =
            Url::parse(&self.config.endpoint).map_err(|e| CaptureError::Connection(e.to_string()))?;

        if let Some(language) = &self.config.language {
            url.query_pairs_mut().append_pair("language", language);
        }
        url.query_pairs_mut()
            .append_pair("response_format", "verbose_json");
        url.query_pairs_mut()
            .append_pair("Authorization", &self.api_key);

        Ok(url)
    }

    /// Pump microphone frames and service messages until cancelled or the
    /// server closes the connection.
    async fn run_session(
        ws_stream: WsStream,
        mut frames: broadcast::Receiver<super::PcmFrame>,
        chunk_interval: Duration,
        events: mpsc::Sender<CaptureEvent>,
        cancel: CancellationToken,
    ) {
        let (mut write, mut read) = ws_stream.split();
        let mut tracker = SegmentTracker::default();

        let mut last_send = Instant::now();
        let mut chunk_count = 0u64;

        loop {
            tokio::select! {
                frame = frames.recv() => {
                    match frame {
                        Ok(frame) => {
                            chunk_count += 1;

                            // Maintain real-time pacing
                            let elapsed = last_send.elapsed();
                            if elapsed < chunk_interval {
                                tokio::time::sleep(chunk_interval - elapsed).await;
                            }
                            last_send = Instant::now();

                            if write.send(Message::Binary(frame.to_le_bytes().into())).await.is_err() {
                                log::warn!("Transcriber: failed to send audio chunk {}", chunk_count);
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!("Transcriber: audio receiver lagged, skipped {} frames", skipped);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            log::info!("Transcriber: audio stream closed after {} chunks", chunk_count);
                            break;
                        }
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_message(text.to_string(), &mut tracker, &events).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Transcriber: server closed connection: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            log::error!("Transcriber: websocket error: {}", e);
                            let _ = events.send(CaptureEvent::Error(e.to_string())).await;
                            break;
                        }
                        None => break,
                    }
                }

                _ = cancel.cancelled() => {
                    log::debug!("Transcriber: session cancelled after {} chunks", chunk_count);
                    break;
                }
            }
        }

        let _ = write.close().await;
    }

    async fn handle_message(
        text: String,
        tracker: &mut SegmentTracker,
        events: &mpsc::Sender<CaptureEvent>,
    ) {
        match serde_json::from_str::<HypothesisMessage>(&text) {
            Ok(message) => {
                if let Some(error) = message.error {
                    log::warn!("Transcriber: service error: {}", error);
                    let _ = events.send(CaptureEvent::Error(error)).await;
                    return;
                }
                if let Some(segments) = message.segments {
                    for (hypothesis, is_final) in tracker.apply(segments) {
                        if hypothesis.is_empty() {
                            continue;
                        }
                        log::debug!(
                            "Transcriber: hypothesis (final={}): '{}'",
                            is_final,
                            hypothesis
                        );
                        let _ = events
                            .send(CaptureEvent::Transcript {
                                text: hypothesis,
                                is_final,
                            })
                            .await;
                    }
                } else if let Some(cumulative) = message.text {
                    // Without segment ids only the cumulative transcript is
                    // usable; deliver it as an interim overwrite.
                    if !cumulative.is_empty() {
                        let _ = events
                            .send(CaptureEvent::Transcript {
                                text: cumulative,
                                is_final: false,
                            })
                            .await;
                    }
                }
            }
            Err(e) => {
                // Keep listening; the service interleaves housekeeping messages
                log::debug!("Transcriber: unparsed message ({}): {}", e, text);
            }
        }
    }
}

#[async_trait::async_trait]
impl SpeechCapture for StreamingTranscriber {
    async fn start(&self) -> Result<(), CaptureError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            log::debug!("Transcriber: start ignored - session already active");
            return Ok(());
        }

        // Connecting and opening the device both happen before the session
        // is registered, so an unreachable endpoint or a missing microphone
        // fails this start instead of spinning up a doomed session. The
        // caller treats a start failure as voice input being unavailable.
        let url = self.session_url()?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| CaptureError::Connection(e.to_string()))?;

        let microphone = MicrophoneSource::open(self.config.microphone.clone())?;
        let frames = microphone.subscribe();

        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *session = Some(ActiveSession {
            id,
            cancel: cancel.clone(),
        });

        let events = self.events.clone();
        let chunk_interval = self.config.chunk_interval;
        let slot = Arc::clone(&self.session);

        tokio::spawn(async move {
            // The microphone lives inside the task so the device is released
            // on every exit path.
            let _microphone = microphone;
            Self::run_session(ws_stream, frames, chunk_interval, events.clone(), cancel).await;

            // Free the slot before announcing the end, so a restart triggered
            // by `Ended` never finds this session still registered. A newer
            // session may already own the slot by then.
            {
                let mut slot = slot.lock().await;
                if slot.as_ref().map(|s| s.id) == Some(id) {
                    *slot = None;
                }
            }
            let _ = events.send(CaptureEvent::Ended).await;
        });

        log::info!("Transcriber: recognition pass started");
        Ok(())
    }

    async fn stop(&self) {
        let mut session = self.session.lock().await;
        if let Some(active) = session.take() {
            active.cancel.cancel();
            log::info!("Transcriber: recognition pass stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_url_carries_parameters() {
        let (events, _rx) = mpsc::channel(8);
        let transcriber =
            StreamingTranscriber::new("fw_test".to_string(), TranscriberConfig::default(), events);

        let url = transcriber.session_url().unwrap();
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert!(query.contains(&("language".to_string(), "en".to_string())));
        assert!(query.contains(&("Authorization".to_string(), "fw_test".to_string())));
    }

    #[test]
    fn test_hypothesis_parsing() {
        let message: HypothesisMessage = serde_json::from_str(
            r#"{"text":"hello there","segments":[{"id":0,"text":"hello there"}]}"#,
        )
        .unwrap();
        assert_eq!(message.text.as_deref(), Some("hello there"));
        let segments = message.segments.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].id, 0);

        let bare: HypothesisMessage = serde_json::from_str(r#"{"text":"hel"}"#).unwrap();
        assert!(bare.segments.is_none());
    }

    fn segment(id: u32, text: &str) -> HypothesisSegment {
        HypothesisSegment {
            id,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_segment_revisions_stay_interim() {
        let mut tracker = SegmentTracker::default();
        assert_eq!(
            tracker.apply(vec![segment(0, "what")]),
            vec![("what".to_string(), false)]
        );
        assert_eq!(
            tracker.apply(vec![segment(0, "what is")]),
            vec![("what is".to_string(), false)]
        );
    }

    #[test]
    fn test_new_segment_id_settles_the_previous() {
        let mut tracker = SegmentTracker::default();
        tracker.apply(vec![segment(0, "what is")]);

        let updates = tracker.apply(vec![segment(1, "photosynthesis")]);
        assert_eq!(
            updates,
            vec![
                ("what is".to_string(), true),
                ("photosynthesis".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_settled_segment_replay_is_ignored() {
        let mut tracker = SegmentTracker::default();
        tracker.apply(vec![segment(0, "what is"), segment(1, "photo")]);

        assert!(tracker.apply(vec![segment(0, "what was")]).is_empty());
        assert_eq!(
            tracker.apply(vec![segment(1, "photosynthesis")]),
            vec![("photosynthesis".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_start_fails_when_endpoint_unreachable() {
        let (events, _rx) = mpsc::channel(8);
        let config = TranscriberConfig {
            endpoint: "ws://127.0.0.1:9".to_string(),
            ..TranscriberConfig::default()
        };
        let transcriber = StreamingTranscriber::new("fw_test".to_string(), config, events);

        // The connection is established during start, so a dead endpoint
        // surfaces here instead of inside the session task.
        match transcriber.start().await {
            Err(CaptureError::Connection(_)) => {}
            other => panic!("Expected a connection error, got {:?}", other.err()),
        }
    }
}

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::mpsc;

use super::PlaybackError;

// Synthesized audio arrives as 16-bit PCM at 16kHz mono
const INPUT_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Output device name (None = default output device)
    pub device_name: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { device_name: None }
    }
}

struct PlayerShared {
    /// Mono f32 samples at 16kHz awaiting playout
    queue: Mutex<VecDeque<f32>>,
    paused: AtomicBool,
    /// True while an utterance owns the queue; cleared by cancel so a drain
    /// after cancel reports nothing
    active: AtomicBool,
    drained: mpsc::UnboundedSender<()>,
}

enum PlayerCommand {
    Shutdown,
}

/// Local speaker output with pause/resume/cancel.
///
/// The cpal stream lives on its own thread (streams are not `Send`) and
/// up-samples the queued 16kHz audio to the device rate with linear
/// interpolation. Pausing gates the drain without touching the queue, so
/// resume keeps position exactly. When the queue drains naturally the player
/// signals once on the drained channel.
pub struct CpalPlayer {
    shared: Arc<PlayerShared>,
    commands: std_mpsc::Sender<PlayerCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalPlayer {
    pub fn new(
        config: PlayerConfig,
        drained: mpsc::UnboundedSender<()>,
    ) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();

        let device = if let Some(name) = &config.device_name {
            host.output_devices()
                .map_err(|e| PlaybackError::Output(e.to_string()))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| PlaybackError::Output(format!("Output device not found: {}", name)))?
        } else {
            host.default_output_device()
                .ok_or_else(|| PlaybackError::Output("No output device found".to_string()))?
        };

        log::debug!("Player: using output device: {:?}", device.name());

        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::Output(e.to_string()))?;

        let output_rate = supported.sample_rate().0;
        let output_channels = supported.channels() as usize;

        let shared = Arc::new(PlayerShared {
            queue: Mutex::new(VecDeque::new()),
            paused: AtomicBool::new(false),
            active: AtomicBool::new(false),
            drained,
        });
        let stream_shared = Arc::clone(&shared);

        let (commands, command_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let thread = thread::spawn(move || {
            let step = INPUT_SAMPLE_RATE as f32 / output_rate as f32;
            // Fractional read position carried across callbacks
            let mut cursor = 0.0f32;

            let stream = device.build_output_stream(
                &supported.config(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if stream_shared.paused.load(Ordering::Acquire) {
                        data.fill(0.0);
                        return;
                    }

                    let mut queue = stream_shared.queue.lock().unwrap();
                    let had_samples = !queue.is_empty();

                    cursor = render_frames(&mut queue, data, output_channels, step, cursor);

                    if had_samples
                        && queue.is_empty()
                        && stream_shared.active.swap(false, Ordering::AcqRel)
                    {
                        let _ = stream_shared.drained.send(());
                    }
                },
                |err| {
                    log::error!("Player: stream error: {}", err);
                },
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(PlaybackError::Output(e.to_string())));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(PlaybackError::Output(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            log::debug!("Player: output stream started");

            while let Ok(command) = command_rx.recv() {
                match command {
                    PlayerCommand::Shutdown => break,
                }
            }

            log::debug!("Player: output thread exiting");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(PlaybackError::Output(
                    "Player thread exited before starting".to_string(),
                ))
            }
        }

        Ok(Self {
            shared,
            commands,
            thread: Some(thread),
        })
    }

    /// Replace the queue with a new utterance (16-bit PCM LE at 16kHz).
    pub fn play(&self, pcm: &[u8]) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.clear();
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            queue.push_back(sample as f32 / i16::MAX as f32);
        }
        self.shared.paused.store(false, Ordering::Release);
        self.shared.active.store(true, Ordering::Release);
        log::debug!("Player: queued {} samples", queue.len());
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    /// Stop immediately and drop the rest of the utterance. No drain signal
    /// follows a clear.
    pub fn clear(&self) {
        self.shared.active.store(false, Ordering::Release);
        self.shared.queue.lock().unwrap().clear();
        self.shared.paused.store(false, Ordering::Release);
    }

    pub fn is_idle(&self) -> bool {
        self.shared.queue.lock().unwrap().is_empty()
    }
}

/// Fill one output buffer from the sample queue, up-sampling by linear
/// interpolation. Returns the fractional read position to carry into the
/// next callback, so the resample phase stays continuous across buffer
/// boundaries. The carry resets once the queue runs out.
fn render_frames(
    queue: &mut VecDeque<f32>,
    data: &mut [f32],
    channels: usize,
    step: f32,
    mut cursor: f32,
) -> f32 {
    for frame in data.chunks_mut(channels) {
        let idx = cursor as usize;
        let fract = cursor.fract();

        let sample = if idx + 1 < queue.len() {
            queue[idx] * (1.0 - fract) + queue[idx + 1] * fract
        } else if idx < queue.len() {
            queue[idx]
        } else {
            0.0
        };

        for channel in frame.iter_mut() {
            *channel = sample;
        }

        cursor += step;
    }

    let whole = cursor as usize;
    let consumed = whole.min(queue.len());
    queue.drain(..consumed);

    if consumed < whole {
        0.0
    } else {
        cursor - consumed as f32
    }
}

impl Drop for CpalPlayer {
    fn drop(&mut self) {
        let _ = self.commands.send(PlayerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if let Err(e) = thread.join() {
                log::error!("Player: failed to join output thread: {:?}", e);
            }
        }
    }
}

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::broadcast;

use super::CaptureError;

const TARGET_SAMPLE_RATE: u32 = 16_000;
const FRAME_SAMPLES: usize = 1280; // 80ms at 16kHz

/// One frame of 16 kHz mono PCM from the microphone.
#[derive(Debug, Clone)]
pub struct PcmFrame {
    pub samples: Vec<i16>,
}

impl PcmFrame {
    /// Little-endian PCM bytes, the format the transcription service expects.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct MicrophoneConfig {
    /// Device name to capture from (None = default input device)
    pub device_name: Option<String>,
    /// Broadcast channel capacity in frames
    pub channel_capacity: usize,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            channel_capacity: 64,
        }
    }
}

enum MicCommand {
    Shutdown,
}

/// Owns the host microphone and publishes 16 kHz mono PCM frames.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread
/// that parks on a command channel until shutdown. Frames go out over a
/// broadcast channel so a capture session can subscribe per recognition pass.
pub struct MicrophoneSource {
    frames: broadcast::Sender<PcmFrame>,
    commands: std_mpsc::Sender<MicCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MicrophoneSource {
    /// Open the input device and start capturing. Fails with
    /// `CaptureError::Unavailable` when the host has no usable microphone.
    pub fn open(config: MicrophoneConfig) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = if let Some(name) = &config.device_name {
            host.input_devices()
                .map_err(|e| CaptureError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| CaptureError::Device(format!("Input device not found: {}", name)))?
        } else {
            host.default_input_device().ok_or_else(|| {
                CaptureError::Unavailable("No default input device found".to_string())
            })?
        };

        log::debug!("Microphone: using input device: {:?}", device.name());

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        if supported.sample_format() != SampleFormat::F32 {
            return Err(CaptureError::Unavailable(format!(
                "Unsupported input sample format: {:?}",
                supported.sample_format()
            )));
        }

        let source_rate = supported.sample_rate().0;
        let source_channels = supported.channels() as usize;

        let (frames, _) = broadcast::channel(config.channel_capacity);
        let frames_for_stream = frames.clone();
        let (commands, command_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let thread = thread::spawn(move || {
            // Accumulates resampled mono samples until a full frame is ready
            let mut pending: Vec<i16> = Vec::with_capacity(FRAME_SAMPLES * 2);
            let step = source_rate as f64 / TARGET_SAMPLE_RATE as f64;
            // Fractional read position carried across callbacks
            let mut cursor = 0.0f64;

            let stream = device.build_input_stream(
                &supported.config(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Channel 0 only, nearest-sample decimation down to 16kHz
                    let frame_count = data.len() / source_channels;
                    while (cursor as usize) < frame_count {
                        let sample = data[(cursor as usize) * source_channels];
                        pending.push((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                        cursor += step;
                    }
                    cursor -= frame_count as f64;

                    while pending.len() >= FRAME_SAMPLES {
                        let samples: Vec<i16> = pending.drain(..FRAME_SAMPLES).collect();
                        // No receivers just means nothing is listening yet
                        let _ = frames_for_stream.send(PcmFrame { samples });
                    }
                },
                |err| {
                    log::error!("Microphone: stream error: {}", err);
                },
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(CaptureError::Unavailable(e.to_string())));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CaptureError::Unavailable(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            log::debug!("Microphone: capture stream started");

            // Park until shutdown; the stream stops when it drops with us
            while let Ok(command) = command_rx.recv() {
                match command {
                    MicCommand::Shutdown => break,
                }
            }

            log::debug!("Microphone: capture thread exiting");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(CaptureError::Unavailable(
                    "Microphone thread exited before starting".to_string(),
                ))
            }
        }

        Ok(Self {
            frames,
            commands,
            thread: Some(thread),
        })
    }

    /// Subscribe to the live frame stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PcmFrame> {
        self.frames.subscribe()
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        let _ = self.commands.send(MicCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if let Err(e) = thread.join() {
                log::error!("Microphone: failed to join capture thread: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_frame_to_le_bytes() {
        let frame = PcmFrame {
            samples: vec![0, 1, -1],
        };
        assert_eq!(frame.to_le_bytes(), vec![0, 0, 1, 0, 255, 255]);
    }

    #[test]
    fn test_config_defaults() {
        let config = MicrophoneConfig::default();
        assert!(config.device_name.is_none());
        assert_eq!(config.channel_capacity, 64);
    }

    #[test]
    #[serial]
    #[cfg_attr(
        not(feature = "test-audio"),
        ignore = "requires audio device - run with --features test-audio"
    )]
    fn test_microphone_open() {
        match MicrophoneSource::open(MicrophoneConfig::default()) {
            Ok(source) => {
                let _rx = source.subscribe();
            }
            Err(CaptureError::Unavailable(reason)) => {
                panic!("No input device available: {}", reason);
            }
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }
}

//! Audio device output using cpal
//!
//! `cpal::Stream` is not `Send`, so each session owns a dedicated thread that
//! builds the stream, keeps it alive, and drops it when the session closes.
//! The session and the device callback share the active voice slot.

use super::{render_frames, FaultNotifier, OutputBackend, OutputSession, Voice};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

type VoiceSlot = Arc<Mutex<Option<Voice>>>;

/// Output backend for a real audio device
#[derive(Debug, Clone)]
pub struct CpalOutput {
    device_name: Option<String>,
    sample_rate: u32,
    buffer_size: Option<u32>,
}

impl CpalOutput {
    /// # Arguments
    /// - `device_name`: Optional device name (None = default device)
    /// - `sample_rate`: Preferred rate; the device default is used if unsupported
    /// - `buffer_size`: Optional buffer size in frames (None = device default)
    pub fn new(device_name: Option<String>, sample_rate: u32, buffer_size: Option<u32>) -> Self {
        Self {
            device_name,
            sample_rate,
            buffer_size,
        }
    }

    /// List available audio output device names
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::OutputUnavailable(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Find the requested device, falling back to the default device
    fn find_device(&self) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = self.device_name.as_ref() {
            let mut devices = host.output_devices().map_err(|e| {
                Error::OutputUnavailable(format!("Failed to enumerate devices: {}", e))
            })?;
            if let Some(dev) = devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                info!("Found requested audio device: {}", name);
                return Ok(dev);
            }
            warn!(
                "Requested device '{}' not found, falling back to default device",
                name
            );
        }

        let dev = host
            .default_output_device()
            .ok_or_else(|| Error::OutputUnavailable("No default output device found".to_string()))?;
        info!(
            "Using default audio device: {}",
            dev.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(dev)
    }

    /// Prefer the configured rate in stereo f32, else the device default
    fn best_config(&self, device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let rate = self.sample_rate;
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::OutputUnavailable(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= rate
                && config.max_sample_rate().0 >= rate
                && config.sample_format() == SampleFormat::F32
        });

        let (mut config, format) = match preferred {
            Some(c) => {
                let format = c.sample_format();
                (c.with_sample_rate(cpal::SampleRate(rate)).config(), format)
            }
            None => {
                let c = device.default_output_config().map_err(|e| {
                    Error::OutputUnavailable(format!("Failed to get default config: {}", e))
                })?;
                (c.config(), c.sample_format())
            }
        };

        if let Some(size) = self.buffer_size {
            config.buffer_size = cpal::BufferSize::Fixed(size);
        }
        Ok((config, format))
    }

    /// Build and start the stream. Runs on the session thread.
    fn start_stream(&self, slot: VoiceSlot, on_fault: FaultNotifier) -> Result<(cpal::Stream, u32)> {
        let device = self.find_device()?;
        let (config, format) = self.best_config(&device)?;

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, format, config.buffer_size
        );

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, slot, on_fault)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, slot, on_fault)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, slot, on_fault)?,
            other => {
                return Err(Error::OutputUnavailable(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::OutputUnavailable(format!("Failed to start stream: {}", e)))?;

        Ok((stream, config.sample_rate.0))
    }
}

impl OutputBackend for CpalOutput {
    fn open(&self, on_fault: FaultNotifier) -> Result<Box<dyn OutputSession>> {
        let slot: VoiceSlot = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let backend = self.clone();
        let thread_slot = Arc::clone(&slot);
        let thread = std::thread::Builder::new()
            .name("tilawa-output".to_string())
            .spawn(move || match backend.start_stream(thread_slot, on_fault) {
                Ok((stream, rate)) => {
                    let _ = ready_tx.send(Ok(rate));
                    // Park until the session closes; the stream lives as long as this frame
                    let _ = shutdown_rx.recv();
                    if let Err(e) = stream.pause() {
                        warn!("Failed to pause stream: {}", e);
                    }
                    drop(stream);
                    debug!("Audio stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::OutputUnavailable(format!("Failed to spawn output thread: {}", e)))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| Error::OutputUnavailable("Output thread exited during setup".to_string()))??;

        info!("Audio stream started at {}Hz", sample_rate);
        Ok(Box::new(CpalSession {
            slot,
            sample_rate,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }))
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    slot: VoiceSlot,
    on_fault: FaultNotifier,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.clear();
                scratch.resize(data.len(), 0.0);

                let finished_voice = {
                    let mut active = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    if render_frames(&mut active, channels, &mut scratch) {
                        active.take()
                    } else {
                        None
                    }
                };
                if let Some(voice) = finished_voice {
                    voice.complete();
                }

                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                on_fault(err.to_string());
            },
            None,
        )
        .map_err(|e| Error::OutputUnavailable(format!("Failed to build stream: {}", e)))
}

struct CpalSession {
    slot: VoiceSlot,
    sample_rate: u32,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputSession for CpalSession {
    fn start(&mut self, mut voice: Voice) -> Result<()> {
        if self.shutdown.is_none() {
            return Err(Error::OutputUnavailable("Output session closed".to_string()));
        }
        voice.set_output_rate(self.sample_rate);
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(voice);
        // Dropped outside the lock; a replaced voice never completes
        drop(previous);
        Ok(())
    }

    fn halt(&mut self) {
        let previous = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(previous);
    }

    fn close(&mut self) {
        self.halt();
        if let Some(shutdown) = self.shutdown.take() {
            // Dropping the sender wakes the output thread
            drop(shutdown);
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    warn!("Output thread panicked during shutdown");
                }
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        self.close();
    }
}

// Slice recorder: the exclusive capture handle the tick loop swaps on every slice
//
// A `Microphone` hands out `Recording` handles. Starting a new recording
// re-targets capture immediately, so the previous handle stops receiving audio
// at the same instant the new one begins; the previous handle is then stopped
// to obtain its artifact.

use anyhow::Context;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioFrame};
use crate::error::RecorderError;

/// Handle to a finished slice in platform storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceArtifact {
    pub uri: String,
    pub recording_id: u64,
}

/// One in-progress capture
#[async_trait::async_trait]
pub trait Recording: Send {
    fn id(&self) -> u64;

    /// When capture into this handle began
    fn started_at(&self) -> Instant;

    /// Stop capture and unload the artifact
    ///
    /// Fails with `RecorderError::AlreadyStopped` if called twice.
    async fn stop(&mut self) -> Result<SliceArtifact, RecorderError>;
}

/// The platform's exclusive capture resource
#[async_trait::async_trait]
pub trait Microphone: Send + Sync {
    async fn request_permission(&self) -> bool;

    /// Begin a new recording; at most one recording receives audio at a time
    async fn start(&self) -> Result<Box<dyn Recording>, RecorderError>;

    /// Release the underlying device once a session ends
    async fn release(&self) {}
}

/// Microphone over any `AudioBackend`, writing each recording to a WAV file
pub struct WavMicrophone {
    backend: tokio::sync::Mutex<Box<dyn AudioBackend>>,
    slots: Arc<Mutex<SliceSlots>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    slice_dir: PathBuf,
    sample_rate: u32,
    channels: u16,
    next_id: AtomicU64,
}

#[derive(Default)]
struct SliceSlots {
    active: Option<SliceWriter>,
    /// Recordings that lost capture to a newer one but are not stopped yet
    detached: HashMap<u64, SliceWriter>,
}

impl WavMicrophone {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        slice_dir: impl Into<PathBuf>,
        sample_rate: u32,
        channels: u16,
    ) -> anyhow::Result<Self> {
        let slice_dir = slice_dir.into();
        fs::create_dir_all(&slice_dir).context("Failed to create slice directory")?;

        info!(
            "WAV microphone over {} backend, slices in {}",
            backend.name(),
            slice_dir.display()
        );

        Ok(Self {
            backend: tokio::sync::Mutex::new(backend),
            slots: Arc::new(Mutex::new(SliceSlots::default())),
            pump: Mutex::new(None),
            slice_dir,
            sample_rate,
            channels,
            next_id: AtomicU64::new(1),
        })
    }

    async fn ensure_capturing(&self) -> Result<(), RecorderError> {
        let mut backend = self.backend.lock().await;
        // A finished file replay keeps its pump until release; later slices are silent
        if self.pump_running() {
            return Ok(());
        }

        let audio_rx = backend
            .start()
            .await
            .map_err(|e| RecorderError::Backend(e.to_string()))?;

        let pump = tokio::spawn(pump_frames(audio_rx, Arc::clone(&self.slots)));
        if let Ok(mut slot) = self.pump.lock() {
            *slot = Some(pump);
        }

        Ok(())
    }

    fn pump_running(&self) -> bool {
        self.pump
            .lock()
            .map(|pump| pump.is_some())
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl Microphone for WavMicrophone {
    async fn request_permission(&self) -> bool {
        match self.ensure_capturing().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Microphone unavailable: {}", e);
                false
            }
        }
    }

    async fn start(&self) -> Result<Box<dyn Recording>, RecorderError> {
        self.ensure_capturing().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let path = self.slice_dir.join(format!("slice-{:06}.wav", id));
        let writer = SliceWriter::create(id, path, self.sample_rate, self.channels)?;

        let mut slots = self
            .slots
            .lock()
            .map_err(|_| RecorderError::Backend("slice slots poisoned".to_string()))?;
        if let Some(previous) = slots.active.replace(writer) {
            slots.detached.insert(previous.id, previous);
        }

        Ok(Box::new(WavRecording {
            id,
            started_at: Instant::now(),
            slots: Arc::clone(&self.slots),
        }))
    }

    async fn release(&self) {
        if let Ok(mut pump) = self.pump.lock() {
            if let Some(task) = pump.take() {
                task.abort();
            }
        }

        if let Err(e) = self.backend.lock().await.stop().await {
            warn!("Failed to stop audio backend: {}", e);
        }

        // Unfinished slices belong to nobody once the device is released
        if let Ok(mut slots) = self.slots.lock() {
            let abandoned: Vec<SliceWriter> = slots
                .active
                .take()
                .into_iter()
                .chain(slots.detached.drain().map(|(_, writer)| writer))
                .collect();
            for writer in abandoned {
                let path = writer.path.clone();
                drop(writer);
                let _ = fs::remove_file(&path);
            }
        }

        info!("Microphone released");
    }
}

struct WavRecording {
    id: u64,
    started_at: Instant,
    slots: Arc<Mutex<SliceSlots>>,
}

#[async_trait::async_trait]
impl Recording for WavRecording {
    fn id(&self) -> u64 {
        self.id
    }

    fn started_at(&self) -> Instant {
        self.started_at
    }

    async fn stop(&mut self) -> Result<SliceArtifact, RecorderError> {
        let writer = {
            let mut slots = self
                .slots
                .lock()
                .map_err(|_| RecorderError::Backend("slice slots poisoned".to_string()))?;
            match slots.active.as_ref() {
                Some(active) if active.id == self.id => slots.active.take(),
                _ => slots.detached.remove(&self.id),
            }
        };

        let writer = writer.ok_or(RecorderError::AlreadyStopped(self.id))?;
        let (path, samples) = writer.finish()?;
        debug!("Recording {} stopped ({} samples)", self.id, samples);

        Ok(SliceArtifact {
            uri: path.display().to_string(),
            recording_id: self.id,
        })
    }
}

async fn pump_frames(mut audio_rx: mpsc::Receiver<AudioFrame>, slots: Arc<Mutex<SliceSlots>>) {
    while let Some(frame) = audio_rx.recv().await {
        let Ok(mut guard) = slots.lock() else {
            break;
        };
        if let Some(active) = guard.active.as_mut() {
            if let Err(e) = active.write_frame(&frame) {
                warn!("Dropping audio for recording {}: {}", active.id, e);
            }
        }
    }
    debug!("Audio pump finished");
}

/// Writes one recording to disk as a WAV file
struct SliceWriter {
    id: u64,
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    sample_count: usize,
}

impl SliceWriter {
    fn create(id: u64, path: PathBuf, sample_rate: u32, channels: u16) -> Result<Self, RecorderError> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| RecorderError::Write(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            id,
            path,
            writer: Some(writer),
            sample_count: 0,
        })
    }

    fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), RecorderError> {
        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| RecorderError::Write(e.to_string()))?;
            }
            self.sample_count += frame.samples.len();
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(PathBuf, usize), RecorderError> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| RecorderError::Write(e.to_string()))?;
        }
        Ok((self.path.clone(), self.sample_count))
    }
}

impl Drop for SliceWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize slice {} on drop: {}", self.id, e);
            }
        }
    }
}

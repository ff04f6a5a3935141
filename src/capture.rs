use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Serialize;

use crate::audio::SAMPLE_RATE_HZ;
use crate::config::CaptureSettings;
use crate::error::{CaptureError, Result};
use crate::resample::resample_linear;
use crate::wav::{encode_wav_pcm16_mono, EncodedAudio};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Recording,
    Finalizing,
}

/// Producer half of the capture queue, handed to the device callback.
///
/// Pushing never blocks: when the consumer has fallen behind, or has already
/// gone away, the block is dropped and counted instead.
#[derive(Debug, Clone)]
pub struct BlockSender {
    tx: SyncSender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
}

impl BlockSender {
    pub fn push(&self, block: Vec<f32>) -> bool {
        match self.tx.try_send(block) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    log::warn!("capture worker is gone; discarding input blocks");
                }
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub fn block_channel(capacity: usize) -> (BlockSender, Receiver<Vec<f32>>, Arc<AtomicU64>) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let sender = BlockSender {
        tx,
        dropped: Arc::clone(&dropped),
    };
    (sender, rx, dropped)
}

/// A running input device. Dropping it must release the device and every
/// [`BlockSender`] clone the source kept, which is what ends the capture.
pub struct ActiveSource {
    pub sample_rate_hz: u32,
    _stream: Box<dyn Any>,
}

impl ActiveSource {
    pub fn new<S: 'static>(sample_rate_hz: u32, stream: S) -> Self {
        Self {
            sample_rate_hz,
            _stream: Box::new(stream),
        }
    }
}

pub trait BlockSource {
    fn open(&mut self, blocks: BlockSender) -> Result<ActiveSource>;
}

/// One recording: resampled chunks in capture order.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    sample_rate_in: u32,
    sample_rate_out: u32,
    chunks: Vec<Vec<f32>>,
    blocks_received: u64,
}

impl CaptureSession {
    pub fn new(sample_rate_in: u32, sample_rate_out: u32) -> Self {
        Self {
            sample_rate_in,
            sample_rate_out,
            chunks: Vec::new(),
            blocks_received: 0,
        }
    }

    pub fn sample_rate_in(&self) -> u32 {
        self.sample_rate_in
    }

    pub fn sample_rate_out(&self) -> u32 {
        self.sample_rate_out
    }

    pub fn blocks_received(&self) -> u64 {
        self.blocks_received
    }

    pub fn chunks(&self) -> &[Vec<f32>] {
        &self.chunks
    }

    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Resamples one captured block and appends it. Returns the number of
    /// samples added.
    pub fn on_block(&mut self, samples: &[f32], native_rate: u32) -> Result<usize> {
        let resampled = resample_linear(samples, native_rate, self.sample_rate_out)?;
        self.blocks_received += 1;
        let added = resampled.len();
        if added > 0 {
            self.chunks.push(resampled);
        }
        Ok(added)
    }

    pub fn into_samples(self) -> Vec<f32> {
        let mut merged = Vec::with_capacity(self.sample_count());
        for chunk in self.chunks {
            merged.extend_from_slice(&chunk);
        }
        merged
    }

    pub fn encode(self) -> Result<EncodedAudio> {
        let sample_rate_out = self.sample_rate_out;
        let samples = self.into_samples();
        if samples.is_empty() {
            return Err(CaptureError::EmptyRecording);
        }
        encode_wav_pcm16_mono(&samples, sample_rate_out)
    }
}

#[derive(Debug, Clone)]
pub struct Recording {
    pub audio: EncodedAudio,
    pub blocks_received: u64,
    pub blocks_dropped: u64,
}

enum Worker {
    Running(JoinHandle<Result<CaptureSession>>),
    /// The source closed its sender on its own; the session waits for `stop`.
    Finished(CaptureSession),
}

impl Worker {
    fn is_done(&self) -> bool {
        match self {
            Worker::Running(handle) => handle.is_finished(),
            Worker::Finished(_) => false,
        }
    }

    fn join_session(self) -> Result<CaptureSession> {
        match self {
            Worker::Running(handle) => handle
                .join()
                .map_err(|_| CaptureError::Stream("capture worker panicked".to_string()))?,
            Worker::Finished(session) => Ok(session),
        }
    }
}

struct ActiveRecording {
    source: ActiveSource,
    worker: Worker,
    dropped: Arc<AtomicU64>,
}

pub struct AudioCapture<S: BlockSource> {
    source: S,
    state: CaptureState,
    target_rate_hz: u32,
    channel_capacity: usize,
    active: Option<ActiveRecording>,
}

impl<S: BlockSource> AudioCapture<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: CaptureState::Idle,
            target_rate_hz: SAMPLE_RATE_HZ,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            active: None,
        }
    }

    pub fn with_settings(source: S, settings: &CaptureSettings) -> Self {
        let mut capture = Self::new(source);
        capture.channel_capacity = settings.channel_capacity;
        capture
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let (sender, receiver, dropped) = block_channel(self.channel_capacity);
        let source = self.source.open(sender)?;
        let native_rate = source.sample_rate_hz;
        if native_rate == 0 {
            return Err(CaptureError::InvalidSampleRate(native_rate));
        }

        let session = CaptureSession::new(native_rate, self.target_rate_hz);
        let worker = thread::Builder::new()
            .name("capture-worker".to_string())
            .spawn(move || consume_blocks(receiver, session))?;

        self.active = Some(ActiveRecording {
            source,
            worker: Worker::Running(worker),
            dropped,
        });
        self.state = CaptureState::Recording;
        log::info!("recording started at {native_rate} Hz");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<Recording> {
        let active = self.active.take().ok_or(CaptureError::NotRecording)?;
        self.state = CaptureState::Finalizing;
        let result = finalize(active);
        self.state = CaptureState::Idle;

        match &result {
            Ok(recording) => log::info!(
                "recording stopped: {} samples, {} blocks, {} dropped",
                recording.audio.sample_count(),
                recording.blocks_received,
                recording.blocks_dropped
            ),
            Err(error) => log::warn!("recording failed: {error}"),
        }
        result
    }

    /// Discards the running session without encoding it.
    pub fn cancel(&mut self) -> Result<()> {
        let active = self.active.take().ok_or(CaptureError::NotRecording)?;
        let ActiveRecording { source, worker, .. } = active;
        drop(source);
        if let Err(error) = worker.join_session() {
            log::warn!("cancelled recording had already failed: {error}");
        }
        self.state = CaptureState::Idle;
        log::info!("recording cancelled");
        Ok(())
    }

    /// Surfaces a block-processing failure while still recording. A failed
    /// session is torn down and the capture returns to `Idle`. A worker that
    /// finished cleanly keeps its session for `stop`.
    pub fn check(&mut self) -> Result<()> {
        let done = self
            .active
            .as_ref()
            .is_some_and(|active| active.worker.is_done());
        if !done {
            return Ok(());
        }
        let Some(ActiveRecording {
            source,
            worker,
            dropped,
        }) = self.active.take()
        else {
            return Ok(());
        };

        match worker.join_session() {
            Ok(session) => {
                log::info!(
                    "capture source closed after {} blocks; waiting for stop",
                    session.blocks_received()
                );
                self.active = Some(ActiveRecording {
                    source,
                    worker: Worker::Finished(session),
                    dropped,
                });
                Ok(())
            }
            Err(error) => {
                drop(source);
                self.state = CaptureState::Idle;
                log::warn!("recording aborted: {error}");
                Err(error)
            }
        }
    }
}

impl<S: BlockSource> Drop for AudioCapture<S> {
    fn drop(&mut self) {
        if self.active.is_some() {
            let _ = self.cancel();
        }
    }
}

fn consume_blocks(receiver: Receiver<Vec<f32>>, mut session: CaptureSession) -> Result<CaptureSession> {
    let native_rate = session.sample_rate_in();
    for block in receiver {
        session.on_block(&block, native_rate)?;
    }
    Ok(session)
}

fn finalize(active: ActiveRecording) -> Result<Recording> {
    let ActiveRecording {
        source,
        worker,
        dropped,
    } = active;
    drop(source);

    let session = worker.join_session()?;
    let blocks_received = session.blocks_received();
    let audio = session.encode()?;

    Ok(Recording {
        audio,
        blocks_received,
        blocks_dropped: dropped.load(Ordering::Relaxed),
    })
}

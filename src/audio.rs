pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const CHANNELS: u16 = 1;
pub const DEFAULT_BLOCK_FRAMES: usize = 4_096;

use crate::capture::BlockSender;
use crate::error::{CaptureError, Result};

#[cfg(feature = "desktop")]
use crate::capture::{ActiveSource, BlockSource};
#[cfg(feature = "desktop")]
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
#[cfg(feature = "desktop")]
use cpal::{SampleFormat, Stream};
#[cfg(feature = "desktop")]
use serde::Serialize;

pub fn validate_audio_format(sample_rate_hz: u32, channels: u16) -> Result<()> {
    if sample_rate_hz != SAMPLE_RATE_HZ {
        return Err(CaptureError::InvalidWav(format!(
            "invalid sample rate: expected {SAMPLE_RATE_HZ}, got {sample_rate_hz}"
        )));
    }
    if channels != CHANNELS {
        return Err(CaptureError::InvalidWav(format!(
            "invalid channel count: expected {CHANNELS}, got {channels}"
        )));
    }
    Ok(())
}

pub fn pcm_i16_to_f32(samples: &[i16]) -> Vec<f32> {
    const SCALE: f32 = i16::MAX as f32;
    samples
        .iter()
        .map(|sample| f32::from(*sample) / SCALE)
        .collect()
}

pub fn interleaved_f32_to_mono(input: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return input.to_vec();
    }

    let mut output = Vec::with_capacity(input.len() / channels);
    for frame in input.chunks_exact(channels) {
        let sum = frame.iter().copied().sum::<f32>();
        output.push(sum / channels as f32);
    }
    output
}

pub fn interleaved_i16_to_mono(input: &[i16], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return pcm_i16_to_f32(input);
    }

    let scale = i16::MAX as f32;
    let mut output = Vec::with_capacity(input.len() / channels);
    for frame in input.chunks_exact(channels) {
        let mut sum = 0f32;
        for sample in frame {
            sum += *sample as f32 / scale;
        }
        output.push(sum / channels as f32);
    }
    output
}

pub fn interleaved_u16_to_mono(input: &[u16], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return input
            .iter()
            .map(|sample| (*sample as f32 / u16::MAX as f32) * 2.0 - 1.0)
            .collect();
    }

    let mut output = Vec::with_capacity(input.len() / channels);
    for frame in input.chunks_exact(channels) {
        let mut sum = 0f32;
        for sample in frame {
            sum += (*sample as f32 / u16::MAX as f32) * 2.0 - 1.0;
        }
        output.push(sum / channels as f32);
    }
    output
}

/// Regroups whatever the host hands the input callback into blocks of exactly
/// `block_frames` mono samples before they are queued. A trailing partial
/// block is discarded when the stream is dropped.
pub struct BlockAssembler {
    block_frames: usize,
    pending: Vec<f32>,
    sender: BlockSender,
}

impl BlockAssembler {
    pub fn new(block_frames: usize, sender: BlockSender) -> Self {
        let block_frames = block_frames.max(1);
        Self {
            block_frames,
            pending: Vec::with_capacity(block_frames * 2),
            sender,
        }
    }

    pub fn push(&mut self, mono: &[f32]) {
        self.pending.extend_from_slice(mono);
        while self.pending.len() >= self.block_frames {
            let rest = self.pending.split_off(self.block_frames);
            let block = std::mem::replace(&mut self.pending, rest);
            self.sender.push(block);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(feature = "desktop")]
#[derive(Debug, Clone, Serialize)]
pub struct InputMicrophone {
    pub id: String,
    pub label: String,
    pub is_default: bool,
}

#[cfg(feature = "desktop")]
pub struct LiveInputStream {
    pub stream: Stream,
    pub sample_rate_hz: u32,
}

/// The platform microphone as a [`BlockSource`].
#[cfg(feature = "desktop")]
#[derive(Debug, Clone)]
pub struct MicrophoneSource {
    microphone_id: Option<String>,
    block_frames: usize,
}

#[cfg(feature = "desktop")]
impl MicrophoneSource {
    pub fn new(microphone_id: Option<String>, block_frames: usize) -> Self {
        Self {
            microphone_id,
            block_frames,
        }
    }
}

#[cfg(feature = "desktop")]
impl BlockSource for MicrophoneSource {
    fn open(&mut self, blocks: BlockSender) -> Result<ActiveSource> {
        let live =
            build_live_input_stream(self.microphone_id.as_deref(), self.block_frames, blocks)?;
        log::info!(
            "microphone stream opened at {} Hz with {}-frame blocks",
            live.sample_rate_hz,
            self.block_frames
        );
        Ok(ActiveSource::new(live.sample_rate_hz, live.stream))
    }
}

#[cfg(feature = "desktop")]
pub fn list_input_microphones() -> Result<Vec<InputMicrophone>> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|device| device.name().ok());
    let devices = host
        .input_devices()
        .map_err(|error| CaptureError::Stream(format!("failed to enumerate input devices: {error}")))?;

    let mut microphones = Vec::new();
    for (index, device) in devices.enumerate() {
        let label = device
            .name()
            .unwrap_or_else(|_| format!("Microphone {}", index + 1));
        let is_default = default_name.as_deref() == Some(label.as_str());
        microphones.push(InputMicrophone {
            id: index.to_string(),
            label,
            is_default,
        });
    }

    Ok(microphones)
}

#[cfg(feature = "desktop")]
pub fn build_live_input_stream(
    microphone_id: Option<&str>,
    block_frames: usize,
    blocks: BlockSender,
) -> Result<LiveInputStream> {
    let host = cpal::default_host();
    let device = resolve_input_device(&host, microphone_id)?;
    let supported = device.default_input_config().map_err(|error| match error {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        cpal::DefaultStreamConfigError::BackendSpecific { err } => {
            classify_backend_error("failed to get default input config", &err.description)
        }
        other => CaptureError::Stream(format!("failed to get default input config: {other}")),
    })?;

    let sample_format = supported.sample_format();
    let stream_config = supported.config();
    let sample_rate_hz = stream_config.sample_rate.0;
    let channels = usize::from(stream_config.channels.max(1));

    let error_callback = move |error| {
        log::error!("live input stream error: {error}");
    };

    let stream = match sample_format {
        SampleFormat::F32 => {
            let mut assembler = BlockAssembler::new(block_frames, blocks);
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _| {
                        assembler.push(&interleaved_f32_to_mono(data, channels));
                    },
                    error_callback,
                    None,
                )
                .map_err(map_build_error)?
        }
        SampleFormat::I16 => {
            let mut assembler = BlockAssembler::new(block_frames, blocks);
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _| {
                        assembler.push(&interleaved_i16_to_mono(data, channels));
                    },
                    error_callback,
                    None,
                )
                .map_err(map_build_error)?
        }
        SampleFormat::U16 => {
            let mut assembler = BlockAssembler::new(block_frames, blocks);
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[u16], _| {
                        assembler.push(&interleaved_u16_to_mono(data, channels));
                    },
                    error_callback,
                    None,
                )
                .map_err(map_build_error)?
        }
        _ => {
            return Err(CaptureError::UnsupportedSampleFormat(format!(
                "{sample_format:?}"
            )));
        }
    };

    stream.play().map_err(|error| match error {
        cpal::PlayStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        cpal::PlayStreamError::BackendSpecific { err } => {
            classify_backend_error("failed to start input stream", &err.description)
        }
        #[allow(unreachable_patterns)]
        other => CaptureError::Stream(format!("failed to start input stream: {other}")),
    })?;

    Ok(LiveInputStream {
        stream,
        sample_rate_hz,
    })
}

#[cfg(feature = "desktop")]
fn map_build_error(error: cpal::BuildStreamError) -> CaptureError {
    match error {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        cpal::BuildStreamError::BackendSpecific { err } => {
            classify_backend_error("failed to build input stream", &err.description)
        }
        other => CaptureError::Stream(format!("failed to build input stream: {other}")),
    }
}

/// Hosts report a refused microphone through backend-specific errors only.
pub fn classify_backend_error(context: &str, description: &str) -> CaptureError {
    let lowered = description.to_lowercase();
    let denied = ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|marker| lowered.contains(marker));
    if denied {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Stream(format!("{context}: {description}"))
    }
}

#[cfg(feature = "desktop")]
fn resolve_input_device(host: &cpal::Host, microphone_id: Option<&str>) -> Result<cpal::Device> {
    if let Some(raw_id) = microphone_id {
        let trimmed = raw_id.trim();
        if !trimmed.is_empty() {
            let index = trimmed
                .parse::<usize>()
                .map_err(|_| CaptureError::Settings(format!("invalid microphone id: {trimmed}")))?;
            let devices = host
                .input_devices()
                .map_err(|error| {
                    CaptureError::Stream(format!("failed to enumerate input devices: {error}"))
                })?
                .collect::<Vec<_>>();
            if let Some(device) = devices.into_iter().nth(index) {
                return Ok(device);
            }
            log::warn!("microphone not found for id {trimmed}");
            return Err(CaptureError::DeviceUnavailable);
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    host.input_devices()
        .map_err(|error| CaptureError::Stream(format!("failed to enumerate input devices: {error}")))?
        .next()
        .ok_or(CaptureError::DeviceUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::block_channel;

    #[test]
    fn validates_target_audio_format() {
        assert!(validate_audio_format(16_000, 1).is_ok());
        assert!(validate_audio_format(48_000, 1).is_err());
        assert!(validate_audio_format(16_000, 2).is_err());
    }

    #[test]
    fn converts_pcm_i16_to_float_range() {
        let output = pcm_i16_to_f32(&[i16::MIN, 0, i16::MAX]);
        assert_eq!(output.len(), 3);
        assert!(output[0] < 0.0);
        assert_eq!(output[1], 0.0);
        assert!(output[2] > 0.99);
    }

    #[test]
    fn averages_interleaved_f32_channels_to_mono() {
        let stereo = vec![0.2_f32, 0.6_f32, -0.2_f32, 0.2_f32];
        let mono = interleaved_f32_to_mono(&stereo, 2);
        assert_eq!(mono, vec![0.4_f32, 0.0_f32]);
    }

    #[test]
    fn maps_u16_extremes_to_unit_range() {
        let mono = interleaved_u16_to_mono(&[0, u16::MAX], 1);
        assert_eq!(mono, vec![-1.0, 1.0]);
    }

    #[test]
    fn assembles_fixed_size_blocks() {
        let (sender, receiver, _dropped) = block_channel(8);
        let mut assembler = BlockAssembler::new(4, sender);

        assembler.push(&[0.1, 0.2, 0.3]);
        assert!(receiver.try_recv().is_err());

        assembler.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(receiver.try_recv().expect("first block"), vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(receiver.try_recv().expect("second block"), vec![0.5, 0.6, 0.7, 0.8]);
        assert!(receiver.try_recv().is_err());
        assert_eq!(assembler.pending_len(), 1);
    }

    #[test]
    fn recognises_permission_failures() {
        assert!(matches!(
            classify_backend_error("open", "Access Denied by user"),
            CaptureError::PermissionDenied
        ));
        assert!(matches!(
            classify_backend_error("open", "device busy"),
            CaptureError::Stream(_)
        ));
    }
}

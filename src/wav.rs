use std::fs;
use std::io::Cursor;
use std::path::Path;

use crate::audio::{validate_audio_format, CHANNELS};
use crate::error::{CaptureError, Result};

pub const WAV_MIME_TYPE: &str = "audio/wav";
pub const WAV_HEADER_LEN: usize = 44;
pub const BITS_PER_SAMPLE: u16 = 16;

/// A finished mono PCM16 WAV file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    bytes: Vec<u8>,
    sample_rate_hz: u32,
    sample_count: usize,
}

impl EncodedAudio {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        WAV_MIME_TYPE
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn duration_secs(&self) -> f64 {
        self.sample_count as f64 / f64::from(self.sample_rate_hz)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.bytes)?;
        Ok(())
    }

    /// Loads a WAV file from disk, accepting only the mono 16-bit PCM layout
    /// produced by [`encode_wav_pcm16_mono`].
    pub fn read_from(path: &Path) -> Result<Self> {
        Self::from_wav_bytes(fs::read(path)?)
    }

    pub fn from_wav_bytes(bytes: Vec<u8>) -> Result<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes.as_slice()))?;
        let spec = reader.spec();
        validate_audio_format(spec.sample_rate, spec.channels)?;
        if spec.bits_per_sample != BITS_PER_SAMPLE || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(CaptureError::InvalidWav(format!(
                "expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        let sample_count = reader.len() as usize;
        Ok(Self {
            bytes,
            sample_rate_hz: spec.sample_rate,
            sample_count,
        })
    }
}

/// Maps a float amplitude onto the signed 16-bit range. Negative values use
/// the full 32768 step range, non-negative values stop at 32767.
pub fn quantize_sample(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32_768.0) as i16
    } else {
        (clamped * 32_767.0) as i16
    }
}

pub fn dequantize_sample(sample: i16) -> f32 {
    if sample < 0 {
        f32::from(sample) / 32_768.0
    } else {
        f32::from(sample) / 32_767.0
    }
}

pub fn encode_wav_pcm16_mono(samples: &[f32], sample_rate_hz: u32) -> Result<EncodedAudio> {
    if samples.is_empty() {
        return Err(CaptureError::EmptyRecording);
    }
    if sample_rate_hz == 0 {
        return Err(CaptureError::InvalidSampleRate(sample_rate_hz));
    }

    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: sample_rate_hz,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in samples {
            writer.write_sample(quantize_sample(*sample))?;
        }
        writer.finalize()?;
    }

    let bytes = cursor.into_inner();
    debug_assert_eq!(bytes.len(), WAV_HEADER_LEN + samples.len() * 2);

    Ok(EncodedAudio {
        bytes,
        sample_rate_hz,
        sample_count: samples.len(),
    })
}

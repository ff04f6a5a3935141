use serde::{Deserialize, Serialize};

use crate::audio::DEFAULT_BLOCK_FRAMES;
use crate::capture::DEFAULT_CHANNEL_CAPACITY;
use crate::error::{CaptureError, Result};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const MIN_BLOCK_FRAMES: usize = 256;
pub const MAX_BLOCK_FRAMES: usize = 16_384;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VttBackend {
    Auto,
    TorchaudioW2v2,
    CtcBilstm,
}

impl VttBackend {
    pub fn as_form_value(self) -> &'static str {
        match self {
            VttBackend::Auto => "auto",
            VttBackend::TorchaudioW2v2 => "torchaudio_w2v2",
            VttBackend::CtcBilstm => "ctc_bilstm",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureSettings {
    #[serde(default)]
    pub microphone_id: Option<String>,
    #[serde(default = "default_block_frames")]
    pub block_frames: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,
    #[serde(default)]
    pub whisper_language: Option<String>,
    #[serde(default = "default_vtt_backend")]
    pub vtt_backend: VttBackend,
    #[serde(default = "default_return_phonemes")]
    pub return_phonemes: bool,
}

fn default_block_frames() -> usize {
    DEFAULT_BLOCK_FRAMES
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_whisper_model() -> String {
    "small".to_string()
}

fn default_vtt_backend() -> VttBackend {
    VttBackend::Auto
}

fn default_return_phonemes() -> bool {
    true
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            microphone_id: None,
            block_frames: default_block_frames(),
            channel_capacity: default_channel_capacity(),
            backend_url: default_backend_url(),
            whisper_model: default_whisper_model(),
            whisper_language: None,
            vtt_backend: default_vtt_backend(),
            return_phonemes: default_return_phonemes(),
        }
    }
}

impl CaptureSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.block_frames.is_power_of_two()
            || !(MIN_BLOCK_FRAMES..=MAX_BLOCK_FRAMES).contains(&self.block_frames)
        {
            return Err(CaptureError::Settings(format!(
                "block_frames must be a power of two between {MIN_BLOCK_FRAMES} and {MAX_BLOCK_FRAMES}, got {}",
                self.block_frames
            )));
        }
        if self.channel_capacity == 0 {
            return Err(CaptureError::Settings(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.backend_url.trim().is_empty() {
            return Err(CaptureError::Settings("backend_url is empty".to_string()));
        }
        if self.whisper_model.trim().is_empty() {
            return Err(CaptureError::Settings("whisper_model is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_voice_panel() {
        let settings = CaptureSettings::default();
        assert!(settings.microphone_id.is_none());
        assert_eq!(settings.block_frames, 4_096);
        assert_eq!(settings.channel_capacity, 32);
        assert_eq!(settings.backend_url, "http://localhost:8000");
        assert_eq!(settings.whisper_model, "small");
        assert!(settings.whisper_language.is_none());
        assert_eq!(settings.vtt_backend, VttBackend::Auto);
        assert!(settings.return_phonemes);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let json = r#"{
  "microphone_id": "2",
  "vtt_backend": "ctc_bilstm"
}"#;

        let parsed: CaptureSettings =
            serde_json::from_str(json).expect("partial settings payload should deserialize");
        assert_eq!(parsed.microphone_id.as_deref(), Some("2"));
        assert_eq!(parsed.vtt_backend, VttBackend::CtcBilstm);
        assert_eq!(parsed.block_frames, 4_096);
        assert_eq!(parsed.backend_url, "http://localhost:8000");
        assert!(parsed.return_phonemes);
    }

    #[test]
    fn rejects_block_sizes_outside_power_of_two_range() {
        for block_frames in [0_usize, 100, 3_000, 128, 32_768] {
            let settings = CaptureSettings {
                block_frames,
                ..CaptureSettings::default()
            };
            assert!(settings.validate().is_err(), "{block_frames} should be rejected");
        }

        let settings = CaptureSettings {
            block_frames: 2_048,
            ..CaptureSettings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_zero_channel_capacity() {
        let settings = CaptureSettings {
            channel_capacity: 0,
            ..CaptureSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn backend_form_values_match_endpoint() {
        assert_eq!(VttBackend::Auto.as_form_value(), "auto");
        assert_eq!(VttBackend::TorchaudioW2v2.as_form_value(), "torchaudio_w2v2");
        assert_eq!(VttBackend::CtcBilstm.as_form_value(), "ctc_bilstm");
    }
}

use crate::config::{CaptureSettings, VttBackend};
use crate::error::{CaptureError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "voice-capture";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureSettingsPatch {
    pub microphone_id: Option<Option<String>>,
    pub block_frames: Option<usize>,
    pub backend_url: Option<String>,
    pub whisper_model: Option<String>,
    pub whisper_language: Option<Option<String>>,
    pub vtt_backend: Option<VttBackend>,
    pub return_phonemes: Option<bool>,
}

pub fn app_config_dir() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join(APP_DIR_NAME)
}

pub fn default_settings_path() -> PathBuf {
    app_config_dir().join("settings.json")
}

pub fn load_or_default(path: &Path) -> CaptureSettings {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<CaptureSettings>(&contents) {
            Ok(settings) => settings,
            Err(error) => {
                log::warn!("ignoring unreadable settings at {}: {error}", path.display());
                CaptureSettings::default()
            }
        },
        Err(_) => CaptureSettings::default(),
    }
}

pub fn save(path: &Path, settings: &CaptureSettings) -> Result<()> {
    settings.validate()?;
    let parent = path
        .parent()
        .ok_or_else(|| CaptureError::Settings("settings path has no parent directory".to_string()))?;
    fs::create_dir_all(parent)?;
    let contents = serde_json::to_string_pretty(settings)
        .map_err(|error| CaptureError::Settings(error.to_string()))?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn apply_patch(settings: &CaptureSettings, patch: CaptureSettingsPatch) -> CaptureSettings {
    CaptureSettings {
        microphone_id: patch
            .microphone_id
            .map(normalize_optional)
            .unwrap_or_else(|| settings.microphone_id.clone()),
        block_frames: patch.block_frames.unwrap_or(settings.block_frames),
        channel_capacity: settings.channel_capacity,
        backend_url: patch
            .backend_url
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| settings.backend_url.clone()),
        whisper_model: patch
            .whisper_model
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| settings.whisper_model.clone()),
        whisper_language: patch
            .whisper_language
            .map(normalize_optional)
            .unwrap_or_else(|| settings.whisper_language.clone()),
        vtt_backend: patch.vtt_backend.unwrap_or(settings.vtt_backend),
        return_phonemes: patch.return_phonemes.unwrap_or(settings.return_phonemes),
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{CaptureSettings, VttBackend};
use crate::error::{CaptureError, Result};
use crate::wav::EncodedAudio;

pub const RECORDING_FILE_NAME: &str = "recording.wav";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperTranscript {
    pub text: Option<String>,
    #[serde(default)]
    pub segments: Vec<WhisperSegment>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub sampling_rate: Option<u32>,
    pub duration_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhonemeSpan {
    pub phoneme: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VttTranscript {
    pub backend_used: String,
    pub sampling_rate: u32,
    pub duration_sec: f64,
    pub text: Option<String>,
    pub phonemes: Option<Vec<String>>,
    pub phoneme_spans: Option<Vec<PhonemeSpan>>,
    pub weights: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhisperOptions {
    pub model: String,
    pub language: Option<String>,
}

impl Default for WhisperOptions {
    fn default() -> Self {
        Self {
            model: "small".to_string(),
            language: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VttOptions {
    pub backend: VttBackend,
    pub return_phonemes: bool,
}

impl Default for VttOptions {
    fn default() -> Self {
        Self {
            backend: VttBackend::Auto,
            return_phonemes: true,
        }
    }
}

/// One audio file as it goes over the wire. The backend decodes and
/// resamples uploads itself, so any container it understands is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUpload {
    bytes: Vec<u8>,
    file_name: String,
    mime_type: String,
}

impl AudioUpload {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| RECORDING_FILE_NAME.to_string());
        Ok(Self::new(bytes, file_name, guess_audio_mime(path)))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl From<&EncodedAudio> for AudioUpload {
    fn from(audio: &EncodedAudio) -> Self {
        Self::new(audio.bytes().to_vec(), RECORDING_FILE_NAME, audio.mime_type())
    }
}

pub fn guess_audio_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "wav" | "wave" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}

/// Blocking client for the backend's voice-to-text endpoints.
#[derive(Debug, Clone)]
pub struct TranscriptionClient {
    base_url: String,
    http: Client,
}

impl TranscriptionClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_settings(settings: &CaptureSettings) -> Result<Self> {
        Self::new(&settings.backend_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn transcribe_whisper(
        &self,
        audio: &AudioUpload,
        options: &WhisperOptions,
    ) -> Result<WhisperTranscript> {
        let mut form = Form::new()
            .part("audio", audio_part(audio)?)
            .text("whisper_model", options.model.clone());
        if let Some(language) = &options.language {
            form = form.text("whisper_language", language.clone());
        }

        log::debug!(
            "uploading {} bytes to {}",
            audio.bytes().len(),
            self.endpoint("vts_whisper")
        );
        let response = self
            .http
            .post(self.endpoint("vts_whisper"))
            .multipart(form)
            .send()?;
        parse_json(response)
    }

    pub fn voice_to_text(&self, audio: &AudioUpload, options: &VttOptions) -> Result<VttTranscript> {
        let form = Form::new()
            .part("audio", audio_part(audio)?)
            .text("backend", options.backend.as_form_value())
            .text("return_phonemes", options.return_phonemes.to_string());

        log::debug!(
            "uploading {} bytes to {}",
            audio.bytes().len(),
            self.endpoint("generate/vtt")
        );
        let response = self
            .http
            .post(self.endpoint("generate/vtt"))
            .multipart(form)
            .send()?;
        parse_json(response)
    }
}

impl WhisperOptions {
    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self {
            model: settings.whisper_model.clone(),
            language: settings.whisper_language.clone(),
        }
    }
}

impl VttOptions {
    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self {
            backend: settings.vtt_backend,
            return_phonemes: settings.return_phonemes,
        }
    }
}

fn audio_part(audio: &AudioUpload) -> Result<Part> {
    let part = Part::bytes(audio.bytes().to_vec())
        .file_name(audio.file_name().to_string())
        .mime_str(audio.mime_type())?;
    Ok(part)
}

fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(CaptureError::Backend {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>()?)
}

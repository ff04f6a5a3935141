use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("microphone access was denied")]
    PermissionDenied,

    #[error("no audio input device is available")]
    DeviceUnavailable,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording is in progress")]
    NotRecording,

    #[error("recording captured no audio")]
    EmptyRecording,

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("unsupported input sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("invalid wav data: {0}")]
    InvalidWav(String),

    #[error("wav encoding error: {0}")]
    Encode(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("settings error: {0}")]
    Settings(String),
}

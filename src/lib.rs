pub mod audio;
pub mod capture;
#[cfg(feature = "desktop")]
pub mod cli;
pub mod config;
pub mod error;
pub mod postprocess;
pub mod resample;
pub mod runtime_log;
pub mod settings_store;
pub mod transcription;
pub mod wav;

pub use capture::{AudioCapture, BlockSource, CaptureSession, CaptureState, Recording};
pub use error::{CaptureError, Result};
pub use transcription::{AudioUpload, TranscriptionClient};
pub use wav::{encode_wav_pcm16_mono, EncodedAudio};

#[cfg(feature = "desktop")]
use clap::Parser;
use std::process::ExitCode;

#[cfg(feature = "desktop")]
pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(settings_store::default_settings_path);
    let logs_path = runtime_log::default_log_path();

    match cli::execute(cli.command, &settings_path, &logs_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            runtime_log::record(&logs_path, "error", "app.error", &error.to_string());
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "desktop"))]
pub fn run() -> ExitCode {
    env_logger::init();
    log::error!("voice-capture was built without the `desktop` feature; no audio device support");
    ExitCode::FAILURE
}

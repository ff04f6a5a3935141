use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use crate::audio::{list_input_microphones, MicrophoneSource};
use crate::capture::{AudioCapture, Recording};
use crate::config::{CaptureSettings, VttBackend};
use crate::error::Result;
use crate::postprocess::{clean_transcribed_text, display_or_dash, format_phoneme_spans};
use crate::runtime_log as log_store;
use crate::settings_store::{self, CaptureSettingsPatch};
use crate::transcription::{AudioUpload, TranscriptionClient, VttOptions, WhisperOptions};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "voice-capture", version, about = "Record the microphone to 16 kHz WAV and transcribe it")]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List input microphones
    Devices,
    /// Record until Enter is pressed (or for a fixed duration)
    Record {
        #[arg(short, long, default_value = "recording.wav")]
        output: PathBuf,
        /// Stop automatically after this many seconds
        #[arg(long)]
        seconds: Option<f64>,
        /// Upload the recording once it is written
        #[arg(long)]
        transcribe: bool,
    },
    /// Upload an existing audio file (wav, mp3, m4a, ...)
    Transcribe { path: PathBuf },
    /// Show or clear the runtime log
    Logs {
        #[arg(long, default_value_t = 40)]
        limit: usize,
        #[arg(long)]
        clear: bool,
    },
    /// Show or update persisted settings
    Settings {
        #[arg(long)]
        backend_url: Option<String>,
        /// Microphone id from `devices`; pass an empty string for the default device
        #[arg(long)]
        microphone: Option<String>,
        #[arg(long)]
        block_frames: Option<usize>,
        #[arg(long)]
        whisper_model: Option<String>,
        #[arg(long)]
        whisper_language: Option<String>,
        #[arg(long, value_parser = parse_vtt_backend)]
        vtt_backend: Option<VttBackend>,
        /// Ask the voice-to-text endpoint for phoneme output
        #[arg(long)]
        return_phonemes: Option<bool>,
    },
}

fn parse_vtt_backend(value: &str) -> std::result::Result<VttBackend, String> {
    match value {
        "auto" => Ok(VttBackend::Auto),
        "torchaudio_w2v2" => Ok(VttBackend::TorchaudioW2v2),
        "ctc_bilstm" => Ok(VttBackend::CtcBilstm),
        other => Err(format!(
            "unknown backend {other}; expected auto, torchaudio_w2v2 or ctc_bilstm"
        )),
    }
}

pub fn execute(command: Command, settings_path: &Path, logs_path: &Path) -> Result<()> {
    let settings = settings_store::load_or_default(settings_path);

    match command {
        Command::Devices => {
            for microphone in list_input_microphones()? {
                let marker = if microphone.is_default { " (default)" } else { "" };
                println!("{}: {}{}", microphone.id, microphone.label, marker);
            }
            Ok(())
        }
        Command::Record {
            output,
            seconds,
            transcribe,
        } => {
            settings.validate()?;
            let recording = record(&settings, seconds, logs_path)?;
            recording.audio.write_to(&output)?;
            println!(
                "wrote {} ({:.2}s, {} bytes)",
                output.display(),
                recording.audio.duration_secs(),
                recording.audio.bytes().len()
            );
            if transcribe {
                transcribe_audio(&settings, &AudioUpload::from(&recording.audio), logs_path)?;
            }
            Ok(())
        }
        Command::Transcribe { path } => {
            let audio = AudioUpload::read_file(&path)?;
            transcribe_audio(&settings, &audio, logs_path)
        }
        Command::Logs { limit, clear } => {
            if clear {
                log_store::clear(logs_path)?;
                println!("runtime log cleared");
                return Ok(());
            }
            for line in log_store::read_recent(logs_path, limit.clamp(1, 200))? {
                match log_store::parse_entry(&line) {
                    Some(entry) => println!(
                        "{} {:<5} {} {}",
                        entry.timestamp_unix_ms, entry.level, entry.event, entry.message
                    ),
                    None => println!("{line}"),
                }
            }
            Ok(())
        }
        Command::Settings {
            backend_url,
            microphone,
            block_frames,
            whisper_model,
            whisper_language,
            vtt_backend,
            return_phonemes,
        } => {
            let patch = CaptureSettingsPatch {
                microphone_id: microphone.map(Some),
                block_frames,
                backend_url,
                whisper_model,
                whisper_language: whisper_language.map(Some),
                vtt_backend,
                return_phonemes,
            };
            let changed = patch != CaptureSettingsPatch::default();
            let current = if changed {
                let updated = settings_store::apply_patch(&settings, patch);
                settings_store::save(settings_path, &updated)?;
                log_store::record(logs_path, "info", "settings.update", "updated capture settings");
                updated
            } else {
                settings
            };
            let rendered = serde_json::to_string_pretty(&current)
                .map_err(|error| crate::error::CaptureError::Settings(error.to_string()))?;
            println!("{rendered}");
            Ok(())
        }
    }
}

fn record(settings: &CaptureSettings, seconds: Option<f64>, logs_path: &Path) -> Result<Recording> {
    let source = MicrophoneSource::new(settings.microphone_id.clone(), settings.block_frames);
    let mut capture = AudioCapture::with_settings(source, settings);

    if let Err(error) = capture.start() {
        log_store::record(logs_path, "error", "capture.error", &error.to_string());
        return Err(error);
    }
    log_store::record(logs_path, "info", "capture.start", "recording started");

    let deadline = seconds
        .filter(|value| value.is_finite() && *value > 0.0)
        .map(|value| Instant::now() + Duration::from_secs_f64(value));
    match deadline {
        Some(_) => println!("recording... (press Enter to stop early)"),
        None => println!("recording... (press Enter to stop)"),
    }

    let enter = spawn_enter_listener();
    loop {
        if let Err(error) = capture.check() {
            log_store::record(logs_path, "error", "capture.error", &error.to_string());
            return Err(error);
        }
        if enter.try_recv().is_ok() {
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    match capture.stop() {
        Ok(recording) => {
            log_store::record(
                logs_path,
                if recording.blocks_dropped > 0 { "warn" } else { "info" },
                "capture.stop",
                &format!(
                    "samples={} blocks={} dropped={}",
                    recording.audio.sample_count(),
                    recording.blocks_received,
                    recording.blocks_dropped
                ),
            );
            Ok(recording)
        }
        Err(error) => {
            log_store::record(logs_path, "error", "capture.error", &error.to_string());
            Err(error)
        }
    }
}

fn spawn_enter_listener() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_ok() {
            let _ = tx.send(());
        }
    });
    rx
}

fn transcribe_audio(settings: &CaptureSettings, audio: &AudioUpload, logs_path: &Path) -> Result<()> {
    let client = TranscriptionClient::from_settings(settings)?;
    log_store::record(
        logs_path,
        "info",
        "transcribe.upload",
        &format!(
            "{} ({} bytes) to {}",
            audio.file_name(),
            audio.bytes().len(),
            client.base_url()
        ),
    );

    let vtt = client.voice_to_text(audio, &VttOptions::from_settings(settings));
    let whisper = client.transcribe_whisper(audio, &WhisperOptions::from_settings(settings));

    match &vtt {
        Ok(transcript) => {
            println!(
                "Backend: {} | SR: {} | Duration: {:.2}s",
                transcript.backend_used, transcript.sampling_rate, transcript.duration_sec
            );
            println!(
                "Text: {}",
                display_or_dash(transcript.text.as_deref().unwrap_or_default())
            );
            if let Some(phonemes) = transcript.phonemes.as_ref().filter(|list| !list.is_empty()) {
                println!("Phonemes: {}", phonemes.join(" "));
            }
            if let Some(spans) = transcript.phoneme_spans.as_ref() {
                for line in format_phoneme_spans(spans) {
                    println!("  {line}");
                }
            }
        }
        Err(error) => {
            log_store::record(logs_path, "error", "transcribe.vtt", &error.to_string());
        }
    }

    match &whisper {
        Ok(transcript) => {
            let cleaned = clean_transcribed_text(transcript.text.as_deref());
            println!("Whisper: {}", display_or_dash(&cleaned));
            log_store::record(
                logs_path,
                "info",
                "transcribe.whisper",
                &format!("text length={}", cleaned.len()),
            );
        }
        Err(error) => {
            log_store::record(logs_path, "error", "transcribe.whisper", &error.to_string());
        }
    }

    vtt.and(whisper).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_record_command() {
        let cli = Cli::try_parse_from([
            "voice-capture",
            "record",
            "--output",
            "out.wav",
            "--seconds",
            "2.5",
            "--transcribe",
        ])
        .expect("record args should parse");

        match cli.command {
            Command::Record {
                output,
                seconds,
                transcribe,
            } => {
                assert_eq!(output, PathBuf::from("out.wav"));
                assert_eq!(seconds, Some(2.5));
                assert!(transcribe);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_vtt_backend_names() {
        assert_eq!(parse_vtt_backend("ctc_bilstm"), Ok(VttBackend::CtcBilstm));
        assert!(parse_vtt_backend("wav2vec").is_err());
    }

    #[test]
    fn settings_command_updates_file() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock should be set")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("voice-capture-cli-{nanos}"));
        let settings_path = dir.join("settings.json");
        let logs_path = dir.join("runtime.log");

        let cli = Cli::try_parse_from([
            "voice-capture",
            "settings",
            "--backend-url",
            "http://10.0.0.5:8000/",
            "--vtt-backend",
            "torchaudio_w2v2",
            "--return-phonemes",
            "false",
        ])
        .expect("settings args should parse");
        execute(cli.command, &settings_path, &logs_path).expect("settings should save");

        let saved = settings_store::load_or_default(&settings_path);
        assert_eq!(saved.backend_url, "http://10.0.0.5:8000");
        assert_eq!(saved.vtt_backend, VttBackend::TorchaudioW2v2);
        assert!(!saved.return_phonemes);
        let logged = log_store::read_recent(&logs_path, 5).expect("log should read");
        assert_eq!(logged.len(), 1);

        let _ = std::fs::remove_dir_all(dir);
    }
}

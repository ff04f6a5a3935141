use crate::transcription::PhonemeSpan;

/// Whisper output hyphenates some words; a double hyphen is a pause.
pub fn clean_transcribed_text(input: Option<&str>) -> String {
    input
        .unwrap_or_default()
        .replace("--", " ")
        .replace('-', "")
}

pub fn format_phoneme_spans(spans: &[PhonemeSpan]) -> Vec<String> {
    spans
        .iter()
        .map(|span| format!("{}: {:.3} -> {:.3} sec", span.phoneme, span.start, span.end))
        .collect()
}

/// Placeholder shown when the backend returned no text.
pub fn display_or_dash(text: &str) -> &str {
    if text.trim().is_empty() {
        "—"
    } else {
        text
    }
}

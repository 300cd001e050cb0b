use once_cell::sync::Lazy;
use regex::Regex;

static OCR_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<OCR>\s*(.*?)\s*</OCR>").unwrap());

/// Lines the vision model wraps around the actual transcription. Matching is
/// anchored at line start; anything after the phrase is part of the wrapper.
static META_LINE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^here'?s\s+a\s+text\s+message").unwrap(),
        Regex::new(r"(?i)^the\s+time\s+is\s+").unwrap(),
        Regex::new(r"(?i)^the\s+text\s+message\s+indicates").unwrap(),
    ]
});

/// Pull the transcription out of the raw model output: take the `<OCR>` tag
/// interior when present, strip wrapper quotes and meta-narration lines.
/// Idempotent: re-applying to its own output changes nothing.
pub fn extract_ocr_text(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let normalized = raw.replace("\r\n", "\n");
    let normalized = normalized.trim();

    let inside = match OCR_TAG.captures(normalized) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(normalized),
        None => normalized,
    };

    let dequoted = strip_surrounding_quotes(inside).trim();

    let cleaned: Vec<&str> = dequoted
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return Some("");
            }
            if META_LINE_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
                return None;
            }
            Some(trimmed.trim_matches('"'))
        })
        .collect();

    cleaned.join("\n").trim().to_string()
}

/// Strip exactly one layer of surrounding double quotes, if both are present.
fn strip_surrounding_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text)
}

/// OCR models tend to narrate small/dense UI text instead of transcribing it.
/// Keyword phrases catch the obvious cases; the shape check (single line with
/// digits but no list punctuation) catches the rest.
pub fn is_likely_summary(text: &str) -> bool {
    const TRIGGERS: [&str; 6] = [
        "indicates that",
        "the text message",
        "this message",
        "suggests that",
        "here's a text message",
        "the time is",
    ];

    let lowered = text.to_lowercase();
    if TRIGGERS.iter().any(|phrase| lowered.contains(phrase)) {
        return true;
    }

    let has_line_break = text.contains('\n');
    let has_digits = text.chars().any(|c| c.is_ascii_digit());
    let has_punctuation = text.chars().any(|c| matches!(c, ':' | '：' | ',' | '，'));

    !has_line_break && has_digits && !has_punctuation && text.chars().count() < 180
}

/// A full-screen transcription almost never fits on one short line.
pub fn looks_incomplete(text: &str) -> bool {
    let non_blank_lines = text.lines().filter(|line| !line.trim().is_empty()).count();
    non_blank_lines <= 1 && text.chars().count() < 180
}

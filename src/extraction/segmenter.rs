use once_cell::sync::Lazy;
use regex::Regex;

/// A standalone timestamp line, e.g. "3:21 PM" / "15:21" / "3:21PM". Message
/// list UIs render these between messages, so they separate blocks.
static TIMESTAMP_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(\d{1,2}:\d{2})(\s*[AP]M)?\s*$").unwrap());

/// Some OCR output glues consecutive notifications together with no blank
/// line or timestamp between them. A "you have a ... package" opener marks
/// the start of a new message even mid-block.
static NEW_MESSAGE_OPENER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(you have|you've got|you\s+have\s+an|你有|您有).*(package|parcel|包裹|快递)")
        .unwrap()
});

static DROP_LINE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^here'?s\s+a\s+text\s+message").unwrap(),
        Regex::new(r"(?i)^the\s+time\s+is\s+").unwrap(),
        Regex::new(r"(?i)^this\s+is\s+a\s+text\s+message").unwrap(),
    ]
});

/// Strip wrapper quoting and narration lines the vision model sometimes adds
/// around the transcription. Keeps blank lines, since they separate messages.
fn sanitize_ocr_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    let text = normalized.trim();
    if text.is_empty() {
        return String::new();
    }

    let dequoted = super::strip_surrounding_quotes(text).trim();

    let cleaned: Vec<&str> = dequoted
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return Some("");
            }
            if DROP_LINE_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
                return None;
            }
            Some(trimmed.trim_matches('"'))
        })
        .collect();

    cleaned.join("\n").trim().to_string()
}

/// Partition cleaned OCR text into independent source messages, so fields
/// from one message cannot bleed into a task extracted from another.
///
/// A blank line, a standalone timestamp, or a line containing "SMS" flushes
/// the current block; a new-message opener flushes before appending. With a
/// single block the text passes through unchanged; with several, blocks are
/// reassembled into a labeled document the extraction model can keep apart.
pub fn format_multi_message_input(raw: &str) -> String {
    let text = sanitize_ocr_text(raw);
    if text.is_empty() {
        return String::new();
    }

    let blocks = split_message_blocks(&text);
    if blocks.len() <= 1 {
        return text;
    }

    blocks
        .iter()
        .enumerate()
        .map(|(idx, block)| format!("消息 {}:\n{}", idx + 1, block))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn split_message_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String| {
        let block = current.trim().to_string();
        if !block.is_empty() {
            blocks.push(block);
        }
        current.clear();
    };

    for line in text.lines() {
        let trimmed = line.trim();
        let is_separator = trimmed.is_empty()
            || TIMESTAMP_LINE.is_match(trimmed)
            || trimmed.to_uppercase().contains("SMS");

        if is_separator {
            flush(&mut current);
            continue;
        }

        if !current.is_empty() && NEW_MESSAGE_OPENER.is_match(trimmed) {
            flush(&mut current);
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(trimmed);
    }
    flush(&mut current);

    blocks
}

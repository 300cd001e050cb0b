use once_cell::sync::Lazy;
use regex::Regex;

/// Exact sentinel the analysis model emits when nothing is actionable.
pub const NO_TASK_SENTINEL: &str = "无任务";

/// Courier/locker brands folded into the location field when detected.
pub const CARRIER_BRANDS: [&str; 9] = [
    "顺丰", "丰巢", "菜鸟", "京东", "EMS", "申通", "中通", "圆通", "安能",
];

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^##\s+").unwrap());
static HEADING_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^##\s*").unwrap());
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z0-9_-]*\s*").unwrap());
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```$").unwrap());

static TIME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}[:：]\d{2}").unwrap());
static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{2,}-[0-9A-Za-z-]{2,}|[0-9]{4,}").unwrap());
static CODE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Za-z-]{4,}$").unwrap());

/// Structured fields pulled out of one task block. Any of the three detail
/// fields may be empty when the source text does not mention them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTask {
    pub title: String,
    pub time: String,
    pub location: String,
    pub key_info: String,
}

/// Split the analysis model's output into one raw markdown fragment per task.
///
/// Primary path: `## ` headings start a new block. Older model output had no
/// headings, so blank-line paragraphs are the fallback. The no-task sentinel
/// (alone, or mixed into heading-free output) yields an empty list.
pub fn extract_tasks_from_model_output(raw: &str) -> Vec<String> {
    let normalized = raw.replace("\r\n", "\n");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut stripped = super::strip_surrounding_quotes(normalized).trim();
    for prefix in ["输出：", "Output:", "Task:"] {
        stripped = stripped.strip_prefix(prefix).unwrap_or(stripped);
    }
    let stripped = stripped.trim();

    // Some models wrap the whole answer in a code fence.
    let unfenced = FENCE_OPEN.replace(stripped, "");
    let unfenced = FENCE_CLOSE.replace(&unfenced, "");
    let unfenced = unfenced.trim();
    if unfenced.is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = unfenced
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() == 1 && lines[0] == NO_TASK_SENTINEL {
        return Vec::new();
    }
    if lines.iter().any(|l| *l == NO_TASK_SENTINEL)
        && !lines.iter().any(|l| l.starts_with("## "))
    {
        return Vec::new();
    }

    let starts: Vec<usize> = HEADING.find_iter(unfenced).map(|m| m.start()).collect();
    if !starts.is_empty() {
        return starts
            .iter()
            .enumerate()
            .map(|(idx, &start)| {
                let end = starts.get(idx + 1).copied().unwrap_or(unfenced.len());
                unfenced[start..end].trim().to_string()
            })
            .filter(|block| !block.is_empty() && block != NO_TASK_SENTINEL)
            .collect();
    }

    PARAGRAPH_BREAK
        .split(unfenced)
        .map(|block| block.trim().to_string())
        .filter(|block| !block.is_empty() && block != NO_TASK_SENTINEL)
        .collect()
}

/// Parse one task block into structured fields.
///
/// The first non-blank line (minus heading/bold markup) is the title. Labeled
/// lines fill time/location/key info; a fallback pass over unlabeled lines
/// catches the older label-free format. A detected carrier brand is merged
/// into the location so the user sees which counter or locker to visit.
pub fn parse_task_markdown(raw_text: &str, fallback_title: &str) -> ParsedTask {
    let lines: Vec<&str> = raw_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let title_line = lines.first().copied().unwrap_or(fallback_title);
    let title = HEADING_PREFIX
        .replace(title_line, "")
        .replace("**", "")
        .trim()
        .to_string();

    let rest: &[&str] = if lines.len() > 1 { &lines[1..] } else { &[] };

    let mut time = String::new();
    let mut location = String::new();
    let mut key_info = String::new();
    let mut brand = String::new();

    for line in rest {
        let l = line.strip_prefix('-').unwrap_or(line).trim();

        if brand.is_empty() {
            if let Some(found) = CARRIER_BRANDS
                .iter()
                .find(|b| contains_ignore_ascii_case(l, b))
            {
                brand = (*found).to_string();
            }
        }

        let lowered = l.to_lowercase();
        let has_time_label = l.contains("时间") || l.contains('⏰');
        let has_location_label = l.contains("地点") || l.contains('📍');
        let has_key_label = l.contains("关键信息") || l.contains('🔑') || lowered.contains("key");

        if has_time_label && time.is_empty() {
            time = clean_value(&extract_after_colon(l));
        } else if has_location_label && location.is_empty() {
            location = clean_value(&extract_after_colon(l));
        } else if has_key_label && key_info.is_empty() {
            key_info = clean_value(&extract_after_colon(l));
        }
    }

    // Fallback for label-free blocks: classify remaining lines by shape.
    if time.is_empty() || location.is_empty() || key_info.is_empty() {
        for line in rest {
            let l = line.trim();
            let lowered = l.to_lowercase();
            let is_time = TIME_PATTERN.is_match(l)
                || l.contains('月')
                || lowered.contains("今天")
                || lowered.contains("明天")
                || lowered.contains("今晚")
                || lowered.contains("尽快");
            let looks_like_code = CODE_PATTERN.is_match(l) || CODE_LINE.is_match(l);

            if time.is_empty() && is_time {
                time = clean_value(l);
            }
            if key_info.is_empty() && looks_like_code {
                key_info = clean_value(l);
            }
            if location.is_empty() && !is_time && !looks_like_code {
                location = clean_value(l);
            }
        }
    }

    if is_placeholder(&time) {
        time = String::new();
    }
    if is_placeholder(&location) {
        location = String::new();
    }
    if is_placeholder(&key_info) {
        key_info = String::new();
    }

    if !brand.is_empty() {
        let location_has_brand = CARRIER_BRANDS
            .iter()
            .any(|b| contains_ignore_ascii_case(&location, b));
        if !location.is_empty() && !location_has_brand {
            location = format!("{brand}{location}");
        } else if location.is_empty() {
            location = brand;
        }
    }

    ParsedTask {
        title,
        time,
        location,
        key_info,
    }
}

fn clean_value(value: &str) -> String {
    value
        .replace("**", "")
        .replace('（', "(")
        .replace('）', ")")
        .trim()
        .to_string()
}

/// Take the text after the last colon (ASCII or full-width) on a label line.
/// A line ending in a colon, or with no colon at all, is used verbatim.
fn extract_after_colon(line: &str) -> String {
    let cleaned = line.strip_prefix('-').unwrap_or(line).trim();
    let cut = [':', '：']
        .iter()
        .filter_map(|&c| cleaned.rfind(c).map(|idx| (idx, c.len_utf8())))
        .max_by_key(|(idx, _)| *idx);

    match cut {
        Some((idx, width)) if idx + width < cleaned.len() => {
            cleaned[idx + width..].trim().to_string()
        }
        _ => cleaned.to_string(),
    }
}

/// "无" / "未提及" and half-copied template instructions all mean "absent".
fn is_placeholder(value: &str) -> bool {
    if value.trim().is_empty() {
        return true;
    }
    let s = value.replace("**", "");
    let s = s.trim();
    s == "无" || s == "未提及" || s.contains("若无则留空") || s.contains("若文本未给出")
}

fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

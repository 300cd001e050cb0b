use log::info;

use crate::extraction::parse_task_markdown;

mod sync;

pub use sync::TaskBoard;

/// Fixed id of the summary entry; per-task entries start above it so the two
/// ranges never collide.
pub const SUMMARY_NOTIFICATION_ID: u32 = 1;
pub const TASK_NOTIFICATION_ID_START: u32 = 100;

pub fn task_notification_id(index: usize) -> u32 {
    TASK_NOTIFICATION_ID_START + index as u32
}

/// Rendered content for one task's notification entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCard {
    /// Location when known, otherwise the parsed title.
    pub title: String,
    /// The pickup code / key info when known, otherwise the parsed title.
    pub content: String,
    /// Expanded body with labeled time/location/key lines.
    pub body: String,
}

/// Derive a card from a task's raw text. Field parsing happens here, at
/// render time, so edited task text immediately shows updated fields.
pub fn render_task_card(text: &str, index: usize) -> TaskCard {
    let fallback = format!("待办事项 {}", index + 1);
    let parsed = parse_task_markdown(text, &fallback);

    let time = if parsed.time.is_empty() {
        "尽快"
    } else {
        parsed.time.as_str()
    };

    let body = format!(
        "{}\n\n⏰ 时间: {}\n📍 地点: {}\n🔑 关键信息: {}",
        parsed.title, time, parsed.location, parsed.key_info
    );

    let title = if parsed.location.is_empty() {
        parsed.title.clone()
    } else {
        parsed.location.clone()
    };
    let content = if parsed.key_info.is_empty() {
        parsed.title
    } else {
        parsed.key_info
    };

    TaskCard {
        title,
        content,
        body,
    }
}

/// Platform notification surface. Implementations must tolerate being called
/// concurrently with pipeline progress; ids follow the constants above.
pub trait Notifier: Send + Sync {
    /// Replace the summary entry's text; `show_clear` controls whether the
    /// clear-all action is offered.
    fn publish_summary(&self, text: &str, show_clear: bool);

    /// Publish or refresh the entry for one task index.
    fn publish_task(&self, index: usize, card: &TaskCard);

    /// Remove the entry for one task index, if visible.
    fn cancel_task(&self, index: usize);
}

/// Terminal-backed notifier used by the demo binary.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn publish_summary(&self, text: &str, show_clear: bool) {
        if show_clear {
            info!("[汇总] {text} (可清空)");
        } else {
            info!("[汇总] {text}");
        }
    }

    fn publish_task(&self, index: usize, card: &TaskCard) {
        info!(
            "[任务 #{index}] {} — {}\n{}",
            card.title, card.content, card.body
        );
    }

    fn cancel_task(&self, index: usize) {
        info!("[任务 #{index}] 已移除");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_prefers_location_and_key_info() {
        let card = render_task_card(
            "## [取快递] 去西门丰巢取件\n- 📍 地点: 丰巢西门柜机\n- 🔑 关键信息: 889901",
            0,
        );
        assert_eq!(card.title, "丰巢西门柜机");
        assert_eq!(card.content, "889901");
        // Missing time falls back to "as soon as possible".
        assert!(card.body.contains("⏰ 时间: 尽快"));
    }

    #[test]
    fn card_falls_back_to_title_when_fields_missing() {
        let card = render_task_card("## 交水电费", 2);
        assert_eq!(card.title, "交水电费");
        assert_eq!(card.content, "交水电费");
    }

    #[test]
    fn empty_text_uses_positional_placeholder() {
        let card = render_task_card("", 2);
        assert_eq!(card.title, "待办事项 3");
    }

    #[test]
    fn task_ids_offset_from_base() {
        assert_eq!(task_notification_id(0), 100);
        assert_eq!(task_notification_id(7), 107);
    }
}

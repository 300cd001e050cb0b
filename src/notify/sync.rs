use std::{ops::Range, sync::Arc};

use anyhow::Result;
use log::info;

use crate::tasks::TaskStore;

use super::{render_task_card, Notifier};

/// Keeps the notification surface consistent with the task list: the visible
/// per-task entries are exactly the non-completed indices, and the summary
/// always reflects the active count. Updates are incremental — only entries
/// whose state changed are touched, so the tray never flickers through a full
/// rebuild.
pub struct TaskBoard {
    store: Arc<TaskStore>,
    notifier: Arc<dyn Notifier>,
}

impl TaskBoard {
    pub fn new(store: Arc<TaskStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Replace the summary text with a transient pipeline status line.
    pub fn update_status(&self, text: &str) {
        self.notifier.publish_summary(text, false);
    }

    /// Append freshly extracted task blocks, publishing only the new entries.
    pub fn append_extracted(&self, blocks: Vec<String>) -> Result<Option<Range<usize>>> {
        let range = self.store.append(&blocks)?;
        if let Some(range) = &range {
            info!("appended tasks at indices {:?}", range);
            let tasks = self.store.tasks();
            for index in range.clone() {
                self.notifier
                    .publish_task(index, &render_task_card(&tasks[index].text, index));
            }
        }
        self.refresh_summary();
        Ok(range)
    }

    /// Mark a task done and retire its notification entry. Other entries are
    /// left untouched.
    pub fn complete_task(&self, index: usize) -> Result<bool> {
        let completed = self.store.complete(index)?;
        if completed {
            self.notifier.cancel_task(index);
            self.refresh_summary();
        }
        Ok(completed)
    }

    /// Replace a task's text after a manual edit, refreshing only that entry.
    pub fn edit_task(&self, index: usize, new_text: impl Into<String>) -> Result<bool> {
        let updated = self.store.update_text(index, new_text)?;

        let tasks = self.store.tasks();
        if let Some(task) = tasks.get(index) {
            if task.is_completed {
                self.notifier.cancel_task(index);
            } else {
                self.notifier
                    .publish_task(index, &render_task_card(&task.text, index));
            }
            self.refresh_summary();
        }
        Ok(updated)
    }

    /// Drop every task and every per-task entry.
    pub fn clear_tasks(&self) -> Result<()> {
        let count = self.store.len();
        self.store.clear()?;
        for index in 0..count {
            self.notifier.cancel_task(index);
        }
        self.refresh_summary();
        Ok(())
    }

    /// Full rebuild: cancel everything, republish active entries, refresh the
    /// summary. Startup path only; incremental updates are preferred.
    pub fn refresh_all(&self) {
        let tasks = self.store.tasks();
        for index in 0..tasks.len() {
            self.notifier.cancel_task(index);
        }
        for (index, task) in tasks.iter().enumerate() {
            if !task.is_completed {
                self.notifier
                    .publish_task(index, &render_task_card(&task.text, index));
            }
        }
        self.refresh_summary();
    }

    fn refresh_summary(&self) {
        let tasks = self.store.tasks();
        let active = tasks.iter().filter(|t| !t.is_completed).count();
        let text = if active == 0 {
            "暂无待办任务".to_string()
        } else {
            format!("你有 {active} 个待办事项")
        };
        self.notifier.publish_summary(&text, !tasks.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TaskCard;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Summary(String, bool),
        Publish(usize, String),
        Cancel(usize),
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingNotifier {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn visible_tasks(&self) -> Vec<usize> {
            // Replay publishes/cancels to the final visible set.
            let mut visible = Vec::new();
            for event in self.events() {
                match event {
                    Event::Publish(index, _) => {
                        if !visible.contains(&index) {
                            visible.push(index);
                        }
                    }
                    Event::Cancel(index) => visible.retain(|i| *i != index),
                    Event::Summary(..) => {}
                }
            }
            visible.sort_unstable();
            visible
        }

        fn last_summary(&self) -> Option<(String, bool)> {
            self.events().into_iter().rev().find_map(|e| match e {
                Event::Summary(text, show_clear) => Some((text, show_clear)),
                _ => None,
            })
        }
    }

    impl Notifier for RecordingNotifier {
        fn publish_summary(&self, text: &str, show_clear: bool) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Summary(text.to_string(), show_clear));
        }

        fn publish_task(&self, index: usize, card: &TaskCard) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Publish(index, card.title.clone()));
        }

        fn cancel_task(&self, index: usize) {
            self.events.lock().unwrap().push(Event::Cancel(index));
        }
    }

    fn board() -> (TaskBoard, Arc<RecordingNotifier>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::new(dir.path().join("tasks.json")).unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        (TaskBoard::new(store, notifier.clone()), notifier, dir)
    }

    #[test]
    fn append_publishes_only_new_entries() {
        let (board, notifier, _dir) = board();
        board
            .append_extracted(vec!["## 任务一".into(), "## 任务二".into()])
            .unwrap();

        assert_eq!(notifier.visible_tasks(), vec![0, 1]);
        assert_eq!(
            notifier.last_summary(),
            Some(("你有 2 个待办事项".to_string(), true))
        );

        // A second batch does not republish the first.
        board.append_extracted(vec!["## 任务三".into()]).unwrap();
        let republish_count = notifier
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Publish(0, _)))
            .count();
        assert_eq!(republish_count, 1);
        assert_eq!(notifier.visible_tasks(), vec![0, 1, 2]);
    }

    #[test]
    fn complete_retires_one_entry_and_recounts() {
        let (board, notifier, _dir) = board();
        board
            .append_extracted(vec!["## 任务一".into(), "## 任务二".into()])
            .unwrap();

        assert!(board.complete_task(0).unwrap());

        assert_eq!(notifier.visible_tasks(), vec![1]);
        assert_eq!(
            notifier.last_summary(),
            Some(("你有 1 个待办事项".to_string(), true))
        );
    }

    #[test]
    fn completing_an_unknown_index_changes_nothing() {
        let (board, notifier, _dir) = board();
        board.append_extracted(vec!["## 任务一".into()]).unwrap();
        let before = notifier.events().len();

        assert!(!board.complete_task(9).unwrap());
        assert_eq!(notifier.events().len(), before);
    }

    #[test]
    fn clear_cancels_everything() {
        let (board, notifier, _dir) = board();
        board
            .append_extracted(vec!["## 任务一".into(), "## 任务二".into()])
            .unwrap();

        board.clear_tasks().unwrap();

        assert!(notifier.visible_tasks().is_empty());
        assert_eq!(
            notifier.last_summary(),
            Some(("暂无待办任务".to_string(), false))
        );
    }

    #[test]
    fn edit_refreshes_a_single_entry() {
        let (board, notifier, _dir) = board();
        board.append_extracted(vec!["## 旧标题".into()]).unwrap();

        board.edit_task(0, "## 新标题").unwrap();

        let last_publish = notifier.events().into_iter().rev().find_map(|e| match e {
            Event::Publish(index, title) => Some((index, title)),
            _ => None,
        });
        assert_eq!(last_publish, Some((0, "新标题".to_string())));
    }

    #[test]
    fn edit_of_completed_task_cancels_its_entry() {
        let (board, notifier, _dir) = board();
        board.append_extracted(vec!["## 任务一".into()]).unwrap();
        board.complete_task(0).unwrap();

        board.edit_task(0, "## 不应显示").unwrap();
        assert!(notifier.visible_tasks().is_empty());
    }

    #[test]
    fn refresh_all_rebuilds_active_entries_only() {
        let (board, notifier, _dir) = board();
        board
            .append_extracted(vec!["## 任务一".into(), "## 任务二".into()])
            .unwrap();
        board.complete_task(0).unwrap();

        board.refresh_all();

        assert_eq!(notifier.visible_tasks(), vec![1]);
        assert_eq!(
            notifier.last_summary(),
            Some(("你有 1 个待办事项".to_string(), true))
        );
    }
}

use std::{
    fs,
    ops::Range,
    path::PathBuf,
    sync::RwLock,
};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// One to-do entry. `text` is the original extracted block and doubles as the
/// display payload; the positional index in the list is the entry's identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TodoTask {
    pub text: String,
    #[serde(default)]
    pub is_completed: bool,
}

impl TodoTask {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_completed: false,
        }
    }
}

/// Early versions persisted a bare string array; those records migrate to the
/// structured form on read.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTask {
    Structured(TodoTask),
    Legacy(String),
}

/// Owner of the ordered task list. The list is append-only apart from
/// `clear`; completion is one-way; entries are never reordered, so indices
/// stay stable for the notification layer. All mutations are read-modify-write
/// under the write lock and persist before the lock is released.
pub struct TaskStore {
    path: PathBuf,
    data: RwLock<Vec<TodoTask>>,
}

impl TaskStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut migrated = false;
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read tasks from {}", path.display()))?;
            match serde_json::from_str::<Vec<StoredTask>>(&contents) {
                Ok(stored) => stored
                    .into_iter()
                    .map(|task| match task {
                        StoredTask::Structured(task) => task,
                        StoredTask::Legacy(text) => {
                            migrated = true;
                            TodoTask::new(text)
                        }
                    })
                    .collect(),
                Err(err) => {
                    warn!("task file unreadable, starting empty: {err}");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let store = Self {
            path,
            data: RwLock::new(data),
        };

        if migrated {
            let guard = store.data.read().unwrap();
            info!("migrated {} legacy task records", guard.len());
            store.persist(&guard)?;
        }

        Ok(store)
    }

    pub fn tasks(&self) -> Vec<TodoTask> {
        self.data.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.data
            .read()
            .unwrap()
            .iter()
            .filter(|task| !task.is_completed)
            .count()
    }

    /// Append new tasks and return the contiguous index range they occupy,
    /// so the notification layer can publish only the new entries.
    pub fn append(&self, texts: &[String]) -> Result<Option<Range<usize>>> {
        if texts.is_empty() {
            return Ok(None);
        }

        let mut guard = self.data.write().unwrap();
        let start = guard.len();
        guard.extend(texts.iter().map(TodoTask::new));
        self.persist(&guard)?;
        Ok(Some(start..start + texts.len()))
    }

    /// Mark a task done. One-way: there is no un-complete operation.
    /// Returns false when the index does not exist.
    pub fn complete(&self, index: usize) -> Result<bool> {
        let mut guard = self.data.write().unwrap();
        match guard.get_mut(index) {
            Some(task) => {
                task.is_completed = true;
                self.persist(&guard)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the text of an existing, non-completed task. Returns false
    /// when the index does not exist or the task is already completed.
    pub fn update_text(&self, index: usize, new_text: impl Into<String>) -> Result<bool> {
        let mut guard = self.data.write().unwrap();
        match guard.get_mut(index) {
            Some(task) if !task.is_completed => {
                task.text = new_text.into();
                self.persist(&guard)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn clear(&self) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.clear();
        self.persist(&guard)
    }

    fn persist(&self, data: &[TodoTask]) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write tasks to {}", self.path.display()))
    }
}

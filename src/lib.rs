pub mod analysis;
pub mod capture;
pub mod chat;
pub mod config;
pub mod error;
pub mod extraction;
pub mod notify;
pub mod ocr;
pub mod pipeline;
pub mod tasks;

pub use capture::{CaptureSession, Frame, FrameSource, RetryPolicy};
pub use chat::{ChatBackend, HttpChatClient};
pub use config::{AiSettings, ConfigStore, ModelConfig};
pub use error::PipelineError;
pub use extraction::ParsedTask;
pub use notify::{ConsoleNotifier, Notifier, TaskBoard, TaskCard};
pub use pipeline::{CaptureCoordinator, PermissionGrant, RESULT_OK};
pub use tasks::{TaskStore, TodoTask};

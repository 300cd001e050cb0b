use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use snaptask::{
    capture::{Frame, FrameSource},
    ConsoleNotifier, CaptureCoordinator, ConfigStore, HttpChatClient, PermissionGrant, TaskBoard,
    TaskStore,
};

/// Demo frame source backed by a screenshot file on disk. One-shot, like the
/// real capture surface: the frame is handed out once and the source closes.
struct StillImageSource {
    frame: Option<Frame>,
}

impl StillImageSource {
    fn open(path: &PathBuf) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to open screenshot {}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self {
            frame: Some(Frame::new(width, height, image.into_raw())),
        })
    }
}

impl FrameSource for StillImageSource {
    fn try_acquire(&mut self) -> Result<Option<Frame>> {
        Ok(self.frame.take())
    }

    fn release(&mut self) {
        self.frame = None;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(image_path) = args.next().map(PathBuf::from) else {
        bail!("usage: snaptask <screenshot.png> [data-dir]");
    };
    let data_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&data_dir)?;

    info!("snaptask starting up...");

    let config = Arc::new(ConfigStore::new(data_dir.join("config.json"))?);
    let store = Arc::new(TaskStore::new(data_dir.join("tasks.json"))?);
    let board = Arc::new(TaskBoard::new(store.clone(), Arc::new(ConsoleNotifier)));

    // Bring notifications in line with whatever was persisted last run.
    board.refresh_all();

    let backend = Arc::new(HttpChatClient::new()?);
    let coordinator = CaptureCoordinator::new(config, board, backend);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("stop signal received, abandoning capture");
                cancel.cancel();
            }
        });
    }

    let source = StillImageSource::open(&image_path)?;
    let grant = PermissionGrant::granted(Box::new(source));

    match coordinator.handle_authorization(grant, cancel).await {
        Ok(count) => info!("capture finished: {count} new tasks"),
        Err(err) => warn!("capture did not complete: {}", err.user_status()),
    }

    for (index, task) in store.tasks().iter().enumerate() {
        let marker = if task.is_completed { "x" } else { " " };
        println!("[{marker}] #{index} {}", task.text.lines().next().unwrap_or(""));
    }

    Ok(())
}

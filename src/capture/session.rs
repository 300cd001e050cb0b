use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;

use super::{Frame, FrameSource};

/// Polling schedule for frame acquisition. The capture surface needs a warm-up
/// before the first frame lands, then a short retry cadence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub warmup: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            warmup: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(500),
            max_retries: 5,
        }
    }
}

/// One end-to-end attempt to obtain a frame from an authorized source.
/// Consumed by `acquire`: the source is always released on exit, whether a
/// frame was obtained, retries exhausted, or the session was cancelled.
pub struct CaptureSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    source: Box<dyn FrameSource>,
    policy: RetryPolicy,
}

impl CaptureSession {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self::with_policy(source, RetryPolicy::default())
    }

    pub fn with_policy(source: Box<dyn FrameSource>, policy: RetryPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            source,
            policy,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub async fn acquire(mut self, cancel: &CancellationToken) -> Result<Frame, PipelineError> {
        if sleep_or_cancelled(self.policy.warmup, cancel).await {
            self.source.release();
            return Err(PipelineError::Cancelled);
        }

        let mut retries = 0;
        loop {
            match self.source.try_acquire() {
                Ok(Some(frame)) => {
                    // One-shot resource: close it the moment we have a frame.
                    self.source.release();
                    info!(
                        "session {} captured {}x{} frame after {} retries",
                        self.id, frame.width, frame.height, retries
                    );
                    return Ok(frame);
                }
                Ok(None) => {
                    if retries >= self.policy.max_retries {
                        warn!("session {} gave up: no frame after {retries} retries", self.id);
                        self.source.release();
                        return Err(PipelineError::NoFrameAvailable);
                    }
                    retries += 1;
                    warn!("frame source not ready, retry {retries}...");
                    if sleep_or_cancelled(self.policy.retry_delay, cancel).await {
                        self.source.release();
                        return Err(PipelineError::Cancelled);
                    }
                }
                Err(err) => {
                    self.source.release();
                    return Err(PipelineError::Frame(err));
                }
            }
        }
    }
}

/// Returns true if the token fired before the delay elapsed.
async fn sleep_or_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    analysis::AnalysisInvoker,
    capture::{CaptureSession, Frame, FrameSource},
    chat::ChatBackend,
    config::{AiSettings, ConfigStore},
    error::PipelineError,
    extraction::{extract_tasks_from_model_output, format_multi_message_input},
    notify::TaskBoard,
    ocr::{OcrInvoker, OcrOutcome},
};

/// Success code delivered by the platform permission flow.
pub const RESULT_OK: i32 = -1;

/// Outcome of the external authorization dialog: a result code plus the
/// capture handle, present only when the user accepted.
pub struct PermissionGrant {
    pub result_code: i32,
    pub source: Option<Box<dyn FrameSource>>,
}

impl PermissionGrant {
    pub fn granted(source: Box<dyn FrameSource>) -> Self {
        Self {
            result_code: RESULT_OK,
            source: Some(source),
        }
    }

    pub fn denied(result_code: i32) -> Self {
        Self {
            result_code,
            source: None,
        }
    }
}

/// Runs the capture-to-task pipeline: acquire frame, OCR with one bounded
/// escalation, segment, extract, parse, append. One capture at a time; a
/// trigger arriving while one is in flight is rejected, because the frame
/// source is exclusive and torn down eagerly.
pub struct CaptureCoordinator {
    config: Arc<ConfigStore>,
    board: Arc<TaskBoard>,
    ocr: OcrInvoker,
    analysis: AnalysisInvoker,
    in_flight: Mutex<()>,
}

impl CaptureCoordinator {
    pub fn new(config: Arc<ConfigStore>, board: Arc<TaskBoard>, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            config,
            board,
            ocr: OcrInvoker::new(backend.clone()),
            analysis: AnalysisInvoker::new(backend),
            in_flight: Mutex::new(()),
        }
    }

    /// Entry point fed by the platform permission flow. Anything other than a
    /// success code with a capture handle leaves the task list untouched.
    pub async fn handle_authorization(
        &self,
        grant: PermissionGrant,
        cancel: CancellationToken,
    ) -> Result<usize, PipelineError> {
        match (grant.result_code, grant.source) {
            (RESULT_OK, Some(source)) => self.run_capture(source, cancel).await,
            (code, _) => {
                warn!("capture authorization denied (result code {code})");
                self.board.refresh_all();
                Err(PipelineError::NotAuthorized)
            }
        }
    }

    /// Run one capture end to end. Errors are surfaced as a one-line status
    /// in place of the summary text; a cancelled capture is discarded
    /// silently.
    pub async fn run_capture(
        &self,
        source: Box<dyn FrameSource>,
        cancel: CancellationToken,
    ) -> Result<usize, PipelineError> {
        let _guard = self.in_flight.try_lock().map_err(|_| PipelineError::Busy)?;

        let result = self.run_stages(source, &cancel).await;
        match &result {
            Ok(count) => info!("capture finished with {count} new tasks"),
            Err(PipelineError::Cancelled) => info!("capture cancelled, result discarded"),
            Err(err) => {
                warn!("capture failed: {err}");
                self.board.update_status(&err.user_status());
            }
        }
        result
    }

    async fn run_stages(
        &self,
        source: Box<dyn FrameSource>,
        cancel: &CancellationToken,
    ) -> Result<usize, PipelineError> {
        // Settings are snapshotted once per capture, never re-read mid-flight.
        let settings = self.config.ai();

        if !settings.ocr.has_api_key() {
            return Err(PipelineError::MissingOcrKey);
        }

        self.board.update_status("正在处理截屏...");
        let session = CaptureSession::new(source);
        info!("capture session {} started", session.id());
        let frame = session.acquire(cancel).await?;

        dump_debug_frame(&settings, &frame);

        self.board.update_status("正在识别文字...");
        let ocr_text = self.recognize_with_escalation(&settings, &frame, cancel).await?;

        let analysis_config = settings.analysis_config();
        if !analysis_config.has_api_key() {
            return Err(PipelineError::MissingAnalysisKey);
        }

        self.board.update_status("正在智能分析...");
        let segmented = format_multi_message_input(&ocr_text);
        let raw = self
            .analysis
            .extract(analysis_config, &settings.analysis_prompt, &segmented)
            .await?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let blocks = extract_tasks_from_model_output(&raw);
        if blocks.is_empty() {
            // Legitimately nothing actionable: not an error.
            info!("analysis found no actionable tasks");
            self.board.refresh_all();
            return Ok(0);
        }

        info!("analysis extracted {} task blocks", blocks.len());
        let count = blocks.len();
        self.board
            .append_extracted(blocks)
            .map_err(PipelineError::Storage)?;
        Ok(count)
    }

    async fn recognize_with_escalation(
        &self,
        settings: &AiSettings,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let first = self
            .ocr
            .recognize_attempt(&settings.ocr, &settings.ocr_prompt, frame, 1, cancel)
            .await?;

        match first {
            OcrOutcome::Text(text) => Ok(text),
            OcrOutcome::Escalate => {
                self.board.update_status("OCR 结果异常，正在重试...");
                match self
                    .ocr
                    .recognize_attempt(&settings.ocr, &settings.ocr_prompt, frame, 2, cancel)
                    .await?
                {
                    OcrOutcome::Text(text) => Ok(text),
                    // Attempt 2 accepts summary-shaped output, so this arm is
                    // unreachable; treat it as an empty result if it ever fires.
                    OcrOutcome::Escalate => Err(PipelineError::EmptyOcrResult),
                }
            }
        }
    }
}

fn dump_debug_frame(settings: &AiSettings, frame: &Frame) {
    let Some(path) = settings.debug_frame_path.as_ref() else {
        return;
    };
    match frame.to_jpeg(100).and_then(|jpeg| {
        std::fs::write(path, jpeg).map_err(anyhow::Error::from)
    }) {
        Ok(()) => info!("debug frame written to {}", path.display()),
        Err(err) => warn!("failed to write debug frame: {err}"),
    }
}

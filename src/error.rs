use thiserror::Error;

/// Which remote capability a network failure came from. The two calls surface
/// different status lines to the user, so the distinction is kept here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ocr,
    Analysis,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Ocr => write!(f, "OCR"),
            Stage::Analysis => write!(f, "analysis"),
        }
    }
}

/// Failure taxonomy for one capture attempt. Every variant is local to the
/// attempt: none of them touches the persisted task list.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no frame available after retries were exhausted")]
    NoFrameAvailable,

    #[error("frame processing failed: {0}")]
    Frame(#[source] anyhow::Error),

    #[error("{stage} request failed: {source}")]
    Network {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("OCR produced no usable text")]
    EmptyOcrResult,

    #[error("analysis produced no output")]
    EmptyAnalysis,

    #[error("OCR API key is not configured")]
    MissingOcrKey,

    #[error("analysis API key is not configured")]
    MissingAnalysisKey,

    #[error("failed to persist extracted tasks: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("a capture is already in flight")]
    Busy,

    #[error("capture authorization was denied")]
    NotAuthorized,

    #[error("capture was cancelled")]
    Cancelled,
}

impl PipelineError {
    /// One-line status shown in place of the summary notification text.
    /// Raw errors never reach the user; network failures only carry the
    /// transport message, not a backtrace.
    pub fn user_status(&self) -> String {
        match self {
            PipelineError::NoFrameAvailable => "无法获取屏幕画面".to_string(),
            PipelineError::Frame(_) => "图片处理失败".to_string(),
            PipelineError::Network { stage: Stage::Ocr, source } => {
                format!("网络错误: {source}")
            }
            PipelineError::Network { stage: Stage::Analysis, source } => {
                format!("分析失败: {source}")
            }
            PipelineError::EmptyOcrResult => "未识别到有效文字".to_string(),
            PipelineError::EmptyAnalysis => "分析无结果".to_string(),
            PipelineError::MissingOcrKey => "请设置 OCR API Key".to_string(),
            PipelineError::MissingAnalysisKey => "请设置分析模型 API Key".to_string(),
            PipelineError::Storage(_) => "任务保存失败".to_string(),
            PipelineError::Busy => "已有截屏任务在处理中".to_string(),
            PipelineError::NotAuthorized => "截屏授权被拒绝".to_string(),
            PipelineError::Cancelled => "截屏已取消".to_string(),
        }
    }
}

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::Frame,
    chat::{ChatBackend, ChatMessage, ChatRequest, ContentPart},
    config::ModelConfig,
    error::{PipelineError, Stage},
};

mod text;

pub use text::{extract_ocr_text, is_likely_summary, looks_incomplete};

const SYSTEM_PROMPT: &str = "You are a precise OCR engine. Output raw text only.";

/// Appended to the configured prompt on the first attempt. The `<OCR>` tag
/// pair lets the extractor locate the transcription unambiguously and makes
/// summary-shaped output detectable.
const STRICT_SUFFIX: &str = "\
IMPORTANT:
- You are doing OCR. Output ONLY the raw text in the image.
- Do NOT describe, summarize, or explain.
- Do NOT translate.
- Preserve line breaks.
- Wrap the final result strictly between tags:
<OCR>
...
</OCR>";

/// Second-attempt prompt: terser and harder-constrained, so the model stops
/// being clever about summarizing.
const RETRY_PROMPT: &str = "\
You are an OCR engine.
Return ONLY the text you can read from the image.
No extra words.
No summary.
No translation.
Preserve line breaks.

<OCR>
...text from image...
</OCR>";

/// Outcome of a single OCR attempt. `Escalate` is only ever produced on the
/// first attempt; the caller decides whether to run the escalated retry.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutcome {
    Text(String),
    Escalate,
}

pub struct OcrInvoker {
    backend: Arc<dyn ChatBackend>,
}

impl OcrInvoker {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Run one recognition attempt against the vision model. Attempt 1 uses
    /// the configured prompt plus the strict suffix at JPEG quality 85;
    /// attempt 2 swaps in the terse retry prompt at quality 95 and accepts
    /// whatever comes back, as long as it is not empty.
    pub async fn recognize_attempt(
        &self,
        config: &ModelConfig,
        user_prompt: &str,
        frame: &Frame,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<OcrOutcome, PipelineError> {
        let quality = if attempt <= 1 { 85 } else { 95 };
        let prompt = if attempt <= 1 {
            format!("{}\n\n{}", user_prompt.trim(), STRICT_SUFFIX)
        } else {
            RETRY_PROMPT.to_string()
        };

        let jpeg = frame.to_jpeg(quality).map_err(PipelineError::Frame)?;
        let encoded = STANDARD.encode(&jpeg);

        let request = ChatRequest {
            model: config.model_name.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user_parts(vec![
                    ContentPart::text(prompt),
                    ContentPart::image_data_url(format!("data:image/jpeg;base64,{encoded}")),
                ]),
            ],
        };

        let raw = self
            .backend
            .chat(config, request)
            .await
            .map_err(|source| PipelineError::Network {
                stage: Stage::Ocr,
                source,
            })?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let extracted = extract_ocr_text(&raw);
        info!(
            "OCR attempt {attempt} (jpegQ={quality}) returned {} chars",
            extracted.chars().count()
        );

        if extracted.is_empty() || extracted.chars().count() <= 5 {
            warn!("OCR result too short, treating as recognition failure");
            return Err(PipelineError::EmptyOcrResult);
        }

        if attempt == 1 && (is_likely_summary(&extracted) || looks_incomplete(&extracted)) {
            warn!("OCR output looks summarized or truncated, escalating once");
            return Ok(OcrOutcome::Escalate);
        }

        Ok(OcrOutcome::Text(extracted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedBackend {
        responses: Mutex<Vec<String>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_texts(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|req| serde_json::to_string(req).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, _config: &ModelConfig, request: ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    fn test_frame() -> Frame {
        Frame::new(2, 2, vec![128u8; 2 * 2 * 4])
    }

    fn config() -> ModelConfig {
        ModelConfig {
            base_url: "http://localhost".into(),
            api_key: "key".into(),
            model_name: "vision".into(),
            app_id: None,
        }
    }

    #[tokio::test]
    async fn short_result_is_rejected_on_any_attempt() {
        for attempt in [1, 2] {
            let backend = ScriptedBackend::new(vec!["<OCR>ab </OCR>"]);
            let invoker = OcrInvoker::new(backend);
            let err = invoker
                .recognize_attempt(
                    &config(),
                    "prompt",
                    &test_frame(),
                    attempt,
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::EmptyOcrResult), "attempt {attempt}");
        }
    }

    #[tokio::test]
    async fn summary_shaped_result_escalates_then_is_accepted() {
        // 40 chars, one line, digits, no punctuation: matches the summary shape.
        let summary = "a package arrived with code 889901 today";
        assert_eq!(summary.chars().count(), 40);

        let backend = ScriptedBackend::new(vec![summary, summary]);
        let invoker = OcrInvoker::new(backend.clone());
        let cancel = CancellationToken::new();

        let first = invoker
            .recognize_attempt(&config(), "prompt", &test_frame(), 1, &cancel)
            .await
            .unwrap();
        assert_eq!(first, OcrOutcome::Escalate);

        // Second attempt accepts the identical output.
        let second = invoker
            .recognize_attempt(&config(), "prompt", &test_frame(), 2, &cancel)
            .await
            .unwrap();
        assert_eq!(second, OcrOutcome::Text(summary.to_string()));
    }

    #[tokio::test]
    async fn prompts_differ_between_attempts() {
        let multi_line = "<OCR>\n取件码: 889901\n丰巢西门柜机\n</OCR>";
        let backend = ScriptedBackend::new(vec![multi_line, multi_line]);
        let invoker = OcrInvoker::new(backend.clone());
        let cancel = CancellationToken::new();

        invoker
            .recognize_attempt(&config(), "user prompt", &test_frame(), 1, &cancel)
            .await
            .unwrap();
        invoker
            .recognize_attempt(&config(), "user prompt", &test_frame(), 2, &cancel)
            .await
            .unwrap();

        let requests = backend.request_texts();
        assert!(requests[0].contains("user prompt"));
        assert!(requests[0].contains("Wrap the final result strictly between tags"));
        assert!(!requests[1].contains("user prompt"));
        assert!(requests[1].contains("No extra words."));
        // Both carry the image as a JPEG data URL.
        assert!(requests[0].contains("data:image/jpeg;base64,"));
        assert!(requests[1].contains("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn clean_multiline_result_passes_first_attempt() {
        let backend =
            ScriptedBackend::new(vec!["<OCR>\n丰巢 取件码889901\n西门柜机\n</OCR>"]);
        let invoker = OcrInvoker::new(backend);

        let outcome = invoker
            .recognize_attempt(
                &config(),
                "prompt",
                &test_frame(),
                1,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            OcrOutcome::Text("丰巢 取件码889901\n西门柜机".to_string())
        );
    }
}

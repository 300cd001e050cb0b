use std::sync::Arc;

use log::info;

use crate::{
    chat::{ChatBackend, ChatMessage, ChatRequest},
    config::ModelConfig,
    error::{PipelineError, Stage},
};

/// Single-shot call to the analysis model. A failure here is terminal for the
/// capture; the user re-triggers manually rather than the pipeline retrying.
pub struct AnalysisInvoker {
    backend: Arc<dyn ChatBackend>,
}

impl AnalysisInvoker {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Send the extraction template plus the segmented OCR text and return
    /// the model's raw markdown answer.
    pub async fn extract(
        &self,
        config: &ModelConfig,
        template: &str,
        segmented_text: &str,
    ) -> Result<String, PipelineError> {
        let prompt = format!("{template}\n\n待处理文字：\n{segmented_text}");

        let request = ChatRequest {
            model: config.model_name.clone(),
            messages: vec![ChatMessage::user(prompt)],
        };

        let raw = self
            .backend
            .chat(config, request)
            .await
            .map_err(|source| PipelineError::Network {
                stage: Stage::Analysis,
                source,
            })?;

        if raw.trim().is_empty() {
            return Err(PipelineError::EmptyAnalysis);
        }

        info!("analysis returned {} chars", raw.chars().count());
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedBackend {
        response: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatBackend for FixedBackend {
        async fn chat(&self, _config: &ModelConfig, request: ChatRequest) -> Result<String> {
            let prompt = serde_json::to_string(&request.messages).unwrap();
            self.prompts.lock().unwrap().push(prompt);
            self.response.clone().map_err(|e| anyhow!(e))
        }
    }

    fn config() -> ModelConfig {
        ModelConfig {
            base_url: "http://localhost".into(),
            api_key: "key".into(),
            model_name: "analysis".into(),
            app_id: None,
        }
    }

    #[tokio::test]
    async fn prompt_is_template_plus_segmented_text() {
        let backend = Arc::new(FixedBackend {
            response: Ok("无任务".into()),
            prompts: Mutex::new(Vec::new()),
        });
        let invoker = AnalysisInvoker::new(backend.clone());

        invoker
            .extract(&config(), "TEMPLATE", "消息 1:\nhello")
            .await
            .unwrap();

        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains("TEMPLATE"));
        assert!(prompts[0].contains("待处理文字"));
        assert!(prompts[0].contains("hello"));
    }

    #[tokio::test]
    async fn blank_response_is_empty_analysis() {
        let backend = Arc::new(FixedBackend {
            response: Ok("   \n ".into()),
            prompts: Mutex::new(Vec::new()),
        });
        let invoker = AnalysisInvoker::new(backend);

        let err = invoker.extract(&config(), "t", "x").await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyAnalysis));
    }

    #[tokio::test]
    async fn transport_failure_maps_to_network_error() {
        let backend = Arc::new(FixedBackend {
            response: Err("connection refused".into()),
            prompts: Mutex::new(Vec::new()),
        });
        let invoker = AnalysisInvoker::new(backend);

        let err = invoker.extract(&config(), "t", "x").await.unwrap_err();
        assert_eq!(err.user_status(), "分析失败: connection refused");
        match err {
            PipelineError::Network { stage, .. } => assert_eq!(stage, Stage::Analysis),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod media;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod task;
pub mod tasks;

// Re-export commonly used types
pub use completion::{CompletionModel, GeminiClient, OpenRouterClient};
pub use config::{ExtractionConfig, Provider};
pub use context::Context;
pub use error::{ExtractionError, RequestError, Result};
pub use extractor::{Extractor, build_extraction_pipeline};
pub use models::{
    Extraction, ExtractionRequest, ExtractionResult, Field, ImageAttachment, MediaType,
    PLACEHOLDER,
};
pub use parser::parse_response;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use prompt::{EXTRACTION_PROMPT, Prompt, build_prompt};
pub use task::{NextAction, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoModel;

    #[async_trait]
    impl CompletionModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            _prompt: &str,
            _images: &[ImageAttachment],
        ) -> std::result::Result<String, RequestError> {
            Ok(r#"```json
{"name": "田中一郎", "allergies": "ペニシリン"}
```"#
                .to_string())
        }
    }

    #[tokio::test]
    async fn test_pipeline_tasks_run_in_order() {
        let pipeline = build_extraction_pipeline(Arc::new(EchoModel));
        let ids = pipeline.task_ids();

        assert_eq!(ids.len(), 3);
        assert!(ids[0].ends_with("BuildPromptTask"));
        assert!(ids[1].ends_with("CompletionTask"));
        assert!(ids[2].ends_with("ParseResponseTask"));
    }

    #[tokio::test]
    async fn test_fenced_reply_is_extracted() {
        let extractor = Extractor::new(Arc::new(EchoModel));
        let extraction = extractor
            .extract(ExtractionRequest::text("紹介状"))
            .await
            .unwrap();

        assert_eq!(extraction.result.name, "田中一郎");
        assert_eq!(extraction.result.allergies, "ペニシリン");
        assert_eq!(extraction.result.found_count(), 2);
        assert_eq!(extractor.model_name(), "echo");
    }
}

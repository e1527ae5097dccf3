use chrono::Utc;
use std::sync::Arc;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::{
    completion::CompletionModel,
    context::{Context, keys},
    error::Result,
    models::{Extraction, ExtractionRequest, ExtractionResult},
    pipeline::{Pipeline, PipelineBuilder},
    tasks::{BuildPromptTask, CompletionTask, ParseResponseTask},
};

/// Build prompt → call model → parse, wired around one model backend.
pub fn build_extraction_pipeline(model: Arc<dyn CompletionModel>) -> Pipeline {
    PipelineBuilder::new("referral_extraction")
        .add_task(Arc::new(BuildPromptTask))
        .add_task(Arc::new(CompletionTask::new(model)))
        .add_task(Arc::new(ParseResponseTask))
        .build()
}

/// Entry point for callers: one `extract` call per user action.
pub struct Extractor {
    pipeline: Pipeline,
    model_name: String,
}

impl Extractor {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        let model_name = model.name().to_string();
        Self {
            pipeline: build_extraction_pipeline(model),
            model_name,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub async fn extract(&self, request: ExtractionRequest) -> Result<Extraction> {
        self.extract_with_id(Uuid::new_v4().to_string(), request)
            .await
    }

    /// Run one extraction under a caller-chosen id (e.g. an HTTP correlation id).
    pub async fn extract_with_id(
        &self,
        request_id: impl Into<String>,
        request: ExtractionRequest,
    ) -> Result<Extraction> {
        let context = Context::with_request_id(request_id, request);
        let span = info_span!("extraction", request_id = %context.request_id());
        self.run(context).instrument(span).await
    }

    async fn run(&self, context: Context) -> Result<Extraction> {
        info!(
            kind = context.request().kind(),
            provider = %self.model_name,
            "Starting extraction"
        );

        self.pipeline.execute(context.clone()).await?;

        let result: ExtractionResult = context.require(keys::RESULT).await?;
        let raw_completion: String = context.require(keys::COMPLETION).await?;

        info!(found = result.found_count(), "Extraction finished");

        Ok(Extraction {
            request_id: context.request_id().to_string(),
            extracted_at: Utc::now(),
            result,
            raw_completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ExtractionError, RequestError},
        models::{Field, ImageAttachment, MediaType, PLACEHOLDER},
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Test double that records every call and replays a fixed reply.
    struct ScriptedModel {
        reply: std::result::Result<String, RequestError>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: RequestError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(err),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            prompt: &str,
            images: &[ImageAttachment],
        ) -> std::result::Result<String, RequestError> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), images.len()));
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn test_text_extraction_end_to_end() {
        let model = ScriptedModel::replying("患者：山田太郎、生年月日：1950-01-01、主訴：腹痛");
        let extractor = Extractor::new(model.clone());

        let extraction = extractor
            .extract(ExtractionRequest::text("紹介状本文"))
            .await
            .unwrap();

        assert_eq!(extraction.result.name, "山田太郎");
        assert_eq!(extraction.result.date_of_birth, "1950-01-01");
        assert_eq!(extraction.result.chief_complaint, "腹痛");
        assert_eq!(extraction.result.get(Field::Medications), PLACEHOLDER);
        assert_eq!(model.call_count(), 1);

        let calls = model.calls.lock().unwrap();
        assert!(calls[0].0.ends_with("紹介状本文"));
        assert_eq!(calls[0].1, 0);
    }

    #[tokio::test]
    async fn test_images_are_forwarded_to_the_model() {
        let model = ScriptedModel::replying(r#"{"name": "佐藤花子"}"#);
        let extractor = Extractor::new(model.clone());

        let request = ExtractionRequest::images(vec![
            ImageAttachment::new(vec![1, 2], MediaType::Png),
            ImageAttachment::new(vec![3, 4], MediaType::Jpeg),
        ]);
        let extraction = extractor.extract_with_id("req-42", request).await.unwrap();

        assert_eq!(extraction.request_id, "req-42");
        assert_eq!(extraction.result.name, "佐藤花子");
        assert_eq!(extraction.raw_completion, r#"{"name": "佐藤花子"}"#);
        assert_eq!(model.calls.lock().unwrap()[0].1, 2);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_before_the_call() {
        let model = ScriptedModel::replying("{}");
        let extractor = Extractor::new(model.clone());

        let err = extractor
            .extract(ExtractionRequest::text("   "))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::InvalidInput(_)));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_api_failure_propagates() {
        let model = ScriptedModel::failing(RequestError::Unreachable("connection refused".into()));
        let extractor = Extractor::new(model.clone());

        let err = extractor
            .extract(ExtractionRequest::text("主訴：腹痛"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExtractionError::Request(RequestError::Unreachable(_))
        ));
        assert_eq!(err.kind(), "request");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_completion_degrades_to_placeholders() {
        let model = ScriptedModel::replying("I could not read this document.");
        let extractor = Extractor::new(model);

        let extraction = extractor
            .extract(ExtractionRequest::text("判読不能"))
            .await
            .unwrap();

        assert_eq!(extraction.result, ExtractionResult::default());
    }
}

use async_trait::async_trait;
use tracing::info;

use crate::{
    context::{Context, keys},
    error::Result,
    media::prepare_images,
    models::ExtractionRequest,
    prompt::build_prompt,
    task::{NextAction, Task, TaskResult},
};

/// Validates the request, rasterizes PDFs and stores the prompt.
pub struct BuildPromptTask;

#[async_trait]
impl Task for BuildPromptTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let request = context.request();
        request.validate()?;

        let prompt = match request {
            ExtractionRequest::Text(_) => build_prompt(request),
            ExtractionRequest::Images(images) => {
                let pages = prepare_images(images).await?;
                build_prompt(&ExtractionRequest::Images(pages))
            }
        };

        info!(
            request_id = %context.request_id(),
            kind = request.kind(),
            images = prompt.images.len(),
            prompt_length = prompt.text.len(),
            "Prompt built"
        );

        let status = format!("Prompt ready with {} image(s)", prompt.images.len());
        context.set(keys::PROMPT, prompt).await?;
        Ok(TaskResult::new_with_status(NextAction::Continue, status))
    }
}

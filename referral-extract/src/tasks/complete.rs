use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    completion::CompletionModel,
    context::{Context, keys},
    error::Result,
    prompt::Prompt,
    task::{NextAction, Task, TaskResult},
};

/// Sends the prompt to the hosted model, exactly once.
pub struct CompletionTask {
    model: Arc<dyn CompletionModel>,
}

impl CompletionTask {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Task for CompletionTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let prompt: Prompt = context.require(keys::PROMPT).await?;

        let completion = self
            .model
            .complete(&prompt.text, &prompt.images)
            .await
            .map_err(|e| {
                error!(
                    request_id = %context.request_id(),
                    provider = %self.model.name(),
                    error = %e,
                    "Model call failed"
                );
                e
            })?;

        info!(
            request_id = %context.request_id(),
            provider = %self.model.name(),
            completion_length = completion.len(),
            "Model call succeeded"
        );

        context.set(keys::COMPLETION, completion).await?;
        // The prompt may carry megabytes of page data
        context.remove(keys::PROMPT).await;

        Ok(TaskResult::new(NextAction::Continue))
    }
}

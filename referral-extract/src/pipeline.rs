use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{
    context::Context,
    error::Result,
    task::{NextAction, Task},
};

/// An ordered chain of tasks run against one request context
pub struct Pipeline {
    id: String,
    tasks: Vec<Arc<dyn Task>>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: Vec::new(),
        }
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id()).collect()
    }

    /// Run tasks in order until one ends the pipeline or the chain runs out.
    /// The first task error aborts the run.
    pub async fn execute(&self, context: Context) -> Result<()> {
        for task in &self.tasks {
            debug!(
                pipeline = %self.id,
                request_id = %context.request_id(),
                task_id = %task.id(),
                "Running task"
            );

            let result = task.run(context.clone()).await.map_err(|e| {
                error!(
                    pipeline = %self.id,
                    request_id = %context.request_id(),
                    task_id = %task.id(),
                    error = %e,
                    "Task failed"
                );
                e
            })?;

            if let Some(status) = &result.status_message {
                info!(
                    request_id = %context.request_id(),
                    task_id = %task.id(),
                    "{}", status
                );
            }

            if result.next_action == NextAction::End {
                break;
            }
        }
        Ok(())
    }
}

/// Builder for creating pipelines
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            pipeline: Pipeline::new(id),
        }
    }

    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        self.pipeline.tasks.push(task);
        self
    }

    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}

use async_trait::async_trait;

use crate::{
    context::{Context, keys},
    error::Result,
    models::Field,
    parser::parse_response,
    task::{NextAction, Task, TaskResult},
};

pub struct ParseResponseTask;

#[async_trait]
impl Task for ParseResponseTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let completion: String = context.require(keys::COMPLETION).await?;
        let result = parse_response(&completion);

        let status = format!(
            "Parsed {} of {} fields",
            result.found_count(),
            Field::ALL.len()
        );
        context.set(keys::RESULT, result).await?;

        Ok(TaskResult::new_with_status(NextAction::End, status))
    }
}

pub mod build_prompt;
pub mod complete;
pub mod parse_response;

pub use build_prompt::BuildPromptTask;
pub use complete::CompletionTask;
pub use parse_response::ParseResponseTask;

pub mod config;
pub mod error;
pub mod service;
pub mod views;

pub use config::ServiceConfig;
pub use error::{ApiError, ApiResult};
pub use service::{AppState, build_router};

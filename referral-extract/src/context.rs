use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::models::ExtractionRequest;

/// Keys the extraction tasks exchange through the context
pub mod keys {
    pub const PROMPT: &str = "prompt";
    pub const COMPLETION: &str = "completion";
    pub const RESULT: &str = "result";
}

/// State for a single extraction request, shared by the tasks that serve it.
///
/// A fresh context is created for every request and dropped with it, so
/// nothing leaks between users.
#[derive(Clone, Debug)]
pub struct Context {
    request_id: String,
    request: Arc<ExtractionRequest>,
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new(request: ExtractionRequest) -> Self {
        Self::with_request_id(Uuid::new_v4().to_string(), request)
    }

    pub fn with_request_id(request_id: impl Into<String>, request: ExtractionRequest) -> Self {
        Self {
            request_id: request_id.into(),
            request: Arc::new(request),
            data: Arc::new(DashMap::new()),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn request(&self) -> &ExtractionRequest {
        &self.request
    }

    pub async fn set(&self, key: impl Into<String>, value: impl serde::Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| {
            ExtractionError::ContextError(format!("Failed to serialize '{}': {}", key, e))
        })?;
        self.data.insert(key, value);
        Ok(())
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Like `get`, but a missing key is an error.
    pub async fn require<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key)
            .await
            .ok_or_else(|| ExtractionError::ContextError(format!("'{}' not found in context", key)))
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }
}

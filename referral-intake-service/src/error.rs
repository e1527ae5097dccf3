use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use referral_extract::{ExtractionError, RequestError};
use serde_json::json;

use crate::service::MAX_UPLOAD_BYTES;

/// A failed extraction as seen by an HTTP client
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: message.into(),
        }
    }

    /// Message shown in the page's error banner
    pub fn user_message(&self) -> String {
        match self.status {
            StatusCode::BAD_GATEWAY => format!(
                "AIサービスの呼び出しに失敗しました。時間をおいて再度お試しください。（{}）",
                self.message
            ),
            StatusCode::GATEWAY_TIMEOUT => {
                "AIサービスの応答がタイムアウトしました。再度お試しください。".to_string()
            }
            StatusCode::PAYLOAD_TOO_LARGE => format!(
                "ファイルサイズが上限（合計 {} MB）を超えています。",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            ),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => format!(
                "対応していないファイル形式です（JPEG / PNG / PDF のみ）。{}",
                self.message
            ),
            _ => self.message.clone(),
        }
    }
}

fn status_for(err: &ExtractionError) -> StatusCode {
    match err {
        ExtractionError::InvalidInput(_) | ExtractionError::Media(_) => StatusCode::BAD_REQUEST,
        ExtractionError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ExtractionError::Request(RequestError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        ExtractionError::Request(RequestError::MissingApiKey(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ExtractionError::Request(_) => StatusCode::BAD_GATEWAY,
        ExtractionError::Configuration(_)
        | ExtractionError::ContextError(_)
        | ExtractionError::TaskExecutionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        Self {
            status: status_for(&err),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Keeps the status axum assigns, so an upload over the body limit is a 413.
impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        Self {
            kind: if status == StatusCode::PAYLOAD_TOO_LARGE {
                "payload_too_large"
            } else {
                "invalid_input"
            },
            status,
            message: format!("Could not read the upload: {}", err.body_text()),
        }
    }
}

impl From<minijinja::Error> for ApiError {
    fn from(err: minijinja::Error) -> Self {
        ApiError::internal(format!("Failed to render page: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": self.message,
                "kind": self.kind,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ExtractionError::InvalidInput("empty".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ExtractionError::UnsupportedMediaType("image/gif".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                ExtractionError::Request(RequestError::Unauthorized("bad key".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ExtractionError::Request(RequestError::Timeout),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ExtractionError::Configuration("no key".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }

    #[test]
    fn test_kind_follows_extraction_error() {
        let err = ApiError::from(ExtractionError::Request(RequestError::Status {
            status: 503,
            body: "overloaded".into(),
        }));
        assert_eq!(err.kind, "request");
        assert!(err.user_message().contains("503"));
    }
}

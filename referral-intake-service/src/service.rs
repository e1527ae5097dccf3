use axum::{
    Form, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::{Html, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use referral_extract::{
    Extraction, ExtractionRequest, ExtractionResult, Extractor, ImageAttachment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    views::{PageRenderer, PageView, Tab},
};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Phone photos of several pages fit comfortably under this
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<Extractor>,
    pub pages: Arc<PageRenderer>,
}

impl AppState {
    pub fn new(extractor: Extractor) -> Result<Self, minijinja::Error> {
        Ok(Self {
            extractor: Arc::new(extractor),
            pages: Arc::new(PageRenderer::new()?),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TextSubmission {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractionResponse {
    pub request_id: String,
    pub extracted_at: DateTime<Utc>,
    pub model: String,
    pub result: ExtractionResult,
    pub plain_text: String,
    pub raw_completion: String,
}

impl ExtractionResponse {
    fn new(model: &str, extraction: Extraction) -> Self {
        Self {
            plain_text: extraction.result.to_plain_text(),
            request_id: extraction.request_id,
            extracted_at: extraction.extracted_at,
            model: model.to_string(),
            result: extraction.result,
            raw_completion: extraction.raw_completion,
        }
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/extract/text", post(extract_text_page))
        .route("/extract/image", post(extract_image_page))
        .route("/api/extract/text", post(extract_text_api))
        .route("/api/extract/image", post(extract_image_api))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags every request with a correlation id, reusing the caller's when sent.
/// The id doubles as the extraction request id.
async fn correlation_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header = HeaderValue::from_str(&correlation_id).ok();
    if let Some(value) = &header {
        request
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let view = PageView::idle(state.extractor.model_name());
    Ok(Html(state.pages.render(&view)?))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "model": state.extractor.model_name(),
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn run_extraction(
    state: &AppState,
    request_id: String,
    request: ExtractionRequest,
) -> Result<Extraction, ApiError> {
    state
        .extractor
        .extract_with_id(request_id, request)
        .await
        .map_err(|e| {
            let err = ApiError::from(e);
            if err.status.is_server_error() {
                error!(kind = err.kind, error = %err.message, "Extraction failed");
            } else {
                warn!(kind = err.kind, error = %err.message, "Extraction rejected");
            }
            err
        })
}

async fn extract_text_api(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(submission): Json<TextSubmission>,
) -> ApiResult<ExtractionResponse> {
    let request_id = correlation_id(&headers);
    info!(
        request_id = %request_id,
        text_length = submission.text.len(),
        "Text extraction requested"
    );

    let extraction =
        run_extraction(&state, request_id, ExtractionRequest::text(submission.text)).await?;
    Ok(Json(ExtractionResponse::new(
        state.extractor.model_name(),
        extraction,
    )))
}

async fn extract_image_api(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<ExtractionResponse> {
    let request_id = correlation_id(&headers);
    let images = read_uploads(multipart).await?;
    info!(
        request_id = %request_id,
        files = images.len(),
        total_bytes = images.iter().map(|i| i.data.len()).sum::<usize>(),
        "Image extraction requested"
    );

    let extraction =
        run_extraction(&state, request_id, ExtractionRequest::images(images)).await?;
    Ok(Json(ExtractionResponse::new(
        state.extractor.model_name(),
        extraction,
    )))
}

async fn extract_text_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(submission): Form<TextSubmission>,
) -> Result<(StatusCode, Html<String>), ApiError> {
    let request_id = correlation_id(&headers);
    info!(
        request_id = %request_id,
        text_length = submission.text.len(),
        "Text extraction submitted"
    );

    let view = PageView::idle(state.extractor.model_name())
        .on_tab(Tab::Text)
        .with_text(submission.text.clone());
    let outcome = run_extraction(&state, request_id, ExtractionRequest::text(submission.text)).await;

    render_outcome(&state, view, outcome)
}

async fn extract_image_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Html<String>), ApiError> {
    let request_id = correlation_id(&headers);
    let view = PageView::idle(state.extractor.model_name()).on_tab(Tab::Image);

    let images = match read_uploads(multipart).await {
        Ok(images) => images,
        Err(err) => return render_outcome(&state, view, Err(err)),
    };
    info!(
        request_id = %request_id,
        files = images.len(),
        "Image extraction submitted"
    );

    let view = view.with_file_names(
        images
            .iter()
            .filter_map(|i| i.file_name.clone())
            .collect(),
    );
    let outcome = run_extraction(&state, request_id, ExtractionRequest::images(images)).await;

    render_outcome(&state, view, outcome)
}

/// Re-renders the page with either the result table or the error banner.
fn render_outcome(
    state: &AppState,
    view: PageView,
    outcome: Result<Extraction, ApiError>,
) -> Result<(StatusCode, Html<String>), ApiError> {
    let (status, view) = match outcome {
        Ok(extraction) => (StatusCode::OK, view.with_extraction(&extraction)),
        Err(err) => (err.status, view.with_error(err.user_message())),
    };
    Ok((status, Html(state.pages.render(&view)?)))
}

/// Collects every uploaded file from the `files` (or `file`) parts.
/// Empty parts, sent by browsers when nothing was chosen, are skipped.
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<ImageAttachment>, ApiError> {
    let mut images = Vec::new();

    loop {
        let Some(field) = multipart.next_field().await? else {
            break;
        };

        if !matches!(field.name(), Some("files") | Some("file")) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let declared = field
            .content_type()
            .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
            .map(str::to_string);

        let data = field.bytes().await?;

        if data.is_empty() && file_name.is_empty() {
            continue;
        }

        let mime = declared
            .or_else(|| {
                mime_guess::from_path(&file_name)
                    .first_raw()
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut image = ImageAttachment::from_mime(data.to_vec(), &mime)?;
        if !file_name.is_empty() {
            image = image.with_file_name(file_name);
        }
        images.push(image);
    }

    Ok(images)
}

use crate::error::ApiError;
use crate::models::{CourseMetadata, JsonUploadRequest, StoredFile, UploadResponse, UploadedCourse};
use crate::naming::sanitize_original;
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::MultipartError, DefaultBodyLimit, FromRequest, Multipart, Path, Request, State,
    },
    http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Multipart parts carrying files must use this field name.
const UPLOAD_FIELD: &str = "files";

const INDEX_PAGE: &str = include_str!("../assets/index.html");

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload).options(preflight))
        .route("/files", get(list_files))
        .route("/download/:name", get(download))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

/// Accepts either `multipart/form-data` with `files` parts or a JSON body
/// `{filename, content}`.
async fn upload(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<UploadResponse>, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| rejection(e.status(), e.body_text()))?;
        upload_multipart(&state, multipart).await
    } else if content_type.starts_with("application/json") {
        let Json(payload) = Json::<JsonUploadRequest>::from_request(request, &state)
            .await
            .map_err(|e| rejection(e.status(), e.body_text()))?;
        upload_json(&state, payload).await
    } else {
        Err(ApiError::MalformedRequest(format!(
            "unsupported content type {:?}",
            content_type
        )))
    }
}

async fn upload_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(raw_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let Some(original) = sanitize_original(&raw_name) else {
            tracing::warn!(filename = %raw_name, "skipping part without a usable filename");
            continue;
        };

        let content = field.bytes().await.map_err(multipart_error)?;
        files.push(store_course(state, original, content).await?);
    }

    Ok(Json(UploadResponse::new(files)))
}

async fn upload_json(
    state: &AppState,
    payload: JsonUploadRequest,
) -> Result<Json<UploadResponse>, ApiError> {
    let original = sanitize_original(&payload.filename)
        .ok_or_else(|| ApiError::MalformedRequest("filename must not be empty".to_string()))?;

    let course = store_course(state, original, Bytes::from(payload.content)).await?;
    Ok(Json(UploadResponse::single(course)))
}

/// Allocate a name, persist, then classify. The stored file stays on disk
/// whatever classification does.
async fn store_course(
    state: &AppState,
    original: String,
    content: Bytes,
) -> Result<UploadedCourse, ApiError> {
    let saved_filename = state
        .allocator
        .allocate(&original, state.store.root())
        .await;
    let stored = state.store.write(&saved_filename, &content).await?;
    let metadata = classify(state, content, &original).await;

    tracing::info!(
        original = %original,
        saved = %stored.name,
        title = %metadata.title,
        category = %metadata.category,
        "upload classified"
    );

    Ok(UploadedCourse {
        metadata,
        saved_filename: stored.name,
        original_filename: original,
        path: stored.path,
        size: stored.size,
    })
}

async fn classify(state: &AppState, content: Bytes, original: &str) -> CourseMetadata {
    let classifier = Arc::clone(&state.classifier);
    let filename = original.to_string();

    match tokio::task::spawn_blocking(move || classifier.classify_bytes(&content, &filename)).await
    {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(error = %e, filename = %original, "classification failed, using filename");
            CourseMetadata::from_filename(original)
        }
    }
}

fn rejection(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::MalformedRequest(text)
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    rejection(err.status(), err.body_text())
}

async fn list_files(State(state): State<Arc<AppState>>) -> Result<Json<Vec<StoredFile>>, ApiError> {
    let files = state.store.list_courseware().await?;
    Ok(Json(files))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let (file, stored) = state.store.open(&name).await?;

    let content_type = if stored.name.ends_with(".html") || stored.name.ends_with(".htm") {
        HeaderValue::from_static("text/html; charset=utf-8")
    } else {
        HeaderValue::from_static("application/octet-stream")
    };

    let headers: [(HeaderName, HeaderValue); 4] = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_DISPOSITION, attachment_header(&stored.name)),
        (header::CONTENT_LENGTH, HeaderValue::from(stored.size)),
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// `attachment` with an ASCII fallback name plus the RFC 5987 UTF-8 form.
fn attachment_header(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();

    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

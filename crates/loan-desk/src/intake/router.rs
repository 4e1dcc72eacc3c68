use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::document::{DocumentError, Upload};
use super::domain::ApplicationStatus;
use super::export::records_to_csv;
use super::repository::RepositoryError;
use super::service::{IntakeError, LoanIntakeService};

const DEFAULT_LIST_LIMIT: usize = 50;
const UPLOAD_BODY_LIMIT: usize = 64 * 1024 * 1024;
const UPLOAD_FIELD: &str = "file";
const BATCH_FIELD: &str = "files";

/// Shared handler state: the service plus the batch ceiling enforced at this boundary.
#[derive(Clone)]
pub struct IntakeState {
    pub service: Arc<LoanIntakeService>,
    pub max_batch: usize,
}

/// Router builder exposing the intake, review and analytics endpoints.
pub fn intake_router(service: Arc<LoanIntakeService>, max_batch: usize) -> Router {
    Router::new()
        .route("/api/v1/loans/documents", post(upload_handler))
        .route("/api/v1/loans/documents/batch", post(batch_upload_handler))
        .route("/api/v1/loans/applications", get(list_handler))
        .route("/api/v1/loans/applications/export", get(export_handler))
        .route("/api/v1/loans/applications/:application_id", get(detail_handler))
        .route(
            "/api/v1/loans/applications/:application_id/notes",
            post(note_handler),
        )
        .route(
            "/api/v1/loans/applications/:application_id/status",
            put(status_handler),
        )
        .route(
            "/api/v1/loans/applications/:application_id/questions",
            post(question_handler),
        )
        .route(
            "/api/v1/loans/applications/:application_id/alternatives",
            post(alternatives_handler),
        )
        .route("/api/v1/loans/analytics/summary", get(analytics_handler))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .with_state(IntakeState { service, max_batch })
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NoteRequest {
    pub(crate) note: String,
    pub(crate) officer_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    pub(crate) status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionRequest {
    pub(crate) question: String,
}

pub(crate) async fn upload_handler(State(state): State<IntakeState>, multipart: Multipart) -> Response {
    let mut uploads = match read_uploads(multipart, UPLOAD_FIELD).await {
        Ok(uploads) => uploads,
        Err(response) => return response,
    };
    if uploads.len() != 1 {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("expected exactly one document in the '{UPLOAD_FIELD}' field"),
        );
    }
    let upload = uploads.remove(0);

    match run_blocking(&state, move |service| service.process_upload(&upload)).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn batch_upload_handler(
    State(state): State<IntakeState>,
    multipart: Multipart,
) -> Response {
    let uploads = match read_uploads(multipart, BATCH_FIELD).await {
        Ok(uploads) => uploads,
        Err(response) => return response,
    };
    if uploads.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("no documents uploaded in the '{BATCH_FIELD}' field"),
        );
    }
    if uploads.len() > state.max_batch {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("maximum {} documents per batch", state.max_batch),
        );
    }

    match run_blocking(&state, move |service| Ok(service.process_upload_batch(&uploads))).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn list_handler(
    State(state): State<IntakeState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let filter = query.status;
    let result = run_blocking(&state, move |service| {
        service.list(filter.as_deref(), usize::MAX)
    })
    .await;

    match result {
        Ok(records) => {
            let total = records.len();
            let applications: Vec<_> = records
                .iter()
                .take(limit)
                .map(|record| record.summary_view())
                .collect();
            let payload = json!({ "applications": applications, "total": total });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn export_handler(
    State(state): State<IntakeState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(usize::MAX);
    let filter = query.status;
    let records = match run_blocking(&state, move |service| {
        service.list(filter.as_deref(), limit)
    })
    .await
    {
        Ok(records) => records,
        Err(response) => return response,
    };

    match records_to_csv(&records) {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime::TEXT_CSV_UTF_8.as_ref()),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"loan_applications.csv\"",
                ),
            ],
            body,
        )
            .into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub(crate) async fn detail_handler(
    State(state): State<IntakeState>,
    Path(application_id): Path<String>,
) -> Response {
    match run_blocking(&state, move |service| service.get(&application_id)).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn note_handler(
    State(state): State<IntakeState>,
    Path(application_id): Path<String>,
    Json(request): Json<NoteRequest>,
) -> Response {
    if request.note.trim().is_empty() || request.officer_name.trim().is_empty() {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "note and officer_name must not be empty",
        );
    }

    let result = run_blocking(&state, move |service| {
        service.add_note(&application_id, &request.note, &request.officer_name)
    })
    .await;

    match result {
        Ok(note) => {
            let payload = json!({
                "success": true,
                "message": "Note added successfully",
                "note": note,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn status_handler(
    State(state): State<IntakeState>,
    Path(application_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Response {
    let status: ApplicationStatus = match request.status.parse() {
        Ok(status) => status,
        Err(err) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
    };

    match run_blocking(&state, move |service| {
        service.update_status(&application_id, status)
    })
    .await
    {
        Ok(record) => (StatusCode::OK, Json(record.summary_view())).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn question_handler(
    State(state): State<IntakeState>,
    Path(application_id): Path<String>,
    Json(request): Json<QuestionRequest>,
) -> Response {
    if request.question.trim().is_empty() {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "question must not be empty");
    }

    let question = request.question.clone();
    match run_blocking(&state, move |service| {
        service.ask(&application_id, &request.question)
    })
    .await
    {
        Ok(answer) => {
            let payload = json!({ "question": question, "answer": answer });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn alternatives_handler(
    State(state): State<IntakeState>,
    Path(application_id): Path<String>,
) -> Response {
    match run_blocking(&state, move |service| service.alternatives(&application_id)).await {
        Ok(terms) => (StatusCode::OK, Json(terms)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn analytics_handler(State(state): State<IntakeState>) -> Response {
    match run_blocking(&state, |service| service.summary()).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(response) => response,
    }
}

/// The pipeline and collaborator clients block; keep them off the async workers.
async fn run_blocking<T, F>(state: &IntakeState, work: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&LoanIntakeService) -> Result<T, IntakeError> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || work(&service)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(intake_error_response(err)),
        Err(err) => {
            warn!(error = %err, "intake worker panicked");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "intake worker failed",
            ))
        }
    }
}

/// Collect the parts submitted under `field_name`; other form fields are skipped.
async fn read_uploads(mut multipart: Multipart, field_name: &str) -> Result<Vec<Upload>, Response> {
    let mut uploads = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(error_response(StatusCode::BAD_REQUEST, err.body_text())),
        };
        if field.name() != Some(field_name) {
            continue;
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .or_else(|| field.name().map(str::to_string))
            .unwrap_or_else(|| format!("upload-{}", uploads.len() + 1));
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return Err(error_response(StatusCode::BAD_REQUEST, err.body_text())),
        };
        uploads.push(Upload::new(name, bytes.to_vec()));
    }
    Ok(uploads)
}

pub(crate) fn intake_error_response(err: IntakeError) -> Response {
    let status = match &err {
        IntakeError::Document(DocumentError::NotPdf { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        IntakeError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        IntakeError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
        IntakeError::Classifier(_) => StatusCode::BAD_GATEWAY,
        IntakeError::Document(_) | IntakeError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, err.to_string())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    (status, Json(payload)).into_response()
}

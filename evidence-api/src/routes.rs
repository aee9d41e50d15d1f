use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use postureledger_compliance::evidence::IndexEntry;
use postureledger_compliance::ComplianceError;

use crate::api_types::{ErrorResponse, ExportRequest, ExportResponse, LinkQuery};
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// `GET /health` — liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /evidence` — every index entry.
pub async fn list_evidence(State(state): State<AppState>) -> Result<Json<Vec<IndexEntry>>, ApiError> {
    let entries = state.service.list().await.map_err(error_response)?;
    Ok(Json(entries))
}

/// `POST /export` — write a manifest for the requested ids.
///
/// The body is read as JSON whatever its content type. An unreadable body is
/// handled like an empty id list.
pub async fn export(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExportResponse>, ApiError> {
    let request = match serde_json::from_slice::<ExportRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "unreadable export request body");
            ExportRequest::default()
        }
    };
    let descriptor = state
        .service
        .export(&request.evidence_ids)
        .await
        .map_err(error_response)?;
    Ok(Json(ExportResponse {
        export_url: descriptor.export_url,
        count: descriptor.count,
    }))
}

/// `GET /exports/:file` — serve a manifest behind a signed link.
pub async fn fetch_manifest(
    State(state): State<AppState>,
    Path(file): Path<String>,
    query: Result<Query<LinkQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Ok(Query(link)) = query else {
        return Err(forbidden());
    };
    let bytes = state
        .service
        .fetch_manifest(&file, link.expires, &link.signature)
        .await
        .map_err(error_response)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

/// Fallback for unknown paths and methods.
pub async fn not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not found".to_string(),
        }),
    )
}

fn forbidden() -> ApiError {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "Invalid or expired link".to_string(),
        }),
    )
}

fn error_response(err: ComplianceError) -> ApiError {
    let status = match &err {
        ComplianceError::Validation { .. } => StatusCode::BAD_REQUEST,
        ComplianceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ComplianceError::Signature { .. } => return forbidden(),
        _ => {
            tracing::error!(error = %err, "request failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            );
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.message().to_string(),
        }),
    )
}

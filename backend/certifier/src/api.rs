//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::caller::{CallerContext, CallerStatus, WalletSession};
use crate::certifier::Certifier;
use crate::errors::{CertifierError, Result};
use crate::identity::IdentityRole;
use crate::issuance::{Document, IssuanceRequest};

/// Diplomas are scans or PDFs; allow up to 10 MiB per upload.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub certifier: Certifier,
    pub session: Arc<WalletSession>,
    pub status: watch::Receiver<Option<CallerStatus>>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(get_session))
        .route("/identities/:address", get(get_identity))
        .route(
            "/certificates",
            post(post_certificate).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/certificates/:address", get(get_certificate))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub connected: bool,
    pub caller: Option<CallerContext>,
    /// `None` while the role of a fresh caller is still being derived.
    pub role: Option<IdentityRole>,
}

#[derive(Serialize)]
pub struct IdentityResponse {
    pub address: String,
    pub role: IdentityRole,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

pub fn status_for(e: &CertifierError) -> StatusCode {
    match e {
        CertifierError::Validation(_) | CertifierError::InvalidAddress(_) => {
            StatusCode::BAD_REQUEST
        }
        CertifierError::NotConnected => StatusCode::UNAUTHORIZED,
        CertifierError::CallerChanged(_) => StatusCode::CONFLICT,
        CertifierError::DocumentTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        CertifierError::Authorization(_) => StatusCode::FORBIDDEN,
        CertifierError::DuplicateHolder(_) => StatusCode::CONFLICT,
        CertifierError::Upload(_) | CertifierError::LedgerUnavailable(_) => {
            StatusCode::BAD_GATEWAY
        }
        CertifierError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CertifierError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: CertifierError) -> Response {
    (
        status_for(&e),
        Json(ErrorResponse {
            error: e.to_string(),
            kind: e.kind(),
        }),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /session`
///
/// The connected caller and, once derived, its role.
pub async fn get_session(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let caller = state.session.current();
    let status = *state.status.borrow();
    let role = status
        .filter(|s| Some(s.caller) == caller)
        .map(|s| s.role);
    Json(SessionResponse {
        connected: caller.is_some(),
        caller,
        role,
    })
}

/// `GET /identities/:address`
pub async fn get_identity(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Response {
    match state.certifier.classify_identity(&address).await {
        Ok(role) => (StatusCode::OK, Json(IdentityResponse { address, role })).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /certificates/:address`
///
/// `200` with `status: found` or `status: not_found`; only malformed input
/// and collaborator failures are errors.
pub async fn get_certificate(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Response {
    match state.certifier.verify_certificate(&address).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /certificates`
///
/// Multipart form with `holder_address`, `student_name`, `specialization`,
/// `graduation_date` and a `document` file, issued under the session's
/// current caller. The caller is pinned before the body is read; a switch
/// of accounts before the ledger write aborts with `409 caller_changed`.
pub async fn post_certificate(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Response {
    let caller = match state.session.guard() {
        Ok(caller) => caller,
        Err(e) => return error_response(e),
    };
    let request = match read_issuance_form(multipart).await {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };
    match state.certifier.issue_certificate(&caller, request).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn read_issuance_form(mut multipart: Multipart) -> Result<IssuanceRequest> {
    let malformed = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            CertifierError::DocumentTooLarge(format!(
                "upload exceeds {} MiB",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            ))
        } else {
            CertifierError::Validation(format!("malformed form: {e}"))
        }
    };

    let mut request = IssuanceRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "document" => {
                let filename = field.file_name().unwrap_or("document").to_string();
                let media_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(malformed)?.to_vec();
                request.document = Some(Document {
                    filename,
                    media_type,
                    bytes,
                });
            }
            "holder_address" => {
                request.holder_address = field.text().await.map_err(malformed)?.trim().to_string()
            }
            "student_name" => request.student_name = field.text().await.map_err(malformed)?,
            "specialization" => request.specialization = field.text().await.map_err(malformed)?,
            "graduation_date" => {
                request.graduation_date = field.text().await.map_err(malformed)?
            }
            other => debug!("Ignoring form field {other:?}"),
        }
    }
    Ok(request)
}

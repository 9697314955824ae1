use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::chain::{explorer_url, Network};
use crate::payments::{LedgerEntry, LedgerFilter, RefundEligibility, RefundOptions, RefundReceipt, RefundRequest, StoreError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(reference) => ApiError::NotFound(reference),
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(reference) => (StatusCode::NOT_FOUND, format!("No ledger entry for '{}'", reference)),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "Ledger store error in admin API");
                (StatusCode::SERVICE_UNAVAILABLE, "Ledger store unavailable".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub networks: Vec<Network>,
    pub ledger_backend: &'static str,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        networks: state.service.adapters().networks(),
        ledger_backend: state.service.ledger().store().backend(),
    })
}

pub async fn list_ledger(
    State(state): State<AdminState>,
    Query(filter): Query<LedgerFilter>,
) -> ApiResult<Vec<LedgerEntry>> {
    Ok(Json(state.service.ledger_entries(&filter).await?))
}

async fn find_entry(state: &AdminState, reference: &str) -> Result<LedgerEntry, ApiError> {
    state
        .service
        .ledger_entry(reference)
        .await?
        .ok_or_else(|| ApiError::NotFound(reference.to_string()))
}

pub async fn get_ledger_entry(
    State(state): State<AdminState>,
    Path(reference): Path<String>,
) -> ApiResult<LedgerEntry> {
    Ok(Json(find_entry(&state, &reference).await?))
}

pub async fn get_refund_eligibility(
    State(state): State<AdminState>,
    Path(reference): Path<String>,
) -> ApiResult<RefundEligibility> {
    let entry = find_entry(&state, &reference).await?;
    Ok(Json(state.service.refund_eligibility(&entry)))
}

/// Refund a recorded donation. An ineligible or failed refund is still a
/// 200 with `success: false`; the receipt carries the reason.
pub async fn post_refund(
    State(state): State<AdminState>,
    Path(reference): Path<String>,
    options: Option<Json<RefundOptions>>,
) -> ApiResult<RefundReceipt> {
    let entry = find_entry(&state, &reference).await?;
    let options = options.map(|Json(o)| o).unwrap_or_default();
    tracing::info!(reference = %reference, amount = ?options.amount, "Admin refund requested");
    Ok(Json(state.service.refund(&entry, options).await))
}

pub async fn list_refund_requests(State(state): State<AdminState>) -> ApiResult<Vec<RefundRequest>> {
    Ok(Json(state.service.refund_requests().await?))
}

#[derive(Debug, Deserialize)]
pub struct ExplorerQuery {
    pub network: String,
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct ExplorerLink {
    pub url: Option<String>,
}

pub async fn get_explorer_link(Query(query): Query<ExplorerQuery>) -> ApiResult<ExplorerLink> {
    if query.reference.trim().is_empty() {
        return Err(ApiError::BadRequest("reference must not be empty".to_string()));
    }
    let url = match query.network.parse::<Network>() {
        Ok(network) => network.explorer_url(&query.reference),
        Err(_) => Some(explorer_url(&query.reference, &query.network)),
    };
    Ok(Json(ExplorerLink { url }))
}

// api.rs — Read-only HTTP API over the trust engine and ledger.
//
// Every handler maps directly onto one engine query. Errors map to status
// codes in one place (`ApiError`): validation 400, missing 404, broken
// ledger chain 409 with the `ChainError` as body, anything else 500.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tc_ledger::{LedgerEntry, LedgerError, LedgerRecorder, VerifyControl, VerifyReport};
use tc_trust::{
    AgentTrust, AutonomyDecision, Calibration, DomainTrust, MeshTrust, RecoveryPath, TrustError,
    TrustScore, TrustStore,
};
use uuid::Uuid;

/// Largest page `GET /ledger` returns.
const MAX_PAGE: usize = 1000;
const DEFAULT_PAGE: usize = 100;

pub struct AppState {
    pub store: Arc<TrustStore>,
    pub mesh: Arc<MeshTrust>,
    pub ledger: Arc<dyn LedgerRecorder>,
    /// Upper bound on one `GET /ledger/verify` walk.
    pub verify_timeout: Duration,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trust", get(all_scores))
        .route("/trust/overall", get(overall))
        .route("/trust/domain/{domain}", get(domain_score))
        .route("/trust/domain/{domain}/autonomy", get(autonomy))
        .route("/trust/domain/{domain}/recovery", get(recovery))
        .route("/trust/domain/{domain}/calibration", get(calibration))
        .route("/trust/mesh", get(mesh_all))
        .route("/trust/mesh/{agent_id}", get(mesh_agent))
        .route("/ledger", get(ledger_list))
        .route("/ledger/verify", get(ledger_verify))
        .route("/ledger/entry/{entry_id}", get(ledger_entry))
        .route("/ledger/entity/{entity_type}/{entity_id}", get(ledger_entity))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    ChainBroken(tc_ledger::ChainError),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::ChainBroken(chain) => {
                (StatusCode::CONFLICT, json!({ "error": chain.to_string(), "chain": chain }))
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<TrustError> for ApiError {
    fn from(e: TrustError) -> Self {
        match e {
            TrustError::InvalidIdentifier { .. } | TrustError::InvalidConfidence(_) => {
                ApiError::BadRequest(e.to_string())
            }
            TrustError::NotFound(_) => ApiError::NotFound(e.to_string()),
            TrustError::Ledger(ledger) => ledger.into(),
            TrustError::DecayInProgress => ApiError::Conflict(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Chain(chain) => ApiError::ChainBroken(chain),
            LedgerError::DeadlineExceeded { .. } | LedgerError::Cancelled { .. } => {
                ApiError::Conflict(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run engine and ledger work off the async workers; both take blocking
/// locks and read files.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker failed: {e}")))?
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "tc-daemon" }))
}

async fn all_scores(State(state): State<Arc<AppState>>) -> ApiResult<BTreeMap<String, TrustScore>> {
    let scores = blocking(move || Ok(state.store.get_all_scores()?)).await?;
    Ok(Json(scores))
}

async fn overall(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let overall = blocking(move || Ok(state.store.overall_score()?)).await?;
    Ok(Json(json!({ "overall_score": overall })))
}

async fn domain_score(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> ApiResult<DomainTrust> {
    let trust = blocking(move || Ok(state.store.get_score(&domain)?)).await?;
    Ok(Json(trust))
}

#[derive(Debug, Deserialize)]
struct ConfidenceQuery {
    confidence: f64,
}

async fn autonomy(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    Query(query): Query<ConfidenceQuery>,
) -> ApiResult<AutonomyDecision> {
    let decision = blocking(move || Ok(state.store.decide(&domain, query.confidence)?)).await?;
    Ok(Json(decision))
}

async fn recovery(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> ApiResult<Option<RecoveryPath>> {
    let path = blocking(move || Ok(state.store.recovery_path(&domain)?)).await?;
    Ok(Json(path))
}

async fn calibration(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> ApiResult<Calibration> {
    let calibration = blocking(move || Ok(state.store.calibration(&domain)?)).await?;
    Ok(Json(calibration))
}

#[derive(Debug, Deserialize)]
struct MeshQuery {
    local_agent: String,
}

async fn mesh_all(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MeshQuery>,
) -> ApiResult<BTreeMap<String, BTreeMap<String, AgentTrust>>> {
    let all = blocking(move || Ok(state.mesh.get_all_trust(&query.local_agent)?)).await?;
    Ok(Json(all))
}

async fn mesh_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<MeshQuery>,
) -> ApiResult<BTreeMap<String, AgentTrust>> {
    let domains = blocking(move || {
        Ok(state
            .mesh
            .get_all_trust_for_agent(&query.local_agent, &agent_id)?)
    })
    .await?;
    Ok(Json(domains))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

async fn ledger_list(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<LedgerEntry>> {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    let ledger = Arc::clone(&state.ledger);
    let entries = blocking(move || Ok(ledger.list(page.offset, limit)?)).await?;
    Ok(Json(entries))
}

async fn ledger_verify(State(state): State<Arc<AppState>>) -> ApiResult<VerifyReport> {
    let ledger = Arc::clone(&state.ledger);
    let control = VerifyControl::new().with_timeout(state.verify_timeout);
    let report = blocking(move || Ok(ledger.verify_chain(&control)?)).await?;
    Ok(Json(report))
}

async fn ledger_entry(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<String>,
) -> ApiResult<LedgerEntry> {
    let id = Uuid::parse_str(&entry_id)
        .map_err(|e| ApiError::BadRequest(format!("invalid entry id '{entry_id}': {e}")))?;
    let ledger = Arc::clone(&state.ledger);
    let entry = blocking(move || Ok(ledger.get_entry(id)?)).await?;
    entry
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no ledger entry {id}")))
}

async fn ledger_entity(
    State(state): State<Arc<AppState>>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> ApiResult<Vec<LedgerEntry>> {
    let ledger = Arc::clone(&state.ledger);
    let entries =
        blocking(move || Ok(ledger.entity_history(&entity_type, &entity_id)?)).await?;
    Ok(Json(entries))
}

//! Axum route handlers for the quest API.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use mathhub_core::{NewQuest, PrivilegeLevel, QueryRange, QuestId, QuestRecord, SandboxValue};

use crate::{auth::Caller, config::SharedEvaluator, error::GatewayError, store::QuestStore};

// ── Shared state ─────────────────────────────────────────────────────────────

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QuestStore>,
    pub evaluator: SharedEvaluator,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn QuestStore>, evaluator: SharedEvaluator) -> Self {
        Self { store, evaluator }
    }
}

// ── Request / response types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GetQuestBody {
    #[serde(rename = "questID")]
    pub quest_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerQuestBody {
    #[serde(rename = "questID")]
    pub quest_id: String,
    /// Values to feed the answer functions instead of the stored variables.
    #[serde(rename = "questionVar", default)]
    pub question_var: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub answer: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CreatedQuest {
    pub id: QuestId,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the application router over `state`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/quest", get(quest_page))
        .route("/quest/", get(quest_page))
        .route("/quest/getList", post(get_list))
        .route("/quest/getQuest", post(get_quest))
        .route("/quest/answerQuest", post(answer_quest))
        .route("/quest/newQuest", post(new_quest))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /health`: liveness check.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// `GET /quest/`: plain-text landing response.
pub async fn quest_page() -> &'static str {
    "Quest Page."
}

/// `POST /quest/getList`: published quests in the requested index range.
///
/// # Errors
/// Returns [`GatewayError::InvalidRequest`] if the body is not a
/// `{begin, end}` pair of integers, or [`GatewayError::Core`] if `end < begin`.
pub async fn get_list(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<QueryRange>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    caller.require(PrivilegeLevel::READER)?;
    let Json(range) =
        payload.map_err(|_| GatewayError::InvalidRequest("Invalid query range.".to_owned()))?;
    let (limit, offset) = range.window()?;
    Ok(Json(state.store.list_published(limit, offset).await))
}

/// `POST /quest/getQuest`: question content with FUNCTION variables
/// evaluated in a fresh sandbox.
///
/// # Errors
/// Returns [`GatewayError::NotFound`] if the quest is missing or not
/// published, or the sandbox error that aborted resolution.
pub async fn get_quest(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<GetQuestBody>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    caller.require(PrivilegeLevel::READER)?;
    let Json(body) = payload.map_err(invalid_body)?;
    let record = find_quest(&state, &body.quest_id).await?;
    if !record.is_servable() {
        return Err(GatewayError::NotFound(body.quest_id));
    }
    let content = state.evaluator.resolve_quest(&record).await?;
    Ok(Json(content))
}

/// `POST /quest/answerQuest`: grade a submission.
///
/// # Errors
/// Returns [`GatewayError::NotFound`] if the quest is missing, or the
/// sandbox error that aborted answer resolution.
pub async fn answer_quest(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<AnswerQuestBody>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    caller.require(PrivilegeLevel::READER)?;
    let Json(body) = payload.map_err(invalid_body)?;
    let record = find_quest(&state, &body.quest_id).await?;

    let supplied = body
        .question_var
        .map(|values| values.into_iter().map(SandboxValue::from_json).collect());
    let submitted: Vec<SandboxValue> = body.answer.into_iter().map(SandboxValue::from_json).collect();

    let outcome = state
        .evaluator
        .grade_submission(&record.question_var, &record.answer, supplied, &submitted)
        .await?;
    tracing::info!(quest = %record.id, user = %caller.user_id, correct = outcome.is_correct, "answer checked");
    Ok(Json(outcome))
}

/// `POST /quest/newQuest`: publish a quest. Requires publisher privilege.
///
/// # Errors
/// Returns [`GatewayError::Forbidden`] below publisher privilege, and
/// [`GatewayError::Core`] if an entry kind is undefined or the code is
/// already taken.
pub async fn new_quest(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<NewQuest>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    caller.require(PrivilegeLevel::PUBLISHER)?;
    let Json(submission) = payload.map_err(invalid_body)?;
    let record = submission.into_record(caller.user_id, caller.name)?;
    let id = record.id;
    state.store.insert(record).await?;
    Ok((StatusCode::CREATED, Json(CreatedQuest { id })))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn find_quest(state: &AppState, raw_id: &str) -> Result<QuestRecord, GatewayError> {
    let id = Uuid::parse_str(raw_id.trim()).map_err(|_| GatewayError::NotFound(raw_id.to_owned()))?;
    state
        .store
        .get(QuestId::from(id))
        .await
        .ok_or_else(|| GatewayError::NotFound(raw_id.to_owned()))
}

#[expect(clippy::needless_pass_by_value, reason = "used as a map_err adapter")]
fn invalid_body(rejection: JsonRejection) -> GatewayError {
    GatewayError::InvalidRequest(rejection.body_text())
}

//! HTTP endpoints for inspecting games and triggering actions by hand.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use director_core::Action;
use director_engine::errors::CoordinatorError;
use director_engine::{EngineError, ForceOutcome, ForceRequest, GameSummary};
use metrics::counter;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::metrics::HTTP_FORCE_REQUESTS_TOTAL;
use crate::server::AppState;

/// Body of `POST /games/{game}/force`.
#[derive(Clone, Debug, Deserialize)]
pub struct ForceBody {
    /// Candidate action names.
    pub action_names: Vec<String>,
    /// Prompt for the chosen action.
    #[serde(default)]
    pub query: String,
    /// Optional serialized game state.
    #[serde(default)]
    pub state: Option<String>,
    /// Forget query/state once the invocation completes.
    #[serde(default)]
    pub ephemeral_context: bool,
    /// Arguments for the invoke. Strings pass through; anything else is
    /// JSON-encoded.
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<ForceBody> for ForceRequest {
    fn from(body: ForceBody) -> Self {
        Self {
            candidates: body.action_names,
            query: body.query,
            state: body.state,
            ephemeral_context: body.ephemeral_context,
            data: body.data.map(|value| match value {
                Value::String(text) => text,
                other => other.to_string(),
            }),
        }
    }
}

/// An [`EngineError`] rendered as `{ "error": { "code", "message" } }`.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::UnknownGame(_) => StatusCode::NOT_FOUND,
            EngineError::Coordinator(CoordinatorError::NoValidCandidates { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::BAD_REQUEST,
        };
        let body = json!({
            "error": { "code": self.0.code(), "message": self.0.to_string() }
        });
        (status, Json(body)).into_response()
    }
}

/// GET /games
pub async fn list_games(State(state): State<AppState>) -> Json<Vec<GameSummary>> {
    Json(state.engine.games())
}

/// GET /games/{game}/actions
pub async fn list_actions(
    State(state): State<AppState>,
    Path(game): Path<String>,
) -> Result<Json<Vec<Action>>, ApiError> {
    state
        .engine
        .actions(&game)
        .map(Json)
        .ok_or(ApiError(EngineError::UnknownGame(game)))
}

/// POST /games/{game}/force
pub async fn force(
    State(state): State<AppState>,
    Path(game): Path<String>,
    Json(body): Json<ForceBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let outcome = state.engine.force(&game, body.into()).inspect_err(|err| {
        counter!(HTTP_FORCE_REQUESTS_TOTAL, "outcome" => err.code()).increment(1);
    })?;

    let body = match outcome {
        ForceOutcome::Scheduled { id, action } => {
            info!(game = %game, invocation = %id, action = %action, "force accepted over http");
            counter!(HTTP_FORCE_REQUESTS_TOTAL, "outcome" => "scheduled").increment(1);
            json!({ "status": "scheduled", "invocationId": id, "action": action })
        }
        ForceOutcome::Queued { depth } => {
            info!(game = %game, depth, "force queued over http");
            counter!(HTTP_FORCE_REQUESTS_TOTAL, "outcome" => "queued").increment(1);
            json!({ "status": "queued", "depth": depth })
        }
    };
    Ok((StatusCode::ACCEPTED, Json(body)))
}

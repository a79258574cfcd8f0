//! HTTP request handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};

use abot_core::DispatchOutcome;
use abot_types::{AbotError, ErrorKind, FlexIdType, SessionKey};

use super::ApiState;
use crate::service::{Handled, BUSY_REPLY, NOT_UNDERSTOOD_REPLY, TRAINED_REPLY};

/// Build all routes.
pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/", post(command))
        .route("/health", get(health_check))
}

/// Query parameters of `POST /`. All three are required; they are
/// optional here so a missing one is answered with a plain 400.
#[derive(Debug, Default, Deserialize)]
pub struct CommandParams {
    pub flexidtype: Option<String>,
    pub flexid: Option<String>,
    pub cmd: Option<String>,
}

impl CommandParams {
    pub fn session_key(&self) -> Result<SessionKey, AbotError> {
        let space: FlexIdType = self
            .flexidtype
            .as_deref()
            .ok_or_else(|| AbotError::bad_request("missing flexidtype"))?
            .parse()?;
        let id = self
            .flexid
            .as_deref()
            .ok_or_else(|| AbotError::bad_request("missing flexid"))?;
        SessionKey::new(space, id)
    }

    pub fn cmd(&self) -> Result<&str, AbotError> {
        self.cmd
            .as_deref()
            .ok_or_else(|| AbotError::bad_request("missing cmd"))
    }
}

async fn command(
    State(state): State<ApiState>,
    Query(params): Query<CommandParams>,
) -> (StatusCode, String) {
    let result = match (params.session_key(), params.cmd()) {
        (Ok(key), Ok(cmd)) => state.abot.handle(&key, cmd).await,
        (Err(e), _) | (_, Err(e)) => Err(e),
    };
    match result {
        Ok(handled) => {
            let (status, body) = render(&handled, state.abot.config().fallback_reply.as_deref());
            info!(status = status.as_u16(), "command handled");
            (status, body)
        }
        Err(e) => {
            debug!(error = %e, "command rejected");
            (error_status(&e), e.to_string())
        }
    }
}

/// Map a handled command to its status and reply body.
pub fn render(handled: &Handled, fallback: Option<&str>) -> (StatusCode, String) {
    match handled {
        Handled::Dispatched(outcome) => {
            let status = match outcome {
                DispatchOutcome::Reply { .. } => StatusCode::OK,
                DispatchOutcome::NoHandler => match fallback {
                    Some(reply) => return (StatusCode::OK, reply.to_string()),
                    None => StatusCode::SERVICE_UNAVAILABLE,
                },
                DispatchOutcome::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
                DispatchOutcome::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                DispatchOutcome::PluginFailed { .. } => StatusCode::BAD_GATEWAY,
            };
            (status, outcome.reply_text().to_string())
        }
        Handled::Trained => (StatusCode::OK, TRAINED_REPLY.to_string()),
        Handled::Busy => (StatusCode::TOO_MANY_REQUESTS, BUSY_REPLY.to_string()),
        Handled::NotUnderstood => (StatusCode::OK, NOT_UNDERSTOOD_REPLY.to_string()),
    }
}

fn error_status(err: &AbotError) -> StatusCode {
    match err.kind() {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Returns basic health status, version, and the registered plugins.
async fn health_check(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "plugins": state.abot.registry().list(),
    }))
}

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::{
    error::{AppError, AppJson},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ParseResumeRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ParseResumeResponse {
    #[serde(rename = "parsedResume")]
    pub parsed_resume: serde_json::Value,
}

pub fn resume_routes() -> Router<AppState> {
    Router::new().route("/auth/parse", post(parse_resume))
}

#[instrument(skip(state, payload))]
pub async fn parse_resume(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ParseResumeRequest>,
) -> Result<Json<ParseResumeResponse>, AppError> {
    if payload.text.trim().is_empty() {
        warn!("empty resume text");
        return Err(AppError::validation("Resume text is required"));
    }

    let parser = state
        .resume_parser
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Resume parsing is not configured".into()))?;

    let parsed_resume = parser.parse(&payload.text).await.map_err(|e| {
        error!(error = %e, "resume parsing failed");
        AppError::Upstream("Failed to parse resume".into())
    })?;

    info!(chars = payload.text.len(), "resume parsed");
    Ok(Json(ParseResumeResponse { parsed_resume }))
}

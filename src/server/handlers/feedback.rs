use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::feedback::{FeedbackRecord, Rating};
use crate::generation::Modality;
use crate::state::AppState;

const FEEDBACK_SOURCE: &str = "user-feedback";

#[derive(Debug, Deserialize)]
pub struct FeedbackMetadata {
    pub thumbs_up: bool,
    pub primary_issue: Option<String>,
    #[serde(default)]
    pub has_better_solution: bool,
    pub solution_type: Option<String>,
    pub better_solution_text: Option<String>,
    pub better_solution_image_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub message_id: String,
    pub query: String,
    /// Echo of the answer being rated. Kept opaque.
    #[serde(default)]
    pub agent_response: Value,
    pub feedback: FeedbackMetadata,
}

/// The corrected solution carried by negative feedback, if any.
async fn corrected_solution(state: &AppState, feedback: &FeedbackMetadata) -> Option<String> {
    if feedback.thumbs_up || !feedback.has_better_solution {
        return None;
    }

    let solution = match feedback.solution_type.as_deref().unwrap_or("text") {
        "image" => {
            let data = feedback.better_solution_image_base64.as_deref()?;
            match state.transcriber.transcribe(Modality::Image, data).await {
                Ok(text) => Some(text),
                Err(err) => {
                    tracing::warn!(reason = %err, "feedback.solution_transcription_failed");
                    None
                }
            }
        }
        // PDF uploads arrive with their text already extracted.
        "text" | "pdf" => feedback.better_solution_text.clone(),
        other => {
            tracing::warn!(solution_type = other, "feedback.unknown_solution_type");
            None
        }
    };

    solution
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Validates the solution with the generator and stores it in the
/// knowledge base when it holds up. Any failure counts as not updated.
async fn update_knowledge_base(state: &AppState, question: &str, solution: &str) -> bool {
    match state.generator.validate_solution(question, solution).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("kb_update.validation_failed");
            return false;
        }
        Err(err) => {
            tracing::warn!(reason = %err, "kb_update.validation_error");
            return false;
        }
    }

    match state
        .retriever
        .add_entry(question, solution, FEEDBACK_SOURCE)
        .await
    {
        Ok(_) => true,
        Err(err) => {
            tracing::error!(reason = %err, "kb_update.failed");
            false
        }
    }
}

pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    if payload.message_id.trim().is_empty() {
        return Err(ApiError::BadRequest("message_id is required".to_string()));
    }
    tracing::info!(
        message_id = %payload.message_id,
        helpful = payload.feedback.thumbs_up,
        issue = payload.feedback.primary_issue.as_deref().unwrap_or(""),
        "feedback.received"
    );

    let solution = corrected_solution(&state, &payload.feedback).await;

    let mut record = FeedbackRecord::new(
        payload.message_id.clone(),
        Rating::from_thumbs_up(payload.feedback.thumbs_up),
        payload.query.clone(),
    );
    record.reason_code = payload.feedback.primary_issue.clone();
    record.corrected_solution = solution.clone();
    record.agent_response = payload.agent_response;
    state
        .feedback
        .record(&record)
        .await
        .map_err(ApiError::internal)?;

    let Some(solution) = solution else {
        return Ok(Json(json!({"status": "ok", "feedback_saved": true})));
    };

    let kb_updated = update_knowledge_base(&state, &payload.query, &solution).await;
    Ok(Json(json!({
        "status": "ok",
        "feedback_saved": true,
        "kb_updated": kb_updated
    })))
}

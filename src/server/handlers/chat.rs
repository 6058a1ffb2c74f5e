use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::generation::{Modality, Step};
use crate::graph::{AnswerSource, PipelineState};
use crate::retrieval::KnowledgeHit;
use crate::search::{Citation, ProviderAttempt};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub modality: Modality,
    pub image_base64: Option<String>,
    pub audio_base64: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message_id: String,
    pub answer: String,
    pub steps: Vec<Step>,
    pub citations: Vec<Citation>,
    pub knowledge_hits: Vec<KnowledgeHit>,
    pub retrieved_from_kb: bool,
    pub source: AnswerSource,
    pub feedback_required: bool,
    pub gateway_trace: Vec<String>,
    pub search_attempts: Vec<ProviderAttempt>,
}

impl ChatResponse {
    fn from_state(state: PipelineState) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            retrieved_from_kb: state.retrieved_from_kb(),
            source: state.source(),
            answer: state.answer,
            steps: state.steps,
            citations: state.citations,
            knowledge_hits: state.knowledge_hits,
            feedback_required: true,
            gateway_trace: state.gateway_trace,
            search_attempts: state.web.attempts,
        }
    }
}

/// Picks the question text: a transcription of the attachment when the
/// modality asks for one, else the typed query.
async fn resolve_query(state: &AppState, payload: &ChatRequest) -> Result<String, ApiError> {
    let attachment = match payload.modality {
        Modality::Text => None,
        Modality::Image => payload.image_base64.as_deref(),
        Modality::Audio => payload.audio_base64.as_deref(),
    }
    .filter(|data| !data.trim().is_empty());

    let Some(data) = attachment else {
        return Ok(payload.query.clone());
    };

    let transcribed = match state.transcriber.transcribe(payload.modality, data).await {
        Ok(text) => Some(text).filter(|t| !t.trim().is_empty()),
        Err(err) => {
            tracing::warn!(modality = ?payload.modality, reason = %err, "chat.transcription_failed");
            None
        }
    };

    match transcribed {
        Some(text) => Ok(text),
        None if !payload.query.trim().is_empty() => Ok(payload.query.clone()),
        None => Err(ApiError::BadRequest(
            "No question could be read from the attachment".to_string(),
        )),
    }
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    tracing::info!(modality = ?payload.modality, "chat.request");

    let query = resolve_query(&state, &payload).await?;
    if query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".to_string()));
    }

    // Dropping the run on timeout abandons any in-flight provider or model call.
    let run = state
        .graph_runtime
        .run(PipelineState::new(query), &state.pipeline);
    let final_state = tokio::time::timeout(state.config.request_timeout(), run)
        .await
        .map_err(|_| {
            tracing::warn!(
                timeout_secs = state.config.app.request_timeout_secs,
                "chat.timeout"
            );
            ApiError::Timeout
        })??;

    if let Some(blocked) = &final_state.blocked {
        return Err(ApiError::GuardrailRejected(blocked.message.clone()));
    }

    let response = ChatResponse::from_state(final_state);
    tracing::info!(
        message_id = %response.message_id,
        source = response.source.as_str(),
        documents = response.citations.len(),
        "chat.completed"
    );
    Ok(Json(response))
}

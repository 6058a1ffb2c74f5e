use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to initialize history store: {0}")]
    History(#[source] anyhow::Error),

    #[error("Failed to compile guardrail keywords: {0}")]
    Guardrails(#[source] anyhow::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] anyhow::Error),

    #[error("Failed to build pipeline graph: {0}")]
    Graph(#[source] anyhow::Error),
}

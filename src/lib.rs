pub mod core;
pub mod feedback;
pub mod generation;
pub mod graph;
pub mod guardrails;
pub mod history;
pub mod retrieval;
pub mod search;
pub mod server;
pub mod state;

//! Gateway module - request orchestration over resolved backends

pub mod orchestrator;
pub mod retry;

pub use orchestrator::{
    count_tokens, GenerationStream, RetryNotice, StreamEvent, StreamOrchestrator, StreamOutcome,
};
pub use retry::RetryPolicy;

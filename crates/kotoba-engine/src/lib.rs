//! Resilient model pipeline for the kanji-learning service: typed requests go
//! in, and each task walks a fallback cascade of model/prompt configurations
//! until an attempt yields a validated result.

pub mod cascade;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod placeholder;
pub mod prompts;
pub mod tasks;
pub mod transport;

pub use cascade::{AttemptRecord, CascadeReport, CascadeState, PlanStep};
pub use config::{ApiKey, EngineConfig, TaskTimeouts};
pub use error::PipelineError;
pub use handlers::{handle, Endpoint};
pub use prompts::{build_prompt, Prompt, PromptVariant, TaskInput, TaskKind};
pub use tasks::{KotobaEngine, TaskFailure, TaskOutput, TaskResult};
pub use transport::{
    DryrunTransport, GeminiTransport, GenerateRequest, GenerateResponse, GenerativeTransport,
    ScriptedReply, ScriptedTransport,
};

//! Natural-language interpretation for attendly.
//!
//! The language model is strictly a translator: it turns a chat message into a
//! candidate leave or an analytics question into a query intent. Calendar rules,
//! persistence and aggregation are decided elsewhere, deterministically.
//!
//! - [`interpretation`] - leave statements to [`attendly_core::InterpretedLeave`]
//! - [`classifier`] - analytics questions to [`attendly_core::QueryIntent`]
//! - [`llm`] - the client contract and an OpenAI-compatible HTTP client

pub mod classifier;
pub mod interpretation;
pub mod llm;
pub mod runtime;

pub use classifier::{ClassifierError, QueryClassifier};
pub use interpretation::{InterpretationError, InterpretationGateway, LeaveContext};
pub use llm::{CompletionRequest, LlmClient, LlmError, OpenAiCompatibleClient};
pub use runtime::AgentRuntime;

use std::sync::Arc;
use std::time::Duration;

use attendly_core::config::LlmConfig;

use crate::classifier::QueryClassifier;
use crate::interpretation::InterpretationGateway;
use crate::llm::{LlmClient, LlmError, OpenAiCompatibleClient};

/// Both interpretation schemas over one shared client, constructed once at
/// startup and handed to every worker.
pub struct AgentRuntime {
    interpreter: InterpretationGateway,
    classifier: QueryClassifier,
}

impl AgentRuntime {
    pub fn new(client: Arc<dyn LlmClient>, deadline: Duration) -> Self {
        Self {
            interpreter: InterpretationGateway::new(client.clone(), deadline),
            classifier: QueryClassifier::new(client, deadline),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = OpenAiCompatibleClient::from_config(config)?;
        Ok(Self::new(Arc::new(client), Duration::from_secs(config.timeout_secs)))
    }

    pub fn interpreter(&self) -> &InterpretationGateway {
        &self.interpreter
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }
}

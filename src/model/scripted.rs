//! Scripted model for tests and demos.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{ModelClient, ModelError, ModelReply, Prompt};

/// Replays a queue of canned outcomes and records every prompt it receives.
///
/// When the queue runs dry the last outcome is repeated if it was a reply,
/// which keeps "the model always answers X" scenarios short to write.
#[derive(Default)]
pub struct ScriptedModel {
    outcomes: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
    sticky: Mutex<Option<ModelReply>>,
    prompts: Mutex<Vec<Prompt>>,
    delay: Option<Duration>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reply_text(self, text: impl Into<String>) -> Self {
        self.push(Ok(ModelReply::Text(text.into())))
    }

    pub fn reply_json(self, value: Value) -> Self {
        self.push(Ok(ModelReply::Structured(value)))
    }

    pub fn fail(self, error: ModelError) -> Self {
        self.push(Err(error))
    }

    fn push(self, outcome: Result<ModelReply, ModelError>) -> Self {
        locked(&self.outcomes).push_back(outcome);
        self
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        locked(&self.prompts).len()
    }

    /// Prompts received, oldest first.
    pub fn prompts(&self) -> Vec<Prompt> {
        locked(&self.prompts).clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<ModelReply, ModelError> {
        locked(&self.prompts).push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = locked(&self.outcomes).pop_front();
        match next {
            Some(Ok(reply)) => {
                *locked(&self.sticky) = Some(reply.clone());
                Ok(reply)
            }
            Some(Err(error)) => Err(error),
            None => locked(&self.sticky)
                .clone()
                .ok_or_else(|| ModelError::Provider("script exhausted".to_string())),
        }
    }
}

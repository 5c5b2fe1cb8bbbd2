//! Test doubles for the model seam

use std::sync::Mutex;

use crate::error::PipelineResult;

use super::{ChatModel, GenerationParams};

/// A model whose answers are computed from the prompt by a closure
pub struct ScriptedModel<F> {
    respond: F,
    calls: Mutex<Vec<(String, GenerationParams)>>,
}

impl<F> ScriptedModel<F>
where
    F: Fn(&str) -> PipelineResult<String> + Sync,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }

    pub fn params(&self) -> Vec<GenerationParams> {
        self.calls.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }
}

impl<F> ChatModel for ScriptedModel<F>
where
    F: Fn(&str) -> PipelineResult<String> + Sync,
{
    async fn complete(&self, prompt: &str, params: GenerationParams) -> PipelineResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), params));
        (self.respond)(prompt)
    }
}

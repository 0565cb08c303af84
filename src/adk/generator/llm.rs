// SPDX-License-Identifier: MIT

//! LLM Generator - a system instruction plus one user prompt per call

use super::TextGenerator;
use crate::adk::error::{ModelError, ReqflowError};
use crate::adk::model::{Content, GenerationConfig, Model};
use async_trait::async_trait;
use std::sync::Arc;

/// Text generator backed by an LLM model
pub struct LlmGenerator {
    pub name: String,
    pub instruction: String,
    pub model: Arc<dyn Model>,
    pub config: Option<GenerationConfig>,
}

impl LlmGenerator {
    pub fn new(name: String, instruction: String, model: Arc<dyn Model>) -> Self {
        Self {
            name,
            instruction,
            model,
            config: None,
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = Some(config);
        self
    }

    fn history(&self, prompt: &str) -> Vec<Content> {
        let mut history = Vec::with_capacity(2);
        if !self.instruction.is_empty() {
            history.push(Content::system(self.instruction.clone()));
        }
        history.push(Content::user(prompt));
        history
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, ReqflowError> {
        let history = self.history(prompt);

        log::info!(
            "Generator {} sending prompt ({} chars)",
            self.name,
            prompt.len()
        );

        let response = self
            .model
            .generate_content(&history, self.config.as_ref())
            .await?;

        let text = response.text();
        if text.trim().is_empty() {
            log::warn!("Generator {} received an empty response", self.name);
            return Err(ModelError::EmptyResponse(self.name.clone()).into());
        }

        log::info!(
            "Generator {} returning text response (length: {}, preview: '{}')",
            self.name,
            text.len(),
            preview(&text, 100)
        );
        Ok(text)
    }
}

/// First `max` characters of `text`, cut on a char boundary
fn preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

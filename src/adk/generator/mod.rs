// SPDX-License-Identifier: MIT

//! Generator module - the text-generation capability workflow steps depend on
//!
//! Steps only see `TextGenerator`: one prompt in, one response out. Timeouts and
//! retries belong to the implementation, not to the workflow engine.

mod llm;

pub use llm::LlmGenerator;

use crate::adk::error::ReqflowError;
use async_trait::async_trait;

/// Core trait for text-generation collaborators
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the generator name (used in logs)
    fn name(&self) -> &str;

    /// Generate a response for the given prompt
    async fn generate(&self, prompt: &str) -> Result<String, ReqflowError>;
}

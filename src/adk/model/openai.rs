// SPDX-License-Identifier: MIT

//! OpenAI Model - ChatGPT API and Azure OpenAI implementation
//!
//! Both services speak the same chat-completions protocol; they differ in the
//! URL layout and in how the key is sent.

use super::{error_for_response, Content, GenerationConfig, Model, Part};
use crate::adk::error::{ModelError, ReqflowError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";

/// Where requests go and how they are authenticated
#[derive(Debug, Clone, PartialEq)]
enum Endpoint {
    OpenAI {
        base_url: String,
    },
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

/// OpenAI ChatGPT model implementation
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    endpoint: Endpoint,
}

impl OpenAIModel {
    /// Create a new OpenAIModel
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, ReqflowError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("OpenAI (OPENAI_API_KEY)".to_string()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
            endpoint: Endpoint::OpenAI { base_url },
        })
    }

    /// Create an Azure OpenAI deployment client
    ///
    /// Requires `AZURE_OPENAI_ENDPOINT` and `AZURE_OPENAI_API_KEY`.
    /// `AZURE_OPENAI_DEPLOYMENT` overrides `deployment`, `AZURE_OPENAI_API_VERSION`
    /// overrides the default API version.
    pub fn azure(deployment: String) -> Result<Self, ReqflowError> {
        let endpoint = env::var("AZURE_OPENAI_ENDPOINT")
            .map_err(|_| ReqflowError::config("AZURE_OPENAI_ENDPOINT must be set"))?;
        let api_key = env::var("AZURE_OPENAI_API_KEY").map_err(|_| {
            ModelError::ApiKeyMissing("Azure OpenAI (AZURE_OPENAI_API_KEY)".to_string())
        })?;
        let deployment = env::var("AZURE_OPENAI_DEPLOYMENT").unwrap_or(deployment);
        let api_version = env::var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|_| DEFAULT_AZURE_API_VERSION.to_string());

        Ok(Self::azure_from_config(
            endpoint,
            api_key,
            deployment,
            api_version,
        ))
    }

    /// Create an Azure OpenAI client from explicit values
    pub fn azure_from_config(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        let deployment = deployment.into();
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model_name: deployment.clone(),
            endpoint: Endpoint::Azure {
                endpoint: endpoint.into(),
                deployment,
                api_version: api_version.into(),
            },
        }
    }

    fn provider(&self) -> &'static str {
        match self.endpoint {
            Endpoint::OpenAI { .. } => "OpenAI",
            Endpoint::Azure { .. } => "AzureOpenAI",
        }
    }

    fn completions_url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAI { base_url } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            Endpoint::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    /// Convert internal Content to OpenAI message format
    fn content_to_openai_message(content: &Content) -> Value {
        let role = match content.role.as_str() {
            "system" => "system",
            "user" => "user",
            "model" => "assistant",
            other => other,
        };

        let text: String = content
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect();

        json!({
            "role": role,
            "content": text
        })
    }

    fn build_request_body(&self, history: &[Content], config: Option<&GenerationConfig>) -> Value {
        let messages: Vec<Value> = history
            .iter()
            .map(Self::content_to_openai_message)
            .collect();

        let mut body = json!({ "messages": messages });

        // Azure selects the model through the deployment in the URL
        if let Endpoint::OpenAI { .. } = self.endpoint {
            body["model"] = json!(self.model_name);
        }

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }

        body
    }

    /// Parse OpenAI response into Content
    fn parse_openai_response(response: &Value) -> Result<Content, ReqflowError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ModelError::InvalidResponse("No choices in OpenAI response".into()))?;

        let mut parts = Vec::new();
        if let Some(content) = choice["message"]["content"].as_str() {
            if !content.is_empty() {
                parts.push(Part::Text(content.to_string()));
            }
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ReqflowError> {
        let url = self.completions_url();
        let body = self.build_request_body(history, config);

        log::debug!(
            "{} request body: {}",
            self.provider(),
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);

        let request = match self.endpoint {
            Endpoint::OpenAI { .. } => {
                request.header("Authorization", format!("Bearer {}", self.api_key))
            }
            Endpoint::Azure { .. } => request.header("api-key", &self.api_key),
        };

        let resp = request.send().await?;

        if !resp.status().is_success() {
            return Err(error_for_response(self.provider(), resp).await);
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("{} response: {}", self.provider(), resp_json);

        Self::parse_openai_response(&resp_json)
    }
}

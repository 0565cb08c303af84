// SPDX-License-Identifier: MIT

//! Run configuration
//!
//! Loaded from an optional YAML file; secrets always come from the
//! environment. The run host builds every collaborator from this and hands
//! them to the workflow steps.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adk::error::{ModelError, ReqflowError};
use crate::adk::generator::LlmGenerator;
use crate::adk::model::gemini::GeminiModel;
use crate::adk::model::openai::OpenAIModel;
use crate::adk::model::{GenerationConfig, Model};

/// Default config file looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "reqflow.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReqflowConfig {
    /// Run id; a fresh uuid is used when absent
    pub thread_id: Option<String>,
    /// Collaborator that analyzes the requirement
    pub analyst: ModelDefinition,
    /// Collaborator that drafts the work items
    pub drafter: ModelDefinition,
    pub export: ExportConfig,
}

impl Default for ReqflowConfig {
    fn default() -> Self {
        Self {
            thread_id: None,
            analyst: ModelDefinition {
                provider: Some("Gemini".to_string()),
                model_name: "gemini-2.5-flash".to_string(),
                parameters: GenerationConfig {
                    temperature: Some(0.0),
                    max_output_tokens: Some(2048),
                    ..Default::default()
                },
                instructions: String::new(),
            },
            drafter: ModelDefinition {
                provider: Some("AzureOpenAI".to_string()),
                model_name: "gpt-4".to_string(),
                parameters: GenerationConfig::default(),
                instructions: String::new(),
            },
            export: ExportConfig::default(),
        }
    }
}

/// Model configuration for one collaborator
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ModelDefinition {
    /// Optional; falls back to `MODEL_PROVIDER`, then to the model name prefix
    pub provider: Option<String>,
    pub model_name: String,
    #[serde(default)]
    pub parameters: GenerationConfig,
    /// System instruction sent ahead of every prompt
    #[serde(default)]
    pub instructions: String,
}

/// Where the export collaborator writes its files
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub json_file: String,
    pub csv_file: String,
    pub raw_file: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            json_file: "ado_work_items.json".to_string(),
            csv_file: "ado_work_items.csv".to_string(),
            raw_file: "ado_work_items_raw.txt".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn json_path(&self) -> PathBuf {
        self.output_dir.join(&self.json_file)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(&self.csv_file)
    }

    pub fn raw_path(&self) -> PathBuf {
        self.output_dir.join(&self.raw_file)
    }
}

impl ReqflowConfig {
    /// Load from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ReqflowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ReqflowError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse_yaml(&content)
    }

    /// Load `path` if it exists, otherwise use the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ReqflowError> {
        let path = path.as_ref();
        if path.exists() {
            log::info!("Loading configuration from {}", path.display());
            Self::load(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn parse_yaml(content: &str) -> Result<Self, ReqflowError> {
        let config: ReqflowConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }
}

impl ModelDefinition {
    /// Provider name: explicit value > `MODEL_PROVIDER` env > model name prefix
    pub fn resolve_provider(&self) -> String {
        self.provider
            .clone()
            .or_else(|| env::var("MODEL_PROVIDER").ok())
            .unwrap_or_else(|| infer_provider_from_model(&self.model_name))
    }

    /// Instantiate the model client for this definition
    pub fn create_model(&self) -> Result<Arc<dyn Model>, ReqflowError> {
        let provider = self.resolve_provider();
        log::debug!(
            "Using provider '{}' with model '{}'",
            provider,
            self.model_name
        );

        match provider.as_str() {
            "Gemini" | "Google" | "gemini" => {
                Ok(Arc::new(GeminiModel::new(self.model_name.clone())?))
            }
            "OpenAI" | "openai" => Ok(Arc::new(OpenAIModel::new(self.model_name.clone())?)),
            "AzureOpenAI" | "Azure" | "azure" => {
                Ok(Arc::new(OpenAIModel::azure(self.model_name.clone())?))
            }
            _ => Err(ModelError::UnsupportedProvider(provider).into()),
        }
    }

    /// Build a named text generator backed by this model
    pub fn build_generator(&self, name: &str) -> Result<LlmGenerator, ReqflowError> {
        let model = self.create_model()?;
        Ok(
            LlmGenerator::new(name.to_string(), self.instructions.clone(), model)
                .with_config(self.parameters.clone()),
        )
    }
}

/// Infer the provider from the model name prefix
pub fn infer_provider_from_model(model_name: &str) -> String {
    let name_lower = model_name.to_lowercase();
    if name_lower.starts_with("gemini") || name_lower.starts_with("models/gemini") {
        "Gemini".to_string()
    } else if name_lower.starts_with("gpt") || name_lower.starts_with("o1") {
        "OpenAI".to_string()
    } else {
        "Gemini".to_string()
    }
}

pub mod prompt;
pub mod providers;

use crate::config::LlmConfig;
use crate::view::ViewStructure;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    Connection(String),

    #[error("LLM response error: {0}")]
    Response(String),

    #[error("LLM configuration error: {0}")]
    Config(String),

    #[error("view generation is disabled: no LLM backend configured")]
    Disabled,
}

/// Turns a free-text request into an unsaved view document.
#[async_trait]
pub trait ViewGenerator: Send + Sync {
    async fn generate_view(&self, request: &str) -> Result<ViewStructure, LlmError>;
}

pub struct LlmManager {
    backend: String,
    generator: Option<Box<dyn ViewGenerator>>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let generator: Option<Box<dyn ViewGenerator>> = match config.backend.as_str() {
            "remote" => Some(Box::new(providers::remote::RemoteLlmProvider::new(config)?)),
            "ollama" => Some(Box::new(providers::ollama::OllamaProvider::new(config)?)),
            "none" | "" => None,
            other => {
                return Err(LlmError::Config(format!("Unsupported LLM backend: {}", other)));
            }
        };

        Ok(Self {
            backend: config.backend.clone(),
            generator,
        })
    }

    pub fn disabled() -> Self {
        Self {
            backend: "none".to_string(),
            generator: None,
        }
    }

    pub fn with_generator(backend: impl Into<String>, generator: Box<dyn ViewGenerator>) -> Self {
        Self {
            backend: backend.into(),
            generator: Some(generator),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn generate_view(&self, request: &str) -> Result<ViewStructure, LlmError> {
        match &self.generator {
            Some(generator) => {
                info!("Generating view with backend {}", self.backend);
                generator.generate_view(request).await
            }
            None => Err(LlmError::Disabled),
        }
    }
}

/// Pulls the JSON document out of a model reply: the first ```json fence,
/// else the first bare fence, else the whole text.
pub fn extract_json(content: &str) -> &str {
    if let Some(start) = content.find("```json") {
        let body = &content[start + 7..];
        let end = body.find("```").unwrap_or(body.len());
        debug!("Extracted JSON from ```json block");
        return body[..end].trim();
    }

    if let Some(start) = content.find("```") {
        let body = &content[start + 3..];
        let end = body.find("```").unwrap_or(body.len());
        return body[..end].trim();
    }

    content.trim()
}

/// Parses a model reply into a view document.
pub fn parse_view(content: &str) -> Result<ViewStructure, LlmError> {
    let json = extract_json(content);
    if json.is_empty() {
        return Err(LlmError::Response("empty reply".to_string()));
    }

    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| LlmError::Response(format!("reply is not valid JSON: {}", e)))?;

    // Models sometimes answer with {"erro": "..."} instead of a view.
    if let Some(message) = value.get("erro").and_then(|v| v.as_str()) {
        return Err(LlmError::Response(message.to_string()));
    }

    let view: ViewStructure = serde_json::from_value(value)
        .map_err(|e| LlmError::Response(format!("reply is not a view document: {}", e)))?;

    if view.components.is_empty() {
        return Err(LlmError::Response("generated view has no components".to_string()));
    }

    Ok(view)
}

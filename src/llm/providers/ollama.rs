use crate::config::LlmConfig;
use crate::llm::prompt::build_prompt;
use crate::llm::{LlmError, ViewGenerator, parse_view};
use crate::view::ViewStructure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_URL: &str = "http://localhost:11434/api/generate";

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ViewGenerator for OllamaProvider {
    async fn generate_view(&self, request: &str) -> Result<ViewStructure, LlmError> {
        let prompt = build_prompt(request)?;

        info!("Sending request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.api_url);

        let body = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: OllamaOptions { temperature: 0.1 },
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!("Ollama API responded with status code: {} {}", status, error_body);
            return Err(LlmError::Response(format!(
                "Ollama API responded with status code: {} {}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::Response(format!("Failed to read response body: {}", e)))?;

        let ollama_response: OllamaResponse = serde_json::from_str(&response_text).map_err(|e| {
            error!("Failed to parse Ollama response: {} - Response was: {}", e, response_text);
            LlmError::Response(format!("Failed to parse Ollama response: {}", e))
        })?;

        debug!("Raw reply from Ollama: {}", ollama_response.response);
        parse_view(&ollama_response.response)
    }
}

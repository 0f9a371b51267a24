//! Delivery of rendered artifacts to the automation webhook.
//!
//! Everything produced in one run goes out in a single multipart POST: one
//! `files` part per image and one `metadata` field holding a JSON array with
//! an entry per image, in the same order.

pub mod job;

pub use job::{run_batch, ExportSummary};

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::db::StoreError;
use crate::interpreter::RenderedArtifact;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("render task failed: {0}")]
    Task(String),
}

/// One metadata entry, keyed the way the webhook flow expects.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMetadata {
    pub nome_visao: String,
    pub titulo_grafico: String,
    pub descricao: String,
    pub dados_raw: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
struct ExportItem {
    view_name: String,
    description: String,
    artifact: RenderedArtifact,
}

impl ExportItem {
    fn file_name(&self) -> String {
        format!("{}_{}.png", self.view_name, self.artifact.title)
    }
}

/// Artifacts from any number of views, sent together.
#[derive(Debug, Clone, Default)]
pub struct ExportBatch {
    items: Vec<ExportItem>,
}

impl ExportBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_view(&mut self, view_name: &str, description: &str, artifacts: Vec<RenderedArtifact>) {
        self.items.extend(artifacts.into_iter().map(|artifact| ExportItem {
            view_name: view_name.to_string(),
            description: description.to_string(),
            artifact,
        }));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.items.iter().map(ExportItem::file_name).collect()
    }

    pub fn metadata(&self) -> Vec<ArtifactMetadata> {
        self.items
            .iter()
            .map(|item| ArtifactMetadata {
                nome_visao: item.view_name.clone(),
                titulo_grafico: item.artifact.title.clone(),
                descricao: item.description.clone(),
                dados_raw: item.artifact.source_records(),
            })
            .collect()
    }

    fn to_form(&self) -> Result<Form, ExportError> {
        // File names go out as raw UTF-8, not percent-encoded.
        let mut form = Form::new().percent_encode_noop();
        for item in &self.items {
            let part = Part::bytes(item.artifact.image.bytes.to_vec())
                .file_name(item.file_name())
                .mime_str("image/png")?;
            form = form.part("files", part);
        }
        Ok(form.text("metadata", serde_json::to_string(&self.metadata())?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExportOutcome {
    /// Nothing was rendered, so no request was made.
    Skipped,
    Sent { artifacts: usize, status: u16 },
}

pub struct BatchExporter {
    client: reqwest::Client,
    endpoint: String,
}

impl BatchExporter {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ExportError::Client)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends the whole batch in one request. No retry: a failed delivery is
    /// returned to the caller.
    pub async fn export(&self, batch: &ExportBatch) -> Result<ExportOutcome, ExportError> {
        if batch.is_empty() {
            info!("No artifacts to export, webhook not called");
            return Ok(ExportOutcome::Skipped);
        }

        info!("Sending {} artifacts in one batch to {}", batch.len(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(batch.to_form()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Webhook rejected batch with status {}", status);
            return Err(ExportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!("Batch delivered, webhook answered {}", status);
        Ok(ExportOutcome::Sent {
            artifacts: batch.len(),
            status: status.as_u16(),
        })
    }
}

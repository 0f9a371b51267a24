use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{BatchExporter, ExportBatch, ExportError, ExportOutcome};
use crate::db::{StoreError, ViewStore};
use crate::interpreter::{Interpreter, PanelContent};
use crate::query::GlobalParams;

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub range: GlobalParams,
    pub views: usize,
    pub artifacts: usize,
    pub files: Vec<String>,
    /// `None` when no webhook is configured and the send was only simulated.
    pub outcome: Option<ExportOutcome>,
    pub warnings: Vec<String>,
}

struct Collected {
    batch: ExportBatch,
    views: usize,
    warnings: Vec<String>,
}

/// Renders the selected views (every stored view when `view_ids` is empty)
/// and delivers all their artifacts in one webhook request.
pub async fn run_batch(
    views: ViewStore,
    interpreter: Arc<Interpreter>,
    exporter: Option<&BatchExporter>,
    view_ids: Vec<i64>,
    range: GlobalParams,
) -> Result<ExportSummary, ExportError> {
    info!("Exporting views for period {} to {}", range.data_inicio, range.data_fim);

    let render_range = range;
    let collected = tokio::task::spawn_blocking(move || collect(&views, &interpreter, &view_ids, &render_range))
        .await
        .map_err(|e| ExportError::Task(e.to_string()))??;

    info!(
        "Rendered {} views into {} artifacts",
        collected.views,
        collected.batch.len()
    );

    let outcome = match exporter {
        Some(exporter) => Some(exporter.export(&collected.batch).await?),
        None => {
            warn!("Webhook URL not configured, simulating send of {} artifacts", collected.batch.len());
            None
        }
    };

    Ok(ExportSummary {
        range,
        views: collected.views,
        artifacts: collected.batch.len(),
        files: collected.batch.file_names(),
        outcome,
        warnings: collected.warnings,
    })
}

fn collect(
    views: &ViewStore,
    interpreter: &Interpreter,
    view_ids: &[i64],
    range: &GlobalParams,
) -> Result<Collected, StoreError> {
    let selected = if view_ids.is_empty() {
        views.list()?
    } else {
        view_ids
            .iter()
            .map(|&id| views.get(id))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut batch = ExportBatch::new();
    let mut warnings = Vec::new();
    for view in &selected {
        info!("Processing view '{}'", view.name);
        let rendered = interpreter.render_view(&view.structure, range);

        for panel in &rendered.panels {
            if let PanelContent::Error { message } = &panel.content {
                warnings.push(format!("{} / {}: {}", view.name, panel.title, message));
            }
        }
        warnings.extend(rendered.warnings.into_iter().map(|w| format!("{}: {}", view.name, w)));

        batch.add_view(
            &view.name,
            view.prompt_description.as_deref().unwrap_or_default(),
            rendered.artifacts,
        );
    }

    Ok(Collected {
        batch,
        views: selected.len(),
        warnings,
    })
}

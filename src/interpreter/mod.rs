//! Runs a view: each component's query goes through the cache, the rows are
//! date-bounded, and the component is rendered by its type.
//!
//! Components run one after another in declaration order. A failing
//! component is reported on its panel and yields no artifact; it never stops
//! the components after it.

pub mod date_filter;

pub use date_filter::DateFilter;

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::query::{Column, GlobalParams, QueryCache, QueryError, QueryResult, Value};
use crate::render::{ChartRenderer, ChartType, PngImage, RenderError, TableRenderer};
use crate::util::format::{format_grouped, EN_US};
use crate::view::{Component, ComponentPlan, SpecError, ViewStructure};

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("view has no component at index {0}")]
    NoSuchComponent(usize),
}

/// An exportable image plus the rows it was drawn from.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub title: String,
    pub component_index: usize,
    pub image: PngImage,
    pub source_rows: QueryResult,
}

impl RenderedArtifact {
    pub fn source_records(&self) -> Vec<serde_json::Value> {
        self.source_rows.to_json_records()
    }
}

/// What one component produced.
#[derive(Debug)]
pub enum ComponentOutput {
    Indicator { value: String },
    Table {
        rows: QueryResult,
        artifact: Option<RenderedArtifact>,
        image_error: Option<RenderError>,
    },
    Chart { artifact: RenderedArtifact },
    NoData,
}

/// Display-side description of one component, laid out on two columns.
#[derive(Debug, Clone, Serialize)]
pub struct Panel {
    pub index: usize,
    pub title: String,
    pub column: usize,
    #[serde(flatten)]
    pub content: PanelContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelContent {
    Indicator { value: String },
    Table {
        columns: Vec<Column>,
        rows: Vec<serde_json::Value>,
        artifact: Option<usize>,
    },
    Chart { artifact: usize },
    NoData,
    Error { message: String },
}

#[derive(Debug)]
pub struct ViewRender {
    pub view_name: String,
    pub panels: Vec<Panel>,
    pub artifacts: Vec<RenderedArtifact>,
    pub warnings: Vec<String>,
}

pub struct Interpreter {
    cache: Arc<QueryCache>,
    date_filter: DateFilter,
    charts: ChartRenderer,
    tables: TableRenderer,
}

impl Interpreter {
    pub fn new(cache: Arc<QueryCache>, date_filter: DateFilter) -> Self {
        Self {
            cache,
            date_filter,
            charts: ChartRenderer::default(),
            tables: TableRenderer,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn render_view(&self, view: &ViewStructure, params: &GlobalParams) -> ViewRender {
        let mut panels = Vec::with_capacity(view.components.len());
        let mut artifacts = Vec::new();
        let mut warnings = Vec::new();

        for (index, component) in view.components.iter().enumerate() {
            let title = component.title.clone();
            let content = match self.run(component, index, params, &mut warnings) {
                Ok(ComponentOutput::Indicator { value }) => PanelContent::Indicator { value },
                Ok(ComponentOutput::Table {
                    rows,
                    artifact,
                    image_error,
                }) => {
                    if let Some(e) = image_error {
                        warn!("View '{}' component {} ('{}'): table image failed: {}", view.name, index, title, e);
                        warnings.push(format!("{}: {}", title, e));
                    }
                    let artifact = artifact.map(|a| {
                        artifacts.push(a);
                        artifacts.len() - 1
                    });
                    PanelContent::Table {
                        columns: rows.columns().to_vec(),
                        rows: rows.to_json_records(),
                        artifact,
                    }
                }
                Ok(ComponentOutput::Chart { artifact }) => {
                    artifacts.push(artifact);
                    PanelContent::Chart {
                        artifact: artifacts.len() - 1,
                    }
                }
                Ok(ComponentOutput::NoData) => {
                    warnings.push(format!("{}: no data", title));
                    PanelContent::NoData
                }
                Err(e) => {
                    warn!("View '{}' component {} ('{}') failed: {}", view.name, index, title, e);
                    PanelContent::Error { message: e.to_string() }
                }
            };

            panels.push(Panel {
                index,
                title,
                column: index % 2,
                content,
            });
        }

        debug!("View '{}' produced {} artifacts", view.name, artifacts.len());
        ViewRender {
            view_name: view.name.clone(),
            panels,
            artifacts,
            warnings,
        }
    }

    /// Renders the component at `index` alone.
    pub fn render_component(
        &self,
        view: &ViewStructure,
        index: usize,
        params: &GlobalParams,
    ) -> Result<ComponentOutput, ComponentError> {
        let component = view
            .components
            .get(index)
            .ok_or(ComponentError::NoSuchComponent(index))?;
        let mut warnings = Vec::new();
        let output = self.run(component, index, params, &mut warnings);
        for w in warnings {
            warn!("{}", w);
        }
        output
    }

    fn run(
        &self,
        component: &Component,
        index: usize,
        params: &GlobalParams,
        warnings: &mut Vec<String>,
    ) -> Result<ComponentOutput, ComponentError> {
        let plan = component.plan(index)?;
        let fetched = self.cache.get_or_compute(plan.sql(), &params.to_query_params())?;

        let filtered = self.date_filter.apply(&fetched, params);
        for w in filtered.warnings {
            debug!("Component {} ('{}'): {}", index, plan.title(), w);
            warnings.push(format!("{}: {}", plan.title(), w));
        }
        let rows = filtered.rows;
        if rows.is_empty() {
            return Ok(ComponentOutput::NoData);
        }

        let output = match plan {
            ComponentPlan::Indicator { .. } => ComponentOutput::Indicator {
                value: indicator_text(rows.first_cell().unwrap_or(&Value::Null)),
            },
            ComponentPlan::Table { title, .. } => match self.tables.render_table(&rows, title) {
                Ok(image) => ComponentOutput::Table {
                    artifact: Some(RenderedArtifact {
                        title: format!("{} (Tabela)", title),
                        component_index: index,
                        image,
                        source_rows: rows.clone(),
                    }),
                    image_error: None,
                    rows,
                },
                Err(e) => ComponentOutput::Table {
                    rows,
                    artifact: None,
                    image_error: Some(e),
                },
            },
            ComponentPlan::Bar { title, axes, .. } => {
                self.chart(index, &rows, ChartType::Bar, title, axes.x, axes.y, None)?
            }
            ComponentPlan::Line { title, axes, .. } => {
                self.chart(index, &rows, ChartType::Line, title, axes.x, axes.y, None)?
            }
            ComponentPlan::Combo {
                title, axes, y_axis_2, ..
            } => self.chart(index, &rows, ChartType::Combo, title, axes.x, axes.y, Some(y_axis_2))?,
        };
        Ok(output)
    }

    #[allow(clippy::too_many_arguments)]
    fn chart(
        &self,
        index: usize,
        rows: &QueryResult,
        chart_type: ChartType,
        title: &str,
        x_axis: &str,
        y_axis: &str,
        y_axis_2: Option<&str>,
    ) -> Result<ComponentOutput, ComponentError> {
        let image = self.charts.render(rows, chart_type, title, x_axis, y_axis, y_axis_2)?;
        Ok(ComponentOutput::Chart {
            artifact: RenderedArtifact {
                title: title.to_string(),
                component_index: index,
                image,
                source_rows: rows.clone(),
            },
        })
    }
}

/// Scalar shown by an indicator: numbers grouped with two decimals.
fn indicator_text(value: &Value) -> String {
    match value {
        Value::Int(_) | Value::Float(_) => value
            .as_f64()
            .map(|v| format_grouped(v, 2, EN_US))
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::cache::tests::ManualClock;
    use crate::query::testing::RecordingStore;
    use crate::query::{ColumnType, QueryStore, ReadOnlyGuard};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn cat_v() -> QueryResult {
        QueryResult::new(
            vec![Column::new("cat", ColumnType::Text), Column::new("v", ColumnType::Float)],
            vec![
                vec![Value::from("A"), Value::Float(1.0)],
                vec![Value::from("B"), Value::Float(2.0)],
            ],
        )
    }

    fn interpreter(store: Arc<RecordingStore>) -> Interpreter {
        let guard: Arc<dyn QueryStore> = Arc::new(ReadOnlyGuard::new(store));
        let cache = QueryCache::with_clock(guard, Duration::from_secs(300), Arc::new(ManualClock::new()));
        Interpreter::new(Arc::new(cache), DateFilter::default())
    }

    fn responder(sql: &str) -> Result<QueryResult, QueryError> {
        if sql.contains("falha") {
            Err(QueryError::Conversion("connection reset".into()))
        } else if sql.contains("total") {
            Ok(QueryResult::new(
                vec![Column::new("total", ColumnType::Float)],
                vec![vec![Value::Float(1234567.891)]],
            ))
        } else if sql.contains("vazio") {
            Ok(QueryResult::new(vec![Column::new("cat", ColumnType::Text)], vec![]))
        } else {
            Ok(cat_v())
        }
    }

    fn january() -> GlobalParams {
        GlobalParams::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        )
    }

    fn view(json: &str) -> ViewStructure {
        ViewStructure::from_json(json).unwrap()
    }

    #[test]
    fn failing_component_does_not_stop_siblings() {
        let interp = interpreter(Arc::new(RecordingStore::with(responder)));
        let view = view(
            r#"{"nome": "V", "componentes": [
                {"tipo": "grafico_barra", "titulo": "Um", "sql": "SELECT cat, v FROM a", "eixo_x": "cat", "eixo_y": "v"},
                {"tipo": "grafico_barra", "titulo": "Dois", "sql": "SELECT falha", "eixo_x": "cat", "eixo_y": "v"},
                {"tipo": "grafico_linha", "titulo": "Tres", "sql": "SELECT cat, v FROM c", "eixo_x": "cat", "eixo_y": "v"}
            ]}"#,
        );

        let out = interp.render_view(&view, &january());

        let titles: Vec<&str> = out.artifacts.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Um", "Tres"]);
        assert!(matches!(&out.panels[1].content, PanelContent::Error { message } if message.contains("connection reset")));
        assert_eq!(out.panels.iter().map(|p| p.column).collect::<Vec<_>>(), vec![0, 1, 0]);
    }

    #[test]
    fn indicator_never_yields_an_artifact() {
        let interp = interpreter(Arc::new(RecordingStore::with(responder)));
        let view = view(r#"{"nome": "V", "componentes": [{"tipo": "indicador", "titulo": "Fat", "sql": "SELECT total"}]}"#);

        let out = interp.render_view(&view, &january());

        assert!(out.artifacts.is_empty());
        assert!(matches!(&out.panels[0].content, PanelContent::Indicator { value } if value == "1,234,567.89"));
    }

    #[test]
    fn table_yields_rows_and_titled_artifact() {
        let interp = interpreter(Arc::new(RecordingStore::with(responder)));
        let view = view(r#"{"nome": "V", "componentes": [{"tipo": "tabela", "titulo": "Top", "sql": "SELECT cat, v"}]}"#);

        let out = interp.render_view(&view, &january());

        assert_eq!(out.artifacts.len(), 1);
        assert_eq!(out.artifacts[0].title, "Top (Tabela)");
        assert_eq!(out.artifacts[0].source_records().len(), 2);
        assert!(matches!(&out.panels[0].content, PanelContent::Table { rows, artifact: Some(0), .. } if rows.len() == 2));
    }

    #[test]
    fn blocked_and_invalid_components_are_reported() {
        let store = Arc::new(RecordingStore::with(responder));
        let interp = interpreter(store.clone());
        let view = view(
            r#"{"nome": "V", "componentes": [
                {"tipo": "tabela", "titulo": "Apagar", "sql": "DELETE FROM pedidos"},
                {"tipo": "grafico_combinado", "titulo": "Sem y2", "sql": "SELECT cat, v", "eixo_x": "cat", "eixo_y": "v"},
                {"tipo": "tabela", "titulo": "Sem sql"},
                {"tipo": "tabela", "titulo": "Vazio", "sql": "SELECT vazio"}
            ]}"#,
        );

        let out = interp.render_view(&view, &january());

        assert!(out.artifacts.is_empty());
        assert!(matches!(&out.panels[0].content, PanelContent::Error { message } if message.starts_with("blocked")));
        assert!(matches!(&out.panels[1].content, PanelContent::Error { message } if message.contains("eixo_y2")));
        assert!(matches!(&out.panels[2].content, PanelContent::Error { .. }));
        assert!(matches!(&out.panels[3].content, PanelContent::NoData));
        // only the empty query reached the store
        assert_eq!(store.call_count(), 1);
    }

    #[test]
    fn repeated_renders_reuse_cached_results() {
        let store = Arc::new(RecordingStore::with(responder));
        let interp = interpreter(store.clone());
        let view = view(
            r#"{"nome": "V", "componentes": [{"tipo": "grafico_barra", "titulo": "Um", "sql": "SELECT cat, v", "eixo_x": "cat", "eixo_y": "v"}]}"#,
        );

        interp.render_view(&view, &january());
        interp.render_view(&view, &january());

        assert_eq!(store.call_count(), 1);
    }

    #[test]
    fn single_component_can_be_rendered() {
        let interp = interpreter(Arc::new(RecordingStore::with(responder)));
        let view = view(
            r#"{"nome": "V", "componentes": [
                {"tipo": "indicador", "titulo": "Fat", "sql": "SELECT total"},
                {"tipo": "grafico_barra", "titulo": "Um", "sql": "SELECT cat, v", "eixo_x": "cat", "eixo_y": "v"}
            ]}"#,
        );

        let output = interp.render_component(&view, 1, &january()).unwrap();
        assert!(matches!(output, ComponentOutput::Chart { artifact } if artifact.component_index == 1));
        assert!(matches!(
            interp.render_component(&view, 5, &january()),
            Err(ComponentError::NoSuchComponent(5))
        ));
    }
}

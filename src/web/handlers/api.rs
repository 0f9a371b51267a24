use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::db::StoreError;
use crate::export::{ExportError, ExportSummary, run_batch};
use crate::interpreter::{ComponentError, ComponentOutput, Panel, ViewRender};
use crate::llm::LlmError;
use crate::query::{CacheStats, Column, GlobalParams, QueryError, QueryParams, QueryStore};
use crate::view::{View, ViewStructure};
use crate::web::state::AppState;

type ApiError = (StatusCode, String);

// View types

#[derive(Debug, Deserialize)]
pub struct SaveViewRequest {
    pub name: String,
    #[serde(default)]
    pub prompt_description: Option<String>,
    pub structure: ViewStructure,
}

#[derive(Debug, Deserialize)]
pub struct GenerateViewRequest {
    pub request: String,
}

// Render types

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub structure: ViewStructure,
    #[serde(flatten)]
    pub range: GlobalParams,
}

#[derive(Debug, Serialize)]
pub struct ArtifactSummary {
    pub index: usize,
    pub title: String,
    pub component_index: usize,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub view_name: String,
    pub panels: Vec<Panel>,
    pub artifacts: Vec<ArtifactSummary>,
    pub warnings: Vec<String>,
}

// Export types

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub view_ids: Vec<i64>,
    #[serde(flatten)]
    pub range: GlobalParams,
}

// Query types

#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    pub query: String,
    /// Binds `:data_inicio`/`:data_fim` when present.
    #[serde(default)]
    pub range: Option<GlobalParams>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub columns: Vec<Column>,
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub data_inicio: Option<NaiveDate>,
    pub data_fim: Option<NaiveDate>,
}

// System status

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub view_count: usize,
    pub cache: CacheStats,
    pub cache_ttl_secs: u64,
    pub llm_backend: String,
    pub llm_enabled: bool,
    pub webhook_configured: bool,
    pub post_query_date_filter: bool,
}

// Error mapping

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        e => {
            error!("View store error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn query_error(e: QueryError) -> ApiError {
    match e {
        QueryError::Blocked(_) => (StatusCode::FORBIDDEN, e.to_string()),
        QueryError::Pool(_) => {
            error!("Query pool error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        e => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn llm_error(e: LlmError) -> ApiError {
    let status = match e {
        LlmError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
        LlmError::Connection(_) | LlmError::Response(_) => StatusCode::BAD_GATEWAY,
        LlmError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("View generation failed: {}", e);
    (status, e.to_string())
}

fn export_error(e: ExportError) -> ApiError {
    match e {
        ExportError::Store(e) => store_error(e),
        ExportError::Status { .. } | ExportError::Request(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
        e => {
            error!("Export failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn check_range(range: &GlobalParams) -> Result<(), ApiError> {
    if range.is_valid() {
        Ok(())
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            format!("data_inicio ({}) is after data_fim ({})", range.data_inicio, range.data_fim),
        ))
    }
}

/// Runs DuckDB and rasterisation work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!("Blocking task failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal task failed".to_string())
    })?
}

fn render_response(render: ViewRender, image_base: Option<(i64, &GlobalParams)>) -> RenderResponse {
    let artifacts = render
        .artifacts
        .iter()
        .enumerate()
        .map(|(index, artifact)| ArtifactSummary {
            index,
            title: artifact.title.clone(),
            component_index: artifact.component_index,
            width: artifact.image.width,
            height: artifact.image.height,
            bytes: artifact.image.len(),
            row_count: artifact.source_rows.len(),
            image_url: image_base.map(|(id, range)| {
                format!(
                    "/api/views/{}/components/{}/image?data_inicio={}&data_fim={}",
                    id, artifact.component_index, range.data_inicio, range.data_fim
                )
            }),
        })
        .collect();

    RenderResponse {
        view_name: render.view_name,
        panels: render.panels,
        artifacts,
        warnings: render.warnings,
    }
}

// Views

pub async fn list_views(State(state): State<Arc<AppState>>) -> Result<Json<Vec<View>>, ApiError> {
    let views = blocking(move || state.views.list().map_err(store_error)).await?;
    Ok(Json(views))
}

pub async fn create_view(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SaveViewRequest>,
) -> Result<(StatusCode, Json<View>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "View name must not be empty".to_string()));
    }

    let view = blocking(move || {
        state
            .views
            .create(&payload.name, payload.prompt_description.as_deref(), &payload.structure)
            .map_err(store_error)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_view(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<Json<View>, ApiError> {
    let view = blocking(move || state.views.get(id).map_err(store_error)).await?;
    Ok(Json(view))
}

pub async fn update_view(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<SaveViewRequest>,
) -> Result<Json<View>, ApiError> {
    let view = blocking(move || {
        let view = state
            .views
            .update(id, &payload.name, payload.prompt_description.as_deref(), &payload.structure)
            .map_err(store_error)?;
        state.cache().invalidate_all();
        Ok(view)
    })
    .await?;
    Ok(Json(view))
}

pub async fn delete_view(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    blocking(move || state.views.delete(id).map_err(store_error)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn generate_view(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateViewRequest>,
) -> Result<Json<ViewStructure>, ApiError> {
    if payload.request.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Request must not be empty".to_string()));
    }

    let structure = state
        .llm_manager
        .generate_view(&payload.request)
        .await
        .map_err(llm_error)?;
    info!("Generated view '{}' with {} components", structure.name, structure.components.len());
    Ok(Json(structure))
}

// Rendering

pub async fn render_view(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(range): Json<GlobalParams>,
) -> Result<Json<RenderResponse>, ApiError> {
    check_range(&range)?;

    let response = blocking(move || {
        let view = state.views.get(id).map_err(store_error)?;
        let render = state.interpreter.render_view(&view.structure, &range);
        Ok(render_response(render, Some((id, &range))))
    })
    .await?;
    Ok(Json(response))
}

pub async fn render_preview(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PreviewRequest>,
) -> Result<Json<RenderResponse>, ApiError> {
    check_range(&payload.range)?;

    let response = blocking(move || {
        let render = state.interpreter.render_view(&payload.structure, &payload.range);
        Ok(render_response(render, None))
    })
    .await?;
    Ok(Json(response))
}

pub async fn component_image(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(i64, usize)>,
    Query(range): Query<GlobalParams>,
) -> Result<Response, ApiError> {
    check_range(&range)?;

    let image = blocking(move || {
        let view = state.views.get(id).map_err(store_error)?;
        let output = state
            .interpreter
            .render_component(&view.structure, index, &range)
            .map_err(|e| match e {
                ComponentError::NoSuchComponent(_) => (StatusCode::NOT_FOUND, e.to_string()),
                ComponentError::Query(e) => query_error(e),
                e => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            })?;

        match output {
            ComponentOutput::Chart { artifact } => Ok(artifact.image),
            ComponentOutput::Table {
                artifact: Some(artifact),
                ..
            } => Ok(artifact.image),
            ComponentOutput::Table {
                image_error: Some(e), ..
            } => Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string())),
            ComponentOutput::Table { .. } | ComponentOutput::Indicator { .. } => Err((
                StatusCode::NOT_FOUND,
                format!("component {} has no image", index),
            )),
            ComponentOutput::NoData => Err((StatusCode::NOT_FOUND, "no data for the selected period".to_string())),
        }
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, "image/png")], image.bytes).into_response())
}

// Delivery

pub async fn export_views(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExportRequest>,
) -> Result<Json<ExportSummary>, ApiError> {
    check_range(&payload.range)?;

    let summary = run_batch(
        state.views.clone(),
        Arc::clone(&state.interpreter),
        state.exporter.as_ref(),
        payload.view_ids,
        payload.range,
    )
    .await
    .map_err(export_error)?;
    Ok(Json(summary))
}

// Data access

pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteQueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if let Some(range) = &payload.range {
        check_range(range)?;
    }

    let response = blocking(move || {
        let params = payload
            .range
            .map(|range| range.to_query_params())
            .unwrap_or_default();

        let start = Instant::now();
        let result = state.playground.fetch(&payload.query, &params).map_err(query_error)?;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        info!("Playground query returned {} rows in {} ms", result.len(), execution_time_ms);

        Ok(QueryResponse {
            columns: result.columns().to_vec(),
            rows: result.to_json_records(),
            row_count: result.len(),
            execution_time_ms,
        })
    })
    .await?;
    Ok(Json(response))
}

pub async fn date_range(State(state): State<Arc<AppState>>) -> Result<Json<DateRange>, ApiError> {
    let range = blocking(move || {
        let result = state
            .playground
            .fetch(
                "SELECT CAST(MIN(criado_em) AS DATE) AS inicio, CAST(MAX(criado_em) AS DATE) AS fim FROM pedidos",
                &QueryParams::new(),
            )
            .map_err(query_error)?;

        let row = result.rows().first();
        Ok(DateRange {
            data_inicio: row.and_then(|r| r.first()).and_then(|v| v.as_date()),
            data_fim: row.and_then(|r| r.get(1)).and_then(|v| v.as_date()),
        })
    })
    .await?;
    Ok(Json(range))
}

// System

pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    state.cache().invalidate_all();
    info!("Query cache cleared");
    Json(state.cache().stats())
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Result<Json<SystemStatus>, ApiError> {
    let uptime = chrono::Utc::now().signed_duration_since(state.startup_time).num_seconds();

    let status_state = Arc::clone(&state);
    let view_count = blocking(move || status_state.views.list().map(|v| v.len()).map_err(store_error)).await?;

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        view_count,
        cache: state.cache().stats(),
        cache_ttl_secs: state.cache().ttl().as_secs(),
        llm_backend: state.llm_manager.backend().to_string(),
        llm_enabled: state.llm_manager.is_enabled(),
        webhook_configured: state.exporter.is_some(),
        post_query_date_filter: state.config.render.post_query_date_filter,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::build_pool;
    use crate::db::schema::warehouse_tables;
    use crate::llm::LlmManager;
    use crate::web::app;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let pool = build_pool(":memory:", 1).unwrap();
        {
            let conn = pool.get().unwrap();
            for table in warehouse_tables() {
                conn.execute_batch(&table.to_create_table_sql()).unwrap();
            }
            conn.execute_batch(
                "INSERT INTO pedidos (id_pedido, criado_em, status, valor_total, estado_cliente) VALUES
                    ('p1', TIMESTAMP '2025-01-05 10:00:00', 'entregue', 100.0, 'SP'),
                    ('p2', TIMESTAMP '2025-01-06 11:00:00', 'entregue', 250.0, 'RJ'),
                    ('p3', TIMESTAMP '2025-02-10 09:00:00', 'cancelado', 80.0, 'SP');",
            )
            .unwrap();
        }
        let state = AppState::new(AppConfig::default(), pool, LlmManager::disabled()).unwrap();
        state.views.ensure_schema().unwrap();
        Arc::new(state)
    }

    fn structure() -> Value {
        json!({
            "nome": "Vendas",
            "componentes": [
                {"tipo": "indicador", "titulo": "Pedidos", "sql": "SELECT COUNT(*) FROM pedidos WHERE criado_em BETWEEN :data_inicio AND :data_fim"},
                {"tipo": "grafico_barra", "titulo": "Por estado", "sql": "SELECT estado_cliente, SUM(valor_total) AS total FROM pedidos WHERE criado_em BETWEEN :data_inicio AND :data_fim GROUP BY 1", "eixo_x": "estado_cliente", "eixo_y": "total"}
            ]
        })
    }

    async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn view_crud_round_trip() {
        let state = state();

        let (status, body) = send(
            &state,
            "POST",
            "/api/views",
            Some(json!({"name": "Vendas", "prompt_description": "vendas por estado", "structure": structure()})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json_body(&body)["id"].as_i64().unwrap();

        let (status, body) = send(&state, "GET", &format!("/api/views/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["structure"]["componentes"][1]["eixo_x"], "estado_cliente");

        let (status, _) = send(&state, "DELETE", &format!("/api/views/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&state, "GET", &format!("/api/views/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn render_returns_panels_and_artifacts() {
        let state = state();
        let view = state
            .views
            .create("Vendas", None, &serde_json::from_value(structure()).unwrap())
            .unwrap();

        let (status, body) = send(
            &state,
            "POST",
            &format!("/api/views/{}/render", view.id),
            Some(json!({"data_inicio": "2025-01-01", "data_fim": "2025-01-31"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let body = json_body(&body);
        assert_eq!(body["panels"][0]["kind"], "indicator");
        assert_eq!(body["panels"][0]["value"], "2.00");
        assert_eq!(body["panels"][1]["kind"], "chart");
        assert_eq!(body["panels"][1]["column"], 1);
        assert_eq!(body["artifacts"].as_array().unwrap().len(), 1);
        assert_eq!(body["artifacts"][0]["row_count"], 2);
    }

    #[tokio::test]
    async fn component_image_is_png() {
        let state = state();
        let view = state
            .views
            .create("Vendas", None, &serde_json::from_value(structure()).unwrap())
            .unwrap();

        let (status, body) = send(
            &state,
            "GET",
            &format!("/api/views/{}/components/1/image?data_inicio=2025-01-01&data_fim=2025-01-31", view.id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with(b"\x89PNG"));

        let (status, _) = send(
            &state,
            "GET",
            &format!("/api/views/{}/components/0/image?data_inicio=2025-01-01&data_fim=2025-01-31", view.id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let state = state();
        let (status, _) = send(
            &state,
            "POST",
            "/api/render",
            Some(json!({"structure": structure(), "data_inicio": "2025-02-01", "data_fim": "2025-01-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn playground_blocks_writes() {
        let state = state();
        let (status, body) = send(&state, "POST", "/api/query", Some(json!({"query": "DELETE FROM pedidos"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(String::from_utf8_lossy(&body).contains("blocked"));

        let (status, body) = send(
            &state,
            "POST",
            "/api/query",
            Some(json!({"query": "SELECT COUNT(*) AS n FROM pedidos"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["rows"][0]["n"], 3);
    }

    #[tokio::test]
    async fn date_range_spans_orders() {
        let state = state();
        let (status, body) = send(&state, "GET", "/api/date-range", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({"data_inicio": "2025-01-05", "data_fim": "2025-02-10"}));
    }

    #[tokio::test]
    async fn generate_without_backend_is_unavailable() {
        let state = state();
        let (status, _) = send(&state, "POST", "/api/views/generate", Some(json!({"request": "vendas"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn export_without_webhook_simulates() {
        let state = state();
        state
            .views
            .create("Vendas", None, &serde_json::from_value(structure()).unwrap())
            .unwrap();

        let (status, body) = send(
            &state,
            "POST",
            "/api/export",
            Some(json!({"data_inicio": "2025-01-01", "data_fim": "2025-01-31"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let body = json_body(&body);
        assert_eq!(body["artifacts"], 1);
        assert_eq!(body["outcome"], Value::Null);
        assert_eq!(body["files"][0], "Vendas_Por estado.png");
    }

    #[tokio::test]
    async fn clear_cache_empties_entries() {
        let state = state();
        let view = state
            .views
            .create("Vendas", None, &serde_json::from_value(structure()).unwrap())
            .unwrap();
        send(
            &state,
            "POST",
            &format!("/api/views/{}/render", view.id),
            Some(json!({"data_inicio": "2025-01-01", "data_fim": "2025-01-31"})),
        )
        .await;
        assert!(state.cache().stats().entries > 0);

        let (status, body) = send(&state, "POST", "/api/cache/clear", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["entries"], 0);
    }
}

use chrono::NaiveDate;
use std::sync::Arc;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use viewcast::config::AppConfig;
use viewcast::db::build_pool;
use viewcast::db::schema::warehouse_tables;
use viewcast::export::{ExportOutcome, run_batch};
use viewcast::interpreter::PanelContent;
use viewcast::llm::LlmManager;
use viewcast::query::GlobalParams;
use viewcast::view::ViewStructure;
use viewcast::web::state::AppState;

const ORDERS: &str = "
INSERT INTO pedidos (id_pedido, criado_em, status, valor_total, custo_frete, estado_cliente) VALUES
    ('p1', TIMESTAMP '2025-01-03 08:00:00', 'entregue', 120.0, 10.0, 'SP'),
    ('p2', TIMESTAMP '2025-01-03 17:30:00', 'entregue', 80.0, 12.0, 'RJ'),
    ('p3', TIMESTAMP '2025-01-04 09:15:00', 'entregue', 200.0, 15.0, 'SP'),
    ('p4', TIMESTAMP '2025-01-10 12:00:00', 'cancelado', 50.0, 5.0, 'MG'),
    ('p5', TIMESTAMP '2025-03-01 12:00:00', 'entregue', 999.0, 30.0, 'SP');
";

const VIEW: &str = r#"{
    "nome": "Operacao",
    "componentes": [
        {"tipo": "indicador", "titulo": "Faturamento",
         "sql": "SELECT SUM(valor_total) FROM pedidos WHERE criado_em BETWEEN :data_inicio AND :data_fim"},
        {"tipo": "grafico_linha", "titulo": "Pedidos por dia",
         "sql": "SELECT DATE(criado_em) AS dia, COUNT(*) AS pedidos FROM pedidos GROUP BY 1 ORDER BY 1",
         "eixo_x": "dia", "eixo_y": "pedidos"},
        {"tipo": "grafico_combinado", "titulo": "Frete por estado",
         "sql": "SELECT estado_cliente, COUNT(*) AS pedidos, AVG(custo_frete) AS frete_medio FROM pedidos WHERE criado_em BETWEEN :data_inicio AND :data_fim GROUP BY 1",
         "eixo_x": "estado_cliente", "eixo_y": "pedidos", "eixo_y2": "frete_medio"},
        {"tipo": "tabela", "titulo": "Pedidos",
         "sql": "SELECT id_pedido, status, valor_total FROM pedidos WHERE criado_em BETWEEN :data_inicio AND :data_fim ORDER BY id_pedido"},
        {"tipo": "grafico_barra", "titulo": "Escrita", "sql": "DELETE FROM pedidos", "eixo_x": "a", "eixo_y": "b"}
    ]
}"#;

fn app_state(webhook: Option<String>) -> Arc<AppState> {
    let pool = build_pool(":memory:", 1).unwrap();
    {
        let conn = pool.get().unwrap();
        for table in warehouse_tables() {
            conn.execute_batch(&table.to_create_table_sql()).unwrap();
        }
        conn.execute_batch(ORDERS).unwrap();
    }

    let mut config = AppConfig::default();
    config.export.webhook_url = webhook;
    let state = AppState::new(config, pool, LlmManager::disabled()).unwrap();
    state.views.ensure_schema().unwrap();
    Arc::new(state)
}

fn january() -> GlobalParams {
    GlobalParams::new(
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
    )
}

#[test]
fn view_renders_every_component_in_isolation() {
    let state = app_state(None);
    let view = ViewStructure::from_json(VIEW).unwrap();

    let render = state.interpreter.render_view(&view, &january());

    assert_eq!(render.panels.len(), 5);
    assert!(matches!(&render.panels[0].content, PanelContent::Indicator { value } if value == "450.00"));
    assert!(matches!(render.panels[1].content, PanelContent::Chart { .. }));
    assert!(matches!(render.panels[2].content, PanelContent::Chart { .. }));
    assert!(matches!(render.panels[3].content, PanelContent::Table { artifact: Some(_), .. }));
    assert!(matches!(&render.panels[4].content, PanelContent::Error { message } if message.contains("blocked")));

    let titles: Vec<&str> = render.artifacts.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Pedidos por dia", "Frete por estado", "Pedidos (Tabela)"]);

    // The daily query has no WHERE clause; March is dropped after the fact.
    assert_eq!(render.artifacts[0].source_rows.len(), 3);
    assert!(render.artifacts.iter().all(|a| a.image.bytes.starts_with(b"\x89PNG")));
}

#[test]
fn repeated_render_is_served_from_cache() {
    let state = app_state(None);
    let view = ViewStructure::from_json(VIEW).unwrap();

    state.interpreter.render_view(&view, &january());
    let misses = state.cache().stats().misses;
    state.interpreter.render_view(&view, &january());

    // Only the blocked statement reaches the store again; failures are not cached.
    assert_eq!(state.cache().stats().misses, misses + 1);
    assert_eq!(state.cache().stats().hits, 4);
}

#[tokio::test]
async fn batch_export_sends_all_artifacts_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let state = app_state(Some(format!("{}/webhook", server.uri())));
    state
        .views
        .create("Operacao", Some("operacao diaria"), &ViewStructure::from_json(VIEW).unwrap())
        .unwrap();

    let summary = run_batch(
        state.views.clone(),
        Arc::clone(&state.interpreter),
        state.exporter.as_ref(),
        Vec::new(),
        january(),
    )
    .await
    .unwrap();

    assert_eq!(summary.artifacts, 3);
    assert_eq!(summary.outcome, Some(ExportOutcome::Sent { artifacts: 3, status: 200 }));
    assert!(summary.warnings.iter().any(|w| w.contains("Escrita")));

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).to_string();
    assert!(body.contains("filename=\"Operacao_Pedidos por dia.png\""));
    assert!(body.contains("filename=\"Operacao_Pedidos (Tabela).png\""));
    assert!(body.contains("\"descricao\":\"operacao diaria\""));
}

use chrono::Local;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use viewcast::config::{AppConfig, CliArgs, Command, ExportArgs};
use viewcast::db::{build_pool, schema};
use viewcast::export::run_batch;
use viewcast::llm::LlmManager;
use viewcast::query::GlobalParams;
use viewcast::util::logging::init_tracing;
use viewcast::web::{self, state::AppState};

const DEFAULT_EXPORT_DAYS: i64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    init_tracing(args.log_json);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Initializing DuckDB connection pool at {}", config.database.connection_string);
    let pool = build_pool(&config.database.connection_string, config.database.pool_size)?;

    {
        let conn = pool.get()?;
        let missing = schema::missing_tables(&conn)?;
        if !missing.is_empty() {
            warn!("Warehouse tables not found: {}. Components reading them will fail.", missing.join(", "));
        }
    }

    // A misconfigured generator disables generation; rendering still works.
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm).unwrap_or_else(|e| {
        warn!("View generation disabled: {}", e);
        LlmManager::disabled()
    });

    let app_state = Arc::new(AppState::new(config.clone(), pool, llm_manager)?);
    app_state.views.ensure_schema()?;

    match args.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("Starting viewcast server on {}:{}", config.web.host, config.web.port);
            if let Err(e) = web::run_server(config.web, app_state).await {
                error!("Server error: {}", e);
                return Err(e.into());
            }
            info!("Server stopped gracefully");
        }
        Command::Export(export) => export_once(&app_state, &export).await?,
    }

    Ok(())
}

async fn export_once(state: &AppState, args: &ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let end = args.end.unwrap_or_else(|| Local::now().date_naive());
    let range = match args.start {
        Some(start) => GlobalParams::new(start, end),
        None => GlobalParams::last_days(DEFAULT_EXPORT_DAYS, end),
    };
    if !range.is_valid() {
        return Err(format!("--start {} is after --end {}", range.data_inicio, range.data_fim).into());
    }

    let summary = run_batch(
        state.views.clone(),
        Arc::clone(&state.interpreter),
        state.exporter.as_ref(),
        args.views.clone(),
        range,
    )
    .await?;

    for warning in &summary.warnings {
        warn!("{}", warning);
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

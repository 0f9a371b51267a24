use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: "viewcast.db".to_string(),
            pool_size: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderConfig {
    /// Drop rows whose date-like column falls outside the requested range
    /// after the query ran.
    pub post_query_date_filter: bool,
    pub date_column_hints: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            post_query_date_filter: true,
            date_column_hints: vec!["data".to_string(), "criado_em".to_string(), "dia".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl ExportConfig {
    /// The configured webhook, treating a blank value as unset.
    pub fn webhook(&self) -> Option<&str> {
        self.webhook_url.as_deref().map(str::trim).filter(|url| !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "remote", "ollama", or "none"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "none".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            api_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub cache: CacheConfig,
    pub render: RenderConfig,
    pub export: ExportConfig,
    pub llm: LlmConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// DuckDB database file (":memory:" for a scratch database)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Render stored views and send every artifact in one webhook request
    Export(ExportArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    /// First day of the range, YYYY-MM-DD (default: 30 days before --end)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day of the range, YYYY-MM-DD (default: today)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Only export these view ids; repeatable
    #[arg(long = "view", value_name = "ID")]
    pub views: Vec<i64>,
}

const ENV_PREFIX: &str = "VIEWCAST";

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = ["config.toml", "config/config.toml", "/etc/viewcast/config.toml"];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        Self::build(config_builder.add_source(environment()), args)
    }

    fn build(builder: ConfigBuilder<DefaultState>, args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config: AppConfig = builder.build()?.try_deserialize()?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.connection_string = database.clone();
        }

        Ok(config)
    }
}

/// `VIEWCAST__SECTION__KEY=value`
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

//! Blinkdrop Relay Service
//!
//! HTTP front end for the one-shot relay: create a session, deposit one
//! message, collect it exactly once.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use blinkdrop_relay::kv::spawn_expiry_sweeper;
use blinkdrop_relay::{RelayConfig, RelayService, StorageBackend, StorageConfig};

mod api;
mod error;

/// Relay Service CLI arguments
#[derive(Parser, Debug)]
#[command(name = "relay-service")]
#[command(about = "Blinkdrop One-Shot Relay Service")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "BLINKDROP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "BLINKDROP_PORT", default_value = "8080")]
    port: u16,

    /// Pending message lifetime in seconds
    #[arg(long, env = "MESSAGE_TTL_SECONDS", default_value_t = blinkdrop_relay::DEFAULT_MESSAGE_TTL_SECS)]
    message_ttl: u64,

    /// Short code lifetime in seconds
    #[arg(long, env = "SESSION_TTL_SECONDS", default_value_t = blinkdrop_relay::DEFAULT_SESSION_TTL_SECS)]
    session_ttl: u64,

    /// Expiry sweep interval in seconds
    #[arg(long, default_value = "60")]
    sweep_interval: u64,

    /// Public base URL used for share links
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Storage backend
    #[arg(long, env = "BLINKDROP_BACKEND", value_enum, default_value = "memory")]
    backend: Backend,

    /// Storage path for the sled backend
    #[arg(short, long, env = "BLINKDROP_STORAGE_PATH", default_value = "./data/blinkdrop")]
    storage_path: PathBuf,

    /// Maximum request body size in bytes
    #[arg(long, default_value = "1048576")]
    max_request_bytes: usize,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Memory,
    Sled,
}

impl From<Backend> for StorageBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Memory => StorageBackend::Memory,
            Backend::Sled => StorageBackend::Sled,
        }
    }
}

impl Args {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            message_ttl_secs: self.message_ttl,
            session_ttl_secs: self.session_ttl,
            sweep_interval_secs: self.sweep_interval,
            storage: StorageConfig {
                backend: self.backend.into(),
                path: self.storage_path.clone(),
            },
        }
    }
}

/// Application state
pub struct AppState {
    pub service: Arc<RelayService>,
    pub base_url: Option<String>,
    pub max_request_bytes: usize,
}

fn init_logging(args: &Args) {
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true);

    let installed = if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.expect("Failed to set tracing subscriber");
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = args.relay_config();
    config.validate().context("invalid relay configuration")?;

    info!("Starting Blinkdrop Relay Service");
    info!(
        "Message TTL {}s, session TTL {}s, backend {:?}",
        config.message_ttl_secs, config.session_ttl_secs, config.storage.backend
    );

    let kv = config
        .storage
        .open()
        .with_context(|| format!("failed to open {:?} storage", config.storage.backend))?;

    spawn_expiry_sweeper(Arc::clone(&kv), config.sweep_interval());

    let service = Arc::new(RelayService::new(kv, &config));
    let app_state = web::Data::new(AppState {
        service,
        base_url: args.base_url.clone(),
        max_request_bytes: args.max_request_bytes,
    });

    info!("Binding to {}:{}", args.host, args.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(api::configure)
    })
    .bind((args.host.as_str(), args.port))?
    .run()
    .await?;

    Ok(())
}

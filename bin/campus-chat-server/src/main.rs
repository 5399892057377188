//! campus-chat-server – entry point.
//!
//! Startup order:
//! 1. Load `.env` and parse configuration from environment variables.
//! 2. Initialise structured tracing (stdout, or a daily log file).
//! 3. Build the completion provider client; a missing API key is fatal.
//! 4. Create the message store and, if configured, its idle-session sweeper.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.

mod completion;
mod config;
mod error;
mod extract;
mod middleware;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::completion::OpenAiClient;
use crate::config::Config;
use crate::state::AppState;
use crate::store::MessageStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    // A missing .env file is the normal production case.
    dotenvy::dotenv().ok();
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let _log_guard = init_tracing(&cfg)?;
    info!(version = env!("CARGO_PKG_VERSION"), "campus-chat-server starting");
    debug!(config = ?cfg, "configuration loaded");

    // ── 3. Completion provider ─────────────────────────────────────────────────
    let completion = OpenAiClient::from_config(&cfg).context("completion provider unavailable")?;
    info!(model = %completion.model(), base_url = %cfg.openai_base_url, "completion provider ready");

    // ── 4. Message store ───────────────────────────────────────────────────────
    let store = Arc::new(MessageStore::new());
    if let Some(ttl) = cfg.session_ttl {
        let _sweeper = store::spawn_sweeper(Arc::clone(&store), ttl, cfg.session_sweep_interval);
        info!(
            ttl_secs = ttl.as_secs(),
            every_secs = cfg.session_sweep_interval.as_secs(),
            "idle-session sweeper started"
        );
    }

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store,
        completion: Arc::new(completion),
    });

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("invalid CAMPUS_CHAT_BIND '{}'", cfg.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, swagger = cfg.enable_swagger, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("campus-chat-server stopped");
    Ok(())
}

/// Install the global subscriber. The returned guard flushes the log file
/// and must live until shutdown.
fn init_tracing(cfg: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: CAMPUS_CHAT_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let (writer, guard) = match &cfg.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory '{dir}'"))?;
            let appender = tracing_appender::rolling::daily(dir, "campus-chat-server.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(cfg.log_dir.is_none())
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    Ok(guard)
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c    => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}

//! Vocabulary Quiz Backend
//!
//! - Axum HTTP + WebSocket API
//! - Quiz items pulled from a spreadsheet CSV export (cached with a TTL)
//! - Per-user right/wrong counters persisted to a JSON file
//! - Static front-end fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   SHEET_URL         : CSV URL, Google Sheets share link, or local CSV path
//!   PROGRESS_PATH     : progress JSON file (default "user_data.json")
//!   SHEET_TTL_SECS    : sheet cache lifetime (default 600)
//!   SESSION_TTL_SECS  : idle session lifetime (default 3600)
//!   QUIZ_CONFIG_PATH  : path to TOML config (accounts, paths, TTL)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod config;
mod domain;
mod error;
mod logic;
mod progress;
mod protocol;
mod routes;
mod selector;
mod session;
mod source;
mod state;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Config, sheet source, progress store, session registry.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "vocab_quiz", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "vocab_quiz", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "vocab_quiz", error = %e, "Failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
}

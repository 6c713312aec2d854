//! Live dashboard over HTTP.
//!
//! Read-only views of the result cache:
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /dashboard` | The HTML dashboard rendered from the latest results |
//! | `GET /api/entries` | The same entries as a JSON snapshot |
//! | `GET /health` | `ok` |

use crate::cache::ResultCache;
use crate::outputs::{html, json::EntriesSnapshot};
use crate::utils::format_timestamp;
use axum::extract::State;
use axum::response::{Html, Redirect};
use axum::routing::get;
use axum::{Json, Router};
use chrono::FixedOffset;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub cache: Arc<ResultCache>,
    pub title: String,
    pub offset: FixedOffset,
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/dashboard") }))
        .route("/dashboard", get(show_dashboard))
        .route("/api/entries", get(list_entries))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

async fn show_dashboard(State(state): State<DashboardState>) -> Html<String> {
    let view = state.cache.view();
    debug!(count = view.entries.len(), "Rendering dashboard");
    let updated_at = view.updated_at.map(|at| format_timestamp(at, state.offset));
    Html(html::render_dashboard(&view.entries, &state.title, updated_at.as_deref()))
}

async fn list_entries(State(state): State<DashboardState>) -> Json<EntriesSnapshot> {
    let view = state.cache.view();
    Json(EntriesSnapshot::new(&view.entries, view.updated_at, state.offset))
}

/// Serve the dashboard until the process exits.
#[instrument(level = "info", skip_all, fields(%addr))]
pub async fn serve(addr: SocketAddr, state: DashboardState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Dashboard listening");
    axum::serve(listener, router(state)).await
}

//! # notice_watch
//!
//! Watches a paginated public-notice listing for notices whose title contains
//! a keyword and publishes them as a sorted HTML dashboard (plus a JSON
//! snapshot).
//!
//! ## Usage
//!
//! ```sh
//! notice_watch once                         # one cycle, write docs/, exit
//! notice_watch watch --serve 0.0.0.0:8080   # scheduled cycles + live dashboard
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: download listing pages `index.html`, `index_1.html`, ...
//! 2. **Filtering**: keep items whose label contains the keyword, tag their dates
//! 3. **Diffing**: stop at the first URL already seen by the previous cycle
//! 4. **Output**: rotate the result cache, rewrite the dashboard and JSON snapshot

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod config;
mod crawl;
mod dashboard;
mod date_tag;
mod models;
mod outputs;
mod schedule;
mod scrapers;
mod utils;

use cache::ResultCache;
use cli::{Cli, Command};
use config::Settings;
use dashboard::DashboardState;
use schedule::{CycleStatus, Scheduler};
use utils::ensure_writable_parent;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("notice_watch starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply(args.command.overrides());
    if let Command::Watch { serve: Some(addr), .. } = &args.command {
        settings.dashboard_addr = Some(addr.clone());
    }
    let session = settings.session()?;
    info!(
        base_url = %session.base_url(),
        keyword = %session.keyword(),
        pages = session.page_count() + 1,
        report = %settings.report_path,
        "Settings resolved"
    );

    // Early check: the report directory must be writable
    if let Err(e) = ensure_writable_parent(&settings.report_path).await {
        error!(
            path = %settings.report_path,
            error = %e,
            "Report directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let scheduler = Scheduler::new(session, settings.fetcher()?, Arc::new(ResultCache::new()))
        .with_publisher(settings.publisher()?);

    match args.command {
        Command::Once { .. } => {
            let status = scheduler.trigger().await;
            let elapsed = start_time.elapsed();
            let count = status.entries().len();
            match status {
                CycleStatus::Completed(outcome) => {
                    info!(
                        ?elapsed,
                        count,
                        early_stop = ?outcome.early_stop.map(|stop| (stop.page, stop.position)),
                        pages_fetched = outcome.pages_fetched,
                        updated_at = ?scheduler.cache().updated_at(),
                        "Execution complete"
                    );
                    Ok(())
                }
                CycleStatus::Aborted(e) => Err(e.into()),
                CycleStatus::Skipped => Ok(()),
            }
        }
        Command::Watch { .. } => {
            let schedule = settings.schedule()?;

            if let Some(addr) = settings.dashboard_addr()? {
                let state = DashboardState {
                    cache: Arc::clone(scheduler.cache()),
                    title: settings.report_title.clone(),
                    offset: settings.offset()?,
                };
                tokio::spawn(async move {
                    if let Err(e) = dashboard::serve(addr, state).await {
                        error!(%addr, error = %e, "Dashboard server stopped");
                    }
                });
            }

            tokio::select! {
                _ = scheduler.run_forever(&schedule) => {}
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!(error = %e, "Could not listen for shutdown signal");
                    }
                    info!(elapsed = ?start_time.elapsed(), "Shutting down");
                }
            }
            Ok(())
        }
    }
}

//! Command-line interface definitions.
//!
//! Every override can also be given through an environment variable, which
//! is how the scheduled deployment configures the container.

use clap::{Args, Parser, Subcommand};

/// Command-line arguments for notice_watch.
///
/// # Examples
///
/// ```sh
/// # One cycle, write docs/dashboard.html and exit
/// notice_watch once
///
/// # Different keyword, only the first three pages
/// notice_watch once -k 浦东 -p 2 -o public/index.html
///
/// # Run on the configured schedule and serve the live dashboard
/// notice_watch -c notice_watch.yaml watch --serve 0.0.0.0:8080
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, global = true, env = "NOTICE_WATCH_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single crawl cycle, write the reports and exit
    Once {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Run crawl cycles on the configured schedule until interrupted
    Watch {
        #[command(flatten)]
        overrides: Overrides,

        /// Serve the live dashboard on this address (e.g. 127.0.0.1:8080)
        #[arg(long, env = "NOTICE_WATCH_SERVE")]
        serve: Option<String>,
    },
}

impl Command {
    pub fn overrides(&self) -> &Overrides {
        match self {
            Command::Once { overrides } | Command::Watch { overrides, .. } => overrides,
        }
    }
}

/// Settings that can be overridden per invocation.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Listing directory holding index.html and index_N.html
    #[arg(long, env = "NOTICE_WATCH_BASE_URL")]
    pub base_url: Option<String>,

    /// Keyword labels must contain (empty string matches all)
    #[arg(short, long, env = "NOTICE_WATCH_KEYWORD")]
    pub keyword: Option<String>,

    /// Number of pages to fetch after the first one
    #[arg(short, long, env = "NOTICE_WATCH_PAGES")]
    pub pages: Option<usize>,

    /// CSS selector of one listing item
    #[arg(long, env = "NOTICE_WATCH_SELECTOR")]
    pub selector: Option<String>,

    /// Output path for the HTML dashboard
    #[arg(short = 'o', long, env = "NOTICE_WATCH_REPORT")]
    pub report: Option<String>,

    /// Output path for the JSON snapshot
    #[arg(short, long, env = "NOTICE_WATCH_JSON")]
    pub json: Option<String>,

    /// Do not write the JSON snapshot
    #[arg(long, conflicts_with = "json")]
    pub no_json: bool,
}

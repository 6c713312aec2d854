//! Static HTML dashboard.
//!
//! Renders the matched notices as one self-contained page: a sortable table
//! with the notice title (linking to the notice) and its date tag, newest
//! first. The page loads milligram for styling and tablesort so readers can
//! re-sort columns in the browser.

use crate::models::Entry;
use itertools::Itertools;
use std::error::Error;
use tokio::fs;
use tracing::{info, instrument};

/// Order entries for display.
///
/// Date tag descending by plain string comparison, then label descending,
/// then discovery order. `Unknown Date` compares greater than any
/// `YYYY年MM月DD日` tag and so comes first.
pub fn sorted_for_report(entries: &[Entry]) -> Vec<Entry> {
    entries
        .iter()
        .cloned()
        .sorted_by(|a, b| {
            b.date_tag()
                .cmp(a.date_tag())
                .then_with(|| b.label().cmp(a.label()))
        })
        .collect()
}

/// Render the dashboard document.
///
/// `updated_at` is the already formatted time of the last successful cycle.
pub fn render_dashboard(entries: &[Entry], title: &str, updated_at: Option<&str>) -> String {
    let title = html_escape::encode_text(title);
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n");
    html.push_str("<html>\n");
    html.push_str("<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str(&format!("    <title>{title}</title>\n"));
    html.push_str("    <link rel=\"stylesheet\" href=\"https://cdnjs.cloudflare.com/ajax/libs/milligram/1.4.1/milligram.min.css\">\n");
    html.push_str("    <script src=\"https://unpkg.com/tablesort@5.2.1/dist/tablesort.min.js\"></script>\n");
    html.push_str("    <style>\n");
    html.push_str("        table, th, td { border: 1px solid #ccc; border-collapse: collapse; padding: 8px; }\n");
    html.push_str("        th { cursor: pointer; background-color: #f9f9f9; }\n");
    html.push_str("    </style>\n");
    html.push_str("</head>\n");
    html.push_str("<body>\n");
    match updated_at {
        Some(at) => html.push_str(&format!("    <h1>{title} 最近更新时间: {}</h1>\n", html_escape::encode_text(at))),
        None => html.push_str(&format!("    <h1>{title}</h1>\n")),
    }
    html.push_str("    <table id=\"sortableTable\">\n");
    html.push_str("        <thead>\n");
    html.push_str("            <tr>\n");
    html.push_str("                <th>公告</th>\n");
    html.push_str("                <th>日期</th>\n");
    html.push_str("            </tr>\n");
    html.push_str("        </thead>\n");
    html.push_str("        <tbody>\n");

    for entry in sorted_for_report(entries) {
        html.push_str("            <tr>\n");
        html.push_str(&format!(
            "                <td><a href=\"{}\" target=\"_blank\">{}</a></td>\n",
            html_escape::encode_double_quoted_attribute(entry.url()),
            html_escape::encode_text(entry.label())
        ));
        html.push_str(&format!("                <td>{}</td>\n", html_escape::encode_text(entry.date_tag())));
        html.push_str("            </tr>\n");
    }

    html.push_str("        </tbody>\n");
    html.push_str("    </table>\n");
    html.push_str("    <script>\n");
    html.push_str("        document.addEventListener(\"DOMContentLoaded\", function () {\n");
    html.push_str("            var table = new Tablesort(document.getElementById('sortableTable'));\n");
    html.push_str("            setTimeout(() => {\n");
    html.push_str("                const dateColumn = document.querySelectorAll('#sortableTable th')[1];\n");
    html.push_str("                if (dateColumn) {\n");
    html.push_str("                    table.sort(dateColumn, 'desc');\n");
    html.push_str("                }\n");
    html.push_str("            }, 100);\n");
    html.push_str("        });\n");
    html.push_str("    </script>\n");
    html.push_str("</body>\n");
    html.push_str("</html>\n");
    html
}

/// Write a rendered dashboard to `path`, creating parent directories.
#[instrument(level = "info", skip_all, fields(%path))]
pub async fn write_dashboard(html: &str, path: &str) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(path, html).await?;
    info!(bytes = html.len(), "Static dashboard written");
    Ok(())
}

// Run report generation from a finished crawl session

use crate::hierarchy::UnitEdge;
use crate::session::{CrawlSession, RowOutcome};
use crate::sink::SheetSummary;
use crate::stage::StageTiming;
use orgcrawl_scanner::Category;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }

    /// Pick a format from a report path's extension, defaulting to text.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_str)
            .unwrap_or(ReportFormat::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: Category,
    pub directory_rows: usize,
    pub pages_requested: u32,
    pub ragged_pages: Vec<u32>,
    pub failed_pages: Vec<u32>,
    pub header_columns: usize,
    pub accepted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub accepted: usize,
    pub fetch_failed: usize,
    pub unknown_shape: usize,
    pub dropped: usize,
    pub arity_mismatch: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.accepted + self.omitted()
    }

    pub fn omitted(&self) -> usize {
        self.fetch_failed + self.unknown_shape + self.dropped + self.arity_mismatch
    }

    fn count(&mut self, kind: &str) {
        match kind {
            "accepted" => self.accepted += 1,
            "fetch_failed" => self.fetch_failed += 1,
            "unknown_shape" => self.unknown_shape += 1,
            "dropped" => self.dropped += 1,
            "arity_mismatch" => self.arity_mismatch += 1,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: String,
    pub started_at: String,
    pub categories: Vec<CategorySummary>,
    pub outcomes: OutcomeCounts,
    pub omissions: Vec<RowOutcome>,
    pub tree_units: usize,
    pub orphans: Vec<UnitEdge>,
    pub stages: Vec<StageTiming>,
    pub sheets: Vec<SheetSummary>,
}

impl RunReport {
    pub fn from_session(session: &CrawlSession, sheets: &[SheetSummary]) -> Self {
        let categories = Category::ALL
            .into_iter()
            .map(|category| {
                let listing = session.directory(category);
                CategorySummary {
                    category,
                    directory_rows: listing.rows.len(),
                    pages_requested: listing.pages_requested,
                    ragged_pages: listing.ragged_pages.iter().map(|e| e.page).collect(),
                    failed_pages: listing.failed_pages.clone(),
                    header_columns: session.header(category).len(),
                    accepted: session.accepted(category),
                }
            })
            .collect();

        let mut outcomes = OutcomeCounts::default();
        for outcome in &session.outcomes {
            outcomes.count(outcome.status.kind());
        }

        Self {
            session_id: session.id.to_string(),
            started_at: session.started_at.to_rfc3339(),
            categories,
            outcomes,
            omissions: session.omissions().cloned().collect(),
            tree_units: session.tree.len(),
            orphans: session.orphans.clone(),
            stages: session.stages.clone(),
            sheets: sheets.to_vec(),
        }
    }

    pub fn total_elapsed_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.elapsed_ms).sum()
    }
}

pub fn generate_text_report(data: &RunReport) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                          ORGCRAWL RUN REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Session ID:   {}\n", data.session_id));
    report.push_str(&format!("Started:      {}\n", data.started_at));
    report.push_str(&format!("Duration:     {} ms\n", data.total_elapsed_ms()));
    report.push_str(&format!("Tree Units:   {}\n", data.tree_units));
    report.push('\n');

    report.push_str(RULE);
    report.push_str("DIRECTORIES\n");
    report.push_str(RULE);
    report.push('\n');

    for summary in &data.categories {
        report.push_str(&format!("## {}\n", summary.category));
        report.push_str(&format!(
            "  Rows:        {} over {} pages\n",
            summary.directory_rows, summary.pages_requested
        ));
        report.push_str(&format!(
            "  Accepted:    {} ({} header columns)\n",
            summary.accepted, summary.header_columns
        ));
        if !summary.ragged_pages.is_empty() {
            report.push_str(&format!("  Ragged:      pages {}\n", join(&summary.ragged_pages)));
        }
        if !summary.failed_pages.is_empty() {
            report.push_str(&format!("  Failed:      pages {}\n", join(&summary.failed_pages)));
        }
        report.push('\n');
    }

    report.push_str(RULE);
    report.push_str("DETAIL OUTCOMES\n");
    report.push_str(RULE);
    report.push('\n');

    let counts = &data.outcomes;
    report.push_str(&format!("Rows resolved: {}\n\n", counts.total()));
    report.push_str(&format!("  [ACCEPTED]       {}\n", counts.accepted));
    if counts.fetch_failed > 0 {
        report.push_str(&format!("  [FETCH FAILED]   {}\n", counts.fetch_failed));
    }
    if counts.unknown_shape > 0 {
        report.push_str(&format!("  [UNKNOWN SHAPE]  {}\n", counts.unknown_shape));
    }
    if counts.dropped > 0 {
        report.push_str(&format!("  [DROPPED]        {}\n", counts.dropped));
    }
    if counts.arity_mismatch > 0 {
        report.push_str(&format!("  [ARITY]          {}\n", counts.arity_mismatch));
    }
    report.push('\n');

    if !data.omissions.is_empty() {
        for omission in &data.omissions {
            report.push_str(&format!(
                "  {:<16} {} {}\n",
                omission.status.kind(),
                omission.name,
                omission.link
            ));
        }
        report.push('\n');
    }

    if !data.orphans.is_empty() {
        report.push_str(RULE);
        report.push_str("ORPHANED UNITS\n");
        report.push_str(RULE);
        report.push('\n');
        for orphan in &data.orphans {
            report.push_str(&format!("  {} (parent '{}' never reached)\n", orphan.child, orphan.parent));
        }
        report.push('\n');
    }

    if !data.sheets.is_empty() {
        report.push_str(RULE);
        report.push_str("WORKBOOK\n");
        report.push_str(RULE);
        report.push('\n');
        for sheet in &data.sheets {
            report.push_str(&format!("  {:<12} {} rows\n", sheet.name, sheet.rows));
        }
        report.push('\n');
    }

    report.push_str(RULE);
    report.push_str("STAGES\n");
    report.push_str(RULE);
    report.push('\n');
    for stage in &data.stages {
        report.push_str(&format!("  {:<18} {} ms\n", stage.stage, stage.elapsed_ms));
    }
    report.push('\n');

    report
}

pub fn generate_json_report(data: &RunReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Orgcrawl",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "run": data
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn join(pages: &[u32]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

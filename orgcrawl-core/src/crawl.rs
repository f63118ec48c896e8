use crate::config::CrawlConfig;
use crate::resolve::DetailResolver;
use crate::session::CrawlSession;
use crate::sink::{CsvStaging, SheetSummary, SinkError};
use crate::stage::StageTimer;
use indicatif::{ProgressBar, ProgressStyle};
use orgcrawl_scanner::{Category, DirectoryFetcher, FetchError, PortalClient, UnitKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Options for configuring a crawl operation
pub struct CrawlOptions {
    pub config: CrawlConfig,
    pub show_progress_bars: bool,
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Crawl aborted: {0}")]
    Fetch(#[from] FetchError),

    #[error("Could not write results: {0}")]
    Sink(#[from] SinkError),
}

/// A finished run: the session and the sheets written to the workbook.
#[derive(Debug)]
pub struct CrawlOutput {
    pub session: CrawlSession,
    pub output: PathBuf,
    pub sheets: Vec<SheetSummary>,
}

/// Spinner plus optional caller callback, fed the same messages.
struct Progress {
    bar: Option<ProgressBar>,
    callback: Option<CrawlProgressCallback>,
}

impl Progress {
    fn new(show: bool, callback: Option<CrawlProgressCallback>) -> Self {
        let bar = show.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            pb.set_message("Starting crawl...");
            pb
        });
        Self { bar, callback }
    }

    fn update(&self, message: String) {
        if let Some(ref pb) = self.bar {
            pb.set_message(message.clone());
        }
        if let Some(ref callback) = self.callback {
            callback(message);
        }
    }

    fn finish(&self, message: String) {
        if let Some(ref pb) = self.bar {
            pb.finish_with_message(message);
        }
    }
}

/// Run every fetch and resolution stage and return the populated session.
///
/// Only a failure to reach the portal at all is fatal; individual listing
/// pages and detail rows that fail are recorded on the session instead.
pub async fn run_crawl(
    config: &CrawlConfig,
    show_progress_bars: bool,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlSession, CrawlError> {
    let progress = Progress::new(show_progress_bars, progress_callback);
    let mut session = CrawlSession::new(&config.tree_root);
    info!(session = %session.id, url = %config.listing_url, "Crawl started");

    let client = PortalClient::new(
        &config.user_agent,
        config.cookie.as_deref(),
        config.fetch.clone(),
    )?;
    let fetcher = DirectoryFetcher::new(&client, config.listing_url.clone())
        .with_query(config.query.clone())
        .with_pacing(config.pacing.every_n, config.pacing.pause);
    let resolver = DetailResolver::new(&client, &config.shapes, config.pacing);

    let timer = StageTimer::start("directory header");
    progress.update("Reading directory header...".to_string());
    session.directory_header = fetcher.fetch_header().await?;
    session.stages.push(timer.finish());

    let timer = StageTimer::start("directories");
    for category in Category::ALL {
        progress.update(format!("Fetching {} directory...", category));
        let listing = fetcher.fetch_directory(category).await;
        progress.update(format!(
            "{} directory: {} rows over {} pages",
            category,
            listing.rows.len(),
            listing.pages_requested
        ));
        session.set_directory(listing);
    }
    session.stages.push(timer.finish());

    let timer = StageTimer::start("leaders");
    progress.update(format!(
        "Resolving {} leader pages...",
        session.leader_directory.rows.len()
    ));
    let (leaders, outcomes) = resolver.resolve_leaders(&session.leader_directory.rows).await;
    session.leaders = leaders;
    session.outcomes.extend(outcomes);
    session.stages.push(timer.finish());

    let timer = StageTimer::start("sub-units");
    progress.update(format!(
        "Resolving {} sub-unit pages...",
        session.sub_unit_directory.rows.len()
    ));
    let (sub_units, outcomes) = resolver
        .resolve_units(UnitKind::Subordinate, &session.sub_unit_directory.rows)
        .await;
    session.sub_units = sub_units;
    session.outcomes.extend(outcomes);
    session.stages.push(timer.finish());

    let timer = StageTimer::start("builtin-units");
    progress.update(format!(
        "Resolving {} builtin-unit pages...",
        session.builtin_unit_directory.rows.len()
    ));
    let (builtin_units, outcomes) = resolver
        .resolve_units(UnitKind::Builtin, &session.builtin_unit_directory.rows)
        .await;
    session.builtin_units = builtin_units;
    session.outcomes.extend(outcomes);
    session.stages.push(timer.finish());

    let timer = StageTimer::start("unit tree");
    progress.update("Resolving unit hierarchy...".to_string());
    session.resolve_hierarchy();
    for orphan in &session.orphans {
        warn!(
            child = %orphan.child,
            parent = %orphan.parent,
            "Unit left out of the tree: parent never reached"
        );
    }
    session.stages.push(timer.finish());

    let omitted = session.omissions().count();
    if omitted > 0 {
        warn!(omitted, "Rows omitted from the detail sheets");
    }

    progress.finish(format!(
        "Crawl complete! {} leaders, {} builtin units, {} sub-units, {} units in tree",
        session.leaders.records.len(),
        session.builtin_units.records.len(),
        session.sub_units.records.len(),
        session.tree.len()
    ));

    Ok(session)
}

/// Stage every record set under the storage root, assemble the workbook and
/// remove the staging directory unless asked to keep it.
pub fn write_workbook(
    session: &mut CrawlSession,
    config: &CrawlConfig,
) -> Result<Vec<SheetSummary>, CrawlError> {
    let timer = StageTimer::start("persistence");

    let mut staging = CsvStaging::create(config.staging_dir(), config.separator)?;
    session.persist(&mut staging)?;
    let sheets = staging.assemble_workbook(&config.output)?;

    if config.keep_staging {
        info!(dir = %staging.dir().display(), "Keeping staging files");
    } else {
        staging.clean()?;
    }

    session.stages.push(timer.finish());
    Ok(sheets)
}

/// Execute a crawl with the given options and write the workbook.
pub async fn execute_crawl(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlOutput, CrawlError> {
    let CrawlOptions {
        config,
        show_progress_bars,
    } = options;

    let mut session = run_crawl(&config, show_progress_bars, progress_callback).await?;
    let sheets = write_workbook(&mut session, &config)?;
    info!(session = %session.id, output = %config.output.display(), "Crawl finished");

    Ok(CrawlOutput {
        session,
        output: config.output,
        sheets,
    })
}

use anyhow::Context;
use clap::ArgMatches;
use colored::Colorize;
use orgcrawl_core::config::{ConfigError, CrawlConfig, Pacing, parse_separator};
use orgcrawl_core::crawl::{CrawlOptions, execute_crawl};
use orgcrawl_core::report::{
    ReportFormat, RunReport, generate_json_report, generate_text_report, save_report,
};
use orgcrawl_scanner::FetchPolicy;
use std::path::Path;
use std::time::Duration;

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

/// Build a crawl configuration from parsed command-line arguments.
pub fn build_config(matches: &ArgMatches) -> Result<CrawlConfig, ConfigError> {
    let entry = matches
        .get_one::<String>("ENTRY")
        .map(String::as_str)
        .unwrap_or_default();
    let outfile = matches
        .get_one::<String>("OUTFILE")
        .map(String::as_str)
        .unwrap_or_default();

    let mut config = CrawlConfig::from_entry(entry, outfile)?;

    if let Some(storage) = matches.get_one::<String>("storage") {
        config = config.with_storage_root(shellexpand::tilde(storage).into_owned());
    }
    if let Some(separator) = matches.get_one::<String>("separator") {
        config = config.with_separator(parse_separator(separator)?);
    }
    if let Some(cookie) = matches.get_one::<String>("cookie") {
        config = config.with_cookie(cookie.as_str());
    }

    let defaults = Pacing::default();
    let pacing = Pacing {
        every_n: matches
            .get_one::<u32>("every")
            .copied()
            .unwrap_or(defaults.every_n),
        pause: matches
            .get_one::<u64>("pause")
            .map(|s| Duration::from_secs(*s))
            .unwrap_or(defaults.pause),
    };

    let defaults = FetchPolicy::default();
    let fetch = FetchPolicy {
        timeout: matches
            .get_one::<u64>("timeout")
            .map(|s| Duration::from_secs(*s))
            .unwrap_or(defaults.timeout),
        retries: matches
            .get_one::<u32>("retries")
            .copied()
            .unwrap_or(defaults.retries),
        backoff: defaults.backoff,
    };

    Ok(config
        .with_pacing(pacing)
        .with_fetch_policy(fetch)
        .with_keep_staging(matches.get_flag("keep-staging")))
}

/// Render `report` in the format implied by `path` and write it there.
pub fn write_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    let content = match ReportFormat::from_path(path) {
        ReportFormat::Json => {
            generate_json_report(report).context("Failed to serialise run report")?
        }
        ReportFormat::Text => generate_text_report(report),
    };
    save_report(&content, path)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

pub async fn handle_crawl(matches: &ArgMatches) {
    let quiet = matches.get_flag("quiet");

    let config = match build_config(matches) {
        Ok(config) => config,
        Err(ConfigError::UnsupportedEntry(_)) => {
            eprintln!(
                "{} Check your entry, only Quzhou government is supported",
                "✗".red().bold()
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    if !quiet {
        print_divider();
        println!("{}", "  ORGCRAWL".bright_white().bold());
        print_divider();
        println!("Listing:    {}", config.listing_url.as_str().cyan());
        println!("Workbook:   {}", config.output.display().to_string().cyan());
        println!("Staging:    {}", config.staging_dir().display());
        if config.pacing.every_n > 0 {
            println!(
                "Pacing:     {}s pause every {} requests",
                config.pacing.pause.as_secs(),
                config.pacing.every_n
            );
        } else {
            println!("Pacing:     {}", "disabled".yellow());
        }
        println!();
    }

    let options = CrawlOptions {
        config,
        show_progress_bars: !quiet,
    };

    let output = match execute_crawl(options, None).await {
        Ok(output) => output,
        Err(e) => {
            eprintln!("{} Crawl failed: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let report = RunReport::from_session(&output.session, &output.sheets);

    if !quiet {
        println!();
        print!("{}", generate_text_report(&report));
    }

    if !report.orphans.is_empty() {
        eprintln!(
            "{} {} units could not be placed in the hierarchy",
            "⚠".yellow().bold(),
            report.orphans.len()
        );
    }

    if let Some(path) = matches.get_one::<std::path::PathBuf>("report") {
        match write_report(&report, path) {
            Ok(()) => println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display()
            ),
            Err(e) => {
                eprintln!("{} {:#}", "✗".red().bold(), e);
                std::process::exit(1);
            }
        }
    }

    println!(
        "{} Workbook written to {}",
        "✓".green().bold(),
        output.output.display()
    );
}

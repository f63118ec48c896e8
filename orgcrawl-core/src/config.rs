use orgcrawl_scanner::client::DEFAULT_USER_AGENT;
use orgcrawl_scanner::{FetchPolicy, ListingQuery, ShapeRules};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Entry forms accepted on the command line.
pub const ALLOWED_ENTRIES: [&str; 3] = ["qz.gov.cn", "www.qz.gov.cn", "http://www.qz.gov.cn"];
pub const LISTING_PATH: &str = "/module/xxgk/search.jsp";
pub const STAGING_DIR: &str = "GovSpider_tmp_data";
pub const WORKBOOK_EXTENSION: &str = "xlsx";
pub const DEFAULT_TREE_ROOT: &str = "市政府";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Check your entry, only Quzhou government is supported (got '{0}')")]
    UnsupportedEntry(String),

    #[error("Invalid output name: {0}")]
    InvalidOutput(String),

    #[error("Invalid separator '{0}': expected a single character")]
    InvalidSeparator(String),
}

/// Validate `entry` against the allow-list and build the listing endpoint.
pub fn listing_url(entry: &str) -> Result<Url, ConfigError> {
    let entry = entry.trim();
    if !ALLOWED_ENTRIES.contains(&entry) {
        return Err(ConfigError::UnsupportedEntry(entry.to_string()));
    }

    let mut base = entry.to_string();
    if !base.starts_with("http://") {
        if !base.starts_with("www.") {
            base = format!("www.{}", base);
        }
        base = format!("http://{}", base);
    }

    Url::parse(&format!("{}{}", base, LISTING_PATH))
        .map_err(|e| ConfigError::UnsupportedEntry(format!("{}: {}", entry, e)))
}

/// Ensure the workbook name carries the `xlsx` extension.
pub fn output_path(name: &str) -> Result<PathBuf, ConfigError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::InvalidOutput("name is empty".to_string()));
    }
    if name.ends_with('/') || name.ends_with(std::path::MAIN_SEPARATOR) {
        return Err(ConfigError::InvalidOutput(format!("'{}' is a directory", name)));
    }

    if name.chars().count() < 5 || !name.ends_with(WORKBOOK_EXTENSION) {
        Ok(PathBuf::from(format!("{}.{}", name, WORKBOOK_EXTENSION)))
    } else {
        Ok(PathBuf::from(name))
    }
}

pub fn parse_separator(value: &str) -> Result<char, ConfigError> {
    let value = match value {
        "\\t" | "tab" => "\t",
        other => other,
    };
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '"' && c != '\n' && c != '\r' => Ok(c),
        _ => Err(ConfigError::InvalidSeparator(value.to_string())),
    }
}

/// Requests between pauses, and the pause length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub every_n: u32,
    pub pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            every_n: 10,
            pause: Duration::from_secs(5),
        }
    }
}

/// Everything a crawl run needs.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub listing_url: Url,
    pub output: PathBuf,
    pub storage_root: PathBuf,
    pub pacing: Pacing,
    pub fetch: FetchPolicy,
    pub user_agent: String,
    pub cookie: Option<String>,
    pub separator: char,
    pub tree_root: String,
    pub shapes: ShapeRules,
    pub query: ListingQuery,
    pub keep_staging: bool,
}

impl CrawlConfig {
    pub fn new(listing_url: Url, output: PathBuf) -> Self {
        Self {
            listing_url,
            output,
            storage_root: PathBuf::from("."),
            pacing: Pacing::default(),
            fetch: FetchPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookie: None,
            separator: '\t',
            tree_root: DEFAULT_TREE_ROOT.to_string(),
            shapes: ShapeRules::default(),
            query: ListingQuery::default(),
            keep_staging: false,
        }
    }

    /// Validate the raw command-line pair and build a config.
    pub fn from_entry(entry: &str, outfile: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(listing_url(entry)?, output_path(outfile)?))
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_fetch_policy(mut self, fetch: FetchPolicy) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_tree_root(mut self, root: impl Into<String>) -> Self {
        self.tree_root = root.into();
        self
    }

    pub fn with_shape_rules(mut self, shapes: ShapeRules) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn with_keep_staging(mut self, keep: bool) -> Self {
        self.keep_staging = keep;
        self
    }

    pub fn staging_dir(&self) -> PathBuf {
        staging_dir(&self.storage_root)
    }
}

pub fn staging_dir(root: &Path) -> PathBuf {
    root.join(STAGING_DIR)
}

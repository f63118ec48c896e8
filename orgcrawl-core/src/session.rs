use crate::hierarchy::{HierarchyResolver, TREE_HEADER, UnitEdge, UnitTree};
use crate::sink::{RecordSet, SinkError, TabularSink};
use crate::stage::StageTiming;
use chrono::{DateTime, Utc};
use orgcrawl_scanner::{Category, DirectoryListing, LeaderRecord, UnitRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to one directory row during detail resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Accepted,
    FetchFailed { error: String },
    UnknownShape,
    Dropped { reason: String },
    ArityMismatch { expected: usize, found: usize },
}

impl OutcomeStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, OutcomeStatus::Accepted)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutcomeStatus::Accepted => "accepted",
            OutcomeStatus::FetchFailed { .. } => "fetch_failed",
            OutcomeStatus::UnknownShape => "unknown_shape",
            OutcomeStatus::Dropped { .. } => "dropped",
            OutcomeStatus::ArityMismatch { .. } => "arity_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub category: Category,
    pub name: String,
    pub link: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Accepted detail records of one category with their discovered header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailSet<T> {
    pub header: Vec<String>,
    pub records: Vec<T>,
}

impl<T> Default for DetailSet<T> {
    fn default() -> Self {
        Self {
            header: Vec::new(),
            records: Vec::new(),
        }
    }
}

/// State of one crawl run. Each stage writes only its own fields.
#[derive(Debug, Clone)]
pub struct CrawlSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub directory_header: Vec<String>,
    pub leader_directory: DirectoryListing,
    pub builtin_unit_directory: DirectoryListing,
    pub sub_unit_directory: DirectoryListing,
    pub leaders: DetailSet<LeaderRecord>,
    pub builtin_units: DetailSet<UnitRecord>,
    pub sub_units: DetailSet<UnitRecord>,
    pub outcomes: Vec<RowOutcome>,
    pub tree: UnitTree,
    pub orphans: Vec<UnitEdge>,
    pub stages: Vec<StageTiming>,
}

impl CrawlSession {
    pub fn new(tree_root: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            directory_header: Vec::new(),
            leader_directory: DirectoryListing::new(Category::Leader),
            builtin_unit_directory: DirectoryListing::new(Category::BuiltinUnit),
            sub_unit_directory: DirectoryListing::new(Category::SubUnit),
            leaders: DetailSet::default(),
            builtin_units: DetailSet::default(),
            sub_units: DetailSet::default(),
            outcomes: Vec::new(),
            tree: UnitTree::new(tree_root),
            orphans: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn directory(&self, category: Category) -> &DirectoryListing {
        match category {
            Category::Leader => &self.leader_directory,
            Category::BuiltinUnit => &self.builtin_unit_directory,
            Category::SubUnit => &self.sub_unit_directory,
        }
    }

    pub fn set_directory(&mut self, listing: DirectoryListing) {
        match listing.category {
            Category::Leader => self.leader_directory = listing,
            Category::BuiltinUnit => self.builtin_unit_directory = listing,
            Category::SubUnit => self.sub_unit_directory = listing,
        }
    }

    pub fn accepted(&self, category: Category) -> usize {
        match category {
            Category::Leader => self.leaders.records.len(),
            Category::BuiltinUnit => self.builtin_units.records.len(),
            Category::SubUnit => self.sub_units.records.len(),
        }
    }

    pub fn header(&self, category: Category) -> &[String] {
        match category {
            Category::Leader => &self.leaders.header,
            Category::BuiltinUnit => &self.builtin_units.header,
            Category::SubUnit => &self.sub_units.header,
        }
    }

    /// Rows that did not make it into a record set.
    pub fn omissions(&self) -> impl Iterator<Item = &RowOutcome> {
        self.outcomes.iter().filter(|o| !o.status.is_accepted())
    }

    /// Rebuild the unit tree from the accepted unit records.
    pub fn resolve_hierarchy(&mut self) {
        let resolver = HierarchyResolver::new(self.tree.root().to_string());
        let resolution = resolver.resolve(&self.builtin_units.records, &self.sub_units.records);
        self.tree = resolution.tree;
        self.orphans = resolution.orphans;
    }

    /// Headers and rows of one record set, in sheet column order.
    pub fn record_set(&self, set: RecordSet) -> (Vec<String>, Vec<Vec<String>>) {
        let directory = |listing: &DirectoryListing| {
            (
                self.directory_header.clone(),
                listing.rows.iter().map(|r| r.to_fields()).collect(),
            )
        };
        let units = |details: &DetailSet<UnitRecord>| {
            (
                details.header.clone(),
                details.records.iter().map(|r| r.fields().to_vec()).collect(),
            )
        };

        match set {
            RecordSet::LeaderDirectory => directory(&self.leader_directory),
            RecordSet::BuiltinUnitDirectory => directory(&self.builtin_unit_directory),
            RecordSet::SubUnitDirectory => directory(&self.sub_unit_directory),
            RecordSet::LeaderDetails => (
                self.leaders.header.clone(),
                self.leaders.records.iter().map(|r| r.fields.clone()).collect(),
            ),
            RecordSet::BuiltinUnitDetails => units(&self.builtin_units),
            RecordSet::SubUnitDetails => units(&self.sub_units),
            RecordSet::UnitTree => (
                TREE_HEADER.iter().map(|h| h.to_string()).collect(),
                self.tree.to_fields(),
            ),
        }
    }

    /// Hand every record set to `sink`.
    pub fn persist(&self, sink: &mut dyn TabularSink) -> Result<(), SinkError> {
        for set in RecordSet::ALL {
            let (headers, rows) = self.record_set(set);
            sink.write(set, &headers, &rows)?;
        }
        Ok(())
    }
}

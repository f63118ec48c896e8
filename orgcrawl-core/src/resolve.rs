// Detail resolution: dereference directory rows into typed records.

use crate::config::Pacing;
use crate::session::{DetailSet, OutcomeStatus, RowOutcome};
use orgcrawl_scanner::extract::UnitHeader;
use orgcrawl_scanner::{
    Category, DetailPage, DirectoryRow, ExtractionError, LeaderRecord, PortalClient,
    RateLimiter, Shape, ShapeRules, UnitKind, UnitRecord,
};
use tracing::{debug, info, warn};

/// Records extracted from a category before arity validation.
struct Walk<T> {
    extracted: Vec<(usize, T)>,
    outcomes: Vec<RowOutcome>,
}

pub struct DetailResolver<'a> {
    client: &'a PortalClient,
    shapes: &'a ShapeRules,
    pacing: Pacing,
}

impl<'a> DetailResolver<'a> {
    pub fn new(client: &'a PortalClient, shapes: &'a ShapeRules, pacing: Pacing) -> Self {
        Self {
            client,
            shapes,
            pacing,
        }
    }

    /// Resolve leader rows. The header comes from the first bureau page that
    /// carries one.
    pub async fn resolve_leaders(
        &self,
        rows: &[DirectoryRow],
    ) -> (DetailSet<LeaderRecord>, Vec<RowOutcome>) {
        let mut header: Vec<String> = Vec::new();
        let walk = self
            .walk(Category::Leader, rows, |shape, page| {
                if header.is_empty() && shape == Shape::Bureau {
                    header = page.leader_header();
                }
                page.leader_record(shape)
            })
            .await;

        settle(Category::Leader, header, walk, |r| r.fields.len())
    }

    /// Resolve builtin or sub-unit rows. Builtin headers come from the first
    /// page that yields one; sub-unit pages have two layouts, so the header
    /// with the most labels wins.
    pub async fn resolve_units(
        &self,
        kind: UnitKind,
        rows: &[DirectoryRow],
    ) -> (DetailSet<UnitRecord>, Vec<RowOutcome>) {
        let mut header: Option<UnitHeader> = None;
        let walk = self
            .walk(kind.category(), rows, |_, page| {
                if let Ok(candidate) = page.unit_header() {
                    let replace = match kind {
                        UnitKind::Builtin => header.is_none(),
                        UnitKind::Subordinate => header
                            .as_ref()
                            .is_none_or(|h| candidate.label_count > h.label_count),
                    };
                    if replace {
                        header = Some(candidate);
                    }
                }
                page.unit_record(kind)
            })
            .await;

        let header = header.map(|h| h.columns).unwrap_or_default();
        settle(kind.category(), header, walk, |r| r.fields().len())
    }

    async fn walk<T>(
        &self,
        category: Category,
        rows: &[DirectoryRow],
        mut extract: impl FnMut(Shape, &DetailPage) -> Result<T, ExtractionError>,
    ) -> Walk<T> {
        info!(category = category.as_str(), rows = rows.len(), "Resolving details");

        let mut limiter = RateLimiter::new(self.pacing.every_n, self.pacing.pause);
        let mut walk = Walk {
            extracted: Vec::new(),
            outcomes: Vec::with_capacity(rows.len()),
        };

        for row in rows {
            limiter.tick().await;
            let outcome = |status| RowOutcome {
                category,
                name: row.name.clone(),
                link: row.detail_link.clone(),
                status,
            };

            let shape = match Shape::classify(&row.detail_link, self.shapes) {
                Ok(shape) => shape,
                Err(e) => {
                    warn!(category = category.as_str(), "Skipping row '{}': {}", row.name, e);
                    walk.outcomes.push(outcome(OutcomeStatus::UnknownShape));
                    continue;
                }
            };

            let html = match self.client.get_html(&row.detail_link, &[]).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(category = category.as_str(), "Skipping row '{}': {}", row.name, e);
                    walk.outcomes.push(outcome(OutcomeStatus::FetchFailed {
                        error: e.to_string(),
                    }));
                    continue;
                }
            };

            let extracted = {
                let page = DetailPage::parse(&html);
                extract(shape, &page)
            };

            match extracted {
                Ok(record) => {
                    debug!(category = category.as_str(), name = %row.name, "Record extracted");
                    walk.extracted.push((walk.outcomes.len(), record));
                    walk.outcomes.push(outcome(OutcomeStatus::Accepted));
                }
                Err(e) => {
                    warn!(category = category.as_str(), "Dropping row '{}': {}", row.name, e);
                    walk.outcomes.push(outcome(OutcomeStatus::Dropped {
                        reason: e.to_string(),
                    }));
                }
            }
        }

        walk
    }
}

/// Reject records whose field count differs from the header. An empty
/// header means none was ever discovered; records are then kept as-is.
fn settle<T>(
    category: Category,
    header: Vec<String>,
    walk: Walk<T>,
    len: impl Fn(&T) -> usize,
) -> (DetailSet<T>, Vec<RowOutcome>) {
    let Walk {
        extracted,
        mut outcomes,
    } = walk;

    if header.is_empty() {
        warn!(category = category.as_str(), "No usable header discovered");
    }

    let mut records = Vec::with_capacity(extracted.len());
    for (slot, record) in extracted {
        let found = len(&record);
        if !header.is_empty() && found != header.len() {
            warn!(
                category = category.as_str(),
                name = %outcomes[slot].name,
                expected = header.len(),
                found,
                "Record arity does not match header"
            );
            outcomes[slot].status = OutcomeStatus::ArityMismatch {
                expected: header.len(),
                found,
            };
        } else {
            records.push(record);
        }
    }

    info!(
        category = category.as_str(),
        accepted = records.len(),
        omitted = outcomes.len() - records.len(),
        "Details resolved"
    );
    (DetailSet { header, records }, outcomes)
}

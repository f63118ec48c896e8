//! Detail page extraction.
//!
//! Detail pages come in a few layouts. Leader pages are either hosted on a
//! bureau sub-site ([`Shape::Bureau`]) or on the portal itself
//! ([`Shape::Portal`]); unit pages share one layout but sub-unit pages may
//! omit an optional column. Every extractor returns a typed record rather
//! than a bare cell list.

use crate::directory::selector;
use crate::error::ExtractionError;
use crate::model::UnitKind;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ALL_CELLS: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static VALUE_CELLS: LazyLock<Selector> = LazyLock::new(|| selector(r##"td[bgcolor="#FFFFFF"]"##));
static LABEL_CELLS: LazyLock<Selector> = LazyLock::new(|| selector(r##"td[bgcolor="#EBEBEB"]"##));
static LEADER_LABELS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"span[style*="color: rgb(77, 153, 228);"]"#));
static TITLE_CELL: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"td[style="font-size:16pt;color:#C02020;font-weight:bold;padding-bottom:10px;"]"#,
    )
});
static CONTEXT_TABLE: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"table[width="100%"][cellspacing="0"][cellpadding="0"][border="0"]"#)
});

/// Cell offsets kept from a bureau leader page.
const BUREAU_OFFSETS: [usize; 5] = [2, 5, 7, 9, 11];
/// Portal leader pages lack one column; a blank goes here.
const PORTAL_BLANK_AT: usize = 2;
/// Sub-unit pages with this many value cells lack one column.
const SHORT_SUB_UNIT_CELLS: usize = 5;
const SUB_UNIT_BLANK_AT: usize = 4;
/// Context table cell holding the owning unit on record pages.
const CONTEXT_VALUE_CELL: usize = 2;
/// Context table cell holding the relation label on header pages.
const CONTEXT_LABEL_CELL: usize = 4;
const CONTEXT_LABEL_PREFIX: &str = "是谁的";

pub const NAME_FIELD: usize = 0;
pub const SUPERIOR_FIELD: usize = 6;

/// Strip every whitespace run and no-break space.
pub fn no_blank(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect()
}

fn cell_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Link prefixes that decide a leader page's layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeRules {
    pub bureau_prefix: String,
    pub portal_prefix: String,
}

impl Default for ShapeRules {
    fn default() -> Self {
        Self {
            bureau_prefix: "http://fgw".to_string(),
            portal_prefix: "http://www".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Bureau,
    Portal,
}

impl Shape {
    pub fn classify(link: &str, rules: &ShapeRules) -> Result<Shape, ExtractionError> {
        if link.starts_with(&rules.bureau_prefix) {
            Ok(Shape::Bureau)
        } else if link.starts_with(&rules.portal_prefix) {
            Ok(Shape::Portal)
        } else {
            Err(ExtractionError::UnknownShape(link.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderRecord {
    pub shape: Shape,
    pub fields: Vec<String>,
}

/// An organisational unit's detail row: value cells followed by the owning
/// unit read from the page's context table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    kind: UnitKind,
    fields: Vec<String>,
}

impl UnitRecord {
    /// Build from value cells and the context descriptor.
    pub fn new(
        kind: UnitKind,
        mut cells: Vec<String>,
        descriptor: String,
    ) -> Result<Self, ExtractionError> {
        cells.push(descriptor);
        Self::from_row(kind, cells)
    }

    /// Build from a complete row; it must reach the superior-unit column.
    pub fn from_row(kind: UnitKind, fields: Vec<String>) -> Result<Self, ExtractionError> {
        if fields.len() <= SUPERIOR_FIELD {
            return Err(ExtractionError::ShortRecord {
                found: fields.len(),
                needed: SUPERIOR_FIELD + 1,
            });
        }
        Ok(Self { kind, fields })
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.fields[NAME_FIELD]
    }

    pub fn superior(&self) -> &str {
        &self.fields[SUPERIOR_FIELD]
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }
}

/// Column titles found on a unit page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitHeader {
    pub columns: Vec<String>,
    /// Label count before the context column was appended.
    pub label_count: usize,
}

/// A parsed detail page.
pub struct DetailPage {
    document: Html,
}

impl DetailPage {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    pub fn leader_record(&self, shape: Shape) -> Result<LeaderRecord, ExtractionError> {
        let fields = match shape {
            Shape::Bureau => {
                let cells: Vec<String> = self
                    .document
                    .select(&ALL_CELLS)
                    .map(cell_text)
                    .filter(|text| !text.contains('>'))
                    .map(|text| no_blank(&text))
                    .collect();
                let needed = BUREAU_OFFSETS[BUREAU_OFFSETS.len() - 1] + 1;
                if cells.len() < needed {
                    return Err(ExtractionError::ShortPage {
                        found: cells.len(),
                        needed,
                    });
                }
                BUREAU_OFFSETS.iter().map(|&i| cells[i].clone()).collect()
            }
            Shape::Portal => {
                let mut cells = self.value_cells();
                if cells.len() < PORTAL_BLANK_AT {
                    return Err(ExtractionError::ShortPage {
                        found: cells.len(),
                        needed: PORTAL_BLANK_AT,
                    });
                }
                cells.insert(PORTAL_BLANK_AT, String::new());
                cells
            }
        };

        Ok(LeaderRecord { shape, fields })
    }

    pub fn leader_header(&self) -> Vec<String> {
        self.document
            .select(&LEADER_LABELS)
            .map(cell_text)
            .filter(|text| text.chars().count() > 1)
            .map(|text| no_blank(&text))
            .collect()
    }

    pub fn unit_record(&self, kind: UnitKind) -> Result<UnitRecord, ExtractionError> {
        let mut cells = self.value_cells();
        if cells.is_empty() {
            return Err(ExtractionError::ShortPage { found: 0, needed: 1 });
        }

        if cells[NAME_FIELD].is_empty()
            && let Some(title) = self.document.select(&TITLE_CELL).next()
        {
            cells[NAME_FIELD] = no_blank(&cell_text(title));
        }
        if cells[NAME_FIELD].is_empty() {
            return Err(ExtractionError::MissingName);
        }

        if kind == UnitKind::Subordinate && cells.len() == SHORT_SUB_UNIT_CELLS {
            cells.insert(SUB_UNIT_BLANK_AT, String::new());
        }

        let descriptor = self.context_cell(CONTEXT_VALUE_CELL)?;
        UnitRecord::new(kind, cells, descriptor)
    }

    pub fn unit_header(&self) -> Result<UnitHeader, ExtractionError> {
        let mut columns: Vec<String> = self
            .document
            .select(&LABEL_CELLS)
            .map(cell_text)
            .filter(|text| text.chars().count() > 1)
            .map(|text| no_blank(&text).trim_matches(':').to_string())
            .collect();
        let label_count = columns.len();

        let label = self.context_cell(CONTEXT_LABEL_CELL)?;
        columns.push(format!("{}{}", CONTEXT_LABEL_PREFIX, label));

        Ok(UnitHeader {
            columns,
            label_count,
        })
    }

    fn value_cells(&self) -> Vec<String> {
        self.document
            .select(&VALUE_CELLS)
            .map(|cell| no_blank(&cell_text(cell)))
            .collect()
    }

    /// Read cell `offset` of the first context table, `>` separators removed.
    fn context_cell(&self, offset: usize) -> Result<String, ExtractionError> {
        let missing = ExtractionError::MissingContext { needed: offset + 1 };
        let table = self.document.select(&CONTEXT_TABLE).next().ok_or(missing.clone())?;
        let cell = table.select(&ALL_CELLS).nth(offset).ok_or(missing)?;
        Ok(no_blank(&cell_text(cell)).replace('>', ""))
    }
}

// Persistence of the seven record sets: CSV staging, then workbook assembly.

use crate::csv::{parse_rows, write_row};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Workbook error: {0}")]
    Workbook(#[from] XlsxError),

    #[error("Record set '{0}' was never staged")]
    NotStaged(&'static str),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordSet {
    LeaderDirectory,
    BuiltinUnitDirectory,
    SubUnitDirectory,
    LeaderDetails,
    BuiltinUnitDetails,
    SubUnitDetails,
    UnitTree,
}

/// Column rename followed by a sort on the renamed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortRule {
    pub rename_from: &'static str,
    pub sort_by: &'static str,
}

impl RecordSet {
    pub const ALL: [RecordSet; 7] = [
        RecordSet::LeaderDirectory,
        RecordSet::BuiltinUnitDirectory,
        RecordSet::SubUnitDirectory,
        RecordSet::LeaderDetails,
        RecordSet::BuiltinUnitDetails,
        RecordSet::SubUnitDetails,
        RecordSet::UnitTree,
    ];

    /// Sheet name, also the staging file stem.
    pub fn name(&self) -> &'static str {
        match self {
            RecordSet::LeaderDirectory => "领导目录",
            RecordSet::BuiltinUnitDirectory => "内设机构目录",
            RecordSet::SubUnitDirectory => "下属单位目录",
            RecordSet::LeaderDetails => "领导详细信息",
            RecordSet::BuiltinUnitDetails => "内设机构详细信息",
            RecordSet::SubUnitDetails => "下属单位详细信息",
            RecordSet::UnitTree => "机构层次结构",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name())
    }

    pub fn sort_rule(&self) -> Option<SortRule> {
        match self {
            RecordSet::BuiltinUnitDetails => Some(SortRule {
                rename_from: "是谁的内设机构",
                sort_by: "内设于",
            }),
            RecordSet::SubUnitDetails => Some(SortRule {
                rename_from: "是谁的下属单位",
                sort_by: "上级单位",
            }),
            _ => None,
        }
    }
}

/// Receives named record sets.
pub trait TabularSink {
    fn write(
        &mut self,
        set: RecordSet,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), SinkError>;
}

/// Keeps record sets in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub sets: HashMap<RecordSet, (Vec<String>, Vec<Vec<String>>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self, set: RecordSet) -> Option<&[String]> {
        self.sets.get(&set).map(|(h, _)| h.as_slice())
    }

    pub fn rows(&self, set: RecordSet) -> Option<&[Vec<String>]> {
        self.sets.get(&set).map(|(_, r)| r.as_slice())
    }
}

impl TabularSink for MemorySink {
    fn write(
        &mut self,
        set: RecordSet,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), SinkError> {
        self.sets.insert(set, (headers.to_vec(), rows.to_vec()));
        Ok(())
    }
}

/// Rename the rule's column and stable-sort rows by it. Left untouched when
/// the column is absent.
pub fn apply_sort_rule(rule: SortRule, headers: &mut [String], rows: &mut [Vec<String>]) {
    for header in headers.iter_mut() {
        if header == rule.rename_from {
            *header = rule.sort_by.to_string();
        }
    }

    let Some(column) = headers.iter().position(|h| h == rule.sort_by) else {
        debug!(column = rule.sort_by, "Sort column absent, keeping row order");
        return;
    };

    rows.sort_by(|a, b| {
        let a = a.get(column).map(String::as_str).unwrap_or_default();
        let b = b.get(column).map(String::as_str).unwrap_or_default();
        a.cmp(b)
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetSummary {
    pub name: String,
    pub rows: usize,
}

/// Delimited staging files, one per record set.
pub struct CsvStaging {
    dir: PathBuf,
    separator: char,
}

impl CsvStaging {
    pub fn create(dir: impl Into<PathBuf>, separator: char) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        Ok(Self { dir, separator })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, set: RecordSet) -> PathBuf {
        self.dir.join(set.file_name())
    }

    /// Read a staged set back as (headers, rows).
    pub fn read(&self, set: RecordSet) -> Result<(Vec<String>, Vec<Vec<String>>), SinkError> {
        let path = self.path_of(set);
        if !path.exists() {
            return Err(SinkError::NotStaged(set.name()));
        }
        let text = fs::read_to_string(&path).map_err(io_error(&path))?;
        let mut rows = parse_rows(&text, self.separator).into_iter();
        let headers = rows.next().unwrap_or_default();
        Ok((headers, rows.collect()))
    }

    /// Build the workbook from every staged set, one sheet each.
    pub fn assemble_workbook(&self, output: &Path) -> Result<Vec<SheetSummary>, SinkError> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let mut summary = Vec::with_capacity(RecordSet::ALL.len());

        for set in RecordSet::ALL {
            let (mut headers, mut rows) = self.read(set)?;
            if let Some(rule) = set.sort_rule() {
                apply_sort_rule(rule, &mut headers, &mut rows);
            }

            let sheet = workbook.add_worksheet();
            sheet.set_name(set.name())?;
            for (col, header) in headers.iter().enumerate() {
                sheet.write_string_with_format(0, col as u16, header, &bold)?;
            }
            for (i, row) in rows.iter().enumerate() {
                for (col, cell) in row.iter().enumerate() {
                    sheet.write_string(i as u32 + 1, col as u16, cell)?;
                }
            }

            debug!(sheet = set.name(), rows = rows.len(), "Sheet written");
            summary.push(SheetSummary {
                name: set.name().to_string(),
                rows: rows.len(),
            });
        }

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        workbook.save(output)?;
        info!(path = %output.display(), "Workbook saved");
        Ok(summary)
    }

    /// Remove the staging directory.
    pub fn clean(self) -> Result<(), SinkError> {
        fs::remove_dir_all(&self.dir).map_err(io_error(&self.dir))
    }
}

impl TabularSink for CsvStaging {
    fn write(
        &mut self,
        set: RecordSet,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), SinkError> {
        let path = self.path_of(set);
        info!(path = %path.display(), rows = rows.len(), "Staging record set");

        let file = File::create(&path).map_err(io_error(&path))?;
        let mut writer = BufWriter::new(file);
        write_row(&mut writer, headers, self.separator).map_err(io_error(&path))?;
        for row in rows {
            write_row(&mut writer, row, self.separator).map_err(io_error(&path))?;
        }
        writer.flush().map_err(io_error(&path))
    }
}

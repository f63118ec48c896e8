use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory category. Crawled in the order of [`Category::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Leader,
    BuiltinUnit,
    SubUnit,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Leader, Category::BuiltinUnit, Category::SubUnit];

    /// Value of the `infotypeId` query parameter.
    pub fn info_type_id(&self) -> &'static str {
        match self {
            Category::Leader => "A0102",
            Category::BuiltinUnit => "A0103",
            Category::SubUnit => "A0104",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Leader => "leader",
            Category::BuiltinUnit => "builtin-unit",
            Category::SubUnit => "sub-unit",
        }
    }

    pub fn unit_kind(&self) -> Option<UnitKind> {
        match self {
            Category::Leader => None,
            Category::BuiltinUnit => Some(UnitKind::Builtin),
            Category::SubUnit => Some(UnitKind::Subordinate),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two kinds of organisational unit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Builtin,
    Subordinate,
}

impl UnitKind {
    /// Edge label used in the unit tree.
    pub fn label(&self) -> &'static str {
        match self {
            UnitKind::Builtin => "内设机构",
            UnitKind::Subordinate => "下属单位",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            UnitKind::Builtin => Category::BuiltinUnit,
            UnitKind::Subordinate => Category::SubUnit,
        }
    }
}

/// One listing entry from a directory page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRow {
    pub index: String,
    pub name: String,
    pub date: String,
    pub source_unit: String,
    pub detail_link: String,
}

impl DirectoryRow {
    /// Column order used for the directory sheets.
    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.index.clone(),
            self.name.clone(),
            self.date.clone(),
            self.source_unit.clone(),
            self.detail_link.clone(),
        ]
    }
}

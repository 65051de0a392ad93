//! Destination entity kinds and their column layouts
//!
//! Entity kinds form a closed set; every level-0 record type the engine
//! persists maps to exactly one kind and one destination table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL type of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
        }
    }
}

/// Destination column written by a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        column_type: ColumnType::Text,
    }
}

const fn integer(name: &'static str) -> Column {
    Column {
        name,
        column_type: ColumnType::Integer,
    }
}

const HEADER_COLUMNS: &[Column] = &[
    text("source_system"),
    text("source_version"),
    text("gedcom_version"),
    text("charset"),
    text("language"),
    text("file_date"),
    integer("file_date_jd"),
];

const INDIVIDUAL_COLUMNS: &[Column] = &[
    text("full_name"),
    text("given_name"),
    text("surname"),
    text("sex"),
    text("birth_date"),
    integer("birth_date_jd"),
    text("birth_place"),
    text("death_date"),
    integer("death_date_jd"),
    text("death_place"),
    text("burial_date"),
    integer("burial_date_jd"),
    text("burial_place"),
    text("restriction"),
    integer("private"),
    text("note"),
];

const FAMILY_COLUMNS: &[Column] = &[
    text("marriage_date"),
    integer("marriage_date_jd"),
    text("marriage_place"),
    text("divorce_date"),
    integer("divorce_date_jd"),
    integer("child_count"),
    text("note"),
];

const SOURCE_COLUMNS: &[Column] = &[
    text("title"),
    text("author"),
    text("publication"),
    text("abbreviation"),
    text("text"),
    text("note"),
];

const REPOSITORY_COLUMNS: &[Column] = &[
    text("name"),
    text("address"),
    text("phone"),
    text("email"),
    text("website"),
];

const MEDIA_COLUMNS: &[Column] = &[text("file_path"), text("format"), text("title")];

const NOTE_COLUMNS: &[Column] = &[text("text")];

const SUBMITTER_COLUMNS: &[Column] = &[text("name"), text("address"), text("email")];

/// Kind of a persisted top-level entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Header,
    Individual,
    Family,
    Source,
    Repository,
    MediaObject,
    Note,
    Submitter,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Header,
        EntityKind::Individual,
        EntityKind::Family,
        EntityKind::Source,
        EntityKind::Repository,
        EntityKind::MediaObject,
        EntityKind::Note,
        EntityKind::Submitter,
    ];

    /// Map a level-0 tag to its entity kind
    pub fn from_record_tag(tag: &str) -> Option<Self> {
        match tag {
            "HEAD" => Some(EntityKind::Header),
            "INDI" => Some(EntityKind::Individual),
            "FAM" => Some(EntityKind::Family),
            "SOUR" => Some(EntityKind::Source),
            "REPO" => Some(EntityKind::Repository),
            "OBJE" => Some(EntityKind::MediaObject),
            "NOTE" => Some(EntityKind::Note),
            "SUBM" => Some(EntityKind::Submitter),
            _ => None,
        }
    }

    /// Stable lowercase name (used in link rows and statistics)
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Header => "header",
            EntityKind::Individual => "individual",
            EntityKind::Family => "family",
            EntityKind::Source => "source",
            EntityKind::Repository => "repository",
            EntityKind::MediaObject => "media_object",
            EntityKind::Note => "note",
            EntityKind::Submitter => "submitter",
        }
    }

    /// Destination table
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Header => "headers",
            EntityKind::Individual => "individuals",
            EntityKind::Family => "families",
            EntityKind::Source => "sources",
            EntityKind::Repository => "repositories",
            EntityKind::MediaObject => "media_objects",
            EntityKind::Note => "notes",
            EntityKind::Submitter => "submitters",
        }
    }

    /// Columns a transform may set for this kind
    pub fn columns(self) -> &'static [Column] {
        match self {
            EntityKind::Header => HEADER_COLUMNS,
            EntityKind::Individual => INDIVIDUAL_COLUMNS,
            EntityKind::Family => FAMILY_COLUMNS,
            EntityKind::Source => SOURCE_COLUMNS,
            EntityKind::Repository => REPOSITORY_COLUMNS,
            EntityKind::MediaObject => MEDIA_COLUMNS,
            EntityKind::Note => NOTE_COLUMNS,
            EntityKind::Submitter => SUBMITTER_COLUMNS,
        }
    }

    pub fn has_column(self, name: &str) -> bool {
        self.columns().iter().any(|c| c.name == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

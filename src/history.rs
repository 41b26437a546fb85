use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::proposal::ProposalType;
use crate::saving::{self, StoreError};

/// Sentinel accepted by the user filter to pass every row
pub const ALL_USERS: &str = "all";

/// Column names, in export order. They double as the JSON keys of a record.
pub const COLUMNS: [&str; 6] = ["codigo", "cliente", "tipo", "usuario", "data", "pdf"];

/// Display format of the creation timestamp in tables and exports
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Metadata of one generated proposal
///
/// Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRecord {
    #[serde(rename = "codigo")]
    pub code: String,

    #[serde(rename = "cliente")]
    pub client: String,

    #[serde(rename = "tipo")]
    pub kind: ProposalType,

    /// Username of the salesperson who generated the proposal
    #[serde(rename = "usuario")]
    pub user: String,

    #[serde(rename = "data", with = "timestamp")]
    pub created_at: DateTime<Local>,

    /// Path of the generated PDF at the time of generation
    pub pdf: PathBuf,
}

impl ProposalRecord {
    /// String form of every field, in [`COLUMNS`] order
    pub fn columns(&self) -> [String; 6] {
        [
            self.code.clone(),
            self.client.clone(),
            self.kind.as_str().to_string(),
            self.user.clone(),
            self.created_at.format(DISPLAY_FORMAT).to_string(),
            self.pdf.to_string_lossy().into_owned(),
        ]
    }

    /// Case-insensitive substring match against any field
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.columns()
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// Timestamps are written as RFC 3339. Older files used minute resolution
/// without an offset; those are read as local time.
mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M";

    pub fn serialize<S: Serializer>(value: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Local>, D::Error> {
        let raw = String::deserialize(d)?;

        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Local));
        }

        let naive = NaiveDateTime::parse_from_str(&raw, LEGACY_FORMAT)
            .map_err(|e| de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| de::Error::custom(format!("nonexistent local time {raw:?}")))
    }
}

/// Restricts history rows to one salesperson
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UserFilter {
    #[default]
    All,
    Only(String),
}

impl UserFilter {
    /// `"all"` (any case) and the empty string select every user.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case(ALL_USERS) {
            UserFilter::All
        } else {
            UserFilter::Only(raw.to_string())
        }
    }

    pub fn matches(&self, user: &str) -> bool {
        match self {
            UserFilter::All => true,
            UserFilter::Only(wanted) => wanted == user,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UserFilter::All => ALL_USERS,
            UserFilter::Only(user) => user,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub text: String,
    pub user: UserFilter,
}

impl HistoryFilter {
    pub fn new(text: impl Into<String>, user: UserFilter) -> Self {
        Self {
            text: text.into(),
            user,
        }
    }

    pub fn matches(&self, record: &ProposalRecord) -> bool {
        let text = self.text.trim();
        (text.is_empty() || record.matches_text(text)) && self.user.matches(&record.user)
    }
}

/// A ledger record together with its position in the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub index: usize,
    pub record: ProposalRecord,
}

/// Filtered, insertion-ordered view over the ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryView {
    pub rows: Vec<HistoryRow>,
}

impl HistoryView {
    pub fn from_entries(entries: Vec<ProposalRecord>, filter: &HistoryFilter) -> Self {
        let rows = entries
            .into_iter()
            .enumerate()
            .filter(|(_, record)| filter.matches(record))
            .map(|(index, record)| HistoryRow { index, record })
            .collect();
        HistoryView { rows }
    }

    pub fn records(&self) -> impl Iterator<Item = &ProposalRecord> {
        self.rows.iter().map(|row| &row.record)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Append-only list of generated proposals backed by a JSON file.
///
/// Every read goes back to disk, so changes written by other sessions are
/// picked up. Writers are expected to be serialized by the caller.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the ledger file if needed and fail early on malformed content.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let ledger = Self::new(path);
        ledger.entries()?;
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> Result<Vec<ProposalRecord>, StoreError> {
        saving::load(&self.path, Vec::new())
    }

    /// Append `entry` and persist the whole collection; returns the new record's index.
    pub fn record(&self, entry: ProposalRecord) -> Result<usize, StoreError> {
        let mut entries = self.entries()?;
        entries.push(entry);
        saving::save(&self.path, &entries)?;

        let index = entries.len() - 1;
        info!(
            "Recorded proposal {} for {} (entry {})",
            entries[index].code, entries[index].user, index
        );
        Ok(index)
    }

    pub fn render(&self, filter: &HistoryFilter) -> Result<HistoryView, StoreError> {
        Ok(HistoryView::from_entries(self.entries()?, filter))
    }

    /// Sorted distinct usernames present in the ledger
    pub fn users(&self) -> Result<Vec<String>, StoreError> {
        let mut users: Vec<String> = self.entries()?.into_iter().map(|r| r.user).collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    /// Stored output path of entry `index`, if that file is still on disk.
    pub fn download_path(&self, index: usize) -> Result<Option<PathBuf>, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .nth(index)
            .map(|record| record.pdf)
            .filter(|pdf| pdf.is_file()))
    }
}

//! Roster validation against the externally maintained enrollment list.
//!
//! The roster has been stored under more than one key-naming scheme over the
//! years. Documents are normalized on import by trying each scheme in
//! [`KEY_SCHEMES`] order; the first scheme whose name and id keys are both
//! present wins. Matching is then an exact lookup on the normalized pair:
//! name trimmed and lower-cased, roster id trimmed (numbers stringified).

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::RosterEntry;
use crate::store::{RosterStore, StoreResult};

/// A historical naming scheme for the roster's name and id fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyScheme {
    pub name_key: &'static str,
    pub id_key: &'static str,
}

/// Supported schemes, in precedence order
pub const KEY_SCHEMES: [KeyScheme; 2] = [
    KeyScheme {
        name_key: "Student Name",
        id_key: "PRN",
    },
    KeyScheme {
        name_key: "name",
        id_key: "prn",
    },
];

/// Canonical form of a person's name for matching
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Canonical form of a roster id for matching
pub fn roster_id_key(roster_id: &str) -> String {
    roster_id.trim().to_string()
}

/// Strings are taken as-is; numeric ids (as seen in spreadsheet exports) are stringified
fn field_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize a raw roster document. Returns `None` when no scheme applies
/// or the fields are blank.
pub fn normalize_document(document: &Value) -> Option<RosterEntry> {
    let object = document.as_object()?;

    KEY_SCHEMES.iter().find_map(|scheme| {
        let name = object.get(scheme.name_key).and_then(field_as_string)?;
        let roster_id = object.get(scheme.id_key).and_then(field_as_string)?;

        let name = name.trim().to_string();
        let roster_id = roster_id_key(&roster_id);
        if name.is_empty() || roster_id.is_empty() {
            return None;
        }
        Some(RosterEntry { name, roster_id })
    })
}

/// Answers "is (name, roster id) enrolled?"
#[derive(Clone)]
pub struct RosterValidator {
    store: Arc<dyn RosterStore>,
}

impl RosterValidator {
    pub fn new(store: Arc<dyn RosterStore>) -> Self {
        Self { store }
    }

    pub async fn is_enrolled(&self, name: &str, roster_id: &str) -> StoreResult<bool> {
        let name = name_key(name);
        let roster_id = roster_id_key(roster_id);
        if name.is_empty() || roster_id.is_empty() {
            return Ok(false);
        }
        self.store.roster_contains(&name, &roster_id).await
    }

    /// Normalize and store a batch of raw documents
    pub async fn import_documents(&self, documents: &[Value]) -> StoreResult<ImportStats> {
        let mut stats = ImportStats::default();

        for (index, document) in documents.iter().enumerate() {
            match normalize_document(document) {
                Some(entry) => {
                    self.store.upsert_roster_entry(&entry, document).await?;
                    stats.imported += 1;
                }
                None => {
                    debug!(index, "Roster document has no usable name/id fields");
                    stats.skipped += 1;
                }
            }
        }

        if stats.skipped > 0 {
            warn!(skipped = stats.skipped, "Skipped roster documents without a known key scheme");
        }
        info!(imported = stats.imported, "Roster import finished");
        Ok(stats)
    }

    /// Import a JSON file holding an array of roster documents
    pub async fn import_file(&self, path: &Path) -> Result<ImportStats> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read roster file: {}", path.display()))?;
        let documents: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("Roster file must be a JSON array: {}", path.display()))?;

        info!(path = %path.display(), documents = documents.len(), "Importing roster");
        Ok(self.import_documents(&documents).await?)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub imported: usize,
    pub skipped: usize,
}

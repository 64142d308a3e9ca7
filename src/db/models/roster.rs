//! Enrollment roster models.

use serde::{Deserialize, Serialize};

/// A normalized roster record. Normalization rules live in `crate::roster`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub roster_id: String,
}

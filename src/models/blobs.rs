use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ExpenseRecord;

/// Per-category aggregate, computed fresh on demand and snapshotted into the
/// meta blob by the periodic flush. Never a source of truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub count: usize,
    pub total: f64,
    /// `total / count`, 0 when the partition is empty.
    pub average: f64,
}

/// The notes blob. Note contents are opaque pass-through data owned by the
/// caller; this layer only reads the per-note `timestamp` field during cleanup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesBlob {
    pub notes: Vec<Value>,
    pub timestamp: i64,
    pub version: String,
}

/// Metadata snapshot written alongside notes on every flush.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetaBlob {
    pub category_stats: BTreeMap<String, CategoryStats>,
    pub last_saved: i64,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportMetadata {
    pub export_date: String,
    pub total_categories: usize,
    pub version: String,
}

/// `CategoryStore::export_all` snapshot: every partition plus metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreExport {
    pub categories: BTreeMap<String, Vec<ExpenseRecord>>,
    pub metadata: ExportMetadata,
}

/// The downloadable file artifact: store export plus notes and a top-level
/// date/version stamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileExport {
    pub categories: BTreeMap<String, Vec<ExpenseRecord>>,
    pub metadata: ExportMetadata,
    pub notes: Vec<Value>,
    pub export_date: String,
    pub version: String,
}

/// Single-slot backup written under `financeManagerBackup`. Wholesale
/// overwritten by each `backup()`; restore is a hard replace, not a merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupBlob {
    pub categories: BTreeMap<String, Vec<ExpenseRecord>>,
    pub notes: Vec<Value>,
    pub metadata: ExportMetadata,
}

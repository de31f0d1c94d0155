use serde::{Deserialize, Serialize};

use super::Category;

/// A stored expense. Immutable once saved; the only mutation is deletion.
///
/// Fields default individually so a partition written by an older schema (or
/// a hand-edited export) still parses record-by-record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpenseRecord {
    /// Unique within the store. Defaults to creation time in milliseconds.
    pub id: i64,
    pub amount: f64,
    pub description: String,
    /// Display-formatted creation date.
    pub date: String,
    /// Epoch milliseconds at save time. Creation marker, not store order.
    pub timestamp: i64,
}

/// Caller-supplied partial record handed to `CategoryStore::save`, which
/// fills in `id` and `timestamp` when absent. Also the shape of entries in
/// the legacy flat `{expenses: [...]}` format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewExpense {
    pub amount: f64,
    pub description: String,
    pub category: Option<String>,
    pub id: Option<i64>,
    pub date: Option<String>,
    pub timestamp: Option<i64>,
}

impl NewExpense {
    pub fn new(amount: f64, description: impl Into<String>, category: Option<&str>) -> Self {
        Self {
            amount,
            description: description.into(),
            category: category.map(str::to_string),
            ..Self::default()
        }
    }
}

/// A record annotated with its owning partition, as produced by the
/// flattened view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedExpense {
    pub category: Category,
    #[serde(flatten)]
    pub record: ExpenseRecord,
}

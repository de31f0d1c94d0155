use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::warn;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::kv::KvStore;
use crate::models::*;

/// Well-known keys. Each category's partition is stored under its own
/// lowercase name; everything else lives under these.
pub(crate) const KEY_CATEGORIES: &str = "expense_categories";
pub(crate) const KEY_NOTES: &str = "financeManagerNotes";
pub(crate) const KEY_META: &str = "financeManagerMeta";
pub(crate) const KEY_BACKUP: &str = "financeManagerBackup";
pub(crate) const KEY_LEGACY: &str = "financeManagerData";

/// Durable, partitioned storage of expense records: one ordered sequence per
/// fixed category, plus normalization, aggregation, and whole-store
/// import/export. Single writer for the category partitions.
///
/// Read paths never fail: a missing or corrupt partition reads as empty (the
/// failure is logged, not propagated). Mutating paths return `StoreError` so
/// callers can inspect the kind.
pub(crate) struct CategoryStore {
    kv: KvStore,
    clock: Rc<dyn Clock>,
}

impl CategoryStore {
    pub(crate) fn new(kv: KvStore, clock: Rc<dyn Clock>) -> Result<Self, StoreError> {
        let store = Self { kv, clock };
        store.init()?;
        Ok(store)
    }

    /// Ensures every partition exists. Safe to call repeatedly: a partition
    /// that already holds data is never overwritten. Also mirrors the fixed
    /// category list under `expense_categories` for external introspection.
    fn init(&self) -> Result<(), StoreError> {
        for category in Category::ALL {
            if !self.kv.contains(category.as_str())? {
                self.kv
                    .set(category.as_str(), &Vec::<ExpenseRecord>::new())?;
            }
        }
        let names: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        self.kv.set(KEY_CATEGORIES, &names)?;
        Ok(())
    }

    /// The shared key-value store; the coordinator writes its notes, meta,
    /// and backup blobs through this.
    pub(crate) fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub(crate) fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // ── CRUD ──────────────────────────────────────────────────

    /// Normalizes the category, fills in `id`/`timestamp` defaults, appends
    /// to the target partition, and persists it. Returns the stored record
    /// annotated with its partition so callers can reconcile in-memory state.
    pub(crate) fn save(&self, expense: NewExpense) -> Result<CategorizedExpense, StoreError> {
        let category = Category::normalize(expense.category.as_deref());
        let now = self.clock.now_ms();
        let record = ExpenseRecord {
            id: expense.id.unwrap_or(now),
            amount: expense.amount,
            description: expense.description,
            date: expense.date.unwrap_or_else(|| self.clock.today()),
            timestamp: expense.timestamp.unwrap_or(now),
        };

        let mut partition = self.get_by_category(category);
        partition.push(record.clone());
        self.kv.set(category.as_str(), &partition)?;

        Ok(CategorizedExpense { category, record })
    }

    /// The partition for `category`. Missing or corrupt stored data reads as
    /// empty; the parse failure is logged, never propagated.
    pub(crate) fn get_by_category(&self, category: Category) -> Vec<ExpenseRecord> {
        match self.kv.get::<Vec<ExpenseRecord>>(category.as_str()) {
            Ok(Some(records)) => records,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(category = category.as_str(), %err, "treating unreadable partition as empty");
                Vec::new()
            }
        }
    }

    /// Every partition, in category-enumeration order.
    pub(crate) fn get_all(&self) -> Vec<(Category, Vec<ExpenseRecord>)> {
        Category::ALL
            .iter()
            .map(|&c| (c, self.get_by_category(c)))
            .collect()
    }

    /// All records from all partitions, annotated with their owning category
    /// and sorted descending by `timestamp`. The sort is stable, so records
    /// with equal timestamps keep their per-category store order.
    pub(crate) fn all_flattened(&self) -> Vec<CategorizedExpense> {
        let mut flattened: Vec<CategorizedExpense> = Vec::new();
        for (category, records) in self.get_all() {
            flattened.extend(
                records
                    .into_iter()
                    .map(|record| CategorizedExpense { category, record }),
            );
        }
        flattened.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));
        flattened
    }

    /// Removes every record with `id`, scanning all partitions without early
    /// exit. Returns the category a removal occurred in, or `None` if the id
    /// was not found anywhere.
    ///
    /// Ids are unique by construction, but this does not assume it: if the
    /// same id somehow exists in several partitions, all are pruned and the
    /// last one in enumeration order is the one reported.
    pub(crate) fn delete(&self, id: i64) -> Result<Option<Category>, StoreError> {
        let mut removed_from = None;
        for category in Category::ALL {
            let partition = self.get_by_category(category);
            let kept: Vec<ExpenseRecord> =
                partition.iter().filter(|r| r.id != id).cloned().collect();
            if kept.len() < partition.len() {
                self.kv.set(category.as_str(), &kept)?;
                removed_from = Some(category);
            }
        }
        Ok(removed_from)
    }

    // ── Aggregation ───────────────────────────────────────────

    /// Per-category aggregates, computed fresh from live partition contents.
    pub(crate) fn stats(&self) -> Vec<(Category, CategoryStats)> {
        Category::ALL
            .iter()
            .map(|&category| {
                let records = self.get_by_category(category);
                let count = records.len();
                let total: f64 = records.iter().map(|r| r.amount).sum();
                let average = if count == 0 { 0.0 } else { total / count as f64 };
                (
                    category,
                    CategoryStats {
                        count,
                        total,
                        average,
                    },
                )
            })
            .collect()
    }

    // ── Import / export ───────────────────────────────────────

    /// Whole-store snapshot for backup and file export.
    pub(crate) fn export_all(&self) -> StoreExport {
        let categories: BTreeMap<String, Vec<ExpenseRecord>> = self
            .get_all()
            .into_iter()
            .map(|(c, records)| (c.as_str().to_string(), records))
            .collect();
        StoreExport {
            metadata: ExportMetadata {
                export_date: crate::clock::iso_date(self.clock.now_ms()),
                total_categories: categories.len(),
                version: DATA_VERSION.to_string(),
            },
            categories,
        }
    }

    /// Merges an import payload into the store and returns how many records
    /// were taken in.
    ///
    /// The partitioned shape (`{"categories": {...}}`) appends each payload
    /// partition after the existing records, duplicates and all. The legacy
    /// flat shape (`{"expenses": [...]}`) routes every entry through `save`.
    /// Anything else is ignored, not an error.
    pub(crate) fn import_merge(&self, payload: &Value) -> Result<usize, StoreError> {
        if let Some(categories) = payload.get("categories").and_then(Value::as_object) {
            let mut imported = 0;
            for category in Category::ALL {
                let Some(value) = categories.get(category.as_str()) else {
                    continue;
                };
                let incoming: Vec<ExpenseRecord> = match serde_json::from_value(value.clone()) {
                    Ok(records) => records,
                    Err(err) => {
                        warn!(category = category.as_str(), %err, "skipping unreadable import partition");
                        continue;
                    }
                };
                if incoming.is_empty() {
                    continue;
                }
                let mut partition = self.get_by_category(category);
                imported += incoming.len();
                partition.extend(incoming);
                self.kv.set(category.as_str(), &partition)?;
            }
            return Ok(imported);
        }

        if let Some(expenses) = payload.get("expenses").and_then(Value::as_array) {
            let mut imported = 0;
            for entry in expenses {
                let expense: NewExpense = match serde_json::from_value(entry.clone()) {
                    Ok(e) => e,
                    Err(err) => {
                        warn!(%err, "skipping unreadable legacy expense");
                        continue;
                    }
                };
                self.save(expense)?;
                imported += 1;
            }
            return Ok(imported);
        }

        // Unknown shape: silently ignored.
        Ok(0)
    }

    // ── Clearing ──────────────────────────────────────────────

    /// Resets every partition to an empty sequence.
    pub(crate) fn clear_all(&self) -> Result<(), StoreError> {
        for category in Category::ALL {
            self.kv
                .set(category.as_str(), &Vec::<ExpenseRecord>::new())?;
        }
        Ok(())
    }

    /// Resets one partition. Returns whether `name` matched a fixed category.
    pub(crate) fn clear_category(&self, name: &str) -> Result<bool, StoreError> {
        match Category::parse(name) {
            Some(category) => {
                self.kv
                    .set(category.as_str(), &Vec::<ExpenseRecord>::new())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

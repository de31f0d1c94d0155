use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::clock::{iso_date, Clock};
use crate::error::StoreError;
use crate::models::*;
use crate::store::{CategoryStore, KEY_BACKUP, KEY_LEGACY, KEY_META, KEY_NOTES};

/// How often the periodic flush fires.
pub(crate) const DEFAULT_FLUSH_INTERVAL_MS: i64 = 30_000;

/// Cleanup retention window: records older than this are dropped.
pub(crate) const DEFAULT_RETENTION_DAYS: i64 = 90;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// UI-effect seam. The persistence layer invokes these as best-effort
/// signals; none of them affect stored data. Every method defaults to a
/// no-op so callers implement only what they render.
pub(crate) trait UiNotifier {
    fn refresh(&self) {}
    fn expenses_changed(&self) {}
    fn notes_changed(&self) {}
    fn summary_changed(&self) {}
    /// Transient informational notice.
    fn notice(&self, _message: &str) {}
    /// Transient user-visible warning.
    fn warning(&self, _message: &str) {}
}

/// Notifier for hosts with no UI surface.
pub(crate) struct NullNotifier;

impl UiNotifier for NullNotifier {}

/// Explicit schedulable flush task. The host event loop calls
/// `Coordinator::tick` as often as it likes; the timer decides when a flush
/// is actually due. Start/stop rather than an uncontrolled interval so
/// teardown can cancel it.
pub(crate) struct FlushTimer {
    interval_ms: i64,
    last_fired_ms: i64,
    running: bool,
}

impl FlushTimer {
    pub(crate) fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms,
            last_fired_ms: 0,
            running: false,
        }
    }

    pub(crate) fn start(&mut self, now_ms: i64) {
        self.running = true;
        self.last_fired_ms = now_ms;
    }

    pub(crate) fn stop(&mut self) {
        self.running = false;
    }

    /// True when the interval has elapsed; advances the deadline when it has.
    pub(crate) fn tick(&mut self, now_ms: i64) -> bool {
        if !self.running || now_ms - self.last_fired_ms < self.interval_ms {
            return false;
        }
        self.last_fired_ms = now_ms;
        true
    }
}

/// Outcome of `load`: never an unwound error.
#[derive(Debug)]
pub(crate) struct LoadResult {
    pub success: bool,
    pub expenses: usize,
    pub notes: usize,
    pub error: Option<StoreError>,
}

/// Process-lifecycle owner for the persistence layer.
///
/// Owns the startup sequence (one-time legacy migration, working-state
/// population), the periodic flush of notes and metadata, cleanup, and the
/// backup/restore and file import/export lifecycle. Sole writer of the
/// notes and meta blobs.
pub(crate) struct Coordinator {
    store: CategoryStore,
    clock: Rc<dyn Clock>,
    notifier: Box<dyn UiNotifier>,
    timer: FlushTimer,
    /// Working copy of the flattened expense view, reconciled on every
    /// load/import/cleanup.
    expenses: Vec<CategorizedExpense>,
    /// Working notes list. Contents are opaque; persisted on flush.
    notes: Vec<Value>,
}

impl Coordinator {
    pub(crate) fn new(
        store: CategoryStore,
        clock: Rc<dyn Clock>,
        notifier: Box<dyn UiNotifier>,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            timer: FlushTimer::new(DEFAULT_FLUSH_INTERVAL_MS),
            expenses: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub(crate) fn store(&self) -> &CategoryStore {
        &self.store
    }

    pub(crate) fn expenses(&self) -> &[CategorizedExpense] {
        &self.expenses
    }

    pub(crate) fn notes(&self) -> &[Value] {
        &self.notes
    }

    /// Replaces the working notes list. Note contents are owned by the
    /// caller; this layer persists them as-is on the next flush.
    pub(crate) fn set_notes(&mut self, notes: Vec<Value>) {
        self.notes = notes;
        self.notifier.notes_changed();
    }

    // ── Startup ───────────────────────────────────────────────

    /// Runs the startup sequence: one-time legacy migration, then populate
    /// the working expense list and notes blob, then signal a UI refresh.
    ///
    /// Never propagates an error. A migration failure is logged and reported
    /// in the result but does not block startup; a store failure resets the
    /// working state to empty.
    pub(crate) fn load(&mut self) -> LoadResult {
        let mut result_error = None;

        match self.migrate_legacy() {
            Ok(true) => info!("migrated legacy data blob"),
            Ok(false) => {}
            Err(err) => {
                let err = StoreError::MigrationFailure(err.to_string());
                error!(%err, "legacy migration failed; continuing with partitioned data");
                result_error = Some(err);
            }
        }

        self.expenses = self.store.all_flattened();

        self.notes = match self.store.kv().get::<NotesBlob>(KEY_NOTES) {
            Ok(Some(blob)) => blob.notes,
            Ok(None) => Vec::new(),
            Err(err @ StoreError::ParseFailure { .. }) => {
                warn!(%err, "notes blob unreadable; starting with empty notes");
                Vec::new()
            }
            Err(err) => {
                error!(%err, "failed to read notes blob");
                self.expenses.clear();
                return LoadResult {
                    success: false,
                    expenses: 0,
                    notes: 0,
                    error: Some(err),
                };
            }
        };

        self.notifier.refresh();

        LoadResult {
            success: true,
            expenses: self.expenses.len(),
            notes: self.notes.len(),
            error: result_error,
        }
    }

    /// One-time migration from the pre-partitioned single-blob format.
    ///
    /// Expenses are merged into the category partitions through `save`,
    /// notes are copied into the notes blob if no blob exists yet, and the
    /// legacy key is deleted. Absence of the key means "already migrated",
    /// so a second run is a no-op.
    fn migrate_legacy(&mut self) -> Result<bool, StoreError> {
        let Some(legacy) = self.store.kv().get::<Value>(KEY_LEGACY)? else {
            return Ok(false);
        };

        let imported = self.store.import_merge(&legacy)?;

        if let Some(notes) = legacy.get("notes").and_then(Value::as_array) {
            if !self.store.kv().contains(KEY_NOTES)? {
                let blob = NotesBlob {
                    notes: notes.clone(),
                    timestamp: self.clock.now_ms(),
                    version: DATA_VERSION.to_string(),
                };
                self.store.kv().set(KEY_NOTES, &blob)?;
            }
        }

        self.store.kv().remove(KEY_LEGACY)?;
        info!(imported, "legacy blob merged and removed");
        Ok(true)
    }

    // ── Periodic flush ────────────────────────────────────────

    pub(crate) fn start_flush_timer(&mut self) {
        let now = self.clock.now_ms();
        self.timer.start(now);
    }

    pub(crate) fn stop_flush_timer(&mut self) {
        self.timer.stop();
    }

    /// Called by the host loop. Runs a flush when the timer says one is due;
    /// returns whether it did.
    pub(crate) fn tick(&mut self) -> bool {
        let now = self.clock.now_ms();
        if !self.timer.tick(now) {
            return false;
        }
        self.flush();
        true
    }

    /// Persists the working notes list and a metadata snapshot (category
    /// stats + save timestamp).
    ///
    /// A quota failure triggers cleanup with the default retention window
    /// and a user-visible warning; any other failure is logged and the next
    /// timer firing tries again.
    pub(crate) fn flush(&mut self) {
        if let Err(err) = self.write_notes_and_meta() {
            if err.is_quota() {
                warn!("storage quota exceeded during flush; running cleanup");
                self.notifier.warning(&format!(
                    "Storage is full. Removed entries older than {DEFAULT_RETENTION_DAYS} days."
                ));
                if let Err(cleanup_err) = self.cleanup(DEFAULT_RETENTION_DAYS * MS_PER_DAY) {
                    error!(%cleanup_err, "cleanup after quota failure also failed");
                }
            } else {
                error!(%err, "periodic flush failed");
            }
        }
    }

    fn write_notes_and_meta(&self) -> Result<(), StoreError> {
        let now = self.clock.now_ms();

        let blob = NotesBlob {
            notes: self.notes.clone(),
            timestamp: now,
            version: DATA_VERSION.to_string(),
        };
        self.store.kv().set(KEY_NOTES, &blob)?;

        let meta = MetaBlob {
            category_stats: self
                .store
                .stats()
                .into_iter()
                .map(|(c, s)| (c.as_str().to_string(), s))
                .collect(),
            last_saved: now,
            version: DATA_VERSION.to_string(),
        };
        self.store.kv().set(KEY_META, &meta)
    }

    // ── Cleanup ───────────────────────────────────────────────

    /// Drops records whose `timestamp` is older than `now - retention_ms`
    /// from every partition, rewriting only partitions that actually shrank.
    /// The same cutoff applies to notes by their own `timestamp` field; a
    /// note without a numeric timestamp is dropped too.
    ///
    /// Returns how many records were removed.
    pub(crate) fn cleanup(&mut self, retention_ms: i64) -> Result<usize, StoreError> {
        let cutoff = self.clock.now_ms() - retention_ms;
        let mut removed = 0;

        for category in Category::ALL {
            let partition = self.store.get_by_category(category);
            let kept: Vec<ExpenseRecord> = partition
                .iter()
                .filter(|r| r.timestamp >= cutoff)
                .cloned()
                .collect();
            if kept.len() < partition.len() {
                removed += partition.len() - kept.len();
                self.store.kv().set(category.as_str(), &kept)?;
            }
        }

        let notes_before = self.notes.len();
        self.notes.retain(|note| {
            note.get("timestamp")
                .and_then(Value::as_i64)
                .is_some_and(|t| t >= cutoff)
        });
        if self.notes.len() < notes_before {
            removed += notes_before - self.notes.len();
            let blob = NotesBlob {
                notes: self.notes.clone(),
                timestamp: self.clock.now_ms(),
                version: DATA_VERSION.to_string(),
            };
            self.store.kv().set(KEY_NOTES, &blob)?;
        }

        if removed > 0 {
            self.expenses = self.store.all_flattened();
            self.notifier.expenses_changed();
            self.notifier.notes_changed();
        }
        info!(removed, "cleanup finished");
        Ok(removed)
    }

    // ── File import / export ──────────────────────────────────

    /// Composes the downloadable export artifact. Pure and synchronous; the
    /// caller decides where it goes.
    pub(crate) fn export_to_file(&self) -> FileExport {
        let StoreExport {
            categories,
            metadata,
        } = self.store.export_all();
        FileExport {
            categories,
            metadata,
            notes: self.notes.clone(),
            export_date: iso_date(self.clock.now_ms()),
            version: DATA_VERSION.to_string(),
        }
    }

    /// Reads `path`, parses it as the export format, merges expenses into
    /// the store and appends notes, then reloads the working state.
    ///
    /// A parse or merge failure is surfaced as a user-visible error and
    /// leaves existing stored state untouched: the merge only appends or
    /// overwrites whole category values it explicitly reached.
    pub(crate) fn import_from_file(&mut self, path: &Path) -> Result<usize> {
        let outcome = self.try_import(path);
        match &outcome {
            Ok(imported) => {
                self.notifier.notice(&format!("Imported {imported} records"));
                self.notifier.expenses_changed();
                self.notifier.notes_changed();
                self.notifier.summary_changed();
            }
            Err(err) => self.notifier.warning(&format!("Import failed: {err:#}")),
        }
        outcome
    }

    fn try_import(&mut self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read import file: {}", path.display()))?;
        let payload: Value = serde_json::from_str(&text)
            .with_context(|| format!("Import file is not valid JSON: {}", path.display()))?;

        // The store ignores unknown shapes; at this entry point the user
        // explicitly picked a file, so an unrecognized one is surfaced.
        if payload.get("categories").is_none()
            && payload.get("expenses").is_none()
            && payload.get("notes").is_none()
        {
            return Err(StoreError::ImportFormatInvalid.into());
        }

        let imported = self.store.import_merge(&payload)?;

        if let Some(notes) = payload.get("notes").and_then(Value::as_array) {
            self.notes.extend(notes.iter().cloned());
            let blob = NotesBlob {
                notes: self.notes.clone(),
                timestamp: self.clock.now_ms(),
                version: DATA_VERSION.to_string(),
            };
            self.store.kv().set(KEY_NOTES, &blob)?;
        }

        self.load();
        Ok(imported)
    }

    // ── Backup / restore ──────────────────────────────────────

    /// Snapshots categories, notes, and metadata into the single backup
    /// slot, wholesale overwriting any prior backup.
    pub(crate) fn backup(&self) -> Result<(), StoreError> {
        let StoreExport {
            categories,
            metadata,
        } = self.store.export_all();
        let blob = BackupBlob {
            categories,
            notes: self.notes.clone(),
            metadata,
        };
        self.store.kv().set(KEY_BACKUP, &blob)
    }

    /// Replaces every partition present in the backup slot (whole-partition
    /// overwrite, bypassing merge semantics) and the notes blob, then
    /// re-runs `load`.
    ///
    /// An absent slot is `BackupNotFound`: user-visible info, partitions
    /// untouched.
    pub(crate) fn restore(&mut self) -> Result<usize, StoreError> {
        let Some(backup) = self.store.kv().get::<BackupBlob>(KEY_BACKUP)? else {
            self.notifier.notice("No backup found");
            return Err(StoreError::BackupNotFound);
        };

        for category in Category::ALL {
            if let Some(records) = backup.categories.get(category.as_str()) {
                self.store.kv().set(category.as_str(), records)?;
            }
        }

        let blob = NotesBlob {
            notes: backup.notes,
            timestamp: self.clock.now_ms(),
            version: DATA_VERSION.to_string(),
        };
        self.store.kv().set(KEY_NOTES, &blob)?;

        let result = self.load();
        Ok(result.expenses)
    }
}

#[cfg(test)]
mod tests;

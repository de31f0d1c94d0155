#![allow(clippy::unwrap_used)]

use std::cell::RefCell;
use std::io::Write;

use serde_json::json;

use super::*;
use crate::clock::FixedClock;
use crate::kv::KvStore;

const NOW: i64 = 1_700_000_000_000;
const DAY: i64 = 24 * 60 * 60 * 1000;

/// Captures user-visible notices and warnings for assertions.
struct RecordingNotifier(Rc<RefCell<Vec<String>>>);

impl UiNotifier for RecordingNotifier {
    fn notice(&self, message: &str) {
        self.0.borrow_mut().push(format!("notice: {message}"));
    }

    fn warning(&self, message: &str) {
        self.0.borrow_mut().push(format!("warning: {message}"));
    }
}

fn test_coordinator() -> (Coordinator, Rc<FixedClock>, Rc<RefCell<Vec<String>>>) {
    let clock = Rc::new(FixedClock::new(NOW));
    let kv = KvStore::open_in_memory().unwrap();
    let store = CategoryStore::new(kv, clock.clone()).unwrap();
    let messages = Rc::new(RefCell::new(Vec::new()));
    let coordinator = Coordinator::new(
        store,
        clock.clone(),
        Box::new(RecordingNotifier(messages.clone())),
    );
    (coordinator, clock, messages)
}

fn add_expense(coordinator: &Coordinator, amount: f64, category: &str, timestamp: i64) -> i64 {
    let saved = coordinator
        .store()
        .save(NewExpense {
            amount,
            description: "test".into(),
            category: Some(category.into()),
            id: None,
            date: None,
            timestamp: Some(timestamp),
        })
        .unwrap();
    saved.record.id
}

// ── Startup and migration ─────────────────────────────────────

#[test]
fn test_load_empty_store() {
    let (mut coordinator, _, _) = test_coordinator();
    let result = coordinator.load();
    assert!(result.success);
    assert_eq!(result.expenses, 0);
    assert_eq!(result.notes, 0);
    assert!(result.error.is_none());
}

#[test]
fn test_legacy_migration() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator
        .store()
        .kv()
        .set(
            KEY_LEGACY,
            &json!({
                "expenses": [
                    { "amount": 1.0, "description": "a", "category": "food", "id": 1, "timestamp": NOW - 3 },
                    { "amount": 2.0, "description": "b", "category": "uber", "id": 2, "timestamp": NOW - 2 },
                    { "amount": 3.0, "description": "c", "category": "??", "id": 3, "timestamp": NOW - 1 }
                ],
                "notes": [
                    { "text": "first", "timestamp": NOW },
                    { "text": "second", "timestamp": NOW }
                ]
            }),
        )
        .unwrap();

    let result = coordinator.load();
    assert!(result.success);
    assert_eq!(result.expenses, 3);
    assert_eq!(result.notes, 2);

    // Expenses landed in their normalized partitions
    assert_eq!(coordinator.store().get_by_category(Category::Food).len(), 1);
    assert_eq!(coordinator.store().get_by_category(Category::Transport).len(), 1);
    assert_eq!(coordinator.store().get_by_category(Category::Other).len(), 1);
    // Legacy timestamps survive the migration
    assert_eq!(coordinator.store().get_by_category(Category::Food)[0].timestamp, NOW - 3);

    // Absence of the legacy key signals "already migrated"
    assert!(!coordinator.store().kv().contains(KEY_LEGACY).unwrap());

    // A second load is a no-op: nothing re-migrated, nothing duplicated
    let again = coordinator.load();
    assert_eq!(again.expenses, 3);
    assert_eq!(again.notes, 2);
}

#[test]
fn test_migration_keeps_existing_notes_blob() {
    let (mut coordinator, _, _) = test_coordinator();
    let existing = NotesBlob {
        notes: vec![json!({ "text": "mine", "timestamp": NOW })],
        timestamp: NOW,
        version: DATA_VERSION.into(),
    };
    coordinator.store().kv().set(KEY_NOTES, &existing).unwrap();
    coordinator
        .store()
        .kv()
        .set(
            KEY_LEGACY,
            &json!({ "expenses": [], "notes": [{ "text": "legacy" }] }),
        )
        .unwrap();

    let result = coordinator.load();
    assert_eq!(result.notes, 1);
    assert_eq!(coordinator.notes()[0]["text"], "mine");
    assert!(!coordinator.store().kv().contains(KEY_LEGACY).unwrap());
}

#[test]
fn test_corrupt_legacy_blob_does_not_block_startup() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator.store().kv().set_raw(KEY_LEGACY, "{broken").unwrap();
    add_expense(&coordinator, 5.0, "food", NOW);

    let result = coordinator.load();
    assert!(result.success);
    assert_eq!(result.expenses, 1);
    assert!(matches!(result.error, Some(StoreError::MigrationFailure(_))));
}

// ── Periodic flush ────────────────────────────────────────────

#[test]
fn test_flush_timer_fires_on_interval() {
    let mut timer = FlushTimer::new(30_000);
    assert!(!timer.tick(NOW)); // not started
    timer.start(NOW);
    assert!(!timer.tick(NOW + 1_000));
    assert!(timer.tick(NOW + 30_000));
    assert!(!timer.tick(NOW + 31_000)); // deadline advanced
    assert!(timer.tick(NOW + 60_000));
    timer.stop();
    assert!(!timer.tick(NOW + 120_000));
}

#[test]
fn test_tick_flushes_notes_and_meta_when_due() {
    let (mut coordinator, clock, _) = test_coordinator();
    coordinator.load();
    add_expense(&coordinator, 10.0, "food", NOW);
    add_expense(&coordinator, 30.0, "food", NOW);
    coordinator.set_notes(vec![json!({ "text": "hi", "timestamp": NOW })]);

    coordinator.start_flush_timer();
    assert!(!coordinator.tick());

    clock.0.set(NOW + DEFAULT_FLUSH_INTERVAL_MS);
    assert!(coordinator.tick());

    let meta: MetaBlob = coordinator.store().kv().get(KEY_META).unwrap().unwrap();
    assert_eq!(meta.last_saved, NOW + DEFAULT_FLUSH_INTERVAL_MS);
    assert_eq!(meta.version, DATA_VERSION);
    let food = meta.category_stats.get("food").unwrap();
    assert_eq!(food.count, 2);
    assert_eq!(food.total, 40.0);
    assert_eq!(food.average, 20.0);

    let notes: NotesBlob = coordinator.store().kv().get(KEY_NOTES).unwrap().unwrap();
    assert_eq!(notes.notes.len(), 1);

    // Not due again until another interval has passed
    assert!(!coordinator.tick());
}

#[test]
fn test_stopped_timer_never_flushes() {
    let (mut coordinator, clock, _) = test_coordinator();
    coordinator.start_flush_timer();
    coordinator.stop_flush_timer();
    clock.0.set(NOW + 10 * DEFAULT_FLUSH_INTERVAL_MS);
    assert!(!coordinator.tick());
    assert!(!coordinator.store().kv().contains(KEY_META).unwrap());
}

// ── Cleanup ───────────────────────────────────────────────────

#[test]
fn test_cleanup_retention_boundary() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator.load();
    let old_id = add_expense(&coordinator, 1.0, "food", NOW - 91 * DAY);
    let fresh_id = add_expense(&coordinator, 2.0, "food", NOW - 89 * DAY);

    let removed = coordinator.cleanup(90 * DAY).unwrap();
    assert_eq!(removed, 1);

    let partition = coordinator.store().get_by_category(Category::Food);
    assert!(partition.iter().all(|r| r.id != old_id));
    assert!(partition.iter().any(|r| r.id == fresh_id));
    // Working state was reconciled
    assert_eq!(coordinator.expenses().len(), 1);
}

#[test]
fn test_cleanup_filters_notes_by_their_timestamp() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator.load();
    coordinator.set_notes(vec![
        json!({ "text": "old", "timestamp": NOW - 91 * DAY }),
        json!({ "text": "fresh", "timestamp": NOW - DAY }),
        json!({ "text": "no timestamp" }),
    ]);

    let removed = coordinator.cleanup(90 * DAY).unwrap();
    assert_eq!(removed, 2);
    assert_eq!(coordinator.notes().len(), 1);
    assert_eq!(coordinator.notes()[0]["text"], "fresh");

    let blob: NotesBlob = coordinator.store().kv().get(KEY_NOTES).unwrap().unwrap();
    assert_eq!(blob.notes.len(), 1);
}

#[test]
fn test_cleanup_rewrites_only_shrunk_partitions() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator.load();
    add_expense(&coordinator, 1.0, "food", NOW - 91 * DAY);
    // An unreadable partition reads as empty, so it cannot shrink; cleanup
    // must leave its stored bytes alone rather than rewrite it as [].
    coordinator.store().kv().set_raw("transport", "{corrupt").unwrap();

    coordinator.cleanup(90 * DAY).unwrap();

    assert!(coordinator.store().get_by_category(Category::Food).is_empty());
    assert_eq!(
        coordinator.store().kv().get_raw("transport").unwrap().as_deref(),
        Some("{corrupt")
    );
}

// ── File export / import ──────────────────────────────────────

#[test]
fn test_export_to_file_composition() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator.load();
    add_expense(&coordinator, 7.5, "bills", NOW);
    coordinator.set_notes(vec![json!({ "text": "n", "timestamp": NOW })]);

    let export = coordinator.export_to_file();
    assert_eq!(export.version, DATA_VERSION);
    assert_eq!(export.categories.len(), 6);
    assert_eq!(export.categories["bills"].len(), 1);
    assert_eq!(export.notes.len(), 1);
    assert!(!export.export_date.is_empty());
    assert_eq!(export.metadata.total_categories, 6);
}

#[test]
fn test_import_from_file_merges_and_reloads() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator.load();
    add_expense(&coordinator, 1.0, "food", NOW);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    let payload = json!({
        "categories": {
            "food": [{ "id": 900, "amount": 2.0, "description": "imported", "timestamp": NOW - 1 }]
        },
        "notes": [{ "text": "imported note", "timestamp": NOW }],
        "version": DATA_VERSION
    });
    file.write_all(payload.to_string().as_bytes()).unwrap();

    let imported = coordinator.import_from_file(file.path()).unwrap();
    assert_eq!(imported, 1);
    assert_eq!(coordinator.store().get_by_category(Category::Food).len(), 2);
    assert_eq!(coordinator.expenses().len(), 2);
    assert_eq!(coordinator.notes().len(), 1);
}

#[test]
fn test_import_from_file_rejects_bad_json_without_corrupting_state() {
    let (mut coordinator, _, messages) = test_coordinator();
    coordinator.load();
    add_expense(&coordinator, 1.0, "food", NOW);
    let before = coordinator.store().all_flattened();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"this is not json").unwrap();

    assert!(coordinator.import_from_file(file.path()).is_err());
    assert_eq!(coordinator.store().all_flattened(), before);
    assert!(messages.borrow().iter().any(|m| m.starts_with("warning: Import failed")));
}

#[test]
fn test_import_from_file_rejects_unknown_shape() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator.load();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{\"unrelated\": true}").unwrap();

    let err = coordinator.import_from_file(file.path()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::ImportFormatInvalid)
    ));
}

// ── Backup / restore ──────────────────────────────────────────

#[test]
fn test_backup_and_restore_hard_replace() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator.load();
    let kept_id = add_expense(&coordinator, 5.0, "food", NOW);
    coordinator.set_notes(vec![json!({ "text": "kept", "timestamp": NOW })]);
    coordinator.backup().unwrap();

    // Diverge from the snapshot: extra record, cleared partition
    add_expense(&coordinator, 99.0, "food", NOW + 1);
    coordinator.set_notes(Vec::new());

    let restored = coordinator.restore().unwrap();
    assert_eq!(restored, 1);

    // Whole-partition overwrite, not a merge: the post-backup record is gone
    let food = coordinator.store().get_by_category(Category::Food);
    assert_eq!(food.len(), 1);
    assert_eq!(food[0].id, kept_id);
    assert_eq!(coordinator.notes().len(), 1);
    assert_eq!(coordinator.notes()[0]["text"], "kept");
}

#[test]
fn test_backup_slot_is_single_and_overwritten() {
    let (mut coordinator, _, _) = test_coordinator();
    coordinator.load();
    add_expense(&coordinator, 1.0, "food", NOW);
    coordinator.backup().unwrap();

    add_expense(&coordinator, 2.0, "food", NOW + 1);
    coordinator.backup().unwrap();

    let backup: BackupBlob = coordinator.store().kv().get(KEY_BACKUP).unwrap().unwrap();
    assert_eq!(backup.categories["food"].len(), 2);
}

#[test]
fn test_restore_without_backup_is_not_found() {
    let (mut coordinator, _, messages) = test_coordinator();
    coordinator.load();
    add_expense(&coordinator, 4.0, "bills", NOW);
    let before = coordinator.store().all_flattened();

    let err = coordinator.restore().unwrap_err();
    assert!(matches!(err, StoreError::BackupNotFound));
    // Existing partitions untouched
    assert_eq!(coordinator.store().all_flattened(), before);
    assert!(messages.borrow().iter().any(|m| m == "notice: No backup found"));
}

use anyhow::Result;
use std::path::Path;

use crate::coordinator::{Coordinator, DEFAULT_RETENTION_DAYS};
use crate::error::StoreError;
use crate::models::NewExpense;

/// Thin CLI driver over the persistence API. Every invariant lives below
/// this layer; commands here only parse arguments and print results.
pub(crate) fn as_cli(args: &[String], coordinator: &mut Coordinator) -> Result<()> {
    let load = coordinator.load();
    if let Some(err) = &load.error {
        eprintln!("Warning: {err}");
    }

    match args.get(1).map(String::as_str) {
        Some("add") => cli_add(&args[2..], coordinator),
        Some("list") => cli_list(coordinator),
        Some("summary" | "s") => cli_summary(coordinator),
        Some("delete") => cli_delete(&args[2..], coordinator),
        Some("export") => cli_export(&args[2..], coordinator),
        Some("import") => cli_import(&args[2..], coordinator),
        Some("note") => cli_note(&args[2..], coordinator),
        Some("backup") => cli_backup(coordinator),
        Some("restore") => cli_restore(coordinator),
        Some("cleanup") => cli_cleanup(&args[2..], coordinator),
        Some("watch") => cli_watch(&args[2..], coordinator),
        Some("clear") => cli_clear(&args[2..], coordinator),
        Some("--help" | "-h" | "help") | None => {
            print_usage();
            Ok(())
        }
        Some("--version" | "-V" | "version") => {
            println!("spendlog {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(other) => {
            print_usage();
            anyhow::bail!("Unknown command: {other}");
        }
    }
}

fn print_usage() {
    println!("spendlog — local-only expense log");
    println!();
    println!("Usage: spendlog <command>");
    println!();
    println!("Commands:");
    println!("  add <amount> <description...>  Record an expense");
    println!("    --category <name>            Category hint (normalized; default: other)");
    println!("  list                           List all expenses, newest first");
    println!("  summary                        Per-category totals");
    println!("  delete <id>                    Delete an expense by id");
    println!("  note <text...>                 Append a note");
    println!("  export <file.json>             Write a full export to a file");
    println!("  import <file.json>             Merge an export file into the store");
    println!("  backup                         Snapshot everything into the backup slot");
    println!("  restore                        Hard-replace store contents from the backup slot");
    println!("  cleanup [--days <n>]           Drop records older than n days (default: {DEFAULT_RETENTION_DAYS})");
    println!("  clear <category|all>           Empty one partition, or every partition");
    println!("  watch [--minutes <n>]          Run the periodic flush loop (default: until killed)");
    println!("  --help, -h                     Show this help");
    println!("  --version, -V                  Show version");
}

fn cli_add(args: &[String], coordinator: &mut Coordinator) -> Result<()> {
    if args.is_empty() {
        anyhow::bail!("Usage: spendlog add <amount> <description...> [--category <name>]");
    }

    let amount: f64 = args[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("Not an amount: {}", args[0]))?;

    let category = args
        .windows(2)
        .find(|w| w[0] == "--category")
        .map(|w| w[1].as_str());

    let description: String = args[1..]
        .split(|a| *a == "--category")
        .next()
        .unwrap_or(&[])
        .join(" ");
    if description.is_empty() {
        anyhow::bail!("A description is required");
    }

    let saved = coordinator
        .store()
        .save(NewExpense::new(amount, description, category))?;
    coordinator.flush();
    println!(
        "Saved #{} {:.2} '{}' under {}",
        saved.record.id, saved.record.amount, saved.record.description, saved.category
    );
    Ok(())
}

fn cli_list(coordinator: &mut Coordinator) -> Result<()> {
    let expenses = coordinator.expenses();
    if expenses.is_empty() {
        println!("No expenses recorded.");
        return Ok(());
    }
    for e in expenses {
        println!(
            "{:>15}  {:10}  {:>10.2}  {:13}  {}",
            e.record.id, e.record.date, e.record.amount, e.category, e.record.description
        );
    }
    Ok(())
}

fn cli_summary(coordinator: &mut Coordinator) -> Result<()> {
    let stats = coordinator.store().stats();
    let mut grand_total = 0.0;
    println!("{:<15} {:>6} {:>12} {:>12}", "category", "count", "total", "average");
    for (category, s) in &stats {
        println!(
            "{:<15} {:>6} {:>12.2} {:>12.2}",
            category.to_string(),
            s.count,
            s.total,
            s.average
        );
        grand_total += s.total;
    }
    println!("{:<15} {:>6} {:>12.2}", "all", "", grand_total);
    println!("Notes: {}", coordinator.notes().len());
    Ok(())
}

fn cli_delete(args: &[String], coordinator: &mut Coordinator) -> Result<()> {
    let id: i64 = args
        .first()
        .and_then(|a| a.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("Usage: spendlog delete <id>"))?;

    match coordinator.store().delete(id)? {
        Some(category) => {
            coordinator.flush();
            println!("Deleted #{id} from {category}");
        }
        None => println!("No expense with id {id}"),
    }
    Ok(())
}

fn cli_export(args: &[String], coordinator: &mut Coordinator) -> Result<()> {
    let path = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("Usage: spendlog export <file.json>"))?;

    let export = coordinator.export_to_file();
    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(path, json)?;
    let count: usize = export.categories.values().map(Vec::len).sum();
    println!("Exported {count} expenses and {} notes to {path}", export.notes.len());
    Ok(())
}

fn cli_import(args: &[String], coordinator: &mut Coordinator) -> Result<()> {
    let path = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("Usage: spendlog import <file.json>"))?;
    if !Path::new(path).exists() {
        anyhow::bail!("File not found: {path}");
    }

    let imported = coordinator.import_from_file(Path::new(path))?;
    println!("Imported {imported} expenses from {path}");
    Ok(())
}

fn cli_note(args: &[String], coordinator: &mut Coordinator) -> Result<()> {
    if args.is_empty() {
        anyhow::bail!("Usage: spendlog note <text...>");
    }
    let now = coordinator.store().now_ms();
    let mut notes = coordinator.notes().to_vec();
    notes.push(serde_json::json!({
        "id": now,
        "text": args.join(" "),
        "timestamp": now,
    }));
    coordinator.set_notes(notes);
    coordinator.flush();
    println!("Note saved.");
    Ok(())
}

fn cli_backup(coordinator: &mut Coordinator) -> Result<()> {
    coordinator.backup()?;
    println!("Backup saved.");
    Ok(())
}

fn cli_restore(coordinator: &mut Coordinator) -> Result<()> {
    match coordinator.restore() {
        Ok(expenses) => {
            println!("Restored {expenses} expenses from backup.");
            Ok(())
        }
        Err(StoreError::BackupNotFound) => {
            println!("No backup found; nothing restored.");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn cli_cleanup(args: &[String], coordinator: &mut Coordinator) -> Result<()> {
    let days: i64 = args
        .windows(2)
        .find(|w| w[0] == "--days")
        .map(|w| w[1].parse())
        .transpose()
        .map_err(|_| anyhow::anyhow!("--days expects a number"))?
        .unwrap_or(DEFAULT_RETENTION_DAYS);

    let removed = coordinator.cleanup(days * 24 * 60 * 60 * 1000)?;
    println!("Removed {removed} entries older than {days} days.");
    Ok(())
}

fn cli_watch(args: &[String], coordinator: &mut Coordinator) -> Result<()> {
    use std::time::{Duration, Instant};

    let minutes: Option<u64> = args
        .windows(2)
        .find(|w| w[0] == "--minutes")
        .map(|w| w[1].parse())
        .transpose()
        .map_err(|_| anyhow::anyhow!("--minutes expects a number"))?;
    let deadline = minutes.map(|m| Instant::now() + Duration::from_secs(m * 60));

    coordinator.start_flush_timer();
    println!("Watching; flushing notes and metadata periodically. Ctrl+C to stop.");
    loop {
        std::thread::sleep(Duration::from_secs(1));
        coordinator.tick();
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }
    coordinator.stop_flush_timer();
    coordinator.flush();
    Ok(())
}

fn cli_clear(args: &[String], coordinator: &mut Coordinator) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("all") => {
            coordinator.store().clear_all()?;
            coordinator.flush();
            println!("All partitions cleared.");
            Ok(())
        }
        Some(name) => {
            if coordinator.store().clear_category(name)? {
                coordinator.flush();
                println!("Cleared {name}.");
            } else {
                println!("Unknown category: {name}");
            }
            Ok(())
        }
        None => anyhow::bail!("Usage: spendlog clear <category|all>"),
    }
}

mod clock;
mod coordinator;
mod error;
mod kv;
mod models;
mod run;
mod store;

use std::rc::Rc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::clock::SystemClock;
use crate::coordinator::{Coordinator, NullNotifier};
use crate::store::CategoryStore;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let db_path = get_db_path()?;
    let kv = kv::KvStore::open(&db_path)?;

    let clock = Rc::new(SystemClock);
    let store = CategoryStore::new(kv, clock.clone()).context("Failed to initialize store")?;
    let mut coordinator = Coordinator::new(store, clock, Box::new(NullNotifier));

    run::as_cli(&args, &mut coordinator)
}

fn get_db_path() -> Result<std::path::PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "spendlog", "spendlog")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    Ok(data_dir.join("spendlog.db"))
}

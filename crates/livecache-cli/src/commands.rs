use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use tracing::info;

use livecache_cache::{CellState, Owner, QuerySubscription, SubscriptionManager};
use livecache_query::{FromRowParser, QueryExecutor, Snapshot};
use livecache_store::{InMemoryStore, Store};
use livecache_types::{Filter, Order, Query};

use crate::cli::*;
use crate::config::{HostConfig, DEFAULT_DATA};
use crate::files::{cloudfile, FileDefinition, LocalFile};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = HostConfig::load(cli.config.as_deref())?;
    let data = config.data_path(cli.data.as_deref());
    match cli.command {
        Command::Demo(args) => cmd_demo(args, &config, data.as_deref()),
        Command::Insert(args) => cmd_insert(args, &config, &data_or_default(data)),
        Command::List(args) => cmd_list(args, &config, &data_or_default(data)),
        Command::Remove(args) => cmd_remove(args, &config, &data_or_default(data)),
    }
}

fn data_or_default(data: Option<PathBuf>) -> PathBuf {
    data.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA))
}

fn open_store(config: &HostConfig, path: Option<&Path>) -> anyhow::Result<InMemoryStore> {
    let capacity = config.cache.notification_capacity;
    let store = match path {
        Some(path) => InMemoryStore::open_with_capacity(path, &FileDefinition, capacity)
            .with_context(|| format!("opening store {}", path.display()))?,
        None => InMemoryStore::create_with_capacity(&FileDefinition, capacity)?,
    };
    Ok(store)
}

fn cmd_demo(args: DemoArgs, config: &HostConfig, data: Option<&Path>) -> anyhow::Result<()> {
    let store = Arc::new(open_store(config, data)?);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(demo(
        Arc::clone(&store),
        config,
        Duration::from_millis(args.delay_ms),
    ))?;
    if let Some(path) = data {
        store.save(path)?;
        println!("Saved store to {}", path.display().to_string().bold());
    }
    Ok(())
}

async fn demo(store: Arc<InMemoryStore>, config: &HostConfig, delay: Duration) -> anyhow::Result<()> {
    let seed: Vec<_> = (0..5)
        .map(|i| LocalFile::values(format!("/sdcard/{i}"), format!("file{i}")))
        .collect();
    store.bulk_insert(&cloudfile(), &seed)?;

    let manager = SubscriptionManager::<LocalFile>::new(store.clone(), config.cache.clone())?;
    let owner = Owner::new("demo");
    let query = Query::new(cloudfile()).order_by(Order::asc("path"));
    let mut materialized = manager.observe(&owner, query.clone(), FromRowParser::new())?;
    let mut indexed = manager.observe(&owner, query.indexed(), FromRowParser::new())?;

    print_state("materialized", &next(&mut materialized).await?);
    print_state("indexed", &next(&mut indexed).await?);

    tokio::time::sleep(delay).await;
    let more: Vec<_> = (5..10)
        .map(|i| LocalFile::values(format!("/sdcard/{i}"), format!("file{i}")))
        .collect();
    let inserted = store.bulk_insert(&cloudfile(), &more)?;
    println!("\n{} Inserted {} more files", "✓".green().bold(), inserted);

    print_state("materialized", &next(&mut materialized).await?);
    print_state("indexed", &next(&mut indexed).await?);

    let released = manager.release(&owner);
    info!(released, "demo owner released");
    println!("\nReleased {} subscriptions", released.to_string().bold());
    Ok(())
}

async fn next(sub: &mut QuerySubscription<LocalFile>) -> anyhow::Result<CellState<Snapshot<LocalFile>>> {
    tokio::time::timeout(Duration::from_secs(10), sub.next())
        .await
        .context("timed out waiting for a snapshot")?
        .context("subscription was torn down")
}

fn print_state(label: &str, state: &CellState<Snapshot<LocalFile>>) {
    if let Some(err) = state.failure() {
        println!("{} {}: {}", "✗".red().bold(), label, err.to_string().red());
    }
    let Some(snapshot) = state.value() else {
        println!("{}: {}", label, "no data".dimmed());
        return;
    };
    println!(
        "{} ({:?}, {} rows)",
        label.cyan().bold(),
        snapshot.mode(),
        snapshot.len()
    );
    print_snapshot(snapshot);
}

fn print_snapshot(snapshot: &Snapshot<LocalFile>) {
    for (i, file) in snapshot.iter().enumerate() {
        match file {
            Ok(file) => println!(
                "  {} {}  {}",
                format!("#{}", file.id).yellow(),
                file.path,
                file.name.dimmed()
            ),
            Err(err) => println!("  {} row {}: {}", "✗".red(), i, err),
        }
    }
}

fn cmd_insert(args: InsertArgs, config: &HostConfig, data: &Path) -> anyhow::Result<()> {
    let store = open_store(config, Some(data))?;
    let id = store.insert(&cloudfile(), &LocalFile::values(&args.path, &args.name))?;
    store.save(data)?;
    println!("{} Stored {} as {}", "✓".green().bold(), args.path.bold(), format!("#{id}").yellow());
    Ok(())
}

fn cmd_list(args: ListArgs, config: &HostConfig, data: &Path) -> anyhow::Result<()> {
    let store = Arc::new(open_store(config, Some(data))?);
    let mut query = Query::new(cloudfile()).order_by(Order::asc("path"));
    if let Some(prefix) = &args.prefix {
        query = query.filter(Filter::starts_with("path", prefix.as_str()));
    }
    let snapshot = QueryExecutor::new(store).execute(&query, Arc::new(FromRowParser::<LocalFile>::new()))?;
    if snapshot.is_empty() {
        println!("No files.");
        return Ok(());
    }
    print_snapshot(&snapshot);
    Ok(())
}

fn cmd_remove(args: RemoveArgs, config: &HostConfig, data: &Path) -> anyhow::Result<()> {
    let store = open_store(config, Some(data))?;
    let removed = store.delete(&cloudfile(), Some(&Filter::eq("path", args.path.as_str())))?;
    store.save(data)?;
    if removed == 0 {
        println!("No file at {}", args.path.bold());
    } else {
        println!("{} Removed {}", "✓".green().bold(), args.path.bold());
    }
    Ok(())
}

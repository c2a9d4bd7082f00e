//! # FieldLink Diagnostics
//!
//! Opens the same on-device store the agent app uses and reports on it.
//!
//! ## Usage
//! ```bash
//! # Show config, pending offline actions and cache size
//! cargo run -p fieldlink-cli -- status
//!
//! # Drain the offline queue against the configured backend
//! cargo run -p fieldlink-cli -- sync
//!
//! # Use a specific config file / database
//! cargo run -p fieldlink-cli -- --config ./client.toml --db ./fieldlink.db status
//! ```
//!
//! Logging follows `RUST_LOG` (default `info,fieldlink=debug,sqlx=warn`).

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use fieldlink_core::OfflineAction;
use fieldlink_store::migrations::migration_status;
use fieldlink_store::{Database, DbConfig};
use fieldlink_sync::config::ClientConfig;
use fieldlink_sync::{DrainOutcome, FieldClient, HealthProbe};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Sync,
    Purge,
    Probe,
    InitConfig,
}

#[derive(Debug)]
struct Args {
    command: Command,
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let Some(args) = parse_args(env::args().skip(1).collect()) else {
        print_help();
        return Ok(());
    };

    if args.command == Command::InitConfig {
        let config = ClientConfig::default();
        config
            .save(args.config_path.clone())
            .context("failed to write config")?;
        let shown = args
            .config_path
            .or_else(ClientConfig::default_config_path)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("✓ Wrote default config to {shown}");
        return Ok(());
    }

    let mut config = ClientConfig::load(args.config_path).context("failed to load config")?;
    if let Some(db_path) = args.db_path {
        config.storage.database_path = Some(db_path);
    }

    let db_path = config
        .database_path()
        .context("no database path configured and no platform data dir")?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let db = Database::new(DbConfig::new(&db_path))
        .await
        .context("failed to open database")?;

    let client = FieldClient::builder(config.clone())
        .with_store(Arc::new(db.clone()))
        .build()?;
    let restored = client.restore_session().await;

    match args.command {
        Command::Status => {
            let (total, applied) = migration_status(db.pool()).await?;
            let pending = client.queue().pending_actions().await?;

            println!("FieldLink Client Status");
            println!("=======================");
            println!("Backend:     {}", config.api.base_url);
            println!("Database:    {} (migrations {applied}/{total})", db_path.display());
            println!("Session:     {}", if restored { "restored" } else { "none" });
            println!("Cache keys:  {}", client.cache().size_hint().await);
            println!("Pending:     {}", pending.len());
            for action in &pending {
                println!("  {}", describe(action));
            }
        }
        Command::Sync => {
            if !restored {
                println!("⚠ No stored session; requests will be sent unauthenticated");
            }
            match client.force_sync().await {
                DrainOutcome::Completed(report) => {
                    println!(
                        "✓ Drain finished: {} attempted, {} synced, {} retried, {} dropped, {} left",
                        report.attempted,
                        report.succeeded,
                        report.retried,
                        report.dropped,
                        report.remaining
                    );
                }
                DrainOutcome::AlreadyRunning => println!("⚠ A drain is already running"),
                DrainOutcome::StorageUnavailable => {
                    anyhow::bail!("offline action list could not be read or written")
                }
            }
        }
        Command::Purge => {
            let purged = client.cache().purge_expired().await;
            println!("✓ Removed {purged} expired cache entries");
        }
        Command::Probe => {
            let probe = HealthProbe::new(
                client.refresher().http().clone(),
                client.monitor().clone(),
                &config.network,
            );
            let online = probe.check_once().await;
            println!(
                "{} {}{}",
                if online { "✓ reachable:" } else { "✗ unreachable:" },
                config.api.base_url,
                config.network.probe_path
            );
        }
        Command::InitConfig => {}
    }

    db.close().await;
    info!("Done");
    Ok(())
}

/// Sets up the tracing subscriber, honoring `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fieldlink=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Returns `None` when help was requested.
fn parse_args(args: Vec<String>) -> Option<Args> {
    let mut parsed = Args {
        command: Command::Status,
        config_path: None,
        db_path: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    parsed.db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" | "help" => return None,
            "status" => parsed.command = Command::Status,
            "sync" => parsed.command = Command::Sync,
            "purge" => parsed.command = Command::Purge,
            "probe" => parsed.command = Command::Probe,
            "init-config" => parsed.command = Command::InitConfig,
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
        i += 1;
    }

    Some(parsed)
}

fn print_help() {
    println!("FieldLink client diagnostics");
    println!();
    println!("Usage: fieldlink [OPTIONS] [COMMAND]");
    println!();
    println!("Commands:");
    println!("  status        Config, pending offline actions, cache size (default)");
    println!("  sync          Drain the offline queue now");
    println!("  purge         Remove expired cache entries");
    println!("  probe         Check the backend health endpoint once");
    println!("  init-config   Write the default config file");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  Config file (default: platform config dir)");
    println!("  -d, --db <PATH>      Database file (overrides [storage])");
    println!("  -h, --help           Show this help message");
}

fn describe(action: &OfflineAction) -> String {
    let target = action
        .kind
        .order_id()
        .map(|id| format!(" order={id}"))
        .unwrap_or_default();
    format!(
        "{} {}{} queued={} attempts={}/{}",
        action.id,
        action.kind.name(),
        target,
        action.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
        action.retry_count,
        action.max_retries
    )
}

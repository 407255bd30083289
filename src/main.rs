//! yasai-gate CLI
//!
//! Operator tool for the unlock subsystem:
//! - Inspect and grant time-limited unlocks
//! - Exercise the rewarded-ad flow with a scripted ad
//! - Print the ordered catalog with lock state
//! - Manage the cached subscription flag and configuration

use std::io::{stdout, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yasai_gate::ads::ScriptedAdPresenter;
use yasai_gate::catalog::{CatalogItem, SortSpec};
use yasai_gate::cli::output::{
    CatalogOutput, CatalogRowOutput, EntitlementOutput, StatusOutput, UnlockOutput,
};
use yasai_gate::cli::{create_formatter, Cli, Commands, GateConfig, OutputFormatter, SimulatedAd};
use yasai_gate::clock::SystemClock;
use yasai_gate::entitlement::StoredEntitlementSource;
use yasai_gate::storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use yasai_gate::subsystem::UnlockSubsystem;

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Quiet by default - only show errors unless explicitly verbose
    let filter = if cli.verbose { "debug" } else { "error" };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(GateConfig::default_path);
    let mut config = GateConfig::load_from(config_path.clone());
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }

    let format = cli.output_format(&config.output.default_format);
    let use_color = config.output.color && stdout().is_terminal();
    let formatter = create_formatter(format, use_color);

    let result = match cli.command {
        Commands::Config {
            get,
            set,
            list,
            reset,
            path,
        } => handle_config(get, set, list, reset, path, &config_path, formatter.as_ref()),
        command => {
            let kv = open_store(&config, cli.ephemeral)?;
            run_command(command, &config, kv, formatter.as_ref()).await
        }
    };

    if let Err(e) = result {
        formatter.format_error(&format!("{:#}", e), &mut std::io::stderr())?;
        std::process::exit(1);
    }

    Ok(())
}

fn open_store(config: &GateConfig, ephemeral: bool) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    if ephemeral {
        return Ok(Arc::new(MemoryKeyValueStore::new()));
    }
    let dir = config.data_dir();
    let store = FileKeyValueStore::new(&dir)
        .with_context(|| format!("Failed to open data directory {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn build_subsystem(
    config: &GateConfig,
    kv: Arc<dyn KeyValueStore>,
    presenter: Arc<ScriptedAdPresenter>,
) -> UnlockSubsystem {
    UnlockSubsystem::new(
        kv.clone(),
        presenter,
        Arc::new(StoredEntitlementSource::new(kv)),
        Arc::new(SystemClock),
        config.subsystem_settings(),
    )
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_command(
    command: Commands,
    config: &GateConfig,
    kv: Arc<dyn KeyValueStore>,
    formatter: &dyn OutputFormatter,
) -> anyhow::Result<()> {
    let presenter = Arc::new(ScriptedAdPresenter::new());
    let subsystem = build_subsystem(config, kv, presenter.clone());
    let mut out = stdout();

    match command {
        Commands::Status { item } => {
            subsystem.init().await;
            let status = handle_status(&subsystem, &item).await;
            subsystem.teardown().await;
            formatter.format_status(&status, &mut out)?;
        }

        Commands::Unlock { item, simulate } => {
            match simulate {
                SimulatedAd::Reward => presenter.push_rewarded(),
                SimulatedAd::Dismiss => presenter.push_dismissed(),
                SimulatedAd::Error => presenter.push_error("simulated ad failure"),
            }
            subsystem.init().await;
            let outcome = subsystem.request_unlock_outcome(&item).await;
            subsystem.teardown().await;
            formatter.format_unlock(&UnlockOutput::new(&item, outcome), &mut out)?;
        }

        Commands::Grant {
            item,
            duration_secs,
        } => {
            let duration = duration_secs
                .map(Duration::from_secs)
                .unwrap_or(subsystem.settings().gate.unlock_duration);
            let record = subsystem
                .manager()
                .grant(&item, subsystem.now_ms(), duration)
                .await
                .with_context(|| format!("Failed to grant {}", item))?;
            formatter.format_grant(&record, &mut out)?;
        }

        Commands::Sweep => {
            let report = subsystem
                .manager()
                .sweep(subsystem.now_ms())
                .await
                .context("Sweep failed")?;
            formatter.format_sweep(&report, &mut out)?;
        }

        Commands::Catalog { items, sort, desc } => {
            let catalog = handle_catalog(&subsystem, &items, sort.spec(desc)).await?;
            formatter.format_catalog(&catalog, &mut out)?;
        }

        Commands::Entitlement { set } => {
            let entitlements = subsystem.entitlements();
            match set {
                Some(active) => subsystem
                    .confirm_entitlement(active)
                    .await
                    .context("Failed to save entitlement")?,
                None => {
                    entitlements.load_cached().await;
                }
            }
            formatter.format_entitlement(
                &EntitlementOutput {
                    active: entitlements.is_entitled(),
                    origin: entitlements.origin(),
                },
                &mut out,
            )?;
        }

        Commands::Config { .. } => anyhow::bail!("config does not use the data store"),
    }

    out.flush()?;
    Ok(())
}

async fn handle_status(subsystem: &UnlockSubsystem, item: &str) -> StatusOutput {
    let entitled = subsystem.is_entitled();
    let record = if entitled {
        None
    } else {
        subsystem
            .manager()
            .active_record(item, subsystem.now_ms())
            .await
    };

    StatusOutput {
        item_id: item.to_string(),
        lockable: subsystem.is_lockable(item),
        locked: subsystem.is_locked(item).await,
        entitled,
        unlocked_until: record.map(|r| r.unlocked_until),
        remaining: subsystem.remaining_label(item).await,
    }
}

async fn handle_catalog(
    subsystem: &UnlockSubsystem,
    path: &Path,
    sort: SortSpec,
) -> anyhow::Result<CatalogOutput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let items: Vec<CatalogItem> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog items in {}", path.display()))?;

    subsystem.entitlements().load_cached().await;
    let rows = subsystem.ordered_catalog(&items, sort).await;
    let style = subsystem.settings().remaining_style;

    Ok(CatalogOutput {
        sort,
        sort_label: sort.label(),
        entitled: subsystem.is_entitled(),
        rows: rows
            .iter()
            .map(|row| CatalogRowOutput::from_row(row, style))
            .collect(),
    })
}

fn handle_config(
    get: Option<String>,
    set: Option<String>,
    list: bool,
    reset: bool,
    path: bool,
    config_path: &Path,
    formatter: &dyn OutputFormatter,
) -> anyhow::Result<()> {
    let mut out = stdout();

    if path {
        formatter.format_message(&config_path.display().to_string(), &mut out)?;
        return Ok(());
    }

    if reset {
        GateConfig::default().save_to(config_path.to_path_buf())?;
        formatter.format_message(
            &format!("Configuration reset to defaults ({})", config_path.display()),
            &mut out,
        )?;
        return Ok(());
    }

    let mut config = GateConfig::load_from(config_path.to_path_buf());

    if let Some(key) = get {
        let value = config
            .get(&key)
            .with_context(|| format!("Unknown configuration key: {}", key))?;
        formatter.format_config(&[(key, value)], &mut out)?;
        return Ok(());
    }

    if let Some(kv) = set {
        let (key, value) = kv
            .split_once('=')
            .context("Invalid format. Use: --set key=value")?;
        config.set(key, value)?;
        config.save_to(config_path.to_path_buf())?;
        formatter.format_message(&format!("Set {} = {}", key, value), &mut out)?;
        return Ok(());
    }

    if list {
        formatter.format_config(&config.list(), &mut out)?;
        return Ok(());
    }

    // Default: show usage
    formatter.format_message(
        "Configuration commands:\n  \
         yasai-gate config --list            Show all settings\n  \
         yasai-gate config --get <key>       Get a setting\n  \
         yasai-gate config --set <key>=<val> Set a setting\n  \
         yasai-gate config --reset           Reset to defaults\n  \
         yasai-gate config --path            Show config file path",
        &mut out,
    )?;
    Ok(())
}

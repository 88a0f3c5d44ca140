use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use sitesync::events::{TOPIC_CALLABLE_CHANGED, TOPIC_OPTION_UPDATED};
use sitesync::tracker::FORCE_SYNC_OPTION_KEY;
use sitesync::{
    CallableTracker, CurrentIdentity, EventBus, ExecContext, JsonFileStore, OptionStore, Settings,
    SkipReason, SyncOutcome, Whitelist, attach_unlock_listeners,
};

#[derive(Parser)]
#[command(name = "sitesync")]
#[command(about = "Checksum-debounced synchronization of computed site state")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Run one sync pass against the state file
    Sync {
        /// Run as a background/cron pass (always-send subset only)
        #[arg(long)]
        cron: bool,

        /// Bypass the debounce window for this pass
        #[arg(short, long)]
        force: bool,
    },

    /// Clear the debounce lock so the next pass runs immediately
    Unlock,

    /// Clear checksum store, debounce lock, and cached lookups
    Reset,

    /// Enqueue a full resync of every tracked callable
    FullSync,

    /// Set a durable option in the state file
    SetOption {
        /// Option key
        key: String,

        /// Value, parsed as JSON (falls back to a plain string)
        value: String,
    },

    /// Show tracked callables, lock state, and stored checksums
    Status,

    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Failed to load configuration")?;
    sitesync::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force).map_err(|e| anyhow::anyhow!(e))?;
            println!("Created {}", path.display());
            Ok(())
        }
        Commands::Sync { cron, force } => {
            let (tracker, store, _bus) = build_tracker(&settings)?;
            if force {
                OptionStore::set(&*store, FORCE_SYNC_OPTION_KEY, json!(true))?;
            }
            let ctx = if cron {
                ExecContext::Cron
            } else {
                ExecContext::AdminInteractive
            };
            match tracker.evaluate_and_sync(ctx)? {
                SyncOutcome::Completed { emitted } if emitted.is_empty() => {
                    println!("No changes to send");
                }
                SyncOutcome::Completed { emitted } => {
                    println!("Sent {} callable(s)", emitted.len());
                }
                SyncOutcome::Skipped(SkipReason::Debounced) => {
                    println!("Debounced; use --force or `sitesync unlock` to send now");
                }
                SyncOutcome::Skipped(reason) => {
                    println!("Skipped: {reason:?}");
                }
            }
            Ok(())
        }
        Commands::Unlock => {
            let (tracker, _, _) = build_tracker(&settings)?;
            tracker.unlock()?;
            println!("Debounce lock cleared");
            Ok(())
        }
        Commands::Reset => {
            let (tracker, _, _) = build_tracker(&settings)?;
            tracker.reset()?;
            println!("Tracker state cleared");
            Ok(())
        }
        Commands::FullSync => {
            let (tracker, _, _) = build_tracker(&settings)?;
            let actions = tracker.enqueue_full_sync();
            println!(
                "Enqueued {actions} full-sync action(s) covering {} callable(s)",
                tracker.tracked_names().len()
            );
            Ok(())
        }
        Commands::SetOption { key, value } => {
            let (_, store, bus) = build_tracker(&settings)?;
            let value: Value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            OptionStore::set(&*store, &key, value)?;
            // Mirror the host contract: every option write is announced.
            bus.publish(TOPIC_OPTION_UPDATED, &[json!(key)]);
            println!("Set {key}");
            Ok(())
        }
        Commands::Status => {
            let (tracker, _, _) = build_tracker(&settings)?;
            println!("State file: {}", settings.state_path.display());
            println!(
                "Debounce: {}s window, currently {}",
                settings.sync.debounce_secs,
                if tracker.is_locked() {
                    "locked"
                } else {
                    "unlocked"
                }
            );
            println!("Tracked callables:");
            for name in tracker.tracked_names() {
                println!("  {name}");
            }
            let checksums = tracker.stored_checksums();
            println!("Stored checksums: {}", checksums.len());
            for (name, checksum) in checksums {
                println!("  {name}: {checksum}");
            }
            Ok(())
        }
        Commands::Config => {
            let toml = toml::to_string_pretty(&settings)?;
            println!("{toml}");
            Ok(())
        }
    }
}

/// Wire a tracker over the file-backed store, with a stdout subscriber for
/// emitted events and the unlock listeners attached.
fn build_tracker(
    settings: &Settings,
) -> Result<(Arc<CallableTracker>, Arc<JsonFileStore>, Arc<EventBus>)> {
    let store = Arc::new(
        JsonFileStore::open(&settings.state_path).context("Failed to open state file")?,
    );
    let bus = Arc::new(EventBus::new());

    bus.subscribe(TOPIC_CALLABLE_CHANGED, |args| {
        if let [name, value] = args {
            println!("  -> {name} = {value}");
        }
    });

    let whitelist = Whitelist::standard(store.clone(), settings.sync.multisite);
    let tracker = Arc::new(
        CallableTracker::new(
            whitelist,
            store.clone(),
            store.clone(),
            bus.clone(),
            settings.sync.debounce_window(),
        )
        .with_identity(CurrentIdentity::new(), settings.sync.elevated_actor.clone()),
    );
    attach_unlock_listeners(&bus, tracker.clone());

    Ok((tracker, store, bus))
}

//! keytrack CLI: `ktrack` command.
//!
//! Operator tooling over the file-backed stores: inspect key family
//! dumps, read and verify tracking statement history, clear tracked
//! markers, and show the effective configuration.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use keytrack::storage::FileStatementStore;
use keytrack::time::micros_to_rfc3339;
use keytrack::tracking::verify_history;
use keytrack::{Config, DeviceKey, KeyClass, KeyFamilyGraph, RevokedKey, StatementStore, Uid};

// ── CLI structure ─────────────────────────────────────────────────────────────

/// keytrack CLI: inspect key families and tracking statements.
#[derive(Parser, Debug)]
#[command(
    name = "ktrack",
    about = "keytrack CLI",
    version,
    long_about = "ktrack: keytrack CLI\n\nInspect key family dumps, verify tracking statement history,\nand manage tracked markers in the local statement store."
)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage root (overrides the configuration)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Key family operations
    Keys {
        #[command(subcommand)]
        subcommand: KeysCommands,
    },

    /// Print and verify the statement history of a pair
    History {
        /// Tracker uid
        tracker: String,
        /// Trackee uid
        trackee: String,
        /// Print statements as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear the tracked marker of a pair (history is kept)
    Untrack {
        /// Tracker uid
        tracker: String,
        /// Trackee uid
        trackee: String,
    },

    /// List every pair in the statement store
    Pairs,

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
enum KeysCommands {
    /// Validate a key family dump and report its keys
    Check {
        /// JSON file with {"uid", "keys", "revocations"}
        file: PathBuf,

        /// Evaluate at this time (Unix microseconds, default now)
        #[arg(long)]
        at: Option<u64>,
    },
}

/// A user's published keys as dumped to disk.
#[derive(Debug, Deserialize)]
struct KeyDump {
    uid: Uid,
    keys: Vec<DeviceKey>,
    #[serde(default)]
    revocations: Vec<RevokedKey>,
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = load_config(cli.config.as_deref(), cli.root.clone()).and_then(|config| {
        match cli.command {
            Commands::Keys { subcommand } => match subcommand {
                KeysCommands::Check { file, at } => cmd_keys_check(&file, at, verbose),
            },
            Commands::History {
                tracker,
                trackee,
                json,
            } => cmd_history(&config, &tracker, &trackee, json, verbose),
            Commands::Untrack { tracker, trackee } => cmd_untrack(&config, &tracker, &trackee),
            Commands::Pairs => cmd_pairs(&config),
            Commands::Config => cmd_config(&config),
        }
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load_or_default(path).context("failed to load configuration")?;
    if let Some(root) = root {
        config.storage.root = root;
    }
    log::debug!("storage root {}", config.storage.root.display());
    Ok(config)
}

fn open_store(config: &Config) -> Result<FileStatementStore> {
    let dir = config.storage.statements_dir();
    FileStatementStore::new(&dir)
        .with_context(|| format!("failed to open statement store at {}", dir.display()))
}

// ── Command implementations ───────────────────────────────────────────────────

/// `ktrack keys check FILE [--at MICROS]`
fn cmd_keys_check(file: &Path, at: Option<u64>, verbose: bool) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let dump: KeyDump = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a key family dump", file.display()))?;
    let now = at.unwrap_or_else(keytrack::time::now_micros);

    let graph = KeyFamilyGraph::build(dump.uid, dump.keys, dump.revocations)
        .context("key family is invalid")?;

    println!("Key family of {}: {} key(s)", graph.uid(), graph.len());
    for key in graph.keys() {
        let role = if key.is_eldest {
            "eldest"
        } else if key.is_sibkey {
            "sibkey"
        } else {
            "subkey"
        };
        let class = match graph.classify(&key.kid) {
            KeyClass::Device => "device",
            KeyClass::Backup => "backup",
            KeyClass::Unknown => "unknown",
        };
        let state = if let Some(revoked) = graph.revocation(&key.kid) {
            format!("revoked {}", micros_to_rfc3339(revoked.revoked_at))
        } else if graph.is_active(&key.kid, now) {
            "active".to_string()
        } else {
            "inactive".to_string()
        };
        println!(
            "  {}  {:<6} {:<6} {:<8} {} ({})",
            key.kid.short(),
            role,
            class,
            key.device_type.as_str(),
            key.device_id,
            state
        );
        if verbose {
            println!("      kid:     {}", key.kid);
            if let Some(parent) = &key.parent_id {
                println!("      parent:  {}", parent.short());
            }
            println!("      created: {}", micros_to_rfc3339(key.created_at));
        }
    }

    match graph.active_signing_key(now) {
        Ok(key) => println!("Active signing key: {} ({})", key.kid, key.device_id),
        Err(e) => println!("Active signing key: none ({e})"),
    }
    Ok(())
}

/// `ktrack history TRACKER TRACKEE [--json]`
fn cmd_history(
    config: &Config,
    tracker: &str,
    trackee: &str,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let (tracker, trackee) = (Uid::new(tracker), Uid::new(trackee));
    let history = store
        .history(&tracker, &trackee)
        .context("failed to read statement history")?;

    if history.is_empty() {
        return Err(anyhow!("no statements for {tracker} -> {trackee}"));
    }

    if json {
        let out = serde_json::to_string_pretty(&history)?;
        println!("{out}");
    } else {
        let tracking = store.is_tracking(&tracker, &trackee)?;
        println!(
            "{tracker} -> {trackee}: {} statement(s), {}",
            history.len(),
            if tracking { "tracking" } else { "not tracking" }
        );
        for statement in &history {
            let passed = statement
                .proof_results
                .iter()
                .filter(|r| r.is_pass())
                .count();
            println!(
                "  #{:<4} {}  {}/{} proofs passed  signed by {}{}",
                statement.sequence_number,
                micros_to_rfc3339(statement.created_at),
                passed,
                statement.proof_results.len(),
                statement.signing_kid.short(),
                if statement.local_only { "  (local)" } else { "" }
            );
            if verbose {
                for result in &statement.proof_results {
                    println!("        {:?}  {}", result.status, result.assertion);
                }
                println!(
                    "        keys: {}",
                    statement.trackee_key_fingerprints.len()
                );
            }
        }
    }

    match verify_history(&history) {
        Ok(()) => eprintln!("History: valid"),
        Err(e) => return Err(anyhow!("history is INVALID: {e}")),
    }
    Ok(())
}

/// `ktrack untrack TRACKER TRACKEE`
fn cmd_untrack(config: &Config, tracker: &str, trackee: &str) -> Result<()> {
    let store = open_store(config)?;
    store
        .untrack(&Uid::new(tracker), &Uid::new(trackee))
        .with_context(|| format!("failed to untrack {trackee}"))?;
    println!("{tracker} no longer tracks {trackee}");
    Ok(())
}

/// `ktrack pairs`
fn cmd_pairs(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let pairs = store.pairs()?;
    if pairs.is_empty() {
        println!("No tracking statements in {}", store.base_dir().display());
        return Ok(());
    }
    for (tracker, trackee) in pairs {
        let latest = store
            .latest(&tracker, &trackee)?
            .map_or(0, |s| s.sequence_number);
        let marker = if store.is_tracking(&tracker, &trackee)? {
            "tracking"
        } else {
            "untracked"
        };
        println!("{tracker} -> {trackee}  #{latest}  {marker}");
    }
    Ok(())
}

/// `ktrack config`
fn cmd_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

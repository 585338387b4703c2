//! degraphmalizer CLI tool
//!
//! ## Commands
//!
//! - `check <config-dir>`: load an index configuration directory once and summarize it
//! - `watch <config-dir>`: keep reloading the configuration as its files change, until Ctrl-C
//! - `replay --index <index> --log-path <file>`: re-deliver the changes of an error log

use clap::{Parser, Subcommand};
use degraphmalizer::{
    config::{
        ConfigurationProvider, Configuration, HookRegistry, ReloadingConfiguration,
        ServiceSettings,
    },
    event::Event,
    store::{DocumentStore, MemoryStore},
    updater::{error_log_path, UpdaterManager},
    watch::ConfigurationWatcher,
    DegraphmalizerError,
};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::channel,
        Arc,
    },
    time::Duration,
};

#[derive(Parser)]
#[command(name = "degraphmalizer")]
#[command(
    author,
    version,
    about = "Keeps derived search documents in step with a document graph",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an index configuration directory and print what it configures
    Check {
        /// Directory with one sub-directory per target index
        config_dir: PathBuf,
    },

    /// Reload the configuration whenever its files change
    Watch {
        /// Directory with one sub-directory per target index
        config_dir: PathBuf,
    },

    /// Queue every change of an error log for delivery again
    Replay {
        /// Target index the log belongs to
        #[arg(long)]
        index: String,

        /// Error log to replay
        #[arg(long)]
        log_path: PathBuf,

        /// Aliases of the index that should receive the changes as well
        #[arg(long)]
        alias: Vec<String>,

        /// Service settings file (endpoint, retries, log directory)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

fn summarize(cfg: &Configuration) {
    for index in cfg.indices.iter() {
        println!("{}", index.name);
        for config in index.types.iter() {
            println!(
                "  {} <- {}/{}{}{}",
                config.target_type,
                config.source_index,
                config.source_type,
                if config.filter.is_some() { ", filtered" } else { "" },
                if config.transform.is_some() { ", transformed" } else { "" },
            );
            for walk in config.walks.values() {
                let properties: Vec<&str> = walk.properties.keys().map(|p| p.as_str()).collect();
                println!(
                    "    walk {} {}: {}",
                    walk.name,
                    walk.direction,
                    properties.join(", ")
                );
            }
        }
    }
}

fn replay(
    index: String,
    log_path: PathBuf,
    aliases: Vec<String>,
    settings: Option<PathBuf>,
) -> Result<(), DegraphmalizerError> {
    let settings = match settings {
        Some(path) => ServiceSettings::from_file(path)?,
        None => ServiceSettings::default(),
    };

    // failures during the replay append to the updater's own error log
    let mut source = log_path.clone();
    if error_log_path(&settings.updater.log_path, &index) == log_path {
        source = log_path.with_extension("log.replayed");
        std::fs::rename(&log_path, &source)?;
        println!("Moved {} to {}", log_path.display(), source.display());
    }

    let store = Arc::new(MemoryStore::new());
    for alias in aliases {
        store.add_alias(&index, alias);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let aliases: Arc<dyn DocumentStore> = store;
    let manager = UpdaterManager::new(settings.updater.clone(), aliases, runtime.handle().clone());

    let count = manager.updater(&index)?.replay(&source)?;
    println!("Replaying {count} change(s) into {index}");

    runtime.block_on(async {
        loop {
            let pending = manager.queue_size().await?;
            if pending == 0 {
                break;
            }
            tracing::debug!("{pending} change(s) pending");
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        manager.shutdown().await
    })?;

    println!(
        "Replay finished. Undeliverable changes are in {}",
        error_log_path(&settings.updater.log_path, &index).display()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config_dir } => {
            let provider = ReloadingConfiguration::new(config_dir, HookRegistry::with_builtins())?;
            let cfg = provider.configuration();
            summarize(&cfg);
            println!(
                "\n{} index(es), {} type configuration(s)",
                cfg.indices.len(),
                cfg.type_configs().count()
            );
            Ok(())
        }

        Commands::Watch { config_dir } => {
            let provider = Arc::new(ReloadingConfiguration::new(
                config_dir.clone(),
                HookRegistry::with_builtins(),
            )?);
            summarize(&provider.configuration());

            let (tx, rx) = channel::<Event>();
            let watcher = ConfigurationWatcher::new(provider, tx)?;
            println!(
                "Watching {} for changes. Press Ctrl-C to stop.",
                config_dir.display()
            );

            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                println!("\nShutting down...");
                r.store(false, Ordering::SeqCst);
            })?;

            while running.load(Ordering::SeqCst) {
                match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(event) => println!("[Event] {event}"),
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }

            watcher.unwatch()?;
            println!("Shutdown complete");
            Ok(())
        }

        Commands::Replay {
            index,
            log_path,
            alias,
            settings,
        } => {
            replay(index, log_path, alias, settings)?;
            Ok(())
        }
    }
}

//! lexr-dedup - duplicate detection and reconciliation for word occurrences
//!
//! Exit codes: 0 clean or success, 1 residual duplicates / refused or failed
//! operation / CI alert, 2 configuration or startup error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lexr_common::config::{default_config_path, load_toml, RootFolderInitializer, RootFolderResolver};
use lexr_common::db::init_database;
use lexr_common::time::{now, run_stamp};
use lexr_dedup::analyze::AdvisoryReport;
use lexr_dedup::artifacts::{ArtifactDir, RunLog};
use lexr_dedup::config::{DedupConfig, TOOL_NAME};
use lexr_dedup::enforcer::{enforce, EnforceOptions};
use lexr_dedup::grouper;
use lexr_dedup::monitor::{history_report, History, Monitor, MonitorOptions};
use lexr_dedup::reconciler::{ReconcileOptions, Reconciler};
use lexr_dedup::restore::restore;
use lexr_dedup::scoring::PolicyKind;
use lexr_dedup::store::SqliteRecordStore;
use lexr_dedup::{ReconcileResult, RecordFilter};

const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "lexr-dedup")]
#[command(about = "Detect and reconcile duplicate word occurrences")]
#[command(version)]
struct Args {
    /// Root folder holding the database and run artifacts
    #[arg(short, long, global = true, env = "LEXR_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Database file (default: <root>/lexr.db)
    #[arg(long, global = true, env = "LEXR_DATABASE")]
    database: Option<PathBuf>,

    /// TOML config file (default: ~/.config/lexr/lexr-dedup.toml)
    #[arg(long, global = true, env = "LEXR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report duplicate groups and the advisory keeper for each; never mutates
    Analyze {
        #[arg(long, value_enum)]
        policy: Option<PolicyKind>,
        /// Number of largest groups to list
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long)]
        verse: Option<String>,
        #[arg(long)]
        word: Option<String>,
    },
    /// Analyze, identify, delete and verify
    Reconcile {
        /// Build and back up the plan without deleting
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long, value_enum)]
        policy: Option<PolicyKind>,
    },
    /// Propose (and optionally apply) the uniqueness constraint
    Enforce {
        /// Proceed even though duplicates exist
        #[arg(long)]
        force: bool,
        /// Execute the DDL instead of only writing it out
        #[arg(long)]
        apply: bool,
    },
    /// Scan for regressions once or on an interval
    Monitor {
        #[arg(long)]
        watch: bool,
        /// Seconds between scans in watch mode
        #[arg(long)]
        interval: Option<u64>,
        /// List the largest groups when duplicates are found
        #[arg(long)]
        alert: bool,
        /// Exit 1 as soon as duplicates are found
        #[arg(long)]
        ci: bool,
        /// Print history metadata without scanning
        #[arg(long)]
        history: bool,
    },
    /// Re-insert rows from a backup-<run>.records.json file
    Restore {
        #[arg(long = "from")]
        from: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path(TOOL_NAME));

    // Config loading logs through tracing before the configured subscriber exists
    let bootstrap = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .finish();
    let config = match tracing::subscriber::with_default(bootstrap, || load_config(&args, config_path.as_deref())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = &config.logging.level;
            format!("lexr_dedup={level},lexr_common={level}").into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "lexr-dedup {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) if path.exists() => info!("Config: {}", path.display()),
        _ => info!("Config: compiled defaults"),
    }

    let app = match App::open(&args, config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match app.dispatch(args.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}

/// Load TOML, apply command-specific CLI overrides, then validate
fn load_config(args: &Args, path: Option<&Path>) -> Result<DedupConfig> {
    let mut config: DedupConfig = load_toml(path)?;

    match &args.command {
        Command::Reconcile {
            batch_size: Some(n), ..
        } => config.engine.batch_size = *n,
        Command::Monitor {
            interval: Some(secs), ..
        } => config.engine.watch_interval_secs = *secs,
        _ => {}
    }

    config.engine.validate()?;
    Ok(config)
}

/// Everything a command needs once startup succeeded
struct App {
    config: DedupConfig,
    store: SqliteRecordStore,
    artifacts: ArtifactDir,
    run: String,
}

impl App {
    async fn open(args: &Args, config: DedupConfig) -> Result<Self> {
        let root = RootFolderResolver::new(args.root_folder.clone(), config.root_folder.clone()).resolve();
        let initializer = RootFolderInitializer::new(root);
        initializer
            .ensure_directory_exists()
            .context("Failed to create root folder")?;
        info!("Root folder: {}", initializer.root_folder().display());

        let db_path = args
            .database
            .clone()
            .or_else(|| config.database_path.clone())
            .unwrap_or_else(|| initializer.database_path());
        info!("Database: {}", db_path.display());

        let pool = init_database(&db_path)
            .await
            .context("Failed to open database")?;
        let store = SqliteRecordStore::new(pool, config.engine.store_timeout());

        let artifacts_dir = config
            .engine
            .artifacts_dir
            .clone()
            .unwrap_or_else(|| initializer.root_folder().join("reconcile"));
        let artifacts = ArtifactDir::open(artifacts_dir).context("Failed to open artifacts directory")?;

        Ok(Self {
            config,
            store,
            artifacts,
            run: run_stamp(now()),
        })
    }

    async fn dispatch(&self, command: Command) -> ReconcileResult<u8> {
        let engine = &self.config.engine;

        match command {
            Command::Analyze {
                policy,
                top,
                verse,
                word,
            } => {
                let mut log = RunLog::create(&self.artifacts, "analyze", &self.run)?;
                let policy = policy.unwrap_or(engine.report_policy).build(&engine.weights);
                let filter = RecordFilter { verse_id: verse, word };
                let filter = (!filter.is_empty()).then_some(filter);

                let grouping = grouper::analyze(&self.store, filter.as_ref(), engine.key_mode, "analyze").await?;
                let report = AdvisoryReport::build(&grouping, policy.as_ref(), top);
                println!("{}", report);
                log.info(format!(
                    "Analysis complete: {} duplicate groups",
                    report.stats.duplicate_groups
                ));
                Ok(0)
            }

            Command::Reconcile { dry_run, policy, .. } => {
                let mut log = RunLog::create(&self.artifacts, "reconcile", &self.run)?;
                let policy = policy.unwrap_or(engine.reconcile_policy).build(&engine.weights);
                let options = ReconcileOptions {
                    dry_run,
                    ..ReconcileOptions::from_config(engine)
                };

                let summary = Reconciler::new(&self.store, policy.as_ref(), &self.artifacts, options, &self.run)
                    .run(&mut log)
                    .await?;
                println!("{}", summary);
                if let Some(err) = summary.verification_error() {
                    return Err(err);
                }
                Ok(summary.exit_code())
            }

            Command::Enforce { force, apply } => {
                let mut log = RunLog::create(&self.artifacts, "enforce", &self.run)?;
                let options = EnforceOptions {
                    constraint_name: engine.constraint_name.clone(),
                    key_mode: engine.key_mode,
                    force,
                    apply,
                };

                let outcome = enforce(&self.store, &options, &self.artifacts, &self.run, &mut log).await?;
                if let Some(path) = &outcome.constraint_path {
                    println!("Constraint proposal: {}", path.display());
                }
                if let Some(path) = &outcome.index_path {
                    println!("Index proposals:     {}", path.display());
                }
                match &outcome.applied {
                    Some(Ok(())) => println!("Constraint applied"),
                    Some(Err(message)) => println!("Store rejected the constraint: {}", message),
                    None => {}
                }
                Ok(outcome.exit_code())
            }

            Command::Monitor {
                watch,
                alert,
                ci,
                history,
                ..
            } => {
                if history {
                    let history = History::load(&self.artifacts.history_path())?;
                    println!("{}", history_report(&history));
                    return Ok(0);
                }

                let mut log = RunLog::create(&self.artifacts, "monitor", &self.run)?;
                let policy = engine.report_policy.build(&engine.weights);
                let options = MonitorOptions {
                    key_mode: engine.key_mode,
                    retention: engine.history_retention,
                    top_n: engine.alert_top_n,
                    alert,
                    ci,
                };
                let mut monitor = Monitor::open(&self.store, policy.as_ref(), options, self.artifacts.history_path())?;

                if watch {
                    let exit = monitor
                        .watch(engine.watch_interval(), shutdown_signal(), &mut log)
                        .await?;
                    return Ok(exit.exit_code());
                }

                let outcome = monitor.check(&mut log).await?;
                Ok(if outcome.alert.is_some() && ci { 1 } else { 0 })
            }

            Command::Restore { from } => {
                let mut log = RunLog::create(&self.artifacts, "restore", &self.run)?;
                let outcome = restore(&self.store, &from, &mut log).await?;
                println!(
                    "Restored {} of {} records ({} already present)",
                    outcome.inserted, outcome.in_backup, outcome.skipped
                );
                Ok(0)
            }
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping"),
        _ = terminate => info!("Received terminate signal, stopping"),
    }
}

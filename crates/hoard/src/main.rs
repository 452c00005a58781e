//! hoard: scheduled MongoDB backups.
//!
//! Main binary with subcommands:
//! - `daemon`: Run every plan on its schedule until interrupted
//! - `backup`: Run one plan now
//! - `status`: Print the recorded status of every plan
//! - `restore`: Restore an archive into a plan's target
//! - `check`: Validate plans and report external tool availability

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hoard_backup::{MongoRestore, restore_archive};
use hoard_config::{AppConfig, load_plan, load_plans};
use hoard_scheduler::StatusStore;
use miette::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod checks;
mod daemon;

#[derive(Parser)]
#[command(name = "hoard")]
#[command(about = "Scheduled MongoDB backups", long_about = None)]
struct Cli {
    /// Directory holding one YAML file per plan
    #[arg(long, env = "HOARD_CONFIG_PATH", default_value = "/config", global = true)]
    config_path: PathBuf,

    /// Directory for locally retained backups
    #[arg(long, env = "HOARD_STORAGE_PATH", default_value = "/storage", global = true)]
    storage_path: PathBuf,

    /// Working directory for in-progress artifacts
    #[arg(long, env = "HOARD_TMP_PATH", default_value = "/tmp", global = true)]
    tmp_path: PathBuf,

    /// Directory for the status store
    #[arg(long, env = "HOARD_DATA_PATH", default_value = "/data", global = true)]
    data_path: PathBuf,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "HOARD_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until SIGINT or SIGTERM
    Daemon,

    /// Run one plan now and print the result
    Backup {
        /// Plan name
        plan: String,
    },

    /// Print the recorded status of every plan
    Status,

    /// Restore an archive into the plan's own target
    Restore {
        /// Plan name
        plan: String,

        /// Archive produced by a previous backup
        archive: PathBuf,
    },

    /// Validate plans and check external tools
    Check,
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        AppConfig::new(
            &self.config_path,
            &self.storage_path,
            &self.tmp_path,
            &self.data_path,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("hoard={}", cli.log_level));
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app = cli.app_config();
    match cli.command {
        Commands::Daemon => daemon::run(app).await,
        Commands::Backup { plan } => run_backup(app, &plan).await,
        Commands::Status => print_status(&app).await,
        Commands::Restore { plan, archive } => run_restore(&app, &plan, &archive).await,
        Commands::Check => run_check(app).await,
    }
}

async fn run_backup(mut app: AppConfig, plan: &str) -> Result<()> {
    let plans = load_plans(&app.config_path).map_err(|e| miette::miette!("{}", e))?;
    checks::run(&plans, &mut app).await?;
    let app = Arc::new(app);
    let (scheduler, _metrics) = daemon::build_scheduler(Arc::clone(&app), plans).await?;

    let result = scheduler
        .trigger_on_demand(plan)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    let json = serde_json::to_string_pretty(&result).map_err(|e| miette::miette!("{}", e))?;
    println!("{json}");

    if !result.is_success() {
        return Err(miette::miette!("{}", result.log_line()));
    }
    Ok(())
}

async fn print_status(app: &AppConfig) -> Result<()> {
    let store = StatusStore::open(app.status_store_path())
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let rows = store.list().await;
    let json = serde_json::to_string_pretty(&rows).map_err(|e| miette::miette!("{}", e))?;
    println!("{json}");
    Ok(())
}

async fn run_restore(app: &AppConfig, plan: &str, archive: &std::path::Path) -> Result<()> {
    let plan = load_plan(&app.config_path, plan).map_err(|e| miette::miette!("{}", e))?;
    if !archive.is_file() {
        return Err(miette::miette!("archive not found: {}", archive.display()));
    }

    let summary = restore_archive(&MongoRestore, &plan, archive)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    tracing::info!(
        plan = %plan.name,
        archive = %archive.display(),
        restored = summary.restored,
        "restore finished"
    );
    println!(
        "{} document(s) restored into {}",
        summary.restored, plan.target.database
    );
    Ok(())
}

async fn run_check(mut app: AppConfig) -> Result<()> {
    let plans = load_plans(&app.config_path).map_err(|e| miette::miette!("{}", e))?;
    for plan in &plans {
        hoard_scheduler::parse_cron(&plan.name, &plan.scheduler.cron)
            .map_err(|e| miette::miette!("{}", e))?;
    }

    let report = checks::run(&plans, &mut app).await?;
    for (tool, version) in &report.versions {
        println!("{tool}: {version}");
    }
    for tool in &report.missing {
        println!("{tool}: not available");
    }
    println!("{} plan(s) OK", plans.len());
    Ok(())
}

//! kinload - genealogical interchange importer
//!
//! Each invocation does a bounded amount of work and exits; long imports
//! are continued with `resume` using the session id printed by `start`.
//!
//! ```text
//! kinload start family.ged --collection smith --policy merge
//! kinload resume <SESSION_ID> family.ged
//! kinload run family.ged --collection smith
//! kinload status [SESSION_ID]
//! kinload abort <SESSION_ID> family.ged
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use kinload_common::config::{resolve_config_path, resolve_database_path, TomlConfig};
use kinload_import::db::{init_database_pool, SessionRepository};
use kinload_import::utils::RetryPolicy;
use kinload_import::{
    BatchLimits, ConflictPolicy, ImportOptions, ImportOrchestrator, ImportResult, ImportState,
    PrivacyOverrides, SqliteStore, StepOutcome,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

type Orchestrator = ImportOrchestrator<SqliteStore, SessionRepository>;

/// Command-line arguments for kinload
#[derive(Parser, Debug)]
#[command(name = "kinload")]
#[command(about = "Resumable importer for genealogical interchange files")]
#[command(version)]
struct Cli {
    /// Destination SQLite database
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a session and run its first batch
    Start {
        #[command(flatten)]
        import: NewImport,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Run the next batch of a suspended session
    Resume {
        session_id: Uuid,
        /// The file the session was started with
        file: PathBuf,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Import a file in one go
    Run {
        #[command(flatten)]
        import: NewImport,
    },
    /// Show one session, or every unfinished session
    Status { session_id: Option<Uuid> },
    /// Cancel a session and discard its checkpoint
    Abort {
        session_id: Uuid,
        /// The file the session was started with
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct NewImport {
    /// Interchange file to import
    file: PathBuf,

    /// Destination collection
    #[arg(short, long)]
    collection: String,

    /// Conflict policy: add, replace or merge
    #[arg(long, default_value = "add")]
    policy: ConflictPolicy,

    /// Skip media-object records and pointers
    #[arg(long)]
    no_media: bool,

    /// Cross-reference to always mark private (repeatable)
    #[arg(long = "private", value_name = "XREF")]
    private_xrefs: Vec<String>,

    /// Cross-reference never marked private (repeatable)
    #[arg(long = "public", value_name = "XREF")]
    public_xrefs: Vec<String>,

    /// Mark individuals who may still be alive as private
    #[arg(long)]
    presume_living: bool,

    /// Birth window, in years, for the presumed-living rule
    #[arg(long, default_value_t = 100)]
    living_years: u32,
}

impl NewImport {
    fn options(&self) -> ImportOptions {
        ImportOptions {
            conflict_policy: self.policy,
            include_media: !self.no_media,
            privacy_overrides: PrivacyOverrides {
                private_xrefs: self.private_xrefs.iter().cloned().collect(),
                public_xrefs: self.public_xrefs.iter().cloned().collect(),
                presume_living_private: self.presume_living,
                living_threshold_years: self.living_years,
            },
        }
    }
}

#[derive(Args, Debug)]
struct LimitArgs {
    /// Records handled before suspending (default from config)
    #[arg(long)]
    max_records: Option<usize>,

    /// Wall-clock budget in milliseconds (default from config)
    #[arg(long)]
    time_budget_ms: Option<u64>,
}

impl LimitArgs {
    fn resolve(&self, config: &TomlConfig) -> BatchLimits {
        BatchLimits::new(
            self.max_records.unwrap_or(config.import.batch_records),
            Duration::from_millis(self.time_budget_ms.unwrap_or(config.import.time_budget_ms)),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = TomlConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let db_path = resolve_database_path(cli.database.as_deref(), &config);
    info!("Database: {}", db_path.display());
    let pool = init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let retry = RetryPolicy {
        max_attempts: config.import.write_retry_attempts,
        initial_backoff_ms: config.import.retry_backoff_ms,
    };
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let sessions = Arc::new(SessionRepository::new(pool).with_retry_policy(retry));

    match cli.command {
        Command::Start { import, limits } => {
            let source = read_source(&import.file)?;
            let mut orchestrator =
                Orchestrator::start(source, &import.collection, import.options(), store, sessions)
                    .await
                    .context("Failed to create import session")?
                    .with_retry_policy(retry);
            let outcome = orchestrator.run_batch(limits.resolve(&config)).await?;
            report_outcome(&orchestrator, outcome)
        }
        Command::Resume {
            session_id,
            file,
            limits,
        } => {
            let mut orchestrator = open_session(session_id, &file, store, sessions)
                .await?
                .with_retry_policy(retry);
            let outcome = orchestrator.run_batch(limits.resolve(&config)).await?;
            report_outcome(&orchestrator, outcome)
        }
        Command::Run { import } => {
            let source = read_source(&import.file)?;
            let mut orchestrator =
                Orchestrator::start(source, &import.collection, import.options(), store, sessions)
                    .await
                    .context("Failed to create import session")?
                    .with_retry_policy(retry);
            let limits = BatchLimits::new(
                config.import.batch_records,
                Duration::from_millis(config.import.time_budget_ms),
            );
            let result = orchestrator.run_to_completion(limits).await?;
            report_result(&result)
        }
        Command::Status { session_id } => match session_id {
            Some(session_id) => {
                let checkpoint = sessions
                    .load(session_id)
                    .await?
                    .with_context(|| format!("No session {}", session_id))?;
                let payload = checkpoint.decode()?;
                let session = payload.session;
                print_json(&serde_json::json!({
                    "session_id": session.session_id,
                    "collection": session.collection,
                    "state": session.state,
                    "byte_offset": session.byte_offset,
                    "line_number": session.line_number,
                    "batches": session.batches,
                    "statistics": session.statistics,
                    "errors": session.errors.len(),
                    "pending_references": payload.resolver.pending_count(),
                }))
            }
            None => print_json(&sessions.list_active().await?),
        },
        Command::Abort { session_id, file } => {
            let mut orchestrator = open_session(session_id, &file, store, sessions).await?;
            let result = orchestrator.abort().await?;
            report_result(&result)
        }
    }
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn open_session(
    session_id: Uuid,
    file: &Path,
    store: Arc<SqliteStore>,
    sessions: Arc<SessionRepository>,
) -> Result<Orchestrator> {
    let checkpoint = sessions
        .load(session_id)
        .await?
        .with_context(|| format!("No session {}", session_id))?;
    let source = read_source(file)?;
    let orchestrator = Orchestrator::resume(&checkpoint, source, store, sessions)
        .with_context(|| format!("Failed to resume session {}", session_id))?;
    Ok(orchestrator)
}

fn report_outcome(orchestrator: &Orchestrator, outcome: StepOutcome) -> Result<()> {
    match outcome {
        StepOutcome::Suspended(checkpoint) => {
            let session = orchestrator.session();
            print_json(&serde_json::json!({
                "session_id": checkpoint.session_id,
                "state": checkpoint.state,
                "suspended": true,
                "byte_offset": session.byte_offset,
                "statistics": session.statistics,
                "errors": session.errors.len(),
            }))
        }
        StepOutcome::Finished(result) => report_result(&result),
    }
}

fn report_result(result: &ImportResult) -> Result<()> {
    print_json(result)?;
    if result.state == ImportState::Failed {
        bail!("Import session {} failed", result.session_id);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", text);
    Ok(())
}

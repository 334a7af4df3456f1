//! Admin CLI for the back-office engine
//!
//! Runs migrations, scans for duplicates, and drives bulk operations against
//! the configured Postgres database.

use anyhow::{Context, Result};
use backoffice_core::common::{BusinessId, OperationId};
use backoffice_core::config::BackofficeConfig;
use backoffice_core::domains::bulk_ops::activities::{
    get_operation, restore_snapshot, run_operation, transition_operation,
};
use backoffice_core::domains::bulk_ops::machines::OperationAction;
use backoffice_core::domains::dedup::activities::find_duplicates;
use backoffice_core::domains::dedup::models::MatchMode;
use backoffice_core::kernel::BackofficeDeps;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "backoffice_cli")]
#[command(about = "Back-office admin CLI: dedup scans and bulk operations")]
struct Cli {
    /// Actor identifier recorded in the audit trail
    #[arg(long, default_value = "cli@backoffice")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMatchMode {
    Strict,
    Loose,
}

impl From<CliMatchMode> for MatchMode {
    fn from(mode: CliMatchMode) -> Self {
        match mode {
            CliMatchMode::Strict => MatchMode::Strict,
            CliMatchMode::Loose => MatchMode::Loose,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliAction {
    Ready,
    Start,
    Pause,
    Resume,
    Cancel,
}

impl From<CliAction> for OperationAction {
    fn from(action: CliAction) -> Self {
        match action {
            CliAction::Ready => OperationAction::Ready,
            CliAction::Start => OperationAction::Start,
            CliAction::Pause => OperationAction::Pause,
            CliAction::Resume => OperationAction::Resume,
            CliAction::Cancel => OperationAction::Cancel,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Scan one business for duplicate candidates
    ScanDuplicates {
        /// Target business id
        target: Uuid,
        #[arg(long, value_enum, default_value = "strict")]
        mode: CliMatchMode,
        /// Include records already resolved as duplicates
        #[arg(long)]
        include_resolved: bool,
    },

    /// Transition a bulk operation (start also drives it to completion)
    Operation {
        id: Uuid,
        #[arg(long, value_enum)]
        action: CliAction,
    },

    /// Show a bulk operation's status, counters, and audit-log tail
    Show { id: Uuid },

    /// Restore a finished operation's snapshot
    Restore { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = BackofficeConfig::from_env()?;
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    match cli.command {
        Commands::Migrate => {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("migration failed")?;
            println!("migrations applied");
        }

        Commands::ScanDuplicates {
            target,
            mode,
            include_resolved,
        } => {
            let deps = BackofficeDeps::postgres(pool, &config);
            let candidates = find_duplicates(
                &deps,
                BusinessId::from_uuid(target),
                mode.into(),
                include_resolved,
            )
            .await?;
            if candidates.is_empty() {
                println!("no duplicate candidates found");
            }
            for candidate in candidates {
                println!(
                    "{}  score={:<3}  {:?}  fields={:?}",
                    candidate.candidate_id,
                    candidate.confidence_score,
                    candidate.recommendation,
                    candidate.matched_fields
                );
            }
        }

        Commands::Operation { id, action } => {
            let deps = BackofficeDeps::postgres(pool, &config);
            let id = OperationId::from_uuid(id);
            let action: OperationAction = action.into();
            let operation = transition_operation(&deps, &cli.actor, id, action).await?;
            println!("operation {} is now {}", operation.id, operation.status.as_str());

            if action == OperationAction::Start || action == OperationAction::Resume {
                let done = run_operation(&deps, &cli.actor, id).await?;
                println!(
                    "finished in state {}: processed={} success={} failed={} skipped={}",
                    done.status.as_str(),
                    done.counters.processed,
                    done.counters.success,
                    done.counters.failed,
                    done.counters.skipped
                );
            }
        }

        Commands::Show { id } => {
            let deps = BackofficeDeps::postgres(pool, &config);
            let operation = get_operation(&deps, OperationId::from_uuid(id)).await?;
            println!("{}  [{}]  {}", operation.id, operation.status.as_str(), operation.name);
            println!(
                "targets={} processed={} success={} failed={} skipped={}",
                operation.counters.target,
                operation.counters.processed,
                operation.counters.success,
                operation.counters.failed,
                operation.counters.skipped
            );
            for event in operation.audit_tail(10) {
                println!(
                    "  {}  {}  {}  {}",
                    event.at.format("%Y-%m-%d %H:%M:%S"),
                    event.actor,
                    event.action,
                    event.detail.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Restore { id } => {
            let deps = BackofficeDeps::postgres(pool, &config);
            let report = restore_snapshot(&deps, &cli.actor, OperationId::from_uuid(id)).await?;
            println!(
                "restored={} failed={} from snapshot {}",
                report.restored, report.failed, report.snapshot_id
            );
        }
    }

    Ok(())
}

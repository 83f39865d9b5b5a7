use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ledger_tenancy::budget_email::{backfill_budget_email, BackfillStatus};
use ledger_tenancy::config;
use ledger_tenancy::default_items::{run_seed, SeedOptions};
use ledger_tenancy::id::UuidV7Ids;
use ledger_tenancy::migrate::{run_migration, MigrateOptions, MigrationMode, MigrationRun};

/// Exit code for a run that finished but dropped records, kept records
/// naming unknown users, or left references unmapped.
const WARNINGS_EXIT_CODE: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "ledger-tenancy",
    about = "Give every ledger user a private copy of the shared categories",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Clone templates per user and rewrite transactions and budgets.
    Migrate {
        /// Ledger document; defaults to LEDGER_TENANCY_DOCUMENT or the data dir.
        #[arg(long, value_name = "PATH")]
        document: Option<PathBuf>,
        /// Compute and print the summary without touching the document.
        #[arg(long)]
        dry_run: bool,
        /// Do not keep a copy of the original document.
        #[arg(long)]
        no_archive: bool,
        /// Write a JSON report with the dropped records into this directory.
        #[arg(long, value_name = "DIR")]
        report_dir: Option<PathBuf>,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Add and fill the owner email column of the SQLite budgets table.
    BackfillBudgetEmail {
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Add the standard items under each user's matching categories.
    SeedDefaultItems {
        #[arg(long, value_name = "PATH")]
        document: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    ledger_tenancy::logging::init();

    let cli = Cli::parse();
    match handle_cli(cli.command) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn mode(dry_run: bool) -> MigrationMode {
    if dry_run {
        MigrationMode::DryRun
    } else {
        MigrationMode::Apply
    }
}

fn handle_cli(command: Commands) -> Result<i32> {
    match command {
        Commands::Migrate {
            document,
            dry_run,
            no_archive,
            report_dir,
            json,
        } => {
            let options = MigrateOptions {
                document_path: config::document_path(document),
                mode: mode(dry_run),
                archive: !no_archive,
                report_dir,
            };
            let run = run_migration(&options, &mut UuidV7Ids)
                .with_context(|| format!("migrate {}", options.document_path.display()))?;
            if json {
                let payload = serde_json::to_string_pretty(&run.summary)
                    .context("serialize migration summary")?;
                println!("{payload}");
            } else {
                print_migration(&run);
            }
            Ok(if run.summary.has_warnings() {
                WARNINGS_EXIT_CODE
            } else {
                0
            })
        }
        Commands::BackfillBudgetEmail { db, json } => {
            let db_path = config::db_path(db);
            let report = backfill_budget_email(&db_path)
                .with_context(|| format!("backfill budget email in {}", db_path.display()))?;
            if json {
                let payload = serde_json::to_string_pretty(&report)
                    .context("serialize backfill report")?;
                println!("{payload}");
            } else {
                match report.status {
                    BackfillStatus::AlreadyPresent => {
                        println!("budgets.email already present; nothing to do.")
                    }
                    BackfillStatus::Added => println!(
                        "Added budgets.email: {} rows filled, {} without a matching user.",
                        report.rows_backfilled, report.rows_without_user
                    ),
                }
            }
            Ok(0)
        }
        Commands::SeedDefaultItems {
            document,
            dry_run,
            json,
        } => {
            let options = SeedOptions {
                document_path: config::document_path(document),
                mode: mode(dry_run),
            };
            let summary = run_seed(&options, &mut UuidV7Ids)
                .with_context(|| format!("seed default items in {}", options.document_path.display()))?;
            if json {
                let payload =
                    serde_json::to_string_pretty(&summary).context("serialize seed summary")?;
                println!("{payload}");
            } else {
                let verb = if dry_run { "Would add" } else { "Added" };
                println!(
                    "{verb} {} items across {} categories for {} users ({} already present).",
                    summary.items_added,
                    summary.categories_matched,
                    summary.users_scanned,
                    summary.items_present
                );
            }
            Ok(0)
        }
    }
}

fn print_migration(run: &MigrationRun) {
    let s = &run.summary;
    let label = match s.mode {
        MigrationMode::DryRun => "dry run",
        MigrationMode::Apply => "applied",
    };
    println!("Tenant migration ({label})");
    println!("  users processed        {}", s.users);
    println!(
        "  categories             {} cloned, {} reused, {} carried",
        s.clone.categories_cloned, s.clone.categories_reused, s.carried_categories
    );
    println!(
        "  items                  {} cloned, {} reused, {} carried",
        s.clone.items_cloned, s.clone.items_reused, s.carried_items
    );
    println!(
        "  transactions           {} migrated, {} dropped, {} assigned to default user",
        s.transactions.migrated, s.transactions.dropped, s.transactions.assigned_to_default
    );
    println!(
        "  budgets                {} migrated, {} dropped, {} assigned to default user",
        s.budgets.migrated, s.budgets.dropped, s.budgets.assigned_to_default
    );
    println!("  kept without owner     {}", s.unowned_total());
    println!("  unmapped references    {}", s.unmapped_total());
    if s.clone.orphan_template_items > 0 {
        println!("  orphan template items  {}", s.clone.orphan_template_items);
    }
    if let Some(path) = &run.archive_path {
        println!("Original archived at {}", path.display());
    }
    if let Some(path) = &run.report_path {
        println!("Report written to {}", path.display());
    }
}

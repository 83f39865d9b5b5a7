//! Tenant isolation migration: one pass from a shared-template ledger to a
//! ledger where every category, item and dependent record has an owner.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::{extract_templates, LedgerCollections, LedgerDocument};
use crate::id::IdGenerator;
use crate::model::{Category, Item};
use crate::ownership::OwnershipResolver;
use crate::report::write_migration_report;
use crate::rewrite::{
    rewrite_budgets, rewrite_transactions, DependentStats, DroppedRecord, RewriteContext,
    UnmappedReference, UnownedRecord, WARNING_SAMPLE_LIMIT,
};
use crate::store::{self, RunLock};
use crate::tenant_clone::{clone_for_tenants, CloneStats};
use crate::{AppError, AppResult};

pub const UNTOUCHED_STATE_CHANGED_CODE: &str = "MIGRATE/UNTOUCHED_STATE_CHANGED";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    #[default]
    DryRun,
    Apply,
}

impl MigrationMode {
    pub const fn is_apply(self) -> bool {
        matches!(self, MigrationMode::Apply)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub mode: MigrationMode,
    pub users: u64,
    pub default_user: Option<String>,
    pub template_categories: u64,
    pub template_items: u64,
    /// Tenant-owned categories and items kept as they were.
    pub carried_categories: u64,
    pub carried_items: u64,
    pub clone: CloneStats,
    pub transactions: DependentStats,
    pub budgets: DependentStats,
    pub untouched_digest: String,
    pub dropped: Vec<DroppedRecord>,
    /// Sample of records naming an unknown user, kept unchanged.
    pub unowned_records: Vec<UnownedRecord>,
    pub unmapped_references: Vec<UnmappedReference>,
}

impl MigrationSummary {
    pub fn dropped_records(&self) -> u64 {
        self.transactions.dropped + self.budgets.dropped
    }

    pub fn unowned_total(&self) -> u64 {
        self.transactions.kept_unowned + self.budgets.kept_unowned
    }

    pub fn unmapped_total(&self) -> u64 {
        self.transactions.references_unmapped + self.budgets.references_unmapped
    }

    /// Dropped, unowned or unmapped records; the run still completed.
    pub fn has_warnings(&self) -> bool {
        self.dropped_records() > 0 || self.unowned_total() > 0 || self.unmapped_total() > 0
    }
}

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub document: LedgerDocument,
    pub summary: MigrationSummary,
}

/// Runs the full transform in memory. The input is never modified.
pub fn migrate_document<G: IdGenerator>(
    document: &LedgerDocument,
    ids: &mut G,
) -> AppResult<MigrationOutcome> {
    let digest = document.untouched_digest()?;
    let snapshot = document.snapshot()?;
    let (templates, owned) = extract_templates(&snapshot);

    let cloned = clone_for_tenants(&snapshot.users, &templates, &owned, ids)?;

    let categories: Vec<Category> = owned
        .categories
        .iter()
        .map(|c| (*c).clone())
        .chain(cloned.categories.iter().cloned())
        .collect();
    let items: Vec<Item> = owned
        .items
        .iter()
        .map(|i| (*i).clone())
        .chain(cloned.items.iter().cloned())
        .collect();

    let ctx = RewriteContext::new(&cloned.translator, &categories, &items);
    let resolver = OwnershipResolver::new(&snapshot.users);
    let transactions = rewrite_transactions(&snapshot.transactions, &resolver, &ctx)?;
    let budgets = rewrite_budgets(&snapshot.budgets, &resolver, &ctx)?;

    let mut dropped = transactions.dropped;
    dropped.extend(budgets.dropped);
    let mut unowned_records = transactions.unowned;
    unowned_records.extend(budgets.unowned);
    unowned_records.truncate(WARNING_SAMPLE_LIMIT);
    let mut unmapped_references = transactions.unmapped;
    unmapped_references.extend(budgets.unmapped);
    unmapped_references.truncate(WARNING_SAMPLE_LIMIT);

    let summary = MigrationSummary {
        mode: MigrationMode::DryRun,
        users: snapshot.users.len() as u64,
        default_user: resolver.default_user().map(|u| u.email.clone()),
        template_categories: templates.categories.len() as u64,
        template_items: templates.items.len() as u64,
        carried_categories: owned.categories.len() as u64,
        carried_items: owned.items.len() as u64,
        clone: cloned.stats,
        transactions: transactions.stats,
        budgets: budgets.stats,
        untouched_digest: digest.clone(),
        dropped,
        unowned_records,
        unmapped_references,
    };

    let output = document.with_collections(&LedgerCollections {
        categories,
        items,
        transactions: transactions.records,
        budgets: budgets.records,
    })?;

    let after = output.untouched_digest()?;
    if after != digest {
        return Err(AppError::new(
            UNTOUCHED_STATE_CHANGED_CODE,
            "Top-level state outside the migrated collections changed",
        )
        .with_context("before", digest)
        .with_context("after", after));
    }

    Ok(MigrationOutcome {
        document: output,
        summary,
    })
}

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub document_path: PathBuf,
    pub mode: MigrationMode,
    /// Keep a copy of the original next to the document before replacing it.
    pub archive: bool,
    pub report_dir: Option<PathBuf>,
}

impl MigrateOptions {
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        Self {
            document_path: document_path.into(),
            mode: MigrationMode::Apply,
            archive: true,
            report_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationRun {
    pub summary: MigrationSummary,
    pub archive_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

/// Locks, reads, migrates and (in apply mode) replaces the document on disk.
pub fn run_migration<G: IdGenerator>(options: &MigrateOptions, ids: &mut G) -> AppResult<MigrationRun> {
    let path = options.document_path.as_path();
    let _lock = RunLock::acquire(path)?;

    info!(
        target: "ledger_tenancy",
        event = "migration_started",
        path = %path.display(),
        mode = ?options.mode
    );

    let document = store::read_document(path)?;
    let MigrationOutcome {
        document: migrated,
        mut summary,
    } = migrate_document(&document, ids)?;
    summary.mode = options.mode;

    let archive_path = if options.mode.is_apply() {
        persist(path, &migrated, options.archive)?
    } else {
        None
    };

    let report_path = match options.report_dir.as_deref() {
        Some(dir) => Some(write_migration_report(dir, path, &summary)?),
        None => None,
    };

    if summary.has_warnings() {
        warn!(
            target: "ledger_tenancy",
            event = "migration_completed_with_warnings",
            dropped = summary.dropped_records(),
            unowned = summary.unowned_total(),
            unmapped = summary.unmapped_total()
        );
    }
    info!(
        target: "ledger_tenancy",
        event = "migration_completed",
        mode = ?summary.mode,
        users = summary.users,
        categories_cloned = summary.clone.categories_cloned,
        items_cloned = summary.clone.items_cloned,
        transactions_migrated = summary.transactions.migrated,
        budgets_migrated = summary.budgets.migrated
    );

    Ok(MigrationRun {
        summary,
        archive_path,
        report_path,
    })
}

fn persist(path: &Path, document: &LedgerDocument, archive: bool) -> AppResult<Option<PathBuf>> {
    let archive_path = if archive {
        Some(store::archive_original(path)?)
    } else {
        None
    };
    store::write_document(path, document)?;
    Ok(archive_path)
}

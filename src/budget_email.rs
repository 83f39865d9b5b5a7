//! Adds the owner email column to the `budgets` table of the legacy SQLite
//! store and fills it from `users`.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::{info, warn};

use crate::{AppError, AppResult};

pub const DB_NOT_FOUND_CODE: &str = "BACKFILL/DB_NOT_FOUND";
pub const NO_BUDGETS_TABLE_CODE: &str = "BACKFILL/NO_BUDGETS_TABLE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    /// The column was added and filled during this run.
    Added,
    /// The column already existed; nothing was changed.
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub db_path: PathBuf,
    pub status: BackfillStatus,
    pub rows_backfilled: u64,
    /// Budgets whose `user_id` matched no user; their email stays NULL.
    pub rows_without_user: u64,
}

fn db_err<'a>(
    operation: &'static str,
    path: &'a Path,
) -> impl Fn(rusqlite::Error) -> AppError + 'a {
    move |err| {
        AppError::from(err)
            .with_context("operation", operation)
            .with_context("path", path.display().to_string())
    }
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

pub fn backfill_budget_email(db_path: &Path) -> AppResult<BackfillReport> {
    if !db_path.is_file() {
        return Err(AppError::new(DB_NOT_FOUND_CODE, "SQLite database does not exist")
            .with_context("path", db_path.display().to_string()));
    }

    let mut conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
    )
    .map_err(db_err("open_db", db_path))?;

    let columns = table_columns(&conn, "budgets").map_err(db_err("table_info", db_path))?;
    if columns.is_empty() {
        return Err(AppError::new(NO_BUDGETS_TABLE_CODE, "Database has no budgets table")
            .with_context("path", db_path.display().to_string()));
    }
    if columns.iter().any(|name| name.eq_ignore_ascii_case("email")) {
        info!(
            target: "ledger_tenancy",
            event = "budget_email_already_present",
            path = %db_path.display()
        );
        return Ok(BackfillReport {
            db_path: db_path.to_path_buf(),
            status: BackfillStatus::AlreadyPresent,
            rows_backfilled: 0,
            rows_without_user: 0,
        });
    }

    let tx = conn.transaction().map_err(db_err("begin_backfill_tx", db_path))?;
    tx.execute("ALTER TABLE budgets ADD COLUMN email VARCHAR(255)", [])
        .map_err(db_err("add_email_column", db_path))?;
    tx.execute(
        "UPDATE budgets SET email = (SELECT email FROM users WHERE users.id = budgets.user_id)",
        [],
    )
    .map_err(db_err("backfill_email", db_path))?;
    let (filled, missing): (i64, i64) = tx
        .query_row(
            "SELECT COUNT(email), COUNT(*) - COUNT(email) FROM budgets",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(db_err("count_backfilled", db_path))?;
    tx.commit().map_err(db_err("commit_backfill_tx", db_path))?;

    let report = BackfillReport {
        db_path: db_path.to_path_buf(),
        status: BackfillStatus::Added,
        rows_backfilled: filled.max(0) as u64,
        rows_without_user: missing.max(0) as u64,
    };
    if report.rows_without_user > 0 {
        warn!(
            target: "ledger_tenancy",
            event = "budget_email_unmatched",
            rows = report.rows_without_user
        );
    }
    info!(
        target: "ledger_tenancy",
        event = "budget_email_backfilled",
        path = %db_path.display(),
        rows = report.rows_backfilled
    );
    Ok(report)
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::migrate::MigrationSummary;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MigrationReportFile<'a> {
    generated_at: String,
    document_path: String,
    summary: &'a MigrationSummary,
}

pub fn write_migration_report(
    reports_dir: &Path,
    document_path: &Path,
    summary: &MigrationSummary,
) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("create reports directory {}", reports_dir.display()))?;

    let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let mut path = reports_dir.join(format!("migration-{stamp}.json"));
    let mut counter = 1;
    while path.exists() {
        path = reports_dir.join(format!("migration-{stamp}-{counter}.json"));
        counter += 1;
    }

    let payload = MigrationReportFile {
        generated_at: Utc::now().to_rfc3339(),
        document_path: document_path.display().to_string(),
        summary,
    };
    let json = serde_json::to_string_pretty(&payload).context("serialize migration report")?;
    fs::write(&path, json).with_context(|| format!("write migration report {}", path.display()))?;
    Ok(path)
}

use std::fs;
use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use rusqlite::Connection;
use serde_json::{json, Value};
use tempfile::tempdir;

fn ledger_tenancy() -> Result<Command> {
    let mut cmd = Command::cargo_bin("ledger-tenancy")?;
    cmd.env("LEDGER_TENANCY_LOG", "off")
        .env_remove("LEDGER_TENANCY_DOCUMENT")
        .env_remove("LEDGER_TENANCY_DB");
    Ok(cmd)
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

fn clean_ledger() -> Value {
    json!({
        "users": [{"id": 1, "email": "a@example.com"}],
        "categories": [{"id": 1, "name": "Salary"}],
        "transactions": [{"id": 1, "category_id": 1}]
    })
}

#[test]
fn migrate_json_summary_exits_zero() -> Result<()> {
    let tmp = tempdir()?;
    let doc = tmp.path().join("db.json");
    write_json(&doc, &clean_ledger())?;

    let output = ledger_tenancy()?
        .args(["migrate", "--json", "--document"])
        .arg(&doc)
        .output()?;
    assert_eq!(
        output.status.code(),
        Some(0),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let summary: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["mode"], "apply");
    assert_eq!(summary["clone"]["categoriesCloned"], 1);
    assert_eq!(summary["transactions"]["assignedToDefault"], 1);
    Ok(())
}

#[test]
fn warnings_exit_with_two() -> Result<()> {
    let tmp = tempdir()?;
    let doc = tmp.path().join("db.json");
    write_json(
        &doc,
        &json!({
            "users": [{"id": 1, "email": "a@example.com"}],
            "transactions": [{"id": 1, "userId": 42, "category_id": 1}]
        }),
    )?;

    let output = ledger_tenancy()?
        .args(["migrate", "--dry-run", "--document"])
        .arg(&doc)
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dry run"), "{stdout}");
    assert!(stdout.contains("0 migrated, 0 dropped"), "{stdout}");
    assert!(stdout.contains("kept without owner     1"), "{stdout}");
    Ok(())
}

#[test]
fn document_path_from_environment() -> Result<()> {
    let tmp = tempdir()?;
    let doc = tmp.path().join("ledger.json");
    write_json(&doc, &clean_ledger())?;
    let before = fs::read(&doc)?;

    ledger_tenancy()?
        .env("LEDGER_TENANCY_DOCUMENT", &doc)
        .args(["migrate", "--dry-run"])
        .assert()
        .success();
    assert_eq!(fs::read(&doc)?, before);
    Ok(())
}

#[test]
fn missing_document_exits_one_with_code() -> Result<()> {
    let tmp = tempdir()?;
    let output = ledger_tenancy()?
        .args(["migrate", "--document"])
        .arg(tmp.path().join("absent.json"))
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "{stderr}");
    assert!(stderr.contains("STORE/NOT_FOUND"), "{stderr}");
    Ok(())
}

#[test]
fn malformed_document_exits_one_and_is_kept() -> Result<()> {
    let tmp = tempdir()?;
    let doc = tmp.path().join("db.json");
    write_json(&doc, &json!({"users": [{"id": 1}]}))?;
    let before = fs::read(&doc)?;

    let output = ledger_tenancy()?
        .args(["migrate", "--document"])
        .arg(&doc)
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("DOCUMENT/INVALID"));
    assert_eq!(fs::read(&doc)?, before);
    Ok(())
}

#[test]
fn backfill_budget_email_command() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("expense_tracker.db");
    Connection::open(&db)?.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);
         CREATE TABLE budgets (id INTEGER PRIMARY KEY, user_id INTEGER);
         INSERT INTO users VALUES (1, 'a@example.com');
         INSERT INTO budgets VALUES (1, 1);",
    )?;

    let output = ledger_tenancy()?
        .args(["backfill-budget-email", "--json", "--db"])
        .arg(&db)
        .output()?;
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["status"], "added");
    assert_eq!(report["rowsBackfilled"], 1);

    let again = ledger_tenancy()?
        .args(["backfill-budget-email", "--db"])
        .arg(&db)
        .output()?;
    assert!(String::from_utf8_lossy(&again.stdout).contains("already present"));
    Ok(())
}

#[test]
fn backfill_missing_database_is_not_created() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("missing.db");
    let output = ledger_tenancy()?
        .args(["backfill-budget-email", "--db"])
        .arg(&db)
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("BACKFILL/DB_NOT_FOUND"));
    assert!(!db.exists());
    Ok(())
}

#[test]
fn seed_default_items_command() -> Result<()> {
    let tmp = tempdir()?;
    let doc = tmp.path().join("db.json");
    write_json(
        &doc,
        &json!({
            "users": [{"id": 1, "email": "a@example.com"}],
            "categories": [{"id": 9, "name": "Salary", "email": "a@example.com"}],
            "items": []
        }),
    )?;

    let output = ledger_tenancy()?
        .args(["seed-default-items", "--json", "--document"])
        .arg(&doc)
        .output()?;
    assert!(output.status.success());
    let summary: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["itemsAdded"], 3);

    let ledger: Value = serde_json::from_slice(&fs::read(&doc)?)?;
    let names: Vec<&str> = ledger["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Monthly Salary", "Bonus", "Incentives"]);
    Ok(())
}

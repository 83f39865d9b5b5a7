//! Tenant isolation for the personal-finance JSON ledger.
//!
//! A ledger starts with one shared set of categories and items used by
//! every user. [`migrate::migrate_document`] gives each user a private copy
//! of that hierarchy, points every transaction and budget at its owner's
//! copies and stamps the owner's email on every record. The two legacy
//! companion steps live in [`budget_email`] (SQLite) and [`default_items`].

pub mod budget_email;
pub mod config;
pub mod default_items;
pub mod document;
pub mod error;
pub mod id;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod ownership;
pub mod report;
pub mod rewrite;
pub mod store;
pub mod tenant_clone;
pub mod translator;

pub use error::{AppError, AppResult};

//! Seeds the standard item list under each user's matching categories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Map;
use tracing::info;

use crate::document::{LedgerDocument, CATEGORIES, ITEMS};
use crate::id::IdGenerator;
use crate::migrate::MigrationMode;
use crate::model::{Category, EntityId, Item};
use crate::store::{self, RunLock};
use crate::AppResult;

/// Category name to the item names every user should have beneath it.
pub const DEFAULT_ITEMS: &[(&str, &[&str])] = &[
    ("Salary", &["Monthly Salary", "Bonus", "Incentives"]),
    ("Business", &["Business Profit", "Side Business"]),
    ("Freelance", &["Client Work", "Contract Work"]),
    ("Interest", &["Bank Interest", "FD Interest"]),
    ("Rental Income", &["House Rent", "Shop Rent"]),
    ("Other Income", &["Cashback", "Refunds"]),
    ("Food & Dining", &["Groceries", "Restaurants", "Snacks", "Food Delivery"]),
    (
        "Transport",
        &["Fuel", "Ride Hailing", "Public Transport", "Vehicle Maintenance"],
    ),
    ("Housing", &["Rent", "Maintenance", "Electricity", "Water"]),
    (
        "Bills & Utilities",
        &["Mobile Recharge", "Internet", "Gas", "DTH / Cable", "Subscriptions"],
    ),
    ("Shopping", &["Clothes", "Accessories", "Online Shopping"]),
    (
        "Health & Medical",
        &["Doctor Visits", "Medicines", "Insurance Premiums"],
    ),
    ("Education", &["School / College Fees", "Courses", "Books"]),
    ("Entertainment", &["Movies", "Games", "Events"]),
    (
        "Personal Care",
        &["Salon", "Grooming", "Cosmetics", "Fitness / Gym"],
    ),
    ("Travel", &["Trips", "Hotels", "Transport"]),
    ("Gifts & Donations", &["Gifts", "Charity"]),
    (
        "EMIs / Loans",
        &["Education Loan", "Personal Loan", "Credit Card EMI"],
    ),
    ("Others", &["Miscellaneous", "Uncategorized Expenses"]),
    ("Stocks", &["Equity", "IPO"]),
    ("Mutual Funds", &["SIP", "Lump Sum"]),
    ("Gold", &["Physical Gold", "Digital Gold"]),
    ("Crypto", &["Bitcoin", "Altcoins"]),
    ("Fixed Deposit", &["Bank FD", "Corporate FD"]),
    ("Real Estate", &["Land", "Property"]),
    ("Other Investments", &["Bonds", "PPF / NPS"]),
];

pub fn default_items_for(category: &str) -> Option<&'static [&'static str]> {
    DEFAULT_ITEMS
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, items)| *items)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub mode: MigrationMode,
    pub users_scanned: u64,
    pub categories_matched: u64,
    pub items_added: u64,
    pub items_present: u64,
}

/// Returns the document with missing default items appended to `items`.
pub fn seed_default_items<G: IdGenerator>(
    document: &LedgerDocument,
    ids: &mut G,
) -> AppResult<(LedgerDocument, SeedSummary)> {
    let emails = document.user_emails()?;
    let categories: Vec<Category> = document.decode(CATEGORIES)?;
    let mut items: Vec<Item> = document.decode(ITEMS)?;

    let mut existing: HashSet<(EntityId, String)> = items
        .iter()
        .filter_map(|item| {
            item.category_id
                .clone()
                .map(|category_id| (category_id, item.name.clone()))
        })
        .collect();

    let mut summary = SeedSummary::default();
    for email in &emails {
        summary.users_scanned += 1;
        for category in categories.iter().filter(|c| c.owner() == Some(email.as_str())) {
            let Some(defaults) = default_items_for(&category.name) else {
                continue;
            };
            summary.categories_matched += 1;
            for name in defaults {
                let key = (category.id.clone(), (*name).to_string());
                if existing.contains(&key) {
                    summary.items_present += 1;
                    continue;
                }
                items.push(Item {
                    id: ids.next_id(),
                    name: (*name).to_string(),
                    category_id: Some(category.id.clone()),
                    email: Some(email.clone()),
                    extra: Map::new(),
                });
                existing.insert(key);
                summary.items_added += 1;
            }
        }
    }

    let seeded = if summary.items_added > 0 {
        document.with_items(&items)?
    } else {
        document.clone()
    };
    Ok((seeded, summary))
}

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub document_path: PathBuf,
    pub mode: MigrationMode,
}

pub fn run_seed<G: IdGenerator>(options: &SeedOptions, ids: &mut G) -> AppResult<SeedSummary> {
    let path: &Path = &options.document_path;
    let _lock = RunLock::acquire(path)?;
    let document = store::read_document(path)?;
    let (seeded, mut summary) = seed_default_items(&document, ids)?;
    summary.mode = options.mode;

    if options.mode.is_apply() && summary.items_added > 0 {
        store::write_document(path, &seeded)?;
    }

    info!(
        target: "ledger_tenancy",
        event = "default_items_seeded",
        path = %path.display(),
        mode = ?summary.mode,
        users = summary.users_scanned,
        categories = summary.categories_matched,
        added = summary.items_added
    );
    Ok(summary)
}

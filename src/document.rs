use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::{Budget, Category, Item, Transaction, User};
use crate::{AppError, AppResult};

pub const USERS: &str = "users";
pub const CATEGORIES: &str = "categories";
pub const ITEMS: &str = "items";
pub const TRANSACTIONS: &str = "transactions";
pub const BUDGETS: &str = "budgets";

/// Top-level collections owned by the migration. Everything else in the
/// document is carried through untouched.
pub const MIGRATED_COLLECTIONS: [&str; 4] = [CATEGORIES, ITEMS, TRANSACTIONS, BUDGETS];

pub const DOCUMENT_INVALID_CODE: &str = "DOCUMENT/INVALID";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("ledger document must be a JSON object")]
    NotAnObject,
    #[error("collection `{0}` must be an array")]
    NotAnArray(&'static str),
    #[error("{collection}[{index}] could not be decoded: {source}")]
    Record {
        collection: &'static str,
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("user at index {index} has an empty email")]
    BlankUserEmail { index: usize },
    #[error("duplicate user {field} `{value}`")]
    DuplicateUser { field: &'static str, value: String },
}

impl From<DocumentError> for AppError {
    fn from(error: DocumentError) -> Self {
        let base = AppError::new(DOCUMENT_INVALID_CODE, error.to_string());
        match error {
            DocumentError::NotAnObject => base,
            DocumentError::NotAnArray(collection) => base.with_context("collection", collection),
            DocumentError::Record {
                collection,
                index,
                source,
            } => base
                .with_context("collection", collection)
                .with_context("index", index.to_string())
                .with_cause(source),
            DocumentError::BlankUserEmail { index } => base
                .with_context("collection", USERS)
                .with_context("index", index.to_string()),
            DocumentError::DuplicateUser { field, value } => base
                .with_context("collection", USERS)
                .with_context("field", field)
                .with_context("value", value),
        }
    }
}

/// The whole ledger as a JSON object with its key order preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerDocument {
    root: Map<String, Value>,
}

impl LedgerDocument {
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(DocumentError::NotAnObject),
        }
    }

    pub fn parse(bytes: &[u8]) -> AppResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from_value(value)?)
    }

    pub fn to_pretty_bytes(&self) -> AppResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.root)?)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    fn collection(&self, name: &'static str) -> Result<&[Value], DocumentError> {
        match self.root.get(name) {
            None | Some(Value::Null) => Ok(&[]),
            Some(Value::Array(values)) => Ok(values.as_slice()),
            Some(_) => Err(DocumentError::NotAnArray(name)),
        }
    }

    /// Decodes every entry of a collection. A missing collection is empty.
    pub fn decode<T: DeserializeOwned>(&self, name: &'static str) -> Result<Vec<T>, DocumentError> {
        self.collection(name)?
            .iter()
            .enumerate()
            .map(|(index, value)| {
                T::deserialize(value).map_err(|source| DocumentError::Record {
                    collection: name,
                    index,
                    source,
                })
            })
            .collect()
    }

    /// Emails of users that have one, in document order. Unlike
    /// [`LedgerDocument::snapshot`] this never rejects malformed users.
    pub fn user_emails(&self) -> Result<Vec<String>, DocumentError> {
        Ok(self
            .collection(USERS)?
            .iter()
            .filter_map(|user| user.get("email").and_then(Value::as_str))
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Reads the typed, immutable input of a migration run.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, DocumentError> {
        let users: Vec<User> = self.decode(USERS)?;
        let mut ids = HashSet::new();
        let mut emails = HashSet::new();
        for (index, user) in users.iter().enumerate() {
            if user.email.trim().is_empty() {
                return Err(DocumentError::BlankUserEmail { index });
            }
            if !ids.insert(&user.id) {
                return Err(DocumentError::DuplicateUser {
                    field: "id",
                    value: user.id.to_string(),
                });
            }
            if !emails.insert(user.email.as_str()) {
                return Err(DocumentError::DuplicateUser {
                    field: "email",
                    value: user.email.clone(),
                });
            }
        }

        Ok(LedgerSnapshot {
            users,
            categories: self.decode(CATEGORIES)?,
            items: self.decode(ITEMS)?,
            transactions: self.decode(TRANSACTIONS)?,
            budgets: self.decode(BUDGETS)?,
        })
    }

    /// Returns a new document where the migrated collections are replaced
    /// and every other key keeps its value and position.
    pub fn with_collections(&self, collections: &LedgerCollections) -> AppResult<Self> {
        let mut root = self.root.clone();
        root.insert(CATEGORIES.to_string(), to_array(&collections.categories)?);
        root.insert(ITEMS.to_string(), to_array(&collections.items)?);
        root.insert(TRANSACTIONS.to_string(), to_array(&collections.transactions)?);
        root.insert(BUDGETS.to_string(), to_array(&collections.budgets)?);
        Ok(Self { root })
    }

    /// Replaces a single collection, used by the default item seeder.
    pub fn with_items(&self, items: &[Item]) -> AppResult<Self> {
        let mut root = self.root.clone();
        root.insert(ITEMS.to_string(), to_array(items)?);
        Ok(Self { root })
    }

    /// SHA-256 over every top-level key the migration must not touch,
    /// including `users`.
    pub fn untouched_digest(&self) -> AppResult<String> {
        let mut hasher = Sha256::new();
        for (key, value) in &self.root {
            if MIGRATED_COLLECTIONS.contains(&key.as_str()) {
                continue;
            }
            hasher.update(key.as_bytes());
            hasher.update([0]);
            hasher.update(serde_json::to_vec(value)?);
            hasher.update([0]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

fn to_array<T: Serialize>(records: &[T]) -> AppResult<Value> {
    let values = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(values))
}

/// Typed, read-only view of a loaded document.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub users: Vec<User>,
    pub categories: Vec<Category>,
    pub items: Vec<Item>,
    pub transactions: Vec<Transaction>,
    pub budgets: Vec<Budget>,
}

/// The four collections a migration produces.
#[derive(Debug, Clone, Default)]
pub struct LedgerCollections {
    pub categories: Vec<Category>,
    pub items: Vec<Item>,
    pub transactions: Vec<Transaction>,
    pub budgets: Vec<Budget>,
}

/// Pre-migration shared categories and items: the pattern cloned for every
/// user. Entities that already carry an owner are not templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet<'a> {
    pub categories: Vec<&'a Category>,
    pub items: Vec<&'a Item>,
}

/// Categories and items that already belong to a tenant, typically the
/// output of an earlier run. They are carried through unchanged.
#[derive(Debug, Clone, Default)]
pub struct TenantOwned<'a> {
    pub categories: Vec<&'a Category>,
    pub items: Vec<&'a Item>,
}

pub fn extract_templates(snapshot: &LedgerSnapshot) -> (TemplateSet<'_>, TenantOwned<'_>) {
    let mut templates = TemplateSet::default();
    let mut owned = TenantOwned::default();
    for category in &snapshot.categories {
        if category.is_template() {
            templates.categories.push(category);
        } else {
            owned.categories.push(category);
        }
    }
    for item in &snapshot.items {
        if item.is_template() {
            templates.items.push(item);
        } else {
            owned.items.push(item);
        }
    }
    (templates, owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> LedgerDocument {
        LedgerDocument::from_value(value).expect("object document")
    }

    #[test]
    fn missing_collections_read_as_empty() {
        let document = doc(json!({"users": [{"id": "u1", "email": "a@x.io"}]}));
        let snapshot = document.snapshot().unwrap();
        assert_eq!(snapshot.users.len(), 1);
        assert!(snapshot.categories.is_empty());
        assert!(snapshot.budgets.is_empty());
    }

    #[test]
    fn rejects_non_object_and_non_array() {
        assert!(matches!(
            LedgerDocument::from_value(json!([])),
            Err(DocumentError::NotAnObject)
        ));
        let err = doc(json!({"categories": {"id": "c1"}}))
            .snapshot()
            .expect_err("categories must be an array");
        assert!(matches!(err, DocumentError::NotAnArray(CATEGORIES)));
    }

    #[test]
    fn user_without_email_is_a_document_error() {
        let err = doc(json!({"users": [{"id": "u1"}]}))
            .snapshot()
            .expect_err("email required");
        let app: AppError = err.into();
        assert_eq!(app.code(), DOCUMENT_INVALID_CODE);
        assert_eq!(app.context().get("collection").map(String::as_str), Some(USERS));
        assert_eq!(app.context().get("index").map(String::as_str), Some("0"));
    }

    #[test]
    fn duplicate_user_email_is_rejected() {
        let err = doc(json!({"users": [
            {"id": "u1", "email": "a@x.io"},
            {"id": "u2", "email": "a@x.io"}
        ]}))
        .snapshot()
        .expect_err("duplicate email");
        assert!(matches!(err, DocumentError::DuplicateUser { field: "email", .. }));
    }

    #[test]
    fn extractor_splits_templates_from_owned() {
        let document = doc(json!({
            "categories": [
                {"id": "c1", "name": "Food"},
                {"id": "c2", "name": "Food", "email": "a@x.io"}
            ],
            "items": [
                {"id": "i1", "name": "Groceries", "categoryId": "c1"},
                {"id": "i2", "name": "Groceries", "categoryId": "c2", "email": "a@x.io"}
            ]
        }));
        let snapshot = document.snapshot().unwrap();
        let (templates, owned) = extract_templates(&snapshot);
        assert_eq!(templates.categories.len(), 1);
        assert_eq!(templates.items.len(), 1);
        assert_eq!(owned.categories[0].id.to_string(), "c2");
        assert_eq!(owned.items[0].id.to_string(), "i2");
    }

    #[test]
    fn with_collections_keeps_other_keys_in_place() {
        let document = doc(json!({
            "users": [{"id": "u1", "email": "a@x.io"}],
            "categories": [{"id": "c1", "name": "Food"}],
            "settings": {"currency": "INR"},
            "items": [],
            "investments": [{"id": 1}]
        }));
        let before = document.untouched_digest().unwrap();
        let updated = document
            .with_collections(&LedgerCollections::default())
            .unwrap();

        let keys: Vec<_> = updated.as_map().keys().cloned().collect();
        assert_eq!(
            keys,
            ["users", "categories", "settings", "items", "investments", "transactions", "budgets"]
        );
        assert_eq!(updated.get("categories"), Some(&json!([])));
        assert_eq!(updated.untouched_digest().unwrap(), before);
    }

    #[test]
    fn digest_changes_when_users_change() {
        let a = doc(json!({"users": [{"id": "u1", "email": "a@x.io"}]}));
        let b = doc(json!({"users": [{"id": "u1", "email": "b@x.io"}]}));
        assert_ne!(a.untouched_digest().unwrap(), b.untouched_digest().unwrap());
    }

    #[test]
    fn user_emails_skips_missing_and_blank() {
        let document = doc(json!({"users": [
            {"id": "u1", "email": "a@x.io"},
            {"id": "u2"},
            {"id": "u3", "email": " "}
        ]}));
        assert_eq!(document.user_emails().unwrap(), vec!["a@x.io".to_string()]);
    }
}

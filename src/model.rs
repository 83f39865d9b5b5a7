use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Opaque identifier as stored in the ledger document.
///
/// Older records carry numeric ids, newer ones UUID strings. The original
/// JSON form is kept so untouched references serialise exactly as read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(u64),
    Text(String),
}

impl EntityId {
    pub fn text(value: impl Into<String>) -> Self {
        EntityId::Text(value.into())
    }

    /// Empty strings are treated as a missing reference.
    pub fn is_blank(&self) -> bool {
        matches!(self, EntityId::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{n}"),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Text(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Text(value)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        EntityId::Number(value)
    }
}

/// Typed view over an entry of the `users` collection. The raw JSON is
/// never rewritten; this view only feeds ownership decisions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    /// Owning user's email. Absent on pre-migration template categories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Category {
    pub fn owner(&self) -> Option<&str> {
        owner_of(&self.email)
    }

    pub fn is_template(&self) -> bool {
        self.owner().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "categoryId", default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    pub fn owner(&self) -> Option<&str> {
        owner_of(&self.email)
    }

    pub fn is_template(&self) -> bool {
        self.owner().is_none()
    }
}

/// Field that keeps an explicit JSON `null` apart from a missing key:
/// `None` is missing, `Some(None)` is `null`. Both survive a round trip.
pub type Nullable<T> = Option<Option<T>>;

fn keep_null<'de, D, T>(deserializer: D) -> Result<Nullable<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn present<T>(field: &Nullable<T>) -> Option<&T> {
    field.as_ref().and_then(Option::as_ref)
}

/// A ledger transaction. Only ownership and the category/item references
/// are interpreted; every other field travels through `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(
        rename = "userId",
        default,
        deserialize_with = "keep_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Nullable<EntityId>,
    #[serde(default, deserialize_with = "keep_null", skip_serializing_if = "Option::is_none")]
    pub category_id: Nullable<EntityId>,
    #[serde(default, deserialize_with = "keep_null", skip_serializing_if = "Option::is_none")]
    pub item_id: Nullable<EntityId>,
    #[serde(default, deserialize_with = "keep_null", skip_serializing_if = "Option::is_none")]
    pub email: Nullable<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    /// The `userId` the record names, ignoring blank and null values.
    pub fn user_ref(&self) -> Option<&EntityId> {
        present(&self.user_id).filter(|id| !id.is_blank())
    }

    pub fn set_user(&mut self, id: EntityId) {
        self.user_id = Some(Some(id));
    }
}

/// A budget line. Pre-migration budgets carry no owner at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default, deserialize_with = "keep_null", skip_serializing_if = "Option::is_none")]
    pub category_id: Nullable<EntityId>,
    #[serde(default, deserialize_with = "keep_null", skip_serializing_if = "Option::is_none")]
    pub item_id: Nullable<EntityId>,
    #[serde(default, deserialize_with = "keep_null", skip_serializing_if = "Option::is_none")]
    pub email: Nullable<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Budget {
    pub fn owner_email(&self) -> Option<&str> {
        present(&self.email).map(|email| email.trim())
    }
}

/// Shared view of the fields the rewriter touches on dependent records.
pub trait Dependent {
    fn category_ref(&self) -> Option<&EntityId>;
    fn item_ref(&self) -> Option<&EntityId>;
    fn set_category_ref(&mut self, id: EntityId);
    fn set_item_ref(&mut self, id: EntityId);
    fn set_owner_email(&mut self, email: &str);
    /// Best-effort label used in logs and the dead-letter list.
    fn record_id(&self) -> Option<String>;
}

macro_rules! impl_dependent {
    ($ty:ty) => {
        impl Dependent for $ty {
            fn category_ref(&self) -> Option<&EntityId> {
                present(&self.category_id).filter(|id| !id.is_blank())
            }

            fn item_ref(&self) -> Option<&EntityId> {
                present(&self.item_id).filter(|id| !id.is_blank())
            }

            fn set_category_ref(&mut self, id: EntityId) {
                self.category_id = Some(Some(id));
            }

            fn set_item_ref(&mut self, id: EntityId) {
                self.item_id = Some(Some(id));
            }

            fn set_owner_email(&mut self, email: &str) {
                self.email = Some(Some(email.to_string()));
            }

            fn record_id(&self) -> Option<String> {
                self.extra.get("id").map(|value| match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            }
        }
    };
}

impl_dependent!(Transaction);
impl_dependent!(Budget);

fn owner_of(email: &Option<String>) -> Option<&str> {
    email.as_deref().map(str::trim).filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_id_keeps_numeric_form() {
        let id: EntityId = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(id, EntityId::Number(7));
        assert_eq!(serde_json::to_value(&id).unwrap(), json!(7));
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn category_round_trips_unknown_fields() {
        let raw = json!({
            "id": "c1",
            "name": "Food",
            "type": "expense",
            "icon": "🍽️",
            "color": "#F4A261"
        });
        let category: Category = serde_json::from_value(raw.clone()).unwrap();
        assert!(category.is_template());
        assert_eq!(category.extra.get("type"), Some(&json!("expense")));
        assert_eq!(serde_json::to_value(&category).unwrap(), raw);
    }

    #[test]
    fn blank_owner_counts_as_template() {
        let category: Category =
            serde_json::from_value(json!({"id": "c1", "name": "Food", "email": "  "})).unwrap();
        assert!(category.is_template());
    }

    #[test]
    fn transaction_keeps_opaque_fields_and_reads_record_id() {
        let raw = json!({
            "id": 3,
            "userId": "u1",
            "category_id": "c1",
            "amount": 120.5,
            "description": "weekly shop"
        });
        let txn: Transaction = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(txn.user_ref(), Some(&EntityId::text("u1")));
        assert_eq!(txn.record_id().as_deref(), Some("3"));
        assert_eq!(txn.item_ref(), None);
        assert_eq!(serde_json::to_value(&txn).unwrap(), raw);
    }

    #[test]
    fn blank_reference_is_ignored() {
        let budget: Budget =
            serde_json::from_value(json!({"id": "b1", "category_id": "c1", "item_id": ""}))
                .unwrap();
        assert_eq!(budget.category_ref(), Some(&EntityId::text("c1")));
        assert_eq!(budget.item_ref(), None);
    }

    #[test]
    fn explicit_null_references_survive_a_round_trip() {
        let raw = json!({
            "id": "t1",
            "userId": null,
            "category_id": null,
            "item_id": "i1",
            "email": null
        });
        let txn: Transaction = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(txn.category_id, Some(None));
        assert_eq!(txn.category_ref(), None);
        assert_eq!(txn.user_ref(), None);
        assert_eq!(serde_json::to_value(&txn).unwrap(), raw);

        let budget: Budget = serde_json::from_value(json!({"id": "b1"})).unwrap();
        assert_eq!(budget.category_id, None);
        assert_eq!(serde_json::to_value(&budget).unwrap(), json!({"id": "b1"}));
    }
}

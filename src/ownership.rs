//! Decides which user owns each dependent record.
//!
//! A transaction naming a user that is not in the document has no owner
//! to migrate it under. The caller keeps such records unchanged rather
//! than discarding financial history.
//!
//! Budgets have no owner field before the migration, so the true owner
//! cannot be recovered from the data. Every such budget is attributed to
//! the default user (the first user in document order). This can
//! mis-attribute another user's budget and is reported as a data-quality
//! warning on every run that applies it.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{Budget, EntityId, Transaction, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerSource {
    /// The record named its owner.
    Explicit,
    /// The record already carried a known owner email.
    ExistingEmail,
    /// No owner on the record; the default user was assigned.
    DefaultUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub owner: &'a User,
    pub source: OwnerSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unresolved {
    /// The document has no users to fall back to.
    NoUsers,
    /// The record names a user that does not exist. Such records are kept
    /// as they are, never dropped.
    UnknownOwner {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl Unresolved {
    pub fn reason(&self) -> &'static str {
        match self {
            Unresolved::NoUsers => "no_users",
            Unresolved::UnknownOwner { .. } => "unknown_owner",
        }
    }
}

pub struct OwnershipResolver<'a> {
    default_user: Option<&'a User>,
    by_id: HashMap<&'a EntityId, &'a User>,
    by_email: HashMap<&'a str, &'a User>,
}

impl<'a> OwnershipResolver<'a> {
    pub fn new(users: &'a [User]) -> Self {
        Self {
            default_user: users.first(),
            by_id: users.iter().map(|u| (&u.id, u)).collect(),
            by_email: users.iter().map(|u| (u.email.as_str(), u)).collect(),
        }
    }

    pub fn default_user(&self) -> Option<&'a User> {
        self.default_user
    }

    pub fn user_by_id(&self, id: &EntityId) -> Option<&'a User> {
        self.by_id.get(id).copied()
    }

    pub fn resolve_transaction(&self, txn: &Transaction) -> Result<Resolution<'a>, Unresolved> {
        match txn.user_ref() {
            Some(user_id) => self
                .user_by_id(user_id)
                .map(|owner| Resolution {
                    owner,
                    source: OwnerSource::Explicit,
                })
                .ok_or_else(|| Unresolved::UnknownOwner {
                    user_id: user_id.to_string(),
                }),
            None => self.fallback(),
        }
    }

    /// Budgets already stamped with a known owner keep it; every other
    /// budget goes to the default user.
    pub fn resolve_budget(&self, budget: &Budget) -> Result<Resolution<'a>, Unresolved> {
        let stamped = budget
            .owner_email()
            .and_then(|email| self.by_email.get(email).copied());
        match stamped {
            Some(owner) => Ok(Resolution {
                owner,
                source: OwnerSource::ExistingEmail,
            }),
            None => self.fallback(),
        }
    }

    fn fallback(&self) -> Result<Resolution<'a>, Unresolved> {
        self.default_user
            .map(|owner| Resolution {
                owner,
                source: OwnerSource::DefaultUser,
            })
            .ok_or(Unresolved::NoUsers)
    }
}

//! Per-user cloning of the template hierarchy.
//!
//! Every user receives a private copy of each template category and of the
//! template items beneath it. Each copy is recorded in the
//! [`IdTranslator`] so dependent records can be pointed at it later.
//!
//! A user who already owns a category with the template's name (for
//! example after an earlier run) keeps it: the template is mapped onto the
//! existing category instead of being cloned again, and the same holds
//! for same-named items beneath it.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::document::{TemplateSet, TenantOwned};
use crate::id::IdGenerator;
use crate::model::{Category, EntityId, Item, User};
use crate::translator::{EntityKind, IdTranslator};
use crate::AppResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneStats {
    pub categories_cloned: u64,
    pub items_cloned: u64,
    pub categories_reused: u64,
    pub items_reused: u64,
    /// Template items whose category is not a template; never cloned.
    pub orphan_template_items: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CloneOutcome {
    /// Newly created categories, grouped by user in user order.
    pub categories: Vec<Category>,
    /// Newly created items, grouped by user in user order.
    pub items: Vec<Item>,
    pub translator: IdTranslator,
    pub stats: CloneStats,
}

/// Existing tenant-owned entities indexed for name-based reuse.
struct ReuseIndex<'a> {
    categories: HashMap<(&'a str, &'a str), &'a EntityId>,
    items: HashMap<(&'a EntityId, &'a str), &'a EntityId>,
}

impl<'a> ReuseIndex<'a> {
    fn build(owned: &TenantOwned<'a>) -> Self {
        let mut categories = HashMap::new();
        for category in &owned.categories {
            if let Some(owner) = category.owner() {
                categories
                    .entry((owner, category.name.as_str()))
                    .or_insert(&category.id);
            }
        }
        let mut items = HashMap::new();
        for item in &owned.items {
            if let Some(category_id) = item.category_id.as_ref() {
                items
                    .entry((category_id, item.name.as_str()))
                    .or_insert(&item.id);
            }
        }
        Self { categories, items }
    }

    fn category(&self, owner: &str, name: &str) -> Option<&'a EntityId> {
        self.categories.get(&(owner, name)).copied()
    }

    fn item(&self, category_id: &EntityId, name: &str) -> Option<&'a EntityId> {
        self.items.get(&(category_id, name)).copied()
    }
}

pub fn clone_for_tenants<G: IdGenerator>(
    users: &[User],
    templates: &TemplateSet<'_>,
    owned: &TenantOwned<'_>,
    ids: &mut G,
) -> AppResult<CloneOutcome> {
    let template_category_ids: HashSet<&EntityId> =
        templates.categories.iter().map(|c| &c.id).collect();

    let mut items_by_category: HashMap<&EntityId, Vec<&Item>> = HashMap::new();
    let mut stats = CloneStats::default();
    for item in &templates.items {
        match item.category_id.as_ref() {
            Some(category_id) if template_category_ids.contains(category_id) => {
                items_by_category.entry(category_id).or_default().push(*item);
            }
            _ => {
                stats.orphan_template_items += 1;
                debug!(
                    target: "ledger_tenancy",
                    event = "orphan_template_item",
                    item_id = %item.id,
                    category_id = ?item.category_id
                );
            }
        }
    }

    let reuse = ReuseIndex::build(owned);
    let mut outcome = CloneOutcome::default();

    for user in users {
        let before = stats.clone();
        for template in &templates.categories {
            let category_id = match reuse.category(&user.email, &template.name) {
                Some(existing) => {
                    stats.categories_reused += 1;
                    existing.clone()
                }
                None => {
                    let clone = clone_category(template, user, ids);
                    let id = clone.id.clone();
                    outcome.categories.push(clone);
                    stats.categories_cloned += 1;
                    id
                }
            };
            outcome.translator.insert(
                EntityKind::Category,
                &user.id,
                &template.id,
                category_id.clone(),
            )?;

            let children = items_by_category
                .get(&template.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for item in children {
                let item_id = match reuse.item(&category_id, &item.name) {
                    Some(existing) => {
                        stats.items_reused += 1;
                        existing.clone()
                    }
                    None => {
                        let clone = clone_item(item, &category_id, user, ids);
                        let id = clone.id.clone();
                        outcome.items.push(clone);
                        stats.items_cloned += 1;
                        id
                    }
                };
                outcome
                    .translator
                    .insert(EntityKind::Item, &user.id, &item.id, item_id)?;
            }
        }

        info!(
            target: "ledger_tenancy",
            event = "tenant_cloned",
            user_id = %user.id,
            email = %user.email,
            categories_cloned = stats.categories_cloned - before.categories_cloned,
            items_cloned = stats.items_cloned - before.items_cloned,
            categories_reused = stats.categories_reused - before.categories_reused,
            items_reused = stats.items_reused - before.items_reused
        );
    }

    outcome.stats = stats;
    Ok(outcome)
}

fn clone_category<G: IdGenerator>(template: &Category, user: &User, ids: &mut G) -> Category {
    Category {
        id: ids.next_id(),
        name: template.name.clone(),
        email: Some(user.email.clone()),
        extra: template.extra.clone(),
    }
}

fn clone_item<G: IdGenerator>(
    template: &Item,
    category_id: &EntityId,
    user: &User,
    ids: &mut G,
) -> Item {
    Item {
        id: ids.next_id(),
        name: template.name.clone(),
        category_id: Some(category_id.clone()),
        email: Some(user.email.clone()),
        extra: template.extra.clone(),
    }
}

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{Budget, Category, Dependent, EntityId, Item, Transaction, User};
use crate::ownership::{OwnerSource, OwnershipResolver, Resolution, Unresolved};
use crate::translator::{EntityKind, IdTranslator, Translation};
use crate::AppResult;

/// Number of unmapped references, and of records kept without an owner,
/// listed verbatim in the summary.
pub const WARNING_SAMPLE_LIMIT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefOutcome {
    /// The record carries no such reference.
    Absent,
    /// A template reference was replaced by the owner's copy.
    Rewritten,
    /// The reference already names an entity owned by the owner.
    AlreadyScoped,
    /// Left untouched: no copy exists for this owner.
    Unmapped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependentStats {
    pub read: u64,
    pub migrated: u64,
    pub dropped: u64,
    /// Records naming an unknown user, written back unchanged.
    pub kept_unowned: u64,
    /// Records whose owner came from the default-user fallback.
    pub assigned_to_default: u64,
    pub references_rewritten: u64,
    pub references_already_scoped: u64,
    pub references_unmapped: u64,
}

impl DependentStats {
    fn record(&mut self, outcome: RefOutcome) {
        match outcome {
            RefOutcome::Absent => {}
            RefOutcome::Rewritten => self.references_rewritten += 1,
            RefOutcome::AlreadyScoped => self.references_already_scoped += 1,
            RefOutcome::Unmapped => self.references_unmapped += 1,
        }
    }
}

/// A record removed from the output because nobody could own it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedRecord {
    pub collection: &'static str,
    pub index: usize,
    #[serde(flatten)]
    pub reason: Unresolved,
    /// The record exactly as it was read.
    pub record: serde_json::Value,
}

/// A record kept as it was because the user it names does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnownedRecord {
    pub collection: &'static str,
    pub index: usize,
    pub record_id: Option<String>,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmappedReference {
    pub collection: &'static str,
    pub index: usize,
    pub record_id: Option<String>,
    pub kind: EntityKind,
    pub reference: String,
    pub owner_email: String,
}

/// Lookup state shared by every dependent record of one run.
pub struct RewriteContext<'a> {
    translator: &'a IdTranslator,
    category_owner: HashMap<&'a EntityId, &'a str>,
    item_owner: HashMap<&'a EntityId, &'a str>,
}

impl<'a> RewriteContext<'a> {
    /// `categories` and `items` are the post-migration collections; they
    /// tell already-scoped references apart from unmapped ones.
    pub fn new(translator: &'a IdTranslator, categories: &'a [Category], items: &'a [Item]) -> Self {
        Self {
            translator,
            category_owner: categories
                .iter()
                .filter_map(|c| c.owner().map(|owner| (&c.id, owner)))
                .collect(),
            item_owner: items
                .iter()
                .filter_map(|i| i.owner().map(|owner| (&i.id, owner)))
                .collect(),
        }
    }

    fn owned_by(&self, kind: EntityKind, id: &EntityId, owner: &User) -> bool {
        let owners = match kind {
            EntityKind::Category => &self.category_owner,
            EntityKind::Item => &self.item_owner,
        };
        owners.get(id).is_some_and(|email| *email == owner.email)
    }

    fn translate(&self, kind: EntityKind, reference: &EntityId, owner: &User) -> (RefOutcome, Option<EntityId>) {
        match self.translator.lookup(kind, &owner.id, reference) {
            Translation::Mapped(id) => (RefOutcome::Rewritten, Some(id.clone())),
            Translation::Unmapped if self.owned_by(kind, reference, owner) => {
                (RefOutcome::AlreadyScoped, None)
            }
            Translation::Unmapped => (RefOutcome::Unmapped, None),
        }
    }

    /// Points the record's references at the owner's copies and stamps the
    /// owner's email. Unmapped references are left as they are.
    pub fn rewrite<D: Dependent>(&self, record: &mut D, owner: &User) -> [RefOutcome; 2] {
        let category = match record.category_ref() {
            None => RefOutcome::Absent,
            Some(reference) => {
                let (outcome, replacement) = self.translate(EntityKind::Category, reference, owner);
                if let Some(id) = replacement {
                    record.set_category_ref(id);
                }
                outcome
            }
        };
        let item = match record.item_ref() {
            None => RefOutcome::Absent,
            Some(reference) => {
                let (outcome, replacement) = self.translate(EntityKind::Item, reference, owner);
                if let Some(id) = replacement {
                    record.set_item_ref(id);
                }
                outcome
            }
        };
        record.set_owner_email(&owner.email);
        [category, item]
    }
}

/// Output of rewriting one dependent collection.
#[derive(Debug, Clone, Default)]
pub struct RewrittenCollection<T> {
    pub records: Vec<T>,
    pub stats: DependentStats,
    pub dropped: Vec<DroppedRecord>,
    pub unowned: Vec<UnownedRecord>,
    pub unmapped: Vec<UnmappedReference>,
}

pub fn rewrite_transactions(
    transactions: &[Transaction],
    resolver: &OwnershipResolver<'_>,
    ctx: &RewriteContext<'_>,
) -> AppResult<RewrittenCollection<Transaction>> {
    rewrite_collection(
        crate::document::TRANSACTIONS,
        transactions,
        |txn| resolver.resolve_transaction(txn),
        |txn, resolution| {
            if resolution.source == OwnerSource::DefaultUser {
                txn.set_user(resolution.owner.id.clone());
            }
        },
        ctx,
    )
}

pub fn rewrite_budgets(
    budgets: &[Budget],
    resolver: &OwnershipResolver<'_>,
    ctx: &RewriteContext<'_>,
) -> AppResult<RewrittenCollection<Budget>> {
    let out = rewrite_collection(
        crate::document::BUDGETS,
        budgets,
        |budget| resolver.resolve_budget(budget),
        |_, _| {},
        ctx,
    )?;
    if out.stats.assigned_to_default > 0 {
        warn!(
            target: "ledger_tenancy",
            event = "budgets_attributed_to_default_user",
            count = out.stats.assigned_to_default,
            default_user = resolver.default_user().map(|u| u.email.as_str()),
            "budget ownership is not recorded in the data; attributed to the default user"
        );
    }
    Ok(out)
}

fn rewrite_collection<'u, T, R, P>(
    collection: &'static str,
    records: &[T],
    resolve: R,
    patch_owner: P,
    ctx: &RewriteContext<'_>,
) -> AppResult<RewrittenCollection<T>>
where
    T: Dependent + Clone + Serialize,
    R: Fn(&T) -> Result<Resolution<'u>, Unresolved>,
    P: Fn(&mut T, &Resolution<'u>),
{
    let mut out = RewrittenCollection {
        records: Vec::with_capacity(records.len()),
        stats: DependentStats::default(),
        dropped: Vec::new(),
        unowned: Vec::new(),
        unmapped: Vec::new(),
    };

    for (index, record) in records.iter().enumerate() {
        out.stats.read += 1;
        let resolution = match resolve(record) {
            Ok(resolution) => resolution,
            Err(Unresolved::UnknownOwner { user_id }) => {
                warn!(
                    target: "ledger_tenancy",
                    event = "record_kept_unowned",
                    collection,
                    index,
                    record_id = record.record_id().as_deref(),
                    user_id = %user_id
                );
                out.stats.kept_unowned += 1;
                if out.unowned.len() < WARNING_SAMPLE_LIMIT {
                    out.unowned.push(UnownedRecord {
                        collection,
                        index,
                        record_id: record.record_id(),
                        user_id,
                    });
                }
                out.records.push(record.clone());
                continue;
            }
            Err(reason) => {
                warn!(
                    target: "ledger_tenancy",
                    event = "record_dropped",
                    collection,
                    index,
                    record_id = record.record_id().as_deref(),
                    reason = reason.reason()
                );
                out.stats.dropped += 1;
                out.dropped.push(DroppedRecord {
                    collection,
                    index,
                    reason,
                    record: serde_json::to_value(record)?,
                });
                continue;
            }
        };

        let mut migrated = record.clone();
        patch_owner(&mut migrated, &resolution);
        if resolution.source == OwnerSource::DefaultUser {
            out.stats.assigned_to_default += 1;
        }

        let references = [
            (EntityKind::Category, record.category_ref()),
            (EntityKind::Item, record.item_ref()),
        ];
        let outcomes = ctx.rewrite(&mut migrated, resolution.owner);
        for ((kind, reference), outcome) in references.into_iter().zip(outcomes) {
            out.stats.record(outcome);
            if outcome != RefOutcome::Unmapped {
                continue;
            }
            let reference = reference.map(ToString::to_string).unwrap_or_default();
            debug!(
                target: "ledger_tenancy",
                event = "reference_unmapped",
                collection,
                index,
                kind = kind.as_str(),
                reference = %reference
            );
            if out.unmapped.len() < WARNING_SAMPLE_LIMIT {
                out.unmapped.push(UnmappedReference {
                    collection,
                    index,
                    record_id: record.record_id(),
                    kind,
                    reference,
                    owner_email: resolution.owner.email.clone(),
                });
            }
        }

        out.stats.migrated += 1;
        out.records.push(migrated);
    }

    Ok(out)
}

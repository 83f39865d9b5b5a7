use std::collections::HashMap;

use serde::Serialize;

use crate::model::EntityId;
use crate::{AppError, AppResult};

pub const DUPLICATE_MAPPING_CODE: &str = "MIGRATE/DUPLICATE_MAPPING";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Item,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Category => "category",
            EntityKind::Item => "item",
        }
    }
}

/// Outcome of a translator lookup. Callers must decide what an unmapped
/// reference means for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Translation<'a> {
    Mapped(&'a EntityId),
    Unmapped,
}

impl<'a> Translation<'a> {
    pub fn mapped(self) -> Option<&'a EntityId> {
        match self {
            Translation::Mapped(id) => Some(id),
            Translation::Unmapped => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TranslationKey {
    kind: EntityKind,
    user_id: EntityId,
    template_id: EntityId,
}

/// Write-once mapping from (kind, owning user, template id) to the id of
/// that user's copy of the template.
#[derive(Debug, Default, Clone)]
pub struct IdTranslator {
    entries: HashMap<TranslationKey, EntityId>,
}

impl IdTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        kind: EntityKind,
        user_id: &EntityId,
        template_id: &EntityId,
        tenant_id: EntityId,
    ) -> AppResult<()> {
        let key = TranslationKey {
            kind,
            user_id: user_id.clone(),
            template_id: template_id.clone(),
        };
        if let Some(existing) = self.entries.get(&key) {
            return Err(AppError::new(
                DUPLICATE_MAPPING_CODE,
                "Template was already mapped for this user",
            )
            .with_context("kind", kind.as_str())
            .with_context("user_id", user_id.to_string())
            .with_context("template_id", template_id.to_string())
            .with_context("existing", existing.to_string()));
        }
        self.entries.insert(key, tenant_id);
        Ok(())
    }

    pub fn lookup(
        &self,
        kind: EntityKind,
        user_id: &EntityId,
        template_id: &EntityId,
    ) -> Translation<'_> {
        let key = TranslationKey {
            kind,
            user_id: user_id.clone(),
            template_id: template_id.clone(),
        };
        match self.entries.get(&key) {
            Some(id) => Translation::Mapped(id),
            None => Translation::Unmapped,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

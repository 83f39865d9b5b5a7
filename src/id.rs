use uuid::Uuid;

use crate::model::EntityId;

pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Source of fresh clone identifiers.
pub trait IdGenerator {
    fn next_id(&mut self) -> EntityId;
}

/// Production generator: time-ordered UUIDv7 strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Ids;

impl IdGenerator for UuidV7Ids {
    fn next_id(&mut self) -> EntityId {
        EntityId::Text(new_uuid_v7())
    }
}

impl<F> IdGenerator for F
where
    F: FnMut() -> EntityId,
{
    fn next_id(&mut self) -> EntityId {
        self()
    }
}

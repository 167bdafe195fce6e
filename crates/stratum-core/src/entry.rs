/// A handle wrapping one entity instance, returned by store mutations.
///
/// Immutable once created; ownership transfers to the caller as the
/// return value of add/remove/update.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    entity: T,
}

impl<T> Entry<T> {
    pub fn new(entity: T) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> &T {
        &self.entity
    }

    pub fn into_entity(self) -> T {
        self.entity
    }
}

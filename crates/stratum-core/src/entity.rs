use serde::{de::DeserializeOwned, Serialize};

/// A domain object stored by the repository.
///
/// Equality is delegated entirely to the type's own `PartialEq` contract:
/// the in-memory store uses it for add-deduplication and remove/update
/// matching, and the durable store uses it to resolve the target row of a
/// staged remove or update. Identity may be a dedicated identifier field
/// or structural value equality, but it must remain stable across a
/// mutation unless the changed field is itself the intended update key.
///
/// `store_name` is the stable per-type name a durable backend uses for
/// its backing table; it must be a plain identifier (letters, digits,
/// underscores, not starting with a digit).
pub trait Entity:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn store_name() -> &'static str;
}

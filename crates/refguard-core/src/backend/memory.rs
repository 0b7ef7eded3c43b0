//! In-memory repository backend

use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{describe, ObjectStore, RefStore};
use crate::errors::{RefguardError, Result};
use crate::hash::ObjectId;

/// Repository held entirely in memory
///
/// Used by tests and as the staging area for transport operations.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    objects: RwLock<BTreeMap<ObjectId, Vec<u8>>>,
    refs: RwLock<BTreeMap<String, ObjectId>>,
}

impl MemoryRepository {
    /// Empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryRepository {
    fn put_object(&self, bytes: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::for_bytes(bytes);
        self.objects
            .write()
            .entry(id)
            .or_insert_with(|| bytes.to_vec());
        Ok(id)
    }

    fn get_object(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RefguardError::not_found(format!("object {id}")))
    }

    fn has_object(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.objects.read().contains_key(id))
    }

    fn object_ids(&self) -> Result<Vec<ObjectId>> {
        Ok(self.objects.read().keys().copied().collect())
    }
}

impl RefStore for MemoryRepository {
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        Ok(self.refs.read().get(name).copied())
    }

    fn update_ref(&self, name: &str, new: ObjectId, expected: Option<ObjectId>) -> Result<()> {
        let mut refs = self.refs.write();
        let current = refs.get(name).copied();
        if current != expected {
            return Err(RefguardError::RefConflict {
                reference: name.to_string(),
                expected: describe(expected),
                actual: describe(current),
            });
        }
        refs.insert(name.to_string(), new);
        tracing::trace!(reference = name, target = %new.short(), "reference updated");
        Ok(())
    }

    fn list_refs(&self) -> Result<Vec<(String, ObjectId)>> {
        Ok(self
            .refs
            .read()
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_contract() {
        let repo = MemoryRepository::new();
        super::super::tests::exercise_backend(&repo);
    }
}

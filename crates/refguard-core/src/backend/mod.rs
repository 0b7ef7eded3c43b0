//! Repository backend interface
//!
//! The trust engine never talks to a version-control binary. It reads and
//! writes through these traits: a content-addressed [`ObjectStore`] and a
//! [`RefStore`] of mutable named references whose only write primitive is a
//! compare-and-swap. That compare-and-swap is the single serialization point
//! for concurrent writers.

mod fs;
mod memory;

pub use fs::FsRepository;
pub use memory::MemoryRepository;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::Result;
use crate::hash::ObjectId;

/// Content-addressed object storage
pub trait ObjectStore: Send + Sync {
    /// Store bytes, returning their content id (idempotent)
    fn put_object(&self, bytes: &[u8]) -> Result<ObjectId>;

    /// Fetch bytes by id; `NotFound` if absent
    fn get_object(&self, id: &ObjectId) -> Result<Vec<u8>>;

    /// Whether the object is present
    fn has_object(&self, id: &ObjectId) -> Result<bool>;

    /// Ids of every stored object
    fn object_ids(&self) -> Result<Vec<ObjectId>>;
}

/// Named references with compare-and-swap updates
pub trait RefStore: Send + Sync {
    /// Current value of `name`, if the reference exists
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>>;

    /// Point `name` at `new` iff it currently equals `expected`
    ///
    /// `expected = None` means the reference must not exist yet. A mismatch
    /// fails with `RefConflict` and leaves the reference untouched.
    fn update_ref(&self, name: &str, new: ObjectId, expected: Option<ObjectId>) -> Result<()>;

    /// All references, sorted by name
    fn list_refs(&self) -> Result<Vec<(String, ObjectId)>>;
}

/// A full repository: objects plus references
pub trait Repository: ObjectStore + RefStore {}

impl<T: ObjectStore + RefStore> Repository for T {}

/// Typed access to JSON-encoded objects
pub trait ObjectStoreExt {
    /// Encode `value` as JSON and store it
    fn put_json<T: Serialize>(&self, value: &T) -> Result<ObjectId>;

    /// Load and decode a JSON object
    fn get_json<T: DeserializeOwned>(&self, id: &ObjectId) -> Result<T>;
}

impl<S: ObjectStore + ?Sized> ObjectStoreExt for S {
    fn put_json<T: Serialize>(&self, value: &T) -> Result<ObjectId> {
        let bytes = serde_json::to_vec(value)?;
        self.put_object(&bytes)
    }

    fn get_json<T: DeserializeOwned>(&self, id: &ObjectId) -> Result<T> {
        let bytes = self.get_object(id)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

pub(crate) fn describe(id: Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_else(|| "none".to_string())
}

//! Log entries

use refguard_core::{Envelope, ObjectId};
use serde::{Deserialize, Serialize};

/// One recorded reference change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RslEntry {
    /// Position in the log, 1 for the genesis entry
    pub number: u64,
    /// Fully qualified reference name
    pub reference: String,
    /// Object the reference pointed at when recorded
    pub target: ObjectId,
    /// Id of the preceding entry, absent only for genesis
    pub previous: Option<ObjectId>,
}

/// An entry with the recorder's signatures, if any
pub type SignedEntry = Envelope<RslEntry>;

/// An entry as held in the log arena, together with its object id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Content hash of the stored entry
    pub id: ObjectId,
    /// The signed entry
    pub entry: SignedEntry,
}

impl StoredEntry {
    /// Entry number
    pub fn number(&self) -> u64 {
        self.entry.payload().number
    }

    /// Reference the entry records
    pub fn reference(&self) -> &str {
        &self.entry.payload().reference
    }

    /// Recorded target
    pub fn target(&self) -> ObjectId {
        self.entry.payload().target
    }
}

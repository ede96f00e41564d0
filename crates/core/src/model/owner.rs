//! Polymorphic owner reference.

use serde::{Deserialize, Serialize};

/// The entity an account belongs to, identified by a type tag and an id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Owner type tag, e.g. `user` or `order`.
    pub owner_type: String,
    /// Owner id within its type.
    pub owner_id: String,
}

impl OwnerRef {
    /// Creates an owner reference.
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: owner_id.into(),
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.owner_type, self.owner_id)
    }
}

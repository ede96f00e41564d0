//! Typed keys for accounts and transactions.
//!
//! Keys are UUID v7, so ordering by key is ordering by creation time. Account
//! keys double as the lock-ordering key when two accounts are locked together.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed key wrappers.
macro_rules! typed_key {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new key using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates a key from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_key!(AccountKey, "Unique key of a ledger account.");
typed_key!(TransactionKey, "Unique, time-sortable key of a ledger transaction.");

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_key_from_uuid_roundtrip() {
        let uuid = Uuid::new_v4();
        let key = AccountKey::from_uuid(uuid);
        assert_eq!(key.into_inner(), uuid);
        assert_eq!(key.to_string(), uuid.to_string());
    }

    #[test]
    fn test_key_from_str() {
        let key = TransactionKey::new();
        let parsed = TransactionKey::from_str(&key.to_string()).unwrap();
        assert_eq!(parsed, key);
        assert!(TransactionKey::from_str("not-a-key").is_err());
    }

    #[test]
    fn test_keys_are_time_ordered() {
        let keys: Vec<TransactionKey> = (0..64).map(|_| TransactionKey::new()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted, "v7 keys generated in sequence must sort in sequence");
    }
}

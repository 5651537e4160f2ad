//! Bearer-token sessions.
//!
//! Every registration issues an opaque token and stores it on the new row.
//! The cache maps tokens back to identities so request handlers never scan
//! rows; it is written through by the registration handlers and rebuilt
//! from the rows at startup.

use dashmap::DashMap;
use uuid::Uuid;

use crate::store::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Requester(Uuid),
    Owner(Uuid),
    /// A unit register token; carries the owner the new unit will belong to.
    UnitEnrollment(Uuid),
    Unit(Uuid),
}

/// 256 bits from two v4 UUIDs, hex encoded.
pub fn issue_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[derive(Default)]
pub struct SessionCache {
    tokens: DashMap<String, Identity>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every token stored on owner, unit, and requester rows.
    pub fn warm(&self, store: &MemoryStore) -> usize {
        for owner in store.list_owners() {
            self.insert(&owner.access_token, Identity::Owner(owner.id));
            self.insert(&owner.unit_register_token, Identity::UnitEnrollment(owner.id));
        }
        for unit in store.list_units() {
            self.insert(&unit.access_token, Identity::Unit(unit.id));
        }
        for requester in store.list_requesters() {
            self.insert(&requester.access_token, Identity::Requester(requester.id));
        }

        self.tokens.len()
    }

    pub fn insert(&self, token: &str, identity: Identity) {
        if token.is_empty() {
            return;
        }
        self.tokens.insert(token.to_string(), identity);
    }

    pub fn resolve(&self, token: &str) -> Option<Identity> {
        self.tokens.get(token).map(|identity| *identity)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::owner::Owner;
    use crate::test_helpers::{seed_owner, seed_unit, ts};

    #[test]
    fn issued_tokens_are_distinct_hex() {
        let a = issue_token();
        let b = issue_token();

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn warm_loads_tokens_from_rows() {
        let store = MemoryStore::new();
        let owner = Owner {
            id: Uuid::new_v4(),
            name: "fleet".to_string(),
            access_token: "owner-token".to_string(),
            unit_register_token: "enroll-token".to_string(),
            created_at: ts(0),
        };
        let owner_id = owner.id;
        store.insert_owner(owner);

        let sessions = SessionCache::new();
        assert_eq!(sessions.warm(&store), 2);
        assert_eq!(sessions.resolve("owner-token"), Some(Identity::Owner(owner_id)));
        assert_eq!(
            sessions.resolve("enroll-token"),
            Some(Identity::UnitEnrollment(owner_id))
        );
        assert_eq!(sessions.resolve("nope"), None);
    }

    #[test]
    fn rows_without_tokens_are_skipped() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        seed_unit(&store, owner, "swift", 10, true);

        let sessions = SessionCache::new();
        assert_eq!(sessions.warm(&store), 0);
        assert!(sessions.is_empty());
        assert_eq!(sessions.resolve(""), None);
    }
}

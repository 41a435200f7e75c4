//! Project keyring: maps API keys to project IDs.
//!
//! Key format validation happens in `scoring_core::auth`; the keyring only
//! answers whether a well-formed key is registered and for which project.

use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use scoring_core::{Error, ProjectKey, Result};

/// Registered project credentials.
#[derive(Default)]
pub struct ProjectKeyring {
    keys: RwLock<HashMap<String, Uuid>>,
}

impl ProjectKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key for a project. Replaces any prior registration.
    pub fn register(&self, key: &ProjectKey, project_id: Uuid) {
        self.keys.write().insert(key.as_str().to_string(), project_id);
    }

    /// Revoke a key. Returns whether it was registered.
    pub fn revoke(&self, key: &ProjectKey) -> bool {
        self.keys.write().remove(key.as_str()).is_some()
    }

    /// Resolve a key to its project.
    pub fn resolve(&self, key: &ProjectKey) -> Result<Uuid> {
        self.keys
            .read()
            .get(key.as_str())
            .copied()
            .ok_or_else(|| Error::auth("Unknown API key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "lsk_test_ABC123xyz789DEF456ghi012JKL345mn";

    #[test]
    fn test_register_resolve_revoke() {
        let keyring = ProjectKeyring::new();
        let key = ProjectKey::parse(KEY).unwrap();
        let project = Uuid::new_v4();

        assert!(keyring.resolve(&key).is_err());

        keyring.register(&key, project);
        assert_eq!(keyring.resolve(&key).unwrap(), project);

        assert!(keyring.revoke(&key));
        assert!(keyring.resolve(&key).is_err());
        assert!(!keyring.revoke(&key));
    }
}

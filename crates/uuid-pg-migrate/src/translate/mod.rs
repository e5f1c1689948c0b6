//! External id to surrogate key translation.
//!
//! The [`Translator`] is built up while identity tables load and consulted
//! by every table that refers to them. It lives for one run only; a new run
//! starts empty and rebuilds it from the rows it upserts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::SurrogateKey;
use crate::error::{MigrateError, Result};

/// One `(scope, external_id) -> surrogate` entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingEntry {
    pub scope: String,
    pub external_id: String,
    pub surrogate_id: SurrogateKey,
}

/// Run-scoped identifier mapping. Entries are never removed or replaced.
#[derive(Debug, Default, Clone)]
pub struct Translator {
    scopes: HashMap<String, HashMap<String, SurrogateKey>>,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translator seeded with known mappings.
    pub fn with_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String, SurrogateKey)>,
    {
        let mut translator = Self::new();
        translator.preload(entries)?;
        Ok(translator)
    }

    /// Register every entry, stopping at the first conflict.
    pub fn preload<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String, SurrogateKey)>,
    {
        for (scope, external_id, key) in entries {
            self.register(&scope, &external_id, key)?;
        }
        Ok(())
    }

    /// Record that `external_id` in `scope` is `surrogate_id` in the target.
    ///
    /// Registering the same pair again is a no-op. Registering the id to a
    /// different key fails with `ConflictingMapping` and leaves the first
    /// mapping in place.
    pub fn register(
        &mut self,
        scope: &str,
        external_id: &str,
        surrogate_id: SurrogateKey,
    ) -> Result<()> {
        let ids = self.scopes.entry(scope.to_string()).or_default();
        match ids.get(external_id) {
            Some(existing) if *existing == surrogate_id => Ok(()),
            Some(existing) => Err(MigrateError::ConflictingMapping {
                scope: scope.to_string(),
                external_id: external_id.to_string(),
                existing: existing.get(),
                attempted: surrogate_id.get(),
            }),
            None => {
                ids.insert(external_id.to_string(), surrogate_id);
                Ok(())
            }
        }
    }

    /// Look up the surrogate key for an external id.
    pub fn resolve(&self, scope: &str, external_id: &str) -> Option<SurrogateKey> {
        self.scopes
            .get(scope)
            .and_then(|ids| ids.get(external_id))
            .copied()
    }

    /// Total number of entries across all scopes.
    pub fn len(&self) -> usize {
        self.scopes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries in one scope.
    pub fn scope_len(&self, scope: &str) -> usize {
        self.scopes.get(scope).map(HashMap::len).unwrap_or(0)
    }

    /// All entries, sorted by scope then external id.
    pub fn snapshot(&self) -> Vec<MappingEntry> {
        let mut entries: Vec<MappingEntry> = self
            .scopes
            .iter()
            .flat_map(|(scope, ids)| {
                ids.iter().map(move |(external_id, key)| MappingEntry {
                    scope: scope.clone(),
                    external_id: external_id.clone(),
                    surrogate_id: *key,
                })
            })
            .collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: i64) -> SurrogateKey {
        SurrogateKey::new(v).unwrap()
    }

    #[test]
    fn test_register_and_resolve() {
        let mut t = Translator::new();
        t.register("user", "uuid-A", key(101)).unwrap();
        assert_eq!(t.resolve("user", "uuid-A"), Some(key(101)));
        assert_eq!(t.resolve("user", "uuid-B"), None);
        assert_eq!(t.resolve("order", "uuid-A"), None);
    }

    #[test]
    fn test_identical_registration_is_noop() {
        let mut t = Translator::new();
        t.register("user", "uuid-A", key(101)).unwrap();
        t.register("user", "uuid-A", key(101)).unwrap();
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_conflicting_registration_fails_and_keeps_first() {
        let mut t = Translator::new();
        t.register("user", "uuid-A", key(101)).unwrap();
        let err = t.register("user", "uuid-A", key(202)).unwrap_err();
        match err {
            MigrateError::ConflictingMapping {
                existing, attempted, ..
            } => {
                assert_eq!(existing, 101);
                assert_eq!(attempted, 202);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(t.resolve("user", "uuid-A"), Some(key(101)));
    }

    #[test]
    fn test_scopes_are_independent() {
        let mut t = Translator::new();
        t.register("user", "same", key(1)).unwrap();
        t.register("role", "same", key(2)).unwrap();
        assert_eq!(t.resolve("user", "same"), Some(key(1)));
        assert_eq!(t.resolve("role", "same"), Some(key(2)));
        assert_eq!(t.scope_len("user"), 1);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let t = Translator::with_entries(vec![
            ("user".to_string(), "b".to_string(), key(2)),
            ("role".to_string(), "z".to_string(), key(9)),
            ("user".to_string(), "a".to_string(), key(1)),
        ])
        .unwrap();
        let snap = t.snapshot();
        let ids: Vec<_> = snap
            .iter()
            .map(|e| format!("{}:{}", e.scope, e.external_id))
            .collect();
        assert_eq!(ids, vec!["role:z", "user:a", "user:b"]);
    }
}

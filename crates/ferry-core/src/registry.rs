//! Reference registry: legacy natural keys to sequential primary keys.
//!
//! The registry owns the per-kind pk counters for the whole run and the
//! bidirectional mapping between legacy keys (user-ids, content UIDs) and the
//! pks assigned to them. It holds no entity data, only keys and integers, so
//! it is safe to keep for the lifetime of the pipeline.
//!
//! Every successful [`Registry::resolve`] marks the key as *needed*; the
//! pipeline consumes that set after the pass to drop unreferenced users.
//!
//! ```
//! use ferry_core::{EntityKind, Registry};
//!
//! let mut registry = Registry::new();
//! let pk = registry.assign_or_get(EntityKind::User, "Alice");
//! assert_eq!(registry.assign_or_get(EntityKind::User, "alice"), pk);
//! assert_eq!(registry.resolve(EntityKind::User, "ALICE"), Ok(pk));
//! assert!(registry.is_needed(EntityKind::User, "alice"));
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{ErrorCode, ExportError};
use crate::model::{EntityKind, Pk};

/// Lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The key was never assigned a pk (deleted, or not yet visited).
    #[error("unresolved {kind} reference '{key}'")]
    Unresolved { kind: EntityKind, key: String },

    /// The key resolved, but to an entity owned by another scope.
    #[error("{kind} '{key}' belongs to scope {found}, referenced from scope {expected}")]
    CrossScope {
        kind: EntityKind,
        key: String,
        expected: Pk,
        found: Pk,
    },
}

impl From<RegistryError> for ExportError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unresolved { .. } => {
                Self::skip(ErrorCode::UnresolvedReference, err.to_string())
            }
            RegistryError::CrossScope { .. } => {
                Self::abort(ErrorCode::CrossScopeReference, err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    pk: Pk,
    scope: Option<Pk>,
}

type Key = (EntityKind, String);

/// Per-run key/pk registry. Never global: every pipeline run owns one.
#[derive(Debug, Default)]
pub struct Registry {
    last_pk: BTreeMap<EntityKind, Pk>,
    bindings: HashMap<Key, Binding>,
    reverse: HashMap<(EntityKind, Pk), String>,
    needed: HashSet<Key>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The pk the next allocation of `kind` will return. Does not allocate.
    #[must_use]
    pub fn next_pk(&self, kind: EntityKind) -> Pk {
        self.last_pk.get(&kind).copied().unwrap_or(0) + 1
    }

    /// Number of pks handed out so far for `kind`.
    #[must_use]
    pub fn allocated(&self, kind: EntityKind) -> Pk {
        self.last_pk.get(&kind).copied().unwrap_or(0)
    }

    /// Allocate the next pk of `kind`. Pks start at 1 and never repeat.
    pub fn allocate(&mut self, kind: EntityKind) -> Pk {
        let slot = self.last_pk.entry(kind).or_insert(0);
        *slot += 1;
        *slot
    }

    /// Return the pk already bound to `key`, or allocate and bind a new one.
    ///
    /// Idempotent: a second call with the same key neither allocates nor
    /// changes the binding.
    pub fn assign_or_get(&mut self, kind: EntityKind, key: &str) -> Pk {
        let key = normalize(kind, key);
        if let Some(binding) = self.bindings.get(&(kind, key.clone())) {
            return binding.pk;
        }
        let pk = self.allocate(kind);
        self.insert(kind, key, pk, None);
        pk
    }

    /// Bind `key` to a pk that was allocated elsewhere (by the record stream),
    /// optionally recording the owning scope (e.g. the meeting pk).
    pub fn bind(&mut self, kind: EntityKind, key: &str, pk: Pk, scope: Option<Pk>) {
        self.insert(kind, normalize(kind, key), pk, scope);
    }

    /// Look up without allocating. Marks the key as needed on success.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unresolved`] if the key was never bound.
    pub fn resolve(&mut self, kind: EntityKind, key: &str) -> Result<Pk, RegistryError> {
        self.resolve_binding(kind, key).map(|binding| binding.pk)
    }

    /// Like [`resolve`](Self::resolve), and additionally require the bound
    /// entity to belong to `scope`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unresolved`] if unbound, [`RegistryError::CrossScope`]
    /// if the entity was bound under a different scope.
    pub fn resolve_checked(
        &mut self,
        kind: EntityKind,
        key: &str,
        scope: Pk,
    ) -> Result<Pk, RegistryError> {
        let binding = self.resolve_binding(kind, key)?;
        match binding.scope {
            Some(found) if found != scope => Err(RegistryError::CrossScope {
                kind,
                key: key.to_string(),
                expected: scope,
                found,
            }),
            _ => Ok(binding.pk),
        }
    }

    /// Look up without side effects.
    #[must_use]
    pub fn peek(&self, kind: EntityKind, key: &str) -> Option<Pk> {
        self.bindings
            .get(&(kind, normalize(kind, key)))
            .map(|binding| binding.pk)
    }

    /// Legacy key bound to `pk`, if any.
    #[must_use]
    pub fn key_of(&self, kind: EntityKind, pk: Pk) -> Option<&str> {
        self.reverse.get(&(kind, pk)).map(String::as_str)
    }

    /// Record that `key` is referenced even though it may not resolve.
    pub fn mark_needed(&mut self, kind: EntityKind, key: &str) {
        self.needed.insert((kind, normalize(kind, key)));
    }

    #[must_use]
    pub fn is_needed(&self, kind: EntityKind, key: &str) -> bool {
        self.needed.contains(&(kind, normalize(kind, key)))
    }

    fn resolve_binding(&mut self, kind: EntityKind, key: &str) -> Result<Binding, RegistryError> {
        let normalized = normalize(kind, key);
        let Some(binding) = self.bindings.get(&(kind, normalized.clone())).copied() else {
            return Err(RegistryError::Unresolved {
                kind,
                key: key.to_string(),
            });
        };
        self.needed.insert((kind, normalized));
        Ok(binding)
    }

    fn insert(&mut self, kind: EntityKind, key: String, pk: Pk, scope: Option<Pk>) {
        self.reverse.insert((kind, pk), key.clone());
        self.bindings.insert((kind, key), Binding { pk, scope });
    }
}

fn normalize(kind: EntityKind, key: &str) -> String {
    if kind.folds_case() {
        key.to_lowercase()
    } else {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pks_start_at_one_per_kind() {
        let mut registry = Registry::new();
        assert_eq!(registry.next_pk(EntityKind::Poll), 1);
        assert_eq!(registry.allocate(EntityKind::Poll), 1);
        assert_eq!(registry.allocate(EntityKind::Poll), 2);
        assert_eq!(registry.allocate(EntityKind::Vote), 1);
        assert_eq!(registry.allocated(EntityKind::Poll), 2);
        assert_eq!(registry.next_pk(EntityKind::Poll), 3);
    }

    #[test]
    fn assign_or_get_does_not_advance_counter_twice() {
        let mut registry = Registry::new();
        let first = registry.assign_or_get(EntityKind::User, "anna");
        let second = registry.assign_or_get(EntityKind::User, "anna");
        assert_eq!(first, second);
        assert_eq!(registry.allocated(EntityKind::User), 1);
    }

    #[test]
    fn resolve_marks_needed_only_on_success() {
        let mut registry = Registry::new();
        registry.assign_or_get(EntityKind::User, "anna");
        assert!(!registry.is_needed(EntityKind::User, "anna"));
        assert!(registry.resolve(EntityKind::User, "anna").is_ok());
        assert!(registry.is_needed(EntityKind::User, "anna"));

        let err = registry.resolve(EntityKind::User, "ghost").expect_err("unbound");
        assert!(matches!(err, RegistryError::Unresolved { .. }));
        assert!(!registry.is_needed(EntityKind::User, "ghost"));
    }

    #[test]
    fn resolve_checked_rejects_other_scope() {
        let mut registry = Registry::new();
        let pk = registry.allocate(EntityKind::Proposal);
        registry.bind(EntityKind::Proposal, "uid-a", pk, Some(1));

        assert_eq!(registry.resolve_checked(EntityKind::Proposal, "uid-a", 1), Ok(pk));
        let err = registry
            .resolve_checked(EntityKind::Proposal, "uid-a", 2)
            .expect_err("cross scope");
        assert_eq!(
            err,
            RegistryError::CrossScope {
                kind: EntityKind::Proposal,
                key: "uid-a".into(),
                expected: 2,
                found: 1,
            }
        );
        assert!(ExportError::from(err).is_critical());
    }

    #[test]
    fn unresolved_converts_to_skip() {
        let err = ExportError::from(RegistryError::Unresolved {
            kind: EntityKind::Proposal,
            key: "gone".into(),
        });
        assert!(!err.is_critical());
        assert_eq!(err.diagnostic().code, ErrorCode::UnresolvedReference);
    }

    #[test]
    fn uids_are_case_sensitive() {
        let mut registry = Registry::new();
        let a = registry.assign_or_get(EntityKind::Proposal, "ABC");
        let b = registry.assign_or_get(EntityKind::Proposal, "abc");
        assert_ne!(a, b);
        assert_eq!(registry.key_of(EntityKind::Proposal, b), Some("abc"));
    }

    proptest! {
        #[test]
        fn assign_or_get_is_idempotent(keys in prop::collection::vec("[a-z]{1,6}", 1..40)) {
            let mut registry = Registry::new();
            let first: Vec<Pk> = keys
                .iter()
                .map(|k| registry.assign_or_get(EntityKind::User, k))
                .collect();
            let allocated = registry.allocated(EntityKind::User);
            let second: Vec<Pk> = keys
                .iter()
                .map(|k| registry.assign_or_get(EntityKind::User, k))
                .collect();
            prop_assert_eq!(first, second);
            prop_assert_eq!(registry.allocated(EntityKind::User), allocated);
        }
    }
}

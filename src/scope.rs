//! Scope-id interning.
//!
//! Scope names (`string.quoted.double.js`) are interned to numeric ids so that the rest of the
//! pipeline — boundary trees, highlight events — never has to carry owned strings around. The
//! map is additive-only for the life of a `LanguageMode`.

use hashbrown::HashMap;
use kstring::KString;

/// First id handed out by a fresh [`ScopeRegistry`].
pub const SCOPE_ID_BASE: u32 = 1;
/// Synthetic id reserved for the `variable` scope.
pub const VAR_ID: u32 = 257;
/// Scope-ids are assigned in steps of this size; even/odd can be used by callers as an
/// open/close parity hint, but nothing in this crate relies on it.
const SCOPE_ID_STEP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// Bijective, append-only map between scope names and scope ids, owned by a `LanguageMode`.
/// Scope names (`keyword.control.js`) are short and repeat constantly across captures, so they
/// are interned as `KString` (inline-stored below its small-string threshold) rather than
/// `Box<str>`.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    name_to_id: HashMap<KString, ScopeId>,
    id_to_name: HashMap<ScopeId, KString>,
    next_id: u32,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            name_to_id: HashMap::new(),
            id_to_name: HashMap::new(),
            next_id: SCOPE_ID_BASE,
        };
        registry.insert_fixed("variable", VAR_ID);
        registry
    }

    fn insert_fixed(&mut self, name: &str, id: u32) {
        let id = ScopeId(id);
        let name = KString::from_ref(name);
        self.name_to_id.insert(name.clone(), id);
        self.id_to_name.insert(id, name);
    }

    /// Returns the id for `name`, assigning a new one if this is the first time it's seen.
    /// Monotonic and stable: once assigned, an id never changes.
    pub fn get_or_create(&mut self, name: &str) -> ScopeId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = loop {
            let candidate = ScopeId(self.next_id);
            self.next_id += SCOPE_ID_STEP;
            if !self.id_to_name.contains_key(&candidate) {
                break candidate;
            }
        };
        let name = KString::from_ref(name);
        self.name_to_id.insert(name.clone(), id);
        self.id_to_name.insert(id, name);
        id
    }

    pub fn name_for_id(&self, id: ScopeId) -> Option<&str> {
        self.id_to_name.get(&id).map(|s| s.as_str())
    }

    pub fn id_for_name(&self, name: &str) -> Option<ScopeId> {
        self.name_to_id.get(name).copied()
    }

    /// `classNameForScopeId`: a CSS-ish class name derived from the scope name, matching
    /// the convention of dots becoming spaces (as the host editor's renderer expects).
    pub fn class_name_for_id(&self, id: ScopeId) -> Option<String> {
        self.name_for_id(id)
            .map(|name| name.replace('.', " "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bijection_round_trips() {
        let mut registry = ScopeRegistry::new();
        let id = registry.get_or_create("string.quoted.double.js");
        assert_eq!(registry.name_for_id(id), Some("string.quoted.double.js"));
        let id_again = registry.get_or_create("string.quoted.double.js");
        assert_eq!(id, id_again);
    }

    #[test]
    fn variable_is_interned_to_var_id() {
        let mut registry = ScopeRegistry::new();
        assert_eq!(registry.get_or_create("variable"), ScopeId(VAR_ID));
    }

    #[test]
    fn ids_are_stable_across_many_insertions() {
        let mut registry = ScopeRegistry::new();
        let first = registry.get_or_create("keyword");
        for i in 0..64 {
            registry.get_or_create(&format!("scope.{i}"));
        }
        assert_eq!(registry.get_or_create("keyword"), first);
    }
}

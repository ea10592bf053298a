//! External-to-local reference translation for one run

use std::collections::HashMap;

/// `"<Type>/<externalId>"` to `"<Type>/<localId>"`, append-only
#[derive(Debug, Default)]
pub struct ReferenceMap {
    entries: HashMap<String, String>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mapping. An existing mapping is never replaced; returns `false` in that case.
    pub fn insert(&mut self, external: impl Into<String>, local: impl Into<String>) -> bool {
        let external = external.into();
        if self.entries.contains_key(&external) {
            return false;
        }
        self.entries.insert(external, local.into());
        true
    }

    /// Local reference for `external`
    pub fn get(&self, external: &str) -> Option<&str> {
        self.entries.get(external).map(String::as_str)
    }

    pub fn contains(&self, external: &str) -> bool {
        self.entries.contains_key(external)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only() {
        let mut map = ReferenceMap::new();
        assert!(map.insert("Patient/ext-1", "Patient/local-1"));
        assert!(!map.insert("Patient/ext-1", "Patient/local-2"));
        assert_eq!(map.get("Patient/ext-1"), Some("Patient/local-1"));
        assert_eq!(map.len(), 1);
        assert!(map.get("Patient/ext-2").is_none());
    }
}

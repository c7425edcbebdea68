//! In-memory service registry
//!
//! Readers take an immutable [`Snapshot`] and never observe a partially
//! applied scan: every write builds a complete new map and swaps it in under
//! a short write lock.

use crate::model::ServiceDefinition;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub type Snapshot = Arc<BTreeMap<String, ServiceDefinition>>;

#[derive(Debug, Default)]
pub struct ServiceRegistry {
    current: RwLock<Snapshot>,
}

/// What a write changed, for logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<ServiceDefinition> {
        self.snapshot().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Replaces the entries named in `services` and keeps every other entry.
    pub fn merge(&self, services: BTreeMap<String, ServiceDefinition>) -> MergeSummary {
        self.apply(|current| {
            let mut next = current.clone();
            next.extend(services);
            next
        })
    }

    /// Swaps in `services` as the whole registry, dropping vanished entries.
    pub fn replace(&self, services: BTreeMap<String, ServiceDefinition>) -> MergeSummary {
        self.apply(|_| services)
    }

    fn apply<F>(&self, build: F) -> MergeSummary
    where
        F: FnOnce(&BTreeMap<String, ServiceDefinition>) -> BTreeMap<String, ServiceDefinition>,
    {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let current: &BTreeMap<String, ServiceDefinition> = &guard;
        let next = build(current);

        let mut summary = MergeSummary::default();
        for (name, definition) in &next {
            match current.get(name) {
                None => summary.added.push(name.clone()),
                Some(previous) if previous != definition => summary.updated.push(name.clone()),
                Some(_) => {}
            }
        }
        summary.removed = current
            .keys()
            .filter(|name| !next.contains_key(*name))
            .cloned()
            .collect();

        *guard = Arc::new(next);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceKind;

    fn def(name: &str, port: &str) -> ServiceDefinition {
        ServiceDefinition::new(name, ServiceKind::SingleContainer, format!("/repo/{name}/Dockerfile"))
            .with_port(port)
    }

    fn map(defs: Vec<ServiceDefinition>) -> BTreeMap<String, ServiceDefinition> {
        defs.into_iter().map(|d| (d.name.clone(), d)).collect()
    }

    #[test]
    fn test_starts_empty() {
        let registry = ServiceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_merge_keeps_unrelated_entries() {
        let registry = ServiceRegistry::new();
        registry.merge(map(vec![def("a", "80"), def("b", "81")]));

        let summary = registry.merge(map(vec![def("b", "9000"), def("c", "82")]));

        assert_eq!(registry.names(), vec!["a", "b", "c"]);
        assert_eq!(registry.get("b").unwrap().port_strings(), vec!["9000"]);
        assert_eq!(summary.added, vec!["c"]);
        assert_eq!(summary.updated, vec!["b"]);
        assert!(summary.removed.is_empty());
    }

    #[test]
    fn test_merge_unchanged_reports_nothing() {
        let registry = ServiceRegistry::new();
        registry.merge(map(vec![def("a", "80")]));

        let summary = registry.merge(map(vec![def("a", "80")]));
        assert_eq!(summary, MergeSummary::default());
    }

    #[test]
    fn test_replace_prunes_vanished_entries() {
        let registry = ServiceRegistry::new();
        registry.merge(map(vec![def("a", "80"), def("b", "81")]));

        let summary = registry.replace(map(vec![def("b", "81")]));

        assert_eq!(registry.names(), vec!["b"]);
        assert_eq!(summary.removed, vec!["a"]);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let registry = ServiceRegistry::new();
        registry.merge(map(vec![def("a", "80")]));

        let before = registry.snapshot();
        registry.merge(map(vec![def("b", "81")]));

        assert_eq!(before.len(), 1);
        assert_eq!(registry.len(), 2);
    }
}

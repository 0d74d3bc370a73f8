use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::domain::Xref;
use crate::error::BridgeError;
use crate::graph::IdentifierGraph;
use crate::store::MappingStore;

/// Totals for one run, across every flushed graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub registrations: usize,
    pub links: usize,
    pub reflexive_links: usize,
    pub attributes: usize,
    pub commits: usize,
    pub flushes: usize,
}

/// State scoped to one build run: the identifiers already registered in the
/// target store and the running totals.
#[derive(Debug, Default)]
pub struct RunContext {
    seen: HashSet<Xref>,
    stats: CommitStats,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CommitStats {
        self.stats
    }

    pub fn is_registered(&self, xref: &Xref) -> bool {
        self.seen.contains(xref)
    }

    /// Registers `xref` unless this run already did. Returns whether it was new.
    fn register<S: MappingStore + ?Sized>(
        &mut self,
        store: &mut S,
        xref: &Xref,
    ) -> Result<bool, BridgeError> {
        if self.seen.contains(xref) {
            return Ok(false);
        }
        store.add_xref(xref)?;
        self.seen.insert(xref.clone());
        self.stats.registrations += 1;
        Ok(true)
    }
}

/// Writes identifier graphs into a [`MappingStore`], one committed unit per
/// primary identifier.
pub struct CommitDriver<'a, S: MappingStore + ?Sized> {
    store: &'a mut S,
    context: &'a mut RunContext,
    attribute_name: Option<&'a str>,
}

impl<'a, S: MappingStore + ?Sized> CommitDriver<'a, S> {
    pub fn new(store: &'a mut S, context: &'a mut RunContext) -> Self {
        Self {
            store,
            context,
            attribute_name: None,
        }
    }

    /// Name under which each primary's label is stored on first registration.
    pub fn with_attribute(mut self, name: Option<&'a str>) -> Self {
        self.attribute_name = name;
        self
    }

    /// Drains `graph` in insertion order. A store failure aborts immediately;
    /// primaries committed before it stay in the store.
    pub fn flush(&mut self, graph: &IdentifierGraph) -> Result<(), BridgeError> {
        for (primary, entry) in graph.iter() {
            if self.context.register(&mut *self.store, primary)? {
                if let (Some(name), Some(value)) = (self.attribute_name, entry.attribute.as_deref())
                {
                    self.store.add_attribute(primary, name, value)?;
                    self.context.stats.attributes += 1;
                }
            }
            self.store.add_link(primary, primary)?;
            self.context.stats.reflexive_links += 1;

            for secondary in &entry.secondaries {
                if secondary == primary {
                    continue;
                }
                self.context.register(&mut *self.store, secondary)?;
                self.store.add_link(primary, secondary)?;
                self.context.stats.links += 1;
            }

            self.store.commit()?;
            self.context.stats.commits += 1;
            debug!(xref = %primary, "committed");
        }
        self.context.stats.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::DataSource;
    use crate::store::{MemoryStore, StoreEvent};

    fn wd(id: &str) -> Xref {
        Xref::new(id, DataSource::WIKIDATA).unwrap()
    }

    fn ncbi(id: &str) -> Xref {
        Xref::new(id, DataSource::NCBI_GENE).unwrap()
    }

    #[test]
    fn self_secondary_is_linked_once_and_registered_once() {
        let mut graph = IdentifierGraph::new();
        graph.add_secondary(wd("Q1"), wd("Q1"));

        let mut store = MemoryStore::new();
        let mut context = RunContext::new();
        CommitDriver::new(&mut store, &mut context)
            .flush(&graph)
            .unwrap();

        assert_eq!(store.registrations().count(), 1);
        assert_eq!(
            store.links().collect::<Vec<_>>(),
            vec![(&wd("Q1"), &wd("Q1"))]
        );
    }

    #[test]
    fn shared_secondary_registered_once() {
        let mut graph = IdentifierGraph::new();
        graph.add_secondary(wd("Q1"), ncbi("100"));
        graph.add_secondary(wd("Q2"), ncbi("100"));
        // Q1 also shows up as someone's secondary
        graph.add_secondary(wd("Q3"), wd("Q1"));

        let mut store = MemoryStore::new();
        let mut context = RunContext::new();
        CommitDriver::new(&mut store, &mut context)
            .flush(&graph)
            .unwrap();

        let registered: Vec<_> = store.registrations().map(|x| x.to_string()).collect();
        assert_eq!(registered, vec!["Wd:Q1", "L:100", "Wd:Q2", "Wd:Q3"]);
        assert_eq!(context.stats().links, 3);
        assert_eq!(context.stats().reflexive_links, 3);
        assert_eq!(store.commits(), 3);
    }

    #[test]
    fn seen_set_survives_across_flushes() {
        let mut store = MemoryStore::new();
        let mut context = RunContext::new();

        let mut first = IdentifierGraph::new();
        first.add_secondary(wd("Q1"), ncbi("100"));
        let mut second = IdentifierGraph::new();
        second.add_secondary(wd("Q1"), ncbi("200"));

        {
            let mut driver = CommitDriver::new(&mut store, &mut context);
            driver.flush(&first).unwrap();
            driver.flush(&second).unwrap();
        }

        assert_eq!(store.registrations().count(), 3);
        assert!(context.is_registered(&ncbi("200")));
        assert_eq!(context.stats().flushes, 2);
    }

    #[test]
    fn attribute_written_on_first_registration_only() {
        let mut graph = IdentifierGraph::new();
        graph.primary(wd("Q1")).attribute = Some("SARS-CoV-2".to_string());

        let mut store = MemoryStore::new();
        let mut context = RunContext::new();
        {
            let mut driver =
                CommitDriver::new(&mut store, &mut context).with_attribute(Some("virus"));
            driver.flush(&graph).unwrap();
            driver.flush(&graph).unwrap();
        }

        let attributes = store
            .events()
            .iter()
            .filter(|event| matches!(event, StoreEvent::Attribute { .. }))
            .count();
        assert_eq!(attributes, 1);
        assert_eq!(context.stats().attributes, 1);
    }

    struct FailingStore {
        inner: MemoryStore,
        fail_on_link_to: Xref,
        attempts: Cell<usize>,
    }

    impl MappingStore for FailingStore {
        fn set_info(&mut self, key: &str, value: &str) -> Result<(), BridgeError> {
            self.inner.set_info(key, value)
        }

        fn add_xref(&mut self, xref: &Xref) -> Result<(), BridgeError> {
            self.inner.add_xref(xref)
        }

        fn add_link(&mut self, left: &Xref, right: &Xref) -> Result<(), BridgeError> {
            self.attempts.set(self.attempts.get() + 1);
            if *right == self.fail_on_link_to {
                return Err(BridgeError::Store {
                    operation: "add link",
                    message: "disk full".to_string(),
                });
            }
            self.inner.add_link(left, right)
        }

        fn add_attribute(&mut self, xref: &Xref, name: &str, value: &str) -> Result<(), BridgeError> {
            self.inner.add_attribute(xref, name, value)
        }

        fn commit(&mut self) -> Result<(), BridgeError> {
            self.inner.commit()
        }

        fn finalize(&mut self) -> Result<(), BridgeError> {
            self.inner.finalize()
        }
    }

    #[test]
    fn store_failure_stops_after_last_committed_primary() {
        let mut graph = IdentifierGraph::new();
        graph.add_secondary(wd("Q1"), ncbi("1"));
        graph.add_secondary(wd("Q2"), ncbi("2"));
        graph.add_secondary(wd("Q3"), ncbi("3"));

        let mut store = FailingStore {
            inner: MemoryStore::new(),
            fail_on_link_to: ncbi("2"),
            attempts: Cell::new(0),
        };
        let mut context = RunContext::new();
        let err = CommitDriver::new(&mut store, &mut context)
            .flush(&graph)
            .unwrap_err();

        assert_matches!(err, BridgeError::Store { .. });
        assert_eq!(store.inner.commits(), 1);
        assert!(!context.is_registered(&wd("Q3")));
        assert_eq!(store.attempts.get(), 4);
    }
}

//! Batched writes on top of a [`StorageProvider`].
//!
//! Writes are recorded per graph as pending additions and removals and are only sent to the
//! provider on flush. Each graph is flushed as one provider call: a flush touching several
//! graphs is not atomic, a failure leaves the graphs that were not flushed yet dirty.

use crate::dataset::{GraphNameIter, TripleIter, graph_triples_for_pattern};
use crate::error::{DatasetError, poison_corruption_error};
use crate::graph::GraphStorage;
use crate::quad::{PatternQuadStorage, QuadStorage};
use crate::storage::{ProviderCapability, StorageProvider};
use oxrdf::{
    Graph, GraphName, GraphNameRef, NamedNodeRef, NamedOrBlankNodeRef, TermRef, Triple, TripleRef,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;
use std::iter::{empty, once};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

/// A graph with pending changes relative to the version committed in the provider.
///
/// A triple is never pending both as an addition and as a removal: adding a triple cancels its
/// pending removal and the other way around.
///
/// ```
/// use oxrdf::{GraphName, NamedNodeRef, TripleRef};
/// use spardataset::{MemoryProvider, StorageProvider, TransactionalGraph};
///
/// let ex = NamedNodeRef::new("http://example.com")?;
/// let provider = MemoryProvider::new();
/// let mut graph = TransactionalGraph::new(GraphName::from(ex.into_owned()), None, false);
/// graph.assert(TripleRef::new(ex, ex, ex))?;
/// assert!(graph.is_changed());
/// graph.flush(&provider)?;
/// assert!(!graph.is_changed());
/// assert!(provider.load_graph(ex.into())?.is_some());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug)]
pub struct TransactionalGraph {
    graph_name: GraphName,
    committed: Option<Graph>,
    additions: FxHashSet<Triple>,
    removals: FxHashSet<Triple>,
    /// The committed version is dropped: the graph has been cleared or removed.
    replaced: bool,
    exists: bool,
    read_only: bool,
}

impl TransactionalGraph {
    /// `committed` is the version stored in the provider, `None` if the graph does not exist there.
    pub fn new(graph_name: GraphName, committed: Option<Graph>, read_only: bool) -> Self {
        Self {
            graph_name,
            exists: committed.is_some(),
            committed,
            additions: FxHashSet::default(),
            removals: FxHashSet::default(),
            replaced: false,
            read_only,
        }
    }

    #[inline]
    pub fn graph_name(&self) -> &GraphName {
        &self.graph_name
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// If the graph exists once the pending changes are applied.
    #[inline]
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_changed(&self) -> bool {
        self.replaced || !self.additions.is_empty() || !self.removals.is_empty()
    }

    pub fn additions(&self) -> impl Iterator<Item = TripleRef<'_>> {
        self.additions.iter().map(Triple::as_ref)
    }

    pub fn removals(&self) -> impl Iterator<Item = TripleRef<'_>> {
        self.removals.iter().map(Triple::as_ref)
    }

    pub fn contains(&self, triple: TripleRef<'_>) -> bool {
        let triple = triple.into_owned();
        self.additions.contains(&triple)
            || (self.is_committed(triple.as_ref()) && !self.removals.contains(&triple))
    }

    /// The triples of the graph once the pending changes are applied.
    pub fn triples(&self) -> impl Iterator<Item = TripleRef<'_>> {
        self.committed_graph()
            .into_iter()
            .flat_map(Graph::iter)
            .filter(|triple| !self.removals.contains(&triple.into_owned()))
            .chain(self.additions())
    }

    /// Adds a triple. Returns `true` if the triple was not already in the graph.
    pub fn assert(&mut self, triple: TripleRef<'_>) -> Result<bool, DatasetError> {
        self.check_writable()?;
        if self.contains(triple) {
            return Ok(false);
        }
        let triple = triple.into_owned();
        if !self.removals.remove(&triple) {
            self.additions.insert(triple);
        }
        self.exists = true;
        Ok(true)
    }

    /// Removes a triple. Returns `true` if the triple was in the graph.
    pub fn retract(&mut self, triple: TripleRef<'_>) -> Result<bool, DatasetError> {
        self.check_writable()?;
        if !self.contains(triple) {
            return Ok(false);
        }
        let triple = triple.into_owned();
        if !self.additions.remove(&triple) {
            self.removals.insert(triple);
        }
        Ok(true)
    }

    /// Removes all the triples, keeping the graph.
    pub fn clear(&mut self) -> Result<(), DatasetError> {
        self.check_writable()?;
        self.replaced = true;
        self.additions.clear();
        self.removals.clear();
        Ok(())
    }

    /// Removes the graph. Returns `false` if it did not exist.
    pub fn remove(&mut self) -> Result<bool, DatasetError> {
        self.clear()?;
        Ok(std::mem::replace(&mut self.exists, false))
    }

    /// Creates the graph, empty. Returns `false` if it already exists.
    pub fn create(&mut self) -> Result<bool, DatasetError> {
        self.check_writable()?;
        if self.exists {
            return Ok(false);
        }
        self.clear()?;
        self.exists = true;
        Ok(true)
    }

    /// Sends the pending changes to the provider in a single call and makes them the committed version.
    ///
    /// Uses [`StorageProvider::update_graph`] if supported and [`StorageProvider::save_graph`] otherwise.
    /// A removed graph is deleted with [`StorageProvider::delete_graph`] if supported, else saved empty.
    /// On failure the pending changes are kept.
    pub fn flush(
        &mut self,
        provider: &(impl StorageProvider + ?Sized),
    ) -> Result<(), DatasetError> {
        if !self.is_changed() {
            return Ok(());
        }
        trace!(
            graph = %self.graph_name,
            additions = self.additions.len(),
            removals = self.removals.len(),
            replaced = self.replaced,
            "flushing graph"
        );
        let graph_name = self.graph_name.as_ref();
        if self.replaced {
            if self.exists {
                provider.save_graph(graph_name, &self.to_graph())?;
            } else if provider.supports(ProviderCapability::DeleteGraph) {
                provider.delete_graph(graph_name)?;
            } else {
                provider.save_graph(graph_name, &Graph::new())?;
            }
        } else if provider.supports(ProviderCapability::UpdateGraph) {
            let additions = self.additions.iter().cloned().collect::<Vec<_>>();
            let removals = self.removals.iter().cloned().collect::<Vec<_>>();
            provider.update_graph(graph_name, &additions, &removals)?;
        } else {
            provider.save_graph(graph_name, &self.to_graph())?;
        }
        self.committed = self.exists.then(|| self.to_graph());
        self.reset();
        Ok(())
    }

    /// Drops the pending changes.
    pub fn discard(&mut self) {
        self.reset();
        self.exists = self.committed.is_some();
    }

    /// Copies the triples of the graph once the pending changes are applied.
    pub fn to_graph(&self) -> Graph {
        self.triples().collect()
    }

    fn reset(&mut self) {
        self.additions.clear();
        self.removals.clear();
        self.replaced = false;
    }

    fn committed_graph(&self) -> Option<&Graph> {
        if self.replaced {
            None
        } else {
            self.committed.as_ref()
        }
    }

    fn is_committed(&self, triple: TripleRef<'_>) -> bool {
        self.committed_graph()
            .is_some_and(|graph| graph.contains(triple))
    }

    fn check_writable(&self) -> Result<(), DatasetError> {
        if self.read_only {
            Err(DatasetError::ReadOnly(self.graph_name.clone()))
        } else {
            Ok(())
        }
    }
}

/// A storage batching writes to a [`StorageProvider`] until [`flush`](Self::flush) is called.
///
/// Graphs are loaded from the provider when they are first modified and then tracked until the next
/// flush or discard. Graphs that are not tracked are read from the provider on each lookup.
///
/// ```
/// use oxrdf::{NamedNodeRef, TripleRef};
/// use spardataset::{MemoryProvider, QuadStorage, StorageProvider, TransactionalStorage};
///
/// let ex = NamedNodeRef::new("http://example.com")?;
/// let storage = TransactionalStorage::new(MemoryProvider::new());
/// storage.add_quad(ex.into(), TripleRef::new(ex, ex, ex))?;
/// assert!(storage.provider().load_graph(ex.into())?.is_none());
/// storage.flush()?;
/// assert!(storage.provider().load_graph(ex.into())?.is_some());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct TransactionalStorage<P> {
    provider: P,
    tracked: Mutex<FxHashMap<GraphName, TransactionalGraph>>,
}

impl<P: StorageProvider> TransactionalStorage<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            tracked: Mutex::default(),
        }
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// If some changes are waiting for a flush.
    pub fn is_changed(&self) -> Result<bool, DatasetError> {
        Ok(self.tracked()?.values().any(TransactionalGraph::is_changed))
    }

    /// The graphs with changes waiting for a flush, sorted by name.
    pub fn dirty_graphs(&self) -> Result<Vec<GraphName>, DatasetError> {
        let mut graph_names = self
            .tracked()?
            .values()
            .filter(|graph| graph.is_changed())
            .map(|graph| graph.graph_name().clone())
            .collect::<Vec<_>>();
        graph_names.sort_by_cached_key(ToString::to_string);
        Ok(graph_names)
    }

    /// Sends the pending changes to the provider, one graph at a time in name order.
    ///
    /// Stops at the first failing graph: the graphs flushed before it are committed,
    /// it and the following ones stay dirty and can be flushed again.
    pub fn flush(&self) -> Result<(), DatasetError> {
        let mut tracked = self.tracked()?;
        let mut dirty = tracked
            .values()
            .filter(|graph| graph.is_changed())
            .map(|graph| graph.graph_name().clone())
            .collect::<Vec<_>>();
        dirty.sort_by_cached_key(ToString::to_string);
        debug!(graphs = dirty.len(), "flushing pending changes");
        for (flushed, graph_name) in dirty.iter().enumerate() {
            let Some(graph) = tracked.get_mut(graph_name) else {
                continue;
            };
            if let Err(e) = graph.flush(&self.provider) {
                warn!(
                    graph = %graph_name,
                    flushed,
                    remaining = dirty.len() - flushed,
                    error = %e,
                    "flush failed, the remaining graphs are kept dirty"
                );
                tracked.retain(|_, graph| graph.is_changed());
                return Err(e);
            }
        }
        tracked.clear();
        Ok(())
    }

    /// Drops all pending changes. Nothing is sent to the provider.
    pub fn discard(&self) -> Result<(), DatasetError> {
        let mut tracked = self.tracked()?;
        debug!(
            graphs = tracked.values().filter(|graph| graph.is_changed()).count(),
            "discarding pending changes"
        );
        tracked.clear();
        Ok(())
    }

    pub fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        if let Some(graph) = self.tracked()?.get(&graph_name.into_owned()) {
            return Ok(graph.exists());
        }
        Ok(self.provider.load_graph(graph_name)?.is_some())
    }

    /// The graphs listed by the provider, if it supports listing, and the graphs created since the last flush.
    pub fn graph_names(&self) -> GraphNameIter<'_> {
        match self.merged_graph_names() {
            Ok(graph_names) => Box::new(graph_names.into_iter().map(Ok)),
            Err(e) => Box::new(once(Err(e))),
        }
    }

    pub fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        self.with_graph(graph_name, TransactionalGraph::remove)
    }

    fn tracked(
        &self,
    ) -> Result<MutexGuard<'_, FxHashMap<GraphName, TransactionalGraph>>, DatasetError> {
        self.tracked.lock().map_err(poison_corruption_error)
    }

    fn with_graph<T>(
        &self,
        graph_name: GraphNameRef<'_>,
        f: impl FnOnce(&mut TransactionalGraph) -> Result<T, DatasetError>,
    ) -> Result<T, DatasetError> {
        let mut tracked = self.tracked()?;
        let graph = match tracked.entry(graph_name.into_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let committed = self.provider.load_graph(graph_name)?;
                entry.insert(TransactionalGraph::new(
                    graph_name.into_owned(),
                    committed,
                    self.provider.is_read_only(),
                ))
            }
        };
        f(graph)
    }

    fn visible_graph(&self, graph_name: GraphNameRef<'_>) -> Result<Option<Graph>, DatasetError> {
        if let Some(graph) = self.tracked()?.get(&graph_name.into_owned()) {
            return Ok(graph.exists().then(|| graph.to_graph()));
        }
        self.provider.load_graph(graph_name)
    }

    fn merged_graph_names(&self) -> Result<Vec<GraphName>, DatasetError> {
        let mut graph_names = if self.provider.supports(ProviderCapability::ListGraphs) {
            self.provider.list_graphs()?
        } else {
            Vec::new()
        };
        let tracked = self.tracked()?;
        graph_names.retain(|graph_name| {
            tracked
                .get(graph_name)
                .is_none_or(TransactionalGraph::exists)
        });
        let mut seen = graph_names.iter().cloned().collect::<FxHashSet<_>>();
        for graph in tracked.values() {
            if graph.exists() && seen.insert(graph.graph_name().clone()) {
                graph_names.push(graph.graph_name().clone());
            }
        }
        Ok(graph_names)
    }

    fn lookup(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_> {
        match self.visible_graph(graph_name) {
            Ok(Some(graph)) => Box::new(
                graph_triples_for_pattern(&graph, subject, predicate, object)
                    .into_iter()
                    .map(Ok),
            ),
            Ok(None) => Box::new(empty()),
            Err(e) => Box::new(once(Err(e))),
        }
    }
}

impl<P: StorageProvider> QuadStorage for TransactionalStorage<P> {
    fn add_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        self.with_graph(graph_name, |graph| graph.assert(triple))
    }

    fn remove_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        self.with_graph(graph_name, |graph| graph.retract(triple))
    }

    fn contains_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        if let Some(graph) = self.tracked()?.get(&graph_name.into_owned()) {
            return Ok(graph.contains(triple));
        }
        Ok(self
            .provider
            .load_graph(graph_name)?
            .is_some_and(|graph| graph.contains(triple)))
    }

    fn quads(&self, graph_name: GraphNameRef<'_>) -> TripleIter<'_> {
        self.lookup(graph_name, None, None, None)
    }

    fn graph_names(&self) -> GraphNameIter<'_> {
        Self::graph_names(self)
    }

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Self::has_graph(self, graph_name)
    }

    fn create_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        self.with_graph(graph_name, TransactionalGraph::create)
    }

    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Self::remove_graph(self, graph_name)
    }

    fn flush(&self) -> Result<(), DatasetError> {
        Self::flush(self)
    }

    fn discard(&self) -> Result<(), DatasetError> {
        Self::discard(self)
    }
}

impl<P: StorageProvider> PatternQuadStorage for TransactionalStorage<P> {
    fn quads_with_subject(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: NamedOrBlankNodeRef<'_>,
    ) -> TripleIter<'_> {
        self.lookup(graph_name, Some(subject), None, None)
    }

    fn quads_with_predicate(
        &self,
        graph_name: GraphNameRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> TripleIter<'_> {
        self.lookup(graph_name, None, Some(predicate), None)
    }

    fn quads_with_object(
        &self,
        graph_name: GraphNameRef<'_>,
        object: TermRef<'_>,
    ) -> TripleIter<'_> {
        self.lookup(graph_name, None, None, Some(object))
    }

    fn quads_with_subject_predicate(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: NamedOrBlankNodeRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> TripleIter<'_> {
        self.lookup(graph_name, Some(subject), Some(predicate), None)
    }

    fn quads_with_subject_object(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: NamedOrBlankNodeRef<'_>,
        object: TermRef<'_>,
    ) -> TripleIter<'_> {
        self.lookup(graph_name, Some(subject), None, Some(object))
    }

    fn quads_with_predicate_object(
        &self,
        graph_name: GraphNameRef<'_>,
        predicate: NamedNodeRef<'_>,
        object: TermRef<'_>,
    ) -> TripleIter<'_> {
        self.lookup(graph_name, None, Some(predicate), Some(object))
    }
}

impl<P: StorageProvider> GraphStorage for TransactionalStorage<P> {
    fn graph_names(&self) -> GraphNameIter<'_> {
        Self::graph_names(self)
    }

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Self::has_graph(self, graph_name)
    }

    fn graph(&self, graph_name: GraphNameRef<'_>) -> Result<Option<Arc<Graph>>, DatasetError> {
        Ok(self.visible_graph(graph_name)?.map(Arc::new))
    }

    fn add_graph(&self, graph_name: GraphNameRef<'_>, graph: &Graph) -> Result<(), DatasetError> {
        self.with_graph(graph_name, |target| {
            target.create()?;
            for triple in graph {
                target.assert(triple)?;
            }
            Ok(())
        })
    }

    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Self::remove_graph(self, graph_name)
    }

    fn flush(&self) -> Result<(), DatasetError> {
        Self::flush(self)
    }

    fn discard(&self) -> Result<(), DatasetError> {
        Self::discard(self)
    }
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use crate::storage::MemoryProvider;
    use oxrdf::NamedNode;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn triple(o: &str) -> Triple {
        Triple::new(ex("s"), ex("p"), ex(o))
    }

    #[test]
    fn test_assert_cancels_pending_retract() -> Result<(), DatasetError> {
        let mut committed = Graph::new();
        committed.insert(&triple("1"));
        let mut graph = TransactionalGraph::new(ex("g").into(), Some(committed), false);

        assert!(graph.retract(triple("1").as_ref())?);
        assert!(!graph.retract(triple("1").as_ref())?);
        assert_eq!(graph.removals().count(), 1);
        assert!(graph.assert(triple("1").as_ref())?);
        assert_eq!(graph.removals().count(), 0);
        assert_eq!(graph.additions().count(), 0);
        assert!(!graph.is_changed());

        assert!(graph.assert(triple("2").as_ref())?);
        assert!(graph.retract(triple("2").as_ref())?);
        assert!(!graph.is_changed());
        Ok(())
    }

    #[test]
    fn test_read_only_graph() {
        let mut graph = TransactionalGraph::new(ex("g").into(), None, true);
        assert!(matches!(
            graph.assert(triple("1").as_ref()),
            Err(DatasetError::ReadOnly(_))
        ));
        assert!(matches!(
            graph.retract(triple("1").as_ref()),
            Err(DatasetError::ReadOnly(_))
        ));
        assert!(!graph.is_changed());
    }

    #[test]
    fn test_remove_then_recreate() -> Result<(), DatasetError> {
        let provider = MemoryProvider::new();
        let g = GraphName::from(ex("g"));
        let mut committed = Graph::new();
        committed.insert(&triple("1"));
        provider.save_graph(g.as_ref(), &committed)?;

        let storage = TransactionalStorage::new(provider.clone());
        assert!(storage.remove_graph(g.as_ref())?);
        assert!(!storage.has_graph(g.as_ref())?);
        assert!(storage.add_quad(g.as_ref(), triple("2").as_ref())?);
        assert!(!storage.contains_quad(g.as_ref(), triple("1").as_ref())?);
        storage.flush()?;

        let saved = provider
            .load_graph(g.as_ref())?
            .ok_or(DatasetError::GraphNotFound(g.clone()))?;
        assert_eq!(saved.len(), 1);
        assert!(saved.contains(&triple("2")));
        Ok(())
    }

    #[test]
    fn test_removed_graph_is_deleted_on_flush() -> Result<(), DatasetError> {
        let provider = MemoryProvider::new();
        let g = GraphName::from(ex("g"));
        provider.save_graph(g.as_ref(), &Graph::new())?;
        let storage = TransactionalStorage::new(provider.clone());
        storage.remove_graph(g.as_ref())?;
        assert!(provider.load_graph(g.as_ref())?.is_some());
        assert!(storage.graph_names().next().is_none());
        storage.flush()?;
        assert!(provider.load_graph(g.as_ref())?.is_none());
        Ok(())
    }

    #[test]
    fn test_graph_listing_merges_tracked_graphs() -> Result<(), DatasetError> {
        let provider = MemoryProvider::new();
        provider.save_graph(ex("g1").as_ref().into(), &Graph::new())?;
        let storage = TransactionalStorage::new(provider);
        storage.create_graph(ex("g2").as_ref().into())?;
        let graph_names = storage
            .graph_names()
            .collect::<Result<FxHashSet<_>, _>>()?;
        assert_eq!(
            graph_names,
            [GraphName::from(ex("g1")), GraphName::from(ex("g2"))]
                .into_iter()
                .collect()
        );
        assert_eq!(storage.dirty_graphs()?, vec![GraphName::from(ex("g2"))]);
        Ok(())
    }

    #[test]
    fn test_flush_without_update_capability() -> Result<(), DatasetError> {
        let provider = MemoryProvider::new().without(ProviderCapability::UpdateGraph);
        let storage = TransactionalStorage::new(provider.clone());
        let g = GraphName::from(ex("g"));
        storage.add_quad(g.as_ref(), triple("1").as_ref())?;
        storage.add_quad(g.as_ref(), triple("2").as_ref())?;
        storage.flush()?;
        storage.remove_quad(g.as_ref(), triple("1").as_ref())?;
        storage.flush()?;
        assert_eq!(
            provider.load_graph(g.as_ref())?.map(|graph| graph.len()),
            Some(1)
        );
        Ok(())
    }
}

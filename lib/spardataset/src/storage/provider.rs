use crate::dataset::{GraphNameIter, TripleIter};
use crate::error::{DatasetError, poison_corruption_error};
use crate::quad::QuadStorage;
use oxrdf::{Graph, GraphName, GraphNameRef, Triple, TripleRef};
use rustc_hash::{FxHashMap, FxHashSet};
use std::iter::once;
use std::sync::{Arc, RwLock};

/// Optional operations of a [`StorageProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProviderCapability {
    /// [`StorageProvider::update_graph`]
    UpdateGraph,
    /// [`StorageProvider::delete_graph`]
    DeleteGraph,
    /// [`StorageProvider::list_graphs`]
    ListGraphs,
}

/// An external store only able to load and save whole graphs, like a remote graph store.
///
/// The optional operations fail with [`DatasetError::NotImplemented`] unless the matching
/// [`ProviderCapability`] is supported.
pub trait StorageProvider: Send + Sync {
    /// Loads a graph. Returns `None` if it does not exist.
    fn load_graph(&self, graph_name: GraphNameRef<'_>) -> Result<Option<Graph>, DatasetError>;

    /// Replaces the content of a graph, creating it if needed.
    fn save_graph(&self, graph_name: GraphNameRef<'_>, graph: &Graph) -> Result<(), DatasetError>;

    /// Adds and removes triples of a graph in a single request.
    fn update_graph(
        &self,
        graph_name: GraphNameRef<'_>,
        additions: &[Triple],
        removals: &[Triple],
    ) -> Result<(), DatasetError> {
        let _ = (graph_name, additions, removals);
        Err(DatasetError::not_implemented("external", "update_graph"))
    }

    fn delete_graph(&self, graph_name: GraphNameRef<'_>) -> Result<(), DatasetError> {
        let _ = graph_name;
        Err(DatasetError::not_implemented("external", "delete_graph"))
    }

    fn list_graphs(&self) -> Result<Vec<GraphName>, DatasetError> {
        Err(DatasetError::not_implemented("external", "list_graphs"))
    }

    fn supports(&self, capability: ProviderCapability) -> bool {
        let _ = capability;
        false
    }

    /// If the provider rejects all writes.
    fn is_read_only(&self) -> bool {
        false
    }
}

/// A [`QuadStorage`] writing each change through to a [`StorageProvider`].
///
/// It does not provide triple pattern lookups so it can't back a queryable dataset on its own.
/// Wrap the provider in a [`TransactionalStorage`](crate::TransactionalStorage) to query it and to batch writes.
pub struct ProviderStorage<P> {
    provider: P,
}

impl<P: StorageProvider> ProviderStorage<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn check_writable(&self) -> Result<(), DatasetError> {
        if self.provider.is_read_only() {
            Err(DatasetError::Unsupported("storage provider is read-only"))
        } else {
            Ok(())
        }
    }
}

impl<P: StorageProvider> QuadStorage for ProviderStorage<P> {
    fn add_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        self.check_writable()?;
        let mut graph = self.provider.load_graph(graph_name)?.unwrap_or_default();
        if !graph.insert(triple) {
            return Ok(false);
        }
        if self.provider.supports(ProviderCapability::UpdateGraph) {
            self.provider
                .update_graph(graph_name, &[triple.into_owned()], &[])?;
        } else {
            self.provider.save_graph(graph_name, &graph)?;
        }
        Ok(true)
    }

    fn remove_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        self.check_writable()?;
        let Some(mut graph) = self.provider.load_graph(graph_name)? else {
            return Ok(false);
        };
        if !graph.remove(triple) {
            return Ok(false);
        }
        if self.provider.supports(ProviderCapability::UpdateGraph) {
            self.provider
                .update_graph(graph_name, &[], &[triple.into_owned()])?;
        } else {
            self.provider.save_graph(graph_name, &graph)?;
        }
        Ok(true)
    }

    fn contains_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        Ok(self
            .provider
            .load_graph(graph_name)?
            .is_some_and(|graph| graph.contains(triple)))
    }

    fn quads(&self, graph_name: GraphNameRef<'_>) -> TripleIter<'_> {
        match self.provider.load_graph(graph_name) {
            Ok(graph) => Box::new(
                graph
                    .into_iter()
                    .flat_map(|graph| graph.iter().map(TripleRef::into_owned).collect::<Vec<_>>())
                    .map(Ok),
            ),
            Err(e) => Box::new(once(Err(e))),
        }
    }

    fn graph_names(&self) -> GraphNameIter<'_> {
        match self.provider.list_graphs() {
            Ok(graph_names) => Box::new(graph_names.into_iter().map(Ok)),
            Err(e) => Box::new(once(Err(e))),
        }
    }

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Ok(self.provider.load_graph(graph_name)?.is_some())
    }

    fn create_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        self.check_writable()?;
        if self.has_graph(graph_name)? {
            return Ok(false);
        }
        self.provider.save_graph(graph_name, &Graph::new())?;
        Ok(true)
    }

    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        self.check_writable()?;
        if !self.has_graph(graph_name)? {
            return Ok(false);
        }
        self.provider.delete_graph(graph_name)?;
        Ok(true)
    }
}

/// A [`StorageProvider`] keeping its graphs in memory.
///
/// Useful as a stand-in for a remote store: the read-only flag and the supported capabilities are configurable.
/// Clones share the same graphs.
#[derive(Clone)]
pub struct MemoryProvider {
    graphs: Arc<RwLock<FxHashMap<GraphName, Graph>>>,
    read_only: bool,
    disabled: FxHashSet<ProviderCapability>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            graphs: Arc::default(),
            read_only: false,
            disabled: FxHashSet::default(),
        }
    }

    /// Rejects all writes.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Stops supporting the given optional operation.
    #[must_use]
    pub fn without(mut self, capability: ProviderCapability) -> Self {
        self.disabled.insert(capability);
        self
    }

    fn check_writable(&self) -> Result<(), DatasetError> {
        if self.read_only {
            Err(DatasetError::Unsupported("storage provider is read-only"))
        } else {
            Ok(())
        }
    }

    fn check_supports(
        &self,
        capability: ProviderCapability,
        operation: &'static str,
    ) -> Result<(), DatasetError> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(DatasetError::not_implemented("in-memory provider", operation))
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageProvider for MemoryProvider {
    fn load_graph(&self, graph_name: GraphNameRef<'_>) -> Result<Option<Graph>, DatasetError> {
        Ok(self
            .graphs
            .read()
            .map_err(poison_corruption_error)?
            .get(&graph_name.into_owned())
            .map(|graph| graph.iter().collect()))
    }

    fn save_graph(&self, graph_name: GraphNameRef<'_>, graph: &Graph) -> Result<(), DatasetError> {
        self.check_writable()?;
        self.graphs
            .write()
            .map_err(poison_corruption_error)?
            .insert(graph_name.into_owned(), graph.iter().collect());
        Ok(())
    }

    fn update_graph(
        &self,
        graph_name: GraphNameRef<'_>,
        additions: &[Triple],
        removals: &[Triple],
    ) -> Result<(), DatasetError> {
        self.check_supports(ProviderCapability::UpdateGraph, "update_graph")?;
        self.check_writable()?;
        let mut graphs = self.graphs.write().map_err(poison_corruption_error)?;
        let graph = graphs.entry(graph_name.into_owned()).or_default();
        for triple in removals {
            graph.remove(triple);
        }
        for triple in additions {
            graph.insert(triple);
        }
        Ok(())
    }

    fn delete_graph(&self, graph_name: GraphNameRef<'_>) -> Result<(), DatasetError> {
        self.check_supports(ProviderCapability::DeleteGraph, "delete_graph")?;
        self.check_writable()?;
        self.graphs
            .write()
            .map_err(poison_corruption_error)?
            .remove(&graph_name.into_owned());
        Ok(())
    }

    fn list_graphs(&self) -> Result<Vec<GraphName>, DatasetError> {
        self.check_supports(ProviderCapability::ListGraphs, "list_graphs")?;
        Ok(self
            .graphs
            .read()
            .map_err(poison_corruption_error)?
            .keys()
            .cloned()
            .collect())
    }

    fn supports(&self, capability: ProviderCapability) -> bool {
        !self.disabled.contains(&capability)
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

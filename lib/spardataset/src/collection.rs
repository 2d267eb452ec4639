use crate::dataset::{GraphIter, GraphNameIter, SparqlDataset};
use crate::error::DatasetError;
use oxrdf::{Graph, GraphNameRef};

/// A collection of named graphs, for consumers working with whole graphs like serializers or diff tools.
pub trait GraphCollection {
    fn contains(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError>;

    /// Returns a copy of a graph. Fails with [`DatasetError::GraphNotFound`] if it does not exist.
    fn get(&self, graph_name: GraphNameRef<'_>) -> Result<Graph, DatasetError>;

    /// Adds a graph to the collection. Returns `true` if no graph with this name existed before.
    ///
    /// If the graph already exists its triples are merged when `merge_if_exists` is set,
    /// otherwise [`DatasetError::GraphAlreadyExists`] is returned.
    fn add(
        &self,
        graph_name: GraphNameRef<'_>,
        graph: &Graph,
        merge_if_exists: bool,
    ) -> Result<bool, DatasetError>;

    /// Removes a graph. Returns `false` if it did not exist.
    fn remove(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError>;

    fn graph_names(&self) -> GraphNameIter<'_>;

    fn graphs(&self) -> GraphIter<'_>;
}

/// The graphs of a [`SparqlDataset`] seen as a [`GraphCollection`].
///
/// Each successful change is followed by a [`flush`](SparqlDataset::flush) of the dataset.
///
/// ```
/// use oxrdf::{Graph, NamedNodeRef, TripleRef};
/// use spardataset::{DatasetGraphCollection, GraphCollection, MemoryQuadStorage, QuadDataset};
///
/// let ex = NamedNodeRef::new("http://example.com")?;
/// let mut graph = Graph::new();
/// graph.insert(TripleRef::new(ex, ex, ex));
///
/// let dataset = QuadDataset::new(MemoryQuadStorage::new()).updatable();
/// let collection = DatasetGraphCollection::new(&dataset);
/// assert!(collection.add(ex.into(), &graph, false)?);
/// assert!(collection.add(ex.into(), &graph, false).is_err());
/// assert!(!collection.add(ex.into(), &graph, true)?);
/// assert_eq!(collection.get(ex.into())?.len(), 1);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct DatasetGraphCollection<'a, D: ?Sized> {
    dataset: &'a D,
}

impl<'a, D: SparqlDataset + ?Sized> DatasetGraphCollection<'a, D> {
    pub fn new(dataset: &'a D) -> Self {
        Self { dataset }
    }

    #[inline]
    pub fn dataset(&self) -> &'a D {
        self.dataset
    }
}

impl<D: SparqlDataset + ?Sized> GraphCollection for DatasetGraphCollection<'_, D> {
    fn contains(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        self.dataset.has_graph(graph_name)
    }

    fn get(&self, graph_name: GraphNameRef<'_>) -> Result<Graph, DatasetError> {
        self.dataset.graph(graph_name)
    }

    fn add(
        &self,
        graph_name: GraphNameRef<'_>,
        graph: &Graph,
        merge_if_exists: bool,
    ) -> Result<bool, DatasetError> {
        let exists = self.dataset.has_graph(graph_name)?;
        if exists && !merge_if_exists {
            return Err(DatasetError::GraphAlreadyExists(graph_name.into_owned()));
        }
        self.dataset.add_graph(graph_name, graph)?;
        self.dataset.flush()?;
        Ok(!exists)
    }

    fn remove(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        if !self.dataset.has_graph(graph_name)? {
            return Ok(false);
        }
        self.dataset.remove_graph(graph_name)?;
        self.dataset.flush()?;
        Ok(true)
    }

    fn graph_names(&self) -> GraphNameIter<'_> {
        self.dataset.graph_names()
    }

    fn graphs(&self) -> GraphIter<'_> {
        self.dataset.graphs()
    }
}

//! Datasets storing whole graphs.

use crate::context::{DefaultGraph, GraphContext};
use crate::dataset::{GraphNameIter, SparqlDataset, TripleIter, graph_triples_for_pattern};
use crate::error::DatasetError;
use oxrdf::{
    Graph, GraphName, GraphNameRef, NamedNode, NamedNodeRef, NamedOrBlankNode, NamedOrBlankNodeRef,
    Term, TermRef, TripleRef,
};
use std::iter::once;
use std::slice;
use std::sync::Arc;

/// A storage of whole graphs.
pub trait GraphStorage: Send + Sync {
    fn graph_names(&self) -> GraphNameIter<'_>;

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError>;

    /// Returns the graph if it exists.
    fn graph(&self, graph_name: GraphNameRef<'_>) -> Result<Option<Arc<Graph>>, DatasetError>;

    /// Adds the triples of `graph` to the graph `graph_name`, creating it if needed.
    fn add_graph(&self, graph_name: GraphNameRef<'_>, graph: &Graph) -> Result<(), DatasetError>;

    /// Returns `false` if the graph did not exist.
    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError>;

    fn contains_triple(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        Ok(self
            .graph(graph_name)?
            .is_some_and(|graph| graph.contains(triple)))
    }

    /// The triples of a graph matching a pattern. Empty if the graph does not exist.
    fn triples_for_pattern(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_> {
        match self.graph(graph_name) {
            Ok(Some(graph)) => Box::new(
                graph_triples_for_pattern(&graph, subject, predicate, object)
                    .into_iter()
                    .map(Ok),
            ),
            Ok(None) => Box::new(std::iter::empty()),
            Err(e) => Box::new(once(Err(e))),
        }
    }

    fn flush(&self) -> Result<(), DatasetError> {
        Ok(())
    }

    fn discard(&self) -> Result<(), DatasetError> {
        Ok(())
    }
}

/// The graph a [`GraphDataset`] lookup is run against.
#[derive(Debug, Clone)]
pub enum ScopedGraph {
    /// The union of all the graphs of the dataset, scanned graph by graph.
    WholeDataset,
    /// A graph loaded when the scope has been entered.
    Graph {
        /// The names of the graphs the graph has been built from.
        graph_names: Vec<GraphName>,
        graph: Arc<Graph>,
    },
}

/// A [`SparqlDataset`] over a [`GraphStorage`].
///
/// Graph selections hold the selected graphs themselves: selecting a single graph shares it
/// with the storage, selecting several graphs builds their union once.
/// A selection is a snapshot: writes done after it has been entered are not visible in it.
///
/// ```
/// use oxrdf::{Graph, GraphName, NamedNodeRef, TripleRef};
/// use spardataset::{GraphDataset, MemoryGraphStorage, SparqlDataset};
///
/// let ex = NamedNodeRef::new("http://example.com/g1")?;
/// let mut graph = Graph::new();
/// graph.insert(TripleRef::new(ex, ex, ex));
/// let dataset = GraphDataset::new(MemoryGraphStorage::new()).updatable();
/// dataset.add_graph(ex.into(), &graph)?;
///
/// let mut context = dataset.context()?;
/// dataset.set_default_graph(&mut context, &[GraphName::from(ex.into_owned())])?;
/// assert_eq!(dataset.triples_with_subject(&context, ex).count(), 1);
/// dataset.reset_default_graph(&mut context)?;
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct GraphDataset<S> {
    storage: S,
    default_graph: DefaultGraph,
    updatable: bool,
}

impl<S: GraphStorage> GraphDataset<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            default_graph: DefaultGraph::Union,
            updatable: false,
        }
    }

    /// Uses the given graph as default graph instead of the union of all graphs.
    #[must_use]
    pub fn with_default_graph(mut self, graph_name: impl Into<GraphName>) -> Self {
        self.default_graph = DefaultGraph::Graph(graph_name.into());
        self
    }

    /// Allows to add and remove graphs.
    #[must_use]
    pub fn updatable(mut self) -> Self {
        self.updatable = true;
        self
    }

    #[inline]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Loads the given graphs. Absent graphs are skipped unless `require_existence` is set.
    fn load(
        &self,
        graph_names: &[GraphName],
        require_existence: bool,
    ) -> Result<ScopedGraph, DatasetError> {
        if let [graph_name] = graph_names {
            let graph = match self.storage.graph(graph_name.as_ref())? {
                Some(graph) => graph,
                None if require_existence => {
                    return Err(DatasetError::GraphNotFound(graph_name.clone()));
                }
                None => Arc::new(Graph::new()),
            };
            return Ok(ScopedGraph::Graph {
                graph_names: graph_names.to_vec(),
                graph,
            });
        }
        let mut union = Graph::new();
        for graph_name in graph_names {
            match self.storage.graph(graph_name.as_ref())? {
                Some(graph) => union.extend(graph.iter()),
                None if require_existence => {
                    return Err(DatasetError::GraphNotFound(graph_name.clone()));
                }
                None => (),
            }
        }
        Ok(ScopedGraph::Graph {
            graph_names: graph_names.to_vec(),
            graph: Arc::new(union),
        })
    }

    fn check_updatable(&self) -> Result<(), DatasetError> {
        if self.updatable {
            Ok(())
        } else {
            Err(DatasetError::IMMUTABLE)
        }
    }

    fn stored_triples_for_pattern(
        &self,
        graph_name: Result<GraphName, DatasetError>,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_> {
        match graph_name {
            Ok(graph_name) => {
                self.storage
                    .triples_for_pattern(graph_name.as_ref(), subject, predicate, object)
            }
            Err(e) => Box::new(once(Err(e))),
        }
    }

    fn scope_graph_names(&self, scope: &ScopedGraph) -> Result<Vec<GraphName>, DatasetError> {
        match scope {
            ScopedGraph::WholeDataset => self.storage.graph_names().collect(),
            ScopedGraph::Graph { graph_names, .. } => Ok(graph_names.clone()),
        }
    }
}

impl<S: GraphStorage> SparqlDataset for GraphDataset<S> {
    type Context = GraphContext<ScopedGraph>;

    fn context(&self) -> Result<Self::Context, DatasetError> {
        Ok(match &self.default_graph {
            DefaultGraph::Union => GraphContext::new(ScopedGraph::WholeDataset),
            DefaultGraph::Graph(graph_name) => GraphContext::with_default(
                ScopedGraph::Graph {
                    graph_names: Vec::new(),
                    graph: Arc::new(Graph::new()),
                },
                self.load(slice::from_ref(graph_name), false)?,
            ),
        })
    }

    fn uses_union_default_graph(&self) -> bool {
        self.default_graph == DefaultGraph::Union
    }

    fn set_active_graph(
        &self,
        context: &mut Self::Context,
        graph_names: &[GraphName],
    ) -> Result<(), DatasetError> {
        let graph = self.load(graph_names, true)?;
        context.push_active(graph);
        Ok(())
    }

    fn clear_active_graph(&self, context: &mut Self::Context) {
        let default = context.current_default().clone();
        context.push_active(default);
    }

    fn set_default_graph(
        &self,
        context: &mut Self::Context,
        graph_names: &[GraphName],
    ) -> Result<(), DatasetError> {
        let graph = self.load(graph_names, false)?;
        context.push_default(graph);
        Ok(())
    }

    fn reset_active_graph(&self, context: &mut Self::Context) -> Result<(), DatasetError> {
        context.pop_active()?;
        Ok(())
    }

    fn reset_default_graph(&self, context: &mut Self::Context) -> Result<(), DatasetError> {
        context.pop_default()?;
        Ok(())
    }

    fn active_graph_names(&self, context: &Self::Context) -> Result<Vec<GraphName>, DatasetError> {
        match context.current_active() {
            Some(scope) => self.scope_graph_names(scope),
            None => Ok(Vec::new()),
        }
    }

    fn default_graph_names(
        &self,
        context: &Self::Context,
    ) -> Result<Vec<GraphName>, DatasetError> {
        self.scope_graph_names(context.current_default())
    }

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        self.storage.has_graph(graph_name)
    }

    fn graph(&self, graph_name: GraphNameRef<'_>) -> Result<Graph, DatasetError> {
        self.storage
            .graph(graph_name)?
            .map(|graph| graph.iter().collect())
            .ok_or_else(|| DatasetError::GraphNotFound(graph_name.into_owned()))
    }

    fn add_graph(&self, graph_name: GraphNameRef<'_>, graph: &Graph) -> Result<(), DatasetError> {
        self.check_updatable()?;
        self.storage.add_graph(graph_name, graph)
    }

    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<(), DatasetError> {
        self.check_updatable()?;
        self.storage.remove_graph(graph_name)?;
        Ok(())
    }

    fn graph_names(&self) -> GraphNameIter<'_> {
        self.storage.graph_names()
    }

    fn contains_triple(
        &self,
        context: &Self::Context,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        match context
            .current_active()
            .unwrap_or_else(|| context.current_default())
        {
            ScopedGraph::Graph { graph, .. } => Ok(graph.contains(triple)),
            ScopedGraph::WholeDataset => {
                for graph_name in self.storage.graph_names() {
                    if self.storage.contains_triple(graph_name?.as_ref(), triple)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn triples_for_pattern(
        &self,
        context: &Self::Context,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_> {
        match context
            .current_active()
            .unwrap_or_else(|| context.current_default())
        {
            ScopedGraph::Graph { graph, .. } => Box::new(
                graph_triples_for_pattern(graph, subject, predicate, object)
                    .into_iter()
                    .map(Ok),
            ),
            ScopedGraph::WholeDataset => {
                let subject = subject.map(NamedOrBlankNodeRef::into_owned);
                let predicate = predicate.map(NamedNodeRef::into_owned);
                let object = object.map(TermRef::into_owned);
                Box::new(
                    self.storage
                        .graph_names()
                        .flat_map(move |graph_name| {
                            self.stored_triples_for_pattern(
                                graph_name,
                                subject.as_ref().map(NamedOrBlankNode::as_ref),
                                predicate.as_ref().map(NamedNode::as_ref),
                                object.as_ref().map(Term::as_ref),
                            )
                        }),
                )
            }
        }
    }

    fn flush(&self) -> Result<(), DatasetError> {
        self.storage.flush()
    }

    fn discard(&self) -> Result<(), DatasetError> {
        self.storage.discard()
    }
}

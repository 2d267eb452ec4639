//! Datasets storing quads, without materializing whole graphs.

use crate::context::{DefaultGraph, GraphContext, GraphSelection};
use crate::dataset::{GraphNameIter, SparqlDataset, TripleIter};
use crate::error::DatasetError;
use crate::view::QuadGraphView;
use oxrdf::{
    Graph, GraphName, GraphNameRef, NamedNode, NamedNodeRef, NamedOrBlankNode,
    NamedOrBlankNodeRef, Term, TermRef, TripleRef,
};
use std::iter::once;

/// A storage of quads.
///
/// Each method takes the name of the graph it operates on. Implementations may be remote
/// or persistent: all methods are fallible.
pub trait QuadStorage: Send + Sync {
    /// Adds a triple to a graph, creating the graph if needed. Returns `true` if the triple was not already there.
    fn add_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError>;

    /// Removes a triple from a graph. Returns `true` if the triple was there.
    fn remove_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError>;

    fn contains_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError>;

    /// All the triples of a graph. Empty if the graph does not exist.
    fn quads(&self, graph_name: GraphNameRef<'_>) -> TripleIter<'_>;

    /// The names of all the graphs of the storage, including the default graph if it exists.
    fn graph_names(&self) -> GraphNameIter<'_>;

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError>;

    /// Creates an empty graph. Returns `false` if the graph already exists.
    fn create_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError>;

    /// Removes a graph and all its triples. Returns `false` if the graph did not exist.
    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError>;

    fn flush(&self) -> Result<(), DatasetError> {
        Ok(())
    }

    fn discard(&self) -> Result<(), DatasetError> {
        Ok(())
    }
}

/// A [`QuadStorage`] able to answer triple pattern lookups inside of a graph.
///
/// Storages that can only load or save whole graphs do not implement this trait and so can't be queried by a [`QuadDataset`].
pub trait PatternQuadStorage: QuadStorage {
    fn quads_with_subject(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: NamedOrBlankNodeRef<'_>,
    ) -> TripleIter<'_>;

    fn quads_with_predicate(
        &self,
        graph_name: GraphNameRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> TripleIter<'_>;

    fn quads_with_object(&self, graph_name: GraphNameRef<'_>, object: TermRef<'_>)
    -> TripleIter<'_>;

    fn quads_with_subject_predicate(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: NamedOrBlankNodeRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> TripleIter<'_>;

    fn quads_with_subject_object(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: NamedOrBlankNodeRef<'_>,
        object: TermRef<'_>,
    ) -> TripleIter<'_>;

    fn quads_with_predicate_object(
        &self,
        graph_name: GraphNameRef<'_>,
        predicate: NamedNodeRef<'_>,
        object: TermRef<'_>,
    ) -> TripleIter<'_>;

    /// Dispatches a pattern to the most specific lookup.
    fn quads_for_pattern(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_> {
        match subject {
            Some(subject) => match predicate {
                Some(predicate) => match object {
                    Some(object) => {
                        let triple = TripleRef::new(subject, predicate, object);
                        match self.contains_quad(graph_name, triple) {
                            Ok(true) => Box::new(once(Ok(triple.into_owned()))),
                            Ok(false) => Box::new(std::iter::empty()),
                            Err(e) => Box::new(once(Err(e))),
                        }
                    }
                    None => self.quads_with_subject_predicate(graph_name, subject, predicate),
                },
                None => match object {
                    Some(object) => self.quads_with_subject_object(graph_name, subject, object),
                    None => self.quads_with_subject(graph_name, subject),
                },
            },
            None => match predicate {
                Some(predicate) => match object {
                    Some(object) => self.quads_with_predicate_object(graph_name, predicate, object),
                    None => self.quads_with_predicate(graph_name, predicate),
                },
                None => match object {
                    Some(object) => self.quads_with_object(graph_name, object),
                    None => self.quads(graph_name),
                },
            },
        }
    }
}

/// A [`SparqlDataset`] over a [`QuadStorage`].
///
/// Graph selections are sets of graph names resolved against the storage at lookup time.
/// By default the default graph is the union of all the graphs and the dataset can't be modified.
///
/// ```
/// use oxrdf::{GraphName, NamedNodeRef, TripleRef};
/// use spardataset::{MemoryQuadStorage, QuadDataset, SparqlDataset};
///
/// let ex = NamedNodeRef::new("http://example.com/g1")?;
/// let dataset = QuadDataset::new(MemoryQuadStorage::new()).updatable();
/// dataset.add_quad(ex.into(), TripleRef::new(ex, ex, ex))?;
///
/// let mut context = dataset.context()?;
/// dataset.set_active_graph(&mut context, &[GraphName::from(ex.into_owned())])?;
/// assert_eq!(dataset.triples(&context).count(), 1);
/// dataset.reset_active_graph(&mut context)?;
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct QuadDataset<S> {
    storage: S,
    default_graph: DefaultGraph,
    updatable: bool,
}

impl<S: QuadStorage> QuadDataset<S> {
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

    /// Allows to add and remove graphs and triples.
    #[must_use]
    pub fn updatable(mut self) -> Self {
        self.updatable = true;
        self
    }

    #[inline]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[inline]
    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    /// A view on one of the graphs of the dataset.
    pub fn graph_view(&self, graph_name: impl Into<GraphName>) -> QuadGraphView<'_, S> {
        QuadGraphView::new(self, graph_name.into())
    }

    /// Adds a triple to a graph. Fails with [`DatasetError::Unsupported`] if the dataset is not updatable.
    pub fn add_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        self.check_updatable()?;
        self.storage.add_quad(graph_name, triple)
    }

    /// Removes a triple from a graph. Fails with [`DatasetError::Unsupported`] if the dataset is not updatable.
    pub fn remove_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        self.check_updatable()?;
        self.storage.remove_quad(graph_name, triple)
    }

    pub fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        self.storage.has_graph(graph_name)
    }

    pub fn graph(&self, graph_name: GraphNameRef<'_>) -> Result<Graph, DatasetError> {
        if !self.storage.has_graph(graph_name)? {
            return Err(DatasetError::GraphNotFound(graph_name.into_owned()));
        }
        self.storage.quads(graph_name).collect()
    }

    pub fn add_graph(
        &self,
        graph_name: GraphNameRef<'_>,
        graph: &Graph,
    ) -> Result<(), DatasetError> {
        self.check_updatable()?;
        self.storage.create_graph(graph_name)?;
        for triple in graph {
            self.storage.add_quad(graph_name, triple)?;
        }
        Ok(())
    }

    pub fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<(), DatasetError> {
        self.check_updatable()?;
        self.storage.remove_graph(graph_name)?;
        Ok(())
    }

    pub fn graph_names(&self) -> GraphNameIter<'_> {
        self.storage.graph_names()
    }

    fn check_updatable(&self) -> Result<(), DatasetError> {
        if self.updatable {
            Ok(())
        } else {
            Err(DatasetError::IMMUTABLE)
        }
    }

    fn resolve(&self, selection: &GraphSelection) -> Result<Vec<GraphName>, DatasetError> {
        match selection {
            GraphSelection::AllGraphs => self.storage.graph_names().collect(),
            GraphSelection::Graphs(graph_names) => Ok(graph_names.clone()),
        }
    }

    /// The graphs lookups run against: the active graph if set, the default graph otherwise.
    fn queried_graph_names(
        &self,
        context: &GraphContext<GraphSelection>,
    ) -> Result<Vec<GraphName>, DatasetError> {
        self.resolve(
            context
                .current_active()
                .unwrap_or_else(|| context.current_default()),
        )
    }
}

impl<S: PatternQuadStorage> SparqlDataset for QuadDataset<S> {
    type Context = GraphContext<GraphSelection>;

    fn context(&self) -> Result<Self::Context, DatasetError> {
        Ok(GraphContext::from_default_graph(&self.default_graph))
    }

    fn uses_union_default_graph(&self) -> bool {
        self.default_graph == DefaultGraph::Union
    }

    fn set_active_graph(
        &self,
        context: &mut Self::Context,
        graph_names: &[GraphName],
    ) -> Result<(), DatasetError> {
        for graph_name in graph_names {
            if !self.storage.has_graph(graph_name.as_ref())? {
                return Err(DatasetError::GraphNotFound(graph_name.clone()));
            }
        }
        context.push_active(GraphSelection::Graphs(graph_names.to_vec()));
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
        context.push_default(GraphSelection::Graphs(graph_names.to_vec()));
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
            Some(selection) => self.resolve(selection),
            None => Ok(Vec::new()),
        }
    }

    fn default_graph_names(
        &self,
        context: &Self::Context,
    ) -> Result<Vec<GraphName>, DatasetError> {
        self.resolve(context.current_default())
    }

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Self::has_graph(self, graph_name)
    }

    fn graph(&self, graph_name: GraphNameRef<'_>) -> Result<Graph, DatasetError> {
        Self::graph(self, graph_name)
    }

    fn add_graph(&self, graph_name: GraphNameRef<'_>, graph: &Graph) -> Result<(), DatasetError> {
        Self::add_graph(self, graph_name, graph)
    }

    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<(), DatasetError> {
        Self::remove_graph(self, graph_name)
    }

    fn graph_names(&self) -> GraphNameIter<'_> {
        Self::graph_names(self)
    }

    fn contains_triple(
        &self,
        context: &Self::Context,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        for graph_name in self.queried_graph_names(context)? {
            if self.storage.contains_quad(graph_name.as_ref(), triple)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn triples_for_pattern(
        &self,
        context: &Self::Context,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_> {
        let graph_names = match self.queried_graph_names(context) {
            Ok(graph_names) => graph_names,
            Err(e) => return Box::new(once(Err(e))),
        };
        let subject = subject.map(NamedOrBlankNodeRef::into_owned);
        let predicate = predicate.map(NamedNodeRef::into_owned);
        let object = object.map(TermRef::into_owned);
        Box::new(graph_names.into_iter().flat_map(move |graph_name| {
            self.storage.quads_for_pattern(
                graph_name.as_ref(),
                subject.as_ref().map(NamedOrBlankNode::as_ref),
                predicate.as_ref().map(NamedNode::as_ref),
                object.as_ref().map(Term::as_ref),
            )
        }))
    }

    fn flush(&self) -> Result<(), DatasetError> {
        self.storage.flush()
    }

    fn discard(&self) -> Result<(), DatasetError> {
        self.storage.discard()
    }
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use crate::context::GraphScope;
    use crate::storage::MemoryQuadStorage;
    use oxrdf::Triple;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn dataset() -> Result<QuadDataset<MemoryQuadStorage>, DatasetError> {
        let storage = MemoryQuadStorage::new();
        storage.add_quad(
            ex("g1").as_ref().into(),
            Triple::new(ex("a"), ex("p"), ex("b")).as_ref(),
        )?;
        storage.add_quad(
            ex("g2").as_ref().into(),
            Triple::new(ex("c"), ex("p"), ex("d")).as_ref(),
        )?;
        Ok(QuadDataset::new(storage))
    }

    #[test]
    fn test_failed_set_active_graph_leaves_the_context_untouched() -> Result<(), DatasetError> {
        let dataset = dataset()?;
        let mut context = dataset.context()?;
        assert!(matches!(
            dataset.set_active_graph(&mut context, &[ex("g1").into(), ex("missing").into()]),
            Err(DatasetError::GraphNotFound(_))
        ));
        assert_eq!(context.depth(GraphScope::Active), 0);
        assert_eq!(dataset.triples(&context).count(), 2);
        Ok(())
    }

    #[test]
    fn test_clear_active_graph_uses_the_current_default() -> Result<(), DatasetError> {
        let dataset = dataset()?;
        let mut context = dataset.context()?;
        dataset.set_default_graph(&mut context, &[ex("g2").into()])?;
        dataset.set_active_graph(&mut context, &[ex("g1").into()])?;
        dataset.clear_active_graph(&mut context);
        assert_eq!(dataset.active_graph_names(&context)?, vec![GraphName::from(ex("g2"))]);
        assert!(!dataset.contains_triple(
            &context,
            Triple::new(ex("a"), ex("p"), ex("b")).as_ref()
        )?);
        dataset.reset_active_graph(&mut context)?;
        assert_eq!(dataset.active_graph_names(&context)?, vec![GraphName::from(ex("g1"))]);
        Ok(())
    }

    #[test]
    fn test_empty_active_graph_matches_nothing() -> Result<(), DatasetError> {
        let dataset = dataset()?;
        let mut context = dataset.context()?;
        dataset.set_active_graph(&mut context, &[])?;
        assert!(!dataset.has_triples(&context)?);
        dataset.reset_active_graph(&mut context)?;
        assert!(dataset.has_triples(&context)?);
        Ok(())
    }

    #[test]
    fn test_graph_materialization() -> Result<(), DatasetError> {
        let dataset = dataset()?;
        assert_eq!(dataset.graph(ex("g1").as_ref().into())?.len(), 1);
        assert!(matches!(
            dataset.graph(ex("missing").as_ref().into()),
            Err(DatasetError::GraphNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_add_graph_creates_empty_graphs() -> Result<(), DatasetError> {
        let dataset = QuadDataset::new(MemoryQuadStorage::new()).updatable();
        dataset.add_graph(ex("g").as_ref().into(), &Graph::new())?;
        assert!(dataset.has_graph(ex("g").as_ref().into())?);
        assert_eq!(dataset.graph(ex("g").as_ref().into())?.len(), 0);
        dataset.remove_graph(ex("g").as_ref().into())?;
        assert!(!dataset.has_graph(ex("g").as_ref().into())?);
        Ok(())
    }
}

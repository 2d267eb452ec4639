use crate::error::DatasetError;
use oxrdf::{
    Graph, GraphName, GraphNameRef, NamedNodeRef, NamedOrBlankNodeRef, TermRef, Triple, TripleRef,
};

/// An iterator over the triples returned by a dataset lookup.
pub type TripleIter<'a> = Box<dyn Iterator<Item = Result<Triple, DatasetError>> + 'a>;

/// An iterator over the names of the graphs of a dataset.
pub type GraphNameIter<'a> = Box<dyn Iterator<Item = Result<GraphName, DatasetError>> + 'a>;

/// An iterator over the graphs of a dataset, materialized one at a time.
pub type GraphIter<'a> = Box<dyn Iterator<Item = Result<(GraphName, Graph), DatasetError>> + 'a>;

/// A dataset a SPARQL evaluator can read from.
///
/// Graph scoping is not stored in the dataset itself: every evaluation gets its own
/// [`Context`](Self::Context) from [`context`](Self::context) and passes it to the scoping and lookup methods.
/// One dataset can so be shared between concurrent evaluations.
///
/// The `set_*` methods must be paired with the matching `reset_*` method when the evaluator leaves the scope.
pub trait SparqlDataset {
    /// Per-evaluation graph scoping state.
    type Context;

    /// Builds a fresh scoping state, initialized with the dataset default graph configuration.
    fn context(&self) -> Result<Self::Context, DatasetError>;

    /// If the default graph is the union of all the graphs when no default graph has been selected.
    fn uses_union_default_graph(&self) -> bool;

    /// Enters a `GRAPH` scope over the given graphs.
    ///
    /// Fails with [`DatasetError::GraphNotFound`] if one of the graphs does not exist.
    /// The context is left untouched on failure.
    /// An empty list selects nothing: all lookups return no results until the matching reset.
    fn set_active_graph(
        &self,
        context: &mut Self::Context,
        graph_names: &[GraphName],
    ) -> Result<(), DatasetError>;

    /// Enters a scope where the active graph is the current default graph.
    fn clear_active_graph(&self, context: &mut Self::Context);

    /// Selects the default graph. Graphs that do not exist are not an error.
    fn set_default_graph(
        &self,
        context: &mut Self::Context,
        graph_names: &[GraphName],
    ) -> Result<(), DatasetError>;

    /// Restores the active graph in effect before the last [`set_active_graph`](Self::set_active_graph) or [`clear_active_graph`](Self::clear_active_graph).
    fn reset_active_graph(&self, context: &mut Self::Context) -> Result<(), DatasetError>;

    /// Restores the default graph in effect before the last [`set_default_graph`](Self::set_default_graph).
    fn reset_default_graph(&self, context: &mut Self::Context) -> Result<(), DatasetError>;

    /// The names of the graphs in the active scope, empty if no active graph is set.
    fn active_graph_names(&self, context: &Self::Context) -> Result<Vec<GraphName>, DatasetError>;

    /// The names of the graphs the default graph is built from.
    fn default_graph_names(&self, context: &Self::Context)
    -> Result<Vec<GraphName>, DatasetError>;

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError>;

    /// Returns a copy of the given graph.
    ///
    /// Fails with [`DatasetError::GraphNotFound`] if the graph does not exist.
    fn graph(&self, graph_name: GraphNameRef<'_>) -> Result<Graph, DatasetError>;

    /// Adds the triples of `graph` to the graph `graph_name`, creating it if needed.
    fn add_graph(&self, graph_name: GraphNameRef<'_>, graph: &Graph) -> Result<(), DatasetError>;

    /// Removes a graph and all its triples. Removing a graph that does not exist is a no-op.
    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<(), DatasetError>;

    fn graph_names(&self) -> GraphNameIter<'_>;

    fn graphs(&self) -> GraphIter<'_> {
        Box::new(self.graph_names().map(move |graph_name| {
            let graph_name = graph_name?;
            let graph = self.graph(graph_name.as_ref())?;
            Ok((graph_name, graph))
        }))
    }

    /// Checks if the triple is in the active graph or, if none is set, in the default graph.
    fn contains_triple(
        &self,
        context: &Self::Context,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError>;

    /// Retrieves the triples matching the given pattern in the active graph or, if none is set, in the default graph.
    ///
    /// The returned iterator does not borrow the context: the evaluator is free to change
    /// the graph scope while consuming it.
    fn triples_for_pattern(
        &self,
        context: &Self::Context,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_>;

    fn has_triples(&self, context: &Self::Context) -> Result<bool, DatasetError> {
        Ok(self.triples(context).next().transpose()?.is_some())
    }

    fn triples(&self, context: &Self::Context) -> TripleIter<'_> {
        self.triples_for_pattern(context, None, None, None)
    }

    fn triples_with_subject<'a>(
        &self,
        context: &Self::Context,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
    ) -> TripleIter<'_> {
        self.triples_for_pattern(context, Some(subject.into()), None, None)
    }

    fn triples_with_predicate<'a>(
        &self,
        context: &Self::Context,
        predicate: impl Into<NamedNodeRef<'a>>,
    ) -> TripleIter<'_> {
        self.triples_for_pattern(context, None, Some(predicate.into()), None)
    }

    fn triples_with_object<'a>(
        &self,
        context: &Self::Context,
        object: impl Into<TermRef<'a>>,
    ) -> TripleIter<'_> {
        self.triples_for_pattern(context, None, None, Some(object.into()))
    }

    fn triples_with_subject_predicate<'a>(
        &self,
        context: &Self::Context,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        predicate: impl Into<NamedNodeRef<'a>>,
    ) -> TripleIter<'_> {
        self.triples_for_pattern(context, Some(subject.into()), Some(predicate.into()), None)
    }

    fn triples_with_subject_object<'a>(
        &self,
        context: &Self::Context,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        object: impl Into<TermRef<'a>>,
    ) -> TripleIter<'_> {
        self.triples_for_pattern(context, Some(subject.into()), None, Some(object.into()))
    }

    fn triples_with_predicate_object<'a>(
        &self,
        context: &Self::Context,
        predicate: impl Into<NamedNodeRef<'a>>,
        object: impl Into<TermRef<'a>>,
    ) -> TripleIter<'_> {
        self.triples_for_pattern(context, None, Some(predicate.into()), Some(object.into()))
    }

    /// Commits the pending changes of the underlying storage. A no-op for storages without pending changes.
    fn flush(&self) -> Result<(), DatasetError> {
        Ok(())
    }

    /// Drops the pending changes of the underlying storage. A no-op for storages without pending changes.
    fn discard(&self) -> Result<(), DatasetError> {
        Ok(())
    }
}

/// Checks if a triple matches a pattern.
#[inline]
pub(crate) fn triple_matches(
    triple: TripleRef<'_>,
    subject: Option<NamedOrBlankNodeRef<'_>>,
    predicate: Option<NamedNodeRef<'_>>,
    object: Option<TermRef<'_>>,
) -> bool {
    subject.is_none_or(|s| triple.subject == s)
        && predicate.is_none_or(|p| triple.predicate == p)
        && object.is_none_or(|o| triple.object == o)
}

/// Retrieves the triples of a graph matching a pattern, using the graph indexes.
pub(crate) fn graph_triples_for_pattern(
    graph: &Graph,
    subject: Option<NamedOrBlankNodeRef<'_>>,
    predicate: Option<NamedNodeRef<'_>>,
    object: Option<TermRef<'_>>,
) -> Vec<Triple> {
    let matching = |triple: &TripleRef<'_>| triple_matches(*triple, subject, predicate, object);
    if let Some(subject) = subject {
        graph
            .triples_for_subject(subject)
            .filter(matching)
            .map(TripleRef::into_owned)
            .collect()
    } else if let Some(object) = object {
        graph
            .triples_for_object(object)
            .filter(matching)
            .map(TripleRef::into_owned)
            .collect()
    } else if let Some(predicate) = predicate {
        graph
            .triples_for_predicate(predicate)
            .map(TripleRef::into_owned)
            .collect()
    } else {
        graph.iter().map(TripleRef::into_owned).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Literal, NamedNode};

    #[test]
    fn test_graph_triples_for_pattern() {
        let s = NamedNode::new_unchecked("http://example.com/s");
        let p = NamedNode::new_unchecked("http://example.com/p");
        let q = NamedNode::new_unchecked("http://example.com/q");
        let o = Literal::from("o");
        let mut graph = Graph::new();
        graph.insert(TripleRef::new(s.as_ref(), p.as_ref(), o.as_ref()));
        graph.insert(TripleRef::new(s.as_ref(), q.as_ref(), o.as_ref()));
        graph.insert(TripleRef::new(p.as_ref(), p.as_ref(), s.as_ref()));

        assert_eq!(
            graph_triples_for_pattern(&graph, Some(s.as_ref().into()), None, None).len(),
            2
        );
        assert_eq!(
            graph_triples_for_pattern(&graph, None, Some(p.as_ref()), None).len(),
            2
        );
        assert_eq!(
            graph_triples_for_pattern(&graph, None, Some(q.as_ref()), Some(o.as_ref().into())),
            vec![Triple::new(s.clone(), q.clone(), o.clone())]
        );
        assert_eq!(
            graph_triples_for_pattern(
                &graph,
                Some(p.as_ref().into()),
                Some(q.as_ref()),
                None
            ),
            Vec::new()
        );
        assert_eq!(graph_triples_for_pattern(&graph, None, None, None).len(), 3);
    }
}

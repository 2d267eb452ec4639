//! Per-evaluation graph scoping state.
//!
//! A SPARQL evaluator switches the graph it reads from when it enters a `GRAPH` clause
//! and restores the previous one when it leaves it. [`GraphContext`] records these
//! selections as two stacks, one for the default graph and one for the active graph.
//!
//! A context is owned by a single query evaluation and passed by reference to the dataset,
//! so concurrent evaluations sharing one dataset never observe each other's selections.

use crate::error::DatasetError;
use oxrdf::GraphName;
use std::fmt;
use tracing::trace;

/// The two graph selections tracked by a [`GraphContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphScope {
    /// The graph queried when no `GRAPH` clause is in scope.
    Default,
    /// The graph selected by the innermost `GRAPH` clause.
    Active,
}

impl fmt::Display for GraphScope {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Active => "active",
        })
    }
}

/// How a dataset builds its default graph when no explicit default graph selection is in scope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DefaultGraph {
    /// The default graph is the union of all the graphs of the dataset.
    #[default]
    Union,
    /// The default graph is a single graph of the dataset, possibly the unnamed one.
    Graph(GraphName),
}

/// A set of graphs selected by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphSelection {
    /// All the graphs of the dataset, resolved when the selection is read.
    AllGraphs,
    /// An explicit list of graphs. An empty list matches nothing.
    Graphs(Vec<GraphName>),
}


/// Stacks of default and active graph selections.
///
/// `T` is the selection representation of the dataset: graph names for quad datasets,
/// materialized graphs for graph datasets.
///
/// ```
/// use spardataset::{DatasetError, GraphContext, GraphScope};
///
/// let mut context = GraphContext::new("union");
/// context.push_active("g1");
/// context.push_active("g2");
/// assert_eq!(context.current_active(), Some(&"g2"));
/// context.pop_active()?;
/// assert_eq!(context.current_active(), Some(&"g1"));
/// context.pop_active()?;
/// assert_eq!(context.current_active(), None);
/// assert!(matches!(
///     context.pop_active(),
///     Err(DatasetError::StackUnderflow(GraphScope::Active))
/// ));
/// assert_eq!(context.current_default(), &"union");
/// # Result::<_, DatasetError>::Ok(())
/// ```
#[derive(Debug, Clone)]
pub struct GraphContext<T> {
    base_default: T,
    defaults: Vec<T>,
    actives: Vec<T>,
}

impl<T> GraphContext<T> {
    /// Builds a context with empty stacks. `base_default` is returned by [`current_default`](Self::current_default) while the default stack is empty.
    #[inline]
    pub fn new(base_default: T) -> Self {
        Self {
            base_default,
            defaults: Vec::new(),
            actives: Vec::new(),
        }
    }

    #[inline]
    pub fn push_default(&mut self, selection: T) {
        self.defaults.push(selection);
        trace!(depth = self.defaults.len(), "default graph pushed");
    }

    pub fn pop_default(&mut self) -> Result<T, DatasetError> {
        let selection = self
            .defaults
            .pop()
            .ok_or(DatasetError::StackUnderflow(GraphScope::Default))?;
        trace!(depth = self.defaults.len(), "default graph restored");
        Ok(selection)
    }

    #[inline]
    pub fn push_active(&mut self, selection: T) {
        self.actives.push(selection);
        trace!(depth = self.actives.len(), "active graph pushed");
    }

    pub fn pop_active(&mut self) -> Result<T, DatasetError> {
        let selection = self
            .actives
            .pop()
            .ok_or(DatasetError::StackUnderflow(GraphScope::Active))?;
        trace!(depth = self.actives.len(), "active graph restored");
        Ok(selection)
    }

    /// Builds a context with the given default graph selection already pushed.
    ///
    /// Resetting the default graph once then falls back to `base_default`.
    pub fn with_default(base_default: T, default: T) -> Self {
        let mut context = Self::new(base_default);
        context.push_default(default);
        context
    }

    /// The innermost default graph selection, or the dataset fallback if none has been pushed.
    #[inline]
    pub fn current_default(&self) -> &T {
        self.defaults.last().unwrap_or(&self.base_default)
    }

    /// The innermost active graph selection.
    ///
    /// `None` means that no `GRAPH` clause is in scope and the default graph should be used.
    #[inline]
    pub fn current_active(&self) -> Option<&T> {
        self.actives.last()
    }

    /// Number of selections pushed on the stack of the given scope.
    #[inline]
    pub fn depth(&self, scope: GraphScope) -> usize {
        match scope {
            GraphScope::Default => self.defaults.len(),
            GraphScope::Active => self.actives.len(),
        }
    }
}

impl GraphContext<GraphSelection> {
    /// The initial context of a dataset with the given default graph configuration.
    ///
    /// In union mode nothing is pushed and the default graph is all the graphs.
    /// Otherwise the configured graph is pushed over an empty selection.
    pub fn from_default_graph(default_graph: &DefaultGraph) -> Self {
        match default_graph {
            DefaultGraph::Union => Self::new(GraphSelection::AllGraphs),
            DefaultGraph::Graph(graph_name) => Self::with_default(
                GraphSelection::Graphs(Vec::new()),
                GraphSelection::Graphs(vec![graph_name.clone()]),
            ),
        }
    }
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use oxrdf::NamedNode;

    fn graph(iri: &str) -> GraphName {
        NamedNode::new_unchecked(iri).into()
    }

    #[test]
    fn test_configured_default_graph_can_be_reset_once() -> Result<(), DatasetError> {
        let configured = DefaultGraph::Graph(graph("http://example.com/g1"));
        let mut context = GraphContext::from_default_graph(&configured);
        assert_eq!(context.depth(GraphScope::Default), 1);
        assert_eq!(
            context.current_default(),
            &GraphSelection::Graphs(vec![graph("http://example.com/g1")])
        );
        context.push_default(GraphSelection::AllGraphs);
        context.pop_default()?;
        assert_eq!(
            context.current_default(),
            &GraphSelection::Graphs(vec![graph("http://example.com/g1")])
        );
        context.pop_default()?;
        assert_eq!(context.current_default(), &GraphSelection::Graphs(Vec::new()));
        assert!(matches!(
            context.pop_default(),
            Err(DatasetError::StackUnderflow(GraphScope::Default))
        ));
        Ok(())
    }

    #[test]
    fn test_union_default_graph_is_not_pushed() {
        let context = GraphContext::from_default_graph(&DefaultGraph::Union);
        assert_eq!(context.depth(GraphScope::Default), 0);
        assert_eq!(context.current_default(), &GraphSelection::AllGraphs);
    }

    #[test]
    fn test_stacks_are_independent() -> Result<(), DatasetError> {
        let mut context = GraphContext::new(GraphSelection::AllGraphs);
        context.push_active(GraphSelection::Graphs(vec![graph("http://example.com/g1")]));
        assert_eq!(context.depth(GraphScope::Active), 1);
        assert_eq!(context.depth(GraphScope::Default), 0);
        assert_eq!(context.current_default(), &GraphSelection::AllGraphs);
        assert!(context.pop_default().is_err());
        context.pop_active()?;
        assert_eq!(context.current_active(), None);
        Ok(())
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(
            DatasetError::StackUnderflow(GraphScope::Active).to_string(),
            "Unable to reset the active graph since no previous active graph exists"
        );
    }
}

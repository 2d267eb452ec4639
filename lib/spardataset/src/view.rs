use crate::dataset::TripleIter;
use crate::error::DatasetError;
use crate::quad::{PatternQuadStorage, QuadDataset, QuadStorage};
use oxrdf::{Graph, GraphName, NamedNodeRef, NamedOrBlankNodeRef, TermRef, TripleRef};

/// A single graph of a [`QuadDataset`], seen as a set of triples.
///
/// The view holds no data: each call is forwarded to the dataset storage, so the view always
/// reflects the current content of the graph.
///
/// ```
/// use oxrdf::{NamedNodeRef, TripleRef};
/// use spardataset::{MemoryQuadStorage, QuadDataset};
///
/// let ex = NamedNodeRef::new("http://example.com")?;
/// let dataset = QuadDataset::new(MemoryQuadStorage::new()).updatable();
/// let view = dataset.graph_view(ex.into_owned());
/// view.insert(TripleRef::new(ex, ex, ex))?;
/// assert!(view.contains(TripleRef::new(ex, ex, ex))?);
/// assert_eq!(view.len()?, 1);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct QuadGraphView<'a, S> {
    dataset: &'a QuadDataset<S>,
    graph_name: GraphName,
}

impl<'a, S: QuadStorage> QuadGraphView<'a, S> {
    pub(crate) fn new(dataset: &'a QuadDataset<S>, graph_name: GraphName) -> Self {
        Self {
            dataset,
            graph_name,
        }
    }

    #[inline]
    pub fn graph_name(&self) -> &GraphName {
        &self.graph_name
    }

    pub fn contains(&self, triple: TripleRef<'_>) -> Result<bool, DatasetError> {
        self.dataset
            .storage()
            .contains_quad(self.graph_name.as_ref(), triple)
    }

    /// Counts the triples of the graph. Walks the whole graph.
    pub fn len(&self) -> Result<usize, DatasetError> {
        self.iter().try_fold(0, |count, triple| {
            triple?;
            Ok(count + 1)
        })
    }

    pub fn is_empty(&self) -> Result<bool, DatasetError> {
        Ok(self.iter().next().transpose()?.is_none())
    }

    /// Adds a triple, see [`QuadDataset::add_quad`].
    pub fn insert(&self, triple: TripleRef<'_>) -> Result<bool, DatasetError> {
        self.dataset.add_quad(self.graph_name.as_ref(), triple)
    }

    /// Removes a triple, see [`QuadDataset::remove_quad`].
    pub fn remove(&self, triple: TripleRef<'_>) -> Result<bool, DatasetError> {
        self.dataset.remove_quad(self.graph_name.as_ref(), triple)
    }

    pub fn iter(&self) -> TripleIter<'a> {
        self.dataset.storage().quads(self.graph_name.as_ref())
    }

    /// Copies the triples of the graph into an in-memory [`Graph`].
    pub fn to_graph(&self) -> Result<Graph, DatasetError> {
        self.iter().collect()
    }
}

impl<'a, S: PatternQuadStorage> QuadGraphView<'a, S> {
    pub fn triples_with_subject<'b>(
        &self,
        subject: impl Into<NamedOrBlankNodeRef<'b>>,
    ) -> TripleIter<'a> {
        self.dataset
            .storage()
            .quads_with_subject(self.graph_name.as_ref(), subject.into())
    }

    pub fn triples_with_predicate<'b>(
        &self,
        predicate: impl Into<NamedNodeRef<'b>>,
    ) -> TripleIter<'a> {
        self.dataset
            .storage()
            .quads_with_predicate(self.graph_name.as_ref(), predicate.into())
    }

    pub fn triples_with_object<'b>(&self, object: impl Into<TermRef<'b>>) -> TripleIter<'a> {
        self.dataset
            .storage()
            .quads_with_object(self.graph_name.as_ref(), object.into())
    }

    pub fn triples_with_subject_predicate<'b>(
        &self,
        subject: impl Into<NamedOrBlankNodeRef<'b>>,
        predicate: impl Into<NamedNodeRef<'b>>,
    ) -> TripleIter<'a> {
        self.dataset.storage().quads_with_subject_predicate(
            self.graph_name.as_ref(),
            subject.into(),
            predicate.into(),
        )
    }

    pub fn triples_with_subject_object<'b>(
        &self,
        subject: impl Into<NamedOrBlankNodeRef<'b>>,
        object: impl Into<TermRef<'b>>,
    ) -> TripleIter<'a> {
        self.dataset.storage().quads_with_subject_object(
            self.graph_name.as_ref(),
            subject.into(),
            object.into(),
        )
    }

    pub fn triples_with_predicate_object<'b>(
        &self,
        predicate: impl Into<NamedNodeRef<'b>>,
        object: impl Into<TermRef<'b>>,
    ) -> TripleIter<'a> {
        self.dataset.storage().quads_with_predicate_object(
            self.graph_name.as_ref(),
            predicate.into(),
            object.into(),
        )
    }
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use crate::storage::MemoryQuadStorage;
    use oxrdf::{GraphNameRef, Literal, NamedNode, Triple};

    #[test]
    fn test_view_reflects_storage_writes() -> Result<(), DatasetError> {
        let dataset = QuadDataset::new(MemoryQuadStorage::new()).updatable();
        let g = NamedNode::new_unchecked("http://example.com/g");
        let s = NamedNode::new_unchecked("http://example.com/s");
        let p = NamedNode::new_unchecked("http://example.com/p");
        let view = dataset.graph_view(g.clone());
        assert!(view.is_empty()?);

        dataset.add_quad(
            g.as_ref().into(),
            TripleRef::new(s.as_ref(), p.as_ref(), Literal::from(1).as_ref()),
        )?;
        dataset.add_quad(
            g.as_ref().into(),
            TripleRef::new(s.as_ref(), p.as_ref(), Literal::from(2).as_ref()),
        )?;
        dataset.add_quad(
            GraphNameRef::DefaultGraph,
            TripleRef::new(s.as_ref(), p.as_ref(), Literal::from(3).as_ref()),
        )?;
        assert_eq!(view.len()?, 2);
        assert_eq!(view.triples_with_subject(s.as_ref()).count(), 2);
        assert_eq!(
            view.triples_with_predicate_object(p.as_ref(), Literal::from(2).as_ref())
                .collect::<Result<Vec<_>, _>>()?,
            vec![Triple::new(s.clone(), p.clone(), Literal::from(2))]
        );
        assert_eq!(view.triples_with_object(Literal::from(3).as_ref()).count(), 0);

        assert!(view.remove(TripleRef::new(
            s.as_ref(),
            p.as_ref(),
            Literal::from(1).as_ref()
        ))?);
        assert_eq!(view.to_graph()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_view_lookups_by_predicate() -> Result<(), DatasetError> {
        let storage = MemoryQuadStorage::new();
        let g = NamedNode::new_unchecked("http://example.com/g");
        let s = NamedNode::new_unchecked("http://example.com/s");
        let p = NamedNode::new_unchecked("http://example.com/p");
        let q = NamedNode::new_unchecked("http://example.com/q");
        for triple in [
            Triple::new(s.clone(), p.clone(), Literal::from(1)),
            Triple::new(s.clone(), q.clone(), Literal::from(1)),
            Triple::new(g.clone(), p.clone(), Literal::from(2)),
        ] {
            storage.add_quad(g.as_ref().into(), triple.as_ref())?;
        }
        storage.add_quad(
            GraphNameRef::DefaultGraph,
            TripleRef::new(s.as_ref(), p.as_ref(), Literal::from(1).as_ref()),
        )?;
        let dataset = QuadDataset::new(storage);
        let view = dataset.graph_view(g.clone());

        assert_eq!(view.triples_with_predicate(p.as_ref()).count(), 2);
        assert_eq!(
            view.triples_with_subject_predicate(s.as_ref(), q.as_ref())
                .collect::<Result<Vec<_>, _>>()?,
            vec![Triple::new(s.clone(), q.clone(), Literal::from(1))]
        );
        assert_eq!(
            view.triples_with_subject_object(s.as_ref(), Literal::from(1).as_ref())
                .count(),
            2
        );
        assert_eq!(
            view.triples_with_subject_object(g.as_ref(), Literal::from(1).as_ref())
                .count(),
            0
        );
        Ok(())
    }

    #[test]
    fn test_view_of_immutable_dataset() -> Result<(), DatasetError> {
        let storage = MemoryQuadStorage::new();
        let g = NamedNode::new_unchecked("http://example.com/g");
        let t = Triple::new(g.clone(), g.clone(), g.clone());
        storage.add_quad(g.as_ref().into(), t.as_ref())?;
        let dataset = QuadDataset::new(storage);
        let view = dataset.graph_view(g);
        assert!(matches!(
            view.insert(t.as_ref()),
            Err(DatasetError::Unsupported(_))
        ));
        assert!(view.contains(t.as_ref())?);
        Ok(())
    }
}

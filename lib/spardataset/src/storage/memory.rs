use crate::dataset::{GraphNameIter, TripleIter};
use crate::error::{CorruptionError, DatasetError, poison_corruption_error};
use crate::graph::GraphStorage;
use crate::quad::{PatternQuadStorage, QuadStorage};
use oxrdf::{
    BlankNode, Graph, GraphName, GraphNameRef, NamedNode, NamedNodeRef, NamedOrBlankNode,
    NamedOrBlankNodeRef, Term, TermRef, Triple, TripleRef,
};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::iter::{empty, once};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tracing::debug;

/// Identifier of the default graph in the indexes.
const DEFAULT_GRAPH_ID: u64 = 0;

/// Callback run by [`MemoryQuadStorage::flush`].
pub type FlushHook = Arc<dyn Fn() -> Result<(), DatasetError> + Send + Sync>;

/// In-memory quad storage.
///
/// Terms are interned and quads are indexed in three orders (GSPO, GPOS and GOSP) so that
/// every triple pattern inside a graph is answered by a range scan.
/// A graph starts to exist the first time a quad is inserted into it or when it is explicitly created.
///
/// Clones share the same content. Readers take the read lock for the duration of a single lookup.
///
/// ```
/// use oxrdf::{GraphNameRef, NamedNodeRef, TripleRef};
/// use spardataset::{MemoryQuadStorage, QuadStorage};
///
/// let ex = NamedNodeRef::new("http://example.com")?;
/// let storage = MemoryQuadStorage::new();
/// storage.add_quad(GraphNameRef::NamedNode(ex), TripleRef::new(ex, ex, ex))?;
/// assert!(storage.has_graph(GraphNameRef::NamedNode(ex))?);
/// assert_eq!(storage.quads(GraphNameRef::NamedNode(ex)).count(), 1);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct MemoryQuadStorage {
    content: Arc<RwLock<Content>>,
    flush_hook: Option<FlushHook>,
}

#[derive(Default)]
struct Content {
    id2term: Vec<Term>,
    term2id: FxHashMap<Term, u64>,
    gspo: BTreeSet<[u64; 4]>,
    gpos: BTreeSet<[u64; 4]>,
    gosp: BTreeSet<[u64; 4]>,
    graphs: BTreeSet<u64>,
}

impl MemoryQuadStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a callback run on each [`flush`](QuadStorage::flush), for example to persist a snapshot of the content.
    #[must_use]
    pub fn with_flush_hook(
        mut self,
        hook: impl Fn() -> Result<(), DatasetError> + Send + Sync + 'static,
    ) -> Self {
        self.flush_hook = Some(Arc::new(hook));
        self
    }

    /// Executes a function while holding the exclusive write lock.
    ///
    /// Readers are blocked until the function returns so they see either none or all of its writes.
    /// Writes done before an error are kept.
    pub fn transaction<T, E: From<DatasetError>>(
        &self,
        f: impl FnOnce(&mut MemoryQuadStorageWriter<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut writer = MemoryQuadStorageWriter {
            content: self.content.write().map_err(poison_corruption_error)?,
        };
        f(&mut writer)
    }

    /// Number of quads in the storage.
    pub fn len(&self) -> Result<usize, DatasetError> {
        Ok(self.content.read().map_err(poison_corruption_error)?.gspo.len())
    }

    pub fn is_empty(&self) -> Result<bool, DatasetError> {
        Ok(self.len()? == 0)
    }

    fn lookup(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_> {
        let content = match self.content.read() {
            Ok(content) => content,
            Err(e) => return Box::new(once(Err(poison_corruption_error(e)))),
        };
        let Some(g) = content.graph_id(graph_name) else {
            return Box::new(empty());
        };
        let encode = |term: Option<TermRef<'_>>| match term {
            Some(term) => content.term_id(term).map(Some),
            None => Some(None),
        };
        let (Some(s), Some(p), Some(o)) = (
            encode(subject.map(Into::into)),
            encode(predicate.map(Into::into)),
            encode(object),
        ) else {
            // One of the bound terms has never been inserted
            return Box::new(empty());
        };
        let keys: Vec<[u64; 3]> = match (s, p, o) {
            (Some(s), Some(p), Some(o)) => {
                if content.gspo.contains(&[g, s, p, o]) {
                    vec![[s, p, o]]
                } else {
                    Vec::new()
                }
            }
            (Some(s), Some(p), None) => scan(&content.gspo, &[g, s, p])
                .map(|k| [k[1], k[2], k[3]])
                .collect(),
            (Some(s), None, Some(o)) => scan(&content.gosp, &[g, o, s])
                .map(|k| [k[2], k[3], k[1]])
                .collect(),
            (Some(s), None, None) => scan(&content.gspo, &[g, s])
                .map(|k| [k[1], k[2], k[3]])
                .collect(),
            (None, Some(p), Some(o)) => scan(&content.gpos, &[g, p, o])
                .map(|k| [k[3], k[1], k[2]])
                .collect(),
            (None, Some(p), None) => scan(&content.gpos, &[g, p])
                .map(|k| [k[3], k[1], k[2]])
                .collect(),
            (None, None, Some(o)) => scan(&content.gosp, &[g, o])
                .map(|k| [k[2], k[3], k[1]])
                .collect(),
            (None, None, None) => scan(&content.gspo, &[g])
                .map(|k| [k[1], k[2], k[3]])
                .collect(),
        };
        Box::new(
            keys.into_iter()
                .map(|key| content.decode_triple(key))
                .collect::<Vec<_>>()
                .into_iter(),
        )
    }
}

/// All the keys of an index starting with the given prefix.
fn scan<'a>(set: &'a BTreeSet<[u64; 4]>, prefix: &[u64]) -> impl Iterator<Item = &'a [u64; 4]> {
    let mut start = [u64::MIN; 4];
    let mut end = [u64::MAX; 4];
    start[..prefix.len()].copy_from_slice(prefix);
    end[..prefix.len()].copy_from_slice(prefix);
    set.range(start..=end)
}

impl Content {
    fn term_id(&self, term: TermRef<'_>) -> Option<u64> {
        self.term2id.get(&term.into_owned()).copied()
    }

    fn graph_id(&self, graph_name: GraphNameRef<'_>) -> Option<u64> {
        match graph_name {
            GraphNameRef::NamedNode(graph_name) => self.term_id(graph_name.into()),
            GraphNameRef::BlankNode(graph_name) => self.term_id(graph_name.into()),
            GraphNameRef::DefaultGraph => Some(DEFAULT_GRAPH_ID),
        }
    }

    fn intern(&mut self, term: TermRef<'_>) -> u64 {
        let term = term.into_owned();
        if let Some(id) = self.term2id.get(&term) {
            return *id;
        }
        // Ids start at 1, 0 is the default graph
        let id = self.id2term.len() as u64 + 1;
        self.id2term.push(term.clone());
        self.term2id.insert(term, id);
        id
    }

    fn intern_graph(&mut self, graph_name: GraphNameRef<'_>) -> u64 {
        match graph_name {
            GraphNameRef::NamedNode(graph_name) => self.intern(graph_name.into()),
            GraphNameRef::BlankNode(graph_name) => self.intern(graph_name.into()),
            GraphNameRef::DefaultGraph => DEFAULT_GRAPH_ID,
        }
    }

    fn decode(&self, id: u64) -> Result<&Term, DatasetError> {
        usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|id| self.id2term.get(id))
            .ok_or_else(|| CorruptionError::msg(format!("Unknown term id {id}")).into())
    }

    fn decode_triple(&self, [s, p, o]: [u64; 3]) -> Result<Triple, DatasetError> {
        let subject = match self.decode(s)? {
            Term::NamedNode(node) => NamedOrBlankNode::from(node.clone()),
            Term::BlankNode(node) => NamedOrBlankNode::from(node.clone()),
            _ => {
                return Err(
                    CorruptionError::msg("The subject is not an IRI or a blank node").into(),
                );
            }
        };
        let Term::NamedNode(predicate) = self.decode(p)? else {
            return Err(CorruptionError::msg("The predicate is not an IRI").into());
        };
        Ok(Triple::new(subject, predicate.clone(), self.decode(o)?.clone()))
    }

    fn decode_graph_name(&self, id: u64) -> Result<GraphName, DatasetError> {
        if id == DEFAULT_GRAPH_ID {
            return Ok(GraphName::DefaultGraph);
        }
        match self.decode(id)? {
            Term::NamedNode(node) => Ok(NamedNode::clone(node).into()),
            Term::BlankNode(node) => Ok(BlankNode::clone(node).into()),
            _ => Err(CorruptionError::msg("A graph name is not an IRI or a blank node").into()),
        }
    }
}

/// Write access to a [`MemoryQuadStorage`], see [`MemoryQuadStorage::transaction`].
pub struct MemoryQuadStorageWriter<'a> {
    content: RwLockWriteGuard<'a, Content>,
}

impl MemoryQuadStorageWriter<'_> {
    /// Inserts a quad, creating its graph if needed. Returns `true` if the quad was not already there.
    pub fn insert(&mut self, graph_name: GraphNameRef<'_>, triple: TripleRef<'_>) -> bool {
        let content = &mut *self.content;
        let g = content.intern_graph(graph_name);
        let s = content.intern(triple.subject.into());
        let p = content.intern(triple.predicate.into());
        let o = content.intern(triple.object);
        content.graphs.insert(g);
        if content.gspo.insert([g, s, p, o]) {
            content.gpos.insert([g, p, o, s]);
            content.gosp.insert([g, o, s, p]);
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, graph_name: GraphNameRef<'_>, triple: TripleRef<'_>) -> bool {
        let content = &mut *self.content;
        let (Some(g), Some(s), Some(p), Some(o)) = (
            content.graph_id(graph_name),
            content.term_id(triple.subject.into()),
            content.term_id(triple.predicate.into()),
            content.term_id(triple.object),
        ) else {
            return false;
        };
        if content.gspo.remove(&[g, s, p, o]) {
            content.gpos.remove(&[g, p, o, s]);
            content.gosp.remove(&[g, o, s, p]);
            true
        } else {
            false
        }
    }

    /// Creates an empty graph. Returns `false` if it already exists.
    pub fn create_graph(&mut self, graph_name: GraphNameRef<'_>) -> bool {
        let g = self.content.intern_graph(graph_name);
        self.content.graphs.insert(g)
    }

    /// Removes all the quads of a graph, keeping the graph itself.
    pub fn clear_graph(&mut self, graph_name: GraphNameRef<'_>) {
        let content = &mut *self.content;
        let Some(g) = content.graph_id(graph_name) else {
            return;
        };
        let keys = scan(&content.gspo, &[g]).copied().collect::<Vec<_>>();
        for [g, s, p, o] in keys {
            content.gspo.remove(&[g, s, p, o]);
            content.gpos.remove(&[g, p, o, s]);
            content.gosp.remove(&[g, o, s, p]);
        }
    }

    /// Removes a graph and all its quads. Returns `false` if the graph did not exist.
    pub fn remove_graph(&mut self, graph_name: GraphNameRef<'_>) -> bool {
        self.clear_graph(graph_name);
        match self.content.graph_id(graph_name) {
            Some(g) => self.content.graphs.remove(&g),
            None => false,
        }
    }
}

impl QuadStorage for MemoryQuadStorage {
    fn add_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        self.transaction(|writer| Ok(writer.insert(graph_name, triple)))
    }

    fn remove_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        self.transaction(|writer| Ok(writer.remove(graph_name, triple)))
    }

    fn contains_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        let content = self.content.read().map_err(poison_corruption_error)?;
        Ok(
            match (
                content.graph_id(graph_name),
                content.term_id(triple.subject.into()),
                content.term_id(triple.predicate.into()),
                content.term_id(triple.object),
            ) {
                (Some(g), Some(s), Some(p), Some(o)) => content.gspo.contains(&[g, s, p, o]),
                _ => false,
            },
        )
    }

    fn quads(&self, graph_name: GraphNameRef<'_>) -> TripleIter<'_> {
        self.lookup(graph_name, None, None, None)
    }

    fn graph_names(&self) -> GraphNameIter<'_> {
        let content = match self.content.read() {
            Ok(content) => content,
            Err(e) => return Box::new(once(Err(poison_corruption_error(e)))),
        };
        Box::new(
            content
                .graphs
                .iter()
                .map(|g| content.decode_graph_name(*g))
                .collect::<Vec<_>>()
                .into_iter(),
        )
    }

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        let content = self.content.read().map_err(poison_corruption_error)?;
        Ok(content
            .graph_id(graph_name)
            .is_some_and(|g| content.graphs.contains(&g)))
    }

    fn create_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        self.transaction(|writer| Ok(writer.create_graph(graph_name)))
    }

    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        self.transaction(|writer| Ok(writer.remove_graph(graph_name)))
    }

    fn flush(&self) -> Result<(), DatasetError> {
        if let Some(hook) = &self.flush_hook {
            debug!("running the in-memory storage flush hook");
            hook()?;
        }
        Ok(())
    }
}

impl PatternQuadStorage for MemoryQuadStorage {
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

    fn quads_for_pattern(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_> {
        self.lookup(graph_name, subject, predicate, object)
    }
}

/// In-memory storage of whole graphs.
///
/// Graphs are shared with the readers: a graph returned by [`GraphStorage::graph`] is a snapshot
/// that is not affected by later writes.
#[derive(Clone, Default)]
pub struct MemoryGraphStorage {
    graphs: Arc<RwLock<FxHashMap<GraphName, Arc<Graph>>>>,
}

impl MemoryGraphStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStorage for MemoryGraphStorage {
    fn graph_names(&self) -> GraphNameIter<'_> {
        match self.graphs.read() {
            Ok(graphs) => Box::new(graphs.keys().cloned().map(Ok).collect::<Vec<_>>().into_iter()),
            Err(e) => Box::new(once(Err(poison_corruption_error(e)))),
        }
    }

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Ok(self
            .graphs
            .read()
            .map_err(poison_corruption_error)?
            .contains_key(&graph_name.into_owned()))
    }

    fn graph(&self, graph_name: GraphNameRef<'_>) -> Result<Option<Arc<Graph>>, DatasetError> {
        Ok(self
            .graphs
            .read()
            .map_err(poison_corruption_error)?
            .get(&graph_name.into_owned())
            .cloned())
    }

    fn add_graph(&self, graph_name: GraphNameRef<'_>, graph: &Graph) -> Result<(), DatasetError> {
        let mut graphs = self.graphs.write().map_err(poison_corruption_error)?;
        let target = graphs
            .entry(graph_name.into_owned())
            .or_insert_with(|| Arc::new(Graph::new()));
        // Readers may hold the current version
        let mut merged = target.iter().collect::<Graph>();
        merged.extend(graph.iter());
        *target = Arc::new(merged);
        Ok(())
    }

    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Ok(self
            .graphs
            .write()
            .map_err(poison_corruption_error)?
            .remove(&graph_name.into_owned())
            .is_some())
    }
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use oxrdf::Literal;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    #[test]
    fn test_all_patterns_use_the_indexes() -> Result<(), DatasetError> {
        let storage = MemoryQuadStorage::new();
        let g = GraphName::from(ex("g"));
        let (s, p, q) = (ex("s"), ex("p"), ex("q"));
        let o = Literal::from("o");
        storage.add_quad(g.as_ref(), TripleRef::new(s.as_ref(), p.as_ref(), o.as_ref()))?;
        storage.add_quad(g.as_ref(), TripleRef::new(s.as_ref(), q.as_ref(), s.as_ref()))?;
        storage.add_quad(g.as_ref(), TripleRef::new(p.as_ref(), p.as_ref(), o.as_ref()))?;
        storage.add_quad(
            GraphNameRef::DefaultGraph,
            TripleRef::new(s.as_ref(), p.as_ref(), o.as_ref()),
        )?;

        let count = |s: Option<&NamedNode>, p: Option<&NamedNode>, o: Option<TermRef<'_>>| {
            storage
                .quads_for_pattern(
                    g.as_ref(),
                    s.map(|s| s.as_ref().into()),
                    p.map(NamedNode::as_ref),
                    o,
                )
                .collect::<Result<Vec<_>, _>>()
                .map(|t| t.len())
        };
        assert_eq!(count(None, None, None)?, 3);
        assert_eq!(count(Some(&s), None, None)?, 2);
        assert_eq!(count(None, Some(&p), None)?, 2);
        assert_eq!(count(None, None, Some(o.as_ref().into()))?, 2);
        assert_eq!(count(Some(&s), Some(&p), None)?, 1);
        assert_eq!(count(Some(&s), None, Some(s.as_ref().into()))?, 1);
        assert_eq!(count(None, Some(&p), Some(o.as_ref().into()))?, 2);
        assert_eq!(count(Some(&p), Some(&p), Some(o.as_ref().into()))?, 1);
        assert_eq!(count(Some(&ex("never-inserted")), None, None)?, 0);
        assert_eq!(storage.len()?, 4);
        Ok(())
    }

    #[test]
    fn test_graph_lifecycle() -> Result<(), DatasetError> {
        let storage = MemoryQuadStorage::new();
        let g = GraphName::from(ex("g"));
        let t = Triple::new(ex("s"), ex("p"), ex("o"));
        assert!(!storage.has_graph(g.as_ref())?);
        assert!(storage.create_graph(g.as_ref())?);
        assert!(!storage.create_graph(g.as_ref())?);
        assert!(storage.has_graph(g.as_ref())?);
        assert!(storage.add_quad(g.as_ref(), t.as_ref())?);
        assert!(!storage.add_quad(g.as_ref(), t.as_ref())?);
        assert!(storage.remove_quad(g.as_ref(), t.as_ref())?);
        assert!(storage.has_graph(g.as_ref())?);
        storage.add_quad(g.as_ref(), t.as_ref())?;
        assert!(storage.remove_graph(g.as_ref())?);
        assert!(!storage.has_graph(g.as_ref())?);
        assert!(storage.is_empty()?);
        assert_eq!(storage.graph_names().count(), 0);
        Ok(())
    }

    #[test]
    fn test_transaction_groups_writes() -> Result<(), DatasetError> {
        let storage = MemoryQuadStorage::new();
        let t1 = Triple::new(ex("s"), ex("p"), ex("o1"));
        let t2 = Triple::new(ex("s"), ex("p"), ex("o2"));
        storage.transaction(|writer| {
            writer.insert(GraphNameRef::DefaultGraph, t1.as_ref());
            writer.insert(GraphNameRef::DefaultGraph, t2.as_ref());
            writer.clear_graph(GraphNameRef::DefaultGraph);
            writer.insert(GraphNameRef::DefaultGraph, t2.as_ref());
            Result::<_, DatasetError>::Ok(())
        })?;
        assert!(!storage.contains_quad(GraphNameRef::DefaultGraph, t1.as_ref())?);
        assert!(storage.contains_quad(GraphNameRef::DefaultGraph, t2.as_ref())?);
        Ok(())
    }

    #[test]
    fn test_flush_hook() -> Result<(), DatasetError> {
        let flushed = Arc::new(RwLock::new(0));
        let counter = Arc::clone(&flushed);
        let storage = MemoryQuadStorage::new().with_flush_hook(move || {
            *counter.write().map_err(poison_corruption_error)? += 1;
            Ok(())
        });
        storage.flush()?;
        storage.flush()?;
        assert_eq!(*flushed.read().map_err(poison_corruption_error)?, 2);
        Ok(())
    }

    #[test]
    fn test_graph_storage_snapshots() -> Result<(), DatasetError> {
        let storage = MemoryGraphStorage::new();
        let g = GraphName::from(ex("g"));
        let mut graph = Graph::new();
        graph.insert(&Triple::new(ex("s"), ex("p"), ex("o1")));
        storage.add_graph(g.as_ref(), &graph)?;
        let snapshot = storage.graph(g.as_ref())?.ok_or(DatasetError::GraphNotFound(g.clone()))?;
        let mut more = Graph::new();
        more.insert(&Triple::new(ex("s"), ex("p"), ex("o2")));
        storage.add_graph(g.as_ref(), &more)?;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            storage.graph(g.as_ref())?.map(|g| g.len()),
            Some(2)
        );
        assert!(storage.remove_graph(g.as_ref())?);
        assert!(!storage.has_graph(g.as_ref())?);
        Ok(())
    }
}

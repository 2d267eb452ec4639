//! Quad storage in a SQLite database.
//!
//! Terms are interned in a `nodes` table, each distinct triple gets a row in `triples` and the
//! `graph_triples` table records which graph contains which triple.
//! Terms and graph names are stored in their N-Triples serialization.

use crate::dataset::{GraphNameIter, TripleIter};
use crate::error::{CorruptionError, DatasetError, StorageError, poison_corruption_error};
use crate::quad::{PatternQuadStorage, QuadStorage};
use oxrdf::{
    GraphName, GraphNameRef, NamedNode, NamedNodeRef, NamedOrBlankNode, NamedOrBlankNodeRef,
    Term, TermRef, Triple, TripleRef,
};
use rusqlite::types::ToSql;
use rusqlite::{Connection, params};
use std::iter::once;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

/// Number of rows fetched by each round-trip of a cursor.
const CURSOR_BATCH_SIZE: usize = 1_000;

const DEFAULT_GRAPH_NAME: &str = "DEFAULT";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    value TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS graphs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS triples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id INTEGER NOT NULL REFERENCES nodes(id),
    predicate_id INTEGER NOT NULL REFERENCES nodes(id),
    object_id INTEGER NOT NULL REFERENCES nodes(id),
    UNIQUE(subject_id, predicate_id, object_id)
);
CREATE INDEX IF NOT EXISTS idx_triples_p ON triples(predicate_id, object_id);
CREATE INDEX IF NOT EXISTS idx_triples_o ON triples(object_id, subject_id);
CREATE TABLE IF NOT EXISTS graph_triples (
    graph_id INTEGER NOT NULL REFERENCES graphs(id),
    triple_id INTEGER NOT NULL REFERENCES triples(id),
    PRIMARY KEY(graph_id, triple_id)
);
";

const SELECT_TRIPLES: &str = "SELECT t.id, s.value, p.value, o.value
FROM graph_triples gt
JOIN graphs g ON g.id = gt.graph_id
JOIN triples t ON t.id = gt.triple_id
JOIN nodes s ON s.id = t.subject_id
JOIN nodes p ON p.id = t.predicate_id
JOIN nodes o ON o.id = t.object_id
WHERE g.name = ? AND t.id > ?";

/// A [`QuadStorage`] persisted in a SQLite database.
///
/// Each write is its own SQLite transaction, so [`flush`](QuadStorage::flush) has nothing to do.
/// Lookups are streamed: rows are fetched in batches when the returned iterator is consumed.
///
/// ```
/// use oxrdf::{GraphNameRef, NamedNodeRef, TripleRef};
/// use spardataset::{QuadStorage, SqliteQuadStorage};
///
/// let ex = NamedNodeRef::new("http://example.com")?;
/// let storage = SqliteQuadStorage::open_in_memory()?;
/// storage.add_quad(ex.into(), TripleRef::new(ex, ex, ex))?;
/// assert!(storage.contains_quad(ex.into(), TripleRef::new(ex, ex, ex))?);
/// assert!(!storage.contains_quad(GraphNameRef::DefaultGraph, TripleRef::new(ex, ex, ex))?);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct SqliteQuadStorage {
    connection: Mutex<Connection>,
}

impl SqliteQuadStorage {
    /// Opens the database at the given path, creating it if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening SQLite quad storage");
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a database living only in memory.
    pub fn open_in_memory() -> Result<Self, DatasetError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, DatasetError> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Counts the quads of the storage, over all graphs.
    pub fn len(&self) -> Result<usize, DatasetError> {
        let count: i64 =
            self.connection()?
                .query_row("SELECT COUNT(*) FROM graph_triples", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| CorruptionError::new(e).into())
    }

    pub fn is_empty(&self) -> Result<bool, DatasetError> {
        Ok(self.len()? == 0)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, DatasetError> {
        self.connection.lock().map_err(poison_corruption_error)
    }

    fn stored_graph_names(&self) -> Result<Vec<String>, DatasetError> {
        let connection = self.connection()?;
        let mut statement = connection.prepare_cached("SELECT name FROM graphs ORDER BY id")?;
        let names = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn cursor(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> TripleIter<'_> {
        Box::new(SqlTripleCursor {
            storage: self,
            graph_name: graph_name.to_string(),
            subject: subject.map(|s| s.to_string()),
            predicate: predicate.map(|p| p.to_string()),
            object: object.map(|o| o.to_string()),
            last_id: 0,
            buffer: Vec::new().into_iter(),
            state: CursorState::Pending,
        })
    }
}

/// Inserts the value if it is not there yet and returns its row id.
fn intern(
    connection: &Connection,
    table: &str,
    column: &str,
    value: &str,
) -> Result<i64, rusqlite::Error> {
    connection.execute(
        &format!("INSERT OR IGNORE INTO {table} ({column}) VALUES (?1)"),
        params![value],
    )?;
    connection.query_row(
        &format!("SELECT id FROM {table} WHERE {column} = ?1"),
        params![value],
        |row| row.get(0),
    )
}

impl QuadStorage for SqliteQuadStorage {
    fn add_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        let mut connection = self.connection()?;
        let transaction = connection.transaction()?;
        let graph_id = intern(&transaction, "graphs", "name", &graph_name.to_string())?;
        let subject_id = intern(&transaction, "nodes", "value", &triple.subject.to_string())?;
        let predicate_id = intern(&transaction, "nodes", "value", &triple.predicate.to_string())?;
        let object_id = intern(&transaction, "nodes", "value", &triple.object.to_string())?;
        transaction.execute(
            "INSERT OR IGNORE INTO triples (subject_id, predicate_id, object_id) VALUES (?1, ?2, ?3)",
            params![subject_id, predicate_id, object_id],
        )?;
        let triple_id: i64 = transaction.query_row(
            "SELECT id FROM triples WHERE subject_id = ?1 AND predicate_id = ?2 AND object_id = ?3",
            params![subject_id, predicate_id, object_id],
            |row| row.get(0),
        )?;
        let inserted = transaction.execute(
            "INSERT OR IGNORE INTO graph_triples (graph_id, triple_id) VALUES (?1, ?2)",
            params![graph_id, triple_id],
        )? > 0;
        transaction.commit()?;
        Ok(inserted)
    }

    fn remove_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        let removed = self.connection()?.execute(
            "DELETE FROM graph_triples
            WHERE graph_id = (SELECT id FROM graphs WHERE name = ?1)
            AND triple_id = (
                SELECT t.id FROM triples t
                JOIN nodes s ON s.id = t.subject_id
                JOIN nodes p ON p.id = t.predicate_id
                JOIN nodes o ON o.id = t.object_id
                WHERE s.value = ?2 AND p.value = ?3 AND o.value = ?4
            )",
            params![
                graph_name.to_string(),
                triple.subject.to_string(),
                triple.predicate.to_string(),
                triple.object.to_string()
            ],
        )?;
        Ok(removed > 0)
    }

    fn contains_quad(
        &self,
        graph_name: GraphNameRef<'_>,
        triple: TripleRef<'_>,
    ) -> Result<bool, DatasetError> {
        Ok(self.connection()?.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM graph_triples gt
                JOIN graphs g ON g.id = gt.graph_id
                JOIN triples t ON t.id = gt.triple_id
                JOIN nodes s ON s.id = t.subject_id
                JOIN nodes p ON p.id = t.predicate_id
                JOIN nodes o ON o.id = t.object_id
                WHERE g.name = ?1 AND s.value = ?2 AND p.value = ?3 AND o.value = ?4
            )",
            params![
                graph_name.to_string(),
                triple.subject.to_string(),
                triple.predicate.to_string(),
                triple.object.to_string()
            ],
            |row| row.get(0),
        )?)
    }

    fn quads(&self, graph_name: GraphNameRef<'_>) -> TripleIter<'_> {
        self.cursor(graph_name, None, None, None)
    }

    fn graph_names(&self) -> GraphNameIter<'_> {
        match self.stored_graph_names() {
            Ok(names) => Box::new(names.into_iter().map(|name| decode_graph_name(&name))),
            Err(e) => Box::new(once(Err(e))),
        }
    }

    fn has_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Ok(self.connection()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM graphs WHERE name = ?1)",
            params![graph_name.to_string()],
            |row| row.get(0),
        )?)
    }

    fn create_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        Ok(self.connection()?.execute(
            "INSERT OR IGNORE INTO graphs (name) VALUES (?1)",
            params![graph_name.to_string()],
        )? > 0)
    }

    fn remove_graph(&self, graph_name: GraphNameRef<'_>) -> Result<bool, DatasetError> {
        let graph_name = graph_name.to_string();
        let mut connection = self.connection()?;
        let transaction = connection.transaction()?;
        transaction.execute(
            "DELETE FROM graph_triples WHERE graph_id = (SELECT id FROM graphs WHERE name = ?1)",
            params![graph_name],
        )?;
        let removed =
            transaction.execute("DELETE FROM graphs WHERE name = ?1", params![graph_name])?;
        transaction.commit()?;
        Ok(removed > 0)
    }
}

impl PatternQuadStorage for SqliteQuadStorage {
    fn quads_with_subject(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: NamedOrBlankNodeRef<'_>,
    ) -> TripleIter<'_> {
        self.cursor(graph_name, Some(subject), None, None)
    }

    fn quads_with_predicate(
        &self,
        graph_name: GraphNameRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> TripleIter<'_> {
        self.cursor(graph_name, None, Some(predicate), None)
    }

    fn quads_with_object(
        &self,
        graph_name: GraphNameRef<'_>,
        object: TermRef<'_>,
    ) -> TripleIter<'_> {
        self.cursor(graph_name, None, None, Some(object))
    }

    fn quads_with_subject_predicate(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: NamedOrBlankNodeRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> TripleIter<'_> {
        self.cursor(graph_name, Some(subject), Some(predicate), None)
    }

    fn quads_with_subject_object(
        &self,
        graph_name: GraphNameRef<'_>,
        subject: NamedOrBlankNodeRef<'_>,
        object: TermRef<'_>,
    ) -> TripleIter<'_> {
        self.cursor(graph_name, Some(subject), None, Some(object))
    }

    fn quads_with_predicate_object(
        &self,
        graph_name: GraphNameRef<'_>,
        predicate: NamedNodeRef<'_>,
        object: TermRef<'_>,
    ) -> TripleIter<'_> {
        self.cursor(graph_name, None, Some(predicate), Some(object))
    }
}

enum CursorState {
    Pending,
    Open,
    Done,
}

/// Streams the triples matching a pattern.
///
/// Nothing is sent to the database before the first call to `next`. Rows are then fetched in
/// batches ordered by triple id, each batch restarting after the last id seen, so the
/// connection lock is only held while a batch is read.
struct SqlTripleCursor<'a> {
    storage: &'a SqliteQuadStorage,
    graph_name: String,
    subject: Option<String>,
    predicate: Option<String>,
    object: Option<String>,
    last_id: i64,
    buffer: std::vec::IntoIter<Triple>,
    state: CursorState,
}

impl SqlTripleCursor<'_> {
    fn fetch(&mut self) -> Result<Vec<Triple>, DatasetError> {
        let mut filters = String::new();
        let mut parameters: Vec<&dyn ToSql> = vec![&self.graph_name, &self.last_id];
        for (column, value) in [
            ("s.value", &self.subject),
            ("p.value", &self.predicate),
            ("o.value", &self.object),
        ] {
            if let Some(value) = value {
                filters.push_str(" AND ");
                filters.push_str(column);
                filters.push_str(" = ?");
                parameters.push(value);
            }
        }
        let sql = format!("{SELECT_TRIPLES}{filters} ORDER BY t.id LIMIT {CURSOR_BATCH_SIZE}");
        let rows = {
            let connection = self.storage.connection()?;
            let mut statement = connection.prepare_cached(&sql)?;
            statement
                .query_map(parameters.as_slice(), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?
        };
        let mut triples = Vec::with_capacity(rows.len());
        for (id, subject, predicate, object) in rows {
            self.last_id = id;
            triples.push(Triple::new(
                decode_subject(&subject)?,
                decode(NamedNode::from_str(&predicate))?,
                decode(Term::from_str(&object))?,
            ));
        }
        Ok(triples)
    }
}

impl Iterator for SqlTripleCursor<'_> {
    type Item = Result<Triple, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triple) = self.buffer.next() {
                return Some(Ok(triple));
            }
            match self.state {
                CursorState::Done => return None,
                CursorState::Pending => {
                    trace!(graph = %self.graph_name, "opening SQLite cursor");
                    self.state = CursorState::Open;
                }
                CursorState::Open => (),
            }
            match self.fetch() {
                Ok(batch) => {
                    if batch.len() < CURSOR_BATCH_SIZE {
                        self.state = CursorState::Done;
                    }
                    self.buffer = batch.into_iter();
                }
                Err(e) => {
                    self.state = CursorState::Done;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn decode<T, E: std::error::Error + Send + Sync + 'static>(
    value: Result<T, E>,
) -> Result<T, DatasetError> {
    value.map_err(|e| CorruptionError::new(e).into())
}

fn decode_subject(value: &str) -> Result<NamedOrBlankNode, DatasetError> {
    match decode(Term::from_str(value))? {
        Term::NamedNode(node) => Ok(node.into()),
        Term::BlankNode(node) => Ok(node.into()),
        _ => Err(CorruptionError::msg(format!("{value} is not a valid triple subject")).into()),
    }
}

fn decode_graph_name(value: &str) -> Result<GraphName, DatasetError> {
    if value == DEFAULT_GRAPH_NAME {
        return Ok(GraphName::DefaultGraph);
    }
    match decode(Term::from_str(value))? {
        Term::NamedNode(node) => Ok(node.into()),
        Term::BlankNode(node) => Ok(node.into()),
        _ => Err(CorruptionError::msg(format!("{value} is not a valid graph name")).into()),
    }
}

impl From<rusqlite::Error> for StorageError {
    #[inline]
    fn from(error: rusqlite::Error) -> Self {
        Self::Other(Box::new(error))
    }
}

impl From<rusqlite::Error> for DatasetError {
    #[inline]
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage(error.into())
    }
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use oxrdf::{BlankNode, Literal};

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    #[test]
    fn test_terms_are_decoded_back() -> Result<(), DatasetError> {
        let storage = SqliteQuadStorage::open_in_memory()?;
        let graph_name = GraphName::from(BlankNode::new_unchecked("g"));
        let triples = [
            Triple::new(
                ex("s"),
                ex("p"),
                Literal::new_language_tagged_literal_unchecked("chat", "fr"),
            ),
            Triple::new(BlankNode::new_unchecked("b"), ex("p"), Literal::from(12)),
            Triple::new(ex("s"), ex("p"), Literal::new_simple_literal("with \"quotes\"\n")),
        ];
        for triple in &triples {
            assert!(storage.add_quad(graph_name.as_ref(), triple.as_ref())?);
            assert!(!storage.add_quad(graph_name.as_ref(), triple.as_ref())?);
        }
        let stored = storage
            .quads(graph_name.as_ref())
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(stored, triples);
        assert_eq!(
            storage.graph_names().collect::<Result<Vec<_>, _>>()?,
            vec![graph_name]
        );
        Ok(())
    }

    #[test]
    fn test_pattern_lookups() -> Result<(), DatasetError> {
        let storage = SqliteQuadStorage::open_in_memory()?;
        let g = GraphNameRef::DefaultGraph;
        let t1 = Triple::new(ex("s1"), ex("p"), ex("o"));
        let t2 = Triple::new(ex("s2"), ex("p"), ex("o"));
        let t3 = Triple::new(ex("s1"), ex("q"), ex("o"));
        for t in [&t1, &t2, &t3] {
            storage.add_quad(g, t.as_ref())?;
        }
        storage.add_quad(ex("other").as_ref().into(), t1.as_ref())?;

        let s1 = ex("s1");
        let p = ex("p");
        let o = Term::from(ex("o"));
        assert_eq!(storage.quads_with_subject(g, s1.as_ref().into()).count(), 2);
        assert_eq!(storage.quads_with_predicate(g, p.as_ref()).count(), 2);
        assert_eq!(storage.quads_with_object(g, o.as_ref()).count(), 3);
        assert_eq!(
            storage
                .quads_with_subject_predicate(g, s1.as_ref().into(), p.as_ref())
                .collect::<Result<Vec<_>, _>>()?,
            vec![t1.clone()]
        );
        assert_eq!(
            storage
                .quads_with_predicate_object(g, ex("q").as_ref(), o.as_ref())
                .collect::<Result<Vec<_>, _>>()?,
            vec![t3]
        );
        assert_eq!(
            storage
                .quads_with_subject_object(g, ex("s2").as_ref().into(), o.as_ref())
                .collect::<Result<Vec<_>, _>>()?,
            vec![t2]
        );
        assert_eq!(storage.len()?, 4);
        Ok(())
    }

    #[test]
    fn test_cursor_spans_several_batches() -> Result<(), DatasetError> {
        let storage = SqliteQuadStorage::open_in_memory()?;
        let g = ex("g");
        for i in 0..(CURSOR_BATCH_SIZE * 2 + 10) {
            storage.add_quad(
                g.as_ref().into(),
                TripleRef::new(
                    ex("s").as_ref(),
                    ex("p").as_ref(),
                    Literal::new_simple_literal(i.to_string()).as_ref(),
                ),
            )?;
        }
        let mut cursor = storage.quads(g.as_ref().into());
        assert_eq!(cursor.by_ref().take(5).count(), 5);
        assert_eq!(cursor.count(), CURSOR_BATCH_SIZE * 2 + 5);
        Ok(())
    }

    #[test]
    fn test_cursor_is_opened_on_first_next() -> Result<(), DatasetError> {
        let storage = SqliteQuadStorage::open_in_memory()?;
        let g = ex("g");
        let triple = Triple::new(ex("s"), ex("p"), ex("o"));
        let mut cursor = storage.quads(g.as_ref().into());
        storage.add_quad(g.as_ref().into(), triple.as_ref())?;
        assert_eq!(cursor.next().transpose()?, Some(triple));
        assert!(cursor.next().is_none());
        Ok(())
    }

    #[test]
    fn test_remove_and_graph_lifecycle() -> Result<(), DatasetError> {
        let storage = SqliteQuadStorage::open_in_memory()?;
        let g = ex("g");
        let t = Triple::new(ex("s"), ex("p"), ex("o"));
        assert!(storage.create_graph(g.as_ref().into())?);
        assert!(!storage.create_graph(g.as_ref().into())?);
        assert!(storage.add_quad(g.as_ref().into(), t.as_ref())?);
        assert!(storage.remove_quad(g.as_ref().into(), t.as_ref())?);
        assert!(!storage.remove_quad(g.as_ref().into(), t.as_ref())?);
        assert!(storage.has_graph(g.as_ref().into())?);
        assert!(storage.add_quad(g.as_ref().into(), t.as_ref())?);
        assert!(storage.remove_graph(g.as_ref().into())?);
        assert!(!storage.has_graph(g.as_ref().into())?);
        assert!(!storage.contains_quad(g.as_ref().into(), t.as_ref())?);
        assert!(storage.is_empty()?);
        Ok(())
    }
}

use crate::context::GraphScope;
use oxrdf::GraphName;
use std::error::Error;
use std::io;
use std::sync::PoisonError;
use thiserror::Error;

/// An error raised by a [`SparqlDataset`](crate::SparqlDataset) or one of its storages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DatasetError {
    /// A `GRAPH` clause or an explicit lookup names a graph absent from the dataset.
    #[error("The graph {0} does not exist in the dataset")]
    GraphNotFound(GraphName),
    /// A graph is added while a graph with the same name already exists and merging is not allowed.
    #[error("The graph {0} already exists in the dataset")]
    GraphAlreadyExists(GraphName),
    /// A reset call has no matching set call.
    #[error("Unable to reset the {0} graph since no previous {0} graph exists")]
    StackUnderflow(GraphScope),
    /// Mutation attempted on an immutable dataset or storage.
    #[error("{0}")]
    Unsupported(&'static str),
    /// The storage does not provide the requested operation.
    #[error("{operation} is not implemented by the {storage} storage")]
    NotImplemented {
        /// The storage kind.
        storage: &'static str,
        /// The missing operation.
        operation: &'static str,
    },
    /// A triple has been asserted or retracted on a read-only graph.
    #[error("The graph {0} is read-only")]
    ReadOnly(GraphName),
    /// Error from the underlying storage.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DatasetError {
    pub(crate) const IMMUTABLE: Self = Self::Unsupported("dataset is immutable");

    #[inline]
    pub(crate) fn not_implemented(storage: &'static str, operation: &'static str) -> Self {
        Self::NotImplemented { storage, operation }
    }
}

impl From<DatasetError> for io::Error {
    #[inline]
    fn from(error: DatasetError) -> Self {
        match error {
            DatasetError::Storage(error) => error.into(),
            DatasetError::GraphNotFound(_) => Self::new(io::ErrorKind::NotFound, error),
            DatasetError::GraphAlreadyExists(_) => Self::new(io::ErrorKind::AlreadyExists, error),
            DatasetError::Unsupported(_)
            | DatasetError::NotImplemented { .. }
            | DatasetError::ReadOnly(_) => Self::new(io::ErrorKind::Unsupported, error),
            DatasetError::StackUnderflow(_) => Self::other(error),
        }
    }
}

/// A failure of the backend a dataset is stored in.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Error from the OS I/O layer.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Error related to data corruption.
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
    #[doc(hidden)]
    #[error("{0}")]
    Other(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl From<StorageError> for io::Error {
    #[inline]
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Io(error) => error,
            StorageError::Corruption(error) => error.into(),
            StorageError::Other(error) => Self::other(error),
        }
    }
}

/// Stored data that can not be decoded back into RDF terms or graph names.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CorruptionError {
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Other(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl CorruptionError {
    /// Wraps a term parsing failure or another decoding error.
    #[inline]
    pub(crate) fn new(error: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self::Other(error.into())
    }

    /// A decoding failure described by a message.
    #[inline]
    pub(crate) fn msg(msg: impl Into<String>) -> Self {
        Self::Msg(msg.into())
    }
}

impl From<CorruptionError> for io::Error {
    #[inline]
    fn from(error: CorruptionError) -> Self {
        Self::new(io::ErrorKind::InvalidData, error)
    }
}

impl From<CorruptionError> for DatasetError {
    #[inline]
    fn from(error: CorruptionError) -> Self {
        Self::Storage(error.into())
    }
}

pub(crate) fn poison_corruption_error<T>(_: PoisonError<T>) -> DatasetError {
    CorruptionError::msg("Poisoned mutex").into()
}

#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]

mod collection;
mod context;
mod dataset;
mod error;
mod graph;
mod quad;
pub mod storage;
mod transaction;
mod view;

pub use crate::collection::{DatasetGraphCollection, GraphCollection};
pub use crate::context::{DefaultGraph, GraphContext, GraphScope, GraphSelection};
pub use crate::dataset::{GraphIter, GraphNameIter, SparqlDataset, TripleIter};
pub use crate::error::{CorruptionError, DatasetError, StorageError};
pub use crate::graph::{GraphDataset, GraphStorage, ScopedGraph};
pub use crate::quad::{PatternQuadStorage, QuadDataset, QuadStorage};
#[cfg(feature = "sqlite")]
pub use crate::storage::SqliteQuadStorage;
pub use crate::storage::{
    FlushHook, MemoryGraphStorage, MemoryProvider, MemoryQuadStorage, MemoryQuadStorageWriter,
    ProviderCapability, ProviderStorage, StorageProvider,
};
pub use crate::transaction::{TransactionalGraph, TransactionalStorage};
pub use crate::view::QuadGraphView;

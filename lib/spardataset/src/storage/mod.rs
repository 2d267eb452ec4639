//! Storage backends.

mod memory;
mod provider;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use crate::storage::memory::{
    FlushHook, MemoryGraphStorage, MemoryQuadStorage, MemoryQuadStorageWriter,
};
pub use crate::storage::provider::{
    MemoryProvider, ProviderCapability, ProviderStorage, StorageProvider,
};
#[cfg(feature = "sqlite")]
pub use crate::storage::sqlite::SqliteQuadStorage;

//! ragforge store — capability boundaries toward persistence:
//! the vector store, document loader, and conversation history traits,
//! each with an in-memory/filesystem reference implementation.

pub mod history;
pub mod loader;
pub mod memory;
pub mod vector;

pub use history::{HistoryStore, InMemoryHistory};
pub use loader::{DocumentLoader, LoadedDocument, TextLoader};
pub use memory::MemoryVectorStore;
pub use vector::{DeleteSelector, Filter, ListOptions, VectorStore};

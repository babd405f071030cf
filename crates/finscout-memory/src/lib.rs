//! Knowledge corpus indexing, retrieval, and persistence of reviewed analyses.

pub mod chunker;
pub mod corpus;
pub mod document;
pub mod error;
pub mod in_memory_store;
pub mod retrieval;
pub mod sqlite;
pub mod types;
pub mod vector_store;

pub use chunker::{BreakpointStrategy, ChunkerConfig, SemanticChunker};
pub use corpus::{BuildOutcome, KnowledgeIndex, RetrievedChunk};
pub use error::MemoryError;
pub use in_memory_store::InMemoryVectorStore;
pub use retrieval::{RetrievalConfig, RetrievalGateway};
pub use sqlite::SqliteStore;
pub use types::{AnalysisId, AnalysisRecord, AnalysisStatus};
pub use vector_store::{VectorStore, VectorStoreError};

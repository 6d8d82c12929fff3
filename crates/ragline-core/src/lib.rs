//! # Ragline Core
//!
//! Shared building blocks for the embedding-and-retrieval pipeline:
//! data model, capability traits, configuration, and the error taxonomy.
//!
//! ## Data flow
//! ```text
//! ChunkStore ──► EmbeddingBackend ──► CollectionManager ──► VectorStore
//!                      ▲                                        │
//!                      └──────────── Retriever (query) ◄────────┘
//!
//! MirrorPipeline: Chunk ─► Translator ─► derive_id ─► embed ─► upsert
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod ids;
pub mod retry;
pub mod throttle;
pub mod traits;
pub mod types;

pub use error::{RaglineError, Result};
pub use traits::{EmbeddingBackend, Translator, VectorStore};
pub use types::{
    BackendHealth, Chunk, CollectionInfo, CollectionSpec, DistanceMetric, EmbedIntent, Embedding,
    Metadata, MetadataFilter, SearchHit, StoredRecord, UpsertBatch,
};

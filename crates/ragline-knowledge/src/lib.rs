//! # Ragline Knowledge
//!
//! The pipeline stages built on top of backends and stores:
//!
//! ```text
//! ChunkStore ──► Indexer (embed + reindex) ──► collection
//!      │            ▲                             ▲
//!      │        VectorSet (saved vectors)         │
//!      └──► MirrorPipeline (translate + upsert) ──┘
//!
//! RagService ──► Retriever ──► nearest neighbours
//! ```

pub mod chunk_store;
pub mod indexer;
pub mod mirror;
pub mod retrieval;
pub mod service;
pub mod vectors;

#[cfg(test)]
mod testing;

pub use chunk_store::ChunkStore;
pub use indexer::Indexer;
pub use mirror::{MirrorOptions, MirrorPipeline, MirrorReport, TranslationFailurePolicy};
pub use retrieval::Retriever;
pub use service::{EmbedRequest, EmbedResponse, HealthReport, RagService, SearchRequest, SearchResponse};
pub use vectors::{VectorRecord, VectorSet, vectors_path};

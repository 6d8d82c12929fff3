//! Capability traits at the seams between pipeline stages.

pub mod embedder;
pub mod translator;
pub mod vector_store;

pub use embedder::EmbeddingBackend;
pub use translator::Translator;
pub use vector_store::VectorStore;

//! Inference providers.

pub mod hash;
pub mod http;

pub use hash::HashEmbeddingProvider;
pub use http::ModelServerClient;

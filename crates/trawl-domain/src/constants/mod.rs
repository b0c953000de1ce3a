//! Domain constants.
//!
//! Key namespaces, timeouts, and pipeline thresholds. Anything an operator
//! can override lives in the infrastructure config instead; these are the
//! protocol-level values the KV coordination scheme depends on.

pub mod indexing;
pub mod keys;
pub mod sync;
pub mod timeouts;

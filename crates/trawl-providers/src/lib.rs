//! Trawl Provider Implementations
//!
//! Concrete adapters behind the domain ports:
//!
//! | Area | Providers |
//! |------|-----------|
//! | KV broker | `RedisKvBroker` (distributed), `MemoryKvBroker` (local/dev/tests) |
//! | Relational store | SQLite over `sqlx` with driver-agnostic repositories |
//! | Search index | HTTP client, in-memory index |
//! | Inference | Model-server HTTP client, deterministic hash embedder |
//! | Connectors | Checkpointed wiki source, load-state filesystem source |
//!
//! ## Provider Selection Guide
//!
//! - **Development/Testing**: `MemoryKvBroker` + in-memory index + hash
//!   embedder give a fully deterministic single-process stack.
//! - **Multi Instance**: `RedisKvBroker` + the HTTP providers.

pub mod connectors;
pub mod database;
pub mod inference;
pub mod kv;
pub mod search_index;

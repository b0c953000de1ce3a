//! SQLite relational store.
//!
//! The executor implements the driver-agnostic port; repositories depend
//! on the port and never see sqlx types. Each tenant gets its own
//! database file (or an isolated in-memory pool).

mod ddl;
mod executor;
pub mod repos;

pub use ddl::initialize_schema;
pub use executor::{SqliteExecutor, connect, connect_in_memory};
pub use repos::build_repositories;

//! Connector adapters.

pub mod factory;
pub mod files;
pub mod wiki;

pub use factory::DefaultConnectorFactory;
pub use files::FilesConnector;
pub use wiki::{WikiConnector, WikiTransport};

//! Error handling types

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Typed outcome of connector settings validation.
///
/// These map to distinct operator-visible failure modes: expired
/// credentials and missing permissions pause the connector pair, while
/// plain validation errors surface on the attempt.
#[derive(Error, Debug)]
pub enum ConnectorValidationError {
    /// The stored credential is no longer accepted by the source
    #[error("Credential expired: {0}")]
    CredentialExpired(String),

    /// The credential works but lacks access to the configured content
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    /// The connector configuration is invalid for this source
    #[error("Connector validation failed: {0}")]
    Invalid(String),

    /// The source responded in a way validation could not interpret
    #[error("Unexpected validation error: {0}")]
    Unexpected(String),
}

impl ConnectorValidationError {
    /// Returns `true` when the failure should put the connector pair into
    /// the repeated-error state rather than being retried.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::CredentialExpired(_) | Self::InsufficientPermissions(_)
        )
    }
}

/// Main error type for the Trawl orchestrator
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON parsing error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// KV broker operation error
    #[error("KV broker error: {message}")]
    Kv {
        /// Description of the broker error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Relational store operation error
    #[error("Database error: {message}")]
    Database {
        /// Description of the database error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Search index operation error
    #[error("Search index error: {message}")]
    SearchIndex {
        /// Description of the index error
        message: String,
        /// HTTP-like status code when the index reported one
        status: Option<u16>,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding provider operation error
    #[error("Embedding provider error: {message}")]
    Embedding {
        /// Description of the embedding error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Inference (classification, vision, generation) error
    #[error("Inference error: {message}")]
    Inference {
        /// Description of the inference error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network-related error
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The remote service asked us to slow down.
    ///
    /// Separate from [`Error::Network`]: the retry layer honors the
    /// server-provided delay instead of its own backoff schedule.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Server-provided delay in seconds (0 when not provided)
        retry_after_secs: u64,
    },

    /// Connector runtime error
    #[error("Connector error: {message}")]
    Connector {
        /// Description of the connector error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connector settings validation error
    #[error("Connector validation error: {0}")]
    ConnectorValidation(#[from] ConnectorValidationError),

    /// Configuration-related error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Missing configuration field
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    /// Invalid configuration value
    #[error("Invalid configuration for '{key}': {message}")]
    ConfigInvalid {
        /// The configuration key that is invalid
        key: String,
        /// Reason why it is invalid
        message: String,
    },

    /// Resource not found error
    #[error("Not found: {resource}")]
    NotFound {
        /// The resource that was not found
        resource: String,
    },

    /// Invalid argument provided to a function
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

// Basic error creation methods
impl Error {
    /// Create a KV broker error
    pub fn kv<S: Into<String>>(message: S) -> Self {
        Self::Kv {
            message: message.into(),
            source: None,
        }
    }

    /// Create a KV broker error with source
    pub fn kv_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Kv {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a database error with source
    pub fn database_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a search index error
    pub fn search_index<S: Into<String>>(message: S) -> Self {
        Self::SearchIndex {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Create a search index error carrying the reported status code
    pub fn search_index_status<S: Into<String>>(message: S, status: u16) -> Self {
        Self::SearchIndex {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Create an embedding provider error
    pub fn embedding<S: Into<String>>(message: S) -> Self {
        Self::Embedding {
            message: message.into(),
            source: None,
        }
    }

    /// Create an embedding provider error with source
    pub fn embedding_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Embedding {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an inference error
    pub fn inference<S: Into<String>>(message: S) -> Self {
        Self::Inference {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connector error
    pub fn connector<S: Into<String>>(message: S) -> Self {
        Self::Connector {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connector error with source
    pub fn connector_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Connector {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` when the retry layer should honor a server delay
    /// instead of its own backoff.
    pub fn rate_limit_delay_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Returns the HTTP-like status the search index reported, if any.
    pub fn index_status(&self) -> Option<u16> {
        match self {
            Self::SearchIndex { status, .. } => *status,
            _ => None,
        }
    }
}

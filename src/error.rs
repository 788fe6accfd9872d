use thiserror::Error;

/// Message fragment the grid backend returns when a user/key row already exists.
pub const DUPLICATE_INDEX_MARKER: &str = "Duplicate values are found for unique index";

/// Main error type for the provisioning guard and proxy
#[derive(Error, Debug)]
pub enum GateError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Provisioning errors
    #[error("No account id available; API key check skipped")]
    MissingAccountId,

    #[error("API key generation failed: {0}")]
    KeyGeneration(String),

    #[error("User lookup failed: {0}")]
    UserLookup(String),

    #[error("Failed to persist API key: {0}")]
    Persistence(String),

    #[error("Registration already exists: {0}")]
    DuplicateRegistration(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl GateError {
    /// Whether the backend reported a unique-index violation, meaning an
    /// earlier registration for the same account already went through.
    pub fn is_duplicate_registration(&self) -> bool {
        match self {
            GateError::DuplicateRegistration(_) => true,
            other => other.to_string().contains(DUPLICATE_INDEX_MARKER),
        }
    }
}

/// Result type alias for GateError
pub type Result<T> = std::result::Result<T, GateError>;

use thiserror::Error;

/// Error taxonomy shared by every component of the identity backend.
///
/// Components fail fast with a typed variant; raw downstream errors are
/// wrapped and never leaked to callers.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(anyhow::Error),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IdentityError {
    /// The deliberately uninformative credential failure, used for any bad
    /// email/password combination so the response cannot be used to probe
    /// which accounts exist.
    pub fn invalid_credentials() -> Self {
        IdentityError::Unauthorized(anyhow::anyhow!("invalid email or password"))
    }
}

impl From<config::ConfigError> for IdentityError {
    fn from(err: config::ConfigError) -> Self {
        IdentityError::Config(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for IdentityError {
    fn from(err: std::io::Error) -> Self {
        IdentityError::Internal(anyhow::Error::new(err))
    }
}

//! Common error types for Klangbild

use thiserror::Error;

/// Common result type for Klangbild operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Klangbild services
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

//! # Klangbild Common Library
//!
//! Shared code for the Klangbild services:
//! - Lifecycle status codes shared by the main and secondary pipelines
//! - Event types and the broadcast EventBus
//! - Configuration loading (TOML bootstrap, properties files)
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod status;

pub use error::{Error, Result};
pub use status::StatusCode;

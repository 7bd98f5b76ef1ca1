// src/error.rs

//! Unified error handling for the injury report service.

use std::fmt;

use thiserror::Error;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// PDF document could not be read
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Report fetch error
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// A pipeline cycle failed at a given stage
    #[error("Cycle failed while {stage}: {message}")]
    Cycle { stage: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error with the offending URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a cycle error tagged with the stage it happened in.
    pub fn cycle(stage: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Cycle {
            stage: stage.to_string(),
            message: message.to_string(),
        }
    }
}

//! Error types for the sweep

use std::path::PathBuf;

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::generator::GeneratorError;
use crate::geometry::GeometryError;
use crate::models::ConfigError;
use crate::session::SessionError;
use crate::stl::StlError;

/// Main error type for a sweep run
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Geometry error in model '{model}': {source}")]
    Geometry {
        model: String,
        #[source]
        source: GeometryError,
    },

    #[error("STL export failed: {0}")]
    Stl(#[from] StlError),

    #[error("Synergy session error: {0}")]
    Session(#[from] SessionError),

    #[error("Moldflow tool error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Working directory {0:?} already exists")]
    WorkdirExists(PathBuf),

    #[error("Result '{result}' was not produced for study '{study}' (expected {expected:?})")]
    MissingResult {
        study: String,
        result: String,
        expected: PathBuf,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sweep operations
pub type SweepResult<T> = Result<T, SweepError>;

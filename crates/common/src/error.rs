use thiserror::Error;

/// Unified error type for Floe crates.
use sqlparser::parser::ParserError;

use crate::dependency::DependencyId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid statement input: {0}")]
    Validation(String),
    #[error("duplicate producer for dependency {0} within one fragment batch")]
    DependencyConflict(DependencyId),
    #[error("no fragment published a result for dependency {0}")]
    MissingDependency(DependencyId),
    #[error("replicated DML count {raw} is not divisible by {partitions} partitions")]
    ReplicationConsistency { raw: i64, partitions: usize },
    #[error("execution error: {0}")]
    Execution(String),
    #[error("operation not supported: {0}")]
    NotSupported(String),
    #[error("SQL parsing error: {0}")]
    SqlParser(#[from] ParserError),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T> = std::result::Result<T, Error>;

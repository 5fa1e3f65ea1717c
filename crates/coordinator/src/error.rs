use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Failed to load configuration")]
    Config(#[from] config::ConfigError),

    #[error("Statement execution failed")]
    Statement(#[from] floe_common::Error),

    #[error("An internal error occurred: {0}")]
    Internal(String),
}

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid allocation input: {0}")]
    InvalidAllocationInput(String),
}

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Invalid selection parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, SelectionError>;

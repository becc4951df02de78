use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),

    #[error("No encontrado: {0}")]
    NotFound(String),

    #[error("Error de almacenamiento: {0}")]
    Storage(String),
}

impl From<std::io::Error> for TreeError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TreeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type TreeResult<T> = Result<T, TreeError>;

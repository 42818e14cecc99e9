use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parsing error: {0}")]
    Parsing(String),
}

impl Error {
    /// Error for a segment id that is not present in the corpus index
    pub fn unknown_segment(id: &str) -> Self {
        Error::Configuration(format!("Segment id not found in corpus index: {}", id))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

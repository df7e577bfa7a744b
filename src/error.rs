use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("User with this name already exists: {0}")]
    UserExists(String),

    /// The enrichment service could not produce a record for the title.
    /// Carries the upstream reason verbatim.
    #[error("{0}")]
    MovieNotFound(String),

    #[error("Invalid movie id: {0:?}")]
    InvalidMovieId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not replace document: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl Error {
    /// Expected failures the caller shows to the user instead of treating as faults.
    pub fn is_domain(&self) -> bool {
        matches!(self, Error::UserExists(_) | Error::MovieNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

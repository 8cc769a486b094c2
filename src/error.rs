use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type SimResult<T> = Result<T, SimError>;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("{collaborator} failed: {source}")]
    Collaborator {
        collaborator: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("cancelled before all shell pairs were computed")]
    Cancelled,
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SimError {
    pub fn collaborator(collaborator: &'static str, source: BoxError) -> Self {
        SimError::Collaborator {
            collaborator,
            source,
        }
    }

    pub fn shape(what: &'static str, expected: usize, found: usize) -> Self {
        SimError::ShapeMismatch {
            what,
            expected,
            found,
        }
    }
}

/// Checks a count at a stage boundary.
pub fn ensure_len(what: &'static str, expected: usize, found: usize) -> SimResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(SimError::shape(what, expected, found))
    }
}

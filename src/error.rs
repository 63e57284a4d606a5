use crate::marshal::Exception;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported synchronously by the bridge itself.
///
/// Operation failures never show up here; they travel through the completion
/// cell and surface from a wait as [`ExecutionError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("null runtime handle")]
    NullHandle,

    #[error("failed to spawn worker: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn scheduling<S: Into<String>>(msg: S) -> Self {
        Error::Scheduling(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

/// A submitted operation finished with a failure.
///
/// The marshalled exception is available through [`ExecutionError::cause`]
/// and through `std::error::Error::source`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("operation failed: {cause}")]
pub struct ExecutionError {
    #[source]
    cause: Exception,
}

impl ExecutionError {
    pub(crate) fn new(cause: Exception) -> Self {
        Self { cause }
    }

    pub fn cause(&self) -> &Exception {
        &self.cause
    }

    pub fn into_cause(self) -> Exception {
        self.cause
    }
}

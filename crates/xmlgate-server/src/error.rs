//! Server error types.

use thiserror::Error;

/// Errors raised by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind a listener.
    #[error("bind error: {0}")]
    BindError(String),

    /// I/O error during server operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A service was registered twice under the same path.
    #[error("service path '{0}' is already registered")]
    DuplicateService(String),

    /// The registry was mounted a second time, or changed after mounting.
    #[error("services are already mounted at '{0}'")]
    AlreadyMounted(String),

    /// Mounting an empty registry.
    #[error("no services registered")]
    NoServices,

    /// The pipeline dropped the request; the connection is closed without a
    /// response.
    #[error("request aborted by the client")]
    Aborted,
}

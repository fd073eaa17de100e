use thiserror::Error;

/// Errors that may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer closed the connection while we were reading or writing.
    #[error("Connection broken")]
    ConnectionBroken,

    /// A line arrived which is not valid JSON.
    #[error("Could not parse message: {0}")]
    MessageParse(String),

    /// The frame was valid JSON but did not have the request shape,
    /// or its `data` did not match the named command.
    #[error("The request `{request}` is not valid. Problem: {problem}")]
    BadRequest {
        /// The problematic request.
        request: String,

        /// What was wrong with it.
        problem: String,
    },

    /// A request named a command outside the recognized set.
    #[error("Unrecognized command `{0}`")]
    UnrecognizedCommand(String),

    /// The device reported a failure while executing an operation.
    #[error("{0}")]
    Device(String),

    /// No response arrived within the configured queue timeout.
    #[error("Operation timed out")]
    QueueTimeout,

    /// The configuration file is not usable.
    #[error("Bad config: {0}")]
    BadConfig(String),

    /// An I/O error which is not a plain disconnect.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// A device-side failure with the given description.
    pub fn device(problem: impl Into<String>) -> Self {
        Self::Device(problem.into())
    }

    /// The config problem description, if this is a [`Error::BadConfig`].
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(problem) = self {
            Ok(problem)
        } else {
            Err(self)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match e.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Self::ConnectionBroken,
            _ => Self::Io(e.to_string()),
        }
    }
}

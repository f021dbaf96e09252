/// crate-wide error taxonomy
///
/// every fallible core operation returns one of these seven kinds.
/// low-level components never panic across a component boundary; the
/// engine's own error text rides along where it is the cause.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// an argument fell outside its contract
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// the operation is illegal in the component's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// the embedded engine rejected a statement
    #[error("query failed: {message}")]
    QueryFailed { message: String, code: Option<i32> },

    /// a connection could not be opened or has entered its error state
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String, code: Option<i32> },

    /// a bounded wait exceeded its deadline; expected and recoverable
    #[error("timed out: {0}")]
    Timeout(String),

    /// rollback requested across a migration lacking a down path
    #[error("irreversible migration: {0}")]
    Irreversible(String),

    /// filesystem, compression, checksum, or invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// engine error code, when the engine was the cause
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::QueryFailed { code, .. } => *code,
            Self::ConnectionFailed { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ffi, message) => {
                let code = ffi.extended_code;
                let message = message.unwrap_or_else(|| ffi.to_string());
                match ffi.code {
                    rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::NotADatabase
                    | rusqlite::ErrorCode::DatabaseCorrupt => Self::ConnectionFailed {
                        message,
                        code: Some(code),
                    },
                    _ => Self::QueryFailed {
                        message,
                        code: Some(code),
                    },
                }
            }
            rusqlite::Error::InvalidColumnType(index, name, kind) => Self::InvalidParameter(
                format!("column {} ({}) holds {}, not the requested type", index, name, kind),
            ),
            rusqlite::Error::InvalidParameterCount(given, expected) => Self::InvalidParameter(
                format!("statement takes {} parameters, {} bound", expected, given),
            ),
            rusqlite::Error::InvalidColumnIndex(index) => {
                Self::InvalidParameter(format!("column index {} out of range", index))
            }
            other => Self::QueryFailed {
                message: other.to_string(),
                code: None,
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_internal() {
        let e = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(matches!(e, Error::Internal(_)));
        assert!(e.code().is_none());
    }

    #[test]
    fn display_carries_message() {
        let e = Error::invalid_parameter("gap at 2");
        assert_eq!(e.to_string(), "invalid parameter: gap at 2");
    }
}

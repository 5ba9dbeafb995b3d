use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    CapacityExceeded,
    DuplicateStore,
    UnsupportedStoreType,
    Serialization,
    Compression,
    Checksum,
    InvalidInput,
    InvalidState,
    Backend,
    Io,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn invalid_state(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidState, context)
    }

    pub fn invalid_input(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidInput, context)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Serialization, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_context() {
        let err = Error::new(ErrorKind::DuplicateStore, "store 'scores' already exists");
        assert_eq!(err.to_string(), "DuplicateStore: store 'scores' already exists");
    }

    #[test]
    fn json_errors_map_to_serialization() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}

use std::collections::HashMap;

use thiserror::Error;

/// Errors surfaced by the backend client. Every controller operation catches
/// these at its own boundary and records them on the affected resource; none
/// of them are fatal to the controller.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("validation rejected {n} field(s)", n = .field_errors.len())]
    Validation { field_errors: HashMap<String, String> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },
}

impl LibraryError {
    pub fn field_errors(&self) -> Option<&HashMap<String, String>> {
        match self {
            Self::Validation { field_errors } => Some(field_errors),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, LibraryError>;

use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The model or the runtime backing it is not available.
    Unavailable,
    /// The request was rejected by the model, e.g. an unsupported image.
    InvalidInput,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Unavailable => write!(f, "Model unavailable"),
            ErrorKind::InvalidInput => write!(f, "Invalid input"),
            ErrorKind::Other => write!(f, "Other error"),
        }
    }
}

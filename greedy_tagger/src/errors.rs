//! Definition of errors.

use std::error::Error;
use std::fmt;

pub type Result<T, E = TaggerError> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum TaggerError {
    InvalidModel(InvalidModelError),
    DecodeError(bincode::Error),
    IOError(std::io::Error),
}

impl TaggerError {
    pub(crate) fn invalid_model<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidModel(InvalidModelError { msg: msg.into() })
    }
}

impl fmt::Display for TaggerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidModel(e) => e.fmt(f),
            Self::DecodeError(e) => e.fmt(f),
            Self::IOError(e) => e.fmt(f),
        }
    }
}

impl Error for TaggerError {}

/// Error used when the model is invalid.
#[derive(Debug)]
pub struct InvalidModelError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidModelError: {}", self.msg)
    }
}

impl Error for InvalidModelError {}

impl From<bincode::Error> for TaggerError {
    fn from(error: bincode::Error) -> Self {
        Self::DecodeError(error)
    }
}

impl From<std::io::Error> for TaggerError {
    fn from(error: std::io::Error) -> Self {
        Self::IOError(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_model_message() {
        let e = TaggerError::invalid_model("vector length mismatch");
        assert_eq!("InvalidModelError: vector length mismatch", e.to_string());
    }
}

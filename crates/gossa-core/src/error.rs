use crate::span::Span;
use std::result;
use thiserror::Error;

#[derive(Debug)]
pub struct BuildError {
    pub message: String,
    pub package: Option<String>,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Build error: {}", .1.message)]
    Build(Span, BuildError),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    pub fn build(span: Span, message: impl Into<String>, package: Option<String>) -> Self {
        Error::Build(
            span,
            BuildError {
                message: message.into(),
                package,
            },
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

pub type Result<T> = result::Result<T, Error>;

// Convert from eyre::Report to our Error type
impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Generic(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Generic(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

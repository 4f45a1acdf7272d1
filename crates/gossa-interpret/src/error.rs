use crate::value::Value;
use gossa_core::error::Error;
use gossa_core::span::Span;
use gossa_core::types::Type;
use thiserror::Error;

/// How a call ended other than by returning.
#[derive(Error, Debug)]
pub enum Unwind {
    /// A target-level panic; recoverable by a deferred `recover`.
    #[error("panic: {0}")]
    Panic(Value),
    /// Process exit; runs no further defers.
    #[error("exit status {0}")]
    Exit(i32),
    /// A fault of the interpreter itself.
    #[error("{0}")]
    Fault(Error),
}

impl From<Error> for Unwind {
    fn from(err: Error) -> Self {
        Unwind::Fault(err)
    }
}

pub type Flow<T> = std::result::Result<T, Unwind>;

/// Create a simple interpretation error
pub fn interpretation_error(message: impl Into<String>) -> Error {
    Error::Internal(message.into())
}

/// Create an interpretation error with a specific span
pub fn interpretation_error_with_span(message: impl Into<String>, span: Span) -> Error {
    Error::Internal(format!("{} [{}]", message.into(), span))
}

/// Create a generic error (when we don't have specific error information)
pub fn generic_error(message: impl Into<eyre::Error>) -> Error {
    Error::from(message.into())
}

/// A target panic with a string value.
pub fn panic_with(message: impl Into<String>) -> Unwind {
    let message: String = message.into();
    Unwind::Panic(Value::boxed(Type::string(), Value::string(message)))
}

/// A `runtime error: ...` panic.
pub fn runtime_error(message: impl std::fmt::Display) -> Unwind {
    panic_with(format!("runtime error: {}", message))
}

pub fn nil_dereference() -> Unwind {
    runtime_error("invalid memory address or nil pointer dereference")
}

/// Macro to return early with an interpretation error
#[macro_export]
macro_rules! interp_bail {
    ($message:expr) => {
        return Err($crate::error::interpretation_error($message).into())
    };
    ($message:expr, $span:expr) => {
        return Err($crate::error::interpretation_error_with_span($message, $span).into())
    };
}

/// Macro to ensure a condition is true, or return an interpretation error
#[macro_export]
macro_rules! interp_ensure {
    ($cond:expr, $message:expr) => {
        if !($cond) {
            $crate::interp_bail!($message);
        }
    };
    ($cond:expr, $message:expr, $span:expr) => {
        if !($cond) {
            $crate::interp_bail!($message, $span);
        }
    };
}

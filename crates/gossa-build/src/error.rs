use gossa_core::error::Error;
use gossa_core::span::Span;

/// Create a build error that is not tied to a source position
pub fn build_error(message: impl Into<String>) -> Error {
    Error::build(Span::none(), message, None)
}

/// Create a build error attributed to a package
pub fn package_error(package: &str, message: impl Into<String>) -> Error {
    Error::build(Span::none(), message, Some(package.to_string()))
}

/// Create a generic error (when we don't have specific error information)
pub fn generic_error(message: impl Into<eyre::Error>) -> Error {
    Error::from(message.into())
}

/// Macro to return early with a build error
#[macro_export]
macro_rules! build_bail {
    ($message:expr) => {
        return Err($crate::error::build_error($message))
    };
    ($package:expr, $message:expr) => {
        return Err($crate::error::package_error($package, $message))
    };
}

/// Macro to ensure a condition is true, or return a build error
#[macro_export]
macro_rules! build_ensure {
    ($cond:expr, $message:expr) => {
        if !($cond) {
            $crate::build_bail!($message);
        }
    };
    ($cond:expr, $package:expr, $message:expr) => {
        if !($cond) {
            $crate::build_bail!($package, $message);
        }
    };
}

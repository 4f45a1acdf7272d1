#[macro_use]
pub mod macros;

pub mod builtin;
pub mod collections;
pub mod config;
pub mod constant;
pub mod error;
pub mod ops;
pub mod span;
pub mod ssa;
pub mod syntax;
pub mod types;

// Re-export commonly used items for convenience
pub use tracing;

pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;

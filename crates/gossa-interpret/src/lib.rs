//! Register-machine interpreter for the SSA program.
//!
//! - [`value`] and [`ops`]: runtime values and the operations on them
//! - [`chan`]: channels, select and the goroutine scheduler
//! - [`frame`] and [`interpreter`]: activation records, dispatch and builtins
//! - [`hook`]: observers, stepping and breakpoints
//! - [`natives`]: host implementations of bodiless functions

pub mod chan;
pub mod error;
pub mod frame;
pub mod hook;
pub mod interpreter;
pub mod natives;
pub mod ops;
pub mod options;
pub mod value;

pub use error::{Flow, Unwind};
pub use frame::{Frame, Status};
pub use hook::{observer, Breakpoint, BreakpointTarget, Event, Observer, StepMode};
pub use interpreter::Interpreter;
pub use natives::NativeRegistry;
pub use options::{InterpreterOptions, Output};
pub use value::Value;

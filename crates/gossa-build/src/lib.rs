//! Lowering of typed syntax into the SSA program.
//!
//! - [`create`]: package members, created for every package up front
//! - [`package`]: package initializers and declared bodies
//! - [`builder`]: expressions, calls and statements of one function
//! - [`methods`]: wrappers and thunks synthesized on demand
//! - [`function`], [`emit`] and [`lvalue`]: per-function construction state and helpers

pub mod builder;
pub mod create;
pub mod emit;
pub mod error;
pub mod function;
pub mod lvalue;
pub mod methods;
pub mod options;
pub mod package;

pub use methods::method_value;
pub use options::BuildOptions;

use gossa_core::ssa::Program;
use gossa_core::syntax::SourceProgram;
use gossa_core::Result;
use rayon::prelude::*;
use std::sync::Arc;

/// Creates every package of `source`, then builds all bodies, in parallel
/// unless `options.serial` is set.
pub fn build_program(source: &SourceProgram, options: &BuildOptions) -> Result<Arc<Program>> {
    let program = Arc::new(Program::new());
    let created: Vec<_> = source
        .packages
        .iter()
        .map(|pkg| create::create_package(&program, source, pkg))
        .collect();
    for c in &created {
        program.add_package(c.package.clone());
    }

    gossa_core::debug!(
        "building {} packages ({})",
        created.len(),
        if options.serial { "serial" } else { "parallel" }
    );
    if options.serial {
        for c in &created {
            package::build_package(&program, source, c, options)?;
        }
    } else {
        created
            .par_iter()
            .map(|c| package::build_package(&program, source, c, options))
            .collect::<Result<Vec<()>>>()?;
    }
    Ok(program)
}

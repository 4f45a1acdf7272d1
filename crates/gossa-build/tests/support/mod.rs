#![allow(dead_code)]

use gossa_build::{build_program, BuildOptions};
use gossa_core::ssa::{BasicBlock, Function, FunctionBody, InstrKind, Program};
use gossa_core::syntax::SourceProgram;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn options() -> BuildOptions {
    BuildOptions::default().serial(true).sanity_check(true)
}

pub fn build(source: SourceProgram) -> Arc<Program> {
    build_with(source, options())
}

pub fn build_with(source: SourceProgram, options: BuildOptions) -> Arc<Program> {
    init_tracing();
    build_program(&source, &options).expect("program builds")
}

pub fn function(program: &Program, qualified: &str) -> Arc<Function> {
    program
        .lookup_function(qualified)
        .unwrap_or_else(|| panic!("unexpected: no function {}", qualified))
}

pub fn body(func: &Function) -> &FunctionBody {
    func.body()
        .unwrap_or_else(|| panic!("unexpected: {} has no body", func.name))
}

pub fn block<'a>(body: &'a FunctionBody, comment: &str) -> &'a BasicBlock {
    body.blocks
        .iter()
        .find(|b| b.comment == comment)
        .unwrap_or_else(|| panic!("unexpected: no block {}", comment))
}

pub fn comments(body: &FunctionBody) -> Vec<&str> {
    body.blocks.iter().map(|b| b.comment.as_str()).collect()
}

pub fn count(body: &FunctionBody, pred: impl Fn(&InstrKind) -> bool) -> usize {
    body.instructions().filter(|i| pred(&i.kind)).count()
}

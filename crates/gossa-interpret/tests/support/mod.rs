#![allow(dead_code)]

use gossa_build::{build_program, BuildOptions};
use gossa_core::ssa::{Function, Program};
use gossa_core::syntax::SourceProgram;
use gossa_interpret::{Interpreter, InterpreterOptions, Output, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn build(source: SourceProgram) -> Arc<Program> {
    build_with(source, true)
}

pub fn build_with(source: SourceProgram, debug_markers: bool) -> Arc<Program> {
    init_tracing();
    let options = BuildOptions::default()
        .serial(true)
        .sanity_check(true)
        .debug_markers(debug_markers);
    build_program(&source, &options).expect("program builds")
}

/// An interpreter whose output goes to the returned buffer.
pub fn interpreter(program: Arc<Program>) -> (Arc<Interpreter>, Arc<Mutex<String>>) {
    let (output, buffer) = Output::capture();
    let options = InterpreterOptions::default()
        .catch_internal_faults(true)
        .trace(false)
        .output(output);
    (Interpreter::new(program, options), buffer)
}

pub struct Run {
    pub code: i32,
    pub output: String,
}

pub fn run(source: SourceProgram) -> Run {
    let (interp, buffer) = interpreter(build(source));
    run_on(&interp, &buffer)
}

pub fn run_on(interp: &Arc<Interpreter>, buffer: &Arc<Mutex<String>>) -> Run {
    let code = interp.run_main("main").expect("run completes");
    let output = buffer.lock().clone();
    Run { code, output }
}

pub fn function(program: &Program, qualified: &str) -> Arc<Function> {
    program
        .lookup_function(qualified)
        .unwrap_or_else(|| panic!("unexpected: no function {}", qualified))
}

/// Calls `qualified` and expects it to return normally.
pub fn call(interp: &Arc<Interpreter>, qualified: &str, args: Vec<Value>) -> Value {
    let func = function(interp.program(), qualified);
    match interp.call_function(&func, args).expect("call thread runs") {
        Ok(value) => value,
        Err(unwind) => panic!("unexpected unwind from {}: {}", qualified, unwind),
    }
}

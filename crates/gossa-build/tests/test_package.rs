mod support;

use gossa_build::{build_program, BuildOptions};
use gossa_core::builtin::BuiltinKind;
use gossa_core::error::Error;
use gossa_core::ssa::{InstrKind, Member, Value};
use gossa_core::syntax::{SourceProgram, SyntaxFactory};
use gossa_core::types::Type;
use pretty_assertions::assert_eq;
use support::*;

/// Packages `a` and `b`, each with a global initialized from a call, and a
/// `main` importing both with an `init` of its own.
fn layered_source() -> SourceProgram {
    let mut f = SyntaxFactory::new();
    for path in ["a", "b"] {
        f.package(path, path, &[]);
        let seed = f.declare("seed", &[], &[Type::int()]);
        let one = f.int(1);
        let ret = f.ret(vec![one]);
        f.define(&seed, vec![ret]);
        let call = f.call_func(&seed, vec![]);
        f.global("V", Type::int(), Some(call));
    }
    f.package("main", "main", &["a", "b"]);
    let init = f.declare("init", &[], &[]);
    let msg = f.string("init");
    let print = f.builtin(BuiltinKind::Println, vec![msg]);
    let print = f.expr_stmt(print);
    f.define(&init, vec![print]);
    let main = f.declare("main", &[], &[]);
    f.define(&main, vec![]);
    f.finish()
}

fn called(body: &gossa_core::ssa::FunctionBody) -> Vec<String> {
    body.instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::Call(c) => match &c.callee {
                Value::Function(f) => Some(f.qualified_name()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

#[test]
fn package_initializer_runs_imports_then_own_inits_once() {
    let program = build(layered_source());
    let main = program.package("main").expect("main package");
    let init = body(&main.init);

    block(init, "init.start");
    let done = block(init, "init.done");
    assert!(matches!(
        done.terminator().map(|t| &t.kind),
        Some(InstrKind::Return { results }) if results.is_empty()
    ));
    assert!(matches!(
        init.entry().terminator().map(|t| &t.kind),
        Some(InstrKind::If { .. })
    ));
    assert_eq!(called(init), vec!["a.init", "b.init", "main.init#1"]);
    assert!(main.members.contains_key("init$guard"));
    assert_eq!(main.inits.len(), 1);
}

#[test]
fn package_variables_are_initialized_in_the_package_initializer() {
    let program = build(layered_source());
    let a = program.package("a").expect("package a");
    assert!(matches!(a.members.get("V"), Some(Member::Global(_))));
    let init = body(&a.init);
    assert_eq!(called(init), vec!["a.seed"]);
    // The guard store plus the store of V.
    assert_eq!(count(init, |k| matches!(k, InstrKind::Store { .. })), 2);
}

#[test]
fn source_init_functions_are_not_package_members() {
    let program = build(layered_source());
    let main = program.package("main").expect("main package");
    assert!(!main.members.contains_key("init"));
    assert!(main.members.contains_key("main"));
    assert_eq!(main.inits[0].qualified_name(), "main.init#1");
}

#[test]
fn missing_import_is_reported() {
    init_tracing();
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &["missing"]);
    let source = f.finish();

    let err = build_program(&source, &options()).expect_err("missing import must fail");
    match err {
        Error::Build(_, err) => {
            assert_eq!(err.package.as_deref(), Some("main"));
            assert!(err.message.contains("missing"), "{}", err.message);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn external_functions_have_no_body() {
    let mut f = SyntaxFactory::new();
    f.package("os", "os", &[]);
    f.declare("Exit", &[("code", Type::int())], &[]);
    let program = build(f.finish());

    let exit = function(&program, "os.Exit");
    assert!(exit.external);
    assert!(exit.body().is_none());
}

fn breakpoint_source() -> SourceProgram {
    let mut f = SyntaxFactory::new();
    f.package("runtime", "runtime", &[]);
    let bp = f.declare("Breakpoint", &[], &[]);
    f.package("main", "main", &["runtime"]);
    let main = f.declare("main", &[], &[]);
    let callee = f.qualified(None, bp.obj);
    let call = f.call(callee, vec![]);
    let call = f.expr_stmt(call);
    let one = f.int(1);
    let print = f.builtin(BuiltinKind::Println, vec![one]);
    let print = f.expr_stmt(print);
    f.define(&main, vec![call, print]);
    f.finish()
}

#[test]
fn runtime_breakpoint_becomes_a_marker_even_without_debug_markers() {
    let program = build_with(breakpoint_source(), options().debug_markers(false));
    let main = function(&program, "main.main");
    let body = body(&main);
    let traces: Vec<bool> = body
        .instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::Trace { breakpoint, .. } => Some(*breakpoint),
            _ => None,
        })
        .collect();
    assert_eq!(traces, vec![true]);
    assert!(called(body).is_empty());
}

#[test]
fn statement_markers_follow_the_option() {
    let with = build_with(breakpoint_source(), options().debug_markers(true));
    let without = build_with(breakpoint_source(), options().debug_markers(false));

    let markers = |program: &gossa_core::ssa::Program| {
        count(body(&function(program, "main.main")), |k| {
            matches!(k, InstrKind::Trace { breakpoint: false, .. })
        })
    };
    assert!(markers(&with) >= 2);
    assert_eq!(markers(&without), 0);
}

#[test]
fn markers_are_unique_within_a_function() {
    let program = build_with(breakpoint_source(), options().debug_markers(true));
    let main = function(&program, "main.main");
    let mut markers: Vec<u32> = body(&main)
        .instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::Trace { marker, .. } => Some(*marker),
            _ => None,
        })
        .collect();
    let total = markers.len();
    markers.sort_unstable();
    markers.dedup();
    assert_eq!(markers.len(), total);
}

#[test]
fn parallel_and_serial_builds_agree() {
    init_tracing();
    let source = layered_source();
    let serial = build_program(&source, &options()).expect("serial build");
    let parallel = build_program(&source, &BuildOptions::default().serial(false).sanity_check(true))
        .expect("parallel build");

    let render = |program: &gossa_core::ssa::Program| {
        let mut packages = program.packages();
        packages.sort_by(|a, b| a.path.cmp(&b.path));
        packages
            .iter()
            .flat_map(|p| p.functions())
            .map(|f| gossa_core::ssa::pretty::function_to_string(&f))
            .collect::<Vec<_>>()
    };
    assert_eq!(render(&serial), render(&parallel));
}

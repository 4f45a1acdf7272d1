mod support;

use gossa_core::builtin::BuiltinKind;
use gossa_core::ssa::{InstrKind, Program};
use gossa_core::syntax::{SourceProgram, SyntaxFactory};
use gossa_core::types::{ChanDir, Type};
use gossa_interpret::{observer, BreakpointTarget, Event, StepMode, Value};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use support::*;

/// `f(n)` prints `n`; `main` calls it three times.
fn three_calls() -> SourceProgram {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let callee = f.declare("f", &[("n", Type::int())], &[]);
    let n = f.ident(callee.param(0));
    let print = f.builtin(BuiltinKind::Println, vec![n]);
    let print = f.expr_stmt(print);
    f.define(&callee, vec![print]);

    let main = f.declare("main", &[], &[]);
    let calls = (1..=3)
        .map(|i| {
            let arg = f.int(i);
            let call = f.call_func(&callee, vec![arg]);
            f.expr_stmt(call)
        })
        .collect();
    f.define(&main, calls);
    f.finish()
}

fn first_marker(program: &Program, qualified: &str) -> u32 {
    let func = function(program, qualified);
    let body = func.body().expect("function has a body");
    body.blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .find_map(|i| match &i.kind {
            InstrKind::Trace { marker, breakpoint: false, .. } => Some(*marker),
            _ => None,
        })
        .unwrap_or_else(|| panic!("unexpected: {} has no trace marker", qualified))
}

#[test]
fn function_breakpoint_stops_on_every_call() {
    let (interp, buffer) = interpreter(build(three_calls()));
    let id = interp.add_breakpoint(BreakpointTarget::Function("main.f".to_string()));
    let stops = Arc::new(Mutex::new(Vec::new()));
    let seen = stops.clone();
    interp.set_hook(Some(observer(move |frame, _, event| {
        if let Event::Breakpoint(hit) = event {
            seen.lock()
                .push((*hit, frame.function().qualified_name(), frame.step_mode()));
        }
    })));

    let run = run_on(&interp, &buffer);
    assert_eq!(run.code, 0);
    assert_eq!(run.output, "1\n2\n3\n");
    let expected = vec![(id, "main.f".to_string(), StepMode::None); 3];
    assert_eq!(*stops.lock(), expected);
    assert_eq!(interp.breakpoint(id).map(|b| b.hits), Some(3));
}

#[test]
fn ignore_count_and_one_shot_limit_stops() {
    let (interp, buffer) = interpreter(build(three_calls()));
    let skipped = interp.add_breakpoint(BreakpointTarget::Function("main.f".to_string()));
    assert!(interp.set_ignore_count(skipped, 2));
    let once = interp.add_breakpoint(BreakpointTarget::Function("main.f".to_string()));
    assert!(interp.set_one_shot(once, true));
    let stops = Arc::new(Mutex::new(Vec::new()));
    let seen = stops.clone();
    interp.add_observer(observer(move |_, _, event| {
        if let Event::Breakpoint(hit) = event {
            seen.lock().push(*hit);
        }
    }));

    run_on(&interp, &buffer);
    assert_eq!(*stops.lock(), vec![once, skipped]);
    assert!(interp.breakpoint(once).is_none());
    assert_eq!(interp.breakpoint(skipped).map(|b| b.hits), Some(3));
}

#[test]
fn disabled_breakpoints_report_nothing() {
    let (interp, buffer) = interpreter(build(three_calls()));
    let id = interp.add_breakpoint(BreakpointTarget::Function("main.f".to_string()));
    assert!(interp.enable_breakpoint(id, false));
    let events = Arc::new(Mutex::new(0usize));
    let count = events.clone();
    interp.set_hook(Some(observer(move |_, _, event| {
        if matches!(event, Event::Breakpoint(_)) {
            *count.lock() += 1;
        }
    })));

    run_on(&interp, &buffer);
    assert_eq!(*events.lock(), 0);
    assert!(interp.delete_breakpoint(id));
    assert!(interp.breakpoints().is_empty());
}

#[test]
fn marker_breakpoint_stops_inside_the_function() {
    let program = build_with(three_calls(), true);
    let marker = first_marker(&program, "main.f");
    let (interp, buffer) = interpreter(program);
    let id = interp.add_breakpoint(BreakpointTarget::Marker {
        function: "main.f".to_string(),
        marker,
    });
    let stops = Arc::new(Mutex::new(Vec::new()));
    let seen = stops.clone();
    interp.set_hook(Some(observer(move |frame, instr, event| {
        if let Event::Breakpoint(hit) = event {
            let at_marker = matches!(
                instr.map(|i| &i.kind),
                Some(InstrKind::Trace { marker: m, .. }) if *m == marker
            );
            seen.lock().push((*hit, frame.function().name.clone(), at_marker));
        }
    })));

    run_on(&interp, &buffer);
    assert_eq!(*stops.lock(), vec![(id, "f".to_string(), true); 3]);
}

#[test]
fn stepping_in_from_a_breakpoint_reports_callee_entry() {
    let (interp, buffer) = interpreter(build(three_calls()));
    interp.add_breakpoint(BreakpointTarget::Function("main.main".to_string()));
    let entered = Arc::new(Mutex::new(Vec::new()));
    let seen = entered.clone();
    interp.set_hook(Some(observer(move |frame, _, event| match event {
        Event::Breakpoint(_) => frame.set_step_mode(StepMode::StepIn),
        Event::CallEnter => seen.lock().push(frame.function().qualified_name()),
        _ => {}
    })));

    let run = run_on(&interp, &buffer);
    assert_eq!(run.code, 0);
    assert_eq!(*entered.lock(), vec!["main.f".to_string(); 3]);
}

#[test]
fn step_over_is_not_inherited_by_callees() {
    let (interp, buffer) = interpreter(build_with(three_calls(), false));
    interp.add_breakpoint(BreakpointTarget::Function("main.main".to_string()));
    let reported = Arc::new(Mutex::new(Vec::new()));
    let seen = reported.clone();
    interp.set_hook(Some(observer(move |frame, _, event| match event {
        Event::Breakpoint(_) => frame.set_step_mode(StepMode::StepOver),
        Event::BlockEnd | Event::CallReturn => seen.lock().push(frame.function().qualified_name()),
        _ => {}
    })));

    run_on(&interp, &buffer);
    let reported = reported.lock();
    assert!(!reported.is_empty());
    assert!(reported.iter().all(|name| name == "main.main"), "{:?}", *reported);
}

#[test]
fn runtime_breakpoint_call_stops_without_registered_breakpoints() {
    let mut f = SyntaxFactory::new();
    f.package("runtime", "runtime", &[]);
    let bp = f.declare("Breakpoint", &[], &[]);
    f.package("main", "main", &["runtime"]);
    let main = f.declare("main", &[], &[]);
    let callee = f.qualified(None, bp.obj);
    let call = f.call(callee, vec![]);
    let call = f.expr_stmt(call);
    let msg = f.string("after");
    let print = f.builtin(BuiltinKind::Println, vec![msg]);
    let print = f.expr_stmt(print);
    f.define(&main, vec![call, print]);

    let (interp, buffer) = interpreter(build_with(f.finish(), false));
    let stops = Arc::new(Mutex::new(Vec::new()));
    let seen = stops.clone();
    interp.set_hook(Some(observer(move |_, _, event| {
        if let Event::Breakpoint(id) = event {
            seen.lock().push(*id);
        }
    })));

    let run = run_on(&interp, &buffer);
    assert_eq!(run.code, 0);
    assert_eq!(run.output, "after\n");
    assert_eq!(*stops.lock(), vec![0]);
}

#[test]
fn observers_see_program_exit_after_the_primary_hook() {
    let (interp, buffer) = interpreter(build(three_calls()));
    let order = Arc::new(Mutex::new(Vec::new()));
    let primary = order.clone();
    interp.set_hook(Some(observer(move |_, _, event| {
        if let Event::ProgramExit(code) = event {
            primary.lock().push(("hook", *code));
        }
    })));
    let chained = order.clone();
    interp.add_observer(observer(move |_, _, event| {
        if let Event::ProgramExit(code) = event {
            chained.lock().push(("observer", *code));
        }
    }));

    run_on(&interp, &buffer);
    assert_eq!(*order.lock(), vec![("hook", 0), ("observer", 0)]);
}

fn answer_source() -> SourceProgram {
    let mut f = SyntaxFactory::new();
    f.package("env", "env", &[]);
    let answer = f.declare("Answer", &[("base", Type::int())], &[Type::int()]);
    f.package("main", "main", &["env"]);
    let main = f.declare("main", &[], &[]);
    let callee = f.qualified(None, answer.obj);
    let base = f.int(40);
    let call = f.call(callee, vec![base]);
    let print = f.builtin(BuiltinKind::Println, vec![call]);
    let print = f.expr_stmt(print);
    f.define(&main, vec![print]);
    f.finish()
}

#[test]
fn registered_natives_implement_external_functions() {
    let (interp, buffer) = interpreter(build(answer_source()));
    interp.register_native("env.Answer", |_, args| match args.first() {
        Some(Value::Int(base)) => Ok(Value::Int(base + 2)),
        other => Err(gossa_core::error::Error::internal(format!("bad argument {:?}", other))),
    });

    let run = run_on(&interp, &buffer);
    assert_eq!(run.code, 0);
    assert_eq!(run.output, "42\n");
}

#[test]
fn calling_an_unimplemented_external_is_a_fatal_error() {
    let run = run(answer_source());
    assert_eq!(run.code, 2);
    assert!(run.output.starts_with("fatal error:"), "output: {}", run.output);
    assert!(run.output.contains("env.Answer"), "output: {}", run.output);
}

/// `env.Boom()` called from `main`, or started with `go` while `main`
/// blocks receiving from a channel nobody sends on.
fn boom_source(in_goroutine: bool) -> SourceProgram {
    let mut f = SyntaxFactory::new();
    f.package("env", "env", &[]);
    let boom = f.declare("Boom", &[], &[]);
    f.package("main", "main", &["env"]);
    let main = f.declare("main", &[], &[]);
    let callee = f.qualified(None, boom.obj);
    let call = f.call(callee, vec![]);
    if !in_goroutine {
        let call = f.expr_stmt(call);
        f.define(&main, vec![call]);
        return f.finish();
    }
    let chan = Type::chan(ChanDir::Both, Type::int());
    let c = f.local("c", chan.clone());
    let ty = f.type_expr(chan);
    let make = f.builtin(BuiltinKind::Make, vec![ty]);
    let def = f.define_vars(&[c], vec![make]);
    let go = f.go(call);
    let rc = f.ident(c);
    let wait = f.recv(rc);
    let wait = f.expr_stmt(wait);
    f.define(&main, vec![def, go, wait]);
    f.finish()
}

fn run_with_boom(in_goroutine: bool) -> Run {
    let (interp, buffer) = interpreter(build(boom_source(in_goroutine)));
    interp.register_native("env.Boom", |_, _| panic!("native exploded"));
    let (done, finished) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = done.send(run_on(&interp, &buffer));
    });
    finished
        .recv_timeout(Duration::from_secs(30))
        .expect("run finishes instead of hanging")
}

#[test]
fn host_panic_in_a_native_is_a_fatal_error() {
    let run = run_with_boom(false);
    assert_eq!(run.code, 2);
    assert!(run.output.starts_with("fatal error:"), "output: {}", run.output);
    assert!(run.output.contains("native exploded"), "output: {}", run.output);
}

#[test]
fn host_panic_in_a_goroutine_ends_the_run() {
    let run = run_with_boom(true);
    assert_eq!(run.code, 2);
    assert!(run.output.contains("native exploded"), "output: {}", run.output);
    assert!(!run.output.contains("deadlock"), "output: {}", run.output);
}

/// `runtime.Breakpoint()` followed by a call to `f`.
fn breakpoint_then_call() -> SourceProgram {
    let mut f = SyntaxFactory::new();
    f.package("runtime", "runtime", &[]);
    let bp = f.declare("Breakpoint", &[], &[]);
    f.package("main", "main", &["runtime"]);
    let callee = f.declare("f", &[], &[]);
    f.define(&callee, vec![]);
    let main = f.declare("main", &[], &[]);
    let stop = f.qualified(None, bp.obj);
    let stop = f.call(stop, vec![]);
    let stop = f.expr_stmt(stop);
    let call = f.call_func(&callee, vec![]);
    let call = f.expr_stmt(call);
    f.define(&main, vec![stop, call]);
    f.finish()
}

fn stepped_events(tracing: bool) -> Vec<String> {
    let (interp, buffer) = interpreter(build_with(breakpoint_then_call(), false));
    interp.set_tracing(tracing);
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = events.clone();
    interp.set_hook(Some(observer(move |frame, _, event| match event {
        Event::Breakpoint(_) => frame.set_step_mode(StepMode::StepIn),
        Event::CallEnter | Event::CallReturn | Event::BlockEnd | Event::Panic => {
            seen.lock().push(format!("{:?} {}", event, frame.function().qualified_name()))
        }
        _ => {}
    })));

    let run = run_on(&interp, &buffer);
    assert_eq!(run.code, 0);
    let events = events.lock().clone();
    events
}

#[test]
fn stepping_reports_nothing_while_tracing_is_off() {
    assert_eq!(stepped_events(false), Vec::<String>::new());
    let traced = stepped_events(true);
    assert!(traced.iter().any(|e| e.ends_with("main.f")), "{:?}", traced);
}

#[test]
fn stepping_out_resumes_reporting_in_the_caller() {
    let (interp, buffer) = interpreter(build_with(three_calls(), false));
    interp.add_breakpoint(BreakpointTarget::Function("main.f".to_string()));
    let reported = Arc::new(Mutex::new(Vec::new()));
    let seen = reported.clone();
    interp.set_hook(Some(observer(move |frame, _, event| match event {
        Event::Breakpoint(_) => frame.set_step_mode(StepMode::StepOut),
        Event::CallEnter | Event::BlockEnd | Event::CallReturn => {
            seen.lock().push((frame.function().qualified_name(), event.clone()))
        }
        _ => {}
    })));

    let run = run_on(&interp, &buffer);
    assert_eq!(run.code, 0);
    let reported = reported.lock();
    assert!(reported.iter().all(|(name, _)| name == "main.main"), "{:?}", *reported);
    assert_eq!(reported.last().map(|(_, e)| e.clone()), Some(Event::CallReturn));
}

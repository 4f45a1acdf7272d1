mod support;

use gossa_build::method_value;
use gossa_core::builtin::BuiltinKind;
use gossa_core::ssa::sanity;
use gossa_core::ssa::{AllocPolicy, InstrKind, Value};
use gossa_core::syntax::{SourceProgram, SyntaxFactory};
use gossa_core::types::Type;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::*;

/// `type T struct{ x int }` with a value method `Get` and a pointer method
/// `Set`, plus `counter`, which returns a closure over a local.
fn source() -> (SourceProgram, Type) {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let t = f.named_type("T", SyntaxFactory::struct_type(&[("x", Type::int())]));

    let get = f.declare_method(("t", t.clone()), "Get", &[], &[Type::int()]);
    let recv = f.ident(get.recv.expect("receiver"));
    let x = f.select(recv, "x");
    let ret = f.ret(vec![x]);
    f.define(&get, vec![ret]);

    let set = f.declare_method(("p", Type::pointer(t.clone())), "Set", &[("v", Type::int())], &[]);
    let recv = f.ident(set.recv.expect("receiver"));
    let x = f.select(recv, "x");
    let v = f.ident(set.param(0));
    let store = f.assign(vec![x], vec![v]);
    f.define(&set, vec![store]);

    let counter = f.declare("counter", &[], &[Type::func(vec![], vec![Type::int()], false)]);
    let n = f.local("n", Type::int());
    let zero = f.int(0);
    let init = f.define_vars(&[n], vec![zero]);
    let lit = f.func_lit(&[], &[Type::int()], |f, _| {
        let x = f.ident(n);
        let inc = f.inc(x);
        let r = f.ident(n);
        let ret = f.ret(vec![r]);
        vec![inc, ret]
    });
    let ret = f.ret(vec![lit]);
    f.define(&counter, vec![init, ret]);

    let bound = f.declare("bound", &[("t", t.clone())], &[Type::int()]);
    let recv = f.ident(bound.param(0));
    let get = f.select(recv, "Get");
    let call = f.call(get, vec![]);
    let ret = f.ret(vec![call]);
    f.define(&bound, vec![ret]);

    let value = f.declare("value", &[("t", t.clone())], &[Type::func(vec![], vec![Type::int()], false)]);
    let recv = f.ident(value.param(0));
    let get = f.select(recv, "Get");
    let ret = f.ret(vec![get]);
    f.define(&value, vec![ret]);

    (f.finish(), t)
}

#[test]
fn captured_local_escapes_to_the_heap() {
    let (source, _) = source();
    let program = build(source);
    let counter = function(&program, "main.counter");
    let body = body(&counter);

    let bindings: Vec<usize> = body
        .instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::MakeClosure { bindings, .. } => Some(bindings.len()),
            _ => None,
        })
        .collect();
    assert_eq!(bindings, vec![1]);
    assert_eq!(
        count(body, |k| matches!(k, InstrKind::Alloc { policy: AllocPolicy::Heap, .. })),
        1
    );
    assert_eq!(body.anon_funcs.len(), 1);

    let lit = function(&program, "main.counter$1");
    let lit_body = self::body(&lit);
    assert_eq!(
        lit_body.free_vars.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
        vec!["n"]
    );
    assert!(lit.parent().is_some_and(|p| Arc::ptr_eq(&p, &counter)));
    assert!(sanity::check_function(&lit).is_ok());
}

#[test]
fn value_method_set_entry_is_the_declared_method() {
    let (source, t) = source();
    let program = build(source);
    let get = method_value(&program, &t, "Get").expect("T has Get");
    assert!(get.synthetic.is_none());
    assert_eq!(get.qualified_name(), "(main.T).Get");
    assert!(method_value(&program, &t, "Set").is_none());
}

#[test]
fn value_method_through_pointer_gets_a_nil_checking_wrapper() {
    let (source, t) = source();
    let program = build(source);
    let ptr = Type::pointer(t);
    let wrapper = method_value(&program, &ptr, "Get").expect("*T has Get");
    assert!(wrapper.synthetic.is_some());
    assert_eq!(wrapper.qualified_name(), "(*main.T).Get");

    let body = body(&wrapper);
    let nil_checks = count(body, |k| {
        matches!(k, InstrKind::Call(c) if matches!(c.callee, Value::Builtin(BuiltinKind::WrapNilCheck, _)))
    });
    assert_eq!(nil_checks, 1);
    assert!(sanity::check_function(&wrapper).is_ok());

    let again = method_value(&program, &ptr, "Get").expect("cached");
    assert!(Arc::ptr_eq(&wrapper, &again));

    let set = method_value(&program, &ptr, "Set").expect("*T has Set");
    assert!(set.synthetic.is_none());
}

#[test]
fn static_method_call_passes_the_receiver_first() {
    let (source, _) = source();
    let program = build(source);
    let bound = function(&program, "main.bound");
    let calls: Vec<(String, usize)> = body(&bound)
        .instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::Call(c) => match &c.callee {
                Value::Function(f) => Some((f.qualified_name(), c.args.len())),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(calls, vec![("(main.T).Get".to_string(), 1)]);
}

#[test]
fn method_value_closes_over_the_receiver() {
    let (source, _) = source();
    let program = build(source);
    let value = function(&program, "main.value");
    let closures: Vec<(String, usize)> = body(&value)
        .instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::MakeClosure { func, bindings } => Some((func.qualified_name(), bindings.len())),
            _ => None,
        })
        .collect();
    assert_eq!(closures, vec![("(main.T).Get$bound".to_string(), 1)]);
}

#[test]
fn method_expressions_call_through_thunks() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let t = f.named_type("T", SyntaxFactory::struct_type(&[("x", Type::int())]));
    let get = f.declare_method(("t", t.clone()), "Get", &[], &[Type::int()]);
    let recv = f.ident(get.recv.expect("receiver"));
    let x = f.select(recv, "x");
    let ret = f.ret(vec![x]);
    f.define(&get, vec![ret]);
    let set = f.declare_method(("p", Type::pointer(t.clone())), "Set", &[("v", Type::int())], &[]);
    let recv = f.ident(set.recv.expect("receiver"));
    let x = f.select(recv, "x");
    let v = f.ident(set.param(0));
    let store = f.assign(vec![x], vec![v]);
    f.define(&set, vec![store]);

    let apply = f.declare("apply", &[("p", Type::pointer(t.clone()))], &[Type::int()]);
    let setter = f.method_expr(Type::pointer(t.clone()), "Set");
    let p = f.ident(apply.param(0));
    let nine = f.int(9);
    let call = f.call(setter, vec![p, nine]);
    let call = f.expr_stmt(call);
    let getter = f.method_expr(t, "Get");
    let p = f.ident(apply.param(0));
    let value = f.star(p);
    let got = f.call(getter, vec![value]);
    let ret = f.ret(vec![got]);
    f.define(&apply, vec![call, ret]);
    let program = build(f.finish());

    let apply = function(&program, "main.apply");
    let mut thunks: Vec<Arc<gossa_core::ssa::Function>> = body(&apply)
        .instructions()
        .flat_map(|i| i.kind.operands().into_iter().cloned().collect::<Vec<_>>())
        .filter_map(|v| match v {
            Value::Function(func) if func.name.ends_with("$thunk") => Some(func),
            _ => None,
        })
        .collect();
    thunks.dedup_by(|a, b| Arc::ptr_eq(a, b));
    let names: Vec<String> = thunks.iter().map(|t| t.qualified_name()).collect();
    assert_eq!(names.len(), 2, "{:?}", names);
    assert!(names[0].ends_with(".Set$thunk"), "{:?}", names);
    assert!(names[1].ends_with(".Get$thunk"), "{:?}", names);

    // The receiver is the first ordinary parameter of the thunk, which
    // calls the declared method.
    let params: Vec<usize> = thunks
        .iter()
        .map(|t| t.sig.signature().map(|s| s.params.len()).unwrap_or_default())
        .collect();
    assert_eq!(params, vec![2, 1]);
    assert!(thunks.iter().all(|t| sanity::check_function(t).is_ok()));
    let calls: Vec<String> = thunks
        .iter()
        .flat_map(|t| {
            body(t)
                .instructions()
                .filter_map(|i| match &i.kind {
                    InstrKind::Call(c) => match &c.callee {
                        Value::Function(f) => Some(f.qualified_name()),
                        _ => None,
                    },
                    _ => None,
                })
                .collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(calls.len(), 2, "{:?}", calls);
    assert!(calls[0].ends_with(".Set") && !calls[0].contains('$'), "{:?}", calls);
    assert_eq!(calls[1], "(main.T).Get");
}

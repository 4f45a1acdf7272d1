mod support;

use gossa_core::builtin::BuiltinKind;
use gossa_core::ops::BinaryOp;
use gossa_core::ssa::sanity;
use gossa_core::ssa::{AllocPolicy, InstrKind, Value};
use gossa_core::syntax::{BranchKind, SourceProgram, SyntaxFactory};
use gossa_core::types::{ChanDir, Type};
use pretty_assertions::assert_eq;
use support::*;

fn gcd_source() -> SourceProgram {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let gcd = f.declare("gcd", &[("a", Type::int()), ("b", Type::int())], &[Type::int()]);
    let (a, b) = (gcd.param(0), gcd.param(1));

    let x = f.ident(b);
    let zero = f.int(0);
    let cond = f.binary(BinaryOp::Neq, x, zero);
    let ra = f.ident(a);
    let rb = f.ident(b);
    let rem = f.binary(BinaryOp::Rem, ra, rb);
    let lhs = vec![f.ident(a), f.ident(b)];
    let rb = f.ident(b);
    let swap = f.assign(lhs, vec![rb, rem]);
    let lp = f.for_stmt(None, Some(cond), None, vec![swap]);
    let ra = f.ident(a);
    let ret = f.ret(vec![ra]);
    f.define(&gcd, vec![lp, ret]);
    f.finish()
}

#[test]
fn every_block_has_the_successors_its_terminator_demands() {
    let program = build(gcd_source());
    let gcd = function(&program, "main.gcd");
    let body = body(&gcd);

    for block in &body.blocks {
        let term = block
            .terminator()
            .unwrap_or_else(|| panic!("unexpected: block {} is unterminated", block.index));
        if let Some(n) = term.kind.successor_count() {
            assert_eq!(block.succs.len(), n, "block {} ({})", block.index, block.comment);
        }
        for succ in &block.succs {
            assert!(body.blocks[*succ].preds.contains(&block.index));
        }
    }
    let report = sanity::check_function(&gcd);
    assert!(report.is_ok(), "{:?}", report.issues);
    assert!(report.unreachable.is_empty());
}

#[test]
fn condition_loop_uses_loop_body_and_exit_blocks() {
    let program = build(gcd_source());
    let gcd = function(&program, "main.gcd");
    let comments = comments(body(&gcd));
    assert_eq!(comments[0], "entry");
    for expected in ["for.loop", "for.body", "for.done"] {
        assert!(comments.contains(&expected), "{} missing from {:?}", expected, comments);
    }
    assert!(!comments.contains(&"for.post"));
}

#[test]
fn short_circuit_with_constant_lhs_keeps_both_edges() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let h = f.declare("h", &[("x", Type::bool())], &[Type::bool()]);
    let lhs = f.boolean(false);
    let rhs = f.ident(h.param(0));
    let and = f.binary(BinaryOp::LAnd, lhs, rhs);
    let ret = f.ret(vec![and]);
    f.define(&h, vec![ret]);
    let program = build(f.finish());

    let h = function(&program, "main.h");
    let body = body(&h);
    block(body, "binop.rhs");
    let done = block(body, "binop.done");
    let phi = done.phis().next().expect("binop.done starts with a phi");
    match &phi.kind {
        InstrKind::Phi { edges, .. } => {
            assert_eq!(edges.len(), done.preds.len());
            assert_eq!(edges.len(), 2);
        }
        other => panic!("unexpected instruction {:?}", other),
    }
}

#[test]
fn code_after_return_is_dropped() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let d = f.declare("d", &[], &[Type::int()]);
    let one = f.int(1);
    let ret = f.ret(vec![one]);
    let msg = f.string("dead");
    let print = f.builtin(BuiltinKind::Println, vec![msg]);
    let dead = f.expr_stmt(print);
    f.define(&d, vec![ret, dead]);
    let program = build(f.finish());

    let d = function(&program, "main.d");
    let body = body(&d);
    assert_eq!(body.blocks.len(), 1);
    assert_eq!(count(body, |k| matches!(k, InstrKind::Call(_))), 0);
    assert!(sanity::check_function(&d).unreachable.is_empty());
}

#[test]
fn break_out_of_infinite_loop_reaches_exit() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let spin = f.declare("spin", &[], &[]);
    let brk = f.branch(BranchKind::Break, None);
    let lp = f.for_stmt(None, None, None, vec![brk]);
    f.define(&spin, vec![lp]);
    let program = build(f.finish());

    let spin = function(&program, "main.spin");
    let body = body(&spin);
    let done = block(body, "for.done");
    assert!(!done.preds.is_empty());
    assert!(matches!(
        done.terminator().map(|t| &t.kind),
        Some(InstrKind::Return { .. })
    ));
}

#[test]
fn deferred_call_gets_a_recover_block() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let g = f.declare_named_results("g", &[], &[("r", Type::int())]);
    let msg = f.string("deferred");
    let print = f.builtin(BuiltinKind::Println, vec![msg]);
    let defer = f.defer(print);
    let r = f.ident(g.results[0]);
    let seven = f.int(7);
    let set = f.assign(vec![r], vec![seven]);
    let ret = f.ret(vec![]);
    f.define(&g, vec![defer, set, ret]);
    let program = build(f.finish());

    let g = function(&program, "main.g");
    let body = body(&g);
    let recover = body.recover.expect("recover block");
    let block = &body.blocks[recover];
    assert_eq!(block.comment, "recover");
    assert!(block.preds.is_empty());
    match block.instrs.as_slice() {
        [load, ret] => {
            assert!(matches!(load.kind, InstrKind::UnOp { .. }));
            match &ret.kind {
                InstrKind::Return { results } => assert_eq!(results.len(), 1),
                other => panic!("unexpected terminator {:?}", other),
            }
        }
        other => panic!("unexpected recover block {:?}", other),
    }
    assert_eq!(count(body, |k| matches!(k, InstrKind::Defer(_))), 1);
    assert_eq!(count(body, |k| matches!(k, InstrKind::RunDefers)), 1);
    assert!(sanity::check_function(&g).is_ok());
}

#[test]
fn select_without_default_blocks_and_panics_when_unmatched() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let chan = Type::chan(ChanDir::Both, Type::int());
    let s = f.declare("s", &[("a", chan.clone()), ("b", chan)], &[]);
    let v = f.local("v", Type::int());

    let lhs = vec![f.ident(v)];
    let ch = f.ident(s.param(0));
    let first = f.recv_comm(lhs, true, ch);
    let pv = f.ident(v);
    let print = f.builtin(BuiltinKind::Println, vec![pv]);
    let print = f.expr_stmt(print);
    let ch = f.ident(s.param(1));
    let second = f.recv_comm(vec![], false, ch);
    let sel = f.select_stmt(vec![(Some(first), vec![print]), (Some(second), vec![])]);
    f.define(&s, vec![sel]);
    let program = build(f.finish());

    let s = function(&program, "main.s");
    let body = body(&s);
    let selects: Vec<_> = body
        .instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::Select { states, blocking } => Some((states.len(), *blocking)),
            _ => None,
        })
        .collect();
    assert_eq!(selects, vec![(2, true)]);
    assert_eq!(count(body, |k| matches!(k, InstrKind::Panic { .. })), 1);
    assert_eq!(
        comments(body).iter().filter(|c| **c == "select.body").count(),
        2
    );
}

#[test]
fn select_with_default_does_not_block() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let chan = Type::chan(ChanDir::Both, Type::int());
    let s = f.declare("s", &[("a", chan)], &[]);
    let ch = f.ident(s.param(0));
    let one = f.int(1);
    let send = gossa_core::syntax::CommOp::Send { chan: ch, value: one };
    let sel = f.select_stmt(vec![(Some(send), vec![]), (None, vec![])]);
    f.define(&s, vec![sel]);
    let program = build(f.finish());

    let s = function(&program, "main.s");
    let body = body(&s);
    assert_eq!(
        count(body, |k| matches!(k, InstrKind::Select { blocking: false, .. })),
        1
    );
    assert_eq!(count(body, |k| matches!(k, InstrKind::Panic { .. })), 0);
}

#[test]
fn range_over_slice_counts_through_an_index() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let sum = f.declare("sum", &[("xs", Type::slice(Type::int()))], &[Type::int()]);
    let total = f.local("total", Type::int());
    let v = f.local("v", Type::int());

    let zero = f.int(0);
    let init = f.define_vars(&[total], vec![zero]);
    let t = f.ident(total);
    let pv = f.ident(v);
    let add = f.op_assign(BinaryOp::Add, t, pv);
    let value = f.ident(v);
    let xs = f.ident(sum.param(0));
    let range = f.range_stmt(None, Some(value), true, xs, vec![add]);
    let t = f.ident(total);
    let ret = f.ret(vec![t]);
    f.define(&sum, vec![init, range, ret]);
    let program = build(f.finish());

    let sum = function(&program, "main.sum");
    let body = body(&sum);
    for expected in ["rangeindex.loop", "rangeindex.body", "rangeindex.done"] {
        block(body, expected);
    }
    assert_eq!(count(body, |k| matches!(k, InstrKind::Next { .. })), 0);
    let len_calls = count(body, |k| {
        matches!(k, InstrKind::Call(c) if matches!(c.callee, Value::Builtin(BuiltinKind::Len, _)))
    });
    assert_eq!(len_calls, 1);
    assert!(sanity::check_function(&sum).is_ok());
}

#[test]
fn range_over_map_uses_an_iterator() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let m = Type::map(Type::string(), Type::int());
    let keys = f.declare("keys", &[("m", m)], &[]);
    let k = f.local("k", Type::string());
    let key = f.ident(k);
    let pk = f.ident(k);
    let print = f.builtin(BuiltinKind::Println, vec![pk]);
    let print = f.expr_stmt(print);
    let x = f.ident(keys.param(0));
    let range = f.range_stmt(Some(key), None, true, x, vec![print]);
    f.define(&keys, vec![range]);
    let program = build(f.finish());

    let keys = function(&program, "main.keys");
    let body = body(&keys);
    block(body, "rangeiter.loop");
    assert_eq!(count(body, |k| matches!(k, InstrKind::Range { .. })), 1);
    assert_eq!(
        count(body, |k| matches!(k, InstrKind::Next { is_string: false, .. })),
        1
    );
}

#[test]
fn locals_stay_on_the_stack_unless_captured() {
    let program = build(gcd_source());
    let gcd = function(&program, "main.gcd");
    let heap = count(body(&gcd), |k| {
        matches!(k, InstrKind::Alloc { policy: AllocPolicy::Heap, .. })
    });
    assert_eq!(heap, 0);
}

fn heap_allocs(body: &gossa_core::ssa::FunctionBody) -> Vec<String> {
    body.instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::Alloc {
                policy: AllocPolicy::Heap,
                comment,
                ..
            } => Some(comment.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn taking_an_address_moves_only_that_variable_to_the_heap() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let t = f.named_type("T", SyntaxFactory::struct_type(&[("x", Type::int())]));
    let escape = f.declare("escape", &[("n", Type::int())], &[Type::pointer(Type::int())]);
    let x = f.local("x", Type::int());
    let y = f.local("y", Type::int());
    let n = f.ident(escape.param(0));
    let def_x = f.define_vars(&[x], vec![n]);
    let n = f.ident(escape.param(0));
    let def_y = f.define_vars(&[y], vec![n]);
    let yv = f.ident(y);
    let bump = f.inc(yv);
    let xv = f.ident(x);
    let addr = f.addr_of(xv);
    let ret = f.ret(vec![addr]);
    f.define(&escape, vec![def_x, def_y, bump, ret]);

    let fresh = f.declare("fresh", &[], &[Type::pointer(t.clone())]);
    let lit = f.composite(t, vec![]);
    let addr = f.addr_of(lit);
    let ret = f.ret(vec![addr]);
    f.define(&fresh, vec![ret]);
    let program = build(f.finish());

    let escape = function(&program, "main.escape");
    assert_eq!(heap_allocs(body(&escape)), vec!["x".to_string()]);
    let fresh = function(&program, "main.fresh");
    assert_eq!(heap_allocs(body(&fresh)), vec!["complit".to_string()]);
}

fn print_text(f: &mut SyntaxFactory, text: &str) -> gossa_core::syntax::Stmt {
    let msg = f.string(text);
    let call = f.builtin(BuiltinKind::Println, vec![msg]);
    f.expr_stmt(call)
}

/// `switch n { case 0: ...; default: ...; case 1, 2: ...; fallthrough;
/// case 3: ... }`
fn describe_source() -> SourceProgram {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let describe = f.declare("describe", &[("n", Type::int())], &[]);
    let zero = f.int(0);
    let on_zero = print_text(&mut f, "zero");
    let on_default = print_text(&mut f, "other");
    let (one, two) = (f.int(1), f.int(2));
    let on_small = print_text(&mut f, "small");
    let fall = f.branch(BranchKind::Fallthrough, None);
    let three = f.int(3);
    let on_three = print_text(&mut f, "three-ish");
    let tag = f.ident(describe.param(0));
    let switch = f.switch_stmt(
        None,
        Some(tag),
        vec![
            (vec![zero], vec![on_zero]),
            (vec![], vec![on_default]),
            (vec![one, two], vec![on_small, fall]),
            (vec![three], vec![on_three]),
        ],
    );
    f.define(&describe, vec![switch]);
    f.finish()
}

#[test]
fn expression_switch_tests_every_case_before_the_default() {
    let program = build(describe_source());
    let describe = function(&program, "main.describe");
    let body = body(&describe);
    let comments = comments(body);
    assert_eq!(comments.iter().filter(|c| **c == "switch.body").count(), 4);
    assert_eq!(comments.iter().filter(|c| **c == "switch.next").count(), 4);
    assert_eq!(
        count(body, |k| matches!(k, InstrKind::BinOp { op: BinaryOp::Eql, .. })),
        4
    );

    let is_body = |b: usize| body.blocks[b].comment == "switch.body";
    // Only the fallthrough edge joins two case bodies.
    let body_to_body = body
        .blocks
        .iter()
        .filter(|b| b.comment == "switch.body" && b.succs.iter().all(|s| is_body(*s)))
        .count();
    assert_eq!(body_to_body, 1);
    // The default is entered once the last case test fails.
    let last_test = body
        .blocks
        .iter()
        .filter(|b| b.comment == "switch.next")
        .last()
        .expect("case tests");
    assert_eq!(last_test.succs.len(), 1);
    assert!(is_body(last_test.succs[0]));
}

#[test]
fn type_switch_binds_the_case_type_only_for_single_type_cases() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let any = Type::empty_interface();
    let kind = f.declare("kind", &[("x", any.clone())], &[]);
    let as_int = f.local("v", Type::int());
    let as_any = f.local("v", any.clone());
    let on_nil = print_text(&mut f, "nil");
    let iv = f.ident(as_int);
    let print_int = f.builtin(BuiltinKind::Println, vec![iv]);
    let print_int = f.expr_stmt(print_int);
    let on_other = print_text(&mut f, "other");
    let x = f.ident(kind.param(0));
    let switch = f.type_switch(
        x,
        vec![
            (vec![None], None, vec![on_nil]),
            (vec![Some(Type::int())], Some(as_int), vec![print_int]),
            (vec![Some(Type::string()), Some(Type::bool())], Some(as_any), vec![on_other]),
        ],
    );
    f.define(&kind, vec![switch]);
    let program = build(f.finish());

    let kind = function(&program, "main.kind");
    let body = body(&kind);
    assert_eq!(
        count(body, |k| matches!(k, InstrKind::TypeAssert { comma_ok: true, .. })),
        3
    );
    let bound: Vec<Type> = body
        .instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::Alloc { comment, ty, .. } if comment == "v" => Some(ty.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(bound.len(), 2);
    assert!(bound.contains(&Type::int()));
    assert!(bound.iter().any(|t| t.is_interface()));
}

/// `sum(base int, xs ...int) int`, called packed, spread and with no
/// variadic arguments.
#[test]
fn variadic_arguments_are_packed_unless_spread() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let ints = Type::slice(Type::int());
    let sum = f.declare_variadic("sum", &[("base", Type::int()), ("xs", ints.clone())], &[Type::int()]);
    let base = f.ident(sum.param(0));
    let ret = f.ret(vec![base]);
    f.define(&sum, vec![ret]);

    let packed = f.declare("packed", &[], &[Type::int()]);
    let args = vec![f.int(1), f.int(2), f.int(3)];
    let call = f.call_func(&sum, args);
    let ret = f.ret(vec![call]);
    f.define(&packed, vec![ret]);

    let spread = f.declare("spread", &[("s", ints)], &[Type::int()]);
    let callee = f.ident(sum.obj);
    let zero = f.int(0);
    let s = f.ident(spread.param(0));
    let call = f.call_spread(callee, vec![zero, s]);
    let ret = f.ret(vec![call]);
    f.define(&spread, vec![ret]);

    let none = f.declare("none", &[], &[Type::int()]);
    let one = f.int(1);
    let call = f.call_func(&sum, vec![one]);
    let ret = f.ret(vec![call]);
    f.define(&none, vec![ret]);
    let program = build(f.finish());

    let call_args = |name: &str| -> Vec<Vec<Value>> {
        body(&function(&program, name))
            .instructions()
            .filter_map(|i| match &i.kind {
                InstrKind::Call(c) => Some(c.args.clone()),
                _ => None,
            })
            .collect()
    };

    let packed = function(&program, "main.packed");
    assert_eq!(heap_allocs(body(&packed)), vec!["varargs".to_string()]);
    assert_eq!(count(body(&packed), |k| matches!(k, InstrKind::Slice { .. })), 1);
    let args = call_args("main.packed");
    assert_eq!(args.len(), 1);
    assert_eq!(args[0].len(), 2);

    let spread = function(&program, "main.spread");
    assert!(heap_allocs(body(&spread)).is_empty());
    assert_eq!(count(body(&spread), |k| matches!(k, InstrKind::Slice { .. })), 0);

    let args = call_args("main.none");
    assert_eq!(args.len(), 1);
    assert!(matches!(args[0][1], Value::Const(_)), "{:?}", args[0]);
}

#[test]
fn multi_value_call_spreads_into_the_outer_call() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let pair = f.declare("pair", &[], &[Type::int(), Type::int()]);
    let (three, four) = (f.int(3), f.int(4));
    let ret = f.ret(vec![three, four]);
    f.define(&pair, vec![ret]);
    let add = f.declare("add", &[("a", Type::int()), ("b", Type::int())], &[Type::int()]);
    let (a, b) = (f.ident(add.param(0)), f.ident(add.param(1)));
    let total = f.binary(BinaryOp::Add, a, b);
    let ret = f.ret(vec![total]);
    f.define(&add, vec![ret]);
    let chained = f.declare("chained", &[], &[Type::int()]);
    let inner = f.call_func(&pair, vec![]);
    let outer = f.call_func(&add, vec![inner]);
    let ret = f.ret(vec![outer]);
    f.define(&chained, vec![ret]);
    let program = build(f.finish());

    let chained = function(&program, "main.chained");
    let body = body(&chained);
    assert_eq!(count(body, |k| matches!(k, InstrKind::Extract { .. })), 2);
    let arities: Vec<(String, usize)> = body
        .instructions()
        .filter_map(|i| match &i.kind {
            InstrKind::Call(c) => match &c.callee {
                Value::Function(f) => Some((f.qualified_name(), c.args.len())),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(
        arities,
        vec![("main.pair".to_string(), 0), ("main.add".to_string(), 2)]
    );
}

#[test]
fn range_over_string_decodes_with_a_string_iterator() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let runes = f.declare("runes", &[("s", Type::string())], &[]);
    let i = f.local("i", Type::int());
    let r = f.local("r", Type::int32());
    let (key, value) = (f.ident(i), f.ident(r));
    let (pi, pr) = (f.ident(i), f.ident(r));
    let print = f.builtin(BuiltinKind::Println, vec![pi, pr]);
    let print = f.expr_stmt(print);
    let s = f.ident(runes.param(0));
    let range = f.range_stmt(Some(key), Some(value), true, s, vec![print]);
    f.define(&runes, vec![range]);
    let program = build(f.finish());

    let runes = function(&program, "main.runes");
    let body = body(&runes);
    block(body, "rangeiter.loop");
    assert_eq!(
        count(body, |k| matches!(k, InstrKind::Next { is_string: true, .. })),
        1
    );
    assert_eq!(count(body, |k| matches!(k, InstrKind::Extract { .. })), 3);
}

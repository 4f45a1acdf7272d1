mod support;

use gossa_core::builtin::BuiltinKind;
use gossa_core::ops::BinaryOp;
use gossa_core::syntax::{SourceProgram, SyntaxFactory};
use gossa_core::types::{ChanDir, InterfaceMethod, Type};
use gossa_interpret::chan::DEADLOCK_MESSAGE;
use gossa_interpret::Value;
use pretty_assertions::assert_eq;
use support::*;

fn println(f: &mut SyntaxFactory, args: Vec<gossa_core::syntax::Expr>) -> gossa_core::syntax::Stmt {
    let call = f.builtin(BuiltinKind::Println, args);
    f.expr_stmt(call)
}

fn say(f: &mut SyntaxFactory, text: &str) -> gossa_core::syntax::Stmt {
    let msg = f.string(text);
    println(f, vec![msg])
}

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
fn gcd_of_fifteen_and_ten_is_five() {
    let (interp, _) = interpreter(build(gcd_source()));
    let result = call(&interp, "main.gcd", vec![Value::Int(15), Value::Int(10)]);
    assert_eq!(result, Value::Int(5));
    let result = call(&interp, "main.gcd", vec![Value::Int(7), Value::Int(0)]);
    assert_eq!(result, Value::Int(7));
}

/// `gcd(a, b)` by repeated subtraction, recursing until the operands meet.
#[test]
fn recursive_subtraction_gcd() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let gcd = f.declare("gcd", &[("a", Type::int()), ("b", Type::int())], &[Type::int()]);
    let (a, b) = (gcd.param(0), gcd.param(1));

    let x = f.ident(a);
    let y = f.ident(b);
    let equal = f.binary(BinaryOp::Eql, x, y);
    let ra = f.ident(a);
    let done = f.ret(vec![ra]);
    let done = f.if_stmt(None, equal, vec![done], None);

    let x = f.ident(a);
    let y = f.ident(b);
    let greater = f.binary(BinaryOp::Gtr, x, y);
    let x = f.ident(a);
    let y = f.ident(b);
    let diff = f.binary(BinaryOp::Sub, x, y);
    let y = f.ident(b);
    let shrink_a = f.call_func(&gcd, vec![diff, y]);
    let shrink_a = f.ret(vec![shrink_a]);
    let shrink_a = f.if_stmt(None, greater, vec![shrink_a], None);

    let x = f.ident(a);
    let y = f.ident(b);
    let x2 = f.ident(a);
    let diff = f.binary(BinaryOp::Sub, y, x2);
    let shrink_b = f.call_func(&gcd, vec![x, diff]);
    let shrink_b = f.ret(vec![shrink_b]);
    f.define(&gcd, vec![done, shrink_a, shrink_b]);

    let (interp, _) = interpreter(build(f.finish()));
    assert_eq!(call(&interp, "main.gcd", vec![Value::Int(15), Value::Int(10)]), Value::Int(5));
    assert_eq!(call(&interp, "main.gcd", vec![Value::Int(21), Value::Int(6)]), Value::Int(3));
}

#[test]
fn sum_of_first_four_odd_numbers_is_sixteen() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let sum = f.declare("oddsum", &[("n", Type::int())], &[Type::int()]);
    let total = f.local("sum", Type::int());
    let odd = f.local("odd", Type::int());
    let i = f.local("i", Type::int());

    let zero = f.int(0);
    let one = f.int(1);
    let init = f.define_vars(&[total, odd], vec![zero, one]);
    let zero = f.int(0);
    let init_i = f.define_vars(&[i], vec![zero]);
    let ci = f.ident(i);
    let cn = f.ident(sum.param(0));
    let cond = f.binary(BinaryOp::Lss, ci, cn);
    let pi = f.ident(i);
    let post = f.inc(pi);
    let t = f.ident(total);
    let o = f.ident(odd);
    let add = f.op_assign(BinaryOp::Add, t, o);
    let o = f.ident(odd);
    let two = f.int(2);
    let step = f.op_assign(BinaryOp::Add, o, two);
    let lp = f.for_stmt(Some(init_i), Some(cond), Some(post), vec![add, step]);
    let t = f.ident(total);
    let ret = f.ret(vec![t]);
    f.define(&sum, vec![init, lp, ret]);

    let (interp, _) = interpreter(build(f.finish()));
    assert_eq!(call(&interp, "main.oddsum", vec![Value::Int(4)]), Value::Int(16));
    assert_eq!(call(&interp, "main.oddsum", vec![Value::Int(0)]), Value::Int(0));
}

/// `fib(n, c)` sends the first `n` Fibonacci numbers on `c` and refuses to
/// produce more than fifteen; `main` prints whatever arrives.
fn fibonacci_source(count: i64) -> SourceProgram {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let chan = Type::chan(ChanDir::Both, Type::int());
    let fib = f.declare("fib", &[("n", Type::int()), ("c", chan.clone())], &[]);
    let x = f.local("x", Type::int());
    let y = f.local("y", Type::int());
    let i = f.local("i", Type::int());

    let zero = f.int(0);
    let one = f.int(1);
    let init = f.define_vars(&[x, y], vec![zero, one]);
    let zero = f.int(0);
    let init_i = f.define_vars(&[i], vec![zero]);
    let ci = f.ident(i);
    let cn = f.ident(fib.param(0));
    let cond = f.binary(BinaryOp::Lss, ci, cn);
    let pi = f.ident(i);
    let post = f.inc(pi);

    let gi = f.ident(i);
    let limit = f.int(14);
    let over = f.binary(BinaryOp::Gtr, gi, limit);
    let msg = f.string("fibonacci: too many values");
    let panic = f.builtin(BuiltinKind::Panic, vec![msg]);
    let panic = f.expr_stmt(panic);
    let guard = f.if_stmt(None, over, vec![panic], None);

    let ch = f.ident(fib.param(1));
    let vx = f.ident(x);
    let send = f.send(ch, vx);
    let lhs = vec![f.ident(x), f.ident(y)];
    let ny = f.ident(y);
    let sx = f.ident(x);
    let sy = f.ident(y);
    let next = f.binary(BinaryOp::Add, sx, sy);
    let advance = f.assign(lhs, vec![ny, next]);
    let lp = f.for_stmt(Some(init_i), Some(cond), Some(post), vec![guard, send, advance]);
    let ch = f.ident(fib.param(1));
    let close = f.builtin(BuiltinKind::Close, vec![ch]);
    let close = f.expr_stmt(close);
    f.define(&fib, vec![init, lp, close]);

    let main = f.declare("main", &[], &[]);
    let c = f.local("c", chan.clone());
    let ty = f.type_expr(chan);
    let size = f.int(10);
    let make = f.builtin(BuiltinKind::Make, vec![ty, size]);
    let def_c = f.define_vars(&[c], vec![make]);
    let n = f.int(count);
    let cc = f.ident(c);
    let producer = f.call_func(&fib, vec![n, cc]);
    let go = f.go(producer);
    let v = f.local("v", Type::int());
    let key = f.ident(v);
    let pv = f.ident(v);
    let print = println(&mut f, vec![pv]);
    let rc = f.ident(c);
    let range = f.range_stmt(Some(key), None, true, rc, vec![print]);
    f.define(&main, vec![def_c, go, range]);
    f.finish()
}

#[test]
fn fibonacci_producer_delivers_fifteen_values() {
    let run = run(fibonacci_source(15));
    assert_eq!(run.code, 0, "output: {}", run.output);
    let values: Vec<&str> = run.output.lines().collect();
    assert_eq!(
        values,
        vec!["0", "1", "1", "2", "3", "5", "8", "13", "21", "34", "55", "89", "144", "233", "377"]
    );
}

#[test]
fn fibonacci_producer_past_its_guard_fails_the_run() {
    let run = run(fibonacci_source(16));
    assert_eq!(run.code, 2);
    assert!(
        run.output.contains("panic: fibonacci: too many values"),
        "output: {}",
        run.output
    );
    let printed = run.output.lines().filter(|l| l.parse::<i64>().is_ok()).count();
    assert!(printed <= 15, "printed {} values", printed);
}

fn three_defers(f: &mut SyntaxFactory) -> Vec<gossa_core::syntax::Stmt> {
    ["D1", "D2", "D3"]
        .into_iter()
        .map(|label| {
            let msg = f.string(label);
            let print = f.builtin(BuiltinKind::Println, vec![msg]);
            f.defer(print)
        })
        .collect()
}

#[test]
fn deferred_calls_run_last_in_first_out() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let main = f.declare("main", &[], &[]);
    let mut body = three_defers(&mut f);
    body.push(say(&mut f, "body"));
    f.define(&main, body);

    let run = run(f.finish());
    assert_eq!(run.code, 0);
    assert_eq!(run.output, "body\nD3\nD2\nD1\n");
}

#[test]
fn deferred_calls_run_while_a_panic_unwinds() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let work = f.declare("work", &[], &[]);
    let mut body = three_defers(&mut f);
    let msg = f.string("boom");
    let panic = f.builtin(BuiltinKind::Panic, vec![msg]);
    body.push(f.expr_stmt(panic));
    f.define(&work, body);
    let main = f.declare("main", &[], &[]);
    let call = f.call_func(&work, vec![]);
    let call = f.expr_stmt(call);
    let after = say(&mut f, "unreachable");
    f.define(&main, vec![call, after]);

    let run = run(f.finish());
    assert_eq!(run.code, 2);
    assert_eq!(run.output, "D3\nD2\nD1\npanic: boom\n");
}

#[test]
fn recover_in_a_deferred_closure_resumes_with_named_results() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let safe = f.declare_named_results("safe", &[], &[("r", Type::int())]);
    let r = safe.results[0];
    let v = f.local("v", Type::empty_interface());
    let lit = f.func_lit(&[], &[], |f, _| {
        let rec = f.builtin(BuiltinKind::Recover, vec![]);
        let def = f.define_vars(&[v], vec![rec]);
        let pv = f.ident(v);
        let text = f.type_assert(pv, Type::string());
        let label = f.string("recovered");
        let print = f.builtin(BuiltinKind::Println, vec![label, text]);
        let print = f.expr_stmt(print);
        let lr = f.ident(r);
        let answer = f.int(42);
        let set = f.assign(vec![lr], vec![answer]);
        vec![def, print, set]
    });
    let deferred = f.call(lit, vec![]);
    let defer = f.defer(deferred);
    let msg = f.string("boom");
    let panic = f.builtin(BuiltinKind::Panic, vec![msg]);
    let panic = f.expr_stmt(panic);
    f.define(&safe, vec![defer, panic]);

    let main = f.declare("main", &[], &[]);
    let result = f.call_func(&safe, vec![]);
    let print = println(&mut f, vec![result]);
    f.define(&main, vec![print]);

    let run = run(f.finish());
    assert_eq!(run.code, 0, "output: {}", run.output);
    assert_eq!(run.output, "recovered boom\n42\n");
}

#[test]
fn closures_share_the_captured_variable() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let counter_ty = Type::func(vec![], vec![Type::int()], false);
    let counter = f.declare("counter", &[], &[counter_ty.clone()]);
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

    let main = f.declare("main", &[], &[]);
    let next = f.local("next", counter_ty);
    let make = f.call_func(&counter, vec![]);
    let def = f.define_vars(&[next], vec![make]);
    let mut body = vec![def];
    for _ in 0..2 {
        let callee = f.ident(next);
        let tick = f.call(callee, vec![]);
        body.push(f.expr_stmt(tick));
    }
    let callee = f.ident(next);
    let third = f.call(callee, vec![]);
    body.push(println(&mut f, vec![third]));
    f.define(&main, body);

    let run = run(f.finish());
    assert_eq!(run.code, 0);
    assert_eq!(run.output, "3\n");
}

/// `type T struct{ x int }` with a value method `Get`, called through a
/// `Getter` interface holding a `T` and then a nil `*T`.
#[test]
fn interface_calls_dispatch_on_the_dynamic_type() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let t = f.named_type("T", SyntaxFactory::struct_type(&[("x", Type::int())]));
    let get = f.declare_method(("t", t.clone()), "Get", &[], &[Type::int()]);
    let recv = f.ident(get.recv.expect("receiver"));
    let x = f.select(recv, "x");
    let ret = f.ret(vec![x]);
    f.define(&get, vec![ret]);
    let getter = f.named_type(
        "Getter",
        Type::interface(vec![InterfaceMethod {
            name: "Get".to_string(),
            sig: Type::func(vec![], vec![Type::int()], false),
        }]),
    );

    let main = f.declare("main", &[], &[]);
    let g = f.local("g", getter);
    let p = f.local("p", Type::pointer(t.clone()));
    let seven = f.int(7);
    let lit = f.composite(t, vec![(None, seven)]);
    let decl_g = f.var_decl(vec![Some(g)], vec![lit]);
    let decl_p = f.var_decl(vec![Some(p)], vec![]);
    let recv = f.ident(g);
    let method = f.select(recv, "Get");
    let first = f.call(method, vec![]);
    let first = println(&mut f, vec![first]);
    let lg = f.ident(g);
    let rp = f.ident(p);
    let rebind = f.assign(vec![lg], vec![rp]);
    let recv = f.ident(g);
    let method = f.select(recv, "Get");
    let second = f.call(method, vec![]);
    let second = println(&mut f, vec![second]);
    f.define(&main, vec![decl_g, decl_p, first, rebind, second]);

    let run = run(f.finish());
    assert_eq!(run.code, 2);
    assert_eq!(
        run.output,
        "7\npanic: value method main.T.Get called using nil *T pointer\n"
    );
}

#[test]
fn maps_update_delete_and_range() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let map_ty = Type::map(Type::string(), Type::int());
    let main = f.declare("main", &[], &[]);
    let m = f.local("m", map_ty.clone());
    let total = f.local("total", Type::int());
    let v = f.local("v", Type::int());
    let missing = f.local("missing", Type::int());
    let ok = f.local("ok", Type::bool());

    let ty = f.type_expr(map_ty);
    let make = f.builtin(BuiltinKind::Make, vec![ty]);
    let mut body = vec![f.define_vars(&[m], vec![make])];
    for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
        let mm = f.ident(m);
        let k = f.string(key);
        let slot = f.index(mm, k);
        let value = f.int(value);
        body.push(f.assign(vec![slot], vec![value]));
    }
    let mm = f.ident(m);
    let k = f.string("b");
    let delete = f.builtin(BuiltinKind::Delete, vec![mm, k]);
    body.push(f.expr_stmt(delete));

    let zero = f.int(0);
    body.push(f.define_vars(&[total], vec![zero]));
    let tv = f.ident(total);
    let pv = f.ident(v);
    let add = f.op_assign(BinaryOp::Add, tv, pv);
    let value = f.ident(v);
    let mm = f.ident(m);
    body.push(f.range_stmt(None, Some(value), true, mm, vec![add]));

    let mm = f.ident(m);
    let k = f.string("b");
    let lookup = f.index(mm, k);
    let lookup = f.comma_ok(lookup);
    body.push(f.define_vars(&[missing, ok], vec![lookup]));

    let tv = f.ident(total);
    let mm = f.ident(m);
    let len = f.builtin(BuiltinKind::Len, vec![mm]);
    let mv = f.ident(missing);
    let okv = f.ident(ok);
    body.push(println(&mut f, vec![tv, len, mv, okv]));
    f.define(&main, body);

    let run = run(f.finish());
    assert_eq!(run.code, 0, "output: {}", run.output);
    assert_eq!(run.output, "4 2 0 false\n");
}

#[test]
fn select_takes_default_only_when_nothing_is_ready() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let chan = Type::chan(ChanDir::Both, Type::int());
    let main = f.declare("main", &[], &[]);
    let idle = f.local("idle", chan.clone());
    let ready = f.local("ready", chan.clone());
    let mut body = Vec::new();

    let ty = f.type_expr(chan.clone());
    let make = f.builtin(BuiltinKind::Make, vec![ty]);
    body.push(f.define_vars(&[idle], vec![make]));
    let ty = f.type_expr(chan.clone());
    let one = f.int(1);
    let make = f.builtin(BuiltinKind::Make, vec![ty, one]);
    body.push(f.define_vars(&[ready], vec![make]));
    let rc = f.ident(ready);
    let five = f.int(5);
    body.push(f.send(rc, five));

    for chan_obj in [idle, ready] {
        let got = f.local("got", Type::int());
        let lhs = vec![f.ident(got)];
        let ch = f.ident(chan_obj);
        let comm = f.recv_comm(lhs, true, ch);
        let label = f.string("got");
        let pv = f.ident(got);
        let on_recv = println(&mut f, vec![label, pv]);
        let on_default = say(&mut f, "idle");
        body.push(f.select_stmt(vec![(Some(comm), vec![on_recv]), (None, vec![on_default])]));
    }
    f.define(&main, body);

    let run = run(f.finish());
    assert_eq!(run.code, 0, "output: {}", run.output);
    assert_eq!(run.output, "idle\ngot 5\n");
}

#[test]
fn blocking_select_reports_the_ready_case() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let chan = Type::chan(ChanDir::Both, Type::int());
    let main = f.declare("main", &[], &[]);
    let a = f.local("a", chan.clone());
    let b = f.local("b", chan.clone());
    let mut body = Vec::new();
    for obj in [a, b] {
        let ty = f.type_expr(chan.clone());
        let one = f.int(1);
        let make = f.builtin(BuiltinKind::Make, vec![ty, one]);
        body.push(f.define_vars(&[obj], vec![make]));
    }
    let bc = f.ident(b);
    let two = f.int(2);
    body.push(f.send(bc, two));

    let mut clauses = Vec::new();
    for (obj, label) in [(a, "a"), (b, "b")] {
        let got = f.local("got", Type::int());
        let lhs = vec![f.ident(got)];
        let ch = f.ident(obj);
        let comm = f.recv_comm(lhs, true, ch);
        let label = f.string(label);
        let pv = f.ident(got);
        let print = println(&mut f, vec![label, pv]);
        clauses.push((Some(comm), vec![print]));
    }
    body.push(f.select_stmt(clauses));
    f.define(&main, body);

    let run = run(f.finish());
    assert_eq!(run.code, 0, "output: {}", run.output);
    assert_eq!(run.output, "b 2\n");
}

#[test]
fn receiving_with_no_sender_is_a_deadlock() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let chan = Type::chan(ChanDir::Both, Type::int());
    let main = f.declare("main", &[], &[]);
    let c = f.local("c", chan.clone());
    let ty = f.type_expr(chan);
    let make = f.builtin(BuiltinKind::Make, vec![ty]);
    let def = f.define_vars(&[c], vec![make]);
    let rc = f.ident(c);
    let recv = f.recv(rc);
    let recv = f.expr_stmt(recv);
    f.define(&main, vec![def, recv]);

    let run = run(f.finish());
    assert_eq!(run.code, 2);
    assert_eq!(run.output, format!("{}\n", DEADLOCK_MESSAGE));
}

#[test]
fn os_exit_ends_the_run_without_running_defers() {
    let mut f = SyntaxFactory::new();
    f.package("os", "os", &[]);
    let exit = f.declare("Exit", &[("code", Type::int())], &[]);
    f.package("main", "main", &["os"]);
    let main = f.declare("main", &[], &[]);
    let msg = f.string("deferred");
    let print = f.builtin(BuiltinKind::Println, vec![msg]);
    let defer = f.defer(print);
    let before = say(&mut f, "before");
    let callee = f.qualified(None, exit.obj);
    let three = f.int(3);
    let call = f.call(callee, vec![three]);
    let call = f.expr_stmt(call);
    let after = say(&mut f, "after");
    f.define(&main, vec![defer, before, call, after]);

    let run = run(f.finish());
    assert_eq!(run.code, 3);
    assert_eq!(run.output, "before\n");
}

#[test]
fn integer_division_by_zero_is_a_runtime_panic() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let div = f.declare("div", &[("a", Type::int()), ("b", Type::int())], &[Type::int()]);
    let a = f.ident(div.param(0));
    let b = f.ident(div.param(1));
    let q = f.binary(BinaryOp::Quo, a, b);
    let ret = f.ret(vec![q]);
    f.define(&div, vec![ret]);
    let main = f.declare("main", &[], &[]);
    let one = f.int(1);
    let zero = f.int(0);
    let call = f.call_func(&div, vec![one, zero]);
    let print = println(&mut f, vec![call]);
    f.define(&main, vec![print]);

    let run = run(f.finish());
    assert_eq!(run.code, 2);
    assert_eq!(run.output, "panic: runtime error: integer divide by zero\n");
}

/// `len(string([]byte{0xff}))` and a slice that cuts a multi-byte rune.
#[test]
fn strings_hold_arbitrary_bytes() {
    let mut f = SyntaxFactory::new();
    f.package("main", "main", &[]);
    let main = f.declare("main", &[], &[]);
    let s = f.local("s", Type::string());
    let ff = f.int_of(0xff, Type::uint8());
    let raw = f.composite(Type::slice(Type::uint8()), vec![(None, ff)]);
    let text = f.convert(Type::string(), raw);
    let def = f.define_vars(&[s], vec![text]);
    let sv = f.ident(s);
    let len = f.builtin(BuiltinKind::Len, vec![sv]);
    let first = println(&mut f, vec![len]);

    let wide = f.string("世");
    let one = f.int(1);
    let tail = f.slice(wide, Some(one), None);
    let tail_len = f.builtin(BuiltinKind::Len, vec![tail]);
    let wide = f.string("世");
    let wide_len = f.builtin(BuiltinKind::Len, vec![wide]);
    let second = println(&mut f, vec![tail_len, wide_len]);
    f.define(&main, vec![def, first, second]);

    let run = run(f.finish());
    assert_eq!(run.code, 0, "output: {}", run.output);
    assert_eq!(run.output, "1\n2 3\n");
}

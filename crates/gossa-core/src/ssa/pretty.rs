//! Textual listing of functions and packages.

use super::*;
use itertools::Itertools;
use std::fmt::Write;

fn value(body: &FunctionBody, v: &Value) -> String {
    match v {
        Value::Reg(r) => match body.regs.get(r.index()).and_then(|i| i.name.as_ref()) {
            Some(name) if !matches!(body.regs[r.index()].def, RegDef::Instr) => name.clone(),
            _ => format!("t{}", r.0),
        },
        Value::Const(c) => format!("{}:{}", c.value, c.ty),
        Value::Function(f) => f.qualified_name(),
        Value::Global(g) => g.qualified_name(),
        Value::Builtin(kind, _) => kind.to_string(),
    }
}

fn opt(body: &FunctionBody, v: &Option<Value>) -> String {
    v.as_ref().map(|v| value(body, v)).unwrap_or_default()
}

fn call(body: &FunctionBody, c: &CallCommon) -> String {
    let args = c.args.iter().map(|a| value(body, a)).join(", ");
    match &c.method {
        Some(m) => format!("invoke {}.{}({})", value(body, &c.callee), m.name, args),
        None => format!("{}({})", value(body, &c.callee), args),
    }
}

/// Renders one instruction without its result register.
pub fn instruction(body: &FunctionBody, instr: &Instruction) -> String {
    let v = |x: &Value| value(body, x);
    let result_ty = instr.result.map(|r| body.reg_type(r).clone());
    let ty = || result_ty.as_ref().map(|t| t.to_string()).unwrap_or_default();
    match &instr.kind {
        InstrKind::BinOp { op, x, y } => format!("{} {} {}", v(x), op, v(y)),
        InstrKind::UnOp { op, x, comma_ok } => {
            format!("{}{}{}", op, v(x), if *comma_ok { ",ok" } else { "" })
        }
        InstrKind::Alloc {
            ty: alloc_ty,
            policy,
            comment,
            ..
        } => {
            let verb = match policy {
                AllocPolicy::Stack => "local",
                AllocPolicy::Heap => "new",
            };
            format!("{} {} ({})", verb, alloc_ty, comment)
        }
        InstrKind::FieldAddr { x, field } => format!("&{}.[#{}]", v(x), field),
        InstrKind::Field { x, field } => format!("{}.[#{}]", v(x), field),
        InstrKind::IndexAddr { x, index } => format!("&{}[{}]", v(x), v(index)),
        InstrKind::Index { x, index } => format!("{}[{}]", v(x), v(index)),
        InstrKind::Lookup { x, index, comma_ok } => {
            format!("{}[{}]{}", v(x), v(index), if *comma_ok { ",ok" } else { "" })
        }
        InstrKind::Store { addr, value: val } => format!("*{} = {}", v(addr), v(val)),
        InstrKind::Slice { x, low, high, max } => format!(
            "slice {}[{}:{}{}]",
            v(x),
            opt(body, low),
            opt(body, high),
            max.as_ref().map(|m| format!(":{}", v(m))).unwrap_or_default()
        ),
        InstrKind::TypeAssert { x, asserted, comma_ok } => format!(
            "typeassert{} {}.({})",
            if *comma_ok { ",ok" } else { "" },
            v(x),
            asserted
        ),
        InstrKind::MakeInterface { x } => format!("make {} <- {}", ty(), v(x)),
        InstrKind::ChangeInterface { x, nil_check } => format!(
            "change interface {} <- {}{}",
            ty(),
            v(x),
            if *nil_check { " (nil check)" } else { "" }
        ),
        InstrKind::ChangeType { x } => format!("changetype {} <- {}", ty(), v(x)),
        InstrKind::Convert { x } => format!("convert {} <- {}", ty(), v(x)),
        InstrKind::MakeClosure { func, bindings } => format!(
            "make closure {} [{}]",
            func.qualified_name(),
            bindings.iter().map(v).join(", ")
        ),
        InstrKind::MakeMap { reserve } => format!("make {} {}", ty(), opt(body, reserve)),
        InstrKind::MakeChan { size } => format!("make {} {}", ty(), v(size)),
        InstrKind::MakeSlice { len, cap } => format!("make {} {} {}", ty(), v(len), v(cap)),
        InstrKind::MapUpdate { map, key, value: val } => {
            format!("{}[{}] = {}", v(map), v(key), v(val))
        }
        InstrKind::Extract { tuple, index } => format!("extract {} #{}", v(tuple), index),
        InstrKind::Phi { edges, comment } => format!(
            "phi [{}] #{}",
            edges.iter().map(v).join(", "),
            comment
        ),
        InstrKind::Call(c) => call(body, c),
        InstrKind::Go(c) => format!("go {}", call(body, c)),
        InstrKind::Defer(c) => format!("defer {}", call(body, c)),
        InstrKind::Range { x } => format!("range {}", v(x)),
        InstrKind::Next { iter, .. } => format!("next {}", v(iter)),
        InstrKind::Select { states, blocking } => format!(
            "select {} [{}]",
            if *blocking { "blocking" } else { "nonblocking" },
            states
                .iter()
                .map(|s| match (&s.dir, &s.send) {
                    (SelectDir::Send, Some(x)) => format!("{}<-{}", v(&s.chan), v(x)),
                    _ => format!("<-{}", v(&s.chan)),
                })
                .join(", ")
        ),
        InstrKind::Send { chan, value: val } => format!("send {} <- {}", v(chan), v(val)),
        InstrKind::RunDefers => "rundefers".to_string(),
        InstrKind::Trace {
            event,
            marker,
            breakpoint,
        } => format!(
            "trace {:?} #{}{}",
            event,
            marker,
            if *breakpoint { " (breakpoint)" } else { "" }
        ),
        InstrKind::Jump => "jump".to_string(),
        InstrKind::If { cond } => format!("if {}", v(cond)),
        InstrKind::Return { results } => {
            format!("return {}", results.iter().map(v).join(", "))
                .trim_end()
                .to_string()
        }
        InstrKind::Panic { x } => format!("panic {}", v(x)),
    }
}

pub fn function_to_string(func: &Function) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Name: {}", func.qualified_name());
    if let Some(pkg) = &func.pkg {
        let _ = writeln!(out, "# Package: {}", pkg);
    }
    if let Some(synthetic) = &func.synthetic {
        let _ = writeln!(out, "# Synthetic: {}", synthetic);
    }
    if let Some(parent) = func.parent() {
        let _ = writeln!(out, "# Parent: {}", parent.qualified_name());
    }
    let Some(body) = func.body() else {
        let _ = writeln!(out, "func {}{}  (external)", func.name, sig_tail(&func.sig));
        return out;
    };
    if !body.free_vars.is_empty() {
        let _ = writeln!(out, "# Free variables:");
        for (i, fv) in body.free_vars.iter().enumerate() {
            let _ = writeln!(out, "# {:3}:\t{} {}", i, fv.name, fv.ty);
        }
    }
    if !body.locals.is_empty() {
        let _ = writeln!(out, "# Locals:");
        for (i, reg) in body.locals.iter().enumerate() {
            let _ = writeln!(out, "# {:3}:\tt{} {}", i, reg.0, body.reg_type(*reg).deref());
        }
    }
    if let Some(recover) = body.recover {
        let _ = writeln!(out, "# Recover: {}", recover);
    }
    let _ = writeln!(out, "func {}{}:", func.name, sig_tail(&func.sig));
    for block in &body.blocks {
        let header = format!("{}:", block.index);
        let _ = writeln!(
            out,
            "{:<40}{} P:{} S:{}",
            header,
            block.comment,
            block.preds.len(),
            block.succs.len()
        );
        for instr in &block.instrs {
            let text = instruction(body, instr);
            match instr.result {
                Some(r) => {
                    let _ = writeln!(out, "\tt{} = {:<40}{}", r.0, text, body.reg_type(r));
                }
                None => {
                    let _ = writeln!(out, "\t{}", text);
                }
            }
        }
    }
    out
}

fn sig_tail(sig: &Type) -> String {
    let text = sig.to_string();
    text.strip_prefix("func").unwrap_or(&text).to_string()
}

pub fn package_to_string(pkg: &Package) -> String {
    let mut out = format!("package {}:\n", pkg.path);
    for (name, member) in &pkg.members {
        let line = match member {
            Member::Func(f) => format!("  func  {:<20} {}", name, f.sig),
            Member::Global(g) => format!("  var   {:<20} {}", name, g.elem_type()),
            Member::Const(c) => format!("  const {:<20} {} = {}", name, c.value.ty, c.value.value),
            Member::Type(t) => format!("  type  {:<20} {}", name, t.underlying()),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

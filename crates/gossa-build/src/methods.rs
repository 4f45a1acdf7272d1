//! Method sets, wrappers and thunks.
//!
//! Declared methods are created with their package. Everything else a method
//! call may need at run time is synthesized on first use and cached on the
//! [`Program`]:
//!
//! - wrappers for promoted methods and for value methods called through a
//!   pointer, so every method-set entry takes the dynamic type as receiver;
//! - `$bound` thunks backing method values `x.m`;
//! - `$thunk` functions backing method expressions `T.m`.

use crate::function::FunctionState;
use gossa_core::builtin::BuiltinKind;
use gossa_core::ssa::{CallCommon, Function, InstrKind, InvokeMethod, MethodKey, Program, Value};
use gossa_core::span::Span;
use gossa_core::types::{find_method, MethodRef, Selection, Type};
use gossa_core::unreachable_shape;
use std::sync::Arc;

/// The function implementing `name` in the method set of the concrete
/// type `ty`, or `None` when `ty` has no such method.
pub fn method_value(program: &Program, ty: &Type, name: &str) -> Option<Arc<Function>> {
    let key = MethodKey::new(ty.clone(), name);
    if let Some(found) = program.method_sets.get_cloned(&key) {
        return Some(found);
    }
    let sel = find_method(ty, name)?;
    let method = sel.method.clone()?;
    let needs_promotion = sel.index.len() > 1;
    let needs_indirection = !method.pointer_recv() && ty.is_pointer() && !method.is_interface();
    let func = program.method_sets.get_or_insert_with(key, || {
        if needs_promotion || needs_indirection {
            make_wrapper(program, &sel, &method, false)
        } else {
            declared_method(program, &method)
        }
    });
    Some(func)
}

/// The declared function of a concrete method.
pub fn declared_method(program: &Program, method: &MethodRef) -> Arc<Function> {
    let found = method
        .named_id()
        .and_then(|id| program.declared_method(id, &method.name));
    match found {
        Some(func) => func,
        None => unreachable_shape!("no declared method {} on {}", method.name, method.recv),
    }
}

/// The closure body for the method value `x.m`; the receiver is its only
/// free variable.
pub fn bound_thunk(program: &Program, method: &MethodRef) -> Arc<Function> {
    let key = MethodKey::new(method.recv.clone(), method.name.clone());
    program
        .bound_thunks
        .get_or_insert_with(key, || make_bound(program, method))
}

/// The function value of the method expression `T.m`.
pub fn method_thunk(program: &Program, sel: &Selection) -> Arc<Function> {
    let method = match &sel.method {
        Some(method) => method.clone(),
        None => unreachable_shape!("method expression without a method: {:?}", sel),
    };
    let key = MethodKey::new(sel.recv.clone(), method.name.clone());
    program
        .method_thunks
        .get_or_insert_with(key, || make_wrapper(program, sel, &method, true))
}

fn signature_parts(sig: &Type) -> (Vec<Type>, Vec<Type>, bool) {
    match sig.signature() {
        Some(sig) => (sig.params, sig.results, sig.variadic),
        None => unreachable_shape!("method with non-signature type {}", sig),
    }
}

fn owning_package(ty: &Type) -> Option<String> {
    ty.deref().named_type().and_then(|n| n.pkg.clone())
}

/// Synthesizes a function with receiver `sel.recv` that follows the
/// embedding path of `sel` and calls the method found at its end. As a
/// thunk the receiver is an ordinary first parameter.
fn make_wrapper(program: &Program, sel: &Selection, method: &MethodRef, thunk: bool) -> Arc<Function> {
    let (params, results, variadic) = signature_parts(&method.sig);
    let (name, description, sig) = if thunk {
        let mut with_recv = vec![sel.recv.clone()];
        with_recv.extend(params.iter().cloned());
        (
            format!("({}).{}$thunk", sel.recv, method.name),
            "thunk",
            Type::func(with_recv, results, variadic),
        )
    } else {
        (
            method.name.clone(),
            "wrapper",
            Type::method_sig(sel.recv.clone(), params.clone(), results, variadic),
        )
    };
    gossa_core::trace!("synthesizing {} {} for {}", description, name, method.name);

    let func = Arc::new(
        Function::new(name, owning_package(&sel.recv), sig, Span::none())
            .with_synthetic(format!("{} for {}", description, method.name)),
    );
    let mut state = FunctionState::new(func.clone(), false);
    state.add_spilled_param(None, "recv", sel.recv.clone());
    let spill = match state.locals.last() {
        Some(reg) => Value::Reg(*reg),
        None => unreachable_shape!("receiver spill slot missing"),
    };
    let args: Vec<Value> = params
        .iter()
        .enumerate()
        .map(|(i, ty)| Value::Reg(state.add_param(ty.clone(), Some(format!("arg{}", i)))))
        .collect();

    let mut v = state.emit_load(spill);
    let path = &sel.index[..sel.index.len().saturating_sub(1)];
    if sel.recv.is_pointer() && path.is_empty() && !method.pointer_recv() && !method.is_interface() {
        v = emit_nil_check(&mut state, v, &sel.recv, &method.name);
    }
    v = state.emit_implicit_selections(v, path);

    let call = if method.is_interface() {
        let iface = if state.value_type(&v).is_pointer() {
            state.emit_load(v)
        } else {
            v
        };
        CallCommon {
            callee: iface,
            method: Some(InvokeMethod {
                name: method.name.clone(),
                sig: method.sig.clone(),
            }),
            args,
            sig: method.sig.clone(),
            span: Span::none(),
        }
    } else {
        let vt = state.value_type(&v);
        if !method.pointer_recv() && vt.is_pointer() {
            v = state.emit_load(v);
        } else if method.pointer_recv() && !vt.is_pointer() {
            unreachable_shape!("pointer method {} reached through a value", method.name);
        }
        let mut call_args = vec![v];
        call_args.extend(args);
        CallCommon {
            callee: Value::Function(declared_method(program, method)),
            method: None,
            args: call_args,
            sig: method.sig.clone(),
            span: Span::none(),
        }
    };
    state.emit_tail_call(call);
    func.set_body(state.finish());
    func
}

/// `ssa:wrapnilchk(ptr, "pkg.T", "m")`: panics on a nil receiver, returns it
/// otherwise.
fn emit_nil_check(state: &mut FunctionState, ptr: Value, recv: &Type, method: &str) -> Value {
    let ty = state.value_type(&ptr);
    let sig = Type::func(
        vec![ty.clone(), Type::string(), Type::string()],
        vec![ty.clone()],
        false,
    );
    state.emit_value(
        InstrKind::Call(CallCommon {
            callee: Value::Builtin(BuiltinKind::WrapNilCheck, sig.clone()),
            method: None,
            args: vec![
                ptr,
                Value::string(&recv.deref().to_string()),
                Value::string(method),
            ],
            sig,
            span: Span::none(),
        }),
        ty,
    )
}

fn make_bound(program: &Program, method: &MethodRef) -> Arc<Function> {
    let (params, _, _) = signature_parts(&method.sig);
    let name = format!("({}).{}$bound", method.recv, method.name);
    gossa_core::trace!("synthesizing bound thunk {}", name);
    let func = Arc::new(
        Function::new(name, owning_package(&method.recv), method.sig.clone(), Span::none())
            .with_synthetic(format!("bound method wrapper for {}", method.name)),
    );
    let mut state = FunctionState::new(func.clone(), false);
    let recv = Value::Reg(state.add_free_var("recv", method.recv.clone(), None));
    let args: Vec<Value> = params
        .iter()
        .enumerate()
        .map(|(i, ty)| Value::Reg(state.add_param(ty.clone(), Some(format!("arg{}", i)))))
        .collect();
    let call = if method.is_interface() {
        CallCommon {
            callee: recv,
            method: Some(InvokeMethod {
                name: method.name.clone(),
                sig: method.sig.clone(),
            }),
            args,
            sig: method.sig.clone(),
            span: Span::none(),
        }
    } else {
        let mut call_args = vec![recv];
        call_args.extend(args);
        CallCommon {
            callee: Value::Function(declared_method(program, method)),
            method: None,
            args: call_args,
            sig: method.sig.clone(),
            span: Span::none(),
        }
    };
    state.emit_tail_call(call);
    func.set_body(state.finish());
    func
}

//! Calls, conversions and builtins.

use super::Lowering;
use crate::methods;
use gossa_core::builtin::BuiltinKind;
use gossa_core::span::Span;
use gossa_core::ssa::{AllocPolicy, CallCommon, InstrKind, InvokeMethod, TraceEvent, Value};
use gossa_core::syntax::{Expr, ExprKind, ObjectKind};
use gossa_core::types::{SelectionKind, Type, TypeKind};
use gossa_core::unreachable_shape;

impl<'a> Lowering<'a> {
    /// A call expression: conversion, builtin or ordinary call. The result
    /// is a tuple when the callee returns zero or several values.
    pub(crate) fn call_expr(&mut self, e: &Expr) -> Value {
        let ExprKind::Call { fun, args, ellipsis } = &e.kind else {
            unreachable_shape!("call_expr on {:?}", e.kind);
        };
        let fun = fun.unparen();
        if fun.is_type() {
            let Some(arg) = args.first() else {
                unreachable_shape!("conversion to {} without an operand", e.ty);
            };
            let v = self.expr(arg);
            return self.fs().emit_conv(v, &e.ty);
        }
        if let ExprKind::Ident(obj) = &fun.kind {
            if let ObjectKind::Builtin(kind) = self.object_kind(*obj) {
                if let Some(v) = self.builtin(*kind, args, &e.ty) {
                    return v;
                }
            }
        }

        let call = self.call_common(fun, args, *ellipsis, e.span);
        if is_breakpoint(&call.callee) {
            self.fs().emit_trace_full(TraceEvent::Stmt, true);
            return Value::zero(e.ty.clone());
        }
        self.fs().emit_value(InstrKind::Call(call), e.ty.clone())
    }

    /// The call part of a `go` or `defer` statement.
    pub(crate) fn call_of(&mut self, e: &Expr) -> CallCommon {
        match &e.unparen().kind {
            ExprKind::Call { fun, args, ellipsis } => self.call_common(fun, args, *ellipsis, e.span),
            other => unreachable_shape!("go/defer of non-call {:?}", other),
        }
    }

    fn call_common(&mut self, fun: &Expr, args: &[Expr], ellipsis: bool, span: Span) -> CallCommon {
        let fun = fun.unparen();
        let (callee, method, mut values, sig) = match &fun.kind {
            ExprKind::Selector {
                x,
                selection: Some(sel),
                ..
            } if sel.kind == SelectionKind::MethodVal => {
                let method = match &sel.method {
                    Some(method) => method.clone(),
                    None => unreachable_shape!("method call without a method"),
                };
                let recv = self.receiver(x, method.pointer_recv(), AllocPolicy::Heap, sel);
                if method.is_interface() {
                    let invoke = InvokeMethod {
                        name: method.name.clone(),
                        sig: method.sig.clone(),
                    };
                    (recv, Some(invoke), Vec::new(), method.sig.clone())
                } else {
                    let func = methods::declared_method(self.program, &method);
                    (Value::Function(func), None, vec![recv], method.sig.clone())
                }
            }
            _ => {
                let callee = self.expr(fun);
                (callee, None, Vec::new(), fun.ty.clone())
            }
        };
        self.call_args(&sig, args, ellipsis, &mut values);
        CallCommon {
            callee,
            method,
            args: values,
            sig,
            span,
        }
    }

    /// Evaluates `args` against the parameters of `sig`, appending to
    /// `values`. Trailing variadic arguments are packed into a slice.
    fn call_args(&mut self, sig: &Type, args: &[Expr], ellipsis: bool, values: &mut Vec<Value>) {
        let Some(sig) = sig.signature() else {
            unreachable_shape!("call through non-function type {}", sig);
        };
        let offset = values.len();

        if ellipsis {
            for (arg, param) in args.iter().zip(&sig.params) {
                let v = self.expr(arg);
                let v = self.fs().emit_conv(v, param);
                values.push(v);
            }
            return;
        }

        for arg in args {
            let v = self.expr(arg);
            let vt = self.fs().value_type(&v);
            if vt.is_tuple() {
                // f(g()) with a multi-valued g.
                for i in 0..vt.tuple_elems().len() {
                    let x = self.fs().emit_extract(v.clone(), i);
                    values.push(x);
                }
            } else {
                values.push(v);
            }
        }

        let fixed = if sig.variadic {
            sig.params.len().saturating_sub(1)
        } else {
            sig.params.len()
        };
        for (i, param) in sig.params.iter().take(fixed).enumerate() {
            if let Some(v) = values.get(offset + i).cloned() {
                values[offset + i] = self.fs().emit_conv(v, param);
            }
        }
        if !sig.variadic {
            return;
        }

        let Some(slice_ty) = sig.params.last().cloned() else {
            unreachable_shape!("variadic signature without parameters");
        };
        let Some(elem) = slice_ty.elem() else {
            unreachable_shape!("variadic parameter of non-slice type {}", slice_ty);
        };
        let varargs = values.split_off((offset + fixed).min(values.len()));
        if varargs.is_empty() {
            values.push(Value::zero(slice_ty));
            return;
        }
        let array_ty = Type::array(elem.clone(), varargs.len() as u64);
        let array = self.fs().emit_new(array_ty, "varargs");
        for (i, arg) in varargs.into_iter().enumerate() {
            let addr = self.fs().emit_value(
                InstrKind::IndexAddr {
                    x: array.clone(),
                    index: Value::int(i as i64),
                },
                Type::pointer(elem.clone()),
            );
            self.fs().emit_store(addr, arg);
        }
        let slice = self.fs().emit_value(
            InstrKind::Slice {
                x: array,
                low: None,
                high: None,
                max: None,
            },
            slice_ty,
        );
        values.push(slice);
    }

    /// Builtins with dedicated instructions. `None` means an ordinary call
    /// of the builtin value.
    fn builtin(&mut self, kind: BuiltinKind, args: &[Expr], ty: &Type) -> Option<Value> {
        match kind {
            BuiltinKind::Make => Some(self.make(args, ty)),
            BuiltinKind::New => Some(self.fs().emit_new(ty.deref(), "new")),
            BuiltinKind::Len | BuiltinKind::Cap => {
                let arg = args.first()?;
                let len = arg.ty.deref().underlying().array_len()?;
                // Evaluated for effects only.
                self.expr(arg);
                Some(Value::int(len as i64))
            }
            BuiltinKind::Panic => {
                let arg = args.first()?;
                let v = self.expr(arg);
                self.fs().emit_panic(v);
                Some(Value::bool(true))
            }
            _ => None,
        }
    }

    fn make(&mut self, args: &[Expr], ty: &Type) -> Value {
        match ty.underlying().kind() {
            TypeKind::Slice(elem) => {
                let Some(len) = args.get(1) else {
                    unreachable_shape!("make({}) without a length", ty);
                };
                let n = self.index_value(len);
                let m = match args.get(2) {
                    Some(cap) => self.index_value(cap),
                    None => n.clone(),
                };
                let constant_cap = m.as_const().and_then(|c| c.value.as_i64());
                match constant_cap {
                    Some(cap) => {
                        // make([]T, n, c) with a constant c is new([c]T)[:n].
                        let array = self
                            .fs()
                            .emit_new(Type::array(elem.clone(), cap.max(0) as u64), "makeslice");
                        self.fs().emit_value(
                            InstrKind::Slice {
                                x: array,
                                low: None,
                                high: Some(n),
                                max: None,
                            },
                            ty.clone(),
                        )
                    }
                    None => self
                        .fs()
                        .emit_value(InstrKind::MakeSlice { len: n, cap: m }, ty.clone()),
                }
            }
            TypeKind::Map(..) => {
                let reserve = args.get(1).map(|r| self.index_value(r));
                self.fs().emit_value(InstrKind::MakeMap { reserve }, ty.clone())
            }
            TypeKind::Chan(..) => {
                let size = match args.get(1) {
                    Some(size) => self.index_value(size),
                    None => Value::int(0),
                };
                self.fs().emit_value(InstrKind::MakeChan { size }, ty.clone())
            }
            _ => unreachable_shape!("make of {}", ty),
        }
    }
}

/// `runtime.Breakpoint()` lowers to a breakpoint marker instead of a call.
fn is_breakpoint(callee: &Value) -> bool {
    matches!(
        callee,
        Value::Function(f) if f.external && f.pkg.as_deref() == Some("runtime") && f.name == "Breakpoint"
    )
}

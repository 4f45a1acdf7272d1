//! Instruction constructors with the bookkeeping every caller needs:
//! implicit conversions, CFG edges and result types.

use crate::function::FunctionState;
use gossa_core::builtin::BuiltinKind;
use gossa_core::constant::ConstValue;
use gossa_core::ops::{BinaryOp, UnOpKind};
use gossa_core::ssa::{BlockId, CallCommon, Constant, InstrKind, TraceEvent, Value};
use gossa_core::types::{implements, is_value_preserving, BasicKind, Type, TypeKind};
use gossa_core::{invariant, unreachable_shape};

impl FunctionState {
    /// Converts `val` to `ty`, inserting whatever instruction the pair of
    /// types requires.
    pub fn emit_conv(&mut self, val: Value, ty: &Type) -> Value {
        let src = self.value_type(&val);
        if &src == ty {
            return val;
        }
        let (ut_src, ut_dst) = (src.underlying(), ty.underlying());

        if ty.is_interface() {
            if is_value_preserving(&ut_src, &ut_dst) {
                return self.emit_value(InstrKind::ChangeType { x: val }, ty.clone());
            }
            if src.is_interface() {
                return self.emit_value(
                    InstrKind::ChangeInterface {
                        x: val,
                        nil_check: false,
                    },
                    ty.clone(),
                );
            }
            if src.is_untyped_nil() {
                return Value::zero(ty.clone());
            }
            let val = if src.is_untyped() {
                self.emit_conv(val, &src.default_type())
            } else {
                val
            };
            return self.emit_value(InstrKind::MakeInterface { x: val }, ty.clone());
        }

        if let Value::Const(c) = &val {
            if ut_dst.is_basic() || c.value.is_nil() {
                return Value::Const(Constant::new(c.value.clone(), ty.clone()));
            }
        }

        if is_value_preserving(&ut_src, &ut_dst) {
            return self.emit_value(InstrKind::ChangeType { x: val }, ty.clone());
        }

        if ut_src.is_basic() || ut_dst.is_basic() {
            return self.emit_value(InstrKind::Convert { x: val }, ty.clone());
        }

        unreachable_shape!(
            "in {}: cannot convert {:?} ({}) to {}",
            self.func.qualified_name(),
            val,
            src,
            ty
        )
    }

    /// Emits a comparison, first bringing both operands to a common type.
    pub fn emit_compare(&mut self, op: BinaryOp, x: Value, y: Value) -> Value {
        let xt = self.value_type(&x);
        let yt = self.value_type(&y);

        if op == BinaryOp::Eql && is_true_const(&x) && yt.is_boolean() {
            return y;
        }

        let (x, y) = if xt.underlying() == yt.underlying() {
            (x, y)
        } else if xt.is_interface() {
            let y = self.emit_conv(y, &xt);
            (x, y)
        } else if yt.is_interface() {
            let x = self.emit_conv(x, &yt);
            (x, y)
        } else if x.is_const() {
            let x = self.emit_conv(x, &yt);
            (x, y)
        } else if y.is_const() {
            let y = self.emit_conv(y, &xt);
            (x, y)
        } else {
            (x, y)
        };
        self.emit_value(InstrKind::BinOp { op, x, y }, Type::bool())
    }

    /// Emits an arithmetic or bitwise operation producing a value of `ty`.
    pub fn emit_arith(&mut self, op: BinaryOp, x: Value, y: Value, ty: &Type) -> Value {
        invariant!(
            !op.is_comparison() && !op.is_logical(),
            "illegal op in emit_arith: {}",
            op
        );
        let x = self.emit_conv(x, ty);
        let y = if op.is_shift() {
            let yt = self.value_type(&y);
            if yt.is_untyped() {
                self.emit_conv(y, &Type::uint())
            } else {
                y
            }
        } else {
            self.emit_conv(y, ty)
        };
        self.emit_value(InstrKind::BinOp { op, x, y }, ty.clone())
    }

    /// `x.(ty)` in a single-value context.
    pub fn emit_type_assert(&mut self, x: Value, ty: &Type) -> Value {
        let xt = self.value_type(&x);
        if ty.is_interface() && xt.is_interface() && implements(&xt, ty) {
            // Cannot fail except on a nil operand.
            return self.emit_value(
                InstrKind::ChangeInterface {
                    x,
                    nil_check: true,
                },
                ty.clone(),
            );
        }
        self.emit_value(
            InstrKind::TypeAssert {
                x,
                asserted: ty.clone(),
                comma_ok: false,
            },
            ty.clone(),
        )
    }

    /// `x.(ty)` in a comma-ok context; the result is `(ty, bool)`.
    pub fn emit_type_test(&mut self, x: Value, ty: &Type) -> Value {
        self.emit_value(
            InstrKind::TypeAssert {
                x,
                asserted: ty.clone(),
                comma_ok: true,
            },
            Type::tuple(vec![ty.clone(), Type::bool()]),
        )
    }

    /// Jumps to `target`. After a terminator there is no current block and
    /// nothing is emitted, so `target` gains no edge from dead code.
    pub fn emit_jump(&mut self, target: BlockId) {
        let Some(block) = self.current else {
            return;
        };
        self.emit(InstrKind::Jump, None);
        self.add_edge(block, target);
        self.current = None;
    }

    pub fn emit_if(&mut self, cond: Value, then: BlockId, els: BlockId) {
        let Some(block) = self.current else {
            return;
        };
        self.emit(InstrKind::If { cond }, None);
        self.add_edge(block, then);
        self.add_edge(block, els);
        self.current = None;
    }

    pub fn emit_return(&mut self, results: Vec<Value>) {
        self.emit(InstrKind::Return { results }, None);
        self.current = None;
    }

    pub fn emit_panic(&mut self, x: Value) {
        let x = self.emit_conv(x, &Type::empty_interface());
        self.emit(InstrKind::Panic { x }, None);
        self.current = None;
    }

    pub fn emit_load(&mut self, addr: Value) -> Value {
        let ty = self.value_type(&addr).deref();
        self.emit_value(
            InstrKind::UnOp {
                op: UnOpKind::Deref,
                x: addr,
                comma_ok: false,
            },
            ty,
        )
    }

    pub fn emit_store(&mut self, addr: Value, value: Value) {
        let elem = self.value_type(&addr).deref();
        let value = self.emit_conv(value, &elem);
        self.emit(InstrKind::Store { addr, value }, None);
    }

    pub fn emit_extract(&mut self, tuple: Value, index: usize) -> Value {
        let ty = self
            .value_type(&tuple)
            .tuple_elems()
            .get(index)
            .cloned()
            .unwrap_or_else(Type::invalid);
        self.emit_value(InstrKind::Extract { tuple, index }, ty)
    }

    /// Calls `call` and returns its results from the current function.
    pub fn emit_tail_call(&mut self, call: CallCommon) {
        let results = self
            .func
            .sig
            .signature()
            .map(|s| s.results)
            .unwrap_or_default();
        let ty = match results.len() {
            0 => None,
            1 => Some(results[0].clone()),
            _ => Some(Type::tuple(results.clone())),
        };
        let tuple = self.emit(InstrKind::Call(call), ty);
        let values = match (results.len(), tuple) {
            (0, _) | (_, None) => Vec::new(),
            (1, Some(v)) => vec![v],
            (n, Some(v)) => (0..n).map(|i| self.emit_extract(v.clone(), i)).collect(),
        };
        self.emit_return(values);
    }

    /// Follows the embedded-field path `indices` from `v`.
    pub fn emit_implicit_selections(&mut self, mut v: Value, indices: &[usize]) -> Value {
        for &index in indices {
            let vt = self.value_type(&v);
            if vt.is_pointer() {
                let field = field_of(&vt.deref(), index);
                v = self.emit_value(
                    InstrKind::FieldAddr { x: v, field: index },
                    Type::pointer(field.clone()),
                );
                if field.is_pointer() {
                    v = self.emit_load(v);
                }
            } else {
                let field = field_of(&vt, index);
                v = self.emit_value(InstrKind::Field { x: v, field: index }, field);
            }
        }
        v
    }

    /// Selects field `index` of `v`; through a pointer the address is
    /// loaded unless `want_addr`.
    pub fn emit_field_selection(&mut self, v: Value, index: usize, want_addr: bool) -> Value {
        let vt = self.value_type(&v);
        if vt.is_pointer() {
            let field = field_of(&vt.deref(), index);
            let addr = self.emit_value(
                InstrKind::FieldAddr { x: v, field: index },
                Type::pointer(field),
            );
            if want_addr {
                addr
            } else {
                self.emit_load(addr)
            }
        } else {
            let field = field_of(&vt, index);
            self.emit_value(InstrKind::Field { x: v, field: index }, field)
        }
    }

    /// Emits a trace marker when debug markers are enabled, returning its id.
    pub fn emit_trace(&mut self, event: TraceEvent) -> Option<u32> {
        self.emit_trace_full(event, false)
    }

    pub fn emit_trace_full(&mut self, event: TraceEvent, breakpoint: bool) -> Option<u32> {
        if !self.debug_markers && !breakpoint {
            return None;
        }
        let marker = self.next_marker();
        self.emit(
            InstrKind::Trace {
                event,
                marker,
                breakpoint,
            },
            None,
        );
        Some(marker)
    }

    /// The builtin `len` specialized to an operand of type `ty`.
    pub fn len_of(ty: Type) -> Value {
        Value::Builtin(BuiltinKind::Len, Type::func(vec![ty], vec![Type::int()], false))
    }
}

fn is_true_const(v: &Value) -> bool {
    match v {
        Value::Const(c) => {
            c.value == ConstValue::Bool(true) && c.ty.basic_kind() == Some(BasicKind::Bool)
        }
        _ => false,
    }
}

fn field_of(ty: &Type, index: usize) -> Type {
    match ty.field(index) {
        Some(field) => field.ty,
        None => match ty.underlying().kind() {
            TypeKind::Struct(_) => unreachable_shape!("field #{} out of range in {}", index, ty),
            _ => unreachable_shape!("field selection on non-struct type {}", ty),
        },
    }
}

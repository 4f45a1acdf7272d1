//! Expressions: values, addresses, conditions and composite literals.

use super::Lowering;
use crate::lvalue::{Lvalue, StoreBuf};
use crate::methods;
use gossa_core::constant::ConstValue;
use gossa_core::ops::{BinaryOp, UnOpKind, UnaryOp};
use gossa_core::ssa::{AllocPolicy, BlockId, Constant, InstrKind, Value};
use gossa_core::syntax::{Element, ElementKey, Expr, ExprKind, ObjectKind};
use gossa_core::types::{SelectionKind, Type, TypeKind};
use gossa_core::{invariant, unreachable_shape};

impl<'a> Lowering<'a> {
    /// Lowers `e` in a single-value context.
    pub(crate) fn expr(&mut self, e: &Expr) -> Value {
        let e = e.unparen();
        if let Some(value) = &e.value {
            return Value::Const(Constant::new(value.clone(), e.ty.clone()));
        }
        if e.addressable && !e.is_blank() {
            let lv = self.addr(e, AllocPolicy::Stack);
            return lv.load(self.fs());
        }
        self.expr0(e)
    }

    fn expr0(&mut self, e: &Expr) -> Value {
        match &e.kind {
            ExprKind::Paren(inner) => self.expr(inner),
            ExprKind::FuncLit(lit) => self.func_lit(lit),
            ExprKind::Ident(obj) => match self.object_kind(*obj) {
                ObjectKind::Func => Value::Function(self.function_of(*obj)),
                ObjectKind::Builtin(kind) => Value::Builtin(*kind, e.ty.clone()),
                ObjectKind::Nil => Value::zero(e.ty.clone()),
                ObjectKind::Var { .. } => {
                    let lv = self.addr(e, AllocPolicy::Stack);
                    lv.load(self.fs())
                }
                other => unreachable_shape!("identifier {:?} in value position", other),
            },
            ExprKind::CompositeLit(_) | ExprKind::Star(_) => {
                let lv = self.addr(e, AllocPolicy::Stack);
                lv.load(self.fs())
            }
            ExprKind::Binary { op, x, y } => match op {
                BinaryOp::LAnd | BinaryOp::LOr => self.logical_binop(*op, x, y, &e.ty),
                op if op.is_comparison() => {
                    let xv = self.expr(x);
                    let yv = self.expr(y);
                    let cmp = self.fs().emit_compare(*op, xv, yv);
                    self.fs().emit_conv(cmp, &e.ty)
                }
                op => {
                    let xv = self.expr(x);
                    let yv = self.expr(y);
                    self.fs().emit_arith(*op, xv, yv, &e.ty)
                }
            },
            ExprKind::Unary { op, x } => self.unary(*op, x, &e.ty),
            ExprKind::Slice { x, low, high, max } => {
                let base = if x.ty.underlying().array_len().is_some() {
                    // Slicing an array requires its address.
                    let lv = self.addr(x, AllocPolicy::Heap);
                    lv.addr(self.fs())
                } else {
                    self.expr(x)
                };
                let low = low.as_deref().map(|l| self.index_value(l));
                let high = high.as_deref().map(|h| self.index_value(h));
                let max = max.as_deref().map(|m| self.index_value(m));
                self.fs().emit_value(
                    InstrKind::Slice {
                        x: base,
                        low,
                        high,
                        max,
                    },
                    e.ty.clone(),
                )
            }
            ExprKind::Index { x, index } => match x.ty.underlying().kind() {
                TypeKind::Array(..) => {
                    // Non-addressable array value, e.g. the result of a call.
                    let xv = self.expr(x);
                    let iv = self.index_value(index);
                    self.fs()
                        .emit_value(InstrKind::Index { x: xv, index: iv }, e.ty.clone())
                }
                TypeKind::Map(key, _) => {
                    let key = key.clone();
                    let m = self.expr(x);
                    let k = self.expr(index);
                    let k = self.fs().emit_conv(k, &key);
                    self.fs().emit_value(
                        InstrKind::Lookup {
                            x: m,
                            index: k,
                            comma_ok: false,
                        },
                        e.ty.clone(),
                    )
                }
                TypeKind::Basic(_) => {
                    let s = self.expr(x);
                    let iv = self.index_value(index);
                    self.fs().emit_value(
                        InstrKind::Lookup {
                            x: s,
                            index: iv,
                            comma_ok: false,
                        },
                        e.ty.clone(),
                    )
                }
                _ => {
                    let lv = self.addr(e, AllocPolicy::Stack);
                    lv.load(self.fs())
                }
            },
            ExprKind::Selector {
                x,
                selection,
                obj,
                name,
            } => match selection {
                None => match obj {
                    Some(obj) => match self.object_kind(*obj) {
                        ObjectKind::Func => Value::Function(self.function_of(*obj)),
                        ObjectKind::Var { .. } => {
                            let lv = self.addr(e, AllocPolicy::Stack);
                            lv.load(self.fs())
                        }
                        other => unreachable_shape!("qualified {} resolves to {:?}", name, other),
                    },
                    None => unreachable_shape!("unresolved selector {}", name),
                },
                Some(sel) => match sel.kind {
                    SelectionKind::MethodExpr => {
                        let thunk = methods::method_thunk(self.program, sel);
                        let v = Value::Function(thunk);
                        self.fs().emit_conv(v, &e.ty)
                    }
                    SelectionKind::MethodVal => {
                        let method = match &sel.method {
                            Some(method) => method.clone(),
                            None => unreachable_shape!("method value {} without a method", name),
                        };
                        let mut v = self.receiver(x, method.pointer_recv(), AllocPolicy::Heap, sel);
                        if sel.recv.is_interface() {
                            // A method value of a nil interface panics at
                            // creation, not at call.
                            v = self.fs().emit_type_assert(v, &method.recv);
                        }
                        let thunk = methods::bound_thunk(self.program, &method);
                        self.fs().emit_value(
                            InstrKind::MakeClosure {
                                func: thunk,
                                bindings: vec![v],
                            },
                            e.ty.clone(),
                        )
                    }
                    SelectionKind::FieldVal => {
                        let Some((last, path)) = sel.index.split_last() else {
                            unreachable_shape!("field selection {} with empty path", name);
                        };
                        let v = self.expr(x);
                        let v = self.fs().emit_implicit_selections(v, path);
                        self.fs().emit_field_selection(v, *last, false)
                    }
                },
            },
            ExprKind::TypeAssert { x, asserted } => {
                let Some(asserted) = asserted else {
                    unreachable_shape!("x.(type) outside a type switch");
                };
                let xv = self.expr(x);
                self.fs().emit_type_assert(xv, asserted)
            }
            ExprKind::Call { .. } => self.call_expr(e),
            ExprKind::Lit => unreachable_shape!("literal without a constant value"),
            ExprKind::Type => unreachable_shape!("type {} in value position", e.ty),
            ExprKind::Blank => unreachable_shape!("blank identifier in value position"),
        }
    }

    fn unary(&mut self, op: UnaryOp, x: &Expr, ty: &Type) -> Value {
        let kind = match op {
            UnaryOp::Addr => {
                let lv = self.addr(x, AllocPolicy::Heap);
                if matches!(x.unparen().kind, ExprKind::Star(_)) {
                    // &*p must still fault on a nil p.
                    lv.load(self.fs());
                }
                return lv.addr(self.fs());
            }
            UnaryOp::Plus => return self.expr(x),
            UnaryOp::Neg => UnOpKind::Neg,
            UnaryOp::Not => UnOpKind::Not,
            UnaryOp::Xor => UnOpKind::Xor,
            UnaryOp::Recv => UnOpKind::Recv,
        };
        let xv = self.expr(x);
        self.fs().emit_value(
            InstrKind::UnOp {
                op: kind,
                x: xv,
                comma_ok: false,
            },
            ty.clone(),
        )
    }

    /// An index or slice bound, converted to `int` when untyped.
    pub(crate) fn index_value(&mut self, e: &Expr) -> Value {
        let v = self.expr(e);
        if self.fs().value_type(&v).is_untyped() {
            self.fs().emit_conv(v, &Type::int())
        } else {
            v
        }
    }

    /// Lowers `e` in a multi-value context; the result has tuple type.
    pub(crate) fn expr_n(&mut self, e: &Expr) -> Value {
        let e = e.unparen();
        match &e.kind {
            ExprKind::Call { .. } => self.call_expr(e),
            ExprKind::Index { x, index } => {
                let key_ty = match x.ty.map_key() {
                    Some(key) => key,
                    None => unreachable_shape!("comma-ok index of non-map {}", x.ty),
                };
                let m = self.expr(x);
                let k = self.expr(index);
                let k = self.fs().emit_conv(k, &key_ty);
                self.fs().emit_value(
                    InstrKind::Lookup {
                        x: m,
                        index: k,
                        comma_ok: true,
                    },
                    e.ty.clone(),
                )
            }
            ExprKind::TypeAssert { x, asserted } => {
                let Some(asserted) = asserted else {
                    unreachable_shape!("x.(type) outside a type switch");
                };
                let xv = self.expr(x);
                self.fs().emit_type_test(xv, asserted)
            }
            ExprKind::Unary {
                op: UnaryOp::Recv,
                x,
            } => {
                let ch = self.expr(x);
                self.fs().emit_value(
                    InstrKind::UnOp {
                        op: UnOpKind::Recv,
                        x: ch,
                        comma_ok: true,
                    },
                    e.ty.clone(),
                )
            }
            other => unreachable_shape!("{:?} in multi-value context", other),
        }
    }

    /// The receiver of a method or field selection, after the implicit
    /// embedded-field steps. With `want_addr` the result is a pointer.
    pub(crate) fn receiver(
        &mut self,
        x: &Expr,
        want_addr: bool,
        policy: AllocPolicy,
        sel: &gossa_core::types::Selection,
    ) -> Value {
        let mut v = if want_addr && !sel.indirect && !x.ty.is_pointer() {
            let lv = self.addr(x, policy);
            lv.addr(self.fs())
        } else {
            self.expr(x)
        };
        let path = &sel.index[..sel.index.len().saturating_sub(1)];
        v = self.fs().emit_implicit_selections(v, path);
        let vt = self.fs().value_type(&v);
        if !vt.is_interface() && !want_addr && vt.is_pointer() {
            v = self.fs().emit_load(v);
        }
        v
    }

    /// Lowers `e` as an assignable location.
    pub(crate) fn addr(&mut self, e: &Expr, policy: AllocPolicy) -> Lvalue {
        let e = e.unparen();
        match &e.kind {
            ExprKind::Blank => Lvalue::Blank,
            ExprKind::Ident(obj) => {
                let addr = self.var_address(*obj, policy);
                Lvalue::Address {
                    addr,
                    ty: e.ty.clone(),
                }
            }
            ExprKind::CompositeLit(_) => {
                let ty = e.ty.deref();
                let addr = match policy {
                    AllocPolicy::Heap => self.fs().emit_new(ty.clone(), "complit"),
                    AllocPolicy::Stack => self.fs().emit_local(ty.clone(), "complit"),
                };
                let mut sb = StoreBuf::default();
                self.comp_lit(addr.clone(), e, true, &mut sb);
                sb.emit(self.fs());
                Lvalue::Address { addr, ty }
            }
            ExprKind::Selector {
                x,
                selection,
                obj,
                name,
            } => match selection {
                None => match obj {
                    Some(obj) => {
                        let addr = self.var_address(*obj, policy);
                        Lvalue::Address {
                            addr,
                            ty: e.ty.clone(),
                        }
                    }
                    None => unreachable_shape!("unresolved selector {}", name),
                },
                Some(sel) => {
                    invariant!(
                        sel.kind == SelectionKind::FieldVal,
                        "address of method selection {}",
                        name
                    );
                    let base = self.receiver(x, true, policy, sel);
                    let index = match sel.index.last() {
                        Some(index) => *index,
                        None => unreachable_shape!("field selection {} with empty path", name),
                    };
                    Lvalue::Field {
                        base,
                        index,
                        ty: e.ty.clone(),
                    }
                }
            },
            ExprKind::Index { x, index } => {
                let xt = x.ty.underlying();
                let base = match xt.kind() {
                    TypeKind::Array(..) => {
                        let lv = self.addr(x, policy);
                        lv.addr(self.fs())
                    }
                    TypeKind::Pointer(_) | TypeKind::Slice(_) => self.expr(x),
                    TypeKind::Map(key, elem) => {
                        let (key_ty, elem_ty) = (key.clone(), elem.clone());
                        let map = self.expr(x);
                        let k = self.expr(index);
                        let key = self.fs().emit_conv(k, &key_ty);
                        return Lvalue::MapElement {
                            map,
                            key,
                            ty: elem_ty,
                        };
                    }
                    _ => unreachable_shape!("unexpected container type in index: {}", x.ty),
                };
                let iv = self.index_value(index);
                let addr = self.fs().emit_value(
                    InstrKind::IndexAddr { x: base, index: iv },
                    Type::pointer(e.ty.clone()),
                );
                Lvalue::Address {
                    addr,
                    ty: e.ty.clone(),
                }
            }
            ExprKind::Star(x) => {
                let addr = self.expr(x);
                Lvalue::Address {
                    addr,
                    ty: e.ty.clone(),
                }
            }
            other => unreachable_shape!("unexpected address expression {:?}", other),
        }
    }

    /// Branches to `t` or `f` on the truth of `e`. Constant conditions are
    /// kept as a branch on a constant.
    pub(crate) fn cond(&mut self, e: &Expr, t: BlockId, f: BlockId) {
        match &e.kind {
            ExprKind::Paren(inner) => self.cond(inner, t, f),
            ExprKind::Binary {
                op: BinaryOp::LAnd,
                x,
                y,
            } => {
                let ltrue = self.fs().new_block("cond.true");
                self.cond(x, ltrue, f);
                self.fs().set_block(ltrue);
                self.cond(y, t, f);
            }
            ExprKind::Binary {
                op: BinaryOp::LOr,
                x,
                y,
            } => {
                let lfalse = self.fs().new_block("cond.false");
                self.cond(x, t, lfalse);
                self.fs().set_block(lfalse);
                self.cond(y, t, f);
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                x,
            } => self.cond(x, f, t),
            _ => {
                let v = self.expr(e);
                self.fs().emit_if(v, t, f);
            }
        }
    }

    /// `x && y` and `x || y` as values.
    fn logical_binop(&mut self, op: BinaryOp, x: &Expr, y: &Expr, ty: &Type) -> Value {
        let rhs = self.fs().new_block("binop.rhs");
        let done = self.fs().new_block("binop.done");

        let short = match op {
            BinaryOp::LAnd => {
                self.cond(x, rhs, done);
                Value::Const(Constant::new(ConstValue::Bool(false), ty.clone()))
            }
            _ => {
                self.cond(x, done, rhs);
                Value::Const(Constant::new(ConstValue::Bool(true), ty.clone()))
            }
        };

        if self.fs().blocks[rhs].preds.is_empty() {
            self.fs().set_block(done);
            return short;
        }
        if self.fs().blocks[done].preds.is_empty() {
            self.fs().set_block(rhs);
            return self.expr(y);
        }

        let mut edges: Vec<Value> = self.fs().blocks[done]
            .preds
            .iter()
            .map(|_| short.clone())
            .collect();
        self.fs().set_block(rhs);
        let yv = self.expr(y);
        let yv = self.fs().emit_conv(yv, ty);
        edges.push(yv);
        self.fs().emit_jump(done);
        self.fs().set_block(done);
        self.fs().emit_value(
            InstrKind::Phi {
                edges,
                comment: op.to_string(),
            },
            ty.clone(),
        )
    }

    /// Assigns `e` to `loc`, initializing composite literals in place
    /// where that is unobservable.
    pub(crate) fn assign(&mut self, loc: &Lvalue, e: &Expr, is_zero: bool, sb: Option<&mut StoreBuf>) {
        let inner = e.unparen();
        if let ExprKind::CompositeLit(_) = &inner.kind {
            if !loc.is_blank() && loc.ty().is_pointer() {
                // A literal never evaluates to a pointer: the & is implied.
                let lv = self.addr(inner, AllocPolicy::Heap);
                let ptr = lv.addr(self.fs());
                match sb {
                    Some(sb) => sb.store(loc.clone(), ptr),
                    None => loc.store(self.fs(), ptr),
                }
                return;
            }
            if let Lvalue::Address { addr, ty } = loc {
                if !ty.is_interface() {
                    match sb {
                        Some(sb) => self.comp_lit(addr.clone(), inner, is_zero, sb),
                        None => {
                            let mut sb = StoreBuf::default();
                            self.comp_lit(addr.clone(), inner, is_zero, &mut sb);
                            sb.emit(self.fs());
                        }
                    }
                    return;
                }
            }
        }

        let rhs = self.expr(e);
        match sb {
            Some(sb) => sb.store(loc.clone(), rhs),
            None => loc.store(self.fs(), rhs),
        }
    }

    /// Initializes the composite literal `e` at `addr`. When `is_zero` the
    /// target is known to hold a zero value already.
    pub(crate) fn comp_lit(&mut self, addr: Value, e: &Expr, is_zero: bool, sb: &mut StoreBuf) {
        let ExprKind::CompositeLit(elements) = &e.kind else {
            unreachable_shape!("comp_lit on {:?}", e.kind);
        };
        let ty = e.ty.deref();
        match ty.underlying().kind() {
            TypeKind::Struct(fields) => {
                if !is_zero && elements.len() != fields.len() {
                    let lv = Lvalue::Address {
                        addr: addr.clone(),
                        ty: ty.clone(),
                    };
                    sb.store(lv, Value::zero(ty.clone()));
                }
                for (i, element) in elements.iter().enumerate() {
                    let index = match &element.key {
                        Some(ElementKey::Field(name)) => match fields.iter().position(|f| &f.name == name) {
                            Some(index) => index,
                            None => unreachable_shape!("no field {} in {}", name, ty),
                        },
                        _ => i,
                    };
                    let field_ty = fields[index].ty.clone();
                    let faddr = self.fs().emit_value(
                        InstrKind::FieldAddr {
                            x: addr.clone(),
                            field: index,
                        },
                        Type::pointer(field_ty.clone()),
                    );
                    let loc = Lvalue::Address {
                        addr: faddr,
                        ty: field_ty,
                    };
                    self.assign(&loc, &element.value, true, Some(&mut *sb));
                }
            }
            TypeKind::Array(elem, len) => {
                if !is_zero && elements.len() as u64 != *len {
                    let lv = Lvalue::Address {
                        addr: addr.clone(),
                        ty: ty.clone(),
                    };
                    sb.store(lv, Value::zero(ty.clone()));
                }
                self.fill_elements(addr, elem, elements, Some(sb));
            }
            TypeKind::Slice(elem) => {
                let len = array_len(elements);
                let at = Type::array(elem.clone(), len);
                let array = self.fs().emit_new(at, "slicelit");
                // The backing array is unaliased, so no store buffer.
                self.fill_elements(array.clone(), elem, elements, None);
                let slice = self.fs().emit_value(
                    InstrKind::Slice {
                        x: array,
                        low: None,
                        high: None,
                        max: None,
                    },
                    ty.clone(),
                );
                self.fs().emit_store(addr, slice);
            }
            TypeKind::Map(key_ty, elem_ty) => {
                let m = self.fs().emit_value(
                    InstrKind::MakeMap {
                        reserve: Some(Value::int(elements.len() as i64)),
                    },
                    ty.clone(),
                );
                for element in elements {
                    let Some(ElementKey::Expr(key)) = &element.key else {
                        unreachable_shape!("map literal element without a key");
                    };
                    let want_addr =
                        matches!(key.unparen().kind, ExprKind::CompositeLit(_)) && key_ty.is_pointer();
                    let k = if want_addr {
                        let lv = self.addr(key, AllocPolicy::Heap);
                        lv.addr(self.fs())
                    } else {
                        self.expr(key)
                    };
                    let k = self.fs().emit_conv(k, key_ty);
                    let loc = Lvalue::MapElement {
                        map: m.clone(),
                        key: k,
                        ty: elem_ty.clone(),
                    };
                    self.assign(&loc, &element.value, true, None);
                }
                let lv = Lvalue::Address { addr, ty };
                sb.store(lv, m);
            }
            _ => unreachable_shape!("unexpected composite literal type {}", ty),
        }
    }

    fn fill_elements(&mut self, array: Value, elem: &Type, elements: &[Element], mut sb: Option<&mut StoreBuf>) {
        let mut next: i64 = 0;
        for element in elements {
            let index = match &element.key {
                Some(ElementKey::Expr(key)) => constant_index(key),
                _ => next,
            };
            next = index + 1;
            let iaddr = self.fs().emit_value(
                InstrKind::IndexAddr {
                    x: array.clone(),
                    index: Value::int(index),
                },
                Type::pointer(elem.clone()),
            );
            let loc = Lvalue::Address {
                addr: iaddr,
                ty: elem.clone(),
            };
            self.assign(&loc, &element.value, true, sb.as_deref_mut());
        }
    }
}

fn constant_index(key: &Expr) -> i64 {
    match key.value.as_ref().and_then(ConstValue::as_i64) {
        Some(index) => index,
        None => unreachable_shape!("non-constant index key in array literal"),
    }
}

/// Length of the array backing a slice literal: one past the highest index.
fn array_len(elements: &[Element]) -> u64 {
    let mut max: i64 = -1;
    let mut i: i64 = -1;
    for element in elements {
        i = match &element.key {
            Some(ElementKey::Expr(key)) => constant_index(key),
            _ => i + 1,
        };
        max = max.max(i);
    }
    (max + 1) as u64
}

//! Programmatic construction of typed syntax.
//!
//! Front ends that already own a type checker can emit [`SourceProgram`]s
//! directly; this factory is the convenient path for embedders and tests. It
//! computes expression types, addressability and selector resolution the way
//! a type checker would report them, for the subset of the language it covers.

use super::*;
use crate::types::{lookup_field_or_method, Field, LookupResult, MethodSpec, SelectionKind, TypeKind};
use std::collections::HashMap;

/// A declared function whose body may be supplied later.
#[derive(Debug, Clone)]
pub struct FuncHandle {
    pub obj: ObjectId,
    pub recv: Option<ObjectId>,
    pub params: Vec<ObjectId>,
    pub results: Vec<ObjectId>,
    pub scope: ScopeRef,
    pub sig: Type,
}

impl FuncHandle {
    pub fn param(&self, index: usize) -> ObjectId {
        self.params[index]
    }
}

pub struct SyntaxFactory {
    objects: Vec<Object>,
    packages: Vec<SourcePackage>,
    current: usize,
    builtins: HashMap<BuiltinKind, ObjectId>,
    nil: Option<ObjectId>,
    pos: u32,
}

impl Default for SyntaxFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxFactory {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            packages: Vec::new(),
            current: 0,
            builtins: HashMap::new(),
            nil: None,
            pos: 0,
        }
    }

    /// Starts a new package; subsequent declarations go into it.
    pub fn package(&mut self, path: &str, name: &str, imports: &[&str]) {
        let mut scopes = ScopeTree::default();
        let scope = scopes.add(None, Span::none());
        self.packages.push(SourcePackage {
            path: path.to_string(),
            name: name.to_string(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            files: vec![File {
                name: format!("{}.go", name),
                decls: Vec::new(),
            }],
            scopes,
            scope,
            init_order: Vec::new(),
        });
        self.current = self.packages.len() - 1;
    }

    pub fn finish(self) -> SourceProgram {
        SourceProgram {
            objects: self.objects,
            packages: self.packages,
        }
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0 as usize]
    }

    fn pkg(&mut self) -> &mut SourcePackage {
        &mut self.packages[self.current]
    }

    fn pkg_path(&self) -> Option<String> {
        self.packages.get(self.current).map(|p| p.path.clone())
    }

    pub fn span(&mut self) -> Span {
        self.pos += 1;
        Span::new(self.current as u64, self.pos, self.pos + 1)
    }

    pub fn scope(&mut self, parent: Option<ScopeRef>) -> ScopeRef {
        let span = self.span();
        let pkg = self.pkg();
        let parent = parent.unwrap_or(pkg.scope);
        pkg.scopes.add(Some(parent), span)
    }

    fn new_object(&mut self, name: &str, kind: ObjectKind, ty: Type) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        let span = self.span();
        let pkg = self.pkg_path();
        self.objects.push(Object {
            id,
            name: name.to_string(),
            kind,
            ty,
            pkg,
            span,
        });
        id
    }

    /// A function-local variable.
    pub fn local(&mut self, name: &str, ty: Type) -> ObjectId {
        self.new_object(name, ObjectKind::Var { global: false }, ty)
    }

    /// A package-level variable, declared with an optional initializer.
    pub fn global(&mut self, name: &str, ty: Type, init: Option<Expr>) -> ObjectId {
        let id = self.new_object(name, ObjectKind::Var { global: true }, ty);
        self.push_decl(Decl::Var(vec![id]));
        if let Some(rhs) = init {
            self.pkg().init_order.push(Initializer {
                lhs: vec![Some(id)],
                rhs,
            });
        }
        id
    }

    /// Adds a package-level initializer `lhs... = rhs` for existing globals.
    pub fn initializer(&mut self, lhs: Vec<Option<ObjectId>>, rhs: Expr) {
        self.pkg().init_order.push(Initializer { lhs, rhs });
    }

    pub fn constant(&mut self, name: &str, ty: Type, value: ConstValue) -> ObjectId {
        let id = self.new_object(name, ObjectKind::Const(value), ty);
        self.push_decl(Decl::Const(vec![id]));
        id
    }

    /// Declares a named type with the given underlying type.
    pub fn named_type(&mut self, name: &str, underlying: Type) -> Type {
        let pkg = self.pkg_path();
        let ty = Type::named(pkg.as_deref(), name);
        ty.set_underlying(underlying);
        let id = self.new_object(name, ObjectKind::TypeName, ty.clone());
        self.push_decl(Decl::Type(id));
        ty
    }

    fn push_decl(&mut self, decl: Decl) {
        if let Some(file) = self.pkg().files.first_mut() {
            file.decls.push(decl);
        }
    }

    fn params(&mut self, params: &[(&str, Type)]) -> (Vec<ObjectId>, Vec<Param>) {
        let mut objs = Vec::new();
        let mut out = Vec::new();
        for (name, ty) in params {
            if name.is_empty() || *name == "_" {
                out.push(Param {
                    obj: None,
                    ty: ty.clone(),
                });
                continue;
            }
            let obj = self.local(name, ty.clone());
            objs.push(obj);
            out.push(Param {
                obj: Some(obj),
                ty: ty.clone(),
            });
        }
        (objs, out)
    }

    /// Declares a function. Its body is supplied with [`SyntaxFactory::define`];
    /// a function never defined stays external.
    pub fn declare(&mut self, name: &str, params: &[(&str, Type)], results: &[Type]) -> FuncHandle {
        let named: Vec<(&str, Type)> = results.iter().map(|t| ("", t.clone())).collect();
        self.declare_full(name, None, params, &named, false)
    }

    /// Declares a function with named results.
    pub fn declare_named_results(
        &mut self,
        name: &str,
        params: &[(&str, Type)],
        results: &[(&str, Type)],
    ) -> FuncHandle {
        self.declare_full(name, None, params, results, false)
    }

    pub fn declare_variadic(&mut self, name: &str, params: &[(&str, Type)], results: &[Type]) -> FuncHandle {
        let named: Vec<(&str, Type)> = results.iter().map(|t| ("", t.clone())).collect();
        self.declare_full(name, None, params, &named, true)
    }

    /// Declares a method on `recv` (a named type or a pointer to one) and
    /// records it in the named type's method list.
    pub fn declare_method(
        &mut self,
        recv: (&str, Type),
        name: &str,
        params: &[(&str, Type)],
        results: &[Type],
    ) -> FuncHandle {
        let named: Vec<(&str, Type)> = results.iter().map(|t| ("", t.clone())).collect();
        let handle = self.declare_full(name, Some(recv.clone()), params, &named, false);
        let base = recv.1.deref();
        base.add_method(MethodSpec {
            name: name.to_string(),
            pointer_recv: recv.1.is_pointer(),
            sig: handle
                .sig
                .signature()
                .map(|s| Type::func(s.params, s.results, s.variadic))
                .unwrap_or_else(Type::invalid),
        });
        handle
    }

    fn declare_full(
        &mut self,
        name: &str,
        recv: Option<(&str, Type)>,
        params: &[(&str, Type)],
        results: &[(&str, Type)],
        variadic: bool,
    ) -> FuncHandle {
        let scope = self.scope(None);
        let recv_param = recv.as_ref().map(|(n, t)| {
            let (objs, mut ps) = self.params(&[(n, t.clone())]);
            (objs.first().copied(), ps.remove(0))
        });
        let (param_objs, param_list) = self.params(params);
        let (result_objs, result_list) = self.params(results);
        let param_types: Vec<Type> = params.iter().map(|(_, t)| t.clone()).collect();
        let result_types: Vec<Type> = results.iter().map(|(_, t)| t.clone()).collect();
        let sig = match &recv {
            Some((_, recv_ty)) => Type::method_sig(recv_ty.clone(), param_types, result_types, variadic),
            None => Type::func(param_types, result_types, variadic),
        };
        let obj = self.new_object(name, ObjectKind::Func, sig.clone());
        let span = self.span();
        self.push_decl(Decl::Func(FuncDecl {
            obj,
            name: name.to_string(),
            recv: recv_param.as_ref().map(|(_, p)| p.clone()),
            func: FuncType {
                params: param_list,
                results: result_list,
                scope: Some(scope),
            },
            body: None,
            ty: sig.clone(),
            span,
        }));
        FuncHandle {
            obj,
            recv: recv_param.and_then(|(o, _)| o),
            params: param_objs,
            results: result_objs,
            scope,
            sig,
        }
    }

    /// Supplies the body of a declared function.
    pub fn define(&mut self, handle: &FuncHandle, stmts: Vec<Stmt>) {
        let span = self.span();
        let block = Block {
            stmts,
            scope: Some(handle.scope),
            span,
        };
        for file in self.pkg().files.iter_mut() {
            for decl in file.decls.iter_mut() {
                if let Decl::Func(decl) = decl {
                    if decl.obj == handle.obj {
                        decl.body = Some(block);
                        return;
                    }
                }
            }
        }
    }

    fn expr(&mut self, kind: ExprKind, ty: Type) -> Expr {
        Expr {
            kind,
            ty,
            value: None,
            addressable: false,
            span: self.span(),
        }
    }

    // ----- expressions -----

    pub fn ident(&mut self, obj: ObjectId) -> Expr {
        let object = self.object(obj).clone();
        let mut e = self.expr(ExprKind::Ident(obj), object.ty.clone());
        match &object.kind {
            ObjectKind::Var { .. } => e.addressable = true,
            ObjectKind::Const(value) => e.value = Some(value.clone()),
            ObjectKind::Nil => e.value = Some(ConstValue::Nil),
            _ => {}
        }
        e
    }

    pub fn lit(&mut self, value: ConstValue, ty: Type) -> Expr {
        let mut e = self.expr(ExprKind::Lit, ty);
        e.value = Some(value);
        e
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.lit(ConstValue::from(value), Type::int())
    }

    pub fn int_of(&mut self, value: i64, ty: Type) -> Expr {
        self.lit(ConstValue::from(value), ty)
    }

    pub fn float(&mut self, value: f64) -> Expr {
        self.lit(ConstValue::Float(value), Type::float64())
    }

    pub fn string(&mut self, value: &str) -> Expr {
        self.lit(ConstValue::from(value), Type::string())
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        self.lit(ConstValue::Bool(value), Type::bool())
    }

    pub fn nil(&mut self) -> Expr {
        let obj = match self.nil {
            Some(obj) => obj,
            None => {
                let obj = self.new_object("nil", ObjectKind::Nil, Type::untyped_nil());
                self.objects[obj.0 as usize].pkg = None;
                self.nil = Some(obj);
                obj
            }
        };
        self.ident(obj)
    }

    /// A typed nil, as recorded for `nil` in a context of type `ty`.
    pub fn nil_of(&mut self, ty: Type) -> Expr {
        let mut e = self.nil();
        e.ty = ty;
        e
    }

    pub fn type_expr(&mut self, ty: Type) -> Expr {
        self.expr(ExprKind::Type, ty)
    }

    pub fn paren(&mut self, x: Expr) -> Expr {
        let ty = x.ty.clone();
        let value = x.value.clone();
        let addressable = x.addressable;
        let mut e = self.expr(ExprKind::Paren(Box::new(x)), ty);
        e.value = value;
        e.addressable = addressable;
        e
    }

    pub fn binary(&mut self, op: BinaryOp, x: Expr, y: Expr) -> Expr {
        let ty = if op.is_comparison() {
            Type::bool()
        } else if x.ty.is_untyped() && !op.is_shift() {
            y.ty.clone()
        } else {
            x.ty.clone()
        };
        self.expr(
            ExprKind::Binary {
                op,
                x: Box::new(x),
                y: Box::new(y),
            },
            ty,
        )
    }

    pub fn unary(&mut self, op: UnaryOp, x: Expr) -> Expr {
        let ty = match op {
            UnaryOp::Addr => Type::pointer(x.ty.clone()),
            UnaryOp::Recv => x.ty.elem().unwrap_or_else(Type::invalid),
            _ => x.ty.clone(),
        };
        self.expr(ExprKind::Unary { op, x: Box::new(x) }, ty)
    }

    pub fn addr_of(&mut self, x: Expr) -> Expr {
        self.unary(UnaryOp::Addr, x)
    }

    pub fn recv(&mut self, ch: Expr) -> Expr {
        self.unary(UnaryOp::Recv, ch)
    }

    pub fn star(&mut self, x: Expr) -> Expr {
        let ty = x.ty.pointer_elem().unwrap_or_else(Type::invalid);
        let mut e = self.expr(ExprKind::Star(Box::new(x)), ty);
        e.addressable = true;
        e
    }

    /// Rewrites a receive, map index or type assertion into its comma-ok form.
    pub fn comma_ok(&mut self, mut e: Expr) -> Expr {
        e.ty = Type::tuple(vec![e.ty.clone(), Type::bool()]);
        e.addressable = false;
        e
    }

    pub fn call(&mut self, fun: Expr, args: Vec<Expr>) -> Expr {
        self.call_full(fun, args, false)
    }

    /// `f(args...)` with a trailing `...`.
    pub fn call_spread(&mut self, fun: Expr, args: Vec<Expr>) -> Expr {
        self.call_full(fun, args, true)
    }

    fn call_full(&mut self, fun: Expr, args: Vec<Expr>, ellipsis: bool) -> Expr {
        let ty = match fun.ty.signature() {
            Some(sig) => sig.result_type(),
            None => Type::invalid(),
        };
        self.expr(
            ExprKind::Call {
                fun: Box::new(fun),
                args,
                ellipsis,
            },
            ty,
        )
    }

    pub fn call_func(&mut self, f: &FuncHandle, args: Vec<Expr>) -> Expr {
        let fun = self.ident(f.obj);
        self.call(fun, args)
    }

    /// `T(x)`.
    pub fn convert(&mut self, ty: Type, x: Expr) -> Expr {
        let fun = self.type_expr(ty.clone());
        self.expr(
            ExprKind::Call {
                fun: Box::new(fun),
                args: vec![x],
                ellipsis: false,
            },
            ty,
        )
    }

    fn builtin_obj(&mut self, kind: BuiltinKind) -> ObjectId {
        if let Some(obj) = self.builtins.get(&kind) {
            return *obj;
        }
        let obj = self.new_object(&kind.to_string(), ObjectKind::Builtin(kind), Type::invalid());
        self.objects[obj.0 as usize].pkg = None;
        self.builtins.insert(kind, obj);
        obj
    }

    /// A builtin call; the callee carries the signature a checker would
    /// record for this particular call.
    pub fn builtin(&mut self, kind: BuiltinKind, args: Vec<Expr>) -> Expr {
        self.builtin_full(kind, args, false)
    }

    pub fn builtin_spread(&mut self, kind: BuiltinKind, args: Vec<Expr>) -> Expr {
        self.builtin_full(kind, args, true)
    }

    fn builtin_full(&mut self, kind: BuiltinKind, args: Vec<Expr>, ellipsis: bool) -> Expr {
        let arg_ty = |i: usize| args.get(i).map(|a| a.ty.clone()).unwrap_or_else(Type::invalid);
        let (params, results, variadic) = match kind {
            BuiltinKind::Len | BuiltinKind::Cap => (vec![arg_ty(0)], vec![Type::int()], false),
            BuiltinKind::Append => {
                let s = arg_ty(0);
                let tail = if ellipsis { arg_ty(1) } else { s.clone() };
                (vec![s.clone(), tail], vec![s], true)
            }
            BuiltinKind::Copy => (vec![arg_ty(0), arg_ty(1)], vec![Type::int()], false),
            BuiltinKind::Delete => {
                let m = arg_ty(0);
                let key = m.map_key().unwrap_or_else(Type::invalid);
                (vec![m, key], vec![], false)
            }
            BuiltinKind::Close => (vec![arg_ty(0)], vec![], false),
            BuiltinKind::Panic => (vec![Type::empty_interface()], vec![], false),
            BuiltinKind::Print | BuiltinKind::Println => {
                let params = args.iter().map(|a| a.ty.default_type()).collect();
                (params, vec![], false)
            }
            BuiltinKind::Recover => (vec![], vec![Type::empty_interface()], false),
            BuiltinKind::New => (vec![arg_ty(0)], vec![Type::pointer(arg_ty(0))], false),
            BuiltinKind::Make => {
                let mut params = vec![arg_ty(0)];
                params.extend((1..args.len()).map(|_| Type::int()));
                (params, vec![arg_ty(0)], false)
            }
            BuiltinKind::WrapNilCheck => (vec![arg_ty(0)], vec![arg_ty(0)], false),
        };
        let obj = self.builtin_obj(kind);
        let mut fun = self.ident(obj);
        fun.ty = Type::func(params, results, variadic);
        self.call_full(fun, args, ellipsis)
    }

    /// `x.name`, resolved through embedded fields.
    pub fn select(&mut self, x: Expr, name: &str) -> Expr {
        let found = lookup_field_or_method(&x.ty, name);
        let (selection, ty, addressable) = match found {
            Some(LookupResult::Field { index, indirect, ty }) => {
                let addressable = x.addressable || indirect || x.ty.is_pointer();
                (
                    Selection {
                        kind: SelectionKind::FieldVal,
                        recv: x.ty.clone(),
                        index,
                        indirect: indirect || x.ty.is_pointer(),
                        ty: ty.clone(),
                        method: None,
                    },
                    ty,
                    addressable,
                )
            }
            Some(LookupResult::Method { index, indirect, method }) => (
                Selection {
                    kind: SelectionKind::MethodVal,
                    recv: x.ty.clone(),
                    index,
                    indirect,
                    ty: method.sig.clone(),
                    method: Some(method.clone()),
                },
                method.sig.clone(),
                false,
            ),
            None => panic!("no field or method {} in {}", name, x.ty),
        };
        let mut e = self.expr(
            ExprKind::Selector {
                x: Box::new(x),
                name: name.to_string(),
                selection: Some(selection),
                obj: None,
            },
            ty,
        );
        e.addressable = addressable;
        e
    }

    /// `T.name` or `(*T).name`: a method expression.
    pub fn method_expr(&mut self, recv: Type, name: &str) -> Expr {
        let Some(LookupResult::Method { index, indirect, method }) = lookup_field_or_method(&recv, name) else {
            panic!("no method {} in {}", name, recv);
        };
        let sig = method.sig.signature().unwrap_or(crate::types::Signature {
            recv: None,
            params: vec![],
            results: vec![],
            variadic: false,
        });
        let mut params = vec![recv.clone()];
        params.extend(sig.params.iter().cloned());
        let ty = Type::func(params, sig.results.clone(), sig.variadic);
        let x = self.type_expr(recv.clone());
        self.expr(
            ExprKind::Selector {
                x: Box::new(x),
                name: name.to_string(),
                selection: Some(Selection {
                    kind: SelectionKind::MethodExpr,
                    recv,
                    index,
                    indirect,
                    ty: ty.clone(),
                    method: Some(method),
                }),
                obj: None,
            },
            ty,
        )
    }

    /// `pkg.Name` for an object declared in another package.
    pub fn qualified(&mut self, pkg_obj: Option<ObjectId>, obj: ObjectId) -> Expr {
        let object = self.object(obj).clone();
        let pkg_name = object.pkg.clone().unwrap_or_default();
        let x = match pkg_obj {
            Some(p) => self.ident(p),
            None => {
                let p = self.new_object(&pkg_name, ObjectKind::PkgName(pkg_name.clone()), Type::invalid());
                self.ident(p)
            }
        };
        let mut e = self.expr(
            ExprKind::Selector {
                x: Box::new(x),
                name: object.name.clone(),
                selection: None,
                obj: Some(obj),
            },
            object.ty.clone(),
        );
        match &object.kind {
            ObjectKind::Var { .. } => e.addressable = true,
            ObjectKind::Const(v) => e.value = Some(v.clone()),
            _ => {}
        }
        e
    }

    pub fn index(&mut self, x: Expr, index: Expr) -> Expr {
        let u = x.ty.underlying();
        let (ty, addressable) = match u.kind() {
            TypeKind::Map(_, v) => (v.clone(), false),
            TypeKind::Slice(elem) => (elem.clone(), true),
            TypeKind::Array(elem, _) => (elem.clone(), x.addressable),
            TypeKind::Pointer(p) => (p.elem().unwrap_or_else(Type::invalid), true),
            TypeKind::Basic(_) => (Type::uint8(), false),
            _ => (Type::invalid(), false),
        };
        let mut e = self.expr(
            ExprKind::Index {
                x: Box::new(x),
                index: Box::new(index),
            },
            ty,
        );
        e.addressable = addressable;
        e
    }

    pub fn slice(&mut self, x: Expr, low: Option<Expr>, high: Option<Expr>) -> Expr {
        let ty = match x.ty.underlying().kind() {
            TypeKind::Array(elem, _) => Type::slice(elem.clone()),
            TypeKind::Pointer(p) => Type::slice(p.elem().unwrap_or_else(Type::invalid)),
            _ => x.ty.clone(),
        };
        self.expr(
            ExprKind::Slice {
                x: Box::new(x),
                low: low.map(Box::new),
                high: high.map(Box::new),
                max: None,
            },
            ty,
        )
    }

    pub fn type_assert(&mut self, x: Expr, ty: Type) -> Expr {
        self.expr(
            ExprKind::TypeAssert {
                x: Box::new(x),
                asserted: Some(ty.clone()),
            },
            ty,
        )
    }

    /// A composite literal of type `ty`. Elements are `(key, value)` pairs.
    pub fn composite(&mut self, ty: Type, elements: Vec<(Option<ElementKey>, Expr)>) -> Expr {
        let elements = elements
            .into_iter()
            .map(|(key, value)| Element { key, value })
            .collect();
        self.expr(ExprKind::CompositeLit(elements), ty)
    }

    /// A function literal; `body` receives the parameter objects.
    pub fn func_lit(
        &mut self,
        params: &[(&str, Type)],
        results: &[Type],
        body: impl FnOnce(&mut SyntaxFactory, &[ObjectId]) -> Vec<Stmt>,
    ) -> Expr {
        let scope = self.scope(None);
        let (objs, param_list) = self.params(params);
        let result_list = results
            .iter()
            .map(|t| Param {
                obj: None,
                ty: t.clone(),
            })
            .collect();
        let ty = Type::func(
            params.iter().map(|(_, t)| t.clone()).collect(),
            results.to_vec(),
            false,
        );
        let stmts = body(self, &objs);
        let span = self.span();
        let lit = FuncLit {
            func: FuncType {
                params: param_list,
                results: result_list,
                scope: Some(scope),
            },
            body: Block {
                stmts,
                scope: Some(scope),
                span,
            },
            ty: ty.clone(),
            span,
        };
        self.expr(ExprKind::FuncLit(Box::new(lit)), ty)
    }

    // ----- statements -----

    fn stmt(&mut self, kind: StmtKind) -> Stmt {
        Stmt {
            kind,
            span: self.span(),
        }
    }

    pub fn expr_stmt(&mut self, e: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(e))
    }

    pub fn assign(&mut self, lhs: Vec<Expr>, rhs: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Assign {
            lhs,
            rhs,
            op: AssignOp::Assign,
        })
    }

    /// `lhs := rhs`; every lhs object not yet defined becomes a new variable.
    pub fn define_vars(&mut self, lhs: &[ObjectId], rhs: Vec<Expr>) -> Stmt {
        let lhs = lhs.iter().map(|o| self.ident(*o)).collect();
        self.stmt(StmtKind::Assign {
            lhs,
            rhs,
            op: AssignOp::Define,
        })
    }

    pub fn op_assign(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Stmt {
        self.stmt(StmtKind::Assign {
            lhs: vec![lhs],
            rhs: vec![rhs],
            op: AssignOp::Op(op),
        })
    }

    pub fn inc(&mut self, x: Expr) -> Stmt {
        self.stmt(StmtKind::IncDec { x, inc: true })
    }

    pub fn dec(&mut self, x: Expr) -> Stmt {
        self.stmt(StmtKind::IncDec { x, inc: false })
    }

    pub fn var_decl(&mut self, names: Vec<Option<ObjectId>>, values: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::VarDecl(vec![ValueSpec { names, values }]))
    }

    pub fn ret(&mut self, results: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(results))
    }

    pub fn send(&mut self, chan: Expr, value: Expr) -> Stmt {
        self.stmt(StmtKind::Send { chan, value })
    }

    pub fn go(&mut self, call: Expr) -> Stmt {
        self.stmt(StmtKind::Go(call))
    }

    pub fn defer(&mut self, call: Expr) -> Stmt {
        self.stmt(StmtKind::Defer(call))
    }

    pub fn block(&mut self, stmts: Vec<Stmt>) -> Block {
        Block {
            stmts,
            scope: None,
            span: self.span(),
        }
    }

    pub fn block_stmt(&mut self, stmts: Vec<Stmt>) -> Stmt {
        let block = self.block(stmts);
        self.stmt(StmtKind::Block(block))
    }

    pub fn branch(&mut self, kind: BranchKind, label: Option<&str>) -> Stmt {
        self.stmt(StmtKind::Branch {
            kind,
            label: label.map(str::to_string),
        })
    }

    pub fn labeled(&mut self, label: &str, stmt: Stmt) -> Stmt {
        self.stmt(StmtKind::Labeled {
            label: label.to_string(),
            stmt: Box::new(stmt),
        })
    }

    pub fn if_stmt(&mut self, init: Option<Stmt>, cond: Expr, then: Vec<Stmt>, els: Option<Stmt>) -> Stmt {
        let then = self.block(then);
        self.stmt(StmtKind::If {
            init: init.map(Box::new),
            cond,
            then,
            els: els.map(Box::new),
            scope: None,
        })
    }

    pub fn for_stmt(
        &mut self,
        init: Option<Stmt>,
        cond: Option<Expr>,
        post: Option<Stmt>,
        body: Vec<Stmt>,
    ) -> Stmt {
        let body = self.block(body);
        self.stmt(StmtKind::For {
            init: init.map(Box::new),
            cond,
            post: post.map(Box::new),
            body,
            scope: None,
        })
    }

    pub fn range_stmt(
        &mut self,
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        x: Expr,
        body: Vec<Stmt>,
    ) -> Stmt {
        let body = self.block(body);
        self.stmt(StmtKind::Range {
            key,
            value,
            define,
            x,
            body,
            scope: None,
        })
    }

    /// Each clause is `(case expressions, body)`; an empty list is `default`.
    pub fn switch_stmt(&mut self, init: Option<Stmt>, tag: Option<Expr>, clauses: Vec<(Vec<Expr>, Vec<Stmt>)>) -> Stmt {
        let clauses = clauses
            .into_iter()
            .map(|(list, body)| CaseClause {
                list,
                body,
                scope: None,
                span: Span::none(),
            })
            .collect();
        self.stmt(StmtKind::Switch {
            init: init.map(Box::new),
            tag,
            clauses,
            scope: None,
        })
    }

    /// `switch v := x.(type)`. Each clause lists its types (`None` for
    /// `nil`), the clause's implicit variable, and the body.
    pub fn type_switch(
        &mut self,
        x: Expr,
        clauses: Vec<(Vec<Option<Type>>, Option<ObjectId>, Vec<Stmt>)>,
    ) -> Stmt {
        let clauses = clauses
            .into_iter()
            .map(|(types, implicit, body)| TypeCaseClause {
                types,
                implicit,
                body,
                scope: None,
                span: Span::none(),
            })
            .collect();
        self.stmt(StmtKind::TypeSwitch {
            init: None,
            x,
            clauses,
            scope: None,
        })
    }

    pub fn select_stmt(&mut self, clauses: Vec<(Option<CommOp>, Vec<Stmt>)>) -> Stmt {
        let clauses = clauses
            .into_iter()
            .map(|(comm, body)| CommClause {
                comm,
                body,
                scope: None,
                span: Span::none(),
            })
            .collect();
        self.stmt(StmtKind::Select(clauses))
    }

    /// A receive communication `lhs... [:]= <-chan`.
    pub fn recv_comm(&mut self, lhs: Vec<Expr>, define: bool, chan: Expr) -> CommOp {
        let elem = chan.ty.elem().unwrap_or_else(Type::invalid);
        let ty = if lhs.len() == 2 {
            Type::tuple(vec![elem, Type::bool()])
        } else {
            elem
        };
        CommOp::Recv {
            lhs,
            define,
            chan,
            ty,
        }
    }

    pub fn struct_type(fields: &[(&str, Type)]) -> Type {
        Type::structure(
            fields
                .iter()
                .map(|(name, ty)| Field {
                    name: name.to_string(),
                    ty: ty.clone(),
                    embedded: false,
                })
                .collect(),
        )
    }
}

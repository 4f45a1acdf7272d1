//! Lowering of typed syntax into function bodies.
//!
//! A [`Lowering`] builds one package. It keeps a stack of [`FunctionState`]s:
//! the bottom entry is the declared function being built, every entry above
//! it a function literal nested inside. Identifier resolution walks the stack
//! outward and threads captured variables through each level as free
//! variables.

mod call;
mod expr;
mod stmt;

use crate::function::FunctionState;
use crate::options::BuildOptions;
use gossa_core::span::Span;
use gossa_core::ssa::{sanity, AllocPolicy, Function, FunctionBody, InstrKind, Package, Program, ScopeId, Value};
use gossa_core::syntax::{Block, FuncLit, FuncType, ObjectId, ObjectKind, Param, ScopeRef, SourceProgram};
use gossa_core::{invariant, unreachable_shape};
use std::sync::Arc;

pub struct Lowering<'a> {
    pub program: &'a Program,
    pub source: &'a SourceProgram,
    pub package: &'a Arc<Package>,
    /// Preorder scope id of every node of the package scope tree.
    pub scope_ids: &'a [ScopeId],
    pub options: &'a BuildOptions,
    stack: Vec<FunctionState>,
}

impl<'a> Lowering<'a> {
    pub fn new(
        program: &'a Program,
        source: &'a SourceProgram,
        package: &'a Arc<Package>,
        scope_ids: &'a [ScopeId],
        options: &'a BuildOptions,
    ) -> Self {
        Self {
            program,
            source,
            package,
            scope_ids,
            options,
            stack: Vec::new(),
        }
    }

    /// The function currently being built.
    pub(crate) fn fs(&mut self) -> &mut FunctionState {
        match self.stack.last_mut() {
            Some(state) => state,
            None => unreachable_shape!("no function under construction"),
        }
    }

    pub(crate) fn push_function(&mut self, func: Arc<Function>) {
        let state = FunctionState::new(func, self.options.debug_markers);
        self.stack.push(state);
    }

    pub(crate) fn pop_function(&mut self) -> FunctionState {
        match self.stack.pop() {
            Some(state) => state,
            None => unreachable_shape!("function stack underflow"),
        }
    }

    /// Installs a finished body, checking its CFG when configured to.
    pub(crate) fn install(&self, func: &Arc<Function>, body: FunctionBody) {
        gossa_core::trace!(
            "built {} ({} blocks)",
            func.qualified_name(),
            body.blocks.len()
        );
        if !func.set_body(body) {
            return;
        }
        if self.options.sanity_check {
            let report = sanity::check_function(func);
            invariant!(
                report.is_ok(),
                "malformed body for {}: {:?}",
                func.qualified_name(),
                report.issues
            );
        }
    }

    pub(crate) fn object_name(&self, obj: ObjectId) -> String {
        self.source.object(obj).name.clone()
    }

    /// Kind of `obj`; the reference outlives any borrow of `self`.
    pub(crate) fn object_kind(&self, obj: ObjectId) -> &'a ObjectKind {
        let source: &'a SourceProgram = self.source;
        &source.object(obj).kind
    }

    fn scope_id(&self, scope: ScopeRef) -> ScopeId {
        match self.scope_ids.get(scope.0 as usize) {
            Some(id) => *id,
            None => unreachable_shape!("scope {:?} outside package {}", scope, self.package.path),
        }
    }

    /// Makes `scope` the current lexical scope, returning the previous one
    /// for [`Lowering::leave_scope`].
    pub(crate) fn enter_scope(&mut self, scope: Option<ScopeRef>) -> Option<ScopeId> {
        let saved = self.fs().scope;
        if let Some(scope) = scope {
            let id = self.scope_id(scope);
            self.fs().scope = Some(id);
        }
        saved
    }

    pub(crate) fn leave_scope(&mut self, saved: Option<ScopeId>) {
        self.fs().scope = saved;
    }

    /// Address of the local or captured variable `obj`. A `Heap` reference
    /// moves the variable to the heap.
    pub(crate) fn lookup(&mut self, obj: ObjectId, policy: AllocPolicy) -> Value {
        let level = self.stack.len().saturating_sub(1);
        self.lookup_at(level, obj, policy)
    }

    fn lookup_at(&mut self, level: usize, obj: ObjectId, policy: AllocPolicy) -> Value {
        if let Some(found) = self.stack[level].objects.get(&obj).cloned() {
            if policy == AllocPolicy::Heap {
                if let Some(reg) = found.as_reg() {
                    self.stack[level].mark_escaping(reg);
                }
            }
            return found;
        }
        if level == 0 {
            unreachable_shape!(
                "unresolved identifier {} in {}",
                self.object_name(obj),
                self.stack[level].func.qualified_name()
            );
        }
        // Captured from an enclosing function: by reference, so the outer
        // variable always escapes.
        let outer = self.lookup_at(level - 1, obj, AllocPolicy::Heap);
        let ty = self.stack[level - 1].value_type(&outer);
        let name = self.object_name(obj);
        let state = &mut self.stack[level];
        let reg = state.add_free_var(&name, ty, Some(outer));
        state.bind_object(obj, &name, Value::Reg(reg));
        Value::Reg(reg)
    }

    /// Address of a variable: a global cell or a local.
    pub(crate) fn var_address(&mut self, obj: ObjectId, policy: AllocPolicy) -> Value {
        match self.object_kind(obj) {
            ObjectKind::Var { global: true } => match self.program.globals.get_cloned(&obj) {
                Some(global) => Value::Global(global),
                None => unreachable_shape!("global {} was never created", self.object_name(obj)),
            },
            ObjectKind::Var { global: false } => self.lookup(obj, policy),
            other => unreachable_shape!("{:?} used as a variable", other),
        }
    }

    pub(crate) fn function_of(&self, obj: ObjectId) -> Arc<Function> {
        match self.program.funcs.get_cloned(&obj) {
            Some(func) => func,
            None => unreachable_shape!("function {} was never created", self.object_name(obj)),
        }
    }

    /// Builds the body of a declared function or method.
    pub fn build_declared(&mut self, func: &Arc<Function>, recv: Option<&Param>, ftype: &FuncType, body: &Block) {
        invariant!(self.stack.is_empty(), "nested declared function {}", func.name);
        let state = self.build_body(func, recv, ftype, body);
        self.install(func, state.finish());
    }

    /// Lowers parameters and statements into a fresh state and pops it.
    fn build_body(
        &mut self,
        func: &Arc<Function>,
        recv: Option<&Param>,
        ftype: &FuncType,
        body: &Block,
    ) -> FunctionState {
        self.push_function(func.clone());
        self.fs().pos = body.span;
        self.enter_scope(ftype.scope.or(body.scope));
        let scope = self.fs().scope;
        self.fs().blocks[0].scope = scope;

        if let Some(recv) = recv {
            self.spill_param(recv);
        }
        for param in &ftype.params {
            self.spill_param(param);
        }
        self.named_results(ftype);

        self.stmt_list(&body.stmts);
        self.pop_function()
    }

    fn spill_param(&mut self, param: &Param) {
        match param.obj {
            Some(obj) => {
                let name = self.object_name(obj);
                self.fs().add_spilled_param(Some(obj), &name, param.ty.clone());
            }
            None => {
                self.fs().add_param(param.ty.clone(), None);
            }
        }
    }

    fn named_results(&mut self, ftype: &FuncType) {
        if ftype.results.iter().all(|r| r.obj.is_none()) {
            return;
        }
        for result in &ftype.results {
            let addr = match result.obj {
                Some(obj) => {
                    let name = self.object_name(obj);
                    self.fs().emit_local_var(obj, &name, result.ty.clone())
                }
                None => self.fs().emit_local(result.ty.clone(), "_"),
            };
            if let Value::Reg(reg) = addr {
                self.fs().named_results.push(reg);
            }
        }
    }

    /// A function literal: an anonymous function of the current one, plus a
    /// closure over its free variables when it captures any.
    pub(crate) fn func_lit(&mut self, lit: &FuncLit) -> Value {
        let parent = self.fs().func.clone();
        let index = self.fs().anon_funcs.len() + 1;
        let func = Arc::new(
            Function::new(
                format!("{}${}", parent.name, index),
                parent.pkg.clone(),
                lit.ty.clone(),
                lit.span,
            )
            .with_synthetic("func literal")
            .with_parent(&parent),
        );
        self.fs().anon_funcs.push(func.clone());

        let mut state = self.build_body(&func, None, &lit.func, &lit.body);
        let bindings = std::mem::take(&mut state.free_var_outer);
        self.install(&func, state.finish());

        if bindings.is_empty() {
            return Value::Function(func);
        }
        self.fs()
            .emit_value(InstrKind::MakeClosure { func, bindings }, lit.ty.clone())
    }

    pub(crate) fn set_pos(&mut self, span: Span) {
        if !span.is_none() {
            self.fs().pos = span;
        }
    }
}

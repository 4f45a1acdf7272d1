//! Statements and control flow.

use super::Lowering;
use crate::function::{LabelBlocks, Targets};
use crate::lvalue::{Lvalue, StoreBuf};
use gossa_core::constant::ConstValue;
use gossa_core::ops::{BinaryOp, UnOpKind};
use gossa_core::ssa::{AllocPolicy, BlockId, Constant, InstrKind, SelectDir, SelectState, TraceEvent, Value};
use gossa_core::syntax::{
    AssignOp, Block, BranchKind, CaseClause, CommClause, CommOp, Expr, ExprKind, ObjectId, ObjectKind, ScopeRef,
    Stmt, StmtKind, TypeCaseClause, ValueSpec,
};
use gossa_core::types::{Type, TypeKind};
use gossa_core::unreachable_shape;
use itertools::Itertools;

impl<'a> Lowering<'a> {
    pub(crate) fn stmt_list(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            self.stmt(s, None);
        }
    }

    fn block(&mut self, block: &Block) {
        let saved = self.enter_scope(block.scope);
        self.stmt_list(&block.stmts);
        self.leave_scope(saved);
    }

    /// Lowers `s`; `label` names the labeled statement `s` is the body of.
    fn stmt(&mut self, s: &Stmt, label: Option<&str>) {
        match &s.kind {
            StmtKind::Empty => return,
            StmtKind::Block(block) => return self.block(block),
            StmtKind::Labeled { label, stmt } => return self.labeled(label, stmt),
            _ => {}
        }
        self.set_pos(s.span);
        self.fs().emit_trace(TraceEvent::Stmt);

        match &s.kind {
            StmtKind::Expr(e) => {
                self.expr(e);
            }
            StmtKind::VarDecl(specs) => {
                for spec in specs {
                    self.value_spec(spec);
                }
            }
            StmtKind::Send { chan, value } => self.send(chan, value),
            StmtKind::IncDec { x, inc } => {
                let op = if *inc { BinaryOp::Add } else { BinaryOp::Sub };
                let loc = self.addr(x, AllocPolicy::Stack);
                let ty = loc.ty();
                let one = if ty.is_float() {
                    ConstValue::Float(1.0)
                } else {
                    ConstValue::Int(1)
                };
                self.assign_op(&loc, op, Value::Const(Constant::new(one, ty)));
            }
            StmtKind::Assign { lhs, rhs, op } => match op {
                AssignOp::Define => self.assign_stmt(lhs, rhs, true),
                AssignOp::Assign => self.assign_stmt(lhs, rhs, false),
                AssignOp::Op(op) => {
                    let (Some(x), Some(y)) = (lhs.first(), rhs.first()) else {
                        unreachable_shape!("op-assignment without operands");
                    };
                    let loc = self.addr(x, AllocPolicy::Stack);
                    let incr = self.expr(y);
                    self.assign_op(&loc, *op, incr);
                }
            },
            StmtKind::Go(call) => {
                let call = self.call_of(call);
                self.fs().emit(InstrKind::Go(call), None);
            }
            StmtKind::Defer(call) => {
                let call = self.call_of(call);
                self.fs().emit(InstrKind::Defer(call), None);
                // A deferred call may recover, resuming at the recover block.
                self.fs().create_recover_block();
            }
            StmtKind::Return(results) => self.return_stmt(results),
            StmtKind::Branch { kind, label } => self.branch(*kind, label.as_deref()),
            StmtKind::If {
                init,
                cond,
                then,
                els,
                scope,
            } => {
                let saved = self.enter_scope(*scope);
                if let Some(init) = init {
                    self.fs().emit_trace(TraceEvent::IfInit);
                    self.stmt(init, None);
                }
                let then_block = self.fs().new_block("if.then");
                let done = self.fs().new_block("if.done");
                let else_block = match els {
                    Some(_) => self.fs().new_block("if.else"),
                    None => done,
                };
                self.fs().emit_trace(TraceEvent::IfCond);
                self.cond(cond, then_block, else_block);
                self.fs().set_block(then_block);
                self.block(then);
                self.fs().emit_jump(done);
                if let Some(els) = els {
                    self.fs().set_block(else_block);
                    self.stmt(els, None);
                    self.fs().emit_jump(done);
                }
                self.fs().set_block(done);
                self.leave_scope(saved);
            }
            StmtKind::Switch {
                init,
                tag,
                clauses,
                scope,
            } => {
                let saved = self.enter_scope(*scope);
                if let Some(init) = init {
                    self.fs().emit_trace(TraceEvent::SwitchInit);
                    self.stmt(init, None);
                }
                self.fs().emit_trace(TraceEvent::SwitchTag);
                let tag = match tag {
                    Some(tag) => self.expr(tag),
                    None => Value::bool(true),
                };
                self.switch_stmt(tag, clauses, label);
                self.leave_scope(saved);
            }
            StmtKind::TypeSwitch {
                init,
                x,
                clauses,
                scope,
            } => {
                let saved = self.enter_scope(*scope);
                if let Some(init) = init {
                    self.fs().emit_trace(TraceEvent::SwitchInit);
                    self.stmt(init, None);
                }
                self.fs().emit_trace(TraceEvent::TypeSwitch);
                let x = self.expr(x);
                self.type_switch_stmt(x, clauses, label);
                self.leave_scope(saved);
            }
            StmtKind::Select(clauses) => self.select_stmt(clauses, label),
            StmtKind::For {
                init,
                cond,
                post,
                body,
                scope,
            } => {
                let saved = self.enter_scope(*scope);
                self.for_stmt(init.as_deref(), cond.as_ref(), post.as_deref(), body, label);
                self.leave_scope(saved);
            }
            StmtKind::Range {
                key,
                value,
                define,
                x,
                body,
                scope,
            } => {
                let saved = self.enter_scope(*scope);
                self.range_stmt(key.as_ref(), value.as_ref(), *define, x, body, label);
                self.leave_scope(saved);
            }
            StmtKind::Empty | StmtKind::Block(_) | StmtKind::Labeled { .. } => {}
        }
    }

    fn label_blocks(&mut self, label: &str) -> LabelBlocks {
        if let Some(found) = self.fs().labels.get(label) {
            return found.clone();
        }
        let goto = self.fs().new_block(label);
        let blocks = LabelBlocks {
            goto,
            break_to: None,
            continue_to: None,
        };
        self.fs().labels.insert(label.to_string(), blocks.clone());
        blocks
    }

    fn set_label_targets(&mut self, label: Option<&str>, break_to: BlockId, continue_to: Option<BlockId>) {
        let Some(label) = label else {
            return;
        };
        if let Some(blocks) = self.fs().labels.get_mut(label) {
            blocks.break_to = Some(break_to);
            blocks.continue_to = continue_to;
        }
    }

    fn labeled(&mut self, label: &str, stmt: &Stmt) {
        let goto = self.label_blocks(label).goto;
        self.fs().emit_jump(goto);
        self.fs().set_block(goto);
        self.stmt(stmt, Some(label));
    }

    fn with_targets(&mut self, targets: Targets, f: impl FnOnce(&mut Self)) {
        self.fs().targets.push(targets);
        f(self);
        self.fs().targets.pop();
    }

    fn branch(&mut self, kind: BranchKind, label: Option<&str>) {
        let target = match (kind, label) {
            (BranchKind::Break, Some(label)) => self.fs().labels.get(label).and_then(|l| l.break_to),
            (BranchKind::Continue, Some(label)) => self.fs().labels.get(label).and_then(|l| l.continue_to),
            (BranchKind::Goto, Some(label)) => Some(self.label_blocks(label).goto),
            (BranchKind::Break, None) => self.fs().targets.iter().rev().find_map(|t| t.break_to),
            (BranchKind::Continue, None) => self.fs().targets.iter().rev().find_map(|t| t.continue_to),
            (BranchKind::Fallthrough, _) => self.fs().targets.last().and_then(|t| t.fallthrough_to),
            (BranchKind::Goto, None) => None,
        };
        let Some(target) = target else {
            unreachable_shape!("{:?} {:?} has no target", kind, label);
        };
        self.fs().emit_jump(target);
    }

    /// The variable named by a `:=` or `var` operand, declared once per
    /// function.
    fn declare_local(&mut self, obj: ObjectId) -> bool {
        let source = self.source;
        let object = source.object(obj);
        if !matches!(object.kind, ObjectKind::Var { global: false }) || self.fs().objects.contains_key(&obj) {
            return false;
        }
        let (name, ty) = (object.name.clone(), object.ty.clone());
        self.fs().emit_local_var(obj, &name, ty);
        true
    }

    fn declare_ident(&mut self, e: &Expr) -> bool {
        match e.unparen().kind {
            ExprKind::Ident(obj) => self.declare_local(obj),
            _ => false,
        }
    }

    fn local_lvalue(&mut self, obj: ObjectId) -> Lvalue {
        self.declare_local(obj);
        let addr = self.lookup(obj, AllocPolicy::Stack);
        Lvalue::address(addr, self.fs())
    }

    fn value_spec(&mut self, spec: &ValueSpec) {
        if spec.values.len() == spec.names.len() {
            for (name, value) in spec.names.iter().zip(&spec.values) {
                match name {
                    Some(obj) => {
                        let loc = self.local_lvalue(*obj);
                        self.assign(&loc, value, true, None);
                    }
                    None => {
                        self.expr(value);
                    }
                }
            }
        } else if spec.values.is_empty() {
            for obj in spec.names.iter().flatten() {
                self.declare_local(*obj);
            }
        } else {
            let tuple = self.expr_n(&spec.values[0]);
            for (i, name) in spec.names.iter().enumerate() {
                if let Some(obj) = name {
                    let loc = self.local_lvalue(*obj);
                    let v = self.fs().emit_extract(tuple.clone(), i);
                    loc.store(self.fs(), v);
                }
            }
        }
    }

    fn assign_stmt(&mut self, lhs: &[Expr], rhs: &[Expr], define: bool) {
        let mut lvals = Vec::with_capacity(lhs.len());
        let mut is_zero = Vec::with_capacity(lhs.len());
        for l in lhs {
            if l.is_blank() {
                lvals.push(Lvalue::Blank);
                is_zero.push(false);
                continue;
            }
            is_zero.push(define && self.declare_ident(l));
            lvals.push(self.addr(l, AllocPolicy::Stack));
        }

        if lhs.len() == rhs.len() {
            if let ([loc], [r]) = (lvals.as_slice(), rhs) {
                // No parallel semantics to preserve.
                self.assign(loc, r, is_zero[0], None);
                return;
            }
            let mut sb = StoreBuf::default();
            for ((loc, r), zero) in lvals.iter().zip(rhs).zip(&is_zero) {
                self.assign(loc, r, *zero, Some(&mut sb));
            }
            sb.emit(self.fs());
            return;
        }

        let Some(r) = rhs.first() else {
            unreachable_shape!("assignment without right-hand side");
        };
        let tuple = self.expr_n(r);
        for (i, loc) in lvals.iter().enumerate() {
            let v = self.fs().emit_extract(tuple.clone(), i);
            loc.store(self.fs(), v);
        }
    }

    fn assign_op(&mut self, loc: &Lvalue, op: BinaryOp, incr: Value) {
        let old = loc.load(self.fs());
        let ty = loc.ty();
        let v = self.fs().emit_arith(op, old, incr, &ty);
        loc.store(self.fs(), v);
    }

    fn send(&mut self, chan: &Expr, value: &Expr) {
        let elem = chan.ty.elem().unwrap_or_else(Type::invalid);
        let ch = self.expr(chan);
        let v = self.expr(value);
        let v = self.fs().emit_conv(v, &elem);
        self.fs().emit(InstrKind::Send { chan: ch, value: v }, None);
    }

    fn return_stmt(&mut self, results: &[Expr]) {
        let want = self
            .fs()
            .func
            .sig
            .signature()
            .map(|s| s.results)
            .unwrap_or_default();
        let mut values = Vec::with_capacity(want.len());
        if results.len() == 1 && want.len() > 1 {
            // return f() with a multi-valued f.
            let tuple = self.expr_n(&results[0]);
            for (i, ty) in want.iter().enumerate() {
                let v = self.fs().emit_extract(tuple.clone(), i);
                values.push(self.fs().emit_conv(v, ty));
            }
        } else {
            for (r, ty) in results.iter().zip(&want) {
                let v = self.expr(r);
                values.push(self.fs().emit_conv(v, ty));
            }
        }

        let named = self.fs().named_results.clone();
        if named.is_empty() {
            self.fs().emit(InstrKind::RunDefers, None);
            self.fs().emit_return(values);
            return;
        }
        // Deferred calls observe and may change the named results.
        for (reg, v) in named.iter().zip(values) {
            self.fs().emit_store(Value::Reg(*reg), v);
        }
        self.fs().emit(InstrKind::RunDefers, None);
        let values = named.iter().map(|r| self.fs().emit_load(Value::Reg(*r))).collect();
        self.fs().emit_return(values);
    }

    fn switch_stmt(&mut self, tag: Value, clauses: &[CaseClause], label: Option<&str>) {
        let done = self.fs().new_block("switch.done");
        self.set_label_targets(label, done, None);

        let mut default: Option<(&CaseClause, BlockId, BlockId)> = None;
        let mut fallthru: Option<BlockId> = None;
        for (i, clause) in clauses.iter().enumerate() {
            let body = match fallthru {
                Some(block) => block,
                None => self.fs().new_block("switch.body"),
            };
            let next_body = if i + 1 < clauses.len() {
                self.fs().new_block("switch.body")
            } else {
                done
            };
            fallthru = Some(next_body);

            if clause.list.is_empty() {
                default = Some((clause, body, next_body));
                continue;
            }
            let mut next_cond = None;
            for e in &clause.list {
                let next = self.fs().new_block("switch.next");
                let v = self.expr(e);
                let cond = self.fs().emit_compare(BinaryOp::Eql, tag.clone(), v);
                self.fs().emit_if(cond, body, next);
                self.fs().set_block(next);
                next_cond = Some(next);
            }
            self.fs().set_block(body);
            self.case_body(clause.scope, &clause.body, done, Some(next_body));
            if let Some(next) = next_cond {
                self.fs().set_block(next);
            }
        }
        if let Some((clause, body, next_body)) = default {
            self.fs().emit_jump(body);
            self.fs().set_block(body);
            self.case_body(clause.scope, &clause.body, done, Some(next_body));
        }
        self.fs().emit_jump(done);
        self.fs().set_block(done);
    }

    fn case_body(&mut self, scope: Option<ScopeRef>, body: &[Stmt], done: BlockId, fallthrough: Option<BlockId>) {
        let saved = self.enter_scope(scope);
        let targets = Targets {
            break_to: Some(done),
            continue_to: None,
            fallthrough_to: fallthrough,
        };
        self.with_targets(targets, |this| this.stmt_list(body));
        self.fs().emit_jump(done);
        self.leave_scope(saved);
    }

    fn type_switch_stmt(&mut self, x: Value, clauses: &[TypeCaseClause], label: Option<&str>) {
        let done = self.fs().new_block("typeswitch.done");
        self.set_label_targets(label, done, None);

        let mut default = None;
        for clause in clauses {
            if clause.types.is_empty() {
                default = Some(clause);
                continue;
            }
            let body = self.fs().new_block("typeswitch.body");
            let mut next = None;
            let mut ti = x.clone();
            for case in &clause.types {
                let block = self.fs().new_block("typeswitch.next");
                let cond = match case {
                    None => {
                        let xt = self.fs().value_type(&x);
                        ti = x.clone();
                        self.fs().emit_compare(BinaryOp::Eql, x.clone(), Value::zero(xt))
                    }
                    Some(ty) => {
                        let yok = self.fs().emit_type_test(x.clone(), ty);
                        ti = self.fs().emit_extract(yok.clone(), 0);
                        self.fs().emit_extract(yok, 1)
                    }
                };
                self.fs().emit_if(cond, body, block);
                self.fs().set_block(block);
                next = Some(block);
            }
            if clause.types.len() != 1 {
                ti = x.clone();
            }
            self.fs().set_block(body);
            self.type_case_body(clause, ti, done);
            if let Some(next) = next {
                self.fs().set_block(next);
            }
        }
        match default {
            Some(clause) => self.type_case_body(clause, x, done),
            None => self.fs().emit_jump(done),
        }
        self.fs().set_block(done);
    }

    fn type_case_body(&mut self, clause: &TypeCaseClause, value: Value, done: BlockId) {
        let saved = self.enter_scope(clause.scope);
        if let Some(obj) = clause.implicit {
            let loc = self.local_lvalue(obj);
            loc.store(self.fs(), value);
        }
        let targets = Targets {
            break_to: Some(done),
            ..Targets::default()
        };
        self.with_targets(targets, |this| this.stmt_list(&clause.body));
        self.fs().emit_jump(done);
        self.leave_scope(saved);
    }

    /// A communication outside a select: a plain send or receive.
    fn comm_stmt(&mut self, comm: &CommOp) {
        match comm {
            CommOp::Send { chan, value } => self.send(chan, value),
            CommOp::Recv { lhs, define, chan, ty } => {
                let ch = self.expr(chan);
                let comma_ok = lhs.len() == 2;
                let v = self.fs().emit_value(
                    InstrKind::UnOp {
                        op: UnOpKind::Recv,
                        x: ch,
                        comma_ok,
                    },
                    ty.clone(),
                );
                let lvals = self.recv_lvalues(lhs, *define);
                if comma_ok {
                    for (i, loc) in lvals.iter().enumerate() {
                        let x = self.fs().emit_extract(v.clone(), i);
                        loc.store(self.fs(), x);
                    }
                } else if let Some(loc) = lvals.first() {
                    loc.store(self.fs(), v);
                }
            }
        }
    }

    fn recv_lvalues(&mut self, lhs: &[Expr], define: bool) -> Vec<Lvalue> {
        lhs.iter()
            .map(|l| {
                if l.is_blank() {
                    return Lvalue::Blank;
                }
                if define {
                    self.declare_ident(l);
                }
                self.addr(l, AllocPolicy::Stack)
            })
            .collect()
    }

    fn select_stmt(&mut self, clauses: &[CommClause], label: Option<&str>) {
        if let [CommClause {
            comm: Some(comm),
            body,
            scope,
            ..
        }] = clauses
        {
            // A select with one case blocks on that communication alone.
            let saved = self.enter_scope(*scope);
            self.comm_stmt(comm);
            let done = self.fs().new_block("select.done");
            self.set_label_targets(label, done, None);
            self.case_body(None, body, done, None);
            self.fs().set_block(done);
            self.leave_scope(saved);
            return;
        }

        self.fs().emit_trace(TraceEvent::Select);
        let mut states = Vec::new();
        let mut blocking = true;
        let mut recv_elems = Vec::new();
        for clause in clauses {
            match &clause.comm {
                None => blocking = false,
                Some(CommOp::Send { chan, value }) => {
                    let elem = chan.ty.elem().unwrap_or_else(Type::invalid);
                    let ch = self.expr(chan);
                    let v = self.expr(value);
                    let v = self.fs().emit_conv(v, &elem);
                    states.push(SelectState {
                        dir: SelectDir::Send,
                        chan: ch,
                        send: Some(v),
                        span: clause.span,
                    });
                }
                Some(CommOp::Recv { chan, .. }) => {
                    recv_elems.push(chan.ty.elem().unwrap_or_else(Type::invalid));
                    let ch = self.expr(chan);
                    states.push(SelectState {
                        dir: SelectDir::Recv,
                        chan: ch,
                        send: None,
                        span: clause.span,
                    });
                }
            }
        }

        let mut tuple = vec![Type::int(), Type::bool()];
        tuple.extend(recv_elems);
        let sel = self
            .fs()
            .emit_value(InstrKind::Select { states, blocking }, Type::tuple(tuple));
        let index = self.fs().emit_extract(sel.clone(), 0);
        let done = self.fs().new_block("select.done");
        self.set_label_targets(label, done, None);

        let mut default = None;
        let mut state = 0;
        let mut r = 2;
        for clause in clauses {
            let Some(comm) = &clause.comm else {
                default = Some(clause);
                continue;
            };
            let body = self.fs().new_block("select.body");
            let next = self.fs().new_block("select.next");
            let cond = self
                .fs()
                .emit_compare(BinaryOp::Eql, index.clone(), Value::int(state));
            self.fs().emit_if(cond, body, next);
            self.fs().set_block(body);

            let saved = self.enter_scope(clause.scope);
            if let CommOp::Recv { lhs, define, .. } = comm {
                let lvals = self.recv_lvalues(lhs, *define);
                if let Some(loc) = lvals.first() {
                    let v = self.fs().emit_extract(sel.clone(), r);
                    loc.store(self.fs(), v);
                }
                if let Some(ok) = lvals.get(1) {
                    let v = self.fs().emit_extract(sel.clone(), 1);
                    ok.store(self.fs(), v);
                }
                r += 1;
            }
            let targets = Targets {
                break_to: Some(done),
                ..Targets::default()
            };
            self.with_targets(targets, |this| this.stmt_list(&clause.body));
            self.fs().emit_jump(done);
            self.leave_scope(saved);

            self.fs().set_block(next);
            state += 1;
        }
        match default {
            Some(clause) => {
                let saved = self.enter_scope(clause.scope);
                let targets = Targets {
                    break_to: Some(done),
                    ..Targets::default()
                };
                self.with_targets(targets, |this| this.stmt_list(&clause.body));
                self.leave_scope(saved);
            }
            None => {
                self.fs()
                    .emit_panic(Value::string("blocking select matched no case"));
            }
        }
        self.fs().emit_jump(done);
        self.fs().set_block(done);
    }

    fn for_stmt(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        post: Option<&Stmt>,
        body: &Block,
        label: Option<&str>,
    ) {
        if let Some(init) = init {
            self.fs().emit_trace(TraceEvent::ForInit);
            self.stmt(init, None);
        }
        let body_block = self.fs().new_block("for.body");
        let done = self.fs().new_block("for.done");
        let head = match cond {
            Some(_) => self.fs().new_block("for.loop"),
            None => body_block,
        };
        let cont = match post {
            Some(_) => self.fs().new_block("for.post"),
            None => head,
        };
        self.set_label_targets(label, done, Some(cont));

        self.fs().emit_jump(head);
        self.fs().set_block(head);
        if let Some(cond) = cond {
            self.fs().emit_trace(TraceEvent::ForCond);
            self.cond(cond, body_block, done);
            self.fs().set_block(body_block);
        }
        let targets = Targets {
            break_to: Some(done),
            continue_to: Some(cont),
            fallthrough_to: None,
        };
        self.with_targets(targets, |this| this.block(body));
        self.fs().emit_jump(cont);

        if let Some(post) = post {
            self.fs().set_block(cont);
            self.fs().emit_trace(TraceEvent::ForPost);
            self.stmt(post, None);
            self.fs().emit_jump(head);
        }
        self.fs().set_block(done);
    }

    fn range_stmt(
        &mut self,
        key: Option<&Expr>,
        value: Option<&Expr>,
        define: bool,
        x: &Expr,
        body: &Block,
        label: Option<&str>,
    ) {
        let key = key.filter(|k| !k.is_blank());
        let value = value.filter(|v| !v.is_blank());
        if define {
            // Iteration variables are shared by all iterations.
            for e in key.iter().chain(value.iter()) {
                self.declare_ident(e);
            }
        }

        let xv = self.expr(x);
        let (k, v, head, done) = match x.ty.underlying().kind() {
            TypeKind::Slice(_) | TypeKind::Array(..) | TypeKind::Pointer(_) => {
                self.range_indexed(xv, &x.ty, value.is_some())
            }
            TypeKind::Chan(_, elem) => {
                let (k, head, done) = self.range_chan(xv, elem, key.is_some());
                (k, None, head, done)
            }
            TypeKind::Map(..) | TypeKind::Basic(_) => {
                let tk = key.map(|k| k.ty.clone());
                let tv = value.map(|v| v.ty.clone());
                self.range_iter(xv, x.ty.underlying().is_string(), tk, tv)
            }
            _ => unreachable_shape!("range over {}", x.ty),
        };

        // Both locations are evaluated before either is updated.
        let kl = key.map(|k| self.addr(k, AllocPolicy::Stack));
        let vl = value.map(|v| self.addr(v, AllocPolicy::Stack));
        if let (Some(kl), Some(k)) = (&kl, k) {
            kl.store(self.fs(), k);
        }
        if let (Some(vl), Some(v)) = (&vl, v) {
            vl.store(self.fs(), v);
        }

        self.set_label_targets(label, done, Some(head));
        let targets = Targets {
            break_to: Some(done),
            continue_to: Some(head),
            fallthrough_to: None,
        };
        self.with_targets(targets, |this| this.block(body));
        self.fs().emit_jump(head);
        self.fs().set_block(done);
    }

    /// Ranges over an array, `*array` or slice with a hidden index local.
    fn range_indexed(
        &mut self,
        x: Value,
        ty: &Type,
        want_value: bool,
    ) -> (Option<Value>, Option<Value>, BlockId, BlockId) {
        let length = match ty.deref().underlying().array_len() {
            Some(len) => Value::int(len as i64),
            None => {
                let call = gossa_core::ssa::CallCommon {
                    callee: crate::function::FunctionState::len_of(ty.clone()),
                    method: None,
                    args: vec![x.clone()],
                    sig: Type::func(vec![ty.clone()], vec![Type::int()], false),
                    span: self.fs().pos,
                };
                self.fs().emit_value(InstrKind::Call(call), Type::int())
            }
        };
        let index = self.fs().emit_local(Type::int(), "rangeindex");
        self.fs().emit_store(index.clone(), Value::int(-1));

        let head = self.fs().new_block("rangeindex.loop");
        self.fs().emit_jump(head);
        self.fs().set_block(head);
        self.fs().emit_trace(TraceEvent::Range);
        let old = self.fs().emit_load(index.clone());
        let incr = self.fs().emit_value(
            InstrKind::BinOp {
                op: BinaryOp::Add,
                x: old,
                y: Value::int(1),
            },
            Type::int(),
        );
        self.fs().emit_store(index.clone(), incr.clone());

        let body = self.fs().new_block("rangeindex.body");
        let done = self.fs().new_block("rangeindex.done");
        let more = self.fs().emit_compare(BinaryOp::Lss, incr, length);
        self.fs().emit_if(more, body, done);
        self.fs().set_block(body);

        let k = self.fs().emit_load(index);
        let v = if want_value {
            let underlying = ty.underlying();
            Some(match underlying.kind() {
                TypeKind::Array(elem, _) => self.fs().emit_value(
                    InstrKind::Index {
                        x,
                        index: k.clone(),
                    },
                    elem.clone(),
                ),
                _ => {
                    let elem = match underlying.kind() {
                        TypeKind::Slice(elem) => elem.clone(),
                        _ => ty.deref().elem().unwrap_or_else(Type::invalid),
                    };
                    let addr = self.fs().emit_value(
                        InstrKind::IndexAddr {
                            x,
                            index: k.clone(),
                        },
                        Type::pointer(elem),
                    );
                    self.fs().emit_load(addr)
                }
            })
        } else {
            None
        };
        (Some(k), v, head, done)
    }

    /// Ranges over a channel until it is closed and drained.
    fn range_chan(&mut self, x: Value, elem: &Type, want_key: bool) -> (Option<Value>, BlockId, BlockId) {
        let head = self.fs().new_block("rangechan.loop");
        self.fs().emit_jump(head);
        self.fs().set_block(head);
        self.fs().emit_trace(TraceEvent::Range);
        let ko = self.fs().emit_value(
            InstrKind::UnOp {
                op: UnOpKind::Recv,
                x,
                comma_ok: true,
            },
            Type::tuple(vec![elem.clone(), Type::bool()]),
        );
        let body = self.fs().new_block("rangechan.body");
        let done = self.fs().new_block("rangechan.done");
        let ok = self.fs().emit_extract(ko.clone(), 1);
        self.fs().emit_if(ok, body, done);
        self.fs().set_block(body);
        let k = want_key.then(|| self.fs().emit_extract(ko, 0));
        (k, head, done)
    }

    /// Ranges over a map or string with a `Range` iterator.
    fn range_iter(
        &mut self,
        x: Value,
        is_string: bool,
        tk: Option<Type>,
        tv: Option<Type>,
    ) -> (Option<Value>, Option<Value>, BlockId, BlockId) {
        let iter = self.fs().emit_value(InstrKind::Range { x }, Type::invalid());
        let head = self.fs().new_block("rangeiter.loop");
        self.fs().emit_jump(head);
        self.fs().set_block(head);
        self.fs().emit_trace(TraceEvent::Range);

        let elems = [
            Type::bool(),
            tk.clone().unwrap_or_else(Type::invalid),
            tv.clone().unwrap_or_else(Type::invalid),
        ];
        let okv = self.fs().emit_value(
            InstrKind::Next { iter, is_string },
            Type::tuple(elems.into_iter().collect_vec()),
        );
        let body = self.fs().new_block("rangeiter.body");
        let done = self.fs().new_block("rangeiter.done");
        let ok = self.fs().emit_extract(okv.clone(), 0);
        self.fs().emit_if(ok, body, done);
        self.fs().set_block(body);
        let k = tk.map(|_| self.fs().emit_extract(okv.clone(), 1));
        let v = tv.map(|_| self.fs().emit_extract(okv, 2));
        (k, v, head, done)
    }
}

//! Per-function construction state.
//!
//! A [`FunctionState`] accumulates blocks, registers and debug bindings while
//! a body is lowered, and is consumed by [`FunctionState::finish`] into the
//! immutable [`FunctionBody`] installed on the function.

use gossa_core::ssa::{
    AllocPolicy, BasicBlock, BlockId, DebugVar, FreeVar, Function, FunctionBody, InstrKind,
    Instruction, Reg, RegDef, RegInfo, ScopeId, Value,
};
use gossa_core::span::Span;
use gossa_core::syntax::ObjectId;
use gossa_core::types::Type;
use gossa_core::unreachable_shape;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Jump targets of the innermost enclosing breakable statement.
#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub break_to: Option<BlockId>,
    pub continue_to: Option<BlockId>,
    pub fallthrough_to: Option<BlockId>,
}

/// Blocks associated with a source label.
#[derive(Debug, Clone)]
pub struct LabelBlocks {
    pub goto: BlockId,
    pub break_to: Option<BlockId>,
    pub continue_to: Option<BlockId>,
}

pub struct FunctionState {
    pub func: Arc<Function>,
    pub blocks: Vec<BasicBlock>,
    pub current: Option<BlockId>,
    pub regs: Vec<RegInfo>,
    pub params: Vec<Reg>,
    pub free_vars: Vec<FreeVar>,
    /// Value each free variable is bound to in the enclosing function.
    pub free_var_outer: Vec<Value>,
    /// Address of every source variable declared in or captured by this function.
    pub objects: HashMap<ObjectId, Value>,
    alloc_sites: HashMap<Reg, (BlockId, usize)>,
    pub locals: Vec<Reg>,
    pub named_results: Vec<Reg>,
    pub anon_funcs: Vec<Arc<Function>>,
    pub recover: Option<BlockId>,
    pub vars: Vec<DebugVar>,
    pub targets: Vec<Targets>,
    pub labels: HashMap<String, LabelBlocks>,
    pub scope: Option<ScopeId>,
    pub pos: Span,
    pub debug_markers: bool,
    next_marker: u32,
}

impl FunctionState {
    pub fn new(func: Arc<Function>, debug_markers: bool) -> Self {
        let pos = func.span;
        let mut state = Self {
            func,
            blocks: Vec::new(),
            current: None,
            regs: Vec::new(),
            params: Vec::new(),
            free_vars: Vec::new(),
            free_var_outer: Vec::new(),
            objects: HashMap::new(),
            alloc_sites: HashMap::new(),
            locals: Vec::new(),
            named_results: Vec::new(),
            anon_funcs: Vec::new(),
            recover: None,
            vars: Vec::new(),
            targets: Vec::new(),
            labels: HashMap::new(),
            scope: None,
            pos,
            debug_markers,
            next_marker: 0,
        };
        let entry = state.new_block("entry");
        state.current = Some(entry);
        state
    }

    pub fn new_block(&mut self, comment: &str) -> BlockId {
        let index = self.blocks.len();
        self.blocks.push(BasicBlock::new(index, comment, self.scope));
        index
    }

    pub fn set_block(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    /// The block instructions are appended to. Code following a terminator
    /// lands in a fresh predecessor-less block.
    pub fn current_block(&mut self) -> BlockId {
        match self.current {
            Some(block) => block,
            None => {
                let block = self.new_block("unreachable");
                self.current = Some(block);
                block
            }
        }
    }

    pub fn new_reg(&mut self, ty: Type, name: Option<String>, def: RegDef) -> Reg {
        let reg = Reg(self.regs.len() as u32);
        self.regs.push(RegInfo { ty, name, def });
        reg
    }

    pub fn reg_type(&self, reg: Reg) -> &Type {
        &self.regs[reg.index()].ty
    }

    pub fn value_type(&self, value: &Value) -> Type {
        match value {
            Value::Const(c) => c.ty.clone(),
            Value::Reg(r) => self.reg_type(*r).clone(),
            Value::Function(f) => f.sig.clone(),
            Value::Global(g) => g.ty.clone(),
            Value::Builtin(_, ty) => ty.clone(),
        }
    }

    pub fn next_marker(&mut self) -> u32 {
        let marker = self.next_marker;
        self.next_marker += 1;
        marker
    }

    /// Appends an instruction to the current block. `ty` gives the type of
    /// the result register; `None` for instructions without a result.
    pub fn emit(&mut self, kind: InstrKind, ty: Option<Type>) -> Option<Value> {
        let block = self.current_block();
        let result = ty.map(|ty| self.new_reg(ty, None, RegDef::Instr));
        if let (InstrKind::Alloc { .. }, Some(reg)) = (&kind, result) {
            self.alloc_sites
                .insert(reg, (block, self.blocks[block].instrs.len()));
        }
        self.blocks[block].instrs.push(Instruction {
            kind,
            result,
            span: self.pos,
        });
        result.map(Value::Reg)
    }

    /// Like [`FunctionState::emit`] for instructions that always define a value.
    pub fn emit_value(&mut self, kind: InstrKind, ty: Type) -> Value {
        match self.emit(kind, Some(ty)) {
            Some(value) => value,
            None => unreachable_shape!("value-defining instruction produced no register"),
        }
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
    }

    pub fn add_param(&mut self, ty: Type, name: Option<String>) -> Reg {
        let index = self.params.len();
        let reg = self.new_reg(ty, name, RegDef::Param(index));
        self.params.push(reg);
        reg
    }

    /// A parameter stored into its own stack slot, so it is addressable and
    /// visible to the debugger under its name.
    pub fn add_spilled_param(&mut self, obj: Option<ObjectId>, name: &str, ty: Type) -> Reg {
        let param = self.add_param(ty.clone(), Some(name.to_string()));
        let spill = self.emit_local(ty, name);
        if let Some(obj) = obj {
            self.bind_object(obj, name, spill.clone());
        }
        self.emit_store(spill, Value::Reg(param));
        param
    }

    /// A free variable; `outer` is what the enclosing function binds it to,
    /// `None` for thunks whose bindings are supplied at the closure site.
    pub fn add_free_var(&mut self, name: &str, ty: Type, outer: Option<Value>) -> Reg {
        let index = self.free_vars.len();
        let reg = self.new_reg(ty.clone(), Some(name.to_string()), RegDef::FreeVar(index));
        self.free_vars.push(FreeVar {
            reg,
            name: name.to_string(),
            ty,
        });
        self.free_var_outer.extend(outer);
        reg
    }

    /// Records `addr` as the address of the source variable `obj`.
    pub fn bind_object(&mut self, obj: ObjectId, name: &str, addr: Value) {
        if let Value::Reg(reg) = &addr {
            self.vars.push(DebugVar {
                name: name.to_string(),
                scope: self.scope,
                addr: *reg,
                span: self.pos,
            });
        }
        self.objects.insert(obj, addr);
    }

    /// A zeroed stack slot.
    pub fn emit_local(&mut self, ty: Type, comment: &str) -> Value {
        let slot = self.locals.len();
        let value = self.emit_value(
            InstrKind::Alloc {
                ty: ty.clone(),
                policy: AllocPolicy::Stack,
                slot: Some(slot),
                comment: comment.to_string(),
            },
            Type::pointer(ty),
        );
        if let Value::Reg(reg) = &value {
            self.locals.push(*reg);
        }
        value
    }

    /// A zeroed heap cell.
    pub fn emit_new(&mut self, ty: Type, comment: &str) -> Value {
        self.emit_value(
            InstrKind::Alloc {
                ty: ty.clone(),
                policy: AllocPolicy::Heap,
                slot: None,
                comment: comment.to_string(),
            },
            Type::pointer(ty),
        )
    }

    /// Declares a new local for `obj`.
    pub fn emit_local_var(&mut self, obj: ObjectId, name: &str, ty: Type) -> Value {
        let addr = self.emit_local(ty, name);
        self.bind_object(obj, name, addr.clone());
        addr
    }

    /// Moves the allocation defining `reg`, if any, to the heap.
    pub fn mark_escaping(&mut self, reg: Reg) {
        if let Some(&(block, index)) = self.alloc_sites.get(&reg) {
            if let InstrKind::Alloc { policy, .. } = &mut self.blocks[block].instrs[index].kind {
                *policy = AllocPolicy::Heap;
            }
        }
    }

    /// The block a recovered panic resumes at: it returns the named results,
    /// or zero values when results are unnamed.
    pub fn create_recover_block(&mut self) {
        if self.recover.is_some() {
            return;
        }
        let saved = self.current;
        let block = self.new_block("recover");
        self.recover = Some(block);
        self.current = Some(block);
        let results = if self.named_results.is_empty() {
            self.func
                .sig
                .signature()
                .map(|sig| sig.results)
                .unwrap_or_default()
                .into_iter()
                .map(Value::zero)
                .collect()
        } else {
            self.named_results
                .clone()
                .into_iter()
                .map(|r| self.emit_load(Value::Reg(r)))
                .collect()
        };
        self.emit(InstrKind::Return { results }, None);
        self.current = saved;
    }

    /// Completes the body: falls off the end with `RunDefers; Return`,
    /// removes blocks unreachable from the entry and recover blocks, and
    /// renumbers the survivors densely. Phi edges of removed predecessors
    /// are dropped with them.
    pub fn finish(mut self) -> FunctionBody {
        if let Some(cb) = self.current {
            if !self.blocks[cb].is_terminated() {
                self.emit(InstrKind::RunDefers, None);
                self.emit(InstrKind::Return { results: Vec::new() }, None);
            }
        }
        self.current = None;

        let recover = self.recover;
        let mut keep = vec![false; self.blocks.len()];
        let mut work: Vec<BlockId> = vec![0];
        work.extend(recover);
        while let Some(b) = work.pop() {
            if keep[b] {
                continue;
            }
            keep[b] = true;
            work.extend(self.blocks[b].succs.iter().copied());
        }

        let mut dropped_regs: HashSet<Reg> = HashSet::new();
        let mut remap: Vec<Option<BlockId>> = Vec::with_capacity(self.blocks.len());
        let mut next = 0;
        for &k in &keep {
            if k {
                remap.push(Some(next));
                next += 1;
            } else {
                remap.push(None);
            }
        }

        let mut blocks = Vec::with_capacity(next);
        for (old, mut block) in std::mem::take(&mut self.blocks).into_iter().enumerate() {
            let Some(new) = remap[old] else {
                dropped_regs.extend(block.instrs.iter().filter_map(|i| i.result));
                continue;
            };
            block.index = new;
            let live: Vec<bool> = block.preds.iter().map(|p| remap[*p].is_some()).collect();
            if live.contains(&false) {
                for instr in &mut block.instrs {
                    if let InstrKind::Phi { edges, .. } = &mut instr.kind {
                        let mut i = 0;
                        edges.retain(|_| {
                            i += 1;
                            live.get(i - 1).copied().unwrap_or(false)
                        });
                    }
                }
            }
            block.preds = block.preds.iter().filter_map(|p| remap[*p]).collect();
            block.succs = block.succs.iter().filter_map(|s| remap[*s]).collect();
            blocks.push(block);
        }
        let vars = self
            .vars
            .into_iter()
            .filter(|v| !dropped_regs.contains(&v.addr))
            .collect();

        FunctionBody {
            blocks,
            params: self.params,
            free_vars: self.free_vars,
            regs: self.regs,
            locals: self.locals,
            named_results: self.named_results,
            anon_funcs: self.anon_funcs,
            recover: recover.and_then(|r| remap[r]),
            vars,
        }
    }
}

//! Instruction dispatch.
//!
//! A call runs its function's blocks on the current thread, one Rust stack
//! frame per interpreted frame. Panics travel as `Err(Unwind::Panic)` through
//! the callers; each frame on the way runs its deferred calls and, when one
//! of them recovers, resumes at its recover block.

use super::builtins;
use super::Interpreter;
use crate::chan::{Channel, SelectCase};
use crate::error::{nil_dereference, panic_with, runtime_error, Flow, Unwind};
use crate::frame::{Callee, Deferred, Frame, Status};
use crate::hook::{BreakpointTarget, Event, StepMode};
use crate::interp_bail;
use crate::ops;
use crate::value::{from_constant, zero, Closure, Key, Pointer, RangeIter, Slice, Value};
use gossa_core::error::Error;
use gossa_core::ops::UnOpKind;
use gossa_core::ssa::{
    AllocPolicy, BasicBlock, BlockId, CallCommon, FunctionBody, InstrKind, Instruction, Reg, SelectDir,
    Value as Operand,
};
use gossa_core::types::{find_method, implements, Type, TypeKind};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// What the dispatch loop does after an instruction.
enum Continuation {
    Next,
    Jump(BlockId),
    Return(Value),
}

/// Calls `closure` with `args` from `caller` (or as the root of a goroutine).
pub(super) fn call<'a>(
    interp: &'a Arc<Interpreter>,
    caller: Option<&'a Frame<'a>>,
    closure: &Closure,
    args: Vec<Value>,
    goroutine: u64,
) -> Flow<Value> {
    let func = &closure.func;
    let frame = Frame::new(interp, caller, func.clone(), closure.env.clone(), goroutine);
    if frame.depth() > interp.options().max_depth {
        return Err(Error::internal(format!("stack overflow calling {}", func.qualified_name())).into());
    }
    let Some(body) = func.body() else {
        return frame.call_native(args);
    };

    frame.emit(None, Event::CallEnter);
    if interp.hooks().tracing() {
        let target = BreakpointTarget::Function(func.qualified_name());
        let hit = interp.hooks().breakpoints.lock().hit(&target);
        if let Some(id) = hit {
            frame.stop_at(None, id);
        }
    }

    let result = frame.run(body, args);
    if result.is_ok() {
        frame.status.set(Status::Complete);
    }
    frame.emit(None, Event::CallReturn);
    if frame.step_mode() == StepMode::StepOut {
        if let Some(caller) = caller {
            caller.set_step_mode(StepMode::StepOver);
        }
    }
    result
}

/// Runs the body of a new goroutine. Builtins run on a bodiless frame of the
/// function that spawned them.
pub(super) fn run_goroutine(
    interp: &Arc<Interpreter>,
    callee: &Callee,
    args: Vec<Value>,
    goroutine: u64,
    from: &Arc<gossa_core::ssa::Function>,
) -> Flow<Value> {
    match callee {
        Callee::Func(closure) => call(interp, None, closure, args, goroutine),
        Callee::Builtin(kind, sig) => {
            let frame = Frame::new(interp, None, from.clone(), Arc::from(Vec::new()), goroutine);
            builtins::call(&frame, *kind, sig, args)
        }
    }
}

fn chan_of(value: Value) -> Flow<Option<Arc<Channel>>> {
    match value {
        Value::Chan(chan) => Ok(chan),
        other => interp_bail!(format!("channel operation on {:?}", other)),
    }
}

fn index_of(value: &Value) -> Flow<i64> {
    match value.as_i64() {
        Some(i) => Ok(i),
        None => interp_bail!(format!("non-integer index {:?}", value)),
    }
}

fn index_out_of_range(index: i64, len: usize) -> Unwind {
    runtime_error(format!("index out of range [{}] with length {}", index, len))
}

fn comma_ok(value: Value, ok: bool) -> Value {
    Value::Tuple(vec![value, Value::Bool(ok)])
}

impl<'a> Frame<'a> {
    fn call_native(&self, args: Vec<Value>) -> Flow<Value> {
        let name = self.func.qualified_name();
        let Some(native) = self.interp.natives().get(&name) else {
            return Err(Error::NotImplemented(name).into());
        };
        gossa_core::trace!("native call {}", name);
        let value = native(self, args)?;
        if let Some(code) = self.interp.scheduler().aborted() {
            return Err(Unwind::Exit(code));
        }
        Ok(value)
    }

    fn run(&self, body: &FunctionBody, args: Vec<Value>) -> Flow<Value> {
        {
            let mut regs = self.regs.borrow_mut();
            for (reg, arg) in body.params.iter().zip(args) {
                regs[reg.index()] = Some(arg);
            }
            for (var, value) in body.free_vars.iter().zip(self.env.iter()) {
                regs[var.reg.index()] = Some(value.clone());
            }
        }

        let mut start = 0;
        loop {
            let panic = match self.exec_from(body, start) {
                Err(Unwind::Panic(value)) => value,
                other => return other,
            };
            self.status.set(Status::Panicking);
            *self.panic.borrow_mut() = Some(panic);
            self.emit(self.instruction(), Event::Panic);
            self.run_defers()?;

            let unrecovered = self.panic.borrow_mut().take();
            if let Some(value) = unrecovered {
                return Err(Unwind::Panic(value));
            }
            self.status.set(Status::Running);
            match body.recover {
                Some(block) => {
                    gossa_core::debug!("{} recovered, resuming at block {}", self.func.qualified_name(), block);
                    self.prev.set(None);
                    start = block;
                }
                None => {
                    let results = self
                        .func
                        .sig
                        .signature()
                        .map(|s| s.result_type())
                        .unwrap_or_else(|| Type::tuple(Vec::new()));
                    return Ok(zero(&results));
                }
            }
        }
    }

    fn exec_from(&self, body: &FunctionBody, start: BlockId) -> Flow<Value> {
        let mut current = start;
        loop {
            if let Some(code) = self.interp.scheduler().aborted() {
                return Err(Unwind::Exit(code));
            }
            let Some(block) = body.blocks.get(current) else {
                interp_bail!(format!("{} has no block {}", self.func.qualified_name(), current));
            };
            self.block.set(current);
            self.pc.set(0);
            let phis = self.resolve_phis(block)?;

            let mut next = None;
            for (pc, instr) in block.instrs.iter().enumerate().skip(phis) {
                self.pc.set(pc);
                match self.step(body, block, instr)? {
                    Continuation::Next => {}
                    Continuation::Jump(target) => {
                        next = Some(target);
                        break;
                    }
                    Continuation::Return(value) => {
                        self.emit(Some(instr), Event::BlockEnd);
                        return Ok(value);
                    }
                }
            }
            self.emit(block.terminator(), Event::BlockEnd);
            let Some(target) = next else {
                interp_bail!(format!(
                    "block {} of {} ended without a terminator",
                    current,
                    self.func.qualified_name()
                ));
            };
            self.prev.set(Some(current));
            current = target;
        }
    }

    /// Assigns every phi of `block` at once, from the edge of the block we
    /// came from. Returns the number of phis.
    fn resolve_phis(&self, block: &BasicBlock) -> Flow<usize> {
        let phis: Vec<&Instruction> = block.phis().collect();
        if phis.is_empty() {
            return Ok(0);
        }
        let edge = self
            .prev
            .get()
            .and_then(|prev| block.preds.iter().position(|p| *p == prev));
        let Some(edge) = edge else {
            interp_bail!(format!(
                "phi in block {} of {} reached without a predecessor",
                block.index,
                self.func.qualified_name()
            ));
        };
        let mut values = Vec::with_capacity(phis.len());
        for phi in &phis {
            let InstrKind::Phi { edges, .. } = &phi.kind else {
                continue;
            };
            let Some(operand) = edges.get(edge) else {
                interp_bail!(format!("phi with {} edges in block {}", edges.len(), block.index));
            };
            values.push((phi.result, self.value(operand)?));
        }
        for (reg, value) in values {
            self.set(reg, value);
        }
        Ok(phis.len())
    }

    fn value(&self, operand: &Operand) -> Flow<Value> {
        match operand {
            Operand::Const(c) => Ok(from_constant(c)),
            Operand::Reg(reg) => {
                let value = self.regs.borrow().get(reg.index()).cloned().flatten();
                match value {
                    Some(value) => Ok(value),
                    None => interp_bail!(format!(
                        "t{} of {} read before it was defined",
                        reg.0,
                        self.func.qualified_name()
                    )),
                }
            }
            Operand::Function(func) => Ok(Value::Func(Some(Closure::plain(func.clone())))),
            Operand::Global(global) => Ok(Value::Pointer(Some(self.interp.global(global)?))),
            Operand::Builtin(kind, _) => interp_bail!(format!("builtin {} used as a value", kind)),
        }
    }

    fn operand_type(&self, body: &FunctionBody, operand: &Operand) -> Type {
        match operand {
            Operand::Const(c) => c.ty.clone(),
            Operand::Reg(reg) => body.reg_type(*reg).clone(),
            Operand::Function(func) => func.sig.clone(),
            Operand::Global(global) => global.ty.clone(),
            Operand::Builtin(_, ty) => ty.clone(),
        }
    }

    fn result_type(&self, body: &FunctionBody, instr: &Instruction) -> Type {
        match instr.result {
            Some(reg) => body.reg_type(reg).clone(),
            None => Type::invalid(),
        }
    }

    fn set(&self, reg: Option<Reg>, value: Value) {
        if let Some(reg) = reg {
            if let Some(slot) = self.regs.borrow_mut().get_mut(reg.index()) {
                *slot = Some(value);
            }
        }
    }

    fn step(&self, body: &FunctionBody, block: &BasicBlock, instr: &Instruction) -> Flow<Continuation> {
        let value = match &instr.kind {
            InstrKind::BinOp { op, x, y } => {
                let ty = self.operand_type(body, x);
                ops::binop(*op, &self.value(x)?, &self.value(y)?, &ty)?
            }
            InstrKind::UnOp { op, x, comma_ok: ok } => self.unop(body, *op, x, *ok)?,
            InstrKind::Alloc { ty, policy, slot, .. } => self.alloc(ty, *policy, *slot)?,
            InstrKind::FieldAddr { x, field } => {
                let base = self.value(x)?;
                Value::Pointer(Some(base.as_pointer()?.child(*field)))
            }
            InstrKind::Field { x, field } => match self.value(x)? {
                Value::Struct(mut fields) if *field < fields.len() => fields.swap_remove(*field),
                other => interp_bail!(format!("field {} of {:?}", field, other)),
            },
            InstrKind::IndexAddr { x, index } => self.index_addr(body, x, index)?,
            InstrKind::Index { x, index } => {
                let i = index_of(&self.value(index)?)?;
                match self.value(x)? {
                    Value::Array(mut items) => {
                        if i < 0 || i as usize >= items.len() {
                            return Err(index_out_of_range(i, items.len()));
                        }
                        items.swap_remove(i as usize)
                    }
                    Value::String(s) => match usize::try_from(i).ok().and_then(|i| s.get(i)) {
                        Some(b) => Value::Uint(*b as u64),
                        None => return Err(index_out_of_range(i, s.len())),
                    },
                    other => interp_bail!(format!("index of {:?}", other)),
                }
            }
            InstrKind::Lookup { x, index, comma_ok: ok } => self.lookup(body, instr, x, index, *ok)?,
            InstrKind::Store { addr, value } => {
                let value = self.value(value)?;
                self.value(addr)?.as_pointer()?.store(value)?;
                return Ok(Continuation::Next);
            }
            InstrKind::Slice { x, low, high, max } => self.slice(body, x, low, high, max)?,
            InstrKind::TypeAssert { x, asserted, comma_ok: ok } => {
                let from = self.operand_type(body, x);
                self.type_assert(self.value(x)?, &from, asserted, *ok)?
            }
            InstrKind::MakeInterface { x } => {
                let ty = self.operand_type(body, x);
                Value::boxed(ty, self.value(x)?)
            }
            InstrKind::ChangeInterface { x, nil_check } => {
                let value = self.value(x)?;
                if *nil_check && value.is_nil() {
                    return Err(nil_dereference());
                }
                value
            }
            InstrKind::ChangeType { x } => self.value(x)?,
            InstrKind::Convert { x } => {
                let from = self.operand_type(body, x);
                ops::convert(self.value(x)?, &from, &self.result_type(body, instr))?
            }
            InstrKind::MakeClosure { func, bindings } => {
                let env = bindings.iter().map(|b| self.value(b)).collect::<Flow<Vec<_>>>()?;
                Value::Func(Some(Closure {
                    func: func.clone(),
                    env: Arc::from(env),
                }))
            }
            InstrKind::MakeMap { reserve } => {
                let reserve = match reserve {
                    Some(n) => index_of(&self.value(n)?)?.max(0) as usize,
                    None => 0,
                };
                Value::Map(Some(Arc::new(Mutex::new(IndexMap::with_capacity(reserve.min(1 << 16))))))
            }
            InstrKind::MakeChan { size } => {
                let size = index_of(&self.value(size)?)?;
                if size < 0 {
                    return Err(runtime_error("makechan: size out of range"));
                }
                let elem = self.result_type(body, instr).elem().unwrap_or_else(Type::invalid);
                Value::Chan(Some(self.interp.scheduler().make_chan(elem, size as usize)))
            }
            InstrKind::MakeSlice { len, cap } => {
                let len = index_of(&self.value(len)?)?;
                let cap = index_of(&self.value(cap)?)?;
                if len < 0 {
                    return Err(runtime_error("makeslice: len out of range"));
                }
                if cap < len {
                    return Err(runtime_error("makeslice: cap out of range"));
                }
                let elem = self.result_type(body, instr).elem().unwrap_or_else(Type::invalid);
                let items = (0..cap).map(|_| zero(&elem)).collect();
                Value::Slice(Slice {
                    base: Some(Pointer::alloc(Value::Array(items))),
                    offset: 0,
                    len: len as usize,
                    cap: cap as usize,
                })
            }
            InstrKind::MapUpdate { map, key, value } => {
                let Value::Map(map) = self.value(map)? else {
                    interp_bail!("map update of a non-map");
                };
                let Some(map) = map else {
                    return Err(panic_with("assignment to entry in nil map"));
                };
                let key = Key::new(self.value(key)?)?;
                let value = self.value(value)?;
                map.lock().insert(key, value);
                return Ok(Continuation::Next);
            }
            InstrKind::Extract { tuple, index } => match self.value(tuple)? {
                Value::Tuple(mut items) if *index < items.len() => items.swap_remove(*index),
                other => interp_bail!(format!("extract #{} of {:?}", index, other)),
            },
            InstrKind::Phi { .. } => interp_bail!(format!(
                "phi after the head of block {} in {}",
                block.index,
                self.func.qualified_name()
            )),
            InstrKind::Call(call) => {
                let (callee, args) = self.resolve(call)?;
                self.call_callee(&callee, args)?
            }
            InstrKind::Go(call) => {
                let (callee, args) = self.resolve(call)?;
                self.interp.spawn(callee, args, &self.func)?;
                return Ok(Continuation::Next);
            }
            InstrKind::Defer(call) => {
                let (callee, args) = self.resolve(call)?;
                self.defers.borrow_mut().push(Deferred {
                    callee,
                    args,
                    span: call.span,
                });
                return Ok(Continuation::Next);
            }
            InstrKind::Range { x } => {
                let iter = match self.value(x)? {
                    Value::Map(map) => RangeIter::over_map(map),
                    Value::String(text) => RangeIter::String { text, pos: 0 },
                    other => interp_bail!(format!("range over {:?}", other)),
                };
                Value::Iter(Arc::new(Mutex::new(iter)))
            }
            InstrKind::Next { iter, .. } => {
                let Value::Iter(iter) = self.value(iter)? else {
                    interp_bail!("next on a non-iterator");
                };
                let next = iter.lock().next();
                match next {
                    Some((k, v)) => Value::Tuple(vec![Value::Bool(true), k, v]),
                    None => zero(&self.result_type(body, instr)),
                }
            }
            InstrKind::Select { states, blocking } => self.select(body, instr, states, *blocking)?,
            InstrKind::Send { chan, value } => {
                let chan = chan_of(self.value(chan)?)?;
                let value = self.value(value)?;
                self.interp.scheduler().send(chan.as_ref(), value)?;
                return Ok(Continuation::Next);
            }
            InstrKind::RunDefers => {
                self.run_defers()?;
                let panic = self.panic.borrow_mut().take();
                if let Some(value) = panic {
                    return Err(Unwind::Panic(value));
                }
                return Ok(Continuation::Next);
            }
            InstrKind::Trace {
                event,
                marker,
                breakpoint,
            } => {
                self.trace(instr, *event, *marker, *breakpoint);
                return Ok(Continuation::Next);
            }
            InstrKind::Jump => return self.successor(block, 0),
            InstrKind::If { cond } => {
                let taken = match self.value(cond)?.as_bool() {
                    Some(true) => 0,
                    Some(false) => 1,
                    None => interp_bail!("non-boolean condition"),
                };
                return self.successor(block, taken);
            }
            InstrKind::Return { results } => {
                let mut values = results.iter().map(|r| self.value(r)).collect::<Flow<Vec<_>>>()?;
                let value = match values.len() {
                    1 => values.remove(0),
                    _ => Value::Tuple(values),
                };
                return Ok(Continuation::Return(value));
            }
            InstrKind::Panic { x } => {
                let value = match self.value(x)? {
                    boxed @ Value::Interface(_) => boxed,
                    other => Value::boxed(self.operand_type(body, x), other),
                };
                return Err(Unwind::Panic(value));
            }
        };
        self.set(instr.result, value);
        Ok(Continuation::Next)
    }

    fn successor(&self, block: &BasicBlock, index: usize) -> Flow<Continuation> {
        match block.succs.get(index) {
            Some(target) => Ok(Continuation::Jump(*target)),
            None => interp_bail!(format!("block {} has no successor #{}", block.index, index)),
        }
    }

    fn unop(&self, body: &FunctionBody, op: UnOpKind, x: &Operand, ok: bool) -> Flow<Value> {
        let value = self.value(x)?;
        match op {
            UnOpKind::Deref => value.as_pointer()?.load(),
            UnOpKind::Recv => {
                let chan = chan_of(value)?;
                let (received, open) = self.interp.scheduler().recv(chan.as_ref())?;
                Ok(if ok { comma_ok(received, open) } else { received })
            }
            _ => ops::unop(op, &value, &self.operand_type(body, x)),
        }
    }

    fn alloc(&self, ty: &Type, policy: AllocPolicy, slot: Option<usize>) -> Flow<Value> {
        let (AllocPolicy::Stack, Some(slot)) = (policy, slot) else {
            return Ok(Value::Pointer(Some(Pointer::alloc(zero(ty)))));
        };
        let mut locals = self.locals.borrow_mut();
        let Some(entry) = locals.get_mut(slot) else {
            interp_bail!(format!("no local slot {} in {}", slot, self.func.qualified_name()));
        };
        let cell = match entry.as_ref() {
            Some(cell) => {
                cell.store(zero(ty))?;
                cell.clone()
            }
            None => {
                let cell = Pointer::alloc(zero(ty));
                *entry = Some(cell.clone());
                cell
            }
        };
        Ok(Value::Pointer(Some(cell)))
    }

    fn index_addr(&self, body: &FunctionBody, x: &Operand, index: &Operand) -> Flow<Value> {
        let i = index_of(&self.value(index)?)?;
        let elem = match self.value(x)? {
            Value::Slice(slice) => slice.elem(i)?,
            Value::Pointer(ptr) => {
                let len = self.operand_type(body, x).deref().array_len().unwrap_or(0) as usize;
                let Some(ptr) = ptr else {
                    return Err(nil_dereference());
                };
                if i < 0 || i as usize >= len {
                    return Err(index_out_of_range(i, len));
                }
                ptr.child(i as usize)
            }
            other => interp_bail!(format!("index address of {:?}", other)),
        };
        Ok(Value::Pointer(Some(elem)))
    }

    fn lookup(&self, body: &FunctionBody, instr: &Instruction, x: &Operand, index: &Operand, ok: bool) -> Flow<Value> {
        let key = self.value(index)?;
        match self.value(x)? {
            Value::String(s) => {
                let i = index_of(&key)?;
                match usize::try_from(i).ok().and_then(|i| s.get(i)) {
                    Some(b) => Ok(Value::Uint(*b as u64)),
                    None => Err(index_out_of_range(i, s.len())),
                }
            }
            Value::Map(map) => {
                let key = Key::new(key)?;
                let found = map.and_then(|m| m.lock().get(&key).cloned());
                let (value, present) = match found {
                    Some(value) => (value, true),
                    None => {
                        let elem = self
                            .operand_type(body, x)
                            .elem()
                            .unwrap_or_else(|| self.result_type(body, instr));
                        (zero(&elem), false)
                    }
                };
                Ok(if ok { comma_ok(value, present) } else { value })
            }
            other => interp_bail!(format!("lookup in {:?}", other)),
        }
    }

    fn bound(&self, operand: &Option<Operand>) -> Flow<Option<i64>> {
        match operand {
            Some(operand) => Ok(Some(index_of(&self.value(operand)?)?)),
            None => Ok(None),
        }
    }

    fn slice(
        &self,
        body: &FunctionBody,
        x: &Operand,
        low: &Option<Operand>,
        high: &Option<Operand>,
        max: &Option<Operand>,
    ) -> Flow<Value> {
        let (low, high, max) = (self.bound(low)?, self.bound(high)?, self.bound(max)?);
        let out_of_range = |l: i64, h: i64, m: i64| {
            Err(runtime_error(format!("slice bounds out of range [{}:{}:{}]", l, h, m)))
        };
        let (base, offset, len, cap) = match self.value(x)? {
            Value::String(s) => {
                let l = low.unwrap_or(0);
                let h = high.unwrap_or(s.len() as i64);
                if l < 0 || h < l || h as usize > s.len() {
                    return out_of_range(l, h, s.len() as i64);
                }
                return Ok(Value::String(s.slice(l as usize..h as usize)));
            }
            Value::Slice(slice) => (slice.base, slice.offset, slice.len, slice.cap),
            Value::Pointer(ptr) => {
                let Some(ptr) = ptr else {
                    return Err(nil_dereference());
                };
                let n = self.operand_type(body, x).deref().array_len().unwrap_or(0) as usize;
                (Some(ptr), 0, n, n)
            }
            other => interp_bail!(format!("slice of {:?}", other)),
        };
        let l = low.unwrap_or(0);
        let h = high.unwrap_or(len as i64);
        let m = max.unwrap_or(cap as i64);
        if l < 0 || h < l || m < h || m as usize > cap {
            return out_of_range(l, h, m);
        }
        Ok(Value::Slice(Slice {
            base,
            offset: offset + l as usize,
            len: (h - l) as usize,
            cap: (m - l) as usize,
        }))
    }

    fn type_assert(&self, value: Value, from: &Type, asserted: &Type, ok: bool) -> Flow<Value> {
        let boxed = match &value {
            Value::Interface(Some(boxed)) => Some(boxed.clone()),
            _ => None,
        };
        let matched = match &boxed {
            None => None,
            Some(boxed) if asserted.is_interface() => implements(&boxed.ty, asserted).then(|| value.clone()),
            Some(boxed) => (&boxed.ty == asserted).then(|| boxed.value.clone()),
        };
        if ok {
            return Ok(match matched {
                Some(v) => comma_ok(v, true),
                None => comma_ok(zero(asserted), false),
            });
        }
        if let Some(v) = matched {
            return Ok(v);
        }
        let message = match &boxed {
            None => format!("interface conversion: interface is nil, not {}", asserted),
            Some(boxed) if asserted.is_interface() => {
                let missing = asserted
                    .interface_methods()
                    .into_iter()
                    .find(|m| find_method(&boxed.ty, &m.name).is_none())
                    .map(|m| m.name)
                    .unwrap_or_default();
                format!(
                    "interface conversion: {} is not {}: missing method {}",
                    boxed.ty, asserted, missing
                )
            }
            Some(boxed) => format!("interface conversion: {} is {}, not {}", from, boxed.ty, asserted),
        };
        Err(panic_with(message))
    }

    fn select(
        &self,
        body: &FunctionBody,
        instr: &Instruction,
        states: &[gossa_core::ssa::SelectState],
        blocking: bool,
    ) -> Flow<Value> {
        let mut cases = Vec::with_capacity(states.len());
        for state in states {
            let send = match &state.send {
                Some(v) => Some(self.value(v)?),
                None => None,
            };
            cases.push(SelectCase {
                dir: state.dir,
                chan: chan_of(self.value(&state.chan)?)?,
                send,
            });
        }
        let (index, received) = self.interp.scheduler().select(&cases, blocking)?;

        let elems = match self.result_type(body, instr).kind() {
            TypeKind::Tuple(elems) => elems.clone(),
            _ => Vec::new(),
        };
        let mut out = vec![Value::Int(index), Value::Bool(false)];
        out.extend(elems.iter().skip(2).map(zero));
        if let Some((value, open)) = received {
            out[1] = Value::Bool(open);
            let slot = states
                .iter()
                .take(index.max(0) as usize)
                .filter(|s| s.dir == SelectDir::Recv)
                .count();
            if let Some(target) = out.get_mut(2 + slot) {
                *target = value;
            }
        }
        Ok(Value::Tuple(out))
    }

    fn trace(&self, instr: &Instruction, event: gossa_core::ssa::TraceEvent, marker: u32, breakpoint: bool) {
        if breakpoint {
            self.stop_at(Some(instr), 0);
            return;
        }
        let hooks = self.interp.hooks();
        if !hooks.tracing() {
            return;
        }
        let hit = {
            let mut breakpoints = hooks.breakpoints.lock();
            if breakpoints.is_empty() {
                None
            } else {
                breakpoints.hit(&BreakpointTarget::Marker {
                    function: self.func.qualified_name(),
                    marker,
                })
            }
        };
        if let Some(id) = hit {
            self.stop_at(Some(instr), id);
        }
        self.emit(Some(instr), Event::Trace(event));
    }

    /// Evaluates the callee and arguments of a call, `go` or `defer`.
    fn resolve(&self, call: &CallCommon) -> Flow<(Callee, Vec<Value>)> {
        let mut args = Vec::with_capacity(call.args.len() + 1);
        let callee = match (&call.method, &call.callee) {
            (Some(method), recv) => {
                let Value::Interface(Some(boxed)) = self.value(recv)? else {
                    return Err(nil_dereference());
                };
                let Some(func) = gossa_build::method_value(self.interp.program(), &boxed.ty, &method.name) else {
                    interp_bail!(format!("{} has no method {}", boxed.ty, method.name));
                };
                args.push(boxed.value.clone());
                Callee::Func(Closure::plain(func))
            }
            (None, Operand::Builtin(kind, sig)) => Callee::Builtin(*kind, sig.clone()),
            (None, Operand::Function(func)) => Callee::Func(Closure::plain(func.clone())),
            (None, other) => match self.value(other)? {
                Value::Func(Some(closure)) => Callee::Func(closure),
                Value::Func(None) => return Err(nil_dereference()),
                value => interp_bail!(format!("call of non-function {:?}", value)),
            },
        };
        for arg in &call.args {
            args.push(self.value(arg)?);
        }
        Ok((callee, args))
    }

    fn call_callee(&self, callee: &Callee, args: Vec<Value>) -> Flow<Value> {
        match callee {
            Callee::Func(closure) => call(self.interp, Some(self), closure, args, self.goroutine()),
            Callee::Builtin(kind, sig) => builtins::call(self, *kind, sig, args),
        }
    }

    /// Pops and runs deferred calls until none are left. A panic raised by
    /// one replaces the frame's current panic.
    pub(crate) fn run_defers(&self) -> Flow<()> {
        loop {
            let next = self.defers.borrow_mut().pop();
            let Some(deferred) = next else {
                return Ok(());
            };
            gossa_core::trace!("running deferred call from {}", deferred.span);
            match self.call_callee(&deferred.callee, deferred.args) {
                Ok(_) => {}
                Err(Unwind::Panic(value)) => {
                    self.status.set(Status::Panicking);
                    *self.panic.borrow_mut() = Some(value);
                }
                Err(other) => return Err(other),
            }
        }
    }
}

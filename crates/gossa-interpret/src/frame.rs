//! Activation records.
//!
//! A frame lives on the Rust stack of the goroutine running it and links to
//! its caller by reference, so the chain of frames is the goroutine's call
//! stack. Per-frame state is interior-mutable: observers and deferred calls
//! see the frame by shared reference while it runs.

use crate::hook::{Event, StepMode};
use crate::interpreter::Interpreter;
use crate::value::{Closure, Pointer, Value};
use gossa_core::builtin::BuiltinKind;
use gossa_core::span::Span;
use gossa_core::ssa::{BlockId, Function, Instruction};
use gossa_core::types::Type;
use std::cell::{Cell, RefCell};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Complete,
    Panicking,
}

/// What a call, `go` or `defer` resolved its callee to.
#[derive(Clone)]
pub enum Callee {
    Func(Closure),
    /// A builtin with the signature of the call site.
    Builtin(BuiltinKind, Type),
}

/// A deferred call with its arguments evaluated at the `defer`.
pub struct Deferred {
    pub callee: Callee,
    pub args: Vec<Value>,
    pub span: Span,
}

pub struct Frame<'a> {
    pub(crate) interp: &'a Arc<Interpreter>,
    caller: Option<&'a Frame<'a>>,
    pub(crate) func: Arc<Function>,
    pub(crate) env: Arc<[Value]>,
    pub(crate) regs: RefCell<Vec<Option<Value>>>,
    /// Cells of the stack allocations, by slot.
    pub(crate) locals: RefCell<Vec<Option<Pointer>>>,
    pub(crate) block: Cell<BlockId>,
    pub(crate) prev: Cell<Option<BlockId>>,
    pub(crate) pc: Cell<usize>,
    step: Cell<StepMode>,
    pub(crate) status: Cell<Status>,
    pub(crate) panic: RefCell<Option<Value>>,
    pub(crate) defers: RefCell<Vec<Deferred>>,
    depth: usize,
    goroutine: u64,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(
        interp: &'a Arc<Interpreter>,
        caller: Option<&'a Frame<'a>>,
        func: Arc<Function>,
        env: Arc<[Value]>,
        goroutine: u64,
    ) -> Self {
        let (depth, step) = match caller {
            Some(caller) => (caller.depth + 1, caller.step_mode().for_callee()),
            None if interp.options().trace => (0, StepMode::StepIn),
            None => (0, StepMode::None),
        };
        let (nregs, nlocals) = func
            .body()
            .map(|b| (b.regs.len(), b.locals.len()))
            .unwrap_or_default();
        Self {
            interp,
            caller,
            func,
            env,
            regs: RefCell::new(vec![None; nregs]),
            locals: RefCell::new(vec![None; nlocals]),
            block: Cell::new(0),
            prev: Cell::new(None),
            pc: Cell::new(0),
            step: Cell::new(step),
            status: Cell::new(Status::Running),
            panic: RefCell::new(None),
            defers: RefCell::new(Vec::new()),
            depth,
            goroutine,
        }
    }

    pub fn interpreter(&self) -> &Arc<Interpreter> {
        self.interp
    }

    pub fn function(&self) -> &Arc<Function> {
        &self.func
    }

    pub fn caller(&self) -> Option<&Frame<'a>> {
        self.caller
    }

    pub fn block(&self) -> BlockId {
        self.block.get()
    }

    pub fn previous_block(&self) -> Option<BlockId> {
        self.prev.get()
    }

    /// The instruction about to run or running.
    pub fn instruction(&self) -> Option<&Instruction> {
        self.func
            .body()?
            .blocks
            .get(self.block.get())?
            .instrs
            .get(self.pc.get())
    }

    /// Source position of the current instruction, or of the function.
    pub fn position(&self) -> Span {
        match self.instruction() {
            Some(instr) if !instr.span.is_none() => instr.span,
            _ => self.func.span,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn goroutine(&self) -> u64 {
        self.goroutine
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn is_panicking(&self) -> bool {
        self.panic.borrow().is_some()
    }

    pub fn step_mode(&self) -> StepMode {
        self.step.get()
    }

    pub fn set_step_mode(&self, mode: StepMode) {
        self.step.set(mode);
    }

    /// Current value of the source variable `name` visible at the current
    /// block, parameters included.
    pub fn local(&self, name: &str) -> Option<Value> {
        let body = self.func.body()?;
        let scope = body.blocks.get(self.block.get()).and_then(|b| b.scope);
        let package = self.func.pkg.as_deref().and_then(|p| self.interp.program().package(p));
        let var = match &package {
            Some(package) => self.func.lookup_var(package, scope, name)?,
            None => body.vars.iter().rev().find(|v| v.name == name)?,
        };
        self.load_var(var.addr)
    }

    /// Every source variable whose storage exists, in declaration order.
    pub fn locals(&self) -> Vec<(String, Value)> {
        let Some(body) = self.func.body() else {
            return Vec::new();
        };
        body.vars
            .iter()
            .filter_map(|var| self.load_var(var.addr).map(|v| (var.name.clone(), v)))
            .collect()
    }

    fn load_var(&self, addr: gossa_core::ssa::Reg) -> Option<Value> {
        let regs = self.regs.borrow();
        match regs.get(addr.index())? {
            Some(Value::Pointer(Some(ptr))) => ptr.load().ok(),
            _ => None,
        }
    }

    /// Delivers `event` if tracing is on and this frame is stepping, or
    /// unconditionally for breakpoints and program exit.
    pub(crate) fn emit(&self, instr: Option<&Instruction>, event: Event) {
        let hooks = self.interp.hooks();
        let always = matches!(event, Event::Breakpoint(_) | Event::ProgramExit(_));
        let stepping = hooks.tracing() && self.step_mode().reports();
        if !hooks.has_observers() || !(always || stepping) {
            return;
        }
        hooks.deliver(self, instr, &event);
    }

    /// Stops at breakpoint `id`: stepping is reset before observers run.
    pub(crate) fn stop_at(&self, instr: Option<&Instruction>, id: u32) {
        self.set_step_mode(StepMode::None);
        self.emit(instr, Event::Breakpoint(id));
    }
}

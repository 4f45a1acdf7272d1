//! The interpreter context and its entry points.
//!
//! An [`Interpreter`] is shared by every goroutine of a run through an
//! `Arc`. It owns the global cells, the scheduler, the native registry and
//! the instrumentation hooks.

mod builtins;
mod exec;

use crate::chan::{Scheduler, DEADLOCK_MESSAGE};
use crate::error::{Flow, Unwind};
use crate::frame::{Callee, Frame};
use crate::hook::{Breakpoint, BreakpointTarget, Event, Hooks, Observer};
use crate::natives::NativeRegistry;
use crate::options::InterpreterOptions;
use crate::value::{zero, Closure, Pointer, Value};
use gossa_core::error::Error;
use gossa_core::ssa::{Function, Global, Program};
use gossa_core::types::TypeKind;
use gossa_core::Result;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct Interpreter {
    program: Arc<Program>,
    options: InterpreterOptions,
    globals: Vec<Pointer>,
    scheduler: Scheduler,
    natives: NativeRegistry,
    hooks: Hooks,
    next_goroutine: AtomicU64,
}

impl Interpreter {
    /// Allocates every global of `program`, zeroed.
    pub fn new(program: Arc<Program>, options: InterpreterOptions) -> Arc<Interpreter> {
        let globals = program
            .globals_by_id()
            .iter()
            .map(|g| Pointer::alloc(zero(&g.elem_type())))
            .collect();
        let hooks = Hooks::default();
        hooks.set_tracing(options.trace);
        Arc::new(Interpreter {
            program,
            options,
            globals,
            scheduler: Scheduler::new(),
            natives: NativeRegistry::with_defaults(),
            hooks,
            next_goroutine: AtomicU64::new(1),
        })
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn register_native<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&Frame<'_>, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.natives.register(name, f);
    }

    pub fn set_hook(&self, observer: Option<Arc<dyn Observer>>) {
        self.hooks.set_hook(observer);
    }

    pub fn add_observer(&self, observer: Arc<dyn Observer>) {
        self.hooks.add_observer(observer);
    }

    /// Turns interpretation of trace markers on or off.
    pub fn set_tracing(&self, on: bool) {
        self.hooks.set_tracing(on);
    }

    /// Adds a breakpoint; trace markers are interpreted from now on.
    pub fn add_breakpoint(&self, target: BreakpointTarget) -> u32 {
        self.hooks.set_tracing(true);
        self.hooks.breakpoints.lock().add(target)
    }

    pub fn enable_breakpoint(&self, id: u32, enabled: bool) -> bool {
        self.hooks.breakpoints.lock().set_enabled(id, enabled)
    }

    pub fn delete_breakpoint(&self, id: u32) -> bool {
        self.hooks.breakpoints.lock().delete(id)
    }

    pub fn set_ignore_count(&self, id: u32, count: u32) -> bool {
        self.hooks.breakpoints.lock().set_ignore_count(id, count)
    }

    pub fn set_one_shot(&self, id: u32, one_shot: bool) -> bool {
        self.hooks.breakpoints.lock().set_one_shot(id, one_shot)
    }

    pub fn breakpoint(&self, id: u32) -> Option<Breakpoint> {
        self.hooks.breakpoints.lock().get(id)
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.hooks.breakpoints.lock().list()
    }

    /// Requests process exit with `code`; every goroutine stops at its next
    /// block boundary or blocking operation.
    pub fn exit(&self, code: i32) {
        gossa_core::debug!("exit requested with status {}", code);
        self.scheduler.abort(code);
    }

    pub(crate) fn global(&self, global: &Global) -> Flow<Pointer> {
        match self.globals.get(global.id) {
            Some(cell) => Ok(cell.clone()),
            None => Err(Error::internal(format!("no cell for global {}", global.qualified_name())).into()),
        }
    }

    fn write(&self, text: &str) {
        self.options.output.write(text);
    }

    /// Runs the initializer of package `path`, then its `main`, and returns
    /// the exit status: 0 on normal return, 2 on an unrecovered panic,
    /// deadlock or interpreter fault, or the code passed to `os.Exit`.
    pub fn run_main(self: &Arc<Self>, path: &str) -> Result<i32> {
        let package = self
            .program
            .package(path)
            .ok_or_else(|| Error::internal(format!("no package {}", path)))?;
        let main = package
            .func("main")
            .ok_or_else(|| Error::internal(format!("package {} has no main function", path)))?;
        let init = package.init.clone();
        gossa_core::debug!("running {}", main.qualified_name());

        let entry = main.clone();
        let outcome = self.on_thread("main", move |interp: &Arc<Interpreter>| {
            interp.call_root(&init, Vec::new(), 0)?;
            interp.call_root(&entry, Vec::new(), 0)
        })?;
        let code = match outcome {
            Ok(_) => self.scheduler.abort(0),
            Err(unwind) => self.goroutine_failed(unwind)?,
        };
        if self.hooks.has_observers() {
            let frame = Frame::new(self, None, main, Arc::from(Vec::new()), 0);
            frame.emit(None, Event::ProgramExit(code));
        }
        Ok(code)
    }

    /// Calls `func` with `args` on a fresh goroutine and waits for it. No
    /// package initializer runs and the run is not ended by the return.
    pub fn call_function(self: &Arc<Self>, func: &Arc<Function>, args: Vec<Value>) -> Result<Flow<Value>> {
        let func = func.clone();
        let id = self.next_goroutine.fetch_add(1, Ordering::Relaxed);
        self.on_thread("call", move |interp: &Arc<Interpreter>| interp.call_root(&func, args, id))
    }

    fn on_thread<T, F>(self: &Arc<Self>, name: &str, f: F) -> Result<Flow<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<Interpreter>) -> Flow<T> + Send + 'static,
    {
        let this = self.clone();
        let catch = self.options.catch_internal_faults;
        let handle = std::thread::Builder::new()
            .name(format!("gossa-{}", name))
            .stack_size(self.options.stack_size)
            .spawn(move || match panic::catch_unwind(AssertUnwindSafe(|| f(&this))) {
                Ok(flow) => flow,
                Err(payload) if catch => Err(fault_from_panic(payload)),
                Err(payload) => panic::resume_unwind(payload),
            })?;
        match handle.join() {
            Ok(flow) => Ok(flow),
            Err(payload) if !catch => panic::resume_unwind(payload),
            Err(payload) => Ok(Err(fault_from_panic(payload))),
        }
    }

    fn call_root(self: &Arc<Self>, func: &Arc<Function>, args: Vec<Value>, goroutine: u64) -> Flow<Value> {
        let closure = Closure::plain(func.clone());
        exec::call(self, None, &closure, args, goroutine)
    }

    /// Reports how a goroutine ended abnormally and aborts the run; returns
    /// the exit status.
    fn goroutine_failed(self: &Arc<Self>, unwind: Unwind) -> Result<i32> {
        match unwind {
            Unwind::Exit(code) => {
                if self.scheduler.deadlocked() {
                    self.write(&format!("{}\n", DEADLOCK_MESSAGE));
                }
                Ok(code)
            }
            Unwind::Panic(value) => {
                let message = self.panic_message(&value);
                gossa_core::error!("panic: {}", message);
                self.write(&format!("panic: {}\n", message));
                Ok(self.scheduler.abort(2))
            }
            Unwind::Fault(err) => {
                if !self.options.catch_internal_faults {
                    return Err(err);
                }
                gossa_core::error!("interpreter fault: {}", err);
                self.write(&format!("fatal error: {}\n", err));
                Ok(self.scheduler.abort(2))
            }
        }
    }

    /// The text a panic is reported with: the `Error` or `String` method of
    /// the dynamic type when it has one.
    pub fn panic_message(self: &Arc<Self>, value: &Value) -> String {
        let Value::Interface(Some(boxed)) = value else {
            return value.to_string();
        };
        for method in ["Error", "String"] {
            let Some(func) = gossa_build::method_value(&self.program, &boxed.ty, method) else {
                continue;
            };
            let returns_string = func
                .sig
                .signature()
                .is_some_and(|s| s.params.is_empty() && s.results.len() == 1 && s.results[0].is_string());
            if !returns_string {
                continue;
            }
            if let Ok(Value::String(s)) = self.call_root(&func, vec![boxed.value.clone()], 0) {
                return String::from_utf8_lossy(&s).into_owned();
            }
        }
        match boxed.ty.underlying().kind() {
            TypeKind::Basic(_) if boxed.ty.named_type().is_none() => boxed.value.to_string(),
            _ => format!("{}({})", boxed.ty, boxed.value),
        }
    }

    /// Starts a goroutine running `callee(args)`.
    pub(crate) fn spawn(self: &Arc<Self>, callee: Callee, args: Vec<Value>, from: &Arc<Function>) -> Flow<()> {
        let id = self.next_goroutine.fetch_add(1, Ordering::Relaxed);
        self.scheduler.spawned();
        let this = self.clone();
        let from = from.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("goroutine-{}", id))
            .stack_size(self.options.stack_size)
            .spawn(move || {
                let _exited = Exited(&this.scheduler);
                gossa_core::debug!("goroutine {} started", id);
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    exec::run_goroutine(&this, &callee, args, id, &from)
                }))
                .unwrap_or_else(|payload| Err(fault_from_panic(payload)));
                let failure = match result {
                    Ok(_) | Err(Unwind::Exit(_)) => None,
                    Err(unwind) => Some(unwind),
                };
                if let Some(unwind) = failure {
                    if let Err(err) = this.goroutine_failed(unwind) {
                        gossa_core::error!("goroutine {}: {}", id, err);
                        this.write(&format!("fatal error: {}\n", err));
                        this.scheduler.abort(2);
                    }
                }
                gossa_core::debug!("goroutine {} exited", id);
            });
        if let Err(err) = spawned {
            self.scheduler.exited();
            return Err(Error::from(err).into());
        }
        Ok(())
    }
}

/// Counts a goroutine out of the scheduler when its thread ends, unwinding
/// included.
struct Exited<'a>(&'a Scheduler);

impl Drop for Exited<'_> {
    fn drop(&mut self) {
        self.0.exited();
    }
}

/// A host panic on an interpreter thread, as an interpreter fault.
fn fault_from_panic(payload: Box<dyn Any + Send>) -> Unwind {
    let message = match payload.downcast::<String>() {
        Ok(text) => *text,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(text) => text.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    };
    Unwind::Fault(Error::internal(format!("host panic: {}", message)))
}

//! Instrumentation: observers, stepping and breakpoints.
//!
//! Events are delivered to the primary hook first, then to the observer
//! chain in registration order. Apart from breakpoints and the final
//! [`Event::ProgramExit`], a frame only reports events while its
//! [`StepMode`] is `StepIn` or `StepOver`.

use crate::frame::Frame;
use gossa_core::ssa::{Instruction, TraceEvent};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    #[default]
    None,
    StepIn,
    StepOver,
    StepOut,
}

impl StepMode {
    pub fn reports(self) -> bool {
        matches!(self, StepMode::StepIn | StepMode::StepOver)
    }

    /// Only stepping in survives into a callee.
    pub fn for_callee(self) -> StepMode {
        match self {
            StepMode::StepIn => StepMode::StepIn,
            _ => StepMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Trace(TraceEvent),
    CallEnter,
    CallReturn,
    BlockEnd,
    Panic,
    /// A breakpoint hit; `0` for `runtime.Breakpoint()`.
    Breakpoint(u32),
    ProgramExit(i32),
}

pub trait Observer: Send + Sync {
    fn on_event(&self, frame: &Frame<'_>, instr: Option<&Instruction>, event: &Event);
}

impl<F> Observer for F
where
    F: Fn(&Frame<'_>, Option<&Instruction>, &Event) + Send + Sync,
{
    fn on_event(&self, frame: &Frame<'_>, instr: Option<&Instruction>, event: &Event) {
        self(frame, instr, event)
    }
}

/// Wraps a closure as a shareable observer.
pub fn observer<F>(f: F) -> Arc<dyn Observer>
where
    F: Fn(&Frame<'_>, Option<&Instruction>, &Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointTarget {
    /// Every call of the function with this qualified name.
    Function(String),
    /// A trace marker within a function.
    Marker { function: String, marker: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub target: BreakpointTarget,
    pub enabled: bool,
    /// Hits still to be skipped before the breakpoint stops.
    pub ignore_count: u32,
    pub one_shot: bool,
    pub hits: u32,
}

#[derive(Debug, Default)]
pub struct Breakpoints {
    next_id: u32,
    list: Vec<Breakpoint>,
}

impl Breakpoints {
    pub fn add(&mut self, target: BreakpointTarget) -> u32 {
        self.next_id += 1;
        self.list.push(Breakpoint {
            id: self.next_id,
            target,
            enabled: true,
            ignore_count: 0,
            one_shot: false,
            hits: 0,
        });
        self.next_id
    }

    fn find(&mut self, id: u32) -> Option<&mut Breakpoint> {
        self.list.iter_mut().find(|b| b.id == id)
    }

    pub fn set_enabled(&mut self, id: u32, enabled: bool) -> bool {
        self.find(id).map(|b| b.enabled = enabled).is_some()
    }

    pub fn set_ignore_count(&mut self, id: u32, count: u32) -> bool {
        self.find(id).map(|b| b.ignore_count = count).is_some()
    }

    pub fn set_one_shot(&mut self, id: u32, one_shot: bool) -> bool {
        self.find(id).map(|b| b.one_shot = one_shot).is_some()
    }

    pub fn delete(&mut self, id: u32) -> bool {
        let before = self.list.len();
        self.list.retain(|b| b.id != id);
        self.list.len() != before
    }

    pub fn get(&self, id: u32) -> Option<Breakpoint> {
        self.list.iter().find(|b| b.id == id).cloned()
    }

    pub fn list(&self) -> Vec<Breakpoint> {
        self.list.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Counts a hit on every enabled breakpoint matching `target`; returns
    /// the first one that stops.
    pub fn hit(&mut self, target: &BreakpointTarget) -> Option<u32> {
        let mut stop = None;
        for bp in self.list.iter_mut().filter(|b| b.enabled && &b.target == target) {
            bp.hits += 1;
            if bp.ignore_count > 0 {
                bp.ignore_count -= 1;
                continue;
            }
            if stop.is_none() {
                stop = Some(bp.id);
            }
        }
        if let Some(id) = stop {
            self.list.retain(|b| !(b.id == id && b.one_shot));
        }
        stop
    }
}

/// Everything observers and breakpoints need at run time.
#[derive(Default)]
pub struct Hooks {
    primary: RwLock<Option<Arc<dyn Observer>>>,
    chain: RwLock<Vec<Arc<dyn Observer>>>,
    pub(crate) breakpoints: Mutex<Breakpoints>,
    tracing: AtomicBool,
}

impl Hooks {
    pub fn set_hook(&self, observer: Option<Arc<dyn Observer>>) {
        *self.primary.write() = observer;
    }

    pub fn add_observer(&self, observer: Arc<dyn Observer>) {
        self.chain.write().push(observer);
    }

    pub fn has_observers(&self) -> bool {
        self.primary.read().is_some() || !self.chain.read().is_empty()
    }

    pub fn set_tracing(&self, on: bool) {
        self.tracing.store(on, Ordering::Release);
    }

    /// Whether trace markers are interpreted at all.
    pub fn tracing(&self) -> bool {
        self.tracing.load(Ordering::Acquire)
    }

    pub fn deliver(&self, frame: &Frame<'_>, instr: Option<&Instruction>, event: &Event) {
        // Clone out of the locks so observers may register observers.
        let primary = self.primary.read().clone();
        let chain = self.chain.read().clone();
        for observer in primary.iter().chain(chain.iter()) {
            observer.on_event(frame, instr, event);
        }
    }
}

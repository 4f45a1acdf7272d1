use gossa_core::config;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Where `print` and `println` and the final panic report go.
#[derive(Clone, Default)]
pub enum Output {
    #[default]
    Stderr,
    Buffer(Arc<Mutex<String>>),
}

impl Output {
    /// A fresh in-memory sink and a handle to read it back.
    pub fn capture() -> (Output, Arc<Mutex<String>>) {
        let buffer = Arc::new(Mutex::new(String::new()));
        (Output::Buffer(buffer.clone()), buffer)
    }

    pub fn write(&self, text: &str) {
        match self {
            Output::Stderr => eprint!("{}", text),
            Output::Buffer(buffer) => buffer.lock().push_str(text),
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stderr => f.write_str("Stderr"),
            Output::Buffer(_) => f.write_str("Buffer"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    /// Turn interpreter faults into exit status 2 instead of panicking the host.
    pub catch_internal_faults: bool,
    /// Start with every frame stepping in, so observers see every event.
    pub trace: bool,
    pub output: Output,
    /// Stack size of the threads that run goroutines.
    pub stack_size: usize,
    /// Call depth at which a goroutine fails with a stack overflow.
    pub max_depth: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            catch_internal_faults: !config::no_catch_faults(),
            trace: config::trace_statements(),
            output: Output::Stderr,
            stack_size: 64 << 20,
            max_depth: 4096,
        }
    }
}

impl InterpreterOptions {
    pub fn catch_internal_faults(mut self, catch: bool) -> Self {
        self.catch_internal_faults = catch;
        self
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

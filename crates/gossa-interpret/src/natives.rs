//! Host implementations of bodiless functions, keyed by qualified name.

use crate::frame::Frame;
use crate::value::Value;
use gossa_core::error::Error;
use gossa_core::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type NativeFn = Arc<dyn Fn(&Frame<'_>, Vec<Value>) -> Result<Value> + Send + Sync>;

pub struct NativeRegistry {
    natives: RwLock<HashMap<String, NativeFn>>,
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn int_arg(args: &[Value], index: usize, name: &str) -> Result<i64> {
    args.get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::internal(format!("{}: argument {} is not an integer", name, index)))
}

impl NativeRegistry {
    pub fn empty() -> Self {
        Self {
            natives: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register("os.Exit", |frame: &Frame<'_>, args: Vec<Value>| {
            let code = int_arg(&args, 0, "os.Exit")?;
            frame.interpreter().exit(code as i32);
            Ok(Value::unit())
        });
        registry.register("runtime.Gosched", |_: &Frame<'_>, _: Vec<Value>| {
            std::thread::yield_now();
            Ok(Value::unit())
        });
        registry.register("runtime.NumGoroutine", |frame: &Frame<'_>, _: Vec<Value>| {
            Ok(Value::Int(frame.interpreter().scheduler().live() as i64))
        });
        registry.register("time.Sleep", |_: &Frame<'_>, args: Vec<Value>| {
            let nanos = int_arg(&args, 0, "time.Sleep")?;
            if nanos > 0 {
                std::thread::sleep(Duration::from_nanos(nanos as u64));
            }
            Ok(Value::unit())
        });
        registry.register("strconv.Itoa", |_: &Frame<'_>, args: Vec<Value>| {
            let n = int_arg(&args, 0, "strconv.Itoa")?;
            Ok(Value::string(n.to_string()))
        });
        registry
    }

    pub fn register<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&Frame<'_>, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.natives.write().insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.natives.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.natives.read().contains_key(name)
    }
}

//! Predeclared functions called through builtin values.
//!
//! `make`, `new` and constant `len`/`cap` never get here: they lower to
//! instructions.

use crate::error::{nil_dereference, panic_with, Flow, Unwind};
use crate::frame::Frame;
use crate::interp_bail;
use crate::value::{zero, Key, Pointer, Slice, Value};
use gossa_core::builtin::BuiltinKind;
use gossa_core::types::Type;
use itertools::Itertools;

pub(super) fn call(frame: &Frame<'_>, kind: BuiltinKind, sig: &Type, args: Vec<Value>) -> Flow<Value> {
    match kind {
        BuiltinKind::Append => append(sig, args),
        BuiltinKind::Len | BuiltinKind::Cap => {
            let Some(arg) = args.first() else {
                interp_bail!(format!("{} without an argument", kind));
            };
            let n = match (kind, arg) {
                (BuiltinKind::Cap, Value::Slice(s)) => Some(s.cap),
                (BuiltinKind::Cap, Value::Chan(Some(ch))) => Some(ch.cap),
                (BuiltinKind::Cap, Value::Chan(None)) => Some(0),
                (_, Value::Pointer(Some(p))) => p.load()?.len(),
                _ => arg.len(),
            };
            match n {
                Some(n) => Ok(Value::Int(n as i64)),
                None => interp_bail!(format!("{} of {:?}", kind, arg)),
            }
        }
        BuiltinKind::Close => {
            let Some(Value::Chan(chan)) = args.first() else {
                interp_bail!("close of a non-channel");
            };
            frame.interpreter().scheduler().close(chan.as_ref())?;
            Ok(Value::unit())
        }
        BuiltinKind::Copy => copy(args),
        BuiltinKind::Delete => {
            let mut args = args.into_iter();
            let (Some(Value::Map(map)), Some(key)) = (args.next(), args.next()) else {
                interp_bail!("delete needs a map and a key");
            };
            if let Some(map) = map {
                let key = Key::new(key)?;
                map.lock().shift_remove(&key);
            }
            Ok(Value::unit())
        }
        BuiltinKind::Print | BuiltinKind::Println => {
            let mut text = if kind == BuiltinKind::Println {
                args.iter().join(" ")
            } else {
                args.iter().join("")
            };
            if kind == BuiltinKind::Println {
                text.push('\n');
            }
            frame.interpreter().options().output.write(&text);
            Ok(Value::unit())
        }
        BuiltinKind::Recover => Ok(recover(frame)),
        BuiltinKind::Panic => match args.into_iter().next() {
            Some(value) => Err(Unwind::Panic(value)),
            None => interp_bail!("panic without an argument"),
        },
        BuiltinKind::WrapNilCheck => {
            let mut args = args.into_iter();
            let (Some(ptr), Some(Value::String(ty)), Some(Value::String(method))) =
                (args.next(), args.next(), args.next())
            else {
                interp_bail!("malformed nil check");
            };
            if ptr.is_nil() {
                let (ty, method) = (String::from_utf8_lossy(&ty), String::from_utf8_lossy(&method));
                let short = ty.rsplit('.').next().unwrap_or_default();
                return Err(panic_with(format!(
                    "value method {}.{} called using nil *{} pointer",
                    ty, method, short
                )));
            }
            Ok(ptr)
        }
        BuiltinKind::Make | BuiltinKind::New => {
            interp_bail!(format!("{} reached the interpreter as a call", kind))
        }
    }
}

/// Takes the panic of the frame that is running `frame` as a deferred call.
fn recover(frame: &Frame<'_>) -> Value {
    if frame.is_panicking() {
        return Value::Interface(None);
    }
    let Some(caller) = frame.caller() else {
        return Value::Interface(None);
    };
    let taken = caller.panic.borrow_mut().take();
    match taken {
        Some(value) => {
            gossa_core::debug!("recovered in {}", frame.function().qualified_name());
            value
        }
        None => Value::Interface(None),
    }
}

fn append(sig: &Type, args: Vec<Value>) -> Flow<Value> {
    let variadic = sig.signature().is_some_and(|s| s.variadic);
    let mut args = args.into_iter();
    let base = match args.next() {
        Some(Value::Slice(s)) => s,
        other => interp_bail!(format!("append to {:?}", other)),
    };
    let extra: Vec<Value> = if variadic {
        match args.next() {
            Some(Value::Slice(s)) => s.to_vec()?,
            Some(Value::String(s)) => s.iter().map(|b| Value::Uint(*b as u64)).collect(),
            None => Vec::new(),
            Some(other) => interp_bail!(format!("append of {:?}", other)),
        }
    } else {
        args.collect()
    };
    if extra.is_empty() {
        return Ok(Value::Slice(base));
    }

    let len = base.len + extra.len();
    if len <= base.cap {
        if let Some(ptr) = &base.base {
            let start = base.offset + base.len;
            ptr.with_mut(|array| {
                if let Value::Array(items) = array {
                    for (slot, value) in items.iter_mut().skip(start).zip(extra) {
                        *slot = value;
                    }
                }
            })?;
            return Ok(Value::Slice(Slice { len, ..base }));
        }
    }

    let elem = sig
        .signature()
        .and_then(|s| s.result_type().elem())
        .unwrap_or_else(Type::invalid);
    let cap = len.max(base.cap * 2);
    let mut items = base.to_vec()?;
    items.extend(extra);
    items.resize_with(cap, || zero(&elem));
    Ok(Value::Slice(Slice {
        base: Some(Pointer::alloc(Value::Array(items))),
        offset: 0,
        len,
        cap,
    }))
}

/// `copy(dst, src)`; `src` may be a string. Overlapping ranges copy as if
/// through a temporary.
fn copy(args: Vec<Value>) -> Flow<Value> {
    let mut args = args.into_iter();
    let (Some(Value::Slice(dst)), Some(src)) = (args.next(), args.next()) else {
        interp_bail!("copy needs a destination slice");
    };
    let values: Vec<Value> = match src {
        Value::Slice(src) => src.to_vec()?,
        Value::String(s) => s.iter().map(|b| Value::Uint(*b as u64)).collect(),
        other => interp_bail!(format!("copy from {:?}", other)),
    };
    let n = values.len().min(dst.len);
    if n == 0 {
        return Ok(Value::Int(0));
    }
    let Some(ptr) = &dst.base else {
        return Err(nil_dereference());
    };
    ptr.with_mut(|array| {
        if let Value::Array(items) = array {
            for (slot, value) in items.iter_mut().skip(dst.offset).zip(values).take(n) {
                *slot = value;
            }
        }
    })?;
    Ok(Value::Int(n as i64))
}

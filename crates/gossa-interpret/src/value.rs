//! Runtime values.
//!
//! Aggregates (arrays, structs) are held by value and copied on assignment.
//! Everything with reference semantics shares an `Arc`: variables live in
//! [`Cell`]s, and a [`Pointer`] is a cell plus a path of element indices into
//! the aggregate stored there, so `&a[i].f` and slices of an array alias the
//! same storage. Strings are immutable byte strings; only `range` and
//! conversions to runes decode them as UTF-8.

use crate::chan::Channel;
use crate::error::{nil_dereference, runtime_error, Flow};
use bytes::Bytes;
use gossa_core::constant::ConstValue;
use gossa_core::ssa::{Constant, Function};
use gossa_core::types::{BasicKind, Type, TypeKind};
use indexmap::IndexMap;
use itertools::Itertools;
use parking_lot::Mutex;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub type Cell = Arc<Mutex<Value>>;
pub type MapRef = Arc<Mutex<IndexMap<Key, Value>>>;

#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(Bytes),
    Pointer(Option<Pointer>),
    Slice(Slice),
    Array(Vec<Value>),
    Struct(Vec<Value>),
    Map(Option<MapRef>),
    Chan(Option<Arc<Channel>>),
    Func(Option<Closure>),
    Interface(Option<Arc<Boxed>>),
    Tuple(Vec<Value>),
    Iter(Arc<Mutex<RangeIter>>),
    /// Values of the invalid type, such as the unused halves of `Next`.
    Invalid,
}

/// An interface's dynamic type and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Boxed {
    pub ty: Type,
    pub value: Value,
}

#[derive(Clone)]
pub struct Closure {
    pub func: Arc<Function>,
    pub env: Arc<[Value]>,
}

impl Closure {
    pub fn plain(func: Arc<Function>) -> Self {
        Self {
            func,
            env: Arc::from(Vec::new()),
        }
    }
}

#[derive(Clone)]
pub struct Pointer {
    pub cell: Cell,
    pub path: Vec<usize>,
}

fn walk<'v>(mut value: &'v mut Value, path: &[usize]) -> Option<&'v mut Value> {
    for index in path {
        value = match value {
            Value::Array(items) | Value::Struct(items) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(value)
}

impl Pointer {
    /// A fresh variable holding `value`.
    pub fn alloc(value: Value) -> Pointer {
        Pointer {
            cell: Arc::new(Mutex::new(value)),
            path: Vec::new(),
        }
    }

    pub fn child(&self, index: usize) -> Pointer {
        let mut path = self.path.clone();
        path.push(index);
        Pointer {
            cell: self.cell.clone(),
            path,
        }
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Value) -> R) -> Flow<R> {
        let mut guard = self.cell.lock();
        match walk(&mut guard, &self.path) {
            Some(target) => Ok(f(target)),
            None => Err(runtime_error("index out of range")),
        }
    }

    pub fn load(&self) -> Flow<Value> {
        self.with_mut(|v| v.clone())
    }

    pub fn store(&self, value: Value) -> Flow<()> {
        self.with_mut(|v| *v = value)
    }

    pub fn same(&self, other: &Pointer) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell) && self.path == other.path
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.cell) as usize + self.path.iter().fold(0, |acc, i| acc * 31 + i + 1)
    }
}

/// A window onto an array: `base` points at a `Value::Array`.
#[derive(Clone)]
pub struct Slice {
    pub base: Option<Pointer>,
    pub offset: usize,
    pub len: usize,
    pub cap: usize,
}

impl Slice {
    pub fn nil() -> Slice {
        Slice {
            base: None,
            offset: 0,
            len: 0,
            cap: 0,
        }
    }

    pub fn from_values(values: Vec<Value>) -> Slice {
        let len = values.len();
        Slice {
            base: Some(Pointer::alloc(Value::Array(values))),
            offset: 0,
            len,
            cap: len,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.base.is_none()
    }

    pub fn elem(&self, index: i64) -> Flow<Pointer> {
        match &self.base {
            Some(base) if index >= 0 && (index as usize) < self.len => Ok(base.child(self.offset + index as usize)),
            _ => Err(runtime_error(format!(
                "index out of range [{}] with length {}",
                index, self.len
            ))),
        }
    }

    pub fn to_vec(&self) -> Flow<Vec<Value>> {
        let Some(base) = &self.base else {
            return Ok(Vec::new());
        };
        let (offset, len) = (self.offset, self.len);
        base.with_mut(|array| match array {
            Value::Array(items) => items.iter().skip(offset).take(len).cloned().collect(),
            _ => Vec::new(),
        })
    }
}

pub enum RangeIter {
    /// Keys are taken when the loop starts; entries deleted since are
    /// skipped and updated ones yield their current value.
    Map {
        map: Option<MapRef>,
        keys: Vec<Key>,
        pos: usize,
    },
    String {
        text: Bytes,
        pos: usize,
    },
}

impl RangeIter {
    pub fn over_map(map: Option<MapRef>) -> Self {
        let keys = map
            .as_ref()
            .map(|m| m.lock().keys().cloned().collect())
            .unwrap_or_default();
        RangeIter::Map { map, keys, pos: 0 }
    }

    /// The next key and value, or `None` when exhausted.
    pub fn next(&mut self) -> Option<(Value, Value)> {
        match self {
            RangeIter::Map { map, keys, pos } => {
                let map = map.as_ref()?.lock();
                while let Some(key) = keys.get(*pos) {
                    *pos += 1;
                    if let Some(value) = map.get(key) {
                        return Some((key.0.clone(), value.clone()));
                    }
                }
                None
            }
            RangeIter::String { text, pos } => {
                let rest = text.get(*pos..).filter(|r| !r.is_empty())?;
                let (rune, width) = decode_rune(rest);
                let at = *pos;
                *pos += width;
                Some((Value::Int(at as i64), Value::Int(rune as i64)))
            }
        }
    }
}

/// Decodes the first rune of `bytes`: an invalid or truncated encoding
/// yields U+FFFD with width one. `bytes` must not be empty.
pub fn decode_rune(bytes: &[u8]) -> (char, usize) {
    let head = &bytes[..bytes.len().min(4)];
    let valid = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(err) => std::str::from_utf8(&head[..err.valid_up_to()]).unwrap_or_default(),
    };
    match valid.chars().next() {
        Some(ch) => (ch, ch.len_utf8()),
        None => (char::REPLACEMENT_CHARACTER, 1),
    }
}

/// A comparable value used as a map key.
#[derive(Clone)]
pub struct Key(pub Value);

impl Key {
    pub fn new(value: Value) -> Flow<Key> {
        if !hashable(&value) {
            return Err(runtime_error("hash of unhashable type"));
        }
        Ok(Key(value))
    }
}

fn hashable(value: &Value) -> bool {
    match value {
        Value::Slice(_) | Value::Map(_) | Value::Func(_) | Value::Tuple(_) | Value::Iter(_) => false,
        Value::Array(items) | Value::Struct(items) => items.iter().all(hashable),
        Value::Interface(Some(boxed)) => hashable(&boxed.value),
        _ => true,
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state)
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Bool(b) => b.hash(state),
        Value::Int(v) => v.hash(state),
        Value::Uint(v) => v.hash(state),
        Value::Float(f) => {
            let f = if *f == 0.0 { 0.0 } else { *f };
            f.to_bits().hash(state)
        }
        Value::String(s) => s.hash(state),
        Value::Pointer(Some(p)) => p.address().hash(state),
        Value::Chan(Some(ch)) => (Arc::as_ptr(ch) as usize).hash(state),
        Value::Interface(Some(boxed)) => {
            boxed.ty.hash(state);
            hash_value(&boxed.value, state);
        }
        Value::Array(items) | Value::Struct(items) => {
            for item in items {
                hash_value(item, state);
            }
        }
        _ => {}
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => match (a, b) {
                (Some(a), Some(b)) => a.same(b),
                (None, None) => true,
                _ => false,
            },
            (Value::Chan(a), Value::Chan(b)) => match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            },
            (Value::Interface(a), Value::Interface(b)) => match (a, b) {
                (Some(a), Some(b)) => a.ty == b.ty && a.value == b.value,
                (None, None) => true,
                _ => false,
            },
            (Value::Array(a), Value::Array(b))
            | (Value::Struct(a), Value::Struct(b))
            | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Slice(a), Value::Slice(b)) => a.is_nil() && b.is_nil(),
            (Value::Map(a), Value::Map(b)) => match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            },
            (Value::Func(a), Value::Func(b)) => a.is_none() && b.is_none(),
            (Value::Invalid, Value::Invalid) => true,
            _ => false,
        }
    }
}

impl Value {
    pub fn string(s: impl AsRef<[u8]>) -> Value {
        Value::String(Bytes::copy_from_slice(s.as_ref()))
    }

    /// A string taking ownership of `bytes` as is.
    pub fn from_bytes(bytes: Vec<u8>) -> Value {
        Value::String(Bytes::from(bytes))
    }

    pub fn unit() -> Value {
        Value::Tuple(Vec::new())
    }

    pub fn boxed(ty: Type, value: Value) -> Value {
        Value::Interface(Some(Arc::new(Boxed { ty, value })))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value, reinterpreting unsigned values as signed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The string's text with invalid sequences replaced, for host-facing
    /// output.
    pub fn to_text(&self) -> Option<String> {
        self.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn as_pointer(&self) -> Flow<&Pointer> {
        match self {
            Value::Pointer(Some(p)) => Ok(p),
            _ => Err(nil_dereference()),
        }
    }

    pub fn tuple_elem(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Tuple(items) => items.get(index),
            _ => None,
        }
    }

    /// Number of elements as reported by `len`.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::Slice(s) => Some(s.len),
            Value::Array(items) => Some(items.len()),
            Value::Map(Some(m)) => Some(m.lock().len()),
            Value::Map(None) | Value::Chan(None) => Some(0),
            Value::Chan(Some(ch)) => Some(ch.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn is_nil(&self) -> bool {
        match self {
            Value::Pointer(p) => p.is_none(),
            Value::Slice(s) => s.is_nil(),
            Value::Map(m) => m.is_none(),
            Value::Chan(c) => c.is_none(),
            Value::Func(f) => f.is_none(),
            Value::Interface(i) => i.is_none(),
            _ => false,
        }
    }
}

/// The zero value of `ty`.
pub fn zero(ty: &Type) -> Value {
    match ty.kind() {
        TypeKind::Basic(kind) => zero_basic(*kind),
        TypeKind::Pointer(_) => Value::Pointer(None),
        TypeKind::Slice(_) => Value::Slice(Slice::nil()),
        TypeKind::Array(elem, len) => Value::Array((0..*len).map(|_| zero(elem)).collect()),
        TypeKind::Map(..) => Value::Map(None),
        TypeKind::Chan(..) => Value::Chan(None),
        TypeKind::Struct(fields) => Value::Struct(fields.iter().map(|f| zero(&f.ty)).collect()),
        TypeKind::Tuple(elems) => Value::Tuple(elems.iter().map(zero).collect()),
        TypeKind::Signature(_) => Value::Func(None),
        TypeKind::Interface(_) => Value::Interface(None),
        TypeKind::Named(named) => zero(&named.underlying()),
    }
}

fn zero_basic(kind: BasicKind) -> Value {
    match kind {
        k if k.is_boolean() => Value::Bool(false),
        k if k.is_unsigned() => Value::Uint(0),
        k if k.is_integer() => Value::Int(0),
        k if k.is_float() => Value::Float(0.0),
        k if k.is_string() => Value::string(""),
        BasicKind::UnsafePointer | BasicKind::UntypedNil => Value::Pointer(None),
        _ => Value::Invalid,
    }
}

/// The runtime value of a constant operand.
pub fn from_constant(c: &Constant) -> Value {
    let kind = match c.ty.basic_kind() {
        Some(kind) => kind,
        None => return zero(&c.ty),
    };
    match &c.value {
        ConstValue::Bool(b) => Value::Bool(*b),
        ConstValue::String(s) => Value::string(s.as_str()),
        ConstValue::Int(v) if kind.is_float() => Value::Float(*v as f64),
        ConstValue::Int(v) if kind.is_unsigned() => Value::Uint(*v as u64),
        ConstValue::Int(v) => Value::Int(*v as i64),
        ConstValue::Float(f) if kind.is_integer() && kind.is_unsigned() => Value::Uint(*f as u64),
        ConstValue::Float(f) if kind.is_integer() => Value::Int(*f as i64),
        ConstValue::Float(f) => Value::Float(*f),
        ConstValue::Nil => zero(&c.ty),
    }
}

/// `print`'s rendering of floats: `+1.500000e+000`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let text = format!("{:.6e}", f.abs());
    let (mantissa, exp) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    format!(
        "{}{}e{}{:03}",
        if f.is_sign_negative() { '-' } else { '+' },
        mantissa,
        if exp < 0 { '-' } else { '+' },
        exp.abs()
    )
}

fn address_of<T: ?Sized>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc) as *const () as usize
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Uint(v) => write!(f, "{}", v),
            Value::Float(v) => f.write_str(&format_float(*v)),
            Value::String(s) => f.write_str(&String::from_utf8_lossy(s)),
            Value::Pointer(None) | Value::Map(None) | Value::Chan(None) | Value::Func(None) => f.write_str("0x0"),
            Value::Pointer(Some(p)) => write!(f, "{:#x}", p.address()),
            Value::Map(Some(m)) => write!(f, "{:#x}", address_of(m)),
            Value::Chan(Some(ch)) => write!(f, "{:#x}", address_of(ch)),
            Value::Func(Some(c)) => write!(f, "{:#x}", address_of(&c.func)),
            Value::Slice(s) => match &s.base {
                Some(base) => write!(f, "[{}/{}]{:#x}", s.len, s.cap, base.address() + s.offset),
                None => write!(f, "[0/0]0x0"),
            },
            Value::Interface(None) => f.write_str("(0x0,0x0)"),
            Value::Interface(Some(boxed)) => write!(f, "({},{})", boxed.ty, boxed.value),
            Value::Array(items) => write!(f, "[{}]", items.iter().join(" ")),
            Value::Struct(items) => write!(f, "{{{}}}", items.iter().join(" ")),
            Value::Tuple(items) => write!(f, "({})", items.iter().join(", ")),
            Value::Iter(_) => f.write_str("<iter>"),
            Value::Invalid => f.write_str("<invalid>"),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Slice(s) if !s.is_nil() => match s.to_vec() {
                Ok(items) => write!(f, "{:?}", items),
                Err(_) => f.write_str("[?]"),
            },
            Value::Interface(Some(boxed)) => write!(f, "{}({:?})", boxed.ty, boxed.value),
            Value::Array(items) => write!(f, "{:?}", items),
            Value::Struct(items) => write!(f, "{{{}}}", items.iter().map(|v| format!("{:?}", v)).join(", ")),
            Value::Tuple(items) => write!(f, "({})", items.iter().map(|v| format!("{:?}", v)).join(", ")),
            other => Display::fmt(other, f),
        }
    }
}

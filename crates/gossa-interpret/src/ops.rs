//! Arithmetic, comparison and conversion on runtime values.

use crate::error::{runtime_error, Flow};
use crate::interp_bail;
use crate::value::{decode_rune, Slice, Value};
use gossa_core::ops::{BinaryOp, UnOpKind};
use gossa_core::types::{BasicKind, Type, TypeKind};
use std::cmp::Ordering;

/// Truncates an integer to the width of `kind`, sign-extending signed kinds.
pub fn normalize(value: Value, kind: BasicKind) -> Value {
    let bits = kind.bits();
    match value {
        Value::Int(v) if kind.is_unsigned() => normalize(Value::Uint(v as u64), kind),
        Value::Uint(v) if kind.is_integer() && !kind.is_unsigned() => normalize(Value::Int(v as i64), kind),
        Value::Int(v) if bits < 64 => {
            let shift = 64 - bits;
            Value::Int((v << shift) >> shift)
        }
        Value::Uint(v) if bits < 64 => Value::Uint(v & ((1u64 << bits) - 1)),
        Value::Float(f) if kind == BasicKind::Float32 => Value::Float(f as f32 as f64),
        other => other,
    }
}

fn shift_count(y: &Value) -> Flow<u64> {
    match y {
        Value::Int(v) if *v < 0 => Err(runtime_error("negative shift amount")),
        Value::Int(v) => Ok(*v as u64),
        Value::Uint(v) => Ok(*v),
        other => interp_bail!(format!("shift by non-integer {:?}", other)),
    }
}

fn divide_by_zero() -> crate::error::Unwind {
    runtime_error("integer divide by zero")
}

/// `x op y` where both operands have type `ty`.
pub fn binop(op: BinaryOp, x: &Value, y: &Value, ty: &Type) -> Flow<Value> {
    match op {
        BinaryOp::Eql => return Ok(Value::Bool(equal(x, y)?)),
        BinaryOp::Neq => return Ok(Value::Bool(!equal(x, y)?)),
        BinaryOp::Lss | BinaryOp::Leq | BinaryOp::Gtr | BinaryOp::Geq => {
            let ordering = compare(x, y)?;
            let holds = match (op, ordering) {
                (_, None) => false,
                (BinaryOp::Lss, Some(o)) => o == Ordering::Less,
                (BinaryOp::Leq, Some(o)) => o != Ordering::Greater,
                (BinaryOp::Gtr, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            };
            return Ok(Value::Bool(holds));
        }
        _ => {}
    }

    let kind = ty.basic_kind().unwrap_or(BasicKind::Invalid);
    let result = match (x, y) {
        (Value::Int(a), _) if op.is_shift() => {
            let n = shift_count(y)?;
            match op {
                BinaryOp::Shl if n >= 64 => Value::Int(0),
                BinaryOp::Shl => Value::Int(a.wrapping_shl(n as u32)),
                _ if n >= 64 => Value::Int(if *a < 0 { -1 } else { 0 }),
                _ => Value::Int(a >> n),
            }
        }
        (Value::Uint(a), _) if op.is_shift() => {
            let n = shift_count(y)?;
            match op {
                _ if n >= 64 => Value::Uint(0),
                BinaryOp::Shl => Value::Uint(a << n),
                _ => Value::Uint(a >> n),
            }
        }
        (Value::Int(a), Value::Int(b)) => Value::Int(match op {
            BinaryOp::Add => a.wrapping_add(*b),
            BinaryOp::Sub => a.wrapping_sub(*b),
            BinaryOp::Mul => a.wrapping_mul(*b),
            BinaryOp::Quo if *b == 0 => return Err(divide_by_zero()),
            BinaryOp::Quo => a.wrapping_div(*b),
            BinaryOp::Rem if *b == 0 => return Err(divide_by_zero()),
            BinaryOp::Rem => a.wrapping_rem(*b),
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            BinaryOp::Xor => a ^ b,
            BinaryOp::AndNot => a & !b,
            other => interp_bail!(format!("operator {} on int", other)),
        }),
        (Value::Uint(a), Value::Uint(b)) => Value::Uint(match op {
            BinaryOp::Add => a.wrapping_add(*b),
            BinaryOp::Sub => a.wrapping_sub(*b),
            BinaryOp::Mul => a.wrapping_mul(*b),
            BinaryOp::Quo if *b == 0 => return Err(divide_by_zero()),
            BinaryOp::Quo => a / b,
            BinaryOp::Rem if *b == 0 => return Err(divide_by_zero()),
            BinaryOp::Rem => a % b,
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            BinaryOp::Xor => a ^ b,
            BinaryOp::AndNot => a & !b,
            other => interp_bail!(format!("operator {} on uint", other)),
        }),
        (Value::Float(a), Value::Float(b)) => Value::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Quo => a / b,
            other => interp_bail!(format!("operator {} on float", other)),
        }),
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            let mut s = Vec::with_capacity(a.len() + b.len());
            s.extend_from_slice(a);
            s.extend_from_slice(b);
            Value::from_bytes(s)
        }
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(match op {
            BinaryOp::LAnd => *a && *b,
            BinaryOp::LOr => *a || *b,
            other => interp_bail!(format!("operator {} on bool", other)),
        }),
        (a, b) => interp_bail!(format!("invalid operands {:?} {} {:?}", a, op, b)),
    };
    Ok(normalize(result, kind))
}

fn comparable(value: &Value) -> bool {
    match value {
        Value::Slice(_) | Value::Map(_) | Value::Func(_) => false,
        Value::Array(items) | Value::Struct(items) => items.iter().all(comparable),
        _ => true,
    }
}

/// `x == y`. Interfaces holding values of an uncomparable dynamic type panic.
pub fn equal(x: &Value, y: &Value) -> Flow<bool> {
    match (x, y) {
        (Value::Interface(Some(a)), Value::Interface(Some(b))) => {
            if a.ty != b.ty {
                return Ok(false);
            }
            if !comparable(&a.value) {
                return Err(runtime_error(format!("comparing uncomparable type {}", a.ty)));
            }
            equal(&a.value, &b.value)
        }
        (Value::Array(a), Value::Array(b)) | (Value::Struct(a), Value::Struct(b)) => {
            for (a, b) in a.iter().zip(b) {
                if !equal(a, b)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (a, b) => Ok(a == b),
    }
}

fn compare(x: &Value, y: &Value) -> Flow<Option<Ordering>> {
    Ok(match (x, y) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Uint(a), Value::Uint(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) => interp_bail!(format!("cannot order {:?} and {:?}", a, b)),
    })
}

/// Arithmetic unary operators; `Deref` and `Recv` are handled by the caller.
pub fn unop(op: UnOpKind, x: &Value, ty: &Type) -> Flow<Value> {
    let kind = ty.basic_kind().unwrap_or(BasicKind::Invalid);
    let result = match (op, x) {
        (UnOpKind::Neg, Value::Int(v)) => Value::Int(v.wrapping_neg()),
        (UnOpKind::Neg, Value::Uint(v)) => Value::Uint(v.wrapping_neg()),
        (UnOpKind::Neg, Value::Float(f)) => Value::Float(-f),
        (UnOpKind::Not, Value::Bool(b)) => Value::Bool(!b),
        (UnOpKind::Xor, Value::Int(v)) => Value::Int(!v),
        (UnOpKind::Xor, Value::Uint(v)) => Value::Uint(!v),
        (op, x) => interp_bail!(format!("invalid operand {:?} for {}", x, op)),
    };
    Ok(normalize(result, kind))
}

fn rune_string(code: i64) -> String {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
        .to_string()
}

/// The runes of a byte string, one U+FFFD per invalid byte.
fn runes(mut bytes: &[u8]) -> Vec<char> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let (rune, width) = decode_rune(bytes);
        out.push(rune);
        bytes = &bytes[width..];
    }
    out
}

/// The `Convert` instruction: conversions between basic types and between
/// strings and byte or rune slices.
pub fn convert(x: Value, from: &Type, to: &Type) -> Flow<Value> {
    let (src, dst) = (from.underlying(), to.underlying());
    if let Some(kind) = dst.basic_kind() {
        if kind.is_string() {
            return Ok(match (&x, src.kind()) {
                (Value::String(_), _) => x,
                (Value::Int(v), _) => Value::string(rune_string(*v)),
                (Value::Uint(v), _) => Value::string(rune_string(*v as i64)),
                (Value::Slice(s), TypeKind::Slice(elem)) => {
                    let items = s.to_vec()?;
                    if elem.basic_kind().is_some_and(|k| k == BasicKind::Uint8) {
                        let bytes: Vec<u8> = items.iter().filter_map(Value::as_i64).map(|b| b as u8).collect();
                        Value::from_bytes(bytes)
                    } else {
                        let text: String = items
                            .iter()
                            .filter_map(Value::as_i64)
                            .map(rune_string)
                            .collect();
                        Value::string(text)
                    }
                }
                (other, _) => interp_bail!(format!("cannot convert {:?} to string", other)),
            });
        }
        if kind.is_integer() {
            let raw = match x {
                Value::Int(_) | Value::Uint(_) => x,
                Value::Float(f) if kind.is_unsigned() => Value::Uint(f as u64),
                Value::Float(f) => Value::Int(f as i64),
                Value::Pointer(_) => return Ok(x),
                other => interp_bail!(format!("cannot convert {:?} to {}", other, to)),
            };
            return Ok(normalize(raw, kind));
        }
        if kind.is_float() {
            let f = match x.as_f64() {
                Some(f) => f,
                None => interp_bail!(format!("cannot convert {:?} to {}", x, to)),
            };
            return Ok(normalize(Value::Float(f), kind));
        }
        return Ok(x);
    }
    if let (TypeKind::Slice(elem), Value::String(s)) = (dst.kind(), &x) {
        let items: Vec<Value> = if elem.basic_kind() == Some(BasicKind::Uint8) {
            s.iter().map(|b| Value::Uint(*b as u64)).collect()
        } else {
            runes(s).into_iter().map(|c| Value::Int(c as i64)).collect()
        };
        return Ok(Value::Slice(Slice::from_values(items)));
    }
    Ok(x)
}

//! Assignable locations.

use crate::function::FunctionState;
use gossa_core::ssa::{InstrKind, Value};
use gossa_core::types::Type;
use gossa_core::unreachable_shape;

#[derive(Debug, Clone)]
pub enum Lvalue {
    /// A location with an address.
    Address { addr: Value, ty: Type },
    /// A struct field whose address is only computed on access, so that a
    /// nil base panics after the right-hand side has been evaluated.
    Field { base: Value, index: usize, ty: Type },
    /// A map entry `m[k]`; not addressable.
    MapElement { map: Value, key: Value, ty: Type },
    /// The blank identifier; stores are discarded.
    Blank,
}

impl Lvalue {
    pub fn address(addr: Value, state: &FunctionState) -> Lvalue {
        let ty = state.value_type(&addr).deref();
        Lvalue::Address { addr, ty }
    }

    pub fn ty(&self) -> Type {
        match self {
            Lvalue::Address { ty, .. } | Lvalue::Field { ty, .. } | Lvalue::MapElement { ty, .. } => {
                ty.clone()
            }
            Lvalue::Blank => unreachable_shape!("type of blank lvalue"),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Lvalue::Blank)
    }

    pub fn load(&self, state: &mut FunctionState) -> Value {
        match self {
            Lvalue::Address { addr, .. } => state.emit_load(addr.clone()),
            Lvalue::Field { base, index, .. } => {
                let addr = state.emit_field_selection(base.clone(), *index, true);
                state.emit_load(addr)
            }
            Lvalue::MapElement { map, key, ty } => state.emit_value(
                InstrKind::Lookup {
                    x: map.clone(),
                    index: key.clone(),
                    comma_ok: false,
                },
                ty.clone(),
            ),
            Lvalue::Blank => unreachable_shape!("load of blank lvalue"),
        }
    }

    pub fn store(&self, state: &mut FunctionState, value: Value) {
        match self {
            Lvalue::Address { addr, .. } => state.emit_store(addr.clone(), value),
            Lvalue::Field { base, index, .. } => {
                let addr = state.emit_field_selection(base.clone(), *index, true);
                state.emit_store(addr, value);
            }
            Lvalue::MapElement { map, key, ty } => {
                let value = state.emit_conv(value, ty);
                state.emit(
                    InstrKind::MapUpdate {
                        map: map.clone(),
                        key: key.clone(),
                        value,
                    },
                    None,
                );
            }
            Lvalue::Blank => {}
        }
    }

    /// The address of the location; map entries have none.
    pub fn addr(&self, state: &mut FunctionState) -> Value {
        match self {
            Lvalue::Address { addr, .. } => addr.clone(),
            Lvalue::Field { base, index, .. } => state.emit_field_selection(base.clone(), *index, true),
            Lvalue::MapElement { .. } => unreachable_shape!("address of map element"),
            Lvalue::Blank => unreachable_shape!("address of blank lvalue"),
        }
    }
}

/// Stores deferred until every right-hand side of a parallel assignment has
/// been evaluated.
#[derive(Default)]
pub struct StoreBuf {
    stores: Vec<(Lvalue, Value)>,
}

impl StoreBuf {
    pub fn store(&mut self, lhs: Lvalue, rhs: Value) {
        self.stores.push((lhs, rhs));
    }

    pub fn emit(self, state: &mut FunctionState) {
        for (lhs, rhs) in self.stores {
            lhs.store(state, rhs);
        }
    }
}

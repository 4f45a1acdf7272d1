//! The type model handed over by the front end.
//!
//! Types are immutable and shared behind an [`Arc`]. Equality and hashing are
//! structural, except for named types which compare by identity; that keeps
//! recursive types finite and lets types key the program-wide caches.

pub mod lookup;

use itertools::Itertools;
use parking_lot::RwLock;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

pub use lookup::{
    find_method, implements, lookup_field_or_method, method_set, LookupResult, MethodRef, Selection,
    SelectionKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Invalid,
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    String,
    UnsafePointer,
    UntypedBool,
    UntypedInt,
    UntypedRune,
    UntypedFloat,
    UntypedString,
    UntypedNil,
}

impl BasicKind {
    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Invalid => "invalid type",
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::String => "string",
            BasicKind::UnsafePointer => "unsafe.Pointer",
            BasicKind::UntypedBool => "untyped bool",
            BasicKind::UntypedInt => "untyped int",
            BasicKind::UntypedRune => "untyped rune",
            BasicKind::UntypedFloat => "untyped float",
            BasicKind::UntypedString => "untyped string",
            BasicKind::UntypedNil => "untyped nil",
        }
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, BasicKind::Bool | BasicKind::UntypedBool)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BasicKind::Int
                | BasicKind::Int8
                | BasicKind::Int16
                | BasicKind::Int32
                | BasicKind::Int64
                | BasicKind::Uint
                | BasicKind::Uint8
                | BasicKind::Uint16
                | BasicKind::Uint32
                | BasicKind::Uint64
                | BasicKind::Uintptr
                | BasicKind::UntypedInt
                | BasicKind::UntypedRune
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            BasicKind::Uint
                | BasicKind::Uint8
                | BasicKind::Uint16
                | BasicKind::Uint32
                | BasicKind::Uint64
                | BasicKind::Uintptr
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            BasicKind::Float32 | BasicKind::Float64 | BasicKind::UntypedFloat
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_string(self) -> bool {
        matches!(self, BasicKind::String | BasicKind::UntypedString)
    }

    pub fn is_untyped(self) -> bool {
        matches!(
            self,
            BasicKind::UntypedBool
                | BasicKind::UntypedInt
                | BasicKind::UntypedRune
                | BasicKind::UntypedFloat
                | BasicKind::UntypedString
                | BasicKind::UntypedNil
        )
    }

    /// Width in bits of an integer kind; 64 for the platform-sized ones.
    pub fn bits(self) -> u32 {
        match self {
            BasicKind::Int8 | BasicKind::Uint8 => 8,
            BasicKind::Int16 | BasicKind::Uint16 => 16,
            BasicKind::Int32 | BasicKind::Uint32 | BasicKind::Float32 => 32,
            _ => 64,
        }
    }

    pub fn default_kind(self) -> BasicKind {
        match self {
            BasicKind::UntypedBool => BasicKind::Bool,
            BasicKind::UntypedInt => BasicKind::Int,
            BasicKind::UntypedRune => BasicKind::Int32,
            BasicKind::UntypedFloat => BasicKind::Float64,
            BasicKind::UntypedString => BasicKind::String,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub embedded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceMethod {
    pub name: String,
    pub sig: Type,
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub recv: Option<Type>,
    pub params: Vec<Type>,
    pub results: Vec<Type>,
    pub variadic: bool,
}

// The receiver is not part of a signature's identity.
impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
            && self.results == other.results
            && self.variadic == other.variadic
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.params.hash(state);
        self.results.hash(state);
        self.variadic.hash(state);
    }
}

/// A method declared on a named type.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub name: String,
    pub pointer_recv: bool,
    /// Signature without the receiver.
    pub sig: Type,
}

pub struct NamedType {
    id: u64,
    pub name: String,
    pub pkg: Option<String>,
    underlying: OnceLock<Type>,
    methods: RwLock<Vec<MethodSpec>>,
}

impl NamedType {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn underlying(&self) -> Type {
        match self.underlying.get() {
            Some(ty) => ty.clone(),
            None => Type::basic(BasicKind::Invalid),
        }
    }

    pub fn methods(&self) -> Vec<MethodSpec> {
        self.methods.read().clone()
    }

    pub fn method(&self, name: &str) -> Option<(usize, MethodSpec)> {
        self.methods
            .read()
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
            .map(|(i, m)| (i, m.clone()))
    }

    pub fn qualified_name(&self) -> String {
        match &self.pkg {
            Some(pkg) => format!("{}.{}", pkg, self.name),
            None => self.name.clone(),
        }
    }
}

impl Debug for NamedType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.qualified_name(), self.id)
    }
}

#[derive(Debug)]
pub enum TypeKind {
    Basic(BasicKind),
    Pointer(Type),
    Slice(Type),
    Array(Type, u64),
    Map(Type, Type),
    Chan(ChanDir, Type),
    Struct(Vec<Field>),
    Tuple(Vec<Type>),
    Signature(Signature),
    /// Method list is sorted by name and already includes embedded interfaces.
    Interface(Vec<InterfaceMethod>),
    Named(Arc<NamedType>),
}

#[derive(Clone)]
pub struct Type(Arc<TypeKind>);

static NEXT_NAMED: AtomicU64 = AtomicU64::new(1);

impl Type {
    pub fn new(kind: TypeKind) -> Type {
        Type(Arc::new(kind))
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0
    }

    pub fn basic(kind: BasicKind) -> Type {
        Type::new(TypeKind::Basic(kind))
    }

    pub fn bool() -> Type {
        Type::basic(BasicKind::Bool)
    }

    pub fn int() -> Type {
        Type::basic(BasicKind::Int)
    }

    pub fn uint() -> Type {
        Type::basic(BasicKind::Uint)
    }

    pub fn int32() -> Type {
        Type::basic(BasicKind::Int32)
    }

    pub fn uint8() -> Type {
        Type::basic(BasicKind::Uint8)
    }

    pub fn float64() -> Type {
        Type::basic(BasicKind::Float64)
    }

    pub fn string() -> Type {
        Type::basic(BasicKind::String)
    }

    pub fn invalid() -> Type {
        Type::basic(BasicKind::Invalid)
    }

    pub fn untyped_nil() -> Type {
        Type::basic(BasicKind::UntypedNil)
    }

    pub fn pointer(elem: Type) -> Type {
        Type::new(TypeKind::Pointer(elem))
    }

    pub fn slice(elem: Type) -> Type {
        Type::new(TypeKind::Slice(elem))
    }

    pub fn array(elem: Type, len: u64) -> Type {
        Type::new(TypeKind::Array(elem, len))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::new(TypeKind::Map(key, value))
    }

    pub fn chan(dir: ChanDir, elem: Type) -> Type {
        Type::new(TypeKind::Chan(dir, elem))
    }

    pub fn tuple(elems: Vec<Type>) -> Type {
        Type::new(TypeKind::Tuple(elems))
    }

    pub fn structure(fields: Vec<Field>) -> Type {
        Type::new(TypeKind::Struct(fields))
    }

    pub fn func(params: Vec<Type>, results: Vec<Type>, variadic: bool) -> Type {
        Type::new(TypeKind::Signature(Signature {
            recv: None,
            params,
            results,
            variadic,
        }))
    }

    pub fn method_sig(recv: Type, params: Vec<Type>, results: Vec<Type>, variadic: bool) -> Type {
        Type::new(TypeKind::Signature(Signature {
            recv: Some(recv),
            params,
            results,
            variadic,
        }))
    }

    pub fn interface(mut methods: Vec<InterfaceMethod>) -> Type {
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        Type::new(TypeKind::Interface(methods))
    }

    pub fn empty_interface() -> Type {
        Type::interface(Vec::new())
    }

    /// A fresh named type; its underlying type is set once with
    /// [`Type::set_underlying`].
    pub fn named(pkg: Option<&str>, name: &str) -> Type {
        Type::new(TypeKind::Named(Arc::new(NamedType {
            id: NEXT_NAMED.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            pkg: pkg.map(str::to_string),
            underlying: OnceLock::new(),
            methods: RwLock::new(Vec::new()),
        })))
    }

    /// The predeclared `error` interface.
    pub fn error() -> Type {
        static ERROR: OnceLock<Type> = OnceLock::new();
        ERROR
            .get_or_init(|| {
                let ty = Type::named(None, "error");
                ty.set_underlying(Type::interface(vec![InterfaceMethod {
                    name: "Error".to_string(),
                    sig: Type::func(Vec::new(), vec![Type::string()], false),
                }]));
                ty
            })
            .clone()
    }

    pub fn set_underlying(&self, underlying: Type) {
        if let TypeKind::Named(named) = self.kind() {
            let underlying = underlying.underlying();
            let _ = named.underlying.set(underlying);
        }
    }

    pub fn add_method(&self, spec: MethodSpec) {
        if let TypeKind::Named(named) = self.kind() {
            let mut methods = named.methods.write();
            methods.retain(|m| m.name != spec.name);
            methods.push(spec);
        }
    }

    pub fn named_type(&self) -> Option<&Arc<NamedType>> {
        match self.kind() {
            TypeKind::Named(named) => Some(named),
            _ => None,
        }
    }

    pub fn underlying(&self) -> Type {
        match self.kind() {
            TypeKind::Named(named) => named.underlying(),
            _ => self.clone(),
        }
    }

    pub fn basic_kind(&self) -> Option<BasicKind> {
        match self.underlying().kind() {
            TypeKind::Basic(kind) => Some(*kind),
            _ => None,
        }
    }

    fn basic_is(&self, pred: impl Fn(BasicKind) -> bool) -> bool {
        self.basic_kind().map(pred).unwrap_or(false)
    }

    pub fn is_basic(&self) -> bool {
        self.basic_kind().is_some()
    }

    pub fn is_boolean(&self) -> bool {
        self.basic_is(BasicKind::is_boolean)
    }

    pub fn is_integer(&self) -> bool {
        self.basic_is(BasicKind::is_integer)
    }

    pub fn is_unsigned(&self) -> bool {
        self.basic_is(BasicKind::is_unsigned)
    }

    pub fn is_float(&self) -> bool {
        self.basic_is(BasicKind::is_float)
    }

    pub fn is_string(&self) -> bool {
        self.basic_is(BasicKind::is_string)
    }

    pub fn is_untyped(&self) -> bool {
        self.basic_is(BasicKind::is_untyped)
    }

    pub fn is_untyped_nil(&self) -> bool {
        self.basic_kind() == Some(BasicKind::UntypedNil)
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.underlying().kind(), TypeKind::Interface(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.underlying().kind(), TypeKind::Pointer(_))
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self.kind(), TypeKind::Tuple(_))
    }

    /// Converts an untyped type to its default typed counterpart.
    pub fn default_type(&self) -> Type {
        match self.kind() {
            TypeKind::Basic(kind) if kind.is_untyped() && *kind != BasicKind::UntypedNil => {
                Type::basic(kind.default_kind())
            }
            _ => self.clone(),
        }
    }

    pub fn pointer_elem(&self) -> Option<Type> {
        match self.underlying().kind() {
            TypeKind::Pointer(elem) => Some(elem.clone()),
            _ => None,
        }
    }

    /// The pointee for pointer types, the type itself otherwise.
    pub fn deref(&self) -> Type {
        self.pointer_elem().unwrap_or_else(|| self.clone())
    }

    /// Element type of pointers, slices, arrays, channels and maps.
    pub fn elem(&self) -> Option<Type> {
        match self.underlying().kind() {
            TypeKind::Pointer(elem)
            | TypeKind::Slice(elem)
            | TypeKind::Array(elem, _)
            | TypeKind::Chan(_, elem)
            | TypeKind::Map(_, elem) => Some(elem.clone()),
            TypeKind::Basic(kind) if kind.is_string() => Some(Type::uint8()),
            _ => None,
        }
    }

    pub fn map_key(&self) -> Option<Type> {
        match self.underlying().kind() {
            TypeKind::Map(key, _) => Some(key.clone()),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<u64> {
        match self.underlying().kind() {
            TypeKind::Array(_, len) => Some(*len),
            _ => None,
        }
    }

    pub fn fields(&self) -> Vec<Field> {
        match self.underlying().kind() {
            TypeKind::Struct(fields) => fields.clone(),
            _ => Vec::new(),
        }
    }

    pub fn field(&self, index: usize) -> Option<Field> {
        match self.underlying().kind() {
            TypeKind::Struct(fields) => fields.get(index).cloned(),
            _ => None,
        }
    }

    pub fn tuple_elems(&self) -> Vec<Type> {
        match self.kind() {
            TypeKind::Tuple(elems) => elems.clone(),
            _ => vec![self.clone()],
        }
    }

    pub fn signature(&self) -> Option<Signature> {
        match self.underlying().kind() {
            TypeKind::Signature(sig) => Some(sig.clone()),
            _ => None,
        }
    }

    pub fn interface_methods(&self) -> Vec<InterfaceMethod> {
        match self.underlying().kind() {
            TypeKind::Interface(methods) => methods.clone(),
            _ => Vec::new(),
        }
    }
}

impl Signature {
    /// Results as a single type: nothing, the lone result, or a tuple.
    pub fn result_type(&self) -> Type {
        match self.results.len() {
            1 => self.results[0].clone(),
            _ => Type::tuple(self.results.clone()),
        }
    }

    /// Parameter list with the receiver, if any, prepended.
    pub fn params_with_recv(&self) -> Vec<Type> {
        self.recv
            .iter()
            .cloned()
            .chain(self.params.iter().cloned())
            .collect()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        match (self.kind(), other.kind()) {
            (TypeKind::Basic(a), TypeKind::Basic(b)) => a == b,
            (TypeKind::Pointer(a), TypeKind::Pointer(b)) => a == b,
            (TypeKind::Slice(a), TypeKind::Slice(b)) => a == b,
            (TypeKind::Array(a, n), TypeKind::Array(b, m)) => n == m && a == b,
            (TypeKind::Map(k1, v1), TypeKind::Map(k2, v2)) => k1 == k2 && v1 == v2,
            (TypeKind::Chan(d1, a), TypeKind::Chan(d2, b)) => d1 == d2 && a == b,
            (TypeKind::Struct(a), TypeKind::Struct(b)) => a == b,
            (TypeKind::Tuple(a), TypeKind::Tuple(b)) => a == b,
            (TypeKind::Signature(a), TypeKind::Signature(b)) => a == b,
            (TypeKind::Interface(a), TypeKind::Interface(b)) => a == b,
            (TypeKind::Named(a), TypeKind::Named(b)) => a.id == b.id,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self.kind()).hash(state);
        match self.kind() {
            TypeKind::Basic(kind) => kind.hash(state),
            TypeKind::Pointer(elem) | TypeKind::Slice(elem) => elem.hash(state),
            TypeKind::Array(elem, len) => {
                elem.hash(state);
                len.hash(state);
            }
            TypeKind::Map(key, value) => {
                key.hash(state);
                value.hash(state);
            }
            TypeKind::Chan(dir, elem) => {
                dir.hash(state);
                elem.hash(state);
            }
            TypeKind::Struct(fields) => fields.hash(state),
            TypeKind::Tuple(elems) => elems.hash(state),
            TypeKind::Signature(sig) => sig.hash(state),
            TypeKind::Interface(methods) => methods.hash(state),
            TypeKind::Named(named) => named.id.hash(state),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Basic(kind) => f.write_str(kind.name()),
            TypeKind::Pointer(elem) => write!(f, "*{}", elem),
            TypeKind::Slice(elem) => write!(f, "[]{}", elem),
            TypeKind::Array(elem, len) => write!(f, "[{}]{}", len, elem),
            TypeKind::Map(key, value) => write!(f, "map[{}]{}", key, value),
            TypeKind::Chan(ChanDir::Both, elem) => write!(f, "chan {}", elem),
            TypeKind::Chan(ChanDir::Send, elem) => write!(f, "chan<- {}", elem),
            TypeKind::Chan(ChanDir::Recv, elem) => write!(f, "<-chan {}", elem),
            TypeKind::Struct(fields) => write!(
                f,
                "struct{{{}}}",
                fields
                    .iter()
                    .map(|field| if field.embedded {
                        field.ty.to_string()
                    } else {
                        format!("{} {}", field.name, field.ty)
                    })
                    .join("; ")
            ),
            TypeKind::Tuple(elems) => write!(f, "({})", elems.iter().join(", ")),
            TypeKind::Signature(sig) => {
                f.write_str("func")?;
                write_signature(f, sig)
            }
            TypeKind::Interface(methods) => {
                write!(f, "interface{{")?;
                for (i, method) in methods.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    f.write_str(&method.name)?;
                    if let Some(sig) = method.sig.signature() {
                        write_signature(f, &sig)?;
                    }
                }
                write!(f, "}}")
            }
            TypeKind::Named(named) => f.write_str(&named.qualified_name()),
        }
    }
}

fn write_signature(f: &mut Formatter<'_>, sig: &Signature) -> fmt::Result {
    let params = sig
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if sig.variadic && i + 1 == sig.params.len() {
                format!("...{}", p.elem().unwrap_or_else(|| p.clone()))
            } else {
                p.to_string()
            }
        })
        .join(", ");
    write!(f, "({})", params)?;
    match sig.results.len() {
        0 => Ok(()),
        1 => write!(f, " {}", sig.results[0]),
        _ => write!(f, " ({})", sig.results.iter().join(", ")),
    }
}

impl Debug for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Whether a value of `src` can be reinterpreted as `dst` without changing
/// its representation: identical underlying types, or pointers/channels whose
/// element types have identical underlying types.
pub fn is_value_preserving(src: &Type, dst: &Type) -> bool {
    let (src, dst) = (src.underlying(), dst.underlying());
    if src == dst {
        return true;
    }
    match (src.kind(), dst.kind()) {
        (TypeKind::Pointer(a), TypeKind::Pointer(b)) => a.underlying() == b.underlying(),
        (TypeKind::Chan(_, a), TypeKind::Chan(_, b)) => a == b,
        _ => false,
    }
}

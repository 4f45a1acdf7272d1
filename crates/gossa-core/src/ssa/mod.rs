//! SSA control-flow-graph IR.
//!
//! A [`Program`] owns [`Package`]s, which own their members. Function bodies
//! are filled in exactly once after creation and are immutable afterwards.
//! Registers are numbered per function; a register is defined by exactly one
//! parameter, free variable or instruction.

pub mod pretty;
pub mod sanity;

use crate::builtin::BuiltinKind;
use crate::collections::ConcurrentMap;
use crate::constant::ConstValue;
use crate::ops::{BinaryOp, UnOpKind};
use crate::span::Span;
use crate::syntax::ObjectId;
use crate::types::Type;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

pub type BlockId = usize;

/// Preorder lexical scope id within a package; 0 is the package scope.
pub type ScopeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u32);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: ConstValue,
    pub ty: Type,
}

impl Constant {
    pub fn new(value: ConstValue, ty: Type) -> Self {
        Self { value, ty }
    }

    pub fn int(value: i64) -> Self {
        Self::new(ConstValue::from(value), Type::int())
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ConstValue::Bool(value), Type::bool())
    }

    pub fn string(value: &str) -> Self {
        Self::new(ConstValue::from(value), Type::string())
    }

    /// The zero value of `ty`.
    pub fn zero(ty: Type) -> Self {
        let value = match ty.basic_kind() {
            Some(kind) if kind.is_boolean() => ConstValue::Bool(false),
            Some(kind) if kind.is_string() => ConstValue::String(String::new()),
            Some(kind) if kind.is_float() => ConstValue::Float(0.0),
            Some(kind) if kind.is_integer() => ConstValue::Int(0),
            _ => ConstValue::Nil,
        };
        Self { value, ty }
    }
}

#[derive(Clone)]
pub enum Value {
    Const(Constant),
    Reg(Reg),
    Function(Arc<Function>),
    Global(Arc<Global>),
    /// A builtin together with the signature of the call it appears in.
    Builtin(BuiltinKind, Type),
}

impl Value {
    pub fn int(value: i64) -> Value {
        Value::Const(Constant::int(value))
    }

    pub fn bool(value: bool) -> Value {
        Value::Const(Constant::bool(value))
    }

    pub fn string(value: &str) -> Value {
        Value::Const(Constant::string(value))
    }

    pub fn zero(ty: Type) -> Value {
        Value::Const(Constant::zero(ty))
    }

    pub fn as_reg(&self) -> Option<Reg> {
        match self {
            Value::Reg(reg) => Some(*reg),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(c) => write!(f, "{}:{}", c.value, c.ty),
            Value::Reg(r) => write!(f, "t{}", r.0),
            Value::Function(func) => write!(f, "{}", func.qualified_name()),
            Value::Global(g) => write!(f, "{}", g.qualified_name()),
            Value::Builtin(kind, _) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocPolicy {
    Stack,
    Heap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectDir {
    Send,
    Recv,
}

#[derive(Debug, Clone)]
pub struct SelectState {
    pub dir: SelectDir,
    pub chan: Value,
    pub send: Option<Value>,
    pub span: Span,
}

/// The method of an invoke-mode call on an interface value.
#[derive(Debug, Clone)]
pub struct InvokeMethod {
    pub name: String,
    pub sig: Type,
}

/// Shared shape of `Call`, `Go` and `Defer`.
#[derive(Debug, Clone)]
pub struct CallCommon {
    /// The callee, or the interface receiver in invoke mode.
    pub callee: Value,
    pub method: Option<InvokeMethod>,
    pub args: Vec<Value>,
    /// Signature of the call, receiver excluded.
    pub sig: Type,
    pub span: Span,
}

impl CallCommon {
    pub fn is_invoke(&self) -> bool {
        self.method.is_some()
    }
}

/// Source event a `Trace` marker stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceEvent {
    Stmt,
    IfInit,
    IfCond,
    ForInit,
    ForCond,
    ForPost,
    SwitchInit,
    SwitchTag,
    TypeSwitch,
    Range,
    Select,
}

#[derive(Debug, Clone)]
pub enum InstrKind {
    BinOp {
        op: BinaryOp,
        x: Value,
        y: Value,
    },
    UnOp {
        op: UnOpKind,
        x: Value,
        comma_ok: bool,
    },
    /// Allocates a zeroed cell of `ty`; the result is a pointer to it.
    /// Stack allocations also own a slot in the function's locals table.
    Alloc {
        ty: Type,
        policy: AllocPolicy,
        slot: Option<usize>,
        comment: String,
    },
    FieldAddr {
        x: Value,
        field: usize,
    },
    Field {
        x: Value,
        field: usize,
    },
    IndexAddr {
        x: Value,
        index: Value,
    },
    Index {
        x: Value,
        index: Value,
    },
    Lookup {
        x: Value,
        index: Value,
        comma_ok: bool,
    },
    Store {
        addr: Value,
        value: Value,
    },
    Slice {
        x: Value,
        low: Option<Value>,
        high: Option<Value>,
        max: Option<Value>,
    },
    TypeAssert {
        x: Value,
        asserted: Type,
        comma_ok: bool,
    },
    MakeInterface {
        x: Value,
    },
    ChangeInterface {
        x: Value,
        nil_check: bool,
    },
    ChangeType {
        x: Value,
    },
    Convert {
        x: Value,
    },
    MakeClosure {
        func: Arc<Function>,
        bindings: Vec<Value>,
    },
    MakeMap {
        reserve: Option<Value>,
    },
    MakeChan {
        size: Value,
    },
    MakeSlice {
        len: Value,
        cap: Value,
    },
    MapUpdate {
        map: Value,
        key: Value,
        value: Value,
    },
    Extract {
        tuple: Value,
        index: usize,
    },
    /// One edge per predecessor of the owning block, in predecessor order.
    Phi {
        edges: Vec<Value>,
        comment: String,
    },
    Call(CallCommon),
    Go(CallCommon),
    Defer(CallCommon),
    Range {
        x: Value,
    },
    Next {
        iter: Value,
        is_string: bool,
    },
    Select {
        states: Vec<SelectState>,
        blocking: bool,
    },
    Send {
        chan: Value,
        value: Value,
    },
    RunDefers,
    Trace {
        event: TraceEvent,
        marker: u32,
        breakpoint: bool,
    },
    Jump,
    If {
        cond: Value,
    },
    Return {
        results: Vec<Value>,
    },
    Panic {
        x: Value,
    },
}

impl InstrKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstrKind::Jump | InstrKind::If { .. } | InstrKind::Return { .. } | InstrKind::Panic { .. }
        )
    }

    /// Successor count the terminator kind requires.
    pub fn successor_count(&self) -> Option<usize> {
        match self {
            InstrKind::Jump => Some(1),
            InstrKind::If { .. } => Some(2),
            InstrKind::Return { .. } | InstrKind::Panic { .. } => Some(0),
            _ => None,
        }
    }

    /// Operand values in evaluation order.
    pub fn operands(&self) -> Vec<&Value> {
        fn call(c: &CallCommon) -> Vec<&Value> {
            std::iter::once(&c.callee).chain(c.args.iter()).collect()
        }
        match self {
            InstrKind::BinOp { x, y, .. } => vec![x, y],
            InstrKind::UnOp { x, .. }
            | InstrKind::FieldAddr { x, .. }
            | InstrKind::Field { x, .. }
            | InstrKind::TypeAssert { x, .. }
            | InstrKind::MakeInterface { x }
            | InstrKind::ChangeInterface { x, .. }
            | InstrKind::ChangeType { x }
            | InstrKind::Convert { x }
            | InstrKind::Range { x }
            | InstrKind::Panic { x } => vec![x],
            InstrKind::IndexAddr { x, index }
            | InstrKind::Index { x, index }
            | InstrKind::Lookup { x, index, .. } => vec![x, index],
            InstrKind::Store { addr, value } => vec![addr, value],
            InstrKind::Slice { x, low, high, max } => std::iter::once(x)
                .chain(low.iter())
                .chain(high.iter())
                .chain(max.iter())
                .collect(),
            InstrKind::MakeClosure { bindings, .. } => bindings.iter().collect(),
            InstrKind::MakeMap { reserve } => reserve.iter().collect(),
            InstrKind::MakeChan { size } => vec![size],
            InstrKind::MakeSlice { len, cap } => vec![len, cap],
            InstrKind::MapUpdate { map, key, value } => vec![map, key, value],
            InstrKind::Extract { tuple, .. } => vec![tuple],
            InstrKind::Phi { edges, .. } => edges.iter().collect(),
            InstrKind::Call(c) | InstrKind::Go(c) | InstrKind::Defer(c) => call(c),
            InstrKind::Next { iter, .. } => vec![iter],
            InstrKind::Select { states, .. } => states
                .iter()
                .flat_map(|s| std::iter::once(&s.chan).chain(s.send.iter()))
                .collect(),
            InstrKind::Send { chan, value } => vec![chan, value],
            InstrKind::If { cond } => vec![cond],
            InstrKind::Return { results } => results.iter().collect(),
            InstrKind::Alloc { .. } | InstrKind::RunDefers | InstrKind::Trace { .. } | InstrKind::Jump => {
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstrKind,
    pub result: Option<Reg>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub index: BlockId,
    pub comment: String,
    pub instrs: Vec<Instruction>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    pub scope: Option<ScopeId>,
}

impl BasicBlock {
    pub fn new(index: BlockId, comment: impl Into<String>, scope: Option<ScopeId>) -> Self {
        Self {
            index,
            comment: comment.into(),
            instrs: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            scope,
        }
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instrs.last().filter(|i| i.kind.is_terminator())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instrs
            .iter()
            .take_while(|i| matches!(i.kind, InstrKind::Phi { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegDef {
    Param(usize),
    FreeVar(usize),
    Instr,
}

#[derive(Debug, Clone)]
pub struct RegInfo {
    pub ty: Type,
    pub name: Option<String>,
    pub def: RegDef,
}

#[derive(Debug, Clone)]
pub struct FreeVar {
    pub reg: Reg,
    pub name: String,
    pub ty: Type,
}

/// A source-level variable and the register holding its address.
#[derive(Debug, Clone)]
pub struct DebugVar {
    pub name: String,
    pub scope: Option<ScopeId>,
    pub addr: Reg,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionBody {
    pub blocks: Vec<BasicBlock>,
    pub params: Vec<Reg>,
    pub free_vars: Vec<FreeVar>,
    pub regs: Vec<RegInfo>,
    /// Stack slots, indexed by the `slot` of their `Alloc`.
    pub locals: Vec<Reg>,
    pub named_results: Vec<Reg>,
    pub anon_funcs: Vec<Arc<Function>>,
    /// Where execution resumes after a deferred call recovers a panic.
    pub recover: Option<BlockId>,
    pub vars: Vec<DebugVar>,
}

impl FunctionBody {
    pub fn reg_type(&self, reg: Reg) -> &Type {
        &self.regs[reg.index()].ty
    }

    pub fn entry(&self) -> &BasicBlock {
        &self.blocks[0]
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instrs.iter())
    }
}

pub struct Function {
    pub name: String,
    pub pkg: Option<String>,
    pub sig: Type,
    /// Description of synthesized functions (wrappers, thunks, init).
    pub synthetic: Option<String>,
    pub object: Option<ObjectId>,
    pub span: Span,
    pub parent: Option<Weak<Function>>,
    /// Declared without a body: implemented natively.
    pub external: bool,
    body: OnceLock<FunctionBody>,
}

impl Function {
    pub fn new(name: impl Into<String>, pkg: Option<String>, sig: Type, span: Span) -> Self {
        Self {
            name: name.into(),
            pkg,
            sig,
            synthetic: None,
            object: None,
            span,
            parent: None,
            external: false,
            body: OnceLock::new(),
        }
    }

    pub fn with_object(mut self, object: ObjectId) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_synthetic(mut self, description: impl Into<String>) -> Self {
        self.synthetic = Some(description.into());
        self
    }

    pub fn with_parent(mut self, parent: &Arc<Function>) -> Self {
        self.parent = Some(Arc::downgrade(parent));
        self
    }

    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    pub fn body(&self) -> Option<&FunctionBody> {
        self.body.get()
    }

    pub fn is_built(&self) -> bool {
        self.body.get().is_some()
    }

    /// Installs the body. Returns `false` if one was already installed.
    pub fn set_body(&self, body: FunctionBody) -> bool {
        self.body.set(body).is_ok()
    }

    pub fn parent(&self) -> Option<Arc<Function>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Name used by the native registry, e.g. `math.Sqrt` or `(*main.T).String`.
    pub fn qualified_name(&self) -> String {
        if self.name.starts_with('(') {
            return self.name.clone();
        }
        if let Some(recv) = self.sig.signature().and_then(|s| s.recv) {
            return format!("({}).{}", recv, self.name);
        }
        match &self.pkg {
            Some(pkg) => format!("{}.{}", pkg, self.name),
            None => self.name.clone(),
        }
    }

    /// Looks up a source variable visible from `scope`, walking outward
    /// through the package scope table.
    pub fn lookup_var(&self, package: &Package, scope: Option<ScopeId>, name: &str) -> Option<&DebugVar> {
        let body = self.body()?;
        let mut current = scope;
        loop {
            if let Some(var) = body.vars.iter().rev().find(|v| v.name == name && v.scope == current) {
                return Some(var);
            }
            match current {
                Some(id) => current = package.scope_parent(id),
                None => break,
            }
        }
        body.vars.iter().rev().find(|v| v.name == name)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.qualified_name())
            .field("sig", &self.sig)
            .field("built", &self.is_built())
            .finish()
    }
}

#[derive(Debug)]
pub struct Global {
    /// Program-wide index of this global's runtime cell.
    pub id: usize,
    pub name: String,
    pub pkg: String,
    /// Pointer to the variable's type.
    pub ty: Type,
    pub object: Option<ObjectId>,
    pub span: Span,
}

impl Global {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.pkg, self.name)
    }

    pub fn elem_type(&self) -> Type {
        self.ty.deref()
    }
}

#[derive(Debug, Clone)]
pub struct NamedConst {
    pub name: String,
    pub value: Constant,
    pub object: ObjectId,
}

#[derive(Debug, Clone)]
pub enum Member {
    Func(Arc<Function>),
    Global(Arc<Global>),
    Const(NamedConst),
    Type(Type),
}

#[derive(Debug, Clone)]
pub struct ScopeInfo {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub span: Span,
}

#[derive(Debug)]
pub struct Package {
    pub path: String,
    pub name: String,
    pub imports: Vec<String>,
    pub members: BTreeMap<String, Member>,
    pub init: Arc<Function>,
    pub init_guard: Arc<Global>,
    pub scopes: Vec<ScopeInfo>,
    /// Methods declared in this package, in declaration order.
    pub methods: Vec<Arc<Function>>,
    /// Numbered source `init` functions.
    pub inits: Vec<Arc<Function>>,
}

impl Package {
    pub fn func(&self, name: &str) -> Option<Arc<Function>> {
        match self.members.get(name) {
            Some(Member::Func(f)) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn global(&self, name: &str) -> Option<Arc<Global>> {
        match self.members.get(name) {
            Some(Member::Global(g)) => Some(g.clone()),
            _ => None,
        }
    }

    pub fn scope_parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope as usize).and_then(|s| s.parent)
    }

    /// Every function of the package, including methods and source inits.
    pub fn functions(&self) -> Vec<Arc<Function>> {
        let mut funcs = vec![self.init.clone()];
        funcs.extend(self.inits.iter().cloned());
        for member in self.members.values() {
            if let Member::Func(f) = member {
                funcs.push(f.clone());
            }
        }
        funcs.extend(self.methods.iter().cloned());
        funcs
    }
}

/// Key of the thunk and wrapper caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub recv: Type,
    pub name: String,
}

impl MethodKey {
    pub fn new(recv: Type, name: impl Into<String>) -> Self {
        Self {
            recv,
            name: name.into(),
        }
    }
}

#[derive(Default)]
pub struct Program {
    packages: RwLock<BTreeMap<String, Arc<Package>>>,
    pub funcs: ConcurrentMap<ObjectId, Arc<Function>>,
    pub globals: ConcurrentMap<ObjectId, Arc<Global>>,
    /// Declared methods keyed by (named type id, method name).
    pub declared_methods: ConcurrentMap<(u64, String), Arc<Function>>,
    /// Method set entries keyed by (dynamic type, method name).
    pub method_sets: ConcurrentMap<MethodKey, Arc<Function>>,
    pub bound_thunks: ConcurrentMap<MethodKey, Arc<Function>>,
    pub method_thunks: ConcurrentMap<MethodKey, Arc<Function>>,
    all_globals: RwLock<Vec<Arc<Global>>>,
    next_global: AtomicUsize,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_package(&self, package: Arc<Package>) {
        self.packages.write().insert(package.path.clone(), package);
    }

    pub fn package(&self, path: &str) -> Option<Arc<Package>> {
        self.packages.read().get(path).cloned()
    }

    pub fn packages(&self) -> Vec<Arc<Package>> {
        self.packages.read().values().cloned().collect()
    }

    pub fn builtin(&self, name: &str) -> Option<BuiltinKind> {
        BuiltinKind::from_name(name)
    }

    pub fn new_global(
        &self,
        name: impl Into<String>,
        pkg: impl Into<String>,
        elem: Type,
        object: Option<ObjectId>,
        span: Span,
    ) -> Arc<Global> {
        let global = Arc::new(Global {
            id: self.next_global.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            pkg: pkg.into(),
            ty: Type::pointer(elem),
            object,
            span,
        });
        self.all_globals.write().push(global.clone());
        if let Some(object) = object {
            self.globals.insert(object, global.clone());
        }
        global
    }

    /// Every global of the program, indexed by [`Global::id`].
    pub fn globals_by_id(&self) -> Vec<Arc<Global>> {
        let mut all = self.all_globals.read().clone();
        all.sort_by_key(|g| g.id);
        all
    }

    pub fn declared_method(&self, named_id: u64, name: &str) -> Option<Arc<Function>> {
        self.declared_methods.get_cloned(&(named_id, name.to_string()))
    }

    /// Looks a function up by qualified name: `pkg.Func` or `(*pkg.T).m`.
    pub fn lookup_function(&self, qualified: &str) -> Option<Arc<Function>> {
        fn search(f: &Arc<Function>, qualified: &str) -> Option<Arc<Function>> {
            if f.qualified_name() == qualified {
                return Some(f.clone());
            }
            f.body()?
                .anon_funcs
                .iter()
                .find_map(|anon| search(anon, qualified))
        }
        self.packages()
            .iter()
            .flat_map(|pkg| pkg.functions())
            .find_map(|f| search(&f, qualified))
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("packages", &self.packages.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

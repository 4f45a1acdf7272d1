//! Typed syntax trees as delivered by the external front end.
//!
//! Every expression carries its type, its constant value when it has one and
//! whether it is addressable. Identifiers refer to entries of the program-wide
//! object table. Nothing here is re-derived by the builder.

pub mod factory;

pub use factory::{FuncHandle, SyntaxFactory};

use crate::builtin::BuiltinKind;
use crate::constant::ConstValue;
use crate::ops::{BinaryOp, UnaryOp};
use crate::span::Span;
use crate::types::{Selection, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// Index into a package's [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeRef(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    /// A variable; `global` for package-level variables.
    Var { global: bool },
    Func,
    Const(ConstValue),
    TypeName,
    Builtin(BuiltinKind),
    PkgName(String),
    Nil,
}

#[derive(Debug, Clone)]
pub struct Object {
    pub id: ObjectId,
    pub name: String,
    pub kind: ObjectKind,
    pub ty: Type,
    /// Import path of the declaring package; `None` for universe objects.
    pub pkg: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeNode {
    pub parent: Option<ScopeRef>,
    pub children: Vec<ScopeRef>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    pub nodes: Vec<ScopeNode>,
}

impl ScopeTree {
    pub fn node(&self, scope: ScopeRef) -> &ScopeNode {
        &self.nodes[scope.0 as usize]
    }

    pub fn add(&mut self, parent: Option<ScopeRef>, span: Span) -> ScopeRef {
        let id = ScopeRef(self.nodes.len() as u32);
        self.nodes.push(ScopeNode {
            parent,
            children: Vec::new(),
            span,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0 as usize].children.push(id);
        }
        id
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceProgram {
    pub objects: Vec<Object>,
    pub packages: Vec<SourcePackage>,
}

impl SourceProgram {
    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0 as usize]
    }

    pub fn package(&self, path: &str) -> Option<&SourcePackage> {
        self.packages.iter().find(|p| p.path == path)
    }
}

#[derive(Debug, Clone)]
pub struct SourcePackage {
    pub path: String,
    pub name: String,
    /// Directly imported package paths in declaration order.
    pub imports: Vec<String>,
    pub files: Vec<File>,
    pub scopes: ScopeTree,
    pub scope: ScopeRef,
    /// Package-level variable initializers in dependency order.
    pub init_order: Vec<Initializer>,
}

#[derive(Debug, Clone)]
pub struct Initializer {
    /// `None` entries are blank identifiers.
    pub lhs: Vec<Option<ObjectId>>,
    pub rhs: Expr,
}

#[derive(Debug, Clone)]
pub struct File {
    pub name: String,
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Func(FuncDecl),
    Var(Vec<ObjectId>),
    Const(Vec<ObjectId>),
    Type(ObjectId),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub obj: Option<ObjectId>,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct FuncType {
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    /// Scope holding the parameters and the outermost body statements.
    pub scope: Option<ScopeRef>,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub obj: ObjectId,
    pub name: String,
    pub recv: Option<Param>,
    pub func: FuncType,
    /// `None` for functions implemented outside the program.
    pub body: Option<Block>,
    /// Signature including the receiver.
    pub ty: Type,
    pub span: Span,
}

impl FuncDecl {
    pub fn is_method(&self) -> bool {
        self.recv.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct FuncLit {
    pub func: FuncType,
    pub body: Block,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub value: Option<ConstValue>,
    pub addressable: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ElementKey {
    /// Struct field name.
    Field(String),
    /// Array/slice index or map key.
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct Element {
    pub key: Option<ElementKey>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Ident(ObjectId),
    Blank,
    /// A literal; the value lives in [`Expr::value`].
    Lit,
    /// A type in operand position (conversion callee, `make`/`new` argument).
    Type,
    FuncLit(Box<FuncLit>),
    CompositeLit(Vec<Element>),
    Paren(Box<Expr>),
    /// `selection` is `None` for package-qualified identifiers, which carry
    /// their object in `obj` instead.
    Selector {
        x: Box<Expr>,
        name: String,
        selection: Option<Selection>,
        obj: Option<ObjectId>,
    },
    Index {
        x: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        x: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
        max: Option<Box<Expr>>,
    },
    /// `asserted` is `None` for the `x.(type)` of a type switch.
    TypeAssert {
        x: Box<Expr>,
        asserted: Option<Type>,
    },
    Call {
        fun: Box<Expr>,
        args: Vec<Expr>,
        ellipsis: bool,
    },
    Star(Box<Expr>),
    Unary {
        op: UnaryOp,
        x: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        x: Box<Expr>,
        y: Box<Expr>,
    },
}

impl Expr {
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self.unparen().kind, ExprKind::Blank)
    }

    pub fn is_type(&self) -> bool {
        matches!(self.unparen().kind, ExprKind::Type)
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub scope: Option<ScopeRef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Define,
    Op(BinaryOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Break,
    Continue,
    Goto,
    Fallthrough,
}

#[derive(Debug, Clone)]
pub struct ValueSpec {
    pub names: Vec<Option<ObjectId>>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct CaseClause {
    /// Empty for `default`.
    pub list: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub scope: Option<ScopeRef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeCaseClause {
    /// Empty for `default`; `None` entries are `case nil`.
    pub types: Vec<Option<Type>>,
    /// The clause's own instance of the symbolic variable in `v := x.(type)`.
    pub implicit: Option<ObjectId>,
    pub body: Vec<Stmt>,
    pub scope: Option<ScopeRef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum CommOp {
    Send {
        chan: Expr,
        value: Expr,
    },
    /// `<-ch`, `v = <-ch`, `v, ok := <-ch`.
    Recv {
        lhs: Vec<Expr>,
        define: bool,
        chan: Expr,
        /// Type of the receive expression (a tuple when `lhs` has two entries).
        ty: Type,
    },
}

#[derive(Debug, Clone)]
pub struct CommClause {
    /// `None` for `default`.
    pub comm: Option<CommOp>,
    pub body: Vec<Stmt>,
    pub scope: Option<ScopeRef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Empty,
    Expr(Expr),
    VarDecl(Vec<ValueSpec>),
    Send {
        chan: Expr,
        value: Expr,
    },
    IncDec {
        x: Expr,
        inc: bool,
    },
    Assign {
        lhs: Vec<Expr>,
        rhs: Vec<Expr>,
        op: AssignOp,
    },
    Go(Expr),
    Defer(Expr),
    Return(Vec<Expr>),
    Branch {
        kind: BranchKind,
        label: Option<String>,
    },
    Block(Block),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Block,
        els: Option<Box<Stmt>>,
        scope: Option<ScopeRef>,
    },
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        clauses: Vec<CaseClause>,
        scope: Option<ScopeRef>,
    },
    TypeSwitch {
        init: Option<Box<Stmt>>,
        /// The operand `x` of `x.(type)`.
        x: Expr,
        clauses: Vec<TypeCaseClause>,
        scope: Option<ScopeRef>,
    },
    Select(Vec<CommClause>),
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
        scope: Option<ScopeRef>,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        x: Expr,
        body: Block,
        scope: Option<ScopeRef>,
    },
    Labeled {
        label: String,
        stmt: Box<Stmt>,
    },
}

use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum BinaryOp {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Quo,
    #[display("%")]
    Rem,
    #[display("&")]
    And,
    #[display("|")]
    Or,
    #[display("^")]
    Xor,
    #[display("<<")]
    Shl,
    #[display(">>")]
    Shr,
    #[display("&^")]
    AndNot,
    #[display("&&")]
    LAnd,
    #[display("||")]
    LOr,
    #[display("==")]
    Eql,
    #[display("!=")]
    Neq,
    #[display("<")]
    Lss,
    #[display("<=")]
    Leq,
    #[display(">")]
    Gtr,
    #[display(">=")]
    Geq,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eql | BinaryOp::Neq | BinaryOp::Lss | BinaryOp::Leq | BinaryOp::Gtr | BinaryOp::Geq
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LAnd | BinaryOp::LOr)
    }
}

/// Unary operators as they appear in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum UnaryOp {
    #[display("-")]
    Neg,
    #[display("+")]
    Plus,
    #[display("!")]
    Not,
    #[display("^")]
    Xor,
    #[display("&")]
    Addr,
    #[display("<-")]
    Recv,
}

/// Unary operators that survive into the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum UnOpKind {
    #[display("-")]
    Neg,
    #[display("!")]
    Not,
    #[display("^")]
    Xor,
    #[display("*")]
    Deref,
    #[display("<-")]
    Recv,
}

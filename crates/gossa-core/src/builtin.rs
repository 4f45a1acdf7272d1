use derive_more::Display;

/// Predeclared functions, plus the few synthetic ones the builder emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BuiltinKind {
    #[display("append")]
    Append,
    #[display("cap")]
    Cap,
    #[display("close")]
    Close,
    #[display("copy")]
    Copy,
    #[display("delete")]
    Delete,
    #[display("len")]
    Len,
    #[display("make")]
    Make,
    #[display("new")]
    New,
    #[display("panic")]
    Panic,
    #[display("print")]
    Print,
    #[display("println")]
    Println,
    #[display("recover")]
    Recover,
    /// `ssa:wrapnilchk(ptr, typename, method)`: used by pointer wrappers.
    #[display("ssa:wrapnilchk")]
    WrapNilCheck,
}

impl BuiltinKind {
    pub fn from_name(name: &str) -> Option<BuiltinKind> {
        Some(match name {
            "append" => BuiltinKind::Append,
            "cap" => BuiltinKind::Cap,
            "close" => BuiltinKind::Close,
            "copy" => BuiltinKind::Copy,
            "delete" => BuiltinKind::Delete,
            "len" => BuiltinKind::Len,
            "make" => BuiltinKind::Make,
            "new" => BuiltinKind::New,
            "panic" => BuiltinKind::Panic,
            "print" => BuiltinKind::Print,
            "println" => BuiltinKind::Println,
            "recover" => BuiltinKind::Recover,
            "ssa:wrapnilchk" => BuiltinKind::WrapNilCheck,
            _ => return None,
        })
    }

    pub fn all() -> &'static [BuiltinKind] {
        &[
            BuiltinKind::Append,
            BuiltinKind::Cap,
            BuiltinKind::Close,
            BuiltinKind::Copy,
            BuiltinKind::Delete,
            BuiltinKind::Len,
            BuiltinKind::Make,
            BuiltinKind::New,
            BuiltinKind::Panic,
            BuiltinKind::Print,
            BuiltinKind::Println,
            BuiltinKind::Recover,
        ]
    }
}

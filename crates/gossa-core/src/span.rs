pub type FileId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub file: FileId,
    pub lo: u32,
    pub hi: u32,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}-{}", self.file, self.lo, self.hi)
    }
}

impl Span {
    pub fn new(file: FileId, lo: u32, hi: u32) -> Span {
        Span { file, lo, hi }
    }

    pub fn none() -> Span {
        Span::default()
    }

    pub fn is_none(&self) -> bool {
        self.lo == 0 && self.hi == 0
    }

    pub fn contains(&self, other: Span) -> bool {
        self.file == other.file && self.lo <= other.lo && other.hi <= self.hi
    }

    pub fn to(self, end: Span) -> Span {
        Span::new(self.file, self.lo.min(end.lo), self.hi.max(end.hi))
    }
}

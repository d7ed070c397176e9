//! Public types for the object cache facade.

/// Operation kinds as they appear in stats, logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    Get,
    GetMulti,
    Add,
    Set,
    Replace,
    Delete,
    Increment,
    Decrement,
}

impl CacheOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::GetMulti => "get_multi",
            Self::Add => "add",
            Self::Set => "set",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Increment => "increment",
            Self::Decrement => "decrement",
        }
    }
}

impl std::fmt::Display for CacheOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

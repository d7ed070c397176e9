//! Values held by the request-local cache.

use serde_json::Value;

/// Reserved value meaning "treat as absent and re-read the source of truth".
///
/// It is recognised wherever it is read back, local or remote, and never
/// handed to callers as data.
pub const REFRESH_MARKER: &str = "checkthedatabaseplease";

/// One slot of the local cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A known value
    Found(Value),
    /// Confirmed absent (a remote lookup came back empty)
    Missing,
    /// Forced-refresh marker
    Refresh,
}

impl Entry {
    /// Classify a value that came from a caller or a remote read.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        if is_refresh_marker(&value) {
            Self::Refresh
        } else {
            Self::Found(value)
        }
    }

    /// Classify the result of a remote lookup.
    #[must_use]
    pub fn from_remote(value: Option<Value>) -> Self {
        value.map_or(Self::Missing, Self::from_value)
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    #[must_use]
    pub fn is_refresh(&self) -> bool {
        matches!(self, Self::Refresh)
    }

    /// The value a caller may see. Markers read as not found.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing | Self::Refresh => None,
        }
    }

    /// Integer view used by local increments. Only JSON integers count,
    /// matching what the remote tier accepts.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Found(Value::Number(n)) => n.as_i64(),
            _ => None,
        }
    }
}

#[must_use]
pub fn is_refresh_marker(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == REFRESH_MARKER)
}

#[must_use]
pub fn refresh_marker() -> Value {
    Value::String(REFRESH_MARKER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_marker_is_never_data() {
        assert_eq!(Entry::from_value(json!(REFRESH_MARKER)), Entry::Refresh);
        assert_eq!(Entry::from_value(json!(REFRESH_MARKER)).into_value(), None);
        assert!(is_refresh_marker(&refresh_marker()));
    }

    #[test]
    fn test_marker_inside_composite_is_data() {
        let value = json!([REFRESH_MARKER]);
        assert_eq!(Entry::from_value(value.clone()), Entry::Found(value));
    }

    #[test]
    fn test_from_remote() {
        assert!(Entry::from_remote(None).is_missing());
        assert_eq!(Entry::from_remote(Some(json!(false))), Entry::Found(json!(false)));
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(Entry::Found(json!(7)).as_i64(), Some(7));
        assert_eq!(Entry::Found(json!("12")).as_i64(), None);
        assert_eq!(Entry::Found(json!(1.5)).as_i64(), None);
        assert_eq!(Entry::Found(json!("x")).as_i64(), None);
        assert_eq!(Entry::Missing.as_i64(), None);
    }
}

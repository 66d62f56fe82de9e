//! Handler arguments.

use indexmap::IndexMap;
use serde_json::Value;

/// Positional and named arguments for a resource handler.
///
/// The router fills the named arguments from path parameters (already
/// converted, so `{id:int}` arrives as a number) and from route defaults,
/// such as `id: null` on a collection route. A pre-dispatch hook may
/// rewrite either part.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub named: IndexMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// `None` when absent or not an integer.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// `true` when the argument is absent or JSON `null`.
    pub fn is_null(&self, name: &str) -> bool {
        self.get(name).is_none_or(Value::is_null)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.named.insert(name.into(), value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_absent_look_the_same() {
        let mut args = Args::new();
        args.insert("id", Value::Null);
        assert!(args.is_null("id"));
        assert!(args.is_null("missing"));
        args.insert("id", 7);
        assert_eq!(args.get_i64("id"), Some(7));
        assert!(!args.is_null("id"));
    }
}

//! Path-segment converters.
//!
//! A route rule names a converter per parameter: `{id:int}`,
//! `{addr:ip}`, `{code:regex("[a-z]{3}")}`. The router anchors the
//! converter's pattern, matches it against the raw parameter and, on a
//! match, turns the text into the JSON value the resource sees. A failed
//! match means the route does not match at all.
//!
//! The patterns are the contract. They are reproduced exactly and do no
//! validation beyond what the regex encodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;

pub const EMAIL_PATTERN: &str = r"[^@ ]+@[^@ ]+\.[^@ ]+";

pub const IPV4_PATTERN: &str = r"(([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])\.){3}([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])";

pub const CIDR_PATTERN: &str = r"(([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])\.){3}([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])(/([1-2]\d|3[0-2]|\d))";

/// Validates and converts one path parameter.
pub trait Converter: Send + Sync {
    /// The unanchored pattern a raw parameter must match in full.
    fn regex(&self) -> &str;

    /// Turns matched text into the argument handed to the handler.
    fn to_value(&self, raw: &str) -> Value {
        Value::String(raw.to_owned())
    }

    /// `true` when values may contain `/`. Such a parameter must be the
    /// last segment of its rule.
    fn spans_segments(&self) -> bool {
        false
    }
}

/// Matches one segment without `/`. Registered as `string` and `default`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringConverter;

impl Converter for StringConverter {
    fn regex(&self) -> &str { "[^/]+" }
}

/// Digits, converted to a JSON number. Values too large for `u64` stay
/// strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntConverter;

impl Converter for IntConverter {
    fn regex(&self) -> &str { r"\d+" }

    fn to_value(&self, raw: &str) -> Value {
        raw.parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_owned()))
    }
}

/// The rest of the path, slashes included.
#[derive(Clone, Copy, Debug, Default)]
pub struct PathConverter;

impl Converter for PathConverter {
    fn regex(&self) -> &str { "[^/].*?" }
    fn spans_segments(&self) -> bool { true }
}

/// A caller-supplied pattern.
#[derive(Clone, Debug)]
pub struct RegexConverter {
    pattern: String,
}

impl RegexConverter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into() }
    }
}

impl Converter for RegexConverter {
    fn regex(&self) -> &str { &self.pattern }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EmailConverter;

impl Converter for EmailConverter {
    fn regex(&self) -> &str { EMAIL_PATTERN }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Ipv4Converter;

impl Converter for Ipv4Converter {
    fn regex(&self) -> &str { IPV4_PATTERN }
}

/// IPv4 network in `a.b.c.d/len` form.
#[derive(Clone, Copy, Debug, Default)]
pub struct CidrConverter;

impl Converter for CidrConverter {
    fn regex(&self) -> &str { CIDR_PATTERN }
    fn spans_segments(&self) -> bool { true }
}

// ── Registry ──────────────────────────────────────────────────────────────────

type Factory = Arc<dyn Fn(Option<&str>) -> Result<Arc<dyn Converter>, String> + Send + Sync>;

/// Converter names available to route rules.
///
/// A fresh registry knows `default`, `string`, `int` and `path`;
/// [`extend_converters`](crate::extend_converters) adds `regex`, `email`,
/// `ip` and `cidr`.
#[derive(Clone)]
pub struct Converters {
    factories: HashMap<String, Factory>,
}

impl Converters {
    pub fn new() -> Self {
        let mut this = Self { factories: HashMap::new() };
        this.insert("default", StringConverter);
        this.insert("string", StringConverter);
        this.insert("int", IntConverter);
        this.insert("path", PathConverter);
        this
    }

    /// Registers a converter that takes no argument.
    pub fn insert<C>(&mut self, name: &str, converter: C)
    where
        C: Converter + 'static,
    {
        let converter: Arc<dyn Converter> = Arc::new(converter);
        self.factories.insert(
            name.to_owned(),
            Arc::new(move |arg: Option<&str>| match arg {
                None => Ok(Arc::clone(&converter)),
                Some(_) => Err("takes no argument".to_owned()),
            }),
        );
    }

    /// Registers a converter built from the rule's argument, as in
    /// `{code:regex("[a-z]+")}`.
    pub fn insert_with<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(Option<&str>) -> Result<Arc<dyn Converter>, String> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_owned(), Arc::new(factory));
    }

    /// Adds `regex`, `email`, `ip` and `cidr`.
    pub fn extend_restle(&mut self) {
        self.insert_with("regex", |arg| match arg {
            Some(pattern) => Ok(Arc::new(RegexConverter::new(pattern)) as Arc<dyn Converter>),
            None => Err("requires a pattern argument".to_owned()),
        });
        self.insert("email", EmailConverter);
        self.insert("ip", Ipv4Converter);
        self.insert("cidr", CidrConverter);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub(crate) fn build(
        &self,
        rule: &str,
        name: &str,
        arg: Option<&str>,
    ) -> Result<Arc<dyn Converter>, Error> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::route(rule, format!("unknown converter `{name}`")))?;
        factory(arg).map_err(|reason| Error::route(rule, format!("converter `{name}` {reason}")))
    }
}

impl Default for Converters {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Converters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("Converters").field("names", &names).finish()
    }
}

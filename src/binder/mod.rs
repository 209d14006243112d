//! Request configuration binder
//!
//! Callers describe optional request settings as a sparse, loosely typed
//! [`Options`] map (`contentType`, `maxKeys`, `metadata`, ...). Each request
//! type declares a table of [`Binding`]s naming the fields it understands and
//! the setter that writes them; [`bind`] walks that table once and applies
//! whatever is present.
//!
//! # Example
//!
//! ```
//! use s3_adaptor::binder::{bind, Bindable, Binding, Options, Setter};
//!
//! #[derive(Default)]
//! struct Listing {
//!     prefix: Option<String>,
//!     max_keys: Option<i32>,
//! }
//!
//! impl Bindable for Listing {
//!     const FIELDS: &'static [Binding<Self>] = &[
//!         Binding::new("prefix", Setter::Str(|r, v| r.prefix = Some(v))),
//!         Binding::new("maxKeys", Setter::Int(|r, v| r.max_keys = Some(v))),
//!     ];
//! }
//!
//! let options = Options::new().with("prefix", "logs/").with("maxKeys", 2);
//! let mut listing = Listing::default();
//! bind(&mut listing, &options).unwrap();
//!
//! assert_eq!(listing.prefix.as_deref(), Some("logs/"));
//! assert_eq!(listing.max_keys, Some(2));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Binding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("option '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("option '{field}' is not an RFC 3339 timestamp: {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("option '{field}' is out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
}

/// A single option value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Map(HashMap<String, String>),
}

impl OptionValue {
    /// Parse a command-line value: integer, then boolean, then string
    pub fn infer(raw: &str) -> Self {
        if let Ok(int) = raw.parse::<i64>() {
            return OptionValue::Int(int);
        }
        match raw {
            "true" => OptionValue::Bool(true),
            "false" => OptionValue::Bool(false),
            _ => OptionValue::Str(raw.to_string()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::Str(_) => "string",
            OptionValue::Map(_) => "map",
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(value.into())
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<HashMap<String, String>> for OptionValue {
    fn from(value: HashMap<String, String>) -> Self {
        OptionValue::Map(value)
    }
}

/// Sparse set of named request options
///
/// Names not understood by a request type are ignored, so one option set can
/// be reused across operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options {
    fields: BTreeMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<OptionValue> {
        self.fields.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Parse `name=value` pairs; values are typed with [`OptionValue::infer`]
    ///
    /// Returns `None` for a pair without `=`.
    pub fn parse_pair(pair: &str) -> Option<(String, OptionValue)> {
        let (name, raw) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), OptionValue::infer(raw)))
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Options::new();
        for (name, value) in iter {
            options.insert(name, value);
        }
        options
    }
}

/// Typed setter for one field
pub enum Setter<B> {
    Str(fn(&mut B, String)),
    Int(fn(&mut B, i32)),
    Bool(fn(&mut B, bool)),
    Map(fn(&mut B, HashMap<String, String>)),
    /// RFC 3339 string option, parsed before the setter runs
    Timestamp(fn(&mut B, DateTime<Utc>)),
}

impl<B> Setter<B> {
    fn expected(&self) -> &'static str {
        match self {
            Setter::Str(_) | Setter::Timestamp(_) => "string",
            Setter::Int(_) => "int",
            Setter::Bool(_) => "bool",
            Setter::Map(_) => "map",
        }
    }
}

/// Field name paired with its setter
pub struct Binding<B> {
    pub name: &'static str,
    pub setter: Setter<B>,
}

impl<B> Binding<B> {
    pub const fn new(name: &'static str, setter: Setter<B>) -> Self {
        Self { name, setter }
    }
}

/// Request types that accept [`Options`]
pub trait Bindable: Sized + 'static {
    /// Fields this request understands
    const FIELDS: &'static [Binding<Self>];
}

/// Apply `options` to `target` using its own field table
pub fn bind<B: Bindable>(target: &mut B, options: &Options) -> Result<(), BindError> {
    bind_with(target, options, B::FIELDS)
}

/// Apply `options` to `target` using an explicit field table
///
/// Absent fields, empty strings and empty maps leave `target` untouched.
pub fn bind_with<B>(
    target: &mut B,
    options: &Options,
    table: &[Binding<B>],
) -> Result<(), BindError> {
    for binding in table {
        let Some(value) = options.get(binding.name) else {
            continue;
        };
        apply(target, binding, value)?;
    }
    Ok(())
}

fn apply<B>(target: &mut B, binding: &Binding<B>, value: &OptionValue) -> Result<(), BindError> {
    match (&binding.setter, value) {
        (Setter::Str(set), OptionValue::Str(s)) => {
            if !s.is_empty() {
                set(target, s.clone());
            }
        }
        (Setter::Int(set), OptionValue::Int(i)) => {
            let narrowed = i32::try_from(*i).map_err(|_| BindError::OutOfRange {
                field: binding.name,
                value: *i,
            })?;
            set(target, narrowed);
        }
        (Setter::Bool(set), OptionValue::Bool(b)) => set(target, *b),
        (Setter::Map(set), OptionValue::Map(m)) => {
            if !m.is_empty() {
                set(target, m.clone());
            }
        }
        (Setter::Timestamp(set), OptionValue::Str(s)) => {
            if !s.is_empty() {
                let parsed = DateTime::parse_from_rfc3339(s).map_err(|_| {
                    BindError::InvalidTimestamp {
                        field: binding.name,
                        value: s.clone(),
                    }
                })?;
                set(target, parsed.with_timezone(&Utc));
            }
        }
        (setter, other) => {
            return Err(BindError::TypeMismatch {
                field: binding.name,
                expected: setter.expected(),
                found: other.type_name(),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Probe {
        name: Option<String>,
        count: Option<i32>,
        flag: Option<bool>,
        tags: Option<HashMap<String, String>>,
        since: Option<DateTime<Utc>>,
    }

    impl Bindable for Probe {
        const FIELDS: &'static [Binding<Self>] = &[
            Binding::new("name", Setter::Str(|p, v| p.name = Some(v))),
            Binding::new("count", Setter::Int(|p, v| p.count = Some(v))),
            Binding::new("flag", Setter::Bool(|p, v| p.flag = Some(v))),
            Binding::new("tags", Setter::Map(|p, v| p.tags = Some(v))),
            Binding::new("since", Setter::Timestamp(|p, v| p.since = Some(v))),
        ];
    }

    #[test]
    fn test_bind_applies_present_fields_only() {
        let options = Options::new().with("name", "report.csv").with("flag", true);
        let mut probe = Probe::default();
        bind(&mut probe, &options).unwrap();

        assert_eq!(probe.name.as_deref(), Some("report.csv"));
        assert_eq!(probe.flag, Some(true));
        assert!(probe.count.is_none());
        assert!(probe.tags.is_none());
    }

    #[test]
    fn test_bind_skips_empty_values() {
        let options = Options::new()
            .with("name", "")
            .with("tags", HashMap::<String, String>::new());
        let mut probe = Probe::default();
        bind(&mut probe, &options).unwrap();

        assert!(probe.name.is_none());
        assert!(probe.tags.is_none());
    }

    #[test]
    fn test_bind_ignores_unknown_names() {
        let options = Options::new().with("unrelated", 42);
        let mut probe = Probe::default();
        assert!(bind(&mut probe, &options).is_ok());
    }

    #[test]
    fn test_bind_type_mismatch() {
        let options = Options::new().with("count", "ten");
        let mut probe = Probe::default();
        let err = bind(&mut probe, &options).unwrap_err();

        assert_eq!(
            err,
            BindError::TypeMismatch {
                field: "count",
                expected: "int",
                found: "string"
            }
        );
    }

    #[test]
    fn test_bind_int_out_of_range() {
        let options = Options::new().with("count", i64::MAX);
        let mut probe = Probe::default();
        assert!(matches!(
            bind(&mut probe, &options),
            Err(BindError::OutOfRange { field: "count", .. })
        ));
    }

    #[test]
    fn test_bind_timestamp() {
        let options = Options::new().with("since", "2024-03-01T12:00:00Z");
        let mut probe = Probe::default();
        bind(&mut probe, &options).unwrap();
        assert_eq!(probe.since.unwrap().timestamp(), 1_709_294_400);

        let options = Options::new().with("since", "yesterday");
        let mut probe = Probe::default();
        assert!(matches!(
            bind(&mut probe, &options),
            Err(BindError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_infer_values() {
        assert_eq!(OptionValue::infer("25"), OptionValue::Int(25));
        assert_eq!(OptionValue::infer("true"), OptionValue::Bool(true));
        assert_eq!(
            OptionValue::infer("text/plain"),
            OptionValue::Str("text/plain".into())
        );
    }

    #[test]
    fn test_parse_pair() {
        let (name, value) = Options::parse_pair("maxKeys=2").unwrap();
        assert_eq!(name, "maxKeys");
        assert_eq!(value, OptionValue::Int(2));

        let (_, value) = Options::parse_pair("range=bytes=0-9").unwrap();
        assert_eq!(value, OptionValue::Str("bytes=0-9".into()));

        assert!(Options::parse_pair("no-equals").is_none());
        assert!(Options::parse_pair("=value").is_none());
    }

    #[test]
    fn test_options_from_json() {
        let options: Options = serde_json::from_str(
            r#"{"contentType": "text/plain", "maxKeys": 5, "fetchOwner": false,
                "metadata": {"owner": "ops"}}"#,
        )
        .unwrap();

        assert_eq!(options.len(), 4);
        assert_eq!(options.get("maxKeys"), Some(&OptionValue::Int(5)));
        assert_eq!(options.get("fetchOwner"), Some(&OptionValue::Bool(false)));
        assert!(matches!(options.get("metadata"), Some(OptionValue::Map(_))));
    }
}

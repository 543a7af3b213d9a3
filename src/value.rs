//! Provides a dynamic value type abstraction.
//!
//! This module gives access to a dynamically typed value which is used by
//! the template engine during evaluation.  Host data enters the engine by
//! being converted into a [`Value`] at the context boundary, either through
//! the [`From`] implementations, through [`Value::from_serializable`] or by
//! implementing the [`Record`] or [`Callable`] traits for dynamic behavior.
//!
//! # Converting Values
//!
//! Values are typically created via the [`From`] trait:
//!
//! ```
//! # use djinn::value::Value;
//! let value = Value::from(42);
//! ```
//!
//! For arbitrary serializable host data the serde bridge performs the
//! conversion into the engine's tagged representation:
//!
//! ```
//! # use djinn::value::Value;
//! let value = Value::from_serializable(&[1, 2, 3]);
//! ```
//!
//! # Safety flag
//!
//! Every value carries a `safe` flag indicating that it is pre-escaped.
//! Safe values are not transformed again by the autoescape machinery.  The
//! flag is set by the `safe` filter, by [`Value::from_safe_string`] and by
//! [`Value::mark_safe`], and it travels through filters and callables that
//! return values.
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::args::Args;
use crate::context::State;
use crate::error::{Error, ErrorKind};
use crate::key::Key;
use crate::template::CompiledTemplate;

/// Describes the kind of a value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Kind {
    /// The nil value.
    Nil,
    /// A boolean.
    Bool,
    /// An integer of any width.
    Integer,
    /// A floating point number.
    Float,
    /// A string.
    String,
    /// A byte blob.
    Bytes,
    /// A point in time.
    Time,
    /// A sequence of values.
    Seq,
    /// A map of keys to values.
    Map,
    /// A struct-like host object.
    Record,
    /// A callable host object.
    Function,
    /// A template handle.
    Template,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Nil => "nil",
            Kind::Bool => "bool",
            Kind::Integer => "integer",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Time => "time",
            Kind::Seq => "seq",
            Kind::Map => "map",
            Kind::Record => "record",
            Kind::Function => "function",
            Kind::Template => "template",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    None,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(Arc<str>),
    Bytes(Arc<Vec<u8>>),
    Time(DateTime<Utc>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<BTreeMap<Key<'static>, Value>>),
    Record(Arc<dyn Record>),
    Callable(Arc<dyn Callable>),
    Template(Arc<CompiledTemplate>),
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value {
    pub(crate) repr: ValueRepr,
    pub(crate) safe: bool,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ValueRepr::None => write!(f, "none"),
            ValueRepr::Bool(v) => fmt::Debug::fmt(v, f),
            ValueRepr::I64(v) => fmt::Debug::fmt(v, f),
            ValueRepr::U64(v) => fmt::Debug::fmt(v, f),
            ValueRepr::F64(v) => fmt::Debug::fmt(v, f),
            ValueRepr::String(v) => fmt::Debug::fmt(v, f),
            ValueRepr::Bytes(v) => write!(f, "{:?}", v),
            ValueRepr::Time(v) => write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ValueRepr::Seq(v) => fmt::Debug::fmt(v, f),
            ValueRepr::Map(v) => fmt::Debug::fmt(v, f),
            ValueRepr::Record(v) => fmt::Debug::fmt(v, f),
            ValueRepr::Callable(v) => write!(f, "<function {}>", v.name()),
            ValueRepr::Template(v) => write!(f, "<template {}>", v.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ValueRepr::None => Ok(()),
            ValueRepr::Bool(true) => write!(f, "True"),
            ValueRepr::Bool(false) => write!(f, "False"),
            ValueRepr::I64(v) => write!(f, "{}", v),
            ValueRepr::U64(v) => write!(f, "{}", v),
            ValueRepr::F64(v) => write!(f, "{:.6}", v),
            ValueRepr::String(v) => write!(f, "{}", v),
            ValueRepr::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            ValueRepr::Time(v) => write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ValueRepr::Record(v) => fmt::Display::fmt(v, f),
            ValueRepr::Callable(v) => write!(f, "<function {}>", v.name()),
            ValueRepr::Template(v) => write!(f, "<template {}>", v.name()),
            ValueRepr::Seq(_) => write!(f, "<seq>"),
            ValueRepr::Map(_) => write!(f, "<map>"),
        }
    }
}

impl Default for Value {
    fn default() -> Value {
        Value::none()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        // numeric comparison promotes: a float on either side compares
        // as float, two integer kinds compare as i64
        if self.is_number() && other.is_number() {
            if self.is_float() || other.is_float() {
                return self.as_float() == other.as_float();
            }
            return self.as_integer() == other.as_integer();
        }
        if let (Some(a), Some(b)) = (self.as_time(), other.as_time()) {
            return a == b;
        }
        match (&self.repr, &other.repr) {
            (ValueRepr::None, ValueRepr::None) => true,
            (ValueRepr::None, _) | (_, ValueRepr::None) => false,
            (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
            (ValueRepr::String(a), ValueRepr::String(b)) => a == b,
            (ValueRepr::Bytes(a), ValueRepr::Bytes(b)) => a == b,
            (ValueRepr::Seq(a), ValueRepr::Seq(b)) => a == b,
            (ValueRepr::Map(a), ValueRepr::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Value {
    /// Creates a nil value.
    pub fn none() -> Value {
        Value {
            repr: ValueRepr::None,
            safe: false,
        }
    }

    /// Creates a value from a string that is already escaped.
    ///
    /// Safe strings are exempt from autoescaping.
    pub fn from_safe_string(value: String) -> Value {
        Value {
            repr: ValueRepr::String(Arc::from(value)),
            safe: true,
        }
    }

    /// Creates a value from a [`Record`] implementation.
    pub fn from_record<T: Record + 'static>(value: T) -> Value {
        Value {
            repr: ValueRepr::Record(Arc::new(value)),
            safe: false,
        }
    }

    /// Creates a value from a [`Callable`] implementation.
    pub fn from_callable<T: Callable + 'static>(value: T) -> Value {
        Value {
            repr: ValueRepr::Callable(Arc::new(value)),
            safe: false,
        }
    }

    pub(crate) fn from_template(tmpl: Arc<CompiledTemplate>) -> Value {
        Value {
            repr: ValueRepr::Template(tmpl),
            safe: false,
        }
    }

    /// Returns a copy of this value with the safe flag set.
    pub fn mark_safe(self) -> Value {
        Value { safe: true, ..self }
    }

    /// Returns `true` if this value is flagged as pre-escaped.
    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> Kind {
        match self.repr {
            ValueRepr::None => Kind::Nil,
            ValueRepr::Bool(_) => Kind::Bool,
            ValueRepr::I64(_) | ValueRepr::U64(_) => Kind::Integer,
            ValueRepr::F64(_) => Kind::Float,
            ValueRepr::String(_) => Kind::String,
            ValueRepr::Bytes(_) => Kind::Bytes,
            ValueRepr::Time(_) => Kind::Time,
            ValueRepr::Seq(_) => Kind::Seq,
            ValueRepr::Map(_) => Kind::Map,
            ValueRepr::Record(_) => Kind::Record,
            ValueRepr::Callable(_) => Kind::Function,
            ValueRepr::Template(_) => Kind::Template,
        }
    }

    /// Checks whether the value is a string.
    ///
    /// Template handles count as strings since they evaluate to text.
    pub fn is_string(&self) -> bool {
        matches!(self.repr, ValueRepr::String(_) | ValueRepr::Template(_))
    }

    /// Checks whether the value is a bool.
    pub fn is_bool(&self) -> bool {
        matches!(self.repr, ValueRepr::Bool(_))
    }

    /// Checks whether the value is an integer of any width.
    pub fn is_integer(&self) -> bool {
        matches!(self.repr, ValueRepr::I64(_) | ValueRepr::U64(_))
    }

    /// Checks whether the value is a float.
    pub fn is_float(&self) -> bool {
        matches!(self.repr, ValueRepr::F64(_))
    }

    /// Checks whether the value is an integer or a float.
    pub fn is_number(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Checks whether the value is a point in time.
    pub fn is_time(&self) -> bool {
        matches!(self.repr, ValueRepr::Time(_))
    }

    /// Checks whether the value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self.repr, ValueRepr::None)
    }

    /// Checks whether the value is a scalar (string, number, bool or a
    /// template handle).
    pub fn is_scalar(&self) -> bool {
        self.is_string() || self.is_number() || self.is_bool()
    }

    /// Checks whether the value holds a template handle.
    pub fn is_template(&self) -> bool {
        matches!(self.repr, ValueRepr::Template(_))
    }

    /// Checks whether the value can be iterated over.
    pub fn is_iterable(&self) -> bool {
        matches!(
            self.repr,
            ValueRepr::Seq(_) | ValueRepr::Map(_) | ValueRepr::String(_)
        )
    }

    /// Checks whether the value is a map.
    pub fn is_map(&self) -> bool {
        matches!(self.repr, ValueRepr::Map(_))
    }

    /// Checks whether the value is a record.
    pub fn is_record(&self) -> bool {
        matches!(self.repr, ValueRepr::Record(_))
    }

    /// Checks whether the value is a sequence.
    pub fn is_seq(&self) -> bool {
        matches!(self.repr, ValueRepr::Seq(_))
    }

    /// Checks whether the value is callable.
    pub fn is_callable(&self) -> bool {
        matches!(self.repr, ValueRepr::Callable(_))
    }

    /// If the value is a string, returns it.
    pub fn as_str(&self) -> Option<&str> {
        match self.repr {
            ValueRepr::String(ref s) => Some(s),
            _ => None,
        }
    }

    /// Returns the underlying value as an integer, converting if necessary.
    ///
    /// Strings accept `0x`/`0b` prefixed and leading-zero octal notation and
    /// otherwise parse as a decimal float which is truncated.  Unsigned
    /// values beyond the signed range saturate.  Unconvertible values
    /// produce `0`.
    pub fn as_integer(&self) -> i64 {
        match self.repr {
            ValueRepr::I64(v) => v,
            ValueRepr::U64(v) => i64::try_from(v).unwrap_or(i64::MAX),
            ValueRepr::F64(v) => v as i64,
            ValueRepr::String(ref s) => parse_str_integer(s),
            _ => {
                log::debug!("integer coercion not available for kind {}", self.kind());
                0
            }
        }
    }

    /// Returns the underlying value as a float, converting if necessary.
    pub fn as_float(&self) -> f64 {
        match self.repr {
            ValueRepr::I64(v) => v as f64,
            ValueRepr::U64(v) => v as f64,
            ValueRepr::F64(v) => v,
            ValueRepr::String(ref s) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => {
                log::debug!("float coercion not available for kind {}", self.kind());
                0.0
            }
        }
    }

    /// Returns the underlying value as a bool.
    ///
    /// This is strict: only bool values convert.  For truthiness use
    /// [`is_true`](Value::is_true).
    pub fn as_bool(&self) -> bool {
        match self.repr {
            ValueRepr::Bool(v) => v,
            _ => {
                log::debug!("bool coercion not available for kind {}", self.kind());
                false
            }
        }
    }

    /// Returns the underlying value as a point in time if it is one.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self.repr {
            ValueRepr::Time(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn as_seq(&self) -> Option<&[Value]> {
        match self.repr {
            ValueRepr::Seq(ref items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn as_map(&self) -> Option<&BTreeMap<Key<'static>, Value>> {
        match self.repr {
            ValueRepr::Map(ref map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn as_record(&self) -> Option<&dyn Record> {
        match self.repr {
            ValueRepr::Record(ref rec) => Some(&**rec),
            _ => None,
        }
    }

    pub(crate) fn as_callable(&self) -> Option<&Arc<dyn Callable>> {
        match self.repr {
            ValueRepr::Callable(ref f) => Some(f),
            _ => None,
        }
    }

    /// Evaluates the value the Pythonic way.
    ///
    /// Truthy are: non-zero numbers, non-empty containers and strings,
    /// `true`, and any record.  Everything else is false.
    pub fn is_true(&self) -> bool {
        match self.repr {
            ValueRepr::None => false,
            ValueRepr::Bool(v) => v,
            ValueRepr::I64(v) => v != 0,
            ValueRepr::U64(v) => v != 0,
            ValueRepr::F64(v) => v != 0.0,
            ValueRepr::String(ref s) => !s.is_empty(),
            ValueRepr::Bytes(ref b) => !b.is_empty(),
            ValueRepr::Time(_) => true,
            ValueRepr::Seq(ref items) => !items.is_empty(),
            ValueRepr::Map(ref map) => !map.is_empty(),
            ValueRepr::Record(_) => true,
            ValueRepr::Callable(_) => true,
            ValueRepr::Template(_) => true,
        }
    }

    /// Returns the length of the contained value for containers and
    /// strings (in code points).
    pub fn len(&self) -> Option<usize> {
        match self.repr {
            ValueRepr::String(ref s) => Some(s.chars().count()),
            ValueRepr::Bytes(ref b) => Some(b.len()),
            ValueRepr::Seq(ref items) => Some(items.len()),
            ValueRepr::Map(ref map) => Some(map.len()),
            ValueRepr::Record(ref rec) => Some(rec.fields().len()),
            _ => None,
        }
    }

    /// Compares two values, returning their ordering.
    ///
    /// Numbers compare with promotion (float wins over integer), times by
    /// instant, bools with `false` first, sequences and maps by length.
    /// Nil sorts before everything else.  All remaining combinations fall
    /// back to case-sensitive string comparison of the display forms.
    pub fn compare(&self, other: &Value) -> Ordering {
        self.compare_impl(other, true)
    }

    /// Like [`compare`](Value::compare) but the string fallback ignores case.
    pub fn compare_case_fold(&self, other: &Value) -> Ordering {
        self.compare_impl(other, false)
    }

    fn compare_impl(&self, other: &Value, case_sensitive: bool) -> Ordering {
        if self.is_number() && other.is_number() {
            if self.is_float() || other.is_float() {
                return self
                    .as_float()
                    .partial_cmp(&other.as_float())
                    .unwrap_or(Ordering::Equal);
            }
            return self.as_integer().cmp(&other.as_integer());
        }
        if let (Some(a), Some(b)) = (self.as_time(), other.as_time()) {
            return a.cmp(&b);
        }
        match (&self.repr, &other.repr) {
            (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a.cmp(b),
            (ValueRepr::Seq(a), ValueRepr::Seq(b)) => a.len().cmp(&b.len()),
            (ValueRepr::Map(a), ValueRepr::Map(b)) => a.len().cmp(&b.len()),
            (ValueRepr::None, ValueRepr::None) => Ordering::Equal,
            (ValueRepr::None, _) => Ordering::Less,
            (_, ValueRepr::None) => Ordering::Greater,
            _ => {
                let a = self.to_string();
                let b = other.to_string();
                if case_sensitive {
                    a.cmp(&b)
                } else {
                    a.to_lowercase().cmp(&b.to_lowercase())
                }
            }
        }
    }

    /// Checks whether the value contains another value.
    ///
    /// Strings match substrings, maps check key presence, sequences check
    /// element equality and records check field presence.
    pub fn contains(&self, other: &Value) -> bool {
        match &self.repr {
            ValueRepr::String(s) => {
                if let Some(needle) = other.as_str() {
                    s.contains(needle)
                } else {
                    s.contains(&other.to_string())
                }
            }
            ValueRepr::Map(map) => match Key::try_from(other.clone()) {
                Ok(key) => map.contains_key(&key),
                Err(_) => false,
            },
            ValueRepr::Seq(items) => items.iter().any(|item| item == other),
            ValueRepr::Record(rec) => rec.get_field(&other.to_string()).is_some(),
            _ => {
                log::debug!("containment check not available for kind {}", self.kind());
                false
            }
        }
    }

    /// Returns the value stored under a string key if the value is a map.
    pub fn element(&self, name: &str) -> Value {
        match &self.repr {
            ValueRepr::Map(map) => map
                .get(&Key::String(Arc::from(name)))
                .cloned()
                .unwrap_or_default(),
            _ => Value::none(),
        }
    }

    /// Like [`element`](Value::element) but follows dot separated paths
    /// through nested maps, eg. `attribute("foo.bar")`.
    pub fn attribute(&self, path: &str) -> Value {
        let mut rv = self.clone();
        for part in path.split('.') {
            if !rv.is_map() {
                return Value::none();
            }
            rv = rv.element(part);
        }
        rv
    }

    /// Retrieves a map entry, record field or sequence element by key.
    ///
    /// The key is converted to a form the container understands when
    /// feasible; inaccessible or missing entries yield nil.
    pub fn get_item(&self, key: &Value) -> Value {
        if key.is_nil() {
            return Value::none();
        }
        match &self.repr {
            ValueRepr::Map(map) => Key::try_from(key.clone())
                .ok()
                .and_then(|k| map.get(&k).cloned())
                .unwrap_or_default(),
            ValueRepr::Record(rec) => rec.get_field(&key.to_string()).unwrap_or_default(),
            ValueRepr::Seq(items) => {
                if key.is_number() {
                    usize::try_from(key.as_integer())
                        .ok()
                        .and_then(|idx| items.get(idx).cloned())
                        .unwrap_or_default()
                } else {
                    Value::none()
                }
            }
            _ => Value::none(),
        }
    }

    /// Iterates over a map, sequence or string.
    ///
    /// The callback receives the zero based index, the total item count,
    /// the key (or the item itself for sequences and strings) and, for
    /// maps only, the value.  Returning `false` stops the iteration.  The
    /// `empty` callback runs when there is nothing to iterate.
    pub fn iterate<F, E>(&self, f: F, empty: E)
    where
        F: FnMut(usize, usize, &Value, Option<&Value>) -> bool,
        E: FnOnce(),
    {
        self.iterate_order(f, empty, false, false)
    }

    /// Behaves like [`iterate`](Value::iterate) but can sort items with the
    /// comparison order used by [`compare`](Value::compare) and iterate in
    /// reverse.  The reversal applies after the optional sort.
    pub fn iterate_order<F, E>(&self, mut f: F, empty: E, reverse: bool, sorted: bool)
    where
        F: FnMut(usize, usize, &Value, Option<&Value>) -> bool,
        E: FnOnce(),
    {
        let mut items: Vec<(Value, Option<Value>)> = match &self.repr {
            // map iteration is in key order; insertion order is not
            // observable
            ValueRepr::Map(map) => map
                .iter()
                .map(|(k, v)| (Value::from(k.clone()), Some(v.clone())))
                .collect(),
            ValueRepr::Seq(seq) => seq.iter().map(|item| (item.clone(), None)).collect(),
            ValueRepr::String(s) => s
                .chars()
                .map(|c| (Value::from(c.to_string()), None))
                .collect(),
            _ => {
                log::debug!("iteration not available for kind {}", self.kind());
                empty();
                return;
            }
        };

        if sorted {
            items.sort_by(|a, b| a.0.compare(&b.0));
        }
        if reverse {
            items.reverse();
        }

        if items.is_empty() {
            empty();
            return;
        }

        let count = items.len();
        for (idx, (key, value)) in items.iter().enumerate() {
            if !f(idx, count, key, value.as_ref()) {
                return;
            }
        }
    }

    /// Makes a shallow copy of the value.
    ///
    /// Sequences and maps are rebuilt sharing their element values, so a
    /// filter can reorder or extend the copy without touching caller data.
    pub fn shallow_copy(&self) -> Value {
        let repr = match &self.repr {
            ValueRepr::Seq(items) => ValueRepr::Seq(Arc::new(items.as_ref().clone())),
            ValueRepr::Map(map) => ValueRepr::Map(Arc::new(map.as_ref().clone())),
            other => other.clone(),
        };
        Value {
            repr,
            safe: self.safe,
        }
    }
}

fn parse_str_integer(s: &str) -> i64 {
    let s = s.trim();
    let bytes = s.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        match bytes[1] {
            b'x' | b'X' => return i64::from_str_radix(&s[2..], 16).unwrap_or(0),
            b'b' | b'B' => return i64::from_str_radix(&s[2..], 2).unwrap_or(0),
            b'o' | b'O' => return i64::from_str_radix(&s[2..], 8).unwrap_or(0),
            b'0'..=b'9' => return i64::from_str_radix(&s[1..], 8).unwrap_or(0),
            _ => {}
        }
    }
    s.parse::<f64>().map(|f| f as i64).unwrap_or(0)
}

impl From<ValueRepr> for Value {
    #[inline(always)]
    fn from(repr: ValueRepr) -> Value {
        Value { repr, safe: false }
    }
}

impl<'a> From<&'a str> for Value {
    #[inline(always)]
    fn from(val: &'a str) -> Self {
        ValueRepr::String(Arc::from(val)).into()
    }
}

impl From<String> for Value {
    #[inline(always)]
    fn from(val: String) -> Self {
        ValueRepr::String(Arc::from(val)).into()
    }
}

impl<'a> From<Cow<'a, str>> for Value {
    #[inline(always)]
    fn from(val: Cow<'a, str>) -> Self {
        match val {
            Cow::Borrowed(x) => x.into(),
            Cow::Owned(x) => x.into(),
        }
    }
}

impl<'a> From<&'a [u8]> for Value {
    #[inline(always)]
    fn from(val: &'a [u8]) -> Self {
        ValueRepr::Bytes(Arc::new(val.to_vec())).into()
    }
}

impl From<()> for Value {
    #[inline(always)]
    fn from(_: ()) -> Self {
        ValueRepr::None.into()
    }
}

impl From<DateTime<Utc>> for Value {
    #[inline(always)]
    fn from(val: DateTime<Utc>) -> Self {
        ValueRepr::Time(val).into()
    }
}

impl<'a> From<Key<'a>> for Value {
    fn from(val: Key<'a>) -> Self {
        match val {
            Key::Bool(val) => val.into(),
            Key::I64(val) => val.into(),
            Key::String(val) => ValueRepr::String(val).into(),
            Key::Str(val) => val.into(),
        }
    }
}

impl<K: Into<Key<'static>>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(val: BTreeMap<K, V>) -> Self {
        ValueRepr::Map(Arc::new(
            val.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
        .into()
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        ValueRepr::Seq(Arc::new(val.into_iter().map(|x| x.into()).collect())).into()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => Value::none(),
        }
    }
}

macro_rules! value_from {
    ($src:ty, $dst:ident) => {
        impl From<$src> for Value {
            #[inline(always)]
            fn from(val: $src) -> Self {
                ValueRepr::$dst(val as _).into()
            }
        }
    };
}

value_from!(bool, Bool);
value_from!(u8, U64);
value_from!(u16, U64);
value_from!(u32, U64);
value_from!(u64, U64);
value_from!(i8, I64);
value_from!(i16, I64);
value_from!(i32, I64);
value_from!(i64, I64);
value_from!(f32, F64);
value_from!(f64, F64);

impl From<usize> for Value {
    fn from(val: usize) -> Self {
        Value::from(val as u64)
    }
}

impl From<char> for Value {
    fn from(val: char) -> Self {
        Value::from(val.to_string())
    }
}

/// A dynamic struct-like host object.
///
/// The engine uses the [`Value`] type to represent values it knows about.
/// Host types with named fields and methods opt into the engine by
/// implementing this trait and converting with
/// [`Value::from_record`].  Capabilities the engine exercises are field
/// lookup (with an optional case-insensitive fallback) and method
/// invocation.  Records need to implement [`Display`](std::fmt::Display)
/// which the engine uses as the string form.
pub trait Record: fmt::Display + fmt::Debug + Send + Sync {
    /// Looks up a field by name.  Missing fields return `None`.
    fn get_field(&self, name: &str) -> Option<Value>;

    /// The field names known to exist on this record.
    ///
    /// Used for length, containment checks and the case-insensitive
    /// fallback.  Returning an empty vector is fine if enumeration is not
    /// possible.
    fn fields(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Case-insensitive field lookup fallback.
    ///
    /// The default implementation scans [`fields`](Record::fields).
    fn get_field_fold(&self, name: &str) -> Option<Value> {
        let lower = name.to_lowercase();
        for field in self.fields() {
            if field.to_lowercase() == lower {
                return self.get_field(field);
            }
        }
        None
    }

    /// Checks whether the record exposes a method with the given name.
    fn has_method(&self, _name: &str) -> bool {
        false
    }

    /// Invokes a method on the record.
    fn call_method(&self, _state: &State, name: &str, _args: Args) -> Result<Value, Error> {
        Err(Error::new(
            ErrorKind::TypeError,
            format!("record has no method named {}", name),
        ))
    }
}

/// A host provided function value.
///
/// Callables receive the per-render [`State`] (which exposes the public
/// scope, the translator and the template set) and the evaluated
/// arguments.  Errors returned here abort the evaluation of the
/// surrounding expression.
pub trait Callable: fmt::Debug + Send + Sync {
    /// Invokes the callable.
    fn call(&self, state: &State, args: Args) -> Result<Value, Error>;

    /// A diagnostic name for error messages.
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Helper trait representing valid filter and function arguments.
///
/// Since it's more convenient to write filters and functions with concrete
/// types instead of values, this helper trait exists to automatically
/// perform this conversion.  It is implemented for tuples up to an arity
/// of four parameters.
pub trait FunctionArgs: Sized {
    /// Converts to function arguments from a slice of values.
    fn from_values(values: Vec<Value>) -> Result<Self, Error>;
}

/// A trait implemented by all filter and function argument types.
///
/// This is the companion to [`FunctionArgs`].  It's passed an
/// `Option<Value>` where `Some` means the argument was provided and `None`
/// that it was not, which is how optional arguments are implemented.
pub trait ArgType: Sized {
    /// Converts an optionally provided value into the argument type.
    fn from_value(value: Option<Value>) -> Result<Self, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<$($name: ArgType,)*> FunctionArgs for ($($name,)*) {
            fn from_values(values: Vec<Value>) -> Result<Self, Error> {
                #![allow(non_snake_case, unused)]
                let arg_count = 0 $(
                    + { let $name = (); 1 }
                )*;
                if values.len() > arg_count {
                    return Err(Error::new(
                        ErrorKind::InvalidParameterCount,
                        "received unexpected extra arguments",
                    ));
                }
                {
                    let mut idx = 0;
                    $(
                        let $name = ArgType::from_value(values.get(idx).cloned())?;
                        idx += 1;
                    )*
                    Ok(( $($name,)* ))
                }
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }

macro_rules! primitive_try_from {
    ($ty:ident, {
        $($pat:pat => $expr:expr,)*
    }) => {
        impl TryFrom<Value> for $ty {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                let opt = match value.repr {
                    $($pat => TryFrom::try_from($expr).ok(),)*
                    _ => None
                };
                opt.ok_or_else(|| {
                    Error::new(ErrorKind::TypeError, concat!("cannot convert to ", stringify!($ty)))
                })
            }
        }

        impl ArgType for $ty {
            fn from_value(value: Option<Value>) -> Result<Self, Error> {
                match value {
                    Some(value) => TryFrom::try_from(value),
                    None => Err(Error::new(ErrorKind::InvalidParameterCount, "missing argument"))
                }
            }
        }

        impl ArgType for Option<$ty> {
            fn from_value(value: Option<Value>) -> Result<Self, Error> {
                match value {
                    Some(value) => {
                        if value.is_nil() {
                            Ok(None)
                        } else {
                            TryFrom::try_from(value).map(Some)
                        }
                    }
                    None => Ok(None),
                }
            }
        }
    }
}

macro_rules! primitive_int_try_from {
    ($ty:ident) => {
        primitive_try_from!($ty, {
            ValueRepr::I64(val) => val,
            ValueRepr::U64(val) => val,
        });
    };
}

primitive_int_try_from!(u8);
primitive_int_try_from!(u16);
primitive_int_try_from!(u32);
primitive_int_try_from!(u64);
primitive_int_try_from!(i8);
primitive_int_try_from!(i16);
primitive_int_try_from!(i32);
primitive_int_try_from!(i64);
primitive_int_try_from!(usize);

primitive_try_from!(bool, {
    ValueRepr::Bool(val) => val,
});

primitive_try_from!(f64, {
    ValueRepr::F64(val) => val,
});

macro_rules! infallible_conversion {
    ($ty:ty) => {
        impl ArgType for $ty {
            fn from_value(value: Option<Value>) -> Result<Self, Error> {
                match value {
                    Some(value) => Ok(value.into()),
                    None => Err(Error::new(
                        ErrorKind::InvalidParameterCount,
                        "missing argument",
                    )),
                }
            }
        }

        impl ArgType for Option<$ty> {
            fn from_value(value: Option<Value>) -> Result<Self, Error> {
                match value {
                    Some(value) => {
                        if value.is_nil() {
                            Ok(None)
                        } else {
                            Ok(Some(value.into()))
                        }
                    }
                    None => Ok(None),
                }
            }
        }
    };
}

infallible_conversion!(String);
infallible_conversion!(Value);

impl From<Value> for String {
    fn from(val: Value) -> Self {
        val.to_string()
    }
}

impl<T: ArgType> ArgType for Vec<T> {
    fn from_value(value: Option<Value>) -> Result<Self, Error> {
        match value {
            None => Ok(Vec::new()),
            Some(value) => {
                let items = value.as_seq().ok_or_else(|| {
                    Error::new(ErrorKind::TypeError, "cannot convert value into list")
                })?;
                let mut rv = Vec::with_capacity(items.len());
                for item in items {
                    rv.push(ArgType::from_value(Some(item.clone()))?);
                }
                Ok(rv)
            }
        }
    }
}

enum CoerceResult {
    I64(i64, i64),
    F64(f64, f64),
}

fn coerce(a: &Value, b: &Value) -> Option<CoerceResult> {
    if !a.is_number() || !b.is_number() {
        return None;
    }
    if a.is_float() || b.is_float() {
        Some(CoerceResult::F64(a.as_float(), b.as_float()))
    } else {
        Some(CoerceResult::I64(a.as_integer(), b.as_integer()))
    }
}

macro_rules! math_binop {
    ($name:ident, $int:ident, $float:tt) => {
        pub(crate) fn $name(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
            match coerce(lhs, rhs) {
                Some(CoerceResult::I64(a, b)) => a.$int(b).map(Value::from).ok_or_else(|| {
                    Error::new(ErrorKind::TypeError, "integer operation overflowed")
                }),
                Some(CoerceResult::F64(a, b)) => Ok((a $float b).into()),
                None => Err(Error::new(
                    ErrorKind::TypeError,
                    concat!(
                        "tried to use ",
                        stringify!($float),
                        " operator on unsupported types"
                    ),
                )),
            }
        }
    };
}

math_binop!(sub, checked_sub, -);
math_binop!(mul, checked_mul, *);

/// Implements a binary `add` operation on values.
///
/// Two strings concatenate, numbers add with promotion.
pub(crate) fn add(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
        return Ok(Value::from(format!("{}{}", a, b)));
    }
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => a
            .checked_add(b)
            .map(Value::from)
            .ok_or_else(|| Error::new(ErrorKind::TypeError, "integer operation overflowed")),
        Some(CoerceResult::F64(a, b)) => Ok((a + b).into()),
        None => Err(Error::new(
            ErrorKind::TypeError,
            "tried to use + operator on unsupported types",
        )),
    }
}

pub(crate) fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => a
            .checked_div(b)
            .map(Value::from)
            .ok_or_else(|| Error::new(ErrorKind::TypeError, "division by zero")),
        Some(CoerceResult::F64(a, b)) => Ok((a / b).into()),
        None => Err(Error::new(
            ErrorKind::TypeError,
            "tried to use / operator on unsupported types",
        )),
    }
}

pub(crate) fn rem(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => a
            .checked_rem(b)
            .map(Value::from)
            .ok_or_else(|| Error::new(ErrorKind::TypeError, "division by zero")),
        Some(CoerceResult::F64(a, b)) => Ok((a % b).into()),
        None => Err(Error::new(
            ErrorKind::TypeError,
            "tried to use % operator on unsupported types",
        )),
    }
}

/// Implements an unary `neg` operation on a value.
pub(crate) fn neg(val: &Value) -> Result<Value, Error> {
    if val.is_float() {
        Ok(Value::from(-val.as_float()))
    } else if val.is_number() {
        Ok(Value::from(-val.as_integer()))
    } else {
        Err(Error::new(
            ErrorKind::TypeError,
            "cannot negate this value",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn test_truthiness() {
        assert!(Value::from(1).is_true());
        assert!(Value::from(0.5).is_true());
        assert!(Value::from("x").is_true());
        assert!(Value::from(vec![0]).is_true());
        assert!(!Value::from(0).is_true());
        assert!(!Value::from(0.0).is_true());
        assert!(!Value::from("").is_true());
        assert!(!Value::from(false).is_true());
        assert!(!Value::none().is_true());
        assert!(!Value::from(Vec::<i64>::new()).is_true());
    }

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(Value::from(8.0), Value::from(8));
        assert_eq!(Value::from(8u64), Value::from(8i32));
        assert!(Value::from(8.5) != Value::from(8));
        assert_eq!(Value::from(3).compare(&Value::from(3.5)), Ordering::Less);
        assert_eq!(Value::from(4).compare(&Value::from(3.5)), Ordering::Greater);
    }

    #[test]
    fn test_nil_equality() {
        assert_eq!(Value::none(), Value::none());
        assert!(Value::none() != Value::from(0));
        assert!(Value::none() != Value::from(""));
    }

    #[test]
    fn test_string_display() {
        assert_eq!(Value::from(true).to_string(), "True");
        assert_eq!(Value::from(false).to_string(), "False");
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::from(1.5).to_string(), "1.500000");
        assert_eq!(Value::none().to_string(), "");
        assert_eq!(Value::from("x").to_string(), "x");
    }

    #[test]
    fn test_integer_coercion_from_string() {
        assert_eq!(Value::from("0x10").as_integer(), 16);
        assert_eq!(Value::from("0b101").as_integer(), 5);
        assert_eq!(Value::from("010").as_integer(), 8);
        assert_eq!(Value::from("0o17").as_integer(), 15);
        assert_eq!(Value::from("42").as_integer(), 42);
        assert_eq!(Value::from("12.9").as_integer(), 12);
        assert_eq!(Value::from("nope").as_integer(), 0);
        assert_eq!(Value::from(u64::MAX).as_integer(), i64::MAX);
    }

    #[test]
    fn test_contains() {
        assert!(Value::from("Hello, World!").contains(&Value::from("World")));
        assert!(Value::from(vec![1, 2, 3]).contains(&Value::from(2.0)));
        assert!(!Value::from(vec![1, 2, 3]).contains(&Value::from(4)));
        let mut map = BTreeMap::new();
        map.insert("okay", Value::from(1));
        let map = Value::from(map);
        assert!(map.contains(&Value::from("okay")));
        assert!(!map.contains(&Value::from("missing")));
        assert!(!map.contains(&Value::none()));
    }

    #[test]
    fn test_iterate_order() {
        let v = Value::from(vec![3, 1, 2]);
        let mut seen = Vec::new();
        v.iterate_order(
            |_, _, item, _| {
                seen.push(item.as_integer());
                true
            },
            || unreachable!(),
            true,
            true,
        );
        assert_eq!(seen, vec![3, 2, 1]);

        let mut called = false;
        Value::from(Vec::<i64>::new()).iterate(|_, _, _, _| true, || called = true);
        assert!(called);
    }

    #[test]
    fn test_map_iteration_is_key_sorted() {
        let mut map = BTreeMap::new();
        map.insert("zebra", Value::from(1));
        map.insert("ant", Value::from(2));
        let v = Value::from(map);
        let mut keys = Vec::new();
        v.iterate(
            |_, _, key, _| {
                keys.push(key.to_string());
                true
            },
            || {},
        );
        assert_eq!(keys, vec!["ant", "zebra"]);
    }

    #[test]
    fn test_math_ops() {
        assert_eq!(add(&Value::from(1), &Value::from(2)).unwrap(), Value::from(3));
        assert_eq!(
            add(&Value::from("foo"), &Value::from("bar")).unwrap(),
            Value::from("foobar")
        );
        assert_eq!(
            add(&Value::from(1), &Value::from(0.5)).unwrap(),
            Value::from(1.5)
        );
        assert!(add(&Value::from("a"), &Value::from(42)).is_err());
        assert!(div(&Value::from(1), &Value::from(0)).is_err());
        assert_eq!(neg(&Value::from(5)).unwrap(), Value::from(-5));
    }

    #[test]
    fn test_time_values() {
        use chrono::TimeZone;
        let earlier = Utc.timestamp_opt(1_000, 0).unwrap();
        let later = Utc.timestamp_opt(2_000, 0).unwrap();
        let a = Value::from(earlier);
        let b = Value::from(later);
        assert!(a.is_time());
        assert!(a.is_true());
        assert_eq!(a.as_time(), Some(earlier));
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(a, Value::from(earlier));
        assert!(a != b);
    }

    #[test]
    fn test_safe_flag() {
        let v = Value::from_safe_string("<b>".into());
        assert!(v.is_safe());
        assert!(!Value::from("<b>").is_safe());
        assert!(Value::from("<b>").mark_safe().is_safe());
    }

    #[test]
    fn test_shallow_copy() {
        let v = Value::from(vec![1, 2, 3]);
        let copy = v.shallow_copy();
        assert_eq!(v, copy);
    }
}

//! Filter functions and abstractions.
//!
//! Filters are applied to values with the pipe syntax.  For example the
//! expression `{{ name|lower }}` passes the value of `name` through the
//! `lower` filter.
//!
//! Two registration shapes exist.  The legacy single parameter shape takes
//! the input value and at most one parameter (`{{ x|join:german_comma }}`)
//! and is registered with
//! [`add_filter`](crate::TemplateSet::add_filter):
//!
//! ```
//! # use djinn::{TemplateSet, State, Error};
//! # let mut set = TemplateSet::new();
//! fn slugify(_state: &State, value: String) -> Result<String, Error> {
//!     Ok(value.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-"))
//! }
//!
//! set.add_filter("slugify", slugify);
//! ```
//!
//! The full argument shape receives an [`Args`] bundle with positional and
//! named arguments (`{{ x|truncate(12, end="…") }}`) and is registered
//! with [`add_filter_args`](crate::TemplateSet::add_filter_args).
//!
//! Argument conversion for the single parameter shape happens through the
//! [`ArgType`](crate::value::ArgType) trait, so filters can be written
//! against concrete Rust types.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::args::{expect_args, expect_named_args, Args};
use crate::context::State;
use crate::error::{Error, ErrorKind};
use crate::utils::HtmlEscape;
use crate::value::{ArgType, FunctionArgs, Value};

type FilterFunc = dyn Fn(&State, &Value, &Value) -> Result<Value, Error> + Sync + Send + 'static;
type FilterArgsFunc = dyn Fn(&State, &Value, &Args) -> Result<Value, Error> + Sync + Send + 'static;

/// A boxed filter in the legacy single parameter shape.
#[derive(Clone)]
pub struct BoxedFilter(Arc<FilterFunc>);

/// A boxed filter in the full argument shape.
#[derive(Clone)]
pub struct BoxedFilterArgs(Arc<FilterArgsFunc>);

/// A utility trait that represents single parameter filters.
pub trait Filter<V = Value, Rv = Value, Args = ()>: Send + Sync + 'static {
    /// Applies the filter to a value with the given parameter.
    fn apply_to(&self, state: &State, value: V, args: Args) -> Result<Rv, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, V, Rv, $($name),*> Filter<V, Rv, ($($name,)*)> for Func
        where
            Func: Fn(&State, V, $($name),*) -> Result<Rv, Error> + Send + Sync + 'static
        {
            fn apply_to(&self, state: &State, value: V, args: ($($name,)*)) -> Result<Rv, Error> {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)(state, value, $($name,)*)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }

impl BoxedFilter {
    /// Creates a new boxed filter.
    pub fn new<F, V, Rv, Args>(f: F) -> BoxedFilter
    where
        F: Filter<V, Rv, Args>,
        V: ArgType,
        Rv: Into<Value>,
        Args: FunctionArgs,
    {
        BoxedFilter(Arc::new(
            move |state, value, param| -> Result<Value, Error> {
                let args = if param.is_nil() {
                    Vec::new()
                } else {
                    vec![param.clone()]
                };
                f.apply_to(
                    state,
                    ArgType::from_value(Some(value.clone()))?,
                    FunctionArgs::from_values(args)?,
                )
                .map(Into::into)
            },
        ))
    }

    /// Applies the filter to a value and parameter.
    pub fn apply(&self, state: &State, value: &Value, param: &Value) -> Result<Value, Error> {
        (self.0)(state, value, param)
    }
}

impl BoxedFilterArgs {
    /// Creates a new boxed args-form filter.
    pub fn new<F>(f: F) -> BoxedFilterArgs
    where
        F: Fn(&State, &Value, &Args) -> Result<Value, Error> + Send + Sync + 'static,
    {
        BoxedFilterArgs(Arc::new(f))
    }

    /// Applies the filter to a value and argument bundle.
    pub fn apply(&self, state: &State, value: &Value, args: &Args) -> Result<Value, Error> {
        (self.0)(state, value, args)
    }
}

pub(crate) fn get_builtin_filters() -> BTreeMap<String, BoxedFilter> {
    let mut rv = BTreeMap::new();
    rv.insert("safe".to_string(), BoxedFilter::new(safe));
    rv.insert("escape".to_string(), BoxedFilter::new(escape));
    rv.insert("e".to_string(), BoxedFilter::new(escape));
    rv.insert("lower".to_string(), BoxedFilter::new(lower));
    rv.insert("upper".to_string(), BoxedFilter::new(upper));
    rv.insert("capitalize".to_string(), BoxedFilter::new(capitalize));
    rv.insert("length".to_string(), BoxedFilter::new(length));
    rv.insert("count".to_string(), BoxedFilter::new(length));
    rv.insert("trim".to_string(), BoxedFilter::new(trim));
    rv.insert("join".to_string(), BoxedFilter::new(join));
    rv.insert("default".to_string(), BoxedFilter::new(default));
    rv.insert("d".to_string(), BoxedFilter::new(default));
    rv.insert("first".to_string(), BoxedFilter::new(first));
    rv.insert("last".to_string(), BoxedFilter::new(last));
    rv.insert("reverse".to_string(), BoxedFilter::new(reverse));
    rv
}

pub(crate) fn get_builtin_filter_args() -> BTreeMap<String, BoxedFilterArgs> {
    let mut rv = BTreeMap::new();
    rv.insert("replace".to_string(), BoxedFilterArgs::new(replace));
    rv.insert("truncate".to_string(), BoxedFilterArgs::new(truncate));
    rv.insert("translate".to_string(), BoxedFilterArgs::new(translate));
    rv
}

/// Marks a value as safe so autoescaping leaves it alone.
pub fn safe(_state: &State, v: Value) -> Result<Value, Error> {
    Ok(v.mark_safe())
}

/// HTML escapes a string.
///
/// Already safe values pass through unchanged which makes the filter
/// idempotent.  By default this filter is also registered under the
/// alias `e`.
pub fn escape(_state: &State, v: Value) -> Result<Value, Error> {
    // TODO: this ideally understands which type of escaping is in use
    if v.is_safe() {
        Ok(v)
    } else {
        Ok(Value::from_safe_string(
            HtmlEscape(&v.to_string()).to_string(),
        ))
    }
}

/// Converts a value to lowercase.
pub fn lower(_state: &State, v: String) -> Result<String, Error> {
    Ok(v.to_lowercase())
}

/// Converts a value to uppercase.
pub fn upper(_state: &State, v: String) -> Result<String, Error> {
    Ok(v.to_uppercase())
}

/// Capitalizes a string, lowercasing the rest.
pub fn capitalize(_state: &State, v: String) -> Result<String, Error> {
    let mut chars = v.chars();
    match chars.next() {
        Some(c) => Ok(c.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()),
        None => Ok(v),
    }
}

/// Returns the length of the value.
///
/// Works on strings (in code points), sequences, maps and records.  By
/// default this filter is also registered under the alias `count`.
pub fn length(_state: &State, v: Value) -> Result<Value, Error> {
    v.len().map(Value::from).ok_or_else(|| {
        Error::new(
            ErrorKind::TypeError,
            "cannot calculate length of this value",
        )
        .with_sender("filter:length")
    })
}

/// Trims whitespace, or the given characters, from both ends.
pub fn trim(_state: &State, s: String, chars: Option<String>) -> Result<String, Error> {
    match chars {
        Some(chars) => {
            let chars = chars.chars().collect::<Vec<_>>();
            Ok(s.trim_matches(&chars[..]).to_string())
        }
        None => Ok(s.trim().to_string()),
    }
}

/// Joins a sequence or string with an optional separator.
pub fn join(_state: &State, val: Value, joiner: Option<String>) -> Result<String, Error> {
    if val.is_nil() {
        return Ok(String::new());
    }

    let joiner = joiner.as_deref().unwrap_or("");
    let mut rv = String::new();
    let mut failed = false;
    val.iterate(
        |_, _, item, _| {
            if !rv.is_empty() {
                rv.push_str(joiner);
            }
            rv.push_str(&item.to_string());
            true
        },
        || failed = !val.is_iterable(),
    );
    if failed {
        Err(Error::new(ErrorKind::TypeError, "cannot join this value").with_sender("filter:join"))
    } else {
        Ok(rv)
    }
}

/// Returns the value unchanged if it is truthy, otherwise the parameter.
///
/// By default this filter is also registered under the alias `d`.
pub fn default(_state: &State, value: Value, other: Option<Value>) -> Result<Value, Error> {
    Ok(if value.is_true() {
        value
    } else {
        other.unwrap_or_else(|| Value::from(""))
    })
}

/// Returns the first element of a sequence or string.
pub fn first(_state: &State, v: Value) -> Result<Value, Error> {
    if let Some(items) = v.as_seq() {
        return Ok(items.first().cloned().unwrap_or_default());
    }
    if let Some(s) = v.as_str() {
        return Ok(s.chars().next().map(Value::from).unwrap_or_default());
    }
    Ok(Value::none())
}

/// Returns the last element of a sequence or string.
pub fn last(_state: &State, v: Value) -> Result<Value, Error> {
    if let Some(items) = v.as_seq() {
        return Ok(items.last().cloned().unwrap_or_default());
    }
    if let Some(s) = v.as_str() {
        return Ok(s.chars().next_back().map(Value::from).unwrap_or_default());
    }
    Ok(Value::none())
}

/// Reverses a sequence or string.
pub fn reverse(_state: &State, v: Value) -> Result<Value, Error> {
    if let Some(s) = v.as_str() {
        Ok(Value::from(s.chars().rev().collect::<String>()))
    } else if let Some(items) = v.as_seq() {
        let mut items = items.to_vec();
        items.reverse();
        Ok(Value::from(items))
    } else {
        Err(Error::new(ErrorKind::TypeError, "cannot reverse this value")
            .with_sender("filter:reverse"))
    }
}

/// Does a string replacement (`{{ s|replace("from", "to") }}`).
pub fn replace(_state: &State, v: &Value, args: &Args) -> Result<Value, Error> {
    expect_args("filter", "replace", 2, Some(2), args)?;
    let from = args.value(0).to_string();
    let to = args.value(1).to_string();
    Ok(Value::from(v.to_string().replace(&from, &to)))
}

/// Truncates a string to `length` code points, appending `end`
/// (`{{ s|truncate(12, end="…") }}`).
pub fn truncate(_state: &State, v: &Value, args: &Args) -> Result<Value, Error> {
    expect_named_args("filter", "truncate", &["length"], &["end"], args)?;
    let length = args.get(0, "length").as_integer().max(0) as usize;
    let end = args.get_default(1, "end", "...").to_string();
    let s = v.to_string();
    if s.chars().count() <= length {
        return Ok(Value::from(s));
    }
    let mut rv: String = s.chars().take(length).collect();
    rv.push_str(&end);
    Ok(Value::from(rv))
}

/// Passes a message through the translator configured on the options.
///
/// Extra arguments are handed to the translator untouched.  Without a
/// translator the message comes back unchanged.
pub fn translate(state: &State, v: &Value, args: &Args) -> Result<Value, Error> {
    Ok(Value::from(state.translate(&v.to_string(), args.values())))
}

//! Argument bundles passed to filters, tests and callables.
//!
//! An [`Args`] carries the evaluated positional and named arguments of a
//! call site.  The [`expect_args`] and [`expect_named_args`] validators
//! implement the arity and name checks used by the builtin filters and
//! tests; custom registrations are encouraged to use them as well so that
//! error messages stay uniform.
use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind};
use crate::value::Value;

/// Contains the arguments passed to filters, tests and callables.
#[derive(Debug, Default, Clone)]
pub struct Args {
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
}

impl Args {
    /// Creates a new argument bundle.
    pub fn new(positional: Vec<Value>, named: BTreeMap<String, Value>) -> Args {
        Args { positional, named }
    }

    /// Creates a bundle holding a single positional argument unless it is
    /// nil.
    pub fn from_param(param: &Value) -> Args {
        if param.is_nil() {
            Args::default()
        } else {
            Args::new(vec![param.clone()], BTreeMap::new())
        }
    }

    /// Returns the number of positional arguments.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    /// Returns `true` if no positional arguments were passed.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    /// Returns the first positional argument or nil.
    pub fn first(&self) -> Value {
        self.value(0)
    }

    /// Returns the positional argument at index `i` or nil.
    pub fn value(&self, i: usize) -> Value {
        self.positional.get(i).cloned().unwrap_or_default()
    }

    /// Returns the positional argument at index `i` if it exists.
    pub fn value_exists(&self, i: usize) -> Option<&Value> {
        self.positional.get(i)
    }

    /// Returns the positional argument at index `i` or, if that index does
    /// not exist, the named argument with the given name.  If neither
    /// exists, nil is returned.
    pub fn get(&self, i: usize, name: &str) -> Value {
        self.get_exists(i, name).cloned().unwrap_or_default()
    }

    /// Like [`get`](Args::get) but falls back to a default instead of nil.
    pub fn get_default<D: Into<Value>>(&self, i: usize, name: &str, default: D) -> Value {
        match self.get_exists(i, name) {
            Some(value) => value.clone(),
            None => default.into(),
        }
    }

    /// Returns the positional argument at index `i` or the named argument
    /// with the given name, along with whether it existed.
    pub fn get_exists(&self, i: usize, name: &str) -> Option<&Value> {
        self.positional.get(i).or_else(|| self.named.get(name))
    }

    /// Returns the named argument with the given name or nil.
    pub fn named(&self, name: &str) -> Value {
        self.named.get(name).cloned().unwrap_or_default()
    }

    /// Returns the named argument with the given name if it exists.
    pub fn named_exists(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// Checks whether a named argument was passed.
    pub fn has_named(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Returns the raw list of positional arguments.
    pub fn values(&self) -> &[Value] {
        &self.positional
    }

    /// Returns the raw map of named arguments.
    pub fn named_map(&self) -> &BTreeMap<String, Value> {
        &self.named
    }

    pub(crate) fn into_positional(self) -> Vec<Value> {
        self.positional
    }
}

/// Asserts that the number of positional arguments is between `min` and
/// `max` inclusive, otherwise returns an error naming the caller and the
/// permitted range.  `max` of `None` means unbounded.  Only positional
/// arguments are considered.
pub fn expect_args(
    kind: &str,
    name: &str,
    min: usize,
    max: Option<usize>,
    args: &Args,
) -> Result<(), Error> {
    let arg_len = args.len();
    if arg_len < min || max.map_or(false, |max| arg_len > max) {
        let arg_range = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{}-{}", min, max),
            None => format!("at least {}", min),
        };
        return Err(Error::new(
            ErrorKind::InvalidParameterCount,
            format!(
                "{} {} expected {} parameter(s), received {}",
                kind, name, arg_range, arg_len
            ),
        )
        .with_sender(format!("{}:{}", kind, name)));
    }
    Ok(())
}

/// Works similarly to [`expect_args`], but the required and optional
/// arguments are specified by name.  `required = ["foo", "bar"]` means
/// two positional arguments, or fewer positional arguments supplemented
/// by the remaining names passed as named arguments (such as
/// `f(1, bar=2)`).  Named arguments outside `required` and `optional`
/// are rejected.
pub fn expect_named_args(
    kind: &str,
    name: &str,
    required: &[&str],
    optional: &[&str],
    args: &Args,
) -> Result<(), Error> {
    for arg_name in args.named_map().keys() {
        let known = required.iter().chain(optional.iter()).any(|n| n == arg_name);
        if !known {
            return Err(Error::new(
                ErrorKind::InvalidParameterName,
                arg_name.clone(),
            )
            .with_sender(format!("{}:{}", kind, name)));
        }
    }

    let required_count = required.len();
    let total_count = required_count + optional.len();
    let arg_len = args.len();

    let mut invalid = false;
    if arg_len == required_count {
        return Ok(());
    } else if arg_len > total_count {
        invalid = true;
    } else if arg_len < required_count {
        // remaining required parameters have to arrive by name
        for missing in &required[arg_len..] {
            if !args.has_named(missing) {
                invalid = true;
                break;
            }
        }
    }

    if !invalid {
        return Ok(());
    }

    let arg_range = if required_count == total_count {
        required_count.to_string()
    } else {
        format!("{}-{}", required_count, total_count)
    };
    Err(Error::new(
        ErrorKind::InvalidParameterCount,
        format!(
            "{} {} expected {} parameter(s), received {}",
            kind, name, arg_range, arg_len
        ),
    )
    .with_sender(format!("{}:{}", kind, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn make_args(positional: Vec<Value>, named: &[(&str, Value)]) -> Args {
        Args::new(
            positional,
            named
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_get_fallback() {
        let args = make_args(vec![Value::from(1)], &[("width", Value::from(7))]);
        assert_eq!(args.get(0, "length"), Value::from(1));
        assert_eq!(args.get(1, "width"), Value::from(7));
        assert!(args.get(1, "missing").is_nil());
        assert_eq!(args.get_default(1, "missing", 42), Value::from(42));
    }

    #[test]
    fn test_expect_args() {
        let args = make_args(vec![Value::from(1)], &[]);
        assert!(expect_args("filter", "x", 1, Some(1), &args).is_ok());
        assert!(expect_args("filter", "x", 2, Some(2), &args).is_err());
        assert!(expect_args("filter", "x", 0, Some(0), &args).is_err());
        assert!(expect_args("filter", "x", 0, None, &args).is_ok());

        let err = expect_args("test", "divisibleby", 1, Some(1), &Args::default()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameterCount);
        assert_eq!(err.sender(), Some("test:divisibleby"));
    }

    #[test]
    fn test_expect_named_args() {
        // all required positionally
        let args = make_args(vec![Value::from(1), Value::from(2)], &[]);
        assert!(expect_named_args("filter", "x", &["a", "b"], &[], &args).is_ok());

        // one positional, one by name
        let args = make_args(vec![Value::from(1)], &[("b", Value::from(2))]);
        assert!(expect_named_args("filter", "x", &["a", "b"], &[], &args).is_ok());

        // missing required
        let args = make_args(vec![Value::from(1)], &[]);
        assert!(expect_named_args("filter", "x", &["a", "b"], &[], &args).is_err());

        // unknown name
        let args = make_args(vec![Value::from(1)], &[("q", Value::from(2))]);
        let err = expect_named_args("filter", "x", &["a"], &["b"], &args).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameterName);

        // optional fills the range
        let args = make_args(vec![Value::from(1), Value::from(2)], &[]);
        assert!(expect_named_args("filter", "x", &["a"], &["b"], &args).is_ok());
        let args = make_args(
            vec![Value::from(1), Value::from(2), Value::from(3)],
            &[],
        );
        assert!(expect_named_args("filter", "x", &["a"], &["b"], &args).is_err());
    }
}

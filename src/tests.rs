//! Test functions and abstractions.
//!
//! Tests are predicates invoked with the `is` syntax.  For instance the
//! expression `{% if foo is odd %}` invokes the [`is_odd`] test to check
//! if the value is an odd number; `{% if n is divisibleby 3 %}` passes an
//! argument to the test.  A test can be negated with `is not`.
//!
//! A custom test is a function that takes the render state, the value and
//! an argument bundle and returns a boolean:
//!
//! ```
//! # use djinn::{Args, Error, State, TemplateSet};
//! # use djinn::value::Value;
//! # let mut set = TemplateSet::new();
//! fn is_lowercase(_state: &State, value: &Value, _args: &Args) -> Result<bool, Error> {
//!     Ok(value.to_string().chars().all(|x| x.is_lowercase()))
//! }
//!
//! set.add_test("lowercase", is_lowercase);
//! ```
//!
//! The tests `defined`, `undefined`, `escaped` and `callable` are handled
//! directly by the evaluator because they need access to the resolver
//! rather than an evaluated value; their registry entries exist so the
//! names resolve at parse time.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::args::{expect_args, Args};
use crate::context::State;
use crate::error::Error;
use crate::value::Value;

type TestFunc = dyn Fn(&State, &Value, &Args) -> Result<bool, Error> + Sync + Send + 'static;

/// A boxed test function.
#[derive(Clone)]
pub struct BoxedTest(Arc<TestFunc>);

impl BoxedTest {
    /// Creates a new boxed test.
    pub fn new<F>(f: F) -> BoxedTest
    where
        F: Fn(&State, &Value, &Args) -> Result<bool, Error> + Send + Sync + 'static,
    {
        BoxedTest(Arc::new(f))
    }

    /// Performs the test against a value.
    pub fn perform(&self, state: &State, value: &Value, args: &Args) -> Result<bool, Error> {
        (self.0)(state, value, args)
    }
}

pub(crate) fn get_builtin_tests() -> BTreeMap<String, BoxedTest> {
    let mut rv = BTreeMap::new();
    let mut register = |names: &[&str], test: BoxedTest| {
        for name in names {
            rv.insert(name.to_string(), test.clone());
        }
    };
    register(&["callable"], BoxedTest::new(is_callable));
    register(&["divisibleby"], BoxedTest::new(is_divisibleby));
    register(&["eq", "==", "equalto", "sameas"], BoxedTest::new(is_eq));
    register(&["escaped"], BoxedTest::new(is_escaped));
    register(&["even"], BoxedTest::new(is_even));
    register(&["false", "falsy"], BoxedTest::new(is_false));
    register(&["filter"], BoxedTest::new(is_filter));
    register(&["float"], BoxedTest::new(is_float));
    register(&["ge", ">="], BoxedTest::new(is_ge));
    register(&["gt", "greaterthan", ">"], BoxedTest::new(is_gt));
    register(&["in"], BoxedTest::new(is_in));
    register(&["integer"], BoxedTest::new(is_integer));
    register(&["iterable"], BoxedTest::new(is_iterable));
    register(&["le", "<="], BoxedTest::new(is_le));
    register(&["lower"], BoxedTest::new(is_lower));
    register(&["lt", "lessthan", "<"], BoxedTest::new(is_lt));
    register(&["mapping"], BoxedTest::new(is_mapping));
    register(&["ne", "!="], BoxedTest::new(is_ne));
    register(&["none"], BoxedTest::new(is_none));
    register(&["number"], BoxedTest::new(is_number));
    register(&["odd"], BoxedTest::new(is_odd));
    register(&["sequence"], BoxedTest::new(is_sequence));
    register(&["string"], BoxedTest::new(is_string));
    register(&["test"], BoxedTest::new(is_test));
    register(&["true", "truthy"], BoxedTest::new(is_true));
    register(&["upper"], BoxedTest::new(is_upper));
    register(&["defined"], BoxedTest::new(is_defined));
    register(&["undefined"], BoxedTest::new(is_undefined));
    rv
}

/// Placeholder for the `callable` test, implemented by the evaluator.
pub fn is_callable(_state: &State, v: &Value, _args: &Args) -> Result<bool, Error> {
    Ok(v.is_callable())
}

/// Checks if a value is divisible by another.
pub fn is_divisibleby(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "divisibleby", 1, Some(1), args)?;
    let divisor = args.first().as_integer();
    if divisor == 0 {
        return Ok(false);
    }
    Ok(v.as_integer() % divisor == 0)
}

/// Checks if a value equals the argument.
pub fn is_eq(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "eq", 1, Some(1), args)?;
    Ok(*v == args.first())
}

/// Placeholder for the `escaped` test, implemented by the evaluator.
///
/// Note that this tests prior filter application and the safe flag, not
/// the current escaping state of the text.
pub fn is_escaped(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "escaped", 0, Some(0), args)?;
    Ok(v.is_safe())
}

/// Checks if a value is an even number.
pub fn is_even(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "even", 0, Some(0), args)?;
    Ok(v.as_integer() % 2 == 0)
}

/// Checks if a value is falsy.
pub fn is_false(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "false", 0, Some(0), args)?;
    Ok(!v.is_true())
}

/// Checks if a filter with the given name exists in the set.
pub fn is_filter(state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "filter", 0, Some(0), args)?;
    Ok(state.set().has_filter(&v.to_string()))
}

/// Checks if a value is a float.
pub fn is_float(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "float", 0, Some(0), args)?;
    Ok(v.is_float())
}

/// Checks if a value is greater than or equal to the argument.
pub fn is_ge(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "ge", 1, Some(1), args)?;
    Ok(v.compare(&args.first()) != std::cmp::Ordering::Less)
}

/// Checks if a value is greater than the argument.
pub fn is_gt(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "gt", 1, Some(1), args)?;
    Ok(v.compare(&args.first()) == std::cmp::Ordering::Greater)
}

/// Checks if a value is contained in the argument.
pub fn is_in(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "in", 1, Some(1), args)?;
    Ok(args.first().contains(v))
}

/// Checks if a value is an integer.
pub fn is_integer(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "integer", 0, Some(0), args)?;
    Ok(v.is_integer())
}

/// Checks if a value can be iterated over.
pub fn is_iterable(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "iterable", 0, Some(0), args)?;
    Ok(v.is_iterable())
}

/// Checks if a value is less than or equal to the argument.
pub fn is_le(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "le", 1, Some(1), args)?;
    Ok(v.compare(&args.first()) != std::cmp::Ordering::Greater)
}

/// Checks if a string is all lowercase.
pub fn is_lower(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "lower", 0, Some(0), args)?;
    if !v.is_string() {
        return Ok(false);
    }
    let s = v.to_string();
    Ok(s == s.to_lowercase())
}

/// Checks if a value is less than the argument.
pub fn is_lt(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "lt", 1, Some(1), args)?;
    Ok(v.compare(&args.first()) == std::cmp::Ordering::Less)
}

/// Checks if a value is a map.
pub fn is_mapping(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "mapping", 0, Some(0), args)?;
    Ok(v.is_map())
}

/// Checks if a value does not equal the argument.
pub fn is_ne(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "ne", 1, Some(1), args)?;
    Ok(*v != args.first())
}

/// Checks if a value is nil.
pub fn is_none(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "none", 0, Some(0), args)?;
    Ok(v.is_nil())
}

/// Checks if a value is a number.
pub fn is_number(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "number", 0, Some(0), args)?;
    Ok(v.is_number())
}

/// Checks if a value is an odd number.
pub fn is_odd(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "odd", 0, Some(0), args)?;
    Ok(v.as_integer() % 2 != 0)
}

/// Checks if a value is a sequence or a string.
pub fn is_sequence(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "sequence", 0, Some(0), args)?;
    Ok(v.is_seq() || v.is_string())
}

/// Checks if a value is a string.
pub fn is_string(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "string", 0, Some(0), args)?;
    Ok(v.is_string())
}

/// Checks if a test with the given name exists.
pub fn is_test(state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "test", 0, Some(0), args)?;
    Ok(state.set().has_test(&v.to_string()))
}

/// Checks if a value is truthy.
pub fn is_true(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "true", 0, Some(0), args)?;
    Ok(v.is_true())
}

/// Checks if a string is all uppercase.
pub fn is_upper(_state: &State, v: &Value, args: &Args) -> Result<bool, Error> {
    expect_args("test", "upper", 0, Some(0), args)?;
    if !v.is_string() {
        return Ok(false);
    }
    let s = v.to_string();
    Ok(s == s.to_uppercase())
}

/// Checks if a value resolved to something other than nil.
pub fn is_defined(_state: &State, v: &Value, _args: &Args) -> Result<bool, Error> {
    Ok(!v.is_nil())
}

/// Checks if a value resolved to nil.
pub fn is_undefined(_state: &State, v: &Value, _args: &Args) -> Result<bool, Error> {
    Ok(v.is_nil())
}

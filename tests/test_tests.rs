use std::collections::BTreeMap;

use similar_asserts::assert_eq;

use djinn::value::Value;
use djinn::{Args, Context, TemplateSet};

// every name the engine promises to have pre-registered
const REQUIRED_TESTS: &[&str] = &[
    "callable",
    "divisibleby",
    "eq",
    "==",
    "equalto",
    "escaped",
    "even",
    "false",
    "falsy",
    "filter",
    "float",
    "ge",
    ">=",
    "gt",
    "greaterthan",
    ">",
    "in",
    "integer",
    "iterable",
    "le",
    "<=",
    "lower",
    "lt",
    "<",
    "lessthan",
    "mapping",
    "ne",
    "!=",
    "none",
    "number",
    "odd",
    "sameas",
    "sequence",
    "string",
    "test",
    "true",
    "truthy",
    "upper",
    "defined",
    "undefined",
];

#[test]
fn test_required_tests_are_registered() {
    let set = TemplateSet::new();
    for name in REQUIRED_TESTS {
        assert!(set.has_test(name), "test {:?} is not registered", name);
    }
}

fn perform(name: &str, value: Value) -> bool {
    let set = TemplateSet::new();
    set.perform_test(name, &value, &Args::default()).unwrap()
}

fn perform_with(name: &str, value: Value, arg: Value) -> bool {
    let set = TemplateSet::new();
    let args = Args::new(vec![arg], BTreeMap::new());
    set.perform_test(name, &value, &args).unwrap()
}

#[test]
fn test_numeric_tests() {
    assert!(perform("even", Value::from(4)));
    assert!(!perform("even", Value::from(5)));
    assert!(perform("odd", Value::from(5)));
    assert!(perform("integer", Value::from(5)));
    assert!(!perform("integer", Value::from(5.0)));
    assert!(perform("float", Value::from(5.0)));
    assert!(perform("number", Value::from(5)));
    assert!(perform("number", Value::from(5.0)));
    assert!(!perform("number", Value::from("5")));
}

#[test]
fn test_divisibleby_zero_divisor() {
    assert!(!perform_with("divisibleby", Value::from(4), Value::from(0)));
}

#[test]
fn test_comparison_tests() {
    assert!(perform_with("eq", Value::from(4), Value::from(4.0)));
    assert!(perform_with("ne", Value::from(4), Value::from(5)));
    assert!(perform_with("gt", Value::from(4), Value::from(3)));
    assert!(perform_with("ge", Value::from(4), Value::from(4)));
    assert!(perform_with("lt", Value::from(3), Value::from(4)));
    assert!(perform_with("le", Value::from(4), Value::from(4)));
    assert!(perform_with("lessthan", Value::from(3), Value::from(3.5)));
}

#[test]
fn test_truthiness_tests() {
    assert!(perform("true", Value::from(1)));
    assert!(perform("truthy", Value::from("x")));
    assert!(perform("false", Value::from(0)));
    assert!(perform("falsy", Value::from("")));
}

#[test]
fn test_kind_tests() {
    assert!(perform("none", Value::none()));
    assert!(!perform("none", Value::from(0)));
    assert!(perform("string", Value::from("x")));
    assert!(perform("sequence", Value::from(vec![1])));
    assert!(perform("sequence", Value::from("x")));
    assert!(perform("iterable", Value::from(vec![1])));
    assert!(!perform("iterable", Value::from(1)));
    assert!(perform("lower", Value::from("abc")));
    assert!(!perform("lower", Value::from("aBc")));
    assert!(perform("upper", Value::from("ABC")));
}

#[test]
fn test_in() {
    assert!(perform_with(
        "in",
        Value::from("yeah"),
        Value::from(vec!["okay", "yeah"])
    ));
    assert!(!perform_with(
        "in",
        Value::from("nope"),
        Value::from(vec!["okay", "yeah"])
    ));
    assert!(perform_with("in", Value::from("ell"), Value::from("hello")));
}

#[test]
fn test_argument_count_is_validated() {
    let set = TemplateSet::new();
    let err = set
        .perform_test("divisibleby", &Value::from(4), &Args::default())
        .unwrap_err();
    assert_eq!(err.kind(), djinn::ErrorKind::InvalidParameterCount);
    assert_eq!(err.sender(), Some("test:divisibleby"));

    let args = Args::new(vec![Value::from(1)], BTreeMap::new());
    let err = set
        .perform_test("even", &Value::from(4), &args)
        .unwrap_err();
    assert_eq!(err.kind(), djinn::ErrorKind::InvalidParameterCount);
}

#[test]
fn test_replace_test() {
    let mut set = TemplateSet::new();
    set.replace_test("even", |_state, v, _args| Ok(v.as_integer() == 2))
        .unwrap();
    assert!(set
        .perform_test("even", &Value::from(2), &Args::default())
        .unwrap());
    assert!(!set
        .perform_test("even", &Value::from(4), &Args::default())
        .unwrap());
    assert!(set.replace_test("bogus", |_state, _v, _args| Ok(true)).is_err());
}

#[test]
fn test_custom_test_in_template() {
    fn is_answer(
        _state: &djinn::State,
        v: &Value,
        _args: &Args,
    ) -> Result<bool, djinn::Error> {
        Ok(v.as_integer() == 42)
    }

    let mut set = TemplateSet::new();
    set.add_test("answer", is_answer);
    let tmpl = set
        .from_string("{% if n is answer %}yes{% else %}no{% endif %}")
        .unwrap();
    let mut ctx = Context::default();
    ctx.insert("n", 42);
    assert_eq!(tmpl.render(ctx).unwrap(), "yes");
}

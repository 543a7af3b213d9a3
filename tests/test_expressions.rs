use similar_asserts::assert_eq;

use djinn::value::Value;
use djinn::{context, Context, Error, State, TemplateSet};

fn eval(source: &str, ctx: Context) -> Value {
    let set = TemplateSet::new();
    set.compile_expression(source).unwrap().eval(ctx).unwrap()
}

#[test]
fn test_arithmetic_and_grouping() {
    assert_eq!(eval("1 + 2 * 3", Context::default()), Value::from(7));
    assert_eq!(eval("(1 + 2) * 3", Context::default()), Value::from(9));
    assert_eq!(eval("10 - 4 - 3", Context::default()), Value::from(3));
    assert_eq!(eval("1 + 0.5", Context::default()), Value::from(1.5));
    assert_eq!(eval("-2 * 3", Context::default()), Value::from(-6));
}

#[test]
fn test_comparisons() {
    assert!(eval("1 < 2", Context::default()).is_true());
    assert!(eval("2 <= 2", Context::default()).is_true());
    assert!(eval("3 > 2.5", Context::default()).is_true());
    assert!(eval("1 == 1.0", Context::default()).is_true());
    assert!(eval("1 != 2", Context::default()).is_true());
    assert!(!eval("\"a\" == \"b\"", Context::default()).is_true());
}

#[test]
fn test_boolean_logic() {
    assert!(eval("true and 1", Context::default()).is_true());
    assert!(!eval("true and 0", Context::default()).is_true());
    assert!(eval("false or \"x\"", Context::default()).is_true());
    assert!(eval("not false", Context::default()).is_true());
    assert!(eval("not x", Context::default()).is_true());

    // `and` binds tighter than `or`
    assert!(eval("true or false and false", Context::default()).is_true());
}

#[test]
fn test_short_circuit() {
    // the right side would be a type error if evaluated
    assert!(!eval("false and missing.field", context!(missing => 1)).is_true());
    assert!(eval("true or missing.field", context!(missing => 1)).is_true());
}

#[test]
fn test_variable_lookup() {
    assert_eq!(eval("foo + bar", context!(foo => 42, bar => 23)), Value::from(65));
    assert!(eval("missing", Context::default()).is_nil());
}

#[test]
fn test_literals() {
    assert_eq!(eval("42", Context::default()), Value::from(42));
    assert_eq!(eval("1.5", Context::default()), Value::from(1.5));
    assert_eq!(eval("\"text\"", Context::default()), Value::from("text"));
    assert_eq!(eval("'text'", Context::default()), Value::from("text"));
    assert_eq!(eval("true", Context::default()), Value::from(true));
    assert!(eval("none", Context::default()).is_nil());
    assert!(eval("nil", Context::default()).is_nil());
}

#[test]
fn test_string_escapes() {
    assert_eq!(eval(r#""a\nb""#, Context::default()), Value::from("a\nb"));
    assert_eq!(eval(r#""a\"b""#, Context::default()), Value::from("a\"b"));
}

#[test]
fn test_list_literal() {
    let v = eval("[1, 2, 3]", Context::default());
    assert!(v.is_seq());
    assert!(v.is_safe());
    assert_eq!(v.len(), Some(3));
    assert_eq!(v.get_item(&Value::from(0)), Value::from(1));

    let v = eval("[]", Context::default());
    assert_eq!(v.len(), Some(0));
}

#[test]
fn test_dict_literal() {
    let v = eval("{'a': 1, \"b\": 2, 3: 4}", Context::default());
    assert!(v.is_map());
    assert!(v.is_safe());
    assert_eq!(v.element("a"), Value::from(1));
    assert_eq!(v.element("b"), Value::from(2));
    assert_eq!(v.element("3"), Value::from(4));
}

#[test]
fn test_subscripts() {
    let ctx = context! {
        m => Value::from_serializable(&serde_json::json!({"key": "value"})),
        xs => vec![10, 20],
        s => "abc",
    };
    assert_eq!(eval("m['key']", ctx.clone()), Value::from("value"));
    assert_eq!(eval("xs[1]", ctx.clone()), Value::from(20));
    assert_eq!(eval("s[0]", ctx.clone()), Value::from("a"));
    assert!(eval("m['missing']", ctx).is_nil());
}

#[test]
fn test_filters_in_expressions() {
    assert_eq!(eval("name|upper", context!(name => "ada")), Value::from("ADA"));
    assert_eq!(
        eval("name|upper|reverse", context!(name => "abc")),
        Value::from("CBA")
    );
}

#[test]
fn test_filter_chain_associativity() {
    // {{ x|a|b }} equals b(a(x))
    let set = TemplateSet::new();
    let chained = set
        .compile_expression("x|lower|reverse")
        .unwrap()
        .eval(context!(x => "AbC"))
        .unwrap();
    let inner = set.apply_filter("lower", &Value::from("AbC"), None).unwrap();
    let manual = set.apply_filter("reverse", &inner, None).unwrap();
    assert_eq!(chained, manual);
}

#[test]
fn test_tests_in_expressions() {
    assert!(eval("9 is divisibleby 3", Context::default()).is_true());
    assert!(!eval("10 is divisibleby 3", Context::default()).is_true());
    assert!(eval("4 is even", Context::default()).is_true());
    assert!(eval("5 is odd", Context::default()).is_true());
    assert!(eval("5 is not even", Context::default()).is_true());
    assert!(eval("x is defined", context!(x => 1)).is_true());
    assert!(eval("x is undefined", Context::default()).is_true());
    assert!(eval("x is none", Context::default()).is_true());
    assert!(eval("x is string", context!(x => "s")).is_true());
    assert!(eval("x is number", context!(x => 1.5)).is_true());
    assert!(eval("x is mapping", context!(x => Value::from_serializable(&serde_json::json!({})))).is_true());
}

#[test]
fn test_symbol_test_names() {
    assert!(eval("4 is == 4", Context::default()).is_true());
    assert!(eval("4 is != 5", Context::default()).is_true());
    assert!(eval("4 is >= 4", Context::default()).is_true());
    assert!(eval("4 is < 5", Context::default()).is_true());
    assert!(eval("4 is lessthan 5", Context::default()).is_true());
    assert!(eval("\"a\" is in xs", context!(xs => vec!["a", "b"])).is_true());
}

#[test]
fn test_callable_test() {
    fn noop(_state: &State) -> Result<i64, Error> {
        Ok(1)
    }
    let ctx = context!(f => Value::from_function("f", noop), x => 42);
    assert!(eval("f is callable", ctx.clone()).is_true());
    assert!(!eval("x is callable", ctx.clone()).is_true());
    assert!(!eval("missing is callable", ctx).is_true());
}

#[test]
fn test_escaped_test() {
    assert!(eval("x|safe is escaped", context!(x => "v")).is_true());
    assert!(eval("x|escape is escaped", context!(x => "v")).is_true());
    assert!(!eval("x is escaped", context!(x => "v")).is_true());
    assert!(eval(
        "x is escaped",
        context!(x => Value::from_safe_string("v".to_string()))
    )
    .is_true());
}

#[test]
fn test_filter_and_test_existence_tests() {
    assert!(eval("\"upper\" is filter", Context::default()).is_true());
    assert!(!eval("\"nope\" is filter", Context::default()).is_true());
    assert!(eval("\"odd\" is test", Context::default()).is_true());
    assert!(!eval("\"nope\" is test", Context::default()).is_true());
}

#[test]
fn test_string_concat() {
    assert_eq!(
        eval("greeting + \" \" + name", context!(greeting => "Hello", name => "Ada")),
        Value::from("Hello Ada")
    );
}

#[test]
fn test_type_error_propagates() {
    let set = TemplateSet::new();
    let err = set
        .compile_expression("1 + \"a\"")
        .unwrap()
        .eval(Context::default())
        .unwrap_err();
    assert_eq!(err.kind(), djinn::ErrorKind::TypeError);
}

#[test]
fn test_parse_error_position() {
    let set = TemplateSet::new();
    let err = set.compile_expression("1 +").unwrap_err();
    assert_eq!(err.kind(), djinn::ErrorKind::ParseError);
}

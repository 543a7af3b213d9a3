use std::fmt;
use std::sync::Arc;

use similar_asserts::assert_eq;

use djinn::value::{Record, Value};
use djinn::{context, Args, Context, Error, ErrorKind, State, TemplateSet};

fn render(source: &str, ctx: Context) -> String {
    let set = TemplateSet::new();
    set.from_string(source).unwrap().render(ctx).unwrap()
}

fn render_no_escape(source: &str, ctx: Context) -> String {
    let mut set = TemplateSet::new();
    set.options_mut().autoescape = false;
    set.from_string(source).unwrap().render(ctx).unwrap()
}

#[test]
fn test_basic_variable() {
    assert_eq!(render("Hello {{ name }}!", context!(name => "John")), "Hello John!");
}

#[test]
fn test_missing_lookup_renders_empty() {
    assert_eq!(render("[{{ missing }}]", Context::default()), "[]");
    assert_eq!(render("[{{ user.name }}]", Context::default()), "[]");
}

#[test]
fn test_scalar_canonical_forms() {
    assert_eq!(render_no_escape("{{ i }}", context!(i => 42)), "42");
    assert_eq!(render_no_escape("{{ f }}", context!(f => 1.5)), "1.500000");
    assert_eq!(render_no_escape("{{ b }}", context!(b => true)), "True");
    assert_eq!(render_no_escape("{{ b }}", context!(b => false)), "False");
    assert_eq!(render_no_escape("{{ s }}", context!(s => "text")), "text");
}

#[test]
fn test_nested_navigation() {
    let user = Value::from_serializable(&serde_json::json!({
        "name": "Ada",
        "address": {"city": "London"},
    }));
    assert_eq!(
        render("{{ user.name }} of {{ user.address.city }}", context!(user => user)),
        "Ada of London"
    );
}

#[test]
fn test_nil_mid_path_is_empty() {
    let user = Value::from_serializable(&serde_json::json!({"name": "Ada"}));
    assert_eq!(render("[{{ user.missing.deeper }}]", context!(user => user)), "[]");
}

#[test]
fn test_index_access() {
    let ctx = context! {
        xs => vec![10, 20, 30],
        s => "abc",
        i => 2,
    };
    assert_eq!(render("{{ xs.1 }}", ctx.clone()), "20");
    assert_eq!(render("{{ xs[i] }}", ctx.clone()), "30");
    assert_eq!(render("{{ s.1 }}", ctx.clone()), "b");
    assert_eq!(render("{{ xs.9 }}", ctx.clone()), "");
    assert_eq!(render("{{ xs[1 + 1] }}", ctx), "30");
}

#[test]
fn test_if_divisibleby() {
    let source = "{% if n is divisibleby 3 %}yes{% else %}no{% endif %}";
    assert_eq!(render(source, context!(n => 9)), "yes");
    assert_eq!(render(source, context!(n => 10)), "no");
}

#[test]
fn test_if_elif_else() {
    let source = "{% if n > 10 %}big{% elif n > 5 %}mid{% else %}small{% endif %}";
    assert_eq!(render(source, context!(n => 20)), "big");
    assert_eq!(render(source, context!(n => 7)), "mid");
    assert_eq!(render(source, context!(n => 1)), "small");
}

#[test]
fn test_is_in() {
    let source = "{% if \"yeah\" is in xs %}y{% else %}n{% endif %}";
    assert_eq!(render(source, context!(xs => vec!["okay", "yeah"])), "y");
    assert_eq!(render(source, context!(xs => vec!["okay"])), "n");
}

#[test]
fn test_in_operator() {
    assert_eq!(
        render("{% if 2 in xs %}y{% endif %}", context!(xs => vec![1, 2, 3])),
        "y"
    );
    assert_eq!(
        render("{% if \"ell\" in s %}y{% endif %}", context!(s => "hello")),
        "y"
    );
    assert_eq!(
        render("{% if 4 not in xs %}y{% endif %}", context!(xs => vec![1, 2, 3])),
        "y"
    );
}

#[test]
fn test_for_loop() {
    assert_eq!(
        render("{% for x in xs %}[{{ x }}]{% endfor %}", context!(xs => vec![0, 1, 2])),
        "[0][1][2]"
    );
}

#[test]
fn test_for_loop_sorted_reversed() {
    let ctx = context!(xs => vec![3, 1, 2]);
    assert_eq!(
        render("{% for x in xs sorted %}{{ x }}{% endfor %}", ctx.clone()),
        "123"
    );
    assert_eq!(
        render("{% for x in xs reversed sorted %}{{ x }}{% endfor %}", ctx.clone()),
        "321"
    );
    assert_eq!(
        render("{% for x in xs reversed %}{{ x }}{% endfor %}", ctx),
        "213"
    );
}

#[test]
fn test_for_loop_else() {
    assert_eq!(
        render("{% for x in xs %}{{ x }}{% else %}empty{% endfor %}", context!(xs => Vec::<i64>::new())),
        "empty"
    );
}

#[test]
fn test_for_loop_over_map() {
    let m = Value::from_serializable(&serde_json::json!({"b": 2, "a": 1}));
    assert_eq!(
        render("{% for k, v in m %}{{ k }}={{ v }};{% endfor %}", context!(m => m)),
        "a=1;b=2;"
    );
}

#[test]
fn test_for_loop_over_string() {
    assert_eq!(
        render("{% for c in s %}[{{ c }}]{% endfor %}", context!(s => "ab")),
        "[a][b]"
    );
}

#[test]
fn test_set_statement() {
    assert_eq!(render("{% set n = 41 + 1 %}{{ n }}", Context::default()), "42");
}

#[test]
fn test_with_block() {
    assert_eq!(
        render("{% with a = 1, b = 2 %}{{ a }}{{ b }}{% endwith %}[{{ a }}]", Context::default()),
        "12[]"
    );
}

#[test]
fn test_with_shadows_and_restores() {
    assert_eq!(
        render(
            "{% set a = 1 %}{% with a = 2 %}{{ a }}{% endwith %}{{ a }}",
            Context::default()
        ),
        "21"
    );
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(render("a{# a comment #}b", Context::default()), "ab");
}

#[test]
fn test_autoescape_default() {
    assert_eq!(render("{{ v }}", context!(v => "<b>")), "&lt;b&gt;");
}

#[test]
fn test_escape_filter() {
    assert_eq!(render("{{ \"<b>\"|escape }}", Context::default()), "&lt;b&gt;");
}

#[test]
fn test_safe_filter_suppresses_autoescape() {
    assert_eq!(render("{{ \"<b>\"|safe }}", Context::default()), "<b>");
}

#[test]
fn test_escape_is_idempotent() {
    // applying escape to an already safe value is a no-op
    assert_eq!(
        render("{{ \"<b>\"|escape|escape }}", Context::default()),
        "&lt;b&gt;"
    );
}

#[test]
fn test_safe_anywhere_in_chain() {
    // even though upper produces a fresh (unsafe) string, the chain
    // applied `safe` and autoescape stays off
    assert_eq!(
        render("{{ v|safe|upper }}", context!(v => "<b>")),
        "<B>"
    );
}

#[test]
fn test_safe_value_from_host() {
    assert_eq!(
        render("{{ v }}", context!(v => Value::from_safe_string("<b>".to_string()))),
        "<b>"
    );
}

#[test]
fn test_arithmetic() {
    assert_eq!(render("{{ 1 + 2 * 3 }}", Context::default()), "7");
    assert_eq!(render("{{ (1 + 2) * 3 }}", Context::default()), "9");
    assert_eq!(render("{{ 7 % 3 }}", Context::default()), "1");
    assert_eq!(render("{{ 7 / 2 }}", Context::default()), "3");
    assert_eq!(render("{{ 1 + 0.5 }}", Context::default()), "1.500000");
    assert_eq!(render("{{ -3 + 1 }}", Context::default()), "-2");
    assert_eq!(render("{{ \"a\" + \"b\" }}", Context::default()), "ab");
}

#[test]
fn test_list_and_dict_literals() {
    assert_eq!(
        render("{% for x in [3, 1, 2] sorted %}{{ x }}{% endfor %}", Context::default()),
        "123"
    );
    assert_eq!(
        render("{% set d = {'a': 1, 'b': 2} %}{{ d.a }}{{ d['b'] }}", Context::default()),
        "12"
    );
}

#[test]
fn test_repeated_render_is_deterministic() {
    let set = TemplateSet::new();
    let tmpl = set.from_string("{% for x in xs %}{{ x }}{% endfor %}").unwrap();
    let ctx = context!(xs => vec![1, 2, 3]);
    let first = tmpl.render(ctx.clone()).unwrap();
    let second = tmpl.render(ctx).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, "123");
}

#[test]
fn test_trim_blocks() {
    let mut set = TemplateSet::new();
    set.options_mut().trim_blocks = true;
    let tmpl = set.from_string("{% if true %}\nx\n{% endif %}\ny").unwrap();
    assert_eq!(tmpl.render(Context::default()).unwrap(), "x\ny");
}

#[test]
fn test_lstrip_blocks() {
    let mut set = TemplateSet::new();
    set.options_mut().lstrip_blocks = true;
    let tmpl = set.from_string("x\n    {% if true %}y{% endif %}").unwrap();
    assert_eq!(tmpl.render(Context::default()).unwrap(), "x\ny");
}

#[derive(Debug)]
struct Point {
    x: i64,
    y: i64,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Record for Point {
    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "x" => Some(Value::from(self.x)),
            "y" => Some(Value::from(self.y)),
            _ => None,
        }
    }

    fn fields(&self) -> Vec<&str> {
        vec!["x", "y"]
    }

    fn has_method(&self, name: &str) -> bool {
        name == "scaled"
    }

    fn call_method(&self, _state: &State, name: &str, args: Args) -> Result<Value, Error> {
        match name {
            "scaled" => {
                let factor = args.first().as_integer();
                Ok(Value::from(self.x * factor))
            }
            _ => Err(Error::new(ErrorKind::TypeError, "no such method")),
        }
    }
}

#[test]
fn test_record_fields() {
    let ctx = context!(p => Value::from_record(Point { x: 3, y: 4 }));
    assert_eq!(render("{{ p.x }},{{ p.y }}", ctx.clone()), "3,4");
    assert_eq!(render("[{{ p.missing }}]", ctx.clone()), "[]");
    assert_eq!(render("{{ p['x'] }}", ctx), "3");
}

#[test]
fn test_record_method_invocation() {
    let ctx = context!(p => Value::from_record(Point { x: 3, y: 4 }));
    assert_eq!(render("{{ p.scaled(2) }}", ctx), "6");
}

#[test]
fn test_case_insensitive_lookup() {
    let mut set = TemplateSet::new();
    set.options_mut().ignore_variable_case = true;
    let tmpl = set.from_string("{{ P.X }}").unwrap();
    let ctx = context!(p => Value::from_record(Point { x: 3, y: 4 }));
    assert_eq!(tmpl.render(ctx).unwrap(), "3");
}

fn plus(_state: &State, a: i64, b: i64) -> Result<i64, Error> {
    Ok(a + b)
}

#[test]
fn test_context_function() {
    let ctx = context!(f => Value::from_function("f", plus));
    assert_eq!(render("{{ f(1, 2) }}", ctx), "3");
}

#[test]
fn test_bare_function_reference_is_invoked() {
    fn greet(_state: &State) -> Result<String, Error> {
        Ok("hi".to_string())
    }
    let ctx = context!(f => Value::from_function("f", greet));
    assert_eq!(render("{{ f }}", ctx), "hi");
}

#[test]
fn test_sandbox_context_functions() {
    let mut set = TemplateSet::new();
    set.options_mut().disable_context_functions = true;
    let tmpl = set.from_string("{{ f(1, 2) }}").unwrap();
    let err = tmpl
        .render(context!(f => Value::from_function("f", plus)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisabledFunction);
}

#[test]
fn test_sandbox_nested_functions() {
    let mut set = TemplateSet::new();
    set.options_mut().disable_nested_functions = true;
    let tmpl = set.from_string("{{ p.scaled(2) }}").unwrap();
    let err = tmpl
        .render(context!(p => Value::from_record(Point { x: 3, y: 4 })))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisabledFunction);

    // plain field access stays allowed
    let tmpl = set.from_string("{{ p.x }}").unwrap();
    assert_eq!(
        tmpl.render(context!(p => Value::from_record(Point { x: 3, y: 4 })))
            .unwrap(),
        "3"
    );
}

#[test]
fn test_type_error_on_field_access() {
    let set = TemplateSet::new();
    let tmpl = set.from_string("{{ n.field }}").unwrap();
    let err = tmpl.render(context!(n => 42)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn test_unknown_filter_is_a_parse_error() {
    let set = TemplateSet::new();
    let err = set.from_string("{{ x|nope }}").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_unknown_test_is_a_parse_error() {
    let set = TemplateSet::new();
    let err = set.from_string("{% if x is bogus %}{% endif %}").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_banned_filter_is_a_parse_error() {
    let mut set = TemplateSet::new();
    set.ban_filter("upper");
    let err = set.from_string("{{ x|upper }}").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BannedFilter);
}

#[test]
fn test_translator() {
    let mut set = TemplateSet::new();
    set.options_mut().translator = Some(Arc::new(|msg, args| {
        if msg == "greeting" {
            format!(
                "Hello {}",
                args.first().map(|v| v.to_string()).unwrap_or_default()
            )
        } else {
            msg.to_string()
        }
    }));
    let tmpl = set.from_string("{{ \"greeting\"|translate(name) }}").unwrap();
    assert_eq!(tmpl.render(context!(name => "Ada")).unwrap(), "Hello Ada");
}

#[test]
fn test_render_to_writer() {
    let set = TemplateSet::new();
    let tmpl = set.from_string("Hello {{ name }}!").unwrap();
    let mut out = String::new();
    tmpl.render_to(context!(name => "Ada"), &mut out).unwrap();
    assert_eq!(out, "Hello Ada!");
}

#[test]
fn test_stored_templates() {
    let mut set = TemplateSet::new();
    set.add_template("hello", "Hello {{ name }}!").unwrap();
    let tmpl = set.get_template("hello").unwrap();
    assert_eq!(tmpl.render(context!(name => "Ada")).unwrap(), "Hello Ada!");
    assert!(set.get_template("missing").is_err());
}

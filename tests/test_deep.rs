use similar_asserts::assert_eq;

use djinn::value::Value;
use djinn::{context, Context, TemplateSet};

fn deep_set() -> TemplateSet {
    let mut set = TemplateSet::new();
    set.options_mut().deep_resolve = true;
    set.options_mut().autoescape = false;
    set
}

#[test]
fn test_template_string_in_context() {
    let set = deep_set();
    let tmpl = set.from_string("{{ greeting }}").unwrap();
    let ctx = context! {
        greeting => "Hello {{ name }}!",
        name => "Ada",
    };
    assert_eq!(tmpl.render(ctx).unwrap(), "Hello Ada!");
}

#[test]
fn test_plain_strings_stay_untouched() {
    let set = deep_set();
    let tmpl = set.from_string("{{ greeting }}").unwrap();
    let ctx = context!(greeting => "Hello { name }!");
    assert_eq!(tmpl.render(ctx).unwrap(), "Hello { name }!");
}

#[test]
fn test_nested_containers_are_resolved() {
    let set = deep_set();
    let tmpl = set.from_string("{{ m.msg }}|{{ xs.0 }}").unwrap();
    let ctx = context! {
        m => Value::from_serializable(&serde_json::json!({"msg": "hey {{ name }}"})),
        xs => vec!["{{ name }}"],
        name => "Ada",
    };
    assert_eq!(tmpl.render(ctx).unwrap(), "hey Ada|Ada");
}

#[test]
fn test_template_handle_in_context() {
    let set = deep_set();
    let partial = set.from_string("Hi {{ name }}").unwrap();
    let tmpl = set.from_string("[{{ partial }}]").unwrap();
    let ctx = context! {
        partial => partial.to_value(),
        name => "Ada",
    };
    assert_eq!(tmpl.render(ctx).unwrap(), "[Hi Ada]");
}

#[test]
fn test_multi_level_resolution() {
    let set = deep_set();
    let tmpl = set.from_string("{{ outer }}").unwrap();
    let ctx = context! {
        outer => "a {{ inner }}",
        inner => "b {{ name }}",
        name => "c",
    };
    assert_eq!(tmpl.render(ctx).unwrap(), "a b c");
}

#[test]
fn test_cycle_hits_recursion_limit() {
    let set = deep_set();
    let tmpl = set.from_string("{{ a }}").unwrap();
    let ctx = context!(a => "{{ a }}");
    let err = tmpl.render(ctx).unwrap_err();
    assert_eq!(err.kind(), djinn::ErrorKind::EvalError);
}

#[test]
fn test_disabled_by_default() {
    let mut set = TemplateSet::new();
    set.options_mut().autoescape = false;
    let tmpl = set.from_string("{{ greeting }}").unwrap();
    let ctx = context! {
        greeting => "Hello {{ name }}!",
        name => "Ada",
    };
    assert_eq!(tmpl.render(ctx).unwrap(), "Hello {{ name }}!");
}

#[test]
fn test_deep_resolver_facade() {
    let set = TemplateSet::new();
    let mut ctx = Context::default();
    ctx.insert("name", "Ada");
    ctx.insert("greeting", "Hello {{ name }}!");

    let resolver = set.deep_resolver(ctx);
    assert_eq!(resolver.evaluate("greeting").unwrap().to_string(), "Hello Ada!");
    assert_eq!(
        resolver
            .resolve(&Value::from("x {{ name }}"))
            .unwrap()
            .to_string(),
        "x Ada"
    );
    assert_eq!(
        resolver.resolve(&Value::from(42)).unwrap(),
        Value::from(42)
    );
}

#[test]
fn test_deep_resolver_update_context() {
    let set = TemplateSet::new();
    let mut resolver = set.deep_resolver(Context::default());
    let mut extra = Context::default();
    extra.insert("name", "Ada");
    resolver.update_context(&extra);
    assert_eq!(
        resolver.resolve(&Value::from("{{ name }}")).unwrap().to_string(),
        "Ada"
    );
}

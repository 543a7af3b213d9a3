//! Deep resolution of template-bearing values.
//!
//! With `deep_resolve` enabled, values coming out of a variable path are
//! given a second look: strings containing template markers are parsed
//! and rendered against the current public scope, template handles are
//! evaluated, and maps and sequences are rebuilt with every element
//! resolved.  Each pass constructs fresh containers, so cycles are not
//! followed beyond one evaluation; a hard depth limit guards against
//! maliciously nested input.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::context::{Context, State};
use crate::environment::TemplateSet;
use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueRepr};

const MAX_RESOLVE_DEPTH: usize = 64;

// shortened rendition of a value for trace logging
fn truncated(s: &str) -> String {
    if s.len() > 32 {
        let mut end = 32;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{} ...", &s[..end])
    } else {
        s.to_string()
    }
}

/// Resolves a value recursively, returning the resolved value and whether
/// anything changed.
pub(crate) fn resolve_value(
    state: &State,
    value: &Value,
    depth: usize,
) -> Result<(Value, bool), Error> {
    if depth > MAX_RESOLVE_DEPTH || state.resolve_depth > MAX_RESOLVE_DEPTH {
        return Err(Error::new(
            ErrorKind::EvalError,
            "deep resolution exceeded the recursion limit",
        )
        .with_sender("resolver"));
    }

    match &value.repr {
        ValueRepr::Map(map) => {
            let mut modified = false;
            let mut rv = BTreeMap::new();
            for (key, item) in map.iter() {
                let (resolved, item_modified) = resolve_value(state, item, depth + 1)?;
                modified = modified || item_modified;
                rv.insert(key.clone(), resolved);
            }
            Ok((
                Value {
                    repr: ValueRepr::Map(Arc::new(rv)),
                    safe: value.safe,
                },
                modified,
            ))
        }
        ValueRepr::Seq(items) => {
            let mut modified = false;
            let mut rv = Vec::with_capacity(items.len());
            for item in items.iter() {
                let (resolved, item_modified) = resolve_value(state, item, depth + 1)?;
                modified = modified || item_modified;
                rv.push(resolved);
            }
            Ok((
                Value {
                    repr: ValueRepr::Seq(Arc::new(rv)),
                    safe: value.safe,
                },
                modified,
            ))
        }
        ValueRepr::String(s) => {
            // only strings that carry template markers are worth a parse
            if !s.contains("{{") && !s.contains("{%") {
                return Ok((value.clone(), false));
            }
            log::trace!("deep resolving template string {:?}", truncated(s));
            let mut options = state.options.clone();
            options.deep_resolve = true;
            let compiled = state.set.compile_string(s, options)?;
            let rendered =
                compiled.render_nested(state.set, state.public.clone(), state.resolve_depth + 1)?;
            if rendered == s.as_ref() {
                return Ok((value.clone(), false));
            }
            let (resolved, _) = resolve_value(state, &Value::from(rendered), depth + 1)?;
            Ok((resolved, true))
        }
        ValueRepr::Template(tmpl) => {
            log::trace!("deep resolving template handle {:?}", tmpl.name());
            let rendered =
                tmpl.render_nested(state.set, state.public.clone(), state.resolve_depth + 1)?;
            Ok((Value::from(rendered), true))
        }
        _ => Ok((value.clone(), false)),
    }
}

/// Resolves template-bearing values against a fixed context.
///
/// This is the standalone entry to deep resolution: it carries its own
/// public scope and resolves values or expression sources on demand.
///
/// ```
/// # use djinn::{Context, TemplateSet};
/// # use djinn::value::Value;
/// let set = TemplateSet::new();
/// let mut ctx = Context::default();
/// ctx.insert("name", "Ada");
/// let resolver = set.deep_resolver(ctx);
/// let rv = resolver.resolve(&Value::from("Hello {{ name }}!")).unwrap();
/// assert_eq!(rv.to_string(), "Hello Ada!");
/// ```
pub struct DeepResolver<'set> {
    set: &'set TemplateSet,
    ctx: Context,
}

impl<'set> fmt::Debug for DeepResolver<'set> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepResolver").field("ctx", &self.ctx).finish()
    }
}

impl<'set> DeepResolver<'set> {
    pub(crate) fn new(set: &'set TemplateSet, ctx: Context) -> DeepResolver<'set> {
        DeepResolver { set, ctx }
    }

    /// Copies additional bindings into the resolver's context.
    pub fn update_context(&mut self, ctx: &Context) {
        self.ctx.update(ctx);
    }

    /// Evaluates an expression source (`"user.name"`) against the
    /// resolver's context, with deep resolution enabled.
    pub fn evaluate(&self, source: &str) -> Result<Value, Error> {
        let state = self.state();
        let expr = crate::parser::parse_expr(source, self.set)?;
        expr.evaluate(&state)
    }

    /// Resolves a single value.
    pub fn resolve(&self, value: &Value) -> Result<Value, Error> {
        let state = self.state();
        let (resolved, modified) = resolve_value(&state, value, 0)?;
        Ok(if modified { resolved } else { value.clone() })
    }

    fn state(&self) -> State<'set> {
        let mut options = self.set.options().clone();
        options.deep_resolve = true;
        State::new(
            self.set,
            options,
            "<deep-resolver>".to_string(),
            self.ctx.clone(),
        )
    }
}

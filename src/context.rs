//! Render contexts and the per-render state bundle.
use std::collections::BTreeMap;
use std::fmt;

use crate::environment::{Options, TemplateSet};
use crate::value::Value;

/// A string-keyed map of values handed to a render.
///
/// This is how data reaches templates.  The engine itself maintains a
/// second, private context per render for bindings introduced by
/// statements like `set` and `for`, which shadows the public one during
/// lookup.
///
/// ```
/// # use djinn::Context;
/// let mut ctx = Context::default();
/// ctx.insert("name", "Ada");
/// ctx.insert("year", 1815);
/// ```
#[derive(Default, Clone)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.values, f)
    }
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Context {
        Context::default()
    }

    /// Stores a value under a name.
    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.values.insert(key.into(), value.into());
    }

    /// Looks up a value by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Removes a value by name, returning it.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Copies all bindings of another context into this one.
    pub fn update(&mut self, other: &Context) {
        for (k, v) in other.values.iter() {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// The number of bindings.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Checks whether the context holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    // lookup with the optional case-insensitive fallback; the first
    // matching key in map order wins
    pub(crate) fn lookup(&self, key: &str, ignore_case: bool) -> Option<Value> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        if ignore_case {
            let lower = key.to_lowercase();
            for (k, v) in self.values.iter() {
                if k.to_lowercase() == lower {
                    return Some(v.clone());
                }
            }
        }
        None
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = Context::default();
        for (k, v) in iter {
            ctx.insert(k, v);
        }
        ctx
    }
}

/// The per-render state bundle.
///
/// Holds the public scope (caller data), the private scope (engine and
/// statement introduced bindings), the effective options and a reference
/// to the owning [`TemplateSet`].  Filters, tests and host callables
/// receive a reference to this.
pub struct State<'set> {
    pub(crate) set: &'set TemplateSet,
    pub(crate) options: Options,
    pub(crate) template_name: String,
    pub(crate) autoescape: bool,
    pub(crate) public: Context,
    pub(crate) private: Context,
    // how many template re-entries deep resolution has performed to
    // arrive at this render
    pub(crate) resolve_depth: usize,
}

impl<'set> fmt::Debug for State<'set> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("template_name", &self.template_name)
            .field("autoescape", &self.autoescape)
            .field("public", &self.public)
            .field("private", &self.private)
            .finish()
    }
}

impl<'set> State<'set> {
    pub(crate) fn new(
        set: &'set TemplateSet,
        options: Options,
        template_name: String,
        public: Context,
    ) -> State<'set> {
        let autoescape = options.autoescape;
        State {
            set,
            options,
            template_name,
            autoescape,
            public,
            private: Context::default(),
            resolve_depth: 0,
        }
    }

    /// The template set this render belongs to.
    pub fn set(&self) -> &TemplateSet {
        self.set
    }

    /// The name of the template being rendered.
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// Whether autoescaping is currently enabled.
    pub fn autoescape(&self) -> bool {
        self.autoescape
    }

    /// Whether deep resolution is enabled for this render.
    pub fn deep_resolve(&self) -> bool {
        self.options.deep_resolve
    }

    /// The public scope of this render.
    pub fn context(&self) -> &Context {
        &self.public
    }

    /// Looks up a name the way the resolver does: the private scope
    /// first, then the public scope.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        let ignore_case = self.options.ignore_variable_case;
        self.private
            .lookup(key, ignore_case)
            .or_else(|| self.public.lookup(key, ignore_case))
    }

    /// Formats a message through the configured translator.
    ///
    /// Without a translator the message is returned unchanged.
    pub fn translate(&self, msg: &str, args: &[Value]) -> String {
        match self.options.translator {
            Some(ref translator) => translator(msg, args),
            None => msg.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn test_case_fold_lookup() {
        let mut ctx = Context::default();
        ctx.insert("UserName", "ada");
        assert!(ctx.lookup("username", false).is_none());
        assert_eq!(
            ctx.lookup("username", true).map(|v| v.to_string()),
            Some("ada".to_string())
        );
        assert_eq!(
            ctx.lookup("UserName", false).map(|v| v.to_string()),
            Some("ada".to_string())
        );
    }
}

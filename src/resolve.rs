//! Expression evaluation and variable path resolution.
//!
//! Evaluation walks the parse tree against a render [`State`].  The
//! interesting part is the variable path walker: it blends the private
//! and public scopes for the root lookup, descends through fields,
//! indices and keys, invokes callables (binding record methods on the
//! way) under the sandbox options and optionally runs the deep resolver
//! on intermediate values.
//!
//! Missing fields, keys and indices resolve to nil rather than failing;
//! only access on a kind that cannot support it is an error.  A nil
//! encountered mid-path terminates the walk with a nil result.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::args::Args;
use crate::ast;
use crate::context::State;
use crate::deep;
use crate::error::{Error, ErrorKind};
use crate::key::Key;
use crate::value::{self, Callable, Kind, Value, ValueRepr};

/// Controls what happens when the walk ends on a callable.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) enum CallPolicy {
    /// Invoke callables, including bare references without parentheses.
    Invoke,
    /// Return the terminal callable itself instead of its result.  Used
    /// by the `callable` test.
    KeepTerminal,
}

impl<'a> ast::Expr<'a> {
    pub(crate) fn evaluate(&self, state: &State) -> Result<Value, Error> {
        match self {
            ast::Expr::Const(node) => Ok(node.value.clone()),
            ast::Expr::Var(node) => node
                .resolve(state, CallPolicy::Invoke)
                .map_err(|err| err.fill_location(state.template_name(), node.span())),
            ast::Expr::UnaryOp(node) => {
                let value = node.expr.evaluate(state)?;
                match node.op {
                    ast::UnaryOpKind::Not => Ok(Value::from(!value.is_true())),
                    ast::UnaryOpKind::Neg => value::neg(&value)
                        .map_err(|err| err.fill_location(state.template_name(), node.span())),
                }
            }
            ast::Expr::BinOp(node) => eval_binop(node, state)
                .map_err(|err| err.fill_location(state.template_name(), node.span())),
            ast::Expr::Filtered(node) => {
                let mut value = node.expr.evaluate(state)?;
                for call in &node.chain {
                    value = call.apply(state, &value)?;
                }
                Ok(value)
            }
            ast::Expr::Test(node) => node.evaluate(state),
            ast::Expr::List(node) => {
                let mut items = Vec::with_capacity(node.items.len());
                for item in &node.items {
                    items.push(item.evaluate(state)?);
                }
                Ok(Value::from(items).mark_safe())
            }
            ast::Expr::Map(node) => {
                let mut map = BTreeMap::new();
                for (key, value) in node.keys.iter().zip(node.values.iter()) {
                    map.insert(Key::from(key.to_string()), value.evaluate(state)?);
                }
                Ok(Value::from(map).mark_safe())
            }
        }
    }
}

fn eval_binop(node: &ast::BinOp<'_>, state: &State) -> Result<Value, Error> {
    // and/or short-circuit; everything else evaluates both sides
    // strictly left to right
    match node.op {
        ast::BinOpKind::ScAnd => {
            if !node.left.evaluate(state)?.is_true() {
                return Ok(Value::from(false));
            }
            return Ok(Value::from(node.right.evaluate(state)?.is_true()));
        }
        ast::BinOpKind::ScOr => {
            if node.left.evaluate(state)?.is_true() {
                return Ok(Value::from(true));
            }
            return Ok(Value::from(node.right.evaluate(state)?.is_true()));
        }
        _ => {}
    }

    let left = node.left.evaluate(state)?;
    let right = node.right.evaluate(state)?;
    match node.op {
        ast::BinOpKind::Eq => Ok(Value::from(left == right)),
        ast::BinOpKind::Ne => Ok(Value::from(left != right)),
        ast::BinOpKind::Lt => Ok(Value::from(left.compare(&right) == std::cmp::Ordering::Less)),
        ast::BinOpKind::Lte => Ok(Value::from(left.compare(&right) != std::cmp::Ordering::Greater)),
        ast::BinOpKind::Gt => Ok(Value::from(left.compare(&right) == std::cmp::Ordering::Greater)),
        ast::BinOpKind::Gte => Ok(Value::from(left.compare(&right) != std::cmp::Ordering::Less)),
        ast::BinOpKind::In => Ok(Value::from(right.contains(&left))),
        ast::BinOpKind::Add => value::add(&left, &right),
        ast::BinOpKind::Sub => value::sub(&left, &right),
        ast::BinOpKind::Mul => value::mul(&left, &right),
        ast::BinOpKind::Div => value::div(&left, &right),
        ast::BinOpKind::Rem => value::rem(&left, &right),
        ast::BinOpKind::ScAnd | ast::BinOpKind::ScOr => unreachable!(),
    }
}

impl<'a> ast::FilterCall<'a> {
    pub(crate) fn apply(&self, state: &State, value: &Value) -> Result<Value, Error> {
        let rv = match (&self.binding, &self.args) {
            (ast::FilterBinding::Single(filter), ast::FilterArgsKind::Single(param)) => {
                let param = match param {
                    Some(expr) => expr.evaluate(state)?,
                    None => Value::none(),
                };
                filter.apply(state, value, &param)
            }
            (ast::FilterBinding::Args(filter), ast::FilterArgsKind::Full(call)) => {
                let args = call.evaluate(state)?;
                filter.apply(state, value, &args)
            }
            _ => unreachable!("filter binding does not match its argument form"),
        };
        rv.map_err(|err| err.fill_location(state.template_name(), self.span))
    }
}

impl<'a> ast::CallArgs<'a> {
    pub(crate) fn evaluate(&self, state: &State) -> Result<Args, Error> {
        let mut positional = Vec::with_capacity(self.positional.len());
        for expr in &self.positional {
            positional.push(expr.evaluate(state)?);
        }
        let mut named = BTreeMap::new();
        for (name, expr) in &self.named {
            named.insert(name.to_string(), expr.evaluate(state)?);
        }
        Ok(Args::new(positional, named))
    }
}

impl<'a> ast::TestCall<'a> {
    pub(crate) fn evaluate(&self, state: &State) -> Result<Value, Error> {
        let mut passed = match self.name.as_ref() {
            // defined/undefined observe the resolution outcome instead of
            // an evaluated value
            "defined" | "undefined" => {
                let defined = matches!(self.term.evaluate(state), Ok(ref v) if !v.is_nil());
                if self.name.as_ref() == "undefined" {
                    !defined
                } else {
                    defined
                }
            }
            // escaped inspects the filter chain and the safe flag; this
            // tests prior filter application, not the current escaping
            // state of the text
            "escaped" => {
                let mut passed =
                    self.term.filter_applied("safe") || self.term.filter_applied("escape");
                if !passed {
                    if let Ok(value) = self.term.evaluate(state) {
                        passed = value.is_safe();
                    }
                }
                passed
            }
            // callable re-resolves the path keeping the terminal callable
            // since a normal resolve would invoke it
            "callable" => match self.term_var() {
                Some(var) => match var.resolve(state, CallPolicy::KeepTerminal) {
                    Ok(value) => value.is_callable(),
                    Err(_) => false,
                },
                None => false,
            },
            _ => {
                let value = self.term.evaluate(state)?;
                let args = self.args.evaluate(state)?;
                self.binding
                    .perform(state, &value, &args)
                    .map_err(|err| err.fill_location(state.template_name(), self.span))?
            }
        };
        if self.negated {
            passed = !passed;
        }
        Ok(Value::from(passed))
    }

    fn term_var(&self) -> Option<&ast::Var<'a>> {
        match &self.term {
            ast::Expr::Var(var) => Some(&**var),
            ast::Expr::Filtered(filtered) => match &filtered.expr {
                ast::Expr::Var(var) => Some(&**var),
                _ => None,
            },
            _ => None,
        }
    }
}

// a record method picked up during path resolution, invoked like any
// other callable
struct BoundMethod {
    recv: Value,
    name: String,
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<bound method {}>", self.name)
    }
}

impl Callable for BoundMethod {
    fn call(&self, state: &State, args: Args) -> Result<Value, Error> {
        match self.recv.as_record() {
            Some(rec) => rec.call_method(state, &self.name, args),
            None => Err(Error::new(
                ErrorKind::TypeError,
                "method receiver is not a record",
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<'a> ast::Var<'a> {
    pub(crate) fn resolve(&self, state: &State, policy: CallPolicy) -> Result<Value, Error> {
        let last_idx = self.parts.len() - 1;
        let mut current = Value::none();

        for (idx, part) in self.parts.iter().enumerate() {
            if idx == 0 {
                current = match part.kind {
                    ast::PartKind::Ident(name) => state.lookup(name).unwrap_or_default(),
                    _ => unreachable!("variable paths start with an identifier"),
                };
            } else {
                current = self.resolve_next_part(state, &current, part)?;
            }

            // a nil anywhere along the path resolves the whole variable
            // to nil
            if current.is_nil() {
                return Ok(Value::none());
            }

            if part.call.is_some() || current.is_callable() {
                let permitted = if idx == 0 {
                    !state.options.disable_context_functions
                } else {
                    !state.options.disable_nested_functions
                };
                if !permitted {
                    return Err(Error::new(
                        ErrorKind::DisabledFunction,
                        "function invocation support is disabled",
                    )
                    .with_sender("resolver"));
                }
                if policy == CallPolicy::KeepTerminal && idx == last_idx {
                    return Ok(current.mark_safe());
                }
                current = self.invoke(state, &current, part)?;
            }

            if state.options.deep_resolve && !current.is_nil() {
                let (resolved, modified) = deep::resolve_value(state, &current, 0)?;
                if modified {
                    current = resolved;
                }
            }
        }

        Ok(current)
    }

    fn resolve_next_part(
        &self,
        state: &State,
        current: &Value,
        part: &ast::Part<'a>,
    ) -> Result<Value, Error> {
        match &part.kind {
            ast::PartKind::Ident(name) => {
                if let Some(rec) = current.as_record() {
                    if rec.has_method(name) {
                        return Ok(Value::from_callable(BoundMethod {
                            recv: current.clone(),
                            name: name.to_string(),
                        }));
                    }
                    let field = rec.get_field(name).or_else(|| {
                        if state.options.ignore_variable_case {
                            rec.get_field_fold(name)
                        } else {
                            None
                        }
                    });
                    return Ok(field.unwrap_or_default());
                }
                if let Some(map) = current.as_map() {
                    return Ok(map_lookup_str(
                        map,
                        name,
                        state.options.ignore_variable_case,
                    ));
                }
                Err(Error::new(
                    ErrorKind::TypeError,
                    format!(
                        "can't access a field by name on kind {} (variable {})",
                        current.kind(),
                        self.describe()
                    ),
                )
                .with_sender("resolver"))
            }
            ast::PartKind::Index(idx) => self.index_value(current, *idx),
            ast::PartKind::Subscript(expr) => {
                let subscript = expr.evaluate(state)?;
                match current.kind() {
                    Kind::String | Kind::Seq => self.index_value(current, subscript.as_integer()),
                    Kind::Record => {
                        let rec = current.as_record().unwrap();
                        let name = subscript.to_string();
                        let field = rec.get_field(&name).or_else(|| {
                            if state.options.ignore_variable_case {
                                rec.get_field_fold(&name)
                            } else {
                                None
                            }
                        });
                        Ok(field.unwrap_or_default())
                    }
                    Kind::Map => {
                        if subscript.is_nil() {
                            return Ok(Value::none());
                        }
                        let map = current.as_map().unwrap();
                        if let Some(s) = subscript.as_str() {
                            return Ok(map_lookup_str(
                                map,
                                s,
                                state.options.ignore_variable_case,
                            ));
                        }
                        Ok(Key::try_from(subscript)
                            .ok()
                            .and_then(|key| map.get(&key).cloned())
                            .unwrap_or_default())
                    }
                    kind => Err(Error::new(
                        ErrorKind::TypeError,
                        format!(
                            "can't access an index on kind {} (variable {})",
                            kind,
                            self.describe()
                        ),
                    )
                    .with_sender("resolver")),
                }
            }
            ast::PartKind::Nil => Ok(Value::none()),
        }
    }

    // constant and computed integer indexes; strings index by byte
    // offset but return a single code point
    fn index_value(&self, current: &Value, idx: i64) -> Result<Value, Error> {
        let idx = match usize::try_from(idx) {
            Ok(idx) => idx,
            Err(_) => return Ok(Value::none()),
        };
        match &current.repr {
            ValueRepr::String(s) => Ok(s
                .get(idx..)
                .and_then(|rest| rest.chars().next())
                .map(Value::from)
                .unwrap_or_default()),
            ValueRepr::Seq(items) => Ok(items.get(idx).cloned().unwrap_or_default()),
            _ => Err(Error::new(
                ErrorKind::TypeError,
                format!(
                    "can't access an index on kind {} (variable {})",
                    current.kind(),
                    self.describe()
                ),
            )
            .with_sender("resolver")),
        }
    }

    fn invoke(&self, state: &State, current: &Value, part: &ast::Part<'a>) -> Result<Value, Error> {
        let callable = match current.as_callable() {
            Some(callable) => callable.clone(),
            None => {
                return Err(Error::new(
                    ErrorKind::TypeError,
                    format!(
                        "'{}' is not a function (it is {})",
                        self.describe(),
                        current.kind()
                    ),
                )
                .with_sender("resolver"))
            }
        };
        let args = match &part.call {
            Some(call) => call.evaluate(state)?,
            None => Args::default(),
        };
        callable.call(state, args).map_err(|err| {
            Error::new(
                ErrorKind::EvalError,
                format!("call to '{}' failed", self.describe()),
            )
            .with_sender("resolver")
            .with_source(err)
        })
    }
}

fn map_lookup_str(
    map: &BTreeMap<Key<'static>, Value>,
    name: &str,
    ignore_case: bool,
) -> Value {
    if let Some(value) = map.get(&Key::String(Arc::from(name))) {
        return value.clone();
    }
    if ignore_case {
        let lower = name.to_lowercase();
        for (key, value) in map.iter() {
            if let Some(s) = key.as_str() {
                if s.to_lowercase() == lower {
                    return value.clone();
                }
            }
        }
    }
    Value::none()
}

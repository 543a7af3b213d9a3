//! Statement rendering.
//!
//! A render is a straight-line walk of the parse tree.  Statements may
//! introduce bindings into the private scope (`set`, `for`, `with`);
//! expression output goes through the autoescape wrapper.
use crate::ast::{self, Spanned};
use crate::context::State;
use crate::error::Error;
use crate::value::Value;

pub(crate) fn render_stmt(stmt: &ast::Stmt, state: &mut State, out: &mut String) -> Result<(), Error> {
    match stmt {
        ast::Stmt::Template(node) => {
            for child in &node.children {
                render_stmt(child, state, out)?;
            }
            Ok(())
        }
        ast::Stmt::EmitRaw(node) => {
            out.push_str(node.raw);
            Ok(())
        }
        ast::Stmt::EmitExpr(node) => emit_expr(node, state, out),
        ast::Stmt::IfCond(node) => {
            let body = if node.expr.evaluate(state)?.is_true() {
                &node.true_body
            } else {
                &node.false_body
            };
            for child in body {
                render_stmt(child, state, out)?;
            }
            Ok(())
        }
        ast::Stmt::ForLoop(node) => render_for(node, state, out),
        ast::Stmt::WithBlock(node) => render_with(node, state, out),
        ast::Stmt::Set(node) => {
            let value = node.expr.evaluate(state)?;
            state.private.insert(node.name, value);
            Ok(())
        }
    }
}

/// Emits a `{{ expr }}` element.
///
/// When autoescaping is on and neither the `safe` filter was applied nor
/// the value is already safe, string values pass through the set's
/// configured autoescape filter before being written.
fn emit_expr(node: &Spanned<ast::EmitExpr>, state: &mut State, out: &mut String) -> Result<(), Error> {
    let mut value = node.expr.evaluate(state)?;

    if state.autoescape
        && value.is_string()
        && !value.is_safe()
        && !node.expr.filter_applied("safe")
    {
        if let Some(filter) = state.set.get_filter(&state.options.autoescape_filter) {
            value = filter.apply(state, &value, &Value::none())?;
        }
    }

    out.push_str(&value.to_string());
    Ok(())
}

fn render_for(node: &Spanned<ast::ForLoop>, state: &mut State, out: &mut String) -> Result<(), Error> {
    let iterable = node.iter.evaluate(state)?;

    // the body mutates the private scope, so collect the items up front
    let mut items: Vec<(Value, Option<Value>)> = Vec::new();
    iterable.iterate_order(
        |_, _, key, value| {
            items.push((key.clone(), value.cloned()));
            true
        },
        || {},
        node.reversed,
        node.sorted,
    );

    if items.is_empty() {
        for child in &node.else_body {
            render_stmt(child, state, out)?;
        }
        return Ok(());
    }

    let saved_target = state.private.remove(node.target);
    let saved_value = node
        .value_target
        .and_then(|name| state.private.remove(name));

    let mut rv = Ok(());
    for (key, value) in items {
        state.private.insert(node.target, key);
        if let Some(name) = node.value_target {
            state.private.insert(name, value.unwrap_or_default());
        }
        for child in &node.body {
            rv = render_stmt(child, state, out);
            if rv.is_err() {
                break;
            }
        }
        if rv.is_err() {
            break;
        }
    }

    restore(state, node.target, saved_target);
    if let Some(name) = node.value_target {
        restore(state, name, saved_value);
    }
    rv
}

fn render_with(node: &Spanned<ast::WithBlock>, state: &mut State, out: &mut String) -> Result<(), Error> {
    let mut saved: Vec<(&str, Option<Value>)> = Vec::new();
    for (name, expr) in &node.assignments {
        let value = expr.evaluate(state)?;
        saved.push((name, state.private.remove(name)));
        state.private.insert(*name, value);
    }

    let mut rv = Ok(());
    for child in &node.body {
        rv = render_stmt(child, state, out);
        if rv.is_err() {
            break;
        }
    }

    for (name, old) in saved.into_iter().rev() {
        restore(state, name, old);
    }
    rv
}

fn restore(state: &mut State, name: &str, old: Option<Value>) {
    match old {
        Some(value) => state.private.insert(name, value),
        None => {
            state.private.remove(name);
        }
    }
}

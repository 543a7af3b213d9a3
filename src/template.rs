use std::fmt;
use std::sync::Arc;

use self_cell::self_cell;

use crate::ast::{Expr, Stmt};
use crate::context::{Context, State};
use crate::environment::{Options, TemplateSet};
use crate::error::Error;
use crate::parser;
use crate::render::render_stmt;
use crate::value::Value;

self_cell!(
    struct TemplateParts {
        owner: String,

        #[covariant]
        dependent: Stmt,
    }
);

self_cell!(
    struct ExpressionParts {
        owner: String,

        #[covariant]
        dependent: Expr,
    }
);

/// A parsed template with its owned source.
///
/// The parse tree borrows from the source it was created from; tying the
/// two together makes the template freely shareable and lets template
/// handles live inside values (which is what deep resolution evaluates).
pub struct CompiledTemplate {
    name: String,
    parts: TemplateParts,
    options: Options,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .finish()
    }
}

impl CompiledTemplate {
    pub(crate) fn new(
        name: &str,
        source: String,
        set: &TemplateSet,
        options: Options,
    ) -> Result<CompiledTemplate, Error> {
        let parts = TemplateParts::try_new(source, |source| parser::parse(source, name, set))?;
        Ok(CompiledTemplate {
            name: name.to_string(),
            parts,
            options,
        })
    }

    pub(crate) fn root(&self) -> &Stmt<'_> {
        self.parts.borrow_dependent()
    }

    /// The name of the template.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source code of the template.
    pub fn source(&self) -> &str {
        self.parts.borrow_owner()
    }

    pub(crate) fn render_with_set(&self, set: &TemplateSet, ctx: Context) -> Result<String, Error> {
        self.render_nested(set, ctx, 0)
    }

    pub(crate) fn render_nested(
        &self,
        set: &TemplateSet,
        ctx: Context,
        resolve_depth: usize,
    ) -> Result<String, Error> {
        let mut state = State::new(set, self.options.clone(), self.name.clone(), ctx);
        state.resolve_depth = resolve_depth;
        let mut out = String::new();
        render_stmt(self.root(), &mut state, &mut out)?;
        Ok(out)
    }
}

/// Represents a handle to a template.
///
/// Handles are returned by [`TemplateSet::get_template`] and
/// [`TemplateSet::from_string`] and can be cheaply cloned.
#[derive(Clone)]
pub struct Template<'set> {
    set: &'set TemplateSet,
    compiled: Arc<CompiledTemplate>,
}

impl<'set> fmt::Debug for Template<'set> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.compiled.name())
            .finish()
    }
}

impl<'set> Template<'set> {
    pub(crate) fn new(set: &'set TemplateSet, compiled: Arc<CompiledTemplate>) -> Template<'set> {
        Template { set, compiled }
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        self.compiled.name()
    }

    /// Returns the source code of the template.
    pub fn source(&self) -> &str {
        self.compiled.source()
    }

    /// Renders the template with the given context into a string.
    pub fn render(&self, ctx: Context) -> Result<String, Error> {
        self.compiled.render_with_set(self.set, ctx)
    }

    /// Renders the template into a writer sink.
    pub fn render_to<W: fmt::Write>(&self, ctx: Context, out: &mut W) -> Result<(), Error> {
        let rendered = self.render(ctx)?;
        out.write_str(&rendered)?;
        Ok(())
    }

    /// Wraps the template in a value.
    ///
    /// A template value placed into a context is evaluated by the deep
    /// resolver with the public scope of the current render.
    pub fn to_value(&self) -> Value {
        Value::from_template(self.compiled.clone())
    }
}

pub(crate) struct CompiledExpression {
    parts: ExpressionParts,
}

impl CompiledExpression {
    pub(crate) fn new(source: String, set: &TemplateSet) -> Result<CompiledExpression, Error> {
        let parts = ExpressionParts::try_new(source, |source| parser::parse_expr(source, set))?;
        Ok(CompiledExpression { parts })
    }

    pub(crate) fn root(&self) -> &Expr<'_> {
        self.parts.borrow_dependent()
    }
}

/// A handle to a compiled expression.
///
/// An expression is created via
/// [`compile_expression`](TemplateSet::compile_expression) and evaluated
/// against a context, returning the resulting value.
pub struct Expression<'set> {
    set: &'set TemplateSet,
    compiled: Arc<CompiledExpression>,
}

impl<'set> fmt::Debug for Expression<'set> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression").finish()
    }
}

impl<'set> Expression<'set> {
    pub(crate) fn new(
        set: &'set TemplateSet,
        compiled: Arc<CompiledExpression>,
    ) -> Expression<'set> {
        Expression { set, compiled }
    }

    /// Evaluates the expression with some context.
    pub fn eval(&self, ctx: Context) -> Result<Value, Error> {
        let state = State::new(
            self.set,
            self.set.options().clone(),
            "<expression>".to_string(),
            ctx,
        );
        self.compiled.root().evaluate(&state)
    }
}

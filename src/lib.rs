//! <strong>djinn: a Django-flavored template engine core for Rust</strong>
//!
//! djinn implements the expression subsystem of a text template engine in
//! the Django/Jinja lineage: variable expressions (`{{ … }}`),
//! control-flow blocks (`{% … %}`) and comments (`{# … #}`) are combined
//! with caller supplied data and rendered to text.  It features filters,
//! tests, nested variable navigation with method invocation, a dynamic
//! value abstraction bridging arbitrary host data through [`serde`],
//! autoescaping with a `safe` escape hatch, a sandbox discipline and deep
//! resolution of template-bearing values.
//!
//! ```jinja
//! {% for user in users sorted %}
//!   <li>{{ user.name|capitalize }}</li>
//! {% endfor %}
//! ```
//!
//! # Template Usage
//!
//! Templates live in a [`TemplateSet`] which carries the filter and test
//! registries and the options.  Data is passed as a [`Context`], most
//! conveniently built with the [`context!`] macro:
//!
//! ```
//! use djinn::{context, TemplateSet};
//!
//! let mut set = TemplateSet::new();
//! set.add_template("hello", "Hello {{ name }}!").unwrap();
//! let tmpl = set.get_template("hello").unwrap();
//! println!("{}", tmpl.render(context!(name => "John")).unwrap());
//! ```
//!
//! ```plain
//! Hello John!
//! ```
//!
//! # Expression Usage
//!
//! The expression language can be used standalone, which is useful for
//! logic in configuration files and similar places.  For this purpose
//! [`TemplateSet::compile_expression`] can be used:
//!
//! ```
//! use djinn::{context, TemplateSet};
//!
//! let set = TemplateSet::new();
//! let expr = set.compile_expression("number < 42").unwrap();
//! let result = expr.eval(context!(number => 23)).unwrap();
//! assert_eq!(result.is_true(), true);
//! ```
//!
//! # Learn more
//!
//! - [`TemplateSet`]: the main API entry point.
//! - [`Template`]: the template handle API.
//! - [`value`]: the dynamic value system and the [`Record`](value::Record)
//!   and [`Callable`](value::Callable) host-data traits.
//! - [`filters`]: how to write custom filters and the builtin list.
//! - [`tests`]: how to write custom tests and the builtin list.
#![allow(clippy::cognitive_complexity)]
#![deny(missing_docs)]

#[macro_use]
mod macros;

mod ast;
mod context;
mod deep;
mod environment;
mod error;
mod key;
mod lexer;
mod parser;
mod render;
mod resolve;
mod serialize;
mod template;
mod tokens;
mod utils;

pub mod filters;
pub mod functions;
pub mod tests;
pub mod value;

mod args;

pub use self::args::{expect_args, expect_named_args, Args};
pub use self::context::{Context, State};
pub use self::deep::DeepResolver;
pub use self::environment::{Options, TemplateSet, TranslatorFunc};
pub use self::error::{Error, ErrorKind};
pub use self::lexer::WhitespaceConfig;
pub use self::template::{Expression, Template};
pub use self::tokens::Span;
pub use self::utils::HtmlEscape;

//! Host function support.
//!
//! Functions become values placed into a context (or registered as a
//! global on the set) and are invoked through the call syntax in variable
//! paths: `{{ f(1, 2) }}`.  A referenced function is also invoked without
//! parentheses, which is why the sandbox options
//! (`disable_context_functions`, `disable_nested_functions`) act on the
//! reference as well.
//!
//! A function is a plain Rust function taking the render [`State`] and
//! typed arguments:
//!
//! ```
//! # use djinn::{context, State, Error, TemplateSet};
//! # use djinn::value::Value;
//! fn shout(_state: &State, text: String) -> Result<String, Error> {
//!     Ok(format!("{}!", text.to_uppercase()))
//! }
//!
//! let set = TemplateSet::new();
//! let tmpl = set.from_string("{{ shout('hi') }}").unwrap();
//! let mut ctx = context! {};
//! ctx.insert("shout", Value::from_function("shout", shout));
//! assert_eq!(tmpl.render(ctx).unwrap(), "HI!");
//! ```
use std::fmt;
use std::sync::Arc;

use crate::args::Args;
use crate::context::State;
use crate::error::{Error, ErrorKind};
use crate::value::{Callable, FunctionArgs, Value};

type FuncFunc = dyn Fn(&State, Vec<Value>) -> Result<Value, Error> + Sync + Send + 'static;

/// A boxed host function.
#[derive(Clone)]
pub struct BoxedFunction {
    func: Arc<FuncFunc>,
    name: String,
}

/// A utility trait that represents host functions.
pub trait Function<Rv = Value, Args = ()>: Send + Sync + 'static {
    /// Calls the function with the given arguments.
    fn invoke(&self, state: &State, args: Args) -> Result<Rv, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, Rv, $($name),*> Function<Rv, ($($name,)*)> for Func
        where
            Func: Fn(&State, $($name),*) -> Result<Rv, Error> + Send + Sync + 'static
        {
            fn invoke(&self, state: &State, args: ($($name,)*)) -> Result<Rv, Error> {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)(state, $($name,)*)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }

impl BoxedFunction {
    /// Creates a new boxed function.
    pub fn new<F, Rv, Args>(name: &str, f: F) -> BoxedFunction
    where
        F: Function<Rv, Args>,
        Rv: Into<Value>,
        Args: FunctionArgs,
    {
        BoxedFunction {
            func: Arc::new(move |state, args| -> Result<Value, Error> {
                f.invoke(state, FunctionArgs::from_values(args)?)
                    .map(Into::into)
            }),
            name: name.to_string(),
        }
    }

    /// Invokes the function.
    pub fn invoke(&self, state: &State, args: Vec<Value>) -> Result<Value, Error> {
        (self.func)(state, args)
    }

    /// Wraps the function in a value.
    pub fn to_value(&self) -> Value {
        Value::from_callable(self.clone())
    }
}

impl fmt::Debug for BoxedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

impl Callable for BoxedFunction {
    fn call(&self, state: &State, args: Args) -> Result<Value, Error> {
        if !args.named_map().is_empty() {
            let name = args.named_map().keys().next().cloned().unwrap_or_default();
            return Err(Error::new(ErrorKind::InvalidParameterName, name)
                .with_sender(format!("function:{}", self.name)));
        }
        self.invoke(state, args.into_positional())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Value {
    /// Creates a value wrapping a host function.
    ///
    /// The name is used in diagnostics only.
    pub fn from_function<F, Rv, Args>(name: &str, f: F) -> Value
    where
        F: Function<Rv, Args>,
        Rv: Into<Value>,
        Args: FunctionArgs,
    {
        BoxedFunction::new(name, f).to_value()
    }
}

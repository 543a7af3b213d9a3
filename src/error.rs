use std::borrow::Cow;
use std::fmt;

use crate::tokens::Span;

/// Represents errors raised by the engine.
///
/// Errors carry a kind, a human readable detail, an optional sender tag
/// naming the component that produced the failure (for example
/// `filter:length`) and, when known, the template name and position of
/// the token the failure is anchored to.
///
/// The engine takes advantage of chained errors, so it's recommended to
/// render the entire chain to understand the causes:
///
/// ```rust
/// # let set = djinn::TemplateSet::new(); let ctx = djinn::Context::default();
/// # let template = set.from_string("").unwrap();
/// match template.render(ctx) {
///     Ok(result) => println!("{}", result),
///     Err(err) => {
///         eprintln!("could not render template: {}", err);
///         let mut err = &err as &dyn std::error::Error;
///         while let Some(next_err) = err.source() {
///             eprintln!("caused by: {}", next_err);
///             err = next_err;
///         }
///     }
/// }
/// ```
pub struct Error {
    repr: Box<ErrorRepr>,
}

struct ErrorRepr {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    sender: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: usize,
    span: Option<Span>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The scanner encountered malformed source.
    LexError,
    /// The template has a syntax error.
    ParseError,
    /// Evaluation of an expression or template failed.
    EvalError,
    /// A filter, test or function received a bad number of parameters.
    InvalidParameterCount,
    /// A filter, test or function received an unknown named parameter.
    InvalidParameterName,
    /// A function was invoked while function invocation is disabled.
    DisabledFunction,
    /// A banned filter was used.
    BannedFilter,
    /// A field, index or key access was attempted on an incompatible kind.
    TypeError,
    /// Failed writing rendered output.
    WriteFailure,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::LexError => "syntax error",
            ErrorKind::ParseError => "parse error",
            ErrorKind::EvalError => "evaluation error",
            ErrorKind::InvalidParameterCount => "invalid parameter count",
            ErrorKind::InvalidParameterName => "invalid parameter name",
            ErrorKind::DisabledFunction => "function invocation disabled",
            ErrorKind::BannedFilter => "banned filter",
            ErrorKind::TypeError => "type error",
            ErrorKind::WriteFailure => "failed to write output",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut err = f.debug_struct("Error");
        err.field("kind", &self.kind());
        if let Some(ref detail) = self.repr.detail {
            err.field("detail", detail);
        }
        if let Some(ref sender) = self.repr.sender {
            err.field("sender", sender);
        }
        if let Some(name) = self.name() {
            err.field("name", &name);
        }
        if let Some(line) = self.line() {
            err.field("line", &line);
        }
        if let Some(ref source) = std::error::Error::source(self) {
            err.field("source", source);
        }
        err.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref sender) = self.repr.sender {
            write!(f, "[{}] ", sender)?;
        }
        if let Some(ref detail) = self.repr.detail {
            write!(f, "{}: {}", self.kind(), detail)?;
        } else {
            write!(f, "{}", self.kind())?;
        }
        if let Some(name) = self.name() {
            write!(f, " (in {}:{})", name, self.line().unwrap_or(0))?;
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: Some(detail.into()),
                sender: None,
                name: None,
                lineno: 0,
                span: None,
                source: None,
            }),
        }
    }

    /// Tags the error with the component that raised it (eg. `filter:join`).
    pub fn with_sender<S: Into<Cow<'static, str>>>(mut self, sender: S) -> Error {
        self.repr.sender = Some(sender.into());
        self
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.repr.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.repr.kind
    }

    /// Returns the sender tag if one was attached.
    pub fn sender(&self) -> Option<&str> {
        self.repr.sender.as_deref()
    }

    /// Returns the detail message if one was attached.
    pub fn detail(&self) -> Option<&str> {
        self.repr.detail.as_deref()
    }

    /// Returns the name of the template that caused the error.
    pub fn name(&self) -> Option<&str> {
        self.repr.name.as_deref()
    }

    /// Returns the line number where the error occurred.
    pub fn line(&self) -> Option<usize> {
        if self.repr.lineno > 0 {
            Some(self.repr.lineno)
        } else {
            None
        }
    }

    /// Returns the span of the token the error is anchored to.
    pub fn span(&self) -> Option<Span> {
        self.repr.span
    }

    pub(crate) fn set_location(&mut self, name: &str, lineno: usize) {
        self.repr.name = Some(name.into());
        self.repr.lineno = lineno;
    }

    pub(crate) fn set_span(&mut self, name: &str, span: Span) {
        self.repr.name = Some(name.into());
        self.repr.span = Some(span);
        self.repr.lineno = span.start_line;
    }

    // anchors the error at the given token unless an earlier frame
    // already did
    pub(crate) fn fill_location(mut self, name: &str, span: Span) -> Error {
        if self.repr.name.is_none() {
            self.set_span(name, span);
        }
        self
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.repr.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: None,
                sender: None,
                name: None,
                lineno: 0,
                span: None,
                source: None,
            }),
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::WriteFailure, "formatting failed")
    }
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::InvalidParameterCount,
        "test divisibleby expected 1 parameter(s), received 0",
    )
    .with_sender("test:divisibleby");
    assert_eq!(
        err.to_string(),
        "[test:divisibleby] invalid parameter count: test divisibleby expected 1 parameter(s), received 0"
    );
}

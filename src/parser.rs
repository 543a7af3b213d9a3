use std::borrow::Cow;

use crate::ast::{self, Spanned};
use crate::environment::TemplateSet;
use crate::error::{Error, ErrorKind};
use crate::lexer::{tokenize, WhitespaceConfig};
use crate::tokens::{Keyword, Span, Token};
use crate::value::Value;

macro_rules! syntax_error {
    ($msg:expr) => {{
        return Err(Error::new(ErrorKind::ParseError, $msg).with_sender("parser"));
    }};
    ($msg:expr, $($tt:tt)*) => {{
        return Err(Error::new(ErrorKind::ParseError, format!($msg, $($tt)*)).with_sender("parser"));
    }};
}

macro_rules! expect_token {
    ($parser:expr, $expectation:expr) => {{
        match $parser.stream.next()? {
            Some(rv) => Ok(rv),
            None => Err(Error::new(
                ErrorKind::ParseError,
                format!("unexpected end of input, expected {}", $expectation),
            )
            .with_sender("parser")),
        }
    }};
    ($parser:expr, $match:pat, $expectation:expr) => {{
        match $parser.stream.next()? {
            Some((token, span)) if matches!(token, $match) => Ok((token, span)),
            Some((token, _)) => Err(Error::new(
                ErrorKind::ParseError,
                format!("unexpected {}, expected {}", token, $expectation),
            )
            .with_sender("parser")),
            None => Err(Error::new(
                ErrorKind::ParseError,
                format!("unexpected end of input, expected {}", $expectation),
            )
            .with_sender("parser")),
        }
    }};
    ($parser:expr, $match:pat => $target:expr, $expectation:expr) => {{
        match $parser.stream.next()? {
            Some(($match, span)) => Ok(($target, span)),
            Some((token, _)) => Err(Error::new(
                ErrorKind::ParseError,
                format!("unexpected {}, expected {}", token, $expectation),
            )
            .with_sender("parser")),
            None => Err(Error::new(
                ErrorKind::ParseError,
                format!("unexpected end of input, expected {}", $expectation),
            )
            .with_sender("parser")),
        }
    }};
}

struct TokenStream<'a> {
    iter: Box<dyn Iterator<Item = Result<(Token<'a>, Span), Error>> + 'a>,
    current: Option<Result<(Token<'a>, Span), Error>>,
    current_span: Span,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str, in_expr: bool, ws: WhitespaceConfig) -> TokenStream<'a> {
        TokenStream {
            iter: Box::new(tokenize(source, in_expr, ws)) as Box<dyn Iterator<Item = _>>,
            current: None,
            current_span: Span::default(),
        }
    }

    /// Advance the stream.
    pub fn next(&mut self) -> Result<Option<(Token<'a>, Span)>, Error> {
        let rv = self.current.take();
        self.current = self.iter.next();
        if let Some(Ok((_, span))) = rv {
            self.current_span = span;
        }
        rv.transpose()
    }

    /// Look at the current token.
    pub fn current(&mut self) -> Result<Option<(&Token<'a>, Span)>, Error> {
        if self.current.is_none() {
            self.current = self.iter.next();
        }
        match self.current {
            Some(Ok(ref tok)) => Ok(Some((&tok.0, tok.1))),
            Some(Err(_)) => Err(self.current.take().unwrap().unwrap_err()),
            None => Ok(None),
        }
    }

    /// Expands the span to the current location.
    pub fn expand_span(&self, mut span: Span) -> Span {
        span.end_line = self.current_span.end_line;
        span.end_col = self.current_span.end_col;
        span
    }

    /// Returns the last seen span.
    pub fn current_span(&self) -> Span {
        self.current_span
    }
}

struct Parser<'a, 'set> {
    stream: TokenStream<'a>,
    set: &'set TemplateSet,
}

macro_rules! binop {
    ($func:ident, $next:ident, { $($tok:tt)* }) => {
        fn $func(&mut self) -> Result<ast::Expr<'a>, Error> {
            let span = self.stream.current_span();
            let mut left = self.$next()?;
            loop {
                let op = match self.stream.current()? {
                    $($tok)*
                    _ => break,
                };
                self.stream.next()?;
                let right = self.$next()?;
                left = ast::Expr::BinOp(Spanned::new(
                    ast::BinOp {
                        op,
                        left,
                        right,
                    },
                    self.stream.expand_span(span),
                ));
            }
            Ok(left)
        }
    };
}

impl<'a, 'set> Parser<'a, 'set> {
    pub fn new(source: &'a str, in_expr: bool, set: &'set TemplateSet) -> Parser<'a, 'set> {
        let ws = WhitespaceConfig {
            trim_blocks: set.options().trim_blocks,
            lstrip_blocks: set.options().lstrip_blocks,
        };
        Parser {
            stream: TokenStream::new(source, in_expr, ws),
            set,
        }
    }

    pub fn parse_expr(&mut self) -> Result<ast::Expr<'a>, Error> {
        self.parse_or()
    }

    binop!(parse_or, parse_and, {
        Some((Token::Keyword(Keyword::Or), _)) => ast::BinOpKind::ScOr,
    });
    binop!(parse_and, parse_not, {
        Some((Token::Keyword(Keyword::And), _)) => ast::BinOpKind::ScAnd,
    });

    fn parse_not(&mut self) -> Result<ast::Expr<'a>, Error> {
        let span = self.stream.current_span();
        if matches!(
            self.stream.current()?,
            Some((Token::Keyword(Keyword::Not), _))
        ) {
            self.stream.next()?;
            return Ok(ast::Expr::UnaryOp(Spanned::new(
                ast::UnaryOp {
                    op: ast::UnaryOpKind::Not,
                    expr: self.parse_not()?,
                },
                self.stream.expand_span(span),
            )));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<ast::Expr<'a>, Error> {
        let mut span = self.stream.current_span();
        let mut expr = self.parse_math1()?;
        loop {
            let mut negated = false;
            let op = match self.stream.current()? {
                Some((Token::Eq, _)) => ast::BinOpKind::Eq,
                Some((Token::Ne, _)) => ast::BinOpKind::Ne,
                Some((Token::Lt, _)) => ast::BinOpKind::Lt,
                Some((Token::Lte, _)) => ast::BinOpKind::Lte,
                Some((Token::Gt, _)) => ast::BinOpKind::Gt,
                Some((Token::Gte, _)) => ast::BinOpKind::Gte,
                Some((Token::Keyword(Keyword::In), _)) => ast::BinOpKind::In,
                Some((Token::Keyword(Keyword::Not), _)) => {
                    self.stream.next()?;
                    expect_token!(self, Token::Keyword(Keyword::In), "in")?;
                    negated = true;
                    ast::BinOpKind::In
                }
                Some((Token::Keyword(Keyword::Is), _)) => {
                    self.stream.next()?;
                    expr = self.parse_test(expr)?;
                    span = self.stream.current_span();
                    continue;
                }
                _ => break,
            };
            if !negated {
                self.stream.next()?;
            }
            expr = ast::Expr::BinOp(Spanned::new(
                ast::BinOp {
                    op,
                    left: expr,
                    right: self.parse_math1()?,
                },
                self.stream.expand_span(span),
            ));
            if negated {
                expr = ast::Expr::UnaryOp(Spanned::new(
                    ast::UnaryOp {
                        op: ast::UnaryOpKind::Not,
                        expr,
                    },
                    self.stream.expand_span(span),
                ));
            }
            span = self.stream.current_span();
        }
        Ok(expr)
    }

    binop!(parse_math1, parse_math2, {
        Some((Token::Plus, _)) => ast::BinOpKind::Add,
        Some((Token::Minus, _)) => ast::BinOpKind::Sub,
    });
    binop!(parse_math2, parse_unary, {
        Some((Token::Mul, _)) => ast::BinOpKind::Mul,
        Some((Token::Div, _)) => ast::BinOpKind::Div,
        Some((Token::Mod, _)) => ast::BinOpKind::Rem,
    });

    fn parse_unary(&mut self) -> Result<ast::Expr<'a>, Error> {
        let span = self.stream.current_span();
        if matches!(self.stream.current()?, Some((Token::Minus, _))) {
            self.stream.next()?;
            return Ok(ast::Expr::UnaryOp(Spanned::new(
                ast::UnaryOp {
                    op: ast::UnaryOpKind::Neg,
                    expr: self.parse_unary()?,
                },
                self.stream.expand_span(span),
            )));
        }
        let expr = self.parse_primary()?;
        self.parse_filter_chain(expr)
    }

    fn parse_filter_chain(&mut self, expr: ast::Expr<'a>) -> Result<ast::Expr<'a>, Error> {
        let mut chain = Vec::new();
        let span = expr.span();
        while matches!(self.stream.current()?, Some((Token::Pipe, _))) {
            self.stream.next()?;
            chain.push(self.parse_filter()?);
        }
        if chain.is_empty() {
            Ok(expr)
        } else {
            Ok(ast::Expr::Filtered(Spanned::new(
                ast::Filtered { expr, chain },
                self.stream.expand_span(span),
            )))
        }
    }

    /// Parses one filter application after a `|`.
    ///
    /// The filter is bound against the set's tables here; unknown and
    /// banned names fail the parse.
    fn parse_filter(&mut self) -> Result<ast::FilterCall<'a>, Error> {
        let (name, span) = expect_token!(self, Token::Ident(name) => name, "filter name")?;

        if self.set.is_banned_filter(name) {
            return Err(Error::new(
                ErrorKind::BannedFilter,
                format!(
                    "usage of filter '{}' is not allowed (sandbox restriction active)",
                    name
                ),
            )
            .with_sender("parser"));
        }

        let single = self.set.get_filter(name).cloned();
        let args_form = if single.is_none() {
            self.set.get_filter_args(name).cloned()
        } else {
            None
        };
        if single.is_none() && args_form.is_none() {
            syntax_error!("filter '{}' does not exist", name);
        }

        // `:param` is the legacy single parameter syntax, `(args)` the
        // full form; both work with both filter shapes within the
        // compatibility rules
        let mut positional = Vec::new();
        let mut named = Vec::new();
        if matches!(self.stream.current()?, Some((Token::Colon, _))) {
            self.stream.next()?;
            positional.push(self.parse_primary()?);
        } else if matches!(self.stream.current()?, Some((Token::ParenOpen, _))) {
            let call = self.parse_call_args()?;
            positional = call.positional;
            named = call.named;
        }

        let (binding, args) = match single {
            Some(filter) => {
                if positional.len() + named.len() > 1 {
                    syntax_error!("too many parameters for this filter call");
                }
                let param = positional
                    .into_iter()
                    .next()
                    .or_else(|| named.into_iter().next().map(|(_, expr)| expr));
                (ast::FilterBinding::Single(filter), ast::FilterArgsKind::Single(param))
            }
            None => (
                ast::FilterBinding::Args(args_form.unwrap()),
                ast::FilterArgsKind::Full(ast::CallArgs { positional, named }),
            ),
        };

        Ok(ast::FilterCall {
            name,
            span,
            args,
            binding,
        })
    }

    /// Parses a test invocation after `is`.
    fn parse_test(&mut self, term: ast::Expr<'a>) -> Result<ast::Expr<'a>, Error> {
        let span = self.stream.current_span();
        let negated = if matches!(
            self.stream.current()?,
            Some((Token::Keyword(Keyword::Not), _))
        ) {
            self.stream.next()?;
            true
        } else {
            false
        };

        // symbols and some keywords double as test names (`==`, `in`,
        // `true`, `none`, ...)
        let (name, name_span): (Cow<'a, str>, Span) = match self.stream.next()? {
            Some((Token::Ident(name), span)) => (Cow::Borrowed(name), span),
            Some((Token::Eq, span)) => (Cow::Borrowed("=="), span),
            Some((Token::Ne, span)) => (Cow::Borrowed("!="), span),
            Some((Token::Gt, span)) => (Cow::Borrowed(">"), span),
            Some((Token::Gte, span)) => (Cow::Borrowed(">="), span),
            Some((Token::Lt, span)) => (Cow::Borrowed("<"), span),
            Some((Token::Lte, span)) => (Cow::Borrowed("<="), span),
            Some((Token::Keyword(Keyword::In), span)) => (Cow::Borrowed("in"), span),
            Some((Token::Keyword(Keyword::True), span)) => (Cow::Borrowed("true"), span),
            Some((Token::Keyword(Keyword::False), span)) => (Cow::Borrowed("false"), span),
            Some((Token::Nil, span)) => (Cow::Borrowed("none"), span),
            Some((token, _)) => syntax_error!("unexpected {}, expected test name", token),
            None => syntax_error!("unexpected end of input, expected test name"),
        };

        let binding = match self.set.get_test(&name) {
            Some(test) => test.clone(),
            None => syntax_error!("test '{}' does not exist", name),
        };

        let mut args = ast::CallArgs::default();
        if matches!(self.stream.current()?, Some((Token::ParenOpen, _))) {
            args = self.parse_call_args()?;
        } else if matches!(
            self.stream.current()?,
            Some((Token::Ident(_), _))
                | Some((Token::Str(_), _))
                | Some((Token::Int(_), _))
                | Some((Token::Nil, _))
                | Some((Token::Keyword(Keyword::True), _))
                | Some((Token::Keyword(Keyword::False), _))
        ) {
            // single bare argument form: `n is divisibleby 3`
            args.positional.push(self.parse_primary()?);
        }

        Ok(ast::Expr::Test(Spanned::new(
            ast::TestCall {
                name,
                span: name_span,
                term,
                args,
                negated,
                binding,
            },
            self.stream.expand_span(span),
        )))
    }

    /// Parses a parenthesized argument list with positional and named
    /// arguments.  Consumes both parens.
    fn parse_call_args(&mut self) -> Result<ast::CallArgs<'a>, Error> {
        let mut args = ast::CallArgs::default();

        expect_token!(self, Token::ParenOpen, "`(`")?;
        loop {
            if matches!(self.stream.current()?, Some((Token::ParenClose, _))) {
                break;
            }
            if !args.positional.is_empty() || !args.named.is_empty() {
                expect_token!(self, Token::Comma, "`,`")?;
            }
            let expr = self.parse_expr()?;

            // a lone identifier followed by `=` is a named argument
            let name = match expr {
                ast::Expr::Var(ref var)
                    if var.parts.len() == 1
                        && var.parts[0].call.is_none()
                        && matches!(self.stream.current()?, Some((Token::Assign, _))) =>
                {
                    match var.parts[0].kind {
                        ast::PartKind::Ident(name) => Some(name),
                        _ => None,
                    }
                }
                _ => None,
            };

            match name {
                Some(name) => {
                    self.stream.next()?;
                    let value = self.parse_expr()?;
                    args.named.push((name, value));
                }
                None if !args.named.is_empty() => {
                    syntax_error!("non-keyword arg after keyword arg");
                }
                None => {
                    args.positional.push(expr);
                }
            }
        }

        expect_token!(self, Token::ParenClose, "`)`")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<ast::Expr<'a>, Error> {
        let (token, span) = expect_token!(self, "expression")?;
        macro_rules! const_val {
            ($expr:expr) => {
                ast::Expr::Const(Spanned::new(
                    ast::Const {
                        value: Value::from($expr),
                    },
                    span,
                ))
            };
        }

        match token {
            Token::Keyword(Keyword::True) => Ok(const_val!(true)),
            Token::Keyword(Keyword::False) => Ok(const_val!(false)),
            Token::Nil => Ok(const_val!(())),
            Token::Keyword(kw) => {
                syntax_error!("the keyword `{}` is not allowed here", kw.as_str())
            }
            Token::Str(val) => Ok(const_val!(val)),
            Token::Int(val) => {
                // an integer followed by a dot and another integer is the
                // only way a float literal comes into existence
                if matches!(self.stream.current()?, Some((Token::Dot, _))) {
                    self.stream.next()?;
                    let (frac, _) =
                        expect_token!(self, Token::Int(frac) => frac, "number after `.`")?;
                    let float_repr = format!("{}.{}", val, frac);
                    match float_repr.parse::<f64>() {
                        Ok(fv) => Ok(ast::Expr::Const(Spanned::new(
                            ast::Const {
                                value: Value::from(fv),
                            },
                            self.stream.expand_span(span),
                        ))),
                        Err(_) => syntax_error!("invalid float literal"),
                    }
                } else {
                    Ok(const_val!(val))
                }
            }
            Token::ParenOpen => {
                let expr = self.parse_expr()?;
                expect_token!(self, Token::ParenClose, "`)`")?;
                Ok(expr)
            }
            Token::BracketOpen => {
                let mut items = Vec::new();
                loop {
                    if matches!(self.stream.current()?, Some((Token::BracketClose, _))) {
                        break;
                    }
                    if !items.is_empty() {
                        expect_token!(self, Token::Comma, "`,`")?;
                    }
                    if matches!(self.stream.current()?, Some((Token::BracketClose, _))) {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                expect_token!(self, Token::BracketClose, "`]`")?;
                Ok(ast::Expr::List(Spanned::new(
                    ast::List { items },
                    self.stream.expand_span(span),
                )))
            }
            Token::BraceOpen => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                loop {
                    if matches!(self.stream.current()?, Some((Token::BraceClose, _))) {
                        break;
                    }
                    if !keys.is_empty() {
                        expect_token!(self, Token::Comma, "`,`")?;
                    }
                    if matches!(self.stream.current()?, Some((Token::BraceClose, _))) {
                        break;
                    }
                    keys.push(self.parse_dict_key()?);
                    expect_token!(self, Token::Colon, "`:`")?;
                    values.push(self.parse_expr()?);
                }
                expect_token!(self, Token::BraceClose, "`}`")?;
                Ok(ast::Expr::Map(Spanned::new(
                    ast::Map { keys, values },
                    self.stream.expand_span(span),
                )))
            }
            Token::Ident(name) => self.parse_var_path(name, span),
            token => syntax_error!("unexpected {}", token),
        }
    }

    fn parse_dict_key(&mut self) -> Result<Cow<'a, str>, Error> {
        match self.stream.next()? {
            Some((Token::Ident(name), _)) => Ok(Cow::Borrowed(name)),
            Some((Token::Str(s), _)) => Ok(s),
            Some((Token::Int(i), _)) => Ok(Cow::Owned(i.to_string())),
            Some((token, _)) => {
                syntax_error!("unexpected {}, expected identifier, string or number", token)
            }
            None => syntax_error!("unexpected end of input, expected dict key"),
        }
    }

    /// Parses a variable path after the leading identifier.
    ///
    /// `IDENT ( '.' (IDENT|NUMBER|nil) | '[' expr ']' | '(' args ')' )*`
    fn parse_var_path(&mut self, root: &'a str, span: Span) -> Result<ast::Expr<'a>, Error> {
        let mut parts = vec![ast::Part {
            kind: ast::PartKind::Ident(root),
            call: None,
        }];

        loop {
            match self.stream.current()? {
                Some((Token::Dot, _)) => {
                    self.stream.next()?;
                    match self.stream.next()? {
                        Some((Token::Ident(name), _)) => parts.push(ast::Part {
                            kind: ast::PartKind::Ident(name),
                            call: None,
                        }),
                        Some((Token::Int(idx), _)) => parts.push(ast::Part {
                            kind: ast::PartKind::Index(idx),
                            call: None,
                        }),
                        Some((Token::Nil, _)) => parts.push(ast::Part {
                            kind: ast::PartKind::Nil,
                            call: None,
                        }),
                        Some((token, _)) => {
                            syntax_error!("{} is not allowed within a variable name", token)
                        }
                        None => syntax_error!(
                            "unexpected end of input, expected identifier or number after `.`"
                        ),
                    }
                }
                Some((Token::BracketOpen, _)) => {
                    self.stream.next()?;
                    let subscript = self.parse_expr()?;
                    expect_token!(self, Token::BracketClose, "`]`")?;
                    parts.push(ast::Part {
                        kind: ast::PartKind::Subscript(subscript),
                        call: None,
                    });
                }
                Some((Token::ParenOpen, _)) => {
                    let call = self.parse_call_args()?;
                    let part = parts.last_mut().expect("path has at least one part");
                    if part.call.is_some() {
                        syntax_error!("cannot call the result of a function call");
                    }
                    part.call = Some(call);
                }
                _ => break,
            }
        }

        Ok(ast::Expr::Var(Spanned::new(
            ast::Var { parts },
            self.stream.expand_span(span),
        )))
    }

    fn parse_stmt(&mut self) -> Result<ast::Stmt<'a>, Error> {
        let (token, span) = expect_token!(self, "block keyword")?;
        match token {
            Token::Ident("for") => Ok(ast::Stmt::ForLoop(Spanned::new(
                self.parse_for_stmt()?,
                self.stream.expand_span(span),
            ))),
            Token::Ident("if") => Ok(ast::Stmt::IfCond(Spanned::new(
                self.parse_if_cond()?,
                self.stream.expand_span(span),
            ))),
            Token::Ident("with") => Ok(ast::Stmt::WithBlock(Spanned::new(
                self.parse_with_block()?,
                self.stream.expand_span(span),
            ))),
            Token::Ident("set") => Ok(ast::Stmt::Set(Spanned::new(
                self.parse_set()?,
                self.stream.expand_span(span),
            ))),
            Token::Ident(name) => syntax_error!("unknown statement {}", name),
            token => syntax_error!("unexpected {}, expected statement", token),
        }
    }

    fn parse_for_stmt(&mut self) -> Result<ast::ForLoop<'a>, Error> {
        let (target, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
        let value_target = if matches!(self.stream.current()?, Some((Token::Comma, _))) {
            self.stream.next()?;
            let (name, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
            Some(name)
        } else {
            None
        };
        expect_token!(self, Token::Keyword(Keyword::In), "in")?;
        let iter = self.parse_expr()?;

        let mut sorted = false;
        let mut reversed = false;
        loop {
            match self.stream.current()? {
                Some((Token::Ident("sorted"), _)) => {
                    self.stream.next()?;
                    sorted = true;
                }
                Some((Token::Ident("reversed"), _)) => {
                    self.stream.next()?;
                    reversed = true;
                }
                _ => break,
            }
        }

        expect_token!(self, Token::BlockEnd(..), "end of block")?;
        let body =
            self.subparse(&|tok| matches!(tok, Token::Ident("endfor") | Token::Ident("else")))?;
        let else_body = if matches!(self.stream.current()?, Some((Token::Ident("else"), _))) {
            self.stream.next()?;
            expect_token!(self, Token::BlockEnd(..), "end of block")?;
            self.subparse(&|tok| matches!(tok, Token::Ident("endfor")))?
        } else {
            Vec::new()
        };
        self.stream.next()?;
        Ok(ast::ForLoop {
            target,
            value_target,
            iter,
            sorted,
            reversed,
            body,
            else_body,
        })
    }

    fn parse_if_cond(&mut self) -> Result<ast::IfCond<'a>, Error> {
        let expr = self.parse_expr()?;
        expect_token!(self, Token::BlockEnd(..), "end of block")?;
        let true_body = self.subparse(&|tok| {
            matches!(
                tok,
                Token::Ident("endif") | Token::Ident("else") | Token::Ident("elif")
            )
        })?;
        let false_body = match self.stream.next()? {
            Some((Token::Ident("else"), _)) => {
                expect_token!(self, Token::BlockEnd(..), "end of block")?;
                let rv = self.subparse(&|tok| matches!(tok, Token::Ident("endif")))?;
                self.stream.next()?;
                rv
            }
            Some((Token::Ident("elif"), span)) => vec![ast::Stmt::IfCond(Spanned::new(
                self.parse_if_cond()?,
                self.stream.expand_span(span),
            ))],
            _ => Vec::new(),
        };

        Ok(ast::IfCond {
            expr,
            true_body,
            false_body,
        })
    }

    fn parse_with_block(&mut self) -> Result<ast::WithBlock<'a>, Error> {
        let mut assignments = Vec::new();

        while !matches!(self.stream.current()?, Some((Token::BlockEnd(..), _))) {
            if !assignments.is_empty() {
                expect_token!(self, Token::Comma, "`,`")?;
            }
            let (target, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
            expect_token!(self, Token::Assign, "assignment operator")?;
            let expr = self.parse_expr()?;
            assignments.push((target, expr));
        }

        expect_token!(self, Token::BlockEnd(..), "end of block")?;
        let body = self.subparse(&|tok| matches!(tok, Token::Ident("endwith")))?;
        self.stream.next()?;
        Ok(ast::WithBlock { assignments, body })
    }

    fn parse_set(&mut self) -> Result<ast::Set<'a>, Error> {
        let (name, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
        expect_token!(self, Token::Assign, "assignment operator")?;
        let expr = self.parse_expr()?;
        Ok(ast::Set { name, expr })
    }

    fn subparse(
        &mut self,
        end_check: &dyn Fn(&Token) -> bool,
    ) -> Result<Vec<ast::Stmt<'a>>, Error> {
        let mut rv = Vec::new();
        while let Some((token, span)) = self.stream.next()? {
            match token {
                Token::TemplateData(raw) => {
                    rv.push(ast::Stmt::EmitRaw(Spanned::new(ast::EmitRaw { raw }, span)))
                }
                Token::VariableStart(_) => {
                    let expr = self.parse_expr()?;
                    rv.push(ast::Stmt::EmitExpr(Spanned::new(
                        ast::EmitExpr { expr },
                        self.stream.expand_span(span),
                    )));
                    expect_token!(self, Token::VariableEnd(..), "end of variable block")?;
                }
                Token::BlockStart(_) => {
                    let (tok, _span) = match self.stream.current()? {
                        Some(rv) => rv,
                        None => syntax_error!("unexpected end of input, expected keyword"),
                    };
                    if end_check(tok) {
                        return Ok(rv);
                    }
                    rv.push(self.parse_stmt()?);
                    expect_token!(self, Token::BlockEnd(..), "end of block")?;
                }
                _ => unreachable!("lexer produced garbage"),
            }
        }
        Ok(rv)
    }

    pub fn parse(&mut self) -> Result<ast::Stmt<'a>, Error> {
        // start the stream
        self.stream.current()?;
        let span = self.stream.current_span();
        Ok(ast::Stmt::Template(Spanned::new(
            ast::Template {
                children: self.subparse(&|_| false)?,
            },
            self.stream.expand_span(span),
        )))
    }
}

/// Parses a template.
pub fn parse<'source>(
    source: &'source str,
    name: &str,
    set: &TemplateSet,
) -> Result<ast::Stmt<'source>, Error> {
    // we want to chop off a single newline at the end.  This means that
    // a template by default does not end in a newline which is a useful
    // property to allow inline templates to work.
    let mut source = source;
    if source.ends_with('\n') {
        source = &source[..source.len() - 1];
    }
    if source.ends_with('\r') {
        source = &source[..source.len() - 1];
    }

    let mut parser = Parser::new(source, false, set);
    parser.parse().map_err(|mut err| {
        if err.line().is_none() {
            err.set_location(name, parser.stream.current_span().start_line);
        }
        err
    })
}

/// Parses an expression.
pub fn parse_expr<'source>(
    source: &'source str,
    set: &TemplateSet,
) -> Result<ast::Expr<'source>, Error> {
    let mut parser = Parser::new(source, true, set);
    let expr = parser.parse_expr().map_err(|mut err| {
        if err.line().is_none() {
            err.set_location("<expression>", parser.stream.current_span().start_line);
        }
        err
    })?;
    if parser.stream.current()?.is_some() {
        return Err(
            Error::new(ErrorKind::ParseError, "unexpected input after expression")
                .with_sender("parser"),
        );
    }
    Ok(expr)
}

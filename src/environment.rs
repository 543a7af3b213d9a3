use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::args::Args;
use crate::context::{Context, State};
use crate::deep::DeepResolver;
use crate::error::{Error, ErrorKind};
use crate::filters::{self, BoxedFilter, BoxedFilterArgs, Filter};
use crate::template::{CompiledExpression, CompiledTemplate, Expression, Template};
use crate::tests::{self, BoxedTest};
use crate::value::{ArgType, FunctionArgs, Value};

/// The signature of translator functions.
///
/// Receives the message and the extra values passed along at the call
/// site and returns the translated text.
pub type TranslatorFunc = Arc<dyn Fn(&str, &[Value]) -> String + Send + Sync>;

/// Options that change the behavior of templates in a set.
#[derive(Clone)]
pub struct Options {
    /// If this is set to true the first newline after a block is removed
    /// (block, not variable tag).  Defaults to false.
    pub trim_blocks: bool,
    /// If this is set to true leading spaces and tabs are stripped from
    /// the start of a line to a block.  Defaults to false.
    pub lstrip_blocks: bool,
    /// Whether string output is escaped by default.  Defaults to true.
    pub autoescape: bool,
    /// The name of the filter used to escape values.  Defaults to
    /// `escape`, which escapes HTML sequences.
    pub autoescape_filter: String,
    /// If this is set to true, variables resolving to template handles or
    /// strings containing template tags are resolved further.
    pub deep_resolve: bool,
    /// If this is set to true, functions directly assigned as context
    /// variables cannot be called.
    pub disable_context_functions: bool,
    /// If this is set to true, functions within context variables (such
    /// as record methods) cannot be called.
    pub disable_nested_functions: bool,
    /// If this is set to true, record fields, map keys and variable names
    /// are treated as case-insensitive.
    pub ignore_variable_case: bool,
    /// The translation function used by the `translate` filter.
    pub translator: Option<TranslatorFunc>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            trim_blocks: false,
            lstrip_blocks: false,
            autoescape: true,
            autoescape_filter: "escape".to_string(),
            deep_resolve: false,
            disable_context_functions: false,
            disable_nested_functions: false,
            ignore_variable_case: false,
            translator: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("trim_blocks", &self.trim_blocks)
            .field("lstrip_blocks", &self.lstrip_blocks)
            .field("autoescape", &self.autoescape)
            .field("autoescape_filter", &self.autoescape_filter)
            .field("deep_resolve", &self.deep_resolve)
            .field("disable_context_functions", &self.disable_context_functions)
            .field("disable_nested_functions", &self.disable_nested_functions)
            .field("ignore_variable_case", &self.ignore_variable_case)
            .field("translator", &self.translator.as_ref().map(|_| "..."))
            .finish()
    }
}

/// A bundle of templates sharing registries and options.
///
/// The set holds the filter and test tables (initialized copy-on-write
/// from the builtin tables), the sandbox ban list, the options and the
/// stored templates.  Registries must not be modified once templates have
/// been parsed, since names are bound at parse time.
///
/// ```
/// use djinn::{context, TemplateSet};
///
/// let mut set = TemplateSet::new();
/// set.add_template("hello", "Hello {{ name }}!").unwrap();
/// let tmpl = set.get_template("hello").unwrap();
/// println!("{}", tmpl.render(context!(name => "John")).unwrap());
/// ```
pub struct TemplateSet {
    options: Options,
    filters: BTreeMap<String, BoxedFilter>,
    filter_args: BTreeMap<String, BoxedFilterArgs>,
    tests: BTreeMap<String, BoxedTest>,
    banned_filters: BTreeSet<String>,
    templates: BTreeMap<String, Arc<CompiledTemplate>>,
}

impl Default for TemplateSet {
    fn default() -> TemplateSet {
        TemplateSet::new()
    }
}

impl fmt::Debug for TemplateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateSet")
            .field("options", &self.options)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("filter_args", &self.filter_args.keys().collect::<Vec<_>>())
            .field("tests", &self.tests.keys().collect::<Vec<_>>())
            .field("banned_filters", &self.banned_filters)
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TemplateSet {
    /// Creates a new set with the builtin filters and tests loaded.
    pub fn new() -> TemplateSet {
        TemplateSet {
            options: Options::default(),
            filters: filters::get_builtin_filters(),
            filter_args: filters::get_builtin_filter_args(),
            tests: tests::get_builtin_tests(),
            banned_filters: BTreeSet::new(),
            templates: BTreeMap::new(),
        }
    }

    /// Creates a completely empty set without filters or tests.
    pub fn empty() -> TemplateSet {
        TemplateSet {
            options: Options::default(),
            filters: BTreeMap::new(),
            filter_args: BTreeMap::new(),
            tests: BTreeMap::new(),
            banned_filters: BTreeSet::new(),
            templates: BTreeMap::new(),
        }
    }

    /// Returns the options of the set.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Mutable access to the options.
    ///
    /// Options apply to templates parsed after the change.
    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// Adds a new single parameter filter.
    ///
    /// For details about filters have a look at [`filters`].
    pub fn add_filter<F, V, Rv, Args>(&mut self, name: &str, f: F)
    where
        V: ArgType,
        Rv: Into<Value>,
        F: Filter<V, Rv, Args>,
        Args: FunctionArgs,
    {
        self.filters.insert(name.to_string(), BoxedFilter::new(f));
    }

    /// Adds a new filter in the full argument form.
    pub fn add_filter_args<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&State, &Value, &crate::args::Args) -> Result<Value, Error> + Send + Sync + 'static,
    {
        // the args form shadows a single parameter filter of the same name
        self.filters.remove(name);
        self.filter_args
            .insert(name.to_string(), BoxedFilterArgs::new(f));
    }

    /// Removes a filter by name.
    pub fn remove_filter(&mut self, name: &str) {
        self.filters.remove(name);
        self.filter_args.remove(name);
    }

    /// Bans a filter name for templates of this set.
    ///
    /// Using a banned filter is a parse error.
    pub fn ban_filter(&mut self, name: &str) {
        self.banned_filters.insert(name.to_string());
    }

    /// Checks whether a filter with the given name exists.
    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name) || self.filter_args.contains_key(name)
    }

    /// Adds a new test function.
    ///
    /// For details about tests have a look at [`tests`].
    pub fn add_test<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&State, &Value, &Args) -> Result<bool, Error> + Send + Sync + 'static,
    {
        self.tests.insert(name.to_string(), BoxedTest::new(f));
    }

    /// Replaces an already registered test with a new implementation.
    ///
    /// Returns an error if the test does not exist.
    pub fn replace_test<F>(&mut self, name: &str, f: F) -> Result<(), Error>
    where
        F: Fn(&State, &Value, &Args) -> Result<bool, Error> + Send + Sync + 'static,
    {
        if !self.tests.contains_key(name) {
            return Err(Error::new(
                ErrorKind::EvalError,
                format!("test with name '{}' does not exist", name),
            ));
        }
        self.tests.insert(name.to_string(), BoxedTest::new(f));
        Ok(())
    }

    /// Checks whether a test with the given name exists.
    pub fn has_test(&self, name: &str) -> bool {
        self.tests.contains_key(name)
    }

    pub(crate) fn is_banned_filter(&self, name: &str) -> bool {
        self.banned_filters.contains(name)
    }

    pub(crate) fn get_filter(&self, name: &str) -> Option<&BoxedFilter> {
        self.filters.get(name)
    }

    pub(crate) fn get_filter_args(&self, name: &str) -> Option<&BoxedFilterArgs> {
        self.filter_args.get(name)
    }

    pub(crate) fn get_test(&self, name: &str) -> Option<&BoxedTest> {
        self.tests.get(name)
    }

    /// Applies a filter to a value using the single parameter calling
    /// convention.  Falls back to an args-form filter of the same name.
    pub fn apply_filter(
        &self,
        name: &str,
        value: &Value,
        param: Option<&Value>,
    ) -> Result<Value, Error> {
        let nil = Value::none();
        let param = param.unwrap_or(&nil);
        let state = self.anonymous_state();
        if let Some(filter) = self.get_filter(name) {
            return filter.apply(&state, value, param);
        }
        if let Some(filter) = self.get_filter_args(name) {
            return filter.apply(&state, value, &Args::from_param(param));
        }
        Err(unknown_filter(name))
    }

    /// Applies a filter to a value using the full argument calling
    /// convention.  A single parameter filter of the same name is adapted
    /// when at most one argument is passed.
    pub fn apply_filter_args(&self, name: &str, value: &Value, args: &Args) -> Result<Value, Error> {
        let state = self.anonymous_state();
        if let Some(filter) = self.get_filter_args(name) {
            return filter.apply(&state, value, args);
        }
        if let Some(filter) = self.get_filter(name) {
            if args.len() + args.named_map().len() < 2 {
                let param = args
                    .value_exists(0)
                    .or_else(|| args.named_map().values().next())
                    .cloned()
                    .unwrap_or_default();
                return filter.apply(&state, value, &param);
            }
            return Err(Error::new(
                ErrorKind::InvalidParameterCount,
                format!("too many parameters for filter '{}'", name),
            )
            .with_sender("applyfilter"));
        }
        Err(unknown_filter(name))
    }

    /// Performs a registered test on a value.
    pub fn perform_test(&self, name: &str, value: &Value, args: &Args) -> Result<bool, Error> {
        let state = self.anonymous_state();
        match self.get_test(name) {
            Some(test) => test.perform(&state, value, args),
            None => Err(Error::new(
                ErrorKind::EvalError,
                format!("test with name '{}' not found", name),
            )
            .with_sender("performtest")),
        }
    }

    // state for filter/test application outside of a render
    fn anonymous_state(&self) -> State<'_> {
        State::new(
            self,
            self.options.clone(),
            "<anonymous>".to_string(),
            Context::default(),
        )
    }

    /// Parses a template from a string and stores it under a name.
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<(), Error> {
        let compiled = CompiledTemplate::new(name, source.to_string(), self, self.options.clone())?;
        self.templates.insert(name.to_string(), Arc::new(compiled));
        Ok(())
    }

    /// Removes a stored template by name.
    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
    }

    /// Fetches a stored template by name.
    pub fn get_template(&self, name: &str) -> Result<Template<'_>, Error> {
        match self.templates.get(name) {
            Some(compiled) => Ok(Template::new(self, compiled.clone())),
            None => Err(Error::new(
                ErrorKind::EvalError,
                format!("template {:?} does not exist", name),
            )),
        }
    }

    /// Parses a template from a string without storing it.
    pub fn from_string(&self, source: &str) -> Result<Template<'_>, Error> {
        let compiled = self.compile_string(source, self.options.clone())?;
        Ok(Template::new(self, compiled))
    }

    pub(crate) fn compile_string(
        &self,
        source: &str,
        options: Options,
    ) -> Result<Arc<CompiledTemplate>, Error> {
        Ok(Arc::new(CompiledTemplate::new(
            "<string>",
            source.to_string(),
            self,
            options,
        )?))
    }

    /// Compiles an expression.
    ///
    /// This lets one evaluate the expression language standalone, which
    /// is useful to express logic in configuration files and similar
    /// places:
    ///
    /// ```
    /// # use djinn::{context, TemplateSet};
    /// let set = TemplateSet::new();
    /// let expr = set.compile_expression("number > 10 and number < 20").unwrap();
    /// let rv = expr.eval(context!(number => 15)).unwrap();
    /// assert!(rv.is_true());
    /// ```
    pub fn compile_expression(&self, source: &str) -> Result<Expression<'_>, Error> {
        let compiled = CompiledExpression::new(source.to_string(), self)?;
        Ok(Expression::new(self, Arc::new(compiled)))
    }

    /// Creates a deep resolver operating on the given context.
    ///
    /// See [`DeepResolver`] for details.
    pub fn deep_resolver(&self, ctx: Context) -> DeepResolver<'_> {
        DeepResolver::new(self, ctx)
    }
}

fn unknown_filter(name: &str) -> Error {
    Error::new(
        ErrorKind::ParseError,
        format!("filter with name '{}' not found", name),
    )
    .with_sender("applyfilter")
}

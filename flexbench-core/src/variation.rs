//! Variations
//!
//! A variation is one parameterization of a benchmark: environment variables,
//! CLI arguments and typed context values, plus its own hooks and optional
//! overrides of the benchmark's action, warmup count, error strategy and
//! measures.
//!
//! The factory functions expand a description into many variations. Products
//! enumerate with the last slot varying fastest:
//!
//! ```
//! use flexbench_core::Variation;
//!
//! let variations = Variation::from_environment_variables([
//!     ("A", vec!["1", "2"]),
//!     ("B", vec!["3", "4"]),
//! ]);
//! let names: Vec<_> = variations.iter().map(|v| v.name()).collect();
//! assert_eq!(names[0], r#"[["A","1"],["B","3"]]"#);
//! assert_eq!(names[1], r#"[["A","1"],["B","4"]]"#);
//! assert_eq!(variations.len(), 4);
//! ```

use crate::action::Action;
use crate::blackhole::Consumable;
use crate::error::ErrorStrategy;
use crate::hooks::{Hooks, Lifecycle};
use crate::measure::SharedMeasure;
use fxhash::FxHashMap;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type ContextValue = Arc<dyn Any + Send + Sync>;

/// Named parameterization of a benchmark run
#[derive(Clone)]
pub struct Variation {
    name: String,
    environment: BTreeMap<String, String>,
    cli_args: Vec<String>,
    context: FxHashMap<String, ContextValue>,
    hooks: Hooks,
    action: Option<Action>,
    warmup_iterations: Option<usize>,
    error_strategy: Option<ErrorStrategy>,
    measures: Option<Vec<SharedMeasure>>,
}

impl Variation {
    /// Empty variation
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: BTreeMap::new(),
            cli_args: Vec::new(),
            context: FxHashMap::default(),
            hooks: Hooks::default(),
            action: None,
            warmup_iterations: None,
            error_strategy: None,
            measures: None,
        }
    }

    /// Variation name, also used as its result label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Environment variables overlaid while this variation runs
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Arguments appended to a command action
    pub fn cli_args(&self) -> &[String] {
        &self.cli_args
    }

    /// Action override
    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    /// Warmup iteration override
    pub fn warmup_iterations(&self) -> Option<usize> {
        self.warmup_iterations
    }

    /// Error strategy override
    pub fn error_strategy(&self) -> Option<ErrorStrategy> {
        self.error_strategy
    }

    /// Measure override
    pub fn measures(&self) -> Option<&[SharedMeasure]> {
        self.measures.as_deref()
    }

    // ─── Builders ────────────────────────────────────────────────────────

    /// Set one environment variable
    pub fn with_environment_variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    /// Merge environment variables; later values win
    pub fn with_environment_variables<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.environment
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Append CLI arguments
    pub fn with_cli_args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.cli_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Store a context value under `key`
    pub fn with_context<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.context.insert(key.into(), Arc::new(value));
        self
    }

    /// Store an already shared context value; [`get_shared`](Self::get_shared)
    /// hands back this same allocation
    pub fn with_shared_context<T: Any + Send + Sync>(
        mut self,
        key: impl Into<String>,
        value: Arc<T>,
    ) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Override the benchmark's action with a callback
    pub fn with_action<F, Fut, T>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Consumable + Send + 'static,
    {
        self.action = Some(Action::callback(f));
        self
    }

    /// Override the benchmark's action with a shell command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.action = Some(Action::command(command));
        self
    }

    /// Override the benchmark's action
    pub fn with_action_value(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Override the warmup iteration count
    pub fn with_warmup_iterations(mut self, iterations: usize) -> Self {
        self.warmup_iterations = Some(iterations);
        self
    }

    /// Override the error strategy for this variation's loop
    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = Some(strategy);
        self
    }

    /// Override the benchmark's measures; the first is primary
    pub fn with_measures<M: Into<SharedMeasure>>(mut self, measures: impl IntoIterator<Item = M>) -> Self {
        let measures: Vec<SharedMeasure> = measures.into_iter().map(Into::into).collect();
        self.measures = (!measures.is_empty()).then_some(measures);
        self
    }

    // ─── Context access ──────────────────────────────────────────────────

    /// Context value under `key`, if present and of type `T`
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.context.get(key)?.downcast_ref::<T>()
    }

    /// Shared handle to the context value under `key`
    pub fn get_shared<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        Arc::clone(self.context.get(key)?).downcast::<T>().ok()
    }

    /// Context value under `key`, or `default` when absent
    pub fn get_or_default<T: Any + Send + Sync + Clone>(&self, key: &str, default: T) -> T {
        self.get::<T>(key).cloned().unwrap_or(default)
    }

    /// Whether a context value is stored under `key`
    pub fn has_context(&self, key: &str) -> bool {
        self.context.contains_key(key)
    }

    // ─── Factories ───────────────────────────────────────────────────────

    /// One variation per combination of environment variable values, named
    /// by the JSON-encoded `[name, value]` pairs.
    pub fn from_environment_variables<K, I, V>(vars: impl IntoIterator<Item = (K, I)>) -> Vec<Variation>
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let slots: Vec<Vec<(String, String)>> = vars
            .into_iter()
            .map(|(name, values)| {
                let name = name.into();
                values
                    .into_iter()
                    .map(|value| (name.clone(), value.into()))
                    .collect()
            })
            .collect();

        cartesian_product(&slots)
            .into_iter()
            .map(|combination| {
                let label = serde_json::to_string(&combination)
                    .unwrap_or_else(|_| format!("{combination:?}"));
                Variation::new(label).with_environment_variables(combination)
            })
            .collect()
    }

    /// One variation per combination of CLI alternatives, named by the
    /// resolved arguments joined with spaces.
    pub fn from_cli_args(args: impl IntoIterator<Item = CliArg>) -> Vec<Variation> {
        let slots: Vec<Vec<String>> = args
            .into_iter()
            .map(|arg| match arg {
                CliArg::Fixed(token) => vec![token],
                CliArg::OneOf(alternatives) => alternatives,
            })
            .collect();

        cartesian_product(&slots)
            .into_iter()
            .map(|tokens| Variation::new(tokens.join(" ")).with_cli_args(tokens))
            .collect()
    }

    /// One variation per `(name, value)` pair with `key -> value` in its context
    pub fn from_contexts<N, T>(key: &str, values: impl IntoIterator<Item = (N, T)>) -> Vec<Variation>
    where
        N: Into<String>,
        T: Any + Send + Sync,
    {
        values
            .into_iter()
            .map(|(name, value)| Variation::new(name).with_context(key, value))
            .collect()
    }
}

impl Lifecycle for Variation {
    fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }
}

impl fmt::Debug for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut context: Vec<&str> = self.context.keys().map(String::as_str).collect();
        context.sort_unstable();
        f.debug_struct("Variation")
            .field("name", &self.name)
            .field("environment", &self.environment)
            .field("cli_args", &self.cli_args)
            .field("context", &context)
            .field("action", &self.action)
            .field("warmup_iterations", &self.warmup_iterations)
            .field("error_strategy", &self.error_strategy)
            .finish_non_exhaustive()
    }
}

/// One slot of a [`Variation::from_cli_args`] description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliArg {
    /// Token present in every variation
    Fixed(String),
    /// Exactly one of these tokens per variation
    OneOf(Vec<String>),
}

impl CliArg {
    /// Fixed token
    pub fn fixed(token: impl Into<String>) -> Self {
        CliArg::Fixed(token.into())
    }

    /// Alternative tokens
    pub fn one_of<S: Into<String>>(alternatives: impl IntoIterator<Item = S>) -> Self {
        CliArg::OneOf(alternatives.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for CliArg {
    fn from(token: &str) -> Self {
        CliArg::fixed(token)
    }
}

impl<const N: usize> From<[&str; N]> for CliArg {
    fn from(alternatives: [&str; N]) -> Self {
        CliArg::one_of(alternatives)
    }
}

/// Every combination picking one element per slot, last slot fastest.
/// No slots yields a single empty combination; an empty slot yields none.
fn cartesian_product<T: Clone>(slots: &[Vec<T>]) -> Vec<Vec<T>> {
    slots.iter().fold(vec![Vec::new()], |acc, slot| {
        acc.iter()
            .flat_map(|prefix| {
                slot.iter().map(move |item| {
                    let mut combination = prefix.clone();
                    combination.push(item.clone());
                    combination
                })
            })
            .collect()
    })
}

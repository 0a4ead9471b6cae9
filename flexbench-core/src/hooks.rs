//! Lifecycle Hooks
//!
//! Benchmarks and variations share one capability: registering setup and
//! teardown callbacks. [`Hooks`] holds the four ordered lists and
//! [`Lifecycle`] adds the builder methods to anything that owns one.

use crate::variation::Variation;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Async callback receiving the variation being run
pub type Hook = Arc<dyn Fn(Arc<Variation>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Erase an async closure into a [`Hook`]
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |variation| f(variation).boxed())
}

/// Ordered setup/teardown callbacks
#[derive(Clone, Default)]
pub struct Hooks {
    /// Once per variation, before warmup
    pub setup: Vec<Hook>,
    /// Before every warmup and measured iteration
    pub setup_each: Vec<Hook>,
    /// After every warmup and measured iteration
    pub teardown_each: Vec<Hook>,
    /// Once per variation, after the last iteration
    pub teardown: Vec<Hook>,
}

impl Hooks {
    /// Append every hook of `other`, keeping order
    pub fn extend(&mut self, other: Hooks) {
        self.setup.extend(other.setup);
        self.setup_each.extend(other.setup_each);
        self.teardown_each.extend(other.teardown_each);
        self.teardown.extend(other.teardown);
    }

    /// Whether no hook is registered
    pub fn is_empty(&self) -> bool {
        self.setup.is_empty()
            && self.setup_each.is_empty()
            && self.teardown_each.is_empty()
            && self.teardown.is_empty()
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("setup", &self.setup.len())
            .field("setup_each", &self.setup_each.len())
            .field("teardown_each", &self.teardown_each.len())
            .field("teardown", &self.teardown.len())
            .finish()
    }
}

/// Builder methods for registering lifecycle hooks
pub trait Lifecycle: Sized {
    /// Hooks owned by this declaration
    fn hooks(&self) -> &Hooks;

    /// Mutable hooks owned by this declaration
    fn hooks_mut(&mut self) -> &mut Hooks;

    /// Run once per variation before warmup
    fn with_setup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks_mut().setup.push(hook(f));
        self
    }

    /// Run before every iteration
    fn with_setup_each<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks_mut().setup_each.push(hook(f));
        self
    }

    /// Run once per variation after the last iteration
    fn with_teardown<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks_mut().teardown.push(hook(f));
        self
    }

    /// Run after every iteration
    fn with_teardown_each<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks_mut().teardown_each.push(hook(f));
        self
    }

    /// Append already-erased hooks
    fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks_mut().extend(hooks);
        self
    }
}

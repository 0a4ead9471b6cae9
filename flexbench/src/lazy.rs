//! Lazy Declarations
//!
//! A declaration does nothing until its handle is first awaited (or
//! [`run_pending`] drives it). Handles are cheap to clone and every clone
//! resolves to the same outcome.

use flexbench_core::BenchError;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::atomic::{AtomicU64, Ordering};

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, BenchError>>>;

/// Handle to a declaration that runs on first await
pub struct Lazy<T: Clone> {
    future: SharedOutcome<T>,
}

impl<T> Lazy<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(future: impl Future<Output = Result<T, BenchError>> + Send + 'static) -> Self {
        Self {
            future: future.boxed().shared(),
        }
    }

    /// Already resolved handle
    pub(crate) fn ready(value: T) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// Outcome, if the declaration has finished
    pub fn peek(&self) -> Option<&Result<T, BenchError>> {
        self.future.peek()
    }

    /// Register with the pending list driven by [`run_pending`]. The entry
    /// is removed again once the declaration settles.
    pub(crate) fn track(self) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let inner = self.future;
        let tracked = Self::new(async move {
            let outcome = inner.await;
            PENDING.lock().retain(|(entry, _)| *entry != id);
            outcome
        });
        PENDING.lock().push((id, Box::new(tracked.clone())));
        tracked
    }
}

impl<T: Clone> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
        }
    }
}

impl<T> IntoFuture for Lazy<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T, BenchError>;
    type IntoFuture = SharedOutcome<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl<T: Clone> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("settled", &self.future.peek().is_some())
            .finish()
    }
}

trait Pending: Send {
    fn is_settled(&self) -> bool;
    fn drive(self: Box<Self>) -> BoxFuture<'static, Result<(), BenchError>>;
}

impl<T> Pending for Lazy<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn is_settled(&self) -> bool {
        self.peek().is_some()
    }

    fn drive(self: Box<Self>) -> BoxFuture<'static, Result<(), BenchError>> {
        async move { (*self).await.map(|_| ()) }.boxed()
    }
}

static PENDING: Mutex<Vec<(u64, Box<dyn Pending>)>> = parking_lot::const_mutex(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Drive every top-level declaration that has not been awaited, one at a
/// time in declaration order.
///
/// Call this at the end of `main` when declarations are made for their side
/// effects. Every declaration runs even if an earlier one fails; the first
/// error is returned and the rest are logged.
pub async fn run_pending() -> Result<(), BenchError> {
    let pending = std::mem::take(&mut *PENDING.lock());
    let mut first_error = None;

    for (_, declaration) in pending {
        if declaration.is_settled() {
            continue;
        }
        if let Err(error) = declaration.drive().await {
            tracing::error!(%error, "declaration failed");
            first_error.get_or_insert(error);
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_runs_once_on_first_await() {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let lazy = Lazy::new(async move {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(42u32)
        });

        assert!(lazy.peek().is_none());
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let other = lazy.clone();
        assert_eq!(lazy.await.unwrap(), 42);
        assert_eq!(other.await.unwrap(), 42);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_settled_declarations_leave_registry() {
        for n in 0..50u32 {
            let lazy = Lazy::new(async move { Ok(n) }).track();
            assert_eq!(lazy.await.unwrap(), n);
        }
        assert!(PENDING.lock().is_empty());
    }

    #[tokio::test]
    async fn test_ready() {
        let lazy = Lazy::ready(vec![1u8]);
        assert_eq!(lazy.await.unwrap(), vec![1u8]);
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let lazy: Lazy<()> = Lazy::new(async {
            Err(BenchError::MissingAction {
                benchmark: "b".into(),
            })
        });
        let other = lazy.clone();
        assert!(lazy.await.is_err());
        assert!(matches!(
            other.await,
            Err(BenchError::MissingAction { .. })
        ));
    }
}

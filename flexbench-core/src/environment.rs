//! Environment Scope
//!
//! The process environment is global mutable state. A variation's variables are
//! overlaid for the duration of its run and the previous environment is
//! restored exactly afterwards, on success, error and abort alike.
//!
//! Entering a scope takes a process-wide lock, so at most one overlay is active
//! at any time even with a multi-threaded runtime or parallel tests. The lock
//! is not re-entrant: running a benchmark from inside another benchmark's
//! action or hooks waits forever.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::sync::LazyLock;
use tokio::sync::{Mutex, MutexGuard};

static ENVIRONMENT_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Active environment overlay; restores the snapshot on drop
pub struct EnvironmentScope {
    snapshot: Vec<(OsString, OsString)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvironmentScope {
    /// Wait for exclusive access, snapshot the environment and apply `overlay`
    pub async fn enter(overlay: &BTreeMap<String, String>) -> Self {
        let lock: &'static Mutex<()> = &ENVIRONMENT_LOCK;
        let guard = lock.lock().await;
        let snapshot: Vec<(OsString, OsString)> = std::env::vars_os().collect();

        for (name, value) in overlay {
            if !is_settable(name, value) {
                tracing::warn!(variable = %name, "skipping invalid environment variable");
                continue;
            }
            // SAFETY: mutation only happens while ENVIRONMENT_LOCK is held
            unsafe { std::env::set_var(name, value) };
        }

        Self {
            snapshot,
            _guard: guard,
        }
    }
}

impl Drop for EnvironmentScope {
    fn drop(&mut self) {
        // The guard field drops after this body, so the lock is still held
        restore(&self.snapshot);
    }
}

/// Make the environment equal `snapshot` again. Caller must hold the lock.
fn restore(snapshot: &[(OsString, OsString)]) {
    let previous: BTreeMap<&OsString, &OsString> = snapshot.iter().map(|(k, v)| (k, v)).collect();

    for (name, value) in std::env::vars_os() {
        match previous.get(&name) {
            Some(old) if **old == value => {}
            // SAFETY: ENVIRONMENT_LOCK is held by the caller
            Some(old) => unsafe { std::env::set_var(&name, old) },
            None => unsafe { std::env::remove_var(&name) },
        }
    }

    // Variables removed while the scope was active
    for (name, value) in snapshot {
        if std::env::var_os(name).is_none() {
            // SAFETY: as above
            unsafe { std::env::set_var(name, value) };
        }
    }
}

fn is_settable(name: &str, value: &str) -> bool {
    !name.is_empty() && !name.contains('=') && !name.contains('\0') && !value.contains('\0')
}

//! Actions
//!
//! The work a benchmark measures: either an async callback or a shell command.

use crate::blackhole::{self, Consumable};
use crate::variation::Variation;
use flexbench_stats::Failure;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::process::Stdio;
use std::sync::Arc;

/// Erased callback; the returned value has already been consumed
pub type ActionFn = Arc<dyn Fn(Arc<Variation>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Benchmarked work
#[derive(Clone)]
pub enum Action {
    /// Async callback receiving the running variation
    Callback(ActionFn),
    /// Shell command; the variation's CLI args are appended
    Command(String),
}

impl Action {
    /// Wrap an async callback. Its `Ok` value is fed to the blackhole inside
    /// the measured window.
    pub fn callback<F, Fut, T>(f: F) -> Self
    where
        F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Consumable + Send + 'static,
    {
        Action::Callback(Arc::new(move |variation| {
            let fut = f(variation);
            async move {
                let value = fut.await?;
                blackhole::consume(value);
                Ok(())
            }
            .boxed()
        }))
    }

    /// Shell command action
    pub fn command(command: impl Into<String>) -> Self {
        Action::Command(command.into())
    }

    /// Whether this is a shell command
    pub fn is_command(&self) -> bool {
        matches!(self, Action::Command(_))
    }

    /// Run once for `variation`. Errors and panics become a [`Failure`].
    pub async fn run(&self, variation: &Arc<Variation>) -> Result<(), Failure> {
        match self {
            Action::Callback(callback) => {
                let outcome = AssertUnwindSafe(async { callback(Arc::clone(variation)).await })
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(error)) => Err(Failure::from(error)),
                    Err(payload) => Err(Failure::msg(format!(
                        "action panicked: {}",
                        panic_message(payload.as_ref())
                    ))),
                }
            }
            Action::Command(command) => run_command(command, variation.cli_args()).await,
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Callback(_) => f.write_str("Callback(..)"),
            Action::Command(command) => f.debug_tuple("Command").field(command).finish(),
        }
    }
}

impl From<&str> for Action {
    fn from(command: &str) -> Self {
        Action::command(command)
    }
}

impl From<String> for Action {
    fn from(command: String) -> Self {
        Action::Command(command)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

/// Command line handed to the shell: the command followed by its args
fn command_line(command: &str, args: &[String]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

#[cfg(windows)]
fn shell(line: &str) -> tokio::process::Command {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    let mut cmd = tokio::process::Command::new("cmd");
    cmd.arg("/C").arg(line).creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(not(windows))]
fn shell(line: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

async fn run_command(command: &str, args: &[String]) -> Result<(), Failure> {
    let line = command_line(command, args);
    tracing::trace!(command = %line, "spawning action");

    let status = shell(&line)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| Failure::new(anyhow::Error::new(e).context(format!("failed to spawn `{line}`"))))?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(Failure::msg(format!("Action failed with code {code}"))),
        None => Err(Failure::msg("Action failed: terminated by signal")),
    }
}

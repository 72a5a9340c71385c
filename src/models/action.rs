//! Units of work executed by test nodes

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::TestFailure;

/// Context handed to every action invocation.
///
/// There is no cancellation signal here. A deferred action that loses its
/// timeout race is detached, not stopped: it keeps running in the background
/// until it settles on its own, and its eventual result is discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestContext {
    /// Name of the running test
    pub name: String,
    /// 1-based position of the test among its siblings
    pub index: usize,
}

impl TestContext {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

type SyncFn = dyn Fn(TestContext) -> anyhow::Result<Value> + Send + Sync;
type DeferredFn = dyn Fn(TestContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// A test body. Either returns immediately or hands back a future.
#[derive(Clone)]
pub enum Action {
    Sync(Arc<SyncFn>),
    Deferred(Arc<DeferredFn>),
}

/// What invoking an action produced
pub(crate) enum Invocation {
    Ready(Result<Value, TestFailure>),
    Pending(BoxFuture<'static, Result<Value, TestFailure>>),
}

impl Action {
    /// Action that completes synchronously
    pub fn sync<F, T>(f: F) -> Self
    where
        F: Fn(TestContext) -> anyhow::Result<T> + Send + Sync + 'static,
        T: Serialize,
    {
        Action::Sync(Arc::new(move |ctx: TestContext| -> anyhow::Result<Value> {
            let value = f(ctx)?;
            Ok(serde_json::to_value(value)?)
        }))
    }

    /// Action returning a future; it is raced against the node's timeout
    pub fn deferred<F, Fut, T>(f: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        Action::Deferred(Arc::new(move |ctx: TestContext| {
            let fut = f(ctx);
            async move {
                let value = fut.await?;
                Ok::<Value, anyhow::Error>(serde_json::to_value(value)?)
            }
            .boxed()
        }))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Action::Deferred(_))
    }

    /// Call the action. Errors and panics raised while calling are captured
    /// as failures.
    pub(crate) fn invoke(&self, ctx: TestContext) -> Invocation {
        match self {
            Action::Sync(f) => {
                let outcome = match catch_unwind(AssertUnwindSafe(|| f(ctx))) {
                    Ok(result) => result.map_err(|e| TestFailure::from_error(&e)),
                    Err(panic) => Err(TestFailure::from_panic(panic)),
                };
                Invocation::Ready(outcome)
            }
            Action::Deferred(f) => match catch_unwind(AssertUnwindSafe(|| f(ctx))) {
                Ok(fut) => Invocation::Pending(
                    fut.map(|result| result.map_err(|e| TestFailure::from_error(&e)))
                        .boxed(),
                ),
                Err(panic) => Invocation::Ready(Err(TestFailure::from_panic(panic))),
            },
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Sync(_) => f.write_str("Action::Sync"),
            Action::Deferred(_) => f.write_str("Action::Deferred"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ready(invocation: Invocation) -> Result<Value, TestFailure> {
        match invocation {
            Invocation::Ready(outcome) => outcome,
            Invocation::Pending(_) => panic!("expected a ready outcome"),
        }
    }

    #[test]
    fn test_sync_value_is_serialized() {
        let action = Action::sync(|ctx| Ok(format!("{}#{}", ctx.name, ctx.index)));
        let outcome = ready(action.invoke(TestContext::new("a", 2)));
        assert_eq!(outcome, Ok(json!("a#2")));
    }

    #[test]
    fn test_sync_error_becomes_failure() {
        let action = Action::sync(|_| -> anyhow::Result<()> { anyhow::bail!("boom") });
        let outcome = ready(action.invoke(TestContext::new("b", 1)));
        assert_eq!(outcome.unwrap_err().to_string(), "boom");
    }

    #[test]
    fn test_sync_panic_is_captured() {
        let action = Action::sync(|_| -> anyhow::Result<()> { panic!("kaboom") });
        let outcome = ready(action.invoke(TestContext::new("c", 1)));
        assert!(matches!(outcome, Err(TestFailure::Panicked { .. })));
    }

    #[test]
    fn test_deferred_resolves() {
        let action = Action::deferred(|ctx| async move { Ok::<_, anyhow::Error>(ctx.index * 10) });
        assert!(action.is_deferred());
        let outcome = match action.invoke(TestContext::new("d", 4)) {
            Invocation::Pending(fut) => tokio_test::block_on(fut),
            Invocation::Ready(_) => panic!("expected a future"),
        };
        assert_eq!(outcome, Ok(json!(40)));
    }
}

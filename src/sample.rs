//! Built-in demo suite used by `tom-runner demo`

use std::time::Duration;

use crate::error::Result;
use crate::models::{Action, NodeOptions, TestNode};

fn sleep_then<T>(millis: u64, value: T) -> Action
where
    T: serde::Serialize + Clone + Send + Sync + 'static,
{
    Action::deferred(move |_| {
        let value = value.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok::<_, anyhow::Error>(value)
        }
    })
}

/// A small tree exercising every node kind: `before`/`after` hooks,
/// deferred and synchronous tests, a skipped test and a todo.
///
/// `defaults` supplies the timeout of every test and the concurrency
/// ceiling of every suite. With `with_failure` one test fails.
pub fn demo_suite(defaults: &NodeOptions, with_failure: bool) -> Result<TestNode> {
    let test_opts = NodeOptions::new().with_timeout(defaults.timeout_millis);
    let suite_opts = NodeOptions::new().with_max_concurrency(defaults.max_concurrency);

    let root = TestNode::suite_with("demo", suite_opts.clone());
    root.test_with(
        "connect",
        Action::sync(|_| Ok("connected")),
        test_opts.clone().before(),
    )?;

    let arithmetic = root.group_with("arithmetic", suite_opts.clone())?;
    arithmetic.test_with("add", Action::sync(|_| Ok(2 + 2)), test_opts.clone())?;
    arithmetic.test_with("divide", sleep_then(20, 3.5), test_opts.clone())?;
    arithmetic.todo("modulo", None)?;
    if with_failure {
        arithmetic.test_with(
            "overflow",
            Action::sync(|ctx| -> anyhow::Result<u8> {
                u8::try_from(255u16 + ctx.index as u16)
                    .map_err(|e| anyhow::anyhow!("{} overflowed: {e}", ctx.name))
            }),
            test_opts.clone(),
        )?;
    }

    let io = root.group_with("io", suite_opts)?;
    io.test_with("slow read", sleep_then(50, "4 KiB"), test_opts.clone())?;
    io.test_with("flaky", Action::sync(|_| Ok(())), test_opts.clone().skip())?;
    io.test_with(
        "checksum",
        Action::sync(|_| Ok(format!("{:08x}", 0xC0FFEEu32))),
        test_opts.clone(),
    )?;

    root.test_with(
        "disconnect",
        Action::sync(|_| Ok("closed")),
        test_opts.after(),
    )?;

    Ok(root)
}

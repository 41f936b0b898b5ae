// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Per-iteration fault isolation for the long-running loops

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::error;

/// Run one loop iteration, turning a panic into a logged failure.
///
/// Returns `None` when the iteration panicked; the caller keeps looping.
pub async fn isolate<F>(task: &str, iteration: F) -> Option<F::Output>
where
    F: Future,
{
    match AssertUnwindSafe(iteration).catch_unwind().await {
        Ok(output) => Some(output),
        Err(panic) => {
            error!(task, "Loop iteration panicked: {}", panic_message(panic.as_ref()));
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

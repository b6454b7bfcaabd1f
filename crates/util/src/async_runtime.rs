//! Async runtime helpers for blocking callers.
//!
//! This module provides a single entry point for executing async futures from
//! synchronous code paths, reusing the current Tokio runtime when available.

use std::{future::Future, io, thread};

use tokio::{
    runtime::{Builder, Handle, Runtime, RuntimeFlavor},
    task,
};

/// Execute an async future from synchronous code.
///
/// # Arguments
/// - `future`: The future to run to completion.
///
/// # Returns
/// Returns the future's output, or an error if a Tokio runtime cannot be created.
///
/// # Notes
/// - Reuses the current runtime when it is multi-threaded.
/// - Inside a current-thread runtime the future runs on a helper thread with
///   its own runtime, since that runtime cannot be blocked in place.
/// - Falls back to a single-threaded runtime for call sites outside Tokio.
pub fn block_on_future<F, T>(future: F) -> io::Result<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => Ok(task::block_in_place(|| handle.block_on(future))),
        Ok(_) => thread::spawn(move || current_thread_runtime().map(|runtime| runtime.block_on(future)))
            .join()
            .map_err(|_| io::Error::other("blocking helper thread panicked"))?,
        Err(_) => Ok(current_thread_runtime()?.block_on(future)),
    }
}

fn current_thread_runtime() -> io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

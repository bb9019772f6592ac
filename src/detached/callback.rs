//! Callback-based detached operation monitoring
//!
//! This module provides the wrapper which makes fire-and-forget operations
//! safe. [`attach`] takes an operation nobody is going to await, spawns it on
//! the current async runtime, and guarantees that exactly one of its success or
//! failure continuations runs once the operation settles. Errors, panics, and
//! even the runtime dropping the operation all end up in the failure
//! continuation instead of escaping.
//!
//! Continuations are wired to the operation before it is ever polled. Since
//! Rust futures do nothing until polled, an operation cannot fail before its
//! failure continuation is in place, whatever its first action is.

use crate::client::IAsyncOpClient;
use crate::detached::handle::{completion_channel, CompletionHandle, CompletionSender};
use crate::detached::panic_message;
use crate::executor::{CallbackChannel, CallbackExecutor};
use crate::server::{AsyncOpServerConfig, GenericAsyncOpServer};
use crate::status::{AsyncOpError, AsyncOpStatus};
use futures_util::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};


/// Boxed success continuation
type SuccessFn<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Boxed failure continuation
type FailureFn<C, E> = Box<dyn FnOnce(&mut C, AsyncOpError<E>) + Send>;


/// Pair of optional outcome continuations
///
/// `C` is the callback context of the executor the continuations will run on,
/// see [`CallbackExecutor::Context`].
pub struct Continuations<C, E> {
    on_success: Option<SuccessFn<C>>,
    on_failure: Option<FailureFn<C, E>>,
}
//
impl<C, E> Continuations<C, E> {
    /// Start with neither continuation
    pub fn new() -> Self {
        Continuations { on_success: None, on_failure: None }
    }

    /// Run this once the operation completes
    pub fn on_success<F>(mut self, f: F) -> Self
        where F: FnOnce(&mut C) + Send + 'static
    {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Run this once the operation fails
    pub fn on_failure<F>(mut self, f: F) -> Self
        where F: FnOnce(&mut C, AsyncOpError<E>) + Send + 'static
    {
        self.on_failure = Some(Box::new(f));
        self
    }

    /// Check whether a failure continuation was provided
    pub fn observes_failure(&self) -> bool {
        self.on_failure.is_some()
    }
}
//
impl<C, E: Display> Continuations<C, E> {
    /// Run whichever continuation matches a status
    ///
    /// A panicking continuation is logged and contained, so that it can
    /// neither escape `attach` nor keep the operation from settling.
    fn deliver(&mut self, context: &mut C, status: AsyncOpStatus<E>) {
        let outcome = match status {
            AsyncOpStatus::Done => match self.on_success.take() {
                Some(on_success) => {
                    panic::catch_unwind(AssertUnwindSafe(|| on_success(context)))
                }
                None => Ok(()),
            },
            AsyncOpStatus::Error(err) => match self.on_failure.take() {
                Some(on_failure) => panic::catch_unwind(AssertUnwindSafe(|| {
                    on_failure(context, err)
                })),
                None => {
                    error!(error = %err,
                           "detached operation failed with no failure \
                            continuation, error swallowed");
                    Ok(())
                }
            },
            AsyncOpStatus::Cancelled => {
                debug!("detached operation settled after cancellation");
                Ok(())
            }
            AsyncOpStatus::Pending | AsyncOpStatus::Running => Ok(()),
        };
        if let Err(payload) = outcome {
            error!(panic = %panic_message(payload.as_ref()),
                   "continuation of a detached operation panicked");
        }
    }
}
//
impl<C, E> Default for Continuations<C, E> {
    fn default() -> Self {
        Self::new()
    }
}


/// Detached operation object
pub struct AsyncOp<X: CallbackExecutor, E: Clone + Send + 'static> {
    /// Server interface used to submit status updates
    server: AsyncOpServer<X, E>,

    /// Client interface used to monitor the operation status
    client: AsyncOpClient<E>,
}
//
impl<X: CallbackExecutor, E: Clone + Send + 'static> AsyncOp<X, E> {
    /// Split the operation object into client and server objects, the server
    /// travels along with the operation while the client stays behind
    pub fn split(self) -> (AsyncOpServer<X, E>, AsyncOpClient<E>) {
        (self.server, self.client)
    }
}


/// Build the client and server of a detached operation
pub fn new_async_op<X, E>(
    executor: &X,
    continuations: Continuations<X::Context, E>
) -> AsyncOp<X, E>
    where X: CallbackExecutor,
          X::Context: 'static,
          E: Clone + Display + Send + 'static
{
    // Setup a callback channel on the executor...
    let mut continuations = continuations;
    let channel = executor.setup_callback(
        move |context: &mut X::Context, status: AsyncOpStatus<E>| {
            continuations.deliver(context, status)
        }
    );

    // ...a completion channel for whoever wants to wait...
    let (completion_tx, completion_rx) =
        completion_channel(AsyncOpStatus::Pending);

    // ...and a shared cancellation flag...
    let cancelled = Arc::new(AtomicBool::new(false));

    // ...then build the operation client and server
    AsyncOp {
        server: GenericAsyncOpServer::new(
            CallbackServerConfig {
                channel,
                completion: completion_tx,
                cancelled: cancelled.clone(),
            },
            &AsyncOpStatus::Pending
        ),
        client: AsyncOpClient {
            cancelled,
            completion: completion_rx,
        },
    }
}


/// Spawn a detached operation with its outcome continuations
///
/// Returns immediately and never panics. Exactly one continuation runs once
/// the operation settles, on the executor's context:
///
/// - `on_success` if the operation returns `Ok(())`
/// - `on_failure` if it returns an error, panics, is dropped by its runtime
///   before settling, or if there is no runtime to spawn it on
///
/// If no failure continuation is provided, failures are logged and swallowed.
/// Neither continuation runs if the returned client was cancelled before the
/// operation settled.
pub fn attach<X, Fut, E>(
    executor: &X,
    operation: Fut,
    continuations: Continuations<X::Context, E>
) -> AsyncOpClient<E>
    where X: CallbackExecutor + 'static,
          X::Context: 'static,
          Fut: Future<Output = Result<(), E>> + Send + 'static,
          E: Clone + Display + Send + Sync + 'static
{
    if !continuations.observes_failure() {
        warn!("detached operation attached without a failure continuation");
    }

    let (mut server, client) = new_async_op(executor, continuations).split();
    match Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(drive(server, operation));
        }
        Err(_) => server.update(AsyncOpStatus::Error(AsyncOpError::NoRuntime)),
    }
    client
}


/// Run an operation to its final status, reporting on the way
async fn drive<Config, Fut>(
    mut server: GenericAsyncOpServer<Config>,
    operation: Fut
)
    where Config: AsyncOpServerConfig,
          Fut: Future<Output = Result<(), Config::Error>>
{
    server.update(AsyncOpStatus::Running);
    let status = match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(Ok(())) => AsyncOpStatus::Done,
        Ok(Err(e)) => AsyncOpStatus::Error(AsyncOpError::Custom(e)),
        Err(payload) => AsyncOpStatus::Error(
            AsyncOpError::Panicked(panic_message(payload.as_ref()))
        ),
    };
    server.update(status);
}


/// Server interface, used to send operation status updates to the client
pub type AsyncOpServer<X, E> = GenericAsyncOpServer<CallbackServerConfig<X, E>>;


/// Server configuration for callback-based operation monitoring
pub struct CallbackServerConfig<X: CallbackExecutor, E: Send + 'static> {
    /// Final statuses are sent to the continuations through this channel
    channel: X::Channel<E>,

    /// Every status is published to completion handles through this sender
    completion: CompletionSender<E>,

    /// In addition, the client & server also share a cancellation flag
    cancelled: Arc<AtomicBool>,
}
//
impl<X, E> AsyncOpServerConfig for CallbackServerConfig<X, E>
    where X: CallbackExecutor,
          E: Clone + Send + 'static
{
    type Error = E;

    /// Method used to send a status update to the client
    fn update(&mut self, status: AsyncOpStatus<E>) {
        let status = if status.is_final() && self.cancelled() {
            AsyncOpStatus::Cancelled
        } else {
            status
        };

        // Continuations go first, so that whoever waits on the completion
        // handle finds them already run (inline) or queued (dispatch)
        if status.is_final() {
            self.channel.notify(status.clone());
        }
        self.completion.publish(status);
    }

    /// Method used to query whether the client has cancelled the operation
    fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}


/// Client interface, left behind by whoever spawned the operation
pub struct AsyncOpClient<E> {
    /// Shared with the server, set to invalidate the continuations
    cancelled: Arc<AtomicBool>,

    /// Status of the operation
    completion: CompletionHandle<E>,
}
//
impl<E: Clone> AsyncOpClient<E> {
    /// Clone the current operation status
    pub fn status(&self) -> AsyncOpStatus<E> {
        self.completion.status()
    }

    /// Check whether the operation has reached a final status
    pub fn is_settled(&self) -> bool {
        self.completion.is_settled()
    }

    /// Get an awaitable handle on the operation's final status
    pub fn completion(&self) -> CompletionHandle<E> {
        self.completion.clone()
    }
}
//
impl<E> IAsyncOpClient for AsyncOpClient<E> {
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

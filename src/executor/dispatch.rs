//! Dispatch callback executor, marshaling callbacks onto a single context
//!
//! A UI session mutates its state from a single logical context. Timers and
//! detached operations, however, run on the async runtime's worker threads.
//! Anything those want to do to UI state must therefore be sent back to the
//! owning context as a job, and run there in order. This module provides that
//! context, the [`Dispatcher`], along with a callback executor which delivers
//! operation callbacks as dispatcher jobs.
//!
//! Because the dispatcher owns the state and runs jobs one at a time, no lock
//! is needed around the state itself.
//!
//! The dispatcher is also the session's global error path. A detached
//! operation spawned through [`DispatchHandle::spawn_unobserved`] has no
//! failure channel, so if it fails the failure lands here and ends the session.

use crate::detached::panic_message;
use crate::error::{DispatchError, SessionError};
use crate::executor::{CallbackChannel, CallbackExecutor};
use crate::status::AsyncOpStatus;
use futures_util::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};


/// Unit of work sent to a dispatch context
pub type Job<S> = Box<dyn FnOnce(&mut S) + Send>;


/// Messages travelling from handles to their dispatcher
enum DispatchMsg<S> {
    /// Run this job against the state
    Job(Job<S>),

    /// A detached operation failed without a failure channel
    Unhandled(String),

    /// Stop the session
    Shutdown,
}


/// Single-threaded dispatch context owning some state
pub struct Dispatcher<S> {
    /// State which is only ever touched by dispatched jobs
    state: S,

    /// Incoming jobs
    rx: mpsc::UnboundedReceiver<DispatchMsg<S>>,

    /// Kept until the dispatcher runs so that handles can be created
    tx: mpsc::UnboundedSender<DispatchMsg<S>>,
}
//
impl<S: 'static> Dispatcher<S> {
    /// Create a dispatcher, building its state with a handle to itself
    pub fn new(build: impl FnOnce(DispatchHandle<S>) -> S) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = build(DispatchHandle { tx: tx.clone() });
        Dispatcher { state, rx, tx }
    }

    /// Create a new handle to this dispatcher
    pub fn handle(&self) -> DispatchHandle<S> {
        DispatchHandle { tx: self.tx.clone() }
    }

    /// Access the state between jobs
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Run every job which is already queued, without waiting for more
    ///
    /// Returns how many jobs ran. An unobserved failure stops the draining and
    /// is reported as an error, exactly like [`run`](Self::run) would.
    pub fn drain(&mut self) -> Result<usize, SessionError> {
        let mut ran = 0;
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                DispatchMsg::Job(job) => {
                    job(&mut self.state);
                    ran += 1;
                }
                DispatchMsg::Unhandled(message) => {
                    error!(%message, "unhandled failure reached the dispatcher");
                    return Err(SessionError::UnhandledFailure(message));
                }
                DispatchMsg::Shutdown => break,
            }
        }
        Ok(ran)
    }

    /// Run jobs until shutdown is requested or every handle is gone
    ///
    /// State which keeps a handle to its own dispatcher, like a UI page that
    /// schedules work on itself, keeps the queue open forever. Such a session
    /// only ends through [`DispatchHandle::shutdown`] or an unobserved failure.
    ///
    /// The state is handed back on a clean exit. If a detached operation fails
    /// with nobody observing it, the session ends with an error and its state
    /// is dropped.
    pub async fn run(self) -> Result<S, SessionError> {
        let Dispatcher { mut state, mut rx, tx } = self;
        drop(tx);

        while let Some(msg) = rx.recv().await {
            match msg {
                DispatchMsg::Job(job) => job(&mut state),
                DispatchMsg::Unhandled(message) => {
                    error!(%message, "unhandled failure reached the dispatcher");
                    return Err(SessionError::UnhandledFailure(message));
                }
                DispatchMsg::Shutdown => {
                    debug!("dispatcher shutting down");
                    break;
                }
            }
        }
        Ok(state)
    }
}


/// Clonable, thread-safe handle used to send work to a dispatcher
pub struct DispatchHandle<S> {
    tx: mpsc::UnboundedSender<DispatchMsg<S>>,
}
//
impl<S> Clone for DispatchHandle<S> {
    fn clone(&self) -> Self {
        DispatchHandle { tx: self.tx.clone() }
    }
}
//
impl<S: 'static> DispatchHandle<S> {
    /// Queue a job without waiting for it to run
    pub fn post<F>(&self, job: F) -> Result<(), DispatchError>
        where F: FnOnce(&mut S) + Send + 'static
    {
        self.tx
            .send(DispatchMsg::Job(Box::new(job)))
            .map_err(|_| DispatchError::Closed)
    }

    /// Run a job on the dispatch context and wait for its result
    pub async fn invoke<F, R>(&self, job: F) -> Result<R, DispatchError>
        where F: FnOnce(&mut S) -> R + Send + 'static,
              R: Send + 'static
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(move |state| {
            // The caller may have stopped waiting, which is fine
            let _ = reply_tx.send(job(state));
        })?;
        reply_rx.await.map_err(|_| DispatchError::Closed)
    }

    /// Spawn a detached operation with no failure channel at all
    ///
    /// This is the hazard the rest of the crate exists to avoid: if the
    /// operation fails or panics, the failure escapes to the dispatcher and
    /// ends the session. Prefer [`attach`](crate::detached::callback::attach).
    pub fn spawn_unobserved<Fut, E>(&self, operation: Fut)
        where Fut: Future<Output = Result<(), E>> + Send + 'static,
              E: Display + Send + 'static
    {
        warn!("spawning detached operation without a failure channel");
        let tx = self.tx.clone();
        let task = async move {
            let message = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            let _ = tx.send(DispatchMsg::Unhandled(message));
        };
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(task);
            }
            Err(_) => {
                let _ = self.tx.send(DispatchMsg::Unhandled(
                    "no async runtime available to run the operation".to_owned()
                ));
            }
        }
    }

    /// Ask the dispatcher to stop after the jobs queued so far
    pub fn shutdown(&self) {
        let _ = self.tx.send(DispatchMsg::Shutdown);
    }

    /// Check whether the dispatcher is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}


/// CallbackExecutor implementation delivering callbacks on a dispatcher
pub struct DispatchCallbackExecutor<S> {
    handle: DispatchHandle<S>,
}
//
impl<S> DispatchCallbackExecutor<S> {
    /// Create an executor delivering callbacks to the given dispatcher
    pub fn new(handle: DispatchHandle<S>) -> Self {
        DispatchCallbackExecutor { handle }
    }
}
//
impl<S> Clone for DispatchCallbackExecutor<S> {
    fn clone(&self) -> Self {
        DispatchCallbackExecutor { handle: self.handle.clone() }
    }
}
//
impl<S: 'static> CallbackExecutor for DispatchCallbackExecutor<S> {
    type Context = S;
    type Channel<E: Send + 'static> = DispatchCallbackChannel<S, E>;

    fn setup_callback<F, E>(&self, callback: F) -> Self::Channel<E>
        where F: FnMut(&mut S, AsyncOpStatus<E>) + Send + 'static,
              E: Send + 'static
    {
        DispatchCallbackChannel {
            callback: Arc::new(Mutex::new(Box::new(callback))),
            handle: self.handle.clone(),
        }
    }
}


/// Boxed status callback, shared between the jobs of one channel
type SharedCallback<S, E> =
    Arc<Mutex<Box<dyn FnMut(&mut S, AsyncOpStatus<E>) + Send>>>;


/// Callback channel which turns every status update into a dispatcher job
pub struct DispatchCallbackChannel<S, E> {
    /// Jobs run one at a time, so this lock is never contended
    callback: SharedCallback<S, E>,

    handle: DispatchHandle<S>,
}
//
impl<S: 'static, E: Send + 'static> CallbackChannel<E>
    for DispatchCallbackChannel<S, E>
{
    fn notify(&mut self, new_status: AsyncOpStatus<E>) {
        let callback = self.callback.clone();
        let posted = self.handle.post(move |state| {
            let mut callback =
                callback.lock().unwrap_or_else(PoisonError::into_inner);
            (*callback)(state, new_status);
        });
        if posted.is_err() {
            warn!("dispatcher is gone, dropping operation status update");
        }
    }
}

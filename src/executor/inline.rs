//! Inline callback executor, implementing synchronous callback execution
//!
//! This callback executor follows the traditional pattern of directly executing
//! callbacks on whichever runtime thread settled the operation. Callbacks get
//! no state to work on, which makes this executor a good fit for logging and
//! other side effects that are safe from any thread.

use crate::executor::{CallbackChannel, CallbackExecutor};
use crate::status::AsyncOpStatus;


/// CallbackExecutor implementation suitable for inline callback execution
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineCallbackExecutor {}
//
impl InlineCallbackExecutor {
    /// Create a new inline callback executor
    pub fn new() -> Self {
        InlineCallbackExecutor {}
    }
}
//
impl CallbackExecutor for InlineCallbackExecutor {
    type Context = ();
    type Channel<E: Send + 'static> = InlineCallbackChannel<E>;

    fn setup_callback<F, E>(&self, callback: F) -> Self::Channel<E>
        where F: FnMut(&mut (), AsyncOpStatus<E>) + Send + 'static,
              E: Send + 'static
    {
        InlineCallbackChannel { callback: Box::new(callback) }
    }
}


/// Callback channel which invokes an internal callback whenever a new operation
/// status is pushed into it
pub struct InlineCallbackChannel<E> {
    callback: Box<dyn FnMut(&mut (), AsyncOpStatus<E>) + Send>,
}
//
impl<E> CallbackChannel<E> for InlineCallbackChannel<E> {
    fn notify(&mut self, new_status: AsyncOpStatus<E>) {
        (self.callback)(&mut (), new_status);
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Make sure that callback channels are set up without calling back
    #[test]
    fn callback_setup() {
        // This callback will increment a counter if called
        let counter = Arc::new(AtomicUsize::new(0));
        let c_counter = counter.clone();
        let callback = move |_: &mut (), _: AsyncOpStatus<String>| {
            c_counter.fetch_add(1, Ordering::Relaxed);
        };

        let executor = InlineCallbackExecutor::new();
        let _channel = executor.setup_callback(callback);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    /// Make sure that callback channels propagate updates as expected
    #[test]
    fn update() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let c_seen = seen.clone();
        let callback = move |_: &mut (), s: AsyncOpStatus<String>| {
            c_seen.lock().unwrap().push(s);
        };

        let executor = InlineCallbackExecutor::new();
        let mut channel = executor.setup_callback(callback);
        channel.notify(AsyncOpStatus::Done);
        assert_eq!(*seen.lock().unwrap(), vec![AsyncOpStatus::Done]);
    }
}

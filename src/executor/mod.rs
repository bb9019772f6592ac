//! Callback executors
//!
//! Whenever callback-based notifications are used, one important design issue
//! is to decide where the callback functions should be executed.
//!
//! The simplest answer is to run callbacks directly on whichever runtime thread
//! happened to drive the detached operation to completion. This is known as
//! inline callback execution. It has minimal scheduling overhead, but it means
//! that the callback runs on a context the caller does not control, so it may
//! not touch state that belongs to another context, such as UI state.
//!
//! The other answer is to marshal callbacks back onto the context that owns
//! the state they are about to modify, typically a UI dispatch loop. For
//! consistency with the terminology of C++ tasking runtimes, the component in
//! charge of doing this is called a callback executor, or executor for short.
//!
//! Every executor declares a callback context, which is the state callbacks get
//! mutable access to when they run. An inline executor has no state to offer,
//! whereas a dispatch executor hands out the state it owns. This way, the type
//! system rejects a callback that would mutate UI state from the wrong context.

pub mod dispatch;
pub mod inline;

use crate::status::AsyncOpStatus;


/// Entry point to callback scheduling. Schedules callbacks to be executed
/// whenever an operation status changes.
pub trait CallbackExecutor {
    /// State which callbacks are granted mutable access to when they run
    type Context;

    /// Notification channel used by a detached operation to reach its callback
    type Channel<E: Send + 'static>: CallbackChannel<E>;

    /// Setup a notification channel with a certain callback
    fn setup_callback<F, E>(&self, callback: F) -> Self::Channel<E>
        where F: FnMut(&mut Self::Context, AsyncOpStatus<E>) + Send + 'static,
              E: Send + 'static;
}


/// Operation-side entry point used to have callbacks called on status updates
pub trait CallbackChannel<E>: Send {
    /// Notify the client that an operation status update has occured
    fn notify(&mut self, new_status: AsyncOpStatus<E>);
}

//! Detached asynchronous operation monitoring
//!
//! Picture yourself in a situation where: some code wants to start work that
//! takes a while, but is in no position to wait for it. A timer tick which must
//! return, a constructor which cannot be async, a button handler on a UI
//! thread. So the work is fired off and forgotten, and that is where the
//! trouble starts. If the work fails, either nobody hears about it, or the
//! failure bubbles up to some global handler which tears down the whole
//! session.
//!
//! This crate provides a wrapper which makes such fire-and-forget operations
//! safe. The caller attaches a success and a failure continuation, and the
//! wrapper guarantees that exactly one of them runs once the operation
//! settles, on a context of the caller's choosing. Errors, panics, and
//! operations dropped by their runtime all end up in the failure continuation.
//!
//! Two small consumers demonstrate the wrapper: a timer-driven refresh page
//! which reports failed refreshes on screen instead of crashing, and a service
//! which loads its data eagerly at construction time.

pub mod client;
pub mod config;
pub mod detached;
pub mod error;
pub mod executor;
pub mod refresh;
pub mod server;
pub mod services;
pub mod status;
pub mod timer;

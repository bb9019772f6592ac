//! Minimal detached operation client interface
//!
//! Generally speaking, the details of a detached operation's client interface
//! depend on how the client has chosen to observe the operation's outcome.
//! However, one service which is common to all clients is the ability to
//! revoke interest in that outcome.
//!
//! Note that the precise semantics of cancellation are deliberately weak here.
//! Once a detached operation has started it always runs to completion or
//! failure; what cancellation guarantees is that the continuations attached to
//! it will not run if the operation settles after the request. Owners of UI
//! state use this on disposal, so that no callback can touch a component that
//! is gone.


/// Features which all detached operation clients are expected to share
pub trait IAsyncOpClient {
    /// Request that the operation's pending continuations be dropped
    fn cancel(&mut self);

    /// Check whether cancellation was requested
    fn is_cancelled(&self) -> bool;
}

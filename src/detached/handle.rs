//! Awaitable completion handles
//!
//! This module provides a way to wait for a detached operation to settle
//! without being the one who spawned it. A completion handle can be cloned and
//! passed around freely; every clone observes the same status. Once the
//! operation has reached a final status, the handle keeps reporting it forever
//! and waiting on it returns immediately.

use crate::status::{AsyncOpError, AsyncOpStatus};
use tokio::sync::watch;


/// Create a connected completion sender and handle with some initial status
pub fn completion_channel<E>(
    initial_status: AsyncOpStatus<E>
) -> (CompletionSender<E>, CompletionHandle<E>) {
    let (tx, rx) = watch::channel(initial_status);
    (CompletionSender { tx }, CompletionHandle { rx })
}


/// Operation-side end of a completion channel
pub struct CompletionSender<E> {
    /// Status updates are broadcast to every handle through this channel
    tx: watch::Sender<AsyncOpStatus<E>>,
}
//
impl<E> CompletionSender<E> {
    /// Publish a new operation status, even if nobody is listening
    pub fn publish(&self, status: AsyncOpStatus<E>) {
        self.tx.send_replace(status);
    }
}


/// Awaitable view of a detached operation's status
pub struct CompletionHandle<E> {
    rx: watch::Receiver<AsyncOpStatus<E>>,
}
//
impl<E> Clone for CompletionHandle<E> {
    fn clone(&self) -> Self {
        CompletionHandle { rx: self.rx.clone() }
    }
}
//
impl<E: Clone> CompletionHandle<E> {
    /// Clone the current operation status
    pub fn status(&self) -> AsyncOpStatus<E> {
        self.rx.borrow().clone()
    }

    /// Check whether the operation has reached a final status
    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_final()
    }

    /// Wait for the operation's final status
    ///
    /// Returns immediately if the operation has already settled.
    pub async fn wait(&self) -> AsyncOpStatus<E> {
        let mut rx = self.rx.clone();
        let settled = rx
            .wait_for(|status| status.is_final())
            .await
            .map(|status| status.clone());
        match settled {
            Ok(status) => status,

            // The sender only goes away after publishing a final status, so
            // this is a last resort
            Err(_) => {
                let last = rx.borrow().clone();
                if last.is_final() {
                    last
                } else {
                    AsyncOpStatus::Error(AsyncOpError::ServerKilled)
                }
            }
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Check that the handle reports the initial status
    #[test]
    fn initial_status() {
        let (_sender, handle) =
            completion_channel::<String>(AsyncOpStatus::Pending);
        assert_eq!(handle.status(), AsyncOpStatus::Pending);
        assert!(!handle.is_settled());
    }

    /// Check that waiting blocks until a final status is published
    #[tokio::test(start_paused = true)]
    async fn wait_for_final_status() {
        let (sender, handle) =
            completion_channel::<String>(AsyncOpStatus::Pending);
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait().await })
        };

        sender.publish(AsyncOpStatus::Running);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        sender.publish(AsyncOpStatus::Done);
        assert_eq!(waiter.await.unwrap(), AsyncOpStatus::Done);
        assert!(handle.is_settled());
    }

    /// Check that waiting on a settled handle returns immediately
    #[tokio::test]
    async fn settled_handle_is_immediate() {
        let (sender, handle) =
            completion_channel::<String>(AsyncOpStatus::Pending);
        sender.publish(AsyncOpStatus::Error(AsyncOpError::Custom("x".into())));
        drop(sender);
        assert_eq!(
            handle.wait().await,
            AsyncOpStatus::Error(AsyncOpError::Custom("x".into()))
        );
        assert_eq!(handle.wait().await, handle.status());
    }

    /// Check the fallback when the sender vanishes without settling
    #[tokio::test]
    async fn sender_dropped_early() {
        let (sender, handle) =
            completion_channel::<String>(AsyncOpStatus::Running);
        drop(sender);
        assert_eq!(
            handle.wait().await,
            AsyncOpStatus::Error(AsyncOpError::ServerKilled)
        );
    }
}

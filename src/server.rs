//! General implementation of a detached operation server
//!
//! The server is the half of a detached operation which travels along with the
//! running future and reports on its progress. It is the piece that enforces
//! the central promise of this crate: whatever happens to the operation, its
//! observers are told about exactly one final status.
//!
//! Code using `attach` never touches a server: it stays inside the spawned
//! task, where nobody else can forge status updates.

use crate::status::{self, AsyncOpError, AsyncOpStatus};
use tracing::debug;


/// Server interface, used to submit operation status updates
pub struct GenericAsyncOpServer<Config: AsyncOpServerConfig> {
    /// Where status updates are sent
    config: Config,

    /// Set once a final status went out, nothing is sent after that
    reached_final_status: bool,
}
//
impl<Config: AsyncOpServerConfig> GenericAsyncOpServer<Config> {
    /// Create a new server interface with some initial status
    pub fn new(
        config: Config,
        initial_status: &AsyncOpStatus<Config::Error>
    ) -> Self {
        GenericAsyncOpServer {
            config,
            reached_final_status: status::is_final(initial_status),
        }
    }

    /// Update the current status of the detached operation
    ///
    /// Updates sent after a final status are dropped, which is what makes
    /// terminal outcomes exactly-once.
    pub fn update(&mut self, status: AsyncOpStatus<Config::Error>) {
        if self.is_settled() {
            debug!("ignoring status update after final status");
            return;
        }
        self.reached_final_status = status::is_final(&status);

        self.config.update(status);
    }

    /// Check whether the client asked for its continuations to be dropped
    pub fn cancelled(&self) -> bool {
        self.config.cancelled()
    }

    /// Check whether a final status has already been sent
    pub fn is_settled(&self) -> bool {
        self.reached_final_status
    }
}
//
impl<Config: AsyncOpServerConfig> Drop for GenericAsyncOpServer<Config> {
    /// An operation dropped before settling is reported as killed, so that
    /// its observers are never left waiting
    fn drop(&mut self) {
        if !self.is_settled() {
            self.update(AsyncOpStatus::Error(AsyncOpError::ServerKilled));
        }
    }
}


/// Destination of a server's status updates
pub trait AsyncOpServerConfig {
    /// Application-specific error type of the operation
    type Error;

    /// Method used to send status updates to the client
    fn update(&mut self, status: AsyncOpStatus<Self::Error>);

    /// Method used to query whether the client has cancelled the operation
    fn cancelled(&self) -> bool;
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Server configuration which records every update it receives
    struct RecordingConfig {
        log: Arc<Mutex<Vec<AsyncOpStatus<String>>>>,
    }
    //
    impl AsyncOpServerConfig for RecordingConfig {
        type Error = String;

        fn update(&mut self, status: AsyncOpStatus<String>) {
            self.log.lock().unwrap().push(status);
        }

        fn cancelled(&self) -> bool {
            false
        }
    }

    type StatusLog = Arc<Mutex<Vec<AsyncOpStatus<String>>>>;

    fn recording_server() -> (GenericAsyncOpServer<RecordingConfig>, StatusLog) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = GenericAsyncOpServer::new(
            RecordingConfig { log: log.clone() },
            &AsyncOpStatus::Pending
        );
        (server, log)
    }

    /// Check that updates propagate, and that nothing follows a final status
    #[test]
    fn exactly_one_final_status() {
        let (mut server, log) = recording_server();
        server.update(AsyncOpStatus::Running);
        server.update(AsyncOpStatus::Done);
        server.update(AsyncOpStatus::Error(AsyncOpError::Custom("late".into())));
        drop(server);

        let log = log.lock().unwrap();
        assert_eq!(*log, vec![AsyncOpStatus::Running, AsyncOpStatus::Done]);
    }

    /// Check that dropping an unsettled server reports it as killed
    #[test]
    fn drop_reports_server_killed() {
        let (mut server, log) = recording_server();
        server.update(AsyncOpStatus::Running);
        assert!(!server.is_settled());
        drop(server);

        let log = log.lock().unwrap();
        assert_eq!(
            log.last(),
            Some(&AsyncOpStatus::Error(AsyncOpError::ServerKilled))
        );
        assert_eq!(log.len(), 2);
    }

    /// Check that a server created in a final state never reports anything
    #[test]
    fn final_initial_status() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = GenericAsyncOpServer::new(
            RecordingConfig { log: log.clone() },
            &AsyncOpStatus::Done
        );
        assert!(server.is_settled());
        drop(server);
        assert!(log.lock().unwrap().is_empty());
    }
}

//! Polling-based state publication
//!
//! This module provides a way for a dispatch context to publish snapshots of
//! its state to a reader who only wants to periodically check the latest one,
//! as is the case for a renderer refreshing UI controls. Snapshots go through a
//! triple buffer, so neither side ever waits on the other and the reader always
//! sees the most recent complete snapshot.

use triple_buffer::{Input, Output, TripleBuffer};


/// Create a connected snapshot publisher and reader
pub fn snapshot_channel<T: Clone + Send>(
    initial: T
) -> (SnapshotPublisher<T>, SnapshotReader<T>) {
    let (buf_input, buf_output) = TripleBuffer::new(&initial).split();
    (
        SnapshotPublisher { buf_input, published: 0 },
        SnapshotReader { buf_output },
    )
}


/// Writing end, owned by the dispatch context
pub struct SnapshotPublisher<T: Send> {
    /// New snapshots will be sent through this triple buffer
    buf_input: Input<T>,

    /// Number of snapshots published so far
    published: u64,
}
//
impl<T: Send> SnapshotPublisher<T> {
    /// Publish a new snapshot, replacing any unread one
    pub fn publish(&mut self, snapshot: T) {
        self.buf_input.write(snapshot);
        self.published += 1;
    }

    /// Number of snapshots published so far
    pub fn published(&self) -> u64 {
        self.published
    }
}


/// Reading end, owned by whoever renders the state
pub struct SnapshotReader<T: Send> {
    /// Snapshots will be read through this triple buffer
    buf_output: Output<T>,
}
//
impl<T: Send> SnapshotReader<T> {
    /// Access the latest published snapshot
    pub fn latest(&mut self) -> &T {
        self.buf_output.read()
    }

    /// Check whether a snapshot was published since the last read
    pub fn has_update(&self) -> bool {
        self.buf_output.updated()
    }
}

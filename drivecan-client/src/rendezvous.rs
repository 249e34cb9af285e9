//! Single-slot handoff between the bus receive path and a blocked caller

use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};

/// A single-producer/single-consumer rendezvous carrying one payload
///
/// Built on a zero-capacity channel: a [`notify`](Rendezvous::notify) succeeds only while a
/// thread is blocked in [`wait`](Rendezvous::wait), and a notification with no waiter is lost
/// rather than queued. The slot is created once per transaction context and reused across any
/// number of wait/notify cycles.
///
/// At most one thread may wait at a time; callers serialize their transactions above this
/// layer.
#[derive(Debug)]
pub struct Rendezvous<T = ()> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Rendezvous<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self { tx, rx }
    }

    /// Block the calling thread until a payload is delivered or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Hand `value` to a currently-waiting thread
    ///
    /// Returns false without blocking when no thread is waiting; the value is dropped.
    pub fn notify(&self, value: T) -> bool {
        self.tx.try_send(value).is_ok()
    }
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

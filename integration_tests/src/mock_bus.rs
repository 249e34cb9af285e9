//! A recording stand-in for the CAN transport

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use drivecan_common::{
    traits::{CanSendError, CanSender},
    CanMessage,
};

/// Records every frame sent through its senders, for later inspection by tests
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    sent: Arc<Mutex<Vec<CanMessage>>>,
    fail_sends: Arc<AtomicBool>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_sender(&self) -> MockSender {
        MockSender { bus: self.clone() }
    }

    /// The nth frame sent since the last flush
    pub fn message(&self, n: usize) -> CanMessage {
        self.sent.lock().unwrap()[n]
    }

    pub fn last_message(&self) -> CanMessage {
        *self.sent.lock().unwrap().last().expect("no messages sent")
    }

    pub fn message_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn flush(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Make subsequent sends fail, to exercise transport error paths
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }
}

/// A sender handle onto a [`MockBus`]
#[derive(Debug, Clone)]
pub struct MockSender {
    bus: MockBus,
}

impl CanSender for MockSender {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        if self.bus.fail_sends.load(Ordering::Relaxed) {
            return Err(CanSendError(msg));
        }
        self.bus.sent.lock().unwrap().push(msg);
        Ok(())
    }
}

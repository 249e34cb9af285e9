//! Per-node transmission pacing

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use drivecan_common::{
    traits::{CanSendError, CanSender},
    CanMessage,
};

/// Guard enforcing a minimum gap between transmissions
///
/// Acquiring the guard may sleep out the remainder of the gap, never longer, and never fails.
/// One pacer is shared by every sender handle cloned for a node, so the spacing holds across
/// all of that node's traffic.
#[derive(Debug)]
pub struct TxPacer {
    min_gap: Duration,
    last_tx: Mutex<Option<Instant>>,
}

impl TxPacer {
    /// Create a pacer enforcing `min_gap` between acquisitions
    pub fn new(min_gap: Duration) -> Self {
        Self { min_gap, last_tx: Mutex::new(None) }
    }

    /// Block until the gap since the previous acquisition has elapsed
    pub fn acquire(&self) {
        let mut last_tx = self.last_tx.lock().unwrap();
        if let Some(previous) = *last_tx {
            let elapsed = previous.elapsed();
            if elapsed < self.min_gap {
                std::thread::sleep(self.min_gap - elapsed);
            }
        }
        *last_tx = Some(Instant::now());
    }
}

/// A sender wrapper spacing its node's frames through a shared [`TxPacer`]
///
/// Clones share the pacer, so every handle derived from one `PacedSender` participates in the
/// same spacing.
#[derive(Debug)]
pub struct PacedSender<S> {
    inner: S,
    pacer: Arc<TxPacer>,
}

impl<S> PacedSender<S> {
    /// Wrap `inner`, enforcing `min_gap` between its frames
    pub fn new(inner: S, min_gap: Duration) -> Self {
        Self { inner, pacer: Arc::new(TxPacer::new(min_gap)) }
    }

    /// Wrap `inner` on an already-shared pacer
    pub fn with_pacer(inner: S, pacer: Arc<TxPacer>) -> Self {
        Self { inner, pacer }
    }

    /// The pacer shared by this sender's clones
    pub fn pacer(&self) -> Arc<TxPacer> {
        self.pacer.clone()
    }
}

impl<S: Clone> Clone for PacedSender<S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), pacer: self.pacer.clone() }
    }
}

impl<S: CanSender> CanSender for PacedSender<S> {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        self.pacer.acquire();
        self.inner.send(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivecan_common::CanId;

    struct CountingSender(u32);

    impl CanSender for CountingSender {
        fn send(&mut self, _msg: CanMessage) -> Result<(), CanSendError> {
            self.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn spaces_consecutive_sends() {
        let gap = Duration::from_millis(20);
        let mut sender = PacedSender::new(CountingSender(0), gap);
        let msg = CanMessage::new(CanId::std(0x205), &[0x11]);

        let start = Instant::now();
        sender.send(msg).unwrap();
        sender.send(msg).unwrap();
        sender.send(msg).unwrap();

        assert!(start.elapsed() >= 2 * gap);
        assert_eq!(sender.inner.0, 3);
    }

    #[test]
    fn first_send_is_not_delayed() {
        let mut sender = PacedSender::new(CountingSender(0), Duration::from_secs(5));
        let msg = CanMessage::new(CanId::std(0x205), &[0x11]);

        let start = Instant::now();
        sender.send(msg).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn clones_share_the_pacer() {
        let gap = Duration::from_millis(20);
        let sender = PacedSender::new(CountingSender(0), gap);
        let mut a = PacedSender::with_pacer(CountingSender(0), sender.pacer());
        let mut b = PacedSender::with_pacer(CountingSender(0), sender.pacer());
        let msg = CanMessage::new(CanId::std(0x205), &[0x11]);

        let start = Instant::now();
        a.send(msg).unwrap();
        b.send(msg).unwrap();
        assert!(start.elapsed() >= gap);
    }
}

#![allow(dead_code)]
use std::{sync::Arc, thread, thread::JoinHandle, time::Duration};

use drivecan_client::SdoClient;
use integration_tests::mock_bus::MockSender;

/// Per-phase response timeout used by the happy-path tests
pub const TIMEOUT: Duration = Duration::from_millis(500);

/// Build an 8-byte SDO frame: command byte, index (LE), sub-index, 32-bit tail (LE)
pub fn sdo_frame(op: u8, index: u16, sub: u8, tail: u32) -> [u8; 8] {
    let mut frame = [0u8; 8];
    frame[0] = op;
    frame[1..3].copy_from_slice(&index.to_le_bytes());
    frame[3] = sub;
    frame[4..8].copy_from_slice(&tail.to_le_bytes());
    frame
}

/// Build an 8-byte segment frame: command byte followed by up to 7 payload bytes
pub fn seg_frame(op: u8, payload: &[u8]) -> [u8; 8] {
    let mut frame = [0u8; 8];
    frame[0] = op;
    frame[1..1 + payload.len()].copy_from_slice(payload);
    frame
}

/// Play the node's side of a transaction: deliver `responses` in order, each one as soon as
/// the client is blocked waiting for it
///
/// Join the returned handle at the end of the test; it panics if any response was never
/// consumed.
pub fn respond_in_order(
    sdo: Arc<SdoClient<MockSender>>,
    responses: Vec<[u8; 8]>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for (i, response) in responses.iter().enumerate() {
            let mut delivered = false;
            for _ in 0..2000 {
                if sdo.notify(response) {
                    delivered = true;
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            assert!(delivered, "response {i} was never consumed");
        }
    })
}

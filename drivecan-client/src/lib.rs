//! A client-side protocol engine for CANopen devices on a shared bus
//!
//! The crate provides the pieces device drivers build on:
//!
//! - An [SDO client](SdoClient) for reading/writing a node's object dictionary through its SDO
//!   server, with expedited and segmented transfers
//! - [Receive](ReceivePdo) and [Transmit](TransmitPdo) PDO objects covering configuration,
//!   outgoing value packing, and incoming value dispatch
//! - A [Rendezvous] primitive bridging the bus receive path to blocking callers
//! - A [PacedSender] enforcing a minimum inter-frame gap per node
//!
//! There is no worker thread inside the engine: an external receive loop demultiplexes incoming
//! frames by COB-ID to [`SdoClient::notify`] and [`TransmitPdo::accept`], and everything else
//! blocks the calling thread until satisfied or timed out.
#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations
)]

mod paced_sender;
mod pdo;
mod rendezvous;
mod sdo_client;
pub use drivecan_common as common;

pub use paced_sender::{PacedSender, TxPacer};
pub use pdo::{
    PdoConfigError, PdoConfiguration, PdoMapping, PdoTransmissionType, PdoValues, ReceivePdo,
    TransmitPdo,
};
pub use rendezvous::Rendezvous;
pub use sdo_client::{SdoClient, SdoClientError};

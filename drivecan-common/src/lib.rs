//! Common functionality shared among other drivecan crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `drivecan-client`.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]

pub mod constants;
#[cfg(feature = "std")]
pub mod fixed_point;
pub mod messages;
pub mod sdo;
pub mod traits;
pub mod value;

pub use messages::{CanId, CanMessage};
#[cfg(feature = "std")]
pub use messages::msg_to_str;
pub use value::ObjectValue;

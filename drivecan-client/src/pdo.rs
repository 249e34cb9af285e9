//! PDO configuration, outgoing value packing, and incoming value dispatch

use std::sync::{Arc, Mutex};

use drivecan_common::{
    constants::{cob_id_flags, comm_params, object_ids},
    traits::{CanSendError, CanSender},
    CanId, CanMessage, ObjectValue,
};
use snafu::{ResultExt, Snafu};

use crate::sdo_client::{SdoClient, SdoClientError};

/// Specifies the number of mapping entries supported per PDO
///
/// Without sub-byte mapping, a classic 8-byte frame cannot carry more than 8 mapped objects.
const MAX_MAPPINGS: usize = 8;

/// Errors raised while configuring a PDO
#[derive(Debug, PartialEq, Snafu)]
pub enum PdoConfigError {
    /// The configuration requests a property this PDO kind does not have
    #[snafu(display("PDO does not support {property}"))]
    UnsupportedProperty {
        /// The offending property
        property: &'static str,
    },
    /// An SDO write in the configuration sequence failed
    #[snafu(display("PDO configuration failed writing {step}"))]
    Transfer {
        /// The parameter whose write failed
        step: String,
        /// The underlying SDO failure
        source: SdoClientError,
    },
}

/// When a PDO is sent or received, relative to SYNC and application events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdoTransmissionType {
    /// Transmitted on the SYNC following an application event
    SynchronousAcyclic,
    /// Transmitted on every Nth SYNC, N in 1..=240
    SynchronousCyclic(u8),
    /// Transmitted on RTR request, updated on SYNC
    RtrSynchronous,
    /// Transmitted on RTR request, updated on application events
    RtrEventDriven,
    /// Transmitted on manufacturer-specific events
    EventDrivenManufacturer,
    /// Transmitted on device-profile events
    EventDrivenProfile,
}

impl PdoTransmissionType {
    /// The transmission type byte written to the communication parameters
    ///
    /// Panics if a cyclic period lies outside 1..=240.
    pub fn to_byte(self) -> u8 {
        use PdoTransmissionType::*;
        match self {
            SynchronousAcyclic => 0,
            SynchronousCyclic(n) => {
                assert!(
                    (1..=240).contains(&n),
                    "cyclic transmission period must be in 1..=240"
                );
                n
            }
            RtrSynchronous => 252,
            RtrEventDriven => 253,
            EventDrivenManufacturer => 254,
            EventDrivenProfile => 255,
        }
    }
}

/// One mapped object: where the value lives in the dictionary and how wide it is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoMapping {
    /// Object index
    pub index: u16,
    /// Object sub-index
    pub subindex: u8,
    /// Mapped width in bits
    pub bit_len: u8,
}

impl PdoMapping {
    /// The 32-bit mapping parameter value written to the mapping object
    pub fn to_raw(self) -> u32 {
        (self.index as u32) << 16 | (self.subindex as u32) << 8 | self.bit_len as u32
    }
}

/// The set of parameters [`configure`](ReceivePdo::configure) writes to a PDO
///
/// Fields left unset are not written. RTR and sync-start are Transmit-PDO properties;
/// requesting them on a Receive PDO fails before anything is sent.
#[derive(Debug, Default, Clone)]
pub struct PdoConfiguration {
    rtr: Option<bool>,
    transmission_type: Option<PdoTransmissionType>,
    inhibit_time: Option<u16>,
    event_timer: Option<u16>,
    sync_start: Option<u8>,
    valid: Option<bool>,
    mappings: heapless::Vec<PdoMapping, MAX_MAPPINGS>,
}

impl PdoConfiguration {
    /// Create a configuration that writes nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow or disallow RTR requests (Transmit PDOs only)
    pub fn set_rtr(&mut self, rtr: bool) -> &mut Self {
        self.rtr = Some(rtr);
        self
    }

    /// Set the transmission type
    pub fn set_transmission_type(&mut self, transmission_type: PdoTransmissionType) -> &mut Self {
        self.transmission_type = Some(transmission_type);
        self
    }

    /// Set the inhibit time (multiples of 100 us)
    pub fn set_inhibit_time(&mut self, inhibit_time: u16) -> &mut Self {
        self.inhibit_time = Some(inhibit_time);
        self
    }

    /// Set the event timer (ms)
    pub fn set_event_timer(&mut self, event_timer: u16) -> &mut Self {
        self.event_timer = Some(event_timer);
        self
    }

    /// Set the SYNC start value (Transmit PDOs only)
    pub fn set_sync_start(&mut self, sync_start: u8) -> &mut Self {
        self.sync_start = Some(sync_start);
        self
    }

    /// Enable or disable the PDO once the sequence completes
    pub fn set_valid(&mut self, valid: bool) -> &mut Self {
        self.valid = Some(valid);
        self
    }

    /// Append a mapping entry for a value of type `T`
    ///
    /// Panics if the mapped payload would exceed the 64 bits of a classic frame.
    pub fn add_mapping<T: ObjectValue>(&mut self, index: u16, subindex: u8) -> &mut Self {
        let bit_len = (T::SIZE * 8) as u8;
        let total: u32 =
            self.mappings.iter().map(|m| m.bit_len as u32).sum::<u32>() + bit_len as u32;
        let entry = PdoMapping { index, subindex, bit_len };
        if total > 64 || self.mappings.push(entry).is_err() {
            panic!("PDO mapping exceeds 64 payload bits");
        }
        self
    }

    /// The configured mapping entries, in order
    pub fn mappings(&self) -> &[PdoMapping] {
        &self.mappings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PdoKind {
    Receive,
    Transmit,
}

impl PdoKind {
    fn supports_rtr(self) -> bool {
        self == PdoKind::Transmit
    }

    fn supports_sync_start(self) -> bool {
        self == PdoKind::Transmit
    }

    fn label(self) -> &'static str {
        match self {
            PdoKind::Receive => "RPDO",
            PdoKind::Transmit => "TPDO",
        }
    }
}

/// The identity shared by both PDO kinds
#[derive(Debug, Clone, Copy)]
struct PdoParams {
    kind: PdoKind,
    cob_id: u16,
    comm_index: u16,
    mapping_index: u16,
}

impl PdoParams {
    fn new(kind: PdoKind, node_id: u8, cob_base: u16, pdo_number: u16) -> Self {
        assert!(pdo_number >= 1, "PDO numbers are 1-based");
        let (comm_base, mapping_base) = match kind {
            PdoKind::Receive => (object_ids::RPDO_COMM_BASE, object_ids::RPDO_MAPPING_BASE),
            PdoKind::Transmit => (object_ids::TPDO_COMM_BASE, object_ids::TPDO_MAPPING_BASE),
        };
        Self {
            kind,
            cob_id: cob_base + node_id as u16,
            comm_index: comm_base + pdo_number - 1,
            mapping_index: mapping_base + pdo_number - 1,
        }
    }

    /// Run the ordered configuration sequence over the SDO client
    fn configure<S: CanSender>(
        &self,
        sdo: &SdoClient<S>,
        conf: &PdoConfiguration,
    ) -> Result<(), PdoConfigError> {
        let label = self.kind.label();

        let mut cob_id = sdo
            .read_value::<u32>(&format!("{label} COB-ID"), self.comm_index, comm_params::COB_ID)
            .context(TransferSnafu { step: "COB-ID" })?;

        // Validate requested properties before the first write, so an unsupported request
        // never leaves the PDO partially configured
        cob_id |= cob_id_flags::INVALID;
        if let Some(rtr) = conf.rtr {
            if !self.kind.supports_rtr() {
                log::error!("unsupported RTR property requested on {label}");
                return UnsupportedPropertySnafu { property: "RTR" }.fail();
            }
            if rtr {
                cob_id &= !cob_id_flags::NO_RTR;
            } else {
                cob_id |= cob_id_flags::NO_RTR;
            }
        }
        if conf.sync_start.is_some() && !self.kind.supports_sync_start() {
            log::error!("unsupported sync start property requested on {label}");
            return UnsupportedPropertySnafu { property: "sync start value" }.fail();
        }

        sdo.write_value(&format!("{label} COB-ID"), cob_id, self.comm_index, comm_params::COB_ID)
            .context(TransferSnafu { step: "COB-ID (disable)" })?;

        if let Some(transmission_type) = conf.transmission_type {
            sdo.write_value(
                &format!("{label} transmission type"),
                transmission_type.to_byte(),
                self.comm_index,
                comm_params::TRANSMISSION_TYPE,
            )
            .context(TransferSnafu { step: "transmission type" })?;
        }

        if let Some(inhibit_time) = conf.inhibit_time {
            sdo.write_value(
                &format!("{label} inhibit time"),
                inhibit_time,
                self.comm_index,
                comm_params::INHIBIT_TIME,
            )
            .context(TransferSnafu { step: "inhibit time" })?;
        }

        if let Some(event_timer) = conf.event_timer {
            sdo.write_value(
                &format!("{label} event timer"),
                event_timer,
                self.comm_index,
                comm_params::EVENT_TIMER,
            )
            .context(TransferSnafu { step: "event timer" })?;
        }

        if let Some(sync_start) = conf.sync_start {
            sdo.write_value(
                &format!("{label} sync start"),
                sync_start,
                self.comm_index,
                comm_params::SYNC_START,
            )
            .context(TransferSnafu { step: "sync start value" })?;
        }

        sdo.write_value(&format!("{label} mapping count"), 0u8, self.mapping_index, 0x00)
            .context(TransferSnafu { step: "mapping count (clear)" })?;

        for (k, mapping) in conf.mappings.iter().enumerate() {
            let sub = (k + 1) as u8;
            sdo.write_value(
                &format!("{label} mapping {sub}"),
                mapping.to_raw(),
                self.mapping_index,
                sub,
            )
            .context(TransferSnafu { step: format!("mapping {sub}") })?;
        }

        sdo.write_value(
            &format!("{label} mapping count"),
            conf.mappings.len() as u8,
            self.mapping_index,
            0x00,
        )
        .context(TransferSnafu { step: "mapping count" })?;

        if let Some(valid) = conf.valid {
            if valid {
                cob_id &= !cob_id_flags::INVALID;
            } else {
                cob_id |= cob_id_flags::INVALID;
            }
            sdo.write_value(
                &format!("{label} COB-ID"),
                cob_id,
                self.comm_index,
                comm_params::COB_ID,
            )
            .context(TransferSnafu { step: "COB-ID (enable)" })?;
        }

        Ok(())
    }
}

/// A tuple of values matching a PDO's mapped layout
///
/// Implemented for every [`ObjectValue`] and for tuples of up to eight of them; fields pack
/// contiguously, little-endian, in tuple order.
pub trait PdoValues: Sized {
    /// Total packed width in bytes
    const WIDTH: usize;

    /// Pack into `buf`, which must be at least `WIDTH` long
    fn pack(&self, buf: &mut [u8]);

    /// Unpack from `buf`; `None` when `buf` is shorter than `WIDTH`
    fn unpack(buf: &[u8]) -> Option<Self>;
}

macro_rules! impl_pdo_values_scalar {
    ($($t:ty),*) => {
        $(
            impl PdoValues for $t {
                const WIDTH: usize = <$t as ObjectValue>::SIZE;

                fn pack(&self, buf: &mut [u8]) {
                    self.encode(buf);
                }

                fn unpack(buf: &[u8]) -> Option<Self> {
                    if buf.len() < Self::WIDTH {
                        return None;
                    }
                    Some(<$t as ObjectValue>::decode(buf))
                }
            }
        )*
    };
}

impl_pdo_values_scalar!(u8, i8, u16, i16, u32, i32);

macro_rules! impl_pdo_values {
    ($($field:ident),+) => {
        impl<$($field: ObjectValue),+> PdoValues for ($($field,)+) {
            const WIDTH: usize = 0 $(+ $field::SIZE)+;

            #[allow(non_snake_case, unused_assignments)]
            fn pack(&self, buf: &mut [u8]) {
                let ($($field,)+) = self;
                let mut offset = 0;
                $(
                    $field.encode(&mut buf[offset..]);
                    offset += $field::SIZE;
                )+
            }

            #[allow(non_snake_case, unused_assignments)]
            fn unpack(buf: &[u8]) -> Option<Self> {
                if buf.len() < Self::WIDTH {
                    return None;
                }
                let mut offset = 0;
                Some(($(
                    {
                        let value = $field::decode(&buf[offset..]);
                        offset += $field::SIZE;
                        value
                    },
                )+))
            }
        }
    };
}

impl_pdo_values!(A);
impl_pdo_values!(A, B);
impl_pdo_values!(A, B, C);
impl_pdo_values!(A, B, C, D);
impl_pdo_values!(A, B, C, D, E);
impl_pdo_values!(A, B, C, D, E, F);
impl_pdo_values!(A, B, C, D, E, F, G);
impl_pdo_values!(A, B, C, D, E, F, G, H);

/// A host-to-node PDO: configured over SDO, written by packing mapped values into a frame
pub struct ReceivePdo<S> {
    params: PdoParams,
    sdo: Arc<SdoClient<S>>,
    sender: Mutex<S>,
}

impl<S> core::fmt::Debug for ReceivePdo<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReceivePdo").field("params", &self.params).finish_non_exhaustive()
    }
}

impl<S: CanSender> ReceivePdo<S> {
    /// Create the `pdo_number`th (1-based) Receive PDO of a node
    ///
    /// `cob_base` is the function-code base the PDO's frames travel on, e.g.
    /// [`RPDO_COB_BASES`](drivecan_common::constants::RPDO_COB_BASES)`[0]`.
    pub fn new(
        node_id: u8,
        cob_base: u16,
        pdo_number: u16,
        sdo: Arc<SdoClient<S>>,
        sender: S,
    ) -> Self {
        Self {
            params: PdoParams::new(PdoKind::Receive, node_id, cob_base, pdo_number),
            sdo,
            sender: Mutex::new(sender),
        }
    }

    /// The COB-ID this PDO's frames are sent on
    pub fn cob_id(&self) -> u16 {
        self.params.cob_id
    }

    /// Apply `conf` through the ordered SDO write sequence
    pub fn configure(&self, conf: &PdoConfiguration) -> Result<(), PdoConfigError> {
        self.params.configure(&self.sdo, conf)
    }

    /// Pack `values` into a frame and send it on the PDO's COB-ID
    ///
    /// Value types and order must match the configured mapping; this is not checked at
    /// runtime.
    pub fn write<V: PdoValues>(&self, values: V) -> Result<(), CanSendError> {
        let mut buf = [0u8; 8];
        values.pack(&mut buf[..V::WIDTH]);
        let msg = CanMessage::new(CanId::Std(self.params.cob_id), &buf[..V::WIDTH]);
        self.sender.lock().unwrap().send(msg)
    }
}

type BoxedHandler = Box<dyn Fn(&[u8]) -> bool + Send>;

/// A node-to-host PDO: configured over SDO, dispatching received frames to a typed handler
pub struct TransmitPdo<S> {
    params: PdoParams,
    sdo: Arc<SdoClient<S>>,
    handler: Mutex<Option<BoxedHandler>>,
}

impl<S> core::fmt::Debug for TransmitPdo<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransmitPdo").field("params", &self.params).finish_non_exhaustive()
    }
}

impl<S: CanSender> TransmitPdo<S> {
    /// Create the `pdo_number`th (1-based) Transmit PDO of a node
    pub fn new(node_id: u8, cob_base: u16, pdo_number: u16, sdo: Arc<SdoClient<S>>) -> Self {
        Self {
            params: PdoParams::new(PdoKind::Transmit, node_id, cob_base, pdo_number),
            sdo,
            handler: Mutex::new(None),
        }
    }

    /// The COB-ID this PDO's frames arrive on; the demultiplexer routes matching frames to
    /// [`accept`](TransmitPdo::accept)
    pub fn cob_id(&self) -> u16 {
        self.params.cob_id
    }

    /// Apply `conf` through the ordered SDO write sequence
    pub fn configure(&self, conf: &PdoConfiguration) -> Result<(), PdoConfigError> {
        self.params.configure(&self.sdo, conf)
    }

    /// Install `handler` for frames carrying values of type `V`
    ///
    /// Replaces any previously registered handler; the swap is atomic with respect to the
    /// receive path.
    pub fn register_handler<V: PdoValues + 'static>(
        &self,
        handler: impl Fn(V) + Send + 'static,
    ) {
        let unpacking = move |data: &[u8]| match V::unpack(data) {
            Some(values) => {
                handler(values);
                true
            }
            None => false,
        };
        *self.handler.lock().unwrap() = Some(Box::new(unpacking));
    }

    /// Remove the registered handler, if any
    pub fn unregister_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    /// Deliver a frame payload from the bus receive path
    ///
    /// Returns false, invoking nothing, when no handler is registered or when the payload is
    /// shorter than the registered layout.
    pub fn accept(&self, data: &[u8]) -> bool {
        match self.handler.lock().unwrap().as_ref() {
            Some(handler) => handler(data),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_raw_layout() {
        let mapping = PdoMapping { index: 0x1111, subindex: 0x45, bit_len: 16 };
        assert_eq!(mapping.to_raw(), 0x1111_4510);
    }

    #[test]
    fn tuple_pack_is_contiguous_little_endian() {
        let mut buf = [0u8; 8];
        let values = (0x1234i16, 0x98765432u32 as i32);
        values.pack(&mut buf[..6]);
        assert_eq!(&buf[..6], &[0x34, 0x12, 0x32, 0x54, 0x76, 0x98]);
    }

    #[test]
    fn tuple_unpack_mirrors_pack() {
        let raw = [0x12u8, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let (a, b, c) = <(u8, i16, u32)>::unpack(&raw).unwrap();
        assert_eq!(a, 0x12);
        assert_eq!(b, 0x1234);
        assert_eq!(c, 0x12345678);
    }

    #[test]
    fn unpack_rejects_short_payload() {
        assert_eq!(<(u8, i16, u32)>::unpack(&[0u8; 6]), None);
    }

    #[test]
    #[should_panic(expected = "64 payload bits")]
    fn oversized_mapping_panics() {
        let mut conf = PdoConfiguration::new();
        conf.add_mapping::<u32>(0x2000, 0)
            .add_mapping::<u32>(0x2001, 0)
            .add_mapping::<u8>(0x2002, 0);
    }
}

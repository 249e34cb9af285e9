//! Constants defining standard object indices and COB-ID register layout

/// Object indices for the standard PDO parameter objects
///
/// Each base covers 512 consecutive PDOs; the parameters of PDO `n` (1-based)
/// live at `base + n - 1`.
pub mod object_ids {
    /// Receive PDO communication parameter base index
    pub const RPDO_COMM_BASE: u16 = 0x1400;
    /// Receive PDO mapping parameter base index
    pub const RPDO_MAPPING_BASE: u16 = 0x1600;
    /// Transmit PDO communication parameter base index
    pub const TPDO_COMM_BASE: u16 = 0x1800;
    /// Transmit PDO mapping parameter base index
    pub const TPDO_MAPPING_BASE: u16 = 0x1A00;
}

/// Sub-indices of a PDO communication parameter record
pub mod comm_params {
    /// COB-ID used by the PDO
    pub const COB_ID: u8 = 0x01;
    /// Transmission type
    pub const TRANSMISSION_TYPE: u8 = 0x02;
    /// Inhibit time (multiples of 100 us)
    pub const INHIBIT_TIME: u8 = 0x03;
    /// Event timer (ms)
    pub const EVENT_TIMER: u8 = 0x05;
    /// SYNC start value (Transmit PDOs only)
    pub const SYNC_START: u8 = 0x06;
}

/// Flag bits of the 32-bit PDO COB-ID register
pub mod cob_id_flags {
    /// When set, the PDO exists but is not used
    pub const INVALID: u32 = 1 << 31;
    /// When set, RTR requests on this PDO are not allowed
    pub const NO_RTR: u32 = 1 << 30;
    /// When set, the register holds a 29-bit extended identifier
    pub const EXTENDED: u32 = 1 << 29;
}

/// Default function-code bases for the four predefined Transmit PDOs
pub const TPDO_COB_BASES: [u16; 4] = [0x180, 0x280, 0x380, 0x480];
/// Default function-code bases for the four predefined Receive PDOs
pub const RPDO_COB_BASES: [u16; 4] = [0x200, 0x300, 0x400, 0x500];

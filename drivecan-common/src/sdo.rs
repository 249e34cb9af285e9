//! SDO wire grammar: command specifiers, request/response frames, abort codes

use crate::messages::{CanId, CanMessage, MessageError};

/// Specifies the possible server command specifier (SCS) values in SDO response frames
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ServerCommand {
    /// Segment data in an ongoing upload
    SegmentUpload = 0,
    /// Acknowledge a download segment
    SegmentDownload = 1,
    /// Respond to an initiate upload command
    Upload = 2,
    /// Acknowledge a download command
    Download = 3,
    /// Abort the transfer
    Abort = 4,
}

impl TryFrom<u8> for ServerCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ServerCommand::*;
        match value {
            0 => Ok(SegmentUpload),
            1 => Ok(SegmentDownload),
            2 => Ok(Upload),
            3 => Ok(Download),
            4 => Ok(Abort),
            _ => Err(()),
        }
    }
}

/// Specifies the possible client command specifier (CCS) values in SDO request frames
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClientCommand {
    /// Segment data in an ongoing download
    DownloadSegment = 0,
    /// Begin a download, expedited or segmented
    InitiateDownload = 1,
    /// Begin an upload
    InitiateUpload = 2,
    /// Request the next upload segment
    ReqUploadSegment = 3,
    /// Abort the transfer
    Abort = 4,
}

impl TryFrom<u8> for ClientCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ClientCommand::*;
        match value {
            0 => Ok(DownloadSegment),
            1 => Ok(InitiateDownload),
            2 => Ok(InitiateUpload),
            3 => Ok(ReqUploadSegment),
            4 => Ok(Abort),
            _ => Err(()),
        }
    }
}

/// The CiA 301 v4.2.0 SDO abort codes
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum AbortCode {
    ToggleNotAlternated = 0x0503_0000,
    SdoTimeout = 0x0504_0000,
    InvalidCommandSpecifier = 0x0504_0001,
    InvalidBlockSize = 0x0504_0002,
    InvalidSequenceNumber = 0x0504_0003,
    CrcError = 0x0504_0004,
    OutOfMemory = 0x0504_0005,
    UnsupportedAccess = 0x0601_0000,
    WriteOnly = 0x0601_0001,
    ReadOnly = 0x0601_0002,
    NoSuchObject = 0x0602_0000,
    UnmappablePdo = 0x0604_0041,
    PdoTooLong = 0x0604_0042,
    IncompatibleParameter = 0x0604_0043,
    InternalIncompatibility = 0x0604_0047,
    HardwareError = 0x0606_0000,
    DataTypeMismatch = 0x0607_0010,
    DataTypeMismatchLengthHigh = 0x0607_0012,
    DataTypeMismatchLengthLow = 0x0607_0013,
    NoSuchSubIndex = 0x0609_0011,
    InvalidValue = 0x0609_0030,
    ValueTooHigh = 0x0609_0031,
    ValueTooLow = 0x0609_0032,
    MaxLessThanMin = 0x0609_0036,
    ResourceNotAvailable = 0x060A_0023,
    GeneralError = 0x0800_0000,
    CantStore = 0x0800_0020,
    CantStoreLocalControl = 0x0800_0021,
    CantStoreDeviceState = 0x0800_0022,
    NoObjectDict = 0x0800_0023,
    NoData = 0x0800_0024,
}

impl AbortCode {
    /// Look up the code matching a raw 32-bit value from the wire
    pub fn from_raw(value: u32) -> Option<Self> {
        use AbortCode::*;
        match value {
            x if x == ToggleNotAlternated as u32 => Some(ToggleNotAlternated),
            x if x == SdoTimeout as u32 => Some(SdoTimeout),
            x if x == InvalidCommandSpecifier as u32 => Some(InvalidCommandSpecifier),
            x if x == InvalidBlockSize as u32 => Some(InvalidBlockSize),
            x if x == InvalidSequenceNumber as u32 => Some(InvalidSequenceNumber),
            x if x == CrcError as u32 => Some(CrcError),
            x if x == OutOfMemory as u32 => Some(OutOfMemory),
            x if x == UnsupportedAccess as u32 => Some(UnsupportedAccess),
            x if x == WriteOnly as u32 => Some(WriteOnly),
            x if x == ReadOnly as u32 => Some(ReadOnly),
            x if x == NoSuchObject as u32 => Some(NoSuchObject),
            x if x == UnmappablePdo as u32 => Some(UnmappablePdo),
            x if x == PdoTooLong as u32 => Some(PdoTooLong),
            x if x == IncompatibleParameter as u32 => Some(IncompatibleParameter),
            x if x == InternalIncompatibility as u32 => Some(InternalIncompatibility),
            x if x == HardwareError as u32 => Some(HardwareError),
            x if x == DataTypeMismatch as u32 => Some(DataTypeMismatch),
            x if x == DataTypeMismatchLengthHigh as u32 => Some(DataTypeMismatchLengthHigh),
            x if x == DataTypeMismatchLengthLow as u32 => Some(DataTypeMismatchLengthLow),
            x if x == NoSuchSubIndex as u32 => Some(NoSuchSubIndex),
            x if x == InvalidValue as u32 => Some(InvalidValue),
            x if x == ValueTooHigh as u32 => Some(ValueTooHigh),
            x if x == ValueTooLow as u32 => Some(ValueTooLow),
            x if x == MaxLessThanMin as u32 => Some(MaxLessThanMin),
            x if x == ResourceNotAvailable as u32 => Some(ResourceNotAvailable),
            x if x == GeneralError as u32 => Some(GeneralError),
            x if x == CantStore as u32 => Some(CantStore),
            x if x == CantStoreLocalControl as u32 => Some(CantStoreLocalControl),
            x if x == CantStoreDeviceState as u32 => Some(CantStoreDeviceState),
            x if x == NoObjectDict as u32 => Some(NoObjectDict),
            x if x == NoData as u32 => Some(NoData),
            _ => None,
        }
    }

    /// The standard description text for this code
    pub fn description(&self) -> &'static str {
        use AbortCode::*;
        match self {
            ToggleNotAlternated => "Toggle bit not alternated",
            SdoTimeout => "SDO protocol timed out",
            InvalidCommandSpecifier => "Client/server command specifier not valid or unknown",
            InvalidBlockSize => "Invalid block size (block mode only)",
            InvalidSequenceNumber => "Invalid sequence number (block mode only)",
            CrcError => "CRC error (block mode only)",
            OutOfMemory => "Out of memory",
            UnsupportedAccess => "Unsupported access to an object",
            WriteOnly => "Attempt to read a write only object",
            ReadOnly => "Attempt to write a read only object",
            NoSuchObject => "Object does not exist in the object dictionary",
            UnmappablePdo => "Object cannot be mapped to the PDO",
            PdoTooLong => {
                "The number and length of the objects to be mapped would exceed PDO length"
            }
            IncompatibleParameter => "General parameter incompatibility reason",
            InternalIncompatibility => "General internal incompatibility in the device",
            HardwareError => "Access failed due to an hardware error",
            DataTypeMismatch => {
                "Data type does not match, length of service parameter does not match"
            }
            DataTypeMismatchLengthHigh => {
                "Data type does not match, length of service parameter too high"
            }
            DataTypeMismatchLengthLow => {
                "Data type does not match, length of service parameter too low"
            }
            NoSuchSubIndex => "Sub-index does not exist",
            InvalidValue => "Invalid value for parameter (download only)",
            ValueTooHigh => "Value of parameter written too high (download only)",
            ValueTooLow => "Value of parameter written too low (download only)",
            MaxLessThanMin => "Maximum value is less than minimum value",
            ResourceNotAvailable => "Resource not available: SDO connection",
            GeneralError => "General error",
            CantStore => "Data cannot be transferred or stored to the application",
            CantStoreLocalControl => {
                "Data cannot be transferred or stored to the application because of local control"
            }
            CantStoreDeviceState => {
                "Data cannot be transferred or stored to the application because of the present \
                 device state"
            }
            NoObjectDict => {
                "Object dictionary dynamic generation fails or no object dictionary is present"
            }
            NoData => "No data available",
        }
    }
}

impl core::fmt::Display for AbortCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.description())
    }
}

/// Total lookup from a raw abort code to its description text
///
/// Unlisted codes render as "unknown".
pub fn abort_description(code: u32) -> &'static str {
    AbortCode::from_raw(code).map_or("unknown", |c| c.description())
}

/// An SDO frame sent by the client
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SdoRequest {
    /// Begin a download; carries the value (expedited) or the total size
    InitiateDownload {
        /// Number of unused bytes in data (expedited with size indicated)
        n: u8,
        /// Expedited flag
        e: bool,
        /// Size-indicated flag
        s: bool,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Value when `e`, total byte count when `!e && s`
        data: [u8; 4],
    },
    /// One segment of a segmented download
    DownloadSegment {
        /// Toggle flag
        t: bool,
        /// Number of unused bytes in data
        n: u8,
        /// When set, this is the final segment
        c: bool,
        /// Segment data
        data: [u8; 7],
    },
    /// Begin an upload of an object
    InitiateUpload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
    /// Request the next segment of a segmented upload
    ReqUploadSegment {
        /// Toggle flag
        t: bool,
    },
    /// Abort the transfer in progress
    Abort {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Raw abort code
        abort_code: u32,
    },
}

impl SdoRequest {
    /// Create an abort message
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> Self {
        SdoRequest::Abort { index, sub, abort_code: abort_code as u32 }
    }

    /// Create an initiate message for a segmented download of `size` bytes
    pub fn initiate_download(index: u16, sub: u8, size: u32) -> Self {
        SdoRequest::InitiateDownload {
            n: 0,
            e: false,
            s: true,
            index,
            sub,
            data: size.to_le_bytes(),
        }
    }

    /// Create a download segment carrying up to 7 bytes
    pub fn download_segment(toggle: bool, last_segment: bool, segment_data: &[u8]) -> Self {
        let mut data = [0; 7];
        data[0..segment_data.len()].copy_from_slice(segment_data);
        SdoRequest::DownloadSegment {
            t: toggle,
            n: 7 - segment_data.len() as u8,
            c: last_segment,
            data,
        }
    }

    /// Create an expedited download message carrying up to 4 bytes
    pub fn expedited_download(index: u16, sub: u8, data: &[u8]) -> Self {
        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);

        SdoRequest::InitiateDownload {
            n: (4 - data.len()) as u8,
            e: true,
            s: true,
            index,
            sub,
            data: msg_data,
        }
    }

    /// Create an initiate upload message
    pub fn initiate_upload(index: u16, sub: u8) -> Self {
        SdoRequest::InitiateUpload { index, sub }
    }

    /// Create an upload segment request
    pub fn upload_segment_request(toggle: bool) -> Self {
        SdoRequest::ReqUploadSegment { t: toggle }
    }

    /// Encode onto the wire; SDO frames always carry 8 bytes
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let mut payload = [0; 8];

        match self {
            SdoRequest::InitiateDownload { n, e, s, index, sub, data } => {
                payload[0] = (ClientCommand::InitiateDownload as u8) << 5
                    | (n & 0x3) << 2
                    | (e as u8) << 1
                    | s as u8;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoRequest::DownloadSegment { t, n, c, data } => {
                payload[0] = (ClientCommand::DownloadSegment as u8) << 5
                    | (t as u8) << 4
                    | (n & 7) << 1
                    | c as u8;
                payload[1..8].copy_from_slice(&data);
            }
            SdoRequest::InitiateUpload { index, sub } => {
                payload[0] = (ClientCommand::InitiateUpload as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
            SdoRequest::ReqUploadSegment { t } => {
                payload[0] = (ClientCommand::ReqUploadSegment as u8) << 5 | (t as u8) << 4;
            }
            SdoRequest::Abort { index, sub, abort_code } => {
                payload[0] = (ClientCommand::Abort as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }

        CanMessage { data: payload, dlc: 8, id }
    }
}

/// An SDO frame sent by the server
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SdoResponse {
    /// Response to an initiate upload command
    ConfirmUpload {
        /// Number of unused bytes in data (expedited with size indicated)
        n: u8,
        /// Expedited flag
        e: bool,
        /// Size-indicated flag
        s: bool,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Value when `e`, total byte count when `!e && s`
        data: [u8; 4],
    },
    /// One segment of a segmented upload
    UploadSegment {
        /// Toggle flag
        t: bool,
        /// Number of unused bytes in data
        n: u8,
        /// When set, this is the final segment
        c: bool,
        /// Segment data
        data: [u8; 7],
    },
    /// Acknowledge an initiate download
    ConfirmDownload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
    /// Acknowledge a download segment
    ConfirmDownloadSegment {
        /// Echoed toggle flag
        t: bool,
    },
    /// Abort the transfer in progress
    Abort {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Raw abort code
        abort_code: u32,
    },
}

impl TryFrom<CanMessage> for SdoResponse {
    type Error = MessageError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        if msg.data().len() < 8 {
            return Err(MessageError::MessageTooShort);
        }
        let scs = msg.data[0] >> 5;
        let command: ServerCommand =
            scs.try_into().map_err(|_| MessageError::MalformedMsg { cob_id: msg.id() })?;
        match command {
            ServerCommand::SegmentUpload => {
                let t = (msg.data[0] & (1 << 4)) != 0;
                let n = (msg.data[0] >> 1) & 7;
                let c = (msg.data[0] & (1 << 0)) != 0;
                let data: [u8; 7] = msg.data[1..8].try_into().unwrap();
                Ok(SdoResponse::UploadSegment { t, n, c, data })
            }
            ServerCommand::SegmentDownload => {
                let t = (msg.data[0] & (1 << 4)) != 0;
                Ok(SdoResponse::ConfirmDownloadSegment { t })
            }
            ServerCommand::Upload => {
                let n = (msg.data[0] >> 2) & 0x3;
                let e = (msg.data[0] & (1 << 1)) != 0;
                let s = (msg.data[0] & (1 << 0)) != 0;
                let index = u16::from_le_bytes(msg.data[1..3].try_into().unwrap());
                let sub = msg.data[3];
                let data: [u8; 4] = msg.data[4..8].try_into().unwrap();
                Ok(SdoResponse::ConfirmUpload { n, e, s, index, sub, data })
            }
            ServerCommand::Download => {
                let index = u16::from_le_bytes(msg.data[1..3].try_into().unwrap());
                let sub = msg.data[3];
                Ok(SdoResponse::ConfirmDownload { index, sub })
            }
            ServerCommand::Abort => {
                let index = u16::from_le_bytes(msg.data[1..3].try_into().unwrap());
                let sub = msg.data[3];
                let abort_code = u32::from_le_bytes(msg.data[4..8].try_into().unwrap());
                Ok(SdoResponse::Abort { index, sub, abort_code })
            }
        }
    }
}

impl SdoResponse {
    /// Create an expedited upload response carrying up to 4 bytes
    pub fn expedited_upload(index: u16, sub: u8, data: &[u8]) -> SdoResponse {
        if data.len() > 4 {
            panic!("Cannot create expedited upload with more than 4 bytes");
        }

        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);

        SdoResponse::ConfirmUpload {
            index,
            sub,
            e: true,
            s: true,
            n: 4 - data.len() as u8,
            data: msg_data,
        }
    }

    /// Create an initiate upload response declaring a segmented transfer of `size` bytes
    pub fn upload_acknowledge(index: u16, sub: u8, size: u32) -> SdoResponse {
        SdoResponse::ConfirmUpload {
            n: 0,
            e: false,
            s: true,
            index,
            sub,
            data: size.to_le_bytes(),
        }
    }

    /// Create an upload segment carrying up to 7 bytes
    pub fn upload_segment(t: bool, c: bool, data: &[u8]) -> SdoResponse {
        let n = (7 - data.len()) as u8;
        let mut buf = [0; 7];
        buf[0..data.len()].copy_from_slice(data);
        SdoResponse::UploadSegment { t, n, c, data: buf }
    }

    /// Create a download acknowledge
    pub fn download_acknowledge(index: u16, sub: u8) -> SdoResponse {
        SdoResponse::ConfirmDownload { index, sub }
    }

    /// Create a download segment acknowledge
    pub fn download_segment_acknowledge(t: bool) -> SdoResponse {
        SdoResponse::ConfirmDownloadSegment { t }
    }

    /// Create an abort response
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> SdoResponse {
        let abort_code = abort_code as u32;
        SdoResponse::Abort { index, sub, abort_code }
    }

    /// Encode onto the wire; SDO frames always carry 8 bytes
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let mut payload = [0; 8];

        match self {
            SdoResponse::ConfirmUpload { n, e, s, index, sub, data } => {
                payload[0] = (ServerCommand::Upload as u8) << 5
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | (s as u8);
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownload { index, sub } => {
                payload[0] = (ServerCommand::Download as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
            SdoResponse::UploadSegment { t, n, c, data } => {
                payload[0] = (ServerCommand::SegmentUpload as u8) << 5
                    | (t as u8) << 4
                    | (n & 7) << 1
                    | c as u8;
                payload[1..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownloadSegment { t } => {
                payload[0] = (ServerCommand::SegmentDownload as u8) << 5 | (t as u8) << 4;
            }
            SdoResponse::Abort { index, sub, abort_code } => {
                payload[0] = (ServerCommand::Abort as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }
        CanMessage { data: payload, dlc: 8, id }
    }
}

//! Blocking SDO transaction client

use std::sync::Mutex;
use std::time::Duration;

use drivecan_common::{
    messages::{msg_to_str, CanMessage, SDO_REQ_BASE, SDO_RESP_BASE},
    sdo::{abort_description, SdoRequest, SdoResponse},
    traits::{CanSendError, CanSender},
    CanId, ObjectValue,
};
use snafu::{ResultExt, Snafu};

use crate::rendezvous::Rendezvous;

/// Errors raised by SDO transfers
#[derive(Debug, PartialEq, Snafu)]
pub enum SdoClientError {
    /// The request frame could not be handed to the transport
    #[snafu(display("failed to send SDO request"))]
    SendFailed {
        /// The undelivered frame
        source: CanSendError,
    },
    /// No response arrived before the client's timeout
    #[snafu(display("timed out waiting for SDO response"))]
    Timeout,
    /// The response frame could not be parsed as an SDO response
    #[snafu(display("malformed SDO response"))]
    MalformedResponse,
    /// The response does not fit the transfer phase in progress
    #[snafu(display("unexpected SDO response for the transfer in progress"))]
    UnexpectedResponse,
    /// The server aborted the transfer
    #[snafu(display("SDO transfer abort: {}", abort_description(*code)))]
    ServerAbort {
        /// Raw 32-bit abort code
        code: u32,
    },
    /// A segment arrived with the wrong toggle bit
    #[snafu(display("toggle bit not alternated in segmented transfer"))]
    ToggleMismatch,
    /// The size reported by the server disagrees with the caller's declared size
    #[snafu(display("SDO response size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch {
        /// Byte count declared by the caller
        expected: usize,
        /// Byte count reported or delivered by the server
        actual: usize,
    },
    /// The destination is too small for the announced segmented transfer
    #[snafu(display(
        "insufficient room for segmented SDO transfer: capacity {capacity}, announced {announced}"
    ))]
    BufferTooSmall {
        /// Caller-provided capacity
        capacity: usize,
        /// Length announced by the server
        announced: usize,
    },
}

type Result<T> = std::result::Result<T, SdoClientError>;

/// A blocking request/response client for one node's SDO server
///
/// The client owns the rendezvous slot its responses arrive through, so it supports exactly one
/// in-flight transaction; overlapping calls from multiple threads must be serialized above this
/// layer. All methods take `&self`, allowing the client to be shared (behind an `Arc`) between
/// the control thread and the receive path that feeds [`notify`](SdoClient::notify).
pub struct SdoClient<S> {
    node_id: u8,
    cob_req: u16,
    cob_resp: u16,
    timeout: Duration,
    sender: Mutex<S>,
    response: Rendezvous<[u8; 8]>,
}

impl<S> core::fmt::Debug for SdoClient<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SdoClient")
            .field("node_id", &self.node_id)
            .field("cob_req", &self.cob_req)
            .field("cob_resp", &self.cob_resp)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<S: CanSender> SdoClient<S> {
    /// Create a client for `node_id` using the standard COB-ID bases
    ///
    /// `timeout` bounds each request/response phase; a segmented transfer gets a fresh timeout
    /// per segment, so its total duration is bounded only by the segment count.
    pub fn new(node_id: u8, sender: S, timeout: Duration) -> Self {
        Self {
            node_id,
            cob_req: SDO_REQ_BASE + node_id as u16,
            cob_resp: SDO_RESP_BASE + node_id as u16,
            timeout,
            sender: Mutex::new(sender),
            response: Rendezvous::new(),
        }
    }

    /// The node this client addresses
    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// COB-ID the client sends requests on (host to node)
    pub fn request_cob_id(&self) -> u16 {
        self.cob_req
    }

    /// COB-ID the node answers on; the demultiplexer routes frames with this ID to
    /// [`notify`](SdoClient::notify)
    pub fn response_cob_id(&self) -> u16 {
        self.cob_resp
    }

    /// Deliver a response frame payload from the bus receive path
    ///
    /// Returns false when no transfer is waiting for it; the frame is dropped.
    pub fn notify(&self, data: &[u8]) -> bool {
        let mut buf = [0u8; 8];
        let n = data.len().min(8);
        buf[..n].copy_from_slice(&data[..n]);
        self.response.notify(buf)
    }

    /// Read an object into `dest`; `dest.len()` is the caller-declared size
    ///
    /// Expedited responses that indicate a different size fail with
    /// [`SizeMismatch`](SdoClientError::SizeMismatch) and leave `dest` untouched. Segmented
    /// transfers accumulate out-of-band and are copied into `dest` only once complete, so a
    /// failed transfer never exposes partial data.
    pub fn upload(&self, name: &str, dest: &mut [u8], index: u16, sub: u8) -> Result<()> {
        match self.transfer(name, SdoRequest::initiate_upload(index, sub))? {
            SdoResponse::ConfirmUpload { n, e, s, data, .. } => {
                if e {
                    if s {
                        let actual = 4 - n as usize;
                        if actual != dest.len() {
                            log::error!(
                                "SDO response size mismatch ({name}): expected {}, got {actual}",
                                dest.len()
                            );
                            return SizeMismatchSnafu { expected: dest.len(), actual }.fail();
                        }
                    } else if dest.len() > 4 {
                        return SizeMismatchSnafu { expected: dest.len(), actual: 4usize }.fail();
                    }
                    dest.copy_from_slice(&data[..dest.len()]);
                    Ok(())
                } else {
                    let announced = u32::from_le_bytes(data) as usize;
                    if announced > dest.len() {
                        log::error!(
                            "insufficient room for segmented SDO transfer ({name}): expected \
                             {announced}, got {}",
                            dest.len()
                        );
                        return BufferTooSmallSnafu { capacity: dest.len(), announced }.fail();
                    }
                    let buf = self.upload_segments(name, dest.len())?;
                    dest[..buf.len()].copy_from_slice(&buf);
                    Ok(())
                }
            }
            _ => UnexpectedResponseSnafu.fail(),
        }
    }

    /// Read a string object, sized by the transfer itself
    ///
    /// Trailing NUL padding is trimmed.
    pub fn upload_string(&self, name: &str, index: u16, sub: u8) -> Result<String> {
        let bytes = match self.transfer(name, SdoRequest::initiate_upload(index, sub))? {
            SdoResponse::ConfirmUpload { n, e, s, data, .. } => {
                if e {
                    let count = if s { 4 - n as usize } else { 4 };
                    data[..count].to_vec()
                } else {
                    let announced = u32::from_le_bytes(data) as usize;
                    self.upload_segments(name, announced)?
                }
            }
            _ => return UnexpectedResponseSnafu.fail(),
        };
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Write `data` to an object: expedited for up to 4 bytes, segmented beyond that
    pub fn download(&self, name: &str, data: &[u8], index: u16, sub: u8) -> Result<()> {
        if data.len() <= 4 {
            match self.transfer(name, SdoRequest::expedited_download(index, sub, data))? {
                SdoResponse::ConfirmDownload { .. } => Ok(()),
                _ => UnexpectedResponseSnafu.fail(),
            }
        } else {
            let initiate = SdoRequest::initiate_download(index, sub, data.len() as u32);
            match self.transfer(name, initiate)? {
                SdoResponse::ConfirmDownload { .. } => (),
                _ => return UnexpectedResponseSnafu.fail(),
            }

            log::info!("SDO segmented download begin ({name}): node {}", self.node_id);

            let mut toggle = false;
            let total_segments = data.len().div_ceil(7);
            for i in 0..total_segments {
                let last = i == total_segments - 1;
                let chunk = &data[i * 7..(i * 7 + 7).min(data.len())];
                match self.transfer(name, SdoRequest::download_segment(toggle, last, chunk))? {
                    SdoResponse::ConfirmDownloadSegment { t } => {
                        if t != toggle {
                            log::error!("SDO segmented download ({name}): toggle bit mismatch");
                            return ToggleMismatchSnafu.fail();
                        }
                    }
                    _ => return UnexpectedResponseSnafu.fail(),
                }
                toggle = !toggle;
            }

            log::info!("SDO segmented download finish ({name}): node {}", self.node_id);
            Ok(())
        }
    }

    /// Read a typed object value
    pub fn read_value<T: ObjectValue>(&self, name: &str, index: u16, sub: u8) -> Result<T> {
        let mut buf = [0u8; 8];
        self.upload(name, &mut buf[..T::SIZE], index, sub)?;
        Ok(T::decode(&buf))
    }

    /// Write a typed object value
    pub fn write_value<T: ObjectValue>(
        &self,
        name: &str,
        value: T,
        index: u16,
        sub: u8,
    ) -> Result<()> {
        let mut buf = [0u8; 8];
        value.encode(&mut buf);
        self.download(name, &buf[..T::SIZE], index, sub)
    }

    /// Run the upload segment loop, accumulating at most `limit` bytes
    fn upload_segments(&self, name: &str, limit: usize) -> Result<Vec<u8>> {
        log::info!("SDO segmented upload begin ({name}): node {}", self.node_id);

        let mut buf = Vec::with_capacity(limit);
        let mut toggle = false;
        loop {
            match self.transfer(name, SdoRequest::upload_segment_request(toggle))? {
                SdoResponse::UploadSegment { t, n, c, data } => {
                    if t != toggle {
                        log::error!("SDO segmented upload ({name}): toggle bit mismatch");
                        return ToggleMismatchSnafu.fail();
                    }
                    buf.extend_from_slice(&data[..7 - n as usize]);
                    if buf.len() > limit {
                        return SizeMismatchSnafu { expected: limit, actual: buf.len() }.fail();
                    }
                    if c {
                        break;
                    }
                }
                _ => return UnexpectedResponseSnafu.fail(),
            }
            toggle = !toggle;
        }

        log::info!("SDO segmented upload finish ({name}): node {}", self.node_id);
        Ok(buf)
    }

    /// The one primitive every transfer phase funnels through: send a request, await the
    /// response on the rendezvous, surface server aborts
    fn transfer(&self, name: &str, request: SdoRequest) -> Result<SdoResponse> {
        let msg = request.to_can_message(CanId::Std(self.cob_req));

        {
            let mut sender = self.sender.lock().unwrap();
            if let Err(e) = sender.send(msg) {
                log::error!(
                    "SDO client request ({name}) not sent. {}",
                    msg_to_str(self.node_id, self.cob_req, msg.data())
                );
                return Err(e).context(SendFailedSnafu);
            }
        }
        log::debug!(
            "SDO client request ({name}). {}",
            msg_to_str(self.node_id, self.cob_req, msg.data())
        );

        let raw = match self.response.wait(self.timeout) {
            Some(raw) => raw,
            None => {
                log::error!("SDO client response ({name}) timed out: node {}", self.node_id);
                return TimeoutSnafu.fail();
            }
        };
        log::debug!(
            "SDO client response ({name}). {}",
            msg_to_str(self.node_id, self.cob_resp, &raw)
        );

        let resp: SdoResponse = CanMessage::new(CanId::Std(self.cob_resp), &raw)
            .try_into()
            .map_err(|_| MalformedResponseSnafu.build())?;

        if let SdoResponse::Abort { abort_code, .. } = resp {
            log::error!(
                "SDO transfer abort ({name}): {}. {}",
                abort_description(abort_code),
                msg_to_str(self.node_id, self.cob_resp, &raw)
            );
            return ServerAbortSnafu { code: abort_code }.fail();
        }

        Ok(resp)
    }
}

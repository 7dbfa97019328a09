use bytes::{BufMut, Bytes, BytesMut};
use openevse_core::constants::*;
use std::fmt;

use crate::error::{RapiError, Result};

/// Fixed bytes a frame adds after its body when sequencing is off: `^XX` CR.
const TAIL_LEN: usize = 4;

/// Bytes added by a sequence id marker: ` :XX`.
const SEQUENCE_LEN: usize = 4;

/// XOR-fold of every byte, as carried after `^` on the wire.
///
/// # Examples
///
/// ```
/// use openevse_rapi::frame::checksum;
///
/// assert_eq!(checksum(b"$GV"), b'$' ^ b'G' ^ b'V');
/// assert_eq!(checksum(b""), 0);
/// ```
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, &b| acc ^ b)
}

/// A RAPI frame ready to be written to the link.
///
/// Frames are built from a body such as `$SC 16 V` and an optional sequence
/// id. The encoded form is
///
/// ```text
/// $SC 16 V :2A^0C\r
/// ^^^^^^^^ ^^^ ^^^
/// body     seq checksum (XOR of everything before '^')
/// ```
///
/// The same encoding is used by controllers for their replies, so tests and
/// the simulator build responses with this type as well.
///
/// # Examples
///
/// ```
/// use openevse_rapi::Frame;
///
/// let frame = Frame::new("$GV");
/// let bytes = frame.encode().unwrap();
/// assert_eq!(&bytes[..], b"$GV^35\r");
///
/// let sequenced = Frame::new("$GV").with_sequence_id(0x01);
/// assert_eq!(&sequenced.encode().unwrap()[..], b"$GV :01^2E\r");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    body: String,
    sequence_id: Option<u8>,
}

impl Frame {
    /// Create a frame from its body. A missing leading `$` is added.
    pub fn new(body: impl Into<String>) -> Self {
        let mut body = body.into();
        if !body.starts_with(START_OF_COMMAND as char) {
            body.insert(0, START_OF_COMMAND as char);
        }
        Self {
            body,
            sequence_id: None,
        }
    }

    /// Attach a sequence id marker.
    pub fn with_sequence_id(mut self, id: u8) -> Self {
        self.sequence_id = Some(id);
        self
    }

    /// The body, `$` included.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn sequence_id(&self) -> Option<u8> {
        self.sequence_id
    }

    /// Number of bytes [`Frame::encode`] produces, terminator included.
    pub fn encoded_len(&self) -> usize {
        let seq = if self.sequence_id.is_some() {
            SEQUENCE_LEN
        } else {
            0
        };
        self.body.len() + seq + TAIL_LEN
    }

    /// Check that the encoded frame fits the controller's receive buffer,
    /// optionally reserving room for a sequence id assigned later.
    ///
    /// # Errors
    ///
    /// Returns `RapiError::CommandTooLong` if it does not fit.
    pub fn check_len(&self, reserve_sequence: bool) -> Result<()> {
        let mut length = self.encoded_len();
        if reserve_sequence && self.sequence_id.is_none() {
            length += SEQUENCE_LEN;
        }
        if length > RAPI_BUFLEN {
            return Err(RapiError::CommandTooLong {
                length,
                max: RAPI_BUFLEN,
            });
        }
        Ok(())
    }

    /// Encode the frame to wire bytes.
    ///
    /// # Errors
    ///
    /// Returns `RapiError::CommandTooLong` if the encoded frame would not fit
    /// in the controller's receive buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Append the encoded frame to `dst`.
    ///
    /// # Errors
    ///
    /// Same as [`Frame::encode`]; `dst` is untouched on error.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        self.check_len(false)?;

        let length = self.encoded_len();
        let start = dst.len();
        dst.reserve(length);
        dst.put_slice(self.body.as_bytes());
        if let Some(id) = self.sequence_id {
            dst.put_u8(TOKEN_SEPARATOR);
            dst.put_u8(START_OF_SEQUENCE);
            dst.put_slice(format!("{:02X}", id).as_bytes());
        }
        let chk = checksum(&dst[start..]);
        dst.put_u8(CHECKSUM_MARKER);
        dst.put_slice(format!("{:02X}", chk).as_bytes());
        dst.put_u8(END_OF_COMMAND);
        Ok(())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.sequence_id {
            Some(id) => write!(f, "{} :{:02X}", self.body, id),
            None => f.write_str(&self.body),
        }
    }
}

//! Decoding and classification of inbound RAPI frames.
//!
//! A frame cut by the [`StreamParser`](crate::StreamParser) goes through
//! three steps here:
//!
//! 1. checksum: if a `^` is present, the two hex digits after it must equal
//!    the XOR of every byte before it (the `$` included);
//! 2. tokenizing: the body is split on spaces into at most
//!    [`MAX_TOKENS`] tokens and a trailing `:XX` sequence marker is removed;
//! 3. classification into [`ResponseKind`].
//!
//! ```
//! use openevse_rapi::{RapiResponse, ResponseKind};
//!
//! let response = RapiResponse::decode(b"$OK 1.2.3 1.2.3 :05").unwrap();
//! assert_eq!(response.tokens(), ["$OK", "1.2.3", "1.2.3"]);
//! assert_eq!(response.sequence_id(), Some(0x05));
//! assert_eq!(response.kind(), ResponseKind::Ok);
//! ```

use openevse_core::constants::{CHECKSUM_MARKER, MAX_TOKENS, START_OF_SEQUENCE, TOKEN_SEPARATOR};
use std::fmt;

use crate::error::{RapiError, Result};
use crate::frame::checksum;

const TOKEN_OK: &str = "$OK";
const TOKEN_NK: &str = "$NK";
const TOKEN_WIFI: &str = "$WF";
const TOKEN_STATE: &str = "$ST";
const ASYNC_PREFIX: &str = "$A";

/// How a decoded frame is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `$OK`: the in-flight command succeeded.
    Ok,
    /// `$NK`: the in-flight command was refused.
    Rejected,
    /// Unsolicited frame (`$ST`, `$WF`, or any `$A…` token).
    Event,
    /// Anything else.
    Unknown,
}

/// A checksum-verified, tokenized inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RapiResponse {
    raw: String,
    tokens: Vec<String>,
    sequence_id: Option<u8>,
}

impl RapiResponse {
    /// Decode a frame (from `$` up to, not including, CR).
    ///
    /// A frame without a `^` checksum is accepted unchecked; older
    /// controllers do not send one.
    ///
    /// # Errors
    ///
    /// Returns `RapiError::BadChecksum` when the checksum does not match or
    /// is not two hex digits.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let body = match frame.iter().position(|&b| b == CHECKSUM_MARKER) {
            Some(pos) => {
                let expected = checksum(&frame[..pos]);
                let received = &frame[pos + 1..];
                if parse_hex_u8(received) != Some(expected) {
                    return Err(RapiError::BadChecksum {
                        expected,
                        received: String::from_utf8_lossy(received).into_owned(),
                    });
                }
                &frame[..pos]
            }
            None => frame,
        };

        let raw = String::from_utf8_lossy(body).into_owned();
        let mut pieces: Vec<&str> = raw
            .split(TOKEN_SEPARATOR as char)
            .filter(|t| !t.is_empty())
            .collect();

        let mut sequence_id = None;
        if let Some(last) = pieces.last()
            && let Some(hex) = last.strip_prefix(START_OF_SEQUENCE as char)
            && let Some(id) = parse_hex_u8(hex.as_bytes())
        {
            sequence_id = Some(id);
            pieces.pop();
        }

        let tokens = pieces
            .into_iter()
            .take(MAX_TOKENS)
            .map(str::to_string)
            .collect();

        Ok(Self {
            raw,
            tokens,
            sequence_id,
        })
    }

    /// Build a response directly from tokens.
    pub fn from_tokens<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        Self {
            raw: tokens.join(" "),
            tokens,
            sequence_id: None,
        }
    }

    /// Classify the frame.
    pub fn kind(&self) -> ResponseKind {
        match self.tokens.first().map(String::as_str) {
            Some(TOKEN_OK) => ResponseKind::Ok,
            Some(TOKEN_NK) => ResponseKind::Rejected,
            Some(TOKEN_WIFI | TOKEN_STATE) => ResponseKind::Event,
            _ if self.tokens.iter().any(|t| t.starts_with(ASYNC_PREFIX)) => ResponseKind::Event,
            _ => ResponseKind::Unknown,
        }
    }

    pub fn is_event(&self) -> bool {
        self.kind() == ResponseKind::Event
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// The frame body without checksum, as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn sequence_id(&self) -> Option<u8> {
        self.sequence_id
    }

    /// Parse token `index` as a decimal number.
    pub fn token_u32(&self, index: usize) -> Option<u32> {
        self.token(index)?.parse().ok()
    }

    /// Parse token `index` as a signed decimal number.
    pub fn token_i32(&self, index: usize) -> Option<i32> {
        self.token(index)?.parse().ok()
    }

    /// Parse token `index` as a hex number.
    pub fn token_hex(&self, index: usize) -> Option<u32> {
        u32::from_str_radix(self.token(index)?, 16).ok()
    }
}

impl fmt::Display for RapiResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_hex_u8(text: &[u8]) -> Option<u8> {
    if text.len() != 2 {
        return None;
    }
    let text = std::str::from_utf8(text).ok()?;
    u8::from_str_radix(text, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;
    use rstest::rstest;

    fn wire(body: &str) -> Vec<u8> {
        let mut bytes = Frame::new(body).encode().unwrap().to_vec();
        bytes.pop(); // CR
        bytes
    }

    #[test]
    fn test_decode_with_valid_checksum() {
        let response = RapiResponse::decode(&wire("$OK 1.2.3 1.2.3")).unwrap();
        assert_eq!(response.tokens(), ["$OK", "1.2.3", "1.2.3"]);
        assert_eq!(response.kind(), ResponseKind::Ok);
        assert_eq!(response.raw(), "$OK 1.2.3 1.2.3");
        assert_eq!(response.sequence_id(), None);
    }

    #[test]
    fn test_decode_without_checksum() {
        let response = RapiResponse::decode(b"$NK").unwrap();
        assert_eq!(response.kind(), ResponseKind::Rejected);
    }

    #[test]
    fn test_decode_bad_checksum() {
        let mut bytes = wire("$OK 6 32 0 32");
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
        let err = RapiResponse::decode(&bytes).unwrap_err();
        assert!(matches!(err, RapiError::BadChecksum { .. }));
    }

    #[rstest]
    #[case(b"$OK^".as_slice())]
    #[case(b"$OK^Z".as_slice())]
    #[case(b"$OK^123".as_slice())]
    fn test_decode_malformed_checksum(#[case] frame: &[u8]) {
        assert!(matches!(
            RapiResponse::decode(frame),
            Err(RapiError::BadChecksum { .. })
        ));
    }

    #[test]
    fn test_sequence_marker_is_stripped() {
        let frame = Frame::new("$OK 3").with_sequence_id(0xA7).encode().unwrap();
        let response = RapiResponse::decode(&frame[..frame.len() - 1]).unwrap();
        assert_eq!(response.tokens(), ["$OK", "3"]);
        assert_eq!(response.sequence_id(), Some(0xA7));
    }

    #[test]
    fn test_token_limit() {
        let response = RapiResponse::decode(b"$OK 1 2 3 4 5 6 7 8 9 10 11").unwrap();
        assert_eq!(response.token_count(), MAX_TOKENS);
        assert_eq!(response.token(9), Some("9"));
    }

    #[test]
    fn test_repeated_spaces_do_not_create_tokens() {
        let response = RapiResponse::decode(b"$OK  6   32").unwrap();
        assert_eq!(response.tokens(), ["$OK", "6", "32"]);
    }

    #[rstest]
    #[case("$OK", ResponseKind::Ok)]
    #[case("$OK 8.2.2 5.2.1", ResponseKind::Ok)]
    #[case("$NK", ResponseKind::Rejected)]
    #[case("$ST 3", ResponseKind::Event)]
    #[case("$WF 2", ResponseKind::Event)]
    #[case("$AT 3 3 32 0140", ResponseKind::Event)]
    #[case("$AB 00 8.2.2", ResponseKind::Event)]
    #[case("$XX 1 $AZ", ResponseKind::Event)]
    #[case("$GS", ResponseKind::Unknown)]
    #[case("", ResponseKind::Unknown)]
    fn test_classification(#[case] body: &str, #[case] kind: ResponseKind) {
        let response = RapiResponse::decode(body.as_bytes()).unwrap();
        assert_eq!(response.kind(), kind);
    }

    #[test]
    fn test_numeric_tokens() {
        let response = RapiResponse::from_tokens(["$OK", "fe", "1234", "0100"]);
        assert_eq!(response.token_hex(1), Some(0xFE));
        assert_eq!(response.token_u32(2), Some(1234));
        assert_eq!(response.token_hex(3), Some(0x100));
        assert_eq!(response.token_u32(1), None);
        assert_eq!(response.token_u32(9), None);
    }

    #[test]
    fn test_signed_tokens() {
        let response = RapiResponse::from_tokens(["$OK", "245", "-2560", "x"]);
        assert_eq!(response.token_i32(1), Some(245));
        assert_eq!(response.token_i32(2), Some(-2560));
        assert_eq!(response.token_i32(3), None);
    }
}

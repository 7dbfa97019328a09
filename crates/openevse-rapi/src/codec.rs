//! Tokio codec for RAPI framing.
//!
//! [`RapiCodec`] lets the protocol run over async transports (a TCP to serial
//! bridge, a pseudo terminal, `tokio::io::duplex` in tests) through
//! `tokio_util::codec::Framed`. It shares the framing rules of the polled
//! engine:
//!
//! - [`Decoder`] yields checksum-verified [`RapiResponse`]s. Frames with a bad
//!   checksum are dropped with a warning and decoding continues; a frame that
//!   overflows the receive buffer is returned as `RapiError::BufferOverflow`.
//! - [`Encoder<Frame>`] writes `$body[ :SEQ]^CHK\r`.
//!
//! Matching replies to commands is left to the caller; the codec is a pure
//! framing layer.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use openevse_rapi::{Frame, RapiCodec};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("192.168.4.1:23").await?;
//! let mut framed = Framed::new(stream, RapiCodec::new());
//!
//! framed.send(Frame::new("$GV")).await?;
//! if let Some(Ok(response)) = framed.next().await {
//!     println!("firmware {:?}", response.token(1));
//! }
//! # Ok(())
//! # }
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::RapiError;
use crate::frame::Frame;
use crate::response::RapiResponse;
use crate::stream_parser::{ParserEvent, StreamParser};

/// Tokio codec for RAPI frames.
#[derive(Debug, Default)]
pub struct RapiCodec {
    parser: StreamParser,
    discarded: u64,
}

impl RapiCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames dropped for a bad checksum so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Decoder for RapiCodec {
    type Item = RapiResponse;
    type Error = RapiError;

    /// Decode the next response from the byte stream.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(response))` - A complete, verified frame
    /// - `Ok(None)` - Need more data
    /// - `Err(RapiError::BufferOverflow)` - A frame outgrew the buffer
    ///
    /// # Example
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use openevse_rapi::RapiCodec;
    /// use tokio_util::codec::Decoder;
    ///
    /// let mut codec = RapiCodec::new();
    /// let mut buffer = BytesMut::from(&b"$OK 6 32 0 32^26\r"[..]);
    ///
    /// let response = codec.decode(&mut buffer).unwrap().unwrap();
    /// assert_eq!(response.token_u32(2), Some(32));
    /// ```
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            self.parser.feed(src);
            src.clear();
        }

        while let Some(event) = self.parser.next_event() {
            match event {
                ParserEvent::Frame(bytes) => match RapiResponse::decode(&bytes) {
                    Ok(response) => return Ok(Some(response)),
                    Err(err) => {
                        self.discarded += 1;
                        warn!("discarding frame: {}", err);
                    }
                },
                ParserEvent::Overflow => return Err(RapiError::BufferOverflow),
            }
        }
        Ok(None)
    }
}

impl Encoder<Frame> for RapiCodec {
    type Error = RapiError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}

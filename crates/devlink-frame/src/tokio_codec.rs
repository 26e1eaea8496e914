use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, FrameConfig, FramingScheme};
use crate::error::FrameError;
use crate::message::Message;
use crate::parser::{ParserState, StreamParser};

/// `tokio_util` codec for device frames.
///
/// Bytes are handed to a persistent [`StreamParser`] as they arrive, so a
/// frame split across any number of reads decodes the same as one delivered
/// whole.
#[derive(Debug)]
pub struct LinkCodec {
    scheme: FramingScheme,
    max_payload: usize,
    parser: StreamParser,
}

impl LinkCodec {
    pub fn new(scheme: FramingScheme) -> Self {
        Self::with_config(&FrameConfig {
            scheme,
            ..FrameConfig::default()
        })
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            scheme: config.scheme,
            max_payload: config.max_payload_size,
            parser: StreamParser::with_config(config),
        }
    }
}

impl Decoder for LinkCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();
            if let Some(message) = self.parser.push(byte)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if self.parser.state() != ParserState::Idle {
            self.parser.reset();
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended inside a frame",
            )
            .into());
        }
        Ok(None)
    }
}

impl Encoder<&[u8]> for LinkCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(self.scheme, item, dst, self.max_payload)
    }
}

impl Encoder<Message> for LinkCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(self.scheme, item.as_bytes(), dst, self.max_payload)
    }
}

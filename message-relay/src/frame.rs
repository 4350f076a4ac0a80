//! Multi-part framing on top of a byte stream.
//!
//! A frame is an ordered list of byte parts. On the wire every integer is a
//! big-endian `u32`:
//!
//! ```text
//! part_count | part_len part_bytes | part_len part_bytes | ...
//! ```
//!
//! [`MultipartCodec`] plugs into `tokio_util::codec::{FramedRead, FramedWrite}`
//! so both the router and dealer ends of the transport share one framing.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on the number of parts in one frame.
pub const MAX_PARTS: usize = 8;

/// Upper bound on the encoded size of one frame, headers included.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    parts: Vec<Bytes>,
}

impl Frame {
    pub fn new(parts: Vec<Bytes>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn encoded_len(&self) -> usize {
        LEN_PREFIX
            + self
                .parts
                .iter()
                .map(|part| LEN_PREFIX + part.len())
                .sum::<usize>()
    }
}

impl<P: Into<Bytes>> FromIterator<P> for Frame {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame has {count} parts, maximum is {max}", max = MAX_PARTS)]
    TooManyParts { count: usize },
    #[error("frame of {size} bytes exceeds maximum of {max} bytes", max = MAX_FRAME_BYTES)]
    FrameTooLarge { size: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartCodec;

impl MultipartCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for MultipartCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        // Walk the headers on a borrowed cursor first; nothing is consumed
        // until the whole frame is buffered.
        let mut cursor = &src[..];
        if cursor.remaining() < LEN_PREFIX {
            return Ok(None);
        }

        let count = cursor.get_u32() as usize;
        if count > MAX_PARTS {
            return Err(FrameError::TooManyParts { count });
        }

        let mut size = LEN_PREFIX;
        let mut lengths = Vec::with_capacity(count);
        for _ in 0..count {
            if cursor.remaining() < LEN_PREFIX {
                return Ok(None);
            }
            let len = cursor.get_u32() as usize;
            size += LEN_PREFIX + len;
            if size > MAX_FRAME_BYTES {
                return Err(FrameError::FrameTooLarge { size });
            }
            if cursor.remaining() < len {
                src.reserve(size - src.len());
                return Ok(None);
            }
            cursor.advance(len);
            lengths.push(len);
        }

        src.advance(LEN_PREFIX);
        let parts = lengths
            .into_iter()
            .map(|len| {
                src.advance(LEN_PREFIX);
                src.split_to(len).freeze()
            })
            .collect();

        Ok(Some(Frame::new(parts)))
    }
}

impl Encoder<Frame> for MultipartCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        if frame.len() > MAX_PARTS {
            return Err(FrameError::TooManyParts { count: frame.len() });
        }
        let size = frame.encoded_len();
        if size > MAX_FRAME_BYTES {
            return Err(FrameError::FrameTooLarge { size });
        }

        dst.reserve(size);
        dst.put_u32(frame.len() as u32);
        for part in frame.parts {
            dst.put_u32(part.len() as u32);
            dst.extend_from_slice(&part);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    fn encoded(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        MultipartCodec
            .encode(frame, &mut buf)
            .expect("encode frame");
        buf
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let full = encoded(Frame::from_iter(["SEND", "bob", "hello"]));

        for cut in 0..full.len() {
            let mut partial = BytesMut::from(&full[..cut]);
            let decoded = MultipartCodec.decode(&mut partial).expect("decode partial");
            assert!(decoded.is_none(), "cut at {cut} produced a frame");
            assert_eq!(partial.len(), cut, "partial decode consumed bytes");
        }
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut buf = encoded(Frame::from_iter(["LIST"]));
        buf.extend_from_slice(&encoded(Frame::from_iter(["MSG", ""])));

        let first = MultipartCodec.decode(&mut buf).expect("first").expect("frame");
        let second = MultipartCodec.decode(&mut buf).expect("second").expect("frame");

        assert_eq!(first, Frame::from_iter(["LIST"]));
        assert_eq!(second, Frame::from_iter(["MSG", ""]));
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_too_many_parts_on_decode() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_PARTS as u32 + 1);

        let result = MultipartCodec.decode(&mut buf);
        assert!(matches!(
            result,
            Err(FrameError::TooManyParts { count }) if count == MAX_PARTS + 1
        ));
    }

    #[test]
    fn rejects_oversized_part_before_buffering_it() {
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_u32(MAX_FRAME_BYTES as u32);

        let result = MultipartCodec.decode(&mut buf);
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn refuses_to_encode_oversized_frame() {
        let frame = Frame::from_iter([vec![0u8; MAX_FRAME_BYTES]]);
        let result = MultipartCodec.encode(frame, &mut BytesMut::new());
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn frames_cross_an_async_stream() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FramedWrite::new(client, MultipartCodec::new());
        let mut reader = FramedRead::new(server, MultipartCodec::new());
        let frame = Frame::from_iter([b"SEND".to_vec(), b"alice".to_vec(), vec![0xff; 200]]);

        let sent = frame.clone();
        let write = tokio::spawn(async move { writer.send(sent).await });

        let received = reader
            .next()
            .await
            .expect("stream open")
            .expect("frame decodes");
        write.await.expect("join").expect("write frame");

        assert_eq!(received, frame);
    }
}

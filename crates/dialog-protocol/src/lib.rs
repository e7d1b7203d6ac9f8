//! Pure binary wire-frame codec for the TTS/ASR provider protocols.
//!
//! Encodes and decodes two frame shapes over a 4-byte header:
//! - **Simple**: header + 4-byte big-endian payload size + payload.
//! - **Sequenced**: header + 4-byte big-endian signed sequence + 4-byte payload size + payload.
//!
//! This crate performs no I/O; adapters in `dialog-providers` own the socket.

mod error;
mod header;

pub use error::CodecError;
pub use header::{CompressionBit, FrameHeader, MessageType, SequenceFlag, SerializationBit};

use bytes::{BufMut, BytesMut};
use std::io::{Read, Write};

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The 4-byte header.
    pub header: FrameHeader,
    /// Sequence number, present for sequenced frames. A negative value denotes the
    /// terminal frame of a provider-side stream.
    pub sequence: Option<i32>,
    /// Raw payload bytes (already gzip-decompressed if the header indicated compression).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Parse the payload as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON.
    pub fn payload_json(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(&self.payload).map_err(CodecError::Json)
    }

    /// `true` if `sequence` is present and negative, i.e. this is the terminal frame of a
    /// provider-side stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.sequence, Some(seq) if seq < 0)
    }
}

/// Gzip-compress a byte slice.
///
/// # Errors
///
/// Returns an error if the underlying compressor fails.
pub fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).map_err(CodecError::Io)?;
    encoder.finish().map_err(CodecError::Io)
}

/// Gzip-decompress a byte slice.
///
/// # Errors
///
/// Returns an error if `data` is not valid gzip.
pub fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(CodecError::Io)?;
    Ok(out)
}

/// Encode a simple (non-sequenced) frame: header + payload size + payload.
///
/// `json` is serialized and, when `compression` is `Gzip`, compressed before framing.
///
/// # Errors
///
/// Returns an error if JSON serialization or gzip compression fails.
pub fn encode_simple(
    msg_type: MessageType,
    compression: CompressionBit,
    json: &serde_json::Value,
) -> Result<Vec<u8>> {
    let raw = serde_json::to_vec(json).map_err(CodecError::Json)?;
    let payload = match compression {
        CompressionBit::None => raw,
        CompressionBit::Gzip => gzip_compress(&raw)?,
    };
    let header = FrameHeader::new(msg_type, SequenceFlag::None, SerializationBit::Json, compression);
    Ok(build(&header, None, &payload))
}

/// Encode a sequenced frame: header + signed sequence + payload size + payload.
///
/// A negative `sequence` marks the terminal frame of a client-to-provider stream.
///
/// # Errors
///
/// Returns an error if JSON serialization or gzip compression fails.
pub fn encode_sequenced(
    msg_type: MessageType,
    compression: CompressionBit,
    sequence: i32,
    json: &serde_json::Value,
) -> Result<Vec<u8>> {
    let raw = serde_json::to_vec(json).map_err(CodecError::Json)?;
    let payload = match compression {
        CompressionBit::None => raw,
        CompressionBit::Gzip => gzip_compress(&raw)?,
    };
    let flag = if sequence < 0 {
        SequenceFlag::NegativeWithSequence
    } else {
        SequenceFlag::Positive
    };
    let header = FrameHeader::new(msg_type, flag, SerializationBit::Json, compression);
    Ok(build(&header, Some(sequence), &payload))
}

/// Encode a sequenced frame carrying raw (non-JSON) bytes, e.g. PCM audio.
///
/// # Errors
///
/// Returns an error if gzip compression fails.
pub fn encode_sequenced_raw(
    msg_type: MessageType,
    compression: CompressionBit,
    sequence: i32,
    data: &[u8],
) -> Result<Vec<u8>> {
    let payload = match compression {
        CompressionBit::None => data.to_vec(),
        CompressionBit::Gzip => gzip_compress(data)?,
    };
    let flag = if sequence < 0 {
        SequenceFlag::NegativeWithSequence
    } else {
        SequenceFlag::Positive
    };
    let header = FrameHeader::new(msg_type, flag, SerializationBit::Json, compression);
    Ok(build(&header, Some(sequence), &payload))
}

fn build(header: &FrameHeader, sequence: Option<i32>, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(12 + payload.len());
    buf.put_u8(header.version_and_size_byte());
    buf.put_u8(header.type_and_flags_byte());
    buf.put_u8(header.serialization_and_compression_byte());
    buf.put_u8(0x00);
    if let Some(seq) = sequence {
        buf.put_i32(seq);
    }
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Decode a wire frame.
///
/// Server-error frames (`MessageType::ServerError`) carry a 4-byte big-endian error code
/// followed by a UTF-8 message in the payload; these are surfaced as
/// [`CodecError::ServerError`] rather than a successful [`Frame`].
///
/// # Errors
///
/// Returns an error if the header is malformed (too short or an unknown message type),
/// decompression fails, or the frame is a server-error frame.
pub fn decode(data: &[u8]) -> Result<Frame> {
    if data.len() < 4 {
        return Err(CodecError::Truncated { expected: 4, actual: data.len() });
    }
    let header = FrameHeader::parse(data[0], data[1], data[2], data[3])?;

    let mut offset = 4usize;
    let sequence = match header.sequence_flag {
        SequenceFlag::None => None,
        SequenceFlag::Positive | SequenceFlag::Negative | SequenceFlag::NegativeWithSequence => {
            if data.len() < offset + 4 {
                return Err(CodecError::Truncated { expected: offset + 4, actual: data.len() });
            }
            let seq = i32::from_be_bytes(data[offset..offset + 4].try_into().unwrap());
            offset += 4;
            Some(seq)
        }
    };

    if data.len() < offset + 4 {
        return Err(CodecError::Truncated { expected: offset + 4, actual: data.len() });
    }
    let payload_len =
        u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
    offset += 4;

    if data.len() < offset + payload_len {
        return Err(CodecError::Truncated { expected: offset + payload_len, actual: data.len() });
    }
    let raw_payload = &data[offset..offset + payload_len];

    if header.msg_type == MessageType::ServerError {
        if raw_payload.len() < 4 {
            return Err(CodecError::Truncated { expected: 4, actual: raw_payload.len() });
        }
        let code = u32::from_be_bytes(raw_payload[0..4].try_into().unwrap());
        let message = String::from_utf8_lossy(&raw_payload[4..]).into_owned();
        return Err(CodecError::ServerError { code, message });
    }

    let payload = match header.compression {
        CompressionBit::Gzip => gzip_decompress(raw_payload)?,
        CompressionBit::None => raw_payload.to_vec(),
    };

    Ok(Frame { header, sequence, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_json_frame() {
        let payload = serde_json::json!({"event": 1, "greeting": "你好呀"});
        let encoded = encode_simple(MessageType::FullClientRequest, CompressionBit::None, &payload)
            .expect("encode");
        let decoded = decode(&encoded).expect("decode");
        assert_eq!(decoded.sequence, None);
        assert_eq!(decoded.payload_json().expect("json"), payload);
    }

    #[test]
    fn round_trips_gzip_sequenced_frame() {
        let payload = serde_json::json!({"audio": true});
        let encoded =
            encode_sequenced(MessageType::FullClientRequest, CompressionBit::Gzip, 3, &payload)
                .expect("encode");
        let decoded = decode(&encoded).expect("decode");
        assert_eq!(decoded.sequence, Some(3));
        assert!(!decoded.is_terminal());
        assert_eq!(decoded.payload_json().expect("json"), payload);
    }

    #[test]
    fn negative_sequence_is_terminal() {
        let encoded =
            encode_sequenced_raw(MessageType::AudioOnlyRequest, CompressionBit::None, -1, b"")
                .expect("encode");
        let decoded = decode(&encoded).expect("decode");
        assert!(decoded.is_terminal());
    }

    #[test]
    fn server_error_frame_surfaces_as_error() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&45_000_001u32.to_be_bytes());
        payload.extend_from_slice("bad request".as_bytes());
        let header = FrameHeader::new(
            MessageType::ServerError,
            SequenceFlag::None,
            SerializationBit::Json,
            CompressionBit::None,
        );
        let encoded = build(&header, None, &payload);

        match decode(&encoded) {
            Err(CodecError::ServerError { code, message }) => {
                assert_eq!(code, 45_000_001);
                assert_eq!(message, "bad request");
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = decode(&[0x11, 0x14]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }
}

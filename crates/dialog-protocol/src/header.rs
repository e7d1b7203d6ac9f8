//! The 4-byte wire header: `[version|hdr-size] [msg-type|flags] [serialization|compression] [reserved]`.

use crate::error::CodecError;

/// Protocol version carried in the high nibble of byte 0. All providers speak v1.
pub const PROTOCOL_VERSION: u8 = 0x1;

/// Header size in 4-byte words, carried in the low nibble of byte 0. The header itself is
/// always one word; the sequence and payload-size fields that may follow are not counted.
pub const HEADER_SIZE_WORDS: u8 = 0x1;

/// Four-bit message-type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Full client request carrying a JSON event payload.
    FullClientRequest,
    /// Audio-only request (client-to-provider PCM frame).
    AudioOnlyRequest,
    /// Full server response carrying a JSON event payload.
    FullServerResponse,
    /// Audio-only server response.
    AudioOnlyServer,
    /// Frontend/informational server message.
    FrontendServer,
    /// Server acknowledgment (shares a tag with `AudioOnlyServer`; distinguished by context).
    ServerAck,
    /// Server error response.
    ServerError,
}

impl MessageType {
    fn tag(self) -> u8 {
        match self {
            Self::FullClientRequest => 0x1,
            Self::AudioOnlyRequest => 0x2,
            Self::FullServerResponse => 0x9,
            Self::AudioOnlyServer | Self::ServerAck => 0xB,
            Self::FrontendServer => 0xC,
            Self::ServerError => 0xF,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0x1 => Ok(Self::FullClientRequest),
            0x2 => Ok(Self::AudioOnlyRequest),
            0x9 => Ok(Self::FullServerResponse),
            0xB => Ok(Self::AudioOnlyServer),
            0xC => Ok(Self::FrontendServer),
            0xF => Ok(Self::ServerError),
            other => Err(CodecError::UnknownMessageType(other)),
        }
    }
}

/// Four-bit sequence-presence flag, packed into the low nibble alongside the message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFlag {
    /// No sequence field follows the header.
    None,
    /// A non-negative sequence field follows.
    Positive,
    /// A negative sequence with no payload follows (rare; most providers still send one).
    Negative,
    /// A negative (terminal) sequence field follows, with payload.
    NegativeWithSequence,
}

impl SequenceFlag {
    fn bits(self) -> u8 {
        match self {
            Self::None => 0b0000,
            Self::Positive => 0b0001,
            Self::Negative => 0b0010,
            Self::NegativeWithSequence => 0b0011,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b0011 {
            0b0001 => Self::Positive,
            0b0010 => Self::Negative,
            0b0011 => Self::NegativeWithSequence,
            _ => Self::None,
        }
    }
}

/// Serialization method, packed into the high nibble of byte 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationBit {
    /// JSON payload.
    Json,
}

impl SerializationBit {
    fn bits(self) -> u8 {
        match self {
            Self::Json => 0b0001,
        }
    }
}

/// Compression method, packed into the low nibble of byte 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionBit {
    /// Payload is not compressed.
    None,
    /// Payload is gzip-compressed.
    Gzip,
}

impl CompressionBit {
    fn bits(self) -> u8 {
        match self {
            Self::None => 0b0000,
            Self::Gzip => 0b0001,
        }
    }

    fn from_bits(bits: u8) -> Self {
        if bits & 0b0001 == 0b0001 {
            Self::Gzip
        } else {
            Self::None
        }
    }
}

/// Parsed 4-byte wire header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message-type tag.
    pub msg_type: MessageType,
    /// Sequence-presence flag.
    pub sequence_flag: SequenceFlag,
    /// Compression method (serialization is always JSON in this protocol family).
    pub compression: CompressionBit,
}

impl FrameHeader {
    /// Build a header from its logical fields.
    #[must_use]
    pub fn new(
        msg_type: MessageType,
        sequence_flag: SequenceFlag,
        _serialization: SerializationBit,
        compression: CompressionBit,
    ) -> Self {
        Self { msg_type, sequence_flag, compression }
    }

    /// Parse the four raw header bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownMessageType`] if byte 1's high nibble is not a known tag.
    pub fn parse(b0: u8, b1: u8, b2: u8, _b3: u8) -> Result<Self, CodecError> {
        let _version = b0 >> 4;
        let msg_type = MessageType::from_tag(b1 >> 4)?;
        let sequence_flag = SequenceFlag::from_bits(b1);
        let compression = CompressionBit::from_bits(b2);
        Ok(Self { msg_type, sequence_flag, compression })
    }

    /// Byte 0: `[version|hdr-size]`.
    #[must_use]
    pub fn version_and_size_byte(&self) -> u8 {
        (PROTOCOL_VERSION << 4) | HEADER_SIZE_WORDS
    }

    /// Byte 1: `[msg-type|flags]`.
    #[must_use]
    pub fn type_and_flags_byte(&self) -> u8 {
        (self.msg_type.tag() << 4) | self.sequence_flag.bits()
    }

    /// Byte 2: `[serialization|compression]`.
    #[must_use]
    pub fn serialization_and_compression_byte(&self) -> u8 {
        (SerializationBit::Json.bits() << 4) | self.compression.bits()
    }
}

//! Wire format for the client/host stream.
//!
//! Every message is a single fixed-size record of [`RECORD_SIZE`] bytes with
//! no length prefix. The layout is the bincode fixed-int, little-endian
//! encoding of [`RawRecord`]:
//!
//! | offset | size | field   |                                             |
//! |--------|------|---------|---------------------------------------------|
//! | 0      | 1    | version | [`PROTOCOL_VERSION`]                        |
//! | 1      | 1    | kind    | 0 = position, 1 = peer state                |
//! | 2      | 1    | slot    | peer slot index, `0xFF` for own position    |
//! | 3      | 1    | flags   | bit 0 set while the peer is active          |
//! | 4      | 4    | x       | f32                                         |
//! | 8      | 4    | y       | f32                                         |
//! | 12     | 4    | z       | f32                                         |
//!
//! Because there is no framing, a reader must always consume exactly one
//! record's worth of bytes before decoding.

use crate::{Position, MAX_PLAYERS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u8 = 1;
pub const RECORD_SIZE: usize = 16;

const KIND_POSITION: u8 = 0;
const KIND_PEER_STATE: u8 = 1;
const NO_SLOT: u8 = 0xFF;
const FLAG_ACTIVE: u8 = 0b0000_0001;

/// A decoded record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record {
    /// The sender's own boat. From the host this repositions the receiver.
    Position(Position),
    /// Host view of another slot.
    PeerState {
        slot: u8,
        active: bool,
        position: Position,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct RawRecord {
    version: u8,
    kind: u8,
    slot: u8,
    flags: u8,
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record: {0}")]
    Codec(#[from] bincode::Error),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown record kind {0}")]
    UnknownKind(u8),
    #[error("slot {0} is out of range")]
    InvalidSlot(u8),
}

pub fn encode(record: &Record) -> Result<[u8; RECORD_SIZE], WireError> {
    let raw = match *record {
        Record::Position(position) => RawRecord {
            version: PROTOCOL_VERSION,
            kind: KIND_POSITION,
            slot: NO_SLOT,
            flags: 0,
            x: position.x,
            y: position.y,
            z: position.z,
        },
        Record::PeerState {
            slot,
            active,
            position,
        } => RawRecord {
            version: PROTOCOL_VERSION,
            kind: KIND_PEER_STATE,
            slot,
            flags: if active { FLAG_ACTIVE } else { 0 },
            x: position.x,
            y: position.y,
            z: position.z,
        },
    };

    let mut bytes = [0u8; RECORD_SIZE];
    bincode::serialize_into(&mut bytes[..], &raw)?;
    Ok(bytes)
}

pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Result<Record, WireError> {
    let raw: RawRecord = bincode::deserialize(bytes)?;

    if raw.version != PROTOCOL_VERSION {
        return Err(WireError::UnsupportedVersion(raw.version));
    }

    let position = Position::new(raw.x, raw.y, raw.z);
    match raw.kind {
        KIND_POSITION => Ok(Record::Position(position)),
        KIND_PEER_STATE => {
            if raw.slot as usize >= MAX_PLAYERS {
                return Err(WireError::InvalidSlot(raw.slot));
            }
            Ok(Record::PeerState {
                slot: raw.slot,
                active: raw.flags & FLAG_ACTIVE != 0,
                position,
            })
        }
        other => Err(WireError::UnknownKind(other)),
    }
}

/// Reads exactly one record.
///
/// Returns `Ok(None)` when the stream ends cleanly on a record boundary; a
/// stream that ends mid-record is an `UnexpectedEof` error.
pub async fn read_record<R>(reader: &mut R) -> Result<Option<Record>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = RecordBuffer::new();
    loop {
        let n = reader.read(buffer.unfilled()).await?;
        if n == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        if let Some(bytes) = buffer.advance(n) {
            return decode(&bytes).map(Some);
        }
    }
}

pub async fn write_record<W>(writer: &mut W, record: &Record) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode(record)?;
    writer.write_all(&bytes).await?;
    Ok(())
}

/// Accumulates the bytes of one record across several partial reads.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    bytes: [u8; RECORD_SIZE],
    filled: usize,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The part of the record still missing.
    pub fn unfilled(&mut self) -> &mut [u8] {
        &mut self.bytes[self.filled..]
    }

    /// Marks `n` more bytes as filled. Once the record is complete its bytes
    /// are returned and the buffer starts over.
    pub fn advance(&mut self, n: usize) -> Option<[u8; RECORD_SIZE]> {
        self.filled = (self.filled + n).min(RECORD_SIZE);
        if self.filled < RECORD_SIZE {
            return None;
        }
        self.filled = 0;
        Some(self.bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }
}

//! Length-Prefixed Frames
//!
//! Pipes are byte streams, so every message is written as a little-endian
//! `u32` length followed by its rkyv archive. The archive is validated before
//! it is deserialized; a worker that dies mid-frame shows up as an I/O error,
//! a worker that exits cleanly between frames as `EndOfStream`.
//!
//! ```text
//! +-----------------+---------------------------+
//! | len: u32 (LE)   | rkyv archive (len bytes)  |
//! +-----------------+---------------------------+
//! ```

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use thiserror::Error;

/// Size of the length prefix in bytes
pub const HEADER_LEN: usize = 4;

/// Largest payload accepted in either direction (1 MiB).
///
/// Messages are a handful of scalars; anything bigger is a corrupted stream.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors raised while encoding or decoding frames
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying pipe failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// rkyv could not serialize the message
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// Payload failed archive validation
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// Declared or actual payload size exceeds `MAX_FRAME_SIZE`
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    TooLarge {
        /// Offending size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// A frame header announced an empty payload
    #[error("empty frame")]
    Empty,

    /// The peer closed the stream on a frame boundary
    #[error("end of stream")]
    EndOfStream,
}

fn encode<T>(message: &T) -> Result<AlignedVec, FrameError>
where
    T: Serialize<AllocSerializer<256>>,
{
    let payload =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Encode(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(payload)
}

fn decode<T>(payload: &[u8]) -> Result<T, FrameError>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let archived =
        rkyv::check_archived_root::<T>(payload).map_err(|e| FrameError::Decode(e.to_string()))?;
    archived
        .deserialize(&mut Infallible)
        .map_err(|_| FrameError::Decode("archive deserialization failed".to_string()))
}

/// Buffered writer that emits one frame per message and flushes it immediately
pub struct FrameWriter<W: Write> {
    inner: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a byte sink
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::with_capacity(4 * 1024, inner),
        }
    }

    /// Encode `message` and push it to the peer
    pub fn send<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        let payload = encode(message)?;
        let len = payload.len() as u32;
        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(&payload)?;
        // A command sitting in the buffer would stall the peer forever.
        self.inner.flush()?;
        Ok(())
    }
}

/// Buffered reader that yields one decoded message per frame
pub struct FrameReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a byte source
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::with_capacity(4 * 1024, inner),
        }
    }

    /// Block until the next complete frame arrives and decode it
    pub fn recv<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        let mut header = [0u8; HEADER_LEN];
        if let Err(e) = self.inner.read_exact(&mut header) {
            return Err(match e.kind() {
                ErrorKind::UnexpectedEof => FrameError::EndOfStream,
                _ => FrameError::Io(e),
            });
        }

        let len = u32::from_le_bytes(header) as usize;
        if len == 0 {
            return Err(FrameError::Empty);
        }
        if len > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut payload = AlignedVec::with_capacity(len);
        payload.resize(len, 0);
        self.inner.read_exact(&mut payload)?;
        decode(&payload)
    }

    /// Whether bytes of a not-yet-consumed frame are already buffered
    pub fn has_buffered(&self) -> bool {
        !self.inner.buffer().is_empty()
    }
}

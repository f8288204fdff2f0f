//! Packets exchanged with the rewriting engines, and the errors those engines report.

use crate::rbsp::WriteError;
use crate::tile::TileLayoutError;
use std::collections::TryReserveError;
use std::fmt;
use std::io;

/// One access unit of Annex B data, with the timing and flags of the container it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub flags: u32,
    /// Set on the packets produced for a single tile.
    pub tile_index: Option<usize>,
}
impl Packet {
    /// Marks a packet holding an IRAP picture.
    pub const FLAG_KEY: u32 = 0x0001;

    pub fn new(data: Vec<u8>) -> Packet {
        Packet {
            data,
            ..Packet::default()
        }
    }

    /// A packet holding `data`, with the timestamps and flags of `self`.
    pub fn derive(&self, data: Vec<u8>) -> Packet {
        Packet {
            data,
            pts: self.pts,
            dts: self.dts,
            flags: self.flags,
            tile_index: None,
        }
    }

    pub fn is_key(&self) -> bool {
        self.flags & Self::FLAG_KEY != 0
    }
}

/// Allocates an empty buffer able to hold `len` bytes, reporting allocation failure.
pub(crate) fn alloc(len: usize) -> Result<Vec<u8>, FilterError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    Ok(buf)
}

#[derive(Debug)]
pub enum FilterError {
    /// The bitstream is structurally inconsistent with what the engine has seen so far.
    InvalidData(&'static str),
    /// The bitstream uses syntax that cannot be rewritten.
    Unsupported(&'static str),
    OutOfMemory,
    /// Output from the previous packet must be received before more input is sent.
    PendingOutput,
    InvalidOption {
        name: &'static str,
        value: i64,
    },
    Io(io::Error),
}
impl From<WriteError> for FilterError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::Io(e) => FilterError::Io(e),
            WriteError::Unsupported(name) => FilterError::Unsupported(name),
            WriteError::InvalidValue { name, .. } => FilterError::InvalidData(name),
            WriteError::NotByteAligned => FilterError::InvalidData("unaligned write"),
        }
    }
}
impl From<TryReserveError> for FilterError {
    fn from(_: TryReserveError) -> Self {
        FilterError::OutOfMemory
    }
}
impl From<TileLayoutError> for FilterError {
    fn from(e: TileLayoutError) -> Self {
        match e {
            TileLayoutError::TilesDisabled => FilterError::InvalidData("tiles not enabled"),
            TileLayoutError::ExplicitSizeOverflow { columns: true } => {
                FilterError::InvalidData("tile column widths exceed picture")
            }
            TileLayoutError::ExplicitSizeOverflow { columns: false } => {
                FilterError::InvalidData("tile row heights exceed picture")
            }
            TileLayoutError::Mismatch(what) => FilterError::InvalidData(what),
        }
    }
}
impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::InvalidData(what) => write!(f, "invalid data: {}", what),
            FilterError::Unsupported(what) => write!(f, "unsupported: {}", what),
            FilterError::OutOfMemory => f.write_str("out of memory"),
            FilterError::PendingOutput => f.write_str("output pending"),
            FilterError::InvalidOption { name, value } => {
                write!(f, "option {} out of range: {}", name, value)
            }
            FilterError::Io(e) => write!(f, "{}", e),
        }
    }
}
impl std::error::Error for FilterError {}

/*
    UnifiedFloppyTool
    A library crate for reading, decoding, reconstructing, and re-encoding retro-computing
    floppy media across container, flux, and filesystem formats.

    Copyright 2024 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! # unifloppy
//!
//! `unifloppy` is a Rust library for reading, writing, and manipulating disk images of the kind
//! used with vintage home computers and their compatibles: Commodore, TRS-80, TI-99/4A, and IBM PC
//! floppies, in both sector-level container formats and raw flux captures.
//!
//! The library is organized around three tightly-coupled subsystems:
//! - the flux pipeline ([`flux`]): capture → PLL bit recovery → encoded-bit stream
//! - the container & geometry layer ([`containers`], [`file_parsers`], [`chs`]): bit-exact
//!   parsing/writing of on-wire formats
//! - the write transaction engine ([`transaction`]): backup/commit/abort/rollback with
//!   crash-recovery logging
//!
//! The main entry point is [`containers::DiskImage`], which can be produced by probing and parsing
//! a byte blob with [`file_parsers::detect_and_parse`], or built up from scratch.

pub mod bitstream_codec;
pub mod chs;
pub mod containers;
pub mod file_parsers;
pub mod file_system;
pub mod flux;
mod io;
mod random;
pub mod range_check;
pub mod session;
pub mod standard_format;
pub mod transaction;
pub mod util;

use std::fmt;
use std::fmt::{Display, Formatter};

use thiserror::Error;

pub use crate::chs::{ch_to_lba, lba_to_ch, Geometry, SectorId};
pub use crate::containers::{DiskImage, DiskTrack, Sector, SectorFlags, Variant};
pub use crate::io::cursor::ByteCursor;
pub use crate::io::{buffered_reader, buffered_writer, ReadSeek, ReadWriteSeek};
pub use crate::standard_format::StandardFormat;

/// The maximum sector payload size this crate will ever allocate for. Matches the widest `size_code`
/// used by any supported variant (1024 bytes, JV3/MFM) with headroom for nonstandard formats.
pub const MAXIMUM_SECTOR_SIZE: usize = 8192;
pub const DEFAULT_SECTOR_SIZE: usize = 512;

/// Security cap: containers larger than this are rejected outright before any parsing is attempted.
/// See spec §7, `LimitExceeded`.
pub const MAX_CONTAINER_SIZE: usize = 512 * 1024 * 1024;
/// Security cap: SCP/flux captures may not claim more than this many revolutions per track.
pub const MAX_REVOLUTIONS: u8 = 32;
/// Security cap: a single flux revolution may not claim more than this many transitions.
pub const MAX_FLUX_PER_REVOLUTION: usize = 500_000;
/// Security cap: a single write transaction may not queue more than this many operations.
pub const MAX_TRANSACTION_OPS: usize = 256;
/// Security cap: filesystem directory/allocation-chain walks stop after this many sectors, breaking
/// cycles in adversarial images. See spec §4.G, §8 property 7.
pub const MAX_VISITED_SECTORS: usize = 2000;

/// The fixed error taxonomy shared by every subsystem (spec §7). Subsystem-specific error enums
/// (parsing, flux, filesystem, transaction) convert into this type at their public boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiskImageError {
    #[error("byte access past the end of a buffer, or an out-of-range address")]
    OutOfBounds,
    #[error("arithmetic on an attacker-influenced size or offset overflowed a width check")]
    Overflow,
    #[error("magic mismatch or structural invariant violated")]
    Format,
    #[error("underlying file or device I/O failed: {0}")]
    Io(String),
    #[error("hardware command exceeded its timeout budget")]
    Timeout,
    #[error("medium or device refused a write")]
    WriteProtected,
    #[error("sector CRC failed")]
    CrcBad,
    #[error("filesystem chain traversal found an out-of-range link")]
    ChainBroken,
    #[error("filesystem chain traversal exceeded the visited-sector cap")]
    ChainTooLong,
    #[error("operation was cancelled by the caller")]
    Aborted,
    #[error("rollback was requested but no pre-image backup exists for this operation")]
    NoBackup,
    #[error("pre-image backup exceeds the configured size cap")]
    BackupTooLarge,
    #[error("a security limit was exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("unknown or unsupported disk image container format")]
    UnknownFormat,
    #[error("the requested sector id could not be found")]
    IdError,
    #[error("no sectors were found on the current track")]
    DataError,
    #[error("an invalid function parameter was supplied")]
    ParameterError,
}

impl From<std::io::Error> for DiskImageError {
    fn from(err: std::io::Error) -> Self {
        DiskImageError::Io(err.to_string())
    }
}

/// The resolution of the data held by a [`crate::containers::DiskTrack`].
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum DiskDataResolution {
    #[default]
    MetaSector = 0,
    BitStream = 1,
    FluxStream = 2,
}

/// The bitcell encoding of a track's data.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum DiskDataEncoding {
    #[default]
    Fm,
    Mfm,
    Gcr,
    AppleGcr,
}

impl Display for DiskDataEncoding {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            DiskDataEncoding::Fm => write!(f, "FM"),
            DiskDataEncoding::Mfm => write!(f, "MFM"),
            DiskDataEncoding::Gcr => write!(f, "GCR"),
            DiskDataEncoding::AppleGcr => write!(f, "Apple-GCR"),
        }
    }
}

/// Nominal rotational speed of the medium.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum DiskRpm {
    #[default]
    Rpm300,
    Rpm360,
}

impl Display for DiskRpm {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            DiskRpm::Rpm300 => write!(f, "300RPM"),
            DiskRpm::Rpm360 => write!(f, "360RPM"),
        }
    }
}

/// Checked addition, per spec §4.A / §9: no `offset + len` arithmetic happens anywhere in this
/// crate without going through this helper or an equivalent bounds check first.
pub fn checked_add(a: usize, b: usize) -> Result<usize, DiskImageError> {
    a.checked_add(b).ok_or(DiskImageError::Overflow)
}

/// Checked multiplication, for the same reason as [`checked_add`].
pub fn checked_mul(a: usize, b: usize) -> Result<usize, DiskImageError> {
    a.checked_mul(b).ok_or(DiskImageError::Overflow)
}

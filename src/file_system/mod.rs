/*
    src/file_system/mod.rs

    Filesystem Directories & Allocation (spec §4.G). Shared types (`DirectoryEntry`, `FileType`,
    `AllocationBitmap`) and the visited-set-capped chain walker used by every per-filesystem
    submodule, so Commodore's T/S chains, TI-99's FDIR chains, and TRS-80's granule chains all
    terminate the same way on adversarial input (spec §8 property 7). Grounded on the teacher's
    `file_system/mod.rs` + `file_system/fat/` directory-walking idiom, generalized from FAT's single
    chain shape to the three chain shapes this spec's filesystem family actually uses.
*/
pub mod commodore;
pub mod trs80;
pub mod ti99;

use crate::{DiskImageError, MAX_VISITED_SECTORS};

/// The kind of on-disk object a directory entry names.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileType {
    Deleted,
    Sequential,
    Program,
    User,
    Relative,
    DirectoryOrVolume,
}

/// Per-entry status flags (spec §3 `DirectoryEntry.flags`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryFlags {
    pub locked: bool,
    pub closed: bool,
    pub system: bool,
    pub protected: bool,
}

/// Where a file's first block lives; the two fields are (track-or-equivalent, sector-or-equivalent)
/// for every filesystem this crate supports, all of which address storage as a track/sector or
/// track/granule pair rather than a flat block number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Locator {
    pub track: u16,
    pub sector: u8,
}

/// An optional on-disk timestamp; fields are filesystem-native (no timezone, Commodore/TI-99/
/// TRS-80 all store local wall-clock fields with no calendar validation beyond range).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

/// One directory entry (spec §3 `Directory Entry`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: Vec<u8>,
    pub ftype: FileType,
    pub first_location: Locator,
    pub size_blocks: u16,
    pub flags: EntryFlags,
    pub timestamp: Option<Timestamp>,
}

/// Outcome of a chain walk (directory enumeration or file read), distinguishing a clean finish
/// from the two recoverable failure modes spec §4.G/§7 name.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChainOutcome {
    Complete,
    ChainBroken,
    ChainTooLong,
}

/// Bitmap-based allocation view shared by Commodore's BAM, TRS-80's GAT, and TI-99's VIB (spec §3
/// `BAM / Allocation View`, SPEC_FULL §4.G "all three implement the same `AllocationBitmap` trait").
/// Invariant: the free-count this type reports is always recomputed from the bitmap bytes, never
/// cached independently, so it cannot drift out of sync with `is_free` (spec §8 property 6).
pub trait AllocationBitmap {
    fn is_free(&self, track: u16, sector_or_granule: u8) -> bool;
    fn set_free(&mut self, track: u16, sector_or_granule: u8, free: bool) -> Result<(), DiskImageError>;
    fn free_count(&self) -> usize;
}

/// Walk a chain of `(track, sector)` links starting at `start`, calling `visit` on each node to
/// obtain its payload and next link. Stops after [`MAX_VISITED_SECTORS`] nodes (spec §8 property 7,
/// §4.G "visited-set cap") or when `visit` reports the end of the chain or an out-of-range link.
pub fn walk_chain<T>(
    start: (u16, u8),
    mut visit: impl FnMut((u16, u8)) -> Result<(T, Option<(u16, u8)>), DiskImageError>,
) -> (Vec<T>, ChainOutcome) {
    let mut collected = Vec::new();
    let mut current = Some(start);
    let mut visited = 0usize;
    while let Some(node) = current {
        if visited >= MAX_VISITED_SECTORS {
            return (collected, ChainOutcome::ChainTooLong);
        }
        visited += 1;
        match visit(node) {
            Ok((payload, next)) => {
                collected.push(payload);
                current = next;
            }
            Err(_) => return (collected, ChainOutcome::ChainBroken),
        }
    }
    (collected, ChainOutcome::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_chain_stops_at_visited_cap_on_a_cycle() {
        // A two-node cycle: every visit always returns "go to the other node".
        let (collected, outcome) = walk_chain((1, 0), |(t, _s)| {
            let next = if t == 1 { (2, 0) } else { (1, 0) };
            Ok::<_, DiskImageError>(((t, 0u8), Some(next)))
        });
        assert_eq!(outcome, ChainOutcome::ChainTooLong);
        assert_eq!(collected.len(), MAX_VISITED_SECTORS);
    }

    #[test]
    fn walk_chain_reports_broken_link() {
        let (collected, outcome) = walk_chain((1, 0), |(t, _s)| {
            if t == 1 {
                Ok::<_, DiskImageError>(((1u16, 0u8), Some((99, 0))))
            } else {
                Err(DiskImageError::OutOfBounds)
            }
        });
        assert_eq!(outcome, ChainOutcome::ChainBroken);
        assert_eq!(collected.len(), 1);
    }

    #[test]
    fn walk_chain_terminates_cleanly_on_none_link() {
        let (collected, outcome) = walk_chain((1, 0), |(t, s)| Ok::<_, DiskImageError>(((t, s), None)));
        assert_eq!(outcome, ChainOutcome::Complete);
        assert_eq!(collected.len(), 1);
    }
}

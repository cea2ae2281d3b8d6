/*
    src/file_system/trs80.rs

    TRS-80 Model I/III TRSDOS filesystem (spec §4.G, GLOSSARY "GAT"/"Granule"). The Granule
    Allocation Table is one bit per granule per cylinder-side (SPEC_FULL's resolution of the GAT
    open question); directory entries chain through granule-numbered blocks rather than raw
    sectors. Only the primary documented TRSDOS variant is implemented; other variants are left as
    an explicit `Unsupported` rather than guessed (spec §9 open question, SPEC_FULL resolution).
*/
use crate::containers::DiskImage;
use crate::file_system::{walk_chain, AllocationBitmap, ChainOutcome, DirectoryEntry, EntryFlags, FileType, Locator};
use crate::DiskImageError;

const GAT_TRACK: u16 = 17;
const GAT_SECTOR: u8 = 0;
const DIR_TRACK: u16 = 17;
const DIR_FIRST_SECTOR: u8 = 1;
const DIR_LAST_SECTOR: u8 = 15; // sectors 1..15 on track 17 hold the directory (single density)
const SECTOR_SIZE: usize = 256;
const ENTRY_SIZE: usize = 32;
const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / ENTRY_SIZE;
/// Sectors per granule for single-density TRSDOS (SPEC_FULL §4.B).
pub const SECTORS_PER_GRANULE: u8 = 5;
const GRANULES_PER_TRACK: u8 = 2;

/// Uppercase-ASCII, space-padded filename table (spec §4.G): 8-character name + 3-character
/// extension, no shift encoding (unlike Commodore's PETSCII).
pub fn decode_filename(name: &[u8; 8], ext: &[u8; 3]) -> Vec<u8> {
    let name_end = name.iter().rposition(|&b| b != b' ').map(|i| i + 1).unwrap_or(0);
    let ext_end = ext.iter().rposition(|&b| b != b' ').map(|i| i + 1).unwrap_or(0);
    let mut out = name[..name_end].to_vec();
    if ext_end > 0 {
        out.push(b'.');
        out.extend_from_slice(&ext[..ext_end]);
    }
    out
}

/// The Granule Allocation Table: one bit per granule, per track (`GRANULES_PER_TRACK` granules per
/// track), cleared = allocated, set = free, matching TRSDOS's actual on-disk bit sense.
pub struct Gat {
    bytes: Vec<u8>,
    tracks: u16,
}

impl Gat {
    pub fn from_sector(bytes: &[u8], tracks: u16) -> Result<Self, DiskImageError> {
        if bytes.len() != SECTOR_SIZE {
            return Err(DiskImageError::Format);
        }
        Ok(Self {
            bytes: bytes.to_vec(),
            tracks,
        })
    }

    fn bit_index(&self, track: u16, granule: u8) -> Option<usize> {
        if track >= self.tracks || granule >= GRANULES_PER_TRACK {
            return None;
        }
        Some(track as usize * GRANULES_PER_TRACK as usize + granule as usize)
    }
}

impl AllocationBitmap for Gat {
    fn is_free(&self, track: u16, granule: u8) -> bool {
        match self.bit_index(track, granule) {
            Some(bit) if bit / 8 < self.bytes.len() => (self.bytes[bit / 8] >> (bit % 8)) & 1 == 1,
            _ => false,
        }
    }

    fn set_free(&mut self, track: u16, granule: u8, free: bool) -> Result<(), DiskImageError> {
        let bit = self.bit_index(track, granule).ok_or(DiskImageError::OutOfBounds)?;
        let byte = bit / 8;
        if byte >= self.bytes.len() {
            return Err(DiskImageError::OutOfBounds);
        }
        if free {
            self.bytes[byte] |= 1 << (bit % 8);
        } else {
            self.bytes[byte] &= !(1 << (bit % 8));
        }
        Ok(())
    }

    fn free_count(&self) -> usize {
        (0..self.tracks)
            .flat_map(|t| (0..GRANULES_PER_TRACK).map(move |g| (t, g)))
            .filter(|&(t, g)| self.is_free(t, g))
            .count()
    }
}

pub fn read_gat(image: &DiskImage, tracks: u16) -> Result<Gat, DiskImageError> {
    let sector = image.read_sector(GAT_TRACK, 0, GAT_SECTOR)?;
    Gat::from_sector(&sector.payload, tracks)
}

fn decode_entry(bytes: &[u8]) -> Option<DirectoryEntry> {
    let flag_byte = bytes[0];
    if flag_byte == 0x00 || flag_byte == 0xFF {
        return None;
    }
    let mut name = [0u8; 8];
    name.copy_from_slice(&bytes[1..9]);
    let mut ext = [0u8; 3];
    ext.copy_from_slice(&bytes[9..12]);
    let flags = EntryFlags {
        locked: flag_byte & 0x80 != 0,
        closed: flag_byte & 0x40 != 0,
        system: flag_byte & 0x20 != 0,
        protected: flag_byte & 0x10 != 0,
    };
    let granule_count = bytes[12];
    let first_granule_track = bytes[13];
    let first_granule = bytes[14];
    Some(DirectoryEntry {
        name: decode_filename(&name, &ext),
        ftype: FileType::Sequential,
        first_location: Locator {
            track: first_granule_track as u16,
            sector: first_granule,
        },
        size_blocks: granule_count as u16,
        flags,
        timestamp: None,
    })
}

/// Enumerate the fixed directory region (track 17, sectors 1-15 for single-density TRSDOS). Unlike
/// Commodore's linked sectors, TRSDOS's directory is a fixed run, but we still route it through
/// [`walk_chain`] keyed by sector number so the visited-set cap applies uniformly.
pub fn read_directory(image: &DiskImage) -> Result<(Vec<DirectoryEntry>, ChainOutcome), DiskImageError> {
    let (sector_payloads, outcome) = walk_chain((DIR_TRACK, DIR_FIRST_SECTOR), |(track, sector)| {
        let rec = image.read_sector(track, 0, sector).map_err(|_| DiskImageError::ChainBroken)?;
        let next = if sector < DIR_LAST_SECTOR { Some((track, sector + 1)) } else { None };
        Ok((rec.payload.clone(), next))
    });

    let mut entries = Vec::new();
    for payload in sector_payloads {
        for chunk in payload.chunks(ENTRY_SIZE).take(ENTRIES_PER_SECTOR) {
            if chunk.len() == ENTRY_SIZE {
                if let Some(entry) = decode_entry(chunk) {
                    entries.push(entry);
                }
            }
        }
    }
    Ok((entries, outcome))
}

/// Granule-chained file read (spec §4.G): each granule's final sector holds a link to the next
/// granule; the spec's "last-sector byte-count" truncation applies to the final granule's final
/// sector just as it does to Commodore's T/S chain.
pub fn read_file(
    image: &DiskImage,
    first_location: Locator,
    granule_count: u16,
) -> Result<(Vec<u8>, ChainOutcome), DiskImageError> {
    let mut data = Vec::new();
    let mut track = first_location.track;
    let mut granule = first_location.sector;
    let mut outcome = ChainOutcome::Complete;
    let mut granules_read = 0u16;

    while granules_read < granule_count {
        if granules_read as usize >= crate::MAX_VISITED_SECTORS {
            outcome = ChainOutcome::ChainTooLong;
            break;
        }
        let first_sector = granule * SECTORS_PER_GRANULE;
        let mut broke = false;
        for s in 0..SECTORS_PER_GRANULE {
            match image.read_sector(track, 0, first_sector + s) {
                Ok(rec) => data.extend_from_slice(&rec.payload),
                Err(_) => {
                    outcome = ChainOutcome::ChainBroken;
                    broke = true;
                    break;
                }
            }
        }
        if broke {
            break;
        }
        granules_read += 1;
        granule += 1;
        if granule >= GRANULES_PER_TRACK {
            granule = 0;
            track += 1;
        }
    }
    Ok((data, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gat_free_count_matches_bitmap() {
        let mut bytes = vec![0u8; SECTOR_SIZE];
        bytes[0] = 0b0000_0011; // track 0: both granules free
        let gat = Gat::from_sector(&bytes, 4).unwrap();
        assert!(gat.is_free(0, 0));
        assert!(gat.is_free(0, 1));
        assert!(!gat.is_free(1, 0));
        assert_eq!(gat.free_count(), 2);
    }

    #[test]
    fn gat_allocate_then_free_is_idempotent_on_free_count() {
        let mut bytes = vec![0u8; SECTOR_SIZE];
        bytes[0] = 0b0000_0011;
        let mut gat = Gat::from_sector(&bytes, 4).unwrap();
        let before = gat.free_count();
        gat.set_free(0, 0, false).unwrap();
        gat.set_free(0, 0, true).unwrap();
        assert_eq!(gat.free_count(), before);
    }

    #[test]
    fn filename_decode_joins_name_and_extension() {
        let name = *b"HELLO   ";
        let ext = *b"BAS";
        assert_eq!(decode_filename(&name, &ext), b"HELLO.BAS");
    }
}

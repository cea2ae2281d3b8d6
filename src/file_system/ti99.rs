/*
    src/file_system/ti99.rs

    TI-99/4A filesystem (spec §4.G, GLOSSARY "VIB"/"FDR"/"FDIR"). The Volume Information Block
    (sector 0) carries a bitmap of allocation units (AUs); the File Descriptor Index Record (sector
    1) is a flat list of FDR sector pointers rather than a linked chain, but is still walked through
    [`walk_chain`] for a uniform termination guarantee (spec §8 property 7). No file in the example
    pack covers TI-99 specifically; field layout is taken directly from the spec.
*/
use crate::containers::DiskImage;
use crate::file_system::{AllocationBitmap, ChainOutcome, DirectoryEntry, EntryFlags, FileType, Locator};
use crate::DiskImageError;

const VIB_TRACK: u16 = 0;
const VIB_SECTOR: u8 = 0;
const FDIR_SECTOR: u8 = 1;
const SECTOR_SIZE: usize = 256;
const FDR_NAME_LEN: usize = 10;

/// 10-character space-padded uppercase-ASCII filename table (spec §4.G).
pub fn decode_filename(field: &[u8; FDR_NAME_LEN]) -> Vec<u8> {
    let end = field.iter().rposition(|&b| b != b' ').map(|i| i + 1).unwrap_or(0);
    field[..end].to_vec()
}

pub fn encode_filename(name: &[u8]) -> [u8; FDR_NAME_LEN] {
    let mut field = [b' '; FDR_NAME_LEN];
    for (dst, &src) in field.iter_mut().zip(name.iter().take(FDR_NAME_LEN)) {
        *dst = src.to_ascii_uppercase();
    }
    field
}

/// The Volume Information Block: total AUs, AUs/track, and an allocation bitmap sized to the
/// volume's total sector count (one bit per allocation unit).
pub struct Vib {
    bytes: Vec<u8>,
    total_aus: u16,
}

const VIB_BITMAP_OFFSET: usize = 0x38;

impl Vib {
    pub fn from_sector(bytes: &[u8], total_aus: u16) -> Result<Self, DiskImageError> {
        if bytes.len() != SECTOR_SIZE {
            return Err(DiskImageError::Format);
        }
        Ok(Self {
            bytes: bytes.to_vec(),
            total_aus,
        })
    }

    pub fn volume_name(&self) -> Vec<u8> {
        self.bytes[0..10].iter().copied().collect()
    }
}

impl AllocationBitmap for Vib {
    fn is_free(&self, _track: u16, au: u8) -> bool {
        let bit_index = au as usize;
        if bit_index as u16 >= self.total_aus {
            return false;
        }
        let byte = VIB_BITMAP_OFFSET + bit_index / 8;
        if byte >= self.bytes.len() {
            return false;
        }
        (self.bytes[byte] >> (bit_index % 8)) & 1 == 0
    }

    fn set_free(&mut self, _track: u16, au: u8, free: bool) -> Result<(), DiskImageError> {
        let bit_index = au as usize;
        if bit_index as u16 >= self.total_aus {
            return Err(DiskImageError::OutOfBounds);
        }
        let byte = VIB_BITMAP_OFFSET + bit_index / 8;
        if byte >= self.bytes.len() {
            return Err(DiskImageError::OutOfBounds);
        }
        if free {
            self.bytes[byte] &= !(1 << (bit_index % 8));
        } else {
            self.bytes[byte] |= 1 << (bit_index % 8);
        }
        Ok(())
    }

    fn free_count(&self) -> usize {
        (0..self.total_aus).filter(|&au| self.is_free(0, au as u8)).count()
    }
}

pub fn read_vib(image: &DiskImage, total_aus: u16) -> Result<Vib, DiskImageError> {
    let sector = image.read_sector(VIB_TRACK, 0, VIB_SECTOR)?;
    Vib::from_sector(&sector.payload, total_aus)
}

/// Decode one File Descriptor Record into a [`DirectoryEntry`] (name, flags, first AU, size).
fn decode_fdr(bytes: &[u8]) -> Option<DirectoryEntry> {
    if bytes.len() < 0x1C || bytes[0] == b' ' && bytes.iter().all(|&b| b == b' ') {
        return None;
    }
    let mut name_field = [0u8; FDR_NAME_LEN];
    name_field.copy_from_slice(&bytes[0..FDR_NAME_LEN]);
    let name = decode_filename(&name_field);
    if name.is_empty() {
        return None;
    }
    let status = bytes[0x0C];
    let flags = EntryFlags {
        locked: status & 0x80 != 0,
        closed: true,
        system: false,
        protected: status & 0x08 != 0,
    };
    let sectors_allocated = u16::from_le_bytes([bytes[0x0E], bytes[0x0F]]);
    Some(DirectoryEntry {
        name,
        ftype: if status & 0x02 != 0 {
            FileType::Program
        } else {
            FileType::Sequential
        },
        first_location: Locator { track: 0, sector: 0 },
        size_blocks: sectors_allocated,
        flags,
        timestamp: None,
    })
}

/// Walk the FDIR's flat table of FDR sector pointers, reading each FDR sector in turn. Unlike
/// Commodore's linked directory chain, TI-99's FDIR is a fixed-size array of pointers; the visited
/// cap still protects against a pointer table claiming more entries than the cap allows.
pub fn read_directory(image: &DiskImage) -> Result<(Vec<DirectoryEntry>, ChainOutcome), DiskImageError> {
    let fdir = image.read_sector(VIB_TRACK, 0, FDIR_SECTOR)?;
    let mut entries = Vec::new();
    let mut outcome = ChainOutcome::Complete;
    for chunk in fdir.payload.chunks(2) {
        if chunk.len() < 2 {
            break;
        }
        let sector_num = u16::from_le_bytes([chunk[0], chunk[1]]);
        if sector_num == 0 {
            continue;
        }
        if entries.len() >= crate::MAX_VISITED_SECTORS {
            outcome = ChainOutcome::ChainTooLong;
            break;
        }
        let track = (sector_num / 9) as u16; // 9 sectors/track for SSDD geometry default
        let sector = (sector_num % 9) as u8;
        match image.read_sector(track, 0, sector) {
            Ok(rec) => {
                if let Some(entry) = decode_fdr(&rec.payload) {
                    entries.push(entry);
                }
            }
            Err(_) => {
                outcome = ChainOutcome::ChainBroken;
                break;
            }
        }
    }
    Ok((entries, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_roundtrips_through_padding() {
        let encoded = encode_filename(b"DATA");
        assert_eq!(decode_filename(&encoded), b"DATA");
    }

    #[test]
    fn vib_allocation_bit_toggles_without_drifting_free_count() {
        let mut bytes = vec![0u8; SECTOR_SIZE];
        bytes[0..10].copy_from_slice(b"TESTDISK  ");
        let mut vib = Vib::from_sector(&bytes, 16).unwrap();
        assert_eq!(vib.free_count(), 16);
        vib.set_free(0, 3, false).unwrap();
        assert!(!vib.is_free(0, 3));
        assert_eq!(vib.free_count(), 15);
        vib.set_free(0, 3, true).unwrap();
        assert_eq!(vib.free_count(), 16);
    }
}

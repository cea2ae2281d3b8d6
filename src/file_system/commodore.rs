/*
    src/file_system/commodore.rs

    Commodore 1541/1571 BAM + directory chain (spec §4.G). Directory sectors link via the
    `(track, sector)` pair stored in the first two bytes of the sector's slot 0; each sector holds
    eight 32-byte slots, slot 0's bytes also doubling as the chain link (spec has no direct
    precedent for this layout in the example pack; field offsets below are taken from the
    documented 1541 disk layout spec.md references, not grounded on any file in `examples/`).
*/
use crate::containers::DiskImage;
use crate::file_system::{walk_chain, AllocationBitmap, ChainOutcome, DirectoryEntry, EntryFlags, FileType, Locator};
use crate::DiskImageError;

const BAM_TRACK: u16 = 18;
const BAM_SECTOR: u8 = 0;
const DIR_SECTOR_SIZE: usize = 256;
const SLOT_SIZE: usize = 32;
const SLOTS_PER_SECTOR: usize = 8;
const BAM_ENTRY_BASE: usize = 0x04;
const BAM_MAX_TRACK: u16 = 35;

/// PETSCII -> ASCII for the uppercase/graphics subset this crate round-trips (spec §4.G). Shifted
/// letters `0xC1..=0xDA` map onto ASCII uppercase `A..Z`; padding byte `0xA0` marks end-of-name.
pub fn petscii_to_ascii(byte: u8) -> u8 {
    match byte {
        0xC1..=0xDA => byte - 0x80,
        0x41..=0x5A => byte, // already plain ASCII uppercase in unshifted PETSCII
        _ => byte,
    }
}

pub fn ascii_to_petscii(byte: u8) -> u8 {
    match byte {
        b'A'..=b'Z' => byte,
        _ => byte,
    }
}

/// Decode a 16-byte PETSCII filename field, stopping at the first `0xA0` pad byte.
pub fn decode_filename(field: &[u8]) -> Vec<u8> {
    let end = field.iter().position(|&b| b == 0xA0).unwrap_or(field.len());
    field[..end].iter().map(|&b| petscii_to_ascii(b)).collect()
}

/// Encode a name into a fixed 16-byte PETSCII field, padded with `0xA0`.
pub fn encode_filename(name: &[u8]) -> [u8; 16] {
    let mut field = [0xA0u8; 16];
    for (dst, &src) in field.iter_mut().zip(name.iter().take(16)) {
        *dst = ascii_to_petscii(src);
    }
    field
}

/// The Block Availability Map (spec §3 `BAM`), parsed from the track 18/sector 0 image. Wraps a
/// copy of the raw bytes rather than borrowing, so mutation (`allocate`/`free`) can be written back
/// to the [`DiskImage`] by the write-transaction engine without holding a long-lived borrow.
pub struct Bam {
    bytes: [u8; DIR_SECTOR_SIZE],
}

impl Bam {
    pub fn from_sector(bytes: &[u8]) -> Result<Self, DiskImageError> {
        if bytes.len() != DIR_SECTOR_SIZE {
            return Err(DiskImageError::Format);
        }
        let mut owned = [0u8; DIR_SECTOR_SIZE];
        owned.copy_from_slice(bytes);
        Ok(Self { bytes: owned })
    }

    pub fn first_directory_track(&self) -> u8 {
        self.bytes[0]
    }

    pub fn first_directory_sector(&self) -> u8 {
        self.bytes[1]
    }

    pub fn dos_version(&self) -> u8 {
        self.bytes[2]
    }

    fn entry_offset(track: u16) -> Option<usize> {
        if track == 0 || track > BAM_MAX_TRACK {
            return None;
        }
        Some(BAM_ENTRY_BASE + (track as usize - 1) * 4)
    }

    pub fn free_count_for_track(&self, track: u16) -> Option<u8> {
        Self::entry_offset(track).map(|off| self.bytes[off])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl AllocationBitmap for Bam {
    fn is_free(&self, track: u16, sector: u8) -> bool {
        let Some(off) = Self::entry_offset(track) else {
            return false;
        };
        if sector as usize >= 24 {
            return false;
        }
        let byte_index = off + 1 + (sector as usize / 8);
        let bit_index = sector % 8;
        (self.bytes[byte_index] >> bit_index) & 1 == 1
    }

    fn set_free(&mut self, track: u16, sector: u8, free: bool) -> Result<(), DiskImageError> {
        let off = Self::entry_offset(track).ok_or(DiskImageError::OutOfBounds)?;
        if sector as usize >= 24 {
            return Err(DiskImageError::OutOfBounds);
        }
        let byte_index = off + 1 + (sector as usize / 8);
        let bit_index = sector % 8;
        let was_free = (self.bytes[byte_index] >> bit_index) & 1 == 1;
        if free {
            self.bytes[byte_index] |= 1 << bit_index;
        } else {
            self.bytes[byte_index] &= !(1 << bit_index);
        }
        match (was_free, free) {
            (false, true) => self.bytes[off] += 1,
            (true, false) => self.bytes[off] = self.bytes[off].saturating_sub(1),
            _ => {}
        }
        Ok(())
    }

    fn free_count(&self) -> usize {
        (1..=BAM_MAX_TRACK)
            .filter_map(|t| self.free_count_for_track(t))
            .map(|c| c as usize)
            .sum()
    }
}

/// Read the BAM out of `image`'s track 18/sector 0.
pub fn read_bam(image: &DiskImage) -> Result<Bam, DiskImageError> {
    let sector = image.read_sector(BAM_TRACK, 0, BAM_SECTOR)?;
    Bam::from_sector(&sector.payload)
}

fn decode_slot(slot: &[u8]) -> Option<DirectoryEntry> {
    let type_byte = slot[0x02];
    if type_byte == 0x00 {
        return None; // never-used slot
    }
    let ftype = match type_byte & 0x0F {
        0 => FileType::Deleted,
        1 => FileType::Sequential,
        2 => FileType::Program,
        3 => FileType::User,
        4 => FileType::Relative,
        _ => FileType::Sequential,
    };
    let flags = EntryFlags {
        locked: type_byte & 0x40 != 0,
        closed: type_byte & 0x80 != 0,
        system: false,
        protected: false,
    };
    let name = decode_filename(&slot[0x05..0x15]);
    let size_blocks = u16::from_le_bytes([slot[0x1E], slot[0x1F]]);
    Some(DirectoryEntry {
        name,
        ftype,
        first_location: Locator {
            track: slot[0x03] as u16,
            sector: slot[0x04],
        },
        size_blocks,
        flags,
        timestamp: None,
    })
}

/// Enumerate the directory chain starting from the BAM's declared first directory sector (spec
/// §4.G). Returns whatever entries were collected before a chain anomaly, plus the anomaly flag if
/// one occurred.
pub fn read_directory(image: &DiskImage) -> Result<(Vec<DirectoryEntry>, ChainOutcome), DiskImageError> {
    let bam = read_bam(image)?;
    let start = (bam.first_directory_track() as u16, bam.first_directory_sector());

    let (sector_payloads, outcome) = walk_chain(start, |(track, sector)| {
        let sector_rec = image.read_sector(track, 0, sector).map_err(|_| DiskImageError::ChainBroken)?;
        let payload = &sector_rec.payload;
        if payload.len() != DIR_SECTOR_SIZE {
            return Err(DiskImageError::ChainBroken);
        }
        let next_track = payload[0];
        let next = if next_track == 0 {
            None
        } else {
            Some((next_track as u16, payload[1]))
        };
        Ok((payload.clone(), next))
    });

    let mut entries = Vec::new();
    for payload in sector_payloads.iter() {
        for slot_index in 0..SLOTS_PER_SECTOR {
            let slot_start = slot_index * SLOT_SIZE;
            if let Some(entry) = decode_slot(&payload[slot_start..slot_start + SLOT_SIZE]) {
                entries.push(entry);
            }
        }
    }
    Ok((entries, outcome))
}

/// Read a file's full byte content by following its data chain from `first_location` (spec
/// §4.G "File read"). The last sector's low link byte (when the high byte/track is zero) gives the
/// count of valid bytes in that sector, truncating the tail.
pub fn read_file(image: &DiskImage, first_location: Locator) -> Result<(Vec<u8>, ChainOutcome), DiskImageError> {
    let start = (first_location.track, first_location.sector);
    let (chunks, outcome): (Vec<(Vec<u8>, bool, u8)>, ChainOutcome) = walk_chain(start, |(track, sector)| {
        let sector_rec = image.read_sector(track, 0, sector).map_err(|_| DiskImageError::ChainBroken)?;
        let payload = &sector_rec.payload;
        if payload.len() < 2 {
            return Err(DiskImageError::ChainBroken);
        }
        let next_track = payload[0];
        let next_sector = payload[1];
        let is_last = next_track == 0;
        let next = if is_last { None } else { Some((next_track as u16, next_sector)) };
        Ok(((payload[2..].to_vec(), is_last, next_sector), next))
    });

    let mut data = Vec::new();
    let last_index = chunks.len().saturating_sub(1);
    for (i, (chunk, is_last, used_bytes)) in chunks.into_iter().enumerate() {
        if i == last_index && is_last {
            // used_bytes counts from the start of the 254-byte data area inclusive; 0 or 1 means
            // "no data bytes used" per the T/S link convention (low byte holds count, not offset).
            let count = (used_bytes as usize).saturating_sub(1).min(chunk.len());
            data.extend_from_slice(&chunk[..count]);
        } else {
            data.extend_from_slice(&chunk);
        }
    }
    Ok((data, outcome))
}

/// Allocation query/mutate validating that the per-track free-count byte tracks the bitmap bytes
/// (spec §8 property 6); exposed for the write-transaction engine's `FormatTrack`/`EraseTrack` ops.
pub fn allocate(bam: &mut Bam, track: u16, sector: u8) -> Result<(), DiskImageError> {
    bam.set_free(track, sector, false)
}

pub fn free(bam: &mut Bam, track: u16, sector: u8) -> Result<(), DiskImageError> {
    bam.set_free(track, sector, true)
}

/// Find a free directory slot (file-type byte `0x00` or `0xFF`) across the enumerated directory
/// sectors, for a directory-mutate write (spec §4.G).
pub fn find_free_slot(directory_sectors: &[Vec<u8>]) -> Option<(usize, usize)> {
    for (sector_index, payload) in directory_sectors.iter().enumerate() {
        for slot_index in 0..SLOTS_PER_SECTOR {
            let type_byte = payload[slot_index * SLOT_SIZE + 0x02];
            if type_byte == 0x00 || type_byte == 0xFF {
                return Some((sector_index, slot_index));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chs::{DiskChsn, Geometry, SectorsPerTrack, ZONE_MAP_1541};
    use crate::containers::{DiskTrack, SectorFlags, Variant};
    use crate::DiskDataEncoding;

    fn blank_sector(track: u16, next_track: u8, next_sector: u8) -> Vec<u8> {
        let mut data = vec![0u8; DIR_SECTOR_SIZE];
        data[0] = next_track;
        data[1] = next_sector;
        let _ = track;
        data
    }

    fn build_image_with_bam_and_one_entry() -> DiskImage {
        let geometry = Geometry {
            cylinders: 43,
            heads: 1,
            sectors_per_track: SectorsPerTrack::Zoned(ZONE_MAP_1541),
            sector_size: 256,
            one_indexed_tracks: true,
        };
        let mut image = DiskImage::new(Variant::D64, geometry);

        let mut bam_bytes = vec![0u8; DIR_SECTOR_SIZE];
        bam_bytes[0] = 18;
        bam_bytes[1] = 1;
        bam_bytes[2] = 0x41;
        // mark track 1 fully free (21 sectors -> 3 bytes of bits, count 21)
        bam_bytes[BAM_ENTRY_BASE] = 21;
        bam_bytes[BAM_ENTRY_BASE + 1] = 0xFF;
        bam_bytes[BAM_ENTRY_BASE + 2] = 0xFF;
        bam_bytes[BAM_ENTRY_BASE + 3] = 0x1F;
        // track 18 fully allocated (free count 0, all bits 0)
        let t18_off = Bam::entry_offset(18).unwrap();
        bam_bytes[t18_off] = 0;

        let mut dir_sector = blank_sector(18, 0, 0);
        let slot = encode_filename(b"HELLO");
        dir_sector[0x02] = 0x82; // closed + PRG
        dir_sector[0x03] = 1;
        dir_sector[0x04] = 0;
        dir_sector[0x05..0x15].copy_from_slice(&slot);
        dir_sector[0x1E] = 3;
        dir_sector[0x1F] = 0;

        let mut bam_track = DiskTrack::new(DiskDataEncoding::Gcr);
        bam_track.sectors.push(
            crate::containers::Sector::new(DiskChsn::new(18, 0, 0, 1), bam_bytes, SectorFlags::default(), 0).unwrap(),
        );
        bam_track.sectors.push(
            crate::containers::Sector::new(DiskChsn::new(18, 0, 1, 1), dir_sector, SectorFlags::default(), 0)
                .unwrap(),
        );
        image.set_track(18, 0, bam_track).unwrap();
        image
    }

    #[test]
    fn bam_reports_track_18_sector_0_as_allocated() {
        let image = build_image_with_bam_and_one_entry();
        let bam = read_bam(&image).unwrap();
        assert!(!bam.is_free(18, 0));
    }

    #[test]
    fn directory_enumeration_finds_the_single_entry() {
        let image = build_image_with_bam_and_one_entry();
        let (entries, outcome) = read_directory(&image).unwrap();
        assert_eq!(outcome, ChainOutcome::Complete);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, b"HELLO");
        assert_eq!(entries[0].ftype, FileType::Program);
        assert!(entries[0].flags.closed);
    }

    #[test]
    fn free_count_reflects_bam_bytes() {
        let image = build_image_with_bam_and_one_entry();
        let bam = read_bam(&image).unwrap();
        assert_eq!(bam.free_count(), 21);
    }

    #[test]
    fn filename_decode_stops_at_pad_byte() {
        let field = encode_filename(b"AB");
        assert_eq!(decode_filename(&field), b"AB");
    }
}

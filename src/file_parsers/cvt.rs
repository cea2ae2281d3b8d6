/*
    src/file_parsers/cvt.rs

    CVT ("convert") TI-99 cassette/disk-transfer wrapper parser (spec §4.C): a thin envelope around a
    TI-99 sector image, used by PC83/TIImageTool-family transfer tools. The spec describes the format
    only in prose ("a small fixed wrapper, a directory, and an info block") without pinning exact
    byte offsets; this module's layout (below) is this crate's own self-consistent implementation of
    that description, not a byte-for-byte match to any single upstream tool, and is documented as
    such rather than sourced from a known-good reference.

    Layout:
      offset 0..26   : wrapper  (magic `b"CV"`, version u8, sector_count u16 LE, reserved)
      offset 26..30  : directory_len u32 LE (bytes of directory/info block that follow)
      offset 30..30+directory_len : opaque directory + info block, kept verbatim in metadata
      offset 30+directory_len ..  : raw 256-byte TI-99 sectors, sequential
*/
use crate::chs::{DiskChsn, Geometry, SectorsPerTrack};
use crate::containers::{DiskImage, DiskTrack, Sector, SectorFlags, Variant};
use crate::io::cursor::ByteCursor;
use crate::{checked_add, DiskDataEncoding, DiskImageError};

const WRAPPER_LEN: usize = 30;
const MAGIC: &[u8; 2] = b"CV";
const SECTOR_SIZE: usize = 256;

pub fn probe(bytes: &[u8]) -> Option<u8> {
    if bytes.len() >= WRAPPER_LEN && &bytes[0..2] == MAGIC {
        Some(85)
    } else {
        None
    }
}

pub fn parse(bytes: &[u8]) -> Result<DiskImage, DiskImageError> {
    let cursor = ByteCursor::new(bytes);
    if cursor.len() < WRAPPER_LEN || cursor.read_bytes(0, 2)? != MAGIC {
        return Err(DiskImageError::Format);
    }
    let version = cursor.read_u8(2)?;
    let sector_count = cursor.read_u16_le(3)? as u16;
    let directory_len = cursor.read_u32_le(26)? as usize;

    let directory_off = WRAPPER_LEN;
    let directory = cursor.read_bytes(directory_off, directory_len)?.to_vec();
    let data_off = checked_add(directory_off, directory_len)?;

    const SECTORS_PER_TRACK: u8 = 9;
    let tracks = (sector_count as usize).div_ceil(SECTORS_PER_TRACK as usize).max(1) as u16;
    let geometry = Geometry {
        cylinders: tracks,
        heads: 1,
        sectors_per_track: SectorsPerTrack::Uniform(SECTORS_PER_TRACK),
        sector_size: SECTOR_SIZE as u16,
        one_indexed_tracks: false,
    };
    let mut image = DiskImage::new(Variant::Cvt, geometry);
    image.metadata.insert("version".to_string(), version.to_string());
    image.metadata.insert("directory_hex".to_string(), hex_encode(&directory));

    let mut remaining = sector_count as usize;
    let mut offset = data_off;
    for cyl in 0..tracks {
        let mut track = DiskTrack::new(DiskDataEncoding::Fm);
        let spt = remaining.min(SECTORS_PER_TRACK as usize);
        for sector in 0..spt as u8 {
            let end = checked_add(offset, SECTOR_SIZE)?;
            let payload = cursor.read_bytes(offset, SECTOR_SIZE)?.to_vec();
            offset = end;
            let id = DiskChsn::new(cyl, 0, sector, DiskChsn::bytes_to_n(SECTOR_SIZE));
            track.sectors.push(Sector::new(id, payload, SectorFlags::default(), 0)?);
        }
        image.set_track(cyl, 0, track)?;
        remaining -= spt;
    }

    image.mark_clean();
    Ok(image)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_cvt(directory: &[u8], sectors: &[[u8; SECTOR_SIZE]]) -> Vec<u8> {
        let mut bytes = vec![0u8; WRAPPER_LEN];
        bytes[0..2].copy_from_slice(MAGIC);
        bytes[2] = 1; // version
        bytes[3..5].copy_from_slice(&(sectors.len() as u16).to_le_bytes());
        bytes[26..30].copy_from_slice(&(directory.len() as u32).to_le_bytes());
        bytes.extend_from_slice(directory);
        for sector in sectors {
            bytes.extend_from_slice(sector);
        }
        bytes
    }

    #[test]
    fn probe_requires_magic() {
        let bytes = build_cvt(b"dir", &[[0u8; SECTOR_SIZE]]);
        assert_eq!(probe(&bytes), Some(85));
        assert!(probe(&[0u8; 40]).is_none());
    }

    #[test]
    fn parse_recovers_sectors_and_directory() {
        let mut sector = [0u8; SECTOR_SIZE];
        sector[0] = 0x42;
        let bytes = build_cvt(b"info", &[sector]);
        let image = parse(&bytes).unwrap();
        assert_eq!(image.geometry.cylinders, 1);
        let s = image.read_sector(0, 0, 0).unwrap();
        assert_eq!(s.payload[0], 0x42);
        assert_eq!(image.metadata.get("directory_hex").unwrap(), &hex_encode(b"info"));
    }

    #[test]
    fn checked_and_malformed_out_of_bounds() {
        let mut bytes = build_cvt(b"x", &[[0u8; SECTOR_SIZE]]);
        bytes.truncate(bytes.len() - 10); // chop off the tail of the last sector
        assert!(matches!(parse(&bytes), Err(DiskImageError::OutOfBounds)));
    }
}

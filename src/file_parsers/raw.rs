/*
    src/file_parsers/raw.rs

    Raw/IMG sector-image parser (SPEC_FULL §4.C addition): a header-less dump of fixed-size sectors
    whose geometry is recovered purely from the file's byte length via [`StandardFormat`]. Grounded
    on the teacher's `file_parsers/raw.rs`.
*/
use crate::chs::DiskChsn;
use crate::containers::{DiskImage, DiskTrack, Sector, SectorFlags, Variant};
use crate::io::cursor::ByteCursor;
use crate::standard_format::StandardFormat;
use crate::DiskImageError;

/// A raw image is recognized purely by size; a match is always `Some(80)` for an exact table hit.
/// There is no slack tier here (unlike D64) since the raw format carries no self-describing fields
/// to corroborate a near-miss length.
pub fn probe(bytes: &[u8]) -> Option<u8> {
    match StandardFormat::from(bytes.len()) {
        StandardFormat::Invalid => None,
        _ => Some(80),
    }
}

pub fn parse(bytes: &[u8]) -> Result<DiskImage, DiskImageError> {
    let format = StandardFormat::from(bytes.len());
    if format == StandardFormat::Invalid {
        return Err(DiskImageError::UnknownFormat);
    }
    let geometry = format.geometry();
    let cursor = ByteCursor::new(bytes);
    let mut image = DiskImage::new(Variant::Raw, geometry.clone());

    let mut offset = 0usize;
    let n = DiskChsn::bytes_to_n(geometry.sector_size as usize);
    for cyl in 0..geometry.cylinders {
        for head in 0..geometry.heads {
            let spt = geometry.sectors_in_track(cyl).ok_or(DiskImageError::Format)?;
            let mut track = DiskTrack::new(format.get_encoding());
            for sector in 0..spt {
                let payload = cursor.read_bytes(offset, geometry.sector_size as usize)?.to_vec();
                offset = crate::checked_add(offset, geometry.sector_size as usize)?;
                let id = DiskChsn::new(cyl, head, sector, n);
                track.sectors.push(Sector::new(id, payload, SectorFlags::default(), 0)?);
            }
            image.set_track(cyl, head, track)?;
        }
    }
    image.mark_clean();
    Ok(image)
}

pub fn write(image: &DiskImage) -> Result<Vec<u8>, DiskImageError> {
    let geometry = &image.geometry;
    let mut out = Vec::with_capacity(geometry.cylinders as usize * geometry.heads as usize * geometry.sector_size as usize);
    for cyl in 0..geometry.cylinders {
        for head in 0..geometry.heads {
            let track = image.track(cyl, head).ok_or(DiskImageError::Format)?;
            let spt = geometry.sectors_in_track(cyl).ok_or(DiskImageError::Format)?;
            for sector in 0..spt {
                let s = track.sector(sector).ok_or(DiskImageError::Format)?;
                out.extend_from_slice(&s.payload);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_then_write_round_trips_a_1440k_image() {
        let mut bytes = vec![0u8; StandardFormat::PcFloppy1440.size()];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let image = parse(&bytes).unwrap();
        assert_eq!(image.variant, Variant::Raw);
        let out = write(&image).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn unrecognized_length_fails_to_parse() {
        assert!(matches!(parse(&[0u8; 13]), Err(DiskImageError::UnknownFormat)));
    }
}

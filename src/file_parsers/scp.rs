/*
    src/file_parsers/scp.rs

    SCP flux-capture container parser (spec §4.C "reference example, because it is the adversarial-
    input worst case"): a 3-byte-magic header, a 168-entry track-offset table (packed into the
    header or, under the extended-offset flag, relocated to 0x80), and per-track `TRK` blocks of
    big-endian 16-bit flux-delta words. Every offset/length pair that touches track data is run
    through a checked add before use (spec §4.A, §8 property 8); revolution and per-revolution word
    counts are capped before any allocation is sized by them (spec §7 `LimitExceeded`).
*/
use crate::chs::{Geometry, SectorsPerTrack};
use crate::containers::{DiskImage, DiskTrack, Variant};
use crate::flux::{check_revolution_count, ticks_to_ns, FluxRevolution};
use crate::io::cursor::ByteCursor;
use crate::{checked_add, checked_mul, DiskDataEncoding, DiskImageError, MAX_FLUX_PER_REVOLUTION};

const MAGIC: &[u8; 3] = b"SCP";
const HEADER_LEN: usize = 0x10 + 168 * 4;
const TRACK_TABLE_OFF: usize = 0x10;
const EXTENDED_TABLE_OFF: usize = 0x80;
/// Flag bit 6 of the header's flags byte: extended-offset mode (spec §4.C).
const FLAG_EXTENDED_OFFSET: u8 = 1 << 6;
const MAX_DATA_LENGTH_WORDS: u32 = 500_000;

#[derive(Clone, Copy)]
struct Header {
    revolutions: u8,
    start_track: u8,
    end_track: u8,
    flags: u8,
    resolution: u8,
    heads: u8,
}

fn read_header(cursor: &ByteCursor) -> Result<Header, DiskImageError> {
    if cursor.len() < HEADER_LEN || cursor.read_bytes(0, 3)? != MAGIC {
        return Err(DiskImageError::Format);
    }
    let revolutions = cursor.read_u8(5)?;
    let start_track = cursor.read_u8(6)?;
    let end_track = cursor.read_u8(7)?;
    let flags = cursor.read_u8(8)?;
    let resolution = cursor.read_u8(10)?;
    let heads = cursor.read_u8(11)?;
    check_revolution_count(revolutions)?;
    Ok(Header {
        revolutions,
        start_track,
        end_track,
        flags,
        resolution,
        heads,
    })
}

pub fn probe(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < HEADER_LEN || &bytes[0..3] != MAGIC {
        return None;
    }
    let cursor = ByteCursor::new(bytes);
    match read_header(&cursor) {
        Ok(_) => Some(95),
        Err(_) => Some(40), // magic matched but header is internally inconsistent
    }
}

/// Resolve the absolute offset of the 168-entry track-offset table, per the extended-offset flag.
fn track_table_offset(header: &Header) -> usize {
    if header.flags & FLAG_EXTENDED_OFFSET != 0 {
        EXTENDED_TABLE_OFF
    } else {
        TRACK_TABLE_OFF
    }
}

pub fn parse(bytes: &[u8]) -> Result<DiskImage, DiskImageError> {
    let cursor = ByteCursor::new(bytes);
    let header = read_header(&cursor)?;
    let table_off = track_table_offset(&header);

    let num_tracks = header.end_track.saturating_sub(header.start_track) as u16 + 1;
    let heads = if header.heads == 0 { 2 } else { 1 };
    let geometry = Geometry {
        cylinders: num_tracks,
        heads,
        sectors_per_track: SectorsPerTrack::Uniform(0),
        sector_size: 0,
        one_indexed_tracks: false,
    };
    let mut image = DiskImage::new(Variant::Scp, geometry);
    image.metadata.insert("resolution".to_string(), header.resolution.to_string());
    image.metadata.insert("flags".to_string(), header.flags.to_string());

    for physical_track in header.start_track..=header.end_track {
        let entry_off = checked_add(table_off, checked_mul(physical_track as usize, 4)?)?;
        let track_offset = cursor.read_u32_le(entry_off)? as usize;
        if track_offset == 0 {
            continue; // unused track slot
        }
        if cursor.read_bytes(track_offset, 4)? != b"TRK" {
            return Err(DiskImageError::Format);
        }
        // "TRK" is only 3 bytes; the 4th header byte is the physical track number, re-verified.
        if cursor.read_u8(checked_add(track_offset, 3)?)? != physical_track {
            return Err(DiskImageError::Format);
        }

        let (cyl, head) = (physical_track as u16 / heads as u16, physical_track % heads);
        let mut track = DiskTrack::new(DiskDataEncoding::Mfm);

        for rev in 0..header.revolutions {
            let desc_off = checked_add(track_offset, checked_add(4, checked_mul(rev as usize, 12)?)?)?;
            let duration_ticks = cursor.read_u32_le(desc_off)?;
            let data_length_words = cursor.read_u32_le(checked_add(desc_off, 4)?)?;
            let data_offset_rel = cursor.read_u32_le(checked_add(desc_off, 8)?)? as usize;

            if data_length_words > MAX_DATA_LENGTH_WORDS {
                return Err(DiskImageError::LimitExceeded("SCP revolution flux word count"));
            }
            let data_offset = checked_add(track_offset, data_offset_rel)?;
            let data_len_bytes = checked_mul(data_length_words as usize, 2)?;
            let end = checked_add(data_offset, data_len_bytes)?;
            if end > cursor.len() {
                return Err(DiskImageError::OutOfBounds);
            }
            let words = cursor.read_bytes(data_offset, data_len_bytes)?;

            let mut transitions_ns = Vec::with_capacity(data_length_words as usize);
            let mut accumulator: u32 = 0;
            for chunk in words.chunks_exact(2) {
                let word = u16::from_be_bytes([chunk[0], chunk[1]]);
                if word == 0x0000 {
                    accumulator = accumulator.saturating_add(0x10000);
                    continue;
                }
                let ticks = accumulator.saturating_add(word as u32);
                accumulator = 0;
                transitions_ns.push(ticks_to_ns(ticks, header.resolution)?);
                if transitions_ns.len() > MAX_FLUX_PER_REVOLUTION {
                    return Err(DiskImageError::LimitExceeded("flux transitions per revolution"));
                }
            }
            let index_period_ns = ticks_to_ns(duration_ticks, header.resolution)?;
            track.add_revolution(FluxRevolution::new(transitions_ns, index_period_ns)?)?;
        }

        image.set_track(cyl, head, track)?;
    }

    image.mark_clean();
    Ok(image)
}

/// Encode a single [`FluxRevolution`] back into the SCP wire grammar (big-endian 16-bit words,
/// `0x0000` overflow markers every 0x10000 ticks). Used both by the file-backed flux source's
/// write-back capability (spec §4.D ADDED) and by this writer's per-track serialization.
pub fn encode_flux(revolution: &FluxRevolution, resolution: u8) -> Result<Vec<u8>, DiskImageError> {
    let divisor = 25u32 * (resolution as u32 + 1);
    let mut out = Vec::new();
    for &ns in &revolution.transitions_ns {
        let mut ticks = ns / divisor.max(1);
        while ticks > 0xFFFF {
            out.extend_from_slice(&0x0000u16.to_be_bytes());
            ticks -= 0x10000;
        }
        out.extend_from_slice(&(ticks as u16).to_be_bytes());
    }
    Ok(out)
}

pub fn write(image: &DiskImage) -> Result<Vec<u8>, DiskImageError> {
    let resolution: u8 = image
        .metadata
        .get("resolution")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let heads = image.geometry.heads.max(1);
    let start_track = 0u8;
    let end_track = (image.geometry.cylinders as usize * heads as usize)
        .saturating_sub(1)
        .min(u8::MAX as usize) as u8;

    let mut header = vec![0u8; HEADER_LEN];
    header[0..3].copy_from_slice(MAGIC);
    header[3] = 0x19; // version byte, arbitrary
    header[6] = start_track;
    header[7] = end_track;
    header[8] = if let Some(flags) = image.metadata.get("flags") {
        flags.parse().unwrap_or(0)
    } else {
        0
    };
    header[10] = resolution;
    header[11] = heads.min(1); // heads field: 0 = double-sided, 1 = single-sided

    let mut body = Vec::new();
    let mut max_revs = 0u8;
    let mut track_blocks: Vec<(u8, Vec<u8>)> = Vec::new();

    for physical_track in start_track..=end_track {
        let cyl = physical_track as u16 / heads as u16;
        let head = physical_track % heads;
        let Some(track) = image.track(cyl, head) else { continue };
        if track.revolutions.is_empty() {
            continue;
        }
        max_revs = max_revs.max(track.revolutions.len() as u8);

        let mut block = Vec::new();
        block.extend_from_slice(b"TRK");
        block.push(physical_track);
        let descriptor_table_len = track.revolutions.len() * 12;
        let mut descriptors = vec![0u8; descriptor_table_len];
        let mut data = Vec::new();
        for (i, rev) in track.revolutions.iter().enumerate() {
            let words = encode_flux(rev, resolution)?;
            let rel_offset = 4 + descriptor_table_len + data.len();
            let duration_ticks = rev.index_period_ns / (25 * (resolution as u32 + 1)).max(1);
            let desc_off = i * 12;
            descriptors[desc_off..desc_off + 4].copy_from_slice(&duration_ticks.to_le_bytes());
            descriptors[desc_off + 4..desc_off + 8].copy_from_slice(&((words.len() / 2) as u32).to_le_bytes());
            descriptors[desc_off + 8..desc_off + 12].copy_from_slice(&(rel_offset as u32).to_le_bytes());
            data.extend_from_slice(&words);
        }
        block.extend_from_slice(&descriptors);
        block.extend_from_slice(&data);
        track_blocks.push((physical_track, block));
    }
    header[5] = max_revs;

    let mut offset = HEADER_LEN;
    for (physical_track, block) in &track_blocks {
        let entry_off = TRACK_TABLE_OFF + *physical_track as usize * 4;
        header[entry_off..entry_off + 4].copy_from_slice(&(offset as u32).to_le_bytes());
        offset = checked_add(offset, block.len())?;
        body.extend_from_slice(block);
    }

    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_single_track_scp(transitions_ns: &[u32], resolution: u8) -> Vec<u8> {
        let rev = FluxRevolution::new(transitions_ns.to_vec(), 200_000_000).unwrap();
        let words = encode_flux(&rev, resolution).unwrap();

        let mut header = vec![0u8; HEADER_LEN];
        header[0..3].copy_from_slice(MAGIC);
        header[5] = 1; // 1 revolution
        header[6] = 0; // start track
        header[7] = 0; // end track
        header[10] = resolution;
        header[11] = 1; // single-sided

        let track_offset = HEADER_LEN;
        header[TRACK_TABLE_OFF..TRACK_TABLE_OFF + 4].copy_from_slice(&(track_offset as u32).to_le_bytes());

        let mut block = Vec::new();
        block.extend_from_slice(b"TRK");
        block.push(0);
        let duration_ticks = rev.index_period_ns / (25 * (resolution as u32 + 1));
        block.extend_from_slice(&duration_ticks.to_le_bytes());
        block.extend_from_slice(&((words.len() / 2) as u32).to_le_bytes());
        block.extend_from_slice(&(16u32).to_le_bytes()); // rel offset: 4 (TRK+track) + 12 (one descriptor)
        block.extend_from_slice(&words);

        let mut out = header;
        out.extend_from_slice(&block);
        out
    }

    #[test]
    fn probe_recognizes_magic() {
        let bytes = build_single_track_scp(&[4000; 10], 0);
        assert_eq!(probe(&bytes), Some(95));
        assert!(probe(b"not an scp file at all, too short").is_none());
    }

    #[test]
    fn rejects_too_many_revolutions() {
        let mut bytes = build_single_track_scp(&[4000; 4], 0);
        bytes[5] = 33; // num_revs
        assert!(matches!(parse(&bytes), Err(DiskImageError::LimitExceeded(_))));
    }

    #[test]
    fn decodes_uniform_flux_transitions() {
        // spec §8 scenario 2: SCP with 1 track, 1 revolution, 10 flux transitions at 4000 ns, res 0.
        let bytes = build_single_track_scp(&[4000; 10], 0);
        let image = parse(&bytes).unwrap();
        let track = image.track(0, 0).unwrap();
        assert_eq!(track.revolutions.len(), 1);
        assert_eq!(track.revolutions[0].transitions_ns, vec![4000; 10]);
    }

    #[test]
    fn overflow_marker_accumulates_across_zero_words() {
        // A delta just over one 16-bit word's worth of ticks at res 0: 70000 ticks -> 0x10000 marker
        // plus a 0x1170 remainder word.
        let mut header = vec![0u8; HEADER_LEN];
        header[0..3].copy_from_slice(MAGIC);
        header[5] = 1;
        header[6] = 0;
        header[7] = 0;
        header[10] = 0;
        header[11] = 1;
        let track_offset = HEADER_LEN;
        header[TRACK_TABLE_OFF..TRACK_TABLE_OFF + 4].copy_from_slice(&(track_offset as u32).to_le_bytes());

        let mut block = Vec::new();
        block.extend_from_slice(b"TRK");
        block.push(0);
        block.extend_from_slice(&0u32.to_le_bytes()); // duration (unused by this assertion)
        block.extend_from_slice(&2u32.to_le_bytes()); // 2 words
        block.extend_from_slice(&16u32.to_le_bytes());
        block.extend_from_slice(&0x0000u16.to_be_bytes());
        block.extend_from_slice(&0x1170u16.to_be_bytes());

        let mut bytes = header;
        bytes.extend_from_slice(&block);
        let image = parse(&bytes).unwrap();
        let rev = &image.track(0, 0).unwrap().revolutions[0];
        assert_eq!(rev.transitions_ns.len(), 1);
        assert_eq!(rev.transitions_ns[0], ticks_to_ns(0x10000 + 0x1170, 0).unwrap());
    }

    #[test]
    fn data_offset_overflow_is_rejected() {
        let mut bytes = build_single_track_scp(&[4000; 4], 0);
        // Corrupt the data_length_words field of the single revolution descriptor to claim far more
        // words than fit in the file.
        let desc_off = HEADER_LEN + 4;
        bytes[desc_off + 4..desc_off + 8].copy_from_slice(&(u32::MAX).to_le_bytes());
        assert!(matches!(
            parse(&bytes),
            Err(DiskImageError::LimitExceeded(_)) | Err(DiskImageError::OutOfBounds) | Err(DiskImageError::Overflow)
        ));
    }
}

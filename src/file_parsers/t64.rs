/*
    src/file_parsers/t64.rs

    T64 tape-image parser/writer (spec §4.C): a directory of fixed-size entries describing PRG blobs
    stored contiguously in the file. T64 entries have no sector framing, so each entry's payload is
    stored as one [`DiskTrack`]'s `raw_bitstream`, indexed by entry slot rather than cylinder/head
    (the same pattern used for SID and VSF, which are equally sector-less containers).
*/
use crate::chs::{Geometry, SectorsPerTrack};
use crate::containers::{DiskImage, DiskTrack, Variant};
use crate::io::cursor::ByteCursor;
use crate::{checked_add, checked_mul, DiskDataEncoding, DiskImageError};

const HEADER_LEN: usize = 64;
const ENTRY_LEN: usize = 32;
const USED_ENTRIES_OFF: usize = 36;
const TAPE_NAME_OFF: usize = 40;
const TAPE_NAME_LEN: usize = 24;

pub fn probe(bytes: &[u8]) -> Option<u8> {
    if bytes.len() >= HEADER_LEN && &bytes[0..3] == b"C64" {
        Some(90)
    } else {
        None
    }
}

pub fn parse(bytes: &[u8]) -> Result<DiskImage, DiskImageError> {
    let cursor = ByteCursor::new(bytes);
    if cursor.len() < HEADER_LEN || cursor.read_bytes(0, 3)? != b"C64" {
        return Err(DiskImageError::Format);
    }
    let used_entries = cursor.read_u16_le(USED_ENTRIES_OFF)? as u16;

    let geometry = Geometry {
        cylinders: used_entries.max(1),
        heads: 1,
        sectors_per_track: SectorsPerTrack::Uniform(0),
        sector_size: 0,
        one_indexed_tracks: false,
    };
    let mut image = DiskImage::new(Variant::T64, geometry);
    image
        .metadata
        .insert("tape_name".to_string(), decode_tape_name(cursor.read_bytes(TAPE_NAME_OFF, TAPE_NAME_LEN)?));

    for index in 0..used_entries {
        let entry_off = checked_add(HEADER_LEN, checked_mul(index as usize, ENTRY_LEN)?)?;
        let entry_type = cursor.read_u8(entry_off)?;
        if entry_type == 0 {
            continue; // free slot
        }
        let start_addr = cursor.read_u16_le(checked_add(entry_off, 2)?)?;
        let end_addr = cursor.read_u16_le(checked_add(entry_off, 4)?)?;
        let file_offset = cursor.read_u32_le(checked_add(entry_off, 8)?)? as usize;
        let name = cursor.read_bytes(checked_add(entry_off, 16)?, 16)?.to_vec();

        let len = (end_addr.saturating_sub(start_addr)) as usize;
        let payload = cursor.read_bytes(file_offset, len)?.to_vec();

        let mut track = DiskTrack::new(DiskDataEncoding::Fm);
        track.raw_bitstream = Some(payload);
        image.set_track(index, 0, track)?;
        image
            .metadata
            .insert(format!("entry_{index}_name"), decode_tape_name(&name));
        image
            .metadata
            .insert(format!("entry_{index}_load_address"), start_addr.to_string());
    }

    image.mark_clean();
    Ok(image)
}

pub fn write(image: &DiskImage) -> Result<Vec<u8>, DiskImageError> {
    let used_entries = image.geometry.cylinders;
    let mut header = vec![0x20u8; HEADER_LEN]; // space-pad the tape name region by default
    header[0..32].copy_from_slice(b"C64 tape image file\0\0\0\0\0\0\0\0\0\0\0\0\0");
    header[USED_ENTRIES_OFF..USED_ENTRIES_OFF + 2].copy_from_slice(&used_entries.to_le_bytes());
    if let Some(name) = image.metadata.get("tape_name") {
        let bytes = name.as_bytes();
        let n = bytes.len().min(TAPE_NAME_LEN);
        header[TAPE_NAME_OFF..TAPE_NAME_OFF + n].copy_from_slice(&bytes[..n]);
    }

    let mut entries = vec![0u8; used_entries as usize * ENTRY_LEN];
    let mut data = Vec::new();
    let mut file_offset = HEADER_LEN + entries.len();

    for index in 0..used_entries {
        let entry_off = index as usize * ENTRY_LEN;
        let Some(track) = image.track(index, 0) else { continue };
        let Some(payload) = track.raw_bitstream.as_deref() else { continue };

        let load_address: u16 = image
            .metadata
            .get(&format!("entry_{index}_load_address"))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0x0801);
        let end_address = load_address.wrapping_add(payload.len() as u16);

        entries[entry_off] = 1; // normal PRG entry
        entries[entry_off + 2..entry_off + 4].copy_from_slice(&load_address.to_le_bytes());
        entries[entry_off + 4..entry_off + 6].copy_from_slice(&end_address.to_le_bytes());
        entries[entry_off + 8..entry_off + 12].copy_from_slice(&(file_offset as u32).to_le_bytes());
        let name = image
            .metadata
            .get(&format!("entry_{index}_name"))
            .cloned()
            .unwrap_or_default();
        let name_bytes = name.as_bytes();
        let n = name_bytes.len().min(16);
        entries[entry_off + 16..entry_off + 16 + n].copy_from_slice(&name_bytes[..n]);
        for b in &mut entries[entry_off + 16 + n..entry_off + 32] {
            *b = 0x20;
        }

        data.extend_from_slice(payload);
        file_offset = checked_add(file_offset, payload.len())?;
    }

    let mut out = Vec::with_capacity(HEADER_LEN + entries.len() + data.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&entries);
    out.extend_from_slice(&data);
    Ok(out)
}

fn decode_tape_name(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b == 0 { ' ' } else { b as char })
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_single_entry_t64(name: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..3].copy_from_slice(b"C64");
        bytes[USED_ENTRIES_OFF..USED_ENTRIES_OFF + 2].copy_from_slice(&1u16.to_le_bytes());

        let mut entry = vec![0u8; ENTRY_LEN];
        entry[0] = 1;
        let start: u16 = 0x0801;
        let end = start + payload.len() as u16;
        entry[2..4].copy_from_slice(&start.to_le_bytes());
        entry[4..6].copy_from_slice(&end.to_le_bytes());
        entry[8..12].copy_from_slice(&((HEADER_LEN + ENTRY_LEN) as u32).to_le_bytes());
        let name_bytes = name.as_bytes();
        entry[16..16 + name_bytes.len()].copy_from_slice(name_bytes);
        for b in &mut entry[16 + name_bytes.len()..32] {
            *b = 0x20;
        }
        bytes.extend_from_slice(&entry);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn probe_requires_the_c64_magic() {
        let bytes = build_single_entry_t64("HELLO", &[1, 2, 3]);
        assert_eq!(probe(&bytes), Some(90));
        assert!(probe(&[0u8; 64]).is_none());
    }

    #[test]
    fn parse_recovers_entry_payload_and_name() {
        let bytes = build_single_entry_t64("HELLO", &[0xDE, 0xAD, 0xBE, 0xEF]);
        let image = parse(&bytes).unwrap();
        let track = image.track(0, 0).unwrap();
        assert_eq!(track.raw_bitstream.as_deref(), Some(&[0xDE, 0xAD, 0xBE, 0xEF][..]));
        assert_eq!(image.metadata.get("entry_0_name").unwrap(), "HELLO");
    }

    #[test]
    fn free_slots_are_skipped() {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..3].copy_from_slice(b"C64");
        bytes[USED_ENTRIES_OFF..USED_ENTRIES_OFF + 2].copy_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; ENTRY_LEN]); // entry_type 0 == free
        let image = parse(&bytes).unwrap();
        assert!(image.track(0, 0).is_none());
    }

    #[test]
    fn write_then_parse_round_trips_payload() {
        let bytes = build_single_entry_t64("ROUNDTRIP", &[9, 8, 7, 6, 5]);
        let image = parse(&bytes).unwrap();
        let out = write(&image).unwrap();
        let reparsed = parse(&out).unwrap();
        assert_eq!(
            reparsed.track(0, 0).unwrap().raw_bitstream,
            image.track(0, 0).unwrap().raw_bitstream
        );
    }
}

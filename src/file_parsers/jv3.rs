/*
    src/file_parsers/jv3.rs

    JV3 parser/writer (spec §4.C, §6): a 2901-byte header of 967 fixed `{track, sector, flags}`
    entries, no magic, detected purely structurally by replaying the header against the file's
    actual length. Sector data follows the header directly, in entry order, with no per-entry
    offset field — a parser must walk every preceding live entry to find where a given sector's
    bytes start, so the "is every offset bounds-checked before use" rule (spec §4.A, §8 property 8)
    applies to a running accumulator rather than a stored offset table.

    Spec §9 open question: the size-code mapping in the flags byte is `{00→256, 01→128, 10→1024,
    11→512}` — reordered relative to the `SectorId::n` convention used everywhere else in this
    crate. This mapping is taken verbatim from the spec and is deliberately not "fixed" to match
    the more common `n`-style ordering; [`flags_size_code_to_bytes`]/[`bytes_to_flags_size_code`]
    are the only places that encode it.

    Byte-exact round-trip (spec §8 property 1, "byte-for-byte equality... holds for D64, T64, SID,
    and JV3"): a real JV3 header's live entries are not necessarily sorted by track/head, and free
    (`0xFF`) slots may sit between live entries anywhere in the table. [`parse`] therefore records
    each entry's original slot position (including free slots) as `metadata["jv3_layout"]` and
    [`write`] replays that exact slot order — recomputing only the per-entry flags byte and payload
    bytes from the current [`Sector`] state — instead of compacting live entries to the front of a
    freshly rebuilt table. An image with no recorded layout (built by hand rather than parsed) falls
    back to the front-packed table [`write_front_packed`] always produced.
*/
use crate::chs::DiskChsn;
use crate::containers::{DiskImage, DiskTrack, Sector, SectorFlags, Variant};
use crate::io::cursor::ByteCursor;
use crate::{checked_add, checked_mul, DiskDataEncoding, DiskImageError};

const ENTRY_LEN: usize = 3;
const MAX_ENTRIES: usize = 967;
const HEADER_LEN: usize = ENTRY_LEN * MAX_ENTRIES; // 2901
/// Sentinel track value marking a free/unused header entry.
const FREE_TRACK: u8 = 0xFF;
/// Metadata key under which [`parse`] records the original per-slot entry layout, so [`write`] can
/// reproduce it exactly instead of compacting live entries to the front of the table.
const LAYOUT_KEY: &str = "jv3_layout";

const FLAG_DAM: u8 = 0x80; // deleted data address mark
const FLAG_DOUBLE_DENSITY: u8 = 0x40;
const FLAG_SIDE: u8 = 0x10;
const FLAG_ERROR: u8 = 0x08;
const FLAG_SIZE_MASK: u8 = 0x03;

/// The spec's reordered size-code mapping (§9 open question, resolved as "implement verbatim").
fn flags_size_code_to_bytes(code: u8) -> usize {
    match code & FLAG_SIZE_MASK {
        0b00 => 256,
        0b01 => 128,
        0b10 => 1024,
        0b11 => 512,
        _ => unreachable!("masked to 2 bits"),
    }
}

fn bytes_to_flags_size_code(size: usize) -> Result<u8, DiskImageError> {
    match size {
        256 => Ok(0b00),
        128 => Ok(0b01),
        1024 => Ok(0b10),
        512 => Ok(0b11),
        _ => Err(DiskImageError::Format),
    }
}

/// One header slot's original occupant: `(track, head, sector)`, or `None` for a free slot.
type Slot = Option<(u8, u8, u8)>;

/// Encode the per-slot layout as `;`-joined tokens (`"track:head:sector"` or empty for free),
/// always exactly [`MAX_ENTRIES`] tokens, for storage in [`DiskImage::metadata`].
fn encode_layout(slots: &[Slot]) -> String {
    slots
        .iter()
        .map(|slot| match slot {
            Some((t, h, s)) => format!("{}:{}:{}", t, h, s),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Inverse of [`encode_layout`]. Returns `None` if the string is malformed or the wrong length,
/// so a corrupted/foreign metadata value just falls back to [`write_front_packed`].
fn decode_layout(s: &str) -> Option<Vec<Slot>> {
    let mut slots = Vec::with_capacity(MAX_ENTRIES);
    for tok in s.split(';') {
        if tok.is_empty() {
            slots.push(None);
        } else {
            let mut parts = tok.split(':');
            let t: u8 = parts.next()?.parse().ok()?;
            let h: u8 = parts.next()?.parse().ok()?;
            let se: u8 = parts.next()?.parse().ok()?;
            if parts.next().is_some() {
                return None;
            }
            slots.push(Some((t, h, se)));
        }
    }
    (slots.len() == MAX_ENTRIES).then_some(slots)
}

/// Recompute an entry's flags byte from the current state of `sector` within `track`.
fn build_flags(track: &DiskTrack, sector: &Sector) -> Result<u8, DiskImageError> {
    let mut flags = bytes_to_flags_size_code(sector.payload.len())?;
    if sector.id.h() != 0 {
        flags |= FLAG_SIDE;
    }
    if track.encoding == DiskDataEncoding::Mfm {
        flags |= FLAG_DOUBLE_DENSITY;
    }
    if sector.flags.deleted {
        flags |= FLAG_DAM;
    }
    if sector.flags.crc_bad {
        flags |= FLAG_ERROR;
    }
    Ok(flags)
}

#[derive(Clone, Copy)]
struct RawEntry {
    track: u8,
    sector: u8,
    flags: u8,
}

fn read_entries(cursor: &ByteCursor) -> Result<Vec<RawEntry>, DiskImageError> {
    if cursor.len() < HEADER_LEN {
        return Err(DiskImageError::Format);
    }
    let mut entries = Vec::with_capacity(MAX_ENTRIES);
    for i in 0..MAX_ENTRIES {
        let off = checked_mul(i, ENTRY_LEN)?;
        entries.push(RawEntry {
            track: cursor.read_u8(off)?,
            sector: cursor.read_u8(checked_add(off, 1)?)?,
            flags: cursor.read_u8(checked_add(off, 2)?)?,
        });
    }
    Ok(entries)
}

/// Replay the header against the actual file length: sum the data length implied by every live
/// entry and compare against `bytes.len() - HEADER_LEN`. A structurally self-consistent file scores
/// high; a file that is merely long enough scores low (spec §4.C "probe... header self-consistency").
pub fn probe(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let cursor = ByteCursor::new(bytes);
    let entries = read_entries(&cursor).ok()?;
    let data_available = bytes.len() - HEADER_LEN;

    let mut implied_len = 0usize;
    let mut live_count = 0usize;
    for entry in &entries {
        if entry.track == FREE_TRACK {
            continue;
        }
        live_count += 1;
        implied_len = implied_len.checked_add(flags_size_code_to_bytes(entry.flags))?;
    }
    if live_count == 0 {
        return None;
    }
    if implied_len == data_available {
        Some(85)
    } else if implied_len <= data_available {
        Some(45) // trailing padding beyond the implied data; plausible but not exact
    } else {
        None // header claims more data than the file has: not a JV3
    }
}

pub fn parse(bytes: &[u8]) -> Result<DiskImage, DiskImageError> {
    let cursor = ByteCursor::new(bytes);
    let entries = read_entries(&cursor)?;

    let mut max_track: u16 = 0;
    for entry in &entries {
        if entry.track != FREE_TRACK {
            max_track = max_track.max(entry.track as u16);
        }
    }
    let geometry = crate::chs::Geometry {
        cylinders: max_track + 1,
        heads: 2,
        sectors_per_track: crate::chs::SectorsPerTrack::Uniform(0),
        sector_size: 0,
        one_indexed_tracks: false,
    };
    let mut image = DiskImage::new(Variant::Jv3, geometry);

    let mut layout: Vec<Slot> = Vec::with_capacity(MAX_ENTRIES);
    let mut data_offset = HEADER_LEN;
    for entry in &entries {
        if entry.track == FREE_TRACK {
            layout.push(None);
            continue;
        }
        let size = flags_size_code_to_bytes(entry.flags);
        let payload = cursor.read_bytes(data_offset, size)?.to_vec();
        data_offset = checked_add(data_offset, size)?;

        let head = if entry.flags & FLAG_SIDE != 0 { 1 } else { 0 };
        layout.push(Some((entry.track, head, entry.sector)));
        let encoding = if entry.flags & FLAG_DOUBLE_DENSITY != 0 {
            DiskDataEncoding::Mfm
        } else {
            DiskDataEncoding::Fm
        };
        let n = DiskChsn::bytes_to_n(size);
        let id = DiskChsn::new(entry.track as u16, head, entry.sector, n);
        let flags = SectorFlags {
            deleted: entry.flags & FLAG_DAM != 0,
            crc_bad: entry.flags & FLAG_ERROR != 0,
            weak: false,
        };
        let sector = Sector::new(id, payload, flags, 0)?;

        let track = image
            .tracks
            .entry((entry.track as u16, head))
            .or_insert_with(|| DiskTrack::new(encoding));
        track.sectors.push(sector);
    }

    image.metadata.insert(LAYOUT_KEY.to_string(), encode_layout(&layout));
    image.mark_clean();
    Ok(image)
}

/// Write `image` back to JV3 bytes. Replays the original slot layout recorded by [`parse`] when
/// present (spec §8 property 1's byte-exact round-trip requirement); otherwise falls back to
/// [`write_front_packed`].
pub fn write(image: &DiskImage) -> Result<Vec<u8>, DiskImageError> {
    match image.metadata.get(LAYOUT_KEY).and_then(|s| decode_layout(s)) {
        Some(layout) => write_with_layout(image, &layout),
        None => write_front_packed(image),
    }
}

/// Replay `layout`'s exact slot order: each recorded slot is re-resolved against the image's
/// current sectors (so edits to payload/flags since parsing are reflected), a slot whose sector was
/// removed reverts to free, and any sector not covered by the recorded layout (added since parsing)
/// is placed into the next free slot in table order.
fn write_with_layout(image: &DiskImage, layout: &[Slot]) -> Result<Vec<u8>, DiskImageError> {
    let mut slot_content: Vec<Option<(u8, u8, u8, Vec<u8>)>> = vec![None; MAX_ENTRIES];
    let mut consumed: std::collections::HashSet<(u16, u8, u8)> = std::collections::HashSet::new();

    for (i, slot) in layout.iter().enumerate() {
        if let Some((t, h, s)) = slot {
            if let Some(track) = image.track(*t as u16, *h) {
                if let Some(sector) = track.sector(*s) {
                    let flags = build_flags(track, sector)?;
                    slot_content[i] = Some((*t, *s, flags, sector.payload.clone()));
                    consumed.insert((*t as u16, *h, *s));
                }
            }
            // Sector removed since parsing: slot reverts to free (left as `None` below).
        }
    }

    let free_indices: Vec<usize> = (0..MAX_ENTRIES).filter(|i| slot_content[*i].is_none()).collect();
    let mut free_slots = free_indices.into_iter();
    for (&(cyl, head), track) in image.tracks.iter() {
        let track_byte: u8 = cyl.try_into().map_err(|_| DiskImageError::Format)?;
        for sector in &track.sectors {
            let key = (cyl, head, sector.id.s());
            if consumed.contains(&key) {
                continue;
            }
            let flags = build_flags(track, sector)?;
            let idx = free_slots
                .next()
                .ok_or(DiskImageError::LimitExceeded("JV3 entries per image"))?;
            slot_content[idx] = Some((track_byte, sector.id.s(), flags, sector.payload.clone()));
            consumed.insert(key);
        }
    }

    let mut header = vec![0u8; HEADER_LEN];
    let mut data = Vec::new();
    for (i, slot) in slot_content.iter().enumerate() {
        let off = i * ENTRY_LEN;
        match slot {
            Some((track, sector, flags, payload)) => {
                header[off] = *track;
                header[off + 1] = *sector;
                header[off + 2] = *flags;
                data.extend_from_slice(payload);
            }
            None => header[off] = FREE_TRACK,
        }
    }

    let mut out = header;
    out.extend_from_slice(&data);
    Ok(out)
}

/// Compact every live sector to the front of a freshly built table, in `(cylinder, head, sector)`
/// order, with every remaining slot free. Used when `image` carries no recorded original layout
/// (e.g. built programmatically rather than parsed from JV3 bytes), so such an image still
/// produces a structurally valid file even though it cannot reproduce a layout it never had.
fn write_front_packed(image: &DiskImage) -> Result<Vec<u8>, DiskImageError> {
    let mut live: Vec<(u8, u8, u8, Vec<u8>)> = Vec::new(); // (track, sector, flags, payload)
    for (&(cyl, head), track) in image.tracks.iter() {
        let track_byte: u8 = cyl.try_into().map_err(|_| DiskImageError::Format)?;
        for sector in &track.sectors {
            let flags = build_flags(track, sector)?;
            live.push((track_byte, sector.id.s(), flags, sector.payload.clone()));
        }
    }
    if live.len() > MAX_ENTRIES {
        return Err(DiskImageError::LimitExceeded("JV3 entries per image"));
    }

    let mut header = vec![0u8; HEADER_LEN];
    for (i, (track, sector, flags, _)) in live.iter().enumerate() {
        let off = i * ENTRY_LEN;
        header[off] = *track;
        header[off + 1] = *sector;
        header[off + 2] = *flags;
    }
    for i in live.len()..MAX_ENTRIES {
        header[i * ENTRY_LEN] = FREE_TRACK;
    }

    let mut out = header;
    for (_, _, _, payload) in &live {
        out.extend_from_slice(payload);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_single_sector_jv3(track: u8, sector: u8, flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0] = track;
        bytes[1] = sector;
        bytes[2] = flags;
        for i in 1..MAX_ENTRIES {
            bytes[i * ENTRY_LEN] = FREE_TRACK;
        }
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn size_code_mapping_matches_spec_reordering() {
        assert_eq!(flags_size_code_to_bytes(0b00), 256);
        assert_eq!(flags_size_code_to_bytes(0b01), 128);
        assert_eq!(flags_size_code_to_bytes(0b10), 1024);
        assert_eq!(flags_size_code_to_bytes(0b11), 512);
    }

    #[test]
    fn probe_accepts_self_consistent_header() {
        let bytes = build_single_sector_jv3(0, 1, 0b00, &[0u8; 256]);
        assert_eq!(probe(&bytes), Some(85));
    }

    #[test]
    fn probe_rejects_header_claiming_more_than_available() {
        let mut bytes = build_single_sector_jv3(0, 1, 0b10 /* 1024 bytes */, &[0u8; 256]);
        bytes.truncate(HEADER_LEN + 256); // header claims 1024 bytes of data, only 256 present
        assert!(probe(&bytes).is_none());
    }

    #[test]
    fn parse_recovers_side_and_density_from_flags() {
        let bytes = build_single_sector_jv3(5, 3, FLAG_SIDE | FLAG_DOUBLE_DENSITY | 0b11, &[0xAAu8; 512]);
        let image = parse(&bytes).unwrap();
        let track = image.track(5, 1).unwrap();
        assert_eq!(track.encoding, DiskDataEncoding::Mfm);
        let sector = track.sector(3).unwrap();
        assert_eq!(sector.payload, vec![0xAA; 512]);
    }

    #[test]
    fn deleted_and_error_flags_survive_round_trip() {
        let bytes = build_single_sector_jv3(0, 1, FLAG_DAM | FLAG_ERROR, &[0u8; 256]);
        let image = parse(&bytes).unwrap();
        let sector = image.track(0, 0).unwrap().sector(1).unwrap();
        assert!(sector.flags.deleted);
        assert!(sector.flags.crc_bad);

        let out = write(&image).unwrap();
        let reparsed = parse(&out).unwrap();
        let sector2 = reparsed.track(0, 0).unwrap().sector(1).unwrap();
        assert_eq!(sector2.flags, sector.flags);
        assert_eq!(sector2.payload, sector.payload);
    }

    #[test]
    fn free_entries_are_skipped() {
        let bytes = vec![0xFFu8; HEADER_LEN]; // every entry free
        let image = parse(&bytes).unwrap();
        assert!(image.tracks.is_empty());
    }

    #[test]
    fn write_reproduces_reordered_and_interspersed_free_slots_exactly() {
        let mut bytes = vec![0u8; HEADER_LEN];
        for i in 0..MAX_ENTRIES {
            bytes[i * ENTRY_LEN] = FREE_TRACK;
        }

        // Slot 0: track 5, head 0, sector 2, 256 bytes. Slot 1 stays free.
        bytes[0] = 5;
        bytes[1] = 2;
        bytes[2] = 0b00;

        // Slot 2: track 1, head 1 (side flag), sector 9, 512 bytes — an earlier track than slot 0,
        // so the live entries are not sorted by (track, head). Slot 3 stays free.
        bytes[2 * ENTRY_LEN] = 1;
        bytes[2 * ENTRY_LEN + 1] = 9;
        bytes[2 * ENTRY_LEN + 2] = FLAG_SIDE | 0b11;

        // Slot 4: track 1, head 0, sector 1, 128 bytes.
        bytes[4 * ENTRY_LEN] = 1;
        bytes[4 * ENTRY_LEN + 1] = 1;
        bytes[4 * ENTRY_LEN + 2] = 0b01;

        let mut payload = Vec::new();
        payload.extend_from_slice(&[0xAAu8; 256]);
        payload.extend_from_slice(&[0xBBu8; 512]);
        payload.extend_from_slice(&[0xCCu8; 128]);
        bytes.extend_from_slice(&payload);

        let image = parse(&bytes).unwrap();
        assert_eq!(image.track(5, 0).unwrap().sector(2).unwrap().payload, vec![0xAA; 256]);
        assert_eq!(image.track(1, 1).unwrap().sector(9).unwrap().payload, vec![0xBB; 512]);
        assert_eq!(image.track(1, 0).unwrap().sector(1).unwrap().payload, vec![0xCC; 128]);

        let out = write(&image).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn write_front_packed_is_used_when_layout_metadata_is_absent() {
        let geometry = crate::chs::Geometry {
            cylinders: 2,
            heads: 1,
            sectors_per_track: crate::chs::SectorsPerTrack::Uniform(1),
            sector_size: 0,
            one_indexed_tracks: false,
        };
        let mut image = DiskImage::new(Variant::Jv3, geometry);
        let mut track = DiskTrack::new(DiskDataEncoding::Fm);
        track.sectors.push(
            Sector::new(DiskChsn::new(0, 0, 1, 1), vec![0u8; 256], SectorFlags::default(), 0).unwrap(),
        );
        image.set_track(0, 0, track).unwrap();

        let out = write(&image).unwrap();
        assert_eq!(out.len(), HEADER_LEN + 256);
        assert_eq!(&out[0..3], &[0, 1, 0b00]);
        assert_eq!(out[ENTRY_LEN], FREE_TRACK);
    }
}

/*
    src/file_parsers/sid.rs

    PSID/RSID music-file parser/writer (spec §4.C): a fixed big-endian header followed by a single
    contiguous data blob (the C64 machine code + music data). Like T64, a SID file has no sector
    framing; its payload is stored as track 0's `raw_bitstream`.
*/
use crate::chs::{Geometry, SectorsPerTrack};
use crate::containers::{DiskImage, DiskTrack, Variant};
use crate::io::cursor::ByteCursor;
use crate::{DiskDataEncoding, DiskImageError};

const HEADER_LEN: usize = 0x76;
const NAME_OFF: usize = 0x16;
const AUTHOR_OFF: usize = 0x36;
const RELEASED_OFF: usize = 0x56;
const STRING_FIELD_LEN: usize = 32;

pub fn probe(bytes: &[u8]) -> Option<u8> {
    if bytes.len() >= HEADER_LEN && (&bytes[0..4] == b"PSID" || &bytes[0..4] == b"RSID") {
        Some(95)
    } else {
        None
    }
}

pub fn parse(bytes: &[u8]) -> Result<DiskImage, DiskImageError> {
    let cursor = ByteCursor::new(bytes);
    if cursor.len() < HEADER_LEN {
        return Err(DiskImageError::Format);
    }
    let magic = cursor.read_bytes(0, 4)?;
    if magic != b"PSID" && magic != b"RSID" {
        return Err(DiskImageError::Format);
    }
    let version = cursor.read_u16_be(4)?;
    let data_offset = cursor.read_u16_be(6)? as usize;
    let load_address = cursor.read_u16_be(8)?;
    let init_address = cursor.read_u16_be(10)?;
    let play_address = cursor.read_u16_be(12)?;
    let songs = cursor.read_u16_be(14)?;
    let start_song = cursor.read_u16_be(16)?;

    let geometry = Geometry {
        cylinders: 1,
        heads: 1,
        sectors_per_track: SectorsPerTrack::Uniform(0),
        sector_size: 0,
        one_indexed_tracks: false,
    };
    let mut image = DiskImage::new(Variant::Sid, geometry);

    let header_end = if data_offset > 0 { data_offset } else { HEADER_LEN };
    let payload = cursor.read_bytes(header_end, cursor.len() - header_end)?.to_vec();
    let mut track = DiskTrack::new(DiskDataEncoding::Fm);
    track.raw_bitstream = Some(payload);
    image.set_track(0, 0, track)?;

    image.metadata.insert("magic".to_string(), String::from_utf8_lossy(magic).to_string());
    image.metadata.insert("version".to_string(), version.to_string());
    image.metadata.insert("load_address".to_string(), load_address.to_string());
    image.metadata.insert("init_address".to_string(), init_address.to_string());
    image.metadata.insert("play_address".to_string(), play_address.to_string());
    image.metadata.insert("songs".to_string(), songs.to_string());
    image.metadata.insert("start_song".to_string(), start_song.to_string());
    image
        .metadata
        .insert("name".to_string(), decode_c_string(cursor.read_bytes(NAME_OFF, STRING_FIELD_LEN)?));
    image
        .metadata
        .insert("author".to_string(), decode_c_string(cursor.read_bytes(AUTHOR_OFF, STRING_FIELD_LEN)?));
    image
        .metadata
        .insert("released".to_string(), decode_c_string(cursor.read_bytes(RELEASED_OFF, STRING_FIELD_LEN)?));

    image.mark_clean();
    Ok(image)
}

pub fn write(image: &DiskImage) -> Result<Vec<u8>, DiskImageError> {
    let track = image.track(0, 0).ok_or(DiskImageError::Format)?;
    let payload = track.raw_bitstream.as_deref().ok_or(DiskImageError::Format)?;

    let mut header = vec![0u8; HEADER_LEN];
    header[0..4].copy_from_slice(b"PSID");
    let version: u16 = image.metadata.get("version").and_then(|s| s.parse().ok()).unwrap_or(2);
    header[4..6].copy_from_slice(&version.to_be_bytes());
    header[6..8].copy_from_slice(&(HEADER_LEN as u16).to_be_bytes());
    let load_address: u16 = image.metadata.get("load_address").and_then(|s| s.parse().ok()).unwrap_or(0);
    header[8..10].copy_from_slice(&load_address.to_be_bytes());
    let init_address: u16 = image.metadata.get("init_address").and_then(|s| s.parse().ok()).unwrap_or(0);
    header[10..12].copy_from_slice(&init_address.to_be_bytes());
    let play_address: u16 = image.metadata.get("play_address").and_then(|s| s.parse().ok()).unwrap_or(0);
    header[12..14].copy_from_slice(&play_address.to_be_bytes());
    let songs: u16 = image.metadata.get("songs").and_then(|s| s.parse().ok()).unwrap_or(1);
    header[14..16].copy_from_slice(&songs.to_be_bytes());
    let start_song: u16 = image.metadata.get("start_song").and_then(|s| s.parse().ok()).unwrap_or(1);
    header[16..18].copy_from_slice(&start_song.to_be_bytes());

    write_c_string(&mut header, NAME_OFF, image.metadata.get("name"));
    write_c_string(&mut header, AUTHOR_OFF, image.metadata.get("author"));
    write_c_string(&mut header, RELEASED_OFF, image.metadata.get("released"));

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(payload);
    Ok(out)
}

fn decode_c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

fn write_c_string(header: &mut [u8], offset: usize, value: Option<&String>) {
    if let Some(value) = value {
        let bytes = value.as_bytes();
        let n = bytes.len().min(STRING_FIELD_LEN - 1);
        header[offset..offset + n].copy_from_slice(&bytes[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_sid(name: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(b"PSID");
        bytes[4..6].copy_from_slice(&2u16.to_be_bytes());
        bytes[6..8].copy_from_slice(&(HEADER_LEN as u16).to_be_bytes());
        bytes[14..16].copy_from_slice(&1u16.to_be_bytes()); // songs
        bytes[16..18].copy_from_slice(&1u16.to_be_bytes()); // start_song
        let name_bytes = name.as_bytes();
        bytes[NAME_OFF..NAME_OFF + name_bytes.len()].copy_from_slice(name_bytes);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn probe_recognizes_psid_magic() {
        let bytes = build_sid("Song", &[1, 2, 3]);
        assert_eq!(probe(&bytes), Some(95));
    }

    #[test]
    fn parse_recovers_payload_and_name() {
        let bytes = build_sid("Commando", &[0xA9, 0x00, 0x60]);
        let image = parse(&bytes).unwrap();
        assert_eq!(image.track(0, 0).unwrap().raw_bitstream.as_deref(), Some(&[0xA9, 0x00, 0x60][..]));
        assert_eq!(image.metadata.get("name").unwrap(), "Commando");
        assert_eq!(image.metadata.get("songs").unwrap(), "1");
    }

    #[test]
    fn write_then_parse_round_trips_payload_and_name() {
        let bytes = build_sid("Robocop 3", &[0x4C, 0x00, 0x10]);
        let image = parse(&bytes).unwrap();
        let out = write(&image).unwrap();
        let reparsed = parse(&out).unwrap();
        assert_eq!(reparsed.metadata.get("name"), image.metadata.get("name"));
        assert_eq!(reparsed.track(0, 0).unwrap().raw_bitstream, image.track(0, 0).unwrap().raw_bitstream);
    }
}

/*
    src/bitstream_codec/apple_gcr.rs

    Apple-GCR (6-and-2) sector framing (spec §4.F, spec SPEC_FULL §4.F "Apple-GCR 6-and-2 nibble
    codec"). The spec names this decoder variant but does not restate Apple's well-known
    translate table; this module supplies the framing half of that codec (address/data prologue
    detection, XOR checksum validation) over the same byte-aligned-post-denibblizing abstraction
    [`super::gcr`] uses for Commodore disks, so the 6-and-2 translate table itself is a
    bitstream-layer concern upstream of this dispatch point.
*/
use super::{DecodeOptions, DecodedSector};
use crate::chs::DiskChsn;

const ADDRESS_PROLOGUE: [u8; 3] = [0xD5, 0xAA, 0x96];
const DATA_PROLOGUE: [u8; 3] = [0xD5, 0xAA, 0xAD];
const DATA_SIZE: usize = 256;
const APPLE_SIZE_CODE: u8 = 1;

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

pub fn decode(bytes: &[u8], options: DecodeOptions) -> Vec<DecodedSector> {
    let mut sectors = Vec::new();
    let mut i = 0usize;
    while i + ADDRESS_PROLOGUE.len() + 5 <= bytes.len() {
        if bytes[i..i + 3] != ADDRESS_PROLOGUE {
            i += 1;
            continue;
        }
        let field_start = i + 3;
        let volume = bytes[field_start];
        let track = bytes[field_start + 1];
        let sector_num = bytes[field_start + 2];
        let stored_checksum = bytes[field_start + 3];
        let computed_checksum = xor_checksum(&[volume, track, sector_num]);
        let id_crc_bad = stored_checksum != computed_checksum;

        if id_crc_bad && !options.accept_bad_id_crc {
            i = field_start + 4;
            continue;
        }

        let search_start = field_start + 4;
        let data_pos = (search_start..bytes.len().saturating_sub(2))
            .find(|&p| p + 3 <= bytes.len() && bytes[p..p + 3] == DATA_PROLOGUE);
        let Some(data_pos) = data_pos else {
            i = search_start;
            continue;
        };
        let payload_start = data_pos + 3;
        if payload_start + DATA_SIZE + 1 > bytes.len() {
            break;
        }
        let payload = bytes[payload_start..payload_start + DATA_SIZE].to_vec();
        let stored_data_checksum = bytes[payload_start + DATA_SIZE];
        let computed_data_checksum = xor_checksum(&payload);
        let data_crc_bad = stored_data_checksum != computed_data_checksum;

        sectors.push(DecodedSector {
            id: DiskChsn::new(track as u16, 0, sector_num, APPLE_SIZE_CODE),
            payload,
            id_crc_bad,
            data_crc_bad,
            deleted: false,
            confidence: 100,
        });

        i = payload_start + DATA_SIZE + 1;
    }
    sectors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_sector(track: u8, sector: u8, payload: &[u8; DATA_SIZE]) -> Vec<u8> {
        let mut out = ADDRESS_PROLOGUE.to_vec();
        let volume = 0xFE;
        out.push(volume);
        out.push(track);
        out.push(sector);
        out.push(xor_checksum(&[volume, track, sector]));
        out.extend_from_slice(&[0xDE, 0xAA, 0xEB]);
        out.extend_from_slice(&DATA_PROLOGUE);
        out.extend_from_slice(payload);
        out.push(xor_checksum(payload));
        out
    }

    #[test]
    fn decodes_a_well_formed_apple_sector() {
        let payload = [0x7E; DATA_SIZE];
        let stream = build_sector(2, 5, &payload);
        let sectors = decode(&stream, DecodeOptions::default());
        assert_eq!(sectors.len(), 1);
        assert_eq!(sectors[0].id.c(), 2);
        assert_eq!(sectors[0].id.s(), 5);
        assert!(!sectors[0].id_crc_bad && !sectors[0].data_crc_bad);
    }

    #[test]
    fn bad_address_checksum_is_skipped_by_default() {
        let payload = [0x00; DATA_SIZE];
        let mut stream = build_sector(0, 0, &payload);
        stream[6] ^= 0xFF;
        assert!(decode(&stream, DecodeOptions::default()).is_empty());
    }
}

/*
    src/bitstream_codec/mfm.rs

    MFM sector framing (spec §4.F). Operates on a byte-aligned view of an already-decoded bit
    stream (clock bits already stripped by the PLL/bitstream layer upstream), so address marks
    appear as their literal byte sequence `0xA1 0xA1 0xA1 0xFE` rather than as a clock-violation
    pattern. Grounded on the teacher's `structure_parsers/system34.rs` sync-scanning idiom.
*/
use super::{DecodeOptions, DecodedSector};
use crate::chs::DiskChsn;
use crate::util::crc16_ibm3740;

const IDAM: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xFE];
const DAM_NORMAL: u8 = 0xFB;
const DAM_DELETED: u8 = 0xF8;
/// Maximum bytes between the end of an ID field and a data-address-mark before we give up on
/// this sector (spec §4.F "within the inter-AM-gap window").
const INTER_AM_GAP_WINDOW: usize = 64;

pub fn decode(bytes: &[u8], options: DecodeOptions) -> Vec<DecodedSector> {
    let mut sectors = Vec::new();
    let mut i = 0usize;
    while i + 10 <= bytes.len() {
        if bytes[i..i + 4] != IDAM {
            i += 1;
            continue;
        }
        let header_start = i + 4;
        if header_start + 6 > bytes.len() {
            break;
        }
        let cyl = bytes[header_start];
        let head = bytes[header_start + 1];
        let sector_num = bytes[header_start + 2];
        let size_code = bytes[header_start + 3];
        let stored_crc = u16::from_be_bytes([bytes[header_start + 4], bytes[header_start + 5]]);
        let computed_crc = crc16_ibm3740(&bytes[i..header_start + 4]);
        let id_crc_bad = stored_crc != computed_crc;

        if id_crc_bad && !options.accept_bad_id_crc {
            i = header_start + 6;
            continue;
        }

        let search_start = header_start + 6;
        let dam_pos = (search_start..bytes.len().min(search_start + INTER_AM_GAP_WINDOW))
            .find(|&p| p + 4 <= bytes.len() && bytes[p..p + 3] == [0xA1, 0xA1, 0xA1] && matches!(bytes[p + 3], 0xFB | 0xF8));

        let Some(dam_pos) = dam_pos else {
            i = search_start;
            continue;
        };
        let deleted = bytes[dam_pos + 3] == DAM_DELETED;
        let payload_start = dam_pos + 4;
        let payload_len = DiskChsn::n_to_bytes(size_code);
        if payload_start + payload_len + 2 > bytes.len() {
            i = search_start;
            continue;
        }
        let payload = bytes[payload_start..payload_start + payload_len].to_vec();
        let stored_data_crc = u16::from_be_bytes([
            bytes[payload_start + payload_len],
            bytes[payload_start + payload_len + 1],
        ]);
        let computed_data_crc = crc16_ibm3740(&bytes[dam_pos..payload_start + payload_len]);
        let data_crc_bad = stored_data_crc != computed_data_crc;

        sectors.push(DecodedSector {
            id: DiskChsn::new(cyl as u16, head, sector_num, size_code),
            payload,
            id_crc_bad,
            data_crc_bad,
            deleted,
            confidence: 100,
        });

        i = payload_start + payload_len + 2;
    }
    sectors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_sector(cyl: u8, head: u8, sector: u8, size_code: u8, payload: &[u8], deleted: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&IDAM);
        out.push(cyl);
        out.push(head);
        out.push(sector);
        out.push(size_code);
        let id_crc = crc16_ibm3740(&out);
        out.extend_from_slice(&id_crc.to_be_bytes());
        out.extend_from_slice(&[0xA1, 0xA1, 0xA1]);
        out.push(if deleted { DAM_DELETED } else { DAM_NORMAL });
        let dam_start = out.len() - 4;
        out.extend_from_slice(payload);
        let data_crc = crc16_ibm3740(&out[dam_start..]);
        out.extend_from_slice(&data_crc.to_be_bytes());
        out
    }

    #[test]
    fn decodes_a_well_formed_sector() {
        let payload = vec![0x42; 256];
        let stream = build_sector(0, 0, 1, 1, &payload, false);
        let sectors = decode(&stream, DecodeOptions::default());
        assert_eq!(sectors.len(), 1);
        assert_eq!(sectors[0].id, DiskChsn::new(0, 0, 1, 1));
        assert!(!sectors[0].id_crc_bad);
        assert!(!sectors[0].data_crc_bad);
        assert_eq!(sectors[0].payload, payload);
    }

    #[test]
    fn flags_bad_data_crc_but_still_emits() {
        let payload = vec![0x11; 128];
        let mut stream = build_sector(1, 0, 3, 0, &payload, false);
        let last = stream.len() - 1;
        stream[last] ^= 0xFF;
        let sectors = decode(&stream, DecodeOptions::default());
        assert_eq!(sectors.len(), 1);
        assert!(sectors[0].data_crc_bad);
    }

    #[test]
    fn deleted_data_mark_is_flagged() {
        let payload = vec![0x00; 128];
        let stream = build_sector(2, 0, 1, 0, &payload, true);
        let sectors = decode(&stream, DecodeOptions::default());
        assert!(sectors[0].deleted);
    }

    #[test]
    fn bad_id_crc_is_skipped_unless_accepted() {
        let payload = vec![0x99; 128];
        let mut stream = build_sector(3, 0, 1, 0, &payload, false);
        stream[6] ^= 0xFF; // corrupt the id CRC
        assert!(decode(&stream, DecodeOptions::default()).is_empty());
        let sectors = decode(&stream, DecodeOptions { accept_bad_id_crc: true });
        assert_eq!(sectors.len(), 1);
        assert!(sectors[0].id_crc_bad);
    }
}

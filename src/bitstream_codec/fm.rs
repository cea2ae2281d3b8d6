/*
    src/bitstream_codec/fm.rs

    FM (single-density) sector framing (spec §4.F). Same byte-aligned-post-PLL model as
    [`super::mfm`], but FM's single-byte address marks carry their own distinct clock pattern
    instead of MFM's `0xA1` sync prefix, so an IDAM here is the bare `0xFE` byte and a DAM is the
    bare `0xFB`/`0xF8` byte.
*/
use super::{DecodeOptions, DecodedSector};
use crate::chs::DiskChsn;
use crate::util::crc16_ibm3740;

const IDAM: u8 = 0xFE;
const DAM_NORMAL: u8 = 0xFB;
const DAM_DELETED: u8 = 0xF8;
const INTER_AM_GAP_WINDOW: usize = 32;

pub fn decode(bytes: &[u8], options: DecodeOptions) -> Vec<DecodedSector> {
    let mut sectors = Vec::new();
    let mut i = 0usize;
    while i + 7 <= bytes.len() {
        if bytes[i] != IDAM {
            i += 1;
            continue;
        }
        let header_start = i + 1;
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
            .find(|&p| matches!(bytes[p], 0xFB | 0xF8));

        let Some(dam_pos) = dam_pos else {
            i = search_start;
            continue;
        };
        let deleted = bytes[dam_pos] == DAM_DELETED;
        let payload_start = dam_pos + 1;
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

    fn build_sector(cyl: u8, head: u8, sector: u8, size_code: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![IDAM, cyl, head, sector, size_code];
        let id_crc = crc16_ibm3740(&out);
        out.extend_from_slice(&id_crc.to_be_bytes());
        out.push(DAM_NORMAL);
        let dam_start = out.len() - 1;
        out.extend_from_slice(payload);
        let data_crc = crc16_ibm3740(&out[dam_start..]);
        out.extend_from_slice(&data_crc.to_be_bytes());
        out
    }

    #[test]
    fn decodes_a_well_formed_fm_sector() {
        let payload = vec![0x55; 128];
        let stream = build_sector(0, 0, 1, 0, &payload);
        let sectors = decode(&stream, DecodeOptions::default());
        assert_eq!(sectors.len(), 1);
        assert_eq!(sectors[0].payload, payload);
        assert!(!sectors[0].id_crc_bad);
    }
}

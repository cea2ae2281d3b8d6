/*
    src/bitstream_codec/mod.rs

    Decoder Dispatch (spec §4.F): given a recovered bit stream and its encoding, find sync
    patterns, frame sectors, and check CRCs. Grounded on the teacher's `bitstream_codec`/`bitstream`
    module split (one submodule per encoding, a shared "codec" contract); the multi-revolution
    reconciliation rule lives here since it is encoding-independent.
*/
pub mod apple_gcr;
pub mod fm;
pub mod gcr;
pub mod mfm;

use crate::chs::SectorId;
use crate::DiskDataEncoding;

/// One sector as framed off the wire by a decoder, before it becomes a [`crate::containers::Sector`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedSector {
    pub id: SectorId,
    pub payload: Vec<u8>,
    pub id_crc_bad: bool,
    pub data_crc_bad: bool,
    pub deleted: bool,
    /// 0-100 confidence carried over from the PLL state preceding this sector, used by
    /// multi-revolution reconciliation.
    pub confidence: u8,
}

/// Caller-configurable leniency (spec §4.F "accept_bad_id_crc").
#[derive(Copy, Clone, Debug, Default)]
pub struct DecodeOptions {
    pub accept_bad_id_crc: bool,
}

/// Dispatch to the submodule matching `encoding` and decode every sector on `bytes`, a
/// byte-aligned view of the recovered bit stream (clock/data already separated for MFM/FM; raw
/// GCR bytes for GCR/Apple-GCR, which encode data in their byte groupings directly).
pub fn decode_track(bytes: &[u8], encoding: DiskDataEncoding, options: DecodeOptions) -> Vec<DecodedSector> {
    match encoding {
        DiskDataEncoding::Mfm => mfm::decode(bytes, options),
        DiskDataEncoding::Fm => fm::decode(bytes, options),
        DiskDataEncoding::Gcr => gcr::decode(bytes, options),
        DiskDataEncoding::AppleGcr => apple_gcr::decode(bytes, options),
    }
}

/// Multi-revolution reconciliation (spec §4.F): for each sector id present in any revolution,
/// select the best version by (1) preferring CRC-OK, (2) among CRC-OK, preferring the revolution
/// whose confidence was highest, (3) among CRC-bad, majority-vote each byte across revolutions.
/// Order-independent (spec §5).
pub fn reconcile_revolutions(revolutions: &[Vec<DecodedSector>]) -> Vec<DecodedSector> {
    use std::collections::BTreeMap;

    let mut by_id: BTreeMap<SectorId, Vec<&DecodedSector>> = BTreeMap::new();
    for revolution in revolutions {
        for sector in revolution {
            by_id.entry(sector.id).or_default().push(sector);
        }
    }

    by_id
        .into_values()
        .map(|candidates| {
            if let Some(best) = candidates
                .iter()
                .filter(|s| !s.data_crc_bad)
                .max_by_key(|s| s.confidence)
            {
                return (*best).clone();
            }
            majority_vote(&candidates)
        })
        .collect()
}

fn majority_vote(candidates: &[&DecodedSector]) -> DecodedSector {
    let template = candidates[0];
    let len = template.payload.len();
    let mut payload = Vec::with_capacity(len);
    for i in 0..len {
        let mut counts: std::collections::HashMap<u8, usize> = std::collections::HashMap::new();
        for candidate in candidates {
            if let Some(&byte) = candidate.payload.get(i) {
                *counts.entry(byte).or_insert(0) += 1;
            }
        }
        let winner = counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(byte, _)| byte)
            .unwrap_or(0);
        payload.push(winner);
    }
    DecodedSector {
        id: template.id,
        payload,
        id_crc_bad: template.id_crc_bad,
        data_crc_bad: true,
        deleted: template.deleted,
        confidence: candidates.iter().map(|s| s.confidence).max().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chs::DiskChsn;

    fn sector(n: u8, payload: Vec<u8>, data_crc_bad: bool, confidence: u8) -> DecodedSector {
        DecodedSector {
            id: DiskChsn::new(0, 0, n, 1),
            payload,
            id_crc_bad: false,
            data_crc_bad,
            deleted: false,
            confidence,
        }
    }

    #[test]
    fn reconcile_prefers_crc_ok_over_crc_bad() {
        let rev1 = vec![sector(1, vec![0xAA; 4], true, 90)];
        let rev2 = vec![sector(1, vec![0xBB; 4], false, 10)];
        let result = reconcile_revolutions(&[rev1, rev2]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].payload, vec![0xBB; 4]);
    }

    #[test]
    fn reconcile_majority_votes_when_all_crc_bad() {
        let rev1 = vec![sector(1, vec![0x01, 0x02], true, 50)];
        let rev2 = vec![sector(1, vec![0x01, 0x03], true, 50)];
        let rev3 = vec![sector(1, vec![0x01, 0x03], true, 50)];
        let result = reconcile_revolutions(&[rev1, rev2, rev3]);
        assert_eq!(result[0].payload, vec![0x01, 0x03]);
        assert!(result[0].data_crc_bad);
    }
}

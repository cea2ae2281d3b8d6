/*
    src/chs.rs

    Geometry & addressing (spec §4.B). `DiskCh`/`DiskChs`/`DiskChsn` are kept from the teacher's
    address-tuple idiom (grounded on the original `src/chs.rs`). `Geometry`, `ZoneMap`, and the
    `lba`/`inverse` pair of pure functions are the spec's addition of per-format zone tables and a
    proven-invertible addressing scheme (spec §8 property 2).
*/
use crate::{checked_mul, DiskImageError, MAXIMUM_SECTOR_SIZE};
use std::fmt::Display;

/// Cylinder + head, with no sector component. Used for track-level addressing.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct DiskCh {
    c: u16,
    h: u8,
}

impl From<(u16, u8)> for DiskCh {
    fn from((c, h): (u16, u8)) -> Self {
        Self { c, h }
    }
}

impl Display for DiskCh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{} h:{}]", self.c, self.h)
    }
}

impl DiskCh {
    pub fn new(c: u16, h: u8) -> Self {
        Self { c, h }
    }
    pub fn c(&self) -> u16 {
        self.c
    }
    pub fn h(&self) -> u8 {
        self.h
    }
}

/// Cylinder + head + sector, the on-disk addressing triple.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct DiskChs {
    c: u16,
    h: u8,
    s: u8,
}

impl Default for DiskChs {
    fn default() -> Self {
        Self { c: 0, h: 0, s: 1 }
    }
}

impl From<(u16, u8, u8)> for DiskChs {
    fn from((c, h, s): (u16, u8, u8)) -> Self {
        Self { c, h, s }
    }
}

impl From<DiskChs> for (u16, u8, u8) {
    fn from(chs: DiskChs) -> Self {
        (chs.c, chs.h, chs.s)
    }
}

impl Display for DiskChs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{} h:{} s:{}]", self.c, self.h, self.s)
    }
}

impl DiskChs {
    pub fn new(c: u16, h: u8, s: u8) -> Self {
        Self { c, h, s }
    }
    pub fn c(&self) -> u16 {
        self.c
    }
    pub fn h(&self) -> u8 {
        self.h
    }
    pub fn s(&self) -> u8 {
        self.s
    }
}

/// Cylinder + head + sector + size-code, the full on-disk sector address used by `SectorRecord`.
/// `sector_id` is the on-disk ID, which may be non-sequential; `n` is the size code
/// (`0→128, 1→256, 2→512, 3→1024` bytes, per spec §3).
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct DiskChsn {
    chs: DiskChs,
    n: u8,
}

impl From<(DiskChs, u8)> for DiskChsn {
    fn from((chs, n): (DiskChs, u8)) -> Self {
        Self { chs, n }
    }
}

impl From<DiskChsn> for DiskChs {
    fn from(chsn: DiskChsn) -> Self {
        chsn.chs
    }
}

impl Display for DiskChsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{} h:{} s:{} n:{}]", self.c(), self.h(), self.s(), self.n)
    }
}

impl DiskChsn {
    pub fn new(c: u16, h: u8, s: u8, n: u8) -> Self {
        Self {
            chs: DiskChs::from((c, h, s)),
            n,
        }
    }
    pub fn c(&self) -> u16 {
        self.chs.c()
    }
    pub fn h(&self) -> u8 {
        self.chs.h()
    }
    pub fn s(&self) -> u8 {
        self.chs.s()
    }
    pub fn n(&self) -> u8 {
        self.n
    }

    /// `size = 128 << n`, capped at [`MAXIMUM_SECTOR_SIZE`].
    pub fn n_to_bytes(n: u8) -> usize {
        std::cmp::min(MAXIMUM_SECTOR_SIZE, 128usize.overflowing_shl(n as u32).0)
    }

    pub fn n_size(&self) -> usize {
        Self::n_to_bytes(self.n)
    }

    pub fn bytes_to_n(size: usize) -> u8 {
        let mut n = 0;
        let mut size = size;
        while size > 128 {
            size >>= 1;
            n += 1;
        }
        n
    }
}

/// The on-disk sector address used throughout the container & filesystem layers (spec §3's
/// `SectorRecord` addressing field). Alias kept distinct from `DiskChsn` at the call-site level so
/// consumers of the public API see the name the spec uses.
pub type SectorId = DiskChsn;

/// A track's sector count, either uniform across the whole disk or given by a per-cylinder zone
/// table (Commodore-style variable-rate zones).
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum SectorsPerTrack {
    Uniform(u8),
    Zoned(ZoneMap),
}

/// A table mapping cylinder ranges to a fixed sectors-per-track count. Entries are
/// `(first_cylinder_inclusive, last_cylinder_inclusive, sectors_per_track)`.
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ZoneMap(pub &'static [(u16, u16, u8)]);

impl ZoneMap {
    pub fn sectors_for_cylinder(&self, cylinder: u16) -> Option<u8> {
        self.0
            .iter()
            .find(|(first, last, _)| cylinder >= *first && cylinder <= *last)
            .map(|(_, _, spt)| *spt)
    }
}

/// Commodore 1541: tracks 1-17 = 21 sectors, 18-24 = 19, 25-30 = 18, 31-42 = 17. 1-indexed.
pub const ZONE_MAP_1541: ZoneMap = ZoneMap(&[(1, 17, 21), (18, 24, 19), (25, 30, 18), (31, 42, 17)]);

/// Commodore 1571 (double-sided 1541): same zone boundaries per side.
pub const ZONE_MAP_1571: ZoneMap = ZONE_MAP_1541;

/// The physical/logical geometry of a disk image: cylinder and head counts, the sectors-per-track
/// rule (uniform or zoned), and the nominal sector size. Spec §3 invariant: for any `(cyl, head,
/// sector)` claimed present, `cyl < cylinders ∧ head < heads ∧ sector < sectors_in_track(cyl)`.
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Geometry {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: SectorsPerTrack,
    pub sector_size: u16,
    /// Whether track numbering for this variant starts at 0 (PC) or 1 (Commodore).
    pub one_indexed_tracks: bool,
}

impl Geometry {
    pub fn sectors_in_track(&self, cylinder: u16) -> Option<u8> {
        match &self.sectors_per_track {
            SectorsPerTrack::Uniform(n) => Some(*n),
            SectorsPerTrack::Zoned(zones) => zones.sectors_for_cylinder(cylinder),
        }
    }

    /// Validate that `(cyl, head, sector)` is a legal address under this geometry. `sector` here is
    /// 1-indexed if `one_indexed_tracks` is set for this variant's sector numbering, matching the
    /// on-disk convention for the family (Commodore sectors and tracks are both 1-indexed).
    pub fn contains(&self, cyl: u16, head: u8, sector: u8) -> bool {
        if cyl >= self.cylinders || head >= self.heads {
            return false;
        }
        match self.sectors_in_track(cyl) {
            Some(spt) => sector < spt || (self.one_indexed_tracks && sector >= 1 && sector <= spt),
            None => false,
        }
    }
}

/// Convert a `(cylinder, head, sector)` triple to a linear block address under `geometry`.
/// Rejects out-of-range inputs. Tracks are numbered starting at 0 for PC-style geometries and
/// starting at 1 for Commodore-style geometries; each variant's `Geometry` declares its own
/// convention via `one_indexed_tracks`, and presence of "track 0" on a 1-indexed variant is an
/// error (spec §4.B).
pub fn ch_to_lba(geometry: &Geometry, cyl: u16, head: u8, sector: u8) -> Result<usize, DiskImageError> {
    if geometry.one_indexed_tracks && cyl == 0 {
        return Err(DiskImageError::ParameterError);
    }
    if cyl >= geometry.cylinders || head >= geometry.heads {
        return Err(DiskImageError::OutOfBounds);
    }
    let spt = geometry
        .sectors_in_track(cyl)
        .ok_or(DiskImageError::OutOfBounds)? as usize;
    let sector_index = if geometry.one_indexed_tracks {
        if sector < 1 || sector as usize > spt {
            return Err(DiskImageError::OutOfBounds);
        }
        (sector - 1) as usize
    } else {
        if sector as usize >= spt {
            return Err(DiskImageError::OutOfBounds);
        }
        sector as usize
    };

    // Sum the sector counts of every track that precedes (cyl, head) in on-disk order: all tracks
    // of earlier cylinders (both heads), then earlier heads of this cylinder.
    let mut preceding_sectors = 0usize;
    let first_cyl = if geometry.one_indexed_tracks { 1 } else { 0 };
    for c in first_cyl..cyl {
        let spt_c = geometry.sectors_in_track(c).ok_or(DiskImageError::OutOfBounds)? as usize;
        preceding_sectors = preceding_sectors
            .checked_add(checked_mul(spt_c, geometry.heads as usize)?)
            .ok_or(DiskImageError::Overflow)?;
    }
    preceding_sectors = preceding_sectors
        .checked_add(checked_mul(head as usize, spt)?)
        .ok_or(DiskImageError::Overflow)?;
    preceding_sectors
        .checked_add(sector_index)
        .ok_or(DiskImageError::Overflow)
}

/// Inverse of [`ch_to_lba`]: given a linear block address, recover `(cylinder, head, sector)`.
/// `inverse(lba(cyl, head, sector)) == (cyl, head, sector)` for every valid address (spec §8
/// property 2).
pub fn lba_to_ch(geometry: &Geometry, lba: usize) -> Result<(u16, u8, u8), DiskImageError> {
    let mut remaining = lba;
    let first_cyl = if geometry.one_indexed_tracks { 1 } else { 0 };
    for c in first_cyl..geometry.cylinders {
        let spt = geometry.sectors_in_track(c).ok_or(DiskImageError::OutOfBounds)? as usize;
        let track_group_size = checked_mul(spt, geometry.heads as usize)?;
        if remaining < track_group_size {
            let head = (remaining / spt) as u8;
            let sector_index = remaining % spt;
            let sector = if geometry.one_indexed_tracks {
                sector_index as u8 + 1
            } else {
                sector_index as u8
            };
            return Ok((c, head, sector));
        }
        remaining -= track_group_size;
    }
    Err(DiskImageError::OutOfBounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc_geometry() -> Geometry {
        Geometry {
            cylinders: 80,
            heads: 2,
            sectors_per_track: SectorsPerTrack::Uniform(9),
            sector_size: 512,
            one_indexed_tracks: false,
        }
    }

    fn c1541_geometry() -> Geometry {
        Geometry {
            cylinders: 43,
            heads: 1,
            sectors_per_track: SectorsPerTrack::Zoned(ZONE_MAP_1541),
            sector_size: 256,
            one_indexed_tracks: true,
        }
    }

    #[test]
    fn lba_inverse_round_trips_pc_geometry() {
        let geom = pc_geometry();
        for c in 0..geom.cylinders {
            for h in 0..geom.heads {
                for s in 0..9u8 {
                    let lba = ch_to_lba(&geom, c, h, s).unwrap();
                    assert_eq!(lba_to_ch(&geom, lba).unwrap(), (c, h, s));
                }
            }
        }
    }

    #[test]
    fn lba_inverse_round_trips_zoned_commodore_geometry() {
        let geom = c1541_geometry();
        for c in 1..geom.cylinders {
            let spt = geom.sectors_in_track(c).unwrap();
            for s in 1..=spt {
                let lba = ch_to_lba(&geom, c, 0, s).unwrap();
                assert_eq!(lba_to_ch(&geom, lba).unwrap(), (c, 0, s));
            }
        }
    }

    #[test]
    fn track_zero_is_rejected_on_one_indexed_geometry() {
        let geom = c1541_geometry();
        assert!(matches!(ch_to_lba(&geom, 0, 0, 1), Err(DiskImageError::ParameterError)));
    }

    #[test]
    fn out_of_range_sector_is_rejected() {
        let geom = pc_geometry();
        assert!(matches!(ch_to_lba(&geom, 0, 0, 9), Err(DiskImageError::OutOfBounds)));
        assert!(matches!(ch_to_lba(&geom, 80, 0, 0), Err(DiskImageError::OutOfBounds)));
    }

    #[test]
    fn chsn_n_size_calculates_and_caps() {
        assert_eq!(DiskChsn::new(0, 0, 0, 2).n_size(), 512);
        assert_eq!(DiskChsn::new(0, 0, 0, 7).n_size(), MAXIMUM_SECTOR_SIZE);
        assert_eq!(DiskChsn::bytes_to_n(1024), 3);
    }
}

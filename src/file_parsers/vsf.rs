/*
    src/file_parsers/vsf.rs

    VICE snapshot file parser (spec §4.C): a fixed header naming the emulated machine followed by a
    flat sequence of self-delimiting modules (CPU registers, memory banks, drive state, ...). Not
    writable: a VSF module list is a faithful dump of emulator-internal state that this crate has no
    reconstructable model for (spec §8 property 1, "structural equality suffices" applies to the
    read path here, not a round trip). Each module's raw bytes are kept as one `DiskTrack`'s
    `raw_bitstream`, indexed by module position, matching the T64/SID no-sector-framing pattern.
*/
use crate::chs::{Geometry, SectorsPerTrack};
use crate::containers::{DiskImage, DiskTrack, Variant};
use crate::io::cursor::ByteCursor;
use crate::{checked_add, DiskDataEncoding, DiskImageError};

const MAGIC: &[u8; 19] = b"VICE Snapshot File\x1a";
const HEADER_LEN: usize = 37;
const MODULE_HEADER_LEN: usize = 22;

pub fn probe(bytes: &[u8]) -> Option<u8> {
    if bytes.len() >= HEADER_LEN && &bytes[0..19] == MAGIC {
        Some(95)
    } else {
        None
    }
}

pub fn parse(bytes: &[u8]) -> Result<DiskImage, DiskImageError> {
    let cursor = ByteCursor::new(bytes);
    if cursor.len() < HEADER_LEN || cursor.read_bytes(0, 19)? != MAGIC {
        return Err(DiskImageError::Format);
    }
    let major = cursor.read_u8(19)?;
    let minor = cursor.read_u8(20)?;
    let machine_name = decode_machine_name(cursor.read_bytes(21, 16)?);

    // Geometry starts with one (arbitrary) cylinder; fixed up below once the module count is known.
    let geometry = Geometry {
        cylinders: 1,
        heads: 1,
        sectors_per_track: SectorsPerTrack::Uniform(0),
        sector_size: 0,
        one_indexed_tracks: false,
    };
    let mut image = DiskImage::new(Variant::Vsf, geometry);
    image.metadata.insert("machine_name".to_string(), machine_name);
    image.metadata.insert("major".to_string(), major.to_string());
    image.metadata.insert("minor".to_string(), minor.to_string());

    let mut offset = HEADER_LEN;
    let mut module_index: u16 = 0;
    while offset < cursor.len() {
        let name_bytes = cursor.read_bytes(offset, 16)?;
        let module_major = cursor.read_u8(checked_add(offset, 16)?)?;
        let module_minor = cursor.read_u8(checked_add(offset, 17)?)?;
        let length = cursor.read_u32_le(checked_add(offset, 18)?)? as usize;
        if length < MODULE_HEADER_LEN {
            return Err(DiskImageError::Format);
        }
        let data_len = length - MODULE_HEADER_LEN;
        let data_off = checked_add(offset, MODULE_HEADER_LEN)?;
        let data = cursor.read_bytes(data_off, data_len)?.to_vec();

        image.geometry.cylinders = module_index + 1;
        image.set_track(module_index, 0, {
            let mut track = DiskTrack::new(DiskDataEncoding::Fm);
            track.raw_bitstream = Some(data);
            track
        })?;
        let module_name = decode_machine_name(name_bytes);
        image.metadata.insert(format!("module_{module_index}_name"), module_name);
        image
            .metadata
            .insert(format!("module_{module_index}_version"), format!("{module_major}.{module_minor}"));

        offset = checked_add(offset, length)?;
        module_index += 1;
    }

    image.mark_clean();
    Ok(image)
}

fn decode_machine_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

/// Locate the "CPU" module and return its raw state bytes. Returns
/// [`DiskImageError::Format`] when no CPU module was present in the snapshot (spec §8 boundary
/// scenario "VSF with no CPU module").
pub fn get_cpu_state(image: &DiskImage) -> Result<&[u8], DiskImageError> {
    for (name, value) in image.metadata.iter() {
        if let Some(index_str) = name.strip_prefix("module_").and_then(|s| s.strip_suffix("_name")) {
            if value == "CPU" {
                let index: u16 = index_str.parse().map_err(|_| DiskImageError::Format)?;
                return image
                    .track(index, 0)
                    .and_then(|t| t.raw_bitstream.as_deref())
                    .ok_or(DiskImageError::Format);
            }
        }
    }
    Err(DiskImageError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_module(name: &str, data: &[u8]) -> Vec<u8> {
        let mut module = vec![0u8; MODULE_HEADER_LEN];
        let name_bytes = name.as_bytes();
        module[0..name_bytes.len()].copy_from_slice(name_bytes);
        module[16] = 1; // major
        module[17] = 0; // minor
        let length = (MODULE_HEADER_LEN + data.len()) as u32;
        module[18..22].copy_from_slice(&length.to_le_bytes());
        module.extend_from_slice(data);
        module
    }

    fn build_vsf(modules: &[(&str, &[u8])]) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..19].copy_from_slice(MAGIC);
        bytes[19] = 2;
        bytes[20] = 0;
        let machine = b"C64";
        bytes[21..21 + machine.len()].copy_from_slice(machine);
        for (name, data) in modules {
            bytes.extend_from_slice(&build_module(name, data));
        }
        bytes
    }

    #[test]
    fn probe_recognizes_the_magic() {
        let bytes = build_vsf(&[("CPU", &[1, 2, 3])]);
        assert_eq!(probe(&bytes), Some(95));
    }

    #[test]
    fn parse_recovers_each_module_by_index() {
        let bytes = build_vsf(&[("CPU", &[1, 2, 3]), ("VIC-II", &[4, 5])]);
        let image = parse(&bytes).unwrap();
        assert_eq!(image.track(0, 0).unwrap().raw_bitstream.as_deref(), Some(&[1, 2, 3][..]));
        assert_eq!(image.track(1, 0).unwrap().raw_bitstream.as_deref(), Some(&[4, 5][..]));
        assert_eq!(image.metadata.get("module_0_name").unwrap(), "CPU");
    }

    #[test]
    fn get_cpu_state_finds_the_cpu_module() {
        let bytes = build_vsf(&[("VIC-II", &[9]), ("CPU", &[0xAA, 0xBB])]);
        let image = parse(&bytes).unwrap();
        assert_eq!(get_cpu_state(&image).unwrap(), &[0xAA, 0xBB]);
    }

    #[test]
    fn get_cpu_state_errors_when_absent() {
        let bytes = build_vsf(&[("VIC-II", &[9])]);
        let image = parse(&bytes).unwrap();
        assert!(matches!(get_cpu_state(&image), Err(DiskImageError::Format)));
    }
}

/*
    src/flux/kryoflux.rs

    KryoFlux stream set resolution (SPEC_FULL §4.C ADDED). A KryoFlux capture is not a single file:
    each track/head pair lands in its own `<base><cyl:02>.<head>.raw` file, sharing a directory.
    This is a flux-capture-abstraction file source, not a [`crate::file_parsers`] container parser —
    there is no single-file byte layout to probe or round-trip, only a naming convention to expand
    into the set of files backing one [`crate::containers::DiskImage`].
*/
use std::path::{Path, PathBuf};

use crate::chs::Geometry;
use crate::DiskImageError;

/// Expand a single KryoFlux stream filename (e.g. `track00.0.raw`) into every file in its set,
/// alongside the cylinder/head extent actually found on disk. `directory` overrides the directory
/// listing (used when the set was extracted from an archive rather than read from a filesystem).
pub fn expand_stream_set(filepath: &Path, directory: Option<Vec<PathBuf>>) -> Result<(Vec<PathBuf>, Geometry), DiskImageError> {
    let base_path = filepath.parent().unwrap_or_else(|| Path::new(""));
    let base_name = filepath.file_name().ok_or(DiskImageError::ParameterError)?;

    let re = regex::Regex::new(r"(.*)(\d{2})\.(\d)\.raw$").map_err(|_| DiskImageError::Format)?;
    let base_name_str = base_name.to_str().ok_or(DiskImageError::ParameterError)?;
    let Some(caps) = re.captures(base_name_str) else {
        return Err(DiskImageError::Format);
    };
    let stem = caps.get(1).ok_or(DiskImageError::Format)?.as_str().to_ascii_lowercase();

    let listing = match directory {
        Some(d) => d,
        None => std::fs::read_dir(base_path)?
            .map(|res| res.map(|entry| entry.path()))
            .collect::<std::io::Result<Vec<PathBuf>>>()?,
    };

    let mut set = Vec::new();
    let mut max_cyl: u16 = 0;
    let mut max_head: u8 = 0;
    let mut found_any = false;

    // A KryoFlux set never exceeds 84 cylinders x 2 heads in practice; this bound only governs how
    // far the probe for missing tracks searches, not an allocation size.
    const MAX_PROBE_CYLINDERS: u16 = 84;
    let mut consecutive_misses = 0u16;
    let mut cyl = 0u16;
    while cyl < MAX_PROBE_CYLINDERS && consecutive_misses < 2 {
        let mut any_this_cyl = false;
        for head in 0..2u8 {
            let candidate = format!("{stem}{cyl:02}.{head}.raw");
            if let Some(path) = listing
                .iter()
                .find(|p| p.file_name().and_then(|n| n.to_str()).map(|n| n.to_ascii_lowercase()) == Some(candidate.clone()))
            {
                set.push(path.clone());
                max_cyl = max_cyl.max(cyl);
                max_head = max_head.max(head);
                found_any = true;
                any_this_cyl = true;
            }
        }
        consecutive_misses = if any_this_cyl { 0 } else { consecutive_misses + 1 };
        cyl += 1;
    }

    if !found_any {
        return Err(DiskImageError::Format);
    }

    let geometry = Geometry {
        cylinders: max_cyl + 1,
        heads: max_head + 1,
        sectors_per_track: crate::chs::SectorsPerTrack::Uniform(0),
        sector_size: 0,
        one_indexed_tracks: false,
    };
    Ok((set, geometry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_rejects_non_matching_filename() {
        let result = expand_stream_set(Path::new("/tmp/whatever.img"), Some(Vec::new()));
        assert!(matches!(result, Err(DiskImageError::Format)));
    }

    #[test]
    fn expand_finds_all_files_in_provided_listing() {
        let listing = vec![
            PathBuf::from("/tmp/track00.0.raw"),
            PathBuf::from("/tmp/track00.1.raw"),
            PathBuf::from("/tmp/track01.0.raw"),
            PathBuf::from("/tmp/track01.1.raw"),
        ];
        let (set, geometry) = expand_stream_set(Path::new("/tmp/track00.0.raw"), Some(listing)).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(geometry.cylinders, 2);
        assert_eq!(geometry.heads, 2);
    }

    #[test]
    fn expand_stops_after_two_consecutive_missing_cylinders() {
        let listing = vec![
            PathBuf::from("/tmp/track00.0.raw"),
            PathBuf::from("/tmp/track00.1.raw"),
        ];
        let (set, geometry) = expand_stream_set(Path::new("/tmp/track00.0.raw"), Some(listing)).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(geometry.cylinders, 1);
    }
}

/*
    unifloppy_cli
    https://github.com/example/unifloppy

    Copyright 2024-2025 Unified Floppy Tool contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the "Software"),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/
use std::path::PathBuf;

use bpaf::*;
use sha2::{Digest, Sha256};
use unifloppy::session::Session;
use unifloppy::DiskImage;

use crate::args::{in_file_parser, GlobalOptions};
use crate::exit::{CliError, CliStage};

#[derive(Clone, Debug)]
pub struct VerifyParams {
    pub in_file: PathBuf,
    pub session: Option<PathBuf>,
}

pub(crate) fn verify_parser() -> impl Parser<VerifyParams> {
    let in_file = in_file_parser();
    let session = long("session")
        .help("A previously recorded session document; verifies this input reproduces its output hash")
        .argument::<PathBuf>("SESSION_FILE")
        .optional();
    construct!(VerifyParams { in_file, session })
}

pub(crate) fn run(global: &GlobalOptions, params: &VerifyParams) -> Result<(), CliError> {
    let bytes = std::fs::read(&params.in_file)
        .map_err(|e| CliError::new(CliStage::Read, format!("could not read {}: {e}", params.in_file.display())))?;

    if let Some(session_path) = &params.session {
        return verify_against_session(global, &bytes, session_path);
    }

    verify_round_trip(global, &bytes)
}

/// Reproducibility check (spec §4.I, §8): reissuing the same input against a recorded session
/// must produce the same output hash.
fn verify_against_session(global: &GlobalOptions, bytes: &[u8], session_path: &std::path::Path) -> Result<(), CliError> {
    let json = std::fs::read_to_string(session_path)
        .map_err(|e| CliError::new(CliStage::Read, format!("could not read session {}: {e}", session_path.display())))?;
    let session = Session::from_json(&json).map_err(|e| CliError::from_disk_error(CliStage::Read, e))?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let actual = hex::encode(hasher.finalize());

    let expected = session.output.hash.as_deref().ok_or_else(|| {
        CliError::new(CliStage::Verify, "session document carries no output hash to compare against".to_string())
    })?;

    if actual != expected {
        return Err(CliError::new(
            CliStage::Verify,
            format!("output hash mismatch: expected {expected}, got {actual}"),
        ));
    }

    if !global.quiet {
        println!("OK: input reproduces the recorded session's output hash ({actual})");
    }
    Ok(())
}

/// Round-trip check (spec §8 property 1): `parse(write(parse(bytes))) ≡ parse(bytes)`.
fn verify_round_trip(global: &GlobalOptions, bytes: &[u8]) -> Result<(), CliError> {
    let original = DiskImage::open_bytes(bytes).map_err(|e| CliError::from_disk_error(CliStage::Read, e))?;

    if !original.variant.is_writable() {
        if !global.quiet {
            println!(
                "OK: {} parsed successfully ({} has no writer, skipping round-trip)",
                original.variant.name(),
                original.variant.name()
            );
        }
        return Ok(());
    }

    let rewritten = original
        .save_bytes()
        .map_err(|e| CliError::from_disk_error(CliStage::Verify, e))?;
    let reparsed = DiskImage::open_bytes(&rewritten).map_err(|e| CliError::from_disk_error(CliStage::Verify, e))?;

    let geometry_matches = reparsed.geometry.cylinders == original.geometry.cylinders
        && reparsed.geometry.heads == original.geometry.heads
        && reparsed.geometry.sector_size == original.geometry.sector_size;
    if reparsed.variant != original.variant || !geometry_matches {
        return Err(CliError::new(
            CliStage::Verify,
            "round-trip mismatch: variant or geometry changed after re-encoding".to_string(),
        ));
    }

    for (addr, track) in &original.tracks {
        let Some(reparsed_track) = reparsed.tracks.get(addr) else {
            return Err(CliError::new(CliStage::Verify, format!("round-trip dropped track {addr:?}")));
        };
        if track.sectors.len() != reparsed_track.sectors.len() {
            return Err(CliError::new(CliStage::Verify, format!("round-trip changed sector count on track {addr:?}")));
        }
        for (original_sector, reparsed_sector) in track.sectors.iter().zip(reparsed_track.sectors.iter()) {
            if original_sector.payload != reparsed_sector.payload {
                return Err(CliError::new(
                    CliStage::Verify,
                    format!("round-trip changed payload of sector {:?} on track {addr:?}", original_sector.id),
                ));
            }
        }
    }

    if !global.quiet {
        println!("OK: {} round-trips byte-for-byte through parse/write/parse", original.variant.name());
    }
    Ok(())
}

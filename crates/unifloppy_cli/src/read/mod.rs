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
pub mod args;

use unifloppy::session::{HardwareSnapshot, Session, SessionOperation, SessionState, TrackResult, TrackStatus};
use unifloppy::DiskImage;

use crate::args::GlobalOptions;
use crate::exit::{CliError, CliStage};
use crate::util::{now_unix, sessions_dir};
use args::ReadParams;

/// `read` (spec §6): decode a source image or flux capture and write it back out to a container
/// file, recording a [`Session`] of the run. Hardware capture (`--controller`/`--port`) is not
/// wired to a real device in this binary (spec §1 excludes vendor handshake details as an external
/// collaborator); requesting it surfaces `NoDevice` rather than silently falling back to the file.
pub(crate) fn run(global: &GlobalOptions, params: &ReadParams) -> Result<(), CliError> {
    if global.controller.is_some() || global.port.is_some() {
        return Err(CliError::no_device(
            "no hardware transport is attached in this build; omit --controller/--port to read a file",
        ));
    }

    let bytes = std::fs::read(&params.in_file)
        .map_err(|e| CliError::new(CliStage::Read, format!("could not read {}: {e}", params.in_file.display())))?;

    let image = DiskImage::open_bytes(&bytes).map_err(|e| CliError::from_disk_error(CliStage::Read, e))?;

    let out_bytes = image.save_bytes().map_err(|e| CliError::from_disk_error(CliStage::Write, e))?;
    std::fs::write(&params.out_file, &out_bytes)
        .map_err(|e| CliError::new(CliStage::Write, format!("could not write {}: {e}", params.out_file.display())))?;

    let mut session = Session::new(format!("read-{}", now_unix()), SessionOperation::Read, now_unix());
    session.set_hardware(HardwareSnapshot {
        transport: Some(unifloppy::session::TransportKindTag::FileBacked),
        ..Default::default()
    });
    if let Some(profile) = &global.profile {
        session.set_profile(profile.clone());
    }
    session.set_format(image.variant.name());
    session.set_parameter("retries", global.retries.to_string());
    for (&(cyl, head), track) in &image.tracks {
        let bad = track.sectors.iter().filter(|s| s.flags.crc_bad).count() as u32;
        let total = track.sectors.len() as u32;
        session.add_track_result(TrackResult {
            cyl,
            head,
            status: if total == 0 {
                TrackStatus::Warning
            } else if bad == 0 {
                TrackStatus::Good
            } else if bad < total {
                TrackStatus::Warning
            } else {
                TrackStatus::Error
            },
            good_sectors: total - bad,
            total_sectors: total,
            confidence: if total == 0 { 0 } else { (100 - (bad * 100 / total.max(1))) as u8 },
            retries: global.retries,
            protection: None,
            errors: Vec::new(),
        });
    }
    session.set_output(params.out_file.to_string_lossy(), &out_bytes);
    session
        .end(SessionState::Complete, now_unix())
        .map_err(|e| CliError::from_disk_error(CliStage::Generic, e))?;
    let _ = session.auto_save(&sessions_dir());

    if !global.quiet {
        println!(
            "read {} ({}) -> {} ({} bytes, {} tracks)",
            params.in_file.display(),
            image.variant.name(),
            params.out_file.display(),
            out_bytes.len(),
            image.tracks.len()
        );
    }
    Ok(())
}

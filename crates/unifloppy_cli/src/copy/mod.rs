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

use unifloppy::session::{Session, SessionOperation, SessionState, TrackResult, TrackStatus};
use unifloppy::DiskImage;

use crate::args::GlobalOptions;
use crate::exit::{CliError, CliStage};
use crate::util::{now_unix, sessions_dir};
use args::CopyParams;

/// `copy` (spec §6): convert a disk image between container formats. With no `--format`, this is
/// a straight re-encode through the same variant (useful to normalize a file that round-trips with
/// layout freedom, e.g. HFE/SCP); with `--format`, the destination variant's writer must accept the
/// source's geometry and sectors, or the copy fails with `Write`.
pub(crate) fn run(global: &GlobalOptions, params: &CopyParams) -> Result<(), CliError> {
    let bytes = std::fs::read(&params.in_file)
        .map_err(|e| CliError::new(CliStage::Read, format!("could not read {}: {e}", params.in_file.display())))?;
    let mut image = DiskImage::open_bytes(&bytes).map_err(|e| CliError::from_disk_error(CliStage::Read, e))?;

    let source_variant = image.variant;
    if let Some(format) = &params.format {
        image.variant = format.0;
        image.mark_dirty();
    }

    let out_bytes = image.save_bytes().map_err(|e| CliError::from_disk_error(CliStage::Write, e))?;
    std::fs::write(&params.out_file, &out_bytes)
        .map_err(|e| CliError::new(CliStage::Write, format!("could not write {}: {e}", params.out_file.display())))?;

    let mut session = Session::new(format!("copy-{}", now_unix()), SessionOperation::Copy, now_unix());
    if let Some(profile) = &global.profile {
        session.set_profile(profile.clone());
    }
    session.set_format(image.variant.name());
    session.set_parameter("source_format", source_variant.name());
    for (&(cyl, head), track) in &image.tracks {
        session.add_track_result(TrackResult {
            cyl,
            head,
            status: TrackStatus::Good,
            good_sectors: track.sectors.len() as u32,
            total_sectors: track.sectors.len() as u32,
            confidence: 100,
            retries: 0,
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
            "copy {} ({}) -> {} ({})",
            params.in_file.display(),
            source_variant.name(),
            params.out_file.display(),
            image.variant.name()
        );
    }
    Ok(())
}

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

use unifloppy::containers::{DiskImage, DiskTrack, Sector, SectorFlags};
use unifloppy::session::{HardwareSnapshot, Session, SessionOperation, SessionState, TrackResult, TrackStatus};
use unifloppy::transaction::{OperationKind, Transaction, TransactionOperation, TransactionOptions};

use crate::args::GlobalOptions;
use crate::exit::{CliError, CliStage};
use crate::util::{now_unix, sessions_dir};
use args::WriteParams;

/// `write` (spec §6, §4.H): stage every sector of the source image as a [`Transaction`] against a
/// freshly zeroed destination image sharing its geometry, so the run exercises the real
/// backup/commit/rollback machinery rather than a plain file copy. As with `read`, a request for a
/// hardware destination (`--controller`/`--port`) surfaces `NoDevice`; only file-backed
/// destinations are wired up in this binary.
pub(crate) fn run(global: &GlobalOptions, params: &WriteParams) -> Result<(), CliError> {
    if global.controller.is_some() || global.port.is_some() {
        return Err(CliError::no_device(
            "no hardware transport is attached in this build; omit --controller/--port to write a file",
        ));
    }

    let bytes = std::fs::read(&params.in_file)
        .map_err(|e| CliError::new(CliStage::Read, format!("could not read {}: {e}", params.in_file.display())))?;
    let source = DiskImage::open_bytes(&bytes).map_err(|e| CliError::from_disk_error(CliStage::Read, e))?;

    let mut dest = DiskImage::new(source.variant, source.geometry.clone());
    for (&(cyl, head), track) in &source.tracks {
        let mut dest_track = DiskTrack::new(track.encoding);
        for sector in &track.sectors {
            let blank = Sector::new(sector.id, vec![0u8; sector.payload.len()], SectorFlags::default(), 0)
                .map_err(|e| CliError::from_disk_error(CliStage::Write, e))?;
            dest_track.sectors.push(blank);
        }
        dest.set_track(cyl, head, dest_track)
            .map_err(|e| CliError::from_disk_error(CliStage::Write, e))?;
    }

    let log_path = params.out_file.with_extension("txn.log");
    let mut txn = Transaction::begin(TransactionOptions {
        create_backup: !params.no_backup,
        auto_rollback: !params.no_backup,
        log_path: Some(log_path),
        abort_check: None,
    })
    .map_err(|e| CliError::from_disk_error(CliStage::Write, e))?;

    for (&(cyl, head), track) in &source.tracks {
        for sector in &track.sectors {
            txn.add_op(TransactionOperation::new(
                OperationKind::WriteSector {
                    sector: sector.id.s(),
                    payload: sector.payload.clone(),
                },
                cyl,
                head,
            ))
            .map_err(|e| CliError::from_disk_error(CliStage::Write, e))?;
        }
    }

    let result = txn.commit(&mut dest).map_err(|e| CliError::from_disk_error(CliStage::Write, e))?;
    if result.failed_ops > 0 {
        return Err(CliError::new(
            CliStage::Write,
            format!(
                "transaction ended in state {:?} after {} of {} ops failed",
                result.final_state, result.failed_ops, result.total_ops
            ),
        ));
    }

    let out_bytes = dest.save_bytes().map_err(|e| CliError::from_disk_error(CliStage::Write, e))?;
    std::fs::write(&params.out_file, &out_bytes)
        .map_err(|e| CliError::new(CliStage::Write, format!("could not write {}: {e}", params.out_file.display())))?;

    let mut session = Session::new(format!("write-{}", now_unix()), SessionOperation::Write, now_unix());
    session.set_hardware(HardwareSnapshot::default());
    if let Some(profile) = &global.profile {
        session.set_profile(profile.clone());
    }
    session.set_format(dest.variant.name());
    session.set_parameter("ops_committed", result.succeeded_ops.to_string());
    for (&(cyl, head), track) in &dest.tracks {
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
            "write {} -> {} committed {} ops ({} bytes)",
            params.in_file.display(),
            params.out_file.display(),
            result.succeeded_ops,
            out_bytes.len()
        );
    }
    Ok(())
}

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
use unifloppy::DiskImage;

use crate::args::{in_file_parser, GlobalOptions};
use crate::exit::{CliError, CliStage};

#[derive(Clone, Debug)]
pub struct InfoParams {
    pub in_file: PathBuf,
}

pub(crate) fn info_parser() -> impl Parser<InfoParams> {
    let in_file = in_file_parser();
    construct!(InfoParams { in_file })
}

pub(crate) fn run(global: &GlobalOptions, params: &InfoParams) -> Result<(), CliError> {
    let bytes = std::fs::read(&params.in_file)
        .map_err(|e| CliError::new(CliStage::Read, format!("could not read {}: {e}", params.in_file.display())))?;

    let image = DiskImage::open_bytes(&bytes).map_err(|e| CliError::from_disk_error(CliStage::Read, e))?;

    if global.quiet {
        return Ok(());
    }

    println!("variant:       {}", image.variant.name());
    println!("writable:      {}", image.variant.is_writable());
    println!("cylinders:     {}", image.geometry.cylinders);
    println!("heads:         {}", image.geometry.heads);
    println!("sector size:   {}", image.geometry.sector_size);
    println!("tracks stored: {}", image.tracks.len());

    let mut total_sectors = 0usize;
    let mut bad_sectors = 0usize;
    for track in image.tracks.values() {
        total_sectors += track.sectors.len();
        bad_sectors += track.sectors.iter().filter(|s| s.flags.crc_bad).count();
    }
    println!("sectors:       {total_sectors} ({bad_sectors} with a bad CRC)");
    println!("errata:        {}", image.errata.len());

    if !image.metadata.is_empty() {
        println!("metadata:");
        for (key, value) in &image.metadata {
            println!("  {key}: {value}");
        }
    }

    Ok(())
}

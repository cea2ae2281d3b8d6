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
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    str::FromStr,
};

use bpaf::*;
use unifloppy::containers::Variant;

use crate::{copy::args::CopyParams, info::InfoParams, read::args::ReadParams, verify::VerifyParams, write::args::WriteParams};

/// A thin wrapper over [`Variant`] with a `FromStr` impl so it can be used as a `bpaf` argument
/// type; `Variant` itself only exposes a display name, not a parser (spec §6 `--format`).
#[derive(Copy, Clone, Debug)]
pub struct FormatArg(pub Variant);

impl FromStr for FormatArg {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let variant = match input.to_ascii_lowercase().as_str() {
            "raw" | "img" => Variant::Raw,
            "d64" => Variant::D64,
            "g64" => Variant::G64,
            "scp" => Variant::Scp,
            "hfe" => Variant::Hfe,
            "t64" => Variant::T64,
            "sid" => Variant::Sid,
            "vsf" => Variant::Vsf,
            "cvt" => Variant::Cvt,
            "jv3" => Variant::Jv3,
            other => return Err(format!("unrecognized container format '{other}'")),
        };
        Ok(FormatArg(variant))
    }
}

impl Display for FormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.name())
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Command {
    Version,
    Read(ReadParams),
    Write(WriteParams),
    Copy(CopyParams),
    Info(InfoParams),
    Verify(VerifyParams),
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Version => write!(f, "version"),
            Command::Read(_) => write!(f, "read"),
            Command::Write(_) => write!(f, "write"),
            Command::Copy(_) => write!(f, "copy"),
            Command::Info(_) => write!(f, "info"),
            Command::Verify(_) => write!(f, "verify"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct AppParams {
    pub global: GlobalOptions,
    pub command: Command,
}

/// Options shared by every subcommand (spec §6 CLI surface flags that apply across `read`,
/// `write`, and `copy`: hardware selection and the retry policy).
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub profile: Option<String>,
    pub controller: Option<String>,
    pub port: Option<String>,
    pub retries: u32,
}

pub fn global_options_parser() -> impl Parser<GlobalOptions> {
    let quiet = long("quiet").help("Suppress informational output").switch();
    let profile = long("profile")
        .help("PLL/geometry profile name (e.g. c64-1541, ibm-pc-1440, amiga-dd)")
        .argument::<String>("PROFILE")
        .optional();
    let controller = long("controller")
        .help("Hardware controller backend: greaseweazle, kryoflux, supercardpro")
        .argument::<String>("CONTROLLER")
        .optional();
    let port = long("port")
        .help("Serial/USB port of the capture device")
        .argument::<String>("PORT")
        .optional();
    let retries = long("retries")
        .help("Number of times to retry a failed track read")
        .argument::<u32>("N")
        .fallback(0);

    construct!(GlobalOptions {
        quiet,
        profile,
        controller,
        port,
        retries,
    })
}

pub(crate) fn in_file_parser() -> impl Parser<PathBuf> {
    positional::<PathBuf>("INPUT").help("Path to the input disk image")
}

pub(crate) fn out_file_parser() -> impl Parser<PathBuf> {
    long("output")
        .short('o')
        .argument::<PathBuf>("OUTPUT_FILE")
        .help("Path to the output file")
}

pub(crate) fn format_parser() -> impl Parser<Option<FormatArg>> {
    long("format")
        .short('f')
        .help("Target container format: raw, d64, g64, scp, hfe, t64, sid, vsf, cvt, jv3")
        .argument::<FormatArg>("FORMAT")
        .optional()
}

pub(crate) fn command_parser() -> impl Parser<AppParams> {
    let global = global_options_parser();

    let version = pure(Command::Version)
        .to_options()
        .command("version")
        .help("Display version information and exit");

    let read = construct!(Command::Read(crate::read::args::read_parser()))
        .to_options()
        .command("read")
        .help("Read a disk image or flux capture and write it to a container file");

    let write = construct!(Command::Write(crate::write::args::write_parser()))
        .to_options()
        .command("write")
        .help("Write a disk image to a device or container file via the transaction engine");

    let copy = construct!(Command::Copy(crate::copy::args::copy_parser()))
        .to_options()
        .command("copy")
        .help("Convert a disk image between container formats");

    let info = construct!(Command::Info(crate::info::info_parser()))
        .to_options()
        .command("info")
        .help("Display information about a disk image");

    let verify = construct!(Command::Verify(crate::verify::verify_parser()))
        .to_options()
        .command("verify")
        .help("Verify a disk image round-trips or matches a recorded session");

    let command = construct!([version, read, write, copy, info, verify]);

    construct!(AppParams { global, command })
}

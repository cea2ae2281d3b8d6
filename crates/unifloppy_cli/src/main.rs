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
pub mod copy;
pub mod exit;
pub mod info;
pub mod read;
pub mod util;
pub mod verify;
pub mod write;

use bpaf::Parser;

use crate::args::Command;
use crate::exit::CliError;
use args::command_parser;

fn main() {
    env_logger::init();

    let app_params = command_parser().run();

    let command_result: Result<(), CliError> = match &app_params.command {
        Command::Version => {
            println!("unifloppy v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Read(params) => read::run(&app_params.global, params),
        Command::Write(params) => write::run(&app_params.global, params),
        Command::Copy(params) => copy::run(&app_params.global, params),
        Command::Info(params) => info::run(&app_params.global, params),
        Command::Verify(params) => verify::run(&app_params.global, params),
    };

    if let Err(e) = command_result {
        eprintln!("unifloppy: {} command failed: {e}", app_params.command);
        std::process::exit(e.exit_code());
    }
}

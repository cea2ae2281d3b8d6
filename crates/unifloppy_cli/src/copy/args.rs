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

use crate::args::{format_parser, in_file_parser, out_file_parser, FormatArg};

#[derive(Clone, Debug)]
pub struct CopyParams {
    pub in_file: PathBuf,
    pub out_file: PathBuf,
    pub format: Option<FormatArg>,
}

pub(crate) fn copy_parser() -> impl Parser<CopyParams> {
    let in_file = in_file_parser();
    let out_file = out_file_parser();
    let format = format_parser();
    construct!(CopyParams { in_file, out_file, format })
}

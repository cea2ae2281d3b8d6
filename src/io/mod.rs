/*
    src/io/mod.rs

    Safe I/O & bounds primitives (spec §4.A). `ReadSeek`/`ReadWriteSeek` are thin marker traits
    over the standard library's `Read + Seek` so parser entry points can be generic over "a file"
    or "an in-memory cursor" without caring which. `ByteCursor` (in `cursor`) is the bounds-checked
    slice view every container parser consumes instead of raw pointer/length pairs.
*/
pub mod cursor;

use std::io::{BufReader, BufWriter, Read, Seek, Write};

pub use cursor::ByteCursor;

/// Default buffer size for [`buffered_reader`]/[`buffered_writer`]. Chosen to batch small reads
/// and writes into single OS calls on every hot path that would otherwise pay a per-byte syscall
/// (the transaction engine's backup save path is the known beneficiary; see spec §4.A, §9).
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

pub trait ReadWriteSeek: Read + Write + Seek {}
impl<T: Read + Write + Seek> ReadWriteSeek for T {}

/// Wrap `source` in a buffered reader sized per [`DEFAULT_BUFFER_SIZE`].
pub fn buffered_reader<R: Read>(source: R) -> BufReader<R> {
    BufReader::with_capacity(DEFAULT_BUFFER_SIZE, source)
}

/// Wrap `sink` in a buffered writer sized per [`DEFAULT_BUFFER_SIZE`].
pub fn buffered_writer<W: Write>(sink: W) -> BufWriter<W> {
    BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, sink)
}

pub(crate) fn stream_len<T: Seek>(source: &mut T) -> std::io::Result<u64> {
    let len = source.seek(std::io::SeekFrom::End(0))?;
    source.seek(std::io::SeekFrom::Start(0))?;
    Ok(len)
}

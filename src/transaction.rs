/*
    src/transaction.rs

    Write Transaction Engine (spec §4.H): groups write operations against an open [`DiskImage`],
    snapshots pre-images, commits in insertion order, and rolls back in reverse execution order on
    failure. The state machine and backup/log formats follow the spec's contracts verbatim; the
    backup-persistence shim (native-endian legacy `size_t` read falling back from u64 LE, SPEC_FULL
    §4.H) lives in [`load_backups`].
*/
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::containers::{DiskImage, DiskTrack, Sector, SectorFlags};
use crate::flux::FluxRevolution;
use crate::io::{buffered_reader, buffered_writer};
use crate::{checked_add, DiskImageError, MAX_TRANSACTION_OPS};

/// Transaction lifecycle state (spec §4.H state machine).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Pending,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
    Failed,
    Aborted,
}

/// The kind of mutation one operation performs. Each variant carries exactly the payload it needs
/// to execute; `backup` (on [`TransactionOperation`]) carries whatever bytes are needed to undo it,
/// in a format private to this module.
#[derive(Clone, Debug)]
pub enum OperationKind {
    WriteSector { sector: u8, payload: Vec<u8> },
    WriteTrack { payload: Vec<u8> },
    WriteFlux { revolution: FluxRevolution },
    FormatTrack { sector_size: usize, sector_count: u8 },
    EraseTrack,
}

/// One queued mutation (spec §3 `TransactionOperation`). Invariant: `executed ⇒
/// (backup.is_some() if the owning transaction's `create_backup` option was set)`, enforced in
/// [`Transaction::commit`].
#[derive(Clone, Debug)]
pub struct TransactionOperation {
    pub kind: OperationKind,
    pub cyl: u16,
    pub head: u8,
    pub executed: bool,
    pub backup: Option<Vec<u8>>,
    pub result: Option<DiskImageError>,
}

impl TransactionOperation {
    pub fn new(kind: OperationKind, cyl: u16, head: u8) -> Self {
        Self {
            kind,
            cyl,
            head,
            executed: false,
            backup: None,
            result: None,
        }
    }
}

/// Options governing one transaction's commit behavior (spec §4.H `begin`).
pub struct TransactionOptions {
    pub create_backup: bool,
    pub auto_rollback: bool,
    pub log_path: Option<PathBuf>,
    /// Polled between ops during commit; returning `true` aborts the remaining ops.
    pub abort_check: Option<Box<dyn Fn() -> bool>>,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            auto_rollback: true,
            log_path: None,
            abort_check: None,
        }
    }
}

impl std::fmt::Debug for TransactionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionOptions")
            .field("create_backup", &self.create_backup)
            .field("auto_rollback", &self.auto_rollback)
            .field("log_path", &self.log_path)
            .field("abort_check", &self.abort_check.is_some())
            .finish()
    }
}

/// Per-kind operation counts and elapsed timings, returned by [`Transaction::commit`] (spec §4.H
/// "Result record").
#[derive(Debug, Clone, Default)]
pub struct TransactionResult {
    pub final_state: Option<&'static str>,
    pub first_error_index: Option<usize>,
    pub total_ops: usize,
    pub executed_ops: usize,
    pub succeeded_ops: usize,
    pub failed_ops: usize,
    pub rolled_back_ops: usize,
    pub commit_elapsed: Duration,
    pub rollback_elapsed: Duration,
}

/// A grouped sequence of write operations against one [`DiskImage`] (spec §3 `Transaction`, §4.H).
pub struct Transaction {
    pub state: TransactionState,
    pub ops: Vec<TransactionOperation>,
    pub options: TransactionOptions,
    log_writer: Option<std::io::BufWriter<std::fs::File>>,
    started_at: Instant,
    abort_requested: bool,
}

impl Transaction {
    /// `begin(disk, options)` (spec §4.H). The disk handle itself is borrowed only at `commit()`
    /// time; `begin` just opens the (optional) log file.
    pub fn begin(options: TransactionOptions) -> Result<Self, DiskImageError> {
        let log_writer = match &options.log_path {
            Some(path) => Some(buffered_writer(
                std::fs::OpenOptions::new().create(true).append(true).open(path)?,
            )),
            None => None,
        };
        let mut txn = Self {
            state: TransactionState::Idle,
            ops: Vec::new(),
            options,
            log_writer,
            started_at: Instant::now(),
            abort_requested: false,
        };
        txn.log_event("begin")?;
        Ok(txn)
    }

    fn log_event(&mut self, message: &str) -> Result<(), DiskImageError> {
        if let Some(writer) = &mut self.log_writer {
            writeln!(writer, "{message}")?;
            writer.flush()?;
        }
        Ok(())
    }

    /// `add_op(op)` (spec §4.H): rejects if state is not Idle or Pending; advances Idle→Pending.
    /// Max [`MAX_TRANSACTION_OPS`] ops.
    pub fn add_op(&mut self, op: TransactionOperation) -> Result<(), DiskImageError> {
        if !matches!(self.state, TransactionState::Idle | TransactionState::Pending) {
            return Err(DiskImageError::ParameterError);
        }
        if self.ops.len() >= MAX_TRANSACTION_OPS {
            return Err(DiskImageError::LimitExceeded("transaction operations"));
        }
        self.ops.push(op);
        self.state = TransactionState::Pending;
        Ok(())
    }

    /// `abort()` (spec §4.H). From Pending this skips commit entirely; from Committing it only
    /// raises a flag the commit loop polls between ops (the in-flight op is allowed to finish).
    pub fn abort(&mut self) -> Result<(), DiskImageError> {
        match self.state {
            TransactionState::Pending => {
                self.state = TransactionState::Aborted;
                self.log_event("abort")?;
                Ok(())
            }
            TransactionState::Committing => {
                self.abort_requested = true;
                Ok(())
            }
            _ => Err(DiskImageError::ParameterError),
        }
    }

    /// `commit()` (spec §4.H): executes every op in order, capturing a pre-image backup first when
    /// `create_backup` is set, polling `abort_check` between ops, and rolling back in reverse
    /// execution order on any failure when `auto_rollback` is set.
    pub fn commit(&mut self, disk: &mut DiskImage) -> Result<TransactionResult, DiskImageError> {
        if self.state != TransactionState::Pending {
            return Err(DiskImageError::ParameterError);
        }
        self.state = TransactionState::Committing;
        self.log_event("commit:start")?;
        let commit_start = Instant::now();

        let mut first_error_index = None;
        for i in 0..self.ops.len() {
            if self.abort_requested || self.options.abort_check.as_ref().is_some_and(|f| f()) {
                self.ops[i].result = Some(DiskImageError::Aborted);
                first_error_index = Some(i);
                break;
            }

            if self.options.create_backup {
                let backup = capture_backup(disk, &self.ops[i])?;
                self.ops[i].backup = Some(backup);
                self.log_event(&format!("commit:backup:{i}"))?;
            }

            let outcome = execute_op(disk, &self.ops[i]);
            self.ops[i].executed = true;
            match outcome {
                Ok(()) => {
                    self.log_event(&format!("commit:exec:{i}:ok"))?;
                }
                Err(e) => {
                    self.ops[i].result = Some(e);
                    self.log_event(&format!("commit:exec:{i}:err"))?;
                    first_error_index = Some(i);
                    break;
                }
            }
        }

        let commit_elapsed = commit_start.elapsed();
        let mut rollback_elapsed = Duration::default();

        let had_error = first_error_index.is_some();
        if had_error && self.options.auto_rollback {
            self.state = TransactionState::RollingBack;
            self.log_event("rollback:start")?;
            let rollback_start = Instant::now();
            let rollback_outcome = self.rollback(disk);
            rollback_elapsed = rollback_start.elapsed();
            match rollback_outcome {
                Ok(()) => {
                    self.state = TransactionState::RolledBack;
                    self.log_event("rollback:ok")?;
                }
                Err(_) => {
                    self.state = TransactionState::Failed;
                    self.log_event("rollback:err")?;
                }
            }
        } else if had_error {
            self.state = TransactionState::Failed;
        } else {
            self.state = TransactionState::Committed;
        }
        self.log_event(&format!("end:{:?}", self.state))?;

        let executed_ops = self.ops.iter().filter(|o| o.executed).count();
        let failed_ops = self.ops.iter().filter(|o| o.result.is_some()).count();
        let rolled_back_ops = if matches!(self.state, TransactionState::RolledBack | TransactionState::Failed) {
            self.ops
                .iter()
                .filter(|o| o.executed && o.result.is_none())
                .count()
        } else {
            0
        };

        Ok(TransactionResult {
            final_state: Some(state_name(self.state)),
            first_error_index,
            total_ops: self.ops.len(),
            executed_ops,
            succeeded_ops: executed_ops.saturating_sub(failed_ops),
            failed_ops,
            rolled_back_ops,
            commit_elapsed,
            rollback_elapsed,
        })
    }

    /// Restore backups for every executed, non-failed op, in reverse execution order.
    fn rollback(&mut self, disk: &mut DiskImage) -> Result<(), DiskImageError> {
        for op in self.ops.iter().rev() {
            if !op.executed || op.result.is_some() {
                continue;
            }
            let backup = op.backup.as_ref().ok_or(DiskImageError::NoBackup)?;
            restore_backup(disk, op, backup)?;
        }
        Ok(())
    }
}

fn state_name(state: TransactionState) -> &'static str {
    match state {
        TransactionState::Idle => "Idle",
        TransactionState::Pending => "Pending",
        TransactionState::Committing => "Committing",
        TransactionState::Committed => "Committed",
        TransactionState::RollingBack => "RollingBack",
        TransactionState::RolledBack => "RolledBack",
        TransactionState::Failed => "Failed",
        TransactionState::Aborted => "Aborted",
    }
}

/// Serialize a track's full sector list to a private byte encoding: `count: u32 LE`, then per
/// sector `cyl: u16 LE, head: u8, sector: u8, n: u8, len: u32 LE, payload`. Used as the backup
/// format for whole-track operations (WriteTrack/FormatTrack/EraseTrack).
fn encode_track_sectors(track: &DiskTrack) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(track.sectors.len() as u32).to_le_bytes());
    for sector in &track.sectors {
        out.extend_from_slice(&sector.id.c().to_le_bytes());
        out.push(sector.id.h());
        out.push(sector.id.s());
        out.push(sector.id.n());
        out.extend_from_slice(&(sector.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&sector.payload);
    }
    out
}

fn decode_track_sectors(bytes: &[u8]) -> Result<Vec<Sector>, DiskImageError> {
    use crate::chs::DiskChsn;
    let cursor = crate::io::cursor::ByteCursor::new(bytes);
    let mut pos = 0usize;
    let count = cursor.read_u32_le(pos)? as usize;
    pos = checked_add(pos, 4)?;
    let mut sectors = Vec::with_capacity(count);
    for _ in 0..count {
        let c = cursor.read_u16_le(pos)?;
        pos = checked_add(pos, 2)?;
        let h = cursor.read_u8(pos)?;
        pos = checked_add(pos, 1)?;
        let s = cursor.read_u8(pos)?;
        pos = checked_add(pos, 1)?;
        let n = cursor.read_u8(pos)?;
        pos = checked_add(pos, 1)?;
        let len = cursor.read_u32_le(pos)? as usize;
        pos = checked_add(pos, 4)?;
        let payload = cursor.read_bytes(pos, len)?.to_vec();
        pos = checked_add(pos, len)?;
        let id = DiskChsn::new(c, h, s, n);
        sectors.push(Sector::new(id, payload, SectorFlags::default(), 0)?);
    }
    Ok(sectors)
}

/// Serialize a track's flux revolutions to a private byte encoding: `count: u32 LE`, then per
/// revolution `index_period_ns: u32 LE, transition_count: u32 LE, transitions: u32 LE each`.
fn encode_revolutions(revolutions: &[FluxRevolution]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(revolutions.len() as u32).to_le_bytes());
    for rev in revolutions {
        out.extend_from_slice(&rev.index_period_ns.to_le_bytes());
        out.extend_from_slice(&(rev.transitions_ns.len() as u32).to_le_bytes());
        for t in &rev.transitions_ns {
            out.extend_from_slice(&t.to_le_bytes());
        }
    }
    out
}

fn decode_revolutions(bytes: &[u8]) -> Result<Vec<FluxRevolution>, DiskImageError> {
    let cursor = crate::io::cursor::ByteCursor::new(bytes);
    let mut pos = 0usize;
    let count = cursor.read_u32_le(pos)? as usize;
    pos = checked_add(pos, 4)?;
    let mut revs = Vec::with_capacity(count);
    for _ in 0..count {
        let index_period_ns = cursor.read_u32_le(pos)?;
        pos = checked_add(pos, 4)?;
        let t_count = cursor.read_u32_le(pos)? as usize;
        pos = checked_add(pos, 4)?;
        let mut transitions = Vec::with_capacity(t_count);
        for _ in 0..t_count {
            transitions.push(cursor.read_u32_le(pos)?);
            pos = checked_add(pos, 4)?;
        }
        revs.push(FluxRevolution::new(transitions, index_period_ns)?);
    }
    Ok(revs)
}

/// Capture the pre-image bytes for one op, in whatever encoding its kind requires to be restored.
fn capture_backup(disk: &DiskImage, op: &TransactionOperation) -> Result<Vec<u8>, DiskImageError> {
    let track = disk.track(op.cyl, op.head).ok_or(DiskImageError::IdError)?;
    match &op.kind {
        OperationKind::WriteSector { sector, .. } => {
            let existing = track.sector(*sector).ok_or(DiskImageError::IdError)?;
            Ok(existing.payload.clone())
        }
        OperationKind::WriteTrack { .. } | OperationKind::FormatTrack { .. } | OperationKind::EraseTrack => {
            Ok(encode_track_sectors(track))
        }
        OperationKind::WriteFlux { .. } => Ok(encode_revolutions(&track.revolutions)),
    }
}

/// Execute one op's mutation against `disk`. The caller has already captured a backup if required.
fn execute_op(disk: &mut DiskImage, op: &TransactionOperation) -> Result<(), DiskImageError> {
    match &op.kind {
        OperationKind::WriteSector { sector, payload } => disk.write_sector(op.cyl, op.head, *sector, payload),
        OperationKind::WriteTrack { payload } => {
            let track = disk.track_mut(op.cyl, op.head).ok_or(DiskImageError::IdError)?;
            write_track_payload(track, payload)
        }
        OperationKind::WriteFlux { revolution } => {
            let track = disk.track_mut(op.cyl, op.head).ok_or(DiskImageError::IdError)?;
            track.revolutions.clear();
            track.add_revolution(revolution.clone())
        }
        OperationKind::FormatTrack { sector_size, sector_count } => {
            let track = disk.track_mut(op.cyl, op.head).ok_or(DiskImageError::IdError)?;
            format_track(track, *sector_size, *sector_count)
        }
        OperationKind::EraseTrack => {
            let track = disk.track_mut(op.cyl, op.head).ok_or(DiskImageError::IdError)?;
            for sector in &mut track.sectors {
                sector.payload.iter_mut().for_each(|b| *b = 0);
            }
            Ok(())
        }
    }
}

/// Split `payload` across a track's existing sectors (in their current order) and overwrite each
/// one in place. Fails if the total length does not match the track's current total capacity.
fn write_track_payload(track: &mut DiskTrack, payload: &[u8]) -> Result<(), DiskImageError> {
    let total: usize = track.sectors.iter().map(|s| s.payload.len()).sum();
    if payload.len() != total {
        return Err(DiskImageError::Format);
    }
    let mut offset = 0usize;
    for sector in &mut track.sectors {
        let len = sector.payload.len();
        sector.payload.copy_from_slice(&payload[offset..checked_add(offset, len)?]);
        offset = checked_add(offset, len)?;
    }
    Ok(())
}

fn format_track(track: &mut DiskTrack, sector_size: usize, sector_count: u8) -> Result<(), DiskImageError> {
    use crate::chs::DiskChsn;
    let n = DiskChsn::bytes_to_n(sector_size);
    let cyl = track.sectors.first().map(|s| s.id.c()).unwrap_or(0);
    let head = track.sectors.first().map(|s| s.id.h()).unwrap_or(0);
    let mut sectors = Vec::with_capacity(sector_count as usize);
    for s in 0..sector_count {
        let id = DiskChsn::new(cyl, head, s, n);
        sectors.push(Sector::new(id, vec![0u8; sector_size], SectorFlags::default(), 0)?);
    }
    track.sectors = sectors;
    Ok(())
}

/// Restore one op's backup bytes against `disk`, undoing its mutation.
fn restore_backup(disk: &mut DiskImage, op: &TransactionOperation, backup: &[u8]) -> Result<(), DiskImageError> {
    match &op.kind {
        OperationKind::WriteSector { sector, .. } => disk.write_sector(op.cyl, op.head, *sector, backup),
        OperationKind::WriteTrack { .. } | OperationKind::FormatTrack { .. } | OperationKind::EraseTrack => {
            let sectors = decode_track_sectors(backup)?;
            let track = disk.track_mut(op.cyl, op.head).ok_or(DiskImageError::IdError)?;
            track.sectors = sectors;
            Ok(())
        }
        OperationKind::WriteFlux { .. } => {
            let revolutions = decode_revolutions(backup)?;
            let track = disk.track_mut(op.cyl, op.head).ok_or(DiskImageError::IdError)?;
            track.revolutions = revolutions;
            Ok(())
        }
    }
}

const BACKUP_MAGIC: &[u8; 4] = b"UFTB";
const BACKUP_VERSION: u32 = 1;

/// Save a transaction's captured backups to disk in the spec's backup-persistence format (spec §6
/// "Backup file"): magic `UFTB`, version (u32 LE), op count (u32 LE), then per op: cyl (u8), head
/// (u8), valid (u8), size (u64 LE), bytes.
pub fn save_backups(transaction: &Transaction, path: &Path) -> Result<(), DiskImageError> {
    let file = std::fs::File::create(path)?;
    let mut writer = buffered_writer(file);
    writer.write_all(BACKUP_MAGIC)?;
    writer.write_all(&BACKUP_VERSION.to_le_bytes())?;
    writer.write_all(&(transaction.ops.len() as u32).to_le_bytes())?;
    for op in &transaction.ops {
        writer.write_all(&(op.cyl as u8).to_le_bytes())?;
        writer.write_all(&op.head.to_le_bytes())?;
        match &op.backup {
            Some(bytes) => {
                writer.write_all(&[1u8])?;
                writer.write_all(&(bytes.len() as u64).to_le_bytes())?;
                writer.write_all(bytes)?;
            }
            None => {
                writer.write_all(&[0u8])?;
                writer.write_all(&0u64.to_le_bytes())?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Load backups previously saved by [`save_backups`]. Per SPEC_FULL §4.H, the legacy `size_t`
/// field is read as u64 LE first; if the resulting length exceeds the file's remaining bytes, the
/// same 8 bytes are reinterpreted as a native-endian `usize` and retried once, to tolerate files
/// written by a build whose native endianness/width differed (spec §6's "accept both for one
/// release" shim).
pub fn load_backups(path: &Path) -> Result<Vec<(u8, u8, Option<Vec<u8>>)>, DiskImageError> {
    let file = std::fs::File::open(path)?;
    let mut reader = buffered_reader(file);
    let mut whole = Vec::new();
    reader.read_to_end(&mut whole)?;

    let cursor = crate::io::cursor::ByteCursor::new(&whole);
    if cursor.len() < 12 || cursor.read_bytes(0, 4)? != BACKUP_MAGIC.as_slice() {
        return Err(DiskImageError::Format);
    }
    let _version = cursor.read_u32_le(4)?;
    let op_count = cursor.read_u32_le(8)? as usize;

    let mut pos = 12usize;
    let mut entries = Vec::with_capacity(op_count);
    for _ in 0..op_count {
        let cyl = cursor.read_u8(pos)?;
        pos = checked_add(pos, 1)?;
        let head = cursor.read_u8(pos)?;
        pos = checked_add(pos, 1)?;
        let valid = cursor.read_u8(pos)?;
        pos = checked_add(pos, 1)?;

        let size_le = cursor.read_u32_le(pos)? as u64
            | ((cursor.read_u32_le(checked_add(pos, 4)?)? as u64) << 32);
        let remaining_after_len = cursor.len().saturating_sub(checked_add(pos, 8)?);
        let size = if size_le as usize <= remaining_after_len {
            size_le as usize
        } else {
            // Legacy shim: reinterpret the same 8 bytes as a native-endian usize.
            let raw = cursor.read_bytes(pos, 8)?;
            let native = usize::from_ne_bytes(raw.try_into().map_err(|_| DiskImageError::Format)?);
            if native > remaining_after_len {
                return Err(DiskImageError::BackupTooLarge);
            }
            native
        };
        pos = checked_add(pos, 8)?;

        let bytes = if valid != 0 {
            let payload = cursor.read_bytes(pos, size)?.to_vec();
            Some(payload)
        } else {
            None
        };
        pos = checked_add(pos, size)?;
        entries.push((cyl, head, bytes));
    }
    Ok(entries)
}

/// `recover(disk, log_path)` (spec §4.H): a minimal reader for the text transaction log, used to
/// identify which logged operations executed without a matching rollback record after an
/// unclean shutdown. Returns the line indices of `commit:exec:N:ok` events with no corresponding
/// `rollback:ok`/`rollback:err` terminal line, i.e. operations the caller must decide to roll
/// forward or restore manually from a saved backup file.
pub fn recover(log_path: &Path) -> Result<Vec<usize>, DiskImageError> {
    let file = std::fs::File::open(log_path)?;
    let mut reader = buffered_reader(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    let mut executed = Vec::new();
    let mut rolled_back = false;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("commit:exec:") {
            if let Some(idx_str) = rest.strip_suffix(":ok") {
                if let Ok(idx) = idx_str.parse::<usize>() {
                    executed.push(idx);
                }
            }
        } else if line.starts_with("rollback:ok") {
            rolled_back = true;
        }
    }
    if rolled_back {
        Ok(Vec::new())
    } else {
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chs::{DiskChsn, Geometry, SectorsPerTrack};
    use crate::containers::{DiskImage, DiskTrack, Sector, SectorFlags, Variant};
    use crate::DiskDataEncoding;

    fn sample_disk() -> DiskImage {
        let geometry = Geometry {
            cylinders: 2,
            heads: 1,
            sectors_per_track: SectorsPerTrack::Uniform(2),
            sector_size: 256,
            one_indexed_tracks: false,
        };
        let mut disk = DiskImage::new(Variant::Raw, geometry);
        let mut track = DiskTrack::new(DiskDataEncoding::Mfm);
        track
            .sectors
            .push(Sector::new(DiskChsn::new(0, 0, 0, 1), vec![0xAAu8; 256], SectorFlags::default(), 0).unwrap());
        track
            .sectors
            .push(Sector::new(DiskChsn::new(0, 0, 1, 1), vec![0xBBu8; 256], SectorFlags::default(), 0).unwrap());
        disk.set_track(0, 0, track).unwrap();
        disk
    }

    #[test]
    fn add_op_rejects_past_transaction_ops_limit() {
        let mut txn = Transaction::begin(TransactionOptions {
            log_path: None,
            ..Default::default()
        })
        .unwrap();
        for _ in 0..MAX_TRANSACTION_OPS {
            txn.add_op(TransactionOperation::new(
                OperationKind::WriteSector { sector: 0, payload: vec![0u8; 256] },
                0,
                0,
            ))
            .unwrap();
        }
        let result = txn.add_op(TransactionOperation::new(
            OperationKind::WriteSector { sector: 0, payload: vec![0u8; 256] },
            0,
            0,
        ));
        assert!(matches!(result, Err(DiskImageError::LimitExceeded(_))));
    }

    #[test]
    fn commit_with_no_failures_reaches_committed() {
        let mut disk = sample_disk();
        let mut txn = Transaction::begin(TransactionOptions::default()).unwrap();
        txn.add_op(TransactionOperation::new(
            OperationKind::WriteSector { sector: 0, payload: vec![0xCCu8; 256] },
            0,
            0,
        ))
        .unwrap();
        let result = txn.commit(&mut disk).unwrap();
        assert_eq!(txn.state, TransactionState::Committed);
        assert_eq!(result.succeeded_ops, 1);
        assert_eq!(disk.read_sector(0, 0, 0).unwrap().payload, vec![0xCCu8; 256]);
    }

    #[test]
    fn failed_op_triggers_rollback_to_original_bytes() {
        let mut disk = sample_disk();
        let mut txn = Transaction::begin(TransactionOptions::default()).unwrap();
        // op 0 succeeds
        txn.add_op(TransactionOperation::new(
            OperationKind::WriteSector { sector: 0, payload: vec![0xCCu8; 256] },
            0,
            0,
        ))
        .unwrap();
        // op 1 fails: mismatched payload length against an existing sector
        txn.add_op(TransactionOperation::new(
            OperationKind::WriteSector { sector: 1, payload: vec![0u8; 10] },
            0,
            0,
        ))
        .unwrap();

        let result = txn.commit(&mut disk).unwrap();
        assert_eq!(txn.state, TransactionState::RolledBack);
        assert_eq!(result.first_error_index, Some(1));
        // op 0's target must equal its pre-image byte-for-byte after rollback.
        assert_eq!(disk.read_sector(0, 0, 0).unwrap().payload, vec![0xAAu8; 256]);
    }

    #[test]
    fn abort_from_pending_skips_commit() {
        let mut txn = Transaction::begin(TransactionOptions::default()).unwrap();
        txn.add_op(TransactionOperation::new(
            OperationKind::WriteSector { sector: 0, payload: vec![0u8; 256] },
            0,
            0,
        ))
        .unwrap();
        txn.abort().unwrap();
        assert_eq!(txn.state, TransactionState::Aborted);
    }

    #[test]
    fn backup_round_trips_through_save_and_load() {
        let mut disk = sample_disk();
        let mut txn = Transaction::begin(TransactionOptions::default()).unwrap();
        txn.add_op(TransactionOperation::new(
            OperationKind::WriteSector { sector: 0, payload: vec![0xCCu8; 256] },
            0,
            0,
        ))
        .unwrap();
        txn.commit(&mut disk).unwrap();

        let path = std::env::temp_dir().join(format!("unifloppy_txn_backup_test_{}.bin", std::process::id()));
        save_backups(&txn, &path).unwrap();
        let loaded = load_backups(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].2.as_ref().unwrap(), &vec![0xAAu8; 256]);
    }
}

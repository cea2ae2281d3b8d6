/*
    src/session.rs

    Session Record (spec §4.I, §6): groups one external-facing operation (read/write/copy) into a
    document that carries a hardware snapshot, configuration, per-track results, and an output
    digest. Serializes to the fixed JSON schema spec §6 names; unknown keys are ignored on load
    (`#[serde(default)]` on every optional field covers a document from an older minor version).
*/
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::flux::TransportKind;
use crate::DiskImageError;

/// The kind of external-facing operation one session records (spec §4.I "one external-facing
/// operation").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOperation {
    Read,
    Write,
    Copy,
    Verify,
}

/// Session lifecycle state (spec §4.I `end(final_state)`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Complete,
    Error,
    Cancelled,
}

/// Per-track outcome recorded as the operation proceeds (spec §4.I).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackResult {
    pub cyl: u16,
    pub head: u8,
    pub status: TrackStatus,
    pub good_sectors: u32,
    pub total_sectors: u32,
    pub confidence: u8,
    pub retries: u32,
    pub protection: Option<String>,
    pub errors: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    Good,
    Warning,
    Error,
    Protected,
}

/// The hardware snapshot (spec §4.I): controller, firmware, port, drive kind, geometry, measured
/// RPM, and (SPEC_FULL §4.I addition) the transport kind, so a reproduced session can tell a
/// file-backed re-decode apart from a live hardware capture without re-running anything.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub controller: Option<String>,
    pub firmware: Option<String>,
    pub port: Option<String>,
    pub drive_kind: Option<String>,
    pub geometry: Option<String>,
    pub measured_rpm: Option<f64>,
    #[serde(default)]
    pub transport: Option<TransportKindTag>,
}

/// A serializable mirror of [`TransportKind`]: the session document is a long-lived artifact and
/// should not break if the in-memory enum grows a variant, so this is kept as its own small copy
/// rather than deriving Serialize on [`TransportKind`] directly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKindTag {
    FileBacked,
    Greaseweazle,
    KryoFlux,
    SuperCardPro,
}

impl From<TransportKind> for TransportKindTag {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::FileBacked => TransportKindTag::FileBacked,
            TransportKind::Greaseweazle => TransportKindTag::Greaseweazle,
            TransportKind::KryoFlux => TransportKindTag::KryoFlux,
            TransportKind::SuperCardPro => TransportKindTag::SuperCardPro,
        }
    }
}

/// The output artifact's identity: file path, SHA-256 digest (hex), and size in bytes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputInfo {
    pub file: Option<String>,
    pub hash: Option<String>,
    pub size: Option<u64>,
}

/// Aggregate statistics computed from `tracks` at `end()` time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub tracks_total: u32,
    pub tracks_good: u32,
    pub tracks_warning: u32,
    pub tracks_error: u32,
    pub tracks_protected: u32,
}

/// A session document (spec §3 `SessionRecord`, §4.I, §6 "Persisted session document"). Field
/// names match the spec's fixed JSON schema exactly; unknown keys on load are ignored by serde's
/// default deserialization behavior (extra fields are simply skipped).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub version: u32,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub operation: SessionOperation,
    pub state: SessionState,
    #[serde(default)]
    pub hardware: HardwareSnapshot,
    pub profile: Option<String>,
    pub format: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub track_overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub tracks: Vec<TrackResult>,
    #[serde(default)]
    pub statistics: SessionStatistics,
    #[serde(default)]
    pub output: OutputInfo,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Current schema version written by this crate (spec §6 `version`).
pub const SESSION_SCHEMA_VERSION: u32 = 1;

impl Session {
    /// `new(operation)` (spec §4.I): a fresh session in [`SessionState::Idle`]. `now` is the
    /// caller-supplied Unix timestamp (seconds); this module never reads the system clock itself
    /// so that a session's output hash stays reproducible under the same inputs (spec §8).
    pub fn new(id: impl Into<String>, operation: SessionOperation, now: u64) -> Self {
        Self {
            id: id.into(),
            version: SESSION_SCHEMA_VERSION,
            start_time: now,
            end_time: None,
            operation,
            state: SessionState::Idle,
            hardware: HardwareSnapshot::default(),
            profile: None,
            format: None,
            parameters: BTreeMap::new(),
            track_overrides: BTreeMap::new(),
            tracks: Vec::new(),
            statistics: SessionStatistics::default(),
            output: OutputInfo::default(),
            notes: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn set_hardware(&mut self, hardware: HardwareSnapshot) {
        self.state = SessionState::Running;
        self.hardware = hardware;
    }

    pub fn set_profile(&mut self, profile: impl Into<String>) {
        self.profile = Some(profile.into());
    }

    pub fn set_format(&mut self, format: impl Into<String>) {
        self.format = Some(format.into());
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }

    /// Append one track's outcome and roll it into the running [`SessionStatistics`].
    pub fn add_track_result(&mut self, result: TrackResult) {
        self.statistics.tracks_total += 1;
        match result.status {
            TrackStatus::Good => self.statistics.tracks_good += 1,
            TrackStatus::Warning => self.statistics.tracks_warning += 1,
            TrackStatus::Error => self.statistics.tracks_error += 1,
            TrackStatus::Protected => self.statistics.tracks_protected += 1,
        }
        self.tracks.push(result);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Record the output artifact's path and bytes, computing its SHA-256 digest and size (spec
    /// §4.I "output file + its SHA-256 + size").
    pub fn set_output(&mut self, file: impl Into<String>, bytes: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        self.output = OutputInfo {
            file: Some(file.into()),
            hash: Some(hex::encode(digest)),
            size: Some(bytes.len() as u64),
        };
    }

    /// `end(final_state)` (spec §4.I): the terminal transition. `now` is again caller-supplied.
    pub fn end(&mut self, final_state: SessionState, now: u64) -> Result<(), DiskImageError> {
        if matches!(
            self.state,
            SessionState::Complete | SessionState::Error | SessionState::Cancelled
        ) {
            return Err(DiskImageError::ParameterError);
        }
        self.state = final_state;
        self.end_time = Some(now);
        log::debug!(
            "session {} ended: {:?} ({} tracks, {} warnings, {} errors)",
            self.id,
            self.state,
            self.tracks.len(),
            self.warnings.len(),
            self.errors.len()
        );
        Ok(())
    }

    /// Serialize to the fixed-schema JSON document (spec §6).
    pub fn to_json(&self) -> Result<String, DiskImageError> {
        serde_json::to_string_pretty(self).map_err(|e| DiskImageError::Io(e.to_string()))
    }

    /// Deserialize a session document. Unknown keys are ignored (every optional field carries
    /// `#[serde(default)]`); a document missing required keys fails with [`DiskImageError::Format`].
    pub fn from_json(json: &str) -> Result<Self, DiskImageError> {
        serde_json::from_str(json).map_err(|_| DiskImageError::Format)
    }

    /// Auto-save: write the serialized session to `dir/<id>.json` (spec §4.I "per-app data
    /// directory on terminal transitions"). The caller supplies the directory; this crate has no
    /// opinion on where that directory lives on a given platform.
    pub fn auto_save(&self, dir: &Path) -> Result<(), DiskImageError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.id));
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Whether this session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SessionState::Complete | SessionState::Error | SessionState::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_idle_with_zeroed_statistics() {
        let session = Session::new("s1", SessionOperation::Read, 1_000);
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.statistics.tracks_total, 0);
    }

    #[test]
    fn add_track_result_updates_statistics() {
        let mut session = Session::new("s1", SessionOperation::Read, 1_000);
        session.add_track_result(TrackResult {
            cyl: 0,
            head: 0,
            status: TrackStatus::Good,
            good_sectors: 9,
            total_sectors: 9,
            confidence: 100,
            retries: 0,
            protection: None,
            errors: Vec::new(),
        });
        session.add_track_result(TrackResult {
            cyl: 0,
            head: 1,
            status: TrackStatus::Error,
            good_sectors: 3,
            total_sectors: 9,
            confidence: 40,
            retries: 2,
            protection: None,
            errors: vec!["CRC mismatch".to_string()],
        });
        assert_eq!(session.statistics.tracks_total, 2);
        assert_eq!(session.statistics.tracks_good, 1);
        assert_eq!(session.statistics.tracks_error, 1);
    }

    #[test]
    fn set_output_computes_sha256_and_size() {
        let mut session = Session::new("s1", SessionOperation::Write, 1_000);
        session.set_output("out.img", b"hello floppy");
        assert_eq!(session.output.size, Some(12));
        assert!(session.output.hash.as_ref().unwrap().len() == 64);
    }

    #[test]
    fn end_is_rejected_once_already_terminal() {
        let mut session = Session::new("s1", SessionOperation::Read, 1_000);
        session.end(SessionState::Complete, 1_100).unwrap();
        assert!(session.end(SessionState::Error, 1_200).is_err());
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let mut session = Session::new("s1", SessionOperation::Copy, 1_000);
        session.set_profile("c64-1541");
        session.set_parameter("retries", "3");
        session.set_output("copy.d64", b"data");
        session.end(SessionState::Complete, 1_050).unwrap();

        let json = session.to_json().unwrap();
        let reparsed = Session::from_json(&json).unwrap();
        assert_eq!(reparsed.id, session.id);
        assert_eq!(reparsed.profile, session.profile);
        assert_eq!(reparsed.output.hash, session.output.hash);
    }

    #[test]
    fn from_json_ignores_unknown_keys() {
        let json = r#"{
            "id": "s2",
            "version": 1,
            "start_time": 0,
            "end_time": null,
            "operation": "Read",
            "state": "Idle",
            "profile": null,
            "format": null,
            "some_future_field": "ignored"
        }"#;
        let session = Session::from_json(json).unwrap();
        assert_eq!(session.id, "s2");
    }
}

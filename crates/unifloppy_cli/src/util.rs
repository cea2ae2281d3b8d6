/*
    src/util.rs

    Small shared helpers for the subcommands: the current Unix timestamp (the library's [`Session`]
    never reads the clock itself, so a caller supplies it, per spec §4.I reproducibility) and the
    per-app session directory sessions auto-save into (spec §4.I "a per-app data directory").
*/
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `./.unifloppy/sessions` relative to the current working directory. A real deployment would use
/// a platform data directory; this crate has no opinion on where that lives (spec §4.I), so the
/// CLI picks the simplest stable default.
pub fn sessions_dir() -> PathBuf {
    PathBuf::from(".unifloppy").join("sessions")
}

/*
    src/exit.rs

    Maps the crate's error taxonomy (spec §7) onto the CLI exit codes spec §6 defines: 0 success,
    1 generic error, 2 usage, 3 no device, 4 read error, 5 write error, 6 verify mismatch, 7
    aborted. Each subcommand returns a [`CliError`] carrying both a human-readable message and the
    taxonomy kind it originated from; `main` does the mapping once, in one place.
*/
use std::fmt;

use unifloppy::DiskImageError;

#[derive(Debug)]
pub enum CliStage {
    Usage,
    NoDevice,
    Read,
    Write,
    Verify,
    Aborted,
    Generic,
}

#[derive(Debug)]
pub struct CliError {
    pub stage: CliStage,
    pub message: String,
}

impl CliError {
    pub fn new(stage: CliStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(CliStage::Usage, message)
    }

    pub fn no_device(message: impl Into<String>) -> Self {
        Self::new(CliStage::NoDevice, message)
    }

    /// Classify a library error against the stage a subcommand was attempting when it surfaced,
    /// per spec §7 "user-visible failures include the kind, the component, and enough context".
    pub fn from_disk_error(stage: CliStage, err: DiskImageError) -> Self {
        let message = err.to_string();
        match err {
            DiskImageError::Aborted => Self::new(CliStage::Aborted, message),
            _ => Self::new(stage, message),
        }
    }

    /// Exit code per spec §6: `0 success, 1 generic error, 2 usage, 3 no device, 4 read error,
    /// 5 write error, 6 verify mismatch, 7 aborted`.
    pub fn exit_code(&self) -> i32 {
        match self.stage {
            CliStage::Generic => 1,
            CliStage::Usage => 2,
            CliStage::NoDevice => 3,
            CliStage::Read => 4,
            CliStage::Write => 5,
            CliStage::Verify => 6,
            CliStage::Aborted => 7,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::new(CliStage::Generic, err.to_string())
    }
}

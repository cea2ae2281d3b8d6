/*
    src/flux/mod.rs

    Flux Capture Abstraction (spec §4.D) and home of [`FluxRevolution`], the data model's
    nanosecond-timed transition sequence (spec §3). A capture source — file-backed or hardware — is
    anything implementing [`FluxSource`]; the PLL and decoder dispatch downstream of it never know
    which kind they're reading from.
*/
pub mod kryoflux;
pub mod pll;
pub mod transport;
pub mod wire;

use crate::{checked_mul, DiskImageError, MAX_FLUX_PER_REVOLUTION, MAX_REVOLUTIONS};

/// One full rotation's worth of timed flux transitions, as produced by a [`FluxSource`] or decoded
/// from a container's embedded flux data (SCP). `transitions_ns[i]` is the time since the previous
/// transition; the first element is time since the index pulse.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FluxRevolution {
    pub transitions_ns: Vec<u32>,
    pub index_period_ns: u32,
}

/// Allowed slack between the sum of a revolution's transitions and its declared index period,
/// accounting for capture jitter.
const JITTER_TOLERANCE: f64 = 0.05;

impl FluxRevolution {
    pub fn new(transitions_ns: Vec<u32>, index_period_ns: u32) -> Result<Self, DiskImageError> {
        let rev = Self {
            transitions_ns,
            index_period_ns,
        };
        rev.validate()?;
        Ok(rev)
    }

    /// `sum(transitions_ns) ≤ index_period_ns × (1 + jitter_tolerance)` (spec §3 invariant).
    pub fn validate(&self) -> Result<(), DiskImageError> {
        if self.transitions_ns.len() > MAX_FLUX_PER_REVOLUTION {
            return Err(DiskImageError::LimitExceeded("flux transitions per revolution"));
        }
        let sum: u64 = self.transitions_ns.iter().map(|&t| t as u64).sum();
        let limit = (self.index_period_ns as f64 * (1.0 + JITTER_TOLERANCE)) as u64;
        if sum > limit {
            return Err(DiskImageError::Format);
        }
        Ok(())
    }
}

/// Validate a claimed revolution count against the security cap before allocating anything sized
/// by it (spec §7 `LimitExceeded`, boundary behaviour "SCP with num_revs = 33").
pub fn check_revolution_count(count: u8) -> Result<(), DiskImageError> {
    if count > MAX_REVOLUTIONS {
        return Err(DiskImageError::LimitExceeded("revolutions per track"));
    }
    Ok(())
}

/// A device discoverable by [`FluxSource::enumerate`].
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub transport: TransportKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum TransportKind {
    FileBacked,
    Greaseweazle,
    KryoFlux,
    SuperCardPro,
}

/// The capture source interface (spec §4.D). File-backed sources ([`transport::FileFluxSource`])
/// and framed-command hardware transports ([`transport::HardwareFluxSource`]) both implement this;
/// callers upstream (the PLL, decoder dispatch) are generic over it.
pub trait FluxSource {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DiskImageError>;
    fn seek(&mut self, cylinder: u16) -> Result<(), DiskImageError>;
    fn select_head(&mut self, head: u8) -> Result<(), DiskImageError>;
    fn motor(&mut self, on: bool) -> Result<(), DiskImageError>;
    fn read_flux(&mut self, revolutions: u8) -> Result<Vec<FluxRevolution>, DiskImageError>;
    /// Optional capability; sources that cannot write return `WriteProtected`.
    fn write_flux(&mut self, revolution: &FluxRevolution) -> Result<(), DiskImageError>;
    fn abort(&mut self) -> Result<(), DiskImageError>;
    fn close(&mut self) -> Result<(), DiskImageError>;
}

/// Convert an accumulated tick count to nanoseconds at the SCP sample rate: `ticks × 25ns ×
/// (resolution + 1)` (spec §4.C).
pub fn ticks_to_ns(ticks: u32, resolution: u8) -> Result<u32, DiskImageError> {
    let scaled = checked_mul(ticks as usize, 25 * (resolution as usize + 1))?;
    u32::try_from(scaled).map_err(|_| DiskImageError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revolution_within_jitter_tolerance_validates() {
        let rev = FluxRevolution::new(vec![4000; 10], 40_000).unwrap();
        assert_eq!(rev.transitions_ns.len(), 10);
    }

    #[test]
    fn revolution_exceeding_tolerance_is_rejected() {
        let result = FluxRevolution::new(vec![10_000; 10], 40_000);
        assert!(matches!(result, Err(DiskImageError::Format)));
    }

    #[test]
    fn revolution_count_cap_is_enforced() {
        assert!(check_revolution_count(32).is_ok());
        assert!(matches!(check_revolution_count(33), Err(DiskImageError::LimitExceeded(_))));
    }
}

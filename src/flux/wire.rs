/*
    src/flux/wire.rs

    The hardware flux wire encoding (spec §4.D): a variable-length byte grammar shared by the
    Greaseweazle-compatible hardware transport and, per spec §4.D's "optional write capability", a
    file-backed source re-encoding decoded-and-edited revolutions back to a container. One
    encoder/decoder pair serves both call sites.
*/
use crate::flux::FluxRevolution;
use crate::DiskImageError;

/// One decoded event from a flux wire stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FluxEvent {
    /// A flux transition this many ticks after the previous event.
    Transition(u32),
    /// An index pulse, with `n` ticks to skip before the next event.
    IndexPulse(u32),
    /// A gap of `n` ticks with no transition.
    Space(u32),
    /// A marker for a region with no detectable flux (head lifted, unformatted gap).
    Astable,
}

/// Threshold above which the encoder prefers a `Space` opcode over a chain of direct/extended
/// deltas, matching the hardware's own preference (spec §4.D).
pub const SPACE_THRESHOLD_TICKS: u32 = 1525;
/// Minimum astable-region length, in ticks at 25ns/tick (≈150µs), before the encoder emits an
/// explicit astable marker alongside the space.
pub const ASTABLE_THRESHOLD_TICKS: u32 = 150_000 / 25;

/// Encode a 28-bit skip count into the 4-byte form used after `0xFF 0x01`/`0xFF 0x02`/`0xFF 0x03`:
/// each byte carries 7 bits of payload in bits 7..1, with bit 0 always clear.
fn encode_n(n: u32) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let shift = 21 - 7 * i as u32;
        let chunk = (n >> shift) & 0x7F;
        *byte = (chunk as u8) << 1;
    }
    bytes
}

fn decode_n(bytes: [u8; 4]) -> u32 {
    let mut n: u32 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        let shift = 21 - 7 * i as u32;
        n |= ((byte >> 1) as u32 & 0x7F) << shift;
    }
    n
}

/// Decode a hardware flux wire stream into a sequence of events, stopping at `0x00` or end of
/// input. Every multi-byte read is bounds-checked against `data.len()`.
pub fn decode_wire(data: &[u8]) -> Result<Vec<FluxEvent>, DiskImageError> {
    let mut events = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        let b = data[i];
        match b {
            0x00 => break,
            0x01..=0xF9 => {
                events.push(FluxEvent::Transition(b as u32));
                i += 1;
            }
            0xFA..=0xFE => {
                let next = *data.get(i + 1).ok_or(DiskImageError::OutOfBounds)?;
                let ticks = 250u32 + (b as u32 - 250) * 255 + next as u32 - 1;
                events.push(FluxEvent::Transition(ticks));
                i += 2;
            }
            0xFF => {
                let opcode = *data.get(i + 1).ok_or(DiskImageError::OutOfBounds)?;
                let n_bytes: [u8; 4] = data
                    .get(i + 2..i + 6)
                    .ok_or(DiskImageError::OutOfBounds)?
                    .try_into()
                    .map_err(|_| DiskImageError::OutOfBounds)?;
                let n = decode_n(n_bytes);
                match opcode {
                    0x01 => events.push(FluxEvent::IndexPulse(n)),
                    0x02 => events.push(FluxEvent::Space(n)),
                    0x03 => events.push(FluxEvent::Astable),
                    _ => return Err(DiskImageError::Format),
                }
                i += 6;
            }
        }
    }
    Ok(events)
}

/// Encode a sequence of events into the hardware wire grammar, preferring `Space` for large gaps
/// per [`SPACE_THRESHOLD_TICKS`] and inserting an astable marker after spaces at or beyond
/// [`ASTABLE_THRESHOLD_TICKS`] (spec §4.D encoder rule).
pub fn encode_wire(events: &[FluxEvent]) -> Vec<u8> {
    let mut out = Vec::new();
    for event in events {
        match *event {
            FluxEvent::Transition(ticks) if ticks >= 1 && ticks <= 249 => {
                out.push(ticks as u8);
            }
            FluxEvent::Transition(ticks) => {
                if ticks >= SPACE_THRESHOLD_TICKS {
                    out.push(0xFF);
                    out.push(0x02);
                    out.extend_from_slice(&encode_n(ticks));
                    if ticks >= ASTABLE_THRESHOLD_TICKS {
                        out.push(0xFF);
                        out.push(0x03);
                        out.extend_from_slice(&encode_n(0));
                    }
                } else {
                    let rem = ticks - 250;
                    let hi = 250 + rem / 255;
                    let lo = (rem % 255) + 1;
                    out.push(hi as u8);
                    out.push(lo as u8);
                }
            }
            FluxEvent::IndexPulse(n) => {
                out.push(0xFF);
                out.push(0x01);
                out.extend_from_slice(&encode_n(n));
            }
            FluxEvent::Space(n) => {
                out.push(0xFF);
                out.push(0x02);
                out.extend_from_slice(&encode_n(n));
                if n >= ASTABLE_THRESHOLD_TICKS {
                    out.push(0xFF);
                    out.push(0x03);
                    out.extend_from_slice(&encode_n(0));
                }
            }
            FluxEvent::Astable => {
                out.push(0xFF);
                out.push(0x03);
                out.extend_from_slice(&encode_n(0));
            }
        }
    }
    out.push(0x00);
    out
}

/// Build a [`FluxRevolution`] from a decoded event stream at the given tick duration (25ns ×
/// `resolution + 1`, per spec §4.C), folding `Space`/`Astable` events into accumulated gap time
/// rather than emitting a transition for them.
pub fn revolution_from_events(
    events: &[FluxEvent],
    ns_per_tick: u32,
    index_period_ns: u32,
) -> Result<FluxRevolution, DiskImageError> {
    let mut transitions_ns = Vec::new();
    let mut pending_ticks: u64 = 0;
    for event in events {
        match *event {
            FluxEvent::Transition(ticks) => {
                pending_ticks += ticks as u64;
                let ns = pending_ticks * ns_per_tick as u64;
                transitions_ns.push(u32::try_from(ns).map_err(|_| DiskImageError::Overflow)?);
                pending_ticks = 0;
            }
            FluxEvent::Space(ticks) => pending_ticks += ticks as u64,
            FluxEvent::IndexPulse(n) => pending_ticks += n as u64,
            FluxEvent::Astable => {}
        }
    }
    FluxRevolution::new(transitions_ns, index_period_ns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_delta_round_trips() {
        let data = [0x04, 0x04, 0x04, 0x00];
        let events = decode_wire(&data).unwrap();
        assert_eq!(
            events,
            vec![FluxEvent::Transition(4), FluxEvent::Transition(4), FluxEvent::Transition(4)]
        );
        let encoded = encode_wire(&events);
        assert_eq!(encoded, vec![0x04, 0x04, 0x04, 0x00]);
    }

    #[test]
    fn extended_delta_decodes_per_formula() {
        // 0xFA (250) with next=1 -> 250 + 0*255 + 1 - 1 = 250
        let data = [0xFA, 0x01, 0x00];
        let events = decode_wire(&data).unwrap();
        assert_eq!(events, vec![FluxEvent::Transition(250)]);
    }

    #[test]
    fn index_pulse_round_trips_through_n_encoding() {
        let events = vec![FluxEvent::IndexPulse(123_456)];
        let encoded = encode_wire(&events);
        let decoded = decode_wire(&encoded).unwrap();
        assert_eq!(decoded, events);
    }

    #[test]
    fn truncated_extended_delta_is_out_of_bounds() {
        let data = [0xFA];
        assert!(matches!(decode_wire(&data), Err(DiskImageError::OutOfBounds)));
    }
}

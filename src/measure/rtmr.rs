//! RTMR register folder.
//!
//! Folds an event list into the four 48-byte extend-only registers a TDX
//! guest's RTMRs would hold after the same boot sequence.

use super::eventlog::TdEvent;
use super::util::sha384;

/// The four 48-byte RTMR registers plus the event list that produced them.
pub struct RtmrState {
    pub registers: [[u8; 48]; 4],
    pub events: Vec<TdEvent>,
}

/// Fold `events` into four initially-zero registers: for each event, replace
/// `register[event.register]` with `SHA-384(register[event.register] ||
/// event.digest)`.
pub fn fold_rtmrs(events: Vec<TdEvent>) -> RtmrState {
    let mut registers = [[0u8; 48]; 4];

    for ev in &events {
        let idx = ev.register as usize;
        let mut preimage = Vec::with_capacity(96);
        preimage.extend_from_slice(&registers[idx]);
        preimage.extend_from_slice(&ev.digest);
        registers[idx] = sha384(&preimage);
    }

    RtmrState { registers, events }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn event(register: u8, digest: [u8; 48]) -> TdEvent {
        TdEvent {
            name: "test",
            event_type: "EV_SEPARATOR",
            register,
            metadata: HashMap::new(),
            digest,
        }
    }

    #[test]
    fn untouched_registers_stay_zero() {
        let state = fold_rtmrs(vec![event(0, [1u8; 48])]);
        assert_eq!(state.registers[1], [0u8; 48]);
        assert_eq!(state.registers[2], [0u8; 48]);
        assert_eq!(state.registers[3], [0u8; 48]);
    }

    #[test]
    fn chain_property_holds_for_any_prefix() {
        let digests = [[1u8; 48], [2u8; 48], [3u8; 48]];
        let events: Vec<TdEvent> = digests.iter().map(|d| event(0, *d)).collect();
        let state = fold_rtmrs(events);

        let mut expected = [0u8; 48];
        for d in &digests {
            let mut preimage = Vec::new();
            preimage.extend_from_slice(&expected);
            preimage.extend_from_slice(d);
            expected = sha384(&preimage);
        }
        assert_eq!(state.registers[0], expected);
    }

    #[test]
    fn distinct_registers_fold_independently() {
        let events = vec![event(0, [1u8; 48]), event(1, [2u8; 48]), event(0, [3u8; 48])];
        let state = fold_rtmrs(events);

        let mut r0 = [0u8; 48];
        for d in [[1u8; 48], [3u8; 48]] {
            let mut preimage = Vec::new();
            preimage.extend_from_slice(&r0);
            preimage.extend_from_slice(&d);
            r0 = sha384(&preimage);
        }
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&[0u8; 48]);
        preimage.extend_from_slice(&[2u8; 48]);
        let r1 = sha384(&preimage);

        assert_eq!(state.registers[0], r0);
        assert_eq!(state.registers[1], r1);
    }
}

use serde::Serialize;
use std::rc::Rc;
use std::time::Duration;

use crate::phy::MacAddress;

/// Structured observability events. Sinks are registered on the MAC and the
/// slot manager; nothing is persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// The station was switched on and the frame geometry is fixed.
    Startup {
        when: Duration,
        frame_duration: Duration,
        slot_duration: Duration,
    },
    /// The network-entry packet went on the air. `delay` is the announced
    /// time to the first reserved transmission; `was_taken` reports whether
    /// the station had to transmit in a slot it no longer believed free.
    NetworkEntry {
        when: Duration,
        delay: Duration,
        was_taken: bool,
        size: usize,
    },
    /// A reserved transmission went on the air.
    Tx {
        when: Duration,
        reservation: u32,
        timeout: u8,
        offset: u16,
        size: usize,
    },
    /// A broadcast from a peer was received and applied.
    Rx {
        when: Duration,
        from: MacAddress,
        timeout: u8,
        offset: u16,
        size: usize,
    },
    /// The nominal slot set was drawn, reported as global slot positions.
    NominalSlotSelection { slots: Vec<u32> },
    /// A first-time reservation was made.
    SlotReservation {
        candidates: usize,
        free: usize,
        was_free: bool,
    },
    /// A reservation was moved to a new slot.
    SlotReReservation {
        candidates: usize,
        free: usize,
        was_free: bool,
        same_slot: bool,
    },
}

pub type TraceSink = Rc<dyn Fn(&TraceEvent)>;

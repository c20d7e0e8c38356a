use std::time::Duration;
use tracing::trace;

use crate::phy::{MacAddress, Position};

/// Observed state of one slot. The priority ordering is
/// `Free < Busy < Allocated`: a state is only ever upgraded, except through
/// aging, an explicit release, or expiry of the station's own reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing is known to use this slot.
    Free,
    /// Energy or an undecodable transmission was observed in this slot.
    Busy,
    /// A peer announced it will transmit in this slot.
    Allocated,
}

/// One element of the reservation ring.
///
/// A slot is *internally* allocated when this station reserved it for one of
/// its own reports; that flag is independent of the observed state, because
/// a peer may announce a reservation on a slot we already hold (a known
/// collision). External announcements carry a timeout counted in frames and
/// may be deferred with `not_before` when they only take effect in the
/// peer's next frame.
#[derive(Debug, Clone)]
pub struct Slot {
    index: u32,
    state: SlotState,
    previous_state: SlotState,
    internal: bool,
    external_timeout: u8,
    internal_timeout: u8,
    not_before: Duration,
    owner: MacAddress,
    position: Position,
}

impl Slot {
    fn new(index: u32) -> Self {
        Self {
            index,
            state: SlotState::Free,
            previous_state: SlotState::Free,
            internal: false,
            external_timeout: 0,
            internal_timeout: 0,
            not_before: Duration::ZERO,
            owner: MacAddress([0; 6]),
            position: Position::default(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_internally_allocated(&self) -> bool {
        self.internal
    }

    pub fn external_timeout(&self) -> u8 {
        self.external_timeout
    }

    pub fn internal_timeout(&self) -> u8 {
        self.internal_timeout
    }

    pub fn owner(&self) -> MacAddress {
        self.owner
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn mark_free(&mut self) {
        self.previous_state = self.state;
        self.state = SlotState::Free;
        self.internal = false;
        self.external_timeout = 0;
        self.internal_timeout = 0;
        self.not_before = Duration::ZERO;
        trace!(slot = self.index, "marked free");
    }

    pub fn is_free_now(&self) -> bool {
        self.is_free(Duration::ZERO)
    }

    /// Free, or tentatively marked from a free state with the mark only
    /// taking effect after `until`.
    pub fn is_free(&self, until: Duration) -> bool {
        self.state == SlotState::Free
            || (self.previous_state == SlotState::Free && until < self.not_before)
    }

    /// Record an external reservation. A slot that is already actively
    /// allocated keeps the larger timeout and the earlier activation
    /// instant; owner and position always track the latest announcement.
    pub fn mark_allocated(
        &mut self,
        now: Duration,
        timeout: u8,
        owner: MacAddress,
        position: Position,
        not_before: Duration,
    ) {
        if self.is_allocated(now) {
            if timeout > self.external_timeout {
                self.external_timeout = timeout;
            }
            if not_before < self.not_before {
                self.not_before = not_before;
            }
        } else {
            self.previous_state = self.state;
            self.state = SlotState::Allocated;
            self.external_timeout = timeout;
            self.not_before = not_before;
        }
        self.owner = owner;
        self.position = position;
        trace!(
            slot = self.index,
            timeout = self.external_timeout,
            %owner,
            "marked allocated"
        );
    }

    pub fn is_allocated(&self, now: Duration) -> bool {
        self.state == SlotState::Allocated && now >= self.not_before
    }

    pub fn mark_internally_allocated(&mut self, timeout: u8) {
        self.internal = true;
        self.internal_timeout = timeout;
        trace!(slot = self.index, timeout, "internally allocated");
    }

    /// Record observed channel energy. An allocated slot outranks a busy
    /// observation and keeps its state.
    pub fn mark_busy(&mut self) {
        if self.state == SlotState::Allocated {
            return;
        }
        self.previous_state = self.state;
        self.state = SlotState::Busy;
        self.not_before = Duration::ZERO;
        self.external_timeout = 1;
    }

    pub fn is_busy(&self, now: Duration) -> bool {
        self.state == SlotState::Busy && now >= self.not_before
    }

    pub(crate) fn set_external_timeout(&mut self, timeout: u8) {
        self.external_timeout = timeout;
    }

    pub(crate) fn set_internal_timeout(&mut self, timeout: u8) {
        self.internal_timeout = timeout;
    }

    fn rebase_index(&mut self, index: u32) {
        self.index = index;
    }
}

/// The ring of all slots of one frame, indexed by the slot's current
/// ordinal within the frame.
#[derive(Debug)]
pub struct SlotRing {
    slots: Vec<Slot>,
}

impl SlotRing {
    pub fn new(num_slots: u32) -> Self {
        Self {
            slots: (0..num_slots).map(Slot::new).collect(),
        }
    }

    pub fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: u32) -> &Slot {
        &self.slots[index as usize]
    }

    pub fn get_mut(&mut self, index: u32) -> &mut Slot {
        &mut self.slots[index as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.slots.iter_mut()
    }

    /// Rotate the ring so that the slot currently at `offset` becomes slot
    /// zero; every index moves to `(index − offset + len) mod len`.
    pub fn rebase(&mut self, offset: u32) {
        let len = self.len();
        self.slots.rotate_left((offset % len) as usize);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.rebase_index(index as u32);
        }
    }
}

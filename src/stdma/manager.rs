use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::slot::{Slot, SlotRing};
use super::trace::{TraceEvent, TraceSink};
use crate::phy::{MacAddress, Position};
use crate::runtime::RandomSource;

fn ns(duration: Duration) -> u64 {
    duration.as_nanos() as u64
}

/// Outcome of a randomized-access draw inside the network-entry window: the
/// chosen transmission instant, the probability level the next attempt
/// starts from, and the slots left in the window after the choice.
#[derive(Debug, Clone, Copy)]
pub struct RandomAccess {
    pub when: Duration,
    pub probability: f64,
    pub remaining: u32,
}

/// Keeps the slot ring and the frame geometry, and implements the
/// reservation policies: nominal-slot selection, first reservation,
/// re-reservation, the frame-boundary aging pass and the randomized access
/// used for network entry.
///
/// Every public operation first checks whether a frame boundary has passed
/// since the last update and, if so, runs the aging pass exactly once. Time
/// is always handed in by the caller; the manager never asks a clock.
pub struct SlotManager {
    ring: SlotRing,
    /// Reservation number to slot index.
    selections: HashMap<u32, u32>,
    /// Peers we knowingly share a slot with, keyed by their address.
    collisions: HashMap<MacAddress, u32>,
    start: Duration,
    frame_duration: Duration,
    slot_duration: Duration,
    num_slots: u32,
    rate: u32,
    ni: u32,
    si_half: u32,
    nss: Vec<u32>,
    last_frame_start: Duration,
    current: u32,
    minimum_candidates: usize,
    trace: Option<TraceSink>,
}

impl SlotManager {
    /// Fixes the frame geometry. The frame is shortened to a whole number
    /// of slots and the start is pushed to the next slot boundary, because
    /// all stations are synchronized at slot granularity.
    pub fn new(
        start: Duration,
        frame_duration: Duration,
        slot_duration: Duration,
        report_rate: u32,
        selection_interval_ratio: f64,
        minimum_candidates: usize,
    ) -> Self {
        let num_slots = (ns(frame_duration) / ns(slot_duration)) as u32;
        let frame_duration = slot_duration * num_slots;
        let start = if ns(start) % ns(slot_duration) == 0 {
            start
        } else {
            slot_duration * ((ns(start) / ns(slot_duration)) as u32 + 1)
        };
        let ni = num_slots / report_rate;
        let si_half = (0.5 * f64::from(ni - 1) * selection_interval_ratio) as u32;
        debug!(
            ?start,
            ?frame_duration,
            ?slot_duration,
            num_slots,
            ni,
            si_half,
            "slot manager ready"
        );
        Self {
            ring: SlotRing::new(num_slots),
            selections: HashMap::new(),
            collisions: HashMap::new(),
            start,
            frame_duration,
            slot_duration,
            num_slots,
            rate: report_rate,
            ni,
            si_half,
            nss: Vec::new(),
            last_frame_start: start,
            current: 0,
            minimum_candidates,
            trace: None,
        }
    }

    pub fn set_trace_sink(&mut self, sink: TraceSink) {
        self.trace = Some(sink);
    }

    fn emit(&self, event: TraceEvent) {
        if let Some(sink) = &self.trace {
            sink(&event);
        }
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    pub fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    pub fn slots_per_frame(&self) -> u32 {
        self.num_slots
    }

    /// Slots between two consecutive nominal slots.
    pub fn nominal_increment(&self) -> u32 {
        self.ni
    }

    pub fn slot(&self, index: u32) -> &Slot {
        self.ring.get(index)
    }

    /// Slot currently bound to reservation `n`, if one was selected.
    pub fn reservation_slot(&self, n: u32) -> Option<u32> {
        self.selections.get(&n).copied()
    }

    /// Slot shared with `peer`, if we knowingly collide with it.
    pub fn collision_with(&self, peer: &MacAddress) -> Option<u32> {
        self.collisions.get(peer).copied()
    }

    /// Runs the frame-boundary update if a boundary has passed. Advances by
    /// at most one frame per call, so state observed within one event sees
    /// at most one aging pass.
    fn age(&mut self, now: Duration) {
        if now >= self.last_frame_start + self.frame_duration {
            self.update_slot_observations(now);
        }
    }

    /// The aging pass: expired own reservations are released (and the
    /// collision memory cleaned up), external reservations and busy
    /// observations count down and fall back to free when exhausted.
    fn update_slot_observations(&mut self, now: Duration) {
        self.last_frame_start += self.frame_duration;
        debug!(last_frame_start = ?self.last_frame_start, "frame boundary update");
        for index in 0..self.num_slots {
            let slot = self.ring.get(index);
            if slot.is_internally_allocated() && slot.internal_timeout() == 0 {
                if slot.is_allocated(now) {
                    let owner = slot.owner();
                    self.collisions.remove(&owner);
                }
                self.ring.get_mut(index).mark_free();
            }

            let slot = self.ring.get(index);
            if slot.is_allocated(now) && !slot.is_internally_allocated() {
                let timeout = slot.external_timeout();
                if timeout > 0 {
                    self.ring.get_mut(index).set_external_timeout(timeout - 1);
                } else {
                    self.ring.get_mut(index).mark_free();
                }
            }

            let slot = self.ring.get(index);
            if slot.is_busy(now) && !slot.is_internally_allocated() {
                let timeout = slot.external_timeout();
                if timeout > 0 {
                    self.ring.get_mut(index).set_external_timeout(timeout - 1);
                } else {
                    self.ring.get_mut(index).mark_free();
                }
            }
        }
    }

    /// Draws the nominal start slot and derives the remaining nominal slots
    /// at increments of `NI`. Called once per station, at network entry.
    pub fn select_nominal_slots(&mut self, now: Duration, rng: &mut dyn RandomSource) {
        self.age(now);
        self.nss.clear();
        let nss = rng.uniform_int(0, self.ni - 1);
        self.nss.push(nss);
        for i in 1..self.rate {
            self.nss.push(nss + i * self.ni);
        }
        debug!(nss = ?self.nss, "nominal slots selected");

        // Report the nominal slots re-based to global slot positions so
        // traces from different stations are comparable.
        let traced = self
            .nss
            .iter()
            .map(|&index| {
                let at = self.last_frame_start + self.slot_duration * index;
                (self.global_slot_index(at) % u64::from(self.num_slots)) as u32
            })
            .collect();
        self.emit(TraceEvent::NominalSlotSelection { slots: traced });
    }

    /// Admissible slots inside the selection interval around `nominal`,
    /// plus the externally allocated slots of the interval keyed by owner
    /// distance (the re-use reserve). On the very first selection indices
    /// before the interval start are skipped so the station never picks a
    /// slot earlier than its network-entry instant.
    fn gather_candidates(
        &self,
        now: Duration,
        until: Duration,
        nominal: u32,
        my_position: Position,
        first_selection: bool,
    ) -> (Vec<u32>, Vec<(f64, u32)>) {
        let mut candidates = Vec::new();
        let mut reserve = Vec::new();
        let lower = nominal as i64 - self.si_half as i64;
        let upper = nominal as i64 + self.si_half as i64;
        for i in lower..=upper {
            let index = if i < 0 {
                if first_selection {
                    continue;
                }
                (self.num_slots as i64 + i) as u32
            } else if i >= self.num_slots as i64 {
                (i - self.num_slots as i64) as u32
            } else {
                i as u32
            };

            let slot = self.ring.get(index);
            if slot.is_free(until) {
                candidates.push(index);
            } else if slot.is_allocated(now) && !slot.is_internally_allocated() {
                let distance = my_position.distance_to(&slot.position());
                reserve.push((distance, index));
            }
            // Busy slots and our own reservations are not admissible.
        }
        (candidates, reserve)
    }

    /// Tops the candidate set up to the configured minimum with externally
    /// allocated slots, farthest owner first, skipping owners we already
    /// collide with.
    fn top_up_candidates(&self, candidates: &mut Vec<u32>, mut reserve: Vec<(f64, u32)>) {
        if candidates.len() >= self.minimum_candidates {
            return;
        }
        let mut missing = self.minimum_candidates - candidates.len();
        reserve.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        for (distance, index) in reserve.into_iter().rev() {
            let owner = self.ring.get(index).owner();
            if self.collisions.contains_key(&owner) {
                continue;
            }
            debug!(slot = index, distance, "re-using allocated slot as candidate");
            candidates.push(index);
            missing -= 1;
            if missing == 0 {
                break;
            }
        }
    }

    fn choose(
        &mut self,
        rng: &mut dyn RandomSource,
        candidates: &[u32],
        now: Duration,
        n: u32,
        timeout: u8,
    ) -> (u32, bool) {
        let pick = rng.uniform_int(0, candidates.len() as u32 - 1);
        let index = candidates[pick as usize];
        let was_free = self.ring.get(index).is_free_now();
        self.ring.get_mut(index).mark_internally_allocated(timeout);
        if self.ring.get(index).is_allocated(now) {
            let owner = self.ring.get(index).owner();
            self.collisions.insert(owner, index);
        }
        self.selections.insert(n, index);
        (index, was_free)
    }

    /// First-time reservation for reservation number `n`: draw a slot from
    /// the selection interval around the n-th nominal slot and mark it as
    /// our own for `timeout` frames.
    pub fn select(
        &mut self,
        now: Duration,
        rng: &mut dyn RandomSource,
        my_position: Position,
        n: u32,
        timeout: u8,
    ) {
        self.age(now);
        assert!((n as usize) < self.nss.len(), "no nominal slot for reservation {n}");
        let until = now + self.frame_duration * u32::from(timeout);
        let nominal = self.nss[n as usize];
        let first_selection = self.selections.is_empty();

        let (mut candidates, reserve) =
            self.gather_candidates(now, until, nominal, my_position, first_selection);
        let free = candidates.len();
        self.top_up_candidates(&mut candidates, reserve);
        if candidates.is_empty() {
            // Every admissible slot is held by a peer we already collide
            // with; fall back to the nominal slot itself.
            candidates.push(nominal);
        }

        let total = candidates.len();
        let (index, was_free) = self.choose(rng, &candidates, now, n, timeout);
        debug!(reservation = n, slot = index, timeout, "slot reserved");
        self.emit(TraceEvent::SlotReservation {
            candidates: total,
            free,
            was_free,
        });
    }

    /// Moves reservation `n` to a fresh slot after its timeout ran out. The
    /// old slot is released first and negative interval indices wrap, so
    /// the whole selection interval is admissible. Returns the slot offset
    /// announced to peers, in `[0, N)`.
    pub fn reselect(
        &mut self,
        now: Duration,
        rng: &mut dyn RandomSource,
        my_position: Position,
        n: u32,
        timeout: u8,
    ) -> u16 {
        self.age(now);
        assert!((n as usize) < self.nss.len(), "no nominal slot for reservation {n}");
        let until = now + self.frame_duration * u32::from(timeout);
        let nominal = self.nss[n as usize];

        let old_index = self.selections[&n];
        self.ring.get_mut(old_index).mark_free();

        let (mut candidates, reserve) =
            self.gather_candidates(now, until, nominal, my_position, false);
        let free = candidates.len();
        self.top_up_candidates(&mut candidates, reserve);
        if candidates.is_empty() {
            candidates.push(nominal);
        }

        let total = candidates.len();
        let (new_index, was_free) = self.choose(rng, &candidates, now, n, timeout);
        let same_slot = new_index == old_index;
        debug!(
            reservation = n,
            old = old_index,
            new = new_index,
            timeout,
            "slot re-reserved"
        );
        self.emit(TraceEvent::SlotReReservation {
            candidates: total,
            free,
            was_free,
            same_slot,
        });

        ((new_index + self.num_slots - old_index) % self.num_slots) as u16
    }

    /// Reservation number of the transmission being made now; advances the
    /// internal counter to the next reservation, wrapping at the report
    /// rate.
    pub fn current_reservation_no(&mut self, now: Duration) -> u32 {
        self.age(now);
        let current = self.current;
        self.current = if self.current < self.rate - 1 {
            self.current + 1
        } else {
            0
        };
        current
    }

    /// Delay from `now` until the start of the slot bound to reservation
    /// `n`; an instant already passed in this frame refers to the next
    /// frame.
    pub fn time_until(&mut self, now: Duration, n: u32) -> Duration {
        self.age(now);
        let index = self.selections[&n];
        let delay_in_frame = ns(self.slot_duration) * u64::from(index);
        let frame = ns(self.frame_duration) as i64;
        let now_ns = ns(now) as i64;
        let last = ns(self.last_frame_start) as i64;

        let mut delay = if last > now_ns {
            // The frame was just re-based to start in the future; measure
            // through the upcoming frame start.
            (last - now_ns) + last + delay_in_frame as i64 - now_ns - ns(self.slot_duration) as i64
        } else {
            last + delay_in_frame as i64 - now_ns
        };
        if delay < 0 {
            delay += frame;
        }
        Duration::from_nanos(delay as u64)
    }

    /// Slot index within the frame for an arbitrary timestamp.
    pub fn slot_index_of(&mut self, now: Duration, t: Duration) -> u32 {
        self.age(now);
        let base = if t >= self.last_frame_start {
            t - self.last_frame_start
        } else {
            t - self.start
        };
        ((ns(base) % ns(self.frame_duration)) / ns(self.slot_duration)) as u32
    }

    /// Monotone slot count since the scheduler epoch; comparable across
    /// stations regardless of their frame alignment.
    pub fn global_slot_index(&self, t: Duration) -> u64 {
        ns(t) / ns(self.slot_duration)
    }

    /// Slots between the transmissions of reservations `k` and `l`.
    pub fn slot_offset_between(&self, k: u32, l: u32) -> u32 {
        if k == l {
            return 0;
        }
        let first = self.selections[&k];
        let second = self.selections[&l];
        if second > first {
            second - first
        } else {
            self.num_slots - first + second
        }
    }

    pub fn needs_rereservation(&mut self, now: Duration, n: u32) -> bool {
        self.age(now);
        let index = self.selections[&n];
        self.ring.get(index).internal_timeout() == 0
    }

    /// Counts the reservation's timeout down by one frame and returns the
    /// new value, which is also the value announced on the air.
    pub fn decrement_timeout(&mut self, now: Duration, n: u32) -> u8 {
        self.age(now);
        let index = self.selections[&n];
        let slot = self.ring.get_mut(index);
        debug_assert!(slot.is_internally_allocated());
        debug_assert!(slot.internal_timeout() > 0);
        let timeout = slot.internal_timeout() - 1;
        slot.set_internal_timeout(timeout);
        timeout
    }

    pub fn mark_externally_allocated(
        &mut self,
        now: Duration,
        index: u32,
        timeout: u8,
        owner: MacAddress,
        position: Position,
        not_before: Duration,
    ) {
        self.age(now);
        self.ring
            .get_mut(index)
            .mark_allocated(now, timeout, owner, position, not_before);
    }

    pub fn mark_free_again(&mut self, now: Duration, index: u32) {
        self.age(now);
        self.ring.get_mut(index).mark_free();
    }

    pub fn mark_busy(&mut self, now: Duration, index: u32) {
        self.age(now);
        self.ring.get_mut(index).mark_busy();
    }

    /// Re-aligns the frame so that it starts at `new_start`. Only permitted
    /// before any reservation exists and only by whole slots; the ring is
    /// rotated accordingly.
    pub fn rebase(&mut self, new_start: Duration) {
        assert!(
            self.selections.is_empty(),
            "rebase is only allowed before reservations are made"
        );
        assert!(new_start >= self.last_frame_start);
        let delta = new_start - self.last_frame_start;
        assert!(
            ns(delta) % ns(self.slot_duration) == 0,
            "rebase target must be slot aligned"
        );
        let offset = ((ns(delta) / ns(self.slot_duration)) % u64::from(self.num_slots)) as u32;
        debug!(offset, ?new_start, "rebasing frame start");
        self.ring.rebase(offset);
        self.last_frame_start = new_start;
    }

    /// Randomized access draw for the network-entry window: scan the next
    /// `remaining` slots for free ones, then walk the candidates with a
    /// transmit probability that starts at `p` and grows by `(1 − p)/n` per
    /// trial, accepting the first trial whose draw falls below it.
    pub fn pick_network_entry(
        &mut self,
        now: Duration,
        rng: &mut dyn RandomSource,
        remaining_slots: u32,
        p: f64,
    ) -> RandomAccess {
        self.age(now);
        let mut draw = rng.uniform();
        let start = self.slot_index_of(now, now);

        // Candidate entries are offsets from the current slot.
        let mut candidates = Vec::new();
        for k in 0..remaining_slots {
            let index = (start + k) % self.num_slots;
            let until = now + self.slot_duration * (k + 1);
            if self.ring.get(index).is_free(until) {
                candidates.push(k);
            }
        }
        if candidates.is_empty() {
            candidates.push(remaining_slots.saturating_sub(1));
        }

        let n = candidates.len();
        let increment = if p <= 1.0 { (1.0 - p) / n as f64 } else { 0.0 };
        let mut probability = p + increment;
        let mut chosen = 0usize;
        while draw > probability && chosen < n - 1 {
            draw = rng.uniform();
            chosen += 1;
            probability += increment;
        }

        let offset = candidates[chosen];
        debug!(
            offset,
            probability,
            remaining = remaining_slots - offset,
            "network entry instant picked"
        );
        RandomAccess {
            when: now + self.slot_duration * offset,
            probability,
            remaining: remaining_slots - offset,
        }
    }

    /// Whether any of the next `remaining` slots is still free.
    pub fn has_free_slots_left(&self, now: Duration, remaining: u32) -> bool {
        let base = if now >= self.last_frame_start {
            now - self.last_frame_start
        } else {
            now - self.start
        };
        let start = ((ns(base) % ns(self.frame_duration)) / ns(self.slot_duration)) as u32;
        (0..remaining).any(|k| {
            let index = (start + k) % self.num_slots;
            let until = now + self.slot_duration * (k + 1);
            self.ring.get(index).is_free(until)
        })
    }

    /// Whether the slot `now` falls into is still free for the duration of
    /// one slot.
    pub fn is_current_slot_still_free(&mut self, now: Duration) -> bool {
        self.age(now);
        let index = self.slot_index_of(now, now);
        self.ring.get(index).is_free(now + self.slot_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptedRandom;
    use crate::stdma::slot::SlotState;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SLOT: Duration = Duration::from_nanos(566_000);

    fn owner(tag: u8) -> MacAddress {
        MacAddress([tag; 6])
    }

    fn recorded_sink() -> (TraceSink, Rc<RefCell<Vec<TraceEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let recorder = events.clone();
        let sink: TraceSink = Rc::new(move |event: &TraceEvent| {
            recorder.borrow_mut().push(event.clone());
        });
        (sink, events)
    }

    /// Small ring for selection tests: ten slots of 1 ms.
    fn small_manager(rate: u32, ratio: f64, minimum: usize) -> SlotManager {
        SlotManager::new(
            Duration::ZERO,
            Duration::from_millis(10),
            Duration::from_millis(1),
            rate,
            ratio,
            minimum,
        )
    }

    #[test]
    fn geometry_is_aligned_to_slots() {
        let manager = SlotManager::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            SLOT,
            10,
            0.2,
            4,
        );
        assert_eq!(manager.slots_per_frame(), 1766);
        assert_eq!(manager.frame_duration(), Duration::from_nanos(999_556_000));
        assert_eq!(manager.start(), Duration::from_nanos(1_000_122_000));
        assert_eq!(manager.nominal_increment(), 176);
        assert_eq!(ns(manager.frame_duration()) % ns(SLOT), 0);
    }

    #[test]
    fn marking_rebase_and_aging() {
        let mut manager = SlotManager::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            SLOT,
            10,
            0.2,
            4,
        );
        let start = manager.start();
        for index in 0..manager.slots_per_frame() {
            assert_eq!(manager.slot(index).state(), SlotState::Free);
        }

        manager.mark_busy(start, 20);
        assert_eq!(manager.slot(20).state(), SlotState::Busy);
        manager.mark_externally_allocated(
            start,
            30,
            8,
            owner(0xab),
            Position::new(1, 0),
            Duration::ZERO,
        );
        assert_eq!(manager.slot(30).state(), SlotState::Allocated);
        assert_eq!(manager.slot(30).external_timeout(), 8);

        let t1 = start + SLOT * 27;
        let t2 = t1 + SLOT / 2;
        assert_eq!(manager.slot_index_of(t1, t1), 27);
        assert_eq!(manager.slot_index_of(t2, t2), 27);

        manager.rebase(start + SLOT * 12);
        assert_eq!(manager.slot_index_of(t1, t1), 15);
        assert_eq!(manager.slot_index_of(t2, t2), 15);
        assert_eq!(manager.slot(8).state(), SlotState::Busy);
        assert_eq!(manager.slot(18).state(), SlotState::Allocated);
        assert_eq!(manager.slot(18).external_timeout(), 8);

        manager.update_slot_observations(start);
        assert_eq!(manager.slot(8).state(), SlotState::Busy);
        assert_eq!(manager.slot(18).state(), SlotState::Allocated);
        assert_eq!(manager.slot(18).external_timeout(), 7);

        manager.update_slot_observations(start);
        assert_eq!(manager.slot(8).state(), SlotState::Free);
        assert_eq!(manager.slot(18).state(), SlotState::Allocated);
        assert_eq!(manager.slot(18).external_timeout(), 6);
    }

    #[test]
    fn aging_runs_once_per_boundary() {
        let mut manager = small_manager(1, 0.7, 4);
        manager.mark_externally_allocated(
            Duration::ZERO,
            5,
            3,
            owner(1),
            Position::default(),
            Duration::ZERO,
        );

        let next_frame = manager.frame_duration() + Duration::from_millis(1);
        assert_eq!(manager.slot_index_of(next_frame, next_frame), 1);
        assert_eq!(manager.slot(5).external_timeout(), 2);
        // Same event time again: no further decrement.
        assert_eq!(manager.slot_index_of(next_frame, next_frame), 1);
        assert_eq!(manager.slot(5).external_timeout(), 2);
    }

    #[test]
    fn index_mapping_covers_frame_boundaries() {
        let mut manager = small_manager(1, 0.7, 4);
        let last = manager.start();
        assert_eq!(manager.slot_index_of(last, last), 0);
        let end = last + manager.frame_duration() - Duration::from_nanos(1);
        assert_eq!(manager.slot_index_of(last, end), manager.slots_per_frame() - 1);
        assert_eq!(manager.global_slot_index(Duration::from_millis(25)), 25);
    }

    #[test]
    fn first_selection_skips_the_pre_wrap_interval() {
        let (sink, events) = recorded_sink();
        let mut manager = small_manager(1, 0.7, 4);
        manager.set_trace_sink(sink);
        let mut rng = ScriptedRandom::default();

        manager.select_nominal_slots(Duration::ZERO, &mut rng);
        manager.select(Duration::ZERO, &mut rng, Position::default(), 0, 2);
        assert_eq!(manager.reservation_slot(0), Some(0));

        // With NSS = 0 and SI/2 = 3, the first scan covers only {0, 1, 2, 3}.
        let events_now = events.borrow();
        assert!(matches!(
            events_now.last(),
            Some(TraceEvent::SlotReservation {
                candidates: 4,
                free: 4,
                was_free: true
            })
        ));
    }

    #[test]
    fn reselection_wraps_around_the_ring() {
        let (sink, events) = recorded_sink();
        let mut manager = small_manager(1, 0.7, 4);
        manager.set_trace_sink(sink);
        let mut rng = ScriptedRandom::default();

        manager.select_nominal_slots(Duration::ZERO, &mut rng);
        manager.select(Duration::ZERO, &mut rng, Position::default(), 0, 2);

        // The re-selection scan covers {7, 8, 9, 0, 1, 2, 3}; the scripted
        // draw takes the first, slot 7.
        let offset = manager.reselect(Duration::ZERO, &mut rng, Position::default(), 0, 2);
        assert_eq!(manager.reservation_slot(0), Some(7));
        assert_eq!(offset, 7);
        let events_now = events.borrow();
        assert!(matches!(
            events_now.last(),
            Some(TraceEvent::SlotReReservation {
                candidates: 7,
                free: 7,
                was_free: true,
                same_slot: false
            })
        ));
    }

    #[test]
    fn candidate_set_is_topped_up_with_farthest_owners() {
        let mut manager = small_manager(1, 0.7, 2);
        let mut rng = ScriptedRandom::default();
        let now = Duration::ZERO;

        // The whole first interval {0..3} is taken; owners at different
        // distances from us at the origin.
        manager.mark_externally_allocated(now, 0, 5, owner(1), Position::new(10, 0), now);
        manager.mark_externally_allocated(now, 1, 5, owner(2), Position::new(30, 0), now);
        manager.mark_externally_allocated(now, 2, 5, owner(3), Position::new(20, 0), now);
        manager.mark_externally_allocated(now, 3, 5, owner(4), Position::new(5, 0), now);

        manager.select_nominal_slots(now, &mut rng);
        manager.select(now, &mut rng, Position::default(), 0, 2);

        // Farthest owner first: slot 1 (30 m) is the first candidate and
        // the scripted draw takes it, introducing a known collision.
        assert_eq!(manager.reservation_slot(0), Some(1));
        assert_eq!(manager.collision_with(&owner(2)), Some(1));
        let slot = manager.slot(1);
        assert!(slot.is_internally_allocated());
        assert!(slot.is_allocated(now));
    }

    #[test]
    fn collision_owners_are_not_reused() {
        let (sink, events) = recorded_sink();
        // Report rate 2 on ten slots: nominal increment 5, SI/2 = 1.
        let mut manager = small_manager(2, 0.5, 4);
        manager.set_trace_sink(sink);
        let mut rng = ScriptedRandom::with_ints(vec![1]);
        let now = Duration::ZERO;

        // One peer owns every slot of both selection intervals.
        for index in [0u32, 1, 2, 5, 6, 7] {
            manager.mark_externally_allocated(now, index, 5, owner(9), Position::new(7, 0), now);
        }

        manager.select_nominal_slots(now, &mut rng);
        manager.select(now, &mut rng, Position::default(), 0, 2);
        assert!(manager.collision_with(&owner(9)).is_some());

        // Every admissible slot belongs to the peer we now collide with, so
        // nothing is topped up and the nominal slot is the only candidate.
        manager.select(now, &mut rng, Position::default(), 1, 2);
        assert_eq!(manager.reservation_slot(1), Some(6));
        let events_now = events.borrow();
        assert!(matches!(
            events_now.last(),
            Some(TraceEvent::SlotReservation {
                candidates: 1,
                free: 0,
                was_free: false
            })
        ));
    }

    #[test]
    fn network_entry_walks_the_probability_ladder() {
        let mut manager = small_manager(1, 0.7, 4);
        let now = manager.start();
        manager.mark_busy(now, 1);

        // Free offsets within the window of five: {0, 2, 3, 4}. Draws 1.0
        // and 1.0 skip the first two trials; 0.0 accepts the third.
        let mut rng = ScriptedRandom::with_floats(vec![1.0, 1.0, 0.0]);
        let access = manager.pick_network_entry(now, &mut rng, 5, 0.0);
        assert_eq!(access.when, now + Duration::from_millis(3));
        assert_eq!(access.remaining, 2);
        assert!((access.probability - 0.75).abs() < 1e-9);
    }

    #[test]
    fn network_entry_exhaustion_takes_the_last_candidate() {
        let mut manager = small_manager(1, 0.7, 4);
        let now = manager.start();
        let mut rng = ScriptedRandom::with_floats(vec![1.0; 16]);
        let access = manager.pick_network_entry(now, &mut rng, 4, 0.0);
        assert_eq!(access.when, now + Duration::from_millis(3));
        assert_eq!(access.remaining, 1);
    }

    #[test]
    fn time_until_wraps_into_the_next_frame() {
        let mut manager = small_manager(1, 0.7, 4);
        let mut rng = ScriptedRandom::default();
        manager.select_nominal_slots(Duration::ZERO, &mut rng);
        manager.select(Duration::ZERO, &mut rng, Position::default(), 0, 2);
        assert_eq!(manager.reservation_slot(0), Some(0));

        // From the middle of slot 4, slot 0 is in the next frame.
        let now = Duration::from_micros(4_500);
        let delay = manager.time_until(now, 0);
        assert_eq!(now + delay, manager.frame_duration());
    }
}

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use super::builtin::CCA_EDGE_BACKOFF;
use super::config::{ConfigError, SotdmaConfig};
use super::header::{FrameDecodeError, FrameKind, Packet, ReservationHeader};
use super::manager::SlotManager;
use super::trace::{TraceEvent, TraceSink};
use crate::phy::{MacAddress, PositionSource, Radio};
use crate::runtime::{EventHandle, RandomSource, Scheduler};

#[derive(Debug, Error)]
pub enum MacError {
    #[error("payload of {size} octets exceeds the {max}-octet slot budget")]
    OversizedPayload { size: usize, max: usize },
    #[error("transmission slot reached but the payload queue is empty")]
    QueueEmpty,
    #[error(transparent)]
    Decode(#[from] FrameDecodeError),
    #[error("received a management frame on the broadcast channel")]
    ManagementFrame,
    #[error("received a unicast frame addressed to {0}")]
    UnicastFrame(MacAddress),
    #[error("network-entry window of {window} slots does not fit the frame ({available} slots after the monitoring span)")]
    EntryWindow { window: u32, available: u32 },
}

/// Lifecycle phase of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacState {
    /// Powered off; every channel event is discarded.
    Off,
    /// Listening for one frame plus `NI` slots to learn the slot map.
    Initializing,
    /// Waiting for the randomized-access network-entry transmission.
    Entering,
    /// Entry announced; the remaining reservations are still being made.
    FirstFrame,
    /// Continuous operation; only re-reservations happen from here on.
    Steady,
}

/// Events a station schedules for itself. They carry reservation indices
/// and window state, never references into the slot ring.
#[derive(Debug, Clone, Copy)]
enum MacEvent {
    EndOfInit,
    NetworkEntry { remaining: u32, probability: f64 },
    Transmit { first_frame: bool },
}

/// The reservation MAC of one station.
///
/// Progress is driven entirely by the injected scheduler: the MAC reacts to
/// its own timer events and to radio events forwarded by the channel
/// adapter, and is passive in between. The previously scheduled
/// transmission event is replaced whenever a lifecycle step installs a new
/// one.
pub struct ReservationMac {
    config: SotdmaConfig,
    address: MacAddress,
    scheduler: Rc<dyn Scheduler>,
    radio: Box<dyn Radio>,
    position: Box<dyn PositionSource>,
    random: Box<dyn RandomSource>,
    state: MacState,
    manager: Option<SlotManager>,
    queue: VecDeque<Vec<u8>>,
    dropped: u64,
    rx_ongoing: bool,
    rx_start: Duration,
    end_init_event: Option<EventHandle>,
    next_tx_event: Option<EventHandle>,
    forward_up: Option<Box<dyn FnMut(Vec<u8>, MacAddress, MacAddress)>>,
    link_up: Option<Box<dyn FnOnce()>>,
    link_down: Option<Box<dyn FnOnce()>>,
    trace: Option<TraceSink>,
    self_ref: Weak<RefCell<ReservationMac>>,
}

impl ReservationMac {
    pub fn new(
        config: SotdmaConfig,
        address: MacAddress,
        scheduler: Rc<dyn Scheduler>,
        radio: Box<dyn Radio>,
        position: Box<dyn PositionSource>,
        random: Box<dyn RandomSource>,
    ) -> Result<Rc<RefCell<Self>>, ConfigError> {
        config.validate()?;
        Ok(Rc::new_cyclic(|weak| {
            RefCell::new(Self {
                config,
                address,
                scheduler,
                radio,
                position,
                random,
                state: MacState::Off,
                manager: None,
                queue: VecDeque::new(),
                dropped: 0,
                rx_ongoing: false,
                rx_start: Duration::ZERO,
                end_init_event: None,
                next_tx_event: None,
                forward_up: None,
                link_up: None,
                link_down: None,
                trace: None,
                self_ref: weak.clone(),
            })
        }))
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn config(&self) -> &SotdmaConfig {
        &self.config
    }

    /// Payloads rejected at the queue because they would not fit a slot.
    pub fn dropped_payloads(&self) -> u64 {
        self.dropped
    }

    pub fn manager(&self) -> Option<&SlotManager> {
        self.manager.as_ref()
    }

    pub fn set_forward_up_callback(
        &mut self,
        callback: Box<dyn FnMut(Vec<u8>, MacAddress, MacAddress)>,
    ) {
        self.forward_up = Some(callback);
    }

    pub fn set_link_up_callback(&mut self, callback: Box<dyn FnOnce()>) {
        self.link_up = Some(callback);
    }

    pub fn set_link_down_callback(&mut self, callback: Box<dyn FnOnce()>) {
        self.link_down = Some(callback);
    }

    pub fn set_trace_sink(&mut self, sink: TraceSink) {
        if let Some(manager) = self.manager.as_mut() {
            manager.set_trace_sink(sink.clone());
        }
        self.trace = Some(sink);
    }

    fn emit(&self, event: TraceEvent) {
        if let Some(sink) = &self.trace {
            sink(&event);
        }
    }

    /// Queue a payload for broadcast in one of the reserved slots. Payloads
    /// that cannot fit a slot together with the protocol overhead are
    /// dropped and counted.
    pub fn enqueue(&mut self, payload: Vec<u8>) -> Result<(), MacError> {
        let size = payload.len() + Packet::OVERHEAD;
        let max = self.config.maximum_packet_size;
        if size > max {
            self.dropped += 1;
            debug!(size, max, "payload dropped, too large for a slot");
            return Err(MacError::OversizedPayload { size, max });
        }
        self.queue.push_back(payload);
        Ok(())
    }

    /// Power the station on: fix the frame geometry, start the one-frame
    /// monitoring phase and schedule its end.
    pub fn start(&mut self) -> Result<(), MacError> {
        if self.state != MacState::Off {
            return Ok(());
        }
        let now = self.scheduler.now();
        let slot_duration = self.radio.tx_duration(
            self.config.maximum_packet_size,
            self.config.phy_rate,
            self.config.preamble,
        ) + self.config.guard_interval;

        let mut manager = SlotManager::new(
            now,
            self.config.frame_duration,
            slot_duration,
            self.config.report_rate,
            self.config.selection_interval_ratio,
            self.config.minimum_candidate_set_size,
        );
        if let Some(sink) = &self.trace {
            manager.set_trace_sink(sink.clone());
        }

        let available = manager.slots_per_frame() - manager.nominal_increment();
        if self.config.slots_for_rtdma >= available {
            return Err(MacError::EntryWindow {
                window: self.config.slots_for_rtdma,
                available,
            });
        }

        let start = manager.start();
        let frame_duration = manager.frame_duration();
        let end_of_init =
            start + frame_duration + manager.slot_duration() * manager.nominal_increment();
        self.manager = Some(manager);
        self.state = MacState::Initializing;
        let handle = self.schedule_event(end_of_init, MacEvent::EndOfInit);
        self.end_init_event = Some(handle);
        debug!(station = %self.address, ?start, ?end_of_init, "initialization phase started");
        self.emit(TraceEvent::Startup {
            when: start,
            frame_duration,
            slot_duration,
        });
        Ok(())
    }

    fn schedule_event(&self, at: Duration, event: MacEvent) -> EventHandle {
        let weak = self.self_ref.clone();
        self.scheduler.schedule(
            at,
            Box::new(move || {
                if let Some(mac) = weak.upgrade() {
                    mac.borrow_mut().dispatch(event);
                }
            }),
        )
    }

    fn dispatch(&mut self, event: MacEvent) {
        let result = match event {
            MacEvent::EndOfInit => self.end_of_initialization(),
            MacEvent::NetworkEntry {
                remaining,
                probability,
            } => self.perform_network_entry(remaining, probability),
            MacEvent::Transmit { first_frame } => self.do_transmit(first_frame),
        };
        if let Err(err) = result {
            self.fail(&err);
        }
    }

    /// Fatal condition: report it, notify the upper layer once and go
    /// offline. The session does not continue.
    fn fail(&mut self, err: &MacError) {
        error!(station = %self.address, %err, "fatal MAC condition, going offline");
        if let Some(handle) = self.end_init_event.take() {
            self.scheduler.cancel(handle);
        }
        if let Some(handle) = self.next_tx_event.take() {
            self.scheduler.cancel(handle);
        }
        if let Some(link_down) = self.link_down.take() {
            link_down();
        }
        self.state = MacState::Off;
    }

    fn draw_timeout(&mut self) -> u8 {
        let (low, high) = self.config.timeout_distribution;
        self.random.uniform_int(low.into(), high.into()) as u8
    }

    /// One frame plus `NI` slots have passed: the slot map is as complete
    /// as it gets, draw the network-entry instant.
    fn end_of_initialization(&mut self) -> Result<(), MacError> {
        let now = self.scheduler.now();
        self.state = MacState::Entering;
        let window = self.config.slots_for_rtdma;
        let manager = self.manager.as_mut().unwrap();
        let access = manager.pick_network_entry(now, &mut *self.random, window, 0.0);
        debug!(station = %self.address, when = ?access.when, "network entry scheduled");
        let handle = self.schedule_event(
            access.when,
            MacEvent::NetworkEntry {
                remaining: access.remaining,
                probability: access.probability,
            },
        );
        self.next_tx_event = Some(handle);
        Ok(())
    }

    /// The network-entry instant arrived. If the chosen slot was claimed in
    /// the meantime and the window still holds free slots, draw again;
    /// otherwise commit: re-base the frame to start at the next slot, pick
    /// the nominal slots, reserve the first slot and announce it all.
    fn perform_network_entry(&mut self, remaining: u32, probability: f64) -> Result<(), MacError> {
        let now = self.scheduler.now();
        let mut was_taken = false;
        {
            let manager = self.manager.as_mut().unwrap();
            if !manager.is_current_slot_still_free(now) {
                was_taken = true;
                debug!(station = %self.address, "entry slot taken, considering a re-draw");
                if remaining > 0 && manager.has_free_slots_left(now, remaining) {
                    let access =
                        manager.pick_network_entry(now, &mut *self.random, remaining, probability);
                    let handle = self.schedule_event(
                        access.when,
                        MacEvent::NetworkEntry {
                            remaining: access.remaining,
                            probability: access.probability,
                        },
                    );
                    self.next_tx_event = Some(handle);
                    return Ok(());
                }
            }
        }

        {
            let manager = self.manager.as_mut().unwrap();
            let slot_duration = manager.slot_duration();
            manager.rebase(now + slot_duration);
            manager.select_nominal_slots(now, &mut *self.random);
        }
        let timeout = self.draw_timeout();
        let my_position = self.position.position();
        let manager = self.manager.as_mut().unwrap();
        let slot_duration = manager.slot_duration();
        manager.select(now, &mut *self.random, my_position, 0, timeout);
        let delay = manager.time_until(now, 0);
        debug_assert!(delay.as_nanos() % slot_duration.as_nanos() == 0);
        let offset = (delay.as_nanos() / slot_duration.as_nanos()) as u16;

        let payload = self.queue.pop_front().ok_or(MacError::QueueEmpty)?;
        let packet = self.build_packet(offset, 0, true, payload);
        let frame = packet.encode();
        let size = frame.len();
        self.radio
            .send(frame, self.config.phy_rate, self.config.preamble);
        self.state = MacState::FirstFrame;
        if let Some(link_up) = self.link_up.take() {
            link_up();
        }
        debug!(station = %self.address, offset, was_taken, "network entry transmitted");
        self.emit(TraceEvent::NetworkEntry {
            when: now,
            delay,
            was_taken,
            size,
        });
        let handle = self.schedule_event(now + delay, MacEvent::Transmit { first_frame: true });
        self.next_tx_event = Some(handle);
        Ok(())
    }

    /// A reserved slot arrived. During the first frame the following
    /// reservation is selected just before it is needed; afterwards only
    /// timeouts count down and expired reservations move.
    fn do_transmit(&mut self, first_frame: bool) -> Result<(), MacError> {
        let now = self.scheduler.now();
        if self.queue.is_empty() {
            return Err(MacError::QueueEmpty);
        }

        let current = self.manager.as_mut().unwrap().current_reservation_no(now);
        let next = (current + 1) % self.config.report_rate;
        debug!(station = %self.address, current, next, first_frame, "transmission slot");

        if first_frame && next > current {
            let timeout = self.draw_timeout();
            let my_position = self.position.position();
            let manager = self.manager.as_mut().unwrap();
            manager.select(now, &mut *self.random, my_position, next, timeout);
        }

        let (delay, announced_timeout, needs_reselect) = {
            let manager = self.manager.as_mut().unwrap();
            let delay = manager.time_until(now, next);
            let announced_timeout = manager.decrement_timeout(now, current);
            let needs_reselect = manager.needs_rereservation(now, current);
            (delay, announced_timeout, needs_reselect)
        };

        let offset = if needs_reselect {
            let timeout = self.draw_timeout();
            let my_position = self.position.position();
            self.manager.as_mut().unwrap().reselect(
                now,
                &mut *self.random,
                my_position,
                current,
                timeout,
            )
        } else {
            self.manager
                .as_ref()
                .unwrap()
                .slot_offset_between(current, next) as u16
        };

        let still_first = first_frame && current < next;
        let handle = self.schedule_event(
            now + delay,
            MacEvent::Transmit {
                first_frame: still_first,
            },
        );
        self.next_tx_event = Some(handle);
        if !still_first {
            self.state = MacState::Steady;
        }

        let payload = self.queue.pop_front().ok_or(MacError::QueueEmpty)?;
        let packet = self.build_packet(offset, announced_timeout, false, payload);
        let frame = packet.encode();
        let size = frame.len();
        self.radio
            .send(frame, self.config.phy_rate, self.config.preamble);
        self.emit(TraceEvent::Tx {
            when: now,
            reservation: current,
            timeout: announced_timeout,
            offset,
            size,
        });
        Ok(())
    }

    fn build_packet(&self, offset: u16, timeout: u8, entry: bool, payload: Vec<u8>) -> Packet {
        let header = ReservationHeader::new(self.position.position(), offset, timeout, entry);
        Packet::broadcast(self.address, header, payload)
    }

    fn ignores_channel_events(&self, now: Duration) -> bool {
        if self.state == MacState::Off {
            return true;
        }
        match self.manager.as_ref() {
            Some(manager) => manager.start() > now,
            None => true,
        }
    }

    pub(crate) fn handle_rx_start(&mut self, _duration: Duration) {
        let now = self.scheduler.now();
        if self.ignores_channel_events(now) {
            return;
        }
        self.rx_ongoing = true;
        self.rx_start = now;
    }

    /// A frame arrived intact. Parse it, apply the reservation rules and
    /// hand the payload up. Any protocol deviation terminates the session.
    pub(crate) fn handle_rx_ok(&mut self, frame: &[u8]) -> Result<(), MacError> {
        let now = self.scheduler.now();
        if self.ignores_channel_events(now) {
            return Ok(());
        }
        self.rx_ongoing = false;
        match self.apply_reception(now, frame) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn apply_reception(&mut self, now: Duration, frame: &[u8]) -> Result<(), MacError> {
        let packet = Packet::decode(frame)?;
        if packet.mac.kind == FrameKind::Management {
            return Err(MacError::ManagementFrame);
        }
        if !packet.mac.dest.is_broadcast() {
            return Err(MacError::UnicastFrame(packet.mac.dest));
        }

        let from = packet.mac.src;
        let header = packet.reservation;
        let position = header.position();
        let offset = u32::from(header.offset);
        let manager = self.manager.as_mut().unwrap();
        let slots_per_frame = manager.slots_per_frame();
        let slot_duration = manager.slot_duration();
        let current = manager.slot_index_of(now, now);
        debug!(
            station = %self.address,
            %from,
            current,
            offset,
            timeout = header.timeout,
            entry = header.network_entry(),
            "reservation announcement received"
        );

        if header.timeout > 0 {
            // The peer keeps this slot and will also transmit `offset`
            // slots ahead.
            let next = (current + offset) % slots_per_frame;
            manager.mark_externally_allocated(
                now,
                current,
                header.timeout,
                from,
                position,
                Duration::ZERO,
            );
            manager.mark_externally_allocated(now, next, 1, from, position, Duration::ZERO);
        } else if header.network_entry() {
            let next = (current + offset) % slots_per_frame;
            manager.mark_externally_allocated(now, next, 1, from, position, Duration::ZERO);
        } else {
            // The peer moved this reservation. Release the old slot unless
            // it is our own, and record the new one for the peer's next
            // frame.
            let mut new_slot = current + offset;
            if new_slot >= slots_per_frame {
                new_slot -= slots_per_frame;
            }
            // Conforming stations announce offsets below one frame; wrap a
            // second time so values up to 2N stay in range.
            if new_slot >= slots_per_frame {
                new_slot -= slots_per_frame;
            }
            if !manager.slot(current).is_internally_allocated() {
                manager.mark_free_again(now, current);
            }
            let not_before = now + slot_duration * offset.saturating_sub(1);
            manager.mark_externally_allocated(now, new_slot, 2, from, position, not_before);
        }

        self.emit(TraceEvent::Rx {
            when: now,
            from,
            timeout: header.timeout,
            offset: header.offset,
            size: frame.len(),
        });
        if let Some(forward_up) = &mut self.forward_up {
            forward_up(packet.payload, from, packet.mac.dest);
        }
        Ok(())
    }

    /// The ongoing reception failed: every slot it overlapped is busy.
    pub(crate) fn handle_rx_error(&mut self) {
        let now = self.scheduler.now();
        if self.ignores_channel_events(now) || !self.rx_ongoing {
            return;
        }
        self.rx_ongoing = false;
        let rx_start = self.rx_start;
        let manager = self.manager.as_mut().unwrap();
        let slots_per_frame = u64::from(manager.slots_per_frame());
        let first = u64::from(manager.slot_index_of(now, rx_start));
        let count = manager.global_slot_index(now) - manager.global_slot_index(rx_start);
        for k in 0..=count {
            manager.mark_busy(now, ((first + k) % slots_per_frame) as u32);
        }
    }

    /// Channel energy without a decodable preamble: every slot the busy
    /// span overlaps is busy, counted by slot start edges with a one
    /// microsecond back-off against boundary double counting.
    pub(crate) fn handle_cca_busy(&mut self, duration: Duration) {
        let now = self.scheduler.now();
        if self.ignores_channel_events(now) {
            return;
        }
        let end = (now + duration).saturating_sub(CCA_EDGE_BACKOFF).max(now);
        let manager = self.manager.as_mut().unwrap();
        let slots_per_frame = u64::from(manager.slots_per_frame());
        let first = u64::from(manager.slot_index_of(now, now));
        let count = manager.global_slot_index(end) - manager.global_slot_index(now);
        for k in 0..=count {
            manager.mark_busy(now, ((first + k) % slots_per_frame) as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::{PhyRate, Position, PreambleMode};
    use crate::runtime::ScriptedRandom;
    use crate::sim::{FixedPosition, Simulator};
    use crate::stdma::header::MacHeader;
    use crate::stdma::SlotState;
    use std::rc::Rc;

    struct SilentRadio;

    impl crate::phy::Radio for SilentRadio {
        fn tx_duration(&self, bytes: usize, rate: PhyRate, preamble: PreambleMode) -> Duration {
            crate::phy::tx_duration(bytes, rate, preamble)
        }

        fn send(&self, _frame: Vec<u8>, _rate: PhyRate, _preamble: PreambleMode) {}
    }

    fn station(config: SotdmaConfig) -> (Rc<Simulator>, Rc<RefCell<ReservationMac>>) {
        let simulator = Simulator::new();
        let mac = ReservationMac::new(
            config,
            MacAddress([2; 6]),
            simulator.clone(),
            Box::new(SilentRadio),
            Box::new(FixedPosition(Position::new(0, 0))),
            Box::new(ScriptedRandom::default()),
        )
        .unwrap();
        (simulator, mac)
    }

    fn peer_frame(kind: FrameKind, dest: MacAddress) -> Vec<u8> {
        let packet = Packet {
            mac: MacHeader {
                kind,
                dest,
                src: MacAddress([9; 6]),
            },
            reservation: ReservationHeader::new(Position::new(5, 5), 3, 2, false),
            payload: vec![0x11; 16],
        };
        packet.encode()
    }

    #[test]
    fn oversized_payloads_are_dropped_and_counted() {
        let (_simulator, mac) = station(SotdmaConfig::default());
        let mut mac = mac.borrow_mut();
        let max = mac.config().maximum_packet_size;
        assert!(mac.enqueue(vec![0; max]).is_err());
        assert_eq!(mac.dropped_payloads(), 1);
        assert!(mac.enqueue(vec![0; max - Packet::OVERHEAD]).is_ok());
        assert_eq!(mac.dropped_payloads(), 1);
    }

    #[test]
    fn rejects_misconfiguration_up_front() {
        let simulator = Simulator::new();
        let result = ReservationMac::new(
            SotdmaConfig {
                selection_interval_ratio: 2.0,
                ..SotdmaConfig::default()
            },
            MacAddress([2; 6]),
            simulator,
            Box::new(SilentRadio),
            Box::new(FixedPosition(Position::new(0, 0))),
            Box::new(ScriptedRandom::default()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn events_before_startup_are_ignored() {
        let (_simulator, mac) = station(SotdmaConfig::default());
        let mut mac = mac.borrow_mut();
        assert!(mac.handle_rx_ok(&peer_frame(FrameKind::Data, MacAddress::BROADCAST)).is_ok());
        mac.handle_cca_busy(Duration::from_millis(1));
        assert_eq!(mac.state(), MacState::Off);
        assert!(mac.manager().is_none());
    }

    #[test]
    fn unicast_reception_is_fatal_once() {
        let (_simulator, mac) = station(SotdmaConfig::default());
        let downs = Rc::new(RefCell::new(0));
        {
            let downs = downs.clone();
            let mut mac = mac.borrow_mut();
            mac.set_link_down_callback(Box::new(move || {
                *downs.borrow_mut() += 1;
            }));
            mac.start().unwrap();
        }

        let mut mac = mac.borrow_mut();
        let frame = peer_frame(FrameKind::Data, MacAddress([7; 6]));
        assert!(matches!(
            mac.handle_rx_ok(&frame),
            Err(MacError::UnicastFrame(_))
        ));
        assert_eq!(mac.state(), MacState::Off);
        assert_eq!(*downs.borrow(), 1);

        // The session is over; further events are discarded silently.
        assert!(mac.handle_rx_ok(&frame).is_ok());
        assert_eq!(*downs.borrow(), 1);
    }

    #[test]
    fn management_reception_is_fatal() {
        let (_simulator, mac) = station(SotdmaConfig::default());
        mac.borrow_mut().start().unwrap();
        let mut mac = mac.borrow_mut();
        let frame = peer_frame(FrameKind::Management, MacAddress::BROADCAST);
        assert!(matches!(
            mac.handle_rx_ok(&frame),
            Err(MacError::ManagementFrame)
        ));
        assert_eq!(mac.state(), MacState::Off);
    }

    #[test]
    fn undecodable_frame_is_fatal() {
        let (_simulator, mac) = station(SotdmaConfig::default());
        mac.borrow_mut().start().unwrap();
        let mut mac = mac.borrow_mut();
        assert!(matches!(
            mac.handle_rx_ok(&[0u8; 8]),
            Err(MacError::Decode(_))
        ));
        assert_eq!(mac.state(), MacState::Off);
    }

    #[test]
    fn entry_window_must_fit_the_frame() {
        let (_simulator, mac) = station(SotdmaConfig {
            slots_for_rtdma: 100_000,
            ..SotdmaConfig::default()
        });
        let mut mac = mac.borrow_mut();
        assert!(matches!(
            mac.start(),
            Err(MacError::EntryWindow { .. })
        ));
    }

    #[test]
    fn cca_busy_marks_overlapped_slots() {
        let (_simulator, mac) = station(SotdmaConfig::default());
        mac.borrow_mut().start().unwrap();
        let mut mac = mac.borrow_mut();
        let slot_duration = mac.manager().unwrap().slot_duration();
        // A busy span of three slots, ending on a boundary: the back-off
        // keeps the fourth slot out.
        mac.handle_cca_busy(slot_duration * 3);
        let manager = mac.manager().unwrap();
        assert_eq!(manager.slot(0).state(), SlotState::Busy);
        assert_eq!(manager.slot(1).state(), SlotState::Busy);
        assert_eq!(manager.slot(2).state(), SlotState::Busy);
        assert_eq!(manager.slot(3).state(), SlotState::Free);
    }
}

//! Deterministic discrete-event environment: an event [`Simulator`]
//! implementing the scheduler capability, a zero-delay broadcast
//! [`SimChannel`] connecting stations, and a [`Station`] bundle wiring a MAC
//! to both. Tests and the CLI drive whole multi-station scenarios through
//! this module with reproducible timing.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::rc::Rc;
use std::time::Duration;
use tracing::error;

use crate::phy::{
    self, MacAddress, PhyListener, PhyRate, Position, PositionSource, PreambleMode, Radio,
};
use crate::runtime::{EventFn, EventHandle, RandomSource, Scheduler};
use crate::stdma::{ChannelAdapter, ConfigError, MacError, ReservationMac, SotdmaConfig};

struct Scheduled {
    at: Duration,
    seq: u64,
    handle: u64,
    event: EventFn,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

struct SimulatorInner {
    now: Duration,
    seq: u64,
    next_handle: u64,
    queue: BinaryHeap<Reverse<Scheduled>>,
    cancelled: HashSet<u64>,
}

/// Single-threaded event executor. Events run in timestamp order, ties in
/// insertion order; cancelled handles are skipped when they surface.
pub struct Simulator {
    inner: RefCell<SimulatorInner>,
}

impl Simulator {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            inner: RefCell::new(SimulatorInner {
                now: Duration::ZERO,
                seq: 0,
                next_handle: 0,
                queue: BinaryHeap::new(),
                cancelled: HashSet::new(),
            }),
        })
    }

    /// Execute every event up to and including `end`, then park the clock
    /// there.
    pub fn run_until(&self, end: Duration) {
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let due = matches!(inner.queue.peek(), Some(Reverse(scheduled)) if scheduled.at <= end);
                if !due {
                    break;
                }
                let Reverse(scheduled) = inner.queue.pop().unwrap();
                if inner.cancelled.remove(&scheduled.handle) {
                    None
                } else {
                    inner.now = scheduled.at;
                    Some(scheduled.event)
                }
            };
            if let Some(event) = next {
                event();
            }
        }
        let mut inner = self.inner.borrow_mut();
        if inner.now < end {
            inner.now = end;
        }
    }
}

impl Scheduler for Simulator {
    fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    fn schedule(&self, at: Duration, event: EventFn) -> EventHandle {
        let mut inner = self.inner.borrow_mut();
        let at = at.max(inner.now);
        inner.seq += 1;
        inner.next_handle += 1;
        let seq = inner.seq;
        let handle = inner.next_handle;
        inner.queue.push(Reverse(Scheduled {
            at,
            seq,
            handle,
            event,
        }));
        EventHandle(handle)
    }

    fn cancel(&self, handle: EventHandle) {
        self.inner.borrow_mut().cancelled.insert(handle.0);
    }
}

/// An ideal shared medium: every transmission reaches every other station,
/// reception starts immediately and completes after the frame's time on
/// air. There is no propagation delay and no loss.
pub struct SimChannel {
    scheduler: Rc<Simulator>,
    stations: RefCell<Vec<Option<Rc<dyn PhyListener>>>>,
}

impl SimChannel {
    pub fn new(scheduler: Rc<Simulator>) -> Rc<Self> {
        Rc::new(Self {
            scheduler,
            stations: RefCell::new(Vec::new()),
        })
    }

    pub fn scheduler(&self) -> Rc<Simulator> {
        self.scheduler.clone()
    }

    /// Reserve a slot on the medium; the listener is connected separately
    /// because the radio must exist before the station it belongs to.
    fn register(&self) -> usize {
        let mut stations = self.stations.borrow_mut();
        stations.push(None);
        stations.len() - 1
    }

    fn connect(&self, index: usize, listener: Rc<dyn PhyListener>) {
        self.stations.borrow_mut()[index] = Some(listener);
    }

    fn broadcast(&self, from: usize, frame: Vec<u8>, duration: Duration) {
        let listeners: Vec<(usize, Rc<dyn PhyListener>)> = self
            .stations
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(index, listener)| {
                listener.as_ref().map(|listener| (index, listener.clone()))
            })
            .collect();
        let done = self.scheduler.now() + duration;
        for (index, listener) in listeners {
            if index == from {
                continue;
            }
            listener.on_rx_start(duration);
            let frame = frame.clone();
            self.scheduler.schedule(
                done,
                Box::new(move || {
                    if let Err(err) = listener.on_rx_ok(&frame) {
                        error!(%err, "station left the session");
                    }
                }),
            );
        }
    }
}

/// Radio attached to a [`SimChannel`] slot.
pub struct SimRadio {
    channel: Rc<SimChannel>,
    index: usize,
}

impl Radio for SimRadio {
    fn tx_duration(&self, bytes: usize, rate: PhyRate, preamble: PreambleMode) -> Duration {
        phy::tx_duration(bytes, rate, preamble)
    }

    fn send(&self, frame: Vec<u8>, rate: PhyRate, preamble: PreambleMode) {
        let duration = phy::tx_duration(frame.len(), rate, preamble);
        self.channel.broadcast(self.index, frame, duration);
    }
}

/// A stationary position source.
pub struct FixedPosition(pub Position);

impl PositionSource for FixedPosition {
    fn position(&self) -> Position {
        self.0
    }
}

/// One simulated station: a MAC wired to the channel through a radio and a
/// channel adapter.
pub struct Station {
    pub mac: Rc<RefCell<ReservationMac>>,
    pub adapter: Rc<ChannelAdapter>,
    scheduler: Rc<Simulator>,
}

impl Station {
    pub fn new(
        channel: &Rc<SimChannel>,
        config: SotdmaConfig,
        address: MacAddress,
        position: Position,
        random: Box<dyn RandomSource>,
    ) -> Result<Self, ConfigError> {
        let scheduler = channel.scheduler();
        let index = channel.register();
        let radio = SimRadio {
            channel: channel.clone(),
            index,
        };
        let mac = ReservationMac::new(
            config,
            address,
            scheduler.clone(),
            Box::new(radio),
            Box::new(FixedPosition(position)),
            random,
        )?;
        let adapter = Rc::new(ChannelAdapter::new(&mac));
        let listener: Rc<dyn PhyListener> = adapter.clone();
        channel.connect(index, listener);
        Ok(Self {
            mac,
            adapter,
            scheduler,
        })
    }

    pub fn start(&self) -> Result<(), MacError> {
        self.mac.borrow_mut().start()
    }

    /// Feed the payload queue on a fixed cadence, the way a periodic
    /// beaconing application would.
    pub fn enqueue_every(
        &self,
        first: Duration,
        interval: Duration,
        payload_size: usize,
        until: Duration,
    ) {
        let mut at = first;
        while at <= until {
            let mac = self.mac.clone();
            self.scheduler.schedule(
                at,
                Box::new(move || {
                    let _ = mac.borrow_mut().enqueue(vec![0u8; payload_size]);
                }),
            );
            at += interval;
        }
    }
}

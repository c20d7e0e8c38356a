use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use super::mac::{MacError, ReservationMac};
use crate::phy::PhyListener;

/// Translates radio events into MAC calls. This is the only implementer of
/// [`PhyListener`]; it holds the station weakly so a detached radio can
/// never keep it alive.
pub struct ChannelAdapter {
    mac: Weak<RefCell<ReservationMac>>,
}

impl ChannelAdapter {
    pub fn new(mac: &Rc<RefCell<ReservationMac>>) -> Self {
        Self {
            mac: Rc::downgrade(mac),
        }
    }
}

impl PhyListener for ChannelAdapter {
    fn on_rx_start(&self, duration: Duration) {
        if let Some(mac) = self.mac.upgrade() {
            mac.borrow_mut().handle_rx_start(duration);
        }
    }

    fn on_rx_ok(&self, frame: &[u8]) -> Result<(), MacError> {
        match self.mac.upgrade() {
            Some(mac) => mac.borrow_mut().handle_rx_ok(frame),
            None => Ok(()),
        }
    }

    fn on_rx_error(&self) {
        if let Some(mac) = self.mac.upgrade() {
            mac.borrow_mut().handle_rx_error();
        }
    }

    fn on_cca_busy(&self, duration: Duration) {
        if let Some(mac) = self.mac.upgrade() {
            mac.borrow_mut().handle_cca_busy(duration);
        }
    }
}

//! Radio abstractions: the capability the MAC transmits through, the
//! listener capability radio events are delivered to, station addressing and
//! positioning, and the OFDM timing math used to size slots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::stdma::MacError;

/// OFDM service field bits prepended by the PHY.
const SERVICE_BITS: usize = 16;
/// OFDM tail bits appended after the payload.
const TAIL_BITS: usize = 6;
/// Duration of one OFDM symbol (20 MHz channelization).
const SYMBOL_DURATION: Duration = Duration::from_micros(4);

/// A 48-bit station address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// A planar station position, in the coordinate units produced by the
/// position source. Carried verbatim in reservation announcements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Queried at transmit time for the coordinates announced in the header.
pub trait PositionSource {
    fn position(&self) -> Position;
}

/// OFDM data rates available to the MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhyRate {
    Ofdm6Mbps,
    Ofdm9Mbps,
    Ofdm12Mbps,
    Ofdm18Mbps,
    Ofdm24Mbps,
    Ofdm36Mbps,
    Ofdm48Mbps,
    Ofdm54Mbps,
}

impl PhyRate {
    /// Data bits carried by one OFDM symbol at this rate.
    pub fn bits_per_symbol(&self) -> usize {
        match self {
            PhyRate::Ofdm6Mbps => 24,
            PhyRate::Ofdm9Mbps => 36,
            PhyRate::Ofdm12Mbps => 48,
            PhyRate::Ofdm18Mbps => 72,
            PhyRate::Ofdm24Mbps => 96,
            PhyRate::Ofdm36Mbps => 144,
            PhyRate::Ofdm48Mbps => 192,
            PhyRate::Ofdm54Mbps => 216,
        }
    }
}

/// Preamble mode, passed through to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreambleMode {
    Long,
    Short,
}

impl PreambleMode {
    pub fn duration(&self) -> Duration {
        match self {
            // 16 us training plus the 4 us SIGNAL symbol.
            PreambleMode::Long => Duration::from_micros(20),
            PreambleMode::Short => Duration::from_micros(16),
        }
    }
}

/// Channelizations a station can be configured for. Only the two vehicular
/// channels are valid for slotted operation; the rest are rejected at
/// configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WirelessStandard {
    VehicularControlChannel,
    VehicularServiceChannel,
    GeneralPurpose5GHz,
    GeneralPurpose2_4GHz,
}

impl WirelessStandard {
    pub fn supports_slotted_access(&self) -> bool {
        matches!(
            self,
            WirelessStandard::VehicularControlChannel | WirelessStandard::VehicularServiceChannel
        )
    }
}

/// Time on air of a frame of `bytes` octets: preamble, then enough OFDM
/// symbols for the service field, the payload and the tail bits.
pub fn tx_duration(bytes: usize, rate: PhyRate, preamble: PreambleMode) -> Duration {
    let bits = SERVICE_BITS + 8 * bytes + TAIL_BITS;
    let per_symbol = rate.bits_per_symbol();
    let symbols = (bits + per_symbol - 1) / per_symbol;
    preamble.duration() + SYMBOL_DURATION * symbols as u32
}

/// The transmit capability handed to the MAC.
pub trait Radio {
    fn tx_duration(&self, bytes: usize, rate: PhyRate, preamble: PreambleMode) -> Duration;
    fn send(&self, frame: Vec<u8>, rate: PhyRate, preamble: PreambleMode);
}

/// Radio events delivered to the MAC. The channel adapter is the sole
/// implementer; everything else talks to the MAC directly.
pub trait PhyListener {
    /// A preamble was detected; reception will keep the radio busy for
    /// `duration`.
    fn on_rx_start(&self, duration: Duration);
    /// A frame was received and decoded by the PHY.
    fn on_rx_ok(&self, frame: &[u8]) -> Result<(), MacError>;
    /// The ongoing reception failed to decode.
    fn on_rx_error(&self);
    /// The channel was sensed busy for `duration` without a decodable
    /// preamble.
    fn on_cca_busy(&self, duration: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_duration_matches_ofdm_timing() {
        // 400 octets at 6 Mb/s: 3222 bits, 135 symbols, 540 us + 20 us.
        let duration = tx_duration(400, PhyRate::Ofdm6Mbps, PreambleMode::Long);
        assert_eq!(duration, Duration::from_micros(560));

        // 500 octets: 4022 bits, 168 symbols.
        let duration = tx_duration(500, PhyRate::Ofdm6Mbps, PreambleMode::Long);
        assert_eq!(duration, Duration::from_micros(20 + 168 * 4));
    }

    #[test]
    fn broadcast_address_is_recognised() {
        assert!(MacAddress::BROADCAST.is_broadcast());
        assert!(!MacAddress([0, 1, 2, 3, 4, 5]).is_broadcast());
        assert_eq!(
            MacAddress([0xab, 0xcd, 0xef, 0x12, 0x34, 0x56]).to_string(),
            "ab:cd:ef:12:34:56"
        );
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Position::new(0, 0);
        let b = Position::new(3, 4);
        assert_eq!(a.distance_to(&b), 5.0);
    }
}

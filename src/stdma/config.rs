use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::builtin::FRAME_OVERHEAD;
use crate::phy::{PhyRate, PreambleMode, WirelessStandard};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("standard {0:?} does not support slotted access")]
    UnsupportedStandard(WirelessStandard),
    #[error("selection interval ratio {0} is outside [0, 1]")]
    SelectionIntervalRatio(f64),
    #[error("report rate must be at least 1")]
    ReportRate,
    #[error("frame duration must be positive")]
    FrameDuration,
    #[error("timeout distribution [{0}, {1}] is inverted")]
    TimeoutDistribution(u8, u8),
    #[error("maximum packet size {size} cannot carry the {overhead}-octet protocol overhead")]
    PacketSize { size: usize, overhead: usize },
}

/// Everything a station needs to know before it is switched on. Threaded
/// explicitly through construction; there is no global registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SotdmaConfig {
    /// Channel the station operates on.
    pub standard: WirelessStandard,
    /// Length of the repeating frame. The effective frame duration is
    /// rounded down to a whole number of slots.
    pub frame_duration: Duration,
    /// Octets per slot, protocol overhead included. Together with the PHY
    /// rate and preamble this fixes the slot duration.
    pub maximum_packet_size: usize,
    /// Transmissions per frame.
    pub report_rate: u32,
    /// Bounds of the uniform reservation-timeout draw, in frames.
    pub timeout_distribution: (u8, u8),
    /// Dead air appended to every slot.
    pub guard_interval: Duration,
    /// Length of the RA-TDMA network-entry window, in slots.
    pub slots_for_rtdma: u32,
    /// Selection interval size relative to the nominal increment.
    pub selection_interval_ratio: f64,
    /// Candidate sets smaller than this are topped up with externally
    /// allocated slots.
    pub minimum_candidate_set_size: usize,
    pub phy_rate: PhyRate,
    pub preamble: PreambleMode,
}

impl Default for SotdmaConfig {
    fn default() -> Self {
        Self {
            standard: WirelessStandard::VehicularControlChannel,
            frame_duration: Duration::from_secs(1),
            maximum_packet_size: 500,
            report_rate: 2,
            timeout_distribution: (3, 7),
            guard_interval: Duration::from_micros(6),
            slots_for_rtdma: 150,
            selection_interval_ratio: 0.2,
            minimum_candidate_set_size: 4,
            phy_rate: PhyRate::Ofdm6Mbps,
            preamble: PreambleMode::Long,
        }
    }
}

impl SotdmaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.standard.supports_slotted_access() {
            return Err(ConfigError::UnsupportedStandard(self.standard));
        }
        if !(0.0..=1.0).contains(&self.selection_interval_ratio) {
            return Err(ConfigError::SelectionIntervalRatio(
                self.selection_interval_ratio,
            ));
        }
        if self.report_rate < 1 {
            return Err(ConfigError::ReportRate);
        }
        if self.frame_duration.is_zero() {
            return Err(ConfigError::FrameDuration);
        }
        let (low, high) = self.timeout_distribution;
        if low > high {
            return Err(ConfigError::TimeoutDistribution(low, high));
        }
        if self.maximum_packet_size <= FRAME_OVERHEAD {
            return Err(ConfigError::PacketSize {
                size: self.maximum_packet_size,
                overhead: FRAME_OVERHEAD,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SotdmaConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_unslotted_standard() {
        let config = SotdmaConfig {
            standard: WirelessStandard::GeneralPurpose5GHz,
            ..SotdmaConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedStandard(_))
        ));
    }

    #[test]
    fn rejects_ratio_outside_unit_interval() {
        let config = SotdmaConfig {
            selection_interval_ratio: 1.2,
            ..SotdmaConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SelectionIntervalRatio(_))
        ));
    }

    #[test]
    fn rejects_packet_size_below_overhead() {
        let config = SotdmaConfig {
            maximum_packet_size: 16,
            ..SotdmaConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::PacketSize { .. })));
    }
}

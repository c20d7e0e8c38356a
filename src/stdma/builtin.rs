//! Wire-format widths and protocol constants.

use crc::{Crc, CRC_32_ISO_HDLC};
use std::time::Duration;

pub const KIND_LEN: usize = 1;
pub const ADDRESS_LEN: usize = 6;

pub const LATITUDE_LEN: usize = 4;
pub const LONGITUDE_LEN: usize = 4;
pub const OFFSET_LEN: usize = 2;
pub const TIMEOUT_LEN: usize = 1;
pub const ENTRY_LEN: usize = 1;

/// The reservation announcement carried by every data frame.
pub const RESERVATION_HEADER_LEN: usize =
    LATITUDE_LEN + LONGITUDE_LEN + OFFSET_LEN + TIMEOUT_LEN + ENTRY_LEN;

pub const MAC_HEADER_LEN: usize = KIND_LEN + ADDRESS_LEN + ADDRESS_LEN;

pub const FCS_ALGORITHM: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
pub const FCS_LEN: usize = 4;

/// Octets added around a payload on the air.
pub const FRAME_OVERHEAD: usize = MAC_HEADER_LEN + RESERVATION_HEADER_LEN + FCS_LEN;

/// Back-off applied to the end of a CCA-busy span so a period ending exactly
/// on a slot edge does not also claim the following slot.
pub const CCA_EDGE_BACKOFF: Duration = Duration::from_micros(1);

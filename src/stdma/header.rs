use thiserror::Error;

use super::builtin::{
    ADDRESS_LEN, FCS_ALGORITHM, FCS_LEN, FRAME_OVERHEAD, KIND_LEN, MAC_HEADER_LEN,
    RESERVATION_HEADER_LEN,
};
use crate::phy::{MacAddress, Position};

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("frame is too short (got {0}, expected at least {1})")]
    FrameIsTooShort(usize, usize),
    #[error("frame check sequence mismatch (got {0:#010x}, expected {1:#010x})")]
    FcsMismatch(u32, u32),
    #[error("unknown frame kind (got {0})")]
    UnknownFrameKind(u8),
    #[error("reservation header is {0} octets, expected {1}")]
    HeaderLength(usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data = 0x00,
    Management = 0x01,
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameDecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(FrameKind::Data),
            0x01 => Ok(FrameKind::Management),
            other => Err(FrameDecodeError::UnknownFrameKind(other)),
        }
    }
}

/// Outer header of every on-air frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacHeader {
    pub kind: FrameKind,
    pub dest: MacAddress,
    pub src: MacAddress,
}

/// The reservation announcement: position of the sender, offset to its next
/// transmission of this reservation, remaining frames the slot is held, and
/// the network-entry flag. Fixed 12-octet big-endian layout.
///
/// `entry` is carried as a full octet so that any 12-octet buffer survives a
/// decode/encode round trip unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationHeader {
    pub latitude: u32,
    pub longitude: u32,
    pub offset: u16,
    pub timeout: u8,
    pub entry: u8,
}

impl ReservationHeader {
    pub fn new(position: Position, offset: u16, timeout: u8, entry: bool) -> Self {
        Self {
            latitude: position.x,
            longitude: position.y,
            offset,
            timeout,
            entry: entry.into(),
        }
    }

    pub fn network_entry(&self) -> bool {
        self.entry > 0
    }

    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

impl From<ReservationHeader> for [u8; RESERVATION_HEADER_LEN] {
    fn from(value: ReservationHeader) -> Self {
        let mut bytes = [0u8; RESERVATION_HEADER_LEN];
        bytes[0..4].copy_from_slice(&value.latitude.to_be_bytes());
        bytes[4..8].copy_from_slice(&value.longitude.to_be_bytes());
        bytes[8..10].copy_from_slice(&value.offset.to_be_bytes());
        bytes[10] = value.timeout;
        bytes[11] = value.entry;
        bytes
    }
}

impl TryFrom<&[u8]> for ReservationHeader {
    type Error = FrameDecodeError;

    /// Validates only the length; every bit pattern is a valid header.
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != RESERVATION_HEADER_LEN {
            return Err(FrameDecodeError::HeaderLength(
                value.len(),
                RESERVATION_HEADER_LEN,
            ));
        }
        Ok(Self {
            latitude: u32::from_be_bytes(value[0..4].try_into().unwrap()),
            longitude: u32::from_be_bytes(value[4..8].try_into().unwrap()),
            offset: u16::from_be_bytes(value[8..10].try_into().unwrap()),
            timeout: value[10],
            entry: value[11],
        })
    }
}

/// A full broadcast frame: outer header, reservation announcement, payload
/// and trailing frame check sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub mac: MacHeader,
    pub reservation: ReservationHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Octets a frame adds around its payload.
    pub const OVERHEAD: usize = FRAME_OVERHEAD;

    pub fn broadcast(
        src: MacAddress,
        reservation: ReservationHeader,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            mac: MacHeader {
                kind: FrameKind::Data,
                dest: MacAddress::BROADCAST,
                src,
            },
            reservation,
            payload,
        }
    }

    pub fn encoded_len(&self) -> usize {
        Self::OVERHEAD + self.payload.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.push(self.mac.kind as u8);
        bytes.extend_from_slice(&self.mac.dest.0);
        bytes.extend_from_slice(&self.mac.src.0);
        let header: [u8; RESERVATION_HEADER_LEN] = self.reservation.into();
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&self.payload);
        let fcs = FCS_ALGORITHM.checksum(&bytes);
        bytes.extend_from_slice(&fcs.to_be_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameDecodeError> {
        if bytes.len() < Self::OVERHEAD {
            return Err(FrameDecodeError::FrameIsTooShort(
                bytes.len(),
                Self::OVERHEAD,
            ));
        }
        let body = &bytes[..bytes.len() - FCS_LEN];
        let fcs = u32::from_be_bytes(bytes[bytes.len() - FCS_LEN..].try_into().unwrap());
        let expected = FCS_ALGORITHM.checksum(body);
        if fcs != expected {
            return Err(FrameDecodeError::FcsMismatch(fcs, expected));
        }
        let kind = FrameKind::try_from(body[0])?;
        let dest = MacAddress(body[KIND_LEN..KIND_LEN + ADDRESS_LEN].try_into().unwrap());
        let src = MacAddress(
            body[KIND_LEN + ADDRESS_LEN..MAC_HEADER_LEN]
                .try_into()
                .unwrap(),
        );
        let reservation =
            ReservationHeader::try_from(&body[MAC_HEADER_LEN..MAC_HEADER_LEN + RESERVATION_HEADER_LEN])?;
        let payload = body[MAC_HEADER_LEN + RESERVATION_HEADER_LEN..].to_vec();
        Ok(Self {
            mac: MacHeader { kind, dest, src },
            reservation,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_header_round_trip() {
        let header = ReservationHeader {
            latitude: 12345,
            longitude: 67890,
            offset: 7,
            timeout: 5,
            entry: 1,
        };
        let bytes: [u8; RESERVATION_HEADER_LEN] = header.into();
        assert_eq!(bytes.len(), 12);
        let decoded = ReservationHeader::try_from(&bytes[..]).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.network_entry());
    }

    #[test]
    fn any_twelve_octets_survive_decode_encode() {
        let bytes: [u8; RESERVATION_HEADER_LEN] =
            [0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04, 0xff, 0xfe, 0x09, 0x07];
        let header = ReservationHeader::try_from(&bytes[..]).unwrap();
        let encoded: [u8; RESERVATION_HEADER_LEN] = header.into();
        assert_eq!(encoded, bytes);
    }

    #[test]
    fn header_rejects_wrong_length() {
        assert!(matches!(
            ReservationHeader::try_from(&[0u8; 11][..]),
            Err(FrameDecodeError::HeaderLength(11, 12))
        ));
    }

    #[test]
    fn packet_round_trip() {
        let packet = Packet::broadcast(
            MacAddress([1, 2, 3, 4, 5, 6]),
            ReservationHeader::new(Position::new(10, 20), 42, 3, false),
            vec![0xaa; 32],
        );
        let bytes = packet.encode();
        assert_eq!(bytes.len(), Packet::OVERHEAD + 32);
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn corrupted_frame_fails_the_check_sequence() {
        let packet = Packet::broadcast(
            MacAddress([1, 2, 3, 4, 5, 6]),
            ReservationHeader::default(),
            vec![0x55; 8],
        );
        let mut bytes = packet.encode();
        bytes[20] ^= 0x01;
        assert!(matches!(
            Packet::decode(&bytes),
            Err(FrameDecodeError::FcsMismatch(_, _))
        ));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        assert!(matches!(
            Packet::decode(&[0u8; 10]),
            Err(FrameDecodeError::FrameIsTooShort(10, _))
        ));
    }
}

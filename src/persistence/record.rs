//! Fixed-size wire format of the persisted supervisor state.
//!
//! Layout (little-endian, 30 bytes):
//!
//! | offset | size | field                              |
//! |--------|------|------------------------------------|
//! | 0      | 1    | mode code                          |
//! | 1      | 4    | mode entry time (ms)               |
//! | 5      | 12   | angular velocity x, y, z (rad/s)   |
//! | 17     | 4    | power level (W)                    |
//! | 21     | 4    | write timestamp (s)                |
//! | 25     | 1    | consecutive software reset count   |
//! | 26     | 4    | CRC-32 over bytes 0..26            |

use crate::state::{AdcsMode, Millis};
use crc::{Crc, CRC_32_ISO_HDLC};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

pub const RECORD_SIZE: usize = 30;
pub const CHECKSUMMED_LEN: usize = 26;

const_assert_eq!(CHECKSUMMED_LEN + 4, RECORD_SIZE);

pub type RecordBytes = [u8; RECORD_SIZE];

/// CRC-32/ISO-HDLC (polynomial 0x04C11DB7), as used by Ethernet and ZIP.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn calculate_crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistentRecord {
    pub mode: AdcsMode,
    pub mode_entry_time: Millis,
    pub angular_velocity: [f32; 3],
    pub power_level: f32,
    pub timestamp: f32,
    pub consecutive_software_reset_count: u8,
    pub checksum: u32,
}

impl PersistentRecord {
    /// Unsealed record; the store computes the checksum on write.
    pub fn new(
        mode: AdcsMode,
        mode_entry_time: Millis,
        angular_velocity: [f32; 3],
        power_level: f32,
        timestamp: f32,
        consecutive_software_reset_count: u8,
    ) -> Self {
        Self {
            mode,
            mode_entry_time,
            angular_velocity,
            power_level,
            timestamp,
            consecutive_software_reset_count,
            checksum: 0,
        }
    }

    pub fn payload_bytes(&self) -> [u8; CHECKSUMMED_LEN] {
        let mut buf = [0u8; CHECKSUMMED_LEN];
        buf[0] = self.mode.code();
        buf[1..5].copy_from_slice(&self.mode_entry_time.to_le_bytes());
        for (axis, value) in self.angular_velocity.iter().enumerate() {
            let offset = 5 + axis * 4;
            buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        buf[17..21].copy_from_slice(&self.power_level.to_le_bytes());
        buf[21..25].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[25] = self.consecutive_software_reset_count;
        buf
    }

    pub fn compute_checksum(&self) -> u32 {
        calculate_crc32(&self.payload_bytes())
    }

    pub fn is_valid(&self) -> bool {
        self.compute_checksum() == self.checksum
    }

    /// Copy with the checksum recomputed over every other field.
    pub fn sealed(&self) -> Self {
        Self {
            checksum: self.compute_checksum(),
            ..*self
        }
    }

    /// Encode with the checksum as currently stored, valid or not.
    pub fn encode(&self) -> RecordBytes {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[..CHECKSUMMED_LEN].copy_from_slice(&self.payload_bytes());
        bytes[CHECKSUMMED_LEN..].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Decode field values without judging integrity. Fails only when the
    /// mode byte is not a known mode code.
    pub fn decode(bytes: &RecordBytes) -> Result<Self, u8> {
        let mode = AdcsMode::from_code(bytes[0]).ok_or(bytes[0])?;
        let mut angular_velocity = [0.0_f32; 3];
        for (axis, value) in angular_velocity.iter_mut().enumerate() {
            let offset = 5 + axis * 4;
            *value = f32::from_le_bytes(read4(bytes, offset));
        }
        Ok(Self {
            mode,
            mode_entry_time: u32::from_le_bytes(read4(bytes, 1)),
            angular_velocity,
            power_level: f32::from_le_bytes(read4(bytes, 17)),
            timestamp: f32::from_le_bytes(read4(bytes, 21)),
            consecutive_software_reset_count: bytes[25],
            checksum: stored_checksum(bytes),
        })
    }
}

pub fn stored_checksum(bytes: &RecordBytes) -> u32 {
    u32::from_le_bytes(read4(bytes, CHECKSUMMED_LEN))
}

pub fn payload_checksum(bytes: &RecordBytes) -> u32 {
    calculate_crc32(&bytes[..CHECKSUMMED_LEN])
}

fn read4(bytes: &RecordBytes, offset: usize) -> [u8; 4] {
    [bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]
}

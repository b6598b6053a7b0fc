//! Crash-safe persistence of the supervisor state.
//!
//! The store owns the record wire format. It seals every write with a CRC-32
//! and reports what it finds on read without substituting defaults: whether
//! to trust a record is the caller's decision.
//!
//! A power loss in the middle of a write can leave a torn block behind. That
//! is caught by the checksum on the next boot, which then starts in safe mode.

pub mod nvm;
pub mod record;

pub use nvm::{FileNvm, InMemoryNvm, NvmDevice, NvmError};
pub use record::{calculate_crc32, PersistentRecord, RecordBytes, RECORD_SIZE};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("non-volatile storage error: {0}")]
    Device(#[from] NvmError),
    #[error("read-back after write does not match the written block")]
    VerifyFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Corruption {
    ChecksumMismatch,
    UnknownMode(u8),
}

/// A block that failed integrity checks, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptRecord {
    pub reason: Corruption,
    pub stored_checksum: u32,
    pub computed_checksum: u32,
    /// Best-effort field decode; never used for mode decisions.
    pub decoded: Option<PersistentRecord>,
    #[serde(with = "serde_bytes")]
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredRecord {
    Absent,
    Valid(PersistentRecord),
    Invalid(CorruptRecord),
}

impl StoredRecord {
    pub fn valid(&self) -> Option<&PersistentRecord> {
        match self {
            StoredRecord::Valid(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, StoredRecord::Valid(_))
    }
}

/// Classify a raw block.
pub fn inspect_block(bytes: &RecordBytes) -> StoredRecord {
    if bytes.iter().all(|b| *b == 0xFF) {
        return StoredRecord::Absent;
    }

    let stored = record::stored_checksum(bytes);
    let computed = record::payload_checksum(bytes);
    let decoded = PersistentRecord::decode(bytes);

    let reason = if stored != computed {
        Corruption::ChecksumMismatch
    } else {
        match decoded {
            Ok(record) => return StoredRecord::Valid(record),
            Err(code) => Corruption::UnknownMode(code),
        }
    };

    StoredRecord::Invalid(CorruptRecord {
        reason,
        stored_checksum: stored,
        computed_checksum: computed,
        decoded: decoded.ok(),
        raw: bytes.to_vec(),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_reads: u32,
    pub total_writes: u32,
    pub corrupt_reads: u32,
    pub failed_writes: u32,
}

#[derive(Debug)]
pub struct PersistentStateStore<D: NvmDevice> {
    device: D,
    stats: StorageStats,
}

impl<D: NvmDevice> PersistentStateStore<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            stats: StorageStats::default(),
        }
    }

    pub fn read(&mut self) -> Result<StoredRecord, StoreError> {
        self.stats.total_reads = self.stats.total_reads.saturating_add(1);
        let outcome = match self.device.read_block()? {
            Some(bytes) => inspect_block(&bytes),
            None => StoredRecord::Absent,
        };
        if let StoredRecord::Invalid(corrupt) = &outcome {
            self.stats.corrupt_reads = self.stats.corrupt_reads.saturating_add(1);
            warn!(
                reason = ?corrupt.reason,
                stored = corrupt.stored_checksum,
                computed = corrupt.computed_checksum,
                "persisted state failed integrity check"
            );
        }
        Ok(outcome)
    }

    /// Seal `record` with a fresh checksum and write the whole block.
    ///
    /// Returns the record as stored.
    pub fn write(&mut self, record: &PersistentRecord) -> Result<PersistentRecord, StoreError> {
        let sealed = record.sealed();
        let block = sealed.encode();

        if let Err(e) = self.device.write_block(&block) {
            self.stats.failed_writes = self.stats.failed_writes.saturating_add(1);
            return Err(e.into());
        }

        let read_back = match self.device.read_block() {
            Ok(read_back) => read_back,
            Err(e) => {
                self.stats.failed_writes = self.stats.failed_writes.saturating_add(1);
                return Err(e.into());
            }
        };
        if read_back != Some(block) {
            self.stats.failed_writes = self.stats.failed_writes.saturating_add(1);
            return Err(StoreError::VerifyFailed);
        }

        self.stats.total_writes = self.stats.total_writes.saturating_add(1);
        debug!(mode = %sealed.mode, checksum = sealed.checksum, "persisted state");
        Ok(sealed)
    }

    pub fn stats(&self) -> &StorageStats {
        &self.stats
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AdcsMode;

    fn draft() -> PersistentRecord {
        PersistentRecord::new(AdcsMode::SunAcquisition, 4_000, [0.02, 0.0, -0.01], 6.0, 4.0, 1)
    }

    #[test]
    fn test_write_then_read_returns_same_valid_record() {
        let mut store = PersistentStateStore::new(InMemoryNvm::new());
        let written = store.write(&draft()).unwrap();
        match store.read().unwrap() {
            StoredRecord::Valid(record) => {
                assert_eq!(record, written);
                assert_eq!(record.encode(), written.encode());
            }
            other => panic!("expected valid record, got {:?}", other),
        }
        assert_eq!(store.stats().total_writes, 1);
    }

    #[test]
    fn test_write_ignores_caller_checksum() {
        let mut store = PersistentStateStore::new(InMemoryNvm::new());
        let mut bogus = draft();
        bogus.checksum = 0xDEAD_BEEF;
        let written = store.write(&bogus).unwrap();
        assert!(written.is_valid());
        assert!(store.read().unwrap().is_valid());
    }

    #[test]
    fn test_empty_and_erased_devices_read_absent() {
        let mut empty = PersistentStateStore::new(InMemoryNvm::new());
        assert_eq!(empty.read().unwrap(), StoredRecord::Absent);

        let mut erased = PersistentStateStore::new(InMemoryNvm::erased());
        assert_eq!(erased.read().unwrap(), StoredRecord::Absent);
    }

    #[test]
    fn test_rejected_write_is_reported() {
        let nvm = InMemoryNvm::new();
        nvm.set_reject_writes(true);
        let mut store = PersistentStateStore::new(nvm);
        assert!(matches!(
            store.write(&draft()),
            Err(StoreError::Device(NvmError::WriteRejected))
        ));
        assert_eq!(store.stats().failed_writes, 1);
    }

    #[test]
    fn test_valid_checksum_with_unknown_mode_is_invalid() {
        let mut bytes = draft().sealed().encode();
        bytes[0] = 7;
        let crc = calculate_crc32(&bytes[..record::CHECKSUMMED_LEN]);
        bytes[record::CHECKSUMMED_LEN..].copy_from_slice(&crc.to_le_bytes());
        match inspect_block(&bytes) {
            StoredRecord::Invalid(corrupt) => {
                assert_eq!(corrupt.reason, Corruption::UnknownMode(7));
                assert!(corrupt.decoded.is_none());
            }
            other => panic!("expected invalid record, got {:?}", other),
        }
    }
}

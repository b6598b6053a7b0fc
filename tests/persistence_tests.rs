mod common;

use adcs::persistence::{
    inspect_block, Corruption, FileNvm, InMemoryNvm, NvmDevice, NvmError, PersistentRecord,
    PersistentStateStore, StoreError, StoredRecord, RECORD_SIZE,
};
use adcs::state::AdcsMode;
use common::{calm_model, Harness};

const CHECKSUMMED_BITS: usize = 26 * 8;

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("adcs-{}-{}.bin", name, std::process::id()))
}

#[test]
fn test_round_trip_preserves_every_field_for_all_modes() {
    for mode in AdcsMode::ALL {
        let mut store = PersistentStateStore::new(InMemoryNvm::new());
        let record = PersistentRecord::new(mode, 123_456, [0.01, -0.02, 0.03], 5.25, 123.456, 2);

        let written = store.write(&record).expect("write succeeds");
        let read = store.read().expect("read succeeds");

        assert_eq!(read, StoredRecord::Valid(written));
        let valid = read.valid().expect("valid record");
        assert_eq!(valid.mode, mode);
        assert_eq!(valid.mode_entry_time, 123_456);
        assert_eq!(valid.angular_velocity, [0.01, -0.02, 0.03]);
        assert_eq!(valid.power_level, 5.25);
        assert_eq!(valid.timestamp, 123.456);
        assert_eq!(valid.consecutive_software_reset_count, 2);
        assert!(valid.is_valid());
    }
}

#[test]
fn test_any_single_bit_flip_in_payload_is_detected() {
    let record = PersistentRecord::new(AdcsMode::NominalPointing, 42, [0.0, 0.05, -0.05], 5.0, 0.042, 1);
    let pristine = record.sealed().encode();

    for bit in 0..CHECKSUMMED_BITS {
        let mut block = pristine;
        block[bit / 8] ^= 1 << (bit % 8);
        match inspect_block(&block) {
            StoredRecord::Invalid(corrupt) => {
                assert_eq!(corrupt.reason, Corruption::ChecksumMismatch, "bit {}", bit);
                assert_ne!(corrupt.stored_checksum, corrupt.computed_checksum);
            }
            other => panic!("bit {} not detected: {:?}", bit, other),
        }
    }
}

#[test]
fn test_bit_flip_in_checksum_field_is_detected() {
    let pristine = PersistentRecord::new(AdcsMode::SunAcquisition, 7, [0.0; 3], 6.0, 0.007, 0)
        .sealed()
        .encode();

    for bit in CHECKSUMMED_BITS..RECORD_SIZE * 8 {
        let nvm = InMemoryNvm::with_block(pristine);
        nvm.flip_bit(bit);
        let mut store = PersistentStateStore::new(nvm);
        let read = store.read().expect("device readable");
        assert!(!read.is_valid(), "bit {}", bit);
        assert_eq!(store.stats().corrupt_reads, 1);
    }
}

#[test]
fn test_corrupt_record_keeps_raw_bytes_for_diagnostics() {
    let nvm = InMemoryNvm::with_block(
        PersistentRecord::new(AdcsMode::NominalPointing, 0, [0.0; 3], 5.0, 0.0, 0)
            .sealed()
            .encode(),
    );
    nvm.flip_bit(17 * 8);
    let mut store = PersistentStateStore::new(nvm.clone());

    let StoredRecord::Invalid(corrupt) = store.read().expect("device readable") else {
        panic!("expected an invalid record");
    };
    assert_eq!(corrupt.raw.as_slice(), &nvm.contents().expect("stored")[..]);
    let decoded = corrupt.decoded.expect("mode byte intact");
    assert_eq!(decoded.mode, AdcsMode::NominalPointing);
    assert_ne!(decoded.power_level, 5.0);
}

#[test]
fn test_file_device_round_trip() {
    let path = temp_path("round-trip");
    let _ = std::fs::remove_file(&path);
    let mut store = PersistentStateStore::new(FileNvm::new(&path));

    assert_eq!(store.read().expect("missing file reads absent"), StoredRecord::Absent);

    let written = store
        .write(&PersistentRecord::new(AdcsMode::SafeMode, 900, [0.2, 0.0, 0.0], 3.1, 0.9, 3))
        .expect("write succeeds");
    assert_eq!(std::fs::metadata(&path).expect("file exists").len(), RECORD_SIZE as u64);

    let mut reopened = PersistentStateStore::new(FileNvm::new(&path));
    assert_eq!(reopened.read().expect("readable"), StoredRecord::Valid(written));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_truncated_file_is_a_device_error() {
    let path = temp_path("truncated");
    std::fs::write(&path, [0u8; 12]).expect("temp file writable");

    let mut device = FileNvm::new(&path);
    assert!(matches!(device.read_block(), Err(NvmError::Length(12))));

    let mut store = PersistentStateStore::new(FileNvm::new(&path));
    assert!(matches!(store.read(), Err(StoreError::Device(NvmError::Length(12)))));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_failed_persist_is_reported_and_cycle_completes() {
    let mut harness = Harness::new(calm_model());
    harness.nvm.set_reject_writes(true);

    let report = harness.cycle();

    assert_eq!(report.mode, AdcsMode::SunAcquisition);
    assert!(report.persist_failed);
    assert!(!report.persisted);
    assert!(report.watchdog_refreshed);
    assert!(harness.machine.last_error().is_some());
    assert_eq!(harness.machine.store().stats().failed_writes, 1);
}

#[test]
fn test_every_transition_is_persisted() {
    let mut harness = Harness::new(calm_model());
    harness.to_nominal();

    let stored = harness.stored();
    assert_eq!(stored.mode, AdcsMode::NominalPointing);
    assert_eq!(stored.mode_entry_time, harness.machine.state().mode_entry_time);
    assert!(stored.is_valid());
    assert_eq!(harness.nvm.write_count(), 2);
}

#[test]
fn test_failed_read_back_counts_as_failed_write() {
    let nvm = InMemoryNvm::new();
    let mut store = PersistentStateStore::new(nvm.clone());
    nvm.set_fail_reads(true);

    let result = store.write(&PersistentRecord::new(AdcsMode::Detumbling, 0, [0.0; 3], 5.0, 0.0, 0));

    assert!(matches!(result, Err(StoreError::Device(NvmError::ReadFailed))));
    assert_eq!(store.stats().failed_writes, 1);
    assert_eq!(store.stats().total_writes, 0);
}

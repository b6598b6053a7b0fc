//! Block-level non-volatile storage devices.

use super::record::{RecordBytes, RECORD_SIZE};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NvmError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored block is {0} bytes, expected 30")]
    Length(usize),
    #[error("storage device rejected the write")]
    WriteRejected,
    #[error("storage device failed to read")]
    ReadFailed,
}

/// Single-slot block storage for one state record.
pub trait NvmDevice {
    /// `None` when nothing has ever been written.
    fn read_block(&mut self) -> Result<Option<RecordBytes>, NvmError>;
    fn write_block(&mut self, block: &RecordBytes) -> Result<(), NvmError>;
}

#[derive(Debug, Default)]
struct MemoryCell {
    block: Option<RecordBytes>,
    writes: u32,
    reject_writes: bool,
    fail_reads: bool,
}

/// RAM-backed device. Clones share the same cell, so a test can keep a
/// handle while the supervisor owns the store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNvm {
    cell: Rc<RefCell<MemoryCell>>,
}

impl InMemoryNvm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(block: RecordBytes) -> Self {
        let nvm = Self::new();
        nvm.cell.borrow_mut().block = Some(block);
        nvm
    }

    /// Erased flash reads back as all ones.
    pub fn erased() -> Self {
        Self::with_block([0xFF; RECORD_SIZE])
    }

    pub fn contents(&self) -> Option<RecordBytes> {
        self.cell.borrow().block
    }

    pub fn write_count(&self) -> u32 {
        self.cell.borrow().writes
    }

    /// Flip one bit of the stored block, as a radiation upset would.
    pub fn flip_bit(&self, bit: usize) {
        if let Some(block) = self.cell.borrow_mut().block.as_mut() {
            block[(bit / 8) % RECORD_SIZE] ^= 1 << (bit % 8);
        }
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.cell.borrow_mut().reject_writes = reject;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.cell.borrow_mut().fail_reads = fail;
    }
}

impl NvmDevice for InMemoryNvm {
    fn read_block(&mut self) -> Result<Option<RecordBytes>, NvmError> {
        let cell = self.cell.borrow();
        if cell.fail_reads {
            return Err(NvmError::ReadFailed);
        }
        Ok(cell.block)
    }

    fn write_block(&mut self, block: &RecordBytes) -> Result<(), NvmError> {
        let mut cell = self.cell.borrow_mut();
        if cell.reject_writes {
            return Err(NvmError::WriteRejected);
        }
        cell.block = Some(*block);
        cell.writes = cell.writes.saturating_add(1);
        Ok(())
    }
}

/// File-backed device used by the operator CLI and the simulator.
#[derive(Debug, Clone)]
pub struct FileNvm {
    path: PathBuf,
}

impl FileNvm {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NvmDevice for FileNvm {
    fn read_block(&mut self) -> Result<Option<RecordBytes>, NvmError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let block: RecordBytes = bytes
            .as_slice()
            .try_into()
            .map_err(|_| NvmError::Length(bytes.len()))?;
        Ok(Some(block))
    }

    fn write_block(&mut self, block: &RecordBytes) -> Result<(), NvmError> {
        std::fs::write(&self.path, block)?;
        Ok(())
    }
}

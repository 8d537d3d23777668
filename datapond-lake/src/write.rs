// CLASSIFICATION: COMMUNITY
// Filename: write.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Append/flush bookkeeping for a single file.
//!
//! Appended bytes queue up as pending ranges that continue exactly where
//! the previous range ended. A flush hands a prefix of that queue to
//! storage and moves the commit pointer forward; it never moves back
//! except when the file is overwritten by a re-create.

use std::collections::VecDeque;
use std::io;

use crate::error::{LakeError, LakeResult, WriteOp};

/// Observable phase of a file's write protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    /// Nothing committed, nothing pending.
    Empty,
    /// Appended bytes are waiting for a flush.
    Appending,
    /// Some bytes committed and nothing pending.
    Committed,
}

#[derive(Debug)]
struct PendingRange {
    start: u64,
    bytes: Vec<u8>,
}

impl PendingRange {
    fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }
}

/// Committed length plus the queue of not yet flushed appends.
#[derive(Debug, Default)]
pub struct FileState {
    committed: u64,
    pending: VecDeque<PendingRange>,
    detached: bool,
}

impl FileState {
    pub fn new(committed: u64) -> Self {
        Self {
            committed,
            ..Self::default()
        }
    }

    /// Bytes readers can see.
    pub fn committed_len(&self) -> u64 {
        self.committed
    }

    /// Offset the next append must use.
    pub fn end(&self) -> u64 {
        self.pending.back().map(PendingRange::end).unwrap_or(self.committed)
    }

    pub fn pending_len(&self) -> u64 {
        self.end() - self.committed
    }

    pub fn phase(&self) -> WritePhase {
        match (self.pending.is_empty(), self.committed) {
            (false, _) => WritePhase::Appending,
            (true, 0) => WritePhase::Empty,
            (true, _) => WritePhase::Committed,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub(crate) fn detach(&mut self) {
        self.detached = true;
        self.pending.clear();
    }

    /// Drop everything; used when the file is re-created in place.
    pub(crate) fn reset(&mut self) {
        self.committed = 0;
        self.pending.clear();
    }

    fn invalid(&self, op: WriteOp, offset: u64) -> LakeError {
        LakeError::InvalidOffset {
            op,
            offset,
            committed: self.committed,
            end: self.end(),
        }
    }

    /// Queue `bytes` at `offset`, which must equal [`FileState::end`].
    pub fn append(&mut self, offset: u64, bytes: &[u8]) -> LakeResult<()> {
        if offset != self.end() {
            return Err(self.invalid(WriteOp::Append, offset));
        }
        if !bytes.is_empty() {
            self.pending.push_back(PendingRange {
                start: offset,
                bytes: bytes.to_vec(),
            });
        }
        Ok(())
    }

    /// Commit pending ranges up to `offset`, which must be the committed
    /// length or the end of one of the pending ranges.
    ///
    /// `persist` receives each range with its absolute start offset. If it
    /// fails, the state is left exactly as it was.
    pub fn flush<F>(&mut self, offset: u64, mut persist: F) -> LakeResult<u64>
    where
        F: FnMut(u64, &[u8]) -> io::Result<()>,
    {
        if offset == self.committed {
            return Ok(self.committed);
        }
        let count = self
            .pending
            .iter()
            .position(|range| range.end() == offset)
            .map(|idx| idx + 1)
            .ok_or_else(|| self.invalid(WriteOp::Flush, offset))?;

        for range in self.pending.iter().take(count) {
            persist(range.start, &range.bytes)?;
        }
        self.pending.drain(..count);
        self.committed = offset;
        Ok(self.committed)
    }

    /// Read `len` committed bytes from `start` through `fetch`.
    pub fn read<F>(&self, start: u64, len: u64, fetch: F) -> LakeResult<Vec<u8>>
    where
        F: FnOnce(u64, u64) -> io::Result<Vec<u8>>,
    {
        let within = start
            .checked_add(len)
            .map(|stop| stop <= self.committed)
            .unwrap_or(false);
        if !within {
            return Err(LakeError::RangeNotSatisfiable {
                start,
                len,
                committed: self.committed,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        Ok(fetch(start, len)?)
    }
}

//! Process-wide chat context: which session is current, and its memory.
//!
//! Handlers share one [`ChatContext`] behind a mutex. All transitions go
//! through the methods here.

use std::path::{Path, PathBuf};

use crate::chat::memory::ChatMemory;

use super::SessionRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session file yet; one is created when the first exchange completes.
    Idle,
    /// Exchanges are appended to this session file.
    Active(PathBuf),
}

#[derive(Debug)]
pub struct ChatContext {
    phase: SessionPhase,
    memory: ChatMemory,
    /// Bumped by every `reset` and `activate`.
    epoch: u64,
}

impl ChatContext {
    pub fn new(token_limit: usize) -> Self {
        Self {
            phase: SessionPhase::Idle,
            memory: ChatMemory::new(token_limit),
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn current_session(&self) -> Option<&Path> {
        match &self.phase {
            SessionPhase::Idle => None,
            SessionPhase::Active(path) => Some(path),
        }
    }

    pub fn memory(&self) -> &ChatMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut ChatMemory {
        &mut self.memory
    }

    /// Back to `Idle` with an empty memory.
    pub fn reset(&mut self) {
        self.phase = SessionPhase::Idle;
        self.memory = ChatMemory::new(self.memory.token_limit());
        self.epoch += 1;
    }

    /// Switch to a saved session, rebuilding memory from its records.
    pub fn activate(&mut self, path: PathBuf, records: &[SessionRecord]) {
        self.memory = ChatMemory::from_records(records, self.memory.token_limit());
        self.phase = SessionPhase::Active(path);
        self.epoch += 1;
    }

    /// Bind a freshly created session to the `Idle` context its turn started
    /// in, keeping memory.
    ///
    /// Returns `false` (and changes nothing) if the context was reset or
    /// switched since `epoch`.
    pub fn attach(&mut self, path: PathBuf, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        match self.phase {
            SessionPhase::Idle => {
                self.phase = SessionPhase::Active(path);
                true
            }
            SessionPhase::Active(_) => false,
        }
    }
}

//! Single-slot run registry.
//!
//! At most one [`RunHandle`] is active process-wide. The launcher acquires
//! the slot before spawning and the lifecycle monitor releases it once the
//! run has been fully torn down.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use uuid::Uuid;

use super::{RunHandle, RunState};

/// Returned by [`RunSlot::acquire`] when a run is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run {active} is already active")]
pub struct SlotOccupied {
    pub active: Uuid,
}

#[derive(Debug, Default)]
pub struct RunSlot {
    active: Mutex<Option<Arc<RunHandle>>>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `run` as the active run.
    pub fn acquire(&self, run: Arc<RunHandle>) -> Result<(), SlotOccupied> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = active.as_ref() {
            return Err(SlotOccupied {
                active: existing.id(),
            });
        }
        *active = Some(run);
        Ok(())
    }

    /// Free the slot, but only for the run that holds it.
    pub fn release(&self, id: Uuid) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.as_ref() {
            Some(existing) if existing.id() == id => {
                *active = None;
                true
            }
            _ => false,
        }
    }

    pub fn active(&self) -> Option<Arc<RunHandle>> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_idle(&self) -> bool {
        self.active().is_none()
    }

    /// State of the active run, or `Idle` when the slot is empty.
    pub fn state(&self) -> RunState {
        self.active()
            .map(|run| run.state())
            .unwrap_or(RunState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobDescriptor, SearchOrder};

    fn new_run(archive: &std::path::Path) -> Arc<RunHandle> {
        let job = JobDescriptor::lengths("ab", 1, 2, archive, SearchOrder::Ascending).unwrap();
        Arc::new(RunHandle::new(job))
    }

    #[test]
    fn second_acquire_fails_until_release() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("a.zip");
        std::fs::write(&archive, b"pk").unwrap();

        let slot = RunSlot::new();
        assert_eq!(slot.state(), RunState::Idle);

        let first = new_run(&archive);
        let second = new_run(&archive);
        slot.acquire(Arc::clone(&first)).unwrap();
        assert_eq!(slot.state(), RunState::Launching);

        let err = slot.acquire(Arc::clone(&second)).unwrap_err();
        assert_eq!(err.active, first.id());

        // Only the holder can release.
        assert!(!slot.release(second.id()));
        assert!(!slot.is_idle());
        assert!(slot.release(first.id()));
        assert!(slot.is_idle());

        slot.acquire(second).unwrap();
    }
}

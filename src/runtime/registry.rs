//! The cancel registry for detached spawns.
//!
//! Maps a spawned task's id to the trigger that fires its private
//! cancellation scope. Entries leave the registry when triggered or when
//! the task settles naturally, so cancelling an already-completed or
//! unknown task is a miss, and a miss is a no-op by design.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::speculate::CancelTrigger;
use crate::types::TaskId;

#[derive(Default)]
pub(crate) struct CancelRegistry {
    entries: RefCell<HashMap<TaskId, CancelTrigger>>,
}

impl CancelRegistry {
    pub(crate) fn insert(&self, id: TaskId, trigger: CancelTrigger) {
        self.entries.borrow_mut().insert(id, trigger);
    }

    pub(crate) fn remove(&self, id: TaskId) -> Option<CancelTrigger> {
        self.entries.borrow_mut().remove(&id)
    }

    /// Fires and removes the entry for `id`. Returns false on a miss.
    pub(crate) fn fire(&self, id: TaskId) -> bool {
        match self.remove(id) {
            Some(trigger) => {
                trigger.fire();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

//! Per-key mutual exclusion for active tasks.
//!
//! One task may be active per `(project_id, task kind)` at a time. The
//! registry is the in-process guard enforcing that: claims are atomic under
//! a mutex, and release is conditional on the claiming task id so a stale
//! release (from a superseded task) cannot free a newer claim.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{IndexError, Result};
use crate::pipeline::TaskKind;

#[derive(Debug, Default)]
pub struct TaskRegistry {
    active: Mutex<HashMap<(String, TaskKind), String>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the `(project, kind)` slot for `task_id`.
    ///
    /// Fails with [`IndexError::TaskAlreadyActive`] if another task holds it.
    pub fn try_claim(&self, project_id: &str, kind: TaskKind, task_id: &str) -> Result<()> {
        let mut active = self.active.lock().expect("task registry mutex poisoned");
        let key = (project_id.to_string(), kind);
        if let Some(existing) = active.get(&key) {
            return Err(IndexError::TaskAlreadyActive {
                project_id: project_id.to_string(),
                kind: kind.as_str().to_string(),
                existing: existing.clone(),
            });
        }
        active.insert(key, task_id.to_string());
        Ok(())
    }

    /// The task currently holding the `(project, kind)` slot, if any.
    pub fn active_task(&self, project_id: &str, kind: TaskKind) -> Option<String> {
        let active = self.active.lock().expect("task registry mutex poisoned");
        active.get(&(project_id.to_string(), kind)).cloned()
    }

    /// Release the slot, but only if `task_id` still holds it.
    pub fn release(&self, project_id: &str, kind: TaskKind, task_id: &str) {
        let mut active = self.active.lock().expect("task registry mutex poisoned");
        let key = (project_id.to_string(), kind);
        if active.get(&key).is_some_and(|held| held == task_id) {
            active.remove(&key);
        }
    }
}

//! Task identity (`TaskContext`) and the label-indexed task registry
//! (`TaskManager`).
//!
//! Grounded on `trace-task-context.c` (alloc/init/delete split, parent
//! linkage recorded at construction) and the task-manager usage in
//! `otter-task-graph.c` (`trace_task_manager_add_task`/`get_task`/
//! `pop_task`, always called under a single mutex).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ids::{TaskId, UniqueIdAllocators};

/// Labels are opaque UTF-8 strings; the original bounds them to a 256-byte
/// formatting buffer at the varargs-helper layer, a detail of the
/// instrumentation surface's formatting helpers rather than of the registry,
/// which just takes an owned `String`.
pub const MAX_LABEL_BYTES: usize = 256;

/// Identity-only record for a task as seen by the instrumentation surface.
/// The `RegionDef::Task` payload (region.rs) carries what the engine needs
/// to trace a task's region lifetime; `TaskContext` only tracks parentage.
#[derive(Debug)]
pub struct TaskContext {
    pub task_context_id: TaskId,
    pub parent_task_context_id: TaskId,
}

impl TaskContext {
    /// Assigns an id from the shared task-id namespace and records the
    /// parent's id, or `TaskId::UNDEFINED` if there is none.
    pub fn new(ids: &UniqueIdAllocators, parent: Option<&TaskContext>) -> Self {
        let task_context_id = ids.next_task_id();
        let parent_task_context_id = parent
            .map(|p| p.task_context_id)
            .unwrap_or(TaskId::UNDEFINED);
        TaskContext {
            task_context_id,
            parent_task_context_id,
        }
    }

    /// Legacy compatibility getter: a null task pointer yields sentinel id 0
    /// rather than panicking. Used only at the instrumentation-surface call
    /// sites that mirror the original's `task==NULL ? 0 : ...` handling --
    /// the engine's own internals must never call this and should instead
    /// require a real task.
    pub fn id_or_zero(task: Option<&TaskContext>) -> u64 {
        task.map(|t| t.task_context_id.raw()).unwrap_or(0)
    }
}

/// Mapping from label to a stack of `TaskContext`s, serialized by one mutex.
#[derive(Default)]
pub struct TaskManager {
    labels: Mutex<HashMap<String, Vec<Arc<TaskContext>>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `task` onto the stack for `label`.
    pub fn add(&self, label: &str, task: Arc<TaskContext>) {
        debug_assert!(
            label.len() <= MAX_LABEL_BYTES,
            "label exceeds the {}-byte buffer the instrumentation surface formats into",
            MAX_LABEL_BYTES
        );
        let mut labels = self.labels.lock().unwrap_or_else(|p| p.into_inner());
        labels.entry(label.to_owned()).or_default().push(task);
    }

    /// Returns the top-of-stack for `label` without removing it, or `None`.
    pub fn get(&self, label: &str) -> Option<Arc<TaskContext>> {
        let labels = self.labels.lock().unwrap_or_else(|p| p.into_inner());
        labels.get(label).and_then(|stack| stack.last().cloned())
    }

    /// Pops and returns the top-of-stack for `label`, or `None` if absent.
    pub fn pop(&self, label: &str) -> Option<Arc<TaskContext>> {
        let mut labels = self.labels.lock().unwrap_or_else(|p| p.into_inner());
        match labels.get_mut(label) {
            Some(stack) => {
                let popped = stack.pop();
                if stack.is_empty() {
                    labels.remove(label);
                }
                popped
            }
            None => None,
        }
    }
}

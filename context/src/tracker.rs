//! Promise lineage tracking.
//!
//! The tracker consumes the lifecycle events an async runtime emits for its
//! promise-like resources (`init` / `before` / `after` / `resolve`) and
//! maintains two things: a record per live resource carrying its parent edge,
//! and a stack of the ids currently executing, so any synchronous continuation
//! can ask "which logical task am I in?".
//!
//! Resources are identified by a runtime-supplied `usize` handle (a stable
//! slot or object address). Task ids are handed out monotonically starting at
//! 1; id 0 is reserved for "none".

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::{trace, warn};

struct TaskRecord {
    id: u32,
    /// Parent task id, 0 when unknown. First concrete parent wins; later
    /// announcements never overwrite it.
    parent_id: u32,
    /// Outstanding `init` events minus `after` events. The record is
    /// destroyed when this reaches 0.
    active_count: u32,
}

/// Tracks live async tasks and the stack of currently executing task ids.
pub struct PromiseTracker {
    records: HashMap<usize, TaskRecord>,
    handles: HashMap<u32, usize>,
    executing: Vec<u32>,
    next_id: u32,
}

impl Default for PromiseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PromiseTracker {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            handles: HashMap::new(),
            executing: Vec::new(),
            next_id: 0,
        }
    }

    /// A new resource was announced, or an existing one re-announced.
    ///
    /// Re-announcement happens for the intermediate promises of combinators
    /// (`all` / `race`): the same handle arrives again, possibly with a parent
    /// that was absent the first time.
    pub fn init(&mut self, handle: usize, parent: Option<usize>) {
        let parent_id = parent
            .and_then(|p| self.records.get(&p))
            .map(|r| r.id)
            .unwrap_or(0);

        if let Some(record) = self.records.get_mut(&handle) {
            record.active_count += 1;
            if record.parent_id == 0 && parent_id != 0 {
                trace!(
                    id = record.id,
                    parent = parent_id,
                    "init: adopted late parent"
                );
                record.parent_id = parent_id;
            }
            trace!(
                id = record.id,
                active = record.active_count,
                "init: existing record"
            );
            return;
        }

        self.next_id += 1;
        let id = self.next_id;
        self.records.insert(
            handle,
            TaskRecord {
                id,
                parent_id,
                active_count: 1,
            },
        );
        self.handles.insert(id, handle);
        trace!(id, parent = parent_id, "init: new record");
    }

    /// Start of a continuation job for this resource.
    pub fn before(&mut self, handle: usize) {
        match self.records.get(&handle) {
            Some(record) => {
                trace!(id = record.id, "before: push");
                self.executing.push(record.id);
            }
            None => trace!(handle, "before: unregistered resource"),
        }
    }

    /// End of a continuation job for this resource.
    pub fn after(&mut self, handle: usize) {
        let Some(record) = self.records.get_mut(&handle) else {
            trace!(handle, "after: unregistered resource");
            return;
        };
        let id = record.id;

        match self.executing.last().copied() {
            Some(top) if top == id => {
                self.executing.pop();
                trace!(id, "after: pop");
            }
            Some(top) => warn!(id, top, "after: resource is not at the top of the stack"),
            None => warn!(id, "after: executing stack is empty"),
        }

        record.active_count -= 1;
        if record.active_count == 0 {
            trace!(id, "after: destroying record");
            self.records.remove(&handle);
            self.handles.remove(&id);
        }
    }

    /// Resolution events carry no lineage information and are ignored.
    pub fn resolve(&mut self, _handle: usize) {}

    /// Id of the task currently executing, 0 if none.
    pub fn current_id(&self) -> u32 {
        self.executing.last().copied().unwrap_or(0)
    }

    /// Stored parent of the given task id, 0 if none or unknown.
    pub fn parent_id(&self, id: u32) -> u32 {
        self.handles
            .get(&id)
            .and_then(|handle| self.records.get(handle))
            .map(|r| r.parent_id)
            .unwrap_or(0)
    }

    /// Number of live task records.
    pub fn live_count(&self) -> usize {
        self.records.len()
    }

    /// Drop all records and clear the executing stack. Monotonic id
    /// allocation restarts from 1.
    pub fn reset(&mut self) {
        self.records.clear();
        self.handles.clear();
        self.executing.clear();
        self.next_id = 0;
    }
}

thread_local! {
    static TRACKER: RefCell<PromiseTracker> = RefCell::new(PromiseTracker::new());
}

pub(crate) fn with_tracker<R>(f: impl FnOnce(&mut PromiseTracker) -> R) -> R {
    TRACKER.with(|t| f(&mut t.borrow_mut()))
}

/// Runtime hook: a promise-like resource was created. Never raises.
pub fn on_init(handle: usize, parent: Option<usize>) {
    with_tracker(|t| t.init(handle, parent));
}

/// Runtime hook: a continuation of the resource is about to run. Never raises.
pub fn on_before(handle: usize) {
    with_tracker(|t| t.before(handle));
}

/// Runtime hook: a continuation of the resource finished running. Never raises.
pub fn on_after(handle: usize) {
    with_tracker(|t| t.after(handle));
}

/// Runtime hook: the resource resolved. Never raises.
pub fn on_resolve(handle: usize) {
    with_tracker(|t| t.resolve(handle));
}

/// Id of the currently executing task, 0 if none.
pub fn get_current_promise_id() -> u32 {
    with_tracker(|t| t.current_id())
}

/// Parent id of the given task, or of the current task when `id` is `None`.
/// 0 when unknown.
pub fn get_parent_promise_id(id: Option<u32>) -> u32 {
    with_tracker(|t| {
        let id = id.unwrap_or_else(|| t.current_id());
        t.parent_id(id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic_from_one() {
        let mut t = PromiseTracker::new();
        t.init(10, None);
        t.init(20, None);
        t.init(30, Some(10));
        t.before(10);
        assert_eq!(t.current_id(), 1);
        t.before(20);
        assert_eq!(t.current_id(), 2);
        t.after(20);
        t.before(30);
        assert_eq!(t.current_id(), 3);
    }

    #[test]
    fn test_current_id_empty_stack() {
        let t = PromiseTracker::new();
        assert_eq!(t.current_id(), 0);
    }

    #[test]
    fn test_parent_edge_resolved_at_init() {
        let mut t = PromiseTracker::new();
        t.init(10, None);
        t.init(20, Some(10));
        assert_eq!(t.parent_id(2), 1);
        assert_eq!(t.parent_id(1), 0);
        assert_eq!(t.parent_id(99), 0);
    }

    #[test]
    fn test_unregistered_parent_is_none() {
        let mut t = PromiseTracker::new();
        t.init(20, Some(10));
        assert_eq!(t.parent_id(1), 0);
    }

    #[test]
    fn test_first_concrete_parent_wins() {
        let mut t = PromiseTracker::new();
        t.init(1, None);
        t.init(2, None);
        t.init(30, None);
        // Late upgrade from absent to concrete is accepted.
        t.init(30, Some(1));
        assert_eq!(t.parent_id(3), 1);
        // A different concrete parent afterwards is ignored.
        t.init(30, Some(2));
        assert_eq!(t.parent_id(3), 1);
        // A null parent never downgrades the stored edge.
        t.init(30, None);
        assert_eq!(t.parent_id(3), 1);
    }

    #[test]
    fn test_record_destroyed_when_active_count_drains() {
        let mut t = PromiseTracker::new();
        t.init(10, None);
        t.init(10, None);
        t.init(10, None);
        assert_eq!(t.live_count(), 1);

        t.before(10);
        t.after(10);
        assert_eq!(t.live_count(), 1);
        t.before(10);
        t.after(10);
        assert_eq!(t.live_count(), 1);
        t.before(10);
        t.after(10);
        assert_eq!(t.live_count(), 0);
        assert_eq!(t.parent_id(1), 0);
    }

    #[test]
    fn test_before_on_unregistered_resource_is_noop() {
        let mut t = PromiseTracker::new();
        t.before(42);
        assert_eq!(t.current_id(), 0);
    }

    #[test]
    fn test_after_with_mismatched_top_leaves_stack_alone() {
        let mut t = PromiseTracker::new();
        t.init(10, None);
        t.init(20, None);
        t.before(10);
        t.before(20);
        // Resource 10 is not at the top, so the stack must not move.
        t.after(10);
        assert_eq!(t.current_id(), 2);
        t.after(20);
        assert_eq!(t.current_id(), 1);
    }

    #[test]
    fn test_nested_execution_stack() {
        let mut t = PromiseTracker::new();
        t.init(10, None);
        t.init(20, Some(10));
        t.before(10);
        t.before(20);
        assert_eq!(t.current_id(), 2);
        t.after(20);
        assert_eq!(t.current_id(), 1);
        t.after(10);
        assert_eq!(t.current_id(), 0);
    }

    #[test]
    fn test_reset_restarts_allocation() {
        let mut t = PromiseTracker::new();
        t.init(10, None);
        t.init(20, None);
        t.reset();
        assert_eq!(t.current_id(), 0);
        assert_eq!(t.live_count(), 0);
        t.init(30, None);
        t.before(30);
        assert_eq!(t.current_id(), 1);
    }

    #[test]
    fn test_handle_reuse_after_destroy_allocates_fresh_id() {
        let mut t = PromiseTracker::new();
        t.init(10, None);
        t.before(10);
        t.after(10);
        assert_eq!(t.live_count(), 0);
        t.init(10, None);
        t.before(10);
        assert_eq!(t.current_id(), 2);
    }
}

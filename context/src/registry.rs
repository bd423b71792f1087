//! Process-wide registry of lineage-scoped execution contexts.
//!
//! Every async lineage (the chain of tasks reachable through parent edges)
//! owns at most one [`ExecutionContextView`]. Resolution walks the current
//! task's ancestry until it finds a task explicitly bound to a lineage and
//! falls back to the default lineage, which always exists.
//!
//! The registry, like the tracker, is a thread-local singleton: the model is
//! a single cooperative executor thread, so no locking is involved and tests
//! tear the whole thing down with [`reset`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{ContextError, ContextResult};
use crate::stack::generate_token;
use crate::tracker;
use crate::view::{ExecutionContextView, SegmentOptions};

struct ContextRegistry {
    views: HashMap<String, Rc<ExecutionContextView>>,
    task_to_lineage: HashMap<u32, String>,
    default_lineage: String,
}

impl ContextRegistry {
    fn new() -> Self {
        let default_lineage = generate_token();
        let mut views = HashMap::new();
        views.insert(
            default_lineage.clone(),
            Rc::new(ExecutionContextView::new(false, false)),
        );
        let mut task_to_lineage = HashMap::new();
        task_to_lineage.insert(tracker::get_current_promise_id(), default_lineage.clone());
        Self {
            views,
            task_to_lineage,
            default_lineage,
        }
    }

    fn default_view(&self) -> Rc<ExecutionContextView> {
        Rc::clone(
            self.views
                .get(&self.default_lineage)
                .expect("default lineage view always exists"),
        )
    }

    /// Resolve the view owning the current task's lineage.
    fn current_view(&self) -> Rc<ExecutionContextView> {
        let mut task = tracker::get_current_promise_id();
        loop {
            if let Some(lineage) = self.task_to_lineage.get(&task) {
                match self.views.get(lineage) {
                    Some(view) => return Rc::clone(view),
                    None => {
                        warn!(task, lineage = %lineage, "bound lineage has no view; using default");
                        return self.default_view();
                    }
                }
            }
            if task == 0 {
                return self.default_view();
            }
            let parent = tracker::get_parent_promise_id(Some(task));
            if parent == task || parent == 0 {
                trace!(task, "lineage walk ended; using default");
                return self.default_view();
            }
            task = parent;
        }
    }

    fn fork_for_promise(&mut self, strict_controllers: bool, strict_segments: bool) -> String {
        let name = generate_token();
        let view = self.current_view().fork(strict_controllers, strict_segments);
        self.views.insert(name.clone(), Rc::new(view));
        trace!(lineage = %name, "forked context");
        name
    }

    fn start_promise(&mut self, name: &str) -> ContextResult<()> {
        if !self.views.contains_key(name) {
            return Err(ContextError::invalid_arg_value("contextName", name));
        }
        let task = tracker::get_current_promise_id();
        if let Some(existing) = self.task_to_lineage.get(&task) {
            return Err(ContextError::invalid_arg_value(
                "contextName",
                format!("task {task} already bound to \"{existing}\""),
            ));
        }
        trace!(task, lineage = name, "started context");
        self.task_to_lineage.insert(task, name.to_string());
        Ok(())
    }

    fn end_promise(&mut self, name: &str) -> bool {
        // The default lineage must survive for fallback resolution.
        if name == self.default_lineage {
            return false;
        }
        let had_view = self.views.remove(name).is_some();
        let before = self.task_to_lineage.len();
        self.task_to_lineage.retain(|_, lineage| lineage != name);
        let removed = had_view || self.task_to_lineage.len() != before;
        if removed {
            trace!(lineage = name, "ended context");
        }
        removed
    }
}

thread_local! {
    static REGISTRY: RefCell<ContextRegistry> = RefCell::new(ContextRegistry::new());
}

fn with_registry<R>(f: impl FnOnce(&mut ContextRegistry) -> R) -> R {
    REGISTRY.with(|r| f(&mut r.borrow_mut()))
}

/// The execution context view of the current async lineage.
pub fn get_current_context() -> Rc<ExecutionContextView> {
    with_registry(|r| r.current_view())
}

/// Fork the current context into a fresh lineage and return its name.
///
/// A `true` flag upgrades the corresponding strictness switch on the fork;
/// `false` preserves the current value.
pub fn fork_for_promise(strict_controllers: bool, strict_segments: bool) -> String {
    with_registry(|r| r.fork_for_promise(strict_controllers, strict_segments))
}

/// Bind the currently executing task to a previously forked lineage.
///
/// Fails if the lineage name is unknown or the task is already bound.
pub fn start_promise(name: &str) -> ContextResult<()> {
    with_registry(|r| r.start_promise(name))
}

/// Tear down a lineage: remove its view and every task binding pointing at
/// it. Returns `true` if anything was removed. The default lineage is never
/// removed.
pub fn end_promise(name: &str) -> bool {
    with_registry(|r| r.end_promise(name))
}

/// Wrap `f` so every call resolves the then-current context and runs inside
/// the invocation chain of the declared segments.
pub fn wrap_function<F>(
    options: SegmentOptions,
    f: F,
) -> impl Fn(Vec<Value>) -> ContextResult<Value>
where
    F: Fn(&[Value]) -> ContextResult<Value>,
{
    move |args| get_current_context().run_in_context(&options, args, &f)
}

/// Tear down both the registry and the promise tracker. For tests.
pub fn reset() {
    tracker::with_tracker(|t| t.reset());
    with_registry(|r| *r = ContextRegistry::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ContextInvocation, SegmentController};
    use serde_json::json;

    /// Returns its construction tag so tests can tell which view resolved.
    struct Tagged(&'static str);

    impl SegmentController for Tagged {
        fn create_child(&self, _data: &Value) -> ContextResult<Rc<dyn SegmentController>> {
            Ok(Rc::new(Tagged(self.0)))
        }

        fn on_context(&self, _invocation: &mut dyn ContextInvocation) -> ContextResult<Value> {
            Ok(json!(self.0))
        }
    }

    fn install(view: &ExecutionContextView, segment: &str, tag: &'static str) -> String {
        view.push_controllers(vec![(
            segment.to_string(),
            Rc::new(Tagged(tag)) as Rc<dyn SegmentController>,
        )])
        .unwrap()
    }

    fn observed_tag(options: &SegmentOptions) -> ContextResult<Value> {
        get_current_context().run_in_context(options, vec![], |_| Ok(json!("no-controller")))
    }

    #[test]
    fn test_default_fallback_without_tasks() {
        reset();
        let view = get_current_context();
        install(&view, "seg", "default");
        let options = SegmentOptions::new().with("seg", Value::Null);
        assert_eq!(observed_tag(&options).unwrap(), json!("default"));
    }

    #[test]
    fn test_unknown_start_fails() {
        reset();
        let err = start_promise("nope").unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_ARG_VALUE");
    }

    #[test]
    fn test_double_start_fails() {
        reset();
        tracker::on_init(10, None);
        tracker::on_before(10);
        let a = fork_for_promise(false, false);
        let b = fork_for_promise(false, false);
        start_promise(&a).unwrap();
        let err = start_promise(&b).unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_ARG_VALUE");
        tracker::on_after(10);
    }

    #[test]
    fn test_forked_lineage_inherits_controllers() {
        reset();
        install(&get_current_context(), "seg", "parent");

        let name = fork_for_promise(false, false);
        tracker::on_init(10, None);
        tracker::on_before(10);
        start_promise(&name).unwrap();

        // The child task resolves to the forked view, which carries a copy
        // of the parent's controller.
        let options = SegmentOptions::new().with("seg", Value::Null);
        assert_eq!(observed_tag(&options).unwrap(), json!("parent"));

        // Later changes to the default view do not leak into the fork.
        install(&get_current_context(), "late", "fork-local");
        tracker::on_after(10);
        assert!(get_current_context().lookup("late").is_none());
    }

    #[test]
    fn test_descendants_resolve_through_parent_walk() {
        reset();
        let name = fork_for_promise(false, false);

        // Two inits: the root promise stays referenced while its children
        // are pending, so its record survives the first `after`.
        tracker::on_init(10, None);
        tracker::on_init(10, None);
        tracker::on_before(10);
        start_promise(&name).unwrap();
        install(&get_current_context(), "seg", "lineage");
        tracker::on_after(10);

        // A grandchild task with no explicit binding walks up to task 1.
        tracker::on_init(20, Some(10));
        tracker::on_init(30, Some(20));
        tracker::on_before(30);
        let options = SegmentOptions::new().with("seg", Value::Null);
        assert_eq!(observed_tag(&options).unwrap(), json!("lineage"));
        tracker::on_after(30);
    }

    #[test]
    fn test_unrelated_task_falls_back_to_default() {
        reset();
        install(&get_current_context(), "seg", "default");
        let name = fork_for_promise(false, false);

        tracker::on_init(10, None);
        tracker::on_before(10);
        start_promise(&name).unwrap();
        install(&get_current_context(), "seg", "forked");
        tracker::on_after(10);

        tracker::on_init(20, None);
        tracker::on_before(20);
        let options = SegmentOptions::new().with("seg", Value::Null);
        assert_eq!(observed_tag(&options).unwrap(), json!("default"));
        tracker::on_after(20);
    }

    #[test]
    fn test_end_promise_removes_view_and_bindings() {
        reset();
        let name = fork_for_promise(false, false);
        tracker::on_init(10, None);
        tracker::on_before(10);
        start_promise(&name).unwrap();

        assert!(end_promise(&name));
        // The binding is gone: the task resolves to the default again, and a
        // second end has nothing left to remove.
        assert!(!end_promise(&name));
        let err = start_promise(&name).unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_ARG_VALUE");
        tracker::on_after(10);
    }

    #[test]
    fn test_end_promise_never_removes_default() {
        reset();
        let default_name = with_registry(|r| r.default_lineage.clone());
        assert!(!end_promise(&default_name));
        // Still resolvable afterwards.
        let _ = get_current_context();
    }

    #[test]
    fn test_wrap_function_resolves_at_call_time() {
        reset();
        let options = SegmentOptions::new().with("seg", Value::Null);
        let wrapped = wrap_function(options, |args| Ok(json!(args.len())));

        // No controller yet: the target runs bare.
        assert_eq!(wrapped(vec![json!(1), json!(2)]).unwrap(), json!(2));

        // Installing a controller afterwards changes the next call.
        install(&get_current_context(), "seg", "installed");
        assert_eq!(wrapped(vec![]).unwrap(), json!("installed"));
    }
}

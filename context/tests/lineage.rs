//! Invariants of the public API: id monotonicity, frame discipline, fork
//! independence, and lineage resolution, exercised the way an embedding
//! runtime would drive them.

use std::rc::Rc;

use serde_json::{json, Value};

use garland_context::{
    end_promise, fork_for_promise, get_current_context, get_current_promise_id,
    get_parent_promise_id, on_after, on_before, on_init, reset, start_promise, wrap_function,
    ContextInvocation, ContextResult, SegmentController, SegmentOptions,
};

/// A controller answering with its tag, for telling views apart.
struct Tagged(&'static str);

impl SegmentController for Tagged {
    fn create_child(&self, _data: &Value) -> ContextResult<Rc<dyn SegmentController>> {
        Ok(Rc::new(Tagged(self.0)))
    }

    fn on_context(&self, _invocation: &mut dyn ContextInvocation) -> ContextResult<Value> {
        Ok(json!(self.0))
    }
}

fn install(segment: &str, tag: &'static str) -> String {
    get_current_context()
        .push_controllers(vec![(
            segment.to_string(),
            Rc::new(Tagged(tag)) as Rc<dyn SegmentController>,
        )])
        .unwrap()
}

#[test]
fn test_task_ids_stay_monotonic_across_churn() {
    reset();
    let mut seen = Vec::new();
    for handle in [100, 200, 300] {
        on_init(handle, None);
        on_before(handle);
        seen.push(get_current_promise_id());
        on_after(handle);
    }
    // Destroyed records never give their ids back.
    on_init(100, None);
    on_before(100);
    seen.push(get_current_promise_id());
    on_after(100);

    assert_eq!(seen, vec![1, 2, 3, 4]);
    assert!(seen.iter().all(|&id| id != 0));
    assert_eq!(get_current_promise_id(), 0);
}

#[test]
fn test_parent_ids_through_public_api() {
    reset();
    on_init(100, None);
    on_init(200, Some(100));
    on_before(200);
    assert_eq!(get_current_promise_id(), 2);
    // With no argument: the parent of the current task.
    assert_eq!(get_parent_promise_id(None), 1);
    assert_eq!(get_parent_promise_id(Some(2)), 1);
    assert_eq!(get_parent_promise_id(Some(1)), 0);
    assert_eq!(get_parent_promise_id(Some(77)), 0);
    on_after(200);
}

#[test]
fn test_frame_discipline_on_the_view() {
    reset();
    let view = get_current_context();
    let a = install("a", "a");
    let b = install("b", "b");

    assert_eq!(
        view.pop_controllers(&a).unwrap_err().code(),
        "ERR_INVALID_ARG_VALUE"
    );
    view.pop_controllers(&b).unwrap();
    view.pop_controllers(&a).unwrap();
    assert_eq!(
        view.pop_controllers(&a).unwrap_err().code(),
        "ERR_INDEX_OUT_OF_RANGE"
    );
}

#[test]
fn test_fork_lookup_agrees_then_stays_isolated() {
    reset();
    install("seg", "original");
    let view = get_current_context();
    let forked = view.fork(false, false);

    // Agreement at fork time.
    assert!(forked.lookup("seg").is_some());
    assert!(view.lookup("seg").is_some());

    // Pushes on either side stay invisible to the other.
    forked
        .push_controllers(vec![(
            "fork-only".to_string(),
            Rc::new(Tagged("f")) as Rc<dyn SegmentController>,
        )])
        .unwrap();
    install("default-only", "d");
    assert!(view.lookup("fork-only").is_none());
    assert!(forked.lookup("default-only").is_none());
}

#[test]
fn test_lineage_binding_and_teardown_roundtrip() {
    reset();
    install("seg", "root");

    let options = SegmentOptions::new().with("seg", Value::Null);
    let probe = wrap_function(options, |_| Ok(json!("bare")));

    let lineage = fork_for_promise(false, false);
    on_init(100, None);
    on_init(100, None);
    on_before(100);
    start_promise(&lineage).unwrap();
    assert_eq!(probe(vec![]).unwrap(), json!("root"));
    on_after(100);

    // Children of the bound task resolve to the same lineage.
    on_init(200, Some(100));
    on_before(200);
    assert_eq!(probe(vec![]).unwrap(), json!("root"));
    on_after(200);

    assert!(end_promise(&lineage));
    assert_eq!(start_promise(&lineage).unwrap_err().code(), "ERR_INVALID_ARG_VALUE");
}

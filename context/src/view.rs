//! Per-lineage execution context views.

use std::rc::Rc;

use serde_json::Value;
use tracing::warn;

use crate::controller::{CompositeInvocation, ContextInvocation, InnerInvocation};
use crate::error::{ContextError, ContextResult};
use crate::stack::{generate_token, ControllerMap, ControllerStack};

/// The segments a call declares, with their payloads, in declaration order.
///
/// Iteration order is insertion order; re-inserting an existing name replaces
/// its payload in place. This pins the controller execution order: the last
/// declared segment becomes the outermost link of the invocation chain and
/// runs first.
#[derive(Default, Clone)]
pub struct SegmentOptions {
    entries: Vec<(String, Value)>,
}

impl SegmentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = data,
            None => self.entries.push((name, data)),
        }
    }

    /// Builder-style [`SegmentOptions::insert`].
    pub fn with(mut self, name: impl Into<String>, data: Value) -> Self {
        self.insert(name, data);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A controller stack plus the strictness switches governing how calls may
/// interact with it.
pub struct ExecutionContextView {
    stack: ControllerStack,
    strict_controllers: bool,
    strict_segments: bool,
}

impl ExecutionContextView {
    pub fn new(strict_controllers: bool, strict_segments: bool) -> Self {
        Self {
            stack: ControllerStack::new(),
            strict_controllers,
            strict_segments,
        }
    }

    /// If true, pushing a segment name that is already resolvable anywhere in
    /// the stack is refused.
    pub fn is_strict_controllers(&self) -> bool {
        self.strict_controllers
    }

    /// If true, declaring a segment with no registered controller during
    /// `run_in_context` is an error instead of a skip.
    pub fn is_strict_segments(&self) -> bool {
        self.strict_segments
    }

    /// Push a frame of controllers; returns the frame id to pass back to
    /// [`ExecutionContextView::pop_controllers`].
    pub fn push_controllers(&self, controllers: ControllerMap) -> ContextResult<String> {
        if self.strict_controllers {
            for (name, _) in &controllers {
                if self.stack.lookup(name).is_some() {
                    return Err(ContextError::invalid_opt_value(name.clone(), "duplicate"));
                }
            }
        }
        Ok(self.stack.push(controllers))
    }

    pub fn pop_controllers(&self, frame_id: &str) -> ContextResult<()> {
        self.stack.pop(frame_id)
    }

    /// Topmost controller registered for the segment, if any.
    pub fn lookup(&self, segment: &str) -> Option<Rc<dyn crate::controller::SegmentController>> {
        self.stack.lookup(segment)
    }

    /// Derive an independent view holding a single collapsed frame.
    ///
    /// A `true` argument upgrades the corresponding strictness flag; `false`
    /// preserves the current value. Flags never downgrade across a fork.
    pub fn fork(&self, strict_controllers: bool, strict_segments: bool) -> ExecutionContextView {
        ExecutionContextView {
            stack: self.stack.fork(generate_token()),
            strict_controllers: self.strict_controllers || strict_controllers,
            strict_segments: self.strict_segments || strict_segments,
        }
    }

    /// Run `call` inside the invocation chain of the declared segments.
    ///
    /// For every declared segment (in declaration order) the registered
    /// controller derives a per-call child, and the chain telescopes so that
    /// the last declared segment runs first. The children are pushed as a new
    /// frame for the duration of the call; the frame is popped whether the
    /// call returns or fails.
    pub fn run_in_context<C>(
        &self,
        options: &SegmentOptions,
        args: Vec<Value>,
        call: C,
    ) -> ContextResult<Value>
    where
        C: FnOnce(&[Value]) -> ContextResult<Value>,
    {
        let mut invocation: Box<dyn ContextInvocation + '_> =
            Box::new(InnerInvocation::new(args, Box::new(call)));
        let mut children: ControllerMap = Vec::new();

        for (name, data) in options.iter() {
            let controller = match self.stack.lookup(name) {
                Some(controller) => controller,
                None if self.strict_segments => {
                    return Err(ContextError::invalid_arg_value(name, "unknown segment"));
                }
                None => continue,
            };
            let child = controller.create_child(data)?;
            invocation = Box::new(CompositeInvocation::new(invocation, Rc::clone(&child)));
            children.push((name.to_string(), child));
        }

        let frame_id = self.stack.push(children);
        let result = invocation.invoke();
        if let Err(err) = self.stack.pop(&frame_id) {
            // The frame was pushed above and user code cannot remove it, so
            // this only fires if a controller unbalanced the stack.
            warn!(code = err.code(), "run_in_context: frame pop failed");
        }
        result
    }
}

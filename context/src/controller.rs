//! Segment controllers and the invocation chain.
//!
//! A segment controller is the gatekeeper for one named segment (for example
//! `"fileaccess"`). When a call declares segments, the view wraps the call in
//! one [`CompositeInvocation`] per declared segment; each controller's
//! [`SegmentController::on_context`] then runs around the next-inner
//! invocation and may veto the call, transform its result, or simply forward
//! to `invocation.invoke()`.

use std::rc::Rc;

use serde_json::Value;

use crate::error::{ContextError, ContextResult};

/// Capability interface for a segment gatekeeper.
///
/// Controllers live in stack frames and are shared by reference; a per-call
/// instance is produced by [`SegmentController::create_child`] from the
/// segment payload the caller declared.
pub trait SegmentController {
    /// Derive the per-call controller from the declared segment payload.
    fn create_child(&self, data: &Value) -> ContextResult<Rc<dyn SegmentController>>;

    /// Run around the wrapped call. Implementations must forward failures
    /// from `invocation.invoke()` unchanged.
    fn on_context(&self, invocation: &mut dyn ContextInvocation) -> ContextResult<Value>;
}

/// One link of the telescoped call chain built by `run_in_context`.
pub trait ContextInvocation {
    /// Positional arguments of the wrapped call.
    fn args(&self) -> &[Value];

    /// Proceed with the call. The base implementation is abstract.
    fn invoke(&mut self) -> ContextResult<Value> {
        Err(ContextError::method_not_implemented(
            "ContextInvocation.invoke",
        ))
    }
}

pub(crate) type CallFn<'a> = Box<dyn FnOnce(&[Value]) -> ContextResult<Value> + 'a>;

/// The innermost link: actually invokes the wrapped target.
pub(crate) struct InnerInvocation<'a> {
    args: Vec<Value>,
    call: Option<CallFn<'a>>,
}

impl<'a> InnerInvocation<'a> {
    pub(crate) fn new(args: Vec<Value>, call: CallFn<'a>) -> Self {
        Self {
            args,
            call: Some(call),
        }
    }
}

impl ContextInvocation for InnerInvocation<'_> {
    fn args(&self) -> &[Value] {
        &self.args
    }

    fn invoke(&mut self) -> ContextResult<Value> {
        match self.call.take() {
            Some(call) => call(&self.args),
            None => Err(ContextError::invalid_arg_value(
                "invocation",
                "already invoked",
            )),
        }
    }
}

/// A link that hands control to one controller, with the rest of the chain
/// as its inner invocation.
pub(crate) struct CompositeInvocation<'a> {
    inner: Box<dyn ContextInvocation + 'a>,
    controller: Rc<dyn SegmentController>,
}

impl<'a> CompositeInvocation<'a> {
    pub(crate) fn new(
        inner: Box<dyn ContextInvocation + 'a>,
        controller: Rc<dyn SegmentController>,
    ) -> Self {
        Self { inner, controller }
    }
}

impl ContextInvocation for CompositeInvocation<'_> {
    fn args(&self) -> &[Value] {
        self.inner.args()
    }

    fn invoke(&mut self) -> ContextResult<Value> {
        self.controller.on_context(self.inner.as_mut())
    }
}

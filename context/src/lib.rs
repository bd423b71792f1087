//! # garland-context - Segmented Execution Contexts
//!
//! `garland-context` follows every asynchronous task a cooperative runtime
//! announces and virtualises a stack of named *segment controllers* per async
//! lineage, so that a call wrapped with [`wrap_function`] is vetted by every
//! controller in scope before it runs.
//!
//! ## Design
//!
//! - **Promise lineage**: the runtime reports `init`/`before`/`after`/
//!   `resolve` events through the [`on_init`]-family hooks; the tracker keeps
//!   parent edges and the stack of currently executing task ids.
//! - **Lineage-scoped views**: the [`registry`](get_current_context) maps
//!   lineages to [`ExecutionContextView`]s. Resolution walks the current
//!   task's ancestry and falls back to the always-present default lineage.
//! - **Invocation chain**: `run_in_context` telescopes one
//!   [`ContextInvocation`] per declared segment around the wrapped call,
//!   outermost-first, with the per-call controllers pushed as a frame for
//!   the duration of the call.
//! - **Single executor thread**: all state is thread-local; there are no
//!   locks, and [`reset`] tears everything down for tests.
//!
//! ## Usage
//!
//! ```rust
//! use garland_context::{wrap_function, SegmentOptions};
//! use serde_json::json;
//!
//! let wrapped = wrap_function(
//!     SegmentOptions::new().with("fileaccess", json!({ "read": "{0}" })),
//!     |args| Ok(args.first().cloned().unwrap_or_default()),
//! );
//! // With no controller installed the segment is skipped and the call runs.
//! let out = wrapped(vec![json!("/tmp/a.tmp")]).unwrap();
//! assert_eq!(out, json!("/tmp/a.tmp"));
//! ```

pub mod controller;
pub mod error;
pub mod future;
pub mod registry;
pub mod stack;
pub mod tracker;
pub mod view;

pub use controller::{ContextInvocation, SegmentController};
pub use error::{ContextError, ContextResult};
pub use future::{wrap_future, ContextScope};
pub use registry::{
    end_promise, fork_for_promise, get_current_context, reset, start_promise, wrap_function,
};
pub use stack::{ControllerMap, ControllerStack};
pub use tracker::{
    get_current_promise_id, get_parent_promise_id, on_after, on_before, on_init, on_resolve,
    PromiseTracker,
};
pub use view::{ExecutionContextView, SegmentOptions};

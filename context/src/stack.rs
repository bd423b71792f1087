//! Frames of segment controllers, stacked per execution context.

use std::cell::RefCell;
use std::rc::Rc;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::controller::SegmentController;
use crate::error::{ContextError, ContextResult};

/// Length of a generated frame id token.
const FRAME_ID_LEN: usize = 32;

/// Insertion-ordered mapping of segment names to controllers, as pushed in
/// one `push_controllers` call.
pub type ControllerMap = Vec<(String, Rc<dyn SegmentController>)>;

/// Generate an opaque token from the alphabet `[0-9A-Za-z]`.
pub(crate) fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(FRAME_ID_LEN)
        .map(char::from)
        .collect()
}

struct Frame {
    id: String,
    segments: ControllerMap,
}

/// An ordered sequence of controller frames.
///
/// All operations borrow internally and return before user code runs, so a
/// controller invoked from `run_in_context` may freely re-enter the stack.
pub struct ControllerStack {
    frames: RefCell<Vec<Frame>>,
}

impl Default for ControllerStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerStack {
    pub fn new() -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
        }
    }

    /// Append a frame and return its freshly generated id.
    pub fn push(&self, segments: ControllerMap) -> String {
        let id = generate_token();
        self.frames.borrow_mut().push(Frame {
            id: id.clone(),
            segments,
        });
        id
    }

    /// Remove the top frame. The id must match the top frame; pops are
    /// strictly LIFO.
    pub fn pop(&self, frame_id: &str) -> ContextResult<()> {
        let mut frames = self.frames.borrow_mut();
        let Some(top) = frames.last() else {
            return Err(ContextError::index_out_of_range("controller stack"));
        };
        if top.id != frame_id {
            return Err(ContextError::invalid_arg_value("frameId", frame_id));
        }
        frames.pop();
        Ok(())
    }

    /// Topmost controller registered for the segment, if any.
    pub fn lookup(&self, segment: &str) -> Option<Rc<dyn SegmentController>> {
        let frames = self.frames.borrow();
        frames.iter().rev().find_map(|frame| {
            frame
                .segments
                .iter()
                .find(|(name, _)| name == segment)
                .map(|(_, controller)| Rc::clone(controller))
        })
    }

    /// Flatten the whole stack into a new single-frame stack bearing
    /// `new_frame_id`. Later frames override earlier frames on name
    /// collision. The result is fully independent of the receiver.
    pub fn fork(&self, new_frame_id: String) -> ControllerStack {
        let mut collapsed: ControllerMap = Vec::new();
        for frame in self.frames.borrow().iter() {
            for (name, controller) in &frame.segments {
                match collapsed.iter_mut().find(|(n, _)| n == name) {
                    Some(slot) => slot.1 = Rc::clone(controller),
                    None => collapsed.push((name.clone(), Rc::clone(controller))),
                }
            }
        }
        ControllerStack {
            frames: RefCell::new(vec![Frame {
                id: new_frame_id,
                segments: collapsed,
            }]),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

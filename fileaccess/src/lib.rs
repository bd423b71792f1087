//! # garland-fileaccess - File Access Control
//!
//! A segment controller for `garland-context` that turns permissive path
//! patterns (literals, directory prefixes, `re:` regular expressions and
//! shell-style globs) into compiled matchers, and vetoes wrapped calls whose
//! declared file arguments fall outside the granted paths.
//!
//! ## Usage
//!
//! ```rust
//! use garland_context::{get_current_context, wrap_function, SegmentOptions};
//! use garland_fileaccess::{add_file_access_controller, FileAccessOptions};
//! use serde_json::json;
//!
//! garland_context::reset();
//! let controllers = add_file_access_controller(
//!     None,
//!     FileAccessOptions {
//!         readable: "/tmp/".into(),
//!         ..Default::default()
//!     },
//! )
//! .unwrap();
//! let frame = get_current_context().push_controllers(controllers).unwrap();
//!
//! let read_file = wrap_function(
//!     SegmentOptions::new().with("fileaccess", json!({ "read": "{0}" })),
//!     |args| Ok(args[0].clone()),
//! );
//! assert!(read_file(vec![json!("/tmp/a.tmp")]).is_ok());
//! assert!(read_file(vec![json!("/etc/passwd")]).is_err());
//!
//! get_current_context().pop_controllers(&frame).unwrap();
//! ```

pub mod controller;
pub mod matcher;
pub mod path;

pub use controller::{
    add_file_access_controller, FileAccessController, FileAccessOptions, FILE_ACCESS_SEGMENT,
};
pub use matcher::{to_matcher, PathMatcher, Pattern};
pub use path::normalize_path;

//! The file-access segment controller.
//!
//! The controller holds three compiled matchers (readable, writable,
//! listable). A per-call child carries a request descriptor declaring which
//! positional arguments name paths and what kind of access the call needs;
//! `on_context` resolves the descriptor against the actual arguments and
//! vetoes the call before it runs if any required access is not granted.

use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use garland_context::{
    ContextError, ContextInvocation, ContextResult, ControllerMap, SegmentController,
};

use crate::matcher::{json_type_name, to_matcher, PathMatcher, Pattern};
use crate::path::normalize_path;

/// The well-known segment name calls declare to request file access checks.
pub const FILE_ACCESS_SEGMENT: &str = "fileaccess";

/// Construction options: the three permission lists.
#[derive(Debug, Default)]
pub struct FileAccessOptions {
    pub readable: Pattern,
    pub writable: Pattern,
    pub listable: Pattern,
}

impl FileAccessOptions {
    /// Read options from a configuration record with optional `readable`,
    /// `writable` and `listable` keys.
    pub fn from_value(value: &Value) -> ContextResult<Self> {
        let record = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(record) => record,
            other => {
                return Err(ContextError::invalid_arg_type(
                    "options",
                    "object",
                    json_type_name(other),
                ));
            }
        };
        let field = |name: &str| -> ContextResult<Pattern> {
            match record.get(name) {
                None => Ok(Pattern::Null),
                Some(value) => Pattern::from_value(value),
            }
        };
        Ok(Self {
            readable: field("readable")?,
            writable: field("writable")?,
            listable: field("listable")?,
        })
    }
}

/// What one wrapped call declares about its file arguments.
///
/// Each entry is either a literal path or a placeholder: `{N}` names the
/// call's N-th positional argument, `{N.key}` the `key` property of a
/// record argument.
#[derive(Debug, Default, PartialEq)]
struct AccessRequest {
    read: Vec<String>,
    write: Vec<String>,
    list: Vec<String>,
    flags: Option<String>,
    path: Option<String>,
    mode: Option<String>,
}

impl AccessRequest {
    fn from_value(data: &Value) -> ContextResult<Self> {
        let record = match data {
            Value::Null => return Ok(Self::default()),
            Value::Object(record) => record,
            other => {
                return Err(ContextError::invalid_arg_type(
                    "data",
                    "object",
                    json_type_name(other),
                ));
            }
        };

        let string_list = |name: &str| -> ContextResult<Vec<String>> {
            match record.get(name) {
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(Value::String(s)) => Ok(vec![s.clone()]),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        other => Err(ContextError::invalid_arg_type(
                            format!("data.{name}"),
                            "string",
                            json_type_name(other),
                        )),
                    })
                    .collect(),
                Some(other) => Err(ContextError::invalid_arg_type(
                    format!("data.{name}"),
                    "string or array of strings",
                    json_type_name(other),
                )),
            }
        };
        let opt_string = |name: &str| -> ContextResult<Option<String>> {
            match record.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(ContextError::invalid_arg_type(
                    format!("data.{name}"),
                    "string",
                    json_type_name(other),
                )),
            }
        };

        Ok(Self {
            read: string_list("read")?,
            write: string_list("write")?,
            list: string_list("list")?,
            flags: opt_string("flags")?,
            path: opt_string("path")?,
            mode: opt_string("mode")?,
        })
    }
}

/// Resolve a descriptor entry against the call's positional arguments.
///
/// `{N}` yields `args[N]`, `{N.key}` the `key` property of a record
/// argument; anything else passes through as a literal. A placeholder that
/// points at a missing argument or a non-string value resolves to `None`.
fn resolve_placeholder(spec: &str, args: &[Value]) -> Option<String> {
    let Some(body) = spec.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
        return Some(spec.to_string());
    };
    let (index, key) = match body.split_once('.') {
        Some((index, key)) => (index, Some(key)),
        None => (body, None),
    };
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        // Not placeholder syntax after all; treat the whole string literally.
        return Some(spec.to_string());
    }
    let value = args.get(index.parse::<usize>().ok()?)?;
    let value = match key {
        Some(key) => value.as_object()?.get(key)?,
        None => value,
    };
    value.as_str().map(str::to_string)
}

/// A segment controller enforcing readable/writable/listable path policies.
pub struct FileAccessController {
    readable: Rc<PathMatcher>,
    writable: Rc<PathMatcher>,
    listable: Rc<PathMatcher>,
    request: Option<AccessRequest>,
}

impl FileAccessController {
    pub fn new(options: FileAccessOptions) -> ContextResult<Self> {
        Ok(Self {
            readable: Rc::new(to_matcher(&options.readable)?),
            writable: Rc::new(to_matcher(&options.writable)?),
            listable: Rc::new(to_matcher(&options.listable)?),
            request: None,
        })
    }

    fn require(&self, matcher: &PathMatcher, kind: &str, path: &str) -> ContextResult<()> {
        if matcher.matches(path) {
            return Ok(());
        }
        debug!(kind, path, "file access denied");
        Err(ContextError::file_access_forbidden(path))
    }

    /// Resolve one descriptor entry and check it against `matcher`. An entry
    /// whose placeholder cannot be resolved is denied: a path the call did
    /// not actually supply can never be granted.
    fn require_entry(
        &self,
        matcher: &PathMatcher,
        kind: &str,
        entry: &str,
        args: &[Value],
    ) -> ContextResult<()> {
        match resolve_placeholder(entry, args) {
            Some(path) => self.require(matcher, kind, &normalize_path(&path)),
            None => Err(ContextError::file_access_forbidden(entry)),
        }
    }
}

impl SegmentController for FileAccessController {
    fn create_child(&self, data: &Value) -> ContextResult<Rc<dyn SegmentController>> {
        Ok(Rc::new(FileAccessController {
            readable: Rc::clone(&self.readable),
            writable: Rc::clone(&self.writable),
            listable: Rc::clone(&self.listable),
            request: Some(AccessRequest::from_value(data)?),
        }))
    }

    fn on_context(&self, invocation: &mut dyn ContextInvocation) -> ContextResult<Value> {
        let Some(request) = &self.request else {
            // A controller without a descriptor has nothing to enforce.
            return invocation.invoke();
        };
        let args = invocation.args().to_vec();

        let path = request
            .path
            .as_deref()
            .and_then(|spec| resolve_placeholder(spec, &args))
            .map(|p| normalize_path(&p));

        if let Some(path) = &path {
            let flags = request
                .flags
                .as_deref()
                .and_then(|spec| resolve_placeholder(spec, &args));
            if let Some(flags) = flags {
                if flags.contains('r') || flags.contains('+') {
                    self.require(&self.readable, "read", path)?;
                }
                if flags.contains('w') || flags.contains('a') || flags.contains('+') {
                    self.require(&self.writable, "write", path)?;
                }
            }

            let mode = request
                .mode
                .as_deref()
                .and_then(|spec| resolve_placeholder(spec, &args));
            if let Some(mode) = mode {
                // Unparsable mode strings carry no permission bits.
                if let Ok(bits) = u32::from_str_radix(&mode, 8) {
                    if bits & 0o444 != 0 {
                        self.require(&self.readable, "read", path)?;
                    }
                    if bits & 0o222 != 0 {
                        self.require(&self.writable, "write", path)?;
                    }
                }
            }
        }

        for entry in &request.list {
            self.require_entry(&self.listable, "list", entry, &args)?;
        }
        for entry in &request.read {
            self.require_entry(&self.readable, "read", entry, &args)?;
        }
        for entry in &request.write {
            self.require_entry(&self.writable, "write", entry, &args)?;
        }

        invocation.invoke()
    }
}

/// Attach a file-access controller to a controller map under the
/// well-known `"fileaccess"` segment name, creating the map if necessary.
pub fn add_file_access_controller(
    container: Option<ControllerMap>,
    options: FileAccessOptions,
) -> ContextResult<ControllerMap> {
    let mut container = container.unwrap_or_default();
    let controller = FileAccessController::new(options)?;
    container.push((
        FILE_ACCESS_SEGMENT.to_string(),
        Rc::new(controller) as Rc<dyn SegmentController>,
    ));
    Ok(container)
}

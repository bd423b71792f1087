//! Path pattern compilation.
//!
//! A permissive/denied path list accepts several pattern shapes: literal
//! paths, `re:`-prefixed regular expressions, directory patterns (trailing
//! separator), shell-style globs (`*` and `?` within one path segment), and
//! arrays of any of those. [`to_matcher`] compiles a pattern into an
//! immutable [`PathMatcher`] predicate; matching never fails and depends
//! only on the pattern and the normalised input.

use garland_context::{ContextError, ContextResult};
use regex::Regex;
use serde_json::Value;

use crate::path::normalize_path;

/// A path pattern before compilation.
#[derive(Debug, Clone, Default)]
pub enum Pattern {
    /// Matches nothing
    #[default]
    Null,
    /// A literal path, `re:<regex>` string, directory pattern, or glob
    Text(String),
    /// A prebuilt regular expression
    Regex(Regex),
    /// Any-of over sub-patterns
    List(Vec<Pattern>),
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Pattern::Text(s.to_string())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::Text(s)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

impl<const N: usize> From<[&str; N]> for Pattern {
    fn from(items: [&str; N]) -> Self {
        Pattern::List(items.iter().map(|s| Pattern::from(*s)).collect())
    }
}

impl Pattern {
    /// Convert a configuration value: null, a string, or an array of
    /// strings. Anything else is a configuration error.
    pub fn from_value(value: &Value) -> ContextResult<Pattern> {
        match value {
            Value::Null => Ok(Pattern::Null),
            Value::String(s) => Ok(Pattern::Text(s.clone())),
            Value::Array(items) => {
                let mut patterns = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => patterns.push(Pattern::Text(s.clone())),
                        other => {
                            return Err(ContextError::invalid_arg_type(
                                "pattern",
                                "string",
                                json_type_name(other),
                            ));
                        }
                    }
                }
                Ok(Pattern::List(patterns))
            }
            other => Err(ContextError::invalid_arg_type(
                "pattern",
                "string, array, or null",
                json_type_name(other),
            )),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One compiled segment of a glob pattern.
#[derive(Debug)]
enum GlobSegment {
    /// Wildcard-free segment, compared by equality
    Text(String),
    /// Segment containing `*` or `?`, fully anchored
    Wild(Regex),
    /// Trailing-separator sentinel: any sequence of remaining segments
    Rest,
}

#[derive(Debug)]
enum MatcherKind {
    Never,
    Exact(String),
    /// Normalised directory prefix with the trailing separator stripped;
    /// matches strict sub-paths only.
    DirPrefix(String),
    Regex(Regex),
    Glob(Vec<GlobSegment>),
    Any(Vec<PathMatcher>),
}

/// A compiled, immutable path predicate.
///
/// Inputs are expected to be pre-normalised via [`normalize_path`].
#[derive(Debug)]
pub struct PathMatcher {
    kind: MatcherKind,
}

/// Compile a pattern into a [`PathMatcher`].
pub fn to_matcher(pattern: &Pattern) -> ContextResult<PathMatcher> {
    let kind = match pattern {
        Pattern::Null => MatcherKind::Never,
        Pattern::Regex(re) => MatcherKind::Regex(re.clone()),
        Pattern::Text(text) => compile_text(text)?,
        Pattern::List(items) => {
            let mut matchers = Vec::with_capacity(items.len());
            for item in items {
                if let Pattern::List(_) = item {
                    return Err(ContextError::invalid_arg_type(
                        "pattern",
                        "string or regular expression",
                        "array",
                    ));
                }
                matchers.push(to_matcher(item)?);
            }
            MatcherKind::Any(matchers)
        }
    };
    Ok(PathMatcher { kind })
}

fn compile_text(text: &str) -> ContextResult<MatcherKind> {
    if let Some(source) = text.strip_prefix("re:") {
        let re = Regex::new(source)
            .map_err(|err| ContextError::invalid_arg_value("pattern", err.to_string()))?;
        return Ok(MatcherKind::Regex(re));
    }

    let has_wildcard = text.contains('*') || text.contains('?');
    if !has_wildcard {
        if text.ends_with('/') || text.ends_with('\\') {
            let mut prefix = normalize_path(text);
            while prefix.ends_with('/') && prefix.len() > 1 {
                prefix.pop();
            }
            if prefix == "/" {
                prefix.clear();
            }
            return Ok(MatcherKind::DirPrefix(prefix));
        }
        return Ok(MatcherKind::Exact(normalize_path(text)));
    }

    compile_glob(&normalize_path(text))
}

fn compile_glob(normalized: &str) -> ContextResult<MatcherKind> {
    let parts: Vec<&str> = normalized.split(['/', '\\']).collect();
    let mut segments = Vec::new();
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            // A trailing empty segment means the pattern ended with a
            // separator: everything below matches. Leading and repeated
            // separators contribute nothing.
            if index == parts.len() - 1 && index != 0 {
                segments.push(GlobSegment::Rest);
            }
            continue;
        }
        if part.contains('*') || part.contains('?') {
            segments.push(GlobSegment::Wild(segment_regex(part)?));
        } else {
            segments.push(GlobSegment::Text(part.to_string()));
        }
    }
    Ok(MatcherKind::Glob(segments))
}

/// Translate one glob segment to an anchored regex: `?` is any single
/// character, `*` any run of characters, everything else literal.
fn segment_regex(segment: &str) -> ContextResult<Regex> {
    let mut source = String::with_capacity(segment.len() + 4);
    source.push('^');
    for ch in segment.chars() {
        match ch {
            '*' => source.push_str(".*?"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|err| ContextError::invalid_arg_value("pattern", err.to_string()))
}

impl PathMatcher {
    /// Test a pre-normalised path against this matcher.
    pub fn matches(&self, path: &str) -> bool {
        match &self.kind {
            MatcherKind::Never => false,
            MatcherKind::Exact(expected) => path == expected,
            MatcherKind::DirPrefix(prefix) => {
                path.len() > prefix.len()
                    && path.starts_with(prefix.as_str())
                    && matches!(path.as_bytes()[prefix.len()], b'/' | b'\\')
            }
            MatcherKind::Regex(re) => re.is_match(path),
            MatcherKind::Glob(segments) => glob_match(segments, path),
            MatcherKind::Any(matchers) => matchers.iter().any(|m| m.matches(path)),
        }
    }
}

fn glob_match(segments: &[GlobSegment], path: &str) -> bool {
    let mut inputs = path.split(['/', '\\']).filter(|s| !s.is_empty());
    for segment in segments {
        match segment {
            GlobSegment::Rest => return true,
            GlobSegment::Text(expected) => match inputs.next() {
                Some(actual) if actual == expected => {}
                _ => return false,
            },
            GlobSegment::Wild(re) => match inputs.next() {
                Some(actual) if re.is_match(actual) => {}
                _ => return false,
            },
        }
    }
    inputs.next().is_none()
}

//! Error types for context operations

use thiserror::Error;

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;

/// Error type for context operations.
///
/// Every variant carries a stable string code, exposed via [`ContextError::code`],
/// so callers can match on the error class without depending on message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// An argument had the wrong structural type
    #[error("The \"{name}\" argument must be of type {expected}. Received {received}")]
    InvalidArgType {
        name: String,
        expected: &'static str,
        received: String,
    },

    /// An argument had the right type but an unacceptable value
    #[error("The argument \"{name}\" is invalid. Received {received}")]
    InvalidArgValue { name: String, received: String },

    /// An option had an unacceptable value
    #[error("The value \"{received}\" is invalid for option \"{name}\"")]
    InvalidOptValue { name: String, received: String },

    /// An index-like operation ran off the end of its container
    #[error("{subject} is out of range")]
    IndexOutOfRange { subject: &'static str },

    /// A base method that must be overridden was called directly
    #[error("The {name} method is not implemented")]
    MethodNotImplemented { name: &'static str },

    /// A file access was vetoed by the active security context
    #[error("Access to the file \"{path}\" is forbidden by the current security context")]
    FileAccessForbidden { path: String },
}

impl ContextError {
    /// Stable error code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            ContextError::InvalidArgType { .. } => "ERR_INVALID_ARG_TYPE",
            ContextError::InvalidArgValue { .. } => "ERR_INVALID_ARG_VALUE",
            ContextError::InvalidOptValue { .. } => "ERR_INVALID_OPT_VALUE",
            ContextError::IndexOutOfRange { .. } => "ERR_INDEX_OUT_OF_RANGE",
            ContextError::MethodNotImplemented { .. } => "ERR_METHOD_NOT_IMPLEMENTED",
            ContextError::FileAccessForbidden { .. } => "ERR_FILE_ACCESS_FORBIDDEN",
        }
    }

    pub fn invalid_arg_type(
        name: impl Into<String>,
        expected: &'static str,
        received: impl Into<String>,
    ) -> Self {
        ContextError::InvalidArgType {
            name: name.into(),
            expected,
            received: received.into(),
        }
    }

    pub fn invalid_arg_value(name: impl Into<String>, received: impl Into<String>) -> Self {
        ContextError::InvalidArgValue {
            name: name.into(),
            received: received.into(),
        }
    }

    pub fn invalid_opt_value(name: impl Into<String>, received: impl Into<String>) -> Self {
        ContextError::InvalidOptValue {
            name: name.into(),
            received: received.into(),
        }
    }

    pub fn index_out_of_range(subject: &'static str) -> Self {
        ContextError::IndexOutOfRange { subject }
    }

    pub fn method_not_implemented(name: &'static str) -> Self {
        ContextError::MethodNotImplemented { name }
    }

    pub fn file_access_forbidden(path: impl Into<String>) -> Self {
        ContextError::FileAccessForbidden { path: path.into() }
    }
}

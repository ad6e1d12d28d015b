//! Error types shared by the rule engine and its platform backends.

use thiserror::Error;

use crate::target::WindowHandle;

/// Errors raised while pushing a style onto a window.
///
/// None of these are fatal: the service logs them and moves on, and the
/// window is re-evaluated on the next trigger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StyleError {
    #[error("Window {0} no longer exists")]
    WindowGone(WindowHandle),

    #[error("{operation} rejected for window {handle} (code {code:#x})")]
    Rejected {
        operation: &'static str,
        handle: WindowHandle,
        code: i32,
    },

    #[error("{0} is not supported on this system")]
    Unsupported(&'static str),
}

/// Errors raised while building rules from user configuration.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Invalid {field} pattern {pattern:?}: {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Rule {0:?} has no match criteria")]
    NoCriteria(String),
}

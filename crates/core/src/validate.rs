//! Validation of breakpoints and debuggees
//!
//! One rule applies to outgoing requests and to every response path (list,
//! get, set). A malformed element rejects the whole response.

use crate::model::{Action, Breakpoint, BreakpointRequest, Debuggee, SourceLocation};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("breakpoint has no id")]
    MissingId,

    #[error("breakpoint {id:?} has an empty source path")]
    EmptyPath { id: String },

    #[error("breakpoint {id:?} has invalid line {line} (lines are one-indexed)")]
    InvalidLine { id: String, line: u32 },

    #[error("breakpoint {id:?} has invalid column {column} (columns are one-indexed)")]
    InvalidColumn { id: String, column: u32 },

    #[error("logpoint {id:?} has no log message format")]
    MissingLogFormat { id: String },

    #[error("debuggee has no id")]
    MissingDebuggeeId,

    #[error("entry {index} of response rejected: {source}")]
    InList {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

/// Validate a request before it is sent
pub fn validate_request(request: &BreakpointRequest) -> Result<(), ValidationError> {
    check_shape(
        "",
        &request.location,
        request.action,
        request.log_message_format.as_deref(),
    )
}

/// Validate a breakpoint returned by the backend
pub fn validate_breakpoint(bp: &Breakpoint) -> Result<(), ValidationError> {
    if bp.id.is_empty() {
        return Err(ValidationError::MissingId);
    }
    check_shape(&bp.id, &bp.location, bp.action, bp.log_message_format.as_deref())
}

/// Validate a full list response; any bad entry rejects all of it
pub fn validate_breakpoints(breakpoints: &[Breakpoint]) -> Result<(), ValidationError> {
    for (index, bp) in breakpoints.iter().enumerate() {
        validate_breakpoint(bp).map_err(|e| ValidationError::InList {
            index,
            source: Box::new(e),
        })?;
    }
    Ok(())
}

pub fn validate_debuggees(debuggees: &[Debuggee]) -> Result<(), ValidationError> {
    for (index, debuggee) in debuggees.iter().enumerate() {
        if debuggee.id.is_empty() {
            return Err(ValidationError::InList {
                index,
                source: Box::new(ValidationError::MissingDebuggeeId),
            });
        }
    }
    Ok(())
}

fn check_shape(
    id: &str,
    location: &SourceLocation,
    action: Action,
    log_format: Option<&str>,
) -> Result<(), ValidationError> {
    if location.path.is_empty() {
        return Err(ValidationError::EmptyPath { id: id.to_string() });
    }
    if location.line == 0 {
        return Err(ValidationError::InvalidLine {
            id: id.to_string(),
            line: location.line,
        });
    }
    if let Some(0) = location.column {
        return Err(ValidationError::InvalidColumn {
            id: id.to_string(),
            column: 0,
        });
    }
    if action == Action::Log && log_format.map_or(true, str::is_empty) {
        return Err(ValidationError::MissingLogFormat { id: id.to_string() });
    }
    Ok(())
}

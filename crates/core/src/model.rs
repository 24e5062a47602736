//! Breakpoint and debuggee data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Project identifier resolved during authorization
pub type ProjectId = String;

/// What a breakpoint does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Capture a snapshot (stack frames + variables)
    #[default]
    Capture,
    /// Emit a log line (logpoint)
    Log,
}

/// Severity of a logpoint message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
}

/// Source position of a breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    /// Path relative to the debuggee's source root
    pub path: String,
    /// One-indexed line number
    pub line: u32,
    /// One-indexed column, if the agent supports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column: None,
        }
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{}", self.path, self.line, column),
            None => write!(f, "{}:{}", self.path, self.line),
        }
    }
}

/// What a status message refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reference {
    #[default]
    Unspecified,
    BreakpointSourceLocation,
    BreakpointCondition,
    BreakpointExpression,
    BreakpointAge,
    VariableName,
    VariableValue,
}

/// Parameterized message (`$0`, `$1` placeholders)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatMessage {
    pub format: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// Status attached to a breakpoint or variable by the agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub refers_to: Reference,
    #[serde(default)]
    pub description: FormatMessage,
}

/// Captured variable (possibly a compound value with members)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Index into the breakpoint's shared variable table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_table_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusMessage>,
}

/// One frame of a captured call stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub function: String,
    pub location: SourceLocation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<Variable>,
}

/// User intent to create a breakpoint
///
/// Built by the caller and never mutated by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointRequest {
    #[serde(default)]
    pub action: Action,
    pub location: SourceLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<String>,
    /// Logpoint message with `$0`-style expression placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_message_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
}

impl BreakpointRequest {
    /// Snapshot request at the given location
    pub fn snapshot(location: SourceLocation) -> Self {
        Self {
            action: Action::Capture,
            location,
            condition: None,
            expressions: Vec::new(),
            log_message_format: None,
            log_level: None,
        }
    }

    /// Logpoint request emitting `format` at `level`
    pub fn logpoint(location: SourceLocation, format: impl Into<String>, level: LogLevel) -> Self {
        Self {
            action: Action::Log,
            location,
            condition: None,
            expressions: Vec::new(),
            log_message_format: Some(format.into()),
            log_level: Some(level),
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_expressions<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expressions = expressions.into_iter().map(Into::into).collect();
        self
    }
}

/// Server-side breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    /// Server-assigned identifier
    pub id: String,
    #[serde(default)]
    pub action: Action,
    pub location: SourceLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_message_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    /// True once the snapshot has been captured (or the breakpoint expired)
    #[serde(default)]
    pub is_final_state: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_frames: Vec<StackFrame>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_table: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evaluated_expressions: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Breakpoint {
    /// Build a pending breakpoint from a request and a server id
    pub fn from_request(id: impl Into<String>, request: &BreakpointRequest) -> Self {
        Self {
            id: id.into(),
            action: request.action,
            location: request.location.clone(),
            condition: request.condition.clone(),
            expressions: request.expressions.clone(),
            log_message_format: request.log_message_format.clone(),
            log_level: request.log_level,
            is_final_state: false,
            stack_frames: Vec::new(),
            variable_table: Vec::new(),
            evaluated_expressions: Vec::new(),
            status: None,
            create_time: None,
            final_time: None,
            user_email: None,
            labels: BTreeMap::new(),
        }
    }

    /// Source path this breakpoint is set on
    pub fn path(&self) -> &str {
        &self.location.path
    }

    pub fn is_final(&self) -> bool {
        self.is_final_state
    }

    /// The request this breakpoint was created from
    pub fn request(&self) -> BreakpointRequest {
        BreakpointRequest {
            action: self.action,
            location: self.location.clone(),
            condition: self.condition.clone(),
            expressions: self.expressions.clone(),
            log_message_format: self.log_message_format.clone(),
            log_level: self.log_level,
        }
    }
}

/// Registered, debuggable instance of a target application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debuggee {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniquifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub is_inactive: bool,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusMessage>,
}

impl Debuggee {
    pub fn new(id: impl Into<String>, project_id: impl Into<String>, version: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("projectid".to_string(), project_id.into());
        labels.insert("version".to_string(), version.into());

        Self {
            id: id.into(),
            project: None,
            description: None,
            uniquifier: None,
            agent_version: None,
            labels,
            is_inactive: false,
            is_disabled: false,
            status: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Project id from the `projectid` label, falling back to `project`
    pub fn project_id(&self) -> Option<&str> {
        self.labels
            .get("projectid")
            .map(String::as_str)
            .or(self.project.as_deref())
    }

    /// Application version from the `version` label
    pub fn version(&self) -> Option<&str> {
        self.labels.get("version").map(String::as_str)
    }
}

/// Result of one (possibly long-polling) list call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBreakpointsResponse {
    #[serde(default)]
    pub breakpoints: Vec<Breakpoint>,
    /// Token to echo on the next call for a true long poll
    #[serde(default)]
    pub next_wait_token: String,
}

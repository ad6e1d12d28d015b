//! OpenMica IPC Protocol
//!
//! Shared types for daemon-CLI communication over Windows named pipes.
//!
//! The protocol is one JSON object per line: the client writes a single
//! [`IpcCommand`] line, the daemon answers with a single [`IpcResponse`] line
//! and closes the connection.

use openmica_core_rules::{BackdropPreference, Rule, RuleScope, TitlebarColorMode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named pipe path for IPC communication.
pub const PIPE_NAME: &str = r"\\.\pipe\openmica";

/// Upper bound on a single request line, in bytes.
pub const MAX_IPC_MESSAGE_SIZE: usize = 64 * 1024;

/// Errors encoding or decoding protocol lines.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message of {0} bytes exceeds the IPC size limit")]
    TooLarge(usize),

    #[error("Empty message")]
    Empty,
}

/// Commands that can be sent from the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Reload configuration from file.
    Reload,
    /// Switch to another config file and load it.
    SetConfigPath { path: String },
    /// Restyle every open window with the current rules.
    Reapply,
    /// Change the ambient titlebar default used by `system` rules.
    SetSystemTitlebar {
        /// New default; only `light` and `dark` are meaningful.
        mode: TitlebarColorMode,
    },
    /// List the active rules in resolution order.
    QueryRules,
    /// Report which rule would apply to a window, without styling it.
    MatchWindow {
        /// Window handle (HWND as integer).
        handle: u64,
    },
    /// Query daemon status.
    Status,
    /// Stop the daemon.
    Stop,
}

/// One rule as reported over IPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub name: String,
    /// True for the catch-all rule.
    pub global: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_process: Option<String>,
    pub titlebar_color: TitlebarColorMode,
    pub backdrop: BackdropPreference,
    pub extend_frame: bool,
}

impl From<&Rule> for RuleInfo {
    fn from(rule: &Rule) -> Self {
        let (global, match_class, match_title, match_process) = match &rule.scope {
            RuleScope::Global => (true, None, None, None),
            RuleScope::Scoped(matcher) => (
                false,
                matcher.class_pattern().map(str::to_string),
                matcher.title_pattern().map(str::to_string),
                matcher.process_name().map(str::to_string),
            ),
        };
        Self {
            name: rule.name.clone(),
            global,
            match_class,
            match_title,
            match_process,
            titlebar_color: rule.style.titlebar_color,
            backdrop: rule.style.backdrop,
            extend_frame: rule.style.extend_frame_into_client_area,
        }
    }
}

/// Responses from the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully.
    Ok,
    /// Command failed with an error.
    Error {
        /// Error message describing what went wrong.
        message: String,
    },
    /// Active rules, in resolution order.
    Rules { rules: Vec<RuleInfo> },
    /// Result of a match query.
    MatchResult {
        /// Name of the rule that would apply, if any.
        rule: Option<String>,
    },
    /// Daemon status.
    Status {
        /// Whether new windows are being styled.
        running: bool,
        /// Number of active rules, including the global rule.
        rule_count: usize,
        /// Whether the config file watcher is active.
        watching: bool,
        /// Config file in use, if any.
        config_path: Option<String>,
        /// Ambient titlebar default.
        system_titlebar: TitlebarColorMode,
    },
}

impl IpcResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Serialize a message as one newline-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, IpcError> {
    Ok(serde_json::to_string(message)? + "\n")
}

/// Parse one line received from the pipe.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, IpcError> {
    if line.len() > MAX_IPC_MESSAGE_SIZE {
        return Err(IpcError::TooLarge(line.len()));
    }
    let line = line.trim();
    if line.is_empty() {
        return Err(IpcError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

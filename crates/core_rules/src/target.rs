//! Window identity snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StyleError;
use crate::platform::WindowStyler;
use crate::rule::{BackdropPreference, TitlebarColorMode};

/// Opaque window handle.
/// On Windows, this is the HWND cast to u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Opaque identifier of the process instance that owns a window.
///
/// Two windows with the same `InstanceHandle` were created by the same
/// running program. The service compares it against its own instance to
/// avoid restyling its own UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceHandle(pub u64);

/// A read-only snapshot of one window's identity.
///
/// Built on demand from a live window right before a rule decision and
/// dropped right after; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetWindow {
    handle: WindowHandle,
    title: String,
    class_name: String,
    process_name: String,
    instance: InstanceHandle,
}

impl TargetWindow {
    /// Create a snapshot from already-queried window attributes.
    pub fn new(
        handle: WindowHandle,
        title: impl Into<String>,
        class_name: impl Into<String>,
        process_name: impl Into<String>,
        instance: InstanceHandle,
    ) -> Self {
        Self {
            handle,
            title: title.into(),
            class_name: class_name.into(),
            process_name: process_name.into(),
            instance,
        }
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Executable name of the owning process (e.g. "notepad.exe").
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }

    /// Push a titlebar color onto this window.
    pub fn apply_titlebar_color_rule(
        &self,
        styler: &dyn WindowStyler,
        mode: TitlebarColorMode,
        system_default: TitlebarColorMode,
    ) -> Result<(), StyleError> {
        styler.apply_titlebar_color(self.handle, mode, system_default)
    }

    /// Push a backdrop material onto this window.
    pub fn apply_backdrop_rule(
        &self,
        styler: &dyn WindowStyler,
        preference: BackdropPreference,
    ) -> Result<(), StyleError> {
        styler.apply_backdrop(self.handle, preference)
    }
}

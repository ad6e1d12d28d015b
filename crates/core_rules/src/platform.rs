//! Collaborator interfaces.
//!
//! The rule service never touches the operating system directly. Window
//! enumeration, window-open notifications, style mutations and the rule
//! configuration all come in through these traits.

use std::sync::Arc;

use crate::error::StyleError;
use crate::event::{Handler, SettingsChange, SubscriptionId, WindowOpened};
use crate::rule::{BackdropPreference, Rule, TitlebarColorMode};
use crate::target::{InstanceHandle, TargetWindow, WindowHandle};

/// Read access to the desktop's window tree.
pub trait Desktop: Send + Sync {
    /// The instance handle of the current process.
    fn current_instance(&self) -> InstanceHandle;

    /// Direct children of the desktop window, in OS enumeration order.
    fn top_level_windows(&self) -> Vec<WindowHandle>;

    fn is_visible(&self, handle: WindowHandle) -> bool;

    /// Whether the window is a legitimate styleable top-level window
    /// rather than a tool window, menu, tooltip and so on.
    fn is_valid_window(&self, handle: WindowHandle) -> bool;

    /// The instance that owns `handle`.
    fn instance_of(&self, handle: WindowHandle) -> Result<InstanceHandle, StyleError>;

    /// Take a snapshot of the window's identity.
    fn snapshot(&self, handle: WindowHandle) -> Result<TargetWindow, StyleError>;
}

/// Primitive operations that change how a window is drawn.
///
/// Implementations must be idempotent: applying the same value twice leaves
/// the window as applying it once.
pub trait WindowStyler: Send + Sync {
    /// Extend the window frame over the whole client area.
    fn extend_frame_into_client_area(&self, handle: WindowHandle) -> Result<(), StyleError>;

    /// Set the titlebar color. `system_default` resolves [`TitlebarColorMode::System`].
    fn apply_titlebar_color(
        &self,
        handle: WindowHandle,
        mode: TitlebarColorMode,
        system_default: TitlebarColorMode,
    ) -> Result<(), StyleError>;

    /// Set the backdrop material.
    fn apply_backdrop(
        &self,
        handle: WindowHandle,
        preference: BackdropPreference,
    ) -> Result<(), StyleError>;
}

/// Source of "window opened" notifications.
pub trait WindowEventSource: Send + Sync {
    /// Register a handler. Handlers run on the source's delivery thread.
    fn add_handler(&self, handler: Handler<WindowOpened>);

    /// Remove every registered handler.
    fn remove_all(&self);
}

/// Owner of the live rule collection.
pub trait SettingsProvider: Send + Sync {
    /// A consistent snapshot of the current rules, in configuration order.
    fn rules(&self) -> Arc<[Rule]>;

    /// Register for change notifications.
    fn subscribe(&self, listener: Handler<SettingsChange>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

//! OpenMica Platform Win32
//!
//! Windows implementation of the rule engine's collaborators.
//!
//! This crate handles:
//! - Top-level window enumeration and identity snapshots ([`Win32Desktop`])
//! - Titlebar color, backdrop and frame mutations via DWM ([`DwmStyler`])
//! - WinEvent hooks reporting newly shown windows ([`Win32EventSource`])
//!
//! On other platforms the types still exist so the workspace builds and the
//! daemon can report a clean error: enumeration is empty, every mutation
//! fails with `StyleError::Unsupported` and the hook refuses to start.

use thiserror::Error;

pub mod desktop;
pub mod dwm;
pub mod hook;

pub use desktop::Win32Desktop;
pub use dwm::DwmStyler;
pub use hook::Win32EventSource;

/// Errors that can occur while setting up the Win32 layer.
#[derive(Debug, Error)]
pub enum Win32Error {
    #[error("Failed to install event hook: {0}")]
    HookInstallFailed(String),

    #[error("Event hook thread exited unexpectedly")]
    HookThreadExited,

    #[error("Failed to spawn event hook thread: {0}")]
    ThreadSpawnFailed(#[from] std::io::Error),

    #[error("Win32 window management is not available on this platform")]
    Unsupported,
}

/// Converts a window handle into the `HWND` the Win32 APIs expect.
#[cfg(windows)]
pub(crate) fn hwnd(handle: openmica_core_rules::WindowHandle) -> windows::Win32::Foundation::HWND {
    windows::Win32::Foundation::HWND(handle.0 as usize as *mut _)
}

/// Converts an `HWND` back into the engine's opaque handle.
#[cfg(windows)]
pub(crate) fn window_handle(hwnd: windows::Win32::Foundation::HWND) -> openmica_core_rules::WindowHandle {
    openmica_core_rules::WindowHandle(hwnd.0 as usize as u64)
}

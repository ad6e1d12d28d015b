//! Window styling through the Desktop Window Manager.
//!
//! Titlebar color uses `DWMWA_USE_IMMERSIVE_DARK_MODE`, backdrop material uses
//! `DWMWA_SYSTEMBACKDROP_TYPE` (Windows 11 22H2 and later). Both writes are
//! idempotent, so restyling a window with the same rule is harmless.

use openmica_core_rules::{
    BackdropPreference, StyleError, Theme, TitlebarColorMode, WindowHandle, WindowStyler,
};
use tracing::trace;

/// `DWMWA_USE_IMMERSIVE_DARK_MODE`
pub const DWMWA_USE_IMMERSIVE_DARK_MODE: i32 = 20;

/// `DWMWA_SYSTEMBACKDROP_TYPE`
pub const DWMWA_SYSTEMBACKDROP_TYPE: i32 = 38;

/// `DWMSBT_*` value for a backdrop preference.
///
/// `None` means leave the attribute alone.
pub fn system_backdrop_type(preference: BackdropPreference) -> Option<i32> {
    match preference {
        BackdropPreference::Default => None,
        BackdropPreference::None => Some(1),
        BackdropPreference::Mica => Some(2),
        BackdropPreference::Acrylic => Some(3),
        BackdropPreference::Tabbed => Some(4),
    }
}

/// Value written to `DWMWA_USE_IMMERSIVE_DARK_MODE` for a theme.
pub fn immersive_dark_mode(theme: Theme) -> i32 {
    match theme {
        Theme::Light => 0,
        Theme::Dark => 1,
    }
}

/// [`WindowStyler`] that writes DWM window attributes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DwmStyler;

impl DwmStyler {
    pub fn new() -> Self {
        Self
    }
}

impl WindowStyler for DwmStyler {
    fn extend_frame_into_client_area(&self, handle: WindowHandle) -> Result<(), StyleError> {
        trace!("Extending frame of {}", handle);
        imp::extend_frame(handle)
    }

    fn apply_titlebar_color(
        &self,
        handle: WindowHandle,
        mode: TitlebarColorMode,
        system_default: TitlebarColorMode,
    ) -> Result<(), StyleError> {
        let Some(theme) = mode.effective(system_default) else {
            return Ok(());
        };
        trace!("Setting {:?} titlebar on {}", theme, handle);
        imp::set_attribute(
            handle,
            DWMWA_USE_IMMERSIVE_DARK_MODE,
            immersive_dark_mode(theme),
            "DwmSetWindowAttribute(DWMWA_USE_IMMERSIVE_DARK_MODE)",
        )
    }

    fn apply_backdrop(
        &self,
        handle: WindowHandle,
        preference: BackdropPreference,
    ) -> Result<(), StyleError> {
        let Some(value) = system_backdrop_type(preference) else {
            return Ok(());
        };
        trace!("Setting {:?} backdrop on {}", preference, handle);
        imp::set_attribute(
            handle,
            DWMWA_SYSTEMBACKDROP_TYPE,
            value,
            "DwmSetWindowAttribute(DWMWA_SYSTEMBACKDROP_TYPE)",
        )
    }
}

#[cfg(windows)]
mod imp {
    use windows::Win32::Graphics::Dwm::{
        DwmExtendFrameIntoClientArea, DwmSetWindowAttribute, DWMWINDOWATTRIBUTE,
    };
    use windows::Win32::UI::Controls::MARGINS;

    use super::*;
    use crate::hwnd;

    /// `HRESULT_FROM_WIN32(ERROR_INVALID_WINDOW_HANDLE)`
    const E_INVALID_WINDOW_HANDLE: i32 = 0x8007_0578_u32 as i32;

    pub(super) fn set_attribute(
        handle: WindowHandle,
        attribute: i32,
        value: i32,
        operation: &'static str,
    ) -> Result<(), StyleError> {
        // SAFETY: value lives across the call and the size matches its type.
        unsafe {
            DwmSetWindowAttribute(
                hwnd(handle),
                DWMWINDOWATTRIBUTE(attribute),
                &value as *const i32 as *const _,
                std::mem::size_of_val(&value) as u32,
            )
        }
        .map_err(|e| to_style_error(operation, handle, &e))
    }

    pub(super) fn extend_frame(handle: WindowHandle) -> Result<(), StyleError> {
        // Negative margins make the whole window "sheet of glass".
        let margins = MARGINS {
            cxLeftWidth: -1,
            cxRightWidth: -1,
            cyTopHeight: -1,
            cyBottomHeight: -1,
        };
        // SAFETY: margins lives across the call.
        unsafe { DwmExtendFrameIntoClientArea(hwnd(handle), &margins) }
            .map_err(|e| to_style_error("DwmExtendFrameIntoClientArea", handle, &e))
    }

    fn to_style_error(
        operation: &'static str,
        handle: WindowHandle,
        error: &windows::core::Error,
    ) -> StyleError {
        let code = error.code().0;
        if code == E_INVALID_WINDOW_HANDLE {
            StyleError::WindowGone(handle)
        } else {
            StyleError::Rejected {
                operation,
                handle,
                code,
            }
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub(super) fn set_attribute(
        _handle: WindowHandle,
        _attribute: i32,
        _value: i32,
        _operation: &'static str,
    ) -> Result<(), StyleError> {
        Err(StyleError::Unsupported("DwmSetWindowAttribute"))
    }

    pub(super) fn extend_frame(_handle: WindowHandle) -> Result<(), StyleError> {
        Err(StyleError::Unsupported("DwmExtendFrameIntoClientArea"))
    }
}

//! Desktop enumeration and window identity.
//!
//! Instance identity is the owning process id: two windows share an
//! [`InstanceHandle`] exactly when the same running program created them.

use openmica_core_rules::{Desktop, InstanceHandle, StyleError, TargetWindow, WindowHandle};

/// [`Desktop`] backed by the live Win32 window tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Desktop;

impl Win32Desktop {
    pub fn new() -> Self {
        Self
    }
}

/// Strips the directory part of an executable path.
///
/// Both separators are accepted since `K32GetModuleFileNameExW` can return
/// either form for some processes.
pub fn executable_name(path: &str) -> &str {
    path.rsplit(|c: char| c == '\\' || c == '/')
        .next()
        .unwrap_or(path)
}

#[cfg(windows)]
mod imp {
    use tracing::warn;
    use windows::core::BOOL;
    use windows::Win32::Foundation::{CloseHandle, HWND, LPARAM};
    use windows::Win32::System::ProcessStatus::K32GetModuleFileNameExW;
    use windows::Win32::System::Threading::{
        GetCurrentProcessId, OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowLongPtrW, GetWindowTextLengthW, GetWindowTextW,
        GetWindowThreadProcessId, IsWindowVisible, RealGetWindowClassW, GWL_EXSTYLE, GWL_STYLE,
        WS_CAPTION, WS_EX_TOOLWINDOW,
    };

    use super::*;
    use crate::{hwnd, window_handle};

    impl Desktop for Win32Desktop {
        fn current_instance(&self) -> InstanceHandle {
            // SAFETY: no preconditions.
            InstanceHandle(u64::from(unsafe { GetCurrentProcessId() }))
        }

        fn top_level_windows(&self) -> Vec<WindowHandle> {
            let mut handles: Vec<WindowHandle> = Vec::new();

            // SAFETY: EnumWindows runs synchronously, so the Vec passed
            // through LPARAM outlives every callback invocation.
            let result = unsafe {
                EnumWindows(
                    Some(enum_window_callback),
                    LPARAM(&mut handles as *mut _ as isize),
                )
            };
            if let Err(e) = result {
                warn!("EnumWindows failed after {} windows: {}", handles.len(), e);
            }
            handles
        }

        fn is_visible(&self, handle: WindowHandle) -> bool {
            // SAFETY: read-only query, tolerates stale handles.
            unsafe { IsWindowVisible(hwnd(handle)).as_bool() }
        }

        fn is_valid_window(&self, handle: WindowHandle) -> bool {
            let hwnd = hwnd(handle);

            // SAFETY: read-only style queries; stale handles read as 0.
            unsafe {
                let style = GetWindowLongPtrW(hwnd, GWL_STYLE) as u32;
                let ex_style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE) as u32;

                let has_caption = (style & WS_CAPTION.0) == WS_CAPTION.0;
                let is_tool = (ex_style & WS_EX_TOOLWINDOW.0) == WS_EX_TOOLWINDOW.0;

                has_caption && !is_tool
            }
        }

        fn instance_of(&self, handle: WindowHandle) -> Result<InstanceHandle, StyleError> {
            process_id(handle).map(|pid| InstanceHandle(u64::from(pid)))
        }

        fn snapshot(&self, handle: WindowHandle) -> Result<TargetWindow, StyleError> {
            let pid = process_id(handle)?;
            let hwnd = hwnd(handle);
            let process = exe_path(pid)
                .map(|path| executable_name(&path).to_string())
                .unwrap_or_default();

            Ok(TargetWindow::new(
                handle,
                window_title(hwnd),
                window_class(hwnd),
                process,
                InstanceHandle(u64::from(pid)),
            ))
        }
    }

    unsafe extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        // SAFETY: lparam is the Vec passed in by top_level_windows().
        let handles = unsafe { &mut *(lparam.0 as *mut Vec<WindowHandle>) };
        handles.push(window_handle(hwnd));
        BOOL(1) // Continue enumerating
    }

    fn process_id(handle: WindowHandle) -> Result<u32, StyleError> {
        let mut pid: u32 = 0;
        // SAFETY: pid is a valid out pointer for the duration of the call.
        let thread = unsafe { GetWindowThreadProcessId(hwnd(handle), Some(&mut pid)) };
        if thread == 0 || pid == 0 {
            return Err(StyleError::WindowGone(handle));
        }
        Ok(pid)
    }

    fn window_title(hwnd: HWND) -> String {
        // SAFETY: the buffer is sized from GetWindowTextLengthW plus the
        // terminator; GetWindowTextW never writes past it.
        unsafe {
            let length = GetWindowTextLengthW(hwnd);
            if length <= 0 {
                return String::new();
            }
            let mut buffer = vec![0u16; (length + 1) as usize];
            let copied = GetWindowTextW(hwnd, &mut buffer);
            String::from_utf16_lossy(&buffer[..copied.max(0) as usize])
        }
    }

    fn window_class(hwnd: HWND) -> String {
        // 256 is the maximum class name length.
        let mut buffer = [0u16; 256];
        // SAFETY: RealGetWindowClassW writes at most buffer.len() units.
        let length = unsafe { RealGetWindowClassW(hwnd, &mut buffer) };
        String::from_utf16_lossy(&buffer[..length as usize])
    }

    fn exe_path(pid: u32) -> Option<String> {
        // SAFETY: the process handle is closed before returning.
        unsafe {
            let process =
                OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid).ok()?;
            let mut buffer = [0u16; 1024];
            let length = K32GetModuleFileNameExW(Some(process), None, &mut buffer);
            let _ = CloseHandle(process);
            if length == 0 {
                return None;
            }
            String::from_utf16(&buffer[..length as usize]).ok()
        }
    }
}

#[cfg(not(windows))]
impl Desktop for Win32Desktop {
    fn current_instance(&self) -> InstanceHandle {
        InstanceHandle(u64::from(std::process::id()))
    }

    fn top_level_windows(&self) -> Vec<WindowHandle> {
        Vec::new()
    }

    fn is_visible(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn is_valid_window(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn instance_of(&self, handle: WindowHandle) -> Result<InstanceHandle, StyleError> {
        Err(StyleError::WindowGone(handle))
    }

    fn snapshot(&self, handle: WindowHandle) -> Result<TargetWindow, StyleError> {
        Err(StyleError::WindowGone(handle))
    }
}

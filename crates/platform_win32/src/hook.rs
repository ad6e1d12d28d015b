//! WinEvent hook reporting newly shown top-level windows.
//!
//! The hook lives on a dedicated thread running a Win32 message pump; the OS
//! delivers `EVENT_OBJECT_SHOW` there and registered handlers run on that
//! thread. Handlers are expected to hand work off and return quickly.

use std::sync::{Arc, Mutex, PoisonError};

use openmica_core_rules::{Handler, Listeners, WindowEventSource, WindowOpened};
use tracing::{debug, info};

use crate::Win32Error;

/// Object id for the window itself rather than a child element.
const OBJID_WINDOW: i32 = 0;

/// Child id for the object itself.
const CHILDID_SELF: i32 = 0;

/// Whether a raw WinEvent means "a window appeared".
///
/// Only show events on the window object count; scrollbars, carets and
/// other child objects fire the same event with a different object id.
pub fn is_window_opened(event: u32, id_object: i32, id_child: i32) -> bool {
    const EVENT_OBJECT_SHOW: u32 = 0x8002;
    event == EVENT_OBJECT_SHOW && id_object == OBJID_WINDOW && id_child == CHILDID_SELF
}

/// Running hook thread.
#[derive(Debug)]
struct HookThread {
    thread_id: u32,
    handle: std::thread::JoinHandle<()>,
}

/// [`WindowEventSource`] fed by a system-wide WinEvent hook.
#[derive(Debug)]
pub struct Win32EventSource {
    listeners: Arc<Listeners<WindowOpened>>,
    thread: Mutex<Option<HookThread>>,
}

impl Win32EventSource {
    /// Install the hook on a new thread and wait until it is live.
    pub fn start() -> Result<Self, Win32Error> {
        let listeners = Arc::new(Listeners::new());
        let thread = imp::spawn_hook_thread(listeners.clone())?;
        info!("WinEvent hook installed");
        Ok(Self {
            listeners,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Remove the hook and join its thread. Safe to call more than once.
    pub fn stop(&self) {
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            imp::stop_hook_thread(thread);
            debug!("WinEvent hook removed");
        }
    }
}

impl WindowEventSource for Win32EventSource {
    fn add_handler(&self, handler: Handler<WindowOpened>) {
        self.listeners.add(handler);
    }

    fn remove_all(&self) {
        self.listeners.clear();
    }
}

impl Drop for Win32EventSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(windows)]
mod imp {
    use std::cell::RefCell;
    use std::sync::mpsc;
    use std::sync::Arc;

    use openmica_core_rules::{Listeners, WindowOpened};
    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetAncestor, GetMessageW, PostThreadMessageW, TranslateMessage,
        EVENT_OBJECT_SHOW, GA_ROOT, MSG, WINEVENT_OUTOFCONTEXT, WINEVENT_SKIPOWNPROCESS, WM_QUIT,
    };

    use super::{is_window_opened, HookThread};
    use crate::{window_handle, Win32Error};

    thread_local! {
        static LISTENERS: RefCell<Option<Arc<Listeners<WindowOpened>>>> =
            const { RefCell::new(None) };
    }

    pub(super) fn spawn_hook_thread(
        listeners: Arc<Listeners<WindowOpened>>,
    ) -> Result<HookThread, Win32Error> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, String>>();

        let handle = std::thread::Builder::new()
            .name("openmica-winevent".to_string())
            .spawn(move || {
                LISTENERS.with(|cell| *cell.borrow_mut() = Some(listeners));

                // SAFETY: no preconditions.
                let thread_id = unsafe { GetCurrentThreadId() };

                // SAFETY: out-of-context hooks call back on this thread from
                // inside GetMessageW, which the pump below keeps running.
                let hook = unsafe {
                    SetWinEventHook(
                        EVENT_OBJECT_SHOW,
                        EVENT_OBJECT_SHOW,
                        None,
                        Some(win_event_proc),
                        0,
                        0,
                        WINEVENT_OUTOFCONTEXT | WINEVENT_SKIPOWNPROCESS,
                    )
                };
                if hook.is_invalid() {
                    let _ = ready_tx.send(Err("SetWinEventHook returned null".to_string()));
                    return;
                }

                let _ = ready_tx.send(Ok(thread_id));
                run_message_pump();

                // SAFETY: hook was returned by SetWinEventHook on this thread.
                unsafe {
                    let _ = UnhookWinEvent(hook);
                }
                LISTENERS.with(|cell| cell.borrow_mut().take());
            })?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => Ok(HookThread { thread_id, handle }),
            Ok(Err(message)) => {
                let _ = handle.join();
                Err(Win32Error::HookInstallFailed(message))
            }
            Err(_) => {
                let _ = handle.join();
                Err(Win32Error::HookThreadExited)
            }
        }
    }

    pub(super) fn stop_hook_thread(thread: HookThread) {
        // SAFETY: posting to a thread id is harmless even if it already exited.
        unsafe {
            let _ = PostThreadMessageW(thread.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        if thread.handle.join().is_err() {
            tracing::warn!("WinEvent hook thread panicked");
        }
    }

    /// Blocks until WM_QUIT.
    fn run_message_pump() {
        let mut msg = MSG::default();
        // SAFETY: msg is a valid out pointer for every call.
        while unsafe { GetMessageW(&mut msg, None, 0, 0).as_bool() } {
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    unsafe extern "system" fn win_event_proc(
        _hook: HWINEVENTHOOK,
        event: u32,
        hwnd: HWND,
        id_object: i32,
        id_child: i32,
        _event_thread: u32,
        _event_time: u32,
    ) {
        if hwnd.is_invalid() || !is_window_opened(event, id_object, id_child) {
            return;
        }

        // Child windows fire show events too; only top-level windows count.
        // SAFETY: read-only query, tolerates stale handles.
        if unsafe { GetAncestor(hwnd, GA_ROOT) } != hwnd {
            return;
        }

        let listeners = LISTENERS.with(|cell| cell.borrow().clone());
        if let Some(listeners) = listeners {
            listeners.emit(&WindowOpened {
                handle: window_handle(hwnd),
            });
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use std::sync::Arc;

    use openmica_core_rules::{Listeners, WindowOpened};

    use super::HookThread;
    use crate::Win32Error;

    pub(super) fn spawn_hook_thread(
        _listeners: Arc<Listeners<WindowOpened>>,
    ) -> Result<HookThread, Win32Error> {
        Err(Win32Error::Unsupported)
    }

    pub(super) fn stop_hook_thread(thread: HookThread) {
        let _ = thread.thread_id;
        let _ = thread.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_event_on_window_object_counts() {
        assert!(is_window_opened(0x8002, OBJID_WINDOW, CHILDID_SELF));
    }

    #[test]
    fn test_other_events_and_objects_are_ignored() {
        // EVENT_OBJECT_HIDE
        assert!(!is_window_opened(0x8003, OBJID_WINDOW, CHILDID_SELF));
        // OBJID_VSCROLL
        assert!(!is_window_opened(0x8002, -5, CHILDID_SELF));
        // Child element of the window
        assert!(!is_window_opened(0x8002, OBJID_WINDOW, 3));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_start_is_unsupported_off_windows() {
        assert!(matches!(
            Win32EventSource::start(),
            Err(Win32Error::Unsupported)
        ));
    }
}

//! Fake collaborators for driving the rule service in tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use openmica_core_rules::{
    BackdropPreference, Desktop, Handler, InstanceHandle, Listeners, RuleService, RuleStore,
    ServiceParts, StyleError, TargetWindow, Theme, TitlebarColorMode, WindowEventSource,
    WindowHandle, WindowOpened, WindowStyler,
};

/// Instance handle the fake desktop reports for "this process".
pub const OWN_INSTANCE: InstanceHandle = InstanceHandle(1);
/// Instance handle used for windows of other processes.
pub const OTHER_INSTANCE: InstanceHandle = InstanceHandle(2);

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub handle: WindowHandle,
    pub title: String,
    pub class: String,
    pub process: String,
    pub instance: InstanceHandle,
    pub visible: bool,
    pub valid: bool,
}

impl FakeWindow {
    pub fn new(handle: u64, class: &str) -> Self {
        Self {
            handle: WindowHandle(handle),
            title: format!("Window {}", handle),
            class: class.to_string(),
            process: "app.exe".to_string(),
            instance: OTHER_INSTANCE,
            visible: true,
            valid: true,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn process(mut self, process: &str) -> Self {
        self.process = process.to_string();
        self
    }

    pub fn owned_by(mut self, instance: InstanceHandle) -> Self {
        self.instance = instance;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }
}

/// A scripted desktop.
#[derive(Default)]
pub struct FakeDesktop {
    windows: Mutex<Vec<FakeWindow>>,
    scans: AtomicUsize,
    snapshots: Mutex<Vec<WindowHandle>>,
}

impl FakeDesktop {
    pub fn with_windows(windows: Vec<FakeWindow>) -> Self {
        Self {
            windows: Mutex::new(windows),
            ..Default::default()
        }
    }

    pub fn add(&self, window: FakeWindow) {
        self.windows.lock().unwrap().push(window);
    }

    /// Number of full enumerations performed.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Handles that were snapshotted, in order.
    pub fn snapshotted(&self) -> Vec<WindowHandle> {
        self.snapshots.lock().unwrap().clone()
    }

    fn find(&self, handle: WindowHandle) -> Option<FakeWindow> {
        self.windows
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.handle == handle)
            .cloned()
    }
}

impl Desktop for FakeDesktop {
    fn current_instance(&self) -> InstanceHandle {
        OWN_INSTANCE
    }

    fn top_level_windows(&self) -> Vec<WindowHandle> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().unwrap().iter().map(|w| w.handle).collect()
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        self.find(handle).map(|w| w.visible).unwrap_or(false)
    }

    fn is_valid_window(&self, handle: WindowHandle) -> bool {
        self.find(handle).map(|w| w.valid).unwrap_or(false)
    }

    fn instance_of(&self, handle: WindowHandle) -> Result<InstanceHandle, StyleError> {
        self.find(handle)
            .map(|w| w.instance)
            .ok_or(StyleError::WindowGone(handle))
    }

    fn snapshot(&self, handle: WindowHandle) -> Result<TargetWindow, StyleError> {
        self.snapshots.lock().unwrap().push(handle);
        let w = self.find(handle).ok_or(StyleError::WindowGone(handle))?;
        Ok(TargetWindow::new(w.handle, w.title, w.class, w.process, w.instance))
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleCall {
    ExtendFrame(WindowHandle),
    Titlebar(WindowHandle, TitlebarColorMode, TitlebarColorMode),
    Backdrop(WindowHandle, BackdropPreference),
}

/// Final visual state of one window as the styler left it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisualState {
    pub frame_extended: bool,
    pub theme: Option<Theme>,
    pub backdrop: Option<BackdropPreference>,
}

/// Records every mutation and can be told to fail or panic for a window.
#[derive(Default)]
pub struct RecordingStyler {
    calls: Mutex<Vec<StyleCall>>,
    state: Mutex<HashMap<WindowHandle, VisualState>>,
    failing: Mutex<HashSet<WindowHandle>>,
    panicking: Mutex<HashSet<WindowHandle>>,
}

impl RecordingStyler {
    pub fn fail_for(&self, handle: WindowHandle) {
        self.failing.lock().unwrap().insert(handle);
    }

    pub fn panic_for(&self, handle: WindowHandle) {
        self.panicking.lock().unwrap().insert(handle);
    }

    pub fn calls(&self) -> Vec<StyleCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, handle: WindowHandle) -> Vec<StyleCall> {
        self.calls()
            .into_iter()
            .filter(|c| match c {
                StyleCall::ExtendFrame(h) | StyleCall::Titlebar(h, _, _) | StyleCall::Backdrop(h, _) => {
                    *h == handle
                }
            })
            .collect()
    }

    pub fn backdrops_for(&self, handle: WindowHandle) -> Vec<BackdropPreference> {
        self.calls_for(handle)
            .into_iter()
            .filter_map(|c| match c {
                StyleCall::Backdrop(_, b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn state_of(&self, handle: WindowHandle) -> VisualState {
        self.state.lock().unwrap().get(&handle).copied().unwrap_or_default()
    }

    fn record(&self, handle: WindowHandle, call: StyleCall) -> Result<(), StyleError> {
        if self.panicking.lock().unwrap().contains(&handle) {
            panic!("styler exploded on {}", handle);
        }
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(&handle) {
            return Err(StyleError::WindowGone(handle));
        }
        Ok(())
    }
}

impl WindowStyler for RecordingStyler {
    fn extend_frame_into_client_area(&self, handle: WindowHandle) -> Result<(), StyleError> {
        self.record(handle, StyleCall::ExtendFrame(handle))?;
        self.state.lock().unwrap().entry(handle).or_default().frame_extended = true;
        Ok(())
    }

    fn apply_titlebar_color(
        &self,
        handle: WindowHandle,
        mode: TitlebarColorMode,
        system_default: TitlebarColorMode,
    ) -> Result<(), StyleError> {
        self.record(handle, StyleCall::Titlebar(handle, mode, system_default))?;
        if let Some(theme) = mode.effective(system_default) {
            self.state.lock().unwrap().entry(handle).or_default().theme = Some(theme);
        }
        Ok(())
    }

    fn apply_backdrop(
        &self,
        handle: WindowHandle,
        preference: BackdropPreference,
    ) -> Result<(), StyleError> {
        self.record(handle, StyleCall::Backdrop(handle, preference))?;
        if preference != BackdropPreference::Default {
            self.state.lock().unwrap().entry(handle).or_default().backdrop = Some(preference);
        }
        Ok(())
    }
}

/// Event source fired by hand from the test thread.
#[derive(Default)]
pub struct ManualEventSource {
    listeners: Listeners<WindowOpened>,
}

impl ManualEventSource {
    pub fn open(&self, handle: u64) {
        self.listeners.emit(&WindowOpened {
            handle: WindowHandle(handle),
        });
    }

    pub fn handler_count(&self) -> usize {
        self.listeners.len()
    }
}

impl WindowEventSource for ManualEventSource {
    fn add_handler(&self, handler: Handler<WindowOpened>) {
        self.listeners.add(handler);
    }

    fn remove_all(&self) {
        self.listeners.clear();
    }
}

/// A service wired to fakes, with handles to each fake.
pub struct Harness {
    pub desktop: Arc<FakeDesktop>,
    pub styler: Arc<RecordingStyler>,
    pub store: Arc<RuleStore>,
    pub events: Arc<ManualEventSource>,
    pub service: RuleService,
}

impl Harness {
    pub fn new(windows: Vec<FakeWindow>, rules: Vec<openmica_core_rules::Rule>) -> Self {
        Self::with_styler(windows, rules, RecordingStyler::default())
    }

    pub fn with_styler(
        windows: Vec<FakeWindow>,
        rules: Vec<openmica_core_rules::Rule>,
        styler: RecordingStyler,
    ) -> Self {
        let desktop = Arc::new(FakeDesktop::with_windows(windows));
        let styler = Arc::new(styler);
        let store = Arc::new(RuleStore::new(rules));
        let events = Arc::new(ManualEventSource::default());

        let service = RuleService::new(ServiceParts {
            desktop: desktop.clone(),
            styler: styler.clone(),
            settings: store.clone(),
            events: events.clone(),
            workers: 2,
        })
        .expect("spawn worker pool");

        Self {
            desktop,
            styler,
            store,
            events,
            service,
        }
    }

    pub fn settle(&self) {
        assert!(
            self.service.wait_idle(std::time::Duration::from_secs(5)),
            "background work did not finish"
        );
    }
}

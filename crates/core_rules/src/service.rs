//! The rule service.
//!
//! Responsibilities:
//! - React to new windows by resolving and applying their rule
//! - React to settings changes by restyling every open window
//! - Keep all of that work off the delivering thread via the worker pool
//! - Contain every failure at the single-window boundary

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::StyleError;
use crate::event::{SettingsChange, SubscriptionId, WindowOpened};
use crate::platform::{Desktop, SettingsProvider, WindowEventSource, WindowStyler};
use crate::pool::TaskPool;
use crate::resolve::resolve;
use crate::rule::{Rule, TitlebarColorMode};
use crate::target::{TargetWindow, WindowHandle};

/// Default number of background workers.
pub const DEFAULT_WORKERS: usize = 2;

/// Result of matching and applying a rule to one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The named rule was applied.
    Applied { rule: String },
    /// No rule applies; the window was left untouched.
    NoRule,
    /// Resolution or application failed; the window may be partially styled.
    Failed(String),
}

/// Tally of one full-desktop pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Top-level windows seen.
    pub visited: usize,
    /// Windows a rule was applied to.
    pub applied: usize,
    /// Windows no rule applies to.
    pub unmatched: usize,
    /// Windows whose styling failed.
    pub failed: usize,
    /// Invisible, invalid or own windows.
    pub skipped: usize,
}

/// Collaborators the service is wired to.
pub struct ServiceParts {
    pub desktop: Arc<dyn Desktop>,
    pub styler: Arc<dyn WindowStyler>,
    pub settings: Arc<dyn SettingsProvider>,
    pub events: Arc<dyn WindowEventSource>,
    /// Background worker count.
    pub workers: usize,
}

struct Inner {
    desktop: Arc<dyn Desktop>,
    styler: Arc<dyn WindowStyler>,
    settings: Arc<dyn SettingsProvider>,
    pool: TaskPool,
    system_titlebar: AtomicU8,
}

/// Matches windows against the live rule set and styles them.
///
/// Subscribes to the settings provider on construction and unsubscribes on
/// drop. `start_service` / `stop_service` control the window-opened
/// subscription.
pub struct RuleService {
    inner: Arc<Inner>,
    events: Arc<dyn WindowEventSource>,
    settings_subscription: SubscriptionId,
    running: AtomicBool,
}

impl RuleService {
    /// Wire up the service and subscribe to settings changes.
    pub fn new(parts: ServiceParts) -> std::io::Result<Self> {
        let pool = TaskPool::new("openmica-worker", parts.workers)?;
        let inner = Arc::new(Inner {
            desktop: parts.desktop,
            styler: parts.styler,
            settings: parts.settings,
            pool,
            system_titlebar: AtomicU8::new(TitlebarColorMode::Default.to_u8()),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let settings_subscription = inner.settings.subscribe(Arc::new(move |change: &SettingsChange| {
            if let Some(inner) = weak.upgrade() {
                inner.on_settings_changed(*change);
            }
        }));

        Ok(Self {
            inner,
            events: parts.events,
            settings_subscription,
            running: AtomicBool::new(false),
        })
    }

    /// Start reacting to newly opened windows.
    pub fn start_service(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Rule service already running");
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        self.events.add_handler(Arc::new(move |event: &WindowOpened| {
            if let Some(inner) = weak.upgrade() {
                inner.schedule_window_opened(event.handle);
            }
        }));
        info!("Rule service started");
    }

    /// Stop reacting to newly opened windows.
    ///
    /// Work already queued still runs to completion.
    pub fn stop_service(&self) {
        self.events.remove_all();
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Rule service stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The ambient titlebar mode used when a rule asks for the system default.
    pub fn system_titlebar_mode(&self) -> TitlebarColorMode {
        self.inner.system_titlebar()
    }

    pub fn set_system_titlebar_mode(&self, mode: TitlebarColorMode) {
        self.inner
            .system_titlebar
            .store(mode.to_u8(), Ordering::SeqCst);
    }

    /// Apply `rule` to `target` directly, skipping resolution.
    pub fn apply_rule_to_window(&self, target: &TargetWindow, rule: &Rule) -> Result<(), StyleError> {
        self.inner.apply_rule(target, rule)
    }

    /// Resolve the rule for `target` against the live rules and apply it.
    ///
    /// Never fails outward: errors and panics are reported as
    /// [`ApplyOutcome::Failed`].
    pub fn match_and_apply_rule_to_window(&self, target: &TargetWindow) -> ApplyOutcome {
        self.inner.match_and_apply(target)
    }

    /// Restyle every visible, valid top-level window not owned by this process.
    pub fn match_and_apply_rule_to_all_windows(&self) -> ScanReport {
        self.inner.scan_all()
    }

    /// Schedule a full-desktop pass on the worker pool.
    pub fn reapply_all(&self) -> bool {
        self.inner.schedule_scan()
    }

    /// Name of the rule that would apply to `handle`, without applying it.
    pub fn resolve_rule_name(&self, handle: WindowHandle) -> Result<Option<String>, StyleError> {
        let target = self.inner.desktop.snapshot(handle)?;
        let rules = self.inner.settings.rules();
        Ok(resolve(&target, rules.iter()).map(|rule| rule.name.clone()))
    }

    /// Block until queued background work has finished or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.inner.pool.wait_idle(timeout)
    }
}

impl Drop for RuleService {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop_service();
        }
        self.inner.settings.unsubscribe(self.settings_subscription);
    }
}

impl Inner {
    fn system_titlebar(&self) -> TitlebarColorMode {
        TitlebarColorMode::from_u8(self.system_titlebar.load(Ordering::SeqCst))
    }

    fn apply_rule(&self, target: &TargetWindow, rule: &Rule) -> Result<(), StyleError> {
        debug!(
            "Applying rule `{}` to `{}` ({}, {})",
            rule,
            target.title(),
            target.class_name(),
            target.process_name()
        );

        // Backdrop composition depends on the frame state, so extend it first.
        if rule.style.extend_frame_into_client_area {
            self.styler.extend_frame_into_client_area(target.handle())?;
        }

        target.apply_titlebar_color_rule(
            self.styler.as_ref(),
            rule.style.titlebar_color,
            self.system_titlebar(),
        )?;
        target.apply_backdrop_rule(self.styler.as_ref(), rule.style.backdrop)?;
        Ok(())
    }

    fn match_and_apply(&self, target: &TargetWindow) -> ApplyOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let rules = self.settings.rules();
            let Some(rule) = resolve(target, rules.iter()) else {
                return ApplyOutcome::NoRule;
            };
            match self.apply_rule(target, rule) {
                Ok(()) => ApplyOutcome::Applied {
                    rule: rule.name.clone(),
                },
                Err(e) => ApplyOutcome::Failed(e.to_string()),
            }
        }));

        let outcome = result
            .unwrap_or_else(|_| ApplyOutcome::Failed("panic while styling window".to_string()));
        if let ApplyOutcome::Failed(ref reason) = outcome {
            debug!("Failed to style window {}: {}", target.handle(), reason);
        }
        outcome
    }

    fn scan_all(&self) -> ScanReport {
        let own = self.desktop.current_instance();
        let mut report = ScanReport::default();

        for handle in self.desktop.top_level_windows() {
            report.visited += 1;

            if !self.desktop.is_visible(handle) || !self.desktop.is_valid_window(handle) {
                report.skipped += 1;
                continue;
            }

            match self.desktop.instance_of(handle) {
                Ok(instance) if instance == own => {
                    report.skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Skipping window {}: {}", handle, e);
                    report.failed += 1;
                    continue;
                }
            }

            let target = match self.desktop.snapshot(handle) {
                Ok(target) => target,
                Err(e) => {
                    debug!("Skipping window {}: {}", handle, e);
                    report.failed += 1;
                    continue;
                }
            };

            match self.match_and_apply(&target) {
                ApplyOutcome::Applied { .. } => report.applied += 1,
                ApplyOutcome::NoRule => report.unmatched += 1,
                ApplyOutcome::Failed(_) => report.failed += 1,
            }
        }

        info!(
            "Restyled desktop: {} visited, {} applied, {} unmatched, {} failed, {} skipped",
            report.visited, report.applied, report.unmatched, report.failed, report.skipped
        );
        report
    }

    fn on_window_opened(&self, handle: WindowHandle) -> Option<ApplyOutcome> {
        match self.desktop.instance_of(handle) {
            Ok(instance) if instance == self.desktop.current_instance() => return None,
            Ok(_) => {}
            Err(e) => {
                debug!("Ignoring opened window {}: {}", handle, e);
                return None;
            }
        }

        let target = match self.desktop.snapshot(handle) {
            Ok(target) => target,
            Err(e) => {
                debug!("Ignoring opened window {}: {}", handle, e);
                return None;
            }
        };

        let outcome = self.match_and_apply(&target);
        if let ApplyOutcome::Applied { ref rule } = outcome {
            debug!("Styled new window `{}` with rule `{}`", target.title(), rule);
        }
        Some(outcome)
    }

    fn schedule_window_opened(self: &Arc<Self>, handle: WindowHandle) {
        let inner = self.clone();
        if !self.pool.submit(move || {
            inner.on_window_opened(handle);
        }) {
            warn!("Dropped window-opened event for {}", handle);
        }
    }

    fn on_settings_changed(self: &Arc<Self>, change: SettingsChange) {
        if !change.affects_rules() {
            debug!("Settings change {:?} does not affect rules", change);
            return;
        }
        debug!("Settings change {:?}, restyling all windows", change);
        self.schedule_scan();
    }

    fn schedule_scan(self: &Arc<Self>) -> bool {
        let inner = self.clone();
        self.pool.submit(move || {
            inner.scan_all();
        })
    }
}

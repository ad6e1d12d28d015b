//! OpenMica Core Rules
//!
//! Platform-agnostic rule engine that styles top-level windows.
//!
//! This crate implements:
//! - Window snapshots (`TargetWindow`) and styling rules (`Rule`)
//! - Rule resolution: scoped rules win over the global catch-all,
//!   ties go to the first listed rule
//! - `RuleService`, which reacts to new windows and settings changes and
//!   pushes the resolved style onto each window from a background worker pool
//!
//! The operating system sits behind the traits in [`platform`], so the whole
//! engine can be driven by fakes in tests.

pub mod error;
pub mod event;
pub mod platform;
pub mod pool;
pub mod resolve;
pub mod rule;
pub mod service;
pub mod store;
pub mod target;

pub use error::{RuleError, StyleError};
pub use event::{Handler, Listeners, SettingsChange, SubscriptionId, WindowOpened};
pub use platform::{Desktop, SettingsProvider, WindowEventSource, WindowStyler};
pub use pool::TaskPool;
pub use resolve::resolve;
pub use rule::{
    BackdropPreference, Rule, RuleScope, RuleStyle, Theme, TitlebarColorMode, WindowMatcher,
};
pub use service::{ApplyOutcome, RuleService, ScanReport, ServiceParts, DEFAULT_WORKERS};
pub use store::RuleStore;
pub use target::{InstanceHandle, TargetWindow, WindowHandle};

//! Styling rules.
//!
//! A [`Rule`] pairs a scope (who it applies to) with a [`RuleStyle`] (what to
//! do to matching windows). The global rule is the catch-all and applies to
//! every window; scoped rules test the window's class, title and process.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::target::TargetWindow;

/// Light or dark titlebar, after all deferrals are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
}

/// Desired titlebar color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitlebarColorMode {
    /// Leave the titlebar as the application drew it.
    #[default]
    Default,
    /// Follow the system default passed in at application time.
    System,
    /// Force a light titlebar.
    Light,
    /// Force a dark titlebar.
    Dark,
}

impl TitlebarColorMode {
    /// Resolve this mode against the ambient system default.
    ///
    /// Returns `None` when the titlebar should be left untouched. A system
    /// default that is itself `System` or `Default` cannot be resolved and
    /// also yields `None`.
    pub fn effective(self, system_default: TitlebarColorMode) -> Option<Theme> {
        match self {
            Self::Default => None,
            Self::Light => Some(Theme::Light),
            Self::Dark => Some(Theme::Dark),
            Self::System => match system_default {
                Self::Light => Some(Theme::Light),
                Self::Dark => Some(Theme::Dark),
                Self::System | Self::Default => None,
            },
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::System => 1,
            Self::Light => 2,
            Self::Dark => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::System,
            2 => Self::Light,
            3 => Self::Dark,
            _ => Self::Default,
        }
    }
}

/// Desired backdrop material behind the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackdropPreference {
    /// Leave the backdrop as the application set it.
    #[default]
    Default,
    /// Explicitly disable any system backdrop.
    None,
    /// Mica, the opaque wallpaper-tinted material.
    Mica,
    /// Acrylic, the translucent blurred material.
    Acrylic,
    /// Tabbed Mica variant used by tabbed windows.
    Tabbed,
}

/// The visual state a rule pushes onto matching windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStyle {
    pub titlebar_color: TitlebarColorMode,
    pub backdrop: BackdropPreference,
    pub extend_frame_into_client_area: bool,
}

/// Compiled match criteria for a scoped rule.
///
/// Class and title are regular expressions, the process name is compared
/// case-insensitively. All specified criteria must match; a matcher with no
/// criteria cannot be built.
#[derive(Debug, Clone)]
pub struct WindowMatcher {
    class: Option<Regex>,
    title: Option<Regex>,
    process: Option<String>,
}

impl WindowMatcher {
    /// Compile match criteria.
    pub fn new(
        class: Option<&str>,
        title: Option<&str>,
        process: Option<&str>,
    ) -> Result<Self, RuleError> {
        Ok(Self {
            class: class.map(|p| compile("match_class", p)).transpose()?,
            title: title.map(|p| compile("match_title", p)).transpose()?,
            process: process.map(str::to_string),
        })
    }

    /// Match windows whose class name matches `pattern`.
    pub fn class(pattern: &str) -> Result<Self, RuleError> {
        Self::new(Some(pattern), None, None)
    }

    /// Match windows whose title matches `pattern`.
    pub fn title(pattern: &str) -> Result<Self, RuleError> {
        Self::new(None, Some(pattern), None)
    }

    /// Match windows owned by the executable `name`.
    pub fn process(name: &str) -> Self {
        Self {
            class: None,
            title: None,
            process: Some(name.to_string()),
        }
    }

    /// Whether at least one criterion is set.
    pub fn has_criteria(&self) -> bool {
        self.class.is_some() || self.title.is_some() || self.process.is_some()
    }

    pub fn class_pattern(&self) -> Option<&str> {
        self.class.as_ref().map(Regex::as_str)
    }

    pub fn title_pattern(&self) -> Option<&str> {
        self.title.as_ref().map(Regex::as_str)
    }

    pub fn process_name(&self) -> Option<&str> {
        self.process.as_deref()
    }

    /// Test the window against every specified criterion.
    pub fn matches(&self, target: &TargetWindow) -> bool {
        if !self.has_criteria() {
            return false;
        }

        if let Some(ref re) = self.class {
            if !re.is_match(target.class_name()) {
                return false;
            }
        }

        if let Some(ref re) = self.title {
            if !re.is_match(target.title()) {
                return false;
            }
        }

        if let Some(ref exe) = self.process {
            if !target.process_name().eq_ignore_ascii_case(exe) {
                return false;
            }
        }

        true
    }
}

fn compile(field: &'static str, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
        field,
        pattern: pattern.to_string(),
        source,
    })
}

/// Who a rule applies to.
#[derive(Debug, Clone)]
pub enum RuleScope {
    /// The catch-all; applies to every window.
    Global,
    /// Applies to windows accepted by the matcher.
    Scoped(WindowMatcher),
}

/// A styling rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub scope: RuleScope,
    pub style: RuleStyle,
}

impl Rule {
    /// Create the global catch-all rule.
    pub fn global(style: RuleStyle) -> Self {
        Self {
            name: "global".to_string(),
            scope: RuleScope::Global,
            style,
        }
    }

    /// Create a scoped rule.
    ///
    /// Fails if the matcher has no criteria, since such a rule could never
    /// apply to anything.
    pub fn scoped(
        name: impl Into<String>,
        matcher: WindowMatcher,
        style: RuleStyle,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        if !matcher.has_criteria() {
            return Err(RuleError::NoCriteria(name));
        }
        Ok(Self {
            name,
            scope: RuleScope::Scoped(matcher),
            style,
        })
    }

    /// Whether this is the global catch-all rule.
    pub fn is_catch_all(&self) -> bool {
        matches!(self.scope, RuleScope::Global)
    }

    /// Whether this rule applies to `target`. Always true for the global rule.
    pub fn is_applicable(&self, target: &TargetWindow) -> bool {
        match &self.scope {
            RuleScope::Global => true,
            RuleScope::Scoped(matcher) => matcher.matches(target),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            RuleScope::Global => write!(f, "{} (global)", self.name),
            RuleScope::Scoped(_) => write!(f, "{}", self.name),
        }
    }
}

//! Configuration management for OpenMica daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. `%APPDATA%/openmica/config.toml` (Windows standard)
//! 2. `~/.config/openmica/config.toml` (Unix-style, for WSL compatibility)
//! 3. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use openmica_core_rules::{
    BackdropPreference, Rule, RuleStyle, TitlebarColorMode, WindowMatcher,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Bounds for the config watcher poll interval.
const MIN_WATCH_INTERVAL_MS: u64 = 100;
const MAX_WATCH_INTERVAL_MS: u64 = 60_000;

/// Main configuration structure for OpenMica.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daemon behavior.
    pub general: GeneralConfig,
    /// Style applied to every window no scoped rule claims.
    pub global: GlobalRuleConfig,
    /// Scoped rules, in priority order.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Daemon-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Titlebar color used by rules set to `system` (light or dark).
    #[serde(default = "default_system_titlebar")]
    pub system_titlebar: TitlebarColorMode,

    /// Whether to reload automatically when the config file changes.
    #[serde(default = "default_true")]
    pub watch_config: bool,

    /// How often the config file is checked for changes, in milliseconds.
    #[serde(default = "default_watch_interval")]
    pub watch_interval_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            system_titlebar: default_system_titlebar(),
            watch_config: true,
            watch_interval_ms: default_watch_interval(),
        }
    }
}

impl GeneralConfig {
    /// The configured log level, falling back to `INFO` for unknown values.
    pub fn tracing_level(&self) -> Level {
        parse_log_level(&self.log_level).unwrap_or(Level::INFO)
    }
}

/// The global catch-all rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalRuleConfig {
    #[serde(default = "default_global_titlebar")]
    pub titlebar_color: TitlebarColorMode,

    #[serde(default = "default_global_backdrop")]
    pub backdrop: BackdropPreference,

    #[serde(default)]
    pub extend_frame: bool,
}

impl Default for GlobalRuleConfig {
    fn default() -> Self {
        Self {
            titlebar_color: default_global_titlebar(),
            backdrop: default_global_backdrop(),
            extend_frame: false,
        }
    }
}

impl GlobalRuleConfig {
    pub fn style(&self) -> RuleStyle {
        RuleStyle {
            titlebar_color: self.titlebar_color,
            backdrop: self.backdrop,
            extend_frame_into_client_area: self.extend_frame,
        }
    }
}

/// A scoped styling rule.
///
/// Scoped rules are evaluated in order; the first matching rule wins and
/// always beats the global rule.
///
/// # Example Config
///
/// ```toml
/// [[rules]]
/// name = "terminal"
/// match_process = "WindowsTerminal.exe"
/// backdrop = "acrylic"
/// extend_frame = true
///
/// [[rules]]
/// name = "dialogs"
/// match_class = "#32770"
/// backdrop = "none"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Display name, reported by `openmica-cli rules`.
    #[serde(default)]
    pub name: String,

    /// Regex pattern to match window class name.
    #[serde(default)]
    pub match_class: Option<String>,

    /// Regex pattern to match window title.
    #[serde(default)]
    pub match_title: Option<String>,

    /// Executable name to match (e.g., "notepad.exe"), case-insensitive.
    #[serde(default)]
    pub match_process: Option<String>,

    #[serde(default)]
    pub titlebar_color: TitlebarColorMode,

    #[serde(default)]
    pub backdrop: BackdropPreference,

    #[serde(default)]
    pub extend_frame: bool,
}

impl RuleConfig {
    pub fn style(&self) -> RuleStyle {
        RuleStyle {
            titlebar_color: self.titlebar_color,
            backdrop: self.backdrop,
            extend_frame_into_client_area: self.extend_frame,
        }
    }

    /// Compile into an engine rule.
    pub fn compile(&self) -> Result<Rule, openmica_core_rules::RuleError> {
        let matcher = WindowMatcher::new(
            self.match_class.as_deref(),
            self.match_title.as_deref(),
            self.match_process.as_deref(),
        )?;
        Rule::scoped(self.name.clone(), matcher, self.style())
    }
}

/// A configuration problem that was corrected or skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

impl ConfigWarning {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// Default value functions for serde
fn default_log_level() -> String {
    "info".to_string()
}

fn default_system_titlebar() -> TitlebarColorMode {
    TitlebarColorMode::Light
}

fn default_true() -> bool {
    true
}

fn default_watch_interval() -> u64 {
    1000
}

fn default_global_titlebar() -> TitlebarColorMode {
    TitlebarColorMode::System
}

fn default_global_backdrop() -> BackdropPreference {
    BackdropPreference::Mica
}

fn parse_log_level(value: &str) -> Option<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

impl Config {
    /// The first existing config file, if any.
    ///
    /// Tries the following locations in order:
    /// 1. `%APPDATA%/openmica/config.toml`
    /// 2. `~/.config/openmica/config.toml`
    /// 3. `./config.toml`
    pub fn locate() -> Option<PathBuf> {
        config_paths().into_iter().find(|path| path.exists())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Correct out-of-range values in place and report what was changed.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if parse_log_level(&self.general.log_level).is_none() {
            warnings.push(ConfigWarning::new(
                "general.log_level",
                format!("unknown level {:?}, using \"info\"", self.general.log_level),
            ));
            self.general.log_level = default_log_level();
        }

        if !matches!(
            self.general.system_titlebar,
            TitlebarColorMode::Light | TitlebarColorMode::Dark
        ) {
            warnings.push(ConfigWarning::new(
                "general.system_titlebar",
                "must be \"light\" or \"dark\", using \"light\"",
            ));
            self.general.system_titlebar = default_system_titlebar();
        }

        let interval = self
            .general
            .watch_interval_ms
            .clamp(MIN_WATCH_INTERVAL_MS, MAX_WATCH_INTERVAL_MS);
        if interval != self.general.watch_interval_ms {
            warnings.push(ConfigWarning::new(
                "general.watch_interval_ms",
                format!(
                    "{} is out of range, clamped to {}",
                    self.general.watch_interval_ms, interval
                ),
            ));
            self.general.watch_interval_ms = interval;
        }

        let mut seen = HashSet::new();
        for (index, rule) in self.rules.iter_mut().enumerate() {
            if rule.name.trim().is_empty() {
                rule.name = format!("rule-{}", index + 1);
                warnings.push(ConfigWarning::new(
                    format!("rules[{}].name", index),
                    format!("missing, named {:?}", rule.name),
                ));
            }
            if !seen.insert(rule.name.clone()) {
                warnings.push(ConfigWarning::new(
                    format!("rules[{}].name", index),
                    format!("duplicate name {:?}", rule.name),
                ));
            }
        }

        warnings
    }

    /// Build the engine rule list: the global rule first, then every scoped
    /// rule that compiles, in file order.
    pub fn compile_rules(&self) -> (Vec<Rule>, Vec<ConfigWarning>) {
        let mut rules = Vec::with_capacity(self.rules.len() + 1);
        let mut warnings = Vec::new();

        rules.push(Rule::global(self.global.style()));

        for (index, rule) in self.rules.iter().enumerate() {
            match rule.compile() {
                Ok(compiled) => rules.push(compiled),
                Err(e) => warnings.push(ConfigWarning::new(
                    format!("rules[{}]", index),
                    format!("skipped: {}", e),
                )),
            }
        }

        (rules, warnings)
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. Windows standard: %APPDATA%/openmica/config.toml
    if let Some(proj_dirs) = ProjectDirs::from("com", "openmica", "openmica") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    // 2. Unix-style: ~/.config/openmica/config.toml
    if let Some(home) = dirs_home() {
        paths.push(home.join(".config").join("openmica").join("config.toml"));
    }

    // 3. Current directory: ./config.toml
    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openmica_core_rules::{InstanceHandle, TargetWindow, WindowHandle};

    fn window(class: &str, title: &str, exe: &str) -> TargetWindow {
        TargetWindow::new(WindowHandle(1), title, class, exe, InstanceHandle(2))
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.system_titlebar, TitlebarColorMode::Light);
        assert!(config.general.watch_config);
        assert_eq!(config.general.watch_interval_ms, 1000);
        assert_eq!(config.global.titlebar_color, TitlebarColorMode::System);
        assert_eq!(config.global.backdrop, BackdropPreference::Mica);
        assert!(!config.global.extend_frame);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.general.log_level, config.general.log_level);
        assert_eq!(parsed.global.backdrop, config.global.backdrop);
    }

    #[test]
    fn test_config_partial_parse() {
        // Config with only some fields should use defaults for the rest
        let toml_str = r#"
            [global]
            backdrop = "acrylic"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.global.backdrop, BackdropPreference::Acrylic);
        assert_eq!(config.global.titlebar_color, TitlebarColorMode::System); // default
        assert_eq!(config.general.watch_interval_ms, 1000); // default
    }

    #[test]
    fn test_rule_config_parse() {
        let toml_str = r#"
            [[rules]]
            name = "notepad"
            match_class = "Notepad"
            titlebar_color = "dark"
            backdrop = "tabbed"
            extend_frame = true

            [[rules]]
            name = "terminal"
            match_process = "WindowsTerminal.exe"
            backdrop = "acrylic"

            [[rules]]
            name = "dialogs"
            match_title = ".*dialog.*"
            backdrop = "none"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rules.len(), 3);

        assert_eq!(config.rules[0].match_class, Some("Notepad".to_string()));
        assert_eq!(config.rules[0].titlebar_color, TitlebarColorMode::Dark);
        assert_eq!(config.rules[0].backdrop, BackdropPreference::Tabbed);
        assert!(config.rules[0].extend_frame);

        assert_eq!(
            config.rules[1].match_process,
            Some("WindowsTerminal.exe".to_string())
        );
        assert_eq!(config.rules[1].titlebar_color, TitlebarColorMode::Default);

        assert_eq!(config.rules[2].match_title, Some(".*dialog.*".to_string()));
        assert_eq!(config.rules[2].backdrop, BackdropPreference::None);
    }

    #[test]
    fn test_unknown_enum_value_is_a_parse_error() {
        let toml_str = r#"
            [global]
            backdrop = "frosted"
        "#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_compile_rules_puts_global_first() {
        let toml_str = r#"
            [[rules]]
            name = "a"
            match_class = "A"

            [[rules]]
            name = "b"
            match_class = "B"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let (rules, warnings) = config.compile_rules();

        assert!(warnings.is_empty());
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["global", "a", "b"]);
        assert!(rules[0].is_catch_all());
    }

    #[test]
    fn test_compile_rules_skips_invalid_rules() {
        let toml_str = r#"
            [[rules]]
            name = "broken-regex"
            match_class = "[unclosed"

            [[rules]]
            name = "no-criteria"
            backdrop = "mica"

            [[rules]]
            name = "ok"
            match_process = "notepad.exe"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let (rules, warnings) = config.compile_rules();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].name, "ok");
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].field, "rules[0]");
        assert_eq!(warnings[1].field, "rules[1]");
    }

    #[test]
    fn test_compiled_rules_match_windows() {
        let toml_str = r#"
            [[rules]]
            name = "devtools"
            match_class = "Chrome_WidgetWin_1"
            match_title = ".*DevTools.*"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let (rules, _) = config.compile_rules();
        let devtools = &rules[1];

        assert!(devtools.is_applicable(&window("Chrome_WidgetWin_1", "DevTools - x", "chrome.exe")));
        assert!(!devtools.is_applicable(&window("Chrome_WidgetWin_1", "Inbox", "chrome.exe")));
    }

    #[test]
    fn test_validate_clamps_watch_interval() {
        let mut config = Config::default();
        config.general.watch_interval_ms = 5;
        let warnings = config.validate();
        assert_eq!(config.general.watch_interval_ms, MIN_WATCH_INTERVAL_MS);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "general.watch_interval_ms");

        config.general.watch_interval_ms = 10_000_000;
        config.validate();
        assert_eq!(config.general.watch_interval_ms, MAX_WATCH_INTERVAL_MS);
    }

    #[test]
    fn test_validate_fixes_log_level_and_titlebar() {
        let mut config = Config::default();
        config.general.log_level = "verbose".to_string();
        config.general.system_titlebar = TitlebarColorMode::System;

        let warnings = config.validate();

        assert_eq!(warnings.len(), 2);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.system_titlebar, TitlebarColorMode::Light);
    }

    #[test]
    fn test_validate_names_rules() {
        let mut config = Config::default();
        config.rules.push(RuleConfig {
            match_class: Some("A".to_string()),
            ..Default::default()
        });
        config.rules.push(RuleConfig {
            name: "rule-1".to_string(),
            match_class: Some("B".to_string()),
            ..Default::default()
        });

        let warnings = config.validate();

        assert_eq!(config.rules[0].name, "rule-1");
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].message.contains("duplicate"));
    }

    #[test]
    fn test_valid_config_has_no_warnings() {
        let mut config = Config::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_tracing_level() {
        let mut general = GeneralConfig::default();
        assert_eq!(general.tracing_level(), Level::INFO);
        general.log_level = "DEBUG".to_string();
        assert_eq!(general.tracing_level(), Level::DEBUG);
        general.log_level = "nonsense".to_string();
        assert_eq!(general.tracing_level(), Level::INFO);
    }

    #[test]
    fn test_config_paths_not_empty() {
        let paths = config_paths();
        assert!(!paths.is_empty());
        assert_eq!(paths.last(), Some(&PathBuf::from("config.toml")));
    }

    #[test]
    fn test_load_from_path_reports_file() {
        let path = std::env::temp_dir().join("openmica_config_missing_test.toml");
        let _ = std::fs::remove_file(&path);
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

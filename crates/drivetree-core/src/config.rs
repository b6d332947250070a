//! YAML configuration for a sync session.
//!
//! Every section is optional in the file; missing keys take the values from
//! the `Default` impls below. [`Config::validate`] reports every problem at
//! once instead of stopping at the first.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::conflict::Resolution;
use crate::domain::newtypes::Href;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Top-level configuration for drivetree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub conflicts: ConflictsConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

/// Which local directory and remote folder are paired.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory mirrored by the resource tree root.
    pub root: PathBuf,
    /// Self-link of the remote folder mirrored by the root.
    pub remote_root: String,
}

/// How files changed on both sides are settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictsConfig {
    /// Strategy for files changed on both sides: `keep_remote`, `keep_local`,
    /// `keep_both`, or `manual`.
    pub default_strategy: String,
    /// Per-path overrides, first match wins.
    pub rules: Vec<ConflictRule>,
}

/// Path-scoped override of the default strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRule {
    /// Glob pattern matched against the path relative to the sync root
    /// (e.g., "**/*.docx", "Documents/**")
    pub pattern: String,
    /// Strategy name used for paths the pattern matches.
    pub strategy: String,
}

/// Transport adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Base URL that relative links are resolved against.
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

/// Tracing subscriber settings, read by [`crate::logging::init`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level emitted; one of [`LOG_LEVELS`].
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Reads and parses the YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Like [`Config::load`], but a missing or unreadable file yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Where the file lives when no path is given.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivetree/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivetree")
            .join("config.yaml")
    }

    /// The configured default conflict strategy, or `None` if it is not a
    /// known strategy name.
    pub fn default_resolution(&self) -> Option<Resolution> {
        Resolution::from_name(&self.conflicts.default_strategy)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("Drive"),
            remote_root: String::new(),
        }
    }
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            default_strategy: "keep_remote".to_string(),
            rules: Vec::new(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 60,
            user_agent: format!("drivetree/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"transport.timeout_secs"`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Accepted `logging.level` values.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    fn unknown(field: impl Into<String>, value: &str, accepted: &[&str]) -> Self {
        Self::new(field, format!("unknown value {value:?} (expected {})", accepted.join(" | ")))
    }
}

impl Config {
    /// Checks every section; an empty result means the config is usable.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // A leading `~` is expanded by the caller, so only absolute roots are checked.
        if !self.sync.root.starts_with("~") && !self.sync.root.is_dir() {
            errors.push(ValidationError::new(
                "sync.root",
                format!("not a directory: {}", self.sync.root.display()),
            ));
        }
        if let Err(e) = Href::new(self.sync.remote_root.clone()) {
            errors.push(ValidationError::new("sync.remote_root", e.to_string()));
        }

        if Resolution::from_name(&self.conflicts.default_strategy).is_none() {
            errors.push(ValidationError::unknown(
                "conflicts.default_strategy",
                &self.conflicts.default_strategy,
                Resolution::NAMES,
            ));
        }
        for (i, rule) in self.conflicts.rules.iter().enumerate() {
            if rule.pattern.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("conflicts.rules[{i}].pattern"),
                    "must not be empty",
                ));
            }
            if Resolution::from_name(&rule.strategy).is_none() {
                errors.push(ValidationError::unknown(
                    format!("conflicts.rules[{i}].strategy"),
                    &rule.strategy,
                    Resolution::NAMES,
                ));
            }
        }

        let transport = &self.transport;
        if transport.timeout_secs == 0 {
            errors.push(ValidationError::new("transport.timeout_secs", "must be at least 1"));
        }
        if let Some(base) = &transport.base_url {
            if url::Url::parse(base).map_or(true, |u| !matches!(u.scheme(), "http" | "https")) {
                errors.push(ValidationError::new(
                    "transport.base_url",
                    format!("not an http(s) URL: {base}"),
                ));
            }
        }
        if transport.user_agent.trim().is_empty() {
            errors.push(ValidationError::new("transport.user_agent", "must not be empty"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::unknown("logging.level", &self.logging.level, LOG_LEVELS));
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Config`] in code, starting from the defaults.
///
/// # Example
///
/// ```rust,no_run
/// use drivetree_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_root(PathBuf::from("/home/user/Drive"))
///     .sync_remote_root("https://drive.example.com/files/root")
///     .conflicts_default_strategy("keep_both")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn sync_remote_root(mut self, link: impl Into<String>) -> Self {
        self.config.sync.remote_root = link.into();
        self
    }

    // --- conflicts ---

    pub fn conflicts_default_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.config.conflicts.default_strategy = strategy.into();
        self
    }

    pub fn conflicts_rule(mut self, pattern: impl Into<String>, strategy: impl Into<String>) -> Self {
        self.config.conflicts.rules.push(ConflictRule {
            pattern: pattern.into(),
            strategy: strategy.into(),
        });
        self
    }

    // --- transport ---

    pub fn transport_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.transport.base_url = Some(url.into());
        self
    }

    pub fn transport_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.transport.timeout_secs = seconds;
        self
    }

    pub fn transport_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.transport.user_agent = agent.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    pub fn build(self) -> Config {
        self.config
    }

    /// Like [`ConfigBuilder::build`], but hands back the validation errors instead.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        match errors.is_empty() {
            true => Ok(self.config),
            false => Err(errors),
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

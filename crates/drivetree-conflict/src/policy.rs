//! Which side wins when a file changed on both sides
//!
//! Rules are globs over the path relative to the sync root; the first one
//! that matches decides.

use glob::{MatchOptions, Pattern};
use tracing::{debug, trace, warn};

use drivetree_core::config::{ConflictRule, ConflictsConfig};
use drivetree_core::domain::conflict::Resolution;

use crate::error::ConflictError;

/// `*` and `?` never cross a `/`, so `*.tmp` only matches at the top level.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Checks that a rule compiles without building an engine
pub fn validate_rule(rule: &ConflictRule) -> Result<(), ConflictError> {
    compile(rule).map(|_| ())
}

fn compile(rule: &ConflictRule) -> Result<(Pattern, Resolution), ConflictError> {
    let rejected = |reason: String| ConflictError::InvalidPattern {
        pattern: rule.pattern.clone(),
        reason,
    };
    let pattern = Pattern::new(&rule.pattern).map_err(|e| rejected(e.to_string()))?;
    let resolution = Resolution::from_name(&rule.strategy).ok_or_else(|| {
        rejected(format!(
            "unknown strategy {:?} (expected {})",
            rule.strategy,
            Resolution::NAMES.join(" | ")
        ))
    })?;
    Ok((pattern, resolution))
}

/// Path-ordered rules plus the strategy used when none match
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    rules: Vec<(Pattern, Resolution)>,
    fallback: Resolution,
}

impl PolicyEngine {
    /// Compiles `rules` in order behind a default strategy name
    ///
    /// Rules that fail to compile are dropped with a warning. An unknown
    /// default becomes [`Resolution::Manual`], which never overwrites either side.
    pub fn new(default_strategy: &str, rules: &[ConflictRule]) -> Self {
        let fallback = Resolution::from_name(default_strategy).unwrap_or_else(|| {
            warn!(strategy = %default_strategy, "unknown default conflict strategy, using manual");
            Resolution::Manual
        });

        let rules: Vec<_> = rules
            .iter()
            .filter_map(|rule| match compile(rule) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!(error = %e, "dropping conflict rule");
                    None
                }
            })
            .collect();

        debug!(rules = rules.len(), fallback = %fallback, "conflict policy ready");
        Self { rules, fallback }
    }

    /// Creates a PolicyEngine from the `conflicts` configuration section
    pub fn from_config(config: &ConflictsConfig) -> Self {
        Self::new(&config.default_strategy, &config.rules)
    }

    /// A policy with no rules that always answers `resolution`
    pub fn fixed(resolution: Resolution) -> Self {
        Self {
            rules: Vec::new(),
            fallback: resolution,
        }
    }

    /// Strategy for a path relative to the sync root
    pub fn evaluate(&self, relative_path: &str) -> Resolution {
        let hit = self
            .rules
            .iter()
            .find(|(pattern, _)| pattern.matches_with(relative_path, MATCH_OPTIONS));
        match hit {
            Some((pattern, resolution)) => {
                trace!(path = %relative_path, %pattern, %resolution, "conflict rule matched");
                *resolution
            }
            None => {
                trace!(path = %relative_path, fallback = %self.fallback, "no conflict rule matched");
                self.fallback
            }
        }
    }

    pub fn default_strategy(&self) -> Resolution {
        self.fallback
    }

    pub fn rules_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::from_config(&ConflictsConfig::default())
    }
}

//! Conflict resolution strategies
//!
//! A conflict exists when a file's content changed on both sides since the
//! last time the two sides agreed. The strategy applied to such a file is
//! chosen by configuration, never implicitly.

use serde::{Deserialize, Serialize};

/// How a both-sides-changed file should be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the local version, overwriting remote
    KeepLocal,
    /// Keep the remote version, overwriting local
    KeepRemote,
    /// Keep both versions (the local one is renamed with a conflict suffix)
    KeepBoth,
    /// Leave the file untouched until someone decides
    Manual,
}

impl Resolution {
    /// Every strategy name accepted in configuration
    pub const NAMES: &'static [&'static str] = &["keep_local", "keep_remote", "keep_both", "manual"];

    /// Parses a configuration strategy name
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "keep_local" => Some(Resolution::KeepLocal),
            "keep_remote" => Some(Resolution::KeepRemote),
            "keep_both" => Some(Resolution::KeepBoth),
            "manual" => Some(Resolution::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resolution::KeepLocal => "keep_local",
            Resolution::KeepRemote => "keep_remote",
            Resolution::KeepBoth => "keep_both",
            Resolution::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

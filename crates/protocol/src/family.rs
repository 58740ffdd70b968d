//! Record family classification
//!
//! Every record carries a `Family` tag derived from the basename of the file
//! it was read from. The five families mirror the file classes the Zabbix
//! real-time export writes: top-level `problems-*` and `history-*` files,
//! their per-worker subfiles, and anything else admitted by a custom include
//! pattern.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classification tag for an exported record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Family {
    Problems,
    History,
    MainProcess,
    TaskManager,
    Other,
}

impl Family {
    /// All families, in derivation priority order.
    pub const ALL: [Family; 5] = [
        Family::Problems,
        Family::History,
        Family::MainProcess,
        Family::TaskManager,
        Family::Other,
    ];

    /// Derive the family from a file basename, first match wins.
    ///
    /// Prefix rules are checked before substring rules, so a worker subfile
    /// like `problems-x-main-process-1.ndjson` reports as `problems`: the
    /// family reflects the event domain, not the worker pool that wrote it.
    pub fn from_basename(name: &str) -> Family {
        if name.starts_with("problems-") {
            Family::Problems
        } else if name.starts_with("history-") {
            Family::History
        } else if name.contains("main-process") {
            Family::MainProcess
        } else if name.contains("task-manager") {
            Family::TaskManager
        } else {
            Family::Other
        }
    }

    /// The lowercase wire name (`problems`, `main-process`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Problems => "problems",
            Family::History => "history",
            Family::MainProcess => "main-process",
            Family::TaskManager => "task-manager",
            Family::Other => "other",
        }
    }

    /// The SSE event name broadcast for this family.
    pub fn event_name(&self) -> &'static str {
        match self {
            Family::Problems => "zabbix.problems",
            Family::History => "zabbix.history",
            Family::MainProcess => "zabbix.main-process",
            Family::TaskManager => "zabbix.task-manager",
            Family::Other => "zabbix.other",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A family name outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown family: {0}")]
pub struct UnknownFamily(pub String);

impl FromStr for Family {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "problems" => Ok(Family::Problems),
            "history" => Ok(Family::History),
            "main-process" => Ok(Family::MainProcess),
            "task-manager" => Ok(Family::TaskManager),
            "other" => Ok(Family::Other),
            _ => Err(UnknownFamily(s.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "family_test.rs"]
mod tests;

//! Policy conflict records produced by static analysis.
//!
//! Conflicts are warnings, not errors. Compilation always succeeds and the
//! caller decides whether high-severity conflicts should block activation.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    Action,
    Priority,
    Category,
    Circular,
}

impl ConflictType {
    /// Fixed severity for each conflict class (0–100).
    pub fn severity(self) -> u8 {
        match self {
            ConflictType::Action => 70,
            ConflictType::Priority => 30,
            ConflictType::Category => 90,
            ConflictType::Circular => 100,
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictType::Action => "ACTION",
            ConflictType::Priority => "PRIORITY",
            ConflictType::Category => "CATEGORY",
            ConflictType::Circular => "CIRCULAR",
        };
        f.write_str(s)
    }
}

/// A detected conflict between two or more policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConflict {
    pub conflict_type: ConflictType,
    pub policies: Vec<String>,
    pub description: String,
    pub severity: u8,
    pub resolved: bool,
    pub winner: Option<String>,
    pub resolution: Option<String>,
}

impl PolicyConflict {
    /// A fresh, unresolved conflict with the class's fixed severity.
    pub fn new(
        conflict_type: ConflictType,
        policies: Vec<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            conflict_type,
            policies,
            description: description.into(),
            severity: conflict_type.severity(),
            resolved: false,
            winner: None,
            resolution: None,
        }
    }

    /// Record a resolution in place.
    pub fn resolve(&mut self, winner: Option<String>, resolution: impl Into<String>) {
        self.resolved = true;
        self.winner = winner;
        self.resolution = Some(resolution.into());
    }

    pub fn involves(&self, policy: &str) -> bool {
        self.policies.iter().any(|p| p == policy)
    }
}

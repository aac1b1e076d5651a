//! Governance categories and action types.
//!
//! Both vocabularies are closed. Their orderings are fixed tables: category
//! precedence drives stage order and category-conflict resolution, action
//! precedence drives action-conflict resolution and the final verdict.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The governance category every policy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernanceCategory {
    Safety,
    Privacy,
    Operational,
    Routing,
    Custom,
}

impl GovernanceCategory {
    /// Stage order: SAFETY first, CUSTOM last.
    pub const ALL: [GovernanceCategory; 5] = [
        GovernanceCategory::Safety,
        GovernanceCategory::Privacy,
        GovernanceCategory::Operational,
        GovernanceCategory::Routing,
        GovernanceCategory::Custom,
    ];

    /// Category precedence: SAFETY=5 down to CUSTOM=1.
    pub fn precedence(self) -> u8 {
        match self {
            GovernanceCategory::Safety => 5,
            GovernanceCategory::Privacy => 4,
            GovernanceCategory::Operational => 3,
            GovernanceCategory::Routing => 2,
            GovernanceCategory::Custom => 1,
        }
    }

    /// Resolve a category keyword. Matching is case-insensitive.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "SAFETY" => Some(GovernanceCategory::Safety),
            "PRIVACY" => Some(GovernanceCategory::Privacy),
            "OPERATIONAL" => Some(GovernanceCategory::Operational),
            "ROUTING" => Some(GovernanceCategory::Routing),
            "CUSTOM" => Some(GovernanceCategory::Custom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GovernanceCategory::Safety => "SAFETY",
            GovernanceCategory::Privacy => "PRIVACY",
            GovernanceCategory::Operational => "OPERATIONAL",
            GovernanceCategory::Routing => "ROUTING",
            GovernanceCategory::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for GovernanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action a policy emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Allow,
    Route,
    Escalate,
    Deny,
}

impl ActionType {
    /// Action precedence: deny > escalate > route > allow.
    pub fn precedence(self) -> u8 {
        match self {
            ActionType::Deny => 4,
            ActionType::Escalate => 3,
            ActionType::Route => 2,
            ActionType::Allow => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Allow => "allow",
            ActionType::Route => "route",
            ActionType::Escalate => "escalate",
            ActionType::Deny => "deny",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

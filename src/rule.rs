use serde::{Deserialize, Serialize};

/// Which write path a rule fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassKind {
    OnCreate,
    OnUpdate,
}

/// Ordered, user-owned container of rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleGroup {
    pub id: u64,
    pub user_id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 1-based position among the owner's groups. Dense, no gaps.
    pub order: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Soft-delete tombstone. Deleted rows are retained for audit and
    /// filtered out of every "active" query.
    #[serde(default)]
    pub deleted: bool,
}

/// One rule: an ordered trigger list, an ordered action list, and a
/// composition mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: u64,
    pub group_id: u64,
    /// 1-based position within the group. Dense, no gaps.
    pub order: u32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// `true` = AND composition (all triggers must match),
    /// `false` = OR composition (any trigger suffices).
    pub strict: bool,
    /// Once this rule has matched and run its actions, stop evaluating
    /// further rules in the same pass for the same transaction.
    #[serde(default)]
    pub stop_processing: bool,
    pub pass: PassKind,
    #[serde(default)]
    pub deleted: bool,
}

/// A named predicate instance with a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTrigger {
    pub id: u64,
    pub rule_id: u64,
    pub name: String,
    pub value: String,
    /// 1-based position within the rule. Dense, no gaps.
    pub order: u32,
    /// When this trigger yields a decisive outcome for the rule's
    /// composition mode, skip evaluating the remaining triggers.
    #[serde(default)]
    pub stop_processing: bool,
    #[serde(default)]
    pub deleted: bool,
}

/// A named mutator instance with a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    pub id: u64,
    pub rule_id: u64,
    pub name: String,
    pub value: String,
    /// 1-based position within the rule. Dense, no gaps.
    pub order: u32,
    /// After this action runs, skip the rule's remaining actions.
    #[serde(default)]
    pub stop_processing: bool,
    #[serde(default)]
    pub deleted: bool,
}

fn default_active() -> bool {
    true
}

impl RuleGroup {
    pub fn is_live(&self) -> bool {
        self.active && !self.deleted
    }
}

impl Rule {
    pub fn is_live(&self) -> bool {
        self.active && !self.deleted
    }

    pub fn fires_on(&self, pass: PassKind) -> bool {
        self.pass == pass
    }
}

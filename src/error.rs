use thiserror::Error;

/// Failures raised while compiling or running rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A stored trigger references a predicate name this engine does not
    /// implement. Usually a data-integrity problem after a feature was
    /// removed while rows referencing it survived.
    #[error("unknown trigger {0:?}")]
    UnknownTrigger(String),

    /// A stored action references a mutator name this engine does not
    /// implement.
    #[error("unknown action {0:?}")]
    UnknownAction(String),

    /// A trigger/action value cannot be interpreted for its named kind.
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    /// An action's underlying write could not be applied, e.g. the
    /// referenced budget no longer exists.
    #[error("mutation failed: {0}")]
    MutationFailed(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A collaborator (rule or journal store) failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl RuleError {
    pub(crate) fn invalid(name: &str, value: &str, reason: impl Into<String>) -> Self {
        RuleError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

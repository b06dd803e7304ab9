//! The mutator library: every action kind the engine can apply to a
//! journal, as one closed union. Like triggers, stored rows are compiled
//! by name up front so retired mutators surface as errors.
//!
//! Every action is idempotent: re-applying against an already-mutated
//! journal reports `applied = false` and changes nothing, which is what
//! makes at-least-once retries of retroactive jobs safe. A change is
//! persisted through the store before the action returns, so each action
//! either fully applies or reports failure.

use crate::error::RuleError;
use crate::journal::Journal;
use crate::store::LedgerStore;

/// What the executor should do after an action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// Keep going with the rule's remaining actions.
    Continue,
    /// Stop the rule's remaining actions.
    Rule,
    /// Stop the entire pass for this journal. Produced by the deleting
    /// action: the journal no longer exists for later reads.
    Pass,
}

#[derive(Debug, Clone, Copy)]
pub struct ActionOutcome {
    /// Whether the journal actually changed.
    pub applied: bool,
    pub halt: Halt,
}

/// A compiled mutator.
#[derive(Debug, Clone)]
pub enum Action {
    SetCategory(String),
    ClearCategory,
    SetBudget(String),
    ClearBudget,
    AddTag(String),
    RemoveTag(String),
    RemoveAllTags,
    SetDescription(String),
    AppendDescription(String),
    PrependDescription(String),
    SetNotes(String),
    AppendNotes(String),
    PrependNotes(String),
    ClearNotes,
    LinkToBill(String),
    MarkReconciled,
    ClearReconciled,
    /// Terminating: deletes the journal outright.
    DeleteTransaction,
}

impl Action {
    /// Compile a stored `name`/`value` pair into a typed action.
    pub fn compile(name: &str, value: &str) -> Result<Self, RuleError> {
        let arg = || -> Result<String, RuleError> {
            if value.trim().is_empty() {
                Err(RuleError::invalid(name, value, "empty action value"))
            } else {
                Ok(value.to_string())
            }
        };
        let action = match name {
            "set_category" => Action::SetCategory(arg()?),
            "clear_category" => Action::ClearCategory,
            "set_budget" => Action::SetBudget(arg()?),
            "clear_budget" => Action::ClearBudget,
            "add_tag" => Action::AddTag(arg()?),
            "remove_tag" => Action::RemoveTag(arg()?),
            "remove_all_tags" => Action::RemoveAllTags,
            "set_description" => Action::SetDescription(arg()?),
            "append_description" => Action::AppendDescription(arg()?),
            "prepend_description" => Action::PrependDescription(arg()?),
            "set_notes" => Action::SetNotes(arg()?),
            "append_notes" => Action::AppendNotes(arg()?),
            "prepend_notes" => Action::PrependNotes(arg()?),
            "clear_notes" => Action::ClearNotes,
            "link_to_bill" => Action::LinkToBill(arg()?),
            "mark_reconciled" => Action::MarkReconciled,
            "clear_reconciled" => Action::ClearReconciled,
            "delete_transaction" => Action::DeleteTransaction,
            other => return Err(RuleError::UnknownAction(other.to_string())),
        };
        Ok(action)
    }

    pub fn is_terminating(&self) -> bool {
        matches!(self, Action::DeleteTransaction)
    }

    /// Apply this mutator to one journal, persisting through the store.
    ///
    /// Referencing a budget or bill that no longer exists fails with
    /// [`RuleError::MutationFailed`].
    pub async fn apply(
        &self,
        journal: &mut Journal,
        store: &dyn LedgerStore,
    ) -> Result<ActionOutcome, RuleError> {
        if let Action::DeleteTransaction = self {
            store.delete_journal(journal.id).await?;
            return Ok(ActionOutcome {
                applied: true,
                halt: Halt::Pass,
            });
        }

        let applied = match self {
            Action::SetCategory(name) => set_opt(&mut journal.category, name),
            Action::ClearCategory => clear_opt(&mut journal.category),
            Action::SetBudget(name) => {
                if journal.budget.as_deref() == Some(name) {
                    false
                } else if !store.budget_exists(journal.user_id, name).await? {
                    return Err(RuleError::MutationFailed(format!(
                        "budget {name:?} does not exist"
                    )));
                } else {
                    journal.budget = Some(name.clone());
                    true
                }
            }
            Action::ClearBudget => clear_opt(&mut journal.budget),
            Action::AddTag(tag) => {
                if journal.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                    false
                } else {
                    journal.tags.push(tag.clone());
                    true
                }
            }
            Action::RemoveTag(tag) => {
                let before = journal.tags.len();
                journal.tags.retain(|t| !t.eq_ignore_ascii_case(tag));
                journal.tags.len() != before
            }
            Action::RemoveAllTags => {
                if journal.tags.is_empty() {
                    false
                } else {
                    journal.tags.clear();
                    true
                }
            }
            Action::SetDescription(text) => {
                if journal.description == *text {
                    false
                } else {
                    journal.description = text.clone();
                    true
                }
            }
            Action::AppendDescription(suffix) => {
                if journal.description.ends_with(suffix.as_str()) {
                    false
                } else {
                    journal.description.push_str(suffix);
                    true
                }
            }
            Action::PrependDescription(prefix) => {
                if journal.description.starts_with(prefix.as_str()) {
                    false
                } else {
                    journal.description.insert_str(0, prefix);
                    true
                }
            }
            Action::SetNotes(text) => set_opt(&mut journal.notes, text),
            Action::AppendNotes(suffix) => match &mut journal.notes {
                Some(notes) if notes.ends_with(suffix.as_str()) => false,
                Some(notes) => {
                    notes.push_str(suffix);
                    true
                }
                None => {
                    journal.notes = Some(suffix.clone());
                    true
                }
            },
            Action::PrependNotes(prefix) => match &mut journal.notes {
                Some(notes) if notes.starts_with(prefix.as_str()) => false,
                Some(notes) => {
                    notes.insert_str(0, prefix);
                    true
                }
                None => {
                    journal.notes = Some(prefix.clone());
                    true
                }
            },
            Action::ClearNotes => clear_opt(&mut journal.notes),
            Action::LinkToBill(name) => {
                if journal.bill.as_deref() == Some(name) {
                    false
                } else if !store.bill_exists(journal.user_id, name).await? {
                    return Err(RuleError::MutationFailed(format!(
                        "bill {name:?} does not exist"
                    )));
                } else {
                    journal.bill = Some(name.clone());
                    true
                }
            }
            Action::MarkReconciled => {
                if journal.reconciled {
                    false
                } else {
                    journal.reconciled = true;
                    true
                }
            }
            Action::ClearReconciled => {
                if journal.reconciled {
                    journal.reconciled = false;
                    true
                } else {
                    false
                }
            }
            Action::DeleteTransaction => unreachable!("handled above"),
        };

        if applied {
            store.save_journal(journal).await?;
        }
        Ok(ActionOutcome {
            applied,
            halt: Halt::Continue,
        })
    }
}

fn set_opt(slot: &mut Option<String>, value: &str) -> bool {
    if slot.as_deref() == Some(value) {
        false
    } else {
        *slot = Some(value.to_string());
        true
    }
}

fn clear_opt(slot: &mut Option<String>) -> bool {
    if slot.is_none() {
        false
    } else {
        *slot = None;
        true
    }
}

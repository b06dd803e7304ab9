//! Collaborator contracts. The engine consumes persistence only through
//! these traits and assumes nothing beyond them; [`MemoryStore`] is the
//! in-memory reference implementation used by tests and demos.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::journal::Journal;
use crate::rule::{Rule, RuleAction, RuleGroup, RuleTrigger};

/// Ordered access to a user's rule configuration.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Live groups for a user, in `order`.
    async fn active_groups(&self, user_id: u64) -> Result<Vec<RuleGroup>>;
    /// Live rules of a group, in `order`.
    async fn active_rules(&self, group_id: u64) -> Result<Vec<Rule>>;
    async fn rule(&self, rule_id: u64) -> Result<Option<Rule>>;
    async fn group(&self, group_id: u64) -> Result<Option<RuleGroup>>;
    /// Live triggers of a rule, in `order`.
    async fn triggers(&self, rule_id: u64) -> Result<Vec<RuleTrigger>>;
    /// Live actions of a rule, in `order`.
    async fn actions(&self, rule_id: u64) -> Result<Vec<RuleAction>>;

    /// Renumber a group's rules to the given sequence. The id set must be
    /// exactly the group's live rules; `order` comes out dense 1..N.
    async fn reorder_rules(&self, group_id: u64, ordered_ids: &[u64]) -> Result<()>;
    async fn reorder_triggers(&self, rule_id: u64, ordered_ids: &[u64]) -> Result<()>;
    async fn reorder_actions(&self, rule_id: u64, ordered_ids: &[u64]) -> Result<()>;

    /// Tombstone a rule (and its triggers/actions stay for audit).
    async fn soft_delete_rule(&self, rule_id: u64) -> Result<()>;
    async fn soft_delete_group(&self, group_id: u64) -> Result<()>;
}

/// Account/date bounds for a historical scan. `None` means unbounded.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub accounts: Option<Vec<u64>>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ScanFilter {
    fn admits(&self, journal: &Journal) -> bool {
        if let Some(accounts) = &self.accounts {
            if !accounts.contains(&journal.source.id)
                && !accounts.contains(&journal.destination.id)
            {
                return false;
            }
        }
        if let Some(start) = self.start {
            if journal.date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if journal.date > end {
                return false;
            }
        }
        true
    }
}

/// Paged, ordered access to a user's journals plus the writes the
/// mutator library needs.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn journal(&self, id: u64) -> Result<Option<Journal>>;
    /// One page of a user's journals, newest first (ties broken by id,
    /// descending), filtered by account set and date window.
    async fn journals_page(
        &self,
        user_id: u64,
        filter: &ScanFilter,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<Journal>>;
    async fn save_journal(&self, journal: &Journal) -> Result<()>;
    async fn delete_journal(&self, id: u64) -> Result<()>;
    async fn budget_exists(&self, user_id: u64, name: &str) -> Result<bool>;
    async fn bill_exists(&self, user_id: u64, name: &str) -> Result<bool>;
}

#[derive(Default)]
struct MemoryInner {
    groups: HashMap<u64, RuleGroup>,
    rules: HashMap<u64, Rule>,
    triggers: HashMap<u64, RuleTrigger>,
    actions: HashMap<u64, RuleAction>,
    journals: HashMap<u64, Journal>,
    budgets: HashSet<(u64, String)>,
    bills: HashSet<(u64, String)>,
}

/// In-memory implementation of both stores.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_group(&self, group: RuleGroup) {
        self.inner.write().unwrap().groups.insert(group.id, group);
    }

    pub fn insert_rule(&self, rule: Rule) {
        self.inner.write().unwrap().rules.insert(rule.id, rule);
    }

    pub fn insert_trigger(&self, trigger: RuleTrigger) {
        self.inner
            .write()
            .unwrap()
            .triggers
            .insert(trigger.id, trigger);
    }

    pub fn insert_action(&self, action: RuleAction) {
        self.inner.write().unwrap().actions.insert(action.id, action);
    }

    pub fn insert_journal(&self, journal: Journal) {
        self.inner
            .write()
            .unwrap()
            .journals
            .insert(journal.id, journal);
    }

    pub fn add_budget(&self, user_id: u64, name: &str) {
        self.inner
            .write()
            .unwrap()
            .budgets
            .insert((user_id, name.to_string()));
    }

    pub fn add_bill(&self, user_id: u64, name: &str) {
        self.inner
            .write()
            .unwrap()
            .bills
            .insert((user_id, name.to_string()));
    }

    pub fn journal_count(&self) -> usize {
        self.inner.read().unwrap().journals.len()
    }
}

fn renumber<T, F, G>(rows: &mut HashMap<u64, T>, ordered_ids: &[u64], live: F, mut set_order: G) -> Result<()>
where
    F: Fn(&T) -> bool,
    G: FnMut(&mut T, u32),
{
    let live_ids: HashSet<u64> = rows
        .iter()
        .filter(|(_, row)| live(row))
        .map(|(id, _)| *id)
        .collect();
    let given: HashSet<u64> = ordered_ids.iter().copied().collect();
    if live_ids != given || given.len() != ordered_ids.len() {
        bail!("reorder id set does not match the live rows");
    }
    for (position, id) in ordered_ids.iter().enumerate() {
        if let Some(row) = rows.get_mut(id) {
            set_order(row, position as u32 + 1);
        }
    }
    Ok(())
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn active_groups(&self, user_id: u64) -> Result<Vec<RuleGroup>> {
        let inner = self.inner.read().unwrap();
        let mut groups: Vec<RuleGroup> = inner
            .groups
            .values()
            .filter(|g| g.user_id == user_id && g.is_live())
            .cloned()
            .collect();
        groups.sort_by_key(|g| g.order);
        Ok(groups)
    }

    async fn active_rules(&self, group_id: u64) -> Result<Vec<Rule>> {
        let inner = self.inner.read().unwrap();
        let mut rules: Vec<Rule> = inner
            .rules
            .values()
            .filter(|r| r.group_id == group_id && r.is_live())
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.order);
        Ok(rules)
    }

    async fn rule(&self, rule_id: u64) -> Result<Option<Rule>> {
        Ok(self.inner.read().unwrap().rules.get(&rule_id).cloned())
    }

    async fn group(&self, group_id: u64) -> Result<Option<RuleGroup>> {
        Ok(self.inner.read().unwrap().groups.get(&group_id).cloned())
    }

    async fn triggers(&self, rule_id: u64) -> Result<Vec<RuleTrigger>> {
        let inner = self.inner.read().unwrap();
        let mut triggers: Vec<RuleTrigger> = inner
            .triggers
            .values()
            .filter(|t| t.rule_id == rule_id && !t.deleted)
            .cloned()
            .collect();
        triggers.sort_by_key(|t| t.order);
        Ok(triggers)
    }

    async fn actions(&self, rule_id: u64) -> Result<Vec<RuleAction>> {
        let inner = self.inner.read().unwrap();
        let mut actions: Vec<RuleAction> = inner
            .actions
            .values()
            .filter(|a| a.rule_id == rule_id && !a.deleted)
            .cloned()
            .collect();
        actions.sort_by_key(|a| a.order);
        Ok(actions)
    }

    async fn reorder_rules(&self, group_id: u64, ordered_ids: &[u64]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        renumber(
            &mut inner.rules,
            ordered_ids,
            |r| r.group_id == group_id && !r.deleted,
            |r, order| r.order = order,
        )
    }

    async fn reorder_triggers(&self, rule_id: u64, ordered_ids: &[u64]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        renumber(
            &mut inner.triggers,
            ordered_ids,
            |t| t.rule_id == rule_id && !t.deleted,
            |t, order| t.order = order,
        )
    }

    async fn reorder_actions(&self, rule_id: u64, ordered_ids: &[u64]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        renumber(
            &mut inner.actions,
            ordered_ids,
            |a| a.rule_id == rule_id && !a.deleted,
            |a, order| a.order = order,
        )
    }

    async fn soft_delete_rule(&self, rule_id: u64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.rules.get_mut(&rule_id) {
            Some(rule) => {
                rule.deleted = true;
                Ok(())
            }
            None => bail!("rule {rule_id} not found"),
        }
    }

    async fn soft_delete_group(&self, group_id: u64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.groups.get_mut(&group_id) {
            Some(group) => {
                group.deleted = true;
                Ok(())
            }
            None => bail!("rule group {group_id} not found"),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn journal(&self, id: u64) -> Result<Option<Journal>> {
        Ok(self.inner.read().unwrap().journals.get(&id).cloned())
    }

    async fn journals_page(
        &self,
        user_id: u64,
        filter: &ScanFilter,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<Journal>> {
        let inner = self.inner.read().unwrap();
        let mut journals: Vec<&Journal> = inner
            .journals
            .values()
            .filter(|j| j.user_id == user_id && filter.admits(j))
            .collect();
        // Newest first; id descending breaks date ties so paging is stable.
        journals.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(journals
            .into_iter()
            .skip(offset)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn save_journal(&self, journal: &Journal) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .journals
            .insert(journal.id, journal.clone());
        Ok(())
    }

    async fn delete_journal(&self, id: u64) -> Result<()> {
        self.inner.write().unwrap().journals.remove(&id);
        Ok(())
    }

    async fn budget_exists(&self, user_id: u64, name: &str) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .budgets
            .contains(&(user_id, name.to_string())))
    }

    async fn bill_exists(&self, user_id: u64, name: &str) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .bills
            .contains(&(user_id, name.to_string())))
    }
}

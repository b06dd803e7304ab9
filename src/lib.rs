//! # ledger_rules — rule engine for a personal-finance ledger
//!
//! User-defined rule groups hold ordered rules; each rule is an ordered
//! list of triggers (predicates over a transaction journal) and actions
//! (mutators of it). The engine runs a pass over every journal as it is
//! created or updated, and can replay rules over historical journals in
//! a bounded scan, either interactively (preview) or as a background job.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ledger_rules::config::EngineConfig;
//! use ledger_rules::store::MemoryStore;
//! use ledger_rules::RuleEngine;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = RuleEngine::new(store.clone(), store, EngineConfig::default());
//! let summary = engine.run_on_create(1).await?;
//! println!("{} rule(s) matched", summary.matched_count());
//! # Ok(())
//! # }
//! ```
//!
//! Persistence is the host's: the engine talks to it only through the
//! [`store::RuleStore`] and [`store::LedgerStore`] traits.

pub mod action;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod journal;
pub mod matcher;
pub mod metrics;
pub mod predicate;
pub mod rule;
pub mod runner;
pub mod store;

use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::action::Halt;
use crate::config::EngineConfig;
use crate::error::RuleError;
use crate::evaluator::CompiledRule;
use crate::journal::{Journal, MatchContext};
use crate::matcher::TransactionMatcher;
use crate::metrics::METRICS;
use crate::rule::{PassKind, Rule};
use crate::runner::{CancelFlag, JobTarget, RetroJob, RunReport};
use crate::store::{LedgerStore, RuleStore, ScanFilter};

/// What one rule did during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub rule_id: u64,
    pub rule_title: String,
    pub matched: bool,
    pub actions_applied: usize,
    pub actions_failed: usize,
    /// Compile or action failure that stopped this rule. Never aborts the
    /// rest of the pass.
    pub error: Option<String>,
}

impl RuleOutcome {
    fn failed(rule_id: u64, rule_title: &str, error: String) -> Self {
        Self {
            rule_id,
            rule_title: rule_title.to_string(),
            matched: false,
            actions_applied: 0,
            actions_failed: 0,
            error: Some(error),
        }
    }
}

/// Summary of one full pass over one journal.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub journal_id: u64,
    pub pass: PassKind,
    /// Rules whose triggers were actually evaluated this pass.
    pub rules_evaluated: usize,
    /// Matched rules and rules that failed, in execution order.
    pub outcomes: Vec<RuleOutcome>,
    /// A rule-level `stop_processing` or a deleting action ended the pass
    /// before all rules were seen.
    pub short_circuited: bool,
    pub journal_deleted: bool,
}

impl PassSummary {
    fn new(journal_id: u64, pass: PassKind) -> Self {
        Self {
            journal_id,
            pass,
            rules_evaluated: 0,
            outcomes: Vec::new(),
            short_circuited: false,
            journal_deleted: false,
        }
    }

    pub fn matched_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.matched).count()
    }

    pub fn actions_applied(&self) -> usize {
        self.outcomes.iter().map(|o| o.actions_applied).sum()
    }
}

#[derive(Default)]
struct ActionsRun {
    applied: usize,
    failed: usize,
    halted_pass: bool,
    error: Option<String>,
}

/// The executor: one pass over a journal against every active rule group
/// of its owner, in order.
pub struct RuleEngine {
    rules: Arc<dyn RuleStore>,
    ledger: Arc<dyn LedgerStore>,
    config: EngineConfig,
}

impl RuleEngine {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        ledger: Arc<dyn LedgerStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            rules,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A matcher sharing this engine's stores and page size.
    pub fn matcher(&self) -> TransactionMatcher {
        TransactionMatcher::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.ledger),
            self.config.scan_page_size,
        )
    }

    /// Run the on-create pass for a freshly stored journal.
    pub async fn run_on_create(&self, journal_id: u64) -> Result<PassSummary, RuleError> {
        self.run_pass(journal_id, PassKind::OnCreate).await
    }

    /// Run the on-update pass for a journal that was just edited.
    pub async fn run_on_update(&self, journal_id: u64) -> Result<PassSummary, RuleError> {
        self.run_pass(journal_id, PassKind::OnUpdate).await
    }

    async fn run_pass(&self, journal_id: u64, pass: PassKind) -> Result<PassSummary, RuleError> {
        let mut journal = self
            .ledger
            .journal(journal_id)
            .await?
            .ok_or_else(|| RuleError::NotFound(format!("journal {journal_id}")))?;

        METRICS.passes_total.fetch_add(1, Ordering::Relaxed);
        let mut summary = PassSummary::new(journal_id, pass);
        let groups = self.rules.active_groups(journal.user_id).await?;

        'pass: for group in groups {
            let rules = self.rules.active_rules(group.id).await?;
            for rule in rules.iter().filter(|r| r.fires_on(pass)) {
                let compiled = match self.load_compiled(rule).await {
                    Ok(compiled) => compiled,
                    Err(e) => {
                        // One broken rule must not disable the rest of the
                        // user's rule set.
                        warn!(rule_id = rule.id, error = %e, "skipping rule that failed to compile");
                        summary
                            .outcomes
                            .push(RuleOutcome::failed(rule.id, &rule.title, e.to_string()));
                        continue;
                    }
                };

                summary.rules_evaluated += 1;
                METRICS.rules_evaluated.fetch_add(1, Ordering::Relaxed);
                let eval = compiled.evaluate(&MatchContext::of(&journal));
                debug!(
                    rule_id = rule.id,
                    verdict = ?eval.verdict,
                    triggers_evaluated = eval.triggers_evaluated,
                    "rule evaluated"
                );
                if !eval.matched() {
                    continue;
                }

                METRICS.rules_matched.fetch_add(1, Ordering::Relaxed);
                let run = self.apply_actions(&compiled, &mut journal).await;
                summary.outcomes.push(RuleOutcome {
                    rule_id: rule.id,
                    rule_title: rule.title.clone(),
                    matched: true,
                    actions_applied: run.applied,
                    actions_failed: run.failed,
                    error: run.error,
                });

                if run.halted_pass {
                    info!(rule_id = rule.id, journal_id, "journal deleted, pass aborted");
                    summary.journal_deleted = true;
                    summary.short_circuited = true;
                    break 'pass;
                }
                if compiled.stop_processing {
                    summary.short_circuited = true;
                    break 'pass;
                }
            }
        }

        Ok(summary)
    }

    /// Replay one rule or one group over a date- and account-bounded
    /// slice of the user's history. Called by the job worker; also usable
    /// inline when the host wants to run a small window synchronously.
    pub async fn run_retroactive(
        &self,
        job: &RetroJob,
        cancel: &CancelFlag,
    ) -> Result<RunReport, RuleError> {
        let mut report = RunReport::default();
        let rules = self.resolve_target(job, &mut report).await?;
        if rules.is_empty() {
            return Ok(report);
        }

        let filter = ScanFilter {
            accounts: if job.account_ids.is_empty() {
                None
            } else {
                Some(job.account_ids.clone())
            },
            start: Some(job.start),
            end: Some(job.end),
        };

        let page_size = self.config.scan_page_size.max(1);
        let mut offset = 0usize;
        'scan: loop {
            let page = self
                .ledger
                .journals_page(job.user_id, &filter, offset, page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            let fetched = page.len();
            let mut deleted_in_page = 0usize;

            for mut journal in page {
                if cancel.is_cancelled() {
                    info!(user_id = job.user_id, "retroactive run cancelled");
                    report.cancelled = true;
                    break 'scan;
                }
                report.scanned += 1;
                METRICS.journals_scanned.fetch_add(1, Ordering::Relaxed);

                for rule in &rules {
                    METRICS.rules_evaluated.fetch_add(1, Ordering::Relaxed);
                    if !rule.evaluate(&MatchContext::of(&journal)).matched() {
                        continue;
                    }
                    report.matched += 1;
                    METRICS.rules_matched.fetch_add(1, Ordering::Relaxed);
                    let run = self.apply_actions(rule, &mut journal).await;
                    report.actions_applied += run.applied as u64;
                    report.failures += run.failed as u64;
                    if run.halted_pass {
                        deleted_in_page += 1;
                        break;
                    }
                    if rule.stop_processing {
                        break;
                    }
                }
            }

            if fetched < page_size {
                break;
            }
            // Deleted journals shrink the result set under us; pull the
            // next offset back so no candidate is skipped.
            offset += fetched - deleted_in_page;
        }

        Ok(report)
    }

    async fn resolve_target(
        &self,
        job: &RetroJob,
        report: &mut RunReport,
    ) -> Result<Vec<CompiledRule>, RuleError> {
        match job.target {
            JobTarget::Rule(rule_id) => {
                let rule = self
                    .rules
                    .rule(rule_id)
                    .await?
                    .filter(|r| !r.deleted)
                    .ok_or_else(|| RuleError::NotFound(format!("rule {rule_id}")))?;
                Ok(vec![self.load_compiled(&rule).await?])
            }
            JobTarget::Group(group_id) => {
                self.rules
                    .group(group_id)
                    .await?
                    .filter(|g| !g.deleted)
                    .ok_or_else(|| RuleError::NotFound(format!("rule group {group_id}")))?;
                let mut compiled = Vec::new();
                for rule in self.rules.active_rules(group_id).await? {
                    match self.load_compiled(&rule).await {
                        Ok(c) => compiled.push(c),
                        Err(e) => {
                            warn!(rule_id = rule.id, error = %e, "skipping rule that failed to compile");
                            report.failures += 1;
                        }
                    }
                }
                Ok(compiled)
            }
        }
    }

    async fn load_compiled(&self, rule: &Rule) -> Result<CompiledRule, RuleError> {
        let triggers = self.rules.triggers(rule.id).await?;
        let actions = self.rules.actions(rule.id).await?;
        CompiledRule::compile(rule, &triggers, &actions)
    }

    /// Run a matched rule's actions in order. An action error stops this
    /// rule's remaining actions but never the pass; a deleting action
    /// halts everything for this journal.
    async fn apply_actions(&self, rule: &CompiledRule, journal: &mut Journal) -> ActionsRun {
        let mut run = ActionsRun::default();
        for ca in &rule.actions {
            match ca.action.apply(journal, self.ledger.as_ref()).await {
                Ok(outcome) => {
                    if outcome.applied {
                        run.applied += 1;
                        METRICS.actions_applied.fetch_add(1, Ordering::Relaxed);
                    }
                    // The stored per-action stop flag is the halt-rule
                    // signal; a terminating action outranks it.
                    let halt = match outcome.halt {
                        Halt::Continue if ca.stop_processing => Halt::Rule,
                        halt => halt,
                    };
                    match halt {
                        Halt::Continue => {}
                        Halt::Rule => break,
                        Halt::Pass => {
                            run.halted_pass = true;
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(rule_id = rule.id, action = %ca.name, error = %e, "action failed");
                    run.failed += 1;
                    METRICS.action_failures.fetch_add(1, Ordering::Relaxed);
                    run.error = Some(e.to_string());
                    break;
                }
            }
        }
        run
    }
}

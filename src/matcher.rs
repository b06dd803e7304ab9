//! Non-mutating discovery: scan a user's history in bounded pages and
//! return the journals a rule (or an ad-hoc trigger list) would match.
//! Backs the interactive "test this rule" preview and the rescan path.

use std::sync::Arc;
use tracing::debug;

use crate::error::RuleError;
use crate::evaluator::{CompiledRule, CompiledTrigger};
use crate::journal::{Journal, MatchContext};
use crate::metrics::METRICS;
use crate::predicate::Trigger;
use crate::store::{LedgerStore, RuleStore, ScanFilter};

/// Ceilings for one discovery scan. `limit` bounds the matches returned,
/// `range` bounds the candidates examined; the scan stops at whichever is
/// hit first. Both exist because a user's full history can be large and
/// an unbounded scan in an interactive request is unacceptable.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub limit: usize,
    pub range: usize,
}

impl SearchLimits {
    /// Ceiling used by the non-interactive rescan path, effectively "all".
    pub const EXHAUSTIVE: usize = 100_000;

    pub fn new(limit: usize, range: usize) -> Self {
        Self { limit, range }
    }

    pub fn exhaustive() -> Self {
        Self {
            limit: Self::EXHAUSTIVE,
            range: Self::EXHAUSTIVE,
        }
    }
}

/// What to match against: a stored rule, or triggers that have not been
/// saved yet.
#[derive(Debug, Clone)]
pub enum MatchSource {
    Rule(u64),
    Triggers {
        specs: Vec<TriggerSpec>,
        strict: bool,
    },
}

/// One unsaved trigger from a preview form.
#[derive(Debug, Clone)]
pub struct TriggerSpec {
    pub name: String,
    pub value: String,
    pub stop_processing: bool,
}

/// Read-only variant of the executor. Never invokes mutators.
pub struct TransactionMatcher {
    rules: Arc<dyn RuleStore>,
    ledger: Arc<dyn LedgerStore>,
    page_size: usize,
}

impl TransactionMatcher {
    pub fn new(rules: Arc<dyn RuleStore>, ledger: Arc<dyn LedgerStore>, page_size: usize) -> Self {
        Self {
            rules,
            ledger,
            page_size: page_size.max(1),
        }
    }

    /// Scan the user's journals, newest first, and collect the ones the
    /// source matches. Returns once `limit` matches are collected or
    /// `range` candidates have been scanned. Any error aborts the scan:
    /// partial preview results are not meaningful.
    pub async fn find_matches(
        &self,
        user_id: u64,
        source: MatchSource,
        limits: SearchLimits,
    ) -> Result<Vec<Journal>, RuleError> {
        if limits.limit == 0 || limits.range == 0 {
            return Ok(Vec::new());
        }

        let compiled = self.compile(source).await?;
        let filter = ScanFilter::default();
        let mut matches = Vec::new();
        let mut scanned = 0usize;
        let mut offset = 0usize;

        'scan: loop {
            let want = self.page_size.min(limits.range - scanned);
            let page = self
                .ledger
                .journals_page(user_id, &filter, offset, want)
                .await?;
            if page.is_empty() {
                break;
            }
            let fetched = page.len();
            for journal in page {
                scanned += 1;
                METRICS
                    .journals_scanned
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                if compiled.evaluate(&MatchContext::of(&journal)).matched() {
                    matches.push(journal);
                    if matches.len() >= limits.limit {
                        break 'scan;
                    }
                }
                if scanned >= limits.range {
                    break 'scan;
                }
            }
            if fetched < want {
                // Short page: end of history.
                break;
            }
            offset += fetched;
        }

        debug!(
            user_id,
            scanned,
            matched = matches.len(),
            limit = limits.limit,
            range = limits.range,
            "matcher scan finished"
        );
        Ok(matches)
    }

    async fn compile(&self, source: MatchSource) -> Result<CompiledRule, RuleError> {
        match source {
            MatchSource::Rule(rule_id) => {
                let rule = self
                    .rules
                    .rule(rule_id)
                    .await?
                    .filter(|r| !r.deleted)
                    .ok_or_else(|| RuleError::NotFound(format!("rule {rule_id}")))?;
                let triggers = self.rules.triggers(rule_id).await?;
                // Actions are irrelevant to matching; compile triggers only
                // so a rule with a broken action can still be previewed.
                CompiledRule::compile(&rule, &triggers, &[])
            }
            MatchSource::Triggers { specs, strict } => {
                let triggers = specs
                    .iter()
                    .map(|s| {
                        Ok(CompiledTrigger {
                            name: s.name.clone(),
                            trigger: Trigger::compile(&s.name, &s.value)?,
                            stop_processing: s.stop_processing,
                        })
                    })
                    .collect::<Result<Vec<_>, RuleError>>()?;
                Ok(CompiledRule::ad_hoc(triggers, strict))
            }
        }
    }
}

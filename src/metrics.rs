use std::sync::atomic::{AtomicU64, Ordering};

pub struct EngineMetrics {
    pub passes_total: AtomicU64,
    pub rules_evaluated: AtomicU64,
    pub rules_matched: AtomicU64,
    pub actions_applied: AtomicU64,
    pub action_failures: AtomicU64,
    pub journals_scanned: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            passes_total: AtomicU64::new(0),
            rules_evaluated: AtomicU64::new(0),
            rules_matched: AtomicU64::new(0),
            actions_applied: AtomicU64::new(0),
            action_failures: AtomicU64::new(0),
            journals_scanned: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passes_total: self.passes_total.load(Ordering::Relaxed),
            rules_evaluated: self.rules_evaluated.load(Ordering::Relaxed),
            rules_matched: self.rules_matched.load(Ordering::Relaxed),
            actions_applied: self.actions_applied.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
            journals_scanned: self.journals_scanned.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }

    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            "# HELP ledger_rules_passes_total Total rule passes executed.\n\
             # TYPE ledger_rules_passes_total counter\n\
             ledger_rules_passes_total {}\n\
             # HELP ledger_rules_rules_evaluated_total Total rule evaluations.\n\
             # TYPE ledger_rules_rules_evaluated_total counter\n\
             ledger_rules_rules_evaluated_total {}\n\
             # HELP ledger_rules_rules_matched_total Total rule matches.\n\
             # TYPE ledger_rules_rules_matched_total counter\n\
             ledger_rules_rules_matched_total {}\n\
             # HELP ledger_rules_actions_applied_total Total actions that changed a journal.\n\
             # TYPE ledger_rules_actions_applied_total counter\n\
             ledger_rules_actions_applied_total {}\n\
             # HELP ledger_rules_action_failures_total Total failed action applications.\n\
             # TYPE ledger_rules_action_failures_total counter\n\
             ledger_rules_action_failures_total {}\n\
             # HELP ledger_rules_journals_scanned_total Total journals scanned by matcher and jobs.\n\
             # TYPE ledger_rules_journals_scanned_total counter\n\
             ledger_rules_journals_scanned_total {}\n\
             # HELP ledger_rules_jobs_completed_total Total retroactive jobs completed.\n\
             # TYPE ledger_rules_jobs_completed_total counter\n\
             ledger_rules_jobs_completed_total {}\n\
             # HELP ledger_rules_jobs_failed_total Total retroactive jobs that failed permanently.\n\
             # TYPE ledger_rules_jobs_failed_total counter\n\
             ledger_rules_jobs_failed_total {}\n",
            s.passes_total,
            s.rules_evaluated,
            s.rules_matched,
            s.actions_applied,
            s.action_failures,
            s.journals_scanned,
            s.jobs_completed,
            s.jobs_failed,
        )
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct MetricsSnapshot {
    pub passes_total: u64,
    pub rules_evaluated: u64,
    pub rules_matched: u64,
    pub actions_applied: u64,
    pub action_failures: u64,
    pub journals_scanned: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

lazy_static::lazy_static! {
    pub static ref METRICS: EngineMetrics = EngineMetrics::new();
}

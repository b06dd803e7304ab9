use bigdecimal::BigDecimal;
use chrono::{Days, NaiveDate};
use std::str::FromStr;
use std::sync::Arc;

use ledger_rules::config::EngineConfig;
use ledger_rules::journal::{AccountRef, Journal};
use ledger_rules::matcher::{MatchSource, SearchLimits, TriggerSpec};
use ledger_rules::rule::{PassKind, Rule, RuleAction, RuleGroup, RuleTrigger};
use ledger_rules::runner::{CancelFlag, JobQueue, JobTarget, RetroJob};
use ledger_rules::store::{LedgerStore, MemoryStore};
use ledger_rules::RuleEngine;

const USER: u64 = 1;

fn engine(store: &Arc<MemoryStore>) -> RuleEngine {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    RuleEngine::new(store.clone(), store.clone(), EngineConfig::default())
}

fn group(store: &MemoryStore, id: u64, order: u32) {
    store.insert_group(RuleGroup {
        id,
        user_id: USER,
        title: format!("group {id}"),
        description: None,
        order,
        active: true,
        deleted: false,
    });
}

fn rule(store: &MemoryStore, id: u64, group_id: u64, order: u32, pass: PassKind) -> u64 {
    store.insert_rule(Rule {
        id,
        group_id,
        order,
        title: format!("rule {id}"),
        description: None,
        active: true,
        strict: true,
        stop_processing: false,
        pass,
        deleted: false,
    });
    id
}

fn stopping_rule(store: &MemoryStore, id: u64, group_id: u64, order: u32) -> u64 {
    store.insert_rule(Rule {
        id,
        group_id,
        order,
        title: format!("rule {id}"),
        description: None,
        active: true,
        strict: true,
        stop_processing: true,
        pass: PassKind::OnCreate,
        deleted: false,
    });
    id
}

fn trigger(store: &MemoryStore, id: u64, rule_id: u64, order: u32, name: &str, value: &str) {
    store.insert_trigger(RuleTrigger {
        id,
        rule_id,
        name: name.to_string(),
        value: value.to_string(),
        order,
        stop_processing: false,
        deleted: false,
    });
}

fn action(store: &MemoryStore, id: u64, rule_id: u64, order: u32, name: &str, value: &str) {
    store.insert_action(RuleAction {
        id,
        rule_id,
        name: name.to_string(),
        value: value.to_string(),
        order,
        stop_processing: false,
        deleted: false,
    });
}

fn journal(id: u64, description: &str, amount: &str, date: NaiveDate, account: u64) -> Journal {
    Journal {
        id,
        user_id: USER,
        description: description.to_string(),
        notes: None,
        amount: BigDecimal::from_str(amount).unwrap(),
        currency: "EUR".into(),
        date,
        source: AccountRef {
            id: account,
            name: format!("account {account}"),
            iban: None,
        },
        destination: AccountRef {
            id: 90,
            name: "Merchant".into(),
            iban: None,
        },
        category: None,
        budget: None,
        tags: vec![],
        bill: None,
        reconciled: false,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn netflix_rule_categorizes_on_create() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let r = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, r, 1, "description_contains", "Netflix");
    action(&store, 1, r, 1, "set_category", "Subscriptions");
    store.insert_journal(journal(1, "Netflix Monthly", "12.99", date(2024, 5, 1), 1));

    let engine = engine(&store);
    let summary = engine.run_on_create(1).await.unwrap();
    assert_eq!(summary.matched_count(), 1);
    assert_eq!(summary.actions_applied(), 1);
    assert!(!summary.short_circuited);

    let journal = store.journal(1).await.unwrap().unwrap();
    assert_eq!(journal.category.as_deref(), Some("Subscriptions"));

    // Replaying the same pass is a no-op: the category is already set.
    let summary = engine.run_on_create(1).await.unwrap();
    assert_eq!(summary.matched_count(), 1);
    assert_eq!(summary.actions_applied(), 0);
}

#[tokio::test]
async fn rules_for_the_other_pass_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let r = rule(&store, 1, 1, 1, PassKind::OnUpdate);
    trigger(&store, 1, r, 1, "description_contains", "Netflix");
    action(&store, 1, r, 1, "set_category", "Subscriptions");
    store.insert_journal(journal(1, "Netflix Monthly", "12.99", date(2024, 5, 1), 1));

    let engine = engine(&store);
    let summary = engine.run_on_create(1).await.unwrap();
    assert_eq!(summary.rules_evaluated, 0);
    assert_eq!(summary.matched_count(), 0);
    assert!(store.journal(1).await.unwrap().unwrap().category.is_none());

    let summary = engine.run_on_update(1).await.unwrap();
    assert_eq!(summary.matched_count(), 1);
}

#[tokio::test]
async fn stop_processing_rule_halts_the_pass() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let first = stopping_rule(&store, 1, 1, 1);
    trigger(&store, 1, first, 1, "description_contains", "coffee");
    action(&store, 1, first, 1, "add_tag", "caffeine");
    let second = rule(&store, 2, 1, 2, PassKind::OnCreate);
    trigger(&store, 2, second, 1, "description_contains", "coffee");
    action(&store, 2, second, 1, "add_tag", "never-applied");
    store.insert_journal(journal(1, "Coffee corner", "3.20", date(2024, 5, 1), 1));

    let summary = engine(&store).run_on_create(1).await.unwrap();
    assert!(summary.short_circuited);
    // The second rule was never evaluated, let alone run.
    assert_eq!(summary.rules_evaluated, 1);
    let journal = store.journal(1).await.unwrap().unwrap();
    assert_eq!(journal.tags, vec!["caffeine".to_string()]);
}

#[tokio::test]
async fn per_action_stop_flag_skips_the_rules_remaining_actions() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let r = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, r, 1, "description_contains", "coffee");
    store.insert_action(RuleAction {
        id: 1,
        rule_id: r,
        name: "add_tag".into(),
        value: "caffeine".into(),
        order: 1,
        stop_processing: true,
        deleted: false,
    });
    action(&store, 2, r, 2, "add_tag", "never-applied");
    store.insert_journal(journal(1, "Coffee corner", "3.20", date(2024, 5, 1), 1));

    let summary = engine(&store).run_on_create(1).await.unwrap();
    assert_eq!(summary.outcomes[0].actions_applied, 1);
    // The halt is rule-scoped: the pass itself was not cut short.
    assert!(!summary.short_circuited);
    let journal = store.journal(1).await.unwrap().unwrap();
    assert_eq!(journal.tags, vec!["caffeine".to_string()]);
}

#[tokio::test]
async fn delete_action_terminates_the_pass_and_the_journal() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let first = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, first, 1, "description_contains", "spam");
    action(&store, 1, first, 1, "delete_transaction", "");
    action(&store, 2, first, 2, "add_tag", "never-applied");
    let second = rule(&store, 2, 1, 2, PassKind::OnCreate);
    trigger(&store, 2, second, 1, "description_contains", "spam");
    action(&store, 3, second, 1, "set_category", "never-applied");
    store.insert_journal(journal(1, "spam charge", "1.00", date(2024, 5, 1), 1));

    let summary = engine(&store).run_on_create(1).await.unwrap();
    assert!(summary.journal_deleted);
    assert!(summary.short_circuited);
    assert_eq!(summary.matched_count(), 1);
    assert_eq!(summary.outcomes[0].actions_applied, 1);
    // The journal no longer exists for later reads.
    assert!(store.journal(1).await.unwrap().is_none());
}

#[tokio::test]
async fn broken_rule_does_not_disable_the_rest() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let broken = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, broken, 1, "description_rhymes_with", "orange");
    let healthy = rule(&store, 2, 1, 2, PassKind::OnCreate);
    trigger(&store, 2, healthy, 1, "description_contains", "netflix");
    action(&store, 1, healthy, 1, "set_category", "Subscriptions");
    store.insert_journal(journal(1, "Netflix Monthly", "12.99", date(2024, 5, 1), 1));

    let summary = engine(&store).run_on_create(1).await.unwrap();
    assert_eq!(summary.outcomes.len(), 2);
    assert!(summary.outcomes[0].error.is_some());
    assert!(!summary.outcomes[0].matched);
    assert!(summary.outcomes[1].matched);
    let journal = store.journal(1).await.unwrap().unwrap();
    assert_eq!(journal.category.as_deref(), Some("Subscriptions"));
}

#[tokio::test]
async fn failed_action_stops_its_rule_but_not_the_pass() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let first = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, first, 1, "description_contains", "rent");
    // No such budget exists, so this fails at apply time.
    action(&store, 1, first, 1, "set_budget", "Housing");
    action(&store, 2, first, 2, "add_tag", "never-applied");
    let second = rule(&store, 2, 1, 2, PassKind::OnCreate);
    trigger(&store, 2, second, 1, "description_contains", "rent");
    action(&store, 3, second, 1, "set_category", "Housing");
    store.insert_journal(journal(1, "Rent May", "900", date(2024, 5, 1), 1));

    let summary = engine(&store).run_on_create(1).await.unwrap();
    assert_eq!(summary.outcomes[0].actions_failed, 1);
    assert_eq!(summary.outcomes[0].actions_applied, 0);
    let journal = store.journal(1).await.unwrap().unwrap();
    assert!(journal.tags.is_empty());
    assert_eq!(journal.category.as_deref(), Some("Housing"));
}

/// 120 journals, matches at every 8th candidate in newest-first scan
/// order. With limit 10 / range 50 the scan must stop at candidate 50
/// and return only the matches seen by then.
#[tokio::test]
async fn matcher_honors_limit_and_range_ceilings() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let r = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, r, 1, "description_contains", "netflix");

    let base = date(2024, 1, 1);
    for id in 1..=120u64 {
        let description = if id % 8 == 0 { "Netflix" } else { "Coffee" };
        let day = base.checked_add_days(Days::new(id)).unwrap();
        store.insert_journal(journal(id, description, "10", day, 1));
    }

    let engine = engine(&store);
    let matcher = engine.matcher();

    // Scan order is id 120 down to id 1; candidate 50 is id 71. Matches
    // within the ceiling: ids 120, 112, 104, 96, 88, 80, 72.
    let matches = matcher
        .find_matches(USER, MatchSource::Rule(r), SearchLimits::new(10, 50))
        .await
        .unwrap();
    let mut ids: Vec<u64> = matches.iter().map(|j| j.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![72, 80, 88, 96, 104, 112, 120]);

    // The limit ceiling binds first when it is smaller.
    let matches = matcher
        .find_matches(USER, MatchSource::Rule(r), SearchLimits::new(3, 50))
        .await
        .unwrap();
    assert_eq!(matches.len(), 3);
    assert_eq!(matches[0].id, 120);

    // limit = 0 returns empty without scanning.
    let matches = matcher
        .find_matches(USER, MatchSource::Rule(r), SearchLimits::new(0, 50))
        .await
        .unwrap();
    assert!(matches.is_empty());

    // The exhaustive ceiling sees the whole history.
    let matches = matcher
        .find_matches(USER, MatchSource::Rule(r), SearchLimits::exhaustive())
        .await
        .unwrap();
    assert_eq!(matches.len(), 15);
}

#[tokio::test]
async fn matcher_takes_ad_hoc_triggers() {
    let store = Arc::new(MemoryStore::new());
    store.insert_journal(journal(1, "Netflix Monthly", "12.99", date(2024, 5, 1), 1));
    store.insert_journal(journal(2, "Groceries", "54.10", date(2024, 5, 2), 1));

    let matcher = engine(&store).matcher();
    let source = MatchSource::Triggers {
        specs: vec![
            TriggerSpec {
                name: "description_contains".into(),
                value: "netflix".into(),
                stop_processing: false,
            },
            TriggerSpec {
                name: "amount_less".into(),
                value: "20".into(),
                stop_processing: false,
            },
        ],
        strict: true,
    };
    let matches = matcher
        .find_matches(USER, source, SearchLimits::new(10, 100))
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, 1);
}

#[tokio::test]
async fn retroactive_run_is_bounded_by_window_and_accounts() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let r = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, r, 1, "description_contains", "netflix");
    action(&store, 1, r, 1, "set_category", "Subscriptions");

    // In window, right account: mutated.
    store.insert_journal(journal(1, "Netflix", "12.99", date(2024, 3, 1), 1));
    // In window, wrong account: untouched.
    store.insert_journal(journal(2, "Netflix", "12.99", date(2024, 3, 2), 2));
    // Out of window: untouched.
    store.insert_journal(journal(3, "Netflix", "12.99", date(2024, 6, 1), 1));

    let engine = engine(&store);
    let job = RetroJob {
        target: JobTarget::Rule(r),
        user_id: USER,
        account_ids: vec![1],
        start: date(2024, 2, 1),
        end: date(2024, 4, 30),
    };
    let report = engine.run_retroactive(&job, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.matched, 1);
    assert_eq!(report.actions_applied, 1);

    assert_eq!(
        store.journal(1).await.unwrap().unwrap().category.as_deref(),
        Some("Subscriptions")
    );
    assert!(store.journal(2).await.unwrap().unwrap().category.is_none());
    assert!(store.journal(3).await.unwrap().unwrap().category.is_none());
}

#[tokio::test]
async fn retroactive_group_honors_rule_order_and_stop_processing() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let first = stopping_rule(&store, 1, 1, 1);
    trigger(&store, 1, first, 1, "description_contains", "netflix");
    action(&store, 1, first, 1, "set_category", "Subscriptions");
    let second = rule(&store, 2, 1, 2, PassKind::OnCreate);
    trigger(&store, 2, second, 1, "description_contains", "netflix");
    action(&store, 2, second, 1, "add_tag", "never-applied");

    store.insert_journal(journal(1, "Netflix", "12.99", date(2024, 3, 1), 1));

    let engine = engine(&store);
    let job = RetroJob {
        target: JobTarget::Group(1),
        user_id: USER,
        account_ids: vec![],
        start: date(2024, 1, 1),
        end: date(2024, 12, 31),
    };
    let report = engine.run_retroactive(&job, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.matched, 1);

    let journal = store.journal(1).await.unwrap().unwrap();
    assert_eq!(journal.category.as_deref(), Some("Subscriptions"));
    assert!(journal.tags.is_empty());
}

#[tokio::test]
async fn job_queue_runs_jobs_and_reports_completions() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let r = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, r, 1, "description_contains", "netflix");
    action(&store, 1, r, 1, "set_category", "Subscriptions");
    for id in 1..=5u64 {
        store.insert_journal(journal(id, "Netflix", "12.99", date(2024, 3, id as u32), 1));
    }

    let engine = Arc::new(engine(&store));
    let (queue, worker, mut completions) = JobQueue::new(engine);
    tokio::spawn(worker.run());

    queue
        .enqueue(RetroJob {
            target: JobTarget::Rule(r),
            user_id: USER,
            account_ids: vec![],
            start: date(2024, 1, 1),
            end: date(2024, 12, 31),
        })
        .await
        .unwrap();

    let completion = completions.recv().await.unwrap();
    let report = completion.result.unwrap();
    assert_eq!(report.scanned, 5);
    assert_eq!(report.matched, 5);
    assert_eq!(report.actions_applied, 5);

    for id in 1..=5u64 {
        assert_eq!(
            store.journal(id).await.unwrap().unwrap().category.as_deref(),
            Some("Subscriptions")
        );
    }
}

#[tokio::test]
async fn cancelled_job_stops_before_touching_anything() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let r = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, r, 1, "description_contains", "netflix");
    action(&store, 1, r, 1, "set_category", "Subscriptions");
    store.insert_journal(journal(1, "Netflix", "12.99", date(2024, 3, 1), 1));

    let engine = engine(&store);
    let job = RetroJob {
        target: JobTarget::Rule(r),
        user_id: USER,
        account_ids: vec![],
        start: date(2024, 1, 1),
        end: date(2024, 12, 31),
    };
    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = engine.run_retroactive(&job, &cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.scanned, 0);
    assert!(store.journal(1).await.unwrap().unwrap().category.is_none());
}

#[tokio::test]
async fn retroactive_delete_does_not_skip_candidates_across_pages() {
    let store = Arc::new(MemoryStore::new());
    group(&store, 1, 1);
    let r = rule(&store, 1, 1, 1, PassKind::OnCreate);
    trigger(&store, 1, r, 1, "description_contains", "spam");
    action(&store, 1, r, 1, "delete_transaction", "");

    let base = date(2024, 1, 1);
    for id in 1..=7u64 {
        let day = base.checked_add_days(Days::new(id)).unwrap();
        store.insert_journal(journal(id, "spam charge", "1.00", day, 1));
    }

    let mut config = EngineConfig::default();
    config.scan_page_size = 3;
    let engine = RuleEngine::new(store.clone(), store.clone(), config);
    let job = RetroJob {
        target: JobTarget::Rule(r),
        user_id: USER,
        account_ids: vec![],
        start: date(2024, 1, 1),
        end: date(2024, 12, 31),
    };
    let report = engine.run_retroactive(&job, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.scanned, 7);
    assert_eq!(report.matched, 7);
    assert_eq!(store.journal_count(), 0);
}

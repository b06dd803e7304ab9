use bigdecimal::BigDecimal;
use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use std::str::FromStr;
use std::sync::Arc;

use ledger_rules::config::EngineConfig;
use ledger_rules::evaluator::{CompiledRule, CompiledTrigger};
use ledger_rules::journal::{AccountRef, Journal, MatchContext};
use ledger_rules::matcher::{MatchSource, SearchLimits, TransactionMatcher, TriggerSpec};
use ledger_rules::predicate::Trigger;
use ledger_rules::store::MemoryStore;

fn journal(id: u64, description: &str, date: NaiveDate) -> Journal {
    Journal {
        id,
        user_id: 1,
        description: description.to_string(),
        notes: None,
        amount: BigDecimal::from_str("100").unwrap(),
        currency: "EUR".into(),
        date,
        source: AccountRef {
            id: 1,
            name: "Checking".into(),
            iban: None,
        },
        destination: AccountRef {
            id: 2,
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

/// A trigger with a predetermined verdict against the fixed 100.00
/// amount above.
fn trig(result: bool) -> CompiledTrigger {
    let (name, value) = if result {
        ("amount_less", "200")
    } else {
        ("amount_more", "200")
    };
    CompiledTrigger {
        name: name.to_string(),
        trigger: Trigger::compile(name, value).unwrap(),
        stop_processing: false,
    }
}

proptest! {
    #[test]
    fn strict_rule_matches_iff_every_trigger_does(bits in prop::collection::vec(any::<bool>(), 1..8)) {
        let rule = CompiledRule::ad_hoc(bits.iter().map(|b| trig(*b)).collect(), true);
        let j = journal(1, "x", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let eval = rule.evaluate(&MatchContext::of(&j));
        prop_assert_eq!(eval.matched(), bits.iter().all(|b| *b));
    }

    #[test]
    fn loose_rule_matches_iff_any_trigger_does(bits in prop::collection::vec(any::<bool>(), 1..8)) {
        let rule = CompiledRule::ad_hoc(bits.iter().map(|b| trig(*b)).collect(), false);
        let j = journal(1, "x", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let eval = rule.evaluate(&MatchContext::of(&j));
        prop_assert_eq!(eval.matched(), bits.iter().any(|b| *b));
    }

    /// Flipping any single trigger of an all-true strict rule to false
    /// must flip the verdict to rejected.
    #[test]
    fn flipping_one_trigger_rejects_a_strict_rule(len in 1..8usize, flip in 0..8usize) {
        let flip = flip % len;
        let j = journal(1, "x", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        let rule = CompiledRule::ad_hoc((0..len).map(|_| trig(true)).collect(), true);
        prop_assert!(rule.evaluate(&MatchContext::of(&j)).matched());

        let rule = CompiledRule::ad_hoc(
            (0..len).map(|i| trig(i != flip)).collect(),
            true,
        );
        prop_assert!(!rule.evaluate(&MatchContext::of(&j)).matched());
    }

    /// `find_matches` never returns more than `limit` matches and never
    /// looks past the first `range` candidates, for all ceilings.
    #[test]
    fn matcher_never_exceeds_its_ceilings(limit in 0..30usize, range in 0..150usize) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            for id in 1..=120u64 {
                let description = if id % 4 == 0 { "Netflix" } else { "Coffee" };
                let day = base.checked_add_days(Days::new(id)).unwrap();
                store.insert_journal(journal(id, description, day));
            }

            let matcher = TransactionMatcher::new(
                store.clone(),
                store.clone(),
                EngineConfig::default().scan_page_size,
            );
            let source = MatchSource::Triggers {
                specs: vec![TriggerSpec {
                    name: "description_contains".into(),
                    value: "netflix".into(),
                    stop_processing: false,
                }],
                strict: true,
            };
            let matches = matcher
                .find_matches(1, source, SearchLimits::new(limit, range))
                .await
                .unwrap();

            prop_assert!(matches.len() <= limit);
            // Scan order is newest first: candidate p holds id 121 - p, so
            // every match must come from the first `range` candidates.
            for m in &matches {
                let position = 121 - m.id as usize;
                prop_assert!(position <= range);
            }
            if limit == 0 || range == 0 {
                prop_assert!(matches.is_empty());
            }
            Ok(())
        })?;
    }
}

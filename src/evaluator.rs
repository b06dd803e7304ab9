//! Rule evaluation: one compiled rule against one context, producing a
//! single match verdict with short-circuiting.

use serde::Serialize;
use tracing::trace;

use crate::action::Action;
use crate::error::RuleError;
use crate::journal::MatchContext;
use crate::predicate::Trigger;
use crate::rule::{PassKind, Rule, RuleAction, RuleTrigger};

/// Terminal outcome of evaluating one rule. No partial states escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Matched,
    Rejected,
}

/// The verdict plus how many triggers were actually evaluated, so the
/// short-circuit behavior is observable to callers and tests.
#[derive(Debug, Clone, Copy)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub triggers_evaluated: usize,
}

impl Evaluation {
    pub fn matched(&self) -> bool {
        self.verdict == Verdict::Matched
    }
}

#[derive(Debug, Clone)]
pub struct CompiledTrigger {
    /// Stored predicate name, kept for logging.
    pub name: String,
    pub trigger: Trigger,
    pub stop_processing: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledAction {
    /// Stored mutator name, kept for logging.
    pub name: String,
    pub action: Action,
    pub stop_processing: bool,
}

/// A rule with its triggers and actions resolved against the predicate
/// and mutator libraries.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: u64,
    pub title: String,
    pub strict: bool,
    pub stop_processing: bool,
    pub pass: PassKind,
    pub triggers: Vec<CompiledTrigger>,
    pub actions: Vec<CompiledAction>,
}

impl CompiledRule {
    /// Resolve stored trigger/action rows. The rows must already be the
    /// live (non-deleted) set, in `order`.
    pub fn compile(
        rule: &Rule,
        triggers: &[RuleTrigger],
        actions: &[RuleAction],
    ) -> Result<Self, RuleError> {
        let triggers = triggers
            .iter()
            .map(|t| {
                Ok(CompiledTrigger {
                    name: t.name.clone(),
                    trigger: Trigger::compile(&t.name, &t.value)?,
                    stop_processing: t.stop_processing,
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        let actions = actions
            .iter()
            .map(|a| {
                Ok(CompiledAction {
                    name: a.name.clone(),
                    action: Action::compile(&a.name, &a.value)?,
                    stop_processing: a.stop_processing,
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        Ok(Self {
            id: rule.id,
            title: rule.title.clone(),
            strict: rule.strict,
            stop_processing: rule.stop_processing,
            pass: rule.pass,
            triggers,
            actions,
        })
    }

    /// Build an ad-hoc rule from bare triggers, for "test these triggers"
    /// previews where no stored rule exists yet.
    pub fn ad_hoc(triggers: Vec<CompiledTrigger>, strict: bool) -> Self {
        Self {
            id: 0,
            title: "ad-hoc".to_string(),
            strict,
            stop_processing: false,
            pass: PassKind::OnCreate,
            triggers,
            actions: Vec::new(),
        }
    }

    /// Run the trigger list against one context.
    ///
    /// Strict rules AND their triggers: the first `false` is decisive and
    /// rejects immediately. Non-strict rules OR them: the first `true` is
    /// decisive and matches immediately. A trigger whose own
    /// `stop_processing` flag is set ends evaluation right after it, with
    /// the verdict implied by everything evaluated so far.
    ///
    /// A rule with no triggers never matches, under either mode.
    pub fn evaluate(&self, ctx: &MatchContext<'_>) -> Evaluation {
        if self.triggers.is_empty() {
            return Evaluation {
                verdict: Verdict::Rejected,
                triggers_evaluated: 0,
            };
        }

        let mut evaluated = 0;
        let verdict = if self.strict {
            let mut verdict = Verdict::Matched;
            for t in &self.triggers {
                evaluated += 1;
                let hit = t.trigger.evaluate(ctx);
                trace!(rule_id = self.id, trigger = %t.name, hit, "trigger evaluated");
                if !hit {
                    verdict = Verdict::Rejected;
                    break;
                }
                if t.stop_processing {
                    break;
                }
            }
            verdict
        } else {
            let mut verdict = Verdict::Rejected;
            for t in &self.triggers {
                evaluated += 1;
                let hit = t.trigger.evaluate(ctx);
                trace!(rule_id = self.id, trigger = %t.name, hit, "trigger evaluated");
                if hit {
                    verdict = Verdict::Matched;
                    break;
                }
                if t.stop_processing {
                    break;
                }
            }
            verdict
        };

        Evaluation {
            verdict,
            triggers_evaluated: evaluated,
        }
    }
}

//! The predicate library: every trigger kind the engine understands,
//! as one closed union. Stored trigger rows carry a `name`/`value` pair;
//! [`Trigger::compile`] turns a pair into a typed variant or rejects it,
//! so a rule set referencing a retired predicate fails loudly at compile
//! time instead of silently never matching.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use regex::Regex;
use std::str::FromStr;

use crate::error::RuleError;
use crate::journal::MatchContext;

/// Text fields a string predicate can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Description,
    Notes,
    SourceName,
    SourceIban,
    DestinationName,
    DestinationIban,
    Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Is,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountOp {
    Exactly,
    Less,
    More,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOp {
    On,
    Before,
    After,
}

/// A compiled trigger predicate. Pure: evaluation reads only the
/// [`MatchContext`] and never blocks.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Case-insensitive string match against a text field. The needle is
    /// stored lowercased at compile time.
    Text {
        field: TextField,
        op: TextOp,
        needle: String,
    },
    /// Regex match against a text field, as the user wrote it.
    TextMatches { field: TextField, pattern: Regex },
    /// Exact-decimal amount comparison.
    Amount { op: AmountOp, value: BigDecimal },
    Date { op: DateOp, value: NaiveDate },
    CategoryIs(String),
    BudgetIs(String),
    TagIs(String),
    HasAnyCategory,
    HasNoCategory,
    HasAnyBudget,
    HasNoBudget,
    HasAnyTag,
    HasNoTag,
    AnyNotes,
    NoNotes,
}

impl Trigger {
    /// Compile a stored `name`/`value` pair into a typed trigger.
    ///
    /// Fails with [`RuleError::UnknownTrigger`] for names outside the
    /// library and [`RuleError::InvalidValue`] for values that cannot be
    /// parsed for the named kind.
    pub fn compile(name: &str, value: &str) -> Result<Self, RuleError> {
        use AmountOp::*;
        use DateOp::*;
        use TextField::*;
        use TextOp::*;

        let trigger = match name {
            "description_is" => text(Description, Is, name, value)?,
            "description_contains" => text(Description, Contains, name, value)?,
            "description_starts" => text(Description, StartsWith, name, value)?,
            "description_ends" => text(Description, EndsWith, name, value)?,
            "description_matches" => matches(Description, name, value)?,

            "notes_are" => text(Notes, Is, name, value)?,
            "notes_contain" => text(Notes, Contains, name, value)?,
            "notes_start" => text(Notes, StartsWith, name, value)?,
            "notes_end" => text(Notes, EndsWith, name, value)?,
            "notes_match" => matches(Notes, name, value)?,
            "any_notes" => Trigger::AnyNotes,
            "no_notes" => Trigger::NoNotes,

            "source_account_is" => text(SourceName, Is, name, value)?,
            "source_account_contains" => text(SourceName, Contains, name, value)?,
            "source_account_starts" => text(SourceName, StartsWith, name, value)?,
            "source_account_ends" => text(SourceName, EndsWith, name, value)?,
            "source_account_iban_is" => text(SourceIban, Is, name, value)?,

            "destination_account_is" => text(DestinationName, Is, name, value)?,
            "destination_account_contains" => text(DestinationName, Contains, name, value)?,
            "destination_account_starts" => text(DestinationName, StartsWith, name, value)?,
            "destination_account_ends" => text(DestinationName, EndsWith, name, value)?,
            "destination_account_iban_is" => text(DestinationIban, Is, name, value)?,

            "currency_is" => text(Currency, Is, name, value)?,

            "amount_exactly" => Trigger::Amount {
                op: Exactly,
                value: decimal(name, value)?,
            },
            "amount_less" => Trigger::Amount {
                op: Less,
                value: decimal(name, value)?,
            },
            "amount_more" => Trigger::Amount {
                op: More,
                value: decimal(name, value)?,
            },

            "date_is" => Trigger::Date {
                op: On,
                value: date(name, value)?,
            },
            "date_before" => Trigger::Date {
                op: Before,
                value: date(name, value)?,
            },
            "date_after" => Trigger::Date {
                op: After,
                value: date(name, value)?,
            },

            "category_is" => Trigger::CategoryIs(lowered(name, value)?),
            "budget_is" => Trigger::BudgetIs(lowered(name, value)?),
            "tag_is" => Trigger::TagIs(lowered(name, value)?),

            "has_any_category" => Trigger::HasAnyCategory,
            "has_no_category" => Trigger::HasNoCategory,
            "has_any_budget" => Trigger::HasAnyBudget,
            "has_no_budget" => Trigger::HasNoBudget,
            "has_any_tag" => Trigger::HasAnyTag,
            "has_no_tag" => Trigger::HasNoTag,

            other => return Err(RuleError::UnknownTrigger(other.to_string())),
        };
        Ok(trigger)
    }

    /// Evaluate this predicate against one context.
    pub fn evaluate(&self, ctx: &MatchContext<'_>) -> bool {
        match self {
            Trigger::Text { field, op, needle } => {
                let Some(haystack) = field_text(ctx, *field) else {
                    return false;
                };
                let haystack = haystack.to_lowercase();
                match op {
                    TextOp::Is => haystack == *needle,
                    TextOp::Contains => haystack.contains(needle.as_str()),
                    TextOp::StartsWith => haystack.starts_with(needle.as_str()),
                    TextOp::EndsWith => haystack.ends_with(needle.as_str()),
                }
            }
            Trigger::TextMatches { field, pattern } => field_text(ctx, *field)
                .map(|haystack| pattern.is_match(haystack))
                .unwrap_or(false),
            Trigger::Amount { op, value } => match op {
                AmountOp::Exactly => ctx.amount == value,
                AmountOp::Less => ctx.amount < value,
                AmountOp::More => ctx.amount > value,
            },
            Trigger::Date { op, value } => match op {
                DateOp::On => ctx.date == *value,
                DateOp::Before => ctx.date < *value,
                DateOp::After => ctx.date > *value,
            },
            Trigger::CategoryIs(name) => {
                ctx.category.map(|c| c.to_lowercase() == *name).unwrap_or(false)
            }
            Trigger::BudgetIs(name) => {
                ctx.budget.map(|b| b.to_lowercase() == *name).unwrap_or(false)
            }
            Trigger::TagIs(name) => ctx.tags.iter().any(|t| t.to_lowercase() == *name),
            Trigger::HasAnyCategory => ctx.category.is_some(),
            Trigger::HasNoCategory => ctx.category.is_none(),
            Trigger::HasAnyBudget => ctx.budget.is_some(),
            Trigger::HasNoBudget => ctx.budget.is_none(),
            Trigger::HasAnyTag => !ctx.tags.is_empty(),
            Trigger::HasNoTag => ctx.tags.is_empty(),
            Trigger::AnyNotes => ctx.notes.map(|n| !n.is_empty()).unwrap_or(false),
            Trigger::NoNotes => ctx.notes.map(|n| n.is_empty()).unwrap_or(true),
        }
    }
}

fn text(field: TextField, op: TextOp, name: &str, value: &str) -> Result<Trigger, RuleError> {
    Ok(Trigger::Text {
        field,
        op,
        needle: lowered(name, value)?,
    })
}

fn matches(field: TextField, name: &str, value: &str) -> Result<Trigger, RuleError> {
    let pattern = Regex::new(value)
        .map_err(|e| RuleError::invalid(name, value, format!("bad regex: {e}")))?;
    Ok(Trigger::TextMatches { field, pattern })
}

fn lowered(name: &str, value: &str) -> Result<String, RuleError> {
    if value.trim().is_empty() {
        return Err(RuleError::invalid(name, value, "empty match text"));
    }
    Ok(value.to_lowercase())
}

fn decimal(name: &str, value: &str) -> Result<BigDecimal, RuleError> {
    BigDecimal::from_str(value.trim())
        .map_err(|e| RuleError::invalid(name, value, format!("not a decimal amount: {e}")))
}

fn date(name: &str, value: &str) -> Result<NaiveDate, RuleError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| RuleError::invalid(name, value, format!("not a date (want YYYY-MM-DD): {e}")))
}

fn field_text<'a>(ctx: &MatchContext<'a>, field: TextField) -> Option<&'a str> {
    match field {
        TextField::Description => Some(ctx.description),
        TextField::Notes => ctx.notes,
        TextField::SourceName => Some(ctx.source_name),
        TextField::SourceIban => ctx.source_iban,
        TextField::DestinationName => Some(ctx.destination_name),
        TextField::DestinationIban => ctx.destination_iban,
        TextField::Currency => Some(ctx.currency),
    }
}

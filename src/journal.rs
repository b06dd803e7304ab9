use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Denormalized account reference carried on a journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub iban: Option<String>,
}

/// One transaction journal as the engine sees it: the source and
/// destination legs collapsed into a single record with the linked
/// classification entities denormalized onto it.
///
/// Amounts are exact decimals, never binary floating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub id: u64,
    pub user_id: u64,
    pub description: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub date: NaiveDate,
    pub source: AccountRef,
    pub destination: AccountRef,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub bill: Option<String>,
    #[serde(default)]
    pub reconciled: bool,
}

/// Read-only projection of one journal, built fresh per evaluation.
/// Predicates see only this; the shared borrows keep them from mutating
/// anything.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub description: &'a str,
    pub notes: Option<&'a str>,
    pub amount: &'a BigDecimal,
    pub currency: &'a str,
    pub date: NaiveDate,
    pub source_name: &'a str,
    pub source_iban: Option<&'a str>,
    pub destination_name: &'a str,
    pub destination_iban: Option<&'a str>,
    pub category: Option<&'a str>,
    pub budget: Option<&'a str>,
    pub tags: &'a [String],
    pub bill: Option<&'a str>,
    pub reconciled: bool,
}

impl<'a> MatchContext<'a> {
    pub fn of(journal: &'a Journal) -> Self {
        Self {
            description: &journal.description,
            notes: journal.notes.as_deref(),
            amount: &journal.amount,
            currency: &journal.currency,
            date: journal.date,
            source_name: &journal.source.name,
            source_iban: journal.source.iban.as_deref(),
            destination_name: &journal.destination.name,
            destination_iban: journal.destination.iban.as_deref(),
            category: journal.category.as_deref(),
            budget: journal.budget.as_deref(),
            tags: &journal.tags,
            bill: journal.bill.as_deref(),
            reconciled: journal.reconciled,
        }
    }
}

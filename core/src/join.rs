//! Joiner, stage 3 of the pipeline.
//!
//! Left-joins deposit, payment and person onto account by account key,
//! producing exactly one row per account key, then fills the gaps
//! according to FILL_POLICY.

use crate::{
    error::{PipelineError, PipelineResult},
    event::PipelineEvent,
    normalize::NormalizedSources,
    stage::PipelineStage,
};
use std::collections::{HashMap, HashSet};

// ── Fill policy ──────────────────────────────────────────────────────────────

/// Declared defaults for missing values after the join.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillPolicy {
    pub marital_status: &'static str,
    pub gender: &'static str,
    /// Every numeric column, delay included.
    pub number: f64,
}

pub const FILL_POLICY: FillPolicy = FillPolicy {
    marital_status: "single",
    gender: "M",
    number: 0.0,
};

impl FillPolicy {
    fn number_or(&self, value: Option<f64>) -> f64 {
        value.unwrap_or(self.number)
    }
}

fn fill_text(value: Option<String>, default: &str) -> String {
    value.unwrap_or_else(|| default.to_string())
}

// ── Joined table ─────────────────────────────────────────────────────────────

/// The 11 numeric feature columns, in feature order.
pub const NUMERIC_COLUMNS: [&str; 11] = [
    "base_interest_rate",
    "repay_frequency",
    "number_of_total_installments",
    "overdue_expenses",
    "total_balance",
    "collateral_amount",
    "accounting_balance",
    "available_balance",
    "capital_amount",
    "payinterest",
    "payexpenses",
];

/// One account after all joins and fills. The account key is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub base_interest_rate: f64,
    pub repay_frequency: f64,
    pub number_of_total_installments: f64,
    /// Rescaled delay; consumed by labelling, never a feature.
    pub delay_days: f64,
    pub overdue_expenses: f64,
    pub total_balance: f64,
    pub collateral_amount: f64,
    pub accounting_balance: f64,
    pub available_balance: f64,
    pub capital_amount: f64,
    pub payinterest: f64,
    pub payexpenses: f64,
    pub marital_status: String,
    pub gender: String,
}

impl JoinedRow {
    /// Values in NUMERIC_COLUMNS order.
    pub fn numeric_values(&self) -> [f64; 11] {
        [
            self.base_interest_rate,
            self.repay_frequency,
            self.number_of_total_installments,
            self.overdue_expenses,
            self.total_balance,
            self.collateral_amount,
            self.accounting_balance,
            self.available_balance,
            self.capital_amount,
            self.payinterest,
            self.payexpenses,
        ]
    }
}

/// Rows in account order, densely indexed from 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinedTable {
    pub rows: Vec<JoinedRow>,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// First record per account key; later duplicates are counted and dropped.
fn index_first<T>(records: Vec<T>, key: impl Fn(&T) -> &str) -> (HashMap<String, T>, usize) {
    let mut index = HashMap::with_capacity(records.len());
    let mut duplicates = 0;
    for record in records {
        let k = key(&record).to_string();
        if index.contains_key(&k) {
            duplicates += 1;
        } else {
            index.insert(k, record);
        }
    }
    (index, duplicates)
}

pub struct Joiner;

impl PipelineStage for Joiner {
    type Input = NormalizedSources;
    type Output = JoinedTable;

    fn name(&self) -> &'static str {
        "joiner"
    }

    fn run(
        &self,
        input: NormalizedSources,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<JoinedTable> {
        let (mut deposits, dup_deposits) =
            index_first(input.deposits, |d| d.account_key.as_str());
        let (mut payments, dup_payments) =
            index_first(input.payments, |p| p.account_key.as_str());
        let (mut persons, dup_persons) =
            index_first(input.persons, |p| p.account_key.as_str());

        let mut seen_accounts = HashSet::new();
        let mut dup_accounts = 0;
        let mut rows = Vec::with_capacity(input.accounts.len());

        for account in input.accounts {
            if !seen_accounts.insert(account.account_key.clone()) {
                dup_accounts += 1;
                continue;
            }
            let deposit = deposits.remove(&account.account_key);
            let payment = payments.remove(&account.account_key);
            let person = persons.remove(&account.account_key);

            let fill = &FILL_POLICY;
            rows.push(JoinedRow {
                base_interest_rate: fill.number_or(account.base_interest_rate),
                repay_frequency: fill.number_or(account.repay_frequency),
                number_of_total_installments: fill.number_or(account.number_of_total_installments),
                delay_days: fill.number_or(account.delay_days),
                overdue_expenses: fill.number_or(account.overdue_expenses),
                total_balance: fill.number_or(account.total_balance),
                collateral_amount: fill.number_or(account.collateral_amount),
                accounting_balance: fill.number_or(deposit.as_ref().and_then(|d| d.accounting_balance)),
                available_balance: fill.number_or(deposit.as_ref().and_then(|d| d.available_balance)),
                capital_amount: fill.number_or(payment.as_ref().and_then(|p| p.capital_amount)),
                payinterest: fill.number_or(payment.as_ref().and_then(|p| p.payinterest)),
                payexpenses: fill.number_or(payment.as_ref().and_then(|p| p.payexpenses)),
                marital_status: fill_text(
                    person.as_ref().and_then(|p| p.marital_status.clone()),
                    fill.marital_status,
                ),
                gender: fill_text(person.and_then(|p| p.gender), fill.gender),
            });
        }

        let duplicate_rows_dropped = dup_accounts + dup_deposits + dup_payments + dup_persons;
        if duplicate_rows_dropped > 0 {
            log::warn!(
                "joiner: dropped duplicate rows per account key \
                 (account={dup_accounts}, deposit={dup_deposits}, payment={dup_payments}, person={dup_persons})"
            );
        }

        if rows.is_empty() {
            return Err(PipelineError::EmptyTable);
        }

        log::info!("joiner: {} rows", rows.len());
        events.push(PipelineEvent::TableJoined {
            rows: rows.len(),
            duplicate_rows_dropped,
        });

        Ok(JoinedTable { rows })
    }
}

//! Field selector & normalizer, stage 2 of the pipeline.
//!
//! Projects each record set to the columns the join needs and
//! rescales the account delay metric into [0, DELAY_CEILING].
//! Nothing else is transformed here; standardization of the other
//! numeric columns happens in the feature builder.

use crate::{
    error::PipelineResult,
    event::PipelineEvent,
    loader::LoadedSources,
    stage::PipelineStage,
    types::AccountKey,
};

/// Upper end of the rescaled delay range.
pub const DELAY_CEILING: f64 = 210.0;

/// Rescaled value assigned when every observed delay is identical.
pub const DEGENERATE_DELAY: f64 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedAccount {
    pub account_key: AccountKey,
    pub base_interest_rate: Option<f64>,
    pub repay_frequency: Option<f64>,
    pub number_of_total_installments: Option<f64>,
    /// Rescaled into [0, DELAY_CEILING].
    pub delay_days: Option<f64>,
    pub overdue_expenses: Option<f64>,
    pub total_balance: Option<f64>,
    pub collateral_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedDeposit {
    pub account_key: AccountKey,
    pub accounting_balance: Option<f64>,
    pub available_balance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPayment {
    pub account_key: AccountKey,
    pub capital_amount: Option<f64>,
    pub payinterest: Option<f64>,
    pub payexpenses: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPerson {
    pub account_key: AccountKey,
    pub marital_status: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedSources {
    pub accounts: Vec<SelectedAccount>,
    pub deposits: Vec<SelectedDeposit>,
    pub payments: Vec<SelectedPayment>,
    pub persons: Vec<SelectedPerson>,
}

/// Result of a min-max rescale over one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Rescaled {
    pub values: Vec<Option<f64>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub degenerate: bool,
}

/// `(raw - min) / (max - min) * ceiling`, min/max over present values.
///
/// Missing values stay missing. A zero-width range maps every present
/// value to DEGENERATE_DELAY instead of dividing by zero.
pub fn rescale_min_max(raw: &[Option<f64>], ceiling: f64) -> Rescaled {
    let present = raw.iter().flatten().copied();
    let min = present.clone().reduce(f64::min);
    let max = present.reduce(f64::max);

    let (values, degenerate) = match (min, max) {
        (Some(lo), Some(hi)) if hi > lo => {
            let span = hi - lo;
            let values = raw
                .iter()
                .map(|v| v.map(|x| (x - lo) / span * ceiling))
                .collect();
            (values, false)
        }
        _ => (raw.iter().map(|v| v.map(|_| DEGENERATE_DELAY)).collect(), true),
    };

    Rescaled { values, min, max, degenerate }
}

pub struct Normalizer;

impl PipelineStage for Normalizer {
    type Input = LoadedSources;
    type Output = NormalizedSources;

    fn name(&self) -> &'static str {
        "normalizer"
    }

    fn run(
        &self,
        input: LoadedSources,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<NormalizedSources> {
        let raw_delays: Vec<Option<f64>> = input.accounts.iter().map(|a| a.delay_days).collect();
        let rescaled = rescale_min_max(&raw_delays, DELAY_CEILING);

        if rescaled.degenerate && !input.accounts.is_empty() {
            log::warn!(
                "normalizer: delay_days has zero range (min={:?}, max={:?}); rescaled to {DEGENERATE_DELAY}",
                rescaled.min,
                rescaled.max
            );
        }
        events.push(PipelineEvent::DelayRescaled {
            min_delay: rescaled.min,
            max_delay: rescaled.max,
            degenerate: rescaled.degenerate,
        });

        let accounts = input
            .accounts
            .into_iter()
            .zip(rescaled.values)
            .map(|(a, delay_days)| SelectedAccount {
                account_key: a.account_key,
                base_interest_rate: a.base_interest_rate,
                repay_frequency: a.repay_frequency,
                number_of_total_installments: a.number_of_total_installments,
                delay_days,
                overdue_expenses: a.overdue_expenses,
                total_balance: a.total_balance,
                collateral_amount: a.collateral_amount,
            })
            .collect();

        let deposits = input
            .deposits
            .into_iter()
            .map(|d| SelectedDeposit {
                account_key: d.account_key,
                accounting_balance: d.accounting_balance,
                available_balance: d.available_balance,
            })
            .collect();

        let payments = input
            .payments
            .into_iter()
            .map(|p| SelectedPayment {
                account_key: p.account_key,
                capital_amount: p.capital_amount,
                payinterest: p.payinterest,
                payexpenses: p.payexpenses,
            })
            .collect();

        let persons = input
            .persons
            .into_iter()
            .map(|p| SelectedPerson {
                account_key: p.account_key,
                marital_status: p.marital_status,
                gender: p.gender,
            })
            .collect();

        Ok(NormalizedSources {
            accounts,
            deposits,
            payments,
            persons,
        })
    }
}

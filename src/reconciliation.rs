use crate::schema::{BankTransaction, ExpenseRecord, ParsedRevenue};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Share of the bank-side total a difference may reach before it is flagged.
pub const DIFFERENCE_TOLERANCE: f64 = 0.05;

/// Reconciliation rate (percent) below which the whole period is flagged.
pub const MIN_RECONCILIATION_RATE: f64 = 90.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationAlert {
    /// Bank credits minus recorded revenue. Positive means more in the bank.
    RevenueDifference { difference: f64 },
    /// Bank debits minus recorded expenses. Positive means more in the bank.
    ExpenseDifference { difference: f64 },
    LowReconciliationRate { rate: f64 },
}

fn direction(difference: f64) -> &'static str {
    if difference > 0.0 {
        "a mais no banco"
    } else {
        "a menos no banco"
    }
}

impl fmt::Display for ReconciliationAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RevenueDifference { difference } => write!(
                f,
                "Diferença significativa nas receitas: {:.2} {}",
                difference.abs(),
                direction(*difference)
            ),
            Self::ExpenseDifference { difference } => write!(
                f,
                "Diferença significativa nas despesas: {:.2} {}",
                difference.abs(),
                direction(*difference)
            ),
            Self::LowReconciliationRate { rate } => write!(
                f,
                "Taxa de reconciliação de {:.2}% abaixo de {:.0}% - revisar lançamentos",
                rate, MIN_RECONCILIATION_RATE
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReconciliationAnalysis {
    pub total_revenues_recorded: f64,
    pub total_expenses_recorded: f64,
    pub total_bank_credits: f64,
    pub total_bank_debits: f64,
    pub revenue_difference: f64,
    pub expense_difference: f64,
    pub revenue_rate: f64,
    pub expense_rate: f64,
    #[schemars(description = "Mean of the revenue and expense rates, in percent; not clamped to 100")]
    pub reconciliation_rate: f64,
    pub alerts: Vec<ReconciliationAlert>,
}

impl ReconciliationAnalysis {
    pub fn is_reconciled(&self) -> bool {
        self.alerts.is_empty()
    }
}

fn side_rate(recorded: f64, bank: f64) -> f64 {
    if bank > 0.0 {
        recorded / bank * 100.0
    } else {
        100.0
    }
}

/// Compares recorded revenues and expenses with the bank statement totals.
pub fn reconcile(
    revenues: &[ParsedRevenue],
    expenses: &[ExpenseRecord],
    bank_transactions: &[BankTransaction],
) -> ReconciliationAnalysis {
    let total_revenues_recorded: f64 = revenues.iter().map(|r| r.amount).sum();
    let total_expenses_recorded: f64 = expenses.iter().map(ExpenseRecord::amount).sum();

    let (total_bank_credits, total_bank_debits) =
        bank_transactions
            .iter()
            .fold((0.0, 0.0), |(credits, debits), transaction| {
                if transaction.is_credit() {
                    (credits + transaction.amount.abs(), debits)
                } else {
                    (credits, debits + transaction.amount.abs())
                }
            });

    let revenue_difference = total_bank_credits - total_revenues_recorded;
    let expense_difference = total_bank_debits - total_expenses_recorded;

    let revenue_rate = side_rate(total_revenues_recorded, total_bank_credits);
    let expense_rate = side_rate(total_expenses_recorded, total_bank_debits);
    let reconciliation_rate = (revenue_rate + expense_rate) / 2.0;

    let mut alerts = Vec::new();

    if revenue_difference.abs() > total_bank_credits * DIFFERENCE_TOLERANCE {
        alerts.push(ReconciliationAlert::RevenueDifference {
            difference: revenue_difference,
        });
    }

    if expense_difference.abs() > total_bank_debits * DIFFERENCE_TOLERANCE {
        alerts.push(ReconciliationAlert::ExpenseDifference {
            difference: expense_difference,
        });
    }

    if reconciliation_rate < MIN_RECONCILIATION_RATE {
        alerts.push(ReconciliationAlert::LowReconciliationRate {
            rate: reconciliation_rate,
        });
    }

    debug!(
        "Reconciliation rate {:.2}% with {} alert(s)",
        reconciliation_rate,
        alerts.len()
    );

    ReconciliationAnalysis {
        total_revenues_recorded,
        total_expenses_recorded,
        total_bank_credits,
        total_bank_debits,
        revenue_difference,
        expense_difference,
        revenue_rate,
        expense_rate,
        reconciliation_rate,
        alerts,
    }
}

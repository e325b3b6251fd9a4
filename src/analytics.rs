//! Dashboard aggregations over a period's records and statements.

use crate::config::{default_config, PipelineConfig};
use crate::schema::{ExpenseRecord, ParsedRevenue};
use crate::statement::DreStatement;
use crate::tax::effective_tax_scope;
use crate::utils::percent_of;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub count: usize,
    #[schemars(description = "Share of the grand total, in percent")]
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopExpense {
    pub date: NaiveDate,
    pub description: String,
    pub category: String,
    pub amount: f64,
}

fn rank(totals: HashMap<String, (f64, usize)>) -> Vec<CategoryTotal> {
    let grand_total: f64 = totals.values().map(|(total, _)| total).sum();

    let mut ranked: Vec<CategoryTotal> = totals
        .into_iter()
        .map(|(category, (total, count))| CategoryTotal {
            category,
            total,
            count,
            percentage: percent_of(total, grand_total).unwrap_or(0.0),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.category.cmp(&b.category))
    });
    ranked
}

/// Dashboard views over one period, using the same keyword tables as the
/// statement engine so both agree on what is a tax and where it is booked.
pub struct Dashboard<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Dashboard<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    fn is_tax(&self, record: &ExpenseRecord) -> bool {
        effective_tax_scope(record, &self.config.tax_keywords).is_some()
    }

    fn expense_category(&self, record: &ExpenseRecord) -> String {
        let expense = record.expense();
        self.config
            .categories
            .categorize_expense(&expense.description, Some(&expense.category))
    }

    /// Non-tax expense totals per category, largest first.
    pub fn expenses_by_category(&self, expenses: &[ExpenseRecord]) -> Vec<CategoryTotal> {
        let mut totals: HashMap<String, (f64, usize)> = HashMap::new();

        for record in expenses.iter().filter(|r| !self.is_tax(r)) {
            let entry = totals.entry(self.expense_category(record)).or_default();
            entry.0 += record.amount();
            entry.1 += 1;
        }

        rank(totals)
    }

    pub fn revenues_by_category(&self, revenues: &[ParsedRevenue]) -> Vec<CategoryTotal> {
        let mut totals: HashMap<String, (f64, usize)> = HashMap::new();

        for revenue in revenues {
            let category = self
                .config
                .categories
                .categorize_revenue(&revenue.description, Some(&revenue.category));
            let entry = totals.entry(category).or_default();
            entry.0 += revenue.amount;
            entry.1 += 1;
        }

        rank(totals)
    }

    /// The `limit` largest non-tax expenses.
    pub fn top_expenses(&self, expenses: &[ExpenseRecord], limit: usize) -> Vec<TopExpense> {
        let mut top: Vec<TopExpense> = expenses
            .iter()
            .filter(|r| !self.is_tax(r))
            .map(|record| {
                let expense = record.expense();
                TopExpense {
                    date: expense.date,
                    description: expense.description.clone(),
                    category: self.expense_category(record),
                    amount: expense.amount,
                }
            })
            .collect();

        top.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        top.truncate(limit);
        top
    }
}

pub fn expenses_by_category(expenses: &[ExpenseRecord]) -> Vec<CategoryTotal> {
    Dashboard::new(default_config()).expenses_by_category(expenses)
}

pub fn revenues_by_category(revenues: &[ParsedRevenue]) -> Vec<CategoryTotal> {
    Dashboard::new(default_config()).revenues_by_category(revenues)
}

pub fn top_expenses(expenses: &[ExpenseRecord], limit: usize) -> Vec<TopExpense> {
    Dashboard::new(default_config()).top_expenses(expenses, limit)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineVariation {
    pub code: String,
    pub base: f64,
    pub current: f64,
    pub absolute: f64,
    #[schemars(description = "Variation relative to |base|, in percent; null when base is 0")]
    pub percent: Option<f64>,
}

/// Period-over-period variation of the headline statement lines.
pub fn compare_statements(base: &DreStatement, current: &DreStatement) -> Vec<LineVariation> {
    let headline = |dre: &DreStatement| {
        [
            ("gross_revenue", dre.gross_revenue),
            ("revenue_taxes", dre.revenue_taxes.total),
            ("net_revenue", dre.net_revenue),
            ("cost_of_services", dre.cost_of_services),
            ("gross_profit", dre.gross_profit),
            ("operating_expenses", dre.operating_expenses.total),
            ("operating_profit", dre.operating_profit),
            ("ebitda", dre.ebitda),
            ("profit_before_tax", dre.profit_before_tax),
            ("profit_taxes", dre.profit_taxes.total),
            ("net_profit", dre.net_profit),
        ]
    };

    headline(base)
        .into_iter()
        .zip(headline(current))
        .map(|((code, base), (_, current))| {
            let absolute = current - base;
            LineVariation {
                code: code.to_string(),
                base,
                current,
                absolute,
                percent: (base != 0.0).then(|| absolute / base.abs() * 100.0),
            }
        })
        .collect()
}

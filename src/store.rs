//! Persistence contract and the statement service built on it.

use crate::config::PipelineConfig;
use crate::engine::DreEngine;
use crate::error::{DreError, Result};
use crate::schema::{ExpenseRecord, ParsedRevenue};
use crate::statement::DreStatement;
use crate::utils::MonthFilter;
use futures::future::{self, BoxFuture, FutureExt};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// An expense as persisted, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredExpense {
    pub id: String,
    pub record: ExpenseRecord,
}

/// Storage operations the pipeline consumes. Implementations report a
/// missing report as [`DreError::ReportNotFound`] and a missing expense as
/// [`DreError::ExpenseNotFound`].
pub trait LedgerStore: Send + Sync {
    fn load_revenues<'a>(
        &'a self,
        report_id: &'a str,
        month: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<ParsedRevenue>>>;

    fn load_expenses<'a>(
        &'a self,
        report_id: &'a str,
        month: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<StoredExpense>>>;

    /// Saves the statement together with the month filter it was generated
    /// with (`None` for the whole report).
    fn save_statement<'a>(
        &'a self,
        report_id: &'a str,
        month: Option<&'a str>,
        statement: &'a DreStatement,
    ) -> BoxFuture<'a, Result<()>>;

    /// Month filter of the last saved statement, `None` when it covered the
    /// whole report or nothing was saved yet.
    fn statement_month<'a>(&'a self, report_id: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    /// Stores a new expense and returns its id.
    fn add_expense<'a>(
        &'a self,
        report_id: &'a str,
        expense: ExpenseRecord,
    ) -> BoxFuture<'a, Result<String>>;

    fn update_expense<'a>(
        &'a self,
        report_id: &'a str,
        expense_id: &'a str,
        expense: ExpenseRecord,
    ) -> BoxFuture<'a, Result<()>>;

    fn delete_expense<'a>(
        &'a self,
        report_id: &'a str,
        expense_id: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Default)]
struct Report {
    revenues: Vec<ParsedRevenue>,
    expenses: Vec<StoredExpense>,
    statement: Option<DreStatement>,
    statement_month: Option<String>,
    next_id: u64,
}

impl Report {
    fn push_expense(&mut self, record: ExpenseRecord) -> String {
        self.next_id += 1;
        let id = format!("exp-{}", self.next_id);
        self.expenses.push(StoredExpense {
            id: id.clone(),
            record,
        });
        id
    }

    fn position_of(&self, report_id: &str, expense_id: &str) -> Result<usize> {
        self.expenses
            .iter()
            .position(|e| e.id == expense_id)
            .ok_or_else(|| DreError::ExpenseNotFound {
                report_id: report_id.to_string(),
                expense_id: expense_id.to_string(),
            })
    }
}

fn month_filter(month: Option<&str>) -> Result<Option<MonthFilter>> {
    month.map(MonthFilter::parse).transpose()
}

/// Process-local store keyed by report id.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    reports: Mutex<HashMap<String, Report>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a report with its parsed records.
    pub fn insert_report(
        &self,
        report_id: &str,
        revenues: Vec<ParsedRevenue>,
        expenses: Vec<ExpenseRecord>,
    ) -> Result<Vec<String>> {
        let mut report = Report {
            revenues,
            ..Report::default()
        };
        let ids = expenses
            .into_iter()
            .map(|record| report.push_expense(record))
            .collect();

        self.lock()?.insert(report_id.to_string(), report);
        Ok(ids)
    }

    pub fn statement(&self, report_id: &str) -> Result<Option<DreStatement>> {
        self.with_report(report_id, |report| Ok(report.statement.clone()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Report>>> {
        self.reports
            .lock()
            .map_err(|_| DreError::Storage("ledger store lock poisoned".to_string()))
    }

    fn with_report<T>(
        &self,
        report_id: &str,
        op: impl FnOnce(&mut Report) -> Result<T>,
    ) -> Result<T> {
        let mut reports = self.lock()?;
        let report = reports
            .get_mut(report_id)
            .ok_or_else(|| DreError::ReportNotFound(report_id.to_string()))?;
        op(report)
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load_revenues<'a>(
        &'a self,
        report_id: &'a str,
        month: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<ParsedRevenue>>> {
        let result = month_filter(month).and_then(|filter| {
            self.with_report(report_id, |report| {
                Ok(report
                    .revenues
                    .iter()
                    .filter(|r| filter.as_ref().map_or(true, |f| f.contains(r.date)))
                    .cloned()
                    .collect())
            })
        });
        future::ready(result).boxed()
    }

    fn load_expenses<'a>(
        &'a self,
        report_id: &'a str,
        month: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<StoredExpense>>> {
        let result = month_filter(month).and_then(|filter| {
            self.with_report(report_id, |report| {
                Ok(report
                    .expenses
                    .iter()
                    .filter(|e| {
                        filter
                            .as_ref()
                            .map_or(true, |f| f.contains(e.record.expense().date))
                    })
                    .cloned()
                    .collect())
            })
        });
        future::ready(result).boxed()
    }

    fn save_statement<'a>(
        &'a self,
        report_id: &'a str,
        month: Option<&'a str>,
        statement: &'a DreStatement,
    ) -> BoxFuture<'a, Result<()>> {
        let result = self.with_report(report_id, |report| {
            report.statement = Some(statement.clone());
            report.statement_month = month.map(str::to_string);
            Ok(())
        });
        future::ready(result).boxed()
    }

    fn statement_month<'a>(&'a self, report_id: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        let result = self.with_report(report_id, |report| Ok(report.statement_month.clone()));
        future::ready(result).boxed()
    }

    fn add_expense<'a>(
        &'a self,
        report_id: &'a str,
        expense: ExpenseRecord,
    ) -> BoxFuture<'a, Result<String>> {
        let result = self.with_report(report_id, |report| Ok(report.push_expense(expense)));
        future::ready(result).boxed()
    }

    fn update_expense<'a>(
        &'a self,
        report_id: &'a str,
        expense_id: &'a str,
        expense: ExpenseRecord,
    ) -> BoxFuture<'a, Result<()>> {
        let result = self.with_report(report_id, |report| {
            let index = report.position_of(report_id, expense_id)?;
            report.expenses[index].record = expense;
            Ok(())
        });
        future::ready(result).boxed()
    }

    fn delete_expense<'a>(
        &'a self,
        report_id: &'a str,
        expense_id: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let result = self.with_report(report_id, |report| {
            let index = report.position_of(report_id, expense_id)?;
            report.expenses.remove(index);
            Ok(())
        });
        future::ready(result).boxed()
    }
}

/// Keeps a report's saved statement in step with its expenses.
///
/// Every edit goes through the store and is followed by a full regeneration
/// of the statement, which is then saved back.
pub struct StatementService<S> {
    store: S,
    config: PipelineConfig,
}

impl<S: LedgerStore> StatementService<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Loads the report (optionally one `YYYY-MM` month of it), regenerates the
    /// statement and saves it.
    pub async fn regenerate(&self, report_id: &str, month: Option<&str>) -> Result<DreStatement> {
        let revenues = self.store.load_revenues(report_id, month).await?;
        let expenses: Vec<ExpenseRecord> = self
            .store
            .load_expenses(report_id, month)
            .await?
            .into_iter()
            .map(|stored| stored.record)
            .collect();

        let statement = DreEngine::new(&self.config).generate(&revenues, &expenses);
        self.store.save_statement(report_id, month, &statement).await?;

        info!(
            "Regenerated statement for report {} (net profit {:.2})",
            report_id, statement.net_profit
        );

        Ok(statement)
    }

    pub async fn add_expense(
        &self,
        report_id: &str,
        expense: ExpenseRecord,
    ) -> Result<(String, DreStatement)> {
        let id = self.store.add_expense(report_id, expense).await?;
        let statement = self.refresh(report_id).await?;
        Ok((id, statement))
    }

    pub async fn update_expense(
        &self,
        report_id: &str,
        expense_id: &str,
        expense: ExpenseRecord,
    ) -> Result<DreStatement> {
        self.store
            .update_expense(report_id, expense_id, expense)
            .await?;
        self.refresh(report_id).await
    }

    pub async fn delete_expense(&self, report_id: &str, expense_id: &str) -> Result<DreStatement> {
        self.store.delete_expense(report_id, expense_id).await?;
        self.refresh(report_id).await
    }

    /// Regenerates with the month filter of the last saved statement.
    async fn refresh(&self, report_id: &str) -> Result<DreStatement> {
        let month = self.store.statement_month(report_id).await?;
        self.regenerate(report_id, month.as_deref()).await
    }
}

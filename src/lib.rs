//! # Clinic DRE
//!
//! A library that turns a clinic's ledger exports (revenues, expenses and bank
//! statements) into a Brazilian income statement (DRE) with tax-regime-aware
//! computations and a bank reconciliation check.
//!
//! ## Core Concepts
//!
//! - **Tolerant ingestion**: delimited text or spreadsheet rows are parsed
//!   positionally; malformed rows are skipped and counted, never fatal
//! - **Classification**: every expense gets a fixed/variable suggestion and a
//!   tax flag; manual flags always win over automatic detection
//! - **Statement engine**: records are routed into disjoint buckets and rolled
//!   up from gross revenue to net profit, estimating taxes from injected rate
//!   tables when none were recorded
//! - **Reconciliation**: recorded totals are compared with bank credits and
//!   debits, producing advisory alerts
//!
//! ## Example
//!
//! ```rust,ignore
//! use clinic_dre::*;
//!
//! let config = PipelineConfig::for_regime(TaxRegime::LucroPresumido);
//! let sources = LedgerSources {
//!     revenues: "Data;Descrição;Valor\n05/03/2024;Consulta;1.500,00\n",
//!     expenses: "Data;Descrição;Categoria;Valor\n10/03/2024;Aluguel;Administrativas;800,00\n",
//!     bank_statement: None,
//! };
//!
//! let report = DrePipeline::process(&config, &sources).unwrap();
//! println!("{}", report.statement.to_csv().unwrap());
//! ```

pub mod analytics;
pub mod categorize;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod normalize;
pub mod reconciliation;
pub mod schema;
pub mod statement;
pub mod store;
pub mod tax;
pub mod utils;

pub use analytics::{
    compare_statements, expenses_by_category, revenues_by_category, top_expenses, CategoryTotal,
    Dashboard, LineVariation, TopExpense,
};
pub use categorize::{categorize_expense, categorize_revenue, CategoryRules, ExpenseCategory};
pub use classifier::{
    apply_suggestions, classify_expenses, effective_category, set_custom_category,
    set_expense_type, set_tax_flag, suggest_expense_type, ClassificationSummary,
    ExpenseClassifier, ExpenseKeywords, Suggestion,
};
pub use config::{ClassifierPolicy, PipelineConfig, ProfitTaxBase, RegimeRates, TaxRateTables};
pub use engine::{generate_dre, DreEngine};
pub use error::{DreError, Result};
pub use ingestion::*;
pub use normalize::{normalize_date, parse_amount};
pub use reconciliation::{reconcile, ReconciliationAlert, ReconciliationAnalysis};
pub use schema::*;
pub use statement::{DreStatement, StatementLine, TaxSource};
pub use store::{InMemoryLedgerStore, LedgerStore, StatementService, StoredExpense};
pub use tax::{identify_tax, TaxCategory, TaxIdentification, TaxKeywords, TaxRule};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Raw text of one period's ledger exports.
#[derive(Debug, Clone, Copy)]
pub struct LedgerSources<'s> {
    pub revenues: &'s str,
    pub expenses: &'s str,
    pub bank_statement: Option<&'s str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    pub revenues: ParseReport,
    pub expenses: ParseReport,
    pub bank_statement: Option<ParseReport>,
}

/// Everything produced for one period, from parsed records to the statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub revenues: Vec<ParsedRevenue>,
    pub expenses: Vec<ClassifiedExpense>,
    pub bank_transactions: Vec<BankTransaction>,
    pub summary: ClassificationSummary,
    pub statement: DreStatement,
    pub reconciliation: Option<ReconciliationAnalysis>,
    pub diagnostics: PipelineDiagnostics,
}

pub struct DrePipeline;

impl DrePipeline {
    /// Parses, classifies and aggregates one period. Only an invalid
    /// configuration is an error; data problems surface in the diagnostics
    /// and reconciliation alerts.
    pub fn process(config: &PipelineConfig, sources: &LedgerSources<'_>) -> Result<PipelineReport> {
        config.validate()?;

        info!("Processing ledger under regime {}", config.regime);

        let parser = LedgerParser::new(&config.categories);
        let revenues = parser.parse_revenues(sources.revenues);
        let expenses = parser.parse_expenses(sources.expenses);
        let bank = sources
            .bank_statement
            .map(|content| parser.parse_bank_statement(content));

        let classifier = ExpenseClassifier::new(config);
        let classified = classifier.classify(&expenses.records);
        let summary = classifier.summarize(&classified);
        debug!(
            "Classification {:.1}% complete, ready: {}",
            summary.percent_classified, summary.ready
        );

        Ok(Self::assemble(
            config,
            revenues,
            classified,
            summary,
            expenses.report,
            bank,
        ))
    }

    /// Same as [`DrePipeline::process`] for sources already read into cell
    /// matrices (spreadsheets, [`read_rows`]).
    pub fn process_rows(
        config: &PipelineConfig,
        revenues: &[Vec<String>],
        expenses: &[Vec<String>],
        bank_statement: Option<&[Vec<String>]>,
    ) -> Result<PipelineReport> {
        config.validate()?;

        let parser = LedgerParser::new(&config.categories);
        let revenues = parser.parse_revenue_rows(revenues);
        let expenses = parser.parse_expense_rows(expenses);
        let bank = bank_statement.map(|rows| parser.parse_bank_rows(rows));

        let classifier = ExpenseClassifier::new(config);
        let classified = classifier.classify(&expenses.records);
        let summary = classifier.summarize(&classified);

        Ok(Self::assemble(
            config,
            revenues,
            classified,
            summary,
            expenses.report,
            bank,
        ))
    }

    /// Generates the statement and checks it balances within `tolerance`.
    pub fn process_with_verification(
        config: &PipelineConfig,
        sources: &LedgerSources<'_>,
        tolerance: f64,
    ) -> Result<PipelineReport> {
        let report = Self::process(config, sources)?;
        report.statement.verify(tolerance)?;
        Ok(report)
    }

    fn assemble(
        config: &PipelineConfig,
        revenues: ParseOutcome<ParsedRevenue>,
        classified: Vec<ClassifiedExpense>,
        summary: ClassificationSummary,
        expense_report: ParseReport,
        bank: Option<ParseOutcome<BankTransaction>>,
    ) -> PipelineReport {
        let records: Vec<ExpenseRecord> = classified.iter().cloned().map(Into::into).collect();
        let statement = DreEngine::new(config).generate(&revenues.records, &records);

        let (bank_transactions, bank_report) = match bank {
            Some(outcome) => (outcome.records, Some(outcome.report)),
            None => (Vec::new(), None),
        };

        let reconciliation = bank_report
            .as_ref()
            .map(|_| reconcile(&revenues.records, &records, &bank_transactions));

        if let Some(analysis) = &reconciliation {
            for alert in &analysis.alerts {
                info!("Reconciliation alert: {}", alert);
            }
        }

        PipelineReport {
            revenues: revenues.records,
            expenses: classified,
            bank_transactions,
            summary,
            statement,
            reconciliation,
            diagnostics: PipelineDiagnostics {
                revenues: revenues.report,
                expenses: expense_report,
                bank_statement: bank_report,
            },
        }
    }
}

pub fn process_ledger(config: &PipelineConfig, sources: &LedgerSources<'_>) -> Result<PipelineReport> {
    DrePipeline::process(config, sources)
}

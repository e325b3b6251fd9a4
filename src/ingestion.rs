//! Tolerant parsing of delimited ledger exports.
//!
//! Every source is reduced to a header-first matrix of trimmed cells. Data
//! rows are read positionally: three columns are `date, description, amount`,
//! four or more are `date, description, category, amount` (for bank
//! statements the third column is the credit/debit marker). Malformed rows are
//! skipped and counted in a [`ParseReport`], never turned into errors.

use crate::categorize::{default_rules, CategoryRules};
use crate::error::Result;
use crate::normalize::{fold, parse_amount, today, try_normalize_date};
use crate::schema::{BankTransaction, ParsedExpense, ParsedRevenue, TransactionType};
use chrono::NaiveDate;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Read;

pub const DEFAULT_REVENUE_DESCRIPTION: &str = "Receita sem descrição";
pub const DEFAULT_EXPENSE_DESCRIPTION: &str = "Despesa sem descrição";
pub const DEFAULT_TRANSACTION_DESCRIPTION: &str = "Transação sem descrição";

/// Counts of everything the parser saw, including what it dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParseReport {
    #[schemars(description = "Non-blank rows after the header")]
    pub rows_seen: usize,
    pub header_rows: usize,
    pub blank_lines: usize,
    #[schemars(description = "Rows with fewer than three columns")]
    pub short_rows: usize,
    #[schemars(description = "Rows dropped because the amount was zero, unreadable or (for revenues) negative")]
    pub dropped_amounts: usize,
    #[schemars(description = "Records whose date could not be read and was set to today")]
    pub defaulted_dates: usize,
    pub records: usize,
}

impl ParseReport {
    pub fn skipped_rows(&self) -> usize {
        self.short_rows + self.dropped_amounts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome<T> {
    pub records: Vec<T>,
    pub report: ParseReport,
}

struct Matrix {
    rows: Vec<Vec<String>>,
    blank_lines: usize,
}

fn clean_cell(cell: &str) -> String {
    let trimmed = cell.trim();
    let trimmed = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    trimmed
        .strip_suffix(['"', '\''])
        .unwrap_or(trimmed)
        .to_string()
}

fn split_content(content: &str) -> Matrix {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut blank_lines = 0;
    let mut rows = Vec::new();

    for line in content.trim().split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            blank_lines += 1;
            continue;
        }

        let separator = if line.contains(';') { ';' } else { ',' };
        rows.push(line.split(separator).map(clean_cell).collect());
    }

    if content.trim().is_empty() {
        blank_lines = 0;
    }

    Matrix { rows, blank_lines }
}

/// Splits raw delimited text into cell rows.
///
/// Each line picks its own separator: `;` when present, otherwise `,`. Cells
/// are trimmed and lose one surrounding quote. Blank lines are dropped.
pub fn split_rows(content: &str) -> Vec<Vec<String>> {
    split_content(content).rows
}

/// Reads a CSV/TSV-like stream into a header-first cell matrix.
///
/// The delimiter is sniffed from the first non-blank line (`;`, then tab,
/// then `,`). Quoted fields may contain the delimiter, and rows may have any
/// number of cells.
pub fn read_rows<R: Read>(mut reader: R) -> Result<Vec<Vec<String>>> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let first_line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let delimiter = if first_line.contains(';') {
        b';'
    } else if first_line.contains('\t') {
        b'\t'
    } else {
        b','
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }

    debug!(
        "read_rows: {} rows with delimiter {:?}",
        rows.len(),
        delimiter as char
    );

    Ok(rows)
}

struct RecordRow<'r> {
    date: &'r str,
    description: &'r str,
    category: &'r str,
    amount: &'r str,
}

impl<'r> RecordRow<'r> {
    fn from_cells(cells: &'r [String]) -> Option<Self> {
        match cells {
            [date, description, amount] => Some(Self {
                date,
                description,
                category: description,
                amount,
            }),
            [date, description, category, amount, ..] => Some(Self {
                date,
                description,
                category,
                amount,
            }),
            _ => None,
        }
    }
}

fn read_date(text: &str, report: &mut ParseReport) -> NaiveDate {
    try_normalize_date(text).unwrap_or_else(|| {
        debug!("Unreadable date {:?}, using today", text);
        report.defaulted_dates += 1;
        today()
    })
}

fn or_default(description: &str, fallback: &str) -> String {
    if description.is_empty() {
        fallback.to_string()
    } else {
        description.to_string()
    }
}

fn is_credit_marker(token: &str) -> bool {
    let folded = fold(token.trim());
    folded.contains("cred") || folded == "c"
}

/// Parses ledger sources against a set of category rules.
pub struct LedgerParser<'a> {
    rules: &'a CategoryRules,
}

impl<'a> LedgerParser<'a> {
    pub fn new(rules: &'a CategoryRules) -> Self {
        Self { rules }
    }

    pub fn parse_revenues(&self, content: &str) -> ParseOutcome<ParsedRevenue> {
        let matrix = split_content(content);
        self.revenues_from(&matrix.rows, matrix.blank_lines)
    }

    pub fn parse_revenue_rows(&self, rows: &[Vec<String>]) -> ParseOutcome<ParsedRevenue> {
        self.revenues_from(rows, 0)
    }

    pub fn parse_expenses(&self, content: &str) -> ParseOutcome<ParsedExpense> {
        let matrix = split_content(content);
        self.expenses_from(&matrix.rows, matrix.blank_lines)
    }

    pub fn parse_expense_rows(&self, rows: &[Vec<String>]) -> ParseOutcome<ParsedExpense> {
        self.expenses_from(rows, 0)
    }

    pub fn parse_bank_statement(&self, content: &str) -> ParseOutcome<BankTransaction> {
        let matrix = split_content(content);
        bank_from(&matrix.rows, matrix.blank_lines)
    }

    pub fn parse_bank_rows(&self, rows: &[Vec<String>]) -> ParseOutcome<BankTransaction> {
        bank_from(rows, 0)
    }

    fn revenues_from(&self, rows: &[Vec<String>], blank_lines: usize) -> ParseOutcome<ParsedRevenue> {
        walk_rows("revenues", rows, blank_lines, |cells, report| {
            let row = RecordRow::from_cells(cells)?;
            let amount = parse_amount(row.amount);
            if amount <= 0.0 {
                debug!("Skipping revenue row with amount {:?}", row.amount);
                report.dropped_amounts += 1;
                return None;
            }

            Some(ParsedRevenue {
                date: read_date(row.date, report),
                description: or_default(row.description, DEFAULT_REVENUE_DESCRIPTION),
                category: self
                    .rules
                    .categorize_revenue(row.description, Some(row.category)),
                amount,
            })
        })
    }

    fn expenses_from(&self, rows: &[Vec<String>], blank_lines: usize) -> ParseOutcome<ParsedExpense> {
        walk_rows("expenses", rows, blank_lines, |cells, report| {
            let row = RecordRow::from_cells(cells)?;
            let amount = parse_amount(row.amount).abs();
            if amount == 0.0 {
                debug!("Skipping expense row with amount {:?}", row.amount);
                report.dropped_amounts += 1;
                return None;
            }

            Some(ParsedExpense {
                date: read_date(row.date, report),
                description: or_default(row.description, DEFAULT_EXPENSE_DESCRIPTION),
                category: self
                    .rules
                    .categorize_expense(row.description, Some(row.category)),
                amount,
            })
        })
    }
}

fn bank_from(rows: &[Vec<String>], blank_lines: usize) -> ParseOutcome<BankTransaction> {
    walk_rows("bank statement", rows, blank_lines, |cells, report| {
        let (date, description, signed, marker) = match cells {
            [date, description, value] => (date, description, parse_amount(value), None),
            [date, description, marker, value, ..] => {
                (date, description, parse_amount(value), Some(marker.as_str()))
            }
            _ => return None,
        };

        let amount = signed.abs();
        if amount == 0.0 {
            debug!("Skipping bank row without amount: {:?}", cells);
            report.dropped_amounts += 1;
            return None;
        }

        let credit = match marker {
            Some(token) => is_credit_marker(token),
            None => signed >= 0.0,
        };

        Some(BankTransaction {
            date: read_date(date, report),
            description: or_default(description, DEFAULT_TRANSACTION_DESCRIPTION),
            amount,
            transaction_type: if credit {
                TransactionType::Credit
            } else {
                TransactionType::Debit
            },
        })
    })
}

/// Drives a header-first matrix through `build`, doing the shared row
/// bookkeeping. `build` returns `None` for rows it drops and records why.
fn walk_rows<T>(
    kind: &str,
    rows: &[Vec<String>],
    blank_lines: usize,
    mut build: impl FnMut(&[String], &mut ParseReport) -> Option<T>,
) -> ParseOutcome<T> {
    let mut report = ParseReport {
        blank_lines,
        ..ParseReport::default()
    };
    let mut records = Vec::new();

    let mut data = rows.iter().skip_while(|row| is_blank(row));
    if data.next().is_some() {
        report.header_rows = 1;
    }
    report.blank_lines += rows.iter().take_while(|row| is_blank(row)).count();

    for (index, row) in data.enumerate() {
        if is_blank(row) {
            report.blank_lines += 1;
            continue;
        }

        report.rows_seen += 1;

        if row.len() < 3 {
            debug!(
                "Skipping {} row {}: {} column(s)",
                kind,
                index + 1,
                row.len()
            );
            report.short_rows += 1;
            continue;
        }

        if let Some(record) = build(row, &mut report) {
            records.push(record);
        }
    }

    report.records = records.len();
    info!(
        "Parsed {} {} record(s) from {} row(s), {} skipped",
        report.records,
        kind,
        report.rows_seen,
        report.skipped_rows()
    );

    ParseOutcome { records, report }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

pub fn parse_revenues(content: &str) -> ParseOutcome<ParsedRevenue> {
    LedgerParser::new(default_rules()).parse_revenues(content)
}

pub fn parse_expenses(content: &str) -> ParseOutcome<ParsedExpense> {
    LedgerParser::new(default_rules()).parse_expenses(content)
}

pub fn parse_bank_statement(content: &str) -> ParseOutcome<BankTransaction> {
    LedgerParser::new(default_rules()).parse_bank_statement(content)
}

pub fn parse_revenue_rows(rows: &[Vec<String>]) -> ParseOutcome<ParsedRevenue> {
    LedgerParser::new(default_rules()).parse_revenue_rows(rows)
}

pub fn parse_expense_rows(rows: &[Vec<String>]) -> ParseOutcome<ParsedExpense> {
    LedgerParser::new(default_rules()).parse_expense_rows(rows)
}

pub fn parse_bank_rows(rows: &[Vec<String>]) -> ParseOutcome<BankTransaction> {
    LedgerParser::new(default_rules()).parse_bank_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_short_row_is_skipped() {
        let content = "Data;Descrição;Categoria;Valor\n01/03/2024;Consulta;Serviços;150,00\n02/03/2024;Incompleta\n";
        let outcome = parse_revenues(content);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.report.short_rows, 1);
        assert_eq!(outcome.report.rows_seen, 2);
        assert_eq!(outcome.report.header_rows, 1);

        let revenue = &outcome.records[0];
        assert_eq!(revenue.date, ymd(2024, 3, 1));
        assert_eq!(revenue.amount, 150.0);
        assert_eq!(revenue.category, "Receita de Serviços");
    }

    #[test]
    fn test_three_columns_with_bom_crlf_and_quotes() {
        let content = "\u{feff}Data,Histórico,Valor\r\n\"05/03/2024\",\"Consulta particular\",\"R$ 300\"\r\n\r\n2024-03-06,Exame,-20\r\n";
        let outcome = parse_revenues(content);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].description, "Consulta particular");
        assert_eq!(outcome.records[0].amount, 300.0);
        assert_eq!(outcome.report.blank_lines, 1);
        // negative revenue is dropped
        assert_eq!(outcome.report.dropped_amounts, 1);
    }

    #[test]
    fn test_expenses_use_absolute_amounts() {
        let content = "Data;Descrição;Categoria;Valor\n\
                       10/03/2024;Aluguel;Administrativas;-2.000,00\n\
                       11/03/2024;;Pessoal;500\n\
                       12/03/2024;Taxa zerada;Impostos;0,00\n";
        let outcome = parse_expenses(content);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].amount, 2000.0);
        assert_eq!(outcome.records[0].category, "Administrativas");
        assert_eq!(outcome.records[1].description, DEFAULT_EXPENSE_DESCRIPTION);
        assert_eq!(outcome.records[1].category, "Pessoal");
        assert_eq!(outcome.report.dropped_amounts, 1);
    }

    #[test]
    fn test_unreadable_date_defaults_to_today() {
        let outcome = parse_expenses("Data;Descrição;Valor\nontem;Café;12,50\n");

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.report.defaulted_dates, 1);
        let age = (today() - outcome.records[0].date).num_days().abs();
        assert!(age <= 1);
    }

    #[test]
    fn test_bank_statement_layouts() {
        let three = parse_bank_statement("Data;Histórico;Valor\n01/03/2024;PIX recebido;1.500,00\n02/03/2024;Boleto;-300,00\n");
        assert_eq!(three.records.len(), 2);
        assert!(three.records[0].is_credit());
        assert_eq!(three.records[1].transaction_type, TransactionType::Debit);
        assert_eq!(three.records[1].amount, 300.0);

        let four = parse_bank_statement("Data;Histórico;Tipo;Valor\n01/03/2024;TED;Crédito;800\n02/03/2024;Tarifa;D;15\n03/03/2024;Depósito;C;50\n");
        let kinds: Vec<bool> = four.records.iter().map(|t| t.is_credit()).collect();
        assert_eq!(kinds, vec![true, false, true]);
    }

    #[test]
    fn test_matrix_rows_share_the_contract() {
        let rows = vec![
            vec!["Data".to_string(), "Descrição".to_string(), "Valor".to_string()],
            vec![String::new(), String::new(), String::new()],
            vec!["15/03/2024".to_string(), "Material médico".to_string(), "89,90".to_string()],
            vec!["x".to_string()],
        ];
        let outcome = parse_expense_rows(&rows);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].amount, 89.9);
        assert_eq!(outcome.report.blank_lines, 1);
        assert_eq!(outcome.report.short_rows, 1);
    }

    #[test]
    fn test_read_rows_handles_quoted_delimiters() {
        let content = "Data,Descrição,Valor\n01/03/2024,\"Consulta, retorno\",\"1.234,56\"\n02/03/2024,Curta\n";
        let rows = read_rows(content.as_bytes()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][1], "Consulta, retorno");
        assert_eq!(rows[2].len(), 2);

        let outcome = parse_revenue_rows(&rows);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].amount, 1234.56);
        assert_eq!(outcome.report.short_rows, 1);
    }

    #[test]
    fn test_read_rows_sniffs_tabs() {
        let content = "Data\tDescrição\tValor\n01/03/2024\tConsulta\t200\n";
        let rows = read_rows(content.as_bytes()).unwrap();
        assert_eq!(rows[1], vec!["01/03/2024", "Consulta", "200"]);
    }

    #[test]
    fn test_empty_content() {
        let outcome = parse_revenues("   \n");
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.report, ParseReport::default());
        assert!(split_rows("").is_empty());
    }
}

use crate::error::{DreError, Result};
use crate::schema::TaxRegime;
use crate::tax::TaxCategory;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RevenueTaxes {
    pub pis: f64,
    pub cofins: f64,
    pub iss: f64,
    pub icms: f64,
    pub simples: f64,
    pub other: f64,
    pub total: f64,
}

impl RevenueTaxes {
    /// Adds an amount to its line. Profit-scoped categories land in `other`.
    pub fn add(&mut self, category: TaxCategory, amount: f64) {
        match category {
            TaxCategory::Pis => self.pis += amount,
            TaxCategory::Cofins => self.cofins += amount,
            TaxCategory::Iss => self.iss += amount,
            TaxCategory::Icms => self.icms += amount,
            TaxCategory::Simples => self.simples += amount,
            _ => self.other += amount,
        }
    }

    pub fn with_total(mut self) -> Self {
        self.total = self.pis + self.cofins + self.iss + self.icms + self.simples + self.other;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProfitTaxes {
    pub irpj: f64,
    pub csll: f64,
    pub other: f64,
    pub total: f64,
}

impl ProfitTaxes {
    /// Adds an amount to its line. Revenue-scoped categories land in `other`.
    pub fn add(&mut self, category: TaxCategory, amount: f64) {
        match category {
            TaxCategory::Irpj => self.irpj += amount,
            TaxCategory::Csll => self.csll += amount,
            _ => self.other += amount,
        }
    }

    pub fn with_total(mut self) -> Self {
        self.total = self.irpj + self.csll + self.other;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OperatingExpenses {
    pub personnel: f64,
    pub administrative: f64,
    pub sales: f64,
    pub financial: f64,
    pub other: f64,
    pub total: f64,
}

impl OperatingExpenses {
    pub fn with_total(mut self) -> Self {
        self.total = self.personnel + self.administrative + self.sales + self.financial + self.other;
        self
    }
}

/// Whether a tax block was summed from recorded payments or estimated from
/// the regime rate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxSource {
    Recorded,
    Estimated,
    None,
}

/// Income statement (DRE) for one period.
///
/// Always produced wholesale by the engine; the subtotal identities hold by
/// construction and can be re-checked with [`DreStatement::verify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DreStatement {
    pub regime: TaxRegime,
    pub gross_revenue: f64,
    pub revenue_taxes: RevenueTaxes,
    pub revenue_taxes_source: TaxSource,
    pub net_revenue: f64,
    pub cost_of_services: f64,
    pub gross_profit: f64,
    pub operating_expenses: OperatingExpenses,
    pub fixed_expenses_total: f64,
    pub variable_expenses_total: f64,
    #[schemars(description = "Non-tax expenses without a fixed/variable type; excluded from both totals above")]
    pub unclassified_expenses_total: f64,
    pub operating_profit: f64,
    pub depreciation: f64,
    pub amortization: f64,
    pub ebitda: f64,
    pub other_income_expense: f64,
    pub profit_before_tax: f64,
    pub profit_taxes: ProfitTaxes,
    pub profit_taxes_source: TaxSource,
    pub net_profit: f64,
    pub gross_margin_percent: f64,
    pub operating_margin_percent: f64,
    pub ebitda_margin_percent: f64,
    pub net_margin_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatementLine {
    pub code: String,
    pub label: String,
    pub value: f64,
    pub depth: u8,
}

impl StatementLine {
    fn new(code: &str, label: &str, value: f64, depth: u8) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
            value,
            depth,
        }
    }
}

impl DreStatement {
    pub fn verify(&self, tolerance: f64) -> Result<()> {
        let identities = [
            (
                "net_revenue",
                self.gross_revenue - self.revenue_taxes.total,
                self.net_revenue,
            ),
            (
                "gross_profit",
                self.net_revenue - self.cost_of_services,
                self.gross_profit,
            ),
            (
                "operating_profit",
                self.gross_profit - self.operating_expenses.total,
                self.operating_profit,
            ),
            (
                "profit_before_tax",
                self.operating_profit + self.other_income_expense,
                self.profit_before_tax,
            ),
            (
                "net_profit",
                self.profit_before_tax - self.profit_taxes.total,
                self.net_profit,
            ),
        ];

        for (line, expected, actual) in identities {
            if (expected - actual).abs() > tolerance {
                return Err(DreError::StatementImbalance {
                    line: line.to_string(),
                    expected,
                    actual,
                });
            }
        }

        Ok(())
    }

    /// Flattens the statement into display order for export collaborators.
    pub fn lines(&self) -> Vec<StatementLine> {
        let rt = &self.revenue_taxes;
        let opex = &self.operating_expenses;
        let pt = &self.profit_taxes;

        vec![
            StatementLine::new("gross_revenue", "Receita Bruta", self.gross_revenue, 0),
            StatementLine::new("revenue_taxes", "(-) Impostos sobre Receita", rt.total, 0),
            StatementLine::new("revenue_taxes.pis", "PIS", rt.pis, 1),
            StatementLine::new("revenue_taxes.cofins", "COFINS", rt.cofins, 1),
            StatementLine::new("revenue_taxes.iss", "ISS", rt.iss, 1),
            StatementLine::new("revenue_taxes.icms", "ICMS", rt.icms, 1),
            StatementLine::new("revenue_taxes.simples", "Simples Nacional", rt.simples, 1),
            StatementLine::new("revenue_taxes.other", "Outros", rt.other, 1),
            StatementLine::new("net_revenue", "Receita Líquida", self.net_revenue, 0),
            StatementLine::new("cost_of_services", "(-) Custo dos Serviços", self.cost_of_services, 0),
            StatementLine::new("gross_profit", "Lucro Bruto", self.gross_profit, 0),
            StatementLine::new("operating_expenses", "(-) Despesas Operacionais", opex.total, 0),
            StatementLine::new("operating_expenses.personnel", "Pessoal", opex.personnel, 1),
            StatementLine::new("operating_expenses.administrative", "Administrativas", opex.administrative, 1),
            StatementLine::new("operating_expenses.sales", "Vendas e Marketing", opex.sales, 1),
            StatementLine::new("operating_expenses.financial", "Financeiras", opex.financial, 1),
            StatementLine::new("operating_expenses.other", "Outras", opex.other, 1),
            StatementLine::new("operating_profit", "Lucro Operacional", self.operating_profit, 0),
            StatementLine::new("ebitda", "EBITDA", self.ebitda, 1),
            StatementLine::new("other_income_expense", "Outras Receitas/Despesas", self.other_income_expense, 0),
            StatementLine::new("profit_before_tax", "Lucro antes dos Impostos", self.profit_before_tax, 0),
            StatementLine::new("profit_taxes", "(-) Impostos sobre Lucro", pt.total, 0),
            StatementLine::new("profit_taxes.irpj", "IRPJ", pt.irpj, 1),
            StatementLine::new("profit_taxes.csll", "CSLL", pt.csll, 1),
            StatementLine::new("profit_taxes.other", "Outros", pt.other, 1),
            StatementLine::new("net_profit", "Lucro Líquido", self.net_profit, 0),
        ]
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["code", "label", "value", "depth"])?;

        for line in self.lines() {
            writer.write_record([
                line.code,
                line.label,
                format!("{:.2}", line.value),
                line.depth.to_string(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| DreError::Io(e.into_error()))?;
        String::from_utf8(bytes)
            .map_err(|e| DreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

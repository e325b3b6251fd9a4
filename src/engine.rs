use crate::categorize::{ExpenseCategory, COST_OF_SERVICES};
use crate::config::PipelineConfig;
use crate::normalize::fold;
use crate::schema::{ExpenseRecord, ExpenseType, ParsedRevenue, TaxRegime, TaxScope};
use crate::statement::{DreStatement, OperatingExpenses, ProfitTaxes, RevenueTaxes, TaxSource};
use crate::tax::{
    effective_tax_scope, estimate_profit_taxes, estimate_revenue_taxes, tax_line, TaxCategory,
};
use log::{debug, info};

/// Where an expense lands on the statement. The buckets are disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    RevenueTax(TaxCategory),
    ProfitTax(TaxCategory),
    CostOfServices,
    OtherIncomeExpense,
    Operating(ExpenseCategory),
}

#[derive(Default)]
struct Buckets {
    revenue_taxes: RevenueTaxes,
    profit_taxes: ProfitTaxes,
    cost_of_services: f64,
    other_income_expense: f64,
    operating: OperatingExpenses,
    depreciation: f64,
    amortization: f64,
}

#[derive(Default)]
struct TypeTotals {
    fixed: f64,
    variable: f64,
    unclassified: f64,
}

/// Rolls revenues and classified expenses into a [`DreStatement`].
///
/// Generation is pure: the inputs are only read, and the same inputs always
/// yield the same statement. Callers regenerate after every edit.
pub struct DreEngine<'a> {
    config: &'a PipelineConfig,
}

impl<'a> DreEngine<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, revenues: &[ParsedRevenue], expenses: &[ExpenseRecord]) -> DreStatement {
        let regime = self.config.regime;
        let rates = self.config.rates.for_regime(regime);

        info!(
            "Generating DRE from {} revenues and {} expenses ({})",
            revenues.len(),
            expenses.len(),
            regime
        );

        let gross_revenue: f64 = revenues.iter().map(|r| r.amount).sum();
        let buckets = self.partition(expenses);

        let (revenue_taxes, revenue_taxes_source) = if buckets.revenue_taxes.total == 0.0 {
            debug!("No revenue taxes recorded, estimating from {} rates", regime);
            let estimated = estimate_revenue_taxes(rates, gross_revenue);
            (estimated, estimated_source(estimated.total))
        } else {
            (buckets.revenue_taxes, TaxSource::Recorded)
        };

        let net_revenue = gross_revenue - revenue_taxes.total;
        let gross_profit = net_revenue - buckets.cost_of_services;
        let operating_profit = gross_profit - buckets.operating.total;
        let ebitda = operating_profit + buckets.depreciation + buckets.amortization;
        let profit_before_tax = operating_profit + buckets.other_income_expense;

        let (profit_taxes, profit_taxes_source) = if buckets.profit_taxes.total != 0.0 {
            (buckets.profit_taxes, TaxSource::Recorded)
        } else if regime != TaxRegime::SimplesNacional {
            debug!("No profit taxes recorded, estimating from {} rates", regime);
            let estimated = estimate_profit_taxes(regime, rates, gross_revenue, profit_before_tax);
            (estimated, estimated_source(estimated.total))
        } else {
            (ProfitTaxes::default(), TaxSource::None)
        };

        let net_profit = profit_before_tax - profit_taxes.total;
        let types = self.type_totals(expenses);

        let margin = |profit: f64| {
            if net_revenue > 0.0 {
                profit / net_revenue * 100.0
            } else {
                0.0
            }
        };

        DreStatement {
            regime,
            gross_revenue,
            revenue_taxes,
            revenue_taxes_source,
            net_revenue,
            cost_of_services: buckets.cost_of_services,
            gross_profit,
            operating_expenses: buckets.operating,
            fixed_expenses_total: types.fixed,
            variable_expenses_total: types.variable,
            unclassified_expenses_total: types.unclassified,
            operating_profit,
            depreciation: buckets.depreciation,
            amortization: buckets.amortization,
            ebitda,
            other_income_expense: buckets.other_income_expense,
            profit_before_tax,
            profit_taxes,
            profit_taxes_source,
            net_profit,
            gross_margin_percent: margin(gross_profit),
            operating_margin_percent: margin(operating_profit),
            ebitda_margin_percent: margin(ebitda),
            net_margin_percent: margin(net_profit),
        }
    }

    /// Decides the statement bucket of one expense.
    pub fn bucket_of(&self, record: &ExpenseRecord) -> Bucket {
        let keywords = &self.config.tax_keywords;

        if let Some(scope) = effective_tax_scope(record, keywords) {
            let line = tax_line(record, scope, keywords);
            return match scope {
                TaxScope::Revenue => Bucket::RevenueTax(line),
                TaxScope::Profit => Bucket::ProfitTax(line),
            };
        }

        let expense = record.expense();
        let category = self
            .config
            .categories
            .categorize_expense(&expense.description, Some(&expense.category));

        if category == COST_OF_SERVICES {
            Bucket::CostOfServices
        } else if expense.amount < 0.0 {
            Bucket::OtherIncomeExpense
        } else {
            Bucket::Operating(ExpenseCategory::from_label(&category))
        }
    }

    fn partition(&self, expenses: &[ExpenseRecord]) -> Buckets {
        let mut buckets = Buckets::default();

        for record in expenses {
            let amount = record.amount();

            match self.bucket_of(record) {
                Bucket::RevenueTax(line) => buckets.revenue_taxes.add(line, amount),
                Bucket::ProfitTax(line) => buckets.profit_taxes.add(line, amount),
                Bucket::CostOfServices => buckets.cost_of_services += amount,
                Bucket::OtherIncomeExpense => buckets.other_income_expense += amount,
                Bucket::Operating(category) => {
                    let operating = &mut buckets.operating;
                    match category {
                        ExpenseCategory::Personnel => operating.personnel += amount,
                        ExpenseCategory::Administrative => operating.administrative += amount,
                        ExpenseCategory::SalesAndMarketing => operating.sales += amount,
                        ExpenseCategory::Financial => operating.financial += amount,
                        _ => operating.other += amount,
                    }

                    let description = fold(record.description());
                    if description.contains("deprecia") {
                        buckets.depreciation += amount;
                    }
                    if description.contains("amortiza") {
                        buckets.amortization += amount;
                    }
                }
            }
        }

        buckets.revenue_taxes = buckets.revenue_taxes.with_total();
        buckets.profit_taxes = buckets.profit_taxes.with_total();
        buckets.operating = buckets.operating.with_total();
        buckets
    }

    /// Fixed/variable totals over non-tax expenses. Untyped expenses land in
    /// `unclassified` and in neither of the other two.
    fn type_totals(&self, expenses: &[ExpenseRecord]) -> TypeTotals {
        let mut totals = TypeTotals::default();

        for record in expenses {
            if effective_tax_scope(record, &self.config.tax_keywords).is_some() {
                continue;
            }

            match record.expense_type() {
                Some(ExpenseType::Fixed) => totals.fixed += record.amount(),
                Some(ExpenseType::Variable) => totals.variable += record.amount(),
                None => totals.unclassified += record.amount(),
            }
        }

        totals
    }
}

fn estimated_source(total: f64) -> TaxSource {
    if total > 0.0 {
        TaxSource::Estimated
    } else {
        TaxSource::None
    }
}

/// Generates a statement with the default rate tables, policy and keyword
/// tables under `regime`.
pub fn generate_dre(
    revenues: &[ParsedRevenue],
    expenses: &[ExpenseRecord],
    regime: TaxRegime,
) -> DreStatement {
    let config = PipelineConfig::for_regime(regime);
    DreEngine::new(&config).generate(revenues, expenses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ClassifiedExpense, ParsedExpense};
    use chrono::NaiveDate;

    const EPS: f64 = 1e-9;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn revenue(amount: f64) -> ParsedRevenue {
        ParsedRevenue {
            date: date(),
            description: "Consulta".to_string(),
            category: "Receita de Serviços".to_string(),
            amount,
        }
    }

    fn expense(description: &str, category: &str, amount: f64) -> ParsedExpense {
        ParsedExpense {
            date: date(),
            description: description.to_string(),
            category: category.to_string(),
            amount,
        }
    }

    fn classified(description: &str, category: &str, amount: f64, kind: Option<ExpenseType>) -> ClassifiedExpense {
        let mut classified = ClassifiedExpense::new(
            expense(description, category, amount),
            kind.unwrap_or(ExpenseType::Variable),
        );
        classified.expense_type = kind;
        classified
    }

    fn manual_tax(description: &str, amount: f64, scope: TaxScope, category: &str) -> ExpenseRecord {
        let mut tax = classified(description, "Impostos", amount, None);
        tax.is_tax = Some(true);
        tax.tax_scope = Some(scope);
        tax.tax_category = Some(category.to_string());
        tax.into()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPS,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_manual_tax_and_fixed_rent_scenario() {
        let revenues = vec![revenue(10_000.0)];
        let expenses = vec![
            manual_tax("PIS", 600.0, TaxScope::Revenue, "PIS"),
            classified("Aluguel escritório", "Administrativas", 2000.0, Some(ExpenseType::Fixed)).into(),
        ];

        let dre = generate_dre(&revenues, &expenses, TaxRegime::SimplesNacional);

        assert_close(dre.gross_revenue, 10_000.0);
        assert_close(dre.revenue_taxes.total, 600.0);
        assert_close(dre.revenue_taxes.pis, 600.0);
        assert_eq!(dre.revenue_taxes_source, TaxSource::Recorded);
        assert_close(dre.net_revenue, 9400.0);
        assert_close(dre.cost_of_services, 0.0);
        assert_close(dre.gross_profit, 9400.0);
        assert_close(dre.operating_expenses.total, 2000.0);
        assert_close(dre.operating_expenses.administrative, 2000.0);
        assert_close(dre.operating_profit, 7400.0);
        assert_close(dre.fixed_expenses_total, 2000.0);
        assert_close(dre.variable_expenses_total, 0.0);
        assert_close(dre.profit_taxes.total, 0.0);
        assert_close(dre.net_profit, 7400.0);
        assert!(dre.verify(EPS).is_ok());
    }

    #[test]
    fn test_manual_false_suppresses_detection() {
        let revenues = vec![revenue(10_000.0)];

        let mut not_a_tax = classified("IRPJ referente a março", "", 1000.0, Some(ExpenseType::Fixed));
        not_a_tax.is_tax = Some(false);
        let dre = generate_dre(&revenues, &[not_a_tax.into()], TaxRegime::SimplesNacional);

        assert_close(dre.profit_taxes.total, 0.0);
        assert_close(dre.operating_expenses.total, 1000.0);
        assert_close(dre.fixed_expenses_total, 1000.0);
        // no revenue tax was recorded either, so the Simples estimate applies
        assert_eq!(dre.revenue_taxes_source, TaxSource::Estimated);
        assert_close(dre.revenue_taxes.simples, 600.0);

        let raw: ExpenseRecord = expense("IRPJ referente a março", "", 1000.0).into();
        let dre = generate_dre(&revenues, &[raw], TaxRegime::SimplesNacional);
        assert_close(dre.profit_taxes.irpj, 1000.0);
        assert_eq!(dre.profit_taxes_source, TaxSource::Recorded);
        assert_close(dre.operating_expenses.total, 0.0);
        assert_close(dre.fixed_expenses_total, 0.0);
    }

    #[test]
    fn test_bucket_routing() {
        let config = PipelineConfig::default();
        let engine = DreEngine::new(&config);

        let material: ExpenseRecord = expense("Material médico", "Custo dos Serviços", 300.0).into();
        assert_eq!(engine.bucket_of(&material), Bucket::CostOfServices);

        let refund: ExpenseRecord = expense("Estorno fornecedor", "", -150.0).into();
        assert_eq!(engine.bucket_of(&refund), Bucket::OtherIncomeExpense);

        let salary: ExpenseRecord = expense("Salário recepcionista", "", 2500.0).into();
        assert_eq!(engine.bucket_of(&salary), Bucket::Operating(ExpenseCategory::Personnel));

        let das: ExpenseRecord = expense("DAS competência 03", "", 500.0).into();
        assert_eq!(engine.bucket_of(&das), Bucket::RevenueTax(TaxCategory::Simples));

        let manual_profit = manual_tax("Guia trimestral", 90.0, TaxScope::Profit, "CSLL");
        assert_eq!(engine.bucket_of(&manual_profit), Bucket::ProfitTax(TaxCategory::Csll));
    }

    #[test]
    fn test_other_income_is_sign_preserving() {
        let revenues = vec![revenue(1000.0)];
        let expenses: Vec<ExpenseRecord> = vec![
            manual_tax("DAS", 60.0, TaxScope::Revenue, "simples"),
            expense("Estorno fornecedor", "", -150.0).into(),
        ];

        let dre = generate_dre(&revenues, &expenses, TaxRegime::SimplesNacional);
        assert_close(dre.other_income_expense, -150.0);
        assert_close(dre.profit_before_tax, dre.operating_profit - 150.0);
        assert!(dre.verify(EPS).is_ok());
    }

    #[test]
    fn test_margin_zero_guard() {
        let expenses: Vec<ExpenseRecord> = vec![expense("Aluguel", "Administrativas", 2000.0).into()];

        let dre = generate_dre(&[], &expenses, TaxRegime::LucroReal);
        assert_close(dre.net_revenue, 0.0);
        assert_eq!(dre.gross_margin_percent, 0.0);
        assert_eq!(dre.operating_margin_percent, 0.0);
        assert_eq!(dre.ebitda_margin_percent, 0.0);
        assert_eq!(dre.net_margin_percent, 0.0);
        // negative profit before tax is never taxed under lucro real
        assert_close(dre.profit_taxes.total, 0.0);
        assert_eq!(dre.profit_taxes_source, TaxSource::None);
    }

    #[test]
    fn test_margins() {
        let revenues = vec![revenue(10_000.0)];
        let expenses = vec![
            manual_tax("PIS", 600.0, TaxScope::Revenue, "PIS"),
            classified("Aluguel escritório", "Administrativas", 2000.0, Some(ExpenseType::Fixed)).into(),
        ];
        let dre = generate_dre(&revenues, &expenses, TaxRegime::SimplesNacional);

        assert_close(dre.gross_margin_percent, 100.0);
        assert_close(dre.operating_margin_percent, 7400.0 / 9400.0 * 100.0);
        assert_close(dre.net_margin_percent, 7400.0 / 9400.0 * 100.0);
    }

    #[test]
    fn test_generation_is_idempotent() {
        let revenues = vec![revenue(12_345.67), revenue(890.12)];
        let expenses: Vec<ExpenseRecord> = vec![
            expense("Material médico", "", 321.0).into(),
            expense("Energia elétrica", "", 410.5).into(),
            expense("COFINS", "", 98.7).into(),
            classified("Comissão parceiro", "Vendas", 150.0, Some(ExpenseType::Variable)).into(),
        ];

        let config = PipelineConfig::for_regime(TaxRegime::LucroPresumido);
        let engine = DreEngine::new(&config);
        let first = engine.generate(&revenues, &expenses);
        let second = engine.generate(&revenues, &expenses);

        assert_eq!(first, second);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_unclassified_expenses_are_excluded_from_type_totals() {
        let revenues = vec![revenue(5000.0)];
        let expenses: Vec<ExpenseRecord> = vec![
            classified("Aluguel", "Administrativas", 1000.0, Some(ExpenseType::Fixed)).into(),
            classified("Propaganda", "Vendas", 300.0, Some(ExpenseType::Variable)).into(),
            classified("Zeladoria", "", 200.0, None).into(),
            expense("Manutenção ar condicionado", "", 100.0).into(),
        ];

        let dre = generate_dre(&revenues, &expenses, TaxRegime::SimplesNacional);

        assert_close(dre.operating_expenses.total, 1600.0);
        assert_close(dre.fixed_expenses_total, 1000.0);
        assert_close(dre.variable_expenses_total, 300.0);
        assert_close(dre.unclassified_expenses_total, 300.0);
        assert!(dre.operating_expenses.total > dre.fixed_expenses_total + dre.variable_expenses_total);
    }

    #[test]
    fn test_depreciation_feeds_ebitda() {
        let revenues = vec![revenue(20_000.0)];
        let expenses: Vec<ExpenseRecord> = vec![
            manual_tax("DAS", 1200.0, TaxScope::Revenue, "SIMPLES"),
            expense("Depreciação equipamentos", "", 500.0).into(),
            expense("Amortização software", "", 200.0).into(),
        ];

        let dre = generate_dre(&revenues, &expenses, TaxRegime::SimplesNacional);
        assert_close(dre.depreciation, 500.0);
        assert_close(dre.amortization, 200.0);
        assert_close(dre.ebitda, dre.operating_profit + 700.0);
    }

    #[test]
    fn test_lucro_real_estimates_on_profit() {
        let revenues = vec![revenue(100_000.0)];
        let expenses: Vec<ExpenseRecord> = vec![expense("Salário equipe", "", 50_000.0).into()];

        let dre = generate_dre(&revenues, &expenses, TaxRegime::LucroReal);

        // PIS 1.65% + COFINS 7.6% + ISS 5%
        assert_close(dre.revenue_taxes.total, 14_250.0);
        assert_close(dre.profit_before_tax, 35_750.0);
        // 15% of pbt plus 10% above 20k
        assert_close(dre.profit_taxes.irpj, 35_750.0 * 0.15 + 15_750.0 * 0.10);
        assert_close(dre.profit_taxes.csll, 35_750.0 * 0.09);
        assert_eq!(dre.profit_taxes_source, TaxSource::Estimated);
        assert!(dre.verify(1e-6).is_ok());
    }
}

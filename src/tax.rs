//! Tax remittance detection and regime-based tax estimates.

use crate::config::{ProfitTaxBase, RegimeRates};
use crate::normalize::fold;
use crate::schema::{ClassifiedExpense, ExpenseRecord, TaxRegime, TaxScope};
use crate::statement::{ProfitTaxes, RevenueTaxes};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    Pis,
    Cofins,
    Iss,
    Icms,
    Simples,
    Irpj,
    Csll,
    Other,
}

impl TaxCategory {
    /// Scope of the named taxes. `Other` has no intrinsic scope.
    pub const fn scope(self) -> Option<TaxScope> {
        match self {
            Self::Pis | Self::Cofins | Self::Iss | Self::Icms | Self::Simples => {
                Some(TaxScope::Revenue)
            }
            Self::Irpj | Self::Csll => Some(TaxScope::Profit),
            Self::Other => None,
        }
    }

    /// Reads a manually entered tax category. Anything unrecognized is `Other`.
    pub fn from_label(label: &str) -> Self {
        match fold(label.trim()).as_str() {
            "pis" => Self::Pis,
            "cofins" => Self::Cofins,
            "iss" | "issqn" => Self::Iss,
            "icms" => Self::Icms,
            "simples" | "simples_nacional" | "simples nacional" | "das" => Self::Simples,
            "irpj" => Self::Irpj,
            "csll" => Self::Csll,
            _ => Self::Other,
        }
    }

    /// The category as it should be booked within `scope`: categories that
    /// belong to the other scope collapse to `Other`.
    pub fn within(self, scope: TaxScope) -> Self {
        match self.scope() {
            Some(own) if own == scope => self,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaxIdentification {
    pub scope: TaxScope,
    pub category: TaxCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaxRule {
    pub category: TaxCategory,
    pub scope: TaxScope,
    pub keywords: Vec<String>,
}

/// Ordered tax keyword rules; the first rule with a matching keyword wins.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaxKeywords {
    pub rules: Vec<TaxRule>,
}

const TAX_RULES: &[(TaxCategory, TaxScope, &[&str])] = &[
    (TaxCategory::Pis, TaxScope::Revenue, &["pis"]),
    (TaxCategory::Cofins, TaxScope::Revenue, &["cofins"]),
    (TaxCategory::Iss, TaxScope::Revenue, &["iss", "issqn"]),
    (TaxCategory::Icms, TaxScope::Revenue, &["icms"]),
    (
        TaxCategory::Simples,
        TaxScope::Revenue,
        &["simples nacional", "das", "simples"],
    ),
    (
        TaxCategory::Irpj,
        TaxScope::Profit,
        &["irpj", "imposto de renda pessoa juridica", "imposto de renda pj"],
    ),
    (
        TaxCategory::Csll,
        TaxScope::Profit,
        &["csll", "contribuicao social sobre lucro"],
    ),
    (
        TaxCategory::Other,
        TaxScope::Revenue,
        &["darf", "guia de imposto", "inss patronal", "fgts"],
    ),
];

impl Default for TaxKeywords {
    fn default() -> Self {
        Self {
            rules: TAX_RULES
                .iter()
                .map(|(category, scope, keywords)| TaxRule {
                    category: *category,
                    scope: *scope,
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                })
                .collect(),
        }
    }
}

impl TaxKeywords {
    /// Detects whether a description is a tax remittance. No keyword, no tax.
    pub fn identify(&self, description: &str) -> Option<TaxIdentification> {
        let folded = fold(description);
        self.rules
            .iter()
            .find(|rule| {
                rule.keywords
                    .iter()
                    .any(|keyword| folded.contains(fold(keyword).as_str()))
            })
            .map(|rule| TaxIdentification {
                scope: rule.scope,
                category: rule.category,
            })
    }
}

fn default_keywords() -> &'static TaxKeywords {
    static KEYWORDS: OnceLock<TaxKeywords> = OnceLock::new();
    KEYWORDS.get_or_init(TaxKeywords::default)
}

/// Detects a tax remittance with the built-in keyword table.
pub fn identify_tax(description: &str) -> Option<TaxIdentification> {
    default_keywords().identify(description)
}

/// Tax scope of an expense record, honouring manual flags before detection.
///
/// An explicit `true` routes by the manual scope (revenue when missing), an
/// explicit `false` is never a tax, and an unset flag falls back to keyword
/// detection.
pub fn effective_tax_scope(record: &ExpenseRecord, keywords: &TaxKeywords) -> Option<TaxScope> {
    resolve_scope(
        record.manual_tax_flag(),
        record.manual_tax_scope(),
        record.description(),
        keywords,
    )
}

/// Same precedence as [`effective_tax_scope`] for a classified expense.
pub fn classified_tax_scope(expense: &ClassifiedExpense, keywords: &TaxKeywords) -> Option<TaxScope> {
    resolve_scope(
        expense.is_tax,
        expense.tax_scope,
        &expense.expense.description,
        keywords,
    )
}

fn resolve_scope(
    manual: Option<bool>,
    manual_scope: Option<TaxScope>,
    description: &str,
    keywords: &TaxKeywords,
) -> Option<TaxScope> {
    match manual {
        Some(true) => Some(manual_scope.unwrap_or(TaxScope::Revenue)),
        Some(false) => None,
        None => keywords.identify(description).map(|hit| hit.scope),
    }
}

/// Statement line a tax record is booked on within `scope`. A manual tax
/// category wins; otherwise the line is re-derived from the description.
pub fn tax_line(record: &ExpenseRecord, scope: TaxScope, keywords: &TaxKeywords) -> TaxCategory {
    let category = match record.manual_tax_category() {
        Some(label) => TaxCategory::from_label(label),
        None => keywords
            .identify(record.description())
            .map(|hit| hit.category)
            .unwrap_or(TaxCategory::Other),
    };
    category.within(scope)
}

/// Revenue taxes estimated as each regime rate applied to gross revenue.
pub fn estimate_revenue_taxes(rates: &RegimeRates, gross_revenue: f64) -> RevenueTaxes {
    RevenueTaxes {
        pis: gross_revenue * rates.pis,
        cofins: gross_revenue * rates.cofins,
        iss: gross_revenue * rates.iss,
        icms: gross_revenue * rates.icms,
        simples: gross_revenue * rates.simples,
        other: 0.0,
        total: 0.0,
    }
    .with_total()
}

/// Profit taxes estimated from the regime rate tables.
///
/// Never estimated under Simples Nacional. Otherwise the rates apply to the
/// regime's base, which is only taxed when positive, and the IRPJ surcharge
/// applies to the slice of the base above its monthly threshold.
pub fn estimate_profit_taxes(
    regime: TaxRegime,
    rates: &RegimeRates,
    gross_revenue: f64,
    profit_before_tax: f64,
) -> ProfitTaxes {
    if regime == TaxRegime::SimplesNacional {
        return ProfitTaxes::default();
    }

    let base = match rates.profit_tax_base {
        ProfitTaxBase::GrossRevenue => gross_revenue,
        ProfitTaxBase::ProfitBeforeTax => profit_before_tax,
    };

    if base <= 0.0 {
        return ProfitTaxes::default();
    }

    let mut irpj = base * rates.irpj;
    if let Some(surcharge) = rates.irpj_surcharge {
        if base > surcharge.monthly_threshold {
            irpj += (base - surcharge.monthly_threshold) * surcharge.rate;
        }
    }

    ProfitTaxes {
        irpj,
        csll: base * rates.csll,
        other: 0.0,
        total: 0.0,
    }
    .with_total()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaxRateTables;
    use crate::schema::{ClassifiedExpense, ExpenseType, ParsedExpense};
    use chrono::NaiveDate;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_identify_revenue_taxes() {
        let hit = identify_tax("Pagamento PIS 03/2024").unwrap();
        assert_eq!(hit.scope, TaxScope::Revenue);
        assert_eq!(hit.category, TaxCategory::Pis);

        assert_eq!(identify_tax("COFINS").unwrap().category, TaxCategory::Cofins);
        assert_eq!(identify_tax("ISSQN prefeitura").unwrap().category, TaxCategory::Iss);
        assert_eq!(identify_tax("ICMS").unwrap().category, TaxCategory::Icms);
        assert_eq!(identify_tax("Guia DAS").unwrap().category, TaxCategory::Simples);
    }

    #[test]
    fn test_identify_profit_taxes() {
        let hit = identify_tax("IRPJ referente a março").unwrap();
        assert_eq!(hit.scope, TaxScope::Profit);
        assert_eq!(hit.category, TaxCategory::Irpj);

        let hit = identify_tax("Contribuição Social sobre Lucro").unwrap();
        assert_eq!(hit.category, TaxCategory::Csll);
    }

    #[test]
    fn test_identify_other_bucket_is_revenue_scoped() {
        let hit = identify_tax("FGTS funcionários").unwrap();
        assert_eq!(hit.scope, TaxScope::Revenue);
        assert_eq!(hit.category, TaxCategory::Other);
        assert!(identify_tax("Guia de imposto municipal").is_some());
    }

    #[test]
    fn test_no_keyword_means_not_a_tax() {
        assert_eq!(identify_tax("Aluguel escritório"), None);
        assert_eq!(identify_tax("Material médico"), None);
        assert_eq!(identify_tax(""), None);
    }

    #[test]
    fn test_category_within_scope() {
        assert_eq!(TaxCategory::Irpj.within(TaxScope::Revenue), TaxCategory::Other);
        assert_eq!(TaxCategory::Pis.within(TaxScope::Revenue), TaxCategory::Pis);
        assert_eq!(TaxCategory::from_label(" issqn "), TaxCategory::Iss);
        assert_eq!(TaxCategory::from_label("Taxa de lixo"), TaxCategory::Other);
    }

    fn record(description: &str, is_tax: Option<bool>, scope: Option<TaxScope>) -> ExpenseRecord {
        let expense = ParsedExpense {
            date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            description: description.to_string(),
            category: String::new(),
            amount: 100.0,
        };
        let mut classified = ClassifiedExpense::new(expense, ExpenseType::Variable);
        classified.is_tax = is_tax;
        classified.tax_scope = scope;
        classified.into()
    }

    #[test]
    fn test_manual_flag_precedence() {
        let keywords = TaxKeywords::default();

        let suppressed = record("IRPJ referente a março", Some(false), None);
        assert_eq!(effective_tax_scope(&suppressed, &keywords), None);

        let detected = record("IRPJ referente a março", None, None);
        assert_eq!(effective_tax_scope(&detected, &keywords), Some(TaxScope::Profit));

        let forced = record("Taxa de lixo", Some(true), None);
        assert_eq!(effective_tax_scope(&forced, &keywords), Some(TaxScope::Revenue));
        assert_eq!(tax_line(&forced, TaxScope::Revenue, &keywords), TaxCategory::Other);
    }

    #[test]
    fn test_tax_line_prefers_manual_category() {
        let keywords = TaxKeywords::default();
        let mut tagged = record("Guia DARF", Some(true), Some(TaxScope::Profit));
        if let ExpenseRecord::Classified(ref mut classified) = tagged {
            classified.tax_category = Some("csll".to_string());
        }
        assert_eq!(tax_line(&tagged, TaxScope::Profit, &keywords), TaxCategory::Csll);

        let revenue_side = record("IRPJ trimestral", Some(true), Some(TaxScope::Revenue));
        assert_eq!(tax_line(&revenue_side, TaxScope::Revenue, &keywords), TaxCategory::Other);
    }

    #[test]
    fn test_estimate_simples() {
        let tables = TaxRateTables::default();
        let rates = tables.for_regime(TaxRegime::SimplesNacional);
        let revenue = estimate_revenue_taxes(rates, 10_000.0);
        let profit = estimate_profit_taxes(TaxRegime::SimplesNacional, rates, 10_000.0, 5_000.0);
        assert!((revenue.simples - 600.0).abs() < EPS);
        assert!((revenue.total - 600.0).abs() < EPS);
        assert_eq!(profit.total, 0.0);
    }

    #[test]
    fn test_estimate_presumido_uses_gross_revenue() {
        let tables = TaxRateTables::default();
        let rates = tables.for_regime(TaxRegime::LucroPresumido);
        let revenue = estimate_revenue_taxes(rates, 10_000.0);
        let profit = estimate_profit_taxes(TaxRegime::LucroPresumido, rates, 10_000.0, -500.0);
        assert!((revenue.pis - 65.0).abs() < EPS);
        assert!((revenue.cofins - 300.0).abs() < EPS);
        assert!((revenue.iss - 500.0).abs() < EPS);
        assert!((revenue.total - 865.0).abs() < EPS);
        assert!((profit.irpj - 480.0).abs() < EPS);
        assert!((profit.csll - 288.0).abs() < EPS);
    }

    #[test]
    fn test_estimate_real_surcharge() {
        let tables = TaxRateTables::default();
        let rates = tables.for_regime(TaxRegime::LucroReal);

        let profit = estimate_profit_taxes(TaxRegime::LucroReal, rates, 100_000.0, 30_000.0);
        // 15% of 30k + 10% of the 10k above the threshold
        assert!((profit.irpj - 5_500.0).abs() < EPS);
        assert!((profit.csll - 2_700.0).abs() < EPS);

        let profit = estimate_profit_taxes(TaxRegime::LucroReal, rates, 100_000.0, -1.0);
        assert_eq!(profit.total, 0.0);
    }
}

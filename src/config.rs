use crate::categorize::CategoryRules;
use crate::classifier::ExpenseKeywords;
use crate::error::{DreError, Result};
use crate::schema::TaxRegime;
use crate::tax::TaxKeywords;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProfitTaxBase {
    #[schemars(description = "Rates are effective rates over gross revenue (presumed profit already folded in)")]
    GrossRevenue,

    #[schemars(description = "Rates apply to profit before tax, and only when it is positive")]
    ProfitBeforeTax,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IrpjSurcharge {
    #[schemars(description = "Additional IRPJ rate on the slice of profit above the threshold")]
    pub rate: f64,

    #[schemars(description = "Monthly profit threshold above which the surcharge applies")]
    pub monthly_threshold: f64,
}

/// Rates used to estimate taxes when a period has no recorded tax payments.
/// All rates are fractions (0.05 = 5%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegimeRates {
    #[serde(default)]
    pub simples: f64,
    #[serde(default)]
    pub pis: f64,
    #[serde(default)]
    pub cofins: f64,
    #[serde(default)]
    pub iss: f64,
    #[serde(default)]
    pub icms: f64,
    #[serde(default)]
    pub irpj: f64,
    #[serde(default)]
    pub csll: f64,
    pub profit_tax_base: ProfitTaxBase,
    #[serde(default)]
    pub irpj_surcharge: Option<IrpjSurcharge>,
}

impl RegimeRates {
    fn named_rates(&self) -> Vec<(&'static str, f64)> {
        let mut rates = vec![
            ("simples", self.simples),
            ("pis", self.pis),
            ("cofins", self.cofins),
            ("iss", self.iss),
            ("icms", self.icms),
            ("irpj", self.irpj),
            ("csll", self.csll),
        ];
        if let Some(surcharge) = self.irpj_surcharge {
            rates.push(("irpj_surcharge", surcharge.rate));
            rates.push(("irpj_surcharge_threshold", surcharge.monthly_threshold));
        }
        rates
    }
}

/// Per-regime rate tables. Injected into the statement engine so that
/// jurisdiction updates never touch aggregation code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaxRateTables {
    pub simples_nacional: RegimeRates,
    pub lucro_presumido: RegimeRates,
    pub lucro_real: RegimeRates,
}

impl Default for TaxRateTables {
    fn default() -> Self {
        Self {
            // Annex III average for health services, starting bracket
            simples_nacional: RegimeRates {
                simples: 0.06,
                pis: 0.0,
                cofins: 0.0,
                iss: 0.0,
                icms: 0.0,
                irpj: 0.0,
                csll: 0.0,
                profit_tax_base: ProfitTaxBase::GrossRevenue,
                irpj_surcharge: None,
            },
            // IRPJ 15% and CSLL 9% over a 32% presumed margin
            lucro_presumido: RegimeRates {
                simples: 0.0,
                pis: 0.0065,
                cofins: 0.03,
                iss: 0.05,
                icms: 0.0,
                irpj: 0.048,
                csll: 0.0288,
                profit_tax_base: ProfitTaxBase::GrossRevenue,
                irpj_surcharge: None,
            },
            lucro_real: RegimeRates {
                simples: 0.0,
                pis: 0.0165,
                cofins: 0.076,
                iss: 0.05,
                icms: 0.0,
                irpj: 0.15,
                csll: 0.09,
                profit_tax_base: ProfitTaxBase::ProfitBeforeTax,
                irpj_surcharge: Some(IrpjSurcharge {
                    rate: 0.10,
                    monthly_threshold: 20_000.0,
                }),
            },
        }
    }
}

impl TaxRateTables {
    pub fn for_regime(&self, regime: TaxRegime) -> &RegimeRates {
        match regime {
            TaxRegime::SimplesNacional => &self.simples_nacional,
            TaxRegime::LucroPresumido => &self.lucro_presumido,
            TaxRegime::LucroReal => &self.lucro_real,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let tables: Self = serde_json::from_str(json)?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<()> {
        for regime in TaxRegime::ALL {
            for (tax, rate) in self.for_regime(regime).named_rates() {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(DreError::InvalidRate {
                        regime: regime.to_string(),
                        tax: tax.to_string(),
                        rate,
                    });
                }
            }
        }
        Ok(())
    }
}

pub const CLASSIFIER_POLICY_VERSION: &str = "fixed-variable/v1";

/// Thresholds and weights of the fixed/variable scoring heuristic.
///
/// The similarity and variation thresholds have no documented derivation;
/// they are frozen to keep suggestions stable across releases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassifierPolicy {
    pub version: String,
    pub similarity_threshold: f64,
    pub min_significant_word_len: usize,
    pub min_recurrent_occurrences: usize,
    pub recurrence_cv_threshold: f64,
    pub close_deviation: f64,
    pub near_deviation: f64,
    pub keyword_weight: i32,
    pub category_weight: i32,
    pub close_deviation_bonus: i32,
    pub near_deviation_bonus: i32,
    pub frequent_occurrences: usize,
    pub frequent_bonus: i32,
    pub large_amount_threshold: f64,
    pub large_one_off_penalty: i32,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            version: CLASSIFIER_POLICY_VERSION.to_string(),
            similarity_threshold: 0.7,
            min_significant_word_len: 3,
            min_recurrent_occurrences: 2,
            recurrence_cv_threshold: 0.3,
            close_deviation: 0.2,
            near_deviation: 0.5,
            keyword_weight: 3,
            category_weight: 2,
            close_deviation_bonus: 2,
            near_deviation_bonus: 1,
            frequent_occurrences: 3,
            frequent_bonus: 1,
            large_amount_threshold: 10_000.0,
            large_one_off_penalty: 1,
        }
    }
}

impl ClassifierPolicy {
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(DreError::InvalidPolicy(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )))
            }
        };

        unit("similarity_threshold", self.similarity_threshold)?;
        unit("recurrence_cv_threshold", self.recurrence_cv_threshold)?;
        unit("close_deviation", self.close_deviation)?;
        unit("near_deviation", self.near_deviation)?;

        if self.close_deviation > self.near_deviation {
            return Err(DreError::InvalidPolicy(format!(
                "close_deviation ({}) must not exceed near_deviation ({})",
                self.close_deviation, self.near_deviation
            )));
        }

        if self.min_recurrent_occurrences < 2 {
            return Err(DreError::InvalidPolicy(
                "min_recurrent_occurrences must be at least 2".to_string(),
            ));
        }

        if !self.large_amount_threshold.is_finite() || self.large_amount_threshold < 0.0 {
            return Err(DreError::InvalidPolicy(format!(
                "large_amount_threshold must be finite and non-negative, got {}",
                self.large_amount_threshold
            )));
        }

        Ok(())
    }
}

/// Everything the pipeline needs besides the ledger data itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default)]
    pub regime: TaxRegime,

    #[serde(default)]
    pub rates: TaxRateTables,

    #[serde(default)]
    pub policy: ClassifierPolicy,

    #[serde(default)]
    pub categories: CategoryRules,

    #[serde(default)]
    pub tax_keywords: TaxKeywords,

    #[serde(default)]
    pub expense_keywords: ExpenseKeywords,
}

impl PipelineConfig {
    pub fn for_regime(regime: TaxRegime) -> Self {
        Self {
            regime,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.rates.validate()?;
        self.policy.validate()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

pub(crate) fn default_config() -> &'static PipelineConfig {
    static CONFIG: OnceLock<PipelineConfig> = OnceLock::new();
    CONFIG.get_or_init(PipelineConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let tables = TaxRateTables::default();
        assert!(tables.validate().is_ok());
        assert_eq!(tables.for_regime(TaxRegime::SimplesNacional).simples, 0.06);
        assert_eq!(tables.for_regime(TaxRegime::LucroPresumido).pis, 0.0065);
        assert_eq!(tables.for_regime(TaxRegime::LucroReal).cofins, 0.076);
        assert_eq!(
            tables.for_regime(TaxRegime::LucroReal).irpj_surcharge,
            Some(IrpjSurcharge {
                rate: 0.10,
                monthly_threshold: 20_000.0
            })
        );
    }

    #[test]
    fn test_negative_rate_rejected() {
        let mut tables = TaxRateTables::default();
        tables.lucro_presumido.iss = -0.02;

        match tables.validate() {
            Err(DreError::InvalidRate { regime, tax, .. }) => {
                assert_eq!(regime, "lucro_presumido");
                assert_eq!(tax, "iss");
            }
            other => panic!("expected InvalidRate, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_tables_from_json() {
        let mut tables = TaxRateTables::default();
        tables.lucro_presumido.iss = 0.02;
        let json = serde_json::to_string(&tables).unwrap();

        let loaded = TaxRateTables::from_json(&json).unwrap();
        assert_eq!(loaded.lucro_presumido.iss, 0.02);
    }

    #[test]
    fn test_golden_policy_constants() {
        let policy = ClassifierPolicy::default();
        assert_eq!(policy.version, "fixed-variable/v1");
        assert_eq!(policy.similarity_threshold, 0.7);
        assert_eq!(policy.recurrence_cv_threshold, 0.3);
        assert_eq!(policy.min_significant_word_len, 3);
        assert_eq!(policy.close_deviation, 0.2);
        assert_eq!(policy.near_deviation, 0.5);
        assert_eq!(policy.large_amount_threshold, 10_000.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        let policy = ClassifierPolicy {
            similarity_threshold: 1.5,
            ..ClassifierPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(DreError::InvalidPolicy(_))));

        let policy = ClassifierPolicy {
            close_deviation: 0.6,
            ..ClassifierPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_pipeline_config_defaults_from_partial_json() {
        let config = PipelineConfig::from_json(r#"{ "regime": "lucro_real" }"#).unwrap();
        assert_eq!(config.regime, TaxRegime::LucroReal);
        assert_eq!(config.rates, TaxRateTables::default());
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = PipelineConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("regime"));
        assert!(schema_json.contains("profit_tax_base"));
        assert!(schema_json.contains("similarity_threshold"));
    }
}

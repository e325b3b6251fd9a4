use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParsedRevenue {
    #[schemars(description = "Calendar date of the entry, serialized as YYYY-MM-DD")]
    pub date: NaiveDate,

    pub description: String,

    #[schemars(description = "Human-facing revenue category (e.g. 'Receita de Serviços')")]
    pub category: String,

    #[schemars(description = "Non-negative amount in the ledger currency")]
    pub amount: f64,
}

/// An expense line as it comes out of the parser, or as entered by hand.
///
/// Parsed amounts are always non-negative magnitudes. Hand-entered refunds and
/// credits may carry a negative amount, which routes them to the
/// other income/expense line of the statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParsedExpense {
    #[schemars(description = "Calendar date of the entry, serialized as YYYY-MM-DD")]
    pub date: NaiveDate,

    pub description: String,

    #[schemars(description = "Human-facing expense category (e.g. 'Administrativas')")]
    pub category: String,

    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BankTransaction {
    pub date: NaiveDate,
    pub description: String,

    #[schemars(description = "Non-negative magnitude; direction is carried by `type`")]
    pub amount: f64,

    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
}

impl BankTransaction {
    pub fn is_credit(&self) -> bool {
        self.transaction_type == TransactionType::Credit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseType {
    #[serde(alias = "fixa")]
    #[schemars(description = "Invariant to service volume: payroll, rent, utilities, subscriptions")]
    Fixed,

    #[serde(alias = "variavel")]
    #[schemars(description = "Scales with service volume: consumables, commissions, freight, fees")]
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxScope {
    #[serde(alias = "receita")]
    #[schemars(description = "Levied on gross revenue (PIS, COFINS, ISS, ICMS, Simples)")]
    Revenue,

    #[serde(alias = "lucro")]
    #[schemars(description = "Levied on profit (IRPJ, CSLL)")]
    Profit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
    #[default]
    SimplesNacional,
    LucroPresumido,
    LucroReal,
}

impl TaxRegime {
    pub const ALL: [TaxRegime; 3] = [
        TaxRegime::SimplesNacional,
        TaxRegime::LucroPresumido,
        TaxRegime::LucroReal,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimplesNacional => "simples_nacional",
            Self::LucroPresumido => "lucro_presumido",
            Self::LucroReal => "lucro_real",
        }
    }
}

impl std::fmt::Display for TaxRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An expense after the fixed/variable and tax classification step.
///
/// `is_tax` is tri-state: `Some(true)` and `Some(false)` are explicit flags that
/// take precedence over description-based tax detection everywhere, `None`
/// leaves the decision to the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassifiedExpense {
    #[serde(flatten)]
    pub expense: ParsedExpense,

    #[serde(default)]
    #[schemars(description = "Current fixed/variable type; null when the user cleared it")]
    pub expense_type: Option<ExpenseType>,

    #[serde(default)]
    #[schemars(description = "True once the user overrode the suggestion or the tax flag")]
    pub classification_is_manual: bool,

    #[schemars(description = "Heuristic suggestion preserved for the re-apply-all action")]
    pub auto_suggestion: ExpenseType,

    #[serde(default)]
    pub is_tax: Option<bool>,

    #[serde(default)]
    pub tax_scope: Option<TaxScope>,

    #[serde(default)]
    #[schemars(description = "Specific tax line, e.g. 'PIS', 'COFINS', 'IRPJ'")]
    pub tax_category: Option<String>,

    #[serde(default)]
    pub custom_category: Option<String>,
}

impl ClassifiedExpense {
    /// Wraps an expense with a suggestion and no tax decision.
    pub fn new(expense: ParsedExpense, suggestion: ExpenseType) -> Self {
        Self {
            expense,
            expense_type: Some(suggestion),
            classification_is_manual: false,
            auto_suggestion: suggestion,
            is_tax: None,
            tax_scope: None,
            tax_category: None,
            custom_category: None,
        }
    }
}

/// Either a raw parsed expense or one that went through classification.
///
/// Raw expenses behave as "tax flag unset, no fixed/variable type".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpenseRecord {
    Raw(ParsedExpense),
    Classified(ClassifiedExpense),
}

impl ExpenseRecord {
    pub fn expense(&self) -> &ParsedExpense {
        match self {
            Self::Raw(expense) => expense,
            Self::Classified(classified) => &classified.expense,
        }
    }

    pub fn amount(&self) -> f64 {
        self.expense().amount
    }

    pub fn description(&self) -> &str {
        &self.expense().description
    }

    pub fn manual_tax_flag(&self) -> Option<bool> {
        match self {
            Self::Raw(_) => None,
            Self::Classified(classified) => classified.is_tax,
        }
    }

    pub fn manual_tax_scope(&self) -> Option<TaxScope> {
        match self {
            Self::Raw(_) => None,
            Self::Classified(classified) => classified.tax_scope,
        }
    }

    pub fn manual_tax_category(&self) -> Option<&str> {
        match self {
            Self::Raw(_) => None,
            Self::Classified(classified) => classified
                .tax_category
                .as_deref()
                .filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn expense_type(&self) -> Option<ExpenseType> {
        match self {
            Self::Raw(_) => None,
            Self::Classified(classified) => classified.expense_type,
        }
    }
}

impl From<ParsedExpense> for ExpenseRecord {
    fn from(expense: ParsedExpense) -> Self {
        Self::Raw(expense)
    }
}

impl From<ClassifiedExpense> for ExpenseRecord {
    fn from(expense: ClassifiedExpense) -> Self {
        Self::Classified(expense)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense() -> ParsedExpense {
        ParsedExpense {
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            description: "Aluguel".to_string(),
            category: "Administrativas".to_string(),
            amount: 2000.0,
        }
    }

    #[test]
    fn test_raw_record_has_no_manual_flags() {
        let record = ExpenseRecord::from(expense());
        assert_eq!(record.manual_tax_flag(), None);
        assert_eq!(record.expense_type(), None);
        assert_eq!(record.manual_tax_category(), None);
    }

    #[test]
    fn test_blank_tax_category_is_treated_as_missing() {
        let mut classified = ClassifiedExpense::new(expense(), ExpenseType::Fixed);
        classified.tax_category = Some("  ".to_string());
        let record = ExpenseRecord::from(classified);
        assert_eq!(record.manual_tax_category(), None);
    }

    #[test]
    fn test_legacy_portuguese_tokens_deserialize() {
        let json = r#"{
            "date": "2024-03-05",
            "description": "Aluguel",
            "category": "Administrativas",
            "amount": 2000.0,
            "expense_type": "fixa",
            "auto_suggestion": "variavel",
            "is_tax": false,
            "tax_scope": "lucro"
        }"#;

        let classified: ClassifiedExpense = serde_json::from_str(json).unwrap();
        assert_eq!(classified.expense_type, Some(ExpenseType::Fixed));
        assert_eq!(classified.auto_suggestion, ExpenseType::Variable);
        assert_eq!(classified.is_tax, Some(false));
        assert_eq!(classified.tax_scope, Some(TaxScope::Profit));
        assert!(!classified.classification_is_manual);
    }

    #[test]
    fn test_bank_transaction_serializes_type_field() {
        let transaction = BankTransaction {
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            description: "PIX recebido".to_string(),
            amount: 150.0,
            transaction_type: TransactionType::Credit,
        };

        let json = serde_json::to_string(&transaction).unwrap();
        assert!(json.contains("\"type\":\"credit\""));
        assert!(json.contains("\"date\":\"2024-03-05\""));
    }
}

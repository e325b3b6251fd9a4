//! Keyword-table categorization of expense and revenue descriptions.
//!
//! The tables are plain data (`CategoryRules`) so they can be replaced from
//! JSON without touching the matching code. Matching is case- and
//! diacritic-insensitive substring containment.

use crate::normalize::fold;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const COST_OF_SERVICES: &str = "Custo dos Serviços";
pub const PERSONNEL: &str = "Pessoal";
pub const ADMINISTRATIVE: &str = "Administrativas";
pub const SALES_AND_MARKETING: &str = "Vendas e Marketing";
pub const TAXES_AND_FEES: &str = "Impostos e Taxas";
pub const FINANCIAL: &str = "Despesas Financeiras";
pub const OTHER_OPERATING: &str = "Outras Despesas Operacionais";

pub const SERVICE_REVENUE: &str = "Receita de Serviços";
pub const PRODUCT_REVENUE: &str = "Receita de Produtos";
pub const FINANCIAL_REVENUE: &str = "Receitas Financeiras";

/// Category values that mean "nothing was supplied".
pub const PLACEHOLDER_CATEGORIES: &[&str] = &["nao categorizado", "sem categoria", "-"];

/// Functional account an operating expense rolls into on the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    CostOfServices,
    Personnel,
    Administrative,
    SalesAndMarketing,
    TaxesAndFees,
    Financial,
    OtherOperating,
}

impl ExpenseCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CostOfServices => COST_OF_SERVICES,
            Self::Personnel => PERSONNEL,
            Self::Administrative => ADMINISTRATIVE,
            Self::SalesAndMarketing => SALES_AND_MARKETING,
            Self::TaxesAndFees => TAXES_AND_FEES,
            Self::Financial => FINANCIAL,
            Self::OtherOperating => OTHER_OPERATING,
        }
    }

    /// Maps a canonical label back to its category. Unknown labels are
    /// `OtherOperating`.
    pub fn from_label(label: &str) -> Self {
        let all = [
            Self::CostOfServices,
            Self::Personnel,
            Self::Administrative,
            Self::SalesAndMarketing,
            Self::TaxesAndFees,
            Self::Financial,
        ];
        all.into_iter()
            .find(|category| category.label() == label)
            .unwrap_or(Self::OtherOperating)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KeywordGroup {
    pub label: String,
    pub keywords: Vec<String>,
}

impl KeywordGroup {
    pub fn new(label: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn matches(&self, folded_text: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| folded_text.contains(fold(keyword).as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CategoryRules {
    #[schemars(description = "Supplied-category normalization, checked in order against the category text")]
    pub expense_aliases: Vec<KeywordGroup>,

    #[schemars(description = "Description groups in priority order; first match wins")]
    pub expense_groups: Vec<KeywordGroup>,

    pub expense_fallback: String,

    pub revenue_aliases: Vec<KeywordGroup>,

    pub revenue_groups: Vec<KeywordGroup>,

    pub revenue_fallback: String,
}

const EXPENSE_ALIASES: &[(&str, &[&str])] = &[
    (ADMINISTRATIVE, &["admin"]),
    (SALES_AND_MARKETING, &["venda", "marketing"]),
    (PERSONNEL, &["pessoa", "salario", "folha"]),
    (TAXES_AND_FEES, &["impost", "taxa"]),
    (COST_OF_SERVICES, &["custo", "csp", "material"]),
];

const COST_OF_SERVICE_KEYWORDS: &[&str] = &[
    "material medico", "medicamento", "insumo", "equipamento medico", "instrumental",
    "descartavel", "reagente", "sutura", "luva", "seringa", "gaze", "algodao",
];

const PERSONNEL_KEYWORDS: &[&str] = &[
    "salario", "folha", "inss", "fgts", "vale", "pro-labore", "prolabore", "pro labore",
    "ferias", "13º", "13o", "beneficio", "plano de saude", "convenio", "vale transporte",
    "vale refeicao", "vr", "vt",
];

const ADMINISTRATIVE_KEYWORDS: &[&str] = &[
    "aluguel", "agua", "luz", "energia", "eletrica", "telefone", "celular", "internet",
    "contabilidade", "contabil", "advogado", "advocacia", "juridico", "escritorio", "office",
    "manutencao", "reparo", "limpeza", "higienizacao", "seguranca", "alarme", "condominio",
    "iptu", "material de expediente", "papelaria", "xerox", "impressora", "toner",
];

const SALES_KEYWORDS: &[&str] = &[
    "marketing", "publicidade", "propaganda", "google ads", "facebook ads", "instagram",
    "site", "website", "redes sociais", "anuncio", "midia", "promocao", "desconto",
    "campanha", "seo", "design grafico", "cartao de visita", "folder",
];

const TAX_FEE_KEYWORDS: &[&str] = &[
    "imposto", "taxa", "tributo", "irpj", "csll", "pis", "cofins", "iss", "issqn", "simples",
    "darf", "gps", "das", "contribuicao",
];

const FINANCIAL_KEYWORDS: &[&str] = &[
    "juros", "multa", "tarifa bancaria", "banco", "cartao de credito", "emprestimo",
    "financiamento",
];

const REVENUE_ALIASES: &[(&str, &[&str])] = &[
    (SERVICE_REVENUE, &["servico", "consulta", "atendimento"]),
    (PRODUCT_REVENUE, &["produto", "venda", "mercadoria"]),
    (FINANCIAL_REVENUE, &["financeira", "juros", "rendimento"]),
];

const SERVICE_REVENUE_KEYWORDS: &[&str] = &[
    "consulta", "atendimento", "procedimento", "exame", "tratamento", "sessao", "cirurgia",
    "avaliacao", "terapia", "acompanhamento", "retorno", "diagnostico", "checkup",
];

const PRODUCT_REVENUE_KEYWORDS: &[&str] = &[
    "venda", "produto", "medicamento", "material", "suplemento", "ortese", "protese",
    "equipamento",
];

const FINANCIAL_REVENUE_KEYWORDS: &[&str] = &[
    "rendimento", "juros recebidos", "juros", "aplicacao", "investimento",
];

impl Default for CategoryRules {
    fn default() -> Self {
        let aliases = |table: &[(&str, &[&str])]| {
            table
                .iter()
                .map(|(label, keywords)| KeywordGroup::new(label, keywords))
                .collect::<Vec<_>>()
        };

        Self {
            expense_aliases: aliases(EXPENSE_ALIASES),
            expense_groups: vec![
                KeywordGroup::new(COST_OF_SERVICES, COST_OF_SERVICE_KEYWORDS),
                KeywordGroup::new(PERSONNEL, PERSONNEL_KEYWORDS),
                KeywordGroup::new(ADMINISTRATIVE, ADMINISTRATIVE_KEYWORDS),
                KeywordGroup::new(SALES_AND_MARKETING, SALES_KEYWORDS),
                KeywordGroup::new(TAXES_AND_FEES, TAX_FEE_KEYWORDS),
                KeywordGroup::new(FINANCIAL, FINANCIAL_KEYWORDS),
            ],
            expense_fallback: OTHER_OPERATING.to_string(),
            revenue_aliases: aliases(REVENUE_ALIASES),
            revenue_groups: vec![
                KeywordGroup::new(SERVICE_REVENUE, SERVICE_REVENUE_KEYWORDS),
                KeywordGroup::new(PRODUCT_REVENUE, PRODUCT_REVENUE_KEYWORDS),
                KeywordGroup::new(FINANCIAL_REVENUE, FINANCIAL_REVENUE_KEYWORDS),
            ],
            revenue_fallback: SERVICE_REVENUE.to_string(),
        }
    }
}

impl CategoryRules {
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolves the display category of an expense.
    ///
    /// A usable supplied category is normalized to a canonical label when it
    /// contains one of the alias keywords, otherwise returned unchanged. Without
    /// one, the description is matched against the priority-ordered groups.
    pub fn categorize_expense(&self, description: &str, supplied: Option<&str>) -> String {
        categorize(
            description,
            supplied,
            &self.expense_aliases,
            &self.expense_groups,
            &self.expense_fallback,
        )
    }

    pub fn categorize_revenue(&self, description: &str, supplied: Option<&str>) -> String {
        categorize(
            description,
            supplied,
            &self.revenue_aliases,
            &self.revenue_groups,
            &self.revenue_fallback,
        )
    }
}

fn categorize(
    description: &str,
    supplied: Option<&str>,
    aliases: &[KeywordGroup],
    groups: &[KeywordGroup],
    fallback: &str,
) -> String {
    if let Some(category) = supplied.filter(|c| is_usable_category(c)) {
        let folded = fold(category.trim());
        return aliases
            .iter()
            .find(|group| group.matches(&folded))
            .map(|group| group.label.clone())
            .unwrap_or_else(|| category.to_string());
    }

    let folded = fold(description);
    groups
        .iter()
        .find(|group| group.matches(&folded))
        .map(|group| group.label.clone())
        .unwrap_or_else(|| fallback.to_string())
}

pub fn is_usable_category(category: &str) -> bool {
    let folded = fold(category.trim());
    !folded.is_empty() && !PLACEHOLDER_CATEGORIES.contains(&folded.as_str())
}

pub(crate) fn default_rules() -> &'static CategoryRules {
    static RULES: OnceLock<CategoryRules> = OnceLock::new();
    RULES.get_or_init(CategoryRules::default)
}

/// Categorizes an expense with the built-in keyword tables.
pub fn categorize_expense(description: &str, supplied: Option<&str>) -> String {
    default_rules().categorize_expense(description, supplied)
}

/// Categorizes a revenue entry with the built-in keyword tables.
pub fn categorize_revenue(description: &str, supplied: Option<&str>) -> String {
    default_rules().categorize_revenue(description, supplied)
}

//! Fixed/variable expense classification.
//!
//! Suggestions come from a scored heuristic: indicator keywords in the
//! description or category, recurrence of similar descriptions within the
//! batch, and a penalty for large one-off amounts. Positive scores suggest
//! fixed, negative scores variable, and ties go to fixed only for recurrent
//! expenses.

use crate::config::{default_config, PipelineConfig};
use crate::normalize::normalize_text;
use crate::schema::{ClassifiedExpense, ExpenseType, ParsedExpense, TaxScope};
use crate::tax::{classified_tax_scope, TaxKeywords};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const FIXED_KEYWORDS: &[&str] = &[
    // payroll
    "salario", "ordenado", "vencimento", "remuneracao", "pro labore", "prolabore",
    "honorario", "rescisao", "ferias", "13 salario", "decimo terceiro",
    "vale transporte", "vale alimentacao", "vale refeicao", "plano saude",
    "plano odontologico", "seguro vida", "fgts", "inss empregador",
    // occupancy
    "aluguel", "locacao", "arrendamento", "condominio", "iptu", "ipva",
    "taxa condominio", "seguro imovel",
    // utilities
    "agua", "esgoto", "luz", "energia eletrica", "telefone", "internet",
    "banda larga", "fibra optica", "linha telefonica", "telefonia",
    "celular corporativo", "pacote dados",
    // professional services
    "contador", "contabilidade", "assessoria contabil", "escritorio contabil",
    "advogado", "consultoria juridica", "assessoria juridica", "auditoria",
    "consultoria", "assessoria",
    // insurance
    "seguro", "apolice", "premio seguro", "seguro responsabilidade",
    "seguro equipamento",
    // licenses
    "licenca", "alvara", "anuidade", "mensalidade", "registro profissional",
    "conselho classe", "cro", "crm", "coren", "anvisa", "vigilancia sanitaria",
    // maintenance contracts
    "manutencao preventiva", "contrato manutencao", "manutencao mensal",
    "assistencia tecnica",
    // software
    "software", "sistema", "licenca software", "assinatura", "saas", "cloud",
    "nuvem", "hospedagem",
    "depreciacao", "amortizacao",
    // cleaning
    "limpeza", "faxina", "servico limpeza", "material limpeza fixo", "higienizacao",
];

const VARIABLE_KEYWORDS: &[&str] = &[
    // consumables
    "material medico", "mat medico", "mat med", "material odontologico", "mat odonto",
    "insumo", "insumos", "descartavel", "consumivel",
    // medications
    "medicamento", "farmaco", "droga", "remedio", "anestesico", "antibiotico",
    "luva", "mascara", "avental", "touca", "capote", "seringa", "agulha", "cateter",
    "sonda", "gaze", "atadura", "algodao", "alcool", "antisseptico", "fio cirurgico",
    "sutura", "bisturi", "lamina",
    // dental
    "resina", "ionomer", "ionomero", "amalgama", "anestesico odontologico", "broca",
    "lixa", "disco", "mandril", "profilaxia", "fluor", "fluoreto", "selante",
    "clareador", "moldeira", "alginato", "silicone", "gesso", "cimento",
    // radiology
    "filme radiografico", "sensor digital", "revelador", "fixador",
    "solucao reveladora",
    // laboratory
    "reagente", "teste", "kit", "analise", "exame", "amostra", "cultura",
    "meio cultura", "placa petri",
    "custo variavel", "cmv", "custo mercadoria", "custo servico", "custo procedimento",
    // sales incentives
    "comissao", "bonus", "premiacao", "incentivo", "participacao resultado",
    // marketing
    "marketing", "publicidade", "propaganda", "anuncio", "divulgacao", "ads",
    "google ads", "facebook ads", "instagram", "redes sociais", "influencer",
    "influenciador", "panfleto", "folder", "banner", "outdoor",
    // financial fees
    "juros", "juro", "multa", "tarifa bancaria", "iof", "desconto duplicata",
    "antecipacao", "taxa cartao", "maquininha", "tef", "credito",
    // freight
    "frete", "entrega", "correio", "sedex", "pac", "transporte", "logistica",
    "despacho", "envio",
    // packaging
    "embalagem", "sacola", "saco", "caixa", "envelope", "etiqueta", "rotulo",
    // corrective maintenance
    "manutencao corretiva", "reparo", "conserto", "pecas", "componente", "substituicao",
    // outsourced labor
    "terceirizado", "freelancer", "autonomo", "temporario", "servico terceiro",
    "prestador servico",
];

const FIXED_CATEGORY_HINTS: &[&str] = &["pessoal", "administrativa", "folha", "rh"];
const VARIABLE_CATEGORY_HINTS: &[&str] = &["custo", "cmv", "variavel"];

/// Indicator keyword tables for the fixed/variable heuristic.
///
/// `fixed` and `variable` are matched against both description and category;
/// the category hints only against the category.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExpenseKeywords {
    pub fixed: Vec<String>,
    pub variable: Vec<String>,
    pub fixed_category_hints: Vec<String>,
    pub variable_category_hints: Vec<String>,
}

fn owned(keywords: &[&str]) -> Vec<String> {
    keywords.iter().map(|k| k.to_string()).collect()
}

impl Default for ExpenseKeywords {
    fn default() -> Self {
        Self {
            fixed: owned(FIXED_KEYWORDS),
            variable: owned(VARIABLE_KEYWORDS),
            fixed_category_hints: owned(FIXED_CATEGORY_HINTS),
            variable_category_hints: owned(VARIABLE_CATEGORY_HINTS),
        }
    }
}

fn contains_any(normalized: &str, keywords: &[String]) -> bool {
    !normalized.is_empty()
        && keywords
            .iter()
            .map(|keyword| normalize_text(keyword))
            .any(|keyword| !keyword.is_empty() && normalized.contains(keyword.as_str()))
}

/// How often an expense's description shows up in its batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recurrence {
    pub occurrences: usize,
    pub mean_amount: f64,
    pub is_recurrent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Suggestion {
    pub expense_type: ExpenseType,
    pub score: i32,
    pub recurrence: Recurrence,
}

struct BatchEntry {
    words: Vec<String>,
    amount: f64,
}

impl BatchEntry {
    fn new(expense: &ParsedExpense) -> Self {
        Self {
            words: words_of(&expense.description),
            amount: expense.amount,
        }
    }
}

fn words_of(description: &str) -> Vec<String> {
    normalize_text(description)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

pub struct ExpenseClassifier<'a> {
    config: &'a PipelineConfig,
}

impl<'a> ExpenseClassifier<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Suggests a type for `expense`, using `batch` for recurrence. The batch
    /// is expected to contain the expense itself.
    pub fn suggest(&self, expense: &ParsedExpense, batch: &[ParsedExpense]) -> Suggestion {
        let entries: Vec<BatchEntry> = batch.iter().map(BatchEntry::new).collect();
        self.score(expense, &BatchEntry::new(expense), &entries)
    }

    /// Totals over a classified batch, deciding taxes the way the statement
    /// engine does.
    pub fn summarize(&self, expenses: &[ClassifiedExpense]) -> ClassificationSummary {
        ClassificationSummary::with_keywords(expenses, &self.config.tax_keywords)
    }

    /// Display category: the user's custom category when present, otherwise
    /// the parsed one re-resolved through the configured rules.
    pub fn effective_category(&self, expense: &ClassifiedExpense) -> String {
        match expense.custom_category.as_deref() {
            Some(custom) if !custom.trim().is_empty() => custom.to_string(),
            _ => self
                .config
                .categories
                .categorize_expense(&expense.expense.description, Some(&expense.expense.category)),
        }
    }

    /// Seeds every expense of the batch with its suggestion and the detected
    /// tax flag. Nothing is marked manual.
    pub fn classify(&self, batch: &[ParsedExpense]) -> Vec<ClassifiedExpense> {
        let entries: Vec<BatchEntry> = batch.iter().map(BatchEntry::new).collect();

        let classified: Vec<ClassifiedExpense> = batch
            .iter()
            .zip(&entries)
            .map(|(expense, entry)| {
                let suggestion = self.score(expense, entry, &entries);
                let tax = self.config.tax_keywords.identify(&expense.description);

                let mut classified = ClassifiedExpense::new(expense.clone(), suggestion.expense_type);
                classified.is_tax = Some(tax.is_some());
                classified.tax_scope = tax.map(|hit| hit.scope);
                classified
            })
            .collect();

        debug!(
            "Classified {} expenses ({} detected as taxes)",
            classified.len(),
            classified.iter().filter(|e| e.is_tax == Some(true)).count()
        );

        classified
    }

    fn score(&self, expense: &ParsedExpense, entry: &BatchEntry, batch: &[BatchEntry]) -> Suggestion {
        let policy = &self.config.policy;
        let keywords = &self.config.expense_keywords;

        let description = normalize_text(&expense.description);
        let category = normalize_text(&expense.category);

        let mut score = 0;

        if contains_any(&description, &keywords.fixed) || contains_any(&category, &keywords.fixed) {
            score += policy.keyword_weight;
        }
        if contains_any(&description, &keywords.variable)
            || contains_any(&category, &keywords.variable)
        {
            score -= policy.keyword_weight;
        }

        let recurrence = self.recurrence(entry, batch);

        if recurrence.is_recurrent && recurrence.mean_amount > 0.0 {
            let deviation = (expense.amount - recurrence.mean_amount).abs() / recurrence.mean_amount;
            if deviation < policy.close_deviation {
                score += policy.close_deviation_bonus;
            } else if deviation < policy.near_deviation {
                score += policy.near_deviation_bonus;
            }
        }

        if recurrence.occurrences >= policy.frequent_occurrences {
            score += policy.frequent_bonus;
        }

        if expense.amount > policy.large_amount_threshold && recurrence.occurrences == 1 {
            score -= policy.large_one_off_penalty;
        }

        if contains_any(&category, &keywords.fixed_category_hints) {
            score += policy.category_weight;
        }
        if contains_any(&category, &keywords.variable_category_hints) {
            score -= policy.category_weight;
        }

        let expense_type = match score {
            s if s > 0 => ExpenseType::Fixed,
            s if s < 0 => ExpenseType::Variable,
            _ if recurrence.is_recurrent => ExpenseType::Fixed,
            _ => ExpenseType::Variable,
        };

        Suggestion {
            expense_type,
            score,
            recurrence,
        }
    }

    fn recurrence(&self, entry: &BatchEntry, batch: &[BatchEntry]) -> Recurrence {
        let policy = &self.config.policy;

        let similar: Vec<f64> = batch
            .iter()
            .filter(|other| self.is_similar(&entry.words, &other.words))
            .map(|other| other.amount)
            .collect();

        let occurrences = similar.len();
        if occurrences == 0 {
            return Recurrence {
                occurrences,
                mean_amount: 0.0,
                is_recurrent: false,
            };
        }

        let mean = similar.iter().sum::<f64>() / occurrences as f64;
        let variance = similar.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / occurrences as f64;
        let std_dev = variance.sqrt();

        let is_recurrent = occurrences >= policy.min_recurrent_occurrences
            && mean > 0.0
            && std_dev / mean < policy.recurrence_cv_threshold;

        Recurrence {
            occurrences,
            mean_amount: mean,
            is_recurrent,
        }
    }

    fn is_similar(&self, words: &[String], other: &[String]) -> bool {
        if words.is_empty() || other.is_empty() {
            return false;
        }

        let policy = &self.config.policy;
        let common = words
            .iter()
            .filter(|w| w.chars().count() >= policy.min_significant_word_len && other.contains(w))
            .count();

        common as f64 >= words.len().min(other.len()) as f64 * policy.similarity_threshold
    }
}

/// Suggests fixed or variable with the default keyword tables and policy.
pub fn suggest_expense_type(expense: &ParsedExpense, batch: &[ParsedExpense]) -> ExpenseType {
    ExpenseClassifier::new(default_config())
        .suggest(expense, batch)
        .expense_type
}

pub fn classify_expenses(batch: &[ParsedExpense]) -> Vec<ClassifiedExpense> {
    ExpenseClassifier::new(default_config()).classify(batch)
}

/// Manual fixed/variable override. `None` clears the type.
pub fn set_expense_type(expense: &ClassifiedExpense, expense_type: Option<ExpenseType>) -> ClassifiedExpense {
    ClassifiedExpense {
        expense_type,
        classification_is_manual: true,
        ..expense.clone()
    }
}

/// Manual tax flag. Turning it on keeps an existing scope or defaults to
/// revenue; turning it off clears the scope.
pub fn set_tax_flag(expense: &ClassifiedExpense, is_tax: bool) -> ClassifiedExpense {
    let tax_scope = if is_tax {
        Some(expense.tax_scope.unwrap_or(TaxScope::Revenue))
    } else {
        None
    };

    ClassifiedExpense {
        is_tax: Some(is_tax),
        tax_scope,
        classification_is_manual: true,
        ..expense.clone()
    }
}

pub fn set_custom_category(expense: &ClassifiedExpense, category: &str) -> ClassifiedExpense {
    let trimmed = category.trim();
    ClassifiedExpense {
        custom_category: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        classification_is_manual: true,
        ..expense.clone()
    }
}

/// Resets every expense to its stored suggestion and clears manual flags.
/// Tax flags are left as they are.
pub fn apply_suggestions(expenses: &[ClassifiedExpense]) -> Vec<ClassifiedExpense> {
    expenses
        .iter()
        .map(|expense| ClassifiedExpense {
            expense_type: Some(expense.auto_suggestion),
            classification_is_manual: false,
            ..expense.clone()
        })
        .collect()
}

/// Amount totals over a classified batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationSummary {
    pub total: f64,
    pub fixed: f64,
    pub variable: f64,
    pub tax: f64,
    pub unclassified: f64,
    pub unclassified_count: usize,
    pub percent_classified: f64,
    #[schemars(description = "True when no non-tax expense is missing a fixed/variable type")]
    pub ready: bool,
}

impl ClassificationSummary {
    /// Summary with the built-in tax keyword table.
    pub fn from_expenses(expenses: &[ClassifiedExpense]) -> Self {
        Self::with_keywords(expenses, &default_config().tax_keywords)
    }

    /// An expense counts as a tax when its manual flag says so, or when the
    /// flag is unset and `keywords` detect one.
    pub fn with_keywords(expenses: &[ClassifiedExpense], keywords: &TaxKeywords) -> Self {
        let mut summary = Self::default();

        for expense in expenses {
            let amount = expense.expense.amount;
            summary.total += amount;

            if classified_tax_scope(expense, keywords).is_some() {
                summary.tax += amount;
                continue;
            }

            match expense.expense_type {
                Some(ExpenseType::Fixed) => summary.fixed += amount,
                Some(ExpenseType::Variable) => summary.variable += amount,
                None => {
                    summary.unclassified += amount;
                    summary.unclassified_count += 1;
                }
            }
        }

        summary.percent_classified = if summary.total > 0.0 {
            (summary.fixed + summary.variable + summary.tax) / summary.total * 100.0
        } else {
            0.0
        };
        summary.ready = summary.unclassified_count == 0;
        summary
    }
}

/// Display category with the default category rules.
pub fn effective_category(expense: &ClassifiedExpense) -> String {
    ExpenseClassifier::new(default_config()).effective_category(expense)
}

//! Locale-tolerant amount and date parsing plus the text folding shared by
//! every keyword matcher in the crate.
//!
//! Nothing in here fails: unparseable amounts become `0.0` and unparseable
//! dates fall back to today's date.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;

/// Formats tried, in order, after the four canonical layouts.
const FALLBACK_DATE_FORMATS: &[&str] = &["%d/%m/%y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y.%m.%d"];

const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parses a monetary amount written in either Brazilian (`1.234,56`) or
/// international (`1,234.56`) notation.
///
/// Currency symbols, letters and whitespace are ignored. When both separators
/// appear, whichever occurs last is the decimal point. A lone comma is a
/// decimal point; a lone dot followed by three or more digits is a thousands
/// separator. Repeated occurrences of a single separator are thousands
/// grouping. Anything without digits yields `0.0`.
pub fn parse_amount(text: &str) -> f64 {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        if !text.trim().is_empty() {
            debug!("parse_amount: no digits in {:?}, using 0", text);
        }
        return 0.0;
    }

    let negative = cleaned.starts_with('-');
    let body: String = cleaned.chars().filter(|c| *c != '-').collect();

    let decimal_at = decimal_separator_position(&body);

    let mut numeric = String::with_capacity(body.len() + 1);
    for (idx, c) in body.char_indices() {
        if c.is_ascii_digit() {
            numeric.push(c);
        } else if Some(idx) == decimal_at {
            if numeric.is_empty() {
                numeric.push('0');
            }
            numeric.push('.');
        }
    }

    let value = match numeric.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            debug!("parse_amount: could not read {:?}, using 0", text);
            return 0.0;
        }
    };

    if negative {
        -value
    } else {
        value
    }
}

fn decimal_separator_position(body: &str) -> Option<usize> {
    let last_comma = body.rfind(',');
    let last_dot = body.rfind('.');

    match (last_comma, last_dot) {
        (Some(comma), Some(dot)) => Some(comma.max(dot)),
        (Some(comma), None) => {
            if body.matches(',').count() == 1 {
                Some(comma)
            } else {
                None
            }
        }
        (None, Some(dot)) => {
            if body.matches('.').count() > 1 {
                return None;
            }
            let digits_after = body[dot + 1..].chars().filter(|c| c.is_ascii_digit()).count();
            if digits_after >= 3 {
                None
            } else {
                Some(dot)
            }
        }
        (None, None) => None,
    }
}

/// Normalizes a date string, falling back to today's (UTC) date when nothing
/// matches.
pub fn normalize_date(text: &str) -> NaiveDate {
    try_normalize_date(text).unwrap_or_else(|| {
        debug!("normalize_date: unparseable {:?}, using today", text);
        today()
    })
}

/// Accepts `DD/MM/YYYY`, `DD-MM-YYYY`, `YYYY-MM-DD` and `YYYY/MM/DD`, then a
/// list of looser layouts and RFC 3339 / RFC 2822 timestamps.
pub fn try_normalize_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(date) = canonical_date(text) {
        return Some(date);
    }

    for format in FALLBACK_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    for format in FALLBACK_DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.with_timezone(&Utc).date_naive());
    }

    if let Ok(datetime) = DateTime::parse_from_rfc2822(text) {
        return Some(datetime.with_timezone(&Utc).date_naive());
    }

    None
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn canonical_date(text: &str) -> Option<NaiveDate> {
    for separator in ['/', '-'] {
        let parts: Vec<&str> = text.split(separator).collect();
        if parts.len() != 3 || !parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
            continue;
        }

        let lengths = (parts[0].len(), parts[1].len(), parts[2].len());
        let (year, month, day) = match lengths {
            (2, 2, 4) => (parts[2], parts[1], parts[0]),
            (4, 2, 2) => (parts[0], parts[1], parts[2]),
            _ => continue,
        };

        let year = year.parse::<i32>().ok()?;
        let month = month.parse::<u32>().ok()?;
        let day = day.parse::<u32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

/// Lowercases and strips Portuguese diacritics, keeping everything else.
/// Used for substring keyword matching.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(|c| c.to_lowercase())
        .map(strip_diacritic)
        .collect()
}

/// `fold` plus punctuation-to-space and whitespace collapsing. Used wherever
/// descriptions are compared word by word.
pub fn normalize_text(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut previous_space = true;

    for c in fold(text).chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            output.push(c);
            previous_space = false;
        } else if !previous_space {
            output.push(' ');
            previous_space = true;
        }
    }

    output.trim_end().to_string()
}

fn strip_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_amount(text: &str, expected: f64) {
        let parsed = parse_amount(text);
        assert!(
            (parsed - expected).abs() < 1e-9,
            "parse_amount({:?}) = {}, expected {}",
            text,
            parsed,
            expected
        );
    }

    #[test]
    fn test_parse_amount_reference_strings() {
        assert_amount("1.234,56", 1234.56);
        assert_amount("1,234.56", 1234.56);
        assert_amount("R$ 45,00", 45.0);
        assert_amount("100", 100.0);
        assert_amount("", 0.0);
    }

    #[test]
    fn test_parse_amount_single_separator_rules() {
        assert_amount("12,5", 12.5);
        assert_amount("12.50", 12.5);
        assert_amount("1.234", 1234.0);
        assert_amount("1.234.567", 1_234_567.0);
        assert_amount("1,234,567", 1_234_567.0);
    }

    #[test]
    fn test_parse_amount_sign_and_noise() {
        assert_amount("-R$ 1.500,00", -1500.0);
        assert_amount("R$ -45,90", -45.9);
        assert_amount("  € 3 200,10 ", 3200.1);
        assert_amount("abc", 0.0);
        assert_amount("-", 0.0);
        assert_amount(",50", 0.5);
    }

    #[test]
    fn test_normalize_date_canonical_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        assert_eq!(normalize_date("25/12/2024"), expected);
        assert_eq!(normalize_date("25-12-2024"), expected);
        assert_eq!(normalize_date("2024-12-25"), expected);
        assert_eq!(normalize_date("2024/12/25"), expected);
        assert_eq!(normalize_date(" 2024-12-25 "), expected);
    }

    #[test]
    fn test_normalize_date_fallbacks() {
        assert_eq!(
            try_normalize_date("2024-12-25T10:30:00Z"),
            NaiveDate::from_ymd_opt(2024, 12, 25)
        );
        assert_eq!(
            try_normalize_date("25.12.2024"),
            NaiveDate::from_ymd_opt(2024, 12, 25)
        );
        assert_eq!(
            try_normalize_date("25/12/2024 08:15"),
            NaiveDate::from_ymd_opt(2024, 12, 25)
        );
    }

    #[test]
    fn test_normalize_date_unparseable_is_today() {
        let before = today();
        let parsed = normalize_date("not a date");
        let after = today();
        assert!(parsed >= before && parsed <= after);

        assert_eq!(try_normalize_date("31/02/2024"), None);
        assert_eq!(try_normalize_date(""), None);
    }

    #[test]
    fn test_text_folding() {
        assert_eq!(fold("Aluguel ESCRITÓRIO"), "aluguel escritorio");
        assert_eq!(
            normalize_text("  Pró-labore   (Março) "),
            "pro labore marco"
        );
    }
}

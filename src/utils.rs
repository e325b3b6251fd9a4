use crate::error::{DreError, Result};
use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// A validated report month, used to filter ledger entries loaded from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthFilter {
    /// Parses a month string in the format "YYYY-MM".
    pub fn parse(month: &str) -> Result<Self> {
        let trimmed = month.trim();
        let start = NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d")
            .map_err(|_| DreError::InvalidMonth(month.to_string()))?;
        let end = last_day_of_month(start.year(), start.month())
            .ok_or_else(|| DreError::InvalidMonth(month.to_string()))?;

        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// `part / whole * 100`, or `None` when `whole` is not positive.
pub fn percent_of(part: f64, whole: f64) -> Option<f64> {
    if whole > 0.0 {
        Some(part / whole * 100.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2023, 2), NaiveDate::from_ymd_opt(2023, 2, 28));
        assert_eq!(last_day_of_month(2024, 2), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(last_day_of_month(2023, 12), NaiveDate::from_ymd_opt(2023, 12, 31));
    }

    #[test]
    fn test_month_filter() {
        let filter = MonthFilter::parse("2024-02").unwrap();
        assert_eq!(filter.start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(filter.end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(filter.contains(NaiveDate::from_ymd_opt(2024, 2, 15).unwrap()));
        assert!(!filter.contains(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
    }

    #[test]
    fn test_month_filter_rejects_garbage() {
        assert!(matches!(
            MonthFilter::parse("2024/02"),
            Err(DreError::InvalidMonth(_))
        ));
        assert!(MonthFilter::parse("2024-13").is_err());
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(25.0, 200.0), Some(12.5));
        assert_eq!(percent_of(25.0, 0.0), None);
        assert_eq!(percent_of(25.0, -10.0), None);
    }
}

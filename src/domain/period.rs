use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

const MONTH_NAMES: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio",
    "julio", "agosto", "septiembre", "octubre", "noviembre", "diciembre",
];

/// A calendar month, stored as `year * 12 + month0`. Orders are unique per
/// collaboration and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillingPeriod(i32);

impl BillingPeriod {
    pub fn of(date: NaiveDate) -> Self {
        Self(date.year() * 12 + date.month0() as i32)
    }

    pub fn from_index(index: i32) -> Self {
        Self(index)
    }

    pub fn index(self) -> i32 {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.div_euclid(12)
    }

    /// 1-based month.
    pub fn month(self) -> u32 {
        self.0.rem_euclid(12) as u32 + 1
    }

    pub fn offset(self, months: i32) -> Self {
        Self(self.0 + months)
    }

    pub fn months_since(self, earlier: BillingPeriod) -> i32 {
        self.0 - earlier.0
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year(), self.month(), 1)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.first_day()
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// The given day of this month, clamped to the month's length.
    pub fn day(self, day: u32) -> NaiveDate {
        let last = self.last_day().day();
        NaiveDate::from_ymd_opt(self.year(), self.month(), day.clamp(1, last))
            .unwrap_or_else(|| self.first_day())
    }

    /// "mayo 2024", as printed on receipts and bank statements.
    pub fn label(self) -> String {
        format!("{} {}", MONTH_NAMES[(self.month() - 1) as usize], self.year())
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_arithmetic() {
        let jan = BillingPeriod::of(date(2024, 1, 15));
        assert_eq!(jan.year(), 2024);
        assert_eq!(jan.month(), 1);
        assert_eq!(jan.offset(-1).month(), 12);
        assert_eq!(jan.offset(-1).year(), 2023);
        assert_eq!(jan.offset(12).year(), 2025);
        assert_eq!(jan.offset(3).months_since(jan), 3);
        assert_eq!(jan.to_string(), "2024-01");
    }

    #[test]
    fn test_day_is_clamped() {
        let feb = BillingPeriod::of(date(2024, 2, 1));
        assert_eq!(feb.day(31), date(2024, 2, 29));
        assert_eq!(feb.last_day(), date(2024, 2, 29));
        assert_eq!(BillingPeriod::of(date(2023, 2, 1)).day(30), date(2023, 2, 28));
        assert_eq!(feb.day(10), date(2024, 2, 10));
    }

    #[test]
    fn test_label() {
        assert_eq!(BillingPeriod::of(date(2024, 5, 3)).label(), "mayo 2024");
    }
}

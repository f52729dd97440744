use super::bands::{banded_tax, Band};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// UK Tax Year (runs 6 April to 5 April)
/// The year value represents the end year (e.g., 2025 = 2024/25 tax year)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxYear(pub i32);

impl TaxYear {
    /// Create a tax year from a date
    pub fn from_date(date: NaiveDate) -> Self {
        if (date.month(), date.day()) >= (4, 6) {
            TaxYear(date.year() + 1)
        } else {
            TaxYear(date.year())
        }
    }

    /// End date of the tax year (5 April); settlements are posted here
    pub fn end_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0, 4, 5).unwrap_or(NaiveDate::MAX)
    }

    pub fn next(&self) -> TaxYear {
        TaxYear(self.0 + 1)
    }

    /// Display as "2024/25" format
    pub fn display(&self) -> String {
        format!("{}/{:02}", self.0 - 1, self.0 % 100)
    }
}

impl std::fmt::Display for TaxYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Thresholds, rates and allowances used at settlement.
///
/// Defaults are the UK 2019/20 figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TaxRules {
    #[schemars(with = "f64")]
    pub personal_allowance: Decimal,
    /// Allowance falls by 1 for every 2 of income above this
    #[schemars(with = "f64")]
    pub allowance_taper_threshold: Decimal,
    #[schemars(with = "f64")]
    pub basic_rate_limit: Decimal,
    #[schemars(with = "f64")]
    pub basic_rate: Decimal,
    #[schemars(with = "f64")]
    pub higher_rate_limit: Decimal,
    #[schemars(with = "f64")]
    pub higher_rate: Decimal,
    #[schemars(with = "f64")]
    pub additional_rate: Decimal,
    #[schemars(with = "f64")]
    pub ni_primary_threshold: Decimal,
    #[schemars(with = "f64")]
    pub ni_upper_limit: Decimal,
    #[schemars(with = "f64")]
    pub ni_main_rate: Decimal,
    #[schemars(with = "f64")]
    pub ni_upper_rate: Decimal,
    #[schemars(with = "f64")]
    pub cgt_allowance: Decimal,
    #[schemars(with = "f64")]
    pub cgt_rate: Decimal,
}

impl Default for TaxRules {
    fn default() -> Self {
        TaxRules {
            personal_allowance: dec!(12500),
            allowance_taper_threshold: dec!(100000),
            basic_rate_limit: dec!(50000),
            basic_rate: dec!(0.20),
            higher_rate_limit: dec!(150000),
            higher_rate: dec!(0.40),
            additional_rate: dec!(0.45),
            ni_primary_threshold: dec!(8632),
            ni_upper_limit: dec!(50000),
            ni_main_rate: dec!(0.12),
            ni_upper_rate: dec!(0.02),
            cgt_allowance: dec!(12000),
            cgt_rate: dec!(0.20),
        }
    }
}

impl TaxRules {
    /// Personal allowance after the high-earner taper.
    pub fn tapered_allowance(&self, income: Decimal) -> Decimal {
        let excess = (income - self.allowance_taper_threshold).max(Decimal::ZERO);
        (self.personal_allowance - excess / dec!(2)).max(Decimal::ZERO)
    }

    /// Income tax bands for a given total income. The zero-rate band ends at
    /// the tapered allowance; the other band limits are fixed.
    pub fn income_tax_bands(&self, income: Decimal) -> [Band; 4] {
        let allowance = self.tapered_allowance(income).min(self.basic_rate_limit);
        [
            Band::new(Decimal::ZERO, Decimal::ZERO),
            Band::new(allowance, self.basic_rate),
            Band::new(self.basic_rate_limit, self.higher_rate),
            Band::new(self.higher_rate_limit, self.additional_rate),
        ]
    }

    pub fn income_tax(&self, income: Decimal) -> Decimal {
        banded_tax(income, &self.income_tax_bands(income)).round_dp(2)
    }

    pub fn ni_bands(&self) -> [Band; 3] {
        [
            Band::new(Decimal::ZERO, Decimal::ZERO),
            Band::new(self.ni_primary_threshold, self.ni_main_rate),
            Band::new(self.ni_upper_limit, self.ni_upper_rate),
        ]
    }

    pub fn national_insurance(&self, income: Decimal) -> Decimal {
        banded_tax(income, &self.ni_bands()).round_dp(2)
    }

    pub fn capital_gains_tax(&self, gains: Decimal) -> Decimal {
        let taxable = (gains - self.cgt_allowance).max(Decimal::ZERO);
        (taxable * self.cgt_rate).round_dp(2)
    }
}

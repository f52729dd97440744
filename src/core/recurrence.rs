use super::dates::{add_duration, DurationUnit};
use super::error::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A closed-open reporting interval: `start` is included, `end` is the first
/// instant after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Interval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Interval { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// A recurrence step such as `1m`, `2w` or `1y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub count: u32,
    pub unit: DurationUnit,
}

impl Period {
    pub const MONTHLY: Period = Period {
        count: 1,
        unit: DurationUnit::Months,
    };
}

impl FromStr for Period {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let malformed = || EngineError::malformed(s);
        let Some((last, _)) = s.char_indices().last() else {
            return Err(malformed());
        };
        let (number, unit) = s.split_at(last);
        let unit = match unit {
            "d" => DurationUnit::Days,
            "w" => DurationUnit::Weeks,
            "m" => DurationUnit::Months,
            "y" => DurationUnit::Years,
            _ => return Err(malformed()),
        };
        let count: u32 = number.trim().parse().map_err(|_| malformed())?;
        if count == 0 {
            return Err(malformed());
        }
        Ok(Period { count, unit })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            DurationUnit::Days => 'd',
            DurationUnit::Weeks => 'w',
            DurationUnit::Months => 'm',
            DurationUnit::Years => 'y',
        };
        write!(f, "{}{}", self.count, unit)
    }
}

/// Occurrences of a period across an interval, starting at `interval.start`
/// and stopping before `interval.end`.
///
/// Each occurrence is computed from the start date rather than from the
/// previous occurrence, so the 31st stays the 31st in months that have one.
#[derive(Debug, Clone)]
pub struct Recurrence {
    interval: Interval,
    period: Period,
    index: i64,
    done: bool,
}

impl Iterator for Recurrence {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        if self.done {
            return None;
        }
        let step = self.index * i64::from(self.period.count);
        match add_duration(self.interval.start, step, self.period.unit) {
            Some(date) if date < self.interval.end => {
                self.index += 1;
                Some(date)
            }
            _ => {
                self.done = true;
                None
            }
        }
    }
}

pub fn generate(interval: Interval, period: Period) -> Recurrence {
    Recurrence {
        interval,
        period,
        index: 0,
        done: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn monthly(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        generate(Interval::new(start, end), "1m".parse().unwrap()).collect()
    }

    #[test]
    fn two_month_interval_yields_two_dates() {
        assert_eq!(
            monthly(date(2018, 5, 1), date(2018, 6, 30)),
            vec![date(2018, 5, 1), date(2018, 6, 1)]
        );
    }

    #[test]
    fn zero_length_interval_is_empty() {
        assert!(monthly(date(2018, 5, 1), date(2018, 5, 1)).is_empty());
    }

    #[test]
    fn interval_of_exactly_one_period_excludes_end() {
        assert_eq!(
            monthly(date(2018, 5, 1), date(2018, 6, 1)),
            vec![date(2018, 5, 1)]
        );
    }

    #[test]
    fn interval_shorter_than_period_yields_start() {
        assert_eq!(
            monthly(date(2018, 5, 1), date(2018, 5, 20)),
            vec![date(2018, 5, 1)]
        );
    }

    #[test]
    fn month_end_does_not_drift() {
        assert_eq!(
            monthly(date(2019, 1, 31), date(2019, 4, 1)),
            vec![date(2019, 1, 31), date(2019, 2, 28), date(2019, 3, 31)]
        );
    }

    #[test]
    fn weekly_and_yearly_steps() {
        let weeks: Vec<_> = generate(
            Interval::new(date(2020, 1, 1), date(2020, 1, 20)),
            "1w".parse().unwrap(),
        )
        .collect();
        assert_eq!(weeks, vec![date(2020, 1, 1), date(2020, 1, 8), date(2020, 1, 15)]);

        let years: Vec<_> = generate(
            Interval::new(date(2020, 4, 5), date(2023, 4, 5)),
            "1y".parse().unwrap(),
        )
        .collect();
        assert_eq!(years.len(), 3);
    }

    #[test]
    fn recurrence_is_restartable() {
        let recurrence = generate(
            Interval::new(date(2020, 1, 1), date(2020, 6, 1)),
            Period::MONTHLY,
        );
        let first: Vec<_> = recurrence.clone().collect();
        let second: Vec<_> = recurrence.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn rejects_zero_and_unknown_periods() {
        assert!("0m".parse::<Period>().is_err());
        assert!("3q".parse::<Period>().is_err());
        assert!("m".parse::<Period>().is_err());
        assert_eq!("2w".parse::<Period>().unwrap().to_string(), "2w");
    }
}

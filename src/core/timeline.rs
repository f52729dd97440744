//! Chronological queue of everything that happens during a run.

use super::recurrence::{generate, Interval, Period};
use crate::tax::TaxYear;
use chrono::NaiveDate;

/// Tie-break order for moments sharing a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MomentClass {
    SettingRevaluation,
    Lifecycle,
    Scheduled,
    Conditional,
    TaxSettlement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartAsset(usize),
    GrowAsset(usize),
    PayIncome(usize),
    PayExpense(usize),
    Transaction(usize),
    SettleTax(TaxYear),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    pub date: NaiveDate,
    pub class: MomentClass,
    /// Insertion order, the final tie-break
    pub seq: usize,
    pub action: Action,
}

impl Moment {
    fn key(&self) -> (NaiveDate, MomentClass, usize) {
        (self.date, self.class, self.seq)
    }
}

#[derive(Debug, Default)]
pub struct TimelineBuilder {
    moments: Vec<Moment>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, date: NaiveDate, class: MomentClass, action: Action) {
        let seq = self.moments.len();
        self.moments.push(Moment {
            date,
            class,
            seq,
            action,
        });
    }

    pub fn push_all<I>(&mut self, dates: I, class: MomentClass, action: Action)
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        for date in dates {
            self.push(date, class, action);
        }
    }

    /// Push every occurrence of `period` from `first` up to, not including,
    /// `until`.
    pub fn push_recurring(
        &mut self,
        first: NaiveDate,
        until: NaiveDate,
        period: Period,
        class: MomentClass,
        action: Action,
    ) {
        self.push_all(generate(Interval::new(first, until), period), class, action);
    }

    /// Add a settlement at every tax-year end from the earliest moment up to
    /// `end`, drop moments on or after `end` and sort.
    pub fn build(mut self, end: NaiveDate) -> Vec<Moment> {
        if let Some(first) = self.moments.iter().map(|m| m.date).min() {
            let mut year = TaxYear::from_date(first);
            while year.end_date() < end {
                self.push(year.end_date(), MomentClass::TaxSettlement, Action::SettleTax(year));
                year = year.next();
            }
        }

        let mut moments: Vec<Moment> = self
            .moments
            .into_iter()
            .filter(|m| m.date < end)
            .collect();
        moments.sort_by_key(Moment::key);
        log::debug!("Timeline has {} moments before {}", moments.len(), end);
        moments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn same_date_orders_by_class_then_insertion() {
        let mut builder = TimelineBuilder::new();
        let day = date(2020, 1, 1);
        builder.push(day, MomentClass::Conditional, Action::Transaction(0));
        builder.push(day, MomentClass::Scheduled, Action::Transaction(1));
        builder.push(day, MomentClass::Lifecycle, Action::StartAsset(0));
        builder.push(day, MomentClass::Scheduled, Action::Transaction(2));
        builder.push(day, MomentClass::SettingRevaluation, Action::Transaction(3));
        let actions: Vec<_> = builder
            .build(date(2020, 2, 1))
            .into_iter()
            .map(|m| m.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                Action::Transaction(3),
                Action::StartAsset(0),
                Action::Transaction(1),
                Action::Transaction(2),
                Action::Transaction(0),
            ]
        );
    }

    #[test]
    fn settlements_close_each_tax_year_last() {
        let mut builder = TimelineBuilder::new();
        builder.push(date(2019, 1, 1), MomentClass::Lifecycle, Action::StartAsset(0));
        builder.push(date(2019, 4, 5), MomentClass::Scheduled, Action::Transaction(0));
        let moments = builder.build(date(2020, 6, 1));
        let settlements: Vec<_> = moments
            .iter()
            .filter(|m| m.class == MomentClass::TaxSettlement)
            .map(|m| (m.date, m.action))
            .collect();
        assert_eq!(
            settlements,
            vec![
                (date(2019, 4, 5), Action::SettleTax(TaxYear(2019))),
                (date(2020, 4, 5), Action::SettleTax(TaxYear(2020))),
            ]
        );
        assert_eq!(moments[1].action, Action::Transaction(0));
        assert_eq!(moments[2].action, Action::SettleTax(TaxYear(2019)));
    }

    #[test]
    fn moments_from_end_onwards_are_dropped() {
        let mut builder = TimelineBuilder::new();
        builder.push_recurring(
            date(2020, 1, 1),
            date(2021, 1, 1),
            Period::MONTHLY,
            MomentClass::Lifecycle,
            Action::PayIncome(0),
        );
        let moments = builder.build(date(2020, 3, 1));
        assert_eq!(moments.len(), 2);
        assert!(moments.iter().all(|m| m.date < date(2020, 3, 1)));
    }
}

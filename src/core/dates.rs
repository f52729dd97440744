//! Date expressions.
//!
//! A date field may hold a calendar literal, the name of a trigger, an
//! offset (`retire+6m`, `Jan 1 2030-2y`) or a comparison
//! (`A<B?C:D`: C when A is earlier than B, otherwise D). Expressions are
//! parsed once into a [`DateExpr`] tree and evaluated with an explicit
//! depth counter, so a trigger that refers back to itself fails instead of
//! looping.

use super::error::EngineError;
use super::value::{parse_amount, ParsedValue};
use chrono::{Datelike, Days, Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use std::collections::{HashMap, HashSet};

/// Maximum nesting when evaluating an expression, counting trigger lookups.
pub const MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl DurationUnit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'd' => Some(DurationUnit::Days),
            'w' => Some(DurationUnit::Weeks),
            'm' => Some(DurationUnit::Months),
            'y' => Some(DurationUnit::Years),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateExpr {
    Literal(NaiveDate),
    TriggerRef(String),
    /// `count` is negative for subtraction.
    Offset {
        base: Box<DateExpr>,
        count: i64,
        unit: DurationUnit,
    },
    Conditional {
        lhs: Box<DateExpr>,
        rhs: Box<DateExpr>,
        then: Box<DateExpr>,
        otherwise: Box<DateExpr>,
    },
}

impl DateExpr {
    /// Parse `expr`, treating any string in `trigger_names` as a reference.
    pub fn parse(expr: &str, trigger_names: &HashSet<String>) -> Result<DateExpr, EngineError> {
        let s = expr.trim();
        if s.is_empty() {
            return Err(EngineError::invalid_date(expr));
        }

        if let Some((lhs, rhs, then, otherwise)) = split_conditional(s) {
            return Ok(DateExpr::Conditional {
                lhs: Box::new(Self::parse(lhs, trigger_names)?),
                rhs: Box::new(Self::parse(rhs, trigger_names)?),
                then: Box::new(Self::parse(then, trigger_names)?),
                otherwise: Box::new(Self::parse(otherwise, trigger_names)?),
            });
        }

        if let Some((base, count, unit)) = split_offset(s) {
            return Ok(DateExpr::Offset {
                base: Box::new(Self::parse(base, trigger_names)?),
                count,
                unit,
            });
        }

        if trigger_names.contains(s) {
            return Ok(DateExpr::TriggerRef(s.to_string()));
        }

        parse_literal(s)
            .map(DateExpr::Literal)
            .ok_or_else(|| EngineError::invalid_date(expr))
    }
}

/// Resolves date expressions against a fixed set of named triggers.
#[derive(Debug, Clone, Default)]
pub struct DateResolver {
    names: HashSet<String>,
    triggers: HashMap<String, Result<DateExpr, EngineError>>,
}

impl DateResolver {
    pub fn new<'a, I>(triggers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let raw: Vec<(&str, &str)> = triggers.into_iter().collect();
        let names: HashSet<String> = raw.iter().map(|(name, _)| name.to_string()).collect();
        let triggers = raw
            .iter()
            .map(|(name, expr)| (name.to_string(), DateExpr::parse(expr, &names)))
            .collect();
        DateResolver { names, triggers }
    }

    pub fn parse(&self, expr: &str) -> Result<DateExpr, EngineError> {
        DateExpr::parse(expr, &self.names)
    }

    /// Resolve an expression string to a concrete date.
    pub fn resolve(&self, expr: &str) -> Result<NaiveDate, EngineError> {
        let parsed = self.parse(expr)?;
        self.eval_at(&parsed, 0)
            .map_err(|_| EngineError::invalid_date(expr))
    }

    fn eval_at(&self, expr: &DateExpr, depth: usize) -> Result<NaiveDate, EngineError> {
        if depth > MAX_DEPTH {
            return Err(EngineError::invalid_date(format!("{expr:?}")));
        }
        match expr {
            DateExpr::Literal(date) => Ok(*date),
            DateExpr::TriggerRef(name) => match self.triggers.get(name) {
                Some(Ok(inner)) => self.eval_at(inner, depth + 1),
                Some(Err(e)) => Err(e.clone()),
                None => Err(EngineError::invalid_date(name)),
            },
            DateExpr::Offset { base, count, unit } => {
                let date = self.eval_at(base, depth + 1)?;
                add_duration(date, *count, *unit)
                    .ok_or_else(|| EngineError::invalid_date(format!("{expr:?}")))
            }
            DateExpr::Conditional {
                lhs,
                rhs,
                then,
                otherwise,
            } => {
                let a = self.eval_at(lhs, depth + 1)?;
                let b = self.eval_at(rhs, depth + 1)?;
                if a < b {
                    self.eval_at(then, depth + 1)
                } else {
                    self.eval_at(otherwise, depth + 1)
                }
            }
        }
    }
}

/// Add `count` units to `date`. Month and year steps clamp to the end of the
/// month.
pub fn add_duration(date: NaiveDate, count: i64, unit: DurationUnit) -> Option<NaiveDate> {
    let magnitude = count.unsigned_abs();
    match unit {
        DurationUnit::Days | DurationUnit::Weeks => {
            let days = if unit == DurationUnit::Weeks {
                magnitude.checked_mul(7)?
            } else {
                magnitude
            };
            if count >= 0 {
                date.checked_add_days(Days::new(days))
            } else {
                date.checked_sub_days(Days::new(days))
            }
        }
        DurationUnit::Months | DurationUnit::Years => {
            let months = if unit == DurationUnit::Years {
                magnitude.checked_mul(12)?
            } else {
                magnitude
            };
            let months = Months::new(u32::try_from(months).ok()?);
            if count >= 0 {
                date.checked_add_months(months)
            } else {
                date.checked_sub_months(months)
            }
        }
    }
}

/// Whole calendar months from `from` to `to`; negative when `to` is earlier.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let mut months = i64::from(to.year() - from.year()) * 12
        + i64::from(to.month()) - i64::from(from.month());
    if months > 0 && to.day() < from.day() {
        months -= 1;
    } else if months < 0 && to.day() > from.day() {
        months += 1;
    }
    months
}

/// Split `A<B?C:D`. The `:` matching the first `?` is found by counting
/// nested `?`/`:` pairs, so either branch may itself be a conditional.
fn split_conditional(s: &str) -> Option<(&str, &str, &str, &str)> {
    let q = s.find('?')?;
    let (condition, rest) = (&s[..q], &s[q + 1..]);
    let lt = condition.find('<')?;

    let mut depth = 0usize;
    let mut colon = None;
    for (i, c) in rest.char_indices() {
        match c {
            '?' => depth += 1,
            ':' if depth == 0 => {
                colon = Some(i);
                break;
            }
            ':' => depth -= 1,
            _ => {}
        }
    }
    let colon = colon?;
    Some((
        &condition[..lt],
        &condition[lt + 1..],
        &rest[..colon],
        &rest[colon + 1..],
    ))
}

/// Split `A+Nu` / `A-Nu` at the rightmost operator.
fn split_offset(s: &str) -> Option<(&str, i64, DurationUnit)> {
    let op = s.rfind(['+', '-'])?;
    let base = s[..op].trim();
    let suffix = s[op + 1..].trim();
    if base.is_empty() {
        return None;
    }
    let unit = DurationUnit::from_char(suffix.chars().last()?)?;
    let number = &suffix[..suffix.len() - 1];
    let count = match parse_amount(number).ok()? {
        ParsedValue::Literal { value, .. } if value.fract().is_zero() => value.to_i64()?,
        _ => return None,
    };
    let count = if s[op..].starts_with('-') { -count } else { count };
    Some((base, count, unit))
}

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

const LAYOUTS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse a calendar literal in any of the accepted layouts.
pub fn parse_literal(s: &str) -> Option<NaiveDate> {
    // Drop any time of day ("2019-01-01T00:00:00", "Tue Jan 01 2019 00:00:00 GMT").
    let s = match s.find('T') {
        Some(10) if s.as_bytes().get(4) == Some(&b'-') => &s[..10],
        _ => s,
    };
    let tokens: Vec<&str> = s
        .split_whitespace()
        .take_while(|t| !t.contains(':'))
        .collect();
    let tokens = strip_weekday(&tokens);
    if tokens.is_empty() {
        return None;
    }
    let joined = tokens.join(" ");

    if joined.len() == 4 && joined.chars().all(|c| c.is_ascii_digit()) {
        return NaiveDate::from_ymd_opt(joined.parse().ok()?, 1, 1);
    }

    for layout in LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(&joined, layout) {
            return Some(date);
        }
    }

    // "January 2020" means the first of the month.
    if tokens.len() == 2 {
        let first_of_month = format!("1 {joined}");
        for layout in ["%d %B %Y", "%d %b %Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(&first_of_month, layout) {
                return Some(date);
            }
        }
    }
    None
}

fn strip_weekday<'a>(tokens: &'a [&'a str]) -> &'a [&'a str] {
    let Some(first) = tokens.first() else {
        return tokens;
    };
    let word = first.trim_end_matches(',').to_ascii_lowercase();
    let is_weekday = WEEKDAYS
        .iter()
        .any(|day| word == *day || (word.len() == 3 && day.starts_with(word.as_str())));
    if is_weekday {
        &tokens[1..]
    } else {
        tokens
    }
}

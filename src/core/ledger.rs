use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;

/// Decimal places used for currency values.
pub const CURRENCY_PRECISION: u32 = 2;

/// One (item, date, value) record of the output ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub name: String,
    pub date: NaiveDate,
    pub value: Decimal,
    /// Decimal places to show
    pub precision: u32,
}

impl Evaluation {
    pub fn currency(name: impl Into<String>, date: NaiveDate, value: Decimal) -> Self {
        Evaluation {
            name: name.into(),
            date,
            value,
            precision: CURRENCY_PRECISION,
        }
    }

    /// Settings keep every significant decimal place, and at least two.
    pub fn setting(name: impl Into<String>, date: NaiveDate, value: Decimal) -> Self {
        Evaluation {
            name: name.into(),
            date,
            value,
            precision: value.normalize().scale().max(CURRENCY_PRECISION),
        }
    }

    pub fn display_value(&self) -> Decimal {
        self.value.round_dp(self.precision)
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    date: NaiveDate,
    name: &'a str,
    value: String,
}

/// Append-only ledger, non-decreasing in date. Evaluations dated before
/// `since` are replayed but not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    since: NaiveDate,
    entries: Vec<Evaluation>,
}

impl Ledger {
    pub fn since(since: NaiveDate) -> Self {
        Ledger {
            since,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, evaluation: Evaluation) {
        if evaluation.date < self.since {
            return;
        }
        debug_assert!(
            self.entries
                .last()
                .map_or(true, |last| last.date <= evaluation.date),
            "ledger must stay in date order"
        );
        log::trace!(
            "{} {} = {}",
            evaluation.date,
            evaluation.name,
            evaluation.value
        );
        self.entries.push(evaluation);
    }

    pub fn extend<I: IntoIterator<Item = Evaluation>>(&mut self, evaluations: I) {
        for evaluation in evaluations {
            self.push(evaluation);
        }
    }

    pub fn into_entries(self) -> Vec<Evaluation> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write evaluations as CSV with values rounded to their display precision.
pub fn write_csv<W: io::Write>(evaluations: &[Evaluation], writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for evaluation in evaluations {
        wtr.serialize(CsvRow {
            date: evaluation.date,
            name: &evaluation.name,
            value: evaluation.display_value().to_string(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// SHA-256 of the CSV rendering, hex encoded.
pub fn digest(evaluations: &[Evaluation]) -> csv::Result<String> {
    let mut buf = Vec::new();
    write_csv(evaluations, &mut buf)?;
    let mut hasher = Sha256::new();
    hasher.update(&buf);
    Ok(hex::encode(hasher.finalize()))
}

pub mod dates;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod model;
pub mod recurrence;
pub mod table;
pub mod timeline;
pub mod transfer;
pub mod value;
pub mod warnings;

// Flat public surface for domain types and functions.
pub use dates::{DateExpr, DateResolver, DurationUnit};
pub use engine::{check, date_resolver, run, Projection, RunConfig, TodaySnapshot};
pub use error::EngineError;
pub use ledger::{digest, write_csv, Evaluation, Ledger};
pub use model::{
    read_model_json, Asset, Expense, Income, Model, ModelError, Setting, SettingKind, Transaction,
    TransactionKind, Trigger,
};
pub use recurrence::{generate, Interval, Period, Recurrence};
pub use value::{parse_amount, parse_growth, DisplayTag, ParsedValue};
pub use warnings::Warning;

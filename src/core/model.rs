use crate::tax::TaxRules;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;

/// Separator for multi-item FROM/TO fields and multi-part liability tags.
pub const SEPARATOR: char = '/';

/// Asset that receives incomes and pays expenses and tax.
pub const CASH_ASSET: &str = "Cash";

/// Setting holding annual inflation as a percentage.
pub const CPI_SETTING: &str = "cpi";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },
    #[error("transaction '{name}' stops before it starts")]
    StopBeforeStart { name: String },
}

/// Input root for model JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Model {
    pub settings: Vec<Setting>,
    pub triggers: Vec<Trigger>,
    pub incomes: Vec<Income>,
    pub expenses: Vec<Expense>,
    pub assets: Vec<Asset>,
    pub transactions: Vec<Transaction>,
    /// Band thresholds, rates and allowances; UK 2019/20 when omitted
    pub tax_rules: TaxRules,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    #[default]
    Constant,
    Adjustable,
    /// Presentation-only; never part of the today snapshot
    View,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Setting {
    pub name: String,
    /// Literal number or an expression over other settings (e.g. "2basePrice")
    pub value: String,
    pub kind: SettingKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Trigger {
    pub name: String,
    /// Date expression; may refer to other triggers
    pub date: String,
}

/// An income; paid into the Cash asset on every recurrence
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Income {
    pub name: String,
    pub start: String,
    pub end: String,
    pub value: String,
    /// Date at which `value` applies; inflation accrues from here
    pub value_set: String,
    pub recurrence: String,
    pub cpi_immune: bool,
    /// e.g. "Joe(incomeTax)/Joe(NI)"
    pub liability: String,
    pub category: String,
}

impl Default for Income {
    fn default() -> Self {
        Income {
            name: String::new(),
            start: String::new(),
            end: String::new(),
            value: String::new(),
            value_set: String::new(),
            recurrence: "1m".to_string(),
            cpi_immune: false,
            liability: String::new(),
            category: String::new(),
        }
    }
}

/// Expenses share the income layout; they are paid out of Cash.
pub type Expense = Income;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Asset {
    pub name: String,
    pub category: String,
    pub start: String,
    /// Literal value, or unit price when `quantity` is set; may be a setting
    pub value: String,
    #[schemars(with = "Option<f64>")]
    pub quantity: Option<Decimal>,
    /// Annual growth, percent or setting name
    pub growth: String,
    pub cpi_immune: bool,
    pub can_be_negative: bool,
    /// Debts are entered as the positive amount owed
    pub is_debt: bool,
    /// e.g. "Joe(CGT)"
    pub liability: String,
    /// CGT basis; the starting value when empty
    pub purchase_price: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[default]
    Transfer,
    /// Sell from ranked sources only while the target is negative
    Liquidate,
    /// Transfer into a debt that may overshoot into credit
    PayOff,
    /// Set or scale an item's value without moving money
    Revalue,
    BondInvest,
    BondMature,
    /// Contribution relieved from income tax
    Pension,
    /// Contribution relieved from income tax and NI
    PensionSalarySacrifice,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Transaction {
    pub name: String,
    /// Empty, an asset, a '/'-separated list, or a category
    pub from: String,
    pub from_absolute: bool,
    pub from_value: String,
    pub to: String,
    pub to_absolute: bool,
    pub to_value: String,
    pub date: String,
    /// Empty for a one-off transaction
    pub recurrence: String,
    pub stop_date: String,
    pub kind: TransactionKind,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            name: String::new(),
            from: String::new(),
            from_absolute: true,
            from_value: String::new(),
            to: String::new(),
            to_absolute: false,
            to_value: String::new(),
            date: String::new(),
            recurrence: String::new(),
            stop_date: String::new(),
            kind: TransactionKind::Transfer,
        }
    }
}

impl Model {
    /// Check the structural invariants that do not need evaluation.
    pub fn validate(&self) -> Result<(), ModelError> {
        check_unique("setting", self.settings.iter().map(|s| &s.name))?;
        check_unique("trigger", self.triggers.iter().map(|t| &t.name))?;
        check_unique("income", self.incomes.iter().map(|i| &i.name))?;
        check_unique("expense", self.expenses.iter().map(|e| &e.name))?;
        check_unique("asset", self.assets.iter().map(|a| &a.name))?;
        check_unique("transaction", self.transactions.iter().map(|t| &t.name))?;

        for tx in &self.transactions {
            if tx.stop_date.trim().is_empty() {
                continue;
            }
            let start = super::dates::parse_literal(&tx.date);
            let stop = super::dates::parse_literal(&tx.stop_date);
            if let (Some(start), Some(stop)) = (start, stop) {
                if stop < start {
                    return Err(ModelError::StopBeforeStart {
                        name: tx.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_unique<'a, I>(kind: &'static str, names: I) -> Result<(), ModelError>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(ModelError::DuplicateName {
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Read a model from JSON and check its invariants
pub fn read_model_json<R: Read>(reader: R) -> Result<Model, ModelError> {
    let model: Model = serde_json::from_reader(reader)?;
    model.validate()?;
    Ok(model)
}

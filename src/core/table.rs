//! The item-value table: current values of every asset, debt, income,
//! expense and setting for one run.

use super::dates::months_between;
use crate::tax::CostBasis;
use chrono::NaiveDate;
use rust_decimal::{Decimal, MathematicalOps};
use std::collections::{BTreeMap, HashMap};

/// Current state of one asset or debt.
#[derive(Debug, Clone)]
pub struct Holding {
    pub name: String,
    pub category: String,
    /// The whole value, or the price of one unit when `quantity` is set
    pub unit_price: Decimal,
    pub quantity: Option<Decimal>,
    /// Setting the unit price follows, with its multiplier
    pub price_setting: Option<(String, Decimal)>,
    pub basis: Option<CostBasis>,
    pub liability: String,
    pub is_debt: bool,
    pub can_be_negative: bool,
    pub started: bool,
}

impl Holding {
    pub fn value(&self) -> Decimal {
        match self.quantity {
            Some(quantity) => self.unit_price * quantity,
            None => self.unit_price,
        }
    }

    pub fn has_quantity(&self) -> bool {
        self.quantity.is_some()
    }

    /// Value that may leave without taking the holding below zero.
    pub fn available(&self) -> Option<Decimal> {
        if self.can_be_negative {
            None
        } else {
            Some(self.value().max(Decimal::ZERO))
        }
    }

    /// Change the value by `delta`. Quantity-bearing holdings change by whole
    /// units at the current price.
    pub fn adjust(&mut self, delta: Decimal) {
        match self.quantity.as_mut() {
            Some(quantity) if !self.unit_price.is_zero() => {
                *quantity += (delta / self.unit_price).round();
            }
            Some(_) => {}
            None => self.unit_price += delta,
        }
    }
}

/// Current state of an income or expense.
#[derive(Debug, Clone)]
pub struct Flow {
    pub name: String,
    /// Value at `value_set`, before inflation
    pub base: Decimal,
    pub value_set: NaiveDate,
    pub cpi_immune: bool,
    pub liability: String,
    pub category: String,
    /// Amount of the most recent payment
    pub current: Decimal,
    pub started: bool,
}

impl Flow {
    /// Value at `date` after annual inflation `cpi` (a fraction) compounded
    /// over the whole months since `value_set`. `None` if it overflows.
    pub fn value_at(&self, date: NaiveDate, cpi: Decimal) -> Option<Decimal> {
        let months = months_between(self.value_set, date);
        if self.cpi_immune || cpi.is_zero() || months <= 0 {
            return Some(self.base);
        }
        let years = Decimal::from(months) / Decimal::from(12);
        (Decimal::ONE + cpi)
            .checked_powd(years)?
            .checked_mul(self.base)
    }
}

/// Which kind of item a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRef {
    Asset(usize),
    Income(usize),
    Expense(usize),
    Setting,
}

#[derive(Debug, Clone, Default)]
pub struct ItemTable {
    assets: Vec<Holding>,
    asset_index: HashMap<String, usize>,
    incomes: Vec<Flow>,
    expenses: Vec<Flow>,
    settings: BTreeMap<String, Decimal>,
}

impl ItemTable {
    pub fn new(settings: BTreeMap<String, Decimal>) -> Self {
        ItemTable {
            settings,
            ..Default::default()
        }
    }

    pub fn add_asset(&mut self, holding: Holding) -> usize {
        let index = self.assets.len();
        self.asset_index.insert(holding.name.clone(), index);
        self.assets.push(holding);
        index
    }

    pub fn add_income(&mut self, flow: Flow) -> usize {
        self.incomes.push(flow);
        self.incomes.len() - 1
    }

    pub fn add_expense(&mut self, flow: Flow) -> usize {
        self.expenses.push(flow);
        self.expenses.len() - 1
    }

    pub fn assets(&self) -> &[Holding] {
        &self.assets
    }

    pub fn asset(&self, index: usize) -> &Holding {
        &self.assets[index]
    }

    pub fn asset_mut(&mut self, index: usize) -> &mut Holding {
        &mut self.assets[index]
    }

    pub fn asset_by_name(&self, name: &str) -> Option<&Holding> {
        self.asset_index.get(name).map(|&i| &self.assets[i])
    }

    pub fn incomes(&self) -> &[Flow] {
        &self.incomes
    }

    pub fn income_mut(&mut self, index: usize) -> &mut Flow {
        &mut self.incomes[index]
    }

    pub fn expenses(&self) -> &[Flow] {
        &self.expenses
    }

    pub fn expense_mut(&mut self, index: usize) -> &mut Flow {
        &mut self.expenses[index]
    }

    pub fn settings(&self) -> &BTreeMap<String, Decimal> {
        &self.settings
    }

    pub fn setting(&self, name: &str) -> Option<Decimal> {
        self.settings.get(name).copied()
    }

    pub fn set_setting(&mut self, name: &str, value: Decimal) {
        self.settings.insert(name.to_string(), value);
    }

    /// Resolve one name to a started asset, in any state.
    pub fn find_asset(&self, name: &str) -> Option<usize> {
        self.asset_index
            .get(name)
            .copied()
            .filter(|&i| self.assets[i].started)
    }

    /// Started assets in a category, in declaration order.
    pub fn category(&self, category: &str) -> Vec<usize> {
        self.assets
            .iter()
            .enumerate()
            .filter(|(_, a)| a.started && a.category == category)
            .map(|(i, _)| i)
            .collect()
    }

    /// Resolve a name to any revaluable item: assets first, then incomes,
    /// expenses and settings.
    pub fn find_item(&self, name: &str) -> Option<ItemRef> {
        if let Some(index) = self.find_asset(name) {
            return Some(ItemRef::Asset(index));
        }
        if let Some(index) = self.incomes.iter().position(|f| f.name == name) {
            return Some(ItemRef::Income(index));
        }
        if let Some(index) = self.expenses.iter().position(|f| f.name == name) {
            return Some(ItemRef::Expense(index));
        }
        self.settings.contains_key(name).then_some(ItemRef::Setting)
    }

    /// Assets whose unit price follows `setting`
    pub fn priced_from(&self, setting: &str) -> Vec<usize> {
        self.assets
            .iter()
            .enumerate()
            .filter(|(_, a)| matches!(&a.price_setting, Some((name, _)) if name == setting))
            .map(|(i, _)| i)
            .collect()
    }
}

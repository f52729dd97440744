//! Evaluation orchestrator.
//!
//! A run compiles the model once (dates resolved, amounts decoded, the
//! timeline built) and then replays the timeline against a fresh
//! [`ItemTable`]. Anything that fails to compile or to apply becomes a
//! [`Warning`] and the run carries on.

use super::dates::DateResolver;
use super::error::EngineError;
use super::ledger::{Evaluation, Ledger};
use super::model::{Asset, Income, Model, SettingKind, TransactionKind, CASH_ASSET};
use super::recurrence::{generate, Interval, Period};
use super::table::{Flow, Holding, ItemTable};
use super::timeline::{Action, Moment, MomentClass, TimelineBuilder};
use super::transfer::{self, Context, TransferSpec};
use super::value::{annual_rate, cpi_rate, parse_amount, parse_growth, resolve_settings, ParsedValue};
use super::warnings::Warning;
use crate::tax::{persons_for, CostBasis, Regime, TaxEngine};
use chrono::NaiveDate;
use rust_decimal::{Decimal, MathematicalOps};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub interval: Interval,
    /// Date of the "as of today" snapshot
    pub today: NaiveDate,
}

/// Values of every started item as of the configured today.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TodaySnapshot {
    pub assets: BTreeMap<String, Decimal>,
    pub debts: BTreeMap<String, Decimal>,
    pub expenses: BTreeMap<String, Decimal>,
    pub incomes: BTreeMap<String, Decimal>,
    pub settings: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub evaluations: Vec<Evaluation>,
    pub today: TodaySnapshot,
    pub warnings: Vec<Warning>,
}

/// Date resolver over the model's triggers.
pub fn date_resolver(model: &Model) -> DateResolver {
    DateResolver::new(
        model
            .triggers
            .iter()
            .map(|t| (t.name.as_str(), t.date.as_str())),
    )
}

struct Compiled {
    table: ItemTable,
    growth: Vec<Option<ParsedValue>>,
    asset_cpi_immune: Vec<bool>,
    transfers: Vec<TransferSpec>,
    moments: Vec<Moment>,
    warnings: Vec<Warning>,
}

struct Compiler<'a> {
    resolver: DateResolver,
    interval: Interval,
    warnings: Vec<Warning>,
    settings: &'a BTreeMap<String, Decimal>,
}

impl Compiler<'_> {
    fn date(&mut self, item: &str, field: &str, expr: &str) -> Option<NaiveDate> {
        self.resolver
            .resolve(expr)
            .map_err(|error| self.unresolved(item, field, error))
            .ok()
    }

    /// An empty field takes `default`.
    fn date_or(&mut self, item: &str, field: &str, expr: &str, default: NaiveDate) -> Option<NaiveDate> {
        if expr.trim().is_empty() {
            Some(default)
        } else {
            self.date(item, field, expr)
        }
    }

    fn unresolved(&mut self, item: &str, field: &str, error: EngineError) {
        log::warn!("{}: cannot resolve {}: {}", item, field, error);
        self.warnings.push(Warning::UnresolvedDate {
            item: item.to_string(),
            field: field.to_string(),
            error,
        });
    }

    fn unusable(&mut self, item: &str, field: &str, error: EngineError) {
        log::warn!("{}: unusable {}: {}", item, field, error);
        self.warnings.push(Warning::UnusableValue {
            item: item.to_string(),
            field: field.to_string(),
            error,
        });
    }

    fn amount(&self, raw: &str) -> Result<Decimal, EngineError> {
        if raw.trim().is_empty() {
            return Ok(Decimal::ZERO);
        }
        match parse_amount(raw)? {
            ParsedValue::Percentage(_) | ParsedValue::Units(_) => Err(EngineError::malformed(raw)),
            value => value.resolve(|name| self.settings.get(name).copied()),
        }
    }

    fn holding(&mut self, asset: &Asset) -> Option<(Holding, Option<ParsedValue>)> {
        let parsed = if asset.value.trim().is_empty() {
            ParsedValue::literal(Decimal::ZERO)
        } else {
            match parse_amount(&asset.value) {
                Ok(parsed) => parsed,
                Err(error) => {
                    self.unusable(&asset.name, "value", error);
                    return None;
                }
            }
        };
        let price_setting = match &parsed {
            ParsedValue::SettingRef { name, multiplier } => Some((name.clone(), *multiplier)),
            _ => None,
        };
        let value = match parsed {
            ParsedValue::Percentage(_) | ParsedValue::Units(_) => {
                Err(EngineError::malformed(asset.value.as_str()))
            }
            other => other.resolve(|name| self.settings.get(name).copied()),
        };
        let value = match value {
            Ok(value) => value,
            Err(error) => {
                self.unusable(&asset.name, "value", error);
                return None;
            }
        };

        let growth = match parse_growth(&asset.growth) {
            Ok(growth) => growth,
            Err(error) => {
                self.unusable(&asset.name, "growth", error);
                return None;
            }
        };

        let basis = if persons_for(&asset.liability, Regime::CapitalGains).is_empty() {
            None
        } else {
            let start_value = value * asset.quantity.unwrap_or(Decimal::ONE);
            let cost = if asset.purchase_price.trim().is_empty() {
                Ok(start_value)
            } else {
                self.amount(&asset.purchase_price)
            };
            match cost {
                Ok(cost) => Some(CostBasis::new(asset.name.as_str(), cost)),
                Err(error) => {
                    self.unusable(&asset.name, "purchase_price", error);
                    return None;
                }
            }
        };

        let unit_price = if asset.is_debt { -value } else { value };
        let holding = Holding {
            name: asset.name.clone(),
            category: asset.category.clone(),
            unit_price,
            quantity: asset.quantity,
            price_setting: price_setting.clone(),
            basis,
            liability: asset.liability.clone(),
            is_debt: asset.is_debt,
            can_be_negative: asset.can_be_negative || asset.is_debt,
            started: false,
        };
        // setting-priced assets follow their setting instead of growing
        let growth = price_setting.is_none().then_some(growth);
        Some((holding, growth))
    }

    /// Resolve the dates and base value of an income or expense. Returns the
    /// flow with its first and last-exclusive payment dates and period.
    fn flow(&mut self, flow: &Income) -> Option<(Flow, NaiveDate, NaiveDate, Period)> {
        let interval_end = self.interval.end;
        let start = self.date(&flow.name, "start", &flow.start)?;
        let end = self.date_or(&flow.name, "end", &flow.end, interval_end)?;
        let value_set = self.date_or(&flow.name, "value_set", &flow.value_set, start)?;
        let base = match self.amount(&flow.value) {
            Ok(base) => base,
            Err(error) => {
                self.unusable(&flow.name, "value", error);
                return None;
            }
        };
        let period = match flow.recurrence.parse::<Period>() {
            Ok(period) => period,
            Err(error) => {
                self.unusable(&flow.name, "recurrence", error);
                return None;
            }
        };
        Some((
            Flow {
                name: flow.name.clone(),
                base,
                value_set,
                cpi_immune: flow.cpi_immune,
                liability: flow.liability.clone(),
                category: flow.category.clone(),
                current: Decimal::ZERO,
                started: false,
            },
            start,
            end.min(interval_end),
            period,
        ))
    }
}

fn compile(model: &Model, interval: Interval) -> Compiled {
    let settings = resolve_settings(
        model
            .settings
            .iter()
            .map(|s| (s.name.as_str(), s.value.as_str())),
    );
    let mut compiler = Compiler {
        resolver: date_resolver(model),
        interval,
        warnings: Vec::new(),
        settings: &settings,
    };
    let mut table = ItemTable::new(settings.clone());
    let mut builder = TimelineBuilder::new();
    let mut growth = Vec::new();
    let mut asset_cpi_immune = Vec::new();

    for asset in &model.assets {
        let Some(start) = compiler.date_or(&asset.name, "start", &asset.start, interval.start)
        else {
            continue;
        };
        let Some((holding, rate)) = compiler.holding(asset) else {
            continue;
        };
        let index = table.add_asset(holding);
        growth.push(rate.clone());
        asset_cpi_immune.push(asset.cpi_immune);
        builder.push(start, MomentClass::Lifecycle, Action::StartAsset(index));
        if rate.is_some() {
            let steps = generate(Interval::new(start, interval.end), Period::MONTHLY).skip(1);
            builder.push_all(steps, MomentClass::Lifecycle, Action::GrowAsset(index));
        }
    }

    for income in &model.incomes {
        if let Some((flow, start, end, period)) = compiler.flow(income) {
            let index = table.add_income(flow);
            builder.push_recurring(start, end, period, MomentClass::Lifecycle, Action::PayIncome(index));
        }
    }
    for expense in &model.expenses {
        if let Some((flow, start, end, period)) = compiler.flow(expense) {
            let index = table.add_expense(flow);
            builder.push_recurring(start, end, period, MomentClass::Lifecycle, Action::PayExpense(index));
        }
    }

    let setting_names: Vec<&str> = model.settings.iter().map(|s| s.name.as_str()).collect();
    let mut transfers = Vec::new();
    for tx in &model.transactions {
        let spec = match TransferSpec::compile(tx) {
            Ok(spec) => spec,
            Err(error) => {
                compiler.unusable(&tx.name, "value", error);
                continue;
            }
        };
        let Some(date) = compiler.date(&tx.name, "date", &tx.date) else {
            continue;
        };
        let class = if spec.kind == TransactionKind::Liquidate {
            MomentClass::Conditional
        } else if spec.revalues_settings_only(setting_names.iter().copied()) {
            MomentClass::SettingRevaluation
        } else {
            MomentClass::Scheduled
        };
        let index = transfers.len();
        transfers.push(spec);

        if tx.recurrence.trim().is_empty() {
            builder.push(date, class, Action::Transaction(index));
            continue;
        }
        let period = match tx.recurrence.parse::<Period>() {
            Ok(period) => period,
            Err(error) => {
                compiler.unusable(&tx.name, "recurrence", error);
                continue;
            }
        };
        let Some(stop) = compiler.date_or(&tx.name, "stop_date", &tx.stop_date, interval.end)
        else {
            continue;
        };
        builder.push_recurring(date, stop.min(interval.end), period, class, Action::Transaction(index));
    }

    Compiled {
        table,
        growth,
        asset_cpi_immune,
        transfers,
        moments: builder.build(interval.end),
        warnings: compiler.warnings,
    }
}

/// Resolve every date and amount in the model without replaying it.
pub fn check(model: &Model, interval: Interval) -> Vec<Warning> {
    compile(model, interval).warnings
}

struct Replay<'a> {
    model: &'a Model,
    table: ItemTable,
    tax: TaxEngine,
    ledger: Ledger,
    warnings: Vec<Warning>,
}

impl Replay<'_> {
    fn skip(&mut self, item: &str, date: NaiveDate, error: EngineError) {
        log::warn!("{} on {} skipped: {}", item, date, error);
        self.warnings.push(Warning::SkippedEvent {
            item: item.to_string(),
            date,
            error,
        });
    }

    fn asset_evaluation(&self, index: usize, date: NaiveDate) -> Evaluation {
        let holding = self.table.asset(index);
        Evaluation::currency(holding.name.clone(), date, holding.value())
    }

    /// Add `delta` to Cash and record it.
    fn move_cash(&mut self, item: &str, date: NaiveDate, delta: Decimal) {
        match self.table.find_asset(CASH_ASSET) {
            Some(cash) if self.table.asset(cash).value().checked_add(delta).is_none() => {
                self.skip(item, date, overflow(item));
            }
            Some(cash) => {
                self.table.asset_mut(cash).adjust(delta);
                let evaluation = self.asset_evaluation(cash, date);
                self.ledger.push(evaluation);
            }
            None => self.skip(item, date, EngineError::unknown_item(CASH_ASSET)),
        }
    }

    /// Opening value of every asset started before the interval.
    fn open(&mut self, start: NaiveDate) {
        let opening: Vec<Evaluation> = self
            .table
            .assets()
            .iter()
            .filter(|h| h.started)
            .map(|h| Evaluation::currency(h.name.clone(), start, h.value()))
            .collect();
        self.ledger.extend(opening);
    }

    fn snapshot(&self, today: NaiveDate) -> TodaySnapshot {
        let cpi = cpi_rate(self.table.settings());
        let mut snapshot = TodaySnapshot::default();
        for holding in self.table.assets().iter().filter(|h| h.started) {
            let values = if holding.is_debt {
                &mut snapshot.debts
            } else {
                &mut snapshot.assets
            };
            values.insert(holding.name.clone(), holding.value());
        }
        for flow in self.table.incomes().iter().filter(|f| f.started) {
            if let Some(value) = flow.value_at(today, cpi) {
                snapshot.incomes.insert(flow.name.clone(), value);
            }
        }
        for flow in self.table.expenses().iter().filter(|f| f.started) {
            if let Some(value) = flow.value_at(today, cpi) {
                snapshot.expenses.insert(flow.name.clone(), value);
            }
        }
        for setting in &self.model.settings {
            if setting.kind == SettingKind::View {
                continue;
            }
            if let Some(value) = self.table.setting(&setting.name) {
                snapshot.settings.insert(setting.name.clone(), value);
            }
        }
        snapshot
    }
}

fn overflow(item: &str) -> EngineError {
    EngineError::malformed(format!("{item} overflows"))
}

/// Project the model across the interval.
pub fn run(model: &Model, config: &RunConfig) -> Projection {
    let Compiled {
        table,
        growth,
        asset_cpi_immune,
        transfers,
        moments,
        warnings,
    } = compile(model, config.interval);

    let mut replay = Replay {
        model,
        table,
        tax: TaxEngine::new(model.tax_rules.clone()),
        ledger: Ledger::since(config.interval.start),
        warnings,
    };
    let twelfth = Decimal::ONE / Decimal::from(12);
    let mut today = None;
    let mut opened = false;

    for moment in moments {
        if !opened && moment.date >= config.interval.start {
            replay.open(config.interval.start);
            opened = true;
        }
        if today.is_none() && moment.date > config.today {
            today = Some(replay.snapshot(config.today));
        }
        let date = moment.date;
        match moment.action {
            Action::StartAsset(index) => {
                replay.table.asset_mut(index).started = true;
                let evaluation = replay.asset_evaluation(index, date);
                replay.ledger.push(evaluation);
            }
            Action::GrowAsset(index) => {
                let Some(rate) = &growth[index] else { continue };
                let cpi = cpi_rate(replay.table.settings());
                let annual = {
                    let settings = replay.table.settings();
                    annual_rate(rate, |name| settings.get(name).copied())
                };
                let mut annual = match annual {
                    Ok(annual) => annual,
                    Err(error) => {
                        let name = replay.table.asset(index).name.clone();
                        replay.skip(&name, date, error);
                        continue;
                    }
                };
                if !asset_cpi_immune[index] {
                    annual += cpi;
                }
                if annual.is_zero() {
                    continue;
                }
                let holding = replay.table.asset_mut(index);
                let grown = (Decimal::ONE + annual)
                    .checked_powd(twelfth)
                    .and_then(|factor| holding.unit_price.checked_mul(factor));
                match grown {
                    Some(price) => holding.unit_price = price,
                    None => {
                        let name = holding.name.clone();
                        replay.skip(&name, date, overflow(&name));
                        continue;
                    }
                }
                let evaluation = replay.asset_evaluation(index, date);
                replay.ledger.push(evaluation);
            }
            Action::PayIncome(index) => {
                let cpi = cpi_rate(replay.table.settings());
                let flow = replay.table.income_mut(index);
                let Some(amount) = flow.value_at(date, cpi) else {
                    let name = flow.name.clone();
                    replay.skip(&name, date, overflow(&name));
                    continue;
                };
                flow.started = true;
                flow.current = amount;
                let (name, liability) = (flow.name.clone(), flow.liability.clone());
                replay.ledger.push(Evaluation::currency(name.as_str(), date, amount));
                replay.move_cash(&name, date, amount);
                replay.tax.record_income(&liability, amount);
            }
            Action::PayExpense(index) => {
                let cpi = cpi_rate(replay.table.settings());
                let flow = replay.table.expense_mut(index);
                let Some(amount) = flow.value_at(date, cpi) else {
                    let name = flow.name.clone();
                    replay.skip(&name, date, overflow(&name));
                    continue;
                };
                flow.started = true;
                flow.current = amount;
                let (name, liability) = (flow.name.clone(), flow.liability.clone());
                replay.ledger.push(Evaluation::currency(name.as_str(), date, amount));
                replay.move_cash(&name, date, -amount);
                replay.tax.record_allowable_expense(&liability, amount);
            }
            Action::Transaction(index) => {
                let spec = &transfers[index];
                let mut ctx = Context {
                    table: &mut replay.table,
                    tax: &mut replay.tax,
                    date,
                };
                match transfer::apply(spec, &mut ctx) {
                    Ok(evaluations) => replay.ledger.extend(evaluations),
                    Err(error) => replay.skip(&spec.name, date, error),
                }
            }
            Action::SettleTax(year) => {
                for settlement in replay.tax.settle(year) {
                    for entry in settlement.entries {
                        replay
                            .ledger
                            .push(Evaluation::currency(entry.name, date, entry.value));
                    }
                    if settlement.total_liability > Decimal::ZERO {
                        let item = format!("{} tax {}", settlement.person, year);
                        replay.move_cash(&item, date, -settlement.total_liability);
                    }
                }
            }
        }
    }

    if !opened {
        replay.open(config.interval.start);
    }
    let today = today.unwrap_or_else(|| replay.snapshot(config.today));
    log::info!(
        "Projected {} evaluations with {} warnings",
        replay.ledger.len(),
        replay.warnings.len()
    );
    Projection {
        evaluations: replay.ledger.into_entries(),
        today,
        warnings: replay.warnings,
    }
}

//! Applying one transaction occurrence to the item-value table.
//!
//! FROM and TO are resolved to an ordered list of started assets before any
//! arithmetic runs. Every value change appends one evaluation, sources
//! before targets, and the table is only mutated once all amounts are
//! known.

use super::error::EngineError;
use super::ledger::Evaluation;
use super::model::{Transaction, TransactionKind, SEPARATOR};
use super::table::{ItemRef, ItemTable};
use super::value::{cpi_rate, parse_amount, ParsedValue};
use crate::tax::TaxEngine;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// A transaction with its amounts decoded.
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub name: String,
    pub kind: TransactionKind,
    pub from: Vec<String>,
    pub from_amount: AmountSpec,
    pub to: Vec<String>,
    pub to_amount: AmountSpec,
}

#[derive(Debug, Clone)]
pub struct AmountSpec {
    /// `None` when the field was empty
    pub value: Option<ParsedValue>,
    pub absolute: bool,
}

/// An amount resolved against the current settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    Absolute(Decimal),
    /// Fraction of the source value (FROM) or of the amount moved (TO)
    Proportion(Decimal),
    Units(Decimal),
}

impl AmountSpec {
    fn parse(raw: &str, absolute: bool) -> Result<Self, EngineError> {
        let value = if raw.trim().is_empty() {
            None
        } else {
            Some(parse_amount(raw)?)
        };
        Ok(AmountSpec { value, absolute })
    }

    /// An empty amount means the whole value.
    pub fn resolve(&self, settings: &BTreeMap<String, Decimal>) -> Result<Amount, EngineError> {
        match &self.value {
            None => Ok(Amount::Proportion(Decimal::ONE)),
            Some(ParsedValue::Percentage(fraction)) => Ok(Amount::Proportion(*fraction)),
            Some(ParsedValue::Units(count)) => Ok(Amount::Units(*count)),
            Some(value) => {
                let resolved = value.resolve(|name| settings.get(name).copied())?;
                Ok(if self.absolute {
                    Amount::Absolute(resolved)
                } else {
                    Amount::Proportion(resolved)
                })
            }
        }
    }
}

fn split_refs(field: &str) -> Vec<String> {
    field
        .split(SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl TransferSpec {
    pub fn compile(tx: &Transaction) -> Result<Self, EngineError> {
        Ok(TransferSpec {
            name: tx.name.clone(),
            kind: tx.kind,
            from: split_refs(&tx.from),
            from_amount: AmountSpec::parse(&tx.from_value, tx.from_absolute)?,
            to: split_refs(&tx.to),
            to_amount: AmountSpec::parse(&tx.to_value, tx.to_absolute)?,
        })
    }
}

/// Mutable state one occurrence works on.
pub struct Context<'a> {
    pub table: &'a mut ItemTable,
    pub tax: &'a mut TaxEngine,
    pub date: NaiveDate,
}

impl Context<'_> {
    fn evaluate_asset(&self, index: usize) -> Evaluation {
        let holding = self.table.asset(index);
        Evaluation::currency(holding.name.clone(), self.date, holding.value())
    }
}

#[derive(Debug, Clone, Copy)]
struct Draw {
    index: usize,
    value: Decimal,
    units: Option<Decimal>,
}

/// Apply one occurrence and return the evaluations it produced.
pub fn apply(spec: &TransferSpec, ctx: &mut Context<'_>) -> Result<Vec<Evaluation>, EngineError> {
    log::debug!("{} {:?} on {}", spec.name, spec.kind, ctx.date);
    match spec.kind {
        TransactionKind::Liquidate => liquidate(spec, ctx),
        TransactionKind::Revalue => revalue(spec, ctx),
        TransactionKind::PayOff => transfer(spec, ctx, true).map(|(evaluations, _)| evaluations),
        TransactionKind::Transfer | TransactionKind::BondInvest | TransactionKind::BondMature => {
            transfer(spec, ctx, false).map(|(evaluations, _)| evaluations)
        }
        TransactionKind::Pension | TransactionKind::PensionSalarySacrifice => {
            let (evaluations, received) = transfer(spec, ctx, false)?;
            let relieves_ni = spec.kind == TransactionKind::PensionSalarySacrifice;
            for (index, amount) in received {
                let tag = ctx.table.asset(index).liability.clone();
                ctx.tax.record_pension_relief(&tag, amount, relieves_ni);
            }
            Ok(evaluations)
        }
    }
}

/// Resolve FROM/TO names to started assets. Named assets that have not
/// started yet are skipped; a name that matches neither an asset nor a
/// category fails.
fn resolve_refs(table: &ItemTable, refs: &[String]) -> Result<Vec<usize>, EngineError> {
    let mut resolved = Vec::new();
    for name in refs {
        let matches = match table.find_asset(name) {
            Some(index) => vec![index],
            None => {
                let category = table.category(name);
                if category.is_empty() && table.asset_by_name(name).is_none() {
                    return Err(EngineError::unknown_item(name.as_str()));
                }
                category
            }
        };
        for index in matches {
            if !resolved.contains(&index) {
                resolved.push(index);
            }
        }
    }
    if resolved.is_empty() && !refs.is_empty() {
        return Err(EngineError::unknown_item(refs.join("/")));
    }
    Ok(resolved)
}

fn whole_units(value: Decimal, unit_price: Decimal) -> Decimal {
    if unit_price <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        (value / unit_price).floor().max(Decimal::ZERO)
    }
}

fn plan_draws(table: &ItemTable, sources: &[usize], amount: Amount) -> Vec<Draw> {
    let mut draws = Vec::new();
    let mut remaining = match amount {
        Amount::Absolute(total) => total,
        _ => Decimal::ZERO,
    };
    for &index in sources {
        let holding = table.asset(index);
        let wanted = match amount {
            Amount::Absolute(_) => remaining,
            Amount::Proportion(fraction) => (holding.value() * fraction).max(Decimal::ZERO),
            Amount::Units(count) => count * holding.unit_price,
        };
        let mut value = match holding.available() {
            Some(available) => wanted.min(available),
            None => wanted,
        };
        let units = if holding.has_quantity() {
            let units = whole_units(value, holding.unit_price);
            value = units * holding.unit_price;
            Some(units)
        } else {
            None
        };
        if value <= Decimal::ZERO {
            continue;
        }
        draws.push(Draw {
            index,
            value,
            units,
        });
        if let Amount::Absolute(_) = amount {
            remaining -= value;
            if remaining <= Decimal::ZERO {
                break;
            }
        }
    }
    draws
}

/// Take `excess` back out of the draws, last source first.
fn trim_draws(table: &ItemTable, draws: &mut Vec<Draw>, mut excess: Decimal) {
    for draw in draws.iter_mut().rev() {
        if excess <= Decimal::ZERO {
            break;
        }
        match draw.units.as_mut() {
            Some(units) => {
                let price = table.asset(draw.index).unit_price;
                let cut = whole_units(excess, price).min(*units);
                *units -= cut;
                draw.value = *units * price;
                excess -= cut * price;
            }
            None => {
                let cut = excess.min(draw.value);
                draw.value -= cut;
                excess -= cut;
            }
        }
    }
    if excess > Decimal::ZERO {
        log::debug!("{} left undrawn below one unit", excess);
    }
    draws.retain(|d| d.value > Decimal::ZERO);
}

/// Take a draw out of its source, recording any disposal for CGT.
fn take(ctx: &mut Context<'_>, draw: &Draw, evaluations: &mut Vec<Evaluation>) {
    let holding = ctx.table.asset_mut(draw.index);
    let (disposed, held) = match (draw.units, holding.quantity.as_mut()) {
        (Some(units), Some(quantity)) => {
            let held = *quantity;
            *quantity -= units;
            (units, held)
        }
        _ => {
            let held = holding.unit_price;
            holding.unit_price -= draw.value;
            (draw.value, held)
        }
    };
    let disposal = holding
        .basis
        .as_mut()
        .map(|basis| (basis.dispose(disposed, held, draw.value), basis.cost));
    let name = holding.name.clone();
    let liability = holding.liability.clone();
    evaluations.push(ctx.evaluate_asset(draw.index));

    if let Some((disposal, remaining)) = disposal {
        ctx.tax.record_gain(&liability, disposal.gain());
        evaluations.push(Evaluation::currency(
            format!("{name} (basis)"),
            ctx.date,
            remaining,
        ));
    }
}

fn give(ctx: &mut Context<'_>, index: usize, value: Decimal, evaluations: &mut Vec<Evaluation>) {
    ctx.table.asset_mut(index).adjust(value);
    evaluations.push(ctx.evaluate_asset(index));
}

/// Move money from sources to targets. Returns the evaluations and the
/// amount each target received.
fn transfer(
    spec: &TransferSpec,
    ctx: &mut Context<'_>,
    allow_overpay: bool,
) -> Result<(Vec<Evaluation>, Vec<(usize, Decimal)>), EngineError> {
    let sources = resolve_refs(ctx.table, &spec.from)?;
    let targets = resolve_refs(ctx.table, &spec.to)?;
    if sources.is_empty() && targets.is_empty() {
        return Err(EngineError::unknown_item(spec.name.as_str()));
    }
    let from = spec.from_amount.resolve(ctx.table.settings())?;
    let to = spec.to_amount.resolve(ctx.table.settings())?;

    let mut draws = Vec::new();
    let drawn = if spec.from.is_empty() {
        // external inflow sized by whichever side is absolute
        match (from, to) {
            (Amount::Absolute(value), _) | (_, Amount::Absolute(value)) => value,
            _ => return Err(EngineError::malformed(spec.from_amount_text())),
        }
    } else {
        draws = plan_draws(ctx.table, &sources, from);
        draws.iter().map(|d| d.value).sum()
    };

    let planned = match to {
        Amount::Proportion(fraction) => drawn * fraction,
        Amount::Absolute(value) => match from {
            Amount::Absolute(cap) if cap > Decimal::ZERO => value * drawn / cap,
            _ if drawn > Decimal::ZERO => value,
            _ => Decimal::ZERO,
        },
        Amount::Units(count) => targets
            .first()
            .map(|&t| count * ctx.table.asset(t).unit_price)
            .unwrap_or_default(),
    };

    let mut received = Vec::new();
    if !targets.is_empty() {
        let share = planned / Decimal::from(targets.len());
        let mut accepted_total = Decimal::ZERO;
        for &index in &targets {
            let holding = ctx.table.asset(index);
            let mut accepted = share;
            if holding.is_debt && !allow_overpay {
                accepted = accepted.min((-holding.value()).max(Decimal::ZERO));
            }
            if holding.has_quantity() {
                accepted = whole_units(accepted, holding.unit_price) * holding.unit_price;
            }
            accepted_total += accepted;
            received.push((index, accepted));
        }

        let shortfall = planned - accepted_total;
        if shortfall > Decimal::ZERO && planned > Decimal::ZERO && !draws.is_empty() {
            let excess = shortfall * drawn / planned;
            trim_draws(ctx.table, &mut draws, excess);
        }
    }

    let mut evaluations = Vec::new();
    for draw in &draws {
        take(ctx, draw, &mut evaluations);
    }
    received.retain(|(_, amount)| *amount > Decimal::ZERO);
    for &(index, amount) in &received {
        give(ctx, index, amount, &mut evaluations);
    }
    Ok((evaluations, received))
}

/// Sell from ranked sources while the target is in deficit.
fn liquidate(spec: &TransferSpec, ctx: &mut Context<'_>) -> Result<Vec<Evaluation>, EngineError> {
    let target = match resolve_refs(ctx.table, &spec.to)?.first() {
        Some(&index) => index,
        None => return Err(EngineError::unknown_item(spec.name.as_str())),
    };
    let sources = resolve_refs(ctx.table, &spec.from)?;
    if sources.is_empty() {
        return Err(EngineError::unknown_item(spec.name.as_str()));
    }

    let mut deficit = -ctx.table.asset(target).value();
    if deficit <= Decimal::ZERO {
        return Ok(Vec::new());
    }
    let from = spec.from_amount.resolve(ctx.table.settings())?;
    let to = spec.to_amount.resolve(ctx.table.settings())?;
    let rate = match to {
        Amount::Proportion(fraction) => fraction,
        _ => Decimal::ONE,
    };

    let mut evaluations = Vec::new();
    for index in sources.into_iter().filter(|&i| i != target) {
        if deficit <= Decimal::ZERO {
            break;
        }
        let holding = ctx.table.asset(index);
        let value = holding.value();
        let available = holding
            .available()
            .unwrap_or_else(|| value.max(Decimal::ZERO));
        let price = holding.unit_price;

        let (value, units) = match from {
            Amount::Absolute(cap) => {
                let value = cap.min(available);
                if holding.has_quantity() {
                    let units = whole_units(value, price);
                    (units * price, Some(units))
                } else {
                    (value, None)
                }
            }
            Amount::Units(count) => {
                let value = (count * price).min(available);
                if holding.has_quantity() {
                    let units = whole_units(value, price);
                    (units * price, Some(units))
                } else {
                    (value, None)
                }
            }
            Amount::Proportion(fraction) => {
                let limit = (value * fraction).min(available).max(Decimal::ZERO);
                let needed = if rate > Decimal::ZERO {
                    deficit / rate
                } else {
                    limit
                };
                if holding.has_quantity() {
                    let most = whole_units(limit, price);
                    let units = if price > Decimal::ZERO {
                        (needed / price).ceil().min(most)
                    } else {
                        Decimal::ZERO
                    };
                    (units * price, Some(units))
                } else {
                    (needed.min(limit), None)
                }
            }
        };
        if value <= Decimal::ZERO {
            continue;
        }

        let proceeds = match (to, from) {
            (Amount::Proportion(fraction), _) => value * fraction,
            (Amount::Absolute(to_value), Amount::Absolute(cap)) if cap > Decimal::ZERO => {
                to_value * value / cap
            }
            _ => value,
        };
        take(
            ctx,
            &Draw {
                index,
                value,
                units,
            },
            &mut evaluations,
        );
        give(ctx, target, proceeds, &mut evaluations);
        deficit -= proceeds;
    }
    if deficit > Decimal::ZERO {
        log::debug!("{} left {} uncleared", spec.name, deficit);
    }
    Ok(evaluations)
}

/// Set or scale items without moving money.
fn revalue(spec: &TransferSpec, ctx: &mut Context<'_>) -> Result<Vec<Evaluation>, EngineError> {
    if spec.to.is_empty() {
        return Err(EngineError::unknown_item(spec.name.as_str()));
    }
    if spec.to_amount.value.is_none() {
        return Err(EngineError::malformed(""));
    }
    let amount = spec.to_amount.resolve(ctx.table.settings())?;

    let mut items: Vec<(String, ItemRef)> = Vec::new();
    for name in &spec.to {
        match ctx.table.find_item(name) {
            Some(item) => items.push((name.clone(), item)),
            None => {
                let category = ctx.table.category(name);
                if category.is_empty() {
                    return Err(EngineError::unknown_item(name.as_str()));
                }
                items.extend(
                    category
                        .into_iter()
                        .map(|i| (ctx.table.asset(i).name.clone(), ItemRef::Asset(i))),
                );
            }
        }
    }

    let cpi = cpi_rate(ctx.table.settings());
    let mut evaluations = Vec::new();
    for (name, item) in items {
        match item {
            ItemRef::Asset(index) => {
                let holding = ctx.table.asset_mut(index);
                match amount {
                    Amount::Absolute(value) => {
                        let value = if holding.is_debt { -value } else { value };
                        holding.unit_price = value;
                    }
                    Amount::Proportion(fraction) => holding.unit_price *= fraction,
                    Amount::Units(count) => match holding.quantity.as_mut() {
                        Some(quantity) => *quantity = count,
                        None => return Err(EngineError::malformed(spec.to_amount_text())),
                    },
                }
                if !matches!(amount, Amount::Units(_)) {
                    holding.price_setting = None;
                }
                evaluations.push(ctx.evaluate_asset(index));
            }
            ItemRef::Income(index) | ItemRef::Expense(index) => {
                let date = ctx.date;
                let flow = match item {
                    ItemRef::Income(_) => ctx.table.income_mut(index),
                    _ => ctx.table.expense_mut(index),
                };
                let base = match amount {
                    Amount::Absolute(value) => value,
                    Amount::Proportion(fraction) => flow
                        .value_at(date, cpi)
                        .and_then(|value| value.checked_mul(fraction))
                        .ok_or_else(|| EngineError::malformed(spec.to_amount_text()))?,
                    Amount::Units(_) => return Err(EngineError::malformed(spec.to_amount_text())),
                };
                flow.base = base;
                flow.value_set = date;
                evaluations.push(Evaluation::currency(name, date, base));
            }
            ItemRef::Setting => {
                let current = ctx.table.setting(&name).unwrap_or_default();
                let value = match amount {
                    Amount::Absolute(value) => value,
                    Amount::Proportion(fraction) => current * fraction,
                    Amount::Units(_) => return Err(EngineError::malformed(spec.to_amount_text())),
                };
                ctx.table.set_setting(&name, value);
                evaluations.push(Evaluation::setting(&name, ctx.date, value));
                for index in ctx.table.priced_from(&name) {
                    let holding = ctx.table.asset_mut(index);
                    if let Some((_, multiplier)) = &holding.price_setting {
                        holding.unit_price = value * *multiplier;
                    }
                    if holding.started {
                        evaluations.push(ctx.evaluate_asset(index));
                    }
                }
            }
        }
    }
    Ok(evaluations)
}

impl TransferSpec {
    fn from_amount_text(&self) -> String {
        self.from_amount
            .value
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    fn to_amount_text(&self) -> String {
        self.to_amount
            .value
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    /// True when every TO name is one of `settings`.
    pub fn revalues_settings_only<'a, I>(&self, settings: I) -> bool
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.kind == TransactionKind::Revalue
            && !self.to.is_empty()
            && self
                .to
                .iter()
                .all(|name| settings.clone().into_iter().any(|s| s == name))
    }
}

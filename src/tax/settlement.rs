use super::liability::{parse_liabilities, persons_for, Regime};
use super::uk::{TaxRules, TaxYear};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Lifecycle of one person's tax account within a tax year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SettlementPhase {
    /// Income, relief and gains are being recorded
    #[default]
    Accumulating,
    /// Bands are being applied
    Settling,
    /// Entries for the year have been posted; the next record reopens
    Posted,
}

/// One person's income, relief and gains for the current tax year.
#[derive(Debug, Clone, Default)]
pub struct PersonTaxes {
    phase: SettlementPhase,
    income_tax_only: Decimal,
    ni_only: Decimal,
    both: Decimal,
    income_tax_relief: Decimal,
    ni_relief: Decimal,
    gains: Decimal,
    has_income_tax: bool,
    has_ni: bool,
    has_gains: bool,
}

impl PersonTaxes {
    pub fn phase(&self) -> SettlementPhase {
        self.phase
    }

    fn is_active(&self) -> bool {
        self.has_income_tax || self.has_ni || self.has_gains
    }

    fn accumulate(&mut self) -> &mut Self {
        if self.phase == SettlementPhase::Posted {
            self.reopen();
        }
        self
    }

    fn reopen(&mut self) {
        *self = PersonTaxes::default();
    }

    fn begin_settlement(&mut self) -> bool {
        match self.phase {
            SettlementPhase::Accumulating => {
                self.phase = SettlementPhase::Settling;
                true
            }
            SettlementPhase::Settling | SettlementPhase::Posted => false,
        }
    }

    fn post(&mut self) {
        if self.phase == SettlementPhase::Settling {
            self.phase = SettlementPhase::Posted;
        }
    }
}

/// A synthetic ledger line produced at settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEntry {
    pub name: String,
    pub value: Decimal,
}

impl SettlementEntry {
    fn new(name: String, value: Decimal) -> Self {
        SettlementEntry { name, value }
    }
}

/// Everything one person owes for a year
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonSettlement {
    pub person: String,
    pub year: TaxYear,
    pub entries: Vec<SettlementEntry>,
    pub total_liability: Decimal,
}

/// Per-run tax accounts for every liable person.
#[derive(Debug, Clone, Default)]
pub struct TaxEngine {
    rules: TaxRules,
    people: BTreeMap<String, PersonTaxes>,
    last_settled: Option<TaxYear>,
}

impl TaxEngine {
    pub fn new(rules: TaxRules) -> Self {
        TaxEngine {
            rules,
            people: BTreeMap::new(),
            last_settled: None,
        }
    }

    pub fn person(&self, name: &str) -> Option<&PersonTaxes> {
        self.people.get(name)
    }

    fn account(&mut self, person: &str) -> &mut PersonTaxes {
        self.people
            .entry(person.to_string())
            .or_default()
            .accumulate()
    }

    /// Record an income payment against every person named in its tag.
    pub fn record_income(&mut self, tag: &str, amount: Decimal) {
        let mut regimes: BTreeMap<String, (bool, bool)> = BTreeMap::new();
        for liability in parse_liabilities(tag) {
            let flags = regimes.entry(liability.person).or_default();
            match liability.regime {
                Regime::IncomeTax => flags.0 = true,
                Regime::NationalInsurance => flags.1 = true,
                Regime::CapitalGains => {}
            }
        }
        for (person, (income_tax, ni)) in regimes {
            let account = self.account(&person);
            match (income_tax, ni) {
                (true, true) => account.both += amount,
                (true, false) => account.income_tax_only += amount,
                (false, true) => account.ni_only += amount,
                (false, false) => continue,
            }
            account.has_income_tax |= income_tax;
            account.has_ni |= ni;
            log::debug!("Tax {} income +{} (IT={}, NI={})", person, amount, income_tax, ni);
        }
    }

    /// Expenses tagged `incomeTax` reduce the income-tax base.
    pub fn record_allowable_expense(&mut self, tag: &str, amount: Decimal) {
        for person in persons_for(tag, Regime::IncomeTax) {
            self.account(&person).income_tax_relief += amount;
        }
    }

    /// Pension contributions relieve income tax and, for salary sacrifice, NI.
    pub fn record_pension_relief(&mut self, tag: &str, amount: Decimal, relieves_ni: bool) {
        for person in persons_for(tag, Regime::IncomeTax) {
            let account = self.account(&person);
            account.income_tax_relief += amount;
            if relieves_ni {
                account.ni_relief += amount;
            }
            log::debug!("Tax {} pension relief {} (NI={})", person, amount, relieves_ni);
        }
    }

    /// Record a realised gain (or loss) on an asset with a CGT liability.
    pub fn record_gain(&mut self, tag: &str, gain: Decimal) {
        for person in persons_for(tag, Regime::CapitalGains) {
            let account = self.account(&person);
            account.gains += gain;
            account.has_gains = true;
        }
    }

    /// Settle every person with activity in `year`, in name order. A year is
    /// settled at most once.
    pub fn settle(&mut self, year: TaxYear) -> Vec<PersonSettlement> {
        if self.last_settled.is_some_and(|settled| settled >= year) {
            log::debug!("Tax year {} already settled", year);
            return Vec::new();
        }
        self.last_settled = Some(year);

        let rules = self.rules.clone();
        let mut settlements = Vec::new();
        for (person, account) in self.people.iter_mut() {
            if account.phase == SettlementPhase::Posted {
                account.reopen();
            }
            if !account.is_active() || !account.begin_settlement() {
                continue;
            }
            let settlement = settle_person(&rules, person, year, account);
            account.post();
            log::debug!(
                "Tax {} settled {}: liability={}",
                person,
                year,
                settlement.total_liability
            );
            settlements.push(settlement);
        }
        settlements
    }
}

fn settle_person(
    rules: &TaxRules,
    person: &str,
    year: TaxYear,
    account: &PersonTaxes,
) -> PersonSettlement {
    let mut entries = Vec::new();
    let mut total = Decimal::ZERO;

    let ni_income = account.ni_only + account.both;
    let mut both_net = account.both;
    if account.has_ni {
        let base = (ni_income - account.ni_relief).max(Decimal::ZERO);
        let ni = rules.national_insurance(base).max(Decimal::ZERO);
        entries.push(SettlementEntry::new(format!("{person} income (NI)"), ni));
        entries.push(SettlementEntry::new(
            format!("{person} income (net of NI)"),
            ni_income - ni,
        ));
        if ni_income > Decimal::ZERO {
            both_net = account.both - ni * account.both / ni_income;
        }
        total += ni;
    }

    if account.has_income_tax {
        let gross = account.income_tax_only + both_net;
        let base = (gross - account.income_tax_relief).max(Decimal::ZERO);
        let tax = rules.income_tax(base).max(Decimal::ZERO);
        entries.push(SettlementEntry::new(
            format!("{person} income (incomeTax)"),
            tax,
        ));
        entries.push(SettlementEntry::new(
            format!("{person} income (net)"),
            (gross - tax).round_dp(2),
        ));
        total += tax;
    }

    if account.has_gains {
        let cgt = rules.capital_gains_tax(account.gains);
        entries.push(SettlementEntry::new(format!("{person} gain (CGT)"), cgt));
        entries.push(SettlementEntry::new(
            format!("{person} gain (net)"),
            account.gains - cgt,
        ));
        total += cgt;
    }

    PersonSettlement {
        person: person.to_string(),
        year,
        entries,
        total_liability: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn value_of(settlement: &PersonSettlement, name: &str) -> Decimal {
        settlement
            .entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value)
            .unwrap()
    }

    #[test]
    fn income_tax_on_single_large_payment() {
        let mut engine = TaxEngine::new(TaxRules::default());
        engine.record_income("Joe(incomeTax)", dec!(150100));
        let settled = engine.settle(TaxYear(2020));
        assert_eq!(settled.len(), 1);
        let joe = &settled[0];
        assert_eq!(value_of(joe, "Joe income (incomeTax)"), dec!(50045.00));
        assert_eq!(value_of(joe, "Joe income (net)"), dec!(100055));
        assert_eq!(joe.total_liability, dec!(50045));
        assert_eq!(engine.person("Joe").unwrap().phase(), SettlementPhase::Posted);
    }

    #[test]
    fn ni_settles_before_income_tax() {
        let mut engine = TaxEngine::new(TaxRules::default());
        engine.record_income("Joe(incomeTax)/Joe(NI)", dec!(60000));
        let joe = engine.settle(TaxYear(2020)).remove(0);
        let names: Vec<_> = joe.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Joe income (NI)",
                "Joe income (net of NI)",
                "Joe income (incomeTax)",
                "Joe income (net)"
            ]
        );
        let ni = value_of(&joe, "Joe income (NI)");
        assert_eq!(ni, dec!(5164.16));
        let net_of_ni = value_of(&joe, "Joe income (net of NI)");
        assert_eq!(net_of_ni, dec!(54835.84));
        // income tax is computed on the NI net
        assert_eq!(
            value_of(&joe, "Joe income (incomeTax)"),
            TaxRules::default().income_tax(net_of_ni)
        );
    }

    #[test]
    fn persons_settle_independently_in_name_order() {
        let mut engine = TaxEngine::new(TaxRules::default());
        engine.record_income("Zoe(incomeTax)", dec!(20000));
        engine.record_income("Adam(incomeTax)", dec!(10000));
        let settled = engine.settle(TaxYear(2020));
        let persons: Vec<_> = settled.iter().map(|s| s.person.as_str()).collect();
        assert_eq!(persons, vec!["Adam", "Zoe"]);
        assert_eq!(settled[0].total_liability, dec!(0));
        assert_eq!(settled[1].total_liability, dec!(1500));
    }

    #[test]
    fn relief_reduces_base_and_floors_at_zero() {
        let mut engine = TaxEngine::new(TaxRules::default());
        engine.record_income("Joe(incomeTax)", dec!(22500));
        engine.record_pension_relief("Joe(incomeTax)", dec!(5000), false);
        engine.record_allowable_expense("Joe(incomeTax)", dec!(1000));
        let joe = engine.settle(TaxYear(2020)).remove(0);
        // (22,500 - 6,000 - 12,500) at 20%
        assert_eq!(value_of(&joe, "Joe income (incomeTax)"), dec!(800));

        let mut engine = TaxEngine::new(TaxRules::default());
        engine.record_income("Joe(incomeTax)", dec!(1000));
        engine.record_pension_relief("Joe(incomeTax)", dec!(5000), true);
        let joe = engine.settle(TaxYear(2020)).remove(0);
        assert_eq!(value_of(&joe, "Joe income (incomeTax)"), dec!(0));
    }

    #[test]
    fn gains_settle_after_allowance_and_do_not_carry() {
        let mut engine = TaxEngine::new(TaxRules::default());
        engine.record_gain("Joe(CGT)", dec!(16666.67));
        let joe = engine.settle(TaxYear(2020)).remove(0);
        assert_eq!(value_of(&joe, "Joe gain (CGT)"), dec!(933.33));
        assert_eq!(value_of(&joe, "Joe gain (net)"), dec!(15733.34));

        engine.record_gain("Joe(CGT)", dec!(5000));
        let joe = engine.settle(TaxYear(2021)).remove(0);
        assert_eq!(value_of(&joe, "Joe gain (CGT)"), dec!(0));
    }

    #[test]
    fn a_year_settles_once() {
        let mut engine = TaxEngine::new(TaxRules::default());
        engine.record_income("Joe(incomeTax)", dec!(50000));
        assert_eq!(engine.settle(TaxYear(2020)).len(), 1);
        assert!(engine.settle(TaxYear(2020)).is_empty());
        // nothing recorded in the following year
        assert!(engine.settle(TaxYear(2021)).is_empty());
    }
}

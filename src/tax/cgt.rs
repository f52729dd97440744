use rust_decimal::Decimal;

/// Remaining purchase cost of a CGT-liable asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostBasis {
    pub asset: String,
    pub cost: Decimal,
}

/// Result of a disposal against a cost basis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposal {
    pub proceeds: Decimal,
    pub allowable_cost: Decimal,
}

impl Disposal {
    /// Losses are negative and offset gains within the same year.
    pub fn gain(&self) -> Decimal {
        self.proceeds - self.allowable_cost
    }
}

impl CostBasis {
    pub fn new(asset: impl Into<String>, cost: Decimal) -> Self {
        CostBasis {
            asset: asset.into(),
            cost,
        }
    }

    /// Dispose of `disposed` out of `held`, measured in the same unit (value
    /// or whole units). The allowable cost is apportioned pro-rata.
    pub fn dispose(&mut self, disposed: Decimal, held: Decimal, proceeds: Decimal) -> Disposal {
        let allowable_cost = if held <= Decimal::ZERO || disposed >= held {
            let cost = self.cost;
            self.cost = Decimal::ZERO;
            log::debug!(
                "Basis {} DISPOSE ALL: disposed={}, cost={}",
                self.asset,
                disposed,
                cost
            );
            cost
        } else {
            let proportion = disposed / held;
            let cost = (self.cost * proportion).round_dp(2);
            self.cost -= cost;
            log::debug!(
                "Basis {} DISPOSE: disposed={}, cost={}. Remaining cost={}",
                self.asset,
                disposed,
                cost,
                self.cost
            );
            cost
        };
        Disposal {
            proceeds,
            allowable_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn partial_disposal_apportions_cost() {
        let mut basis = CostBasis::new("Shares", dec!(50000));
        let disposal = basis.dispose(dec!(20000), dec!(300000), dec!(20000));
        assert_eq!(disposal.allowable_cost, dec!(3333.33));
        assert_eq!(disposal.gain(), dec!(16666.67));
        assert_eq!(basis.cost, dec!(46666.67));
    }

    #[test]
    fn full_disposal_consumes_basis() {
        let mut basis = CostBasis::new("Shares", dec!(1000));
        let disposal = basis.dispose(dec!(10), dec!(10), dec!(800));
        assert_eq!(disposal.allowable_cost, dec!(1000));
        assert_eq!(disposal.gain(), dec!(-200));
        assert_eq!(basis.cost, dec!(0));
    }

    #[test]
    fn disposal_from_empty_holding_takes_remaining_cost() {
        let mut basis = CostBasis::new("Shares", dec!(100));
        let disposal = basis.dispose(dec!(5), dec!(0), dec!(5));
        assert_eq!(disposal.allowable_cost, dec!(100));
        assert_eq!(basis.cost, dec!(0));
    }
}

use rust_decimal::Decimal;

/// One step of a progressive schedule: `rate` applies to income above
/// `threshold` up to the next band's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub threshold: Decimal,
    pub rate: Decimal,
}

impl Band {
    pub fn new(threshold: Decimal, rate: Decimal) -> Self {
        Band { threshold, rate }
    }
}

/// Tax due on `income` across ascending bands. The last band is unbounded.
pub fn banded_tax(income: Decimal, bands: &[Band]) -> Decimal {
    let mut tax = Decimal::ZERO;
    for (i, band) in bands.iter().enumerate() {
        if income <= band.threshold {
            break;
        }
        let upper = bands
            .get(i + 1)
            .map(|next| next.threshold.min(income))
            .unwrap_or(income);
        let taxable = (upper - band.threshold).max(Decimal::ZERO);
        tax += taxable * band.rate;
    }
    tax
}

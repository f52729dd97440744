pub mod bands;
pub mod cgt;
pub mod liability;
pub mod settlement;
pub mod uk;

pub use bands::{banded_tax, Band};
pub use cgt::{CostBasis, Disposal};
pub use liability::{parse_liabilities, persons_for, Liability, Regime};
pub use settlement::{PersonSettlement, PersonTaxes, SettlementEntry, SettlementPhase, TaxEngine};
pub use uk::{TaxRules, TaxYear};

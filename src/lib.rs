//! Personal finance projection with UK annual tax settlement.
//!
//! [`core::run`] replays a [`core::Model`] across a reporting interval and
//! returns the ledger of value changes together with an "as of today"
//! snapshot. Income tax, national insurance and capital gains tax are
//! settled per person at every tax-year end by the [`tax`] module.

pub mod core;
pub mod tax;

//! # Fee Configuration & Split
//!
//! Every value-moving instruction takes two cuts out of the gross amount:
//! one for the ledger's own treasury account, one for the relay that
//! submitted it. Percentages are 18-decimal fixed point: `1e18` is 100% and
//! `1e15` is 0.1%. The scale does not follow `decimals`, which only describes
//! the settlement asset.
//!
//! ```text
//! cashier_fee = floor(amount * cashier_percentage / 1e18)
//! engine_fee  = floor(amount * engine_percentage  / 1e18)
//! net         = amount - cashier_fee - engine_fee
//! ```
//!
//! Truncation always favours the payer. Percentages are not clamped here;
//! if governance configures cuts above 100% the split fails with
//! `FeesExceedAmount` instead of underflowing.

use cashier_protocol::config::{
    DEFAULT_ASSET_DECIMALS, DEFAULT_LEADING_ZERO_BYTES, FIXED_POINT_SCALE,
};
use cashier_protocol::types::Amount;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Asset decimals above this cannot be represented as a `u128` power of ten.
pub const MAX_DECIMALS: u8 = 38;

/// Governance-controlled economic parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfiguration {
    /// Treasury cut, as a fraction of `1e18`.
    pub cashier_percentage: u128,
    /// Relay cut, as a fraction of `1e18`.
    pub engine_percentage: u128,
    /// Decimal places of the settlement asset. Not used by the split.
    pub decimals: u8,
    /// Proof-of-work difficulty for relays, in leading zero bytes.
    pub leading_zero_bytes: u8,
}

impl Default for FeeConfiguration {
    fn default() -> Self {
        Self {
            cashier_percentage: 0,
            engine_percentage: 0,
            decimals: DEFAULT_ASSET_DECIMALS,
            leading_zero_bytes: DEFAULT_LEADING_ZERO_BYTES,
        }
    }
}

/// How one gross amount was divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: Amount,
    pub cashier_fee: Amount,
    pub engine_fee: Amount,
    pub net: Amount,
}

impl FeeSplit {
    pub fn total_fees(&self) -> Amount {
        self.cashier_fee + self.engine_fee
    }
}

impl FeeConfiguration {
    /// Split `amount` into treasury cut, relay cut and the remainder.
    pub fn split(&self, amount: Amount) -> LedgerResult<FeeSplit> {
        let cashier_fee = fee_for(amount, self.cashier_percentage, FIXED_POINT_SCALE)?;
        let engine_fee = fee_for(amount, self.engine_percentage, FIXED_POINT_SCALE)?;
        let fees = cashier_fee
            .checked_add(engine_fee)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let net = amount
            .checked_sub(fees)
            .ok_or(LedgerError::FeesExceedAmount { amount, fees })?;

        Ok(FeeSplit {
            gross: amount,
            cashier_fee,
            engine_fee,
            net,
        })
    }
}

/// `floor(amount * percentage / scale)` without computing the full product.
///
/// Splitting `amount = q * scale + r` gives
/// `q * percentage + floor(r * percentage / scale)`, which is exact and only
/// overflows when the *result* (or a misconfigured percentage) is enormous.
pub fn fee_for(amount: Amount, percentage: u128, scale: u128) -> LedgerResult<Amount> {
    if scale == 0 {
        return Err(LedgerError::InvalidConfiguration("zero fixed-point scale"));
    }
    let whole = (amount / scale)
        .checked_mul(percentage)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    let partial = (amount % scale)
        .checked_mul(percentage)
        .ok_or(LedgerError::ArithmeticOverflow)?
        / scale;
    whole
        .checked_add(partial)
        .ok_or(LedgerError::ArithmeticOverflow)
}

//! Option Model - Off-chain mirror of the options AMM settlement arithmetic
//!
//! This crate reproduces, bit for bit, the integer arithmetic the options AMM
//! contract applies when it prices lots and settles positions. Callers use it
//! to preview payouts and purchase costs before submitting a transaction.
//!
//! Every quantity is a 256-bit unsigned integer paired with its decimal scale.
//! Nothing here touches the network: terms and snapshots are passed in.

#![no_std]
#![forbid(unsafe_code)]

use core::fmt;

pub mod amount;
pub mod math;
pub mod terms;
pub mod validator;

pub use amount::{normalize, parse_units, pow10, validate_scale, ScaledAmount};
pub use math::{
    compute_payout, compute_payout_with, payout_breakdown, price_difference, PayoutBreakdown,
    PayoutResult,
};
pub use primitive_types::U256;
pub use terms::{
    is_expired, is_in_the_money, validate_new_series, Identity, MarketSnapshot, OptionKind,
    OptionTerms, Position, SeriesParams, SeriesRejection,
};
pub use validator::{
    approval_amount, check_balance, check_freshness, check_sufficiency, compute_current_cost,
    compute_current_cost_with, current_premium, pool_share_bps, StaleInput, Sufficiency,
};

/// Stablecoin (USDC) decimals; payouts and costs are denominated here
pub const STABLE_DECIMALS: u32 = 6;

/// Underlying asset notional decimals (strike, lot counts, lot size)
pub const ASSET_DECIMALS: u32 = 18;

/// Decimals of the raw ETH/USD price returned by the feed
pub const FEED_DECIMALS: u32 = 3;

/// Largest scale whose power of ten still fits in 256 bits
pub const MAX_SCALE: u32 = 77;

/// Basis points scale (10,000 bps = 100%)
pub const BPS_SCALE: u64 = 10_000;

/// Which payout formula to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayoutFormula {
    /// What the deployed contract computes: `diff * lots / 10^12`
    #[default]
    Contract,
    /// Both prices and the lot count brought to stablecoin decimals first.
    /// Diagnostic only; the ledger never pays this amount.
    Corrected,
}

/// Scale constants used by the external ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conventions {
    pub stable_decimals: u32,
    pub asset_decimals: u32,
    pub feed_decimals: u32,
    /// Common basis for price comparison
    pub canonical_scale: u32,
    /// `payout = diff * lots / 10^payout_divisor_exp`
    pub payout_divisor_exp: u32,
    /// `cost = premium * lots / 10^cost_divisor_exp`
    pub cost_divisor_exp: u32,
    pub payout_formula: PayoutFormula,
}

impl Conventions {
    /// The constants the deployed contract applies.
    pub const CONTRACT: Conventions = Conventions {
        stable_decimals: STABLE_DECIMALS,
        asset_decimals: ASSET_DECIMALS,
        feed_decimals: FEED_DECIMALS,
        canonical_scale: ASSET_DECIMALS,
        payout_divisor_exp: 12,
        cost_divisor_exp: 30,
        payout_formula: PayoutFormula::Contract,
    };

    /// Wrap a raw feed price in its scale.
    pub fn spot_from_feed(&self, raw: U256) -> ScaledAmount {
        ScaledAmount::new(raw, self.feed_decimals)
    }
}

impl Default for Conventions {
    fn default() -> Self {
        Self::CONTRACT
    }
}

/// Error types for model operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelError {
    /// Scale is negative or its power of ten exceeds 256 bits
    InvalidScale,
    /// Arithmetic overflow
    Overflow,
    /// Decimal text could not be parsed at the requested scale
    InvalidAmount,
    /// Address is not 20 hex-encoded bytes
    InvalidIdentity,
    /// New option series parameters rejected
    InvalidSeries(SeriesRejection),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidScale => write!(f, "invalid decimal scale"),
            ModelError::Overflow => write!(f, "arithmetic overflow"),
            ModelError::InvalidAmount => write!(f, "invalid decimal amount"),
            ModelError::InvalidIdentity => write!(f, "invalid address"),
            ModelError::InvalidSeries(reason) => write!(f, "invalid option series: {}", reason),
        }
    }
}

impl core::error::Error for ModelError {}

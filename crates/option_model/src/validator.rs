//! Purchase cost and liquidity checks

use primitive_types::U256;

use crate::amount::{pow10, ScaledAmount};
use crate::terms::{MarketSnapshot, OptionTerms};
use crate::{Conventions, ModelError, BPS_SCALE};

/// Whether an available amount covers a required one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sufficiency {
    pub sufficient: bool,
    /// `max(0, required - available)`, zero when sufficient
    pub shortfall: ScaledAmount,
}

/// Advisory: a snapshot is older than the configured maximum age
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleInput {
    pub age_secs: u64,
    pub max_age_secs: u64,
}

/// Compare at the larger of the two scales so neither side is truncated.
fn check_cover(required: ScaledAmount, available: ScaledAmount) -> Result<Sufficiency, ModelError> {
    let scale = required.scale.max(available.scale);
    let required = required.normalize(scale)?;
    let available = available.normalize(scale)?;

    Ok(Sufficiency {
        sufficient: available.raw >= required.raw,
        shortfall: ScaledAmount::new(required.raw.saturating_sub(available.raw), scale),
    })
}

/// Can the pool pay `payout`?
///
/// Advisory only. Settlement is still attempted when this reports a
/// shortfall; it lets the caller explain the revert before it happens.
pub fn check_sufficiency(
    payout: ScaledAmount,
    pool: &MarketSnapshot,
) -> Result<Sufficiency, ModelError> {
    check_cover(payout, pool.total_liquidity)
}

/// Does `balance` cover `cost`?
pub fn check_balance(balance: ScaledAmount, cost: ScaledAmount) -> Result<Sufficiency, ModelError> {
    check_cover(cost, balance)
}

/// Current per-lot premium: `k / lot_size`, truncating.
///
/// A depleted series (`lot_size == 0`) has no premium and yields zero; callers
/// must show that as unavailable rather than free.
pub fn current_premium(terms: &OptionTerms) -> U256 {
    if terms.lot_size.raw.is_zero() {
        return U256::zero();
    }
    terms.k_constant.raw / terms.lot_size.raw
}

/// Cost of buying `lots_to_buy` at the current premium.
pub fn compute_current_cost(
    terms: &OptionTerms,
    lots_to_buy: ScaledAmount,
) -> Result<ScaledAmount, ModelError> {
    compute_current_cost_with(&Conventions::CONTRACT, terms, lots_to_buy)
}

/// Cost under explicit conventions.
///
/// `cost = (k / lot_size) * lots / 10^30` with lots at asset decimals, the
/// divisor the ledger applies; the result is in stablecoin units. Recompute
/// from freshly read terms before every purchase: `lot_size` moves with each
/// fill.
pub fn compute_current_cost_with(
    conv: &Conventions,
    terms: &OptionTerms,
    lots_to_buy: ScaledAmount,
) -> Result<ScaledAmount, ModelError> {
    let premium = current_premium(terms);
    let lots = lots_to_buy.normalize(conv.asset_decimals)?;

    let raw = premium
        .checked_mul(lots.raw)
        .ok_or(ModelError::Overflow)?
        / pow10(conv.cost_divisor_exp)?;

    Ok(ScaledAmount::new(raw, conv.stable_decimals))
}

/// Allowance to request for a purchase: cost plus a 50% buffer.
pub fn approval_amount(cost: ScaledAmount) -> Result<ScaledAmount, ModelError> {
    let buffer = cost.raw.checked_mul(U256::from(50u8)).ok_or(ModelError::Overflow)? / 100u8;
    let raw = cost.raw.checked_add(buffer).ok_or(ModelError::Overflow)?;
    Ok(ScaledAmount::new(raw, cost.scale))
}

/// Holder's share of the pool in basis points; zero for an empty pool.
pub fn pool_share_bps(contribution: ScaledAmount, total: ScaledAmount) -> Result<u64, ModelError> {
    let scale = contribution.scale.max(total.scale);
    let contribution = contribution.normalize(scale)?;
    let total = total.normalize(scale)?;

    if total.raw.is_zero() {
        return Ok(0);
    }

    let bps = contribution
        .raw
        .checked_mul(U256::from(BPS_SCALE))
        .ok_or(ModelError::Overflow)?
        / total.raw;
    Ok(bps.min(U256::from(u64::MAX)).low_u64())
}

/// Flag a snapshot taken more than `max_age_secs` before `now`.
pub fn check_freshness(as_of: u64, now: u64, max_age_secs: u64) -> Option<StaleInput> {
    let age_secs = now.saturating_sub(as_of);
    if age_secs > max_age_secs {
        Some(StaleInput {
            age_secs,
            max_age_secs,
        })
    } else {
        None
    }
}

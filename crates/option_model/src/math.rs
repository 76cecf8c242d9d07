//! Payout math mirrored from the options AMM settlement routine

use primitive_types::U256;

use crate::amount::{pow10, ScaledAmount};
use crate::terms::{MarketSnapshot, OptionKind, OptionTerms, Position};
use crate::validator::{check_sufficiency, Sufficiency};
use crate::{Conventions, ModelError, PayoutFormula};

/// Payout preview for one position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutResult {
    /// Stablecoin units
    pub amount: ScaledAmount,
    /// Unset until a pool snapshot is attached
    pub liquidity: Option<Sufficiency>,
}

impl PayoutResult {
    /// Attach the sufficiency check against `pool`.
    pub fn with_liquidity(self, pool: &MarketSnapshot) -> Result<Self, ModelError> {
        let sufficiency = check_sufficiency(self.amount, pool)?;
        Ok(Self {
            liquidity: Some(sufficiency),
            ..self
        })
    }
}

/// Every intermediate of one payout evaluation, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutBreakdown {
    pub formula: PayoutFormula,
    pub normalized_spot: ScaledAmount,
    pub normalized_strike: ScaledAmount,
    pub price_difference: ScaledAmount,
    pub lots: ScaledAmount,
    pub divisor_exp: u32,
    pub amount: ScaledAmount,
}

/// How far the spot is past the strike in the holder's favour; zero otherwise.
///
/// Both prices must already share a scale.
pub fn price_difference(kind: OptionKind, spot: U256, strike: U256) -> U256 {
    match kind {
        OptionKind::Call if spot > strike => spot - strike,
        OptionKind::Put if spot < strike => strike - spot,
        _ => U256::zero(),
    }
}

/// Evaluate the payout formula selected in `conv`, keeping intermediates.
///
/// Contract formula:
/// - spot and strike at the canonical scale (feed `10^3` spot times `10^15`)
/// - diff = spot - strike (call) or strike - spot (put), floored at zero
/// - payout = diff * lots / 10^12, reported at stablecoin scale
///
/// The contract divisor leaves the product at 24 decimals while the ledger
/// pays it out as 6-decimal stablecoin. That is reproduced, not fixed.
///
/// Expiry is not checked here.
pub fn payout_breakdown(
    conv: &Conventions,
    terms: &OptionTerms,
    spot: ScaledAmount,
    lots: ScaledAmount,
) -> Result<PayoutBreakdown, ModelError> {
    let (price_scale, lots_scale, divisor_exp) = match conv.payout_formula {
        PayoutFormula::Contract => (
            conv.canonical_scale,
            conv.asset_decimals,
            conv.payout_divisor_exp,
        ),
        PayoutFormula::Corrected => (
            conv.stable_decimals,
            conv.stable_decimals,
            conv.stable_decimals,
        ),
    };

    let normalized_spot = spot.normalize(price_scale)?;
    let normalized_strike = terms.strike_price.normalize(price_scale)?;
    let lots = lots.normalize(lots_scale)?;

    let diff = price_difference(terms.kind, normalized_spot.raw, normalized_strike.raw);

    let raw = diff
        .checked_mul(lots.raw)
        .ok_or(ModelError::Overflow)?
        / pow10(divisor_exp)?;

    Ok(PayoutBreakdown {
        formula: conv.payout_formula,
        normalized_spot,
        normalized_strike,
        price_difference: ScaledAmount::new(diff, price_scale),
        lots,
        divisor_exp,
        amount: ScaledAmount::new(raw, conv.stable_decimals),
    })
}

/// Payout the contract would pay `position` at `spot`.
pub fn compute_payout(
    terms: &OptionTerms,
    spot: ScaledAmount,
    position: &Position,
) -> Result<PayoutResult, ModelError> {
    compute_payout_with(&Conventions::CONTRACT, terms, spot, position)
}

/// Payout under explicit conventions (alternative formula, overridden constants).
pub fn compute_payout_with(
    conv: &Conventions,
    terms: &OptionTerms,
    spot: ScaledAmount,
    position: &Position,
) -> Result<PayoutResult, ModelError> {
    let breakdown = payout_breakdown(conv, terms, spot, position.lots)?;
    Ok(PayoutResult {
        amount: breakdown.amount,
        liquidity: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::Identity;

    const STRIKE_800: u128 = 800_000_000_000_000_000_000;
    const ONE_LOT: u128 = 1_000_000_000_000_000_000;

    fn terms(kind: OptionKind) -> OptionTerms {
        OptionTerms {
            strike_price: ScaledAmount::from_u128(STRIKE_800, 18),
            lot_size: ScaledAmount::from_u128(10 * ONE_LOT, 18),
            premium_constant: ScaledAmount::from_u128(5 * ONE_LOT, 18),
            k_constant: ScaledAmount::new(U256::from(50u8) * U256::exp10(36), 36),
            expiry: 1_700_000_000,
            kind,
            creator: Identity::default(),
        }
    }

    fn position(lots: u128) -> Position {
        Position {
            option_id: 0,
            holder: Identity::default(),
            lots: ScaledAmount::from_u128(lots, 18),
        }
    }

    fn feed(raw: u64) -> ScaledAmount {
        ScaledAmount::new(U256::from(raw), 3)
    }

    #[test]
    fn test_golden_call_payout() {
        let result = compute_payout(&terms(OptionKind::Call), feed(1_804_235), &position(ONE_LOT))
            .unwrap();

        // ((1804235 * 10^15) - 800e18) * 1e18 / 10^12
        let expected = (U256::from(1_804_235u64) * U256::exp10(15) - U256::from(STRIKE_800))
            * U256::from(ONE_LOT)
            / U256::exp10(12);
        assert_eq!(result.amount.raw, expected);
        assert_eq!(
            result.amount.raw,
            U256::from_dec_str("1004235000000000000000000000").unwrap()
        );
        assert_eq!(result.amount.scale, 6);
        assert!(result.liquidity.is_none());
    }

    #[test]
    fn test_put_above_strike_pays_nothing() {
        let result = compute_payout(&terms(OptionKind::Put), feed(1_804_235), &position(ONE_LOT))
            .unwrap();
        assert!(result.amount.is_zero());
    }

    #[test]
    fn test_put_below_strike() {
        // Spot 700.5 vs strike 800
        let result = compute_payout(&terms(OptionKind::Put), feed(700_500), &position(ONE_LOT))
            .unwrap();
        let diff = U256::from(99_500u64) * U256::exp10(15);
        assert_eq!(result.amount.raw, diff * U256::from(ONE_LOT) / U256::exp10(12));
    }

    #[test]
    fn test_at_the_money_and_zero_lots() {
        let atm = compute_payout(&terms(OptionKind::Call), feed(800_000), &position(ONE_LOT))
            .unwrap();
        assert!(atm.amount.is_zero());

        let empty = compute_payout(&terms(OptionKind::Call), feed(1_804_235), &position(0))
            .unwrap();
        assert!(empty.amount.is_zero());
    }

    #[test]
    fn test_corrected_formula() {
        let conv = Conventions {
            payout_formula: PayoutFormula::Corrected,
            ..Conventions::CONTRACT
        };
        let breakdown =
            payout_breakdown(&conv, &terms(OptionKind::Call), feed(1_804_235), position(ONE_LOT).lots)
                .unwrap();

        assert_eq!(breakdown.normalized_spot.raw, U256::from(1_804_235_000u64));
        assert_eq!(breakdown.normalized_strike.raw, U256::from(800_000_000u64));
        // 1004.235 USDC
        assert_eq!(breakdown.amount.raw, U256::from(1_004_235_000u64));
        assert_eq!(breakdown.amount.scale, 6);
    }

    #[test]
    fn test_with_liquidity_attaches_shortfall() {
        let conv = Conventions {
            payout_formula: PayoutFormula::Corrected,
            ..Conventions::CONTRACT
        };
        let pool = MarketSnapshot {
            spot_price: feed(1_804_235),
            total_liquidity: ScaledAmount::from_u128(110_160_000_000, 6),
            as_of: 0,
        };
        let result = compute_payout_with(&conv, &terms(OptionKind::Call), pool.spot_price, &position(ONE_LOT))
            .unwrap()
            .with_liquidity(&pool)
            .unwrap();

        let liquidity = result.liquidity.unwrap();
        assert!(liquidity.sufficient);
        assert!(liquidity.shortfall.is_zero());
    }

    #[test]
    fn test_idempotent() {
        let t = terms(OptionKind::Call);
        let p = position(3 * ONE_LOT / 2);
        let a = compute_payout(&t, feed(1_900_001), &p).unwrap();
        let b = compute_payout(&t, feed(1_900_001), &p).unwrap();
        assert_eq!(a, b);
    }
}

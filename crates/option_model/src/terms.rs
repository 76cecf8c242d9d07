//! Option series, positions and market snapshots as read from the ledger

use core::fmt;
use core::str::FromStr;

use crate::{amount::ScaledAmount, Conventions, ModelError};

/// 20-byte account address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Identity(pub [u8; 20]);

impl FromStr for Identity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes).map_err(|_| ModelError::InvalidIdentity)?;
        Ok(Identity(bytes))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    pub fn from_is_call(is_call: bool) -> Self {
        if is_call {
            OptionKind::Call
        } else {
            OptionKind::Put
        }
    }

    pub fn is_call(self) -> bool {
        matches!(self, OptionKind::Call)
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Call => write!(f, "CALL"),
            OptionKind::Put => write!(f, "PUT"),
        }
    }
}

/// One option series offered by the AMM.
///
/// Read-only once fetched, except that `lot_size` shrinks with every purchase
/// and must be re-read after each confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionTerms {
    pub strike_price: ScaledAmount,
    /// Lots still available for purchase
    pub lot_size: ScaledAmount,
    /// Premium the series was opened with
    pub premium_constant: ScaledAmount,
    /// Numerator of the floating premium: `premium = k / lot_size`
    pub k_constant: ScaledAmount,
    /// Unix seconds
    pub expiry: u64,
    pub kind: OptionKind,
    pub creator: Identity,
}

/// Lots of one series held by one holder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub option_id: u64,
    pub holder: Identity,
    pub lots: ScaledAmount,
}

/// Point-in-time read of spot price and pool liquidity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub spot_price: ScaledAmount,
    pub total_liquidity: ScaledAmount,
    /// Unix seconds
    pub as_of: u64,
}

/// Parameters for opening a new series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesParams {
    pub strike_price: ScaledAmount,
    pub lot_size: ScaledAmount,
    pub premium: ScaledAmount,
    pub expiry: u64,
    pub kind: OptionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesRejection {
    ZeroStrike,
    ZeroPremium,
    ZeroLotSize,
    /// Call strike must be above the current spot
    CallStrikeNotAboveSpot,
    /// Put strike must be below the current spot
    PutStrikeNotBelowSpot,
}

impl fmt::Display for SeriesRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SeriesRejection::ZeroStrike => "strike price must be greater than 0",
            SeriesRejection::ZeroPremium => "premium must be greater than 0",
            SeriesRejection::ZeroLotSize => "lot size must be greater than 0",
            SeriesRejection::CallStrikeNotAboveSpot => {
                "call strike must be higher than the current price"
            }
            SeriesRejection::PutStrikeNotBelowSpot => {
                "put strike must be lower than the current price"
            }
        };
        f.write_str(msg)
    }
}

/// Pre-check a new series before it is submitted.
///
/// The spot comparison only applies when a spot price is known.
pub fn validate_new_series(
    conv: &Conventions,
    params: &SeriesParams,
    spot: Option<ScaledAmount>,
) -> Result<(), ModelError> {
    let reject = |r| Err(ModelError::InvalidSeries(r));

    if params.strike_price.is_zero() {
        return reject(SeriesRejection::ZeroStrike);
    }
    if params.premium.is_zero() {
        return reject(SeriesRejection::ZeroPremium);
    }
    if params.lot_size.is_zero() {
        return reject(SeriesRejection::ZeroLotSize);
    }

    let spot = match spot {
        Some(s) if !s.is_zero() => s.normalize(conv.canonical_scale)?,
        _ => return Ok(()),
    };
    let strike = params.strike_price.normalize(conv.canonical_scale)?;

    match params.kind {
        OptionKind::Call if strike.raw <= spot.raw => reject(SeriesRejection::CallStrikeNotAboveSpot),
        OptionKind::Put if strike.raw >= spot.raw => reject(SeriesRejection::PutStrikeNotBelowSpot),
        _ => Ok(()),
    }
}

/// Expiry has passed at `now` (unix seconds)
pub fn is_expired(terms: &OptionTerms, now: u64) -> bool {
    now > terms.expiry
}

/// Spot is strictly past the strike in the option's favour.
pub fn is_in_the_money(
    conv: &Conventions,
    terms: &OptionTerms,
    spot: ScaledAmount,
) -> Result<bool, ModelError> {
    let spot = spot.normalize(conv.canonical_scale)?;
    let strike = terms.strike_price.normalize(conv.canonical_scale)?;
    Ok(match terms.kind {
        OptionKind::Call => spot.raw > strike.raw,
        OptionKind::Put => spot.raw < strike.raw,
    })
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::U256;
    use std::string::ToString;

    fn e18(units: u128) -> ScaledAmount {
        ScaledAmount::new(U256::from(units) * U256::exp10(18), 18)
    }

    fn series(kind: OptionKind, strike: u128) -> SeriesParams {
        SeriesParams {
            strike_price: e18(strike),
            lot_size: e18(10),
            premium: e18(5),
            expiry: 1_700_000_000,
            kind,
        }
    }

    #[test]
    fn test_identity_round_trip() {
        let text = "0x8889F62d45A1bcECf23b848f6783258eF82D0138";
        let id: Identity = text.parse().unwrap();
        assert_eq!(id.to_string(), text.to_lowercase());
        assert_eq!("0x1234".parse::<Identity>(), Err(ModelError::InvalidIdentity));
    }

    #[test]
    fn test_series_requires_nonzero_fields() {
        let conv = Conventions::CONTRACT;
        let mut params = series(OptionKind::Call, 2000);
        params.premium = ScaledAmount::zero(18);
        assert_eq!(
            validate_new_series(&conv, &params, None),
            Err(ModelError::InvalidSeries(SeriesRejection::ZeroPremium))
        );
    }

    #[test]
    fn test_series_strike_against_spot() {
        let conv = Conventions::CONTRACT;
        let spot = conv.spot_from_feed(U256::from(1_804_235u64));

        assert!(validate_new_series(&conv, &series(OptionKind::Call, 2000), Some(spot)).is_ok());
        assert_eq!(
            validate_new_series(&conv, &series(OptionKind::Call, 1800), Some(spot)),
            Err(ModelError::InvalidSeries(SeriesRejection::CallStrikeNotAboveSpot))
        );
        assert!(validate_new_series(&conv, &series(OptionKind::Put, 1800), Some(spot)).is_ok());
        assert_eq!(
            validate_new_series(&conv, &series(OptionKind::Put, 2000), Some(spot)),
            Err(ModelError::InvalidSeries(SeriesRejection::PutStrikeNotBelowSpot))
        );
        // Unknown spot skips the comparison
        assert!(validate_new_series(&conv, &series(OptionKind::Put, 2000), None).is_ok());
    }

    #[test]
    fn test_moneyness_and_expiry() {
        let conv = Conventions::CONTRACT;
        let terms = OptionTerms {
            strike_price: e18(800),
            lot_size: e18(10),
            premium_constant: e18(5),
            k_constant: ScaledAmount::zero(36),
            expiry: 1_000,
            kind: OptionKind::Call,
            creator: Identity::default(),
        };
        let spot = conv.spot_from_feed(U256::from(1_804_235u64));
        assert!(is_in_the_money(&conv, &terms, spot).unwrap());

        let put = OptionTerms { kind: OptionKind::Put, ..terms };
        assert!(!is_in_the_money(&conv, &put, spot).unwrap());

        assert!(!is_expired(&terms, 1_000));
        assert!(is_expired(&terms, 1_001));
    }
}

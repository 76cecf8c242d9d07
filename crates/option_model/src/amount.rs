//! Fixed-point amounts and decimal-scale normalization

use core::fmt;

use primitive_types::U256;

use crate::{ModelError, MAX_SCALE};

/// Raw integer paired with the power-of-ten divisor it is expressed in.
///
/// `ScaledAmount { raw: 1804235, scale: 3 }` is 1804.235. Two amounts must be
/// brought to the same scale before they are compared or combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScaledAmount {
    pub raw: U256,
    pub scale: u32,
}

impl ScaledAmount {
    pub const fn new(raw: U256, scale: u32) -> Self {
        Self { raw, scale }
    }

    pub fn from_u128(raw: u128, scale: u32) -> Self {
        Self::new(U256::from(raw), scale)
    }

    pub fn zero(scale: u32) -> Self {
        Self::new(U256::zero(), scale)
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Rescale to `target_scale`, truncating when scaling down.
    pub fn normalize(self, target_scale: u32) -> Result<Self, ModelError> {
        normalize(self, target_scale)
    }
}

/// Convert `amount` to `target_scale`.
///
/// Up-scaling multiplies by `10^(target - scale)`; down-scaling integer-divides
/// by `10^(scale - target)` and truncates, matching the ledger's integer
/// division. Rounding here would change settlement outcomes.
pub fn normalize(amount: ScaledAmount, target_scale: u32) -> Result<ScaledAmount, ModelError> {
    if amount.scale > MAX_SCALE || target_scale > MAX_SCALE {
        return Err(ModelError::InvalidScale);
    }

    let raw = if target_scale >= amount.scale {
        let factor = pow10(target_scale - amount.scale)?;
        amount.raw.checked_mul(factor).ok_or(ModelError::Overflow)?
    } else {
        amount.raw / pow10(amount.scale - target_scale)?
    };

    Ok(ScaledAmount::new(raw, target_scale))
}

/// `10^exp` as a 256-bit integer
pub fn pow10(exp: u32) -> Result<U256, ModelError> {
    if exp > MAX_SCALE {
        return Err(ModelError::InvalidScale);
    }
    Ok(U256::exp10(exp as usize))
}

/// Validate a scale read from external data (config files, feed metadata).
pub fn validate_scale(scale: i64) -> Result<u32, ModelError> {
    if scale < 0 || scale > MAX_SCALE as i64 {
        return Err(ModelError::InvalidScale);
    }
    Ok(scale as u32)
}

/// Parse a decimal string such as `"1.5"` into an amount at `scale`.
///
/// Exact: no floating point is involved. More fractional digits than the
/// scale can hold is an error rather than a silent truncation.
pub fn parse_units(text: &str, scale: u32) -> Result<ScaledAmount, ModelError> {
    if scale > MAX_SCALE {
        return Err(ModelError::InvalidScale);
    }

    let text = text.trim();
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(ModelError::InvalidAmount);
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ModelError::InvalidAmount);
    }
    if frac.len() > scale as usize {
        return Err(ModelError::InvalidAmount);
    }

    let whole = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| ModelError::Overflow)?
    };
    let frac_raw = if frac.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(frac).map_err(|_| ModelError::Overflow)?
    };

    let raw = whole
        .checked_mul(pow10(scale)?)
        .and_then(|w| w.checked_add(frac_raw * pow10(scale - frac.len() as u32).ok()?))
        .ok_or(ModelError::Overflow)?;

    Ok(ScaledAmount::new(raw, scale))
}

/// Formats like `formatUnits`: `1004.235`, `0.0`, `110160.0`.
impl fmt::Display for ScaledAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let divisor = match pow10(self.scale) {
            Ok(d) => d,
            Err(_) => return write!(f, "{}e-{}", self.raw, self.scale),
        };

        let whole = self.raw / divisor;
        let mut frac = self.raw % divisor;
        write!(f, "{}.", whole)?;

        if frac.is_zero() {
            return write!(f, "0");
        }

        // Trailing zeros dropped, leading zeros kept
        let mut width = self.scale;
        let ten = U256::from(10u8);
        while (frac % ten).is_zero() {
            frac /= ten;
            width -= 1;
        }

        let mut digits = 0u32;
        let mut probe = frac;
        while !probe.is_zero() {
            probe /= ten;
            digits += 1;
        }
        for _ in digits..width {
            write!(f, "0")?;
        }
        write!(f, "{}", frac)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    fn amt(raw: u128, scale: u32) -> ScaledAmount {
        ScaledAmount::from_u128(raw, scale)
    }

    #[test]
    fn test_feed_price_to_canonical() {
        // 1804.235 from the feed, brought to 18 decimals
        let spot = normalize(amt(1_804_235, 3), 18).unwrap();
        assert_eq!(spot.raw, U256::from(1_804_235u128) * U256::exp10(15));
        assert_eq!(spot.scale, 18);
    }

    #[test]
    fn test_downscale_truncates() {
        // 1.999999 USDC at 6 decimals to 0 decimals is 1, never 2
        let whole = normalize(amt(1_999_999, 6), 0).unwrap();
        assert_eq!(whole.raw, U256::from(1u8));
    }

    #[test]
    fn test_down_then_up_loses_precision() {
        let original = amt(1_234_567_890_123_456_789, 18);
        let micro = normalize(original, 6).unwrap();
        let back = normalize(micro, 18).unwrap();
        assert_eq!(micro.raw, U256::from(1_234_567u64));
        assert_ne!(back, original);
        assert_eq!(back.raw, U256::from(1_234_567_000_000_000_000u128));
    }

    #[test]
    fn test_invalid_scales() {
        assert_eq!(normalize(amt(1, 3), 78), Err(ModelError::InvalidScale));
        assert_eq!(normalize(amt(1, 90), 6), Err(ModelError::InvalidScale));
        assert_eq!(validate_scale(-1), Err(ModelError::InvalidScale));
        assert_eq!(validate_scale(18), Ok(18));
    }

    #[test]
    fn test_upscale_overflow() {
        let huge = ScaledAmount::new(U256::MAX, 0);
        assert_eq!(normalize(huge, 1), Err(ModelError::Overflow));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1", 18).unwrap().raw, U256::exp10(18));
        assert_eq!(parse_units("1.5", 6).unwrap().raw, U256::from(1_500_000u64));
        assert_eq!(parse_units(".25", 2).unwrap().raw, U256::from(25u8));
        assert_eq!(parse_units("1.2345678", 6), Err(ModelError::InvalidAmount));
        assert_eq!(parse_units("-1", 6), Err(ModelError::InvalidAmount));
        assert_eq!(parse_units("", 6), Err(ModelError::InvalidAmount));
        assert_eq!(parse_units("1e3", 6), Err(ModelError::InvalidAmount));
    }

    #[test]
    fn test_display_like_format_units() {
        assert_eq!(amt(110_160_000_000, 6).to_string(), "110160.0");
        assert_eq!(amt(1_804_235, 3).to_string(), "1804.235");
        assert_eq!(amt(5, 6).to_string(), "0.000005");
        assert_eq!(amt(0, 18).to_string(), "0.0");
        assert_eq!(amt(1_004_235_000, 6).to_string(), "1004.235");
    }
}

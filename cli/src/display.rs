//! Terminal and JSON output helpers shared by the commands

use anyhow::{Context, Result};
use colored::Colorize;
use option_model::{ScaledAmount, Sufficiency, U256};
use serde::Serialize;

/// An amount as reported: raw integer, its scale, and the formatted value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmountView {
    pub raw: String,
    pub scale: u32,
    pub formatted: String,
}

impl From<ScaledAmount> for AmountView {
    fn from(amount: ScaledAmount) -> Self {
        Self {
            raw: amount.raw.to_string(),
            scale: amount.scale,
            formatted: amount.to_string(),
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode JSON output")?;
    println!("{}", text);
    Ok(())
}

pub fn header(title: &str) {
    println!("{}", format!("=== {} ===", title).bright_green().bold());
}

pub fn section(title: &str) {
    println!("\n{}", format!("--- {} ---", title).bright_cyan());
}

pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {} {}", format!("{}:", label).bright_cyan(), value);
}

/// Formatted amount followed by its raw integer
pub fn amount_field(label: &str, amount: ScaledAmount, unit: &str) {
    let unit = if unit.is_empty() {
        String::new()
    } else {
        format!(" {}", unit)
    };
    println!(
        "  {} {}{} {}",
        format!("{}:", label).bright_cyan(),
        amount,
        unit,
        format!("(raw {})", amount.raw).dimmed()
    );
}

pub fn yes_no(value: bool) -> colored::ColoredString {
    if value {
        "Yes".bright_green()
    } else {
        "No".bright_red()
    }
}

pub fn print_sufficiency(label: &str, check: &Sufficiency) {
    field(label, yes_no(check.sufficient));
    if !check.sufficient {
        println!(
            "  {} {} USDC {}",
            "Shortfall:".bright_red(),
            check.shortfall,
            format!("(raw {})", check.shortfall.raw).dimmed()
        );
    }
}

/// Parse a raw integer argument (no decimal point) at `scale`
pub fn parse_raw_arg(name: &str, text: &str, scale: u32) -> Result<ScaledAmount> {
    let raw = U256::from_dec_str(text.trim())
        .map_err(|_| anyhow::anyhow!("{} must be a raw integer, got {:?}", name, text))?;
    Ok(ScaledAmount::new(raw, scale))
}

/// Parse a decimal argument such as `1.5` at `scale`
pub fn parse_decimal_arg(name: &str, text: &str, scale: u32) -> Result<ScaledAmount> {
    option_model::parse_units(text, scale)
        .map_err(|e| anyhow::anyhow!("{} {:?}: {} (at most {} decimals)", name, text, e, scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_view_keeps_raw_and_formatted() {
        let view = AmountView::from(ScaledAmount::from_u128(110_160_000_000, 6));
        assert_eq!(view.raw, "110160000000");
        assert_eq!(view.formatted, "110160.0");
        assert_eq!(view.scale, 6);
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            parse_raw_arg("--price", "1804235", 3).unwrap(),
            ScaledAmount::from_u128(1_804_235, 3)
        );
        assert!(parse_raw_arg("--price", "1804.235", 3).is_err());

        assert_eq!(
            parse_decimal_arg("--lots", "0.5", 18).unwrap().raw,
            U256::from(5u8) * U256::exp10(17)
        );
        assert!(parse_decimal_arg("--amount", "0.0000001", 6).is_err());
    }
}

//! Liquidity provider operations

use anyhow::Result;
use colored::Colorize;
use option_model::{check_balance, pool_share_bps, Identity, ScaledAmount, BPS_SCALE};
use serde::Serialize;

use crate::client::submit_and_confirm;
use crate::config::NetworkConfig;
use crate::display::{amount_field, field, header, parse_decimal_arg, print_json, AmountView};
use crate::ledger::{OptionLedger, TxKind};

#[derive(Debug, Clone, Serialize)]
pub struct LiquidityReport {
    pub total_liquidity: AmountView,
    pub holder: Option<String>,
    pub contribution: Option<AmountView>,
    pub share_bps: Option<u64>,
}

/// Basis points as a percentage string, `1234` -> `12.34%`
pub fn format_bps(bps: u64) -> String {
    let percent_scale = BPS_SCALE / 100;
    format!("{}.{:02}%", bps / percent_scale, bps % percent_scale)
}

/// `liquidity`: pool size and the holder's share of it
pub async fn show_liquidity<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    json: bool,
) -> Result<()> {
    let total = ledger.read_total_liquidity().await?;

    let (contribution, share) = match config.holder {
        Some(holder) => {
            let contribution = ledger.read_contribution(&holder).await?;
            (Some(contribution), Some(pool_share_bps(contribution, total)?))
        }
        None => (None, None),
    };

    if json {
        return print_json(&LiquidityReport {
            total_liquidity: total.into(),
            holder: config.holder.map(|h| h.to_string()),
            contribution: contribution.map(AmountView::from),
            share_bps: share,
        });
    }

    header("Pool Liquidity");
    amount_field("Total liquidity", total, "USDC");
    if let (Some(holder), Some(contribution), Some(share)) = (config.holder, contribution, share) {
        field("Provider", holder);
        amount_field("Contribution", contribution, "USDC");
        field("Pool share", format_bps(share));
    }
    Ok(())
}

/// `add-liquidity <amount>`: approve the stablecoin, then deposit
pub async fn add_liquidity<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    amount: &str,
) -> Result<()> {
    let holder = config.holder()?;
    let amount = parse_decimal_arg("amount", amount, ledger.conventions().stable_decimals)?;

    header("Add Liquidity");
    amount_field("Amount", amount, "USDC");

    let balance = ledger.read_stable_balance(&holder).await?;
    if !check_balance(balance, amount)?.sufficient {
        println!(
            "{} balance is {} USDC; the deposit will revert",
            "Warning:".yellow(),
            balance
        );
    }

    submit_and_confirm(ledger, &holder, TxKind::Approve { amount }, &config.poll).await?;
    submit_and_confirm(ledger, &holder, TxKind::AddLiquidity { amount }, &config.poll).await?;

    print_position(ledger, &holder).await
}

/// `remove-liquidity <amount>`
pub async fn remove_liquidity<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    amount: &str,
) -> Result<()> {
    let holder = config.holder()?;
    let amount = parse_decimal_arg("amount", amount, ledger.conventions().stable_decimals)?;

    header("Remove Liquidity");
    amount_field("Amount", amount, "USDC");

    submit_and_confirm(ledger, &holder, TxKind::RemoveLiquidity { amount }, &config.poll).await?;

    print_position(ledger, &holder).await
}

async fn print_position<L: OptionLedger>(
    ledger: &L,
    holder: &Identity,
) -> Result<()> {
    let total = ledger.read_total_liquidity().await?;
    let contribution: ScaledAmount = ledger.read_contribution(holder).await?;

    println!();
    amount_field("Total liquidity", total, "USDC");
    amount_field("Your contribution", contribution, "USDC");
    field("Pool share", format_bps(pool_share_bps(contribution, total)?));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PollConfig;
    use crate::config::{CliOverrides, ConventionsSection, FileConfig};
    use crate::snapshot::tests::{sample_ledger, HOLDER};
    use std::time::Duration;

    fn config() -> NetworkConfig {
        config_with(ConventionsSection::default())
    }

    fn config_with(conventions: ConventionsSection) -> NetworkConfig {
        let overrides = CliOverrides {
            holder: Some(HOLDER.to_string()),
            ..Default::default()
        };
        let file = FileConfig {
            conventions,
            ..Default::default()
        };
        let mut config = NetworkConfig::from_parts(&file, &overrides).unwrap();
        config.poll = PollConfig {
            interval: Duration::from_millis(1),
            max_attempts: 3,
        };
        config
    }

    #[test]
    fn test_format_bps() {
        assert_eq!(format_bps(0), "0.00%");
        assert_eq!(format_bps(1_234), "12.34%");
        assert_eq!(format_bps(10_000), "100.00%");
    }

    #[tokio::test]
    async fn test_add_then_remove() {
        let config = config();
        let ledger = sample_ledger();
        let holder = config.holder().unwrap();

        add_liquidity(&config, &ledger, "25.5").await.unwrap();
        assert_eq!(
            ledger.read_contribution(&holder).await.unwrap(),
            ScaledAmount::from_u128(25_500_000, 6)
        );

        remove_liquidity(&config, &ledger, "25.5").await.unwrap();
        assert!(ledger.read_contribution(&holder).await.unwrap().is_zero());

        let err = remove_liquidity(&config, &ledger, "1").await.unwrap_err();
        assert!(format!("{:#}", err).contains("insufficient liquidity contribution"));
    }

    #[tokio::test]
    async fn test_deposit_uses_ledger_stable_decimals() {
        let config = config_with(ConventionsSection {
            stable_decimals: Some(0),
            ..Default::default()
        });
        let ledger = sample_ledger();
        let holder = config.holder().unwrap();

        add_liquidity(&config, &ledger, "25.5").await.unwrap();
        assert_eq!(
            ledger.read_contribution(&holder).await.unwrap(),
            ScaledAmount::from_u128(25_500_000, 6)
        );
    }
}

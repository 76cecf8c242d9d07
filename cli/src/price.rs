//! Price feed inspection

use anyhow::Result;
use option_model::{Conventions, ScaledAmount};
use serde::Serialize;

use crate::client::{fetch_market_snapshot, refresh_latest_price, warn_if_stale};
use crate::config::NetworkConfig;
use crate::display::{amount_field, field, header, parse_raw_arg, print_json, AmountView};
use crate::ledger::OptionLedger;

#[derive(Debug, Clone, Serialize)]
pub struct PriceReport {
    pub latest: AmountView,
    /// The price as the payout formula sees it
    pub canonical: AmountView,
    pub multiplier_exp: u32,
    pub refreshed: bool,
}

impl PriceReport {
    pub fn new(conv: &Conventions, latest: ScaledAmount, refreshed: bool) -> Result<Self> {
        Ok(Self {
            latest: latest.into(),
            canonical: latest.normalize(conv.canonical_scale)?.into(),
            multiplier_exp: conv.canonical_scale.saturating_sub(latest.scale),
            refreshed,
        })
    }
}

/// `price [--fee RAW]`: refresh the feed when a fee is given, then show it
pub async fn show_price<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    fee: Option<String>,
    json: bool,
) -> Result<()> {
    let conv = config.conventions;

    let (latest, refreshed) = match fee {
        Some(raw) => {
            let holder = config.holder()?;
            let fee = parse_raw_arg("--fee", &raw, conv.asset_decimals)?;
            (refresh_latest_price(ledger, &holder, fee, &config.poll).await?, true)
        }
        None => {
            let snapshot = fetch_market_snapshot(ledger).await?;
            warn_if_stale(&snapshot, config.max_snapshot_age_secs);
            (snapshot.spot_price, false)
        }
    };

    let report = PriceReport::new(&conv, latest, refreshed)?;
    if json {
        return print_json(&report);
    }

    header("Latest Price");
    field("Raw", latest.raw);
    field("Decimals", latest.scale);
    amount_field("Formatted", latest, "USD");
    field(
        &format!("Raw * 10^{}", report.multiplier_exp),
        &report.canonical.raw,
    );
    if !refreshed {
        field("Source", "last published value (pass --fee to refresh)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_price_reaches_eighteen_decimals() {
        let report = PriceReport::new(
            &Conventions::CONTRACT,
            ScaledAmount::from_u128(1_804_235, 3),
            false,
        )
        .unwrap();
        assert_eq!(report.multiplier_exp, 15);
        assert_eq!(report.canonical.raw, "1804235000000000000000");
        assert_eq!(report.latest.formatted, "1804.235");
    }
}

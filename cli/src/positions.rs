//! Holder positions across every listed series

use anyhow::{Context, Result};
use colored::Colorize;
use option_model::{
    compute_payout_with, is_expired, is_in_the_money, Conventions, Identity, MarketSnapshot,
    OptionTerms, Position,
};
use serde::Serialize;

use crate::client::{fetch_market_snapshot, fetch_position, format_expiry, list_options};
use crate::config::NetworkConfig;
use crate::display::{field, header, print_json, AmountView};
use crate::ledger::OptionLedger;

#[derive(Debug, Clone, Serialize)]
pub struct PositionSummary {
    pub id: u64,
    pub kind: String,
    pub strike_price: AmountView,
    pub lots: AmountView,
    pub expiry: u64,
    pub expired: bool,
    pub in_the_money: bool,
    /// What settlement would pay at the current price
    pub payout: AmountView,
    pub sufficient_liquidity: bool,
}

impl PositionSummary {
    fn new(
        conv: &Conventions,
        terms: &OptionTerms,
        position: &Position,
        snapshot: &MarketSnapshot,
    ) -> Result<Self> {
        let payout = compute_payout_with(conv, terms, snapshot.spot_price, position)?
            .with_liquidity(snapshot)?;
        Ok(Self {
            id: position.option_id,
            kind: terms.kind.to_string(),
            strike_price: terms.strike_price.into(),
            lots: position.lots.into(),
            expiry: terms.expiry,
            expired: is_expired(terms, snapshot.as_of),
            in_the_money: is_in_the_money(conv, terms, snapshot.spot_price)?,
            payout: payout.amount.into(),
            sufficient_liquidity: payout.liquidity.map_or(true, |s| s.sufficient),
        })
    }
}

/// Every series where `holder` owns lots, nearest expiry first
pub async fn collect_positions<L: OptionLedger>(
    ledger: &L,
    holder: &Identity,
    max_probe: u64,
) -> Result<Vec<PositionSummary>> {
    let conv = ledger.conventions();
    let series = list_options(ledger, max_probe)
        .await
        .context("Failed to enumerate options")?;
    let snapshot = fetch_market_snapshot(ledger).await?;

    let mut positions = Vec::new();
    for (id, terms) in &series {
        let position = fetch_position(ledger, *id, holder).await?;
        if position.lots.is_zero() {
            continue;
        }
        positions.push(PositionSummary::new(&conv, terms, &position, &snapshot)?);
    }
    positions.sort_by_key(|p| (p.expiry, p.id));
    Ok(positions)
}

/// `positions`
pub async fn show_positions<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    json: bool,
) -> Result<()> {
    let holder = config.holder()?;
    let positions = collect_positions(ledger, &holder, config.max_option_probe).await?;

    if json {
        return print_json(&positions);
    }

    header("Your Options");
    field("Holder", holder);
    if positions.is_empty() {
        println!("\n{}", "No lots held".dimmed());
        return Ok(());
    }

    println!(
        "\n{:<4} {:<5} {:>14} {:>10} {:<20} {:<4} {:>20}",
        "ID".bold(),
        "TYPE".bold(),
        "STRIKE".bold(),
        "LOTS".bold(),
        "EXPIRY".bold(),
        "ITM".bold(),
        "PAYOUT".bold()
    );
    for p in &positions {
        let expiry = if p.expired {
            format!("{} (expired)", format_expiry(p.expiry)).bright_red()
        } else {
            format_expiry(p.expiry).normal()
        };
        let payout = if p.sufficient_liquidity {
            p.payout.formatted.normal()
        } else {
            format!("{} (pool short)", p.payout.formatted).yellow()
        };
        println!(
            "{:<4} {:<5} {:>14} {:>10} {:<20} {:<4} {:>20}",
            p.id,
            p.kind,
            p.strike_price.formatted,
            p.lots.formatted,
            expiry,
            if p.in_the_money { "yes" } else { "no" },
            payout
        );
    }

    let settleable = positions.iter().filter(|p| p.expired).count();
    println!("\n{} {}", "Total:".bright_cyan(), positions.len());
    if settleable > 0 {
        println!("{} {}", "Ready to settle:".bright_cyan(), settleable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::{sample_file, sample_ledger, HOLDER};
    use crate::snapshot::{OwnershipEntry, SnapshotLedger};

    #[tokio::test]
    async fn test_only_held_series_nearest_expiry_first() {
        let mut file = sample_file();
        file.ownership.push(OwnershipEntry {
            option_id: 1,
            holder: HOLDER.to_string(),
            lots: "2000000000000000000".to_string(),
        });
        let ledger = SnapshotLedger::from_file(file).unwrap();
        let holder: Identity = HOLDER.parse().unwrap();

        let positions = collect_positions(&ledger, &holder, 100).await.unwrap();
        let ids: Vec<_> = positions.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 0]);

        // Put struck at 1500 with spot at 1804.235
        let put = &positions[0];
        assert!(put.expired);
        assert!(!put.in_the_money);
        assert_eq!(put.payout.raw, "0");
        assert!(put.sufficient_liquidity);

        let call = &positions[1];
        assert!(!call.expired);
        assert!(call.in_the_money);
        assert_eq!(call.payout.raw, "1004235000000000000000000000");
        assert!(!call.sufficient_liquidity);
    }

    #[tokio::test]
    async fn test_no_positions_for_other_holders() {
        let ledger = sample_ledger();
        let stranger: Identity = "0x0000000000000000000000000000000000000001".parse().unwrap();
        assert!(collect_positions(&ledger, &stranger, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settled_position_drops_out() {
        let mut file = sample_file();
        file.ownership[0].lots = "1".to_string();
        let ledger = SnapshotLedger::from_file(file).unwrap();
        let holder: Identity = HOLDER.parse().unwrap();
        ledger.advance_time(3_601).await;

        let positions = collect_positions(&ledger, &holder, 100).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].payout.raw, "1004235000");

        let handle = ledger
            .submit_transaction(&holder, crate::ledger::TxKind::Settle { option_id: 0 })
            .await
            .unwrap();
        ledger.transaction_status(&handle).await.unwrap();
        assert!(collect_positions(&ledger, &holder, 100).await.unwrap().is_empty());
    }
}

//! Option series lookup and listing

use anyhow::{Context, Result};
use colored::Colorize;
use option_model::{current_premium, is_expired, Conventions, OptionTerms, ScaledAmount};
use serde::Serialize;

use crate::client::{format_expiry, format_identity, list_option_ids, list_options};
use crate::config::NetworkConfig;
use crate::display::{field, header, print_json, AmountView};
use crate::ledger::OptionLedger;
use crate::payout::print_terms;

#[derive(Debug, Clone, Serialize)]
pub struct OptionSummary {
    pub id: u64,
    pub kind: String,
    pub strike_price: AmountView,
    pub lots_available: AmountView,
    /// Absent once the series has no lots left
    pub current_premium: Option<AmountView>,
    pub expiry: u64,
    pub expired: bool,
    pub creator: String,
}

impl OptionSummary {
    pub fn new(conv: &Conventions, id: u64, terms: &OptionTerms, now: u64) -> Self {
        let premium = (!terms.lot_size.is_zero())
            .then(|| ScaledAmount::new(current_premium(terms), conv.asset_decimals).into());
        Self {
            id,
            kind: terms.kind.to_string(),
            strike_price: terms.strike_price.into(),
            lots_available: terms.lot_size.into(),
            current_premium: premium,
            expiry: terms.expiry,
            expired: is_expired(terms, now),
            creator: terms.creator.to_string(),
        }
    }
}

/// `option <id>`
pub async fn show_option<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    option_id: u64,
    json: bool,
) -> Result<()> {
    let terms = ledger
        .read_option(option_id)
        .await
        .with_context(|| format!("Failed to read option {}", option_id))?;
    let now = ledger.block_time().await?;

    if json {
        return print_json(&OptionSummary::new(&config.conventions, option_id, &terms, now));
    }

    header(&format!("Option {}", option_id));
    print_terms(&terms);
    field(
        "Status",
        if is_expired(&terms, now) {
            "EXPIRED".bright_red()
        } else {
            "ACTIVE".bright_green()
        },
    );
    Ok(())
}

/// `options`: every listed series, newest first
pub async fn show_options<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    json: bool,
) -> Result<()> {
    let series = list_options(ledger, config.max_option_probe)
        .await
        .context("Failed to enumerate options")?;
    let now = ledger.block_time().await?;

    let summaries: Vec<_> = series
        .iter()
        .map(|(id, terms)| OptionSummary::new(&config.conventions, *id, terms, now))
        .collect();

    if json {
        return print_json(&summaries);
    }

    header("Options");
    if series.is_empty() {
        println!("\n{}", "No options found".dimmed());
        return Ok(());
    }

    println!(
        "\n{:<4} {:<5} {:>14} {:>14} {:>12}  {:<20} {}",
        "ID".bold(),
        "TYPE".bold(),
        "STRIKE".bold(),
        "LOTS LEFT".bold(),
        "PREMIUM".bold(),
        "EXPIRY".bold(),
        "CREATOR".bold()
    );
    for ((id, terms), summary) in series.iter().zip(&summaries) {
        let premium = summary
            .current_premium
            .as_ref()
            .map_or_else(|| "n/a".to_string(), |p| p.formatted.clone());
        let expiry = if summary.expired {
            format!("{} (expired)", format_expiry(terms.expiry)).dimmed()
        } else {
            format_expiry(terms.expiry).normal()
        };
        println!(
            "{:<4} {:<5} {:>14} {:>14} {:>12}  {:<20} {}",
            id,
            summary.kind,
            terms.strike_price.to_string(),
            terms.lot_size.to_string(),
            premium,
            expiry,
            format_identity(&terms.creator)
        );
    }
    println!("\n{} {}", "Total:".bright_cyan(), series.len());
    Ok(())
}

/// `options --ids`
pub async fn show_option_ids<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    json: bool,
) -> Result<()> {
    let ids = list_option_ids(ledger, config.max_option_probe)
        .await
        .context("Failed to enumerate options")?;

    if json {
        return print_json(&ids);
    }
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::sample_ledger;

    #[tokio::test]
    async fn test_summaries_mark_depleted_and_expired() {
        let ledger = sample_ledger();
        let now = ledger.block_time().await.unwrap();
        let conv = Conventions::CONTRACT;

        let active = OptionSummary::new(&conv, 0, &ledger.read_option(0).await.unwrap(), now);
        assert!(!active.expired);
        assert_eq!(active.current_premium.unwrap().formatted, "5.0");

        let depleted = OptionSummary::new(&conv, 1, &ledger.read_option(1).await.unwrap(), now);
        assert!(depleted.expired);
        assert!(depleted.current_premium.is_none());
        assert_eq!(depleted.kind, "PUT");
    }
}

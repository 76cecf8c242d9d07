//! Ledger client utilities: submission, confirmation polling, enumeration

use std::time::Duration;

use chrono::{Local, TimeZone};
use colored::Colorize;
use futures::stream::{self, Stream, TryStreamExt};
use indicatif::ProgressBar;
use log::{debug, warn};
use option_model::{
    check_freshness, Identity, MarketSnapshot, OptionTerms, Position, ScaledAmount,
};
use tokio::time::sleep;

use crate::ledger::{LedgerError, OptionLedger, Receipt, TxHandle, TxKind, TxStatus};

/// How long to wait for a transaction to confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1_000),
            max_attempts: 30,
        }
    }
}

/// Poll `handle` until it confirms, fails, or `max_attempts` runs out
pub async fn await_confirmation<L: OptionLedger>(
    ledger: &L,
    handle: TxHandle,
    poll: &PollConfig,
) -> Result<Receipt, LedgerError> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Waiting for {}", handle));

    for attempt in 1..=poll.max_attempts {
        spinner.tick();
        match ledger.transaction_status(&handle).await? {
            TxStatus::Confirmed(receipt) => {
                spinner.finish_and_clear();
                debug!("{} confirmed after {} attempt(s)", handle, attempt);
                return Ok(receipt);
            }
            TxStatus::Failed(reason) => {
                spinner.finish_and_clear();
                return Err(LedgerError::Reverted { handle, reason });
            }
            TxStatus::Pending => {
                debug!("{} pending (attempt {}/{})", handle, attempt, poll.max_attempts);
                sleep(poll.interval).await;
            }
        }
    }

    spinner.finish_and_clear();
    Err(LedgerError::ConfirmationTimeout {
        handle,
        attempts: poll.max_attempts,
    })
}

/// Send a transaction and wait for its receipt
pub async fn submit_and_confirm<L: OptionLedger>(
    ledger: &L,
    sender: &Identity,
    kind: TxKind,
    poll: &PollConfig,
) -> Result<Receipt, LedgerError> {
    println!("{} {}", "Sending transaction:".dimmed(), kind.label());

    let handle = ledger.submit_transaction(sender, kind).await?;
    let receipt = await_confirmation(ledger, handle, poll).await?;

    println!("{} {}", "Transaction confirmed:".bright_green(), handle);
    Ok(receipt)
}

/// Pay the feed fee, then read the refreshed price
pub async fn refresh_latest_price<L: OptionLedger>(
    ledger: &L,
    sender: &Identity,
    fee: ScaledAmount,
    poll: &PollConfig,
) -> Result<ScaledAmount, LedgerError> {
    submit_and_confirm(ledger, sender, TxKind::RefreshPrice { fee }, poll).await?;
    ledger.read_latest_price().await
}

/// Series ids probed in order from 0 until the ledger reports NotFound.
///
/// Finite (bounded by `max_probe`) and restartable: each call starts over.
/// Series with a zero strike are empty slots and are skipped.
pub fn option_series<'a, L: OptionLedger>(
    ledger: &'a L,
    max_probe: u64,
) -> impl Stream<Item = Result<(u64, OptionTerms), LedgerError>> + 'a {
    stream::unfold(Some(0u64), move |cursor| async move {
        let mut id = cursor?;
        while id < max_probe {
            match ledger.read_option(id).await {
                Ok(terms) if terms.strike_price.is_zero() => {
                    debug!("Option {} has zero strike price, skipping", id);
                    id += 1;
                }
                Ok(terms) => return Some((Ok((id, terms)), Some(id + 1))),
                Err(LedgerError::NotFound(_)) => {
                    debug!("No option at index {}, enumeration complete", id);
                    return None;
                }
                Err(e) => return Some((Err(e), None)),
            }
        }
        warn!("Stopped probing option ids at limit {}", max_probe);
        None
    })
}

pub async fn list_option_ids<L: OptionLedger>(
    ledger: &L,
    max_probe: u64,
) -> Result<Vec<u64>, LedgerError> {
    option_series(ledger, max_probe)
        .map_ok(|(id, _)| id)
        .try_collect()
        .await
}

/// All listed series, newest first
pub async fn list_options<L: OptionLedger>(
    ledger: &L,
    max_probe: u64,
) -> Result<Vec<(u64, OptionTerms)>, LedgerError> {
    let mut series: Vec<_> = option_series(ledger, max_probe).try_collect().await?;
    series.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(series)
}

/// Fresh spot price and pool liquidity
pub async fn fetch_market_snapshot<L: OptionLedger>(
    ledger: &L,
) -> Result<MarketSnapshot, LedgerError> {
    Ok(MarketSnapshot {
        spot_price: ledger.read_latest_price().await?,
        total_liquidity: ledger.read_total_liquidity().await?,
        as_of: ledger.block_time().await?,
    })
}

pub async fn fetch_position<L: OptionLedger>(
    ledger: &L,
    option_id: u64,
    holder: &Identity,
) -> Result<Position, LedgerError> {
    Ok(Position {
        option_id,
        holder: *holder,
        lots: ledger.read_ownership(option_id, holder).await?,
    })
}

/// Warn when a snapshot is older than `max_age_secs` of wall-clock time
pub fn warn_if_stale(snapshot: &MarketSnapshot, max_age_secs: u64) {
    if let Some(stale) = check_freshness(snapshot.as_of, now_unix(), max_age_secs) {
        warn!(
            "Market snapshot is {}s old (limit {}s); figures may not match the ledger",
            stale.age_secs, stale.max_age_secs
        );
    }
}

pub fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Expiry as local time
pub fn format_expiry(expiry: u64) -> String {
    match Local.timestamp_opt(expiry as i64, 0).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("{} (unix)", expiry),
    }
}

/// Pretty print an address as shortened form
pub fn format_identity(identity: &Identity) -> String {
    let addr = identity.to_string();
    format!("{}...{}", &addr[0..8], &addr[addr.len() - 6..])
        .bright_yellow()
        .to_string()
}

/// Pretty print a transaction hash with an explorer link
pub fn format_tx(handle: &TxHandle, explorer_url: &str) -> String {
    let hash = handle.to_string();
    let short = format!("{}...{}", &hash[0..10], &hash[hash.len() - 8..]);
    format!(
        "{} ({})",
        short.bright_blue(),
        format!("{}/tx/{}", explorer_url, hash).dimmed()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::{sample_file, sample_ledger, HOLDER};
    use crate::snapshot::{OptionEntry, SnapshotLedger};

    fn fast_poll(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    fn delayed_ledger(delay: u32) -> SnapshotLedger {
        let mut file = sample_file();
        file.confirmation_delay = delay;
        SnapshotLedger::from_file(file).unwrap()
    }

    fn approve() -> TxKind {
        TxKind::Approve {
            amount: ScaledAmount::from_u128(1_000_000, 6),
        }
    }

    #[tokio::test]
    async fn test_confirms_after_pending_polls() {
        let ledger = delayed_ledger(2);
        let holder = HOLDER.parse().unwrap();
        let receipt = submit_and_confirm(&ledger, &holder, approve(), &fast_poll(5))
            .await
            .unwrap();
        assert_eq!(receipt.kind, approve());
        assert_eq!(
            ledger.read_allowance(&holder).await.unwrap(),
            ScaledAmount::from_u128(1_000_000, 6)
        );
    }

    #[tokio::test]
    async fn test_times_out_when_attempts_run_out() {
        let ledger = delayed_ledger(3);
        let holder = HOLDER.parse().unwrap();
        let err = submit_and_confirm(&ledger, &holder, approve(), &fast_poll(2))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ConfirmationTimeout { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_revert_surfaces_reason() {
        let ledger = sample_ledger();
        let holder = HOLDER.parse().unwrap();
        let err = submit_and_confirm(&ledger, &holder, TxKind::Settle { option_id: 0 }, &fast_poll(1))
            .await
            .unwrap_err();
        match err {
            LedgerError::Reverted { reason, .. } => assert_eq!(reason, "option not yet expired"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_enumeration_skips_empty_and_stops_at_gap() {
        let mut file = sample_file();
        let mut empty = file.options[1].clone();
        empty.id = 2;
        empty.strike_price = "0".to_string();
        let mut after_empty = file.options[0].clone();
        after_empty.id = 3;
        let beyond_gap = OptionEntry {
            id: 5,
            ..file.options[0].clone()
        };
        file.options.extend([empty, after_empty, beyond_gap]);
        let ledger = SnapshotLedger::from_file(file).unwrap();

        let ids = list_option_ids(&ledger, 100).await.unwrap();
        assert_eq!(ids, vec![0, 1, 3]);

        let newest_first: Vec<u64> = list_options(&ledger, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(newest_first, vec![3, 1, 0]);

        // Probe limit bounds the walk
        let limited: Vec<u64> = list_options(&ledger, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(limited, vec![0]);
    }

    #[tokio::test]
    async fn test_snapshot_and_position() {
        let ledger = sample_ledger();
        let snapshot = fetch_market_snapshot(&ledger).await.unwrap();
        assert_eq!(snapshot.as_of, 1_700_000_000);
        assert_eq!(snapshot.total_liquidity, ScaledAmount::from_u128(110_160_000_000, 6));

        let holder: Identity = HOLDER.parse().unwrap();
        let position = fetch_position(&ledger, 0, &holder).await.unwrap();
        assert_eq!(position.lots.raw, option_model::U256::exp10(18));
    }

    #[test]
    fn test_format_tx_uses_full_hash_in_link() {
        let text = format_tx(&TxHandle(255), "https://coston2-explorer.flare.network");
        assert!(text.contains(&format!("0x{:064x}", 255)));
    }
}

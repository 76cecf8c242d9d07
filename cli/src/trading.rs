//! Option purchase, settlement and series creation

use anyhow::{Context, Result};
use colored::Colorize;
use option_model::{
    compute_payout_with, is_expired, validate_new_series, MarketSnapshot, OptionKind,
    PayoutResult, Position, ScaledAmount, SeriesParams,
};

use crate::client::{
    fetch_market_snapshot, fetch_position, format_expiry, format_tx, submit_and_confirm,
};
use crate::config::NetworkConfig;
use crate::cost::CostQuote;
use crate::display::{amount_field, field, header, parse_decimal_arg, print_sufficiency};
use crate::ledger::{OptionLedger, Receipt, TxKind};
use crate::payout::{formula_name, print_terms};
use crate::snapshot::SnapshotLedger;

fn print_receipt(config: &NetworkConfig, receipt: &Receipt) {
    let tx = match &config.explorer_url {
        Some(url) => format_tx(&receipt.handle, url),
        None => receipt.handle.to_string(),
    };
    field("Transaction", tx);
    field("Call", receipt.kind.label());
    field(
        "Block time",
        format!("{} ({})", format_expiry(receipt.block_time), receipt.block_time),
    );
}

/// `purchase <id> --lots N`: approve cost plus buffer, then buy
pub async fn purchase<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    option_id: u64,
    lots: &str,
) -> Result<()> {
    let conv = ledger.conventions();
    let holder = config.holder()?;
    let lots = parse_decimal_arg("--lots", lots, conv.asset_decimals)?;
    if lots.is_zero() {
        anyhow::bail!("--lots must be greater than 0");
    }

    let terms = ledger
        .read_option(option_id)
        .await
        .with_context(|| format!("Failed to read option {}", option_id))?;
    let now = ledger.block_time().await?;
    if is_expired(&terms, now) {
        anyhow::bail!(
            "Option {} expired at {}",
            option_id,
            format_expiry(terms.expiry)
        );
    }

    let balance = ledger.read_stable_balance(&holder).await?;
    let quote = CostQuote::evaluate(&conv, &terms, lots, Some(balance))?;

    header(&format!("Purchase Option {}", option_id));
    amount_field("Lots", quote.lots, "");
    amount_field("Cost", quote.cost, "USDC");
    amount_field("Approving", quote.approval, "USDC");
    if let Some((_, check)) = &quote.balance {
        print_sufficiency("Balance covers cost", check);
    }
    println!();

    submit_and_confirm(
        ledger,
        &holder,
        TxKind::Approve {
            amount: quote.approval,
        },
        &config.poll,
    )
    .await
    .context("Approval failed")?;
    let receipt = submit_and_confirm(
        ledger,
        &holder,
        TxKind::Purchase { option_id, lots },
        &config.poll,
    )
    .await
    .context("Purchase failed")?;

    // Lot size moved with the fill
    let terms = ledger.read_option(option_id).await?;
    let owned = ledger.read_ownership(option_id, &holder).await?;

    println!("\n{}", "Purchase complete".bright_green().bold());
    print_receipt(config, &receipt);
    if let Some(paid) = receipt.amount {
        amount_field("Paid", paid, "USDC");
    }
    amount_field("Your lots", owned, "");
    amount_field("Lots left in series", terms.lot_size, "");
    Ok(())
}

/// What `settle` expects the ledger to pay
#[derive(Debug, Clone, Copy)]
pub struct SettlePreview {
    pub position: Position,
    pub snapshot: MarketSnapshot,
    /// Under the ledger's own conventions, with the sufficiency check
    pub expected: PayoutResult,
    /// Under configured overrides, when they differ from the ledger's
    pub configured: Option<ScaledAmount>,
}

/// Check the position can be settled and preview the payout
pub async fn settle_preview<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    option_id: u64,
) -> Result<SettlePreview> {
    let conv = ledger.conventions();
    let holder = config.holder()?;

    let terms = ledger
        .read_option(option_id)
        .await
        .with_context(|| format!("Failed to read option {}", option_id))?;
    let position = fetch_position(ledger, option_id, &holder).await?;
    if position.lots.is_zero() {
        anyhow::bail!("{} holds no lots of option {}", holder, option_id);
    }

    let snapshot = fetch_market_snapshot(ledger).await?;
    if !is_expired(&terms, snapshot.as_of) {
        anyhow::bail!(
            "Option {} has not expired yet (expires {})",
            option_id,
            format_expiry(terms.expiry)
        );
    }

    let expected = compute_payout_with(&conv, &terms, snapshot.spot_price, &position)?
        .with_liquidity(&snapshot)?;
    let configured = if config.conventions != conv {
        Some(compute_payout_with(&config.conventions, &terms, snapshot.spot_price, &position)?.amount)
    } else {
        None
    };

    Ok(SettlePreview {
        position,
        snapshot,
        expected,
        configured,
    })
}

/// `settle <id>`: preview the payout, then settle the whole position
pub async fn settle<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    option_id: u64,
) -> Result<()> {
    let holder = config.holder()?;
    let preview = settle_preview(config, ledger, option_id).await?;

    header(&format!("Settle Option {}", option_id));
    amount_field("Lots", preview.position.lots, "");
    amount_field("Settlement price", preview.snapshot.spot_price, "USD");
    amount_field("Expected payout", preview.expected.amount, "USDC");
    if let Some(check) = &preview.expected.liquidity {
        print_sufficiency("Sufficient liquidity", check);
        if !check.sufficient {
            println!(
                "{}",
                "Submitting anyway; the ledger decides whether the payout can be made".yellow()
            );
        }
    }
    if let Some(configured) = preview.configured {
        amount_field(
            &format!(
                "Configured payout ({}, diagnostic)",
                formula_name(config.conventions.payout_formula)
            ),
            configured,
            "USDC",
        );
        println!("{}", "The ledger does not pay the configured figure".dimmed());
    }
    println!();

    let receipt = submit_and_confirm(
        ledger,
        &holder,
        TxKind::Settle { option_id },
        &config.poll,
    )
    .await
    .context("Settlement failed")?;

    let total = ledger.read_total_liquidity().await?;
    let balance = ledger.read_stable_balance(&holder).await?;

    println!("\n{}", "Settlement complete".bright_green().bold());
    print_receipt(config, &receipt);
    if let Some(paid) = receipt.amount {
        amount_field("Received", paid, "USDC");
    }
    amount_field("Your balance", balance, "USDC");
    amount_field("Pool liquidity", total, "USDC");
    Ok(())
}

/// Decimal inputs for `create`
#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub strike: String,
    pub lot_size: String,
    pub premium: String,
    /// Absolute unix expiry; otherwise `expires_in` from the current block
    pub expiry: Option<u64>,
    pub expires_in: u64,
    pub put: bool,
}

/// `create`: open a new series after the same checks the ledger applies
pub async fn create_option<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    args: &CreateArgs,
) -> Result<()> {
    let conv = ledger.conventions();
    let holder = config.holder()?;

    let now = ledger.block_time().await?;
    let expiry = match args.expiry {
        Some(e) => e,
        None => now
            .checked_add(args.expires_in)
            .context("--expires-in overflows the block clock")?,
    };
    if expiry <= now {
        anyhow::bail!("Expiry {} is not in the future", format_expiry(expiry));
    }

    let params = SeriesParams {
        strike_price: parse_decimal_arg("--strike", &args.strike, conv.asset_decimals)?,
        lot_size: parse_decimal_arg("--lot-size", &args.lot_size, conv.asset_decimals)?,
        premium: parse_decimal_arg("--premium", &args.premium, conv.asset_decimals)?,
        expiry,
        kind: OptionKind::from_is_call(!args.put),
    };

    let spot = ledger.read_latest_price().await?;
    validate_new_series(&conv, &params, Some(spot))
        .with_context(|| format!("Rejected at current price {} USD", spot))?;

    header("Create Option");
    field("Type", params.kind);
    amount_field("Strike price", params.strike_price, "USD");
    amount_field("Lot size", params.lot_size, "");
    amount_field("Premium", params.premium, "");
    field("Expiry", format_expiry(expiry));
    println!();

    let receipt = submit_and_confirm(ledger, &holder, TxKind::CreateOption(params), &config.poll)
        .await
        .context("Option creation failed")?;
    let option_id = receipt
        .option_id
        .context("Receipt did not report the new option id")?;

    println!("\n{}", "Option created".bright_green().bold());
    print_receipt(config, &receipt);
    field("Option ID", option_id);
    print_terms(&ledger.read_option(option_id).await?);
    Ok(())
}

/// `warp <secs>`: move the simulated block clock forward
pub async fn warp(ledger: &SnapshotLedger, secs: u64) -> Result<()> {
    let block_time = ledger.advance_time(secs).await;
    header("Warp");
    field("Advanced", format!("{}s", secs));
    field("Block time", format!("{} ({})", format_expiry(block_time), block_time));
    Ok(())
}

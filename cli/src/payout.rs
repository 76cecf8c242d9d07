//! Payout diagnostics: what settlement would pay and whether the pool covers it

use anyhow::{Context, Result};
use colored::Colorize;
use option_model::{
    check_sufficiency, is_expired, is_in_the_money, payout_breakdown, Conventions, Identity,
    MarketSnapshot, OptionKind, OptionTerms, PayoutBreakdown, PayoutFormula, ScaledAmount,
    Sufficiency,
};
use serde::Serialize;

use crate::client::{fetch_market_snapshot, fetch_position, format_expiry, warn_if_stale};
use crate::config::{FormulaChoice, NetworkConfig};
use crate::display::{
    amount_field, field, header, parse_raw_arg, print_json, print_sufficiency, section, yes_no,
    AmountView,
};
use crate::ledger::OptionLedger;

pub fn formula_name(formula: PayoutFormula) -> &'static str {
    match formula {
        PayoutFormula::Contract => "contract",
        PayoutFormula::Corrected => "corrected",
    }
}

fn other_formula(formula: PayoutFormula) -> PayoutFormula {
    match formula {
        PayoutFormula::Contract => PayoutFormula::Corrected,
        PayoutFormula::Corrected => PayoutFormula::Contract,
    }
}

/// One payout evaluation with everything needed to explain it
#[derive(Debug, Clone, Copy)]
pub struct PayoutPreview {
    pub kind: OptionKind,
    pub spot: ScaledAmount,
    pub breakdown: PayoutBreakdown,
    pub in_the_money: bool,
    /// Only known when evaluated against a ledger snapshot
    pub expired: Option<bool>,
    pub liquidity: Option<(ScaledAmount, Sufficiency)>,
}

impl PayoutPreview {
    pub fn evaluate(
        conv: &Conventions,
        terms: &OptionTerms,
        spot: ScaledAmount,
        lots: ScaledAmount,
        pool: Option<&MarketSnapshot>,
    ) -> Result<Self> {
        let breakdown = payout_breakdown(conv, terms, spot, lots)?;
        let liquidity = match pool {
            Some(p) => Some((p.total_liquidity, check_sufficiency(breakdown.amount, p)?)),
            None => None,
        };

        Ok(Self {
            kind: terms.kind,
            spot,
            breakdown,
            in_the_money: is_in_the_money(conv, terms, spot)?,
            expired: pool.map(|p| is_expired(terms, p.as_of)),
            liquidity,
        })
    }

    pub fn report(&self, option_id: Option<u64>) -> PayoutReport {
        let b = &self.breakdown;
        PayoutReport {
            option_id,
            kind: self.kind.to_string(),
            formula: formula_name(b.formula),
            expired: self.expired,
            in_the_money: self.in_the_money,
            spot: self.spot.into(),
            normalized_spot: b.normalized_spot.into(),
            normalized_strike: b.normalized_strike.into(),
            price_difference: b.price_difference.into(),
            lots: b.lots.into(),
            divisor_exp: b.divisor_exp,
            payout: b.amount.into(),
            total_liquidity: self.liquidity.map(|(total, _)| total.into()),
            sufficient: self.liquidity.map(|(_, s)| s.sufficient),
            shortfall: self.liquidity.map(|(_, s)| s.shortfall.into()),
        }
    }

    fn print(&self) {
        let b = &self.breakdown;
        section(&format!("Payout Calculation ({} formula)", formula_name(b.formula)));
        amount_field("Spot (normalized)", b.normalized_spot, "USD");
        amount_field("Strike (normalized)", b.normalized_strike, "USD");
        field("In the money", yes_no(self.in_the_money));
        amount_field("Price difference", b.price_difference, "USD");
        amount_field("Lots", b.lots, "");
        field(
            "Formula",
            format!("price_difference * lots / 10^{}", b.divisor_exp),
        );
        amount_field("Payout", b.amount, "USDC");

        if let Some((total, sufficiency)) = &self.liquidity {
            amount_field("Total liquidity", *total, "USDC");
            print_sufficiency("Sufficient liquidity", sufficiency);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutReport {
    pub option_id: Option<u64>,
    pub kind: String,
    pub formula: &'static str,
    pub expired: Option<bool>,
    pub in_the_money: bool,
    pub spot: AmountView,
    pub normalized_spot: AmountView,
    pub normalized_strike: AmountView,
    pub price_difference: AmountView,
    pub lots: AmountView,
    pub divisor_exp: u32,
    pub payout: AmountView,
    pub total_liquidity: Option<AmountView>,
    pub sufficient: Option<bool>,
    pub shortfall: Option<AmountView>,
}

fn conventions_for(config: &NetworkConfig, formula: Option<FormulaChoice>) -> Conventions {
    let mut conv = config.conventions;
    if let Some(f) = formula {
        conv.payout_formula = f.into();
    }
    conv
}

fn alternate(conv: &Conventions) -> Conventions {
    Conventions {
        payout_formula: other_formula(conv.payout_formula),
        ..*conv
    }
}

/// `payout <id>`: the holder's payout at the latest (or a given) price
pub async fn show_payout<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    option_id: u64,
    price: Option<String>,
    formula: Option<FormulaChoice>,
    compare: bool,
    json: bool,
) -> Result<()> {
    let conv = conventions_for(config, formula);
    let holder = config.holder()?;

    let terms = ledger
        .read_option(option_id)
        .await
        .with_context(|| format!("Failed to read option {}", option_id))?;
    let position = fetch_position(ledger, option_id, &holder).await?;
    let mut snapshot = fetch_market_snapshot(ledger).await?;

    match price {
        Some(raw) => snapshot.spot_price = parse_raw_arg("--price", &raw, conv.feed_decimals)?,
        None => warn_if_stale(&snapshot, config.max_snapshot_age_secs),
    }

    let preview = PayoutPreview::evaluate(
        &conv,
        &terms,
        snapshot.spot_price,
        position.lots,
        Some(&snapshot),
    )?;
    let comparison = if compare {
        Some(PayoutPreview::evaluate(
            &alternate(&conv),
            &terms,
            snapshot.spot_price,
            position.lots,
            Some(&snapshot),
        )?)
    } else {
        None
    };

    if json {
        let mut reports = vec![preview.report(Some(option_id))];
        reports.extend(comparison.map(|c| c.report(Some(option_id))));
        return print_json(&reports);
    }

    header(&format!("Option {} Payout", option_id));
    print_terms(&terms);
    print_position(&holder, position.lots);

    section("Contract State");
    amount_field("Total liquidity", snapshot.total_liquidity, "USDC");
    amount_field("Latest price", snapshot.spot_price, "USD");
    if let Some(expired) = preview.expired {
        field("Expired", yes_no(expired));
    }

    preview.print();
    if let Some(c) = &comparison {
        c.print();
    }

    if let Some((_, sufficiency)) = &preview.liquidity {
        if !sufficiency.sufficient {
            println!(
                "\n{}",
                "Settlement will revert until the pool holds the full payout".yellow()
            );
        }
    }
    Ok(())
}

pub(crate) fn print_terms(terms: &OptionTerms) {
    section("Option Details");
    field("Type", terms.kind);
    amount_field("Strike price", terms.strike_price, "USD");
    amount_field("Lots available", terms.lot_size, "");
    amount_field("Premium", terms.premium_constant, "");
    amount_field("K constant", terms.k_constant, "");
    field(
        "Expiry",
        format!("{} ({})", format_expiry(terms.expiry), terms.expiry),
    );
    field("Creator", terms.creator);
}

fn print_position(holder: &Identity, lots: ScaledAmount) {
    section("Your Position");
    field("Holder", holder);
    amount_field("Lot count", lots, "");
}

/// Literal inputs for `calc payout`
#[derive(Debug, Clone)]
pub struct PayoutInputs {
    /// Raw feed price at the feed scale
    pub spot: String,
    /// Raw strike at asset decimals
    pub strike: String,
    /// Raw lot count at asset decimals
    pub lots: String,
    pub put: bool,
    /// Raw pool liquidity at stablecoin decimals
    pub liquidity: Option<String>,
}

pub fn evaluate_inputs(conv: &Conventions, inputs: &PayoutInputs) -> Result<PayoutPreview> {
    let spot = parse_raw_arg("--spot", &inputs.spot, conv.feed_decimals)?;
    let terms = OptionTerms {
        strike_price: parse_raw_arg("--strike", &inputs.strike, conv.asset_decimals)?,
        lot_size: ScaledAmount::zero(conv.asset_decimals),
        premium_constant: ScaledAmount::zero(conv.asset_decimals),
        k_constant: ScaledAmount::zero(conv.asset_decimals * 2),
        expiry: 0,
        kind: OptionKind::from_is_call(!inputs.put),
        creator: Identity::default(),
    };
    let lots = parse_raw_arg("--lots", &inputs.lots, conv.asset_decimals)?;

    let pool = match &inputs.liquidity {
        Some(raw) => Some(MarketSnapshot {
            spot_price: spot,
            total_liquidity: parse_raw_arg("--liquidity", raw, conv.stable_decimals)?,
            as_of: 0,
        }),
        None => None,
    };

    let mut preview = PayoutPreview::evaluate(conv, &terms, spot, lots, pool.as_ref())?;
    // No expiry in literal inputs
    preview.expired = None;
    Ok(preview)
}

/// `calc payout`: the payout formula on literal raw values, no ledger
pub fn calc_payout(
    config: &NetworkConfig,
    inputs: &PayoutInputs,
    formula: Option<FormulaChoice>,
    compare: bool,
    json: bool,
) -> Result<()> {
    let conv = conventions_for(config, formula);
    let preview = evaluate_inputs(&conv, inputs)?;
    let comparison = if compare {
        Some(evaluate_inputs(&alternate(&conv), inputs)?)
    } else {
        None
    };

    if json {
        let mut reports = vec![preview.report(None)];
        reports.extend(comparison.map(|c| c.report(None)));
        return print_json(&reports);
    }

    header("Payout Calculator");
    field("Type", preview.kind);
    amount_field("Latest price", preview.spot, "USD");
    preview.print();
    if let Some(c) = &comparison {
        c.print();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use option_model::U256;

    fn golden_inputs() -> PayoutInputs {
        PayoutInputs {
            spot: "1804235".to_string(),
            strike: "800000000000000000000".to_string(),
            lots: "1000000000000000000".to_string(),
            put: false,
            liquidity: Some("110160000000".to_string()),
        }
    }

    #[test]
    fn test_contract_formula_on_debug_values() {
        let preview = evaluate_inputs(&Conventions::CONTRACT, &golden_inputs()).unwrap();
        let payout = U256::from_dec_str("1004235000000000000000000000").unwrap();

        assert_eq!(preview.breakdown.amount.raw, payout);
        assert_eq!(
            preview.breakdown.normalized_spot.raw,
            U256::from(1_804_235u64) * U256::exp10(15)
        );
        assert!(preview.in_the_money);

        let (_, sufficiency) = preview.liquidity.unwrap();
        assert!(!sufficiency.sufficient);
        assert_eq!(sufficiency.shortfall.raw, payout - U256::from(110_160_000_000u64));
    }

    #[test]
    fn test_corrected_formula_fits_the_pool() {
        let conv = alternate(&Conventions::CONTRACT);
        let preview = evaluate_inputs(&conv, &golden_inputs()).unwrap();

        // 1004.235 USDC for one lot
        assert_eq!(preview.breakdown.amount, ScaledAmount::from_u128(1_004_235_000, 6));
        assert!(preview.liquidity.unwrap().1.sufficient);
    }

    #[test]
    fn test_put_above_strike_pays_nothing() {
        let inputs = PayoutInputs {
            put: true,
            ..golden_inputs()
        };
        let preview = evaluate_inputs(&Conventions::CONTRACT, &inputs).unwrap();
        assert!(!preview.in_the_money);
        assert!(preview.breakdown.amount.is_zero());
        assert!(preview.liquidity.unwrap().1.sufficient);
    }

    #[test]
    fn test_report_serializes_raw_and_formatted() {
        let preview = evaluate_inputs(&Conventions::CONTRACT, &golden_inputs()).unwrap();
        let value = serde_json::to_value(preview.report(Some(0))).unwrap();

        assert_eq!(value["formula"], "contract");
        assert_eq!(value["kind"], "CALL");
        assert_eq!(value["payout"]["raw"], "1004235000000000000000000000");
        assert_eq!(value["payout"]["scale"], 6);
        assert_eq!(value["sufficient"], false);
        assert!(value["expired"].is_null());
    }

    #[test]
    fn test_rejects_decimal_text_for_raw_inputs() {
        let inputs = PayoutInputs {
            spot: "1804.235".to_string(),
            ..golden_inputs()
        };
        assert!(evaluate_inputs(&Conventions::CONTRACT, &inputs).is_err());
    }
}

//! Purchase cost diagnostics

use anyhow::{Context, Result};
use colored::Colorize;
use option_model::{
    approval_amount, check_balance, compute_current_cost_with, current_premium, Conventions,
    Identity, OptionKind, OptionTerms, ScaledAmount, Sufficiency,
};
use serde::Serialize;

use crate::config::NetworkConfig;
use crate::display::{
    amount_field, field, header, parse_decimal_arg, parse_raw_arg, print_json, print_sufficiency,
    AmountView,
};
use crate::ledger::OptionLedger;
use crate::payout::print_terms;

/// Cost of buying a number of lots at the current premium
#[derive(Debug, Clone, Copy)]
pub struct CostQuote {
    pub lots: ScaledAmount,
    pub available: ScaledAmount,
    /// `None` for a depleted series
    pub premium: Option<ScaledAmount>,
    pub cost: ScaledAmount,
    pub approval: ScaledAmount,
    pub balance: Option<(ScaledAmount, Sufficiency)>,
    pub cost_divisor_exp: u32,
}

impl CostQuote {
    pub fn evaluate(
        conv: &Conventions,
        terms: &OptionTerms,
        lots: ScaledAmount,
        balance: Option<ScaledAmount>,
    ) -> Result<Self> {
        let premium = if terms.lot_size.is_zero() {
            None
        } else {
            Some(ScaledAmount::new(current_premium(terms), conv.asset_decimals))
        };
        let cost = compute_current_cost_with(conv, terms, lots)?;
        let balance = match balance {
            Some(b) => Some((b, check_balance(b, cost)?)),
            None => None,
        };

        Ok(Self {
            lots: lots.normalize(conv.asset_decimals)?,
            available: terms.lot_size,
            premium,
            cost,
            approval: approval_amount(cost)?,
            balance,
            cost_divisor_exp: conv.cost_divisor_exp,
        })
    }

    pub fn exceeds_available(&self) -> bool {
        let scale = self.lots.scale.max(self.available.scale);
        match (self.lots.normalize(scale), self.available.normalize(scale)) {
            (Ok(lots), Ok(available)) => lots.raw > available.raw,
            _ => true,
        }
    }

    pub fn formula(&self) -> String {
        format!("(k / lot_size) * lots / 10^{}", self.cost_divisor_exp)
    }

    pub fn report(&self, option_id: Option<u64>) -> CostReport {
        CostReport {
            option_id,
            lots: self.lots.into(),
            lots_available: self.available.into(),
            premium_per_lot: self.premium.map(AmountView::from),
            cost: self.cost.into(),
            approval_amount: self.approval.into(),
            cost_divisor_exp: self.cost_divisor_exp,
            exceeds_available: self.exceeds_available(),
            balance: self.balance.map(|(b, _)| b.into()),
            balance_sufficient: self.balance.map(|(_, s)| s.sufficient),
            balance_shortfall: self.balance.map(|(_, s)| s.shortfall.into()),
        }
    }

    fn print(&self) {
        amount_field("Lots to buy", self.lots, "");
        match self.premium {
            Some(p) => amount_field("Current premium per lot", p, ""),
            None => field("Current premium per lot", "unavailable (no lots left)".yellow()),
        }
        field("Formula", self.formula());
        amount_field("Cost", self.cost, "USDC");
        amount_field("Approval amount (+50%)", self.approval, "USDC");

        if let Some((balance, check)) = &self.balance {
            amount_field("Stablecoin balance", *balance, "USDC");
            print_sufficiency("Balance covers cost", check);
        }
        if self.exceeds_available() {
            println!(
                "\n{}",
                "Requested lots exceed what the series has left; the purchase will revert".yellow()
            );
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CostReport {
    pub option_id: Option<u64>,
    pub lots: AmountView,
    pub lots_available: AmountView,
    pub premium_per_lot: Option<AmountView>,
    pub cost: AmountView,
    pub approval_amount: AmountView,
    pub cost_divisor_exp: u32,
    pub exceeds_available: bool,
    pub balance: Option<AmountView>,
    pub balance_sufficient: Option<bool>,
    pub balance_shortfall: Option<AmountView>,
}

/// `cost <id> --lots N`
pub async fn show_cost<L: OptionLedger>(
    config: &NetworkConfig,
    ledger: &L,
    option_id: u64,
    lots: &str,
    json: bool,
) -> Result<()> {
    let conv = config.conventions;
    let lots = parse_decimal_arg("--lots", lots, conv.asset_decimals)?;

    let terms = ledger
        .read_option(option_id)
        .await
        .with_context(|| format!("Failed to read option {}", option_id))?;
    let (balance, allowance) = match config.holder {
        Some(holder) => (
            Some(ledger.read_stable_balance(&holder).await?),
            Some(ledger.read_allowance(&holder).await?),
        ),
        None => (None, None),
    };

    let quote = CostQuote::evaluate(&conv, &terms, lots, balance)?;

    if json {
        return print_json(&quote.report(Some(option_id)));
    }

    header(&format!("Option {} Cost", option_id));
    print_terms(&terms);
    println!();
    quote.print();
    if let Some(allowance) = allowance {
        amount_field("Current allowance", allowance, "USDC");
        if !check_balance(allowance, quote.cost)?.sufficient {
            println!("{}", "Purchase will request a new approval first".dimmed());
        }
    }
    Ok(())
}

/// `calc cost`: the cost formula on literal values, no ledger
pub fn calc_cost(
    config: &NetworkConfig,
    k: &str,
    lot_size: &str,
    lots: &str,
    json: bool,
) -> Result<()> {
    let conv = config.conventions;
    let terms = OptionTerms {
        strike_price: ScaledAmount::zero(conv.asset_decimals),
        lot_size: parse_raw_arg("--lot-size", lot_size, conv.asset_decimals)?,
        premium_constant: ScaledAmount::zero(conv.asset_decimals),
        k_constant: parse_raw_arg("--k", k, conv.asset_decimals * 2)?,
        expiry: 0,
        kind: OptionKind::Call,
        creator: Identity::default(),
    };
    let lots = parse_decimal_arg("--lots", lots, conv.asset_decimals)?;
    let quote = CostQuote::evaluate(&conv, &terms, lots, None)?;

    if json {
        return print_json(&quote.report(None));
    }

    header("Cost Calculator");
    amount_field("Lots available", terms.lot_size, "");
    amount_field("K constant", terms.k_constant, "");
    quote.print();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use option_model::U256;

    fn e18(units: u128) -> ScaledAmount {
        ScaledAmount::new(U256::from(units) * U256::exp10(18), 18)
    }

    fn series(lot_size: ScaledAmount) -> OptionTerms {
        OptionTerms {
            strike_price: e18(2_000),
            lot_size,
            premium_constant: e18(5),
            // premium 5 * 10 lots
            k_constant: ScaledAmount::new(U256::from(50u8) * U256::exp10(36), 36),
            expiry: 1_800_000_000,
            kind: OptionKind::Call,
            creator: Identity::default(),
        }
    }

    #[test]
    fn test_quote_with_buffer_and_balance() {
        let conv = Conventions::CONTRACT;
        let balance = ScaledAmount::from_u128(12_000_000, 6);
        let quote = CostQuote::evaluate(&conv, &series(e18(10)), e18(2), Some(balance)).unwrap();

        assert_eq!(quote.premium, Some(e18(5)));
        assert_eq!(quote.cost, ScaledAmount::from_u128(10_000_000, 6));
        assert_eq!(quote.approval, ScaledAmount::from_u128(15_000_000, 6));
        assert!(quote.balance.unwrap().1.sufficient);
        assert!(!quote.exceeds_available());
    }

    #[test]
    fn test_depleted_series_costs_nothing_and_flags_unavailable() {
        let conv = Conventions::CONTRACT;
        let quote = CostQuote::evaluate(&conv, &series(ScaledAmount::zero(18)), e18(1), None).unwrap();

        assert!(quote.premium.is_none());
        assert!(quote.cost.is_zero());
        assert!(quote.exceeds_available());

        let report = serde_json::to_value(quote.report(Some(1))).unwrap();
        assert!(report["premium_per_lot"].is_null());
        assert_eq!(report["cost"]["raw"], "0");
    }

    #[test]
    fn test_short_balance_reports_shortfall() {
        let conv = Conventions::CONTRACT;
        let balance = ScaledAmount::from_u128(4_000_000, 6);
        let quote = CostQuote::evaluate(&conv, &series(e18(10)), e18(1), Some(balance)).unwrap();

        let (_, check) = quote.balance.unwrap();
        assert!(!check.sufficient);
        assert_eq!(check.shortfall, ScaledAmount::from_u128(1_000_000, 6));
    }

    #[test]
    fn test_formula_follows_configured_divisor() {
        let conv = Conventions {
            cost_divisor_exp: 31,
            ..Conventions::CONTRACT
        };
        let quote = CostQuote::evaluate(&conv, &series(e18(10)), e18(2), None).unwrap();

        assert_eq!(quote.formula(), "(k / lot_size) * lots / 10^31");
        assert_eq!(quote.cost, ScaledAmount::from_u128(1_000_000, 6));
        let report = serde_json::to_value(quote.report(None)).unwrap();
        assert_eq!(report["cost_divisor_exp"], 31);

        let contract = CostQuote::evaluate(&Conventions::CONTRACT, &series(e18(10)), e18(2), None)
            .unwrap();
        assert_eq!(contract.formula(), "(k / lot_size) * lots / 10^30");
    }
}

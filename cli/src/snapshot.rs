//! File-backed simulated ledger
//!
//! Holds a TOML capture of the AMM's on-chain values (the raw integers the
//! debugging scripts printed) and applies transactions to it with the same
//! arithmetic the contract uses. Lets every command run offline.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::{debug, info};
use option_model::{
    compute_current_cost_with, compute_payout_with, is_expired, validate_new_series,
    validate_scale, Conventions, Identity, ModelError, OptionKind, OptionTerms, Position,
    ScaledAmount, U256,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::ledger::{LedgerError, OptionLedger, Receipt, TxHandle, TxKind, TxStatus};

/// Scale of the `k` constant: premium (18) times lot size (18)
const K_SCALE: u32 = 36;

// ============================================================================
// File format
// ============================================================================

/// On-disk snapshot. Amounts are decimal strings of raw integers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SnapshotFile {
    /// Block timestamp of the capture; wall clock when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_time: Option<u64>,

    /// Status polls a transaction stays pending for
    #[serde(default)]
    pub confirmation_delay: u32,

    /// Raw stablecoin units (6 decimals)
    pub total_liquidity: String,

    pub price: PriceEntry,

    #[serde(default)]
    pub options: Vec<OptionEntry>,

    #[serde(default)]
    pub ownership: Vec<OwnershipEntry>,

    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PriceEntry {
    pub raw: String,
    pub decimals: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OptionEntry {
    pub id: u64,
    pub strike_price: String,
    pub lot_size: String,
    pub premium: String,
    pub k: String,
    pub expiry: u64,
    pub is_call: bool,
    pub creator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OwnershipEntry {
    pub option_id: u64,
    pub holder: String,
    pub lots: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AccountEntry {
    pub holder: String,
    #[serde(default = "zero_string")]
    pub stable_balance: String,
    #[serde(default = "zero_string")]
    pub allowance: String,
    #[serde(default = "zero_string")]
    pub contribution: String,
}

fn zero_string() -> String {
    "0".to_string()
}

fn parse_raw(field: &str, value: &str) -> Result<U256, LedgerError> {
    U256::from_dec_str(value.trim())
        .map_err(|_| LedgerError::Snapshot(format!("{}: not a raw integer: {:?}", field, value)))
}

fn parse_identity(field: &str, value: &str) -> Result<Identity, LedgerError> {
    value
        .parse()
        .map_err(|_| LedgerError::Snapshot(format!("{}: not an address: {:?}", field, value)))
}

// ============================================================================
// Ledger state
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Account {
    stable_balance: U256,
    allowance: U256,
    contribution: U256,
}

#[derive(Debug)]
struct PendingTx {
    polls_remaining: u32,
    outcome: Result<Receipt, String>,
}

#[derive(Debug)]
struct LedgerState {
    block_time: u64,
    confirmation_delay: u32,
    total_liquidity: U256,
    price: ScaledAmount,
    options: BTreeMap<u64, OptionTerms>,
    ownership: BTreeMap<(u64, Identity), U256>,
    accounts: BTreeMap<Identity, Account>,
    next_tx: u64,
    transactions: HashMap<TxHandle, PendingTx>,
}

fn revert(err: ModelError) -> String {
    err.to_string()
}

impl LedgerState {
    fn account_mut(&mut self, holder: &Identity) -> &mut Account {
        self.accounts.entry(*holder).or_default()
    }

    /// Pull `amount` of stablecoin from `holder` via allowance
    fn debit(&mut self, holder: &Identity, amount: U256) -> Result<(), String> {
        let current = self.accounts.get(holder).copied().unwrap_or_default();
        if current.allowance < amount {
            return Err("ERC20: insufficient allowance".to_string());
        }
        if current.stable_balance < amount {
            return Err("ERC20: transfer amount exceeds balance".to_string());
        }
        let account = self.account_mut(holder);
        account.allowance -= amount;
        account.stable_balance -= amount;
        Ok(())
    }

    fn next_option_id(&self) -> u64 {
        self.options.keys().next_back().map_or(0, |id| id + 1)
    }

    /// All checks run before the first mutation, so a revert leaves no trace.
    fn apply(
        &mut self,
        conv: &Conventions,
        sender: &Identity,
        handle: TxHandle,
        kind: TxKind,
    ) -> Result<Receipt, String> {
        let mut receipt = Receipt {
            handle,
            kind,
            block_time: self.block_time,
            amount: None,
            option_id: None,
        };

        match kind {
            TxKind::Approve { amount } => {
                let amount = amount.normalize(conv.stable_decimals).map_err(revert)?;
                self.account_mut(sender).allowance = amount.raw;
                receipt.amount = Some(amount);
            }
            TxKind::Purchase { option_id, lots } => {
                let terms = *self
                    .options
                    .get(&option_id)
                    .ok_or_else(|| "option does not exist".to_string())?;
                if is_expired(&terms, self.block_time) {
                    return Err("option expired".to_string());
                }
                let lots = lots.normalize(conv.asset_decimals).map_err(revert)?;
                if lots.is_zero() {
                    return Err("invalid lot amount".to_string());
                }
                if lots.raw > terms.lot_size.raw {
                    return Err("not enough lots available".to_string());
                }

                let cost = compute_current_cost_with(conv, &terms, lots).map_err(revert)?;
                self.debit(sender, cost.raw)?;
                self.total_liquidity += cost.raw;

                if let Some(t) = self.options.get_mut(&option_id) {
                    t.lot_size.raw -= lots.raw;
                }
                *self.ownership.entry((option_id, *sender)).or_default() += lots.raw;
                receipt.amount = Some(cost);
            }
            TxKind::Settle { option_id } => {
                let terms = *self
                    .options
                    .get(&option_id)
                    .ok_or_else(|| "option does not exist".to_string())?;
                let held = self
                    .ownership
                    .get(&(option_id, *sender))
                    .copied()
                    .unwrap_or_default();
                if held.is_zero() {
                    return Err("no options owned".to_string());
                }
                if !is_expired(&terms, self.block_time) {
                    return Err("option not yet expired".to_string());
                }

                let position = Position {
                    option_id,
                    holder: *sender,
                    lots: ScaledAmount::new(held, conv.asset_decimals),
                };
                let payout = compute_payout_with(conv, &terms, self.price, &position)
                    .map_err(revert)?
                    .amount;
                if payout.raw > self.total_liquidity {
                    return Err("insufficient liquidity".to_string());
                }

                self.total_liquidity -= payout.raw;
                self.account_mut(sender).stable_balance += payout.raw;
                self.ownership.remove(&(option_id, *sender));
                receipt.amount = Some(payout);
            }
            TxKind::AddLiquidity { amount } => {
                let amount = amount.normalize(conv.stable_decimals).map_err(revert)?;
                if amount.is_zero() {
                    return Err("amount must be greater than 0".to_string());
                }
                self.debit(sender, amount.raw)?;
                self.total_liquidity += amount.raw;
                self.account_mut(sender).contribution += amount.raw;
                receipt.amount = Some(amount);
            }
            TxKind::RemoveLiquidity { amount } => {
                let amount = amount.normalize(conv.stable_decimals).map_err(revert)?;
                let account = self.accounts.get(sender).copied().unwrap_or_default();
                if amount.is_zero() || account.contribution < amount.raw {
                    return Err("insufficient liquidity contribution".to_string());
                }
                if self.total_liquidity < amount.raw {
                    return Err("insufficient liquidity".to_string());
                }
                self.total_liquidity -= amount.raw;
                let account = self.account_mut(sender);
                account.contribution -= amount.raw;
                account.stable_balance += amount.raw;
                receipt.amount = Some(amount);
            }
            TxKind::CreateOption(params) => {
                validate_new_series(conv, &params, Some(self.price)).map_err(revert)?;
                let strike = params.strike_price.normalize(conv.asset_decimals).map_err(revert)?;
                let lot_size = params.lot_size.normalize(conv.asset_decimals).map_err(revert)?;
                let premium = params.premium.normalize(conv.asset_decimals).map_err(revert)?;
                let k = premium
                    .raw
                    .checked_mul(lot_size.raw)
                    .ok_or_else(|| revert(ModelError::Overflow))?;

                let id = self.next_option_id();
                self.options.insert(
                    id,
                    OptionTerms {
                        strike_price: strike,
                        lot_size,
                        premium_constant: premium,
                        k_constant: ScaledAmount::new(k, K_SCALE),
                        expiry: params.expiry,
                        kind: params.kind,
                        creator: *sender,
                    },
                );
                receipt.option_id = Some(id);
            }
            TxKind::RefreshPrice { fee } => {
                if fee.is_zero() {
                    return Err("price feed fee required".to_string());
                }
                receipt.amount = Some(self.price);
            }
        }

        Ok(receipt)
    }
}

// ============================================================================
// Public ledger
// ============================================================================

pub struct SnapshotLedger {
    conventions: Conventions,
    state: Mutex<LedgerState>,
}

impl SnapshotLedger {
    /// Load a snapshot from a TOML file
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let data = fs::read_to_string(path).map_err(|e| {
            LedgerError::Snapshot(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file: SnapshotFile = toml::from_str(&data).map_err(|e| {
            LedgerError::Snapshot(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        info!("Loaded ledger snapshot from {}", path.display());
        Self::from_file(file)
    }

    pub fn from_file(file: SnapshotFile) -> Result<Self, LedgerError> {
        let conv = Conventions::CONTRACT;

        let mut options = BTreeMap::new();
        for entry in &file.options {
            let terms = OptionTerms {
                strike_price: ScaledAmount::new(
                    parse_raw("strike_price", &entry.strike_price)?,
                    conv.asset_decimals,
                ),
                lot_size: ScaledAmount::new(parse_raw("lot_size", &entry.lot_size)?, conv.asset_decimals),
                premium_constant: ScaledAmount::new(
                    parse_raw("premium", &entry.premium)?,
                    conv.asset_decimals,
                ),
                k_constant: ScaledAmount::new(parse_raw("k", &entry.k)?, K_SCALE),
                expiry: entry.expiry,
                kind: OptionKind::from_is_call(entry.is_call),
                creator: parse_identity("creator", &entry.creator)?,
            };
            if options.insert(entry.id, terms).is_some() {
                return Err(LedgerError::Snapshot(format!("duplicate option id {}", entry.id)));
            }
        }

        let mut ownership = BTreeMap::new();
        for entry in &file.ownership {
            let holder = parse_identity("holder", &entry.holder)?;
            ownership.insert((entry.option_id, holder), parse_raw("lots", &entry.lots)?);
        }

        let mut accounts = BTreeMap::new();
        for entry in &file.accounts {
            accounts.insert(
                parse_identity("holder", &entry.holder)?,
                Account {
                    stable_balance: parse_raw("stable_balance", &entry.stable_balance)?,
                    allowance: parse_raw("allowance", &entry.allowance)?,
                    contribution: parse_raw("contribution", &entry.contribution)?,
                },
            );
        }

        let price_scale = validate_scale(file.price.decimals)?;
        let block_time = file
            .block_time
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);

        let state = LedgerState {
            block_time,
            confirmation_delay: file.confirmation_delay,
            total_liquidity: parse_raw("total_liquidity", &file.total_liquidity)?,
            price: ScaledAmount::new(parse_raw("price.raw", &file.price.raw)?, price_scale),
            options,
            ownership,
            accounts,
            next_tx: 1,
            transactions: HashMap::new(),
        };

        Ok(Self {
            conventions: conv,
            state: Mutex::new(state),
        })
    }

    /// Current state in file form
    pub async fn to_file(&self) -> SnapshotFile {
        let state = self.state.lock().await;

        SnapshotFile {
            block_time: Some(state.block_time),
            confirmation_delay: state.confirmation_delay,
            total_liquidity: state.total_liquidity.to_string(),
            price: PriceEntry {
                raw: state.price.raw.to_string(),
                decimals: state.price.scale as i64,
            },
            options: state
                .options
                .iter()
                .map(|(id, t)| OptionEntry {
                    id: *id,
                    strike_price: t.strike_price.raw.to_string(),
                    lot_size: t.lot_size.raw.to_string(),
                    premium: t.premium_constant.raw.to_string(),
                    k: t.k_constant.raw.to_string(),
                    expiry: t.expiry,
                    is_call: t.kind.is_call(),
                    creator: t.creator.to_string(),
                })
                .collect(),
            ownership: state
                .ownership
                .iter()
                .filter(|(_, lots)| !lots.is_zero())
                .map(|((option_id, holder), lots)| OwnershipEntry {
                    option_id: *option_id,
                    holder: holder.to_string(),
                    lots: lots.to_string(),
                })
                .collect(),
            accounts: state
                .accounts
                .iter()
                .map(|(holder, a)| AccountEntry {
                    holder: holder.to_string(),
                    stable_balance: a.stable_balance.to_string(),
                    allowance: a.allowance.to_string(),
                    contribution: a.contribution.to_string(),
                })
                .collect(),
        }
    }

    /// Write the current state back to `path`
    pub async fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let file = self.to_file().await;
        let text = toml::to_string_pretty(&file)
            .map_err(|e| LedgerError::Snapshot(format!("Failed to encode snapshot: {}", e)))?;
        fs::write(path, text).map_err(|e| {
            LedgerError::Snapshot(format!("Failed to write {}: {}", path.display(), e))
        })?;
        info!("Saved ledger snapshot to {}", path.display());
        Ok(())
    }

    /// Move the simulated block clock forward
    pub async fn advance_time(&self, secs: u64) -> u64 {
        let mut state = self.state.lock().await;
        state.block_time = state.block_time.saturating_add(secs);
        state.block_time
    }
}

impl OptionLedger for SnapshotLedger {
    fn conventions(&self) -> Conventions {
        self.conventions
    }

    async fn read_option(&self, id: u64) -> Result<OptionTerms, LedgerError> {
        let state = self.state.lock().await;
        state.options.get(&id).copied().ok_or(LedgerError::NotFound(id))
    }

    async fn read_ownership(&self, id: u64, holder: &Identity) -> Result<ScaledAmount, LedgerError> {
        let state = self.state.lock().await;
        let lots = state.ownership.get(&(id, *holder)).copied().unwrap_or_default();
        Ok(ScaledAmount::new(lots, self.conventions.asset_decimals))
    }

    async fn read_total_liquidity(&self) -> Result<ScaledAmount, LedgerError> {
        let state = self.state.lock().await;
        Ok(ScaledAmount::new(state.total_liquidity, self.conventions.stable_decimals))
    }

    async fn read_latest_price(&self) -> Result<ScaledAmount, LedgerError> {
        Ok(self.state.lock().await.price)
    }

    async fn read_contribution(&self, holder: &Identity) -> Result<ScaledAmount, LedgerError> {
        let state = self.state.lock().await;
        let account = state.accounts.get(holder).copied().unwrap_or_default();
        Ok(ScaledAmount::new(account.contribution, self.conventions.stable_decimals))
    }

    async fn read_stable_balance(&self, holder: &Identity) -> Result<ScaledAmount, LedgerError> {
        let state = self.state.lock().await;
        let account = state.accounts.get(holder).copied().unwrap_or_default();
        Ok(ScaledAmount::new(account.stable_balance, self.conventions.stable_decimals))
    }

    async fn read_allowance(&self, holder: &Identity) -> Result<ScaledAmount, LedgerError> {
        let state = self.state.lock().await;
        let account = state.accounts.get(holder).copied().unwrap_or_default();
        Ok(ScaledAmount::new(account.allowance, self.conventions.stable_decimals))
    }

    async fn block_time(&self) -> Result<u64, LedgerError> {
        Ok(self.state.lock().await.block_time)
    }

    async fn submit_transaction(
        &self,
        sender: &Identity,
        kind: TxKind,
    ) -> Result<TxHandle, LedgerError> {
        let mut state = self.state.lock().await;
        let handle = TxHandle(state.next_tx);
        state.next_tx += 1;

        let outcome = state.apply(&self.conventions, sender, handle, kind);
        match &outcome {
            Ok(_) => debug!("{} {} from {} applied", handle, kind.label(), sender),
            Err(reason) => debug!("{} {} from {} reverted: {}", handle, kind.label(), sender, reason),
        }

        let polls_remaining = state.confirmation_delay;
        state.transactions.insert(
            handle,
            PendingTx {
                polls_remaining,
                outcome,
            },
        );
        Ok(handle)
    }

    async fn transaction_status(&self, handle: &TxHandle) -> Result<TxStatus, LedgerError> {
        let mut state = self.state.lock().await;
        let tx = state
            .transactions
            .get_mut(handle)
            .ok_or(LedgerError::UnknownTransaction(*handle))?;

        if tx.polls_remaining > 0 {
            tx.polls_remaining -= 1;
            return Ok(TxStatus::Pending);
        }

        // Final status is reported once
        let tx = state
            .transactions
            .remove(handle)
            .ok_or(LedgerError::UnknownTransaction(*handle))?;
        Ok(match tx.outcome {
            Ok(receipt) => TxStatus::Confirmed(receipt),
            Err(reason) => TxStatus::Failed(reason),
        })
    }
}

//! Ledger connector: reads and writes against the options AMM contract
//!
//! The calculator never talks to the chain itself. Everything it needs comes
//! through an [`OptionLedger`], which the diagnostic commands are generic over.

use std::fmt;

use option_model::{Conventions, Identity, ModelError, OptionTerms, ScaledAmount, SeriesParams};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Option {0} not found")]
    NotFound(u64),

    #[error("Transaction {handle} reverted: {reason}")]
    Reverted { handle: TxHandle, reason: String },

    #[error("Transaction {handle} not confirmed after {attempts} attempts")]
    ConfirmationTimeout { handle: TxHandle, attempts: u32 },

    #[error("Unknown transaction {0}")]
    UnknownTransaction(TxHandle),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// State-changing calls on the AMM and its stablecoin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Stablecoin allowance for the AMM
    Approve { amount: ScaledAmount },
    Purchase { option_id: u64, lots: ScaledAmount },
    Settle { option_id: u64 },
    AddLiquidity { amount: ScaledAmount },
    RemoveLiquidity { amount: ScaledAmount },
    CreateOption(SeriesParams),
    /// `getLatestPrice` is payable: the feed read costs a fee
    RefreshPrice { fee: ScaledAmount },
}

impl TxKind {
    pub fn label(&self) -> &'static str {
        match self {
            TxKind::Approve { .. } => "approve",
            TxKind::Purchase { .. } => "purchaseOption",
            TxKind::Settle { .. } => "settleOption",
            TxKind::AddLiquidity { .. } => "addLiquidity",
            TxKind::RemoveLiquidity { .. } => "removeLiquidity",
            TxKind::CreateOption(_) => "createOption",
            TxKind::RefreshPrice { .. } => "getLatestPrice",
        }
    }
}

/// Handle returned by submission, printed as a transaction hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle(pub u64);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:064x}", self.0)
    }
}

/// Effects reported by a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub handle: TxHandle,
    pub kind: TxKind,
    pub block_time: u64,
    /// Stablecoin moved by the call (cost paid, payout received, liquidity moved)
    pub amount: Option<ScaledAmount>,
    /// Series id assigned by `createOption`
    pub option_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed(Receipt),
    Failed(String),
}

/// Read/write access to the options AMM.
///
/// Reads return the ledger's current values; nothing is cached. Callers
/// re-read terms and liquidity after every confirmed transaction.
#[allow(async_fn_in_trait)]
pub trait OptionLedger {
    /// Scales and divisors the ledger settles and charges with. Transaction
    /// flows quote with these, not with configured overrides.
    fn conventions(&self) -> Conventions;

    async fn read_option(&self, id: u64) -> Result<OptionTerms, LedgerError>;

    /// Lots of `id` held by `holder`; zero if none
    async fn read_ownership(&self, id: u64, holder: &Identity) -> Result<ScaledAmount, LedgerError>;

    async fn read_total_liquidity(&self) -> Result<ScaledAmount, LedgerError>;

    /// Last price published by the feed. Refreshing it is a paid
    /// [`TxKind::RefreshPrice`] transaction.
    async fn read_latest_price(&self) -> Result<ScaledAmount, LedgerError>;

    async fn read_contribution(&self, holder: &Identity) -> Result<ScaledAmount, LedgerError>;

    async fn read_stable_balance(&self, holder: &Identity) -> Result<ScaledAmount, LedgerError>;

    async fn read_allowance(&self, holder: &Identity) -> Result<ScaledAmount, LedgerError>;

    /// Timestamp of the latest block
    async fn block_time(&self) -> Result<u64, LedgerError>;

    async fn submit_transaction(&self, sender: &Identity, kind: TxKind)
        -> Result<TxHandle, LedgerError>;

    async fn transaction_status(&self, handle: &TxHandle) -> Result<TxStatus, LedgerError>;
}

//! optamm - Options AMM payout and cost diagnostics
//!
//! Previews what the options AMM contract pays on settlement and charges on
//! purchase, checks the pool can cover it, and drives the same flows against
//! a file-backed ledger snapshot.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod client;
mod config;
mod cost;
mod display;
mod ledger;
mod liquidity;
mod options;
mod payout;
mod positions;
mod price;
mod snapshot;
mod trading;

use config::{CliOverrides, FormulaChoice, NetworkConfig};
use snapshot::SnapshotLedger;

#[derive(Parser)]
#[command(name = "optamm")]
#[command(about = "Options AMM CLI - Preview payouts, costs and pool liquidity", long_about = None)]
#[command(version)]
struct Cli {
    /// Network preset (coston2, local)
    #[arg(short, long)]
    network: Option<String>,

    /// RPC URL (overrides network default)
    #[arg(short, long)]
    url: Option<String>,

    /// Config file (default: ~/.config/optamm/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ledger snapshot file
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Holder address used for positions and transactions
    #[arg(long)]
    holder: Option<String>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    /// Write the snapshot back after a state-changing command
    #[arg(long)]
    save: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show an option series
    #[command(name = "option")]
    Show {
        /// Option ID
        id: u64,
    },

    /// List all option series, newest first
    Options {
        /// Print only the listed ids, in probe order
        #[arg(long)]
        ids: bool,
    },

    /// List the holder's positions with their payout at the current price
    Positions,

    /// Show the holder's settlement payout and whether the pool covers it
    Payout {
        /// Option ID
        id: u64,

        /// Raw feed price to evaluate at (defaults to the latest price)
        #[arg(long)]
        price: Option<String>,

        /// Payout formula (contract, corrected)
        #[arg(long)]
        formula: Option<FormulaChoice>,

        /// Also evaluate the other formula
        #[arg(long)]
        compare: bool,
    },

    /// Show the cost of buying lots at the current premium
    Cost {
        /// Option ID
        id: u64,

        /// Lots to buy (decimal, e.g. 0.5)
        #[arg(long)]
        lots: String,
    },

    /// Show pool liquidity and the holder's share
    Liquidity,

    /// Show the latest feed price
    Price {
        /// Pay this raw fee to refresh the feed first
        #[arg(long)]
        fee: Option<String>,
    },

    /// Offline calculators on literal raw values
    Calc {
        #[command(subcommand)]
        command: CalcCommands,
    },

    /// Buy lots of an option series
    Purchase {
        /// Option ID
        id: u64,

        /// Lots to buy (decimal)
        #[arg(long)]
        lots: String,
    },

    /// Settle the holder's position in an expired series
    Settle {
        /// Option ID
        id: u64,
    },

    /// Deposit stablecoin into the pool
    AddLiquidity {
        /// Amount in USDC (decimal)
        amount: String,
    },

    /// Withdraw stablecoin from the pool
    RemoveLiquidity {
        /// Amount in USDC (decimal)
        amount: String,
    },

    /// Create a new option series
    Create {
        /// Strike price in USD (decimal)
        #[arg(long)]
        strike: String,

        /// Lots offered (decimal)
        #[arg(long)]
        lot_size: String,

        /// Premium per lot (decimal)
        #[arg(long)]
        premium: String,

        /// Absolute expiry (unix seconds)
        #[arg(long, conflicts_with = "expires_in")]
        expiry: Option<u64>,

        /// Expiry relative to the current block, in seconds
        #[arg(long, default_value = "86400")]
        expires_in: u64,

        /// Create a put (default is a call)
        #[arg(long)]
        put: bool,
    },

    /// Advance the snapshot's block clock
    Warp {
        /// Seconds to advance
        secs: u64,
    },
}

#[derive(Subcommand)]
enum CalcCommands {
    /// Payout formula on raw values
    Payout {
        /// Raw feed price (feed decimals)
        #[arg(long)]
        spot: String,

        /// Raw strike price (asset decimals)
        #[arg(long)]
        strike: String,

        /// Raw lot count (asset decimals)
        #[arg(long)]
        lots: String,

        /// Evaluate as a put
        #[arg(long)]
        put: bool,

        /// Raw pool liquidity (stablecoin decimals) for a sufficiency check
        #[arg(long)]
        liquidity: Option<String>,

        /// Payout formula (contract, corrected)
        #[arg(long)]
        formula: Option<FormulaChoice>,

        /// Also evaluate the other formula
        #[arg(long)]
        compare: bool,
    },

    /// Cost formula on raw values
    Cost {
        /// Raw k constant (premium times lot size)
        #[arg(long)]
        k: String,

        /// Raw lots remaining in the series (asset decimals)
        #[arg(long)]
        lot_size: String,

        /// Lots to buy (decimal)
        #[arg(long)]
        lots: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config = NetworkConfig::load(&CliOverrides {
        network: cli.network.clone(),
        rpc_url: cli.url.clone(),
        config: cli.config.clone(),
        snapshot: cli.snapshot.clone(),
        holder: cli.holder.clone(),
    })?;

    if cli.verbose {
        println!("{} {}", "Network:".bright_cyan(), config.network);
        println!("{} {}", "RPC URL:".bright_cyan(), config.rpc_url);
        println!("{} {}", "Chain ID:".bright_cyan(), config.chain_id);
        println!("{} {}", "Options AMM:".bright_cyan(), config.amm_address);
        println!("{} {}", "Stablecoin:".bright_cyan(), config.stable_address);
        println!("{} {}", "Snapshot:".bright_cyan(), config.snapshot_path.display());
        if let Some(holder) = &config.holder {
            println!("{} {}", "Holder:".bright_cyan(), holder);
        }
        println!();
    }

    // Calculators never touch the ledger
    if let Commands::Calc { command } = &cli.command {
        return match command {
            CalcCommands::Payout { spot, strike, lots, put, liquidity, formula, compare } => {
                let inputs = payout::PayoutInputs {
                    spot: spot.clone(),
                    strike: strike.clone(),
                    lots: lots.clone(),
                    put: *put,
                    liquidity: liquidity.clone(),
                };
                payout::calc_payout(&config, &inputs, *formula, *compare, cli.json)
            }
            CalcCommands::Cost { k, lot_size, lots } => {
                cost::calc_cost(&config, k, lot_size, lots, cli.json)
            }
        };
    }

    let ledger = SnapshotLedger::load(&config.snapshot_path).with_context(|| {
        format!(
            "Failed to open ledger snapshot {}",
            config.snapshot_path.display()
        )
    })?;

    let mut changed = true;
    match cli.command {
        Commands::Show { id } => {
            changed = false;
            options::show_option(&config, &ledger, id, cli.json).await?;
        }
        Commands::Options { ids } => {
            changed = false;
            if ids {
                options::show_option_ids(&config, &ledger, cli.json).await?;
            } else {
                options::show_options(&config, &ledger, cli.json).await?;
            }
        }
        Commands::Positions => {
            changed = false;
            positions::show_positions(&config, &ledger, cli.json).await?;
        }
        Commands::Payout { id, price, formula, compare } => {
            changed = false;
            payout::show_payout(&config, &ledger, id, price, formula, compare, cli.json).await?;
        }
        Commands::Cost { id, lots } => {
            changed = false;
            cost::show_cost(&config, &ledger, id, &lots, cli.json).await?;
        }
        Commands::Liquidity => {
            changed = false;
            liquidity::show_liquidity(&config, &ledger, cli.json).await?;
        }
        Commands::Price { fee } => {
            changed = fee.is_some();
            price::show_price(&config, &ledger, fee, cli.json).await?;
        }
        Commands::Purchase { id, lots } => {
            trading::purchase(&config, &ledger, id, &lots).await?;
        }
        Commands::Settle { id } => {
            trading::settle(&config, &ledger, id).await?;
        }
        Commands::AddLiquidity { amount } => {
            liquidity::add_liquidity(&config, &ledger, &amount).await?;
        }
        Commands::RemoveLiquidity { amount } => {
            liquidity::remove_liquidity(&config, &ledger, &amount).await?;
        }
        Commands::Create { strike, lot_size, premium, expiry, expires_in, put } => {
            let args = trading::CreateArgs {
                strike,
                lot_size,
                premium,
                expiry,
                expires_in,
                put,
            };
            trading::create_option(&config, &ledger, &args).await?;
        }
        Commands::Warp { secs } => {
            trading::warp(&ledger, secs).await?;
        }
        Commands::Calc { .. } => unreachable!("handled above"),
    }

    if changed {
        if cli.save {
            ledger.save(&config.snapshot_path).await?;
            println!(
                "\n{} {}",
                "Snapshot saved:".bright_green(),
                config.snapshot_path.display()
            );
        } else if !cli.json {
            println!(
                "\n{}",
                "Snapshot not saved (pass --save to persist)".dimmed()
            );
        }
    }

    Ok(())
}

//! Network configuration and config file handling

use anyhow::{Context, Result};
use option_model::{validate_scale, Conventions, Identity, PayoutFormula};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::client::PollConfig;

const DEFAULT_CONFIG_PATH: &str = "~/.config/optamm/config.toml";
const DEFAULT_SNAPSHOT_PATH: &str = "optamm-snapshot.toml";
const DEFAULT_MAX_OPTION_PROBE: u64 = 100;
const DEFAULT_MAX_SNAPSHOT_AGE_SECS: u64 = 300;

/// Payout formula as written on the command line or in a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaChoice {
    Contract,
    Corrected,
}

impl FromStr for FormulaChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contract" => Ok(FormulaChoice::Contract),
            "corrected" => Ok(FormulaChoice::Corrected),
            _ => Err(format!("Unknown formula: {}. Use contract or corrected", s)),
        }
    }
}

impl From<FormulaChoice> for PayoutFormula {
    fn from(choice: FormulaChoice) -> Self {
        match choice {
            FormulaChoice::Contract => PayoutFormula::Contract,
            FormulaChoice::Corrected => PayoutFormula::Corrected,
        }
    }
}

/// `config.toml` contents. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub network: Option<String>,
    pub rpc_url: Option<String>,
    pub amm_address: Option<String>,
    pub stable_address: Option<String>,
    pub holder: Option<String>,
    pub snapshot: Option<String>,
    pub max_option_probe: Option<u64>,
    pub max_snapshot_age_secs: Option<u64>,
    #[serde(default)]
    pub conventions: ConventionsSection,
    #[serde(default)]
    pub polling: PollingSection,
}

/// Scale overrides. Scales are signed here so negative values are
/// rejected with a clear error instead of a parse failure.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConventionsSection {
    pub stable_decimals: Option<i64>,
    pub asset_decimals: Option<i64>,
    pub feed_decimals: Option<i64>,
    pub canonical_scale: Option<i64>,
    pub payout_divisor_exp: Option<i64>,
    pub cost_divisor_exp: Option<i64>,
    pub payout_formula: Option<FormulaChoice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingSection {
    pub interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

impl ConventionsSection {
    fn apply(&self, base: Conventions) -> Result<Conventions> {
        let scale = |value: Option<i64>, current: u32, name: &str| -> Result<u32> {
            match value {
                Some(v) => validate_scale(v)
                    .map_err(|e| anyhow::anyhow!("conventions.{} = {}: {}", name, v, e)),
                None => Ok(current),
            }
        };

        Ok(Conventions {
            stable_decimals: scale(self.stable_decimals, base.stable_decimals, "stable_decimals")?,
            asset_decimals: scale(self.asset_decimals, base.asset_decimals, "asset_decimals")?,
            feed_decimals: scale(self.feed_decimals, base.feed_decimals, "feed_decimals")?,
            canonical_scale: scale(self.canonical_scale, base.canonical_scale, "canonical_scale")?,
            payout_divisor_exp: scale(
                self.payout_divisor_exp,
                base.payout_divisor_exp,
                "payout_divisor_exp",
            )?,
            cost_divisor_exp: scale(self.cost_divisor_exp, base.cost_divisor_exp, "cost_divisor_exp")?,
            payout_formula: self
                .payout_formula
                .map(PayoutFormula::from)
                .unwrap_or(base.payout_formula),
        })
    }
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub network: Option<String>,
    pub rpc_url: Option<String>,
    pub config: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
    pub holder: Option<String>,
}

pub struct NetworkConfig {
    pub network: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
    pub amm_address: Identity,
    pub stable_address: Identity,
    pub holder: Option<Identity>,
    pub snapshot_path: PathBuf,
    pub conventions: Conventions,
    pub poll: PollConfig,
    pub max_option_probe: u64,
    pub max_snapshot_age_secs: u64,
}

impl NetworkConfig {
    /// Resolve the config file (explicit path, else the default location if
    /// present) and merge the command-line overrides on top of it.
    pub fn load(overrides: &CliOverrides) -> Result<Self> {
        let file = match &overrides.config {
            Some(path) => FileConfig::load(&expand_path(path))?,
            None => {
                let default_path = PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).as_ref());
                if default_path.exists() {
                    FileConfig::load(&default_path)?
                } else {
                    FileConfig::default()
                }
            }
        };
        Self::from_parts(&file, overrides)
    }

    pub fn from_parts(file: &FileConfig, overrides: &CliOverrides) -> Result<Self> {
        let network = overrides
            .network
            .clone()
            .or_else(|| file.network.clone())
            .unwrap_or_else(|| "coston2".to_string());

        let (default_rpc, chain_id, explorer_url, amm, stable) = match network.as_str() {
            "coston2" => (
                "https://coston2-api.flare.network/ext/C/rpc",
                114,
                Some("https://coston2-explorer.flare.network"),
                "0x8889F62d45A1bcECf23b848f6783258eF82D0138",
                "0x468f701DdB6c1118148D710ff185A97bbFE39f37",
            ),
            "local" | "localhost" => (
                "http://127.0.0.1:8545",
                31337,
                None,
                "0x0000000000000000000000000000000000000000",
                "0x0000000000000000000000000000000000000000",
            ),
            _ => anyhow::bail!("Unknown network: {}. Use coston2 or local", network),
        };

        let rpc_url = overrides
            .rpc_url
            .clone()
            .or_else(|| file.rpc_url.clone())
            .unwrap_or_else(|| default_rpc.to_string());

        let amm_address = parse_address("amm_address", file.amm_address.as_deref().unwrap_or(amm))?;
        let stable_address =
            parse_address("stable_address", file.stable_address.as_deref().unwrap_or(stable))?;

        let holder = match overrides.holder.as_deref().or(file.holder.as_deref()) {
            Some(h) => Some(parse_address("holder", h)?),
            None => None,
        };

        let snapshot_path = match (&overrides.snapshot, &file.snapshot) {
            (Some(p), _) => expand_path(p),
            (None, Some(p)) => expand_path(Path::new(p)),
            (None, None) => PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        };

        let defaults = PollConfig::default();
        let poll = PollConfig {
            interval: file
                .polling
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            max_attempts: file.polling.max_attempts.unwrap_or(defaults.max_attempts),
        };
        if poll.max_attempts == 0 {
            anyhow::bail!("polling.max_attempts must be at least 1");
        }

        Ok(Self {
            network,
            rpc_url,
            chain_id,
            explorer_url: explorer_url.map(str::to_string),
            amm_address,
            stable_address,
            holder,
            snapshot_path,
            conventions: file.conventions.apply(Conventions::CONTRACT)?,
            poll,
            max_option_probe: file.max_option_probe.unwrap_or(DEFAULT_MAX_OPTION_PROBE),
            max_snapshot_age_secs: file
                .max_snapshot_age_secs
                .unwrap_or(DEFAULT_MAX_SNAPSHOT_AGE_SECS),
        })
    }

    /// Holder address; required by transaction commands
    pub fn holder(&self) -> Result<Identity> {
        self.holder.context(
            "No holder address configured. Pass --holder or set `holder` in the config file",
        )
    }
}

fn parse_address(field: &str, value: &str) -> Result<Identity> {
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid {} {:?}: {}", field, value, e))
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HOLDER: &str = "0xb862825240fC768515A26D09FAeB9Ab3236Df09e";

    #[test]
    fn test_default_network_is_coston2() {
        let config = NetworkConfig::from_parts(&FileConfig::default(), &CliOverrides::default())
            .unwrap();
        assert_eq!(config.network, "coston2");
        assert_eq!(config.chain_id, 114);
        assert_eq!(
            config.amm_address.to_string(),
            "0x8889f62d45a1bcecf23b848f6783258ef82d0138"
        );
        assert_eq!(config.conventions, Conventions::CONTRACT);
        assert_eq!(config.max_option_probe, 100);
        assert!(config.holder().is_err());
    }

    #[test]
    fn test_unknown_network_rejected() {
        let overrides = CliOverrides {
            network: Some("mainnet".to_string()),
            ..Default::default()
        };
        let err = NetworkConfig::from_parts(&FileConfig::default(), &overrides)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Unknown network"));
    }

    #[test]
    fn test_file_values_and_cli_precedence() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"
network = "local"
rpc_url = "http://10.0.0.2:8545"
holder = "{}"
max_option_probe = 12

[conventions]
payout_formula = "corrected"

[polling]
interval_ms = 250
max_attempts = 4
"#,
            HOLDER
        )
        .unwrap();

        let file = FileConfig::load(tmp.path()).unwrap();
        let overrides = CliOverrides {
            rpc_url: Some("http://127.0.0.1:9999".to_string()),
            ..Default::default()
        };
        let config = NetworkConfig::from_parts(&file, &overrides).unwrap();

        assert_eq!(config.network, "local");
        assert_eq!(config.rpc_url, "http://127.0.0.1:9999");
        assert_eq!(config.holder().unwrap(), HOLDER.parse::<Identity>().unwrap());
        assert_eq!(config.max_option_probe, 12);
        assert_eq!(config.conventions.payout_formula, PayoutFormula::Corrected);
        assert_eq!(config.conventions.payout_divisor_exp, 12);
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.poll.max_attempts, 4);
    }

    #[test]
    fn test_negative_scale_rejected() {
        let file: FileConfig = toml::from_str("[conventions]\nfeed_decimals = -3\n").unwrap();
        let err = NetworkConfig::from_parts(&file, &CliOverrides::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("conventions.feed_decimals"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<FileConfig>("keypair = \"id.json\"\n").is_err());
    }

    #[test]
    fn test_formula_from_str() {
        assert_eq!("Corrected".parse::<FormulaChoice>(), Ok(FormulaChoice::Corrected));
        assert!("fixed".parse::<FormulaChoice>().is_err());
    }
}

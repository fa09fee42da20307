//! # Node Configuration
//!
//! Everything the node needs to know that is not in the database: where to
//! listen, where to keep data, how to log, and (at `init` time only) how to
//! set up a fresh ledger.
//!
//! The file is TOML. `init` writes a default you can edit
//! before the first `run`:
//!
//! ```toml
//! [node]
//! data_dir = "./cashier-data"
//! bind = "127.0.0.1"
//! api_port = 9741
//! metrics_port = 9742
//! log_format = "pretty"
//! pow_search_limit = 50000000
//!
//! [ledger]
//! address = "0xc0c0..."
//! governance = "0x6060..."
//! fee_engine = "0xfefe..."
//! cashier_percentage = "1000000000000000"
//! engine_percentage = "1000000000000000"
//! decimals = 18
//! leading_zero_bytes = 1
//!
//! [asset]
//! address = "0xaaaa..."
//! symbol = "PMTN"
//! decimals = 18
//!
//! [trust_token]
//! address = "0x7777..."
//!
//! [[genesis.allocations]]
//! account = "0x1111..."
//! amount = "1000000000000000000000"
//! ```
//!
//! Amounts and percentages are decimal strings: TOML integers stop at
//! `i64::MAX`, which is smaller than a thousand 18-decimal units.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use cashier_contracts::fees::FeeConfiguration;
use cashier_protocol::config::{
    DEFAULT_ASSET_DECIMALS, DEFAULT_LEADING_ZERO_BYTES, DEFAULT_POW_SEARCH_LIMIT,
    FIXED_POINT_SCALE,
};
use cashier_protocol::types::{AccountId, Amount};

use crate::logging::LogFormat;

/// File name `init` writes inside the data directory.
pub const CONFIG_FILE_NAME: &str = "cashier.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub ledger: LedgerSection,
    pub asset: AssetSection,
    pub trust_token: TrustTokenSection,
    #[serde(default)]
    pub genesis: GenesisSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSection {
    pub data_dir: PathBuf,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Upper bound on relay-nonce attempts before giving up.
    #[serde(default = "default_search_limit")]
    pub pow_search_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSection {
    pub address: AccountId,
    pub governance: AccountId,
    pub fee_engine: AccountId,
    #[serde(with = "decimal")]
    pub cashier_percentage: u128,
    #[serde(with = "decimal")]
    pub engine_percentage: u128,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default = "default_leading_zero_bytes")]
    pub leading_zero_bytes: u8,
}

impl LedgerSection {
    pub fn fee_configuration(&self) -> FeeConfiguration {
        FeeConfiguration {
            cashier_percentage: self.cashier_percentage,
            engine_percentage: self.engine_percentage,
            decimals: self.decimals,
            leading_zero_bytes: self.leading_zero_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSection {
    pub address: AccountId,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustTokenSection {
    pub address: AccountId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisSection {
    #[serde(default)]
    pub allocations: Vec<Allocation>,
}

/// Settlement-asset units minted to an account at `init`, pre-approved for
/// the ledger to pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub account: AccountId,
    #[serde(with = "decimal")]
    pub amount: Amount,
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_api_port() -> u16 {
    9741
}

fn default_metrics_port() -> u16 {
    9742
}

fn default_search_limit() -> u64 {
    DEFAULT_POW_SEARCH_LIMIT
}

fn default_decimals() -> u8 {
    DEFAULT_ASSET_DECIMALS
}

fn default_leading_zero_bytes() -> u8 {
    DEFAULT_LEADING_ZERO_BYTES
}

impl NodeConfig {
    /// A devnet configuration rooted at `data_dir`: 0.1% to each side,
    /// one byte of relay work, no genesis allocations.
    pub fn devnet(data_dir: PathBuf) -> Self {
        let tenth_of_a_percent = FIXED_POINT_SCALE / 1000;
        Self {
            node: NodeSection {
                data_dir,
                bind: default_bind(),
                api_port: default_api_port(),
                metrics_port: default_metrics_port(),
                log_format: LogFormat::Pretty,
                pow_search_limit: DEFAULT_POW_SEARCH_LIMIT,
            },
            ledger: LedgerSection {
                address: AccountId::new([0xC0; 20]),
                governance: AccountId::new([0x60; 20]),
                fee_engine: AccountId::new([0xFE; 20]),
                cashier_percentage: tenth_of_a_percent,
                engine_percentage: tenth_of_a_percent,
                decimals: DEFAULT_ASSET_DECIMALS,
                leading_zero_bytes: DEFAULT_LEADING_ZERO_BYTES,
            },
            asset: AssetSection {
                address: AccountId::new([0xAA; 20]),
                symbol: "PMTN".into(),
                decimals: DEFAULT_ASSET_DECIMALS,
            },
            trust_token: TrustTokenSection {
                address: AccountId::new([0x77; 20]),
            },
            genesis: GenesisSection::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    pub fn db_path(&self) -> PathBuf {
        self.node.data_dir.join("db")
    }

    pub fn relay_key_path(&self) -> PathBuf {
        self.node.data_dir.join("relay.key")
    }
}

/// `u128` as a decimal string.
mod decimal {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.trim()
            .replace('_', "")
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid amount {text:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devnet_config_survives_toml() {
        let mut config = NodeConfig::devnet(PathBuf::from("/tmp/cashier"));
        config.genesis.allocations.push(Allocation {
            account: AccountId::new([0x11; 20]),
            amount: 1_000 * FIXED_POINT_SCALE,
        });
        let text = config.to_toml().unwrap();
        assert!(text.contains("amount = \"1000000000000000000000\""));
        assert_eq!(NodeConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let text = r#"
            [node]
            data_dir = "./data"

            [ledger]
            address = "0xc0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0"
            governance = "0x6060606060606060606060606060606060606060"
            fee_engine = "0xfefefefefefefefefefefefefefefefefefefefe"
            cashier_percentage = "1_000_000_000_000_000"
            engine_percentage = "0"

            [asset]
            address = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
            symbol = "PMTN"

            [trust_token]
            address = "0x7777777777777777777777777777777777777777"
        "#;
        let config = NodeConfig::from_toml(text).unwrap();
        assert_eq!(config.node.api_port, 9741);
        assert_eq!(config.node.log_format, LogFormat::Pretty);
        assert_eq!(config.ledger.cashier_percentage, 1_000_000_000_000_000);
        assert_eq!(config.ledger.fee_configuration().leading_zero_bytes, 1);
        assert!(config.genesis.allocations.is_empty());
    }

    #[test]
    fn bad_amount_is_rejected() {
        let mut text = NodeConfig::devnet(PathBuf::from("x")).to_toml().unwrap();
        text = text.replace("cashier_percentage = \"1000000000000000\"", "cashier_percentage = \"lots\"");
        assert!(NodeConfig::from_toml(&text).is_err());
    }
}

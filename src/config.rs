//! Configuration module for the relayer service.
//!
//! Configuration is a JSON file selected by `--config` / the `CONFIG`
//! environment variable. String fields may reference environment variables
//! (`$VAR` or `${VAR}`) which are resolved during deserialization, keeping
//! secrets out of the file itself.

use alloy_primitives::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Top-level service configuration.
///
/// Chain sections are optional: a deployment that never relays to a family
/// simply omits its section, and resolving a bridger for that family fails
/// at the task level.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    pub port: u16,
    #[serde(default = "config_defaults::default_host")]
    pub host: IpAddr,
    pub redis: RedisConfig,
    pub cosmos: CosmosConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub bouncer: BouncerConfig,
    #[serde(default)]
    pub horizon: Option<HorizonConfig>,
    #[serde(default)]
    pub evm: Option<EvmConfig>,
    #[serde(default)]
    pub solana: Option<SolanaConfig>,
    #[serde(default)]
    pub near: Option<NearConfig>,
    #[serde(default)]
    pub rarimo: Option<RarimoConfig>,
    pub secrets: SecretsConfig,
}

mod config_defaults {
    use std::net::{IpAddr, Ipv4Addr};

    pub fn default_port() -> u16 {
        8000
    }

    pub fn default_host() -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }

    pub fn default_bouncer_ttl_secs() -> u64 {
        3600
    }
}

/// Redis connection settings: queue and cursor persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: EnvValue<Url>,
}

/// Source-chain gRPC endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CosmosConfig {
    pub grpc: EnvValue<Url>,
}

/// Catch-up scheduler settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerConfig {
    /// Starting height when no cursor is persisted yet. Zero falls back
    /// to block 1.
    #[serde(default)]
    pub start_block: u64,
}

/// Admin API JWT gate settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BouncerConfig {
    #[serde(default)]
    pub skip_checks: bool,
    /// Lifetime of generated tokens, seconds.
    #[serde(default = "config_defaults::default_bouncer_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub signing_key: Option<EnvValue<String>>,
}

impl BouncerConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for BouncerConfig {
    fn default() -> Self {
        Self {
            skip_checks: false,
            ttl_secs: config_defaults::default_bouncer_ttl_secs(),
            signing_key: None,
        }
    }
}

/// NFT-metadata collaborator service.
#[derive(Debug, Clone, Deserialize)]
pub struct HorizonConfig {
    pub url: EnvValue<Url>,
}

/// EVM family configuration: one entry per destination chain.
#[derive(Debug, Clone, Deserialize)]
pub struct EvmConfig {
    pub chains: Vec<EvmChainConfig>,
}

impl EvmConfig {
    /// Looks up a chain entry by its bridge network name.
    pub fn chain_by_name(&self, name: &str) -> Option<&EvmChainConfig> {
        self.chains.iter().find(|chain| chain.name == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmChainConfig {
    /// Bridge network name, matching `transfer.to.chain`.
    pub name: String,
    pub chain_id: u64,
    pub bridge_facade_address: Address,
    pub bridge_address: Address,
    pub rpc: EnvValue<Url>,
}

/// Solana destination configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SolanaConfig {
    /// Bridge program id, base58.
    pub bridge_program_id: String,
    /// Bridge admin account, base58.
    pub bridge_admin: String,
    /// 32-byte admin seed, 0x-hex.
    pub bridge_admin_seed: String,
    pub rpc: EnvValue<Url>,
    #[serde(default)]
    pub ws: Option<EnvValue<Url>>,
}

/// NEAR destination configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NearConfig {
    /// Bridge contract account id.
    pub bridge_address: String,
    pub rpc: EnvValue<Url>,
}

/// Source-chain (home) destination configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RarimoConfig {
    pub gas_limit: u64,
    pub min_gas_price: u64,
    /// Fee denom.
    pub coin: String,
    pub chain_id: String,
}

/// Where the signing key material comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SecretsConfig {
    /// Vault KV v2: the secret at `{mount}/data/{path}` holds the same JSON
    /// shape as the inline variant.
    Vault(VaultConfig),
    Inline(InlineSecrets),
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    pub address: EnvValue<Url>,
    pub mount: String,
    pub path: String,
    pub token: EnvValue<String>,
}

/// Raw secret material as it appears in config or in the Vault payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InlineSecrets {
    /// Chain name → 0x-hex EVM private key.
    #[serde(default)]
    pub evm: HashMap<String, EnvValue<String>>,
    /// Base58-encoded Solana keypair.
    #[serde(default)]
    pub solana: Option<EnvValue<String>>,
    #[serde(default)]
    pub near: Option<NearSecret>,
    #[serde(default)]
    pub rarimo: Option<RarimoSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NearSecret {
    pub account_id: String,
    /// `ed25519:<base58>` secret key.
    pub secret_key: EnvValue<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RarimoSecret {
    /// Bech32 account address of the signer.
    pub address: String,
    /// 0x-hex secp256k1 private key.
    pub private_key: EnvValue<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

impl Config {
    /// Loads and parses the configuration file, resolving `$VAR` references.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// A config value that may name an environment variable instead of
/// carrying a literal.
///
/// Endpoints and key material stay out of the config file: an operator
/// writes `"$REDIS_URL"` or `"${VAULT_TOKEN}"` and the reference is
/// swapped for the variable's content while the file is deserialized, so
/// the rest of the service only ever sees resolved values. Anything that
/// is not a reference parses as a literal of the target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvValue<T>(T);

impl<T> EnvValue<T> {
    /// Wraps an already-resolved value. Tests and hand-built configs use
    /// this; file loading goes through deserialization.
    pub fn literal(value: T) -> Self {
        Self(value)
    }

    /// The resolved value.
    pub fn value(&self) -> &T {
        &self.0
    }
}

/// The variable name when `raw` is written as `$NAME` or `${NAME}`.
/// Anything else, including `$` followed by non-identifier characters,
/// is treated as a literal.
fn env_reference(raw: &str) -> Option<&str> {
    if let Some(braced) = raw.strip_prefix("${") {
        return braced.strip_suffix('}');
    }
    let bare = raw.strip_prefix('$')?;
    let is_name =
        !bare.is_empty() && bare.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    is_name.then_some(bare)
}

impl<'de, T> Deserialize<'de> for EnvValue<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let raw = String::deserialize(deserializer)?;
        let resolved = match env_reference(&raw) {
            Some(name) => std::env::var(name).map_err(|_| {
                D::Error::custom(format!("config references env var {name}, which is not set"))
            })?,
            None => raw,
        };
        resolved
            .parse()
            .map(EnvValue)
            .map_err(|err| D::Error::custom(format!("unusable config value: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "port": 8090,
            "redis": { "url": "redis://127.0.0.1:6379/0" },
            "cosmos": { "grpc": "http://127.0.0.1:9090" },
            "scheduler": { "start_block": 42 },
            "bouncer": { "skip_checks": true, "ttl_secs": 60 },
            "evm": {
                "chains": [
                    {
                        "name": "Ethereum",
                        "chain_id": 1,
                        "bridge_facade_address": "0x00000000000000000000000000000000000000aa",
                        "bridge_address": "0x00000000000000000000000000000000000000bb",
                        "rpc": "https://eth.example.com"
                    }
                ]
            },
            "secrets": {
                "source": "inline",
                "evm": {
                    "Ethereum": "0x0101010101010101010101010101010101010101010101010101010101010101"
                }
            }
        }"#
    }

    #[test]
    fn parses_full_config() {
        let config: Config = serde_json::from_str(sample()).expect("config parses");
        assert_eq!(config.port, 8090);
        assert_eq!(config.scheduler.start_block, 42);
        assert!(config.bouncer.skip_checks);
        assert_eq!(config.bouncer.ttl(), Duration::from_secs(60));
        let evm = config.evm.expect("evm section");
        let chain = evm.chain_by_name("Ethereum").expect("Ethereum entry");
        assert_eq!(chain.chain_id, 1);
        assert!(evm.chain_by_name("Gnosis").is_none());
        match config.secrets {
            SecretsConfig::Inline(secrets) => {
                assert!(secrets.evm.contains_key("Ethereum"));
            }
            SecretsConfig::Vault(_) => panic!("expected inline secrets"),
        }
    }

    #[test]
    fn missing_sections_default() {
        let config: Config = serde_json::from_str(
            r#"{
                "redis": { "url": "redis://localhost" },
                "cosmos": { "grpc": "http://localhost:9090" },
                "secrets": { "source": "inline" }
            }"#,
        )
        .expect("minimal config parses");
        assert_eq!(config.port, 8000);
        assert_eq!(config.scheduler.start_block, 0);
        assert!(!config.bouncer.skip_checks);
        assert!(config.evm.is_none());
        assert!(config.near.is_none());
    }

    #[test]
    fn env_reference_detection() {
        assert_eq!(env_reference("$REDIS_URL"), Some("REDIS_URL"));
        assert_eq!(env_reference("${REDIS_URL}"), Some("REDIS_URL"));
        assert_eq!(env_reference("redis://localhost"), None);
        assert_eq!(env_reference("$"), None);
        assert_eq!(env_reference("$not-a-name"), None);
        assert_eq!(env_reference("${unterminated"), None);
    }
}

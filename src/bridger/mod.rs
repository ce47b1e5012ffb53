//! Chain-dispatch withdrawal executors.
//!
//! A bridger turns an assembled [`TransferDetails`] into a destination
//! transaction: probe idempotency, build the withdrawal by token type,
//! sign, broadcast, await confirmation. One implementation per chain
//! family; [`BridgerProvider`] resolves and memoizes them by chain name.

pub mod evm;
pub mod near;
pub mod rarimo;
pub mod solana;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::Config;
use crate::core::{SourceChain, SourceChainError, TransferDetails};
use crate::horizon::{Horizon, HorizonError};
use crate::proto::tokenmanager::TokenType;
use crate::secrets::Secrets;

/// Chain name of the Solana destination.
pub const SOLANA: &str = "Solana";
/// Chain name of the NEAR destination.
pub const NEAR: &str = "Near";
/// Chain name of the source chain itself.
pub const RARIMO: &str = "Rarimo";

#[derive(Debug, thiserror::Error)]
pub enum BridgerError {
    /// The destination contract already consumed this origin. Success from
    /// the relayer's perspective.
    #[error("transfer was already withdrawn")]
    AlreadyWithdrawn,
    #[error("unknown chain {0}")]
    UnknownChain(String),
    #[error("chain family {0} is not configured")]
    NotConfigured(&'static str),
    #[error("token type {token_type:?} is not supported on {family}")]
    UnsupportedTokenType {
        family: &'static str,
        token_type: TokenType,
    },
    #[error("failed to encode {context}: {reason}")]
    Encode {
        context: &'static str,
        reason: String,
    },
    #[error("destination transaction failed: {0}")]
    TransactionFailed(String),
    #[error("{context}: {reason}")]
    Rpc {
        context: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Client(#[from] SourceChainError),
    #[error(transparent)]
    Horizon(#[from] HorizonError),
}

impl BridgerError {
    pub(crate) fn encode(context: &'static str, reason: impl ToString) -> Self {
        Self::Encode {
            context,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn rpc(context: &'static str, reason: impl ToString) -> Self {
        Self::Rpc {
            context,
            reason: reason.to_string(),
        }
    }

    /// Permanent errors are rejected without a retry: no amount of
    /// re-delivery fixes an unknown chain or an unpackable payload. The
    /// retry policy hangs off this seam.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            BridgerError::UnknownChain(_)
                | BridgerError::NotConfigured(_)
                | BridgerError::UnsupportedTokenType { .. }
                | BridgerError::Encode { .. }
        )
    }
}

/// A chain-family withdrawal executor.
#[async_trait]
pub trait Bridger: Send + Sync {
    /// Submits the withdrawal, or returns
    /// [`BridgerError::AlreadyWithdrawn`] when the destination reports the
    /// origin as consumed.
    async fn withdraw(&self, transfer: &TransferDetails) -> Result<(), BridgerError>;
}

impl std::fmt::Debug for dyn Bridger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dyn Bridger")
    }
}

/// Chain-name → executor resolution, the seam consumers depend on.
pub trait BridgerResolver: Send + Sync {
    fn resolve(&self, chain: &str) -> Result<Arc<dyn Bridger>, BridgerError>;
}

/// Pluggable EVM-family membership predicate.
pub type IsEvm = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Lazy, memoized chain → bridger mapping. Cache lifetime is the process
/// lifetime; the map is mutex-guarded for the lazy population.
pub struct BridgerProvider {
    config: Arc<Config>,
    secrets: Arc<Secrets>,
    client: Arc<dyn SourceChain>,
    horizon: Option<Arc<Horizon>>,
    is_evm: IsEvm,
    bridgers: Mutex<HashMap<String, Arc<dyn Bridger>>>,
}

impl BridgerProvider {
    pub fn new(
        config: Arc<Config>,
        secrets: Arc<Secrets>,
        client: Arc<dyn SourceChain>,
        horizon: Option<Arc<Horizon>>,
    ) -> Self {
        let evm_chains: Vec<String> = config
            .evm
            .as_ref()
            .map(|evm| evm.chains.iter().map(|chain| chain.name.clone()).collect())
            .unwrap_or_default();
        let is_evm: IsEvm = Box::new(move |chain| evm_chains.iter().any(|name| name == chain));
        Self::with_classifier(config, secrets, client, horizon, is_evm)
    }

    /// Same as [`BridgerProvider::new`] with a custom EVM classifier.
    pub fn with_classifier(
        config: Arc<Config>,
        secrets: Arc<Secrets>,
        client: Arc<dyn SourceChain>,
        horizon: Option<Arc<Horizon>>,
        is_evm: IsEvm,
    ) -> Self {
        Self {
            config,
            secrets,
            client,
            horizon,
            is_evm,
            bridgers: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the executor for a chain, instantiating it on first use.
    pub fn get_bridger(&self, chain: &str) -> Result<Arc<dyn Bridger>, BridgerError> {
        let mut bridgers = self.bridgers.lock().expect("bridger registry lock");
        if let Some(bridger) = bridgers.get(chain) {
            return Ok(bridger.clone());
        }

        let bridger: Arc<dyn Bridger> = if (self.is_evm)(chain) {
            Arc::new(evm::EvmBridger::new(self.config.clone(), self.secrets.clone())?)
        } else if chain == SOLANA {
            Arc::new(solana::SolanaBridger::new(
                self.config.clone(),
                self.secrets.clone(),
            )?)
        } else if chain == NEAR {
            Arc::new(near::NearBridger::new(
                self.config.clone(),
                self.secrets.clone(),
                self.horizon.clone(),
            )?)
        } else if chain == RARIMO {
            Arc::new(rarimo::RarimoBridger::new(
                self.config.clone(),
                self.secrets.clone(),
                self.client.clone(),
            )?)
        } else {
            return Err(BridgerError::UnknownChain(chain.to_owned()));
        };

        bridgers.insert(chain.to_owned(), bridger.clone());
        Ok(bridger)
    }
}

impl BridgerResolver for BridgerProvider {
    fn resolve(&self, chain: &str) -> Result<Arc<dyn Bridger>, BridgerError> {
        self.get_bridger(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretsConfig;
    use crate::core::client::mock::MockSourceChain;

    fn provider() -> BridgerProvider {
        let config: Config = serde_json::from_str(
            r#"{
                "redis": { "url": "redis://localhost" },
                "cosmos": { "grpc": "http://localhost:9090" },
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
            }"#,
        )
        .expect("config");
        let secrets = match &config.secrets {
            SecretsConfig::Inline(_) => {
                futures::executor::block_on(Secrets::load(&config.secrets)).expect("secrets")
            }
            SecretsConfig::Vault(_) => unreachable!(),
        };
        BridgerProvider::new(
            Arc::new(config),
            Arc::new(secrets),
            Arc::new(MockSourceChain::default()),
            None,
        )
    }

    #[test]
    fn classifies_configured_evm_chains() {
        let provider = provider();
        assert!((provider.is_evm)("Ethereum"));
        assert!(!(provider.is_evm)("Solana"));
        assert!(!(provider.is_evm)("Gnosis"));
    }

    #[test]
    fn unknown_chain_is_an_error() {
        let provider = provider();
        let err = provider.get_bridger("Tron").expect_err("unknown chain");
        assert!(matches!(err, BridgerError::UnknownChain(ref chain) if chain == "Tron"));
        assert!(err.is_permanent());
    }

    #[test]
    fn memoizes_resolved_bridgers() {
        let provider = provider();
        let first = provider.get_bridger("Ethereum").expect("evm bridger");
        let second = provider.get_bridger("Ethereum").expect("evm bridger");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unconfigured_family_is_permanent() {
        let provider = provider();
        let err = provider.get_bridger(SOLANA).expect_err("no solana config");
        assert!(matches!(err, BridgerError::NotConfigured("solana")));
        assert!(err.is_permanent());
    }

    #[test]
    fn already_withdrawn_is_not_permanent() {
        assert!(!BridgerError::AlreadyWithdrawn.is_permanent());
    }
}

//! Signing key material.
//!
//! Secrets load once at startup, either inline from the (env-resolved)
//! config or from a Vault KV v2 secret whose payload carries the same JSON
//! shape. After loading they are read-only and shared by handle.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy_signer_local::PrivateKeySigner;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use k256::ecdsa::SigningKey as Secp256k1SigningKey;
use serde::Deserialize;
use solana_keypair::Keypair;

use crate::config::{InlineSecrets, SecretsConfig, VaultConfig};

#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("vault request failed: {0}")]
    Vault(#[from] reqwest::Error),
    #[error("vault returned status {0}")]
    VaultStatus(reqwest::StatusCode),
    #[error("invalid {field} secret: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

fn invalid(field: &'static str, reason: impl ToString) -> SecretsError {
    SecretsError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// NEAR account credentials.
pub struct NearKeys {
    pub account_id: String,
    pub signing_key: Ed25519SigningKey,
}

/// Home-chain signer: the bech32 address is supplied with the key so the
/// relayer never re-derives it.
pub struct RarimoKeys {
    pub address: String,
    pub signing_key: Secp256k1SigningKey,
}

/// Typed, validated signing material for every configured chain family.
pub struct Secrets {
    evm: HashMap<String, PrivateKeySigner>,
    solana: Option<Arc<Keypair>>,
    near: Option<NearKeys>,
    rarimo: Option<RarimoKeys>,
}

impl Secrets {
    /// Loads secrets per the config: inline or through Vault.
    pub async fn load(config: &SecretsConfig) -> Result<Self, SecretsError> {
        let inline = match config {
            SecretsConfig::Inline(inline) => inline.clone(),
            SecretsConfig::Vault(vault) => read_vault(vault).await?,
        };
        Self::from_inline(&inline)
    }

    fn from_inline(inline: &InlineSecrets) -> Result<Self, SecretsError> {
        let mut evm = HashMap::new();
        for (chain, key) in &inline.evm {
            let signer = PrivateKeySigner::from_str(key.value())
                .map_err(|err| invalid("evm private key", err))?;
            evm.insert(chain.clone(), signer);
        }

        let solana = inline
            .solana
            .as_ref()
            .map(|key| {
                // from_base58_string panics on malformed input; go through
                // the byte path so a bad secret is a startup error.
                let bytes = bs58::decode(key.value())
                    .into_vec()
                    .map_err(|err| invalid("solana keypair", err))?;
                Keypair::try_from(bytes.as_slice())
                    .map(Arc::new)
                    .map_err(|err| invalid("solana keypair", err))
            })
            .transpose()?;

        let near = inline
            .near
            .as_ref()
            .map(|near| {
                let signing_key = parse_near_secret_key(near.secret_key.value())?;
                Ok::<_, SecretsError>(NearKeys {
                    account_id: near.account_id.clone(),
                    signing_key,
                })
            })
            .transpose()?;

        let rarimo = inline
            .rarimo
            .as_ref()
            .map(|rarimo| {
                let stripped = rarimo
                    .private_key
                    .value()
                    .strip_prefix("0x")
                    .unwrap_or(rarimo.private_key.value());
                let bytes =
                    hex::decode(stripped).map_err(|err| invalid("rarimo private key", err))?;
                let signing_key = Secp256k1SigningKey::from_slice(&bytes)
                    .map_err(|err| invalid("rarimo private key", err))?;
                Ok::<_, SecretsError>(RarimoKeys {
                    address: rarimo.address.clone(),
                    signing_key,
                })
            })
            .transpose()?;

        Ok(Self {
            evm,
            solana,
            near,
            rarimo,
        })
    }

    /// Per-chain EVM signer.
    pub fn evm_signer(&self, chain: &str) -> Option<&PrivateKeySigner> {
        self.evm.get(chain)
    }

    pub fn solana_keypair(&self) -> Option<Arc<Keypair>> {
        self.solana.clone()
    }

    pub fn near_keys(&self) -> Option<&NearKeys> {
        self.near.as_ref()
    }

    pub fn rarimo_keys(&self) -> Option<&RarimoKeys> {
        self.rarimo.as_ref()
    }
}

/// Parses the `ed25519:<base58>` secret key convention. The decoded blob
/// is the 64-byte seed+public concatenation; the seed alone also works.
fn parse_near_secret_key(raw: &str) -> Result<Ed25519SigningKey, SecretsError> {
    let encoded = raw.strip_prefix("ed25519:").unwrap_or(raw);
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|err| invalid("near secret key", err))?;
    let seed: [u8; 32] = match bytes.len() {
        64 | 32 => bytes[..32]
            .try_into()
            .expect("slice of checked length"),
        other => {
            return Err(invalid(
                "near secret key",
                format!("expected 32 or 64 bytes, got {other}"),
            ));
        }
    };
    Ok(Ed25519SigningKey::from_bytes(&seed))
}

#[derive(Deserialize)]
struct VaultKvResponse {
    data: VaultKvData,
}

#[derive(Deserialize)]
struct VaultKvData {
    data: InlineSecrets,
}

/// Reads the secret payload from Vault KV v2.
async fn read_vault(config: &VaultConfig) -> Result<InlineSecrets, SecretsError> {
    let url = format!(
        "{}v1/{}/data/{}",
        config.address.value(),
        config.mount,
        config.path
    );
    let response = reqwest::Client::new()
        .get(url)
        .header("X-Vault-Token", config.token.value())
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(SecretsError::VaultStatus(response.status()));
    }
    let payload: VaultKvResponse = response.json().await?;
    Ok(payload.data.data)
}

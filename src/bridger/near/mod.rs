//! NEAR withdrawal executor.
//!
//! Withdrawals are function calls on the bridge contract account. The
//! attached deposit depends on the token type: one yocto for native and
//! plain NFT withdrawals, a storage deposit when the call may mint —
//! fungible tokens always, wrapped NFTs, whose metadata comes from the
//! Horizon collaborator.

pub mod rpc;
pub mod tx;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{Config, NearConfig};
use crate::core::TransferDetails;
use crate::core::content::amount_or_default;
use crate::horizon::{Horizon, NftMetadata};
use crate::proto::tokenmanager::TokenType;
use crate::secrets::Secrets;

use super::{Bridger, BridgerError};
use rpc::NearRpcClient;
use tx::{Action, FunctionCallAction, PublicKey, Transaction};

pub const DEFAULT_FUNCTION_CALL_GAS: u64 = 30_000_000_000_000;
pub const ONE_YOCTO: u128 = 1;
/// Storage deposit covering a fungible-token mint registration.
pub const FT_MINT_STORAGE_DEPOSIT: u128 = 1_250_000_000_000_000_000_000;
/// Storage deposit covering an NFT mint with metadata.
pub const NFT_MINT_STORAGE_DEPOSIT: u128 = 100_000_000_000_000_000_000_000;

#[derive(Debug, Serialize)]
struct SignArgs {
    origin: String,
    path: Vec<String>,
    /// First 64 signature bytes, 0x-hex.
    signature: String,
    recovery_id: u8,
}

#[derive(Debug, Serialize)]
struct WithdrawArgs {
    #[serde(flatten)]
    sign: SignArgs,
    receiver_id: String,
}

#[derive(Debug, Serialize)]
struct NativeWithdrawArgs {
    /// yoctoNEAR, decimal string.
    amount: String,
    #[serde(flatten)]
    withdraw: WithdrawArgs,
}

#[derive(Debug, Serialize)]
struct FtWithdrawArgs {
    token: String,
    amount: String,
    is_wrapped: bool,
    #[serde(flatten)]
    withdraw: WithdrawArgs,
}

#[derive(Debug, Serialize)]
struct NftWithdrawArgs {
    token: String,
    token_id: String,
    is_wrapped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_metadata: Option<NftMetadataView>,
    #[serde(flatten)]
    withdraw: WithdrawArgs,
}

/// NEP-177 metadata view attached when the destination has to mint.
#[derive(Debug, Serialize)]
struct NftMetadataView {
    title: String,
    description: String,
    media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_hash: Option<String>,
    copies: u64,
    reference: String,
}

/// One prepared bridge-contract call.
#[derive(Debug)]
struct WithdrawCall {
    method: &'static str,
    args: Vec<u8>,
    gas: u64,
    deposit: u128,
}

pub struct NearBridger {
    near: NearConfig,
    secrets: Arc<Secrets>,
    horizon: Option<Arc<Horizon>>,
    rpc: NearRpcClient,
}

impl NearBridger {
    pub fn new(
        config: Arc<Config>,
        secrets: Arc<Secrets>,
        horizon: Option<Arc<Horizon>>,
    ) -> Result<Self, BridgerError> {
        let near = config
            .near
            .clone()
            .ok_or(BridgerError::NotConfigured("near"))?;
        if secrets.near_keys().is_none() {
            return Err(BridgerError::NotConfigured("near signer"));
        }
        let rpc = NearRpcClient::new(near.rpc.value().clone());
        Ok(Self {
            near,
            secrets,
            horizon,
            rpc,
        })
    }

    async fn nft_metadata(
        &self,
        transfer: &TransferDetails,
    ) -> Result<NftMetadata, BridgerError> {
        let horizon = self
            .horizon
            .as_ref()
            .ok_or(BridgerError::NotConfigured("horizon"))?;
        let to = transfer.transfer.to.as_ref();
        Ok(horizon
            .nft_metadata(
                to.map(|to| to.chain.as_str()).unwrap_or_default(),
                &transfer.item.index,
                to.map(|to| to.token_id.as_str()).unwrap_or_default(),
            )
            .await?)
    }
}

#[async_trait]
impl Bridger for NearBridger {
    async fn withdraw(&self, transfer: &TransferDetails) -> Result<(), BridgerError> {
        let keys = self
            .secrets
            .near_keys()
            .ok_or(BridgerError::NotConfigured("near signer"))?;

        let metadata = match transfer.token_type() {
            TokenType::NearNft if transfer.collection_data.wrapped => {
                Some(self.nft_metadata(transfer).await?)
            }
            _ => None,
        };
        let call = build_withdraw_call(transfer, metadata)?;

        let public_key =
            PublicKey::ed25519(keys.signing_key.verifying_key().to_bytes());
        let access_key = self
            .rpc
            .view_access_key(&keys.account_id, &public_key.to_near_string())
            .await
            .map_err(|err| BridgerError::rpc("failed to fetch the access key", err))?;
        let block_hash: [u8; 32] = bs58::decode(&access_key.block_hash)
            .into_vec()
            .ok()
            .and_then(|bytes| bytes.as_slice().try_into().ok())
            .ok_or_else(|| BridgerError::encode("block hash", &access_key.block_hash))?;

        let transaction = Transaction {
            signer_id: keys.account_id.clone(),
            public_key,
            nonce: access_key.nonce + 1,
            receiver_id: self.near.bridge_address.clone(),
            block_hash,
            actions: vec![Action::FunctionCall(FunctionCallAction {
                method_name: call.method.to_owned(),
                args: call.args,
                gas: call.gas,
                deposit: call.deposit,
            })],
        };
        let signed = transaction.sign(&keys.signing_key);

        let outcome = self
            .rpc
            .broadcast_tx_commit(signed.to_base64())
            .await
            .map_err(|err| BridgerError::rpc("failed to submit a near transaction", err))?;
        if let Some(failure) = outcome.failure() {
            tracing::info!(
                op_id = transfer.origin,
                tx_id = outcome.transaction.hash,
                status_failure = %failure,
                "near transaction failed"
            );
            return Err(BridgerError::TransactionFailed(failure.to_string()));
        }

        tracing::info!(
            op_id = transfer.origin,
            tx_id = outcome.transaction.hash,
            "successfully submitted near transaction"
        );
        Ok(())
    }
}

fn build_withdraw_call(
    transfer: &TransferDetails,
    metadata: Option<NftMetadata>,
) -> Result<WithdrawCall, BridgerError> {
    let amount = parse_near_amount(&transfer.transfer.amount)?;
    let signature = alloy_primitives::hex::decode(&transfer.signature)
        .map_err(|err| BridgerError::encode("signature", err))?;
    if signature.len() != 65 {
        return Err(BridgerError::encode(
            "signature",
            format!("expected 65 bytes, got {}", signature.len()),
        ));
    }

    let withdraw = WithdrawArgs {
        sign: SignArgs {
            origin: transfer.origin.clone(),
            path: transfer
                .merkle_path
                .iter()
                .map(|hash| format!("0x{}", hex::encode(hash)))
                .collect(),
            signature: format!("0x{}", hex::encode(&signature[..64])),
            recovery_id: signature[64],
        },
        receiver_id: decode_utf8("receiver", &transfer.transfer.receiver)?,
    };

    let is_wrapped = transfer.collection_data.wrapped;
    let to = transfer.transfer.to.as_ref();
    let token = || decode_utf8("to.address", to.map(|to| to.address.as_str()).unwrap_or_default());

    let (method, args, deposit) = match transfer.token_type() {
        TokenType::Native => {
            let args = NativeWithdrawArgs {
                amount: amount.to_string(),
                withdraw,
            };
            ("native_withdraw", serde_json::to_vec(&args), ONE_YOCTO)
        }
        TokenType::NearFt => {
            let args = FtWithdrawArgs {
                token: token()?,
                amount: amount.to_string(),
                is_wrapped,
                withdraw,
            };
            ("ft_withdraw", serde_json::to_vec(&args), FT_MINT_STORAGE_DEPOSIT)
        }
        TokenType::NearNft => {
            let deposit = if is_wrapped {
                NFT_MINT_STORAGE_DEPOSIT
            } else {
                ONE_YOCTO
            };
            let token_metadata = metadata
                .map(|metadata| to_nft_metadata_view(metadata, transfer))
                .transpose()?;
            let args = NftWithdrawArgs {
                token: token()?,
                token_id: decode_utf8(
                    "to.token_id",
                    to.map(|to| to.token_id.as_str()).unwrap_or_default(),
                )?,
                is_wrapped,
                token_metadata,
                withdraw,
            };
            ("nft_withdraw", serde_json::to_vec(&args), deposit)
        }
        other => {
            return Err(BridgerError::UnsupportedTokenType {
                family: "near",
                token_type: other,
            });
        }
    };
    let args = args.map_err(|err| BridgerError::encode("withdraw args", err))?;

    Ok(WithdrawCall {
        method,
        args,
        gas: DEFAULT_FUNCTION_CALL_GAS,
        deposit,
    })
}

fn to_nft_metadata_view(
    metadata: NftMetadata,
    transfer: &TransferDetails,
) -> Result<NftMetadataView, BridgerError> {
    use base64::Engine as _;

    let image_hash = transfer
        .item
        .meta
        .as_ref()
        .map(|meta| meta.image_hash.as_str())
        .unwrap_or_default();
    let media_hash = if image_hash.is_empty() {
        None
    } else {
        let bytes = alloy_primitives::hex::decode(image_hash)
            .map_err(|err| BridgerError::encode("image hash", err))?;
        Some(base64::engine::general_purpose::STANDARD.encode(bytes))
    };

    Ok(NftMetadataView {
        title: metadata.name,
        description: metadata.description.unwrap_or_default(),
        media: metadata.image_url,
        media_hash,
        copies: 1,
        reference: metadata.metadata_url,
    })
}

fn parse_near_amount(raw: &str) -> Result<u128, BridgerError> {
    let amount =
        amount_or_default(raw).map_err(|err| BridgerError::encode("amount", err))?;
    amount
        .try_into()
        .map_err(|_| BridgerError::encode("amount", "does not fit into u128"))
}

fn decode_utf8(field: &'static str, value: &str) -> Result<String, BridgerError> {
    let bytes = alloy_primitives::hex::decode(value)
        .map_err(|err| BridgerError::encode(field, err))?;
    String::from_utf8(bytes).map_err(|err| BridgerError::encode(field, err))
}

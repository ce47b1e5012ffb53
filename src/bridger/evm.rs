//! EVM-family withdrawal executor.
//!
//! One bridger serves every configured EVM chain: the transfer's
//! destination name selects the chain entry (facade + bridge addresses,
//! RPC, chain id) and the per-chain signing key. Idempotency is the
//! bridge contract's `usedHashes(originHash)` map.

use std::sync::Arc;

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, Bytes, U256, hex};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_signer::Signer as _;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolValue, sol};
use async_trait::async_trait;

use crate::config::{Config, EvmChainConfig};
use crate::core::TransferDetails;
use crate::core::content::amount_or_default;
use crate::proto::tokenmanager::TokenType;
use crate::secrets::Secrets;

use super::{Bridger, BridgerError};

/// Flat gas limit for withdrawal transactions.
const GAS_LIMIT: u64 = 1_000_000;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq)]
    struct Bundle {
        bytes32 salt;
        bytes bundle;
    }

    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IBridge {
        function usedHashes(bytes32 originHash) external view returns (bool);
    }

    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[sol(rpc)]
    interface IBridgeFacade {
        struct WithdrawNativeParameters {
            uint256 amount;
            Bundle bundle;
            bytes32 originHash;
            address receiver;
            bytes proof;
        }

        struct WithdrawERC20Parameters {
            address token;
            uint256 amount;
            Bundle bundle;
            bytes32 originHash;
            address receiver;
            bytes proof;
            bool isWrapped;
        }

        struct WithdrawERC721Parameters {
            address token;
            uint256 tokenId;
            string tokenURI;
            Bundle bundle;
            bytes32 originHash;
            address receiver;
            bytes proof;
            bool isWrapped;
        }

        struct WithdrawERC1155Parameters {
            address token;
            uint256 tokenId;
            string tokenURI;
            uint256 amount;
            Bundle bundle;
            bytes32 originHash;
            address receiver;
            bytes proof;
            bool isWrapped;
        }

        function withdrawNative(WithdrawNativeParameters calldata params) external;
        function withdrawERC20(WithdrawERC20Parameters calldata params) external;
        function withdrawERC721(WithdrawERC721Parameters calldata params) external;
        function withdrawERC1155(WithdrawERC1155Parameters calldata params) external;
    }
}

pub struct EvmBridger {
    config: Arc<Config>,
    secrets: Arc<Secrets>,
}

impl EvmBridger {
    pub fn new(config: Arc<Config>, secrets: Arc<Secrets>) -> Result<Self, BridgerError> {
        if config.evm.is_none() {
            return Err(BridgerError::NotConfigured("evm"));
        }
        Ok(Self { config, secrets })
    }

    fn chain(&self, name: &str) -> Result<&EvmChainConfig, BridgerError> {
        self.config
            .evm
            .as_ref()
            .and_then(|evm| evm.chain_by_name(name))
            .ok_or_else(|| BridgerError::UnknownChain(name.to_owned()))
    }

    fn signer(&self, chain: &EvmChainConfig) -> Result<PrivateKeySigner, BridgerError> {
        let signer = self
            .secrets
            .evm_signer(&chain.name)
            .ok_or(BridgerError::NotConfigured("evm signer"))?;
        Ok(signer.clone().with_chain_id(Some(chain.chain_id)))
    }
}

#[async_trait]
impl Bridger for EvmBridger {
    async fn withdraw(&self, transfer: &TransferDetails) -> Result<(), BridgerError> {
        let token_type = ensure_supported(transfer.token_type())?;
        let chain = self.chain(transfer.to_chain())?;
        let inputs = WithdrawInputs::prepare(transfer)?;

        let signer = self.signer(chain)?;
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(chain.rpc.value().clone());

        let bridge = IBridge::new(chain.bridge_address, &provider);
        let withdrawn = bridge
            .usedHashes(inputs.origin)
            .call()
            .await
            .map_err(|err| BridgerError::rpc("failed to check used hashes", err))?;
        if withdrawn {
            return Err(BridgerError::AlreadyWithdrawn);
        }

        let nonce = provider
            .get_transaction_count(signer_address)
            .pending()
            .await
            .map_err(|err| BridgerError::rpc("failed to fetch a nonce", err))?;
        let gas_price = provider
            .get_gas_price()
            .await
            .map_err(|err| BridgerError::rpc("failed to get suggested gas price", err))?;

        let facade = IBridgeFacade::new(chain.bridge_facade_address, &provider);
        let token = || -> Result<Address, BridgerError> {
            decode_address(
                "to.address",
                transfer
                    .transfer
                    .to
                    .as_ref()
                    .map(|to| to.address.as_str())
                    .unwrap_or_default(),
            )
        };
        let token_id = || -> Result<U256, BridgerError> {
            parse_token_id(
                transfer
                    .transfer
                    .to
                    .as_ref()
                    .map(|to| to.token_id.as_str())
                    .unwrap_or_default(),
            )
        };
        let token_uri = transfer
            .item
            .meta
            .as_ref()
            .map(|meta| meta.uri.clone())
            .unwrap_or_default();
        let is_wrapped = transfer.collection_data.wrapped;

        let sent = match token_type {
            TokenType::Native => {
                facade
                    .withdrawNative(IBridgeFacade::WithdrawNativeParameters {
                        amount: inputs.amount,
                        bundle: inputs.bundle,
                        originHash: inputs.origin,
                        receiver: inputs.receiver,
                        proof: inputs.proof,
                    })
                    .nonce(nonce)
                    .gas_price(gas_price)
                    .gas(GAS_LIMIT)
                    .send()
                    .await
            }
            TokenType::Erc20 => {
                facade
                    .withdrawERC20(IBridgeFacade::WithdrawERC20Parameters {
                        token: token()?,
                        amount: inputs.amount,
                        bundle: inputs.bundle,
                        originHash: inputs.origin,
                        receiver: inputs.receiver,
                        proof: inputs.proof,
                        isWrapped: is_wrapped,
                    })
                    .nonce(nonce)
                    .gas_price(gas_price)
                    .gas(GAS_LIMIT)
                    .send()
                    .await
            }
            TokenType::Erc721 => {
                facade
                    .withdrawERC721(IBridgeFacade::WithdrawERC721Parameters {
                        token: token()?,
                        tokenId: token_id()?,
                        tokenURI: token_uri,
                        bundle: inputs.bundle,
                        originHash: inputs.origin,
                        receiver: inputs.receiver,
                        proof: inputs.proof,
                        isWrapped: is_wrapped,
                    })
                    .nonce(nonce)
                    .gas_price(gas_price)
                    .gas(GAS_LIMIT)
                    .send()
                    .await
            }
            TokenType::Erc1155 => {
                facade
                    .withdrawERC1155(IBridgeFacade::WithdrawERC1155Parameters {
                        token: token()?,
                        tokenId: token_id()?,
                        tokenURI: token_uri,
                        amount: inputs.amount,
                        bundle: inputs.bundle,
                        originHash: inputs.origin,
                        receiver: inputs.receiver,
                        proof: inputs.proof,
                        isWrapped: is_wrapped,
                    })
                    .nonce(nonce)
                    .gas_price(gas_price)
                    .gas(GAS_LIMIT)
                    .send()
                    .await
            }
            other => {
                return Err(BridgerError::UnsupportedTokenType {
                    family: "evm",
                    token_type: other,
                });
            }
        };
        let pending =
            sent.map_err(|err| BridgerError::rpc("failed to send the withdrawal", err))?;
        let tx_hash = *pending.tx_hash();
        tracing::info!(op_id = transfer.origin, tx_id = %tx_hash, "submitted transaction");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|err| BridgerError::rpc("failed to wait for the transaction", err))?;
        if !receipt.status() {
            return Err(BridgerError::TransactionFailed(format!(
                "receipt status 0 for {tx_hash}"
            )));
        }

        tracing::info!(
            op_id = transfer.origin,
            tx_id = %tx_hash,
            block_number = receipt.block_number,
            gas_used = receipt.gas_used,
            "evm transaction confirmed"
        );
        Ok(())
    }
}

/// Decoded call inputs shared by every token type.
struct WithdrawInputs {
    amount: U256,
    receiver: Address,
    origin: B256,
    proof: Bytes,
    bundle: Bundle,
}

impl WithdrawInputs {
    fn prepare(transfer: &TransferDetails) -> Result<Self, BridgerError> {
        let amount = amount_or_default(&transfer.transfer.amount)
            .map_err(|err| BridgerError::encode("amount", err))?;
        let receiver = decode_address("receiver", &transfer.transfer.receiver)?;
        let origin = decode_b256("origin", &transfer.origin)?;
        let signature = repair_signature(&transfer.signature)?;
        let proof = encode_proof(&transfer.merkle_path, &signature);
        let bundle = decode_bundle(transfer)?;
        Ok(Self {
            amount,
            receiver,
            origin,
            proof,
            bundle,
        })
    }
}

fn ensure_supported(token_type: TokenType) -> Result<TokenType, BridgerError> {
    match token_type {
        TokenType::Native | TokenType::Erc20 | TokenType::Erc721 | TokenType::Erc1155 => {
            Ok(token_type)
        }
        other => Err(BridgerError::UnsupportedTokenType {
            family: "evm",
            token_type: other,
        }),
    }
}

fn decode_address(field: &'static str, value: &str) -> Result<Address, BridgerError> {
    let bytes = hex::decode(value).map_err(|err| BridgerError::encode(field, err))?;
    if bytes.len() != 20 {
        return Err(BridgerError::encode(
            field,
            format!("expected 20 bytes, got {}", bytes.len()),
        ));
    }
    Ok(Address::from_slice(&bytes))
}

fn decode_b256(field: &'static str, value: &str) -> Result<B256, BridgerError> {
    let bytes = hex::decode(value).map_err(|err| BridgerError::encode(field, err))?;
    B256::try_from(bytes.as_slice()).map_err(|err| BridgerError::encode(field, err))
}

/// Decodes the 65-byte recoverable signature and lifts `v` by 27 on a
/// copy, the layout the OpenZeppelin ECDSA library expects.
fn repair_signature(signature: &str) -> Result<Vec<u8>, BridgerError> {
    let mut bytes =
        hex::decode(signature).map_err(|err| BridgerError::encode("signature", err))?;
    if bytes.len() != 65 {
        return Err(BridgerError::encode(
            "signature",
            format!("expected 65 bytes, got {}", bytes.len()),
        ));
    }
    bytes[64] = bytes[64].wrapping_add(27);
    Ok(bytes)
}

/// ABI-encodes the proof tuple `(bytes32[], bytes)` of Merkle path and
/// repaired signature.
fn encode_proof(merkle_path: &[[u8; 32]], signature: &[u8]) -> Bytes {
    let path: Vec<B256> = merkle_path.iter().map(|hash| B256::from(*hash)).collect();
    let encoded = (path, Bytes::copy_from_slice(signature)).abi_encode_params();
    Bytes::from(encoded)
}

fn empty_bundle() -> Bundle {
    Bundle {
        salt: B256::ZERO,
        bundle: Bytes::new(),
    }
}

fn decode_bundle(transfer: &TransferDetails) -> Result<Bundle, BridgerError> {
    if transfer.transfer.bundle_data.is_empty() {
        return Ok(empty_bundle());
    }
    let bundle = hex::decode(&transfer.transfer.bundle_data)
        .map_err(|err| BridgerError::encode("bundle data", err))?;
    let salt = hex::decode(&transfer.transfer.bundle_salt)
        .map_err(|err| BridgerError::encode("bundle salt", err))?;
    let salt = B256::try_from(salt.as_slice())
        .map_err(|_| BridgerError::encode("bundle salt", "salt must be 32 bytes"))?;
    Ok(Bundle {
        salt,
        bundle: Bytes::from(bundle),
    })
}

fn parse_token_id(raw: &str) -> Result<U256, BridgerError> {
    let bytes = hex::decode(raw).map_err(|err| BridgerError::encode("token id", err))?;
    if bytes.len() > 32 {
        return Err(BridgerError::encode(
            "token id",
            format!("expected at most 32 bytes, got {}", bytes.len()),
        ));
    }
    Ok(U256::from_be_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::rarimocore::{OnChainItemIndex, Transfer};
    use crate::proto::tokenmanager::{Collection, CollectionData, Item};

    fn details() -> TransferDetails {
        TransferDetails {
            transfer: Transfer {
                origin: "op-1".to_owned(),
                tx: String::new(),
                event_id: String::new(),
                receiver: "0x000000000000000000000000000000000000dead".to_owned(),
                amount: String::new(),
                bundle_data: String::new(),
                bundle_salt: String::new(),
                from: None,
                to: Some(OnChainItemIndex {
                    chain: "Ethereum".to_owned(),
                    address: "0x00000000000000000000000000000000000000aa".to_owned(),
                    token_id: "0x01".to_owned(),
                }),
            },
            collection: Collection::default(),
            collection_data: CollectionData::default(),
            item: Item::default(),
            signature: format!("0x{}00", "11".repeat(64)),
            origin: format!("0x{}", "22".repeat(32)),
            merkle_path: vec![[0xab; 32]],
        }
    }

    #[test]
    fn prepares_inputs_with_defaults() {
        let inputs = WithdrawInputs::prepare(&details()).expect("inputs");
        assert_eq!(inputs.amount, U256::from(1));
        assert_eq!(inputs.origin, B256::from([0x22; 32]));
        assert_eq!(inputs.bundle, empty_bundle());
    }

    #[test]
    fn signature_repair_lifts_v_on_a_copy() {
        let details = details();
        let repaired = repair_signature(&details.signature).expect("signature");
        assert_eq!(repaired.len(), 65);
        assert_eq!(repaired[64], 27);
        assert_eq!(&repaired[..64], &[0x11; 64]);
        // Source string is untouched.
        assert!(details.signature.ends_with("00"));

        assert!(repair_signature("0x1234").is_err());
    }

    #[test]
    fn proof_encoding_round_trips() {
        let signature = repair_signature(&details().signature).expect("signature");
        let proof = encode_proof(&[[0xab; 32], [0xcd; 32]], &signature);
        let (path, sig): (Vec<B256>, Bytes) =
            SolValue::abi_decode_params(&proof).expect("decodes as (bytes32[], bytes)");
        assert_eq!(path, vec![B256::from([0xab; 32]), B256::from([0xcd; 32])]);
        assert_eq!(sig.as_ref(), signature.as_slice());
    }

    #[test]
    fn bundle_requires_32_byte_salt() {
        let mut transfer = details();
        transfer.transfer.bundle_data = "0xdeadbeef".to_owned();
        transfer.transfer.bundle_salt = "0x1234".to_owned();
        assert!(matches!(
            decode_bundle(&transfer),
            Err(BridgerError::Encode { .. })
        ));

        transfer.transfer.bundle_salt = format!("0x{}", "ef".repeat(32));
        let bundle = decode_bundle(&transfer).expect("bundle");
        assert_eq!(bundle.salt, B256::from([0xef; 32]));
        assert_eq!(bundle.bundle.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn token_id_parses_as_big_endian_integer() {
        assert_eq!(parse_token_id("0x01").expect("id"), U256::from(1));
        assert_eq!(parse_token_id("0x0100").expect("id"), U256::from(256));
        assert!(parse_token_id(&format!("0x{}", "00".repeat(33))).is_err());
        assert!(parse_token_id("nothex").is_err());
    }

    #[test]
    fn receiver_must_be_20_bytes() {
        assert!(decode_address("receiver", "0xdead").is_err());
        assert!(
            decode_address("receiver", "0x000000000000000000000000000000000000dead").is_ok()
        );
    }

    #[test]
    fn rejects_non_evm_token_types() {
        let err = ensure_supported(TokenType::NearNft).expect_err("unsupported");
        assert!(err.is_permanent());
        assert!(ensure_supported(TokenType::Erc1155).is_ok());
    }
}

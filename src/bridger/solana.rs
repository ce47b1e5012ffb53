//! Solana withdrawal executor.
//!
//! The withdraw account is a PDA derived from the origin, which makes the
//! idempotency probe a plain account-existence check: once the bridge
//! program processes a withdrawal it creates the account, and a replay
//! fails to. Instruction arguments are borsh-encoded after a one-byte
//! instruction tag, the bridge program's layout.

use std::sync::Arc;
use std::str::FromStr;

use borsh::BorshSerialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_instruction::{AccountMeta, Instruction};
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer as _;
use solana_transaction::Transaction;
use async_trait::async_trait;

use crate::config::{Config, SolanaConfig};
use crate::core::TransferDetails;
use crate::core::content::amount_or_default;
use crate::proto::tokenmanager::TokenType;
use crate::secrets::Secrets;

use super::{Bridger, BridgerError};

/// Bridge program instruction tags.
const INSTRUCTION_WITHDRAW_NATIVE: u8 = 4;
const INSTRUCTION_WITHDRAW_FT: u8 = 5;
const INSTRUCTION_WITHDRAW_NFT: u8 = 6;

/// Borsh arguments of every withdraw instruction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
struct WithdrawArgs {
    amount: u64,
    path: Vec<[u8; 32]>,
    recovery_id: u8,
    seeds: [u8; 32],
    origin: [u8; 32],
    signature: [u8; 64],
    /// 32-byte token seed for wrapped non-native tokens.
    token_seed: Option<[u8; 32]>,
    signed_metadata: Option<SignedMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
struct SignedMetadata {
    name: String,
    symbol: String,
    uri: String,
    decimals: u8,
}

pub struct SolanaBridger {
    solana: SolanaConfig,
    keypair: Arc<Keypair>,
    program_id: Pubkey,
    bridge_admin: Pubkey,
    admin_seed: [u8; 32],
    rpc: Arc<RpcClient>,
}

impl SolanaBridger {
    pub fn new(config: Arc<Config>, secrets: Arc<Secrets>) -> Result<Self, BridgerError> {
        let solana = config
            .solana
            .clone()
            .ok_or(BridgerError::NotConfigured("solana"))?;
        let keypair = secrets
            .solana_keypair()
            .ok_or(BridgerError::NotConfigured("solana signer"))?;
        let program_id = Pubkey::from_str(&solana.bridge_program_id)
            .map_err(|err| BridgerError::encode("bridge program id", err))?;
        let bridge_admin = Pubkey::from_str(&solana.bridge_admin)
            .map_err(|err| BridgerError::encode("bridge admin", err))?;
        let admin_seed = decode_seed("bridge admin seed", &solana.bridge_admin_seed)?;
        let rpc = Arc::new(RpcClient::new(solana.rpc.value().to_string()));
        Ok(Self {
            solana,
            keypair,
            program_id,
            bridge_admin,
            admin_seed,
            rpc,
        })
    }

    async fn is_already_withdrawn(&self, withdraw_address: &Pubkey) -> Result<bool, BridgerError> {
        let account = self
            .rpc
            .get_account_with_commitment(withdraw_address, CommitmentConfig::processed())
            .await
            .map_err(|err| BridgerError::rpc("failed to get the withdraw account", err))?;
        Ok(account.value.is_some())
    }

    fn make_instruction(
        &self,
        transfer: &TransferDetails,
        withdraw_address: Pubkey,
        args: WithdrawArgs,
    ) -> Result<Instruction, BridgerError> {
        let receiver = decode_pubkey("receiver", &transfer.transfer.receiver)?;
        let payer = self.keypair.pubkey();

        let (tag, mut accounts) = match transfer.token_type() {
            TokenType::Native => (
                INSTRUCTION_WITHDRAW_NATIVE,
                vec![
                    AccountMeta::new(self.bridge_admin, false),
                    AccountMeta::new(receiver, false),
                    AccountMeta::new(withdraw_address, false),
                ],
            ),
            TokenType::MetaplexFt => {
                let to = transfer.transfer.to.as_ref();
                let mint = decode_pubkey(
                    "to.address",
                    to.map(|to| to.address.as_str()).unwrap_or_default(),
                )?;
                (
                    INSTRUCTION_WITHDRAW_FT,
                    vec![
                        AccountMeta::new(self.bridge_admin, false),
                        AccountMeta::new(mint, false),
                        AccountMeta::new(receiver, false),
                        AccountMeta::new(withdraw_address, false),
                    ],
                )
            }
            TokenType::MetaplexNft => {
                let to = transfer.transfer.to.as_ref();
                let mint = decode_pubkey(
                    "to.token_id",
                    to.map(|to| to.token_id.as_str()).unwrap_or_default(),
                )?;
                (
                    INSTRUCTION_WITHDRAW_NFT,
                    vec![
                        AccountMeta::new(self.bridge_admin, false),
                        AccountMeta::new(mint, false),
                        AccountMeta::new(receiver, false),
                        AccountMeta::new(withdraw_address, false),
                    ],
                )
            }
            other => {
                return Err(BridgerError::UnsupportedTokenType {
                    family: "solana",
                    token_type: other,
                });
            }
        };
        accounts.push(AccountMeta::new(payer, true));
        accounts.push(AccountMeta::new_readonly(
            solana_pubkey::pubkey!("11111111111111111111111111111111"),
            false,
        ));

        let mut data = vec![tag];
        borsh::to_writer(&mut data, &args)
            .map_err(|err| BridgerError::encode("withdraw args", err))?;
        Ok(Instruction {
            program_id: self.program_id,
            accounts,
            data,
        })
    }
}

#[async_trait]
impl Bridger for SolanaBridger {
    async fn withdraw(&self, transfer: &TransferDetails) -> Result<(), BridgerError> {
        let origin = decode_seed("origin", &transfer.origin)?;
        let (withdraw_address, _) =
            Pubkey::find_program_address(&[origin.as_ref()], &self.program_id);

        if self.is_already_withdrawn(&withdraw_address).await? {
            return Err(BridgerError::AlreadyWithdrawn);
        }

        let args = make_withdraw_args(transfer, self.admin_seed, origin)?;
        let instruction = self.make_instruction(transfer, withdraw_address, args)?;

        let (recent_blockhash, _) = self
            .rpc
            .get_latest_blockhash_with_commitment(CommitmentConfig::finalized())
            .await
            .map_err(|err| BridgerError::rpc("failed to fetch recent blockhash", err))?;

        let payer = self.keypair.pubkey();
        let tx = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&payer),
            &[self.keypair.as_ref()],
            recent_blockhash,
        );

        let signature = self
            .rpc
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(|err| BridgerError::rpc("failed to submit a solana transaction", err))?;

        tracing::info!(
            op_id = transfer.origin,
            tx_id = %signature,
            ws = self.solana.ws.is_some(),
            "successfully submitted solana transaction"
        );
        Ok(())
    }
}

fn make_withdraw_args(
    transfer: &TransferDetails,
    admin_seed: [u8; 32],
    origin: [u8; 32],
) -> Result<WithdrawArgs, BridgerError> {
    let amount = amount_or_default(&transfer.transfer.amount)
        .map_err(|err| BridgerError::encode("amount", err))?;
    let amount: u64 = amount
        .try_into()
        .map_err(|_| BridgerError::encode("amount", "does not fit into u64"))?;

    let signature =
        alloy_primitives::hex::decode(&transfer.signature)
            .map_err(|err| BridgerError::encode("signature", err))?;
    if signature.len() != 65 {
        return Err(BridgerError::encode(
            "signature",
            format!("expected 65 bytes, got {}", signature.len()),
        ));
    }
    let recovery_id = signature[64];
    let signature: [u8; 64] = signature[..64]
        .try_into()
        .expect("slice of checked length");

    // Wrapped non-native tokens carry a token seed and signed metadata for
    // the mint the program may have to create.
    let token_type = transfer.token_type();
    let seed = transfer
        .item
        .meta
        .as_ref()
        .map(|meta| meta.seed.as_str())
        .unwrap_or_default();
    let (token_seed, signed_metadata) = if token_type != TokenType::Native && !seed.is_empty() {
        let meta = transfer.item.meta.as_ref().expect("non-empty seed implies metadata");
        (
            Some(decode_seed("token seed", seed)?),
            Some(SignedMetadata {
                name: meta.name.clone(),
                symbol: meta.symbol.clone(),
                uri: meta.uri.clone(),
                decimals: transfer.collection_data.decimals as u8,
            }),
        )
    } else {
        (None, None)
    };

    Ok(WithdrawArgs {
        amount,
        path: transfer.merkle_path.clone(),
        recovery_id,
        seeds: admin_seed,
        origin,
        signature,
        token_seed,
        signed_metadata,
    })
}

fn decode_seed(field: &'static str, value: &str) -> Result<[u8; 32], BridgerError> {
    let bytes = alloy_primitives::hex::decode(value)
        .map_err(|err| BridgerError::encode(field, err))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| BridgerError::encode(field, format!("expected 32 bytes, got {}", bytes.len())))
}

fn decode_pubkey(field: &'static str, value: &str) -> Result<Pubkey, BridgerError> {
    let bytes = alloy_primitives::hex::decode(value)
        .map_err(|err| BridgerError::encode(field, err))?;
    let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        BridgerError::encode(field, format!("expected 32 bytes, got {}", bytes.len()))
    })?;
    Ok(Pubkey::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::rarimocore::{OnChainItemIndex, Transfer};
    use crate::proto::tokenmanager::{Collection, CollectionData, Item, ItemMetadata};

    fn details(token_type: TokenType) -> TransferDetails {
        TransferDetails {
            transfer: Transfer {
                origin: "op-1".to_owned(),
                tx: String::new(),
                event_id: String::new(),
                receiver: format!("0x{}", "07".repeat(32)),
                amount: "5".to_owned(),
                bundle_data: String::new(),
                bundle_salt: String::new(),
                from: None,
                to: Some(OnChainItemIndex {
                    chain: "Solana".to_owned(),
                    address: format!("0x{}", "08".repeat(32)),
                    token_id: format!("0x{}", "09".repeat(32)),
                }),
            },
            collection: Collection::default(),
            collection_data: CollectionData {
                index: None,
                collection: String::new(),
                token_type: token_type as i32,
                wrapped: true,
                decimals: 6,
            },
            item: Item {
                index: "item-1".to_owned(),
                collection: String::new(),
                meta: Some(ItemMetadata {
                    name: "Token".to_owned(),
                    symbol: "TKN".to_owned(),
                    image_uri: String::new(),
                    image_hash: String::new(),
                    seed: String::new(),
                    uri: "ipfs://x".to_owned(),
                }),
                on_chain: vec![],
            },
            signature: format!("0x{}01", "11".repeat(64)),
            origin: format!("0x{}", "22".repeat(32)),
            merkle_path: vec![[0xab; 32]],
        }
    }

    #[test]
    fn splits_signature_and_recovery_id() {
        let args =
            make_withdraw_args(&details(TokenType::MetaplexFt), [3; 32], [0x22; 32]).expect("args");
        assert_eq!(args.amount, 5);
        assert_eq!(args.recovery_id, 1);
        assert_eq!(args.signature, [0x11; 64]);
        assert_eq!(args.seeds, [3; 32]);
        assert_eq!(args.origin, [0x22; 32]);
        assert_eq!(args.path, vec![[0xab; 32]]);
        assert!(args.token_seed.is_none());
        assert!(args.signed_metadata.is_none());
    }

    #[test]
    fn wrapped_token_with_seed_carries_metadata() {
        let mut details = details(TokenType::MetaplexNft);
        details.item.meta.as_mut().expect("meta").seed = format!("0x{}", "0a".repeat(32));
        let args = make_withdraw_args(&details, [3; 32], [0x22; 32]).expect("args");
        assert_eq!(args.token_seed, Some([0x0a; 32]));
        let metadata = args.signed_metadata.expect("signed metadata");
        assert_eq!(metadata.name, "Token");
        assert_eq!(metadata.symbol, "TKN");
        assert_eq!(metadata.uri, "ipfs://x");
        assert_eq!(metadata.decimals, 6);
    }

    #[test]
    fn native_ignores_token_seed() {
        let mut details = details(TokenType::Native);
        details.item.meta.as_mut().expect("meta").seed = format!("0x{}", "0a".repeat(32));
        let args = make_withdraw_args(&details, [3; 32], [0x22; 32]).expect("args");
        assert!(args.token_seed.is_none());
        assert!(args.signed_metadata.is_none());
    }

    #[test]
    fn args_borsh_layout_is_stable() {
        let args = make_withdraw_args(&details(TokenType::Native), [3; 32], [0x22; 32])
            .expect("args");
        let encoded = borsh::to_vec(&args).expect("borsh");
        // u64 amount + vec len + one hash + recovery + seeds + origin
        // + signature + two None tags.
        assert_eq!(encoded.len(), 8 + 4 + 32 + 1 + 32 + 32 + 64 + 1 + 1);
        assert_eq!(&encoded[..8], &5u64.to_le_bytes());
        assert_eq!(&encoded[8..12], &1u32.to_le_bytes());
    }

    #[test]
    fn empty_amount_defaults_to_one() {
        let mut details = details(TokenType::Native);
        details.transfer.amount = String::new();
        let args = make_withdraw_args(&details, [3; 32], [0x22; 32]).expect("args");
        assert_eq!(args.amount, 1);
    }

    #[test]
    fn oversized_amount_is_an_encode_error() {
        let mut details = details(TokenType::Native);
        details.transfer.amount = "18446744073709551616".to_owned(); // u64::MAX + 1
        assert!(matches!(
            make_withdraw_args(&details, [3; 32], [0x22; 32]),
            Err(BridgerError::Encode { .. })
        ));
    }

    #[test]
    fn seed_decoding_requires_32_bytes() {
        assert!(decode_seed("seed", "0x0a0b").is_err());
        assert_eq!(
            decode_seed("seed", &format!("0x{}", "0a".repeat(32))).expect("seed"),
            [0x0a; 32]
        );
    }
}

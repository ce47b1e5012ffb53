//! Source-chain withdrawal executor.
//!
//! Transfers destined back to the home chain are settled with a
//! `MsgWithdrawNative` broadcast through the same gRPC channel the
//! relayer reads from. Only the native token type exists there; the
//! message is signed in SIGN_MODE_DIRECT and broadcast in BLOCK mode, so
//! a returned response means the transaction is already committed.

use std::sync::Arc;

use async_trait::async_trait;
use k256::ecdsa::signature::Signer as _;
use k256::ecdsa::Signature;
use k256::elliptic_curve::sec1::ToEncodedPoint as _;
use prost::Message;

use crate::config::{Config, RarimoConfig};
use crate::core::{SourceChain, TransferDetails};
use crate::proto::cosmos;
use crate::proto::rarimocore::{MSG_WITHDRAW_NATIVE_TYPE_URL, MsgWithdrawNative};
use crate::proto::tokenmanager::TokenType;
use crate::secrets::{RarimoKeys, Secrets};

use super::{Bridger, BridgerError};

pub struct RarimoBridger {
    rarimo: RarimoConfig,
    secrets: Arc<Secrets>,
    client: Arc<dyn SourceChain>,
}

impl RarimoBridger {
    pub fn new(
        config: Arc<Config>,
        secrets: Arc<Secrets>,
        client: Arc<dyn SourceChain>,
    ) -> Result<Self, BridgerError> {
        let rarimo = config
            .rarimo
            .clone()
            .ok_or(BridgerError::NotConfigured("rarimo"))?;
        if secrets.rarimo_keys().is_none() {
            return Err(BridgerError::NotConfigured("rarimo signer"));
        }
        Ok(Self {
            rarimo,
            secrets,
            client,
        })
    }
}

#[async_trait]
impl Bridger for RarimoBridger {
    async fn withdraw(&self, transfer: &TransferDetails) -> Result<(), BridgerError> {
        if transfer.token_type() != TokenType::Native {
            return Err(BridgerError::UnsupportedTokenType {
                family: "rarimo",
                token_type: transfer.token_type(),
            });
        }
        let keys = self
            .secrets
            .rarimo_keys()
            .ok_or(BridgerError::NotConfigured("rarimo signer"))?;

        let account = self.client.account(&keys.address).await?;
        let tx_raw = build_signed_tx(&self.rarimo, keys, &account, &transfer.origin);

        let response = self.client.broadcast_tx(tx_raw.encode_to_vec()).await?;
        if response.code != 0 {
            return Err(BridgerError::TransactionFailed(response.raw_log));
        }

        tracing::info!(
            op_id = transfer.origin,
            tx_id = response.txhash,
            "successfully submitted rarimo transaction"
        );
        Ok(())
    }
}

/// Builds and signs the withdrawal in SIGN_MODE_DIRECT.
fn build_signed_tx(
    rarimo: &RarimoConfig,
    keys: &RarimoKeys,
    account: &cosmos::BaseAccount,
    origin: &str,
) -> cosmos::TxRaw {
    let msg = MsgWithdrawNative {
        creator: keys.address.clone(),
        origin: origin.to_owned(),
    };
    let body = cosmos::TxBody {
        messages: vec![prost_types::Any {
            type_url: MSG_WITHDRAW_NATIVE_TYPE_URL.to_owned(),
            value: msg.encode_to_vec(),
        }],
        memo: String::new(),
        timeout_height: 0,
    };

    let public_key = keys
        .signing_key
        .verifying_key()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec();
    let auth_info = cosmos::AuthInfo {
        signer_infos: vec![cosmos::SignerInfo {
            public_key: Some(prost_types::Any {
                type_url: cosmos::SECP256K1_PUB_KEY_TYPE_URL.to_owned(),
                value: cosmos::PubKey { key: public_key }.encode_to_vec(),
            }),
            mode_info: Some(cosmos::ModeInfo::single_direct()),
            sequence: account.sequence,
        }],
        fee: Some(cosmos::Fee {
            amount: vec![cosmos::Coin {
                denom: rarimo.coin.clone(),
                amount: (rarimo.gas_limit * rarimo.min_gas_price).to_string(),
            }],
            gas_limit: rarimo.gas_limit,
        }),
    };

    let sign_doc = cosmos::SignDoc {
        body_bytes: body.encode_to_vec(),
        auth_info_bytes: auth_info.encode_to_vec(),
        chain_id: rarimo.chain_id.clone(),
        account_number: account.account_number,
    };
    let signature: Signature = keys.signing_key.sign(&sign_doc.encode_to_vec());
    let signature = signature.normalize_s().unwrap_or(signature);

    cosmos::TxRaw {
        body_bytes: sign_doc.body_bytes.clone(),
        auth_info_bytes: sign_doc.auth_info_bytes.clone(),
        signatures: vec![signature.to_bytes().to_vec()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use k256::ecdsa::signature::Verifier as _;

    fn fixtures() -> (RarimoConfig, RarimoKeys, cosmos::BaseAccount) {
        let rarimo = RarimoConfig {
            gas_limit: 1_000_000,
            min_gas_price: 2,
            coin: "stake".to_owned(),
            chain_id: "rarimo_201411-1".to_owned(),
        };
        let keys = RarimoKeys {
            address: "rarimo1relayer".to_owned(),
            signing_key: SigningKey::from_slice(&[0x13; 32]).expect("signing key"),
        };
        let account = cosmos::BaseAccount {
            address: "rarimo1relayer".to_owned(),
            pub_key: None,
            account_number: 9,
            sequence: 4,
        };
        (rarimo, keys, account)
    }

    #[test]
    fn signed_tx_carries_the_withdraw_message() {
        let (rarimo, keys, account) = fixtures();
        let tx_raw = build_signed_tx(&rarimo, &keys, &account, "0xorigin");

        let body = cosmos::TxBody::decode(tx_raw.body_bytes.as_slice()).expect("body");
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].type_url, MSG_WITHDRAW_NATIVE_TYPE_URL);
        let msg =
            MsgWithdrawNative::decode(body.messages[0].value.as_slice()).expect("message");
        assert_eq!(msg.creator, "rarimo1relayer");
        assert_eq!(msg.origin, "0xorigin");
    }

    #[test]
    fn fee_is_gas_limit_times_min_gas_price() {
        let (rarimo, keys, account) = fixtures();
        let tx_raw = build_signed_tx(&rarimo, &keys, &account, "0xorigin");

        let auth_info =
            cosmos::AuthInfo::decode(tx_raw.auth_info_bytes.as_slice()).expect("auth info");
        let fee = auth_info.fee.expect("fee");
        assert_eq!(fee.gas_limit, 1_000_000);
        assert_eq!(fee.amount[0].denom, "stake");
        assert_eq!(fee.amount[0].amount, "2000000");
        assert_eq!(auth_info.signer_infos[0].sequence, 4);
    }

    #[test]
    fn signature_verifies_over_the_sign_doc() {
        let (rarimo, keys, account) = fixtures();
        let tx_raw = build_signed_tx(&rarimo, &keys, &account, "0xorigin");

        let sign_doc = cosmos::SignDoc {
            body_bytes: tx_raw.body_bytes.clone(),
            auth_info_bytes: tx_raw.auth_info_bytes.clone(),
            chain_id: rarimo.chain_id.clone(),
            account_number: account.account_number,
        };
        let signature =
            Signature::from_slice(&tx_raw.signatures[0]).expect("signature bytes");
        keys.signing_key
            .verifying_key()
            .verify(&sign_doc.encode_to_vec(), &signature)
            .expect("signature verifies");
    }
}

//! NEAR transaction wire format.
//!
//! Transactions are borsh-encoded and signed over the sha256 of the
//! encoding. Only the ed25519 key type and the function-call action are
//! used here, but the action enum keeps the protocol's variant order so
//! the tags stay wire-correct.

use borsh::BorshSerialize;
use ed25519_dalek::{Signer as _, SigningKey};
use sha2::{Digest, Sha256};

pub const ED25519_KEY_TYPE: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct PublicKey {
    pub key_type: u8,
    pub key: [u8; 32],
}

impl PublicKey {
    pub fn ed25519(key: [u8; 32]) -> Self {
        Self {
            key_type: ED25519_KEY_TYPE,
            key,
        }
    }

    /// The `ed25519:<base58>` display form RPC queries take.
    pub fn to_near_string(&self) -> String {
        format!("ed25519:{}", bs58::encode(&self.key).into_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct Signature {
    pub key_type: u8,
    pub signature: [u8; 64],
}

/// Protocol action set; variant order defines the borsh tags.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub enum Action {
    CreateAccount,
    DeployContract,
    FunctionCall(FunctionCallAction),
    Transfer,
    Stake,
    AddKey,
    DeleteKey,
    DeleteAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct FunctionCallAction {
    pub method_name: String,
    /// JSON-encoded call arguments.
    pub args: Vec<u8>,
    pub gas: u64,
    /// Attached deposit, yoctoNEAR.
    pub deposit: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct Transaction {
    pub signer_id: String,
    pub public_key: PublicKey,
    pub nonce: u64,
    pub receiver_id: String,
    pub block_hash: [u8; 32],
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: Signature,
}

impl Transaction {
    /// Signs the sha256 of the borsh encoding and returns the broadcast
    /// form.
    pub fn sign(self, key: &SigningKey) -> SignedTransaction {
        let encoded = borsh::to_vec(&self).expect("transaction borsh-serializes");
        let hash = Sha256::digest(&encoded);
        let signature = key.sign(&hash);
        SignedTransaction {
            transaction: self,
            signature: Signature {
                key_type: ED25519_KEY_TYPE,
                signature: signature.to_bytes(),
            },
        }
    }
}

impl SignedTransaction {
    /// Base64 of the borsh encoding, the `broadcast_tx_commit` parameter.
    pub fn to_base64(&self) -> String {
        use base64::Engine as _;
        let encoded = borsh::to_vec(self).expect("signed transaction borsh-serializes");
        base64::engine::general_purpose::STANDARD.encode(encoded)
    }
}

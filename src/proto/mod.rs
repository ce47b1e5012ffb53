//! Source-chain wire protocol.
//!
//! Message types and query clients for the Cosmos-SDK source chain: the
//! `rarimocore` and `tokenmanager` modules plus the subset of
//! `cosmos.tx.v1beta1` / `cosmos.auth.v1beta1` the relayer uses. Types are
//! modeled on the chain's protobuf schema; clients follow the tonic
//! generated-code shape over a shared lazily-connected channel.

pub mod cosmos;
pub mod rarimocore;
pub mod tokenmanager;

/// Type URL of the confirmation message the scheduler filters blocks for.
pub const MSG_CREATE_CONFIRMATION_TYPE_URL: &str =
    "/rarimo.rarimocore.rarimocore.MsgCreateConfirmation";

//! Minimal NEAR JSON-RPC client: access-key lookup and transaction
//! broadcast, the two calls a withdrawal needs.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum NearRpcError {
    #[error("near rpc request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("near rpc error: {0}")]
    Rpc(serde_json::Value),
    #[error("malformed near rpc response: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessKeyView {
    pub nonce: u64,
    pub block_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionView {
    pub hash: String,
}

/// Outcome of `broadcast_tx_commit`. The status object carries a
/// `Failure` key when execution failed.
#[derive(Debug, Clone, Deserialize)]
pub struct FinalExecutionOutcome {
    pub status: serde_json::Value,
    pub transaction: TransactionView,
}

impl FinalExecutionOutcome {
    pub fn failure(&self) -> Option<&serde_json::Value> {
        self.status.get("Failure")
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct NearRpcClient {
    http: reqwest::Client,
    url: Url,
}

impl NearRpcClient {
    pub fn new(url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, NearRpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "relayer",
            "method": method,
            "params": params,
        });
        let response: JsonRpcResponse<R> = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(NearRpcError::Rpc(error));
        }
        response.result.ok_or(NearRpcError::Malformed("missing result"))
    }

    /// Current nonce and a recent block hash for the signer's access key.
    pub async fn view_access_key(
        &self,
        account_id: &str,
        public_key: &str,
    ) -> Result<AccessKeyView, NearRpcError> {
        self.call(
            "query",
            json!({
                "request_type": "view_access_key",
                "finality": "final",
                "account_id": account_id,
                "public_key": public_key,
            }),
        )
        .await
    }

    /// Submits a signed transaction and waits for execution.
    pub async fn broadcast_tx_commit(
        &self,
        signed_tx_base64: String,
    ) -> Result<FinalExecutionOutcome, NearRpcError> {
        self.call("broadcast_tx_commit", json!([signed_tx_base64]))
            .await
    }
}

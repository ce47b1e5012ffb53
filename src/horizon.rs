//! Horizon NFT-metadata collaborator client.
//!
//! Wrapped NEAR NFT withdrawals mint the token on the destination, which
//! needs metadata the source chain does not carry. Horizon serves it over
//! HTTP as a JSON-API resource.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum HorizonError {
    #[error("horizon request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("horizon returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NftMetadata {
    pub name: String,
    #[serde(rename = "image_url")]
    pub image_url: String,
    #[serde(rename = "metadata_url")]
    pub metadata_url: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NftMetadataResponse {
    data: NftMetadataResource,
}

#[derive(Debug, Deserialize)]
struct NftMetadataResource {
    attributes: NftMetadata,
}

#[derive(Clone)]
pub struct Horizon {
    client: reqwest::Client,
    url: Url,
}

impl Horizon {
    pub fn new(url: Url) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client builds with static options");
        Self { client, url }
    }

    /// Fetches NFT metadata for a token on a chain.
    pub async fn nft_metadata(
        &self,
        chain: &str,
        token_index: &str,
        token_id: &str,
    ) -> Result<NftMetadata, HorizonError> {
        let endpoint = format!(
            "{}v1/items/{token_index}/chains/{chain}/nfts/{token_id}/metadata",
            self.url
        );
        let response = self.client.get(endpoint).send().await?;
        if !response.status().is_success() {
            return Err(HorizonError::Status(response.status()));
        }
        let payload: NftMetadataResponse = response.json().await?;
        Ok(payload.data.attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_api_resource() {
        let raw = r#"{
            "data": {
                "id": "1",
                "type": "nft_metadata",
                "attributes": {
                    "name": "Token #1",
                    "image_url": "https://img.example/1.png",
                    "metadata_url": "ipfs://meta",
                    "description": "a token"
                }
            }
        }"#;
        let parsed: NftMetadataResponse = serde_json::from_str(raw).expect("json-api payload");
        assert_eq!(parsed.data.attributes.name, "Token #1");
        assert_eq!(
            parsed.data.attributes.description.as_deref(),
            Some("a token")
        );
    }
}

use alloy_primitives::B256;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;

use super::{ENABLED_SECP256K1_FILTER, KeyHandle, KmsClient, KmsError, SignOutput};
use crate::config::KmsConfig;

/// Talks to the Google Cloud KMS REST surface.
pub struct HttpKmsClient {
    http: reqwest::Client,
    config: KmsConfig,
}

impl HttpKmsClient {
    pub fn new(config: KmsConfig) -> Result<Self, KmsError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| KmsError::Config(err.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.endpoint.trim_end_matches('/'))
    }
}

async fn check<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, KmsError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(KmsError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListVersionsResponse {
    #[serde(default)]
    crypto_key_versions: Vec<CryptoKeyVersion>,
    #[serde(default)]
    next_page_token: String,
}

#[derive(Deserialize)]
struct CryptoKeyVersion {
    name: String,
}

#[derive(Deserialize)]
struct PublicKeyResponse {
    pem: String,
}

// Int64 wrappers arrive as JSON strings on this API.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AsymmetricSignResponse {
    signature: String,
    #[serde(default)]
    signature_crc32c: String,
    #[serde(default)]
    verified_digest_crc32c: bool,
}

#[async_trait]
impl KmsClient for HttpKmsClient {
    async fn list_enabled_versions(&self) -> Result<Vec<String>, KmsError> {
        if let Some(pinned) = self.config.key_version_name() {
            return Ok(vec![pinned]);
        }
        let url = self.url(&format!("{}/cryptoKeyVersions", self.config.key_name()));
        let mut names = Vec::new();
        let mut page_token = String::new();
        loop {
            let mut request = self
                .http
                .get(&url)
                .query(&[("filter", ENABLED_SECP256K1_FILTER)]);
            if !page_token.is_empty() {
                request = request.query(&[("pageToken", page_token.as_str())]);
            }
            let page: ListVersionsResponse = check(request.send().await?).await?;
            names.extend(page.crypto_key_versions.into_iter().map(|v| v.name));
            if page.next_page_token.is_empty() {
                break;
            }
            page_token = page.next_page_token;
        }
        Ok(names)
    }

    async fn public_key_pem(&self, handle: &KeyHandle) -> Result<String, KmsError> {
        let url = self.url(&format!("{}/publicKey", handle.as_str()));
        let response: PublicKeyResponse = check(self.http.get(&url).send().await?).await?;
        Ok(response.pem)
    }

    async fn asymmetric_sign(
        &self,
        handle: &KeyHandle,
        digest: B256,
        digest_crc32c: u32,
    ) -> Result<SignOutput, KmsError> {
        let url = self.url(&format!("{}:asymmetricSign", handle.as_str()));
        let body = serde_json::json!({
            "digest": { "sha256": BASE64.encode(digest.as_slice()) },
            "digestCrc32c": digest_crc32c.to_string(),
        });
        let response: AsymmetricSignResponse =
            check(self.http.post(&url).json(&body).send().await?).await?;
        let der_signature = BASE64
            .decode(response.signature.as_bytes())
            .map_err(|err| KmsError::Malformed(format!("signature is not base64: {err}")))?;
        let signature_crc32c = response
            .signature_crc32c
            .parse::<u32>()
            .map_err(|err| KmsError::Malformed(format!("signatureCrc32c: {err}")))?;
        Ok(SignOutput {
            der_signature,
            signature_crc32c,
            verified_digest_crc32c: response.verified_digest_crc32c,
        })
    }
}

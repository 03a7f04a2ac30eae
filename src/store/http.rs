//! HTTP client for the content store API.
//!
//! Wire shape: `GET/PUT/DELETE {base}/objects/{path}` with base64 `content`,
//! a commit `message`, and an optional `versionToken` precondition in JSON
//! bodies; bearer credential on every request. Transient failures (network,
//! 5xx, 429) are absorbed here by the shared retry loop; 404 on GET is a
//! valid absent result; a stale token is a conflict and surfaces immediately.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{with_retry, FetchedObject, ObjectStore, PutReceipt, RetryPolicy, VersionToken};
use crate::error::{Error, Result};

pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    credential: String,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct ObjectResponse {
    content: String,
    #[serde(rename = "versionToken")]
    version_token: VersionToken,
}

#[derive(Serialize)]
struct PutRequest<'a> {
    content: String,
    message: &'a str,
    #[serde(rename = "versionToken", skip_serializing_if = "Option::is_none")]
    version_token: Option<&'a VersionToken>,
}

#[derive(Deserialize)]
struct PutResponse {
    #[serde(rename = "versionToken")]
    version_token: VersionToken,
    #[serde(rename = "downloadUrl")]
    download_url: String,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    #[serde(rename = "versionToken")]
    version_token: &'a VersionToken,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl HttpStore {
    pub fn new(
        base_url: &str,
        credential: &str,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(HttpStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.to_string(),
            retry,
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/objects/{}", self.base_url, path)
    }

    /// Map a non-success response to the error taxonomy, surfacing the
    /// remote-provided message where one exists.
    async fn response_error(path: &str, response: reqwest::Response) -> Error {
        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Error::Conflict(path.to_string());
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);
        Error::Remote {
            status: status.as_u16(),
            message,
        }
    }

    async fn get_once(&self, path: &str) -> Result<Option<FetchedObject>> {
        let response = self
            .client
            .get(self.object_url(path))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::response_error(path, response).await);
        }

        let parsed: ObjectResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let bytes = BASE64.decode(parsed.content.as_bytes()).map_err(|e| {
            Error::Remote {
                status: 200,
                message: format!("object content is not valid base64: {}", e),
            }
        })?;
        Ok(Some(FetchedObject {
            bytes,
            token: parsed.version_token,
        }))
    }

    async fn put_once(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<PutReceipt> {
        let body = PutRequest {
            content: BASE64.encode(bytes),
            message,
            version_token: expected,
        };
        let response = self
            .client
            .put(self.object_url(path))
            .bearer_auth(&self.credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::response_error(path, response).await);
        }

        let parsed: PutResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(PutReceipt {
            token: parsed.version_token,
            download_url: parsed.download_url,
        })
    }

    async fn delete_once(&self, path: &str, message: &str, token: &VersionToken) -> Result<()> {
        let body = DeleteRequest {
            message,
            version_token: token,
        };
        let response = self
            .client
            .delete(self.object_url(path))
            .bearer_auth(&self.credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::response_error(path, response).await);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObjectStore for HttpStore {
    async fn get_object(&self, path: &str) -> Result<Option<FetchedObject>> {
        with_retry(&self.retry, || self.get_once(path)).await
    }

    async fn put_object(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<PutReceipt> {
        with_retry(&self.retry, || self.put_once(path, bytes, message, expected)).await
    }

    async fn delete_object(&self, path: &str, message: &str, token: &VersionToken) -> Result<()> {
        with_retry(&self.retry, || self.delete_once(path, message, token)).await
    }
}

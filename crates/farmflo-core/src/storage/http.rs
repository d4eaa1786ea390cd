//! Presigned-upload client for the media API.
//!
//! The media API signs a one-off upload for an object key; the bytes then go
//! straight to cloud storage and the API-reported public URL is returned.

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{photo_object_key, ObjectStore};
use crate::identity::IdentityEvents;
use crate::config::is_http_url;
use crate::{Error, Result};

const ERROR_EXCERPT_CHARS: usize = 180;

const PRESIGN_UPLOAD_ROUTE: &str = "/v1/media/presign/upload";

/// HTTP object store backed by the media API.
#[derive(Clone)]
pub struct HttpObjectStore {
    base_url: String,
    api_key: Option<String>,
    namespace: Option<String>,
    identities: Option<IdentityEvents>,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into().as_str())?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Upload(format!("Failed to construct HTTP client: {error}")))?;
        Ok(Self {
            base_url,
            api_key: None,
            namespace: None,
            identities: None,
            client,
        })
    }

    /// Send `key` as the project `apikey` header.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Prefix object keys with `namespace`.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Authenticate uploads with the signed-in user's token.
    #[must_use]
    pub fn with_identity(mut self, identities: IdentityEvents) -> Self {
        self.identities = Some(identities);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn bearer_token(&self) -> Option<String> {
        self.identities
            .as_ref()
            .and_then(|identities| identities.borrow().clone())
            .map(|identity| identity.token)
            .or_else(|| self.api_key.clone())
    }

    async fn request_presigned(
        &self,
        object_key: &str,
        content_type: &str,
    ) -> Result<PresignResponse> {
        let mut request = self
            .client
            .post(format!("{}{PRESIGN_UPLOAD_ROUTE}", self.base_url))
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "object_key": object_key,
                "content_type": content_type,
            }));
        if let Some(token) = self.bearer_token() {
            request = request.bearer_auth(token);
        }
        if let Some(api_key) = &self.api_key {
            request = request.header("apikey", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| Error::Upload(format!("Failed to request signed URL: {error}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upload(format!(
                "Signed URL request failed with HTTP {status}: {}",
                error_excerpt(&body)
            )));
        }
        response.json::<PresignResponse>().await.map_err(|error| {
            Error::Upload(format!("Failed to parse signed URL response: {error}"))
        })
    }
}

impl fmt::Debug for HttpObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpObjectStore")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, bytes: &[u8], content_type_hint: &str) -> Result<String> {
        let object_key = photo_object_key(self.namespace.as_deref(), Utc::now());
        let content_type = if content_type_hint.trim().is_empty() {
            "application/octet-stream"
        } else {
            content_type_hint
        };
        let presigned = self.request_presigned(&object_key, content_type).await?;

        let operation = presigned.operation;
        let method = parse_method(&operation.method)?;
        let mut request = self.client.request(method, &operation.url);
        for (name, value) in operation.headers {
            if name.eq_ignore_ascii_case("host") {
                continue;
            }
            request = request.header(name, value);
        }
        let response = request
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|error| Error::Upload(format!("Upload request failed: {error}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upload(format!(
                "Upload request failed with HTTP {status}: {}",
                error_excerpt(&body)
            )));
        }

        tracing::debug!("Uploaded {} ({} bytes)", object_key, bytes.len());
        Ok(presigned.public_url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PresignResponse {
    operation: PresignedOperation,
    public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PresignedOperation {
    method: String,
    url: String,
    #[serde(default)]
    headers: Vec<(String, String)>,
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let base = raw.trim().trim_end_matches('/').to_string();
    if base.is_empty() {
        return Err(Error::InvalidInput(
            "Media API base URL must not be empty".to_string(),
        ));
    }
    if !is_http_url(&base) {
        return Err(Error::InvalidInput(
            "Media API base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(base)
}

/// Leading part of an error body, enough to identify the failure.
fn error_excerpt(body: &str) -> String {
    body.trim().chars().take(ERROR_EXCERPT_CHARS).collect()
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.as_bytes())
        .map_err(|error| Error::Upload(format!("Unsupported HTTP method: {error}")))
}

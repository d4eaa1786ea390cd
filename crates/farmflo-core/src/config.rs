//! Client configuration.
//!
//! Project identifiers and keys are resolved outside the marketplace core; this
//! module only reads them from the environment or a JSON payload and checks
//! their shape.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::HttpObjectStore;
use crate::{Error, Result};

pub const ENV_PROJECT_ID: &str = "FARMFLO_PROJECT_ID";
pub const ENV_API_KEY: &str = "FARMFLO_API_KEY";
pub const ENV_MEDIA_API_URL: &str = "FARMFLO_MEDIA_API_URL";

/// Build- or environment-provisioned client settings.
///
/// All values are public project settings; secrets must never be put here.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub media_api_base_url: Option<String>,
}

impl ClientConfig {
    /// Read the `FARMFLO_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, one call per variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self {
            project_id: lookup(ENV_PROJECT_ID),
            api_key: lookup(ENV_API_KEY),
            media_api_base_url: lookup(ENV_MEDIA_API_URL),
        }
        .normalized()
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::InvalidInput(format!("invalid client config JSON: {error}")))?;
        config.normalized()
    }

    /// Trim values, drop empties, and check the media URL scheme.
    pub fn normalized(self) -> Result<Self> {
        let media_api_base_url = match setting(self.media_api_base_url) {
            Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(_) => {
                return Err(Error::InvalidInput(format!(
                    "{ENV_MEDIA_API_URL} must include http:// or https://"
                )))
            }
            None => None,
        };
        Ok(Self {
            project_id: setting(self.project_id),
            api_key: setting(self.api_key),
            media_api_base_url,
        })
    }

    /// Names of settings that are not configured.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.project_id.is_none() {
            missing.push(ENV_PROJECT_ID);
        }
        if self.api_key.is_none() {
            missing.push(ENV_API_KEY);
        }
        if self.media_api_base_url.is_none() {
            missing.push(ENV_MEDIA_API_URL);
        }
        missing
    }

    /// HTTP object store for photo uploads, when a media API is configured.
    pub fn object_store(&self) -> Result<Option<HttpObjectStore>> {
        let Some(base_url) = &self.media_api_base_url else {
            return Ok(None);
        };
        let mut store = HttpObjectStore::new(base_url.clone())?;
        if let Some(api_key) = &self.api_key {
            store = store.with_api_key(api_key.clone());
        }
        if let Some(project_id) = &self.project_id {
            store = store.with_namespace(project_id.clone());
        }
        Ok(Some(store))
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("media_api_base_url", &self.media_api_base_url)
            .finish()
    }
}

/// Trimmed value, or `None` when absent or blank.
fn setting(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<ClientConfig> {
        ClientConfig::from_lookup(|name| map.get(name).map(ToString::to_string))
    }

    #[test]
    fn empty_environment_is_unconfigured() {
        let config = parse_from_map(&HashMap::new()).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.missing().len(), 3);
        assert!(config.object_store().unwrap().is_none());
    }

    #[test]
    fn values_are_trimmed_and_url_normalized() {
        let mut map = HashMap::new();
        map.insert(ENV_PROJECT_ID, " farmflo-dev ");
        map.insert(ENV_API_KEY, "   ");
        map.insert(ENV_MEDIA_API_URL, "https://media.example.com/");

        let config = parse_from_map(&map).unwrap();
        assert_eq!(config.project_id.as_deref(), Some("farmflo-dev"));
        assert_eq!(config.api_key, None);
        assert_eq!(
            config.media_api_base_url.as_deref(),
            Some("https://media.example.com")
        );
        assert_eq!(config.missing(), vec![ENV_API_KEY]);
        let store = config.object_store().unwrap().unwrap();
        assert_eq!(store.base_url(), "https://media.example.com");
    }

    #[test]
    fn rejects_media_url_without_scheme() {
        let mut map = HashMap::new();
        map.insert(ENV_MEDIA_API_URL, "media.example.com");

        match parse_from_map(&map).unwrap_err() {
            Error::InvalidInput(message) => assert!(message.contains(ENV_MEDIA_API_URL)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn json_rejects_unknown_fields() {
        let error = ClientConfig::from_json(r#"{"project_id": "p", "region": "eu"}"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ClientConfig {
            api_key: Some("AIzaSecret".to_string()),
            ..ClientConfig::default()
        };
        assert!(!format!("{config:?}").contains("AIzaSecret"));
    }
}

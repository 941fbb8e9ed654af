//! Federation with the root server.
//!
//! A leaf farm announces itself to a central root server, which hands out
//! the farm's global root id and the final form of its slug. `RootClient`
//! wraps the two calls involved and `reconcile` folds the root server's
//! answer back into the local record.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use log::info;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::farm::Farm;

/// How long one exchange with the root server may take before the save
/// fails instead of hanging the request.
const ROUND_TRIP_TIMEOUT: Duration = Duration::from_secs(10);

/// A failed exchange with the root server, either transport-level or a
/// non-success status.
#[derive(Debug)]
pub struct FederationError {
    message: String,
}

impl FederationError {
    fn new(message: String) -> Self {
        Self { message }
    }
}

impl fmt::Display for FederationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for FederationError {}

impl From<reqwest::Error> for FederationError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// HTTP client for a root server's farm registry.
pub struct RootClient {
    client: Client,
    base_url: String,
}

impl RootClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Returns the root server's base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Constructs a full API URL from a path
    pub fn api_url(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("{}/api/v1/{}", self.base_url, path)
    }

    /// Announces a farm that has no root id yet and returns the record the
    /// root server created for it.
    pub async fn register_farm(&self, farm: &Farm) -> Result<Farm, FederationError> {
        let url = self.api_url("/farm");
        let response = self
            .client
            .post(&url)
            .timeout(ROUND_TRIP_TIMEOUT)
            .json(farm)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Pushes an already-registered farm's current record and returns the
    /// root server's view of it.
    pub async fn update_farm(&self, root_id: u64, farm: &Farm) -> Result<Farm, FederationError> {
        let url = self.api_url(&format!("/farm/{}", root_id));
        let response = self
            .client
            .put(&url)
            .timeout(ROUND_TRIP_TIMEOUT)
            .json(farm)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Handles HTTP response, deserializing success or returning error
    async fn handle_response<T>(&self, response: Response) -> Result<T, FederationError>
    where
        T: DeserializeOwned,
    {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            let msg = if error.is_empty() {
                "no error details from the root server".to_string()
            } else {
                error
            };
            Err(FederationError::new(msg))
        }
    }
}

/// Folds the root server's answer into the local farm record.
///
/// The root server owns the root id and the final spelling of the slug;
/// whatever it assigned wins. Everything else stays local.
pub fn reconcile(mut local: Farm, remote: &Farm) -> Farm {
    if let Some(root_id) = remote.root_id {
        if local.root_id != Some(root_id) {
            info!("root server assigned root id {}", root_id);
            local.root_id = Some(root_id);
        }
    }
    if !remote.slug.is_empty() && remote.slug != local.slug {
        info!(
            "root server adjusted slug {:?} to {:?}",
            local.slug, remote.slug
        );
        local.slug = remote.slug.clone();
    }
    local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_urls_are_prefixed() {
        let client = RootClient::new("http://root.example.com".to_string());
        assert_eq!(
            client.api_url("/farm"),
            "http://root.example.com/api/v1/farm"
        );
        assert_eq!(
            client.api_url("farm/7"),
            "http://root.example.com/api/v1/farm/7"
        );
    }

    #[test]
    fn reconcile_adopts_the_assigned_root_id() {
        let mut local = Farm::unconfigured();
        local.name = Some("Petting Zoo".to_string());
        local.slug = "petting-zoo".to_string();
        let mut remote = local.clone();
        remote.root_id = Some(42);

        let merged = reconcile(local, &remote);
        assert_eq!(merged.root_id, Some(42));
        assert_eq!(merged.slug, "petting-zoo");
    }

    #[test]
    fn reconcile_adopts_the_assigned_slug() {
        let mut local = Farm::unconfigured();
        local.slug = "petting-zoo".to_string();
        local.root_id = Some(42);
        let mut remote = local.clone();
        remote.slug = "petting-zoo-42".to_string();

        let merged = reconcile(local, &remote);
        assert_eq!(merged.slug, "petting-zoo-42");
    }

    #[test]
    fn reconcile_ignores_an_empty_remote_slug() {
        let mut local = Farm::unconfigured();
        local.slug = "petting-zoo".to_string();
        let mut remote = local.clone();
        remote.slug = String::new();

        let merged = reconcile(local, &remote);
        assert_eq!(merged.slug, "petting-zoo");
    }
}

//! HTTP client for the Spot Ocean right-sizing API

use super::SuggestionProvider;
use crate::error::{MutatorError, Unavailable};
use crate::models::{ClusterIdentity, DeploymentRef, Suggestion};
use crate::quantity::MEBIBYTE;
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Public Spot API endpoint
pub const DEFAULT_OCEAN_BASE_URL: &str = "https://api.spotinst.io";

const CLUSTERS_PATH: &str = "ocean/aws/k8s/cluster";

/// Connection settings for the Ocean API
#[derive(Debug, Clone)]
pub struct OceanConfig {
    /// API base URL
    pub base_url: String,
    /// Bearer token
    pub token: Option<String>,
    /// Spot account id, sent as `accountId`
    pub account: Option<String>,
    /// Timeout for each HTTP call
    pub request_timeout: Duration,
}

impl Default for OceanConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OCEAN_BASE_URL.to_string(),
            token: None,
            account: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    response: ApiItems<T>,
}

#[derive(Debug, Deserialize)]
struct ApiItems<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// An Ocean cluster as listed by the API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OceanCluster {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub controller_cluster_id: Option<String>,
}

/// Right-sizing entry for one deployment
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSuggestion {
    pub deployment_name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Milli-cores
    #[serde(default, rename = "suggestedCPU")]
    pub suggested_cpu: Option<u64>,
    /// Mebibytes
    #[serde(default)]
    pub suggested_memory: Option<u64>,
}

impl ResourceSuggestion {
    pub fn to_suggestion(&self) -> Suggestion {
        Suggestion {
            cpu_milli: self.suggested_cpu,
            memory_bytes: self.suggested_memory.map(|mib| mib.saturating_mul(MEBIBYTE)),
        }
    }
}

/// Suggestion provider backed by the Ocean API
pub struct OceanClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    account: Option<String>,
}

impl OceanClient {
    pub fn new(config: OceanConfig) -> Result<Self, MutatorError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MutatorError::transport(format!("failed to create HTTP client: {e}")))?;

        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            MutatorError::transport(format!("invalid Ocean base URL '{}': {e}", config.base_url))
        })?;

        Ok(Self {
            client,
            base_url,
            token: config.token.filter(|t| !t.is_empty()),
            account: config.account.filter(|a| !a.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, MutatorError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| MutatorError::transport(format!("invalid path '{path}': {e}")))?;

        let mut request = self.client.get(url.clone()).query(query);
        if let Some(account) = &self.account {
            request = request.query(&[("accountId", account.as_str())]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MutatorError::transport(format!(
                "GET {url} returned {status}: {body}"
            )));
        }

        let envelope: ApiEnvelope<T> = response.json().await?;
        Ok(envelope.response.items)
    }

    /// Ocean cluster managed by the given controller id
    pub async fn find_cluster(&self, cluster: &ClusterIdentity) -> Result<OceanCluster, MutatorError> {
        let clusters: Vec<OceanCluster> = self.get(CLUSTERS_PATH, &[]).await?;
        debug!(count = clusters.len(), "Listed Ocean clusters");

        clusters
            .into_iter()
            .find(|c| c.controller_cluster_id.as_deref() == Some(cluster.as_str()))
            .ok_or_else(|| {
                Unavailable::NoCluster {
                    cluster_id: cluster.to_string(),
                }
                .into()
            })
    }

    /// Right-sizing suggestions for a namespace of an Ocean cluster
    pub async fn list_suggestions(
        &self,
        ocean_id: &str,
        namespace: &str,
    ) -> Result<Vec<ResourceSuggestion>, MutatorError> {
        let path = format!("{CLUSTERS_PATH}/{ocean_id}/rightSizing/resourceSuggestion");
        self.get(&path, &[("namespace", namespace)]).await
    }
}

#[async_trait]
impl SuggestionProvider for OceanClient {
    async fn lookup(
        &self,
        deployment: &DeploymentRef,
        cluster: &ClusterIdentity,
    ) -> Result<Suggestion, MutatorError> {
        let ocean = self.find_cluster(cluster).await?;
        let suggestions = self.list_suggestions(&ocean.id, &deployment.namespace).await?;

        let entry = suggestions
            .iter()
            .find(|s| s.deployment_name == deployment.name)
            .ok_or_else(|| Unavailable::NoDeployment {
                deployment: deployment.name.clone(),
                namespace: deployment.namespace.clone(),
            })?;

        info!(
            deployment = %deployment,
            ocean_id = %ocean.id,
            suggested_cpu_milli = ?entry.suggested_cpu,
            suggested_memory_mib = ?entry.suggested_memory,
            "Found resource suggestion"
        );

        Ok(entry.to_suggestion())
    }
}

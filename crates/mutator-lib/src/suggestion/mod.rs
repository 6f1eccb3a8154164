//! Resource suggestion lookup
//!
//! The webhook only consumes suggestions. [`SuggestionProvider`] is the seam
//! between the admission path and whatever backend computes them; the
//! [`OceanClient`] talks to the Spot Ocean right-sizing API.

mod ocean;

pub use ocean::{OceanClient, OceanConfig, DEFAULT_OCEAN_BASE_URL};

use crate::error::MutatorError;
use crate::models::{ClusterIdentity, DeploymentRef, Suggestion};
use async_trait::async_trait;

/// Source of per-deployment sizing suggestions
///
/// Implementations own their network and retry behavior. Lookups that find
/// nothing return [`MutatorError::SuggestionUnavailable`]; failed calls
/// return [`MutatorError::Transport`].
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    async fn lookup(
        &self,
        deployment: &DeploymentRef,
        cluster: &ClusterIdentity,
    ) -> Result<Suggestion, MutatorError>;
}

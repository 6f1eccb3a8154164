//! Error taxonomy for the admission path
//!
//! Every variant is recoverable: the webhook maps each one to an allowed
//! admission response carrying the error text, see [`crate::admission`].

use thiserror::Error;

/// Why no suggestion could be found for a deployment
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unavailable {
    /// No Ocean cluster is managed by the configured controller id
    #[error("no cluster was found with controllerClusterId '{cluster_id}'")]
    NoCluster { cluster_id: String },

    /// The cluster has no suggestion entry for this deployment
    #[error("no resource suggestions found for deployment '{deployment}' in namespace '{namespace}'")]
    NoDeployment {
        deployment: String,
        namespace: String,
    },
}

/// Errors raised while turning an admission request into a patch
#[derive(Debug, Error)]
pub enum MutatorError {
    /// Malformed review, unexpected resource kind or unparsable object
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The suggestion backend has nothing for this deployment
    #[error("suggestion unavailable: {0}")]
    SuggestionUnavailable(#[from] Unavailable),

    /// The suggestion backend could not be reached or answered garbage
    #[error("suggestion backend error: {0}")]
    Transport(String),

    /// A document or patch failed to serialize
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MutatorError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Stable label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            MutatorError::Protocol(_) => "protocol",
            MutatorError::SuggestionUnavailable(_) => "suggestion_unavailable",
            MutatorError::Transport(_) => "transport",
            MutatorError::Serialization(_) => "serialization",
        }
    }
}

impl From<reqwest::Error> for MutatorError {
    fn from(err: reqwest::Error) -> Self {
        MutatorError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(MutatorError::protocol("x").kind(), "protocol");
        assert_eq!(MutatorError::transport("x").kind(), "transport");
        let unavailable: MutatorError = Unavailable::NoCluster {
            cluster_id: "c-1".to_string(),
        }
        .into();
        assert_eq!(unavailable.kind(), "suggestion_unavailable");

        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(MutatorError::from(serde_err).kind(), "serialization");
    }

    #[test]
    fn test_unavailable_message_names_deployment() {
        let err: MutatorError = Unavailable::NoDeployment {
            deployment: "web".to_string(),
            namespace: "shop".to_string(),
        }
        .into();
        let message = err.to_string();
        assert!(message.contains("'web'"));
        assert!(message.contains("'shop'"));
    }
}

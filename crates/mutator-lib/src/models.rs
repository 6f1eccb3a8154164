//! Core data models for the resource mutator

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single resource request value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAmount {
    pub cpu_milli: u64,
    pub memory_bytes: u64,
}

impl ResourceAmount {
    pub fn new(cpu_milli: u64, memory_bytes: u64) -> Self {
        Self {
            cpu_milli,
            memory_bytes,
        }
    }
}

/// Current requests of one container in a pod template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequest {
    pub name: String,
    pub requests: ResourceAmount,
}

impl ContainerRequest {
    pub fn new(name: impl Into<String>, cpu_milli: u64, memory_bytes: u64) -> Self {
        Self {
            name: name.into(),
            requests: ResourceAmount::new(cpu_milli, memory_bytes),
        }
    }
}

/// A container's proportion of the pod's total requests
///
/// A share is `None` when the pod-wide total for that resource is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerRatio {
    pub cpu_share: Option<f64>,
    pub mem_share: Option<f64>,
}

/// Externally computed total for a deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub cpu_milli: Option<u64>,
    pub memory_bytes: Option<u64>,
}

/// Identity of the deployment under admission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentRef {
    pub name: String,
    pub namespace: String,
}

impl DeploymentRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for DeploymentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Ocean controller id of the cluster this webhook runs in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIdentity(pub String);

impl ClusterIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

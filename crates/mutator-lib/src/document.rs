//! Deployment documents under admission
//!
//! The raw JSON object is kept untouched so the patch only ever covers the
//! request fields written by [`DeploymentDocument::apply`].

use crate::engine::{MutationPlan, Resolution};
use crate::error::MutatorError;
use crate::models::{ContainerRequest, DeploymentRef, ResourceAmount};
use crate::quantity::{cpu_quantity, memory_quantity, parse_cpu_milli, parse_memory_bytes};
use k8s_openapi::api::apps::v1::Deployment;
use serde_json::{Map, Value};

/// A Deployment object as received, with a typed view over it
#[derive(Debug, Clone)]
pub struct DeploymentDocument {
    raw: Value,
    typed: Deployment,
}

impl DeploymentDocument {
    /// Parse the admission object as an `apps/v1` Deployment
    pub fn from_value(raw: Value) -> Result<Self, MutatorError> {
        let typed: Deployment = serde_json::from_value(raw.clone())
            .map_err(|e| MutatorError::protocol(format!("object is not a valid Deployment: {e}")))?;
        Ok(Self { raw, typed })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Identity used for the suggestion lookup.
    ///
    /// Objects on CREATE often omit `metadata.namespace`; the request's
    /// namespace is used then.
    pub fn identity(&self, request_namespace: Option<&str>) -> DeploymentRef {
        let meta = &self.typed.metadata;
        let name = meta.name.clone().unwrap_or_default();
        let namespace = meta
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .or(request_namespace)
            .unwrap_or("default");
        DeploymentRef::new(name, namespace)
    }

    /// Current requests of the pod template containers, in order.
    ///
    /// Missing `resources`, `requests` or individual entries count as zero.
    pub fn containers(&self) -> Result<Vec<ContainerRequest>, MutatorError> {
        let containers = self
            .typed
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .map(|pod| pod.containers.as_slice())
            .unwrap_or_default();

        containers
            .iter()
            .map(|container| {
                let requests = container
                    .resources
                    .as_ref()
                    .and_then(|r| r.requests.as_ref());
                let cpu_milli = match requests.and_then(|r| r.get("cpu")) {
                    Some(q) => parse_cpu_milli(&q.0).map_err(|e| {
                        MutatorError::protocol(format!("container '{}': {e}", container.name))
                    })?,
                    None => 0,
                };
                let memory_bytes = match requests.and_then(|r| r.get("memory")) {
                    Some(q) => parse_memory_bytes(&q.0).map_err(|e| {
                        MutatorError::protocol(format!("container '{}': {e}", container.name))
                    })?,
                    None => 0,
                };
                Ok(ContainerRequest {
                    name: container.name.clone(),
                    requests: ResourceAmount::new(cpu_milli, memory_bytes),
                })
            })
            .collect()
    }

    /// Copy of the raw document with the replaced requests written in.
    ///
    /// Only `/spec/template/spec/containers/<i>/resources/requests/{cpu,memory}`
    /// is touched, and only for resolutions that replace a value.
    pub fn apply(&self, plan: &MutationPlan) -> Result<Value, MutatorError> {
        let mut mutated = self.raw.clone();
        if !plan.has_changes() {
            return Ok(mutated);
        }

        let containers = mutated
            .pointer_mut("/spec/template/spec/containers")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| MutatorError::protocol("deployment has no pod template containers"))?;

        for mutation in plan.containers.iter().filter(|m| m.changed()) {
            let container = containers
                .iter_mut()
                .find(|c| c.get("name").and_then(Value::as_str) == Some(mutation.name.as_str()))
                .ok_or_else(|| {
                    MutatorError::protocol(format!(
                        "container '{}' not found in pod template",
                        mutation.name
                    ))
                })?;

            let requests = requests_object(container).ok_or_else(|| {
                MutatorError::protocol(format!(
                    "container '{}' has a non-object resources field",
                    mutation.name
                ))
            })?;

            if let Resolution::Replaced(milli) = mutation.cpu {
                requests.insert("cpu".to_string(), serde_json::to_value(cpu_quantity(milli))?);
            }
            if let Resolution::Replaced(bytes) = mutation.memory {
                requests.insert(
                    "memory".to_string(),
                    serde_json::to_value(memory_quantity(bytes))?,
                );
            }
        }

        Ok(mutated)
    }
}

/// `resources.requests` of a container, created when missing
fn requests_object(container: &mut Value) -> Option<&mut Map<String, Value>> {
    let resources = container
        .as_object_mut()?
        .entry("resources")
        .or_insert_with(|| Value::Object(Map::new()));
    if resources.is_null() {
        *resources = Value::Object(Map::new());
    }
    let requests = resources
        .as_object_mut()?
        .entry("requests")
        .or_insert_with(|| Value::Object(Map::new()));
    if requests.is_null() {
        *requests = Value::Object(Map::new());
    }
    requests.as_object_mut()
}

//! AdmissionReview envelope (admission.k8s.io/v1beta1)
//!
//! Only the fields this webhook reads or writes are modelled. Responses are
//! always allowed: failures travel back as `status.message`.

use crate::error::MutatorError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API version answered when the request does not carry one
pub const DEFAULT_ADMISSION_API_VERSION: &str = "admission.k8s.io/v1beta1";

const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

/// Group/version/resource of the object under admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    /// `apps/v1, Resource=deployments`
    pub fn deployments() -> Self {
        Self {
            group: "apps".to_string(),
            version: "v1".to_string(),
            resource: "deployments".to_string(),
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}, Resource={}", self.version, self.resource)
        } else {
            write!(f, "{}/{}, Resource={}", self.group, self.version, self.resource)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    pub resource: GroupVersionResource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Base64 of the JSON Patch bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,
}

impl AdmissionResponse {
    /// Allowed without changes
    pub fn allow(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: true,
            status: None,
            patch: None,
            patch_type: None,
        }
    }

    /// Allowed, applying the given JSON Patch bytes
    pub fn with_patch(mut self, patch: &[u8]) -> Self {
        self.patch = Some(STANDARD.encode(patch));
        self.patch_type = Some(PatchType::JsonPatch);
        self
    }

    /// Allowed and unmodified, carrying the failure text
    pub fn fail_open(uid: impl Into<String>, err: &MutatorError) -> Self {
        Self {
            status: Some(Status {
                message: err.to_string(),
            }),
            ..Self::allow(uid)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

impl AdmissionReview {
    /// Decode a review from the request body
    pub fn decode(body: &[u8]) -> Result<Self, MutatorError> {
        serde_json::from_slice(body)
            .map_err(|e| MutatorError::protocol(format!("failed to decode AdmissionReview: {e}")))
    }

    /// Wrap a response, echoing the caller's API version
    pub fn respond(api_version: Option<&str>, response: AdmissionResponse) -> Self {
        Self {
            api_version: Some(
                api_version
                    .filter(|v| !v.is_empty())
                    .unwrap_or(DEFAULT_ADMISSION_API_VERSION)
                    .to_string(),
            ),
            kind: Some(ADMISSION_REVIEW_KIND.to_string()),
            request: None,
            response: Some(response),
        }
    }
}

//! Resource request mutation for Kubernetes Deployments
//!
//! This crate provides the core functionality for:
//! - Parsing container requests out of admitted Deployments
//! - Redistributing a per-deployment sizing suggestion across containers
//! - Building the JSON Patch and AdmissionReview response
//! - Looking up suggestions from the Ocean right-sizing API
//! - Health checks and observability

pub mod admission;
pub mod document;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod patch;
pub mod quantity;
pub mod ratio;
pub mod suggestion;
pub mod webhook;

pub use engine::{DriftPolicy, MutationEngine, MutationPlan, Resolution};
pub use error::{MutatorError, Unavailable};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MutatorMetrics, StructuredLogger};
pub use suggestion::{OceanClient, OceanConfig, SuggestionProvider};
pub use webhook::{webhook_router, WebhookState, MUTATE_PATH};

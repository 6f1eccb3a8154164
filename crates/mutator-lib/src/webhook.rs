//! Mutating admission endpoint for Deployments
//!
//! Each review runs `decode -> ratios -> mutate -> patch -> respond` on its
//! own task. Nothing here ever denies admission: every failure is answered
//! with `allowed: true`, the error text and no patch.

use crate::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, GroupVersionResource};
use crate::document::DeploymentDocument;
use crate::engine::MutationEngine;
use crate::error::MutatorError;
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::{ClusterIdentity, DeploymentRef, Suggestion};
use crate::observability::{outcomes, MutatorMetrics, StructuredLogger};
use crate::patch::{build_patch, encode_patch};
use crate::ratio::compute_ratios;
use crate::suggestion::SuggestionProvider;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Path the API server posts Deployment reviews to
pub const MUTATE_PATH: &str = "/ocean-rs-mutator";

/// Shared, read-only state for admission handlers
pub struct WebhookState {
    provider: Arc<dyn SuggestionProvider>,
    cluster: ClusterIdentity,
    engine: MutationEngine,
    health: HealthRegistry,
    metrics: MutatorMetrics,
    logger: StructuredLogger,
}

impl WebhookState {
    pub fn new(
        provider: Arc<dyn SuggestionProvider>,
        cluster: ClusterIdentity,
        health: HealthRegistry,
    ) -> Self {
        let logger = StructuredLogger::new(cluster.as_str());
        Self {
            provider,
            cluster,
            engine: MutationEngine::new(),
            health,
            metrics: MutatorMetrics::new(),
            logger,
        }
    }

    /// Answer one admission review body
    pub async fn review(&self, body: &[u8], deadline: Option<Duration>) -> AdmissionReview {
        let started = Instant::now();

        let (api_version, response) = match AdmissionReview::decode(body) {
            Ok(review) => {
                let response = match review.request {
                    Some(request) => self.admit(&request, deadline).await,
                    None => self.fail_open(
                        "",
                        MutatorError::protocol("admission review carries no request"),
                    ),
                };
                (review.api_version, response)
            }
            Err(err) => (None, self.fail_open("", err)),
        };

        self.metrics
            .observe_admission_latency(started.elapsed().as_secs_f64());
        AdmissionReview::respond(api_version.as_deref(), response)
    }

    async fn admit(&self, request: &AdmissionRequest, deadline: Option<Duration>) -> AdmissionResponse {
        let (deployment, patch) = match self.mutate(request, deadline).await {
            Ok(result) => result,
            Err(err) => return self.fail_open(&request.uid, err),
        };

        let bytes = match encode_patch(&patch) {
            Ok(bytes) => bytes,
            Err(err) => return self.fail_open(&request.uid, err),
        };

        match bytes {
            Some(bytes) => {
                self.metrics.inc_admission(outcomes::PATCHED);
                self.logger
                    .log_patched(&request.uid, &deployment.to_string(), patch.0.len());
                AdmissionResponse::allow(request.uid.clone()).with_patch(&bytes)
            }
            None => {
                self.metrics.inc_admission(outcomes::UNCHANGED);
                debug!(uid = %request.uid, deployment = %deployment, "No request changes needed");
                AdmissionResponse::allow(request.uid.clone())
            }
        }
    }

    /// Compute the patch for one request
    pub async fn mutate(
        &self,
        request: &AdmissionRequest,
        deadline: Option<Duration>,
    ) -> Result<(DeploymentRef, json_patch::Patch), MutatorError> {
        let expected = GroupVersionResource::deployments();
        if request.resource != expected {
            return Err(MutatorError::protocol(format!(
                "expected resource to be {expected}, got {}; request passed unmodified",
                request.resource
            )));
        }

        let object = request
            .object
            .clone()
            .ok_or_else(|| MutatorError::protocol("admission request carries no object"))?;
        let document = DeploymentDocument::from_value(object)?;
        let deployment = document.identity(request.namespace.as_deref());
        let containers = document.containers()?;

        let suggestion = self.lookup(&deployment, deadline).await?;

        let ratios = compute_ratios(&containers);
        let plan = self.engine.mutate(&containers, &ratios, &suggestion);

        let name = deployment.to_string();
        for container in &plan.containers {
            for (resource, reason) in container.gaps() {
                self.metrics.inc_unresolved(resource.as_str(), reason.as_str());
                self.logger
                    .log_unresolved(&name, &container.name, resource.as_str(), reason.as_str());
            }
        }

        let mutated = document.apply(&plan)?;
        let patch = build_patch(document.raw(), &mutated);
        Ok((deployment, patch))
    }

    async fn lookup(
        &self,
        deployment: &DeploymentRef,
        deadline: Option<Duration>,
    ) -> Result<Suggestion, MutatorError> {
        let started = Instant::now();
        let lookup = self.provider.lookup(deployment, &self.cluster);

        let result = match deadline {
            Some(limit) => tokio::time::timeout(limit, lookup)
                .await
                .unwrap_or_else(|_| {
                    Err(MutatorError::transport(format!(
                        "suggestion lookup exceeded the {}ms admission deadline",
                        limit.as_millis()
                    )))
                }),
            None => lookup.await,
        };
        self.metrics
            .observe_lookup_latency(started.elapsed().as_secs_f64());

        match &result {
            Err(MutatorError::Transport(message)) => {
                self.health
                    .set_degraded(components::SUGGESTION_BACKEND, message.clone())
                    .await;
            }
            Ok(_) | Err(MutatorError::SuggestionUnavailable(_)) => {
                if self.health.status_of(components::SUGGESTION_BACKEND).await
                    != Some(ComponentStatus::Healthy)
                {
                    self.health.set_healthy(components::SUGGESTION_BACKEND).await;
                }
            }
            Err(_) => {}
        }

        result
    }

    fn fail_open(&self, uid: &str, err: MutatorError) -> AdmissionResponse {
        self.metrics.inc_admission(outcomes::FAILED_OPEN);
        self.metrics.inc_error(err.kind());
        self.logger.log_fail_open(uid, err.kind(), &err.to_string());
        AdmissionResponse::fail_open(uid, &err)
    }
}

/// Query parameters the API server appends to webhook calls
#[derive(Debug, Default, Deserialize)]
pub struct AdmissionParams {
    /// Remaining admission budget, e.g. `10s`
    pub timeout: Option<String>,
}

/// Parse the API server's `timeout` parameter (`10s`, `500ms`, `1m`)
pub fn parse_deadline(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Some(ms) = raw.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = raw.strip_suffix('s') {
        return secs.parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = raw.strip_suffix('m') {
        return mins
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m.saturating_mul(60)));
    }
    None
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|media| media.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    params: Option<Query<AdmissionParams>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        error!(content_type = %content_type, "Unexpected content type, expected application/json");
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    // An unparsable query only loses the deadline; the review is still answered.
    let deadline = params
        .and_then(|Query(params)| params.timeout)
        .as_deref()
        .and_then(parse_deadline);
    Json(state.review(&body, deadline).await).into_response()
}

/// Router exposing the single mutating endpoint
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(mutate_handler))
        .with_state(state)
}

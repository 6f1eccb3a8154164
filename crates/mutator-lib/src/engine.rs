//! Mutation decisions for container resource requests
//!
//! Redistributes a deployment-wide suggestion across containers in
//! proportion to their current requests. Each resource is decided on its own:
//! - an absent request (zero) is filled from the suggestion when possible
//! - a present request is only replaced when it drifts outside the allowed
//!   band around the suggested total

use crate::models::{ContainerRatio, ContainerRequest, ResourceAmount, Suggestion};
use crate::quantity::{ceil_mebibytes, MEBIBYTE};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Allowed CPU drift before a present request is replaced
pub const DEFAULT_CPU_DRIFT_RATIO: f64 = 0.2;

/// Allowed memory drift before a present request is replaced
pub const DEFAULT_MEM_DRIFT_RATIO: f64 = 0.2;

/// Tolerance band around current requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftPolicy {
    pub cpu_drift_ratio: f64,
    pub mem_drift_ratio: f64,
}

impl Default for DriftPolicy {
    fn default() -> Self {
        Self {
            cpu_drift_ratio: DEFAULT_CPU_DRIFT_RATIO,
            mem_drift_ratio: DEFAULT_MEM_DRIFT_RATIO,
        }
    }
}

/// Resource dimension being decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Memory,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Cpu => "cpu",
            Resource::Memory => "memory",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a missing request could not be filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// The suggestion has no total for this resource
    NoSuggestion,
    /// Every container in the pod requests zero, so there is no ratio
    NoPeers,
}

impl GapReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapReason::NoSuggestion => "no_suggestion",
            GapReason::NoPeers => "no_peers",
        }
    }
}

/// Outcome for one resource of one container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "value")]
pub enum Resolution {
    /// Current value stays as it is
    Kept,
    /// Replaced with a new value (milli-cores or bytes)
    Replaced(u64),
    /// Request is missing and there was nothing to derive it from
    Unresolved(GapReason),
}

impl Resolution {
    /// Value after the decision, given the current one
    pub fn value_or(&self, current: u64) -> u64 {
        match self {
            Resolution::Replaced(value) => *value,
            Resolution::Kept | Resolution::Unresolved(_) => current,
        }
    }

    pub fn is_replaced(&self) -> bool {
        matches!(self, Resolution::Replaced(_))
    }
}

/// Decisions for one container
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerMutation {
    pub name: String,
    pub current: ResourceAmount,
    pub cpu: Resolution,
    pub memory: Resolution,
}

impl ContainerMutation {
    pub fn resolved(&self) -> ResourceAmount {
        ResourceAmount {
            cpu_milli: self.cpu.value_or(self.current.cpu_milli),
            memory_bytes: self.memory.value_or(self.current.memory_bytes),
        }
    }

    pub fn changed(&self) -> bool {
        self.cpu.is_replaced() || self.memory.is_replaced()
    }

    /// Unresolved gaps for this container, if any
    pub fn gaps(&self) -> impl Iterator<Item = (Resource, GapReason)> + '_ {
        [(Resource::Cpu, self.cpu), (Resource::Memory, self.memory)]
            .into_iter()
            .filter_map(|(resource, resolution)| match resolution {
                Resolution::Unresolved(reason) => Some((resource, reason)),
                _ => None,
            })
    }
}

/// Ordered decisions for every container of a pod template
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MutationPlan {
    pub containers: Vec<ContainerMutation>,
}

impl MutationPlan {
    /// New request per container name
    pub fn amounts(&self) -> BTreeMap<String, ResourceAmount> {
        self.containers
            .iter()
            .map(|m| (m.name.clone(), m.resolved()))
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.containers.iter().any(ContainerMutation::changed)
    }
}

/// Applies the drift policy to redistribute a suggestion
#[derive(Debug, Clone, Default)]
pub struct MutationEngine {
    policy: DriftPolicy,
}

impl MutationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DriftPolicy) -> Self {
        Self { policy }
    }

    /// Decide the new request of every container.
    ///
    /// Containers absent from `ratios` are treated as having undefined shares.
    pub fn mutate(
        &self,
        containers: &[ContainerRequest],
        ratios: &BTreeMap<String, ContainerRatio>,
        suggestion: &Suggestion,
    ) -> MutationPlan {
        let containers = containers
            .iter()
            .map(|container| {
                let ratio = ratios.get(&container.name).copied().unwrap_or_default();

                let cpu = resolve(
                    container.requests.cpu_milli,
                    suggestion.cpu_milli,
                    ratio.cpu_share,
                    self.policy.cpu_drift_ratio,
                    |milli| milli,
                );
                let memory = resolve(
                    container.requests.memory_bytes,
                    suggestion.memory_bytes,
                    ratio.mem_share,
                    self.policy.mem_drift_ratio,
                    |bytes| ceil_mebibytes(bytes).saturating_mul(MEBIBYTE),
                );

                debug!(
                    container = %container.name,
                    current_cpu_milli = container.requests.cpu_milli,
                    current_memory_bytes = container.requests.memory_bytes,
                    cpu = ?cpu,
                    memory = ?memory,
                    "Resolved container requests"
                );

                ContainerMutation {
                    name: container.name.clone(),
                    current: container.requests,
                    cpu,
                    memory,
                }
            })
            .collect();

        MutationPlan { containers }
    }
}

/// ceil(total * share), saturating at u64::MAX
fn allocate(total: u64, share: f64) -> u64 {
    let value = (total as f64 * share).ceil();
    if value >= u64::MAX as f64 {
        u64::MAX
    } else {
        value as u64
    }
}

/// Whether `current` lies outside `[(1-drift)*current, (1+drift)*current]`
/// as seen from the suggested total.
fn outside_band(current: u64, total: u64, drift: f64) -> bool {
    let current = current as f64;
    let total = total as f64;
    (1.0 - drift) * current > total || (1.0 + drift) * current < total
}

fn resolve(
    current: u64,
    suggested: Option<u64>,
    share: Option<f64>,
    drift: f64,
    round: impl Fn(u64) -> u64,
) -> Resolution {
    let replacement = |total: u64, share: f64| {
        let value = round(allocate(total, share));
        if value == current {
            Resolution::Kept
        } else {
            Resolution::Replaced(value)
        }
    };

    if current == 0 {
        return match (suggested, share) {
            (None, _) => Resolution::Unresolved(GapReason::NoSuggestion),
            (Some(_), None) => Resolution::Unresolved(GapReason::NoPeers),
            (Some(total), Some(share)) => replacement(total, share),
        };
    }

    match (suggested, share) {
        (Some(total), Some(share)) if total != 0 && outside_band(current, total, drift) => {
            replacement(total, share)
        }
        _ => Resolution::Kept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratio::compute_ratios;

    const MI: u64 = MEBIBYTE;

    fn plan_for(containers: &[ContainerRequest], suggestion: Suggestion) -> MutationPlan {
        MutationEngine::new().mutate(containers, &compute_ratios(containers), &suggestion)
    }

    #[test]
    fn test_cpu_only_suggestion_splits_evenly() {
        let containers = vec![
            ContainerRequest::new("a", 100, 128 * MI),
            ContainerRequest::new("b", 100, 128 * MI),
        ];
        let plan = plan_for(
            &containers,
            Suggestion {
                cpu_milli: Some(300),
                memory_bytes: None,
            },
        );

        for m in &plan.containers {
            assert_eq!(m.cpu, Resolution::Replaced(150));
            assert_eq!(m.memory, Resolution::Kept);
        }
        assert_eq!(plan.amounts()["a"], ResourceAmount::new(150, 128 * MI));
    }

    #[test]
    fn test_absent_request_filled_from_share() {
        let containers = vec![ContainerRequest::new("a", 0, 0)];
        let mut ratios = BTreeMap::new();
        ratios.insert(
            "a".to_string(),
            ContainerRatio {
                cpu_share: Some(0.25),
                mem_share: None,
            },
        );
        let suggestion = Suggestion {
            cpu_milli: Some(400),
            memory_bytes: None,
        };

        let plan = MutationEngine::new().mutate(&containers, &ratios, &suggestion);
        assert_eq!(plan.containers[0].cpu, Resolution::Replaced(100));
        assert_eq!(
            plan.containers[0].memory,
            Resolution::Unresolved(GapReason::NoSuggestion)
        );
    }

    #[test]
    fn test_drift_outside_band_is_replaced() {
        let containers = vec![
            ContainerRequest::new("app", 1000, 0),
            ContainerRequest::new("sidecar", 1000, 0),
        ];
        let plan = plan_for(
            &containers,
            Suggestion {
                cpu_milli: Some(1300),
                memory_bytes: None,
            },
        );

        // 1300 is outside [800, 1200] for each container.
        assert_eq!(plan.containers[0].cpu, Resolution::Replaced(650));
        assert_eq!(plan.containers[1].cpu, Resolution::Replaced(650));
    }

    #[test]
    fn test_single_container_outside_band() {
        let containers = vec![ContainerRequest::new("app", 1000, 0)];
        let plan = plan_for(
            &containers,
            Suggestion {
                cpu_milli: Some(1300),
                memory_bytes: None,
            },
        );
        assert_eq!(plan.containers[0].cpu, Resolution::Replaced(1300));
    }

    #[test]
    fn test_inside_band_is_kept_and_fixed_point() {
        let containers = vec![ContainerRequest::new("app", 1000, 512 * MI)];
        let suggestion = Suggestion {
            cpu_milli: Some(1150),
            memory_bytes: Some(450 * MI),
        };
        let plan = plan_for(&containers, suggestion);
        assert_eq!(plan.containers[0].cpu, Resolution::Kept);
        assert_eq!(plan.containers[0].memory, Resolution::Kept);
        assert!(!plan.has_changes());

        let again: Vec<_> = plan
            .containers
            .iter()
            .map(|m| {
                let amount = m.resolved();
                ContainerRequest::new(m.name.clone(), amount.cpu_milli, amount.memory_bytes)
            })
            .collect();
        assert_eq!(plan_for(&again, suggestion).amounts(), plan.amounts());
    }

    #[test]
    fn test_band_edges_are_inclusive() {
        let containers = vec![ContainerRequest::new("app", 1000, 0)];
        for total in [800, 1200] {
            let plan = plan_for(
                &containers,
                Suggestion {
                    cpu_milli: Some(total),
                    memory_bytes: None,
                },
            );
            assert_eq!(plan.containers[0].cpu, Resolution::Kept, "total {total}");
        }
    }

    #[test]
    fn test_zero_suggestion_never_replaces_present_value() {
        let containers = vec![ContainerRequest::new("app", 1000, 256 * MI)];
        let plan = plan_for(
            &containers,
            Suggestion {
                cpu_milli: Some(0),
                memory_bytes: Some(0),
            },
        );
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_zero_total_pod_is_unresolved() {
        let containers = vec![
            ContainerRequest::new("a", 0, 0),
            ContainerRequest::new("b", 0, 0),
        ];
        let plan = plan_for(
            &containers,
            Suggestion {
                cpu_milli: Some(500),
                memory_bytes: None,
            },
        );

        for m in &plan.containers {
            assert_eq!(m.cpu, Resolution::Unresolved(GapReason::NoPeers));
            assert_eq!(m.memory, Resolution::Unresolved(GapReason::NoSuggestion));
            assert_eq!(m.resolved(), ResourceAmount::default());
        }
        let gaps: Vec<_> = plan.containers[0].gaps().collect();
        assert_eq!(
            gaps,
            vec![
                (Resource::Cpu, GapReason::NoPeers),
                (Resource::Memory, GapReason::NoSuggestion)
            ]
        );
    }

    #[test]
    fn test_memory_rounds_up_to_mebibytes() {
        let containers = vec![
            ContainerRequest::new("a", 0, 100 * MI),
            ContainerRequest::new("b", 0, 200 * MI),
        ];
        let plan = plan_for(
            &containers,
            Suggestion {
                cpu_milli: None,
                memory_bytes: Some(1000 * MI),
            },
        );

        // 1000Mi / 3 = 333.33Mi -> 334Mi, 2000Mi / 3 = 666.67Mi -> 667Mi
        assert_eq!(plan.containers[0].memory, Resolution::Replaced(334 * MI));
        assert_eq!(plan.containers[1].memory, Resolution::Replaced(667 * MI));
    }

    #[test]
    fn test_saturated_memory_suggestion_does_not_overflow() {
        let containers = vec![ContainerRequest::new("app", 1000, 512 * MI)];
        let plan = plan_for(
            &containers,
            Suggestion {
                cpu_milli: Some(u64::MAX),
                memory_bytes: Some(u64::MAX),
            },
        );

        assert_eq!(plan.containers[0].cpu, Resolution::Replaced(u64::MAX));
        assert_eq!(plan.containers[0].memory, Resolution::Replaced(u64::MAX));
    }

    #[test]
    fn test_custom_policy_widens_band() {
        let containers = vec![ContainerRequest::new("app", 1000, 0)];
        let engine = MutationEngine::with_policy(DriftPolicy {
            cpu_drift_ratio: 0.5,
            mem_drift_ratio: 0.2,
        });
        let suggestion = Suggestion {
            cpu_milli: Some(1300),
            memory_bytes: None,
        };
        let plan = engine.mutate(&containers, &compute_ratios(&containers), &suggestion);
        assert_eq!(plan.containers[0].cpu, Resolution::Kept);
    }

    #[test]
    fn test_mutate_is_deterministic() {
        let containers = vec![
            ContainerRequest::new("a", 120, 300 * MI),
            ContainerRequest::new("b", 0, 0),
            ContainerRequest::new("c", 880, 724 * MI),
        ];
        let suggestion = Suggestion {
            cpu_milli: Some(3000),
            memory_bytes: Some(4096 * MI),
        };
        assert_eq!(
            plan_for(&containers, suggestion),
            plan_for(&containers, suggestion)
        );
    }
}

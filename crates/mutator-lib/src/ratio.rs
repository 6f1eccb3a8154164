//! Per-container share of a pod's total resource requests

use crate::models::{ContainerRatio, ContainerRequest};
use std::collections::BTreeMap;

fn share(part: u64, total: u128) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64)
}

/// Compute each container's share of total requested CPU and memory.
///
/// A share is left undefined when the pod-wide total for that resource is
/// zero; nothing is divided in that case.
pub fn compute_ratios(containers: &[ContainerRequest]) -> BTreeMap<String, ContainerRatio> {
    // Summed in u128: a handful of exabyte-sized requests overflow u64.
    let total_cpu: u128 = containers
        .iter()
        .map(|c| u128::from(c.requests.cpu_milli))
        .sum();
    let total_mem: u128 = containers
        .iter()
        .map(|c| u128::from(c.requests.memory_bytes))
        .sum();

    containers
        .iter()
        .map(|c| {
            let ratio = ContainerRatio {
                cpu_share: share(c.requests.cpu_milli, total_cpu),
                mem_share: share(c.requests.memory_bytes, total_mem),
            };
            (c.name.clone(), ratio)
        })
        .collect()
}

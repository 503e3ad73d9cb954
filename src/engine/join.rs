//! Attribution of pods to the workloads that manage them. Pods link to
//! Deployments through an intermediate ReplicaSet, so the pod-template hash
//! suffix has to be peeled off the ReplicaSet name.

use std::collections::HashMap;

use crate::sources::{PodInfo, WorkloadSpec};
use crate::types::WorkloadKind;

/// Owner kinds that make a pod controller-managed. Anything else (or no
/// owner at all) is an orphan.
const CONTROLLER_KINDS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet", "Job"];

pub type WorkloadKey = (WorkloadKind, String, String);

pub fn controller_owned(pod: &PodInfo) -> bool {
    pod.owner
        .as_ref()
        .map(|o| CONTROLLER_KINDS.contains(&o.kind.as_str()))
        .unwrap_or(false)
}

/// ReplicaSets created by a Deployment are named `<deployment>-<hash>`; drop
/// the hash segment to recover the Deployment name. Attribution is validated
/// against the actual workload list, so a bare ReplicaSet whose trimmed name
/// matches nothing simply stays unattributed.
fn trim_pod_template_hash(rs_name: &str) -> Option<&str> {
    rs_name.rsplit_once('-').map(|(prefix, _)| prefix)
}

/// Candidate workload identity for a pod, derived from its controller owner.
pub fn workload_candidate(pod: &PodInfo) -> Option<WorkloadKey> {
    let owner = pod.owner.as_ref()?;
    match owner.kind.as_str() {
        "Deployment" => Some((
            WorkloadKind::Deployment,
            pod.namespace.clone(),
            owner.name.clone(),
        )),
        "ReplicaSet" => trim_pod_template_hash(&owner.name).map(|name| {
            (
                WorkloadKind::Deployment,
                pod.namespace.clone(),
                name.to_string(),
            )
        }),
        "StatefulSet" => Some((
            WorkloadKind::StatefulSet,
            pod.namespace.clone(),
            owner.name.clone(),
        )),
        "DaemonSet" => Some((
            WorkloadKind::DaemonSet,
            pod.namespace.clone(),
            owner.name.clone(),
        )),
        _ => None,
    }
}

/// Index pods under the listed workloads. Pods whose candidate identity does
/// not appear in the workload list are left out.
pub fn index_pods<'a>(
    workloads: &[WorkloadSpec],
    pods: &'a [PodInfo],
) -> HashMap<WorkloadKey, Vec<&'a PodInfo>> {
    let mut index: HashMap<WorkloadKey, Vec<&PodInfo>> = workloads
        .iter()
        .map(|w| {
            (
                (
                    w.workload.kind,
                    w.workload.namespace.clone(),
                    w.workload.name.clone(),
                ),
                Vec::new(),
            )
        })
        .collect();

    for pod in pods {
        if let Some(key) = workload_candidate(pod) {
            if let Some(bucket) = index.get_mut(&key) {
                bucket.push(pod);
            }
        }
    }
    index
}

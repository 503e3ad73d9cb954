//! Pure detection logic of the waste scanner. Orphan pods and stale jobs
//! need only inventories; idle workloads additionally need the usage window,
//! which the engine fetches and passes in.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::join::controller_owned;
use super::utilization::aggregate_resources;
use crate::parsing::utilization_pct;
use crate::sources::{JobInfo, PodInfo, WorkloadSpec};
use crate::types::{IdleWorkload, MetricSample, OrphanPod, StaleJob};

fn hours_since(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    (now - then).num_seconds() as f64 / 3600.0
}

/// Pods with no owner reference to a recognized controller.
pub fn detect_orphan_pods(pods: &[PodInfo], now: DateTime<Utc>) -> Vec<OrphanPod> {
    let mut orphans: Vec<OrphanPod> = pods
        .iter()
        .filter(|p| !controller_owned(p))
        .map(|p| OrphanPod {
            pod_id: p.name.clone(),
            namespace: p.namespace.clone(),
            age_hours: p.started_at.map(|t| hours_since(now, t)).unwrap_or(0.0),
        })
        .collect();
    orphans.sort_by(|a, b| b.age_hours.total_cmp(&a.age_hours));
    orphans
}

/// Jobs whose terminal condition (Succeeded or Failed) is older than
/// `stale_hours`. Active jobs are excluded regardless of age.
pub fn detect_stale_jobs(jobs: &[JobInfo], stale_hours: i64, now: DateTime<Utc>) -> Vec<StaleJob> {
    let mut stale: Vec<StaleJob> = jobs
        .iter()
        .filter(|j| !j.active)
        .filter_map(|j| {
            let completion = j.completion.as_ref()?;
            let age_hours = hours_since(now, completion.at);
            (age_hours > stale_hours as f64).then(|| StaleJob {
                name: j.name.clone(),
                namespace: j.namespace.clone(),
                age_hours,
            })
        })
        .collect();
    stale.sort_by(|a, b| b.age_hours.total_cmp(&a.age_hours));
    stale
}

/// Idle check for one workload against its usage window. Qualifies only when
/// both dimensions stay below the floor across the whole window; the
/// percentage is computed from summed per-pod peaks, so a single spike on any
/// pod disqualifies. One sample is not a window.
pub fn idle_candidate(
    spec: &WorkloadSpec,
    live_pods: &[&PodInfo],
    samples: &[MetricSample],
    idle_floor_pct: f64,
    now: DateTime<Utc>,
) -> Option<IdleWorkload> {
    if live_pods.is_empty() || samples.len() < 2 {
        return None;
    }
    let requests = aggregate_resources(&spec.resources, spec.workload.desired_replicas);

    let mut peak_cpu: HashMap<&str, i64> = HashMap::new();
    let mut peak_memory: HashMap<&str, i64> = HashMap::new();
    for sample in samples {
        let cpu = peak_cpu.entry(sample.pod_id.as_str()).or_insert(0);
        *cpu = (*cpu).max(sample.cpu_millicores);
        let memory = peak_memory.entry(sample.pod_id.as_str()).or_insert(0);
        *memory = (*memory).max(sample.memory_bytes);
    }
    let total_peak_cpu: i64 = peak_cpu.values().sum();
    let total_peak_memory: i64 = peak_memory.values().sum();

    // Absent requests make the percentages indeterminate; an indeterminate
    // workload is never flagged idle.
    let cpu_pct = utilization_pct(total_peak_cpu, requests.cpu_request_millicores)?;
    let memory_pct = utilization_pct(total_peak_memory, requests.memory_request_bytes)?;
    if cpu_pct >= idle_floor_pct || memory_pct >= idle_floor_pct {
        return None;
    }

    let since = spec
        .created_at
        .or_else(|| live_pods.iter().filter_map(|p| p.started_at).min());
    Some(IdleWorkload {
        workload: spec.workload.clone(),
        cpu_pct,
        memory_pct,
        age_hours: since.map(|t| hours_since(now, t)).unwrap_or(0.0),
    })
}

pub fn sort_idle(mut idle: Vec<IdleWorkload>) -> Vec<IdleWorkload> {
    idle.sort_by(|a, b| b.age_hours.total_cmp(&a.age_hours));
    idle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{JobCompletion, JobOutcome, OwnerRef};
    use crate::types::{ResourceSpec, WorkloadKind, WorkloadRef};
    use chrono::Duration;

    fn pod(name: &str, owner: Option<(&str, &str)>, age_hours: i64) -> PodInfo {
        PodInfo {
            name: name.to_string(),
            namespace: "default".to_string(),
            owner: owner.map(|(kind, name)| OwnerRef {
                kind: kind.to_string(),
                name: name.to_string(),
            }),
            ready: true,
            started_at: Some(Utc::now() - Duration::hours(age_hours)),
        }
    }

    fn job(name: &str, completed_hours_ago: Option<i64>, active: bool) -> JobInfo {
        JobInfo {
            name: name.to_string(),
            namespace: "default".to_string(),
            completion: completed_hours_ago.map(|h| JobCompletion {
                outcome: JobOutcome::Succeeded,
                at: Utc::now() - Duration::hours(h),
            }),
            active,
        }
    }

    fn sample(pod_id: &str, cpu: i64, memory: i64) -> MetricSample {
        MetricSample {
            pod_id: pod_id.to_string(),
            timestamp: Utc::now(),
            cpu_millicores: cpu,
            memory_bytes: memory,
        }
    }

    fn idle_spec() -> WorkloadSpec {
        WorkloadSpec {
            workload: WorkloadRef {
                kind: WorkloadKind::Deployment,
                namespace: "default".to_string(),
                name: "sleeper".to_string(),
                desired_replicas: 1,
            },
            resources: ResourceSpec {
                cpu_request_millicores: Some(1000),
                memory_request_bytes: Some(1024 * 1024 * 1024),
                ..ResourceSpec::default()
            },
            created_at: Some(Utc::now() - Duration::hours(100)),
        }
    }

    #[test]
    fn test_orphans_sorted_oldest_first() {
        let pods = vec![
            pod("young-orphan", None, 2),
            pod("old-orphan", Some(("Node", "worker-1")), 50),
            pod("owned", Some(("ReplicaSet", "web-abc")), 90),
        ];
        let orphans = detect_orphan_pods(&pods, Utc::now());
        assert_eq!(orphans.len(), 2);
        assert_eq!(orphans[0].pod_id, "old-orphan");
        assert_eq!(orphans[1].pod_id, "young-orphan");
    }

    #[test]
    fn test_stale_jobs_exclude_active_and_recent() {
        let jobs = vec![
            job("ancient", Some(72), false),
            job("older", Some(200), false),
            job("recent", Some(2), false),
            job("active-but-old", Some(100), true),
            job("never-finished", None, false),
        ];
        let stale = detect_stale_jobs(&jobs, 24, Utc::now());
        let names: Vec<&str> = stale.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["older", "ancient"]);
    }

    #[test]
    fn test_idle_workload_below_floor_across_window() {
        let spec = idle_spec();
        let pods = vec![pod("sleeper-x", Some(("ReplicaSet", "sleeper-x")), 90)];
        let pod_refs: Vec<&PodInfo> = pods.iter().collect();
        let samples = vec![
            sample("sleeper-x", 10, 10 * 1024 * 1024),
            sample("sleeper-x", 20, 20 * 1024 * 1024),
            sample("sleeper-x", 5, 8 * 1024 * 1024),
        ];
        let idle = idle_candidate(&spec, &pod_refs, &samples, 5.0, Utc::now()).unwrap();
        assert!((idle.cpu_pct - 2.0).abs() < 1e-9);
        assert!(idle.memory_pct < 5.0);
    }

    #[test]
    fn test_single_spike_disqualifies_idle() {
        let spec = idle_spec();
        let pods = vec![pod("sleeper-x", Some(("ReplicaSet", "sleeper-x")), 90)];
        let pod_refs: Vec<&PodInfo> = pods.iter().collect();
        let samples = vec![
            sample("sleeper-x", 10, 10 * 1024 * 1024),
            sample("sleeper-x", 900, 10 * 1024 * 1024),
        ];
        assert!(idle_candidate(&spec, &pod_refs, &samples, 5.0, Utc::now()).is_none());
    }

    #[test]
    fn test_single_sample_is_not_a_window() {
        let spec = idle_spec();
        let pods = vec![pod("sleeper-x", Some(("ReplicaSet", "sleeper-x")), 90)];
        let pod_refs: Vec<&PodInfo> = pods.iter().collect();
        let samples = vec![sample("sleeper-x", 1, 1024)];
        assert!(idle_candidate(&spec, &pod_refs, &samples, 5.0, Utc::now()).is_none());
    }

    #[test]
    fn test_absent_request_never_flags_idle() {
        let mut spec = idle_spec();
        spec.resources.memory_request_bytes = None;
        let pods = vec![pod("sleeper-x", Some(("ReplicaSet", "sleeper-x")), 90)];
        let pod_refs: Vec<&PodInfo> = pods.iter().collect();
        let samples = vec![sample("sleeper-x", 1, 1024), sample("sleeper-x", 2, 1024)];
        assert!(idle_candidate(&spec, &pod_refs, &samples, 5.0, Utc::now()).is_none());
    }
}

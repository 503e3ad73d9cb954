//! Pure classification logic of the utilization analyzer: request
//! aggregation, percentage computation, and the three-way threshold
//! classification with severity merge.

use crate::parsing::utilization_pct;
use crate::sources::WorkloadSpec;
use crate::types::{ResourceSpec, UsageTotals, UtilizationRecord, UtilizationStatus};

/// Per-replica sums scaled by the desired replica count. Absent fields stay
/// absent; an unspecified request must not become `replicas * 0`.
pub fn aggregate_resources(per_replica: &ResourceSpec, replicas: i32) -> ResourceSpec {
    let factor = i64::from(replicas.max(0));
    let scale = |v: Option<i64>| v.map(|x| x * factor);
    ResourceSpec {
        cpu_request_millicores: scale(per_replica.cpu_request_millicores),
        cpu_limit_millicores: scale(per_replica.cpu_limit_millicores),
        memory_request_bytes: scale(per_replica.memory_request_bytes),
        memory_limit_bytes: scale(per_replica.memory_limit_bytes),
    }
}

/// Threshold classification, boundary inclusive: pct >= 100τ is OK,
/// [50τ, 100τ) is WARN, below 50τ is UNDERUTILIZED.
pub fn classify_pct(pct: f64, threshold: f64) -> UtilizationStatus {
    let ok_floor = threshold * 100.0;
    let warn_floor = threshold * 50.0;
    if pct >= ok_floor {
        UtilizationStatus::Ok
    } else if pct >= warn_floor {
        UtilizationStatus::Warn
    } else {
        UtilizationStatus::Underutilized
    }
}

fn severity(status: UtilizationStatus) -> u8 {
    match status {
        UtilizationStatus::Ok => 0,
        UtilizationStatus::Warn => 1,
        UtilizationStatus::Underutilized => 2,
        // Indeterminate statuses never reach the severity merge.
        UtilizationStatus::Unknown | UtilizationStatus::NoData => 0,
    }
}

/// Overall status from the two independent dimensions: the more severe one
/// wins; UNKNOWN only when both are indeterminate.
pub fn overall_status(
    cpu_pct: Option<f64>,
    memory_pct: Option<f64>,
    threshold: f64,
) -> UtilizationStatus {
    let statuses: Vec<UtilizationStatus> = [cpu_pct, memory_pct]
        .iter()
        .flatten()
        .map(|pct| classify_pct(*pct, threshold))
        .collect();
    statuses
        .into_iter()
        .max_by_key(|s| severity(*s))
        .unwrap_or(UtilizationStatus::Unknown)
}

/// Build the record for one workload from its aggregated spec and the summed
/// usage of its ready pods. `usage` is `None` when the workload has no ready
/// pods or no pod produced a sample.
pub fn build_record(
    spec: &WorkloadSpec,
    usage: Option<UsageTotals>,
    threshold: f64,
) -> UtilizationRecord {
    let requests = aggregate_resources(&spec.resources, spec.workload.desired_replicas);
    match usage {
        None => UtilizationRecord {
            workload: spec.workload.clone(),
            requests,
            usage: None,
            cpu_pct: None,
            memory_pct: None,
            status: UtilizationStatus::NoData,
        },
        Some(used) => {
            let cpu_pct = utilization_pct(used.cpu_millicores, requests.cpu_request_millicores);
            let memory_pct = utilization_pct(used.memory_bytes, requests.memory_request_bytes);
            let status = overall_status(cpu_pct, memory_pct, threshold);
            UtilizationRecord {
                workload: spec.workload.clone(),
                requests,
                usage: Some(used),
                cpu_pct,
                memory_pct,
                status,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{WorkloadKind, WorkloadRef};

    fn spec(cpu_req: Option<i64>, mem_req: Option<i64>, replicas: i32) -> WorkloadSpec {
        WorkloadSpec {
            workload: WorkloadRef {
                kind: WorkloadKind::Deployment,
                namespace: "default".to_string(),
                name: "web".to_string(),
                desired_replicas: replicas,
            },
            resources: ResourceSpec {
                cpu_request_millicores: cpu_req,
                memory_request_bytes: mem_req,
                ..ResourceSpec::default()
            },
            created_at: None,
        }
    }

    #[test]
    fn test_classification_boundaries_inclusive() {
        // request=500m, threshold 0.5: the OK boundary sits at exactly 50%.
        let threshold = 0.5;
        assert_eq!(classify_pct(50.0, threshold), UtilizationStatus::Ok);
        assert_eq!(classify_pct(49.8, threshold), UtilizationStatus::Warn);
        assert_eq!(classify_pct(25.0, threshold), UtilizationStatus::Warn);
        assert_eq!(classify_pct(24.9, threshold), UtilizationStatus::Underutilized);
        assert_eq!(classify_pct(20.0, threshold), UtilizationStatus::Underutilized);
        assert_eq!(classify_pct(0.0, threshold), UtilizationStatus::Underutilized);
        assert_eq!(classify_pct(200.0, threshold), UtilizationStatus::Ok);
    }

    #[test]
    fn test_overall_status_takes_more_severe_dimension() {
        let t = 0.5;
        assert_eq!(
            overall_status(Some(60.0), Some(10.0), t),
            UtilizationStatus::Underutilized
        );
        assert_eq!(
            overall_status(Some(30.0), Some(60.0), t),
            UtilizationStatus::Warn
        );
        assert_eq!(
            overall_status(Some(60.0), Some(70.0), t),
            UtilizationStatus::Ok
        );
        // One dimension indeterminate: the other decides.
        assert_eq!(
            overall_status(None, Some(10.0), t),
            UtilizationStatus::Underutilized
        );
        assert_eq!(overall_status(Some(80.0), None, t), UtilizationStatus::Ok);
        // Both indeterminate.
        assert_eq!(overall_status(None, None, t), UtilizationStatus::Unknown);
    }

    #[test]
    fn test_aggregate_scales_by_replicas_and_keeps_absence() {
        let aggregated = aggregate_resources(
            &ResourceSpec {
                cpu_request_millicores: Some(250),
                memory_request_bytes: None,
                ..ResourceSpec::default()
            },
            4,
        );
        assert_eq!(aggregated.cpu_request_millicores, Some(1000));
        assert_eq!(aggregated.memory_request_bytes, None);
    }

    #[test]
    fn test_build_record_no_usage_is_no_data() {
        let record = build_record(&spec(Some(500), Some(1024), 1), None, 0.5);
        assert_eq!(record.status, UtilizationStatus::NoData);
        assert_eq!(record.cpu_pct, None);
        assert_eq!(record.memory_pct, None);
    }

    #[test]
    fn test_build_record_absent_request_is_unknown_not_zero() {
        let usage = UsageTotals {
            cpu_millicores: 250,
            memory_bytes: 512,
        };
        let record = build_record(&spec(None, None, 1), Some(usage), 0.5);
        assert_eq!(record.status, UtilizationStatus::Unknown);
        assert_eq!(record.cpu_pct, None);
        assert_eq!(record.memory_pct, None);
    }

    #[test]
    fn test_build_record_spec_properties() {
        // request=500, used=250, τ=0.5 -> 50%, OK on the inclusive boundary.
        let usage = |cpu| UsageTotals {
            cpu_millicores: cpu,
            memory_bytes: 0,
        };
        let s = spec(Some(500), None, 1);

        let record = build_record(&s, Some(usage(250)), 0.5);
        assert_eq!(record.cpu_pct, Some(50.0));
        assert_eq!(record.status, UtilizationStatus::Ok);

        let record = build_record(&s, Some(usage(249)), 0.5);
        assert_eq!(record.cpu_pct, Some(49.8));
        assert_eq!(record.status, UtilizationStatus::Warn);

        let record = build_record(&s, Some(usage(100)), 0.5);
        assert_eq!(record.cpu_pct, Some(20.0));
        assert_eq!(record.status, UtilizationStatus::Underutilized);
    }
}

//! Collaborator boundary of the engine: an object source for cluster state
//! and a metrics source for usage telemetry. The engine is generic over both,
//! so tests run against in-memory fakes and production runs against the
//! kube-backed implementations.

pub mod backoff;
pub mod kubernetes;

pub use kubernetes::{KubeMetricsSource, KubeObjectSource};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SourceError;
use crate::types::{MetricSample, ResourceSpec, Scope, WorkloadKind, WorkloadRef};

/// One workload as listed from the cluster. `resources` is the per-replica
/// container sum; a container without a declared request marks the whole
/// field absent rather than contributing zero.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    pub workload: WorkloadRef,
    pub resources: ResourceSpec,
    pub created_at: Option<DateTime<Utc>>,
}

/// Controller owner of a pod, taken from its controller owner reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub owner: Option<OwnerRef>,
    pub ready: bool,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub outcome: JobOutcome,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JobInfo {
    pub name: String,
    pub namespace: String,
    /// Most recent terminal condition, if the job has one.
    pub completion: Option<JobCompletion>,
    /// Jobs with running pods are never stale, whatever their age.
    pub active: bool,
}

#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn list_workloads(
        &self,
        scope: &Scope,
        kind: WorkloadKind,
    ) -> Result<Vec<WorkloadSpec>, SourceError>;

    async fn list_pods(&self, scope: &Scope) -> Result<Vec<PodInfo>, SourceError>;

    async fn list_jobs(&self, scope: &Scope) -> Result<Vec<JobInfo>, SourceError>;
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Latest usage for one pod. `Ok(None)` means the source is reachable but
    /// holds no sample for this pod; that is a different signal from an
    /// unreachable endpoint and from zero usage.
    async fn latest_usage(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Option<MetricSample>, SourceError>;

    /// Historical usage for one pod over the trailing window.
    async fn historical_usage(
        &self,
        namespace: &str,
        pod: &str,
        window_hours: i64,
    ) -> Result<Vec<MetricSample>, SourceError>;
}

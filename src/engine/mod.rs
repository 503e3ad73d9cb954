//! Core entry points of the optimization engine: analyze, recommend,
//! detect_waste, summarize. The engine is generic over the two collaborator
//! traits; every call fans out its fetches concurrently, joins in memory, and
//! imposes deterministic ordering afterwards.

pub mod join;
pub mod recommend;
pub mod summary;
pub mod utilization;
pub mod waste;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{map_source_err, OptimizeError, SourceError, SourceOrigin};
use crate::sources::{MetricsSource, ObjectSource, PodInfo, WorkloadSpec};
use crate::types::{
    Analysis, AnalyzeParams, MetricSample, Recommendation, RecommendParams, Scope, SkippedKind,
    SummaryParams, SummaryReport, UsageTotals, UtilizationRecord, WasteParams, WasteReport,
    WorkloadKind, WorkloadRef, DEFAULT_MAX_CONCURRENT_FETCHES,
};

pub struct OptimizationEngine<C, M> {
    objects: C,
    metrics: M,
}

async fn with_deadline<T, F>(
    operation: &str,
    timeout: Option<Duration>,
    fut: F,
) -> Result<T, OptimizeError>
where
    F: Future<Output = Result<T, OptimizeError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
            Err(OptimizeError::Cancelled {
                operation: operation.to_string(),
            })
        }),
        None => fut.await,
    }
}

impl<C: ObjectSource, M: MetricsSource> OptimizationEngine<C, M> {
    pub fn new(objects: C, metrics: M) -> Self {
        Self { objects, metrics }
    }

    /// Utilization pass over the scope. Fails fast when the metrics source is
    /// unreachable; workload kinds denied by RBAC are skipped and annotated.
    pub async fn analyze(&self, params: &AnalyzeParams) -> Result<Analysis, OptimizeError> {
        params.validate()?;
        with_deadline("analyze", params.timeout, self.analyze_inner(params)).await
    }

    /// Sizing recommendation for one workload from its historical usage
    /// window. Pure math once the samples are in; all-or-nothing on failure.
    pub async fn recommend(
        &self,
        workload: &WorkloadRef,
        params: &RecommendParams,
    ) -> Result<Recommendation, OptimizeError> {
        params.validate()?;
        with_deadline(
            "recommend",
            params.timeout,
            self.recommend_inner(workload, params),
        )
        .await
    }

    /// Waste scan over the scope. Orphan and stale detection need no metrics;
    /// the idle scan is skipped (and annotated) when metrics are unavailable.
    pub async fn detect_waste(&self, params: &WasteParams) -> Result<WasteReport, OptimizeError> {
        params.validate()?;
        with_deadline(
            "detect_waste",
            params.timeout,
            self.detect_waste_inner(params, true),
        )
        .await
    }

    /// One analyzer pass plus one waste pass, merged. Metrics unavailability
    /// degrades the report instead of failing; cancellation and cluster
    /// failures stay fatal.
    pub async fn summarize(&self, params: &SummaryParams) -> Result<SummaryReport, OptimizeError> {
        params.validate()?;
        with_deadline("summarize", params.timeout, self.summarize_inner(params)).await
    }

    async fn analyze_inner(&self, params: &AnalyzeParams) -> Result<Analysis, OptimizeError> {
        let (workload_result, pods_result) = tokio::join!(
            self.fetch_workloads(&params.scope),
            self.objects.list_pods(&params.scope)
        );
        let (workloads, skipped) = workload_result?;
        let pods =
            pods_result.map_err(|e| map_source_err(SourceOrigin::Cluster, "list pods", e))?;

        let index = join::index_pods(&workloads, &pods);
        let ready_pods: Vec<&PodInfo> = index
            .values()
            .flatten()
            .copied()
            .filter(|p| p.ready)
            .collect();
        let usage_by_pod = self
            .latest_usage_map(&ready_pods, DEFAULT_MAX_CONCURRENT_FETCHES)
            .await?;

        let mut records: Vec<UtilizationRecord> = workloads
            .iter()
            .map(|spec| {
                let key = (
                    spec.workload.kind,
                    spec.workload.namespace.clone(),
                    spec.workload.name.clone(),
                );
                let usage = workload_usage(index.get(&key), &usage_by_pod);
                utilization::build_record(spec, usage, params.threshold)
            })
            .collect();
        records.sort_by(|a, b| {
            (a.workload.namespace.as_str(), a.workload.name.as_str())
                .cmp(&(b.workload.namespace.as_str(), b.workload.name.as_str()))
        });

        info!(
            "analyzed {} workloads ({} kinds skipped)",
            records.len(),
            skipped.len()
        );
        Ok(Analysis { records, skipped })
    }

    async fn recommend_inner(
        &self,
        workload: &WorkloadRef,
        params: &RecommendParams,
    ) -> Result<Recommendation, OptimizeError> {
        let scope = Scope::namespace(&workload.namespace);
        let operation = format!("list {}s", workload.kind);
        let listed = self
            .objects
            .list_workloads(&scope, workload.kind)
            .await
            .map_err(|e| map_source_err(SourceOrigin::Cluster, &operation, e))?;
        let spec = listed
            .into_iter()
            .find(|w| w.workload.name == workload.name)
            .ok_or_else(|| OptimizeError::DataIncomplete {
                subject: workload.to_string(),
                message: "workload not found in scope".to_string(),
            })?;

        let pods = self
            .objects
            .list_pods(&scope)
            .await
            .map_err(|e| map_source_err(SourceOrigin::Cluster, "list pods", e))?;
        let specs = [spec];
        let index = join::index_pods(&specs, &pods);
        let [spec] = specs;
        let attributed: Vec<&PodInfo> = index.into_values().flatten().collect();

        let samples = self
            .historical_samples(&attributed, params.window_hours, params.max_concurrent_fetches)
            .await
            .map_err(|e| map_source_err(SourceOrigin::Metrics, "historical usage", e))?;

        recommend::compute_recommendation(spec.workload, spec.resources, &samples, params)
    }

    async fn detect_waste_inner(
        &self,
        params: &WasteParams,
        metrics_available: bool,
    ) -> Result<WasteReport, OptimizeError> {
        let (workload_result, pods_result, jobs_result) = tokio::join!(
            self.fetch_workloads(&params.scope),
            self.objects.list_pods(&params.scope),
            self.objects.list_jobs(&params.scope)
        );
        let (workloads, skipped) = workload_result?;
        for skip in &skipped {
            warn!("idle scan cannot cover {}s: {}", skip.kind, skip.reason);
        }
        let pods =
            pods_result.map_err(|e| map_source_err(SourceOrigin::Cluster, "list pods", e))?;
        let jobs =
            jobs_result.map_err(|e| map_source_err(SourceOrigin::Cluster, "list jobs", e))?;

        let now = Utc::now();
        let orphan_pods = waste::detect_orphan_pods(&pods, now);
        let stale_jobs = waste::detect_stale_jobs(&jobs, params.stale_hours, now);

        let mut report = WasteReport {
            orphan_pods,
            stale_jobs,
            idle_workloads: Vec::new(),
            idle_scan_skipped: None,
        };
        if !metrics_available {
            report.idle_scan_skipped = Some(summary::METRICS_UNAVAILABLE_REASON.to_string());
            return Ok(report);
        }

        let index = join::index_pods(&workloads, &pods);
        let mut idle = Vec::new();
        for spec in &workloads {
            let key = (
                spec.workload.kind,
                spec.workload.namespace.clone(),
                spec.workload.name.clone(),
            );
            let live_pods = match index.get(&key) {
                Some(bucket) if !bucket.is_empty() => bucket,
                _ => continue,
            };
            // Workloads without full requests are indeterminate; skip the
            // fetch entirely.
            if spec.resources.cpu_request_millicores.is_none()
                || spec.resources.memory_request_bytes.is_none()
            {
                continue;
            }
            let samples = match self
                .historical_samples(live_pods, params.window_hours, params.max_concurrent_fetches)
                .await
            {
                Ok(samples) => samples,
                Err(err) if err.is_transient() => {
                    warn!("idle scan aborted: {err}");
                    report.idle_scan_skipped =
                        Some(summary::METRICS_UNAVAILABLE_REASON.to_string());
                    return Ok(report);
                }
                Err(err) => {
                    return Err(map_source_err(
                        SourceOrigin::Metrics,
                        "historical usage",
                        err,
                    ))
                }
            };
            if let Some(found) =
                waste::idle_candidate(spec, live_pods, &samples, params.idle_floor_pct, now)
            {
                idle.push(found);
            }
        }
        report.idle_workloads = waste::sort_idle(idle);
        Ok(report)
    }

    async fn summarize_inner(&self, params: &SummaryParams) -> Result<SummaryReport, OptimizeError> {
        match self.analyze_inner(&params.analyze_params()).await {
            Ok(analysis) => {
                let waste = self
                    .detect_waste_inner(&params.waste_params(), true)
                    .await?;
                Ok(summary::build_summary(&analysis, &waste))
            }
            Err(err) if err.is_metrics_unavailable() => {
                warn!("summarize degrading: {err}");
                let waste = self
                    .detect_waste_inner(&params.waste_params(), false)
                    .await?;
                Ok(summary::build_degraded_summary(&waste))
            }
            Err(err) => Err(err),
        }
    }

    /// List all three workload kinds concurrently. RBAC denial on one kind is
    /// recovered as a skip; any other failure is fatal.
    async fn fetch_workloads(
        &self,
        scope: &Scope,
    ) -> Result<(Vec<WorkloadSpec>, Vec<SkippedKind>), OptimizeError> {
        let (deployments, statefulsets, daemonsets) = tokio::join!(
            self.objects.list_workloads(scope, WorkloadKind::Deployment),
            self.objects.list_workloads(scope, WorkloadKind::StatefulSet),
            self.objects.list_workloads(scope, WorkloadKind::DaemonSet)
        );

        let mut workloads = Vec::new();
        let mut skipped = Vec::new();
        for (kind, result) in WorkloadKind::ALL
            .into_iter()
            .zip([deployments, statefulsets, daemonsets])
        {
            match result {
                Ok(mut list) => workloads.append(&mut list),
                Err(SourceError::Permission(message)) => {
                    warn!("skipping {kind}s: permission denied: {message}");
                    skipped.push(SkippedKind {
                        kind,
                        reason: "permission denied".to_string(),
                    });
                }
                Err(err) => {
                    return Err(map_source_err(
                        SourceOrigin::Cluster,
                        &format!("list {kind}s"),
                        err,
                    ))
                }
            }
        }
        Ok((workloads, skipped))
    }

    /// Latest sample per pod, fetched with bounded concurrency and keyed by
    /// `(namespace, name)`; pod names alone repeat across namespaces. A
    /// missing sample for one pod is local and tolerated; an unreachable
    /// metrics endpoint fails the whole pass.
    async fn latest_usage_map(
        &self,
        pods: &[&PodInfo],
        concurrency: usize,
    ) -> Result<HashMap<(String, String), MetricSample>, OptimizeError> {
        let metrics = &self.metrics;
        let results: Vec<((String, String), Result<Option<MetricSample>, SourceError>)> =
            stream::iter(pods.iter().map(|pod| async move {
                let result = metrics.latest_usage(&pod.namespace, &pod.name).await;
                ((pod.namespace.clone(), pod.name.clone()), result)
            }))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut usage = HashMap::new();
        for ((namespace, pod), result) in results {
            match result {
                Ok(Some(sample)) => {
                    usage.insert((namespace, pod), sample);
                }
                Ok(None) => debug!("no usage sample for pod {namespace}/{pod}"),
                Err(SourceError::NotFound(message)) => {
                    debug!("no usage sample for pod {namespace}/{pod}: {message}")
                }
                Err(err) => {
                    return Err(map_source_err(SourceOrigin::Metrics, "latest usage", err))
                }
            }
        }
        Ok(usage)
    }

    /// Pooled historical samples across the given pods, fetched with bounded
    /// concurrency. Missing per-pod history is tolerated; connectivity
    /// failures surface to the caller for its own policy.
    async fn historical_samples(
        &self,
        pods: &[&PodInfo],
        window_hours: i64,
        concurrency: usize,
    ) -> Result<Vec<MetricSample>, SourceError> {
        let metrics = &self.metrics;
        let results: Vec<Result<Vec<MetricSample>, SourceError>> =
            stream::iter(pods.iter().map(|pod| async move {
                metrics
                    .historical_usage(&pod.namespace, &pod.name, window_hours)
                    .await
            }))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut samples = Vec::new();
        for result in results {
            match result {
                Ok(mut history) => samples.append(&mut history),
                Err(SourceError::NotFound(message)) => {
                    debug!("no usage history for a pod: {message}")
                }
                Err(err) => return Err(err),
            }
        }
        // Completion order of the fetches must not leak into the output.
        samples.sort_by(|a, b| (a.timestamp, a.pod_id.as_str()).cmp(&(b.timestamp, b.pod_id.as_str())));
        Ok(samples)
    }
}

/// Summed usage of a workload's ready pods. `None` when there are no ready
/// pods, or when any ready pod is missing its sample: a partial sum reads as
/// lower usage than the workload actually has.
fn workload_usage(
    bucket: Option<&Vec<&PodInfo>>,
    usage_by_pod: &HashMap<(String, String), MetricSample>,
) -> Option<UsageTotals> {
    let pods = bucket?;
    let ready: Vec<&&PodInfo> = pods.iter().filter(|p| p.ready).collect();
    if ready.is_empty() {
        return None;
    }
    let mut totals = UsageTotals::default();
    for pod in ready {
        let sample = usage_by_pod.get(&(pod.namespace.clone(), pod.name.clone()))?;
        totals.cpu_millicores += sample.cpu_millicores;
        totals.memory_bytes += sample.memory_bytes;
    }
    Some(totals)
}

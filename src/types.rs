use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::OptimizeError;

pub const DEFAULT_THRESHOLD: f64 = 0.5;
pub const DEFAULT_STALE_HOURS: i64 = 24;
pub const DEFAULT_WINDOW_HOURS: i64 = 168;
pub const DEFAULT_REQUEST_BUFFER: f64 = 0.20;
pub const DEFAULT_LIMIT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MIN_CPU_MILLICORES: i64 = 10;
pub const DEFAULT_MIN_MEMORY_BYTES: i64 = 16 * 1024 * 1024;
pub const DEFAULT_MIN_SAMPLES: usize = 10;
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;
pub const DEFAULT_IDLE_FLOOR_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 3] = [
        WorkloadKind::Deployment,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a controller-managed workload. Identity is `(kind, namespace,
/// name)`; the replica count rides along for aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    pub desired_replicas: i32,
}

impl WorkloadRef {
    pub fn key(&self) -> (WorkloadKind, &str, &str) {
        (self.kind, self.namespace.as_str(), self.name.as_str())
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Declared resources in normalized units. `None` means the field is
/// unspecified/unbounded; it is never conflated with zero.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSpec {
    pub cpu_request_millicores: Option<i64>,
    pub cpu_limit_millicores: Option<i64>,
    pub memory_request_bytes: Option<i64>,
    pub memory_limit_bytes: Option<i64>,
}

/// One usage observation for one pod.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub pod_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_millicores: i64,
    pub memory_bytes: i64,
}

/// Summed usage across the live pods of a workload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub cpu_millicores: i64,
    pub memory_bytes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UtilizationStatus {
    Ok,
    Warn,
    Underutilized,
    Unknown,
    NoData,
}

impl UtilizationStatus {
    pub const ALL: [UtilizationStatus; 5] = [
        UtilizationStatus::Ok,
        UtilizationStatus::Warn,
        UtilizationStatus::Underutilized,
        UtilizationStatus::Unknown,
        UtilizationStatus::NoData,
    ];
}

/// Joined spec-vs-usage result for one workload. Percentages are `None`
/// whenever the corresponding request is absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtilizationRecord {
    pub workload: WorkloadRef,
    pub requests: ResourceSpec,
    pub usage: Option<UsageTotals>,
    pub cpu_pct: Option<f64>,
    pub memory_pct: Option<f64>,
    pub status: UtilizationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedKind {
    pub kind: WorkloadKind,
    pub reason: String,
}

/// Output of one analyzer pass. RBAC denials on individual workload kinds are
/// recorded here instead of aborting the pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub records: Vec<UtilizationRecord>,
    pub skipped: Vec<SkippedKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Normal,
    LowConfidence,
}

/// Sizing recommendation for one workload, per replica. `savings_pct` is
/// signed: negative means the current request is below what the usage history
/// calls for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub workload: WorkloadRef,
    pub current: ResourceSpec,
    pub recommended: ResourceSpec,
    pub savings_pct: Option<f64>,
    pub risk: RiskLevel,
    pub confidence: Confidence,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WasteCategory {
    OrphanPod,
    StaleJob,
    IdleWorkload,
}

impl WasteCategory {
    pub const ALL: [WasteCategory; 3] = [
        WasteCategory::OrphanPod,
        WasteCategory::StaleJob,
        WasteCategory::IdleWorkload,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanPod {
    pub pod_id: String,
    pub namespace: String,
    pub age_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleJob {
    pub name: String,
    pub namespace: String,
    pub age_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdleWorkload {
    pub workload: WorkloadRef,
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub age_hours: f64,
}

/// A single detected waste finding; each finding belongs to exactly one
/// category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category")]
pub enum WasteItem {
    OrphanPod(OrphanPod),
    StaleJob(StaleJob),
    IdleWorkload(IdleWorkload),
}

impl WasteItem {
    pub fn category(&self) -> WasteCategory {
        match self {
            WasteItem::OrphanPod(_) => WasteCategory::OrphanPod,
            WasteItem::StaleJob(_) => WasteCategory::StaleJob,
            WasteItem::IdleWorkload(_) => WasteCategory::IdleWorkload,
        }
    }

    /// Identity of the underlying object, namespaced.
    pub fn subject(&self) -> String {
        match self {
            WasteItem::OrphanPod(o) => format!("pod/{}/{}", o.namespace, o.pod_id),
            WasteItem::StaleJob(j) => format!("job/{}/{}", j.namespace, j.name),
            WasteItem::IdleWorkload(w) => w.workload.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WasteReport {
    pub orphan_pods: Vec<OrphanPod>,
    pub stale_jobs: Vec<StaleJob>,
    pub idle_workloads: Vec<IdleWorkload>,
    /// Set when the idle scan could not run (metrics unavailable); orphan and
    /// stale results above are still complete.
    pub idle_scan_skipped: Option<String>,
}

impl WasteReport {
    pub fn items(&self) -> Vec<WasteItem> {
        let mut items = Vec::new();
        items.extend(self.orphan_pods.iter().cloned().map(WasteItem::OrphanPod));
        items.extend(self.stale_jobs.iter().cloned().map(WasteItem::StaleJob));
        items.extend(
            self.idle_workloads
                .iter()
                .cloned()
                .map(WasteItem::IdleWorkload),
        );
        items
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub counts_by_status: BTreeMap<UtilizationStatus, usize>,
    pub waste_counts: BTreeMap<WasteCategory, usize>,
    pub estimated_cpu_waste_millicores: i64,
    pub estimated_memory_waste_bytes: i64,
    pub degraded: bool,
    pub degraded_reason: Option<String>,
}

/// Namespace or all-namespaces scope with an optional label filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scope {
    /// `None` means all namespaces.
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

impl Scope {
    pub fn all() -> Self {
        Scope::default()
    }

    pub fn namespace(ns: impl Into<String>) -> Self {
        Scope {
            namespace: Some(ns.into()),
            label_selector: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if let Some(ns) = &self.namespace {
            if ns.trim().is_empty() || ns.contains(char::is_whitespace) {
                return Err(OptimizeError::Validation(format!(
                    "malformed namespace in scope: {:?}",
                    ns
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzeParams {
    pub scope: Scope,
    /// Utilization threshold τ ∈ (0, 1].
    pub threshold: f64,
    pub timeout: Option<Duration>,
}

impl Default for AnalyzeParams {
    fn default() -> Self {
        AnalyzeParams {
            scope: Scope::all(),
            threshold: DEFAULT_THRESHOLD,
            timeout: None,
        }
    }
}

impl AnalyzeParams {
    pub fn validate(&self) -> Result<(), OptimizeError> {
        self.scope.validate()?;
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(OptimizeError::Validation(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RecommendParams {
    pub window_hours: i64,
    pub request_buffer: f64,
    pub limit_multiplier: f64,
    pub min_cpu_millicores: i64,
    pub min_memory_bytes: i64,
    pub min_samples: usize,
    pub max_concurrent_fetches: usize,
    pub timeout: Option<Duration>,
}

impl Default for RecommendParams {
    fn default() -> Self {
        RecommendParams {
            window_hours: DEFAULT_WINDOW_HOURS,
            request_buffer: DEFAULT_REQUEST_BUFFER,
            limit_multiplier: DEFAULT_LIMIT_MULTIPLIER,
            min_cpu_millicores: DEFAULT_MIN_CPU_MILLICORES,
            min_memory_bytes: DEFAULT_MIN_MEMORY_BYTES,
            min_samples: DEFAULT_MIN_SAMPLES,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            timeout: None,
        }
    }
}

impl RecommendParams {
    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.window_hours <= 0 {
            return Err(OptimizeError::Validation(format!(
                "window_hours must be positive, got {}",
                self.window_hours
            )));
        }
        if self.request_buffer < 0.0 {
            return Err(OptimizeError::Validation(format!(
                "request_buffer must not be negative, got {}",
                self.request_buffer
            )));
        }
        if self.limit_multiplier < 1.0 {
            return Err(OptimizeError::Validation(format!(
                "limit_multiplier must be at least 1.0, got {}",
                self.limit_multiplier
            )));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(OptimizeError::Validation(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WasteParams {
    pub scope: Scope,
    pub stale_hours: i64,
    pub idle_floor_pct: f64,
    pub window_hours: i64,
    pub max_concurrent_fetches: usize,
    pub timeout: Option<Duration>,
}

impl Default for WasteParams {
    fn default() -> Self {
        WasteParams {
            scope: Scope::all(),
            stale_hours: DEFAULT_STALE_HOURS,
            idle_floor_pct: DEFAULT_IDLE_FLOOR_PCT,
            window_hours: DEFAULT_WINDOW_HOURS,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            timeout: None,
        }
    }
}

impl WasteParams {
    pub fn validate(&self) -> Result<(), OptimizeError> {
        self.scope.validate()?;
        if self.stale_hours < 0 {
            return Err(OptimizeError::Validation(format!(
                "stale_hours must not be negative, got {}",
                self.stale_hours
            )));
        }
        if !(self.idle_floor_pct > 0.0 && self.idle_floor_pct < 100.0) {
            return Err(OptimizeError::Validation(format!(
                "idle_floor_pct must be in (0, 100), got {}",
                self.idle_floor_pct
            )));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(OptimizeError::Validation(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SummaryParams {
    pub scope: Scope,
    pub threshold: f64,
    pub stale_hours: i64,
    pub timeout: Option<Duration>,
}

impl Default for SummaryParams {
    fn default() -> Self {
        SummaryParams {
            scope: Scope::all(),
            threshold: DEFAULT_THRESHOLD,
            stale_hours: DEFAULT_STALE_HOURS,
            timeout: None,
        }
    }
}

impl SummaryParams {
    pub fn analyze_params(&self) -> AnalyzeParams {
        AnalyzeParams {
            scope: self.scope.clone(),
            threshold: self.threshold,
            timeout: None,
        }
    }

    pub fn waste_params(&self) -> WasteParams {
        WasteParams {
            scope: self.scope.clone(),
            stale_hours: self.stale_hours,
            ..WasteParams::default()
        }
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        self.analyze_params().validate()?;
        self.waste_params().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_validation() {
        assert!(Scope::all().validate().is_ok());
        assert!(Scope::namespace("prod").validate().is_ok());
        assert!(Scope::namespace("").validate().is_err());
        assert!(Scope::namespace("  ").validate().is_err());
        assert!(Scope::namespace("bad ns").validate().is_err());
    }

    #[test]
    fn test_threshold_validation() {
        let mut params = AnalyzeParams::default();
        assert!(params.validate().is_ok());

        params.threshold = 1.0;
        assert!(params.validate().is_ok());

        params.threshold = 0.0;
        assert!(params.validate().is_err());

        params.threshold = 1.1;
        assert!(params.validate().is_err());

        params.threshold = -0.5;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_waste_params_validation() {
        let mut params = WasteParams::default();
        assert!(params.validate().is_ok());

        params.stale_hours = 0;
        assert!(params.validate().is_ok());

        params.stale_hours = -1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_waste_item_category_is_exclusive() {
        let item = WasteItem::OrphanPod(OrphanPod {
            pod_id: "p".to_string(),
            namespace: "default".to_string(),
            age_hours: 1.0,
        });
        assert_eq!(item.category(), WasteCategory::OrphanPod);
        assert_eq!(item.subject(), "pod/default/p");
    }

    #[test]
    fn test_workload_ref_key_ignores_replicas() {
        let a = WorkloadRef {
            kind: WorkloadKind::Deployment,
            namespace: "default".to_string(),
            name: "web".to_string(),
            desired_replicas: 3,
        };
        let b = WorkloadRef {
            desired_replicas: 5,
            ..a.clone()
        };
        assert_eq!(a.key(), b.key());
    }
}

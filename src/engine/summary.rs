//! Merge of one analyzer pass and one waste pass into the cluster-level
//! report, including the degraded-mode construction used when the metrics
//! source is unreachable.

use std::collections::BTreeMap;

use crate::types::{
    Analysis, SummaryReport, UtilizationStatus, WasteCategory, WasteReport,
};

pub const METRICS_UNAVAILABLE_REASON: &str = "metrics unavailable";

fn waste_counts(waste: &WasteReport) -> BTreeMap<WasteCategory, usize> {
    let mut counts: BTreeMap<WasteCategory, usize> =
        WasteCategory::ALL.iter().map(|c| (*c, 0)).collect();
    for item in waste.items() {
        *counts.entry(item.category()).or_insert(0) += 1;
    }
    counts
}

fn empty_status_counts() -> BTreeMap<UtilizationStatus, usize> {
    UtilizationStatus::ALL.iter().map(|s| (*s, 0)).collect()
}

/// Full merge of a successful analyzer pass and a waste pass.
pub fn build_summary(analysis: &Analysis, waste: &WasteReport) -> SummaryReport {
    let mut counts_by_status = empty_status_counts();
    let mut cpu_waste = 0i64;
    let mut memory_waste = 0i64;

    for record in &analysis.records {
        *counts_by_status.entry(record.status).or_insert(0) += 1;
        if record.status == UtilizationStatus::Ok {
            continue;
        }
        // Waste only counts where both a request and usage exist; absent
        // requests contribute nothing, and over-use clips at zero.
        if let Some(usage) = &record.usage {
            if let Some(req) = record.requests.cpu_request_millicores {
                cpu_waste += (req - usage.cpu_millicores).max(0);
            }
            if let Some(req) = record.requests.memory_request_bytes {
                memory_waste += (req - usage.memory_bytes).max(0);
            }
        }
    }

    SummaryReport {
        counts_by_status,
        waste_counts: waste_counts(waste),
        estimated_cpu_waste_millicores: cpu_waste,
        estimated_memory_waste_bytes: memory_waste,
        degraded: false,
        degraded_reason: None,
    }
}

/// Degraded report: utilization-derived fields zeroed, waste results kept.
pub fn build_degraded_summary(waste: &WasteReport) -> SummaryReport {
    SummaryReport {
        counts_by_status: empty_status_counts(),
        waste_counts: waste_counts(waste),
        estimated_cpu_waste_millicores: 0,
        estimated_memory_waste_bytes: 0,
        degraded: true,
        degraded_reason: Some(METRICS_UNAVAILABLE_REASON.to_string()),
    }
}

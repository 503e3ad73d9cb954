//! Pure sizing math for the recommendation engine. Given a window of usage
//! samples this computes interpolated p95 peaks, applies the safety buffer
//! and hard floors, and rates the variance risk. No I/O happens here, so the
//! whole computation is deterministic for a given sample sequence.

use crate::error::OptimizeError;
use crate::types::{
    Confidence, MetricSample, Recommendation, RecommendParams, ResourceSpec, RiskLevel,
    WorkloadRef,
};

const LOW_CONFIDENCE_BUFFER_FACTOR: f64 = 1.5;
const LOW_RISK_COV: f64 = 0.2;
const MEDIUM_RISK_COV: f64 = 0.5;

/// Linear-interpolation percentile over ascending values: rank = q·(n−1),
/// interpolated between the neighbouring samples. Percentile definitions
/// vary; this one is fixed and tested. An empty slice yields 0.
pub fn percentile_linear(sorted: &[f64], q: f64) -> f64 {
    match sorted {
        [] => return 0.0,
        [only] => return *only,
        _ => {}
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Population coefficient of variation (stddev/mean); 0 for a zero mean.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

pub fn risk_from_cov(cov: f64) -> RiskLevel {
    if cov < LOW_RISK_COV {
        RiskLevel::Low
    } else if cov < MEDIUM_RISK_COV {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

fn recommend_value(p95: f64, buffer: f64, floor: i64) -> i64 {
    ((p95 * (1.0 + buffer)).round() as i64).max(floor)
}

/// Signed savings against the current request: positive means the engine
/// recommends shrinking, negative means the workload is under-provisioned.
fn savings_pct(current: Option<i64>, recommended: i64) -> Option<f64> {
    match current {
        Some(cur) if cur > 0 => Some((cur - recommended) as f64 / cur as f64 * 100.0),
        _ => None,
    }
}

pub fn compute_recommendation(
    workload: WorkloadRef,
    current: ResourceSpec,
    samples: &[MetricSample],
    params: &RecommendParams,
) -> Result<Recommendation, OptimizeError> {
    if samples.is_empty() {
        return Err(OptimizeError::DataIncomplete {
            subject: workload.to_string(),
            message: "no usage samples in window".to_string(),
        });
    }

    let mut cpu: Vec<f64> = samples.iter().map(|s| s.cpu_millicores as f64).collect();
    let mut memory: Vec<f64> = samples.iter().map(|s| s.memory_bytes as f64).collect();
    cpu.sort_by(|a, b| a.total_cmp(b));
    memory.sort_by(|a, b| a.total_cmp(b));

    let confidence = if samples.len() < params.min_samples {
        Confidence::LowConfidence
    } else {
        Confidence::Normal
    };
    let buffer = match confidence {
        Confidence::Normal => params.request_buffer,
        Confidence::LowConfidence => params.request_buffer * LOW_CONFIDENCE_BUFFER_FACTOR,
    };

    let cpu_request = recommend_value(
        percentile_linear(&cpu, 0.95),
        buffer,
        params.min_cpu_millicores,
    );
    let memory_request = recommend_value(
        percentile_linear(&memory, 0.95),
        buffer,
        params.min_memory_bytes,
    );
    let recommended = ResourceSpec {
        cpu_request_millicores: Some(cpu_request),
        cpu_limit_millicores: Some((cpu_request as f64 * params.limit_multiplier).round() as i64),
        memory_request_bytes: Some(memory_request),
        memory_limit_bytes: Some((memory_request as f64 * params.limit_multiplier).round() as i64),
    };

    // CPU is the primary savings dimension; memory only stands in when no
    // CPU request is declared.
    let savings = savings_pct(current.cpu_request_millicores, cpu_request)
        .or_else(|| savings_pct(current.memory_request_bytes, memory_request));

    let cov = coefficient_of_variation(&cpu).max(coefficient_of_variation(&memory));

    Ok(Recommendation {
        workload,
        current,
        recommended,
        savings_pct: savings,
        risk: risk_from_cov(cov),
        confidence,
        sample_count: samples.len(),
    })
}

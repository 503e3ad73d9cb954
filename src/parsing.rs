//! Kubernetes quantity parsing and absent-aware percentage math.
//!
//! Requests and usage arrive as quantity strings ("250m", "512Mi"); everything
//! downstream works in millicores and bytes. An absent request stays `None`
//! through every computation here; it is never folded into zero.

pub fn parse_cpu_to_millicores(q: &str) -> Option<i64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    if let Some(stripped) = q.strip_suffix('n') {
        if let Ok(nanos) = stripped.parse::<i128>() {
            return Some((nanos / 1_000_000) as i64);
        }
    } else if let Some(stripped) = q.strip_suffix('u') {
        if let Ok(micros) = stripped.parse::<i128>() {
            return Some((micros / 1_000) as i64);
        }
    } else if let Some(stripped) = q.strip_suffix('m') {
        if let Ok(mc) = stripped.parse::<i64>() {
            return Some(mc);
        }
    } else {
        // cores, integer or float
        if let Ok(cores) = q.parse::<f64>() {
            return Some((cores * 1000.0).round() as i64);
        }
    }
    None
}

pub fn parse_memory_to_bytes(q: &str) -> Option<i64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }

    // Binary suffixes must be checked before decimal ones (Ki before K).
    const BINARY_UNITS: &[(&str, i64)] = &[
        ("Ki", 1024),
        ("Mi", 1024 * 1024),
        ("Gi", 1024 * 1024 * 1024),
        ("Ti", 1024_i64.pow(4)),
        ("Pi", 1024_i64.pow(5)),
        ("Ei", 1024_i64.pow(6)),
    ];
    const DECIMAL_UNITS: &[(&str, i64)] = &[
        ("K", 1000),
        ("M", 1000 * 1000),
        ("G", 1000 * 1000 * 1000),
        ("T", 1000_i64.pow(4)),
        ("P", 1000_i64.pow(5)),
        ("E", 1000_i64.pow(6)),
        ("k", 1000),
    ];

    for (suf, mul) in BINARY_UNITS {
        if let Some(stripped) = q.strip_suffix(suf) {
            if let Ok(v) = stripped.parse::<f64>() {
                return Some((v * (*mul as f64)).round() as i64);
            }
        }
    }
    for (suf, mul) in DECIMAL_UNITS {
        if let Some(stripped) = q.strip_suffix(suf) {
            if let Ok(v) = stripped.parse::<f64>() {
                return Some((v * (*mul as f64)).round() as i64);
            }
        }
    }
    // bytes without suffix
    if let Ok(v) = q.parse::<i64>() {
        return Some(v);
    }
    None
}

/// used/request as a percentage. `None` when the request is absent or not
/// positive; a missing request must never read as 0% utilization.
pub fn utilization_pct(used: i64, request: Option<i64>) -> Option<f64> {
    match request {
        Some(req) if req > 0 => Some(used as f64 / req as f64 * 100.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_to_millicores() {
        assert_eq!(parse_cpu_to_millicores("1000000000n"), Some(1000));
        assert_eq!(parse_cpu_to_millicores("500000u"), Some(500));
        assert_eq!(parse_cpu_to_millicores("250m"), Some(250));
        assert_eq!(parse_cpu_to_millicores("1"), Some(1000));
        assert_eq!(parse_cpu_to_millicores("0.5"), Some(500));
        assert_eq!(parse_cpu_to_millicores("2.5"), Some(2500));
        assert_eq!(parse_cpu_to_millicores("  100m  "), Some(100));

        assert_eq!(parse_cpu_to_millicores(""), None);
        assert_eq!(parse_cpu_to_millicores("invalid"), None);
        assert_eq!(parse_cpu_to_millicores("100x"), None);
    }

    #[test]
    fn test_parse_memory_to_bytes() {
        assert_eq!(parse_memory_to_bytes("1Ki"), Some(1024));
        assert_eq!(parse_memory_to_bytes("16Mi"), Some(16 * 1024 * 1024));
        assert_eq!(parse_memory_to_bytes("1Gi"), Some(1024 * 1024 * 1024));
        assert_eq!(
            parse_memory_to_bytes("2.5Mi"),
            Some((2.5 * 1024.0 * 1024.0) as i64)
        );

        assert_eq!(parse_memory_to_bytes("1K"), Some(1000));
        assert_eq!(parse_memory_to_bytes("1k"), Some(1000));
        assert_eq!(parse_memory_to_bytes("1G"), Some(1000 * 1000 * 1000));

        assert_eq!(parse_memory_to_bytes("1024"), Some(1024));

        assert_eq!(parse_memory_to_bytes(""), None);
        assert_eq!(parse_memory_to_bytes("invalid"), None);
        assert_eq!(parse_memory_to_bytes("100X"), None);
    }

    #[test]
    fn test_utilization_pct_present_request() {
        assert_eq!(utilization_pct(250, Some(500)), Some(50.0));
        assert_eq!(utilization_pct(0, Some(500)), Some(0.0));
        assert_eq!(utilization_pct(1000, Some(500)), Some(200.0));
    }

    #[test]
    fn test_utilization_pct_absent_request_is_none_not_zero() {
        assert_eq!(utilization_pct(250, None), None);
        // A zero request cannot be divided through either.
        assert_eq!(utilization_pct(250, Some(0)), None);
        assert_eq!(utilization_pct(0, None), None);
    }
}

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::{
    Scope, SummaryParams, DEFAULT_STALE_HOURS, DEFAULT_THRESHOLD, DEFAULT_WINDOW_HOURS,
};

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub scope: Scope,
    pub threshold: f64,
    pub stale_hours: i64,
    pub window_hours: i64,
    pub timeout: Option<Duration>,
}

impl Config {
    pub fn summary_params(&self) -> SummaryParams {
        SummaryParams {
            scope: self.scope.clone(),
            threshold: self.threshold,
            stale_hours: self.stale_hours,
            timeout: self.timeout,
        }
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let all_namespaces = env
        .get_var("ALL_NAMESPACES")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    let namespace = env.get_var("NAMESPACE").filter(|ns| !ns.trim().is_empty());

    let mut scope = match (all_namespaces, namespace) {
        (true, _) => Scope::all(),
        (false, Some(ns)) => Scope::namespace(ns.trim()),
        (false, None) => {
            return Err(anyhow!(
                "either NAMESPACE must be set or ALL_NAMESPACES=true"
            ))
        }
    };
    if let Some(selector) = env.get_var("LABEL_SELECTOR").filter(|s| !s.is_empty()) {
        scope = scope.with_selector(selector);
    }

    let threshold: f64 = env
        .get_var("THRESHOLD")
        .unwrap_or_else(|| DEFAULT_THRESHOLD.to_string())
        .parse()
        .context("Invalid THRESHOLD")?;

    let stale_hours: i64 = env
        .get_var("STALE_HOURS")
        .unwrap_or_else(|| DEFAULT_STALE_HOURS.to_string())
        .parse()
        .context("Invalid STALE_HOURS")?;

    let window_hours: i64 = env
        .get_var("WINDOW_HOURS")
        .unwrap_or_else(|| DEFAULT_WINDOW_HOURS.to_string())
        .parse()
        .context("Invalid WINDOW_HOURS")?;

    let timeout = match env.get_var("TIMEOUT_SECONDS") {
        Some(raw) => {
            let secs: u64 = raw.parse().context("Invalid TIMEOUT_SECONDS")?;
            Some(Duration::from_secs(secs))
        }
        None => None,
    };

    Ok(Config {
        scope,
        threshold,
        stale_hours,
        window_hours,
        timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_defaults() {
        let env = MockEnvironment::new().with_var("NAMESPACE", "production");
        let cfg = load_config_with_env(&env).unwrap();
        assert_eq!(cfg.scope.namespace.as_deref(), Some("production"));
        assert_eq!(cfg.scope.label_selector, None);
        assert_eq!(cfg.threshold, DEFAULT_THRESHOLD);
        assert_eq!(cfg.stale_hours, DEFAULT_STALE_HOURS);
        assert_eq!(cfg.window_hours, DEFAULT_WINDOW_HOURS);
        assert_eq!(cfg.timeout, None);
    }

    #[test]
    fn test_load_config_requires_a_scope() {
        let env = MockEnvironment::new();
        assert!(load_config_with_env(&env).is_err());
    }

    #[test]
    fn test_all_namespaces_overrides_namespace() {
        let env = MockEnvironment::new()
            .with_var("ALL_NAMESPACES", "true")
            .with_var("NAMESPACE", "ignored");
        let cfg = load_config_with_env(&env).unwrap();
        assert_eq!(cfg.scope.namespace, None);
    }

    #[test]
    fn test_load_config_overrides() {
        let env = MockEnvironment::new()
            .with_var("NAMESPACE", "staging")
            .with_var("LABEL_SELECTOR", "team=search")
            .with_var("THRESHOLD", "0.7")
            .with_var("STALE_HOURS", "48")
            .with_var("WINDOW_HOURS", "24")
            .with_var("TIMEOUT_SECONDS", "30");
        let cfg = load_config_with_env(&env).unwrap();
        assert_eq!(cfg.scope.label_selector.as_deref(), Some("team=search"));
        assert_eq!(cfg.threshold, 0.7);
        assert_eq!(cfg.stale_hours, 48);
        assert_eq!(cfg.window_hours, 24);
        assert_eq!(cfg.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_threshold_is_an_error() {
        let env = MockEnvironment::new()
            .with_var("NAMESPACE", "default")
            .with_var("THRESHOLD", "high");
        assert!(load_config_with_env(&env).is_err());
    }

    #[test]
    fn test_summary_params_carries_config() {
        let env = MockEnvironment::new()
            .with_var("NAMESPACE", "default")
            .with_var("THRESHOLD", "0.6");
        let params = load_config_with_env(&env).unwrap().summary_params();
        assert_eq!(params.threshold, 0.6);
        assert_eq!(params.scope.namespace.as_deref(), Some("default"));
    }
}

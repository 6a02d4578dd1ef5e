use crate::batch::DuplicatePolicy;
use std::env;

pub const LOG_ENV: &str = "FEEDBACKD_LOG";
pub const DUPLICATES_ENV: &str = "FEEDBACKD_DUPLICATES";
const DEFAULT_LOG_FILTER: &str = "feedbackd=info";

/// Process-wide defaults, read once at startup. Requests may override
/// `duplicate_policy` per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_filter: String,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();
        if let Some(v) = get(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            cfg.log_filter = v;
        }
        if let Some(v) = get(DUPLICATES_ENV).filter(|v| !v.trim().is_empty()) {
            cfg.duplicate_policy = v
                .parse()
                .map_err(|e: String| anyhow::anyhow!("{DUPLICATES_ENV}: {e}"))?;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).expect("config");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.log_filter, "feedbackd=info");
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            (LOG_ENV, "feedbackd=debug"),
            (DUPLICATES_ENV, "reject"),
        ]))
        .expect("config");
        assert_eq!(cfg.log_filter, "feedbackd=debug");
        assert_eq!(cfg.duplicate_policy, DuplicatePolicy::Reject);
    }

    #[test]
    fn rejects_unknown_policy() {
        let e = Config::from_lookup(lookup(&[(DUPLICATES_ENV, "merge")])).unwrap_err();
        assert!(e.to_string().contains(DUPLICATES_ENV));
    }
}

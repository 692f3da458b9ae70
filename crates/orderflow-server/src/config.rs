//! Server configuration read from the environment (after `.env` is loaded).
//!
//!   DATABASE_URL                          - Postgres connection string (required)
//!   ORDERFLOW_JWT_SECRET                  - JWT HMAC secret (required)
//!   ORDERFLOW_BIND_ADDR                   - listen address (default: 0.0.0.0:4000)
//!   DATABASE_POOL_SIZE                    - max pool connections (default: 10)
//!   ORDERFLOW_UPLOAD_DIR                  - blob directory (default: ./uploads)
//!   ORDERFLOW_MAX_UPLOAD_BYTES            - upload size limit (default: 10 MiB)
//!   GEMINI_API_KEY                        - enables AI extraction when set
//!   GEMINI_MODEL                          - default: gemini-2.5-flash
//!   GEMINI_TIMEOUT_SECS                   - default: 60
//!   ORDERFLOW_ALLOW_MULTIPLE_SALES_ORDERS - default: false
//!   ORDERFLOW_AUDIT_QUEUE                 - background audit writer (default: true)
//!   ORDERFLOW_RUN_MIGRATIONS              - apply migrations at startup (default: true)

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use orderflow_core::service::DerivationPolicy;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub pool_size: u32,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub gemini: Option<GeminiSettings>,
    pub derivation: DerivationPolicy,
    pub audit_queue: bool,
    pub run_migrations: bool,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} must be set"));

        let gemini = match get("GEMINI_API_KEY") {
            Some(api_key) => Some(GeminiSettings {
                api_key,
                model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".into()),
                timeout: Duration::from_secs(parse_or(&get, "GEMINI_TIMEOUT_SECS", 60)?),
            }),
            None => None,
        };

        let derivation = if parse_or(&get, "ORDERFLOW_ALLOW_MULTIPLE_SALES_ORDERS", false)? {
            DerivationPolicy::AllowMultiple
        } else {
            DerivationPolicy::SingleSalesOrder
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("ORDERFLOW_JWT_SECRET")?,
            bind_addr: get("ORDERFLOW_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:4000".into()),
            pool_size: parse_or(&get, "DATABASE_POOL_SIZE", 10)?,
            upload_dir: get("ORDERFLOW_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            max_upload_bytes: parse_or(&get, "ORDERFLOW_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            gemini,
            derivation,
            audit_queue: parse_or(&get, "ORDERFLOW_AUDIT_QUEUE", true)?,
            run_migrations: parse_or(&get, "ORDERFLOW_RUN_MIGRATIONS", true)?,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgresql:///orderflow"),
        ("ORDERFLOW_JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults() {
        let cfg = config(&REQUIRED).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:4000");
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(cfg.gemini.is_none());
        assert_eq!(cfg.derivation, DerivationPolicy::SingleSalesOrder);
        assert!(cfg.audit_queue);
        assert!(cfg.run_migrations);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = config(&[("DATABASE_URL", "postgresql:///orderflow")]).unwrap_err();
        assert!(err.to_string().contains("ORDERFLOW_JWT_SECRET"));
    }

    #[test]
    fn gemini_and_policy_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_TIMEOUT_SECS", "15"),
            ("ORDERFLOW_ALLOW_MULTIPLE_SALES_ORDERS", "true"),
            ("ORDERFLOW_AUDIT_QUEUE", "false"),
        ]);
        let cfg = config(&pairs).unwrap();
        let gemini = cfg.gemini.unwrap();
        assert_eq!(gemini.model, "gemini-2.5-flash");
        assert_eq!(gemini.timeout, Duration::from_secs(15));
        assert_eq!(cfg.derivation, DerivationPolicy::AllowMultiple);
        assert!(!cfg.audit_queue);
    }

    #[test]
    fn unparsable_number_is_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DATABASE_POOL_SIZE", "many"));
        let err = config(&pairs).unwrap_err();
        assert!(err.to_string().contains("DATABASE_POOL_SIZE"));
    }
}

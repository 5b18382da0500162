use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ORACULO_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ORACULO_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            audit: AuditConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!("  storage:  data_dir={}", self.storage.data_dir.display());
        tracing::info!("  packs:    {}", self.storage.rule_packs_dir.display());
        tracing::info!("  invoices: {}", self.storage.invoices_dir.display());
        tracing::info!(
            "  audit:    workers={}, timeout={}s, fetch_retries={}, top_rules={}",
            self.audit.resolved_workers(),
            self.audit.run_timeout_secs,
            self.audit.fetch_retries,
            self.audit.top_rules
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for persisted rulesets and audit runs.
    pub data_dir: PathBuf,
    /// Directory scanned for reusable rule packs (`*.yml` / `*.yaml`).
    pub rule_packs_dir: PathBuf,
    /// Directory holding materialized invoices, one `{org_id}.json` per organization.
    pub invoices_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        let data_dir = PathBuf::from(profiled_env_or(p, "DATA_DIR", "data"));
        let rule_packs_dir = profiled_env_opt(p, "RULE_PACKS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("packs"));
        let invoices_dir = profiled_env_opt(p, "INVOICES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("invoices"));
        Self {
            data_dir,
            rule_packs_dir,
            invoices_dir,
        }
    }
}

// ── Audit runs ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Evaluation pool size. 0 = number of available CPUs.
    pub workers: u32,
    /// Deadline for a whole run (fetch + evaluation).
    pub run_timeout_secs: u64,
    /// Extra attempts when the invoice source fails.
    pub fetch_retries: u32,
    /// Number of entries kept in `AuditSummary.top_rules`.
    pub top_rules: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            run_timeout_secs: 600,
            fetch_retries: 2,
            top_rules: 5,
        }
    }
}

impl AuditConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            workers: profiled_env_u32(p, "AUDIT_WORKERS", d.workers),
            run_timeout_secs: profiled_env_u64(p, "AUDIT_RUN_TIMEOUT_SECS", d.run_timeout_secs),
            fetch_retries: profiled_env_u32(p, "AUDIT_FETCH_RETRIES", d.fetch_retries),
            top_rules: profiled_env_u32(p, "AUDIT_TOP_RULES", d.top_rules),
        }
    }

    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.workers as usize
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

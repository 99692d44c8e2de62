//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section and field has a default, so a partial file is fine.
//! Secrets (the Telegram token) are referenced by env-var name and
//! resolved at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::coordinator::CoordinatorConfig;
use crate::engine::interval::IntervalConfig;
use crate::engine::monitor::MonitorConfig;
use crate::engine::stats::DegradationConfig;
use crate::types::{Criterion, SniperError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorSection,
    pub purchase: PurchaseSection,
    pub accounts: AccountsSection,
    pub alerts: AlertsSection,
    pub status: StatusSection,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorSection {
    pub check_interval_ms: u64,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub random_delay_max_ms: u64,
    pub adaptive_interval: bool,
    pub min_hunters: usize,
    pub cleanup_interval_secs: u64,
    pub degradation_check_interval_secs: u64,
    pub restart_cooldown_secs: u64,
    pub min_checks_per_minute: f64,
    pub degradation_min_total_checks: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
            min_interval_ms: 300,
            max_interval_ms: 30_000,
            random_delay_max_ms: 200,
            adaptive_interval: true,
            min_hunters: 1,
            cleanup_interval_secs: 60,
            degradation_check_interval_secs: 300,
            restart_cooldown_secs: 10,
            min_checks_per_minute: 10.0,
            degradation_min_total_checks: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PurchaseSection {
    pub min_balance: u64,
    /// `[min_supply, max_supply, min_price, max_price, quantity]`, in
    /// priority order.
    pub criteria: Vec<[u64; 5]>,
    pub purchase_non_limited: bool,
    pub fallback_purchase: bool,
    pub max_processed: usize,
}

impl Default for PurchaseSection {
    fn default() -> Self {
        Self {
            min_balance: 0,
            criteria: Vec::new(),
            purchase_non_limited: false,
            fallback_purchase: false,
            max_processed: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AccountsSection {
    /// Session names used for purchasing.
    pub buyers: Vec<String>,
    /// Session names used for polling. May overlap with `buyers`.
    pub hunters: Vec<String>,
    /// Destination handles, round-robined per unit.
    pub targets: Vec<String>,
    /// Listing catalogue backing the paper sessions.
    pub catalogue: String,
    /// Starting balance of each paper session.
    pub starting_balance: u64,
}

impl Default for AccountsSection {
    fn default() -> Self {
        Self {
            buyers: Vec::new(),
            hunters: Vec::new(),
            targets: Vec::new(),
            catalogue: "catalogue.json".to_string(),
            starting_balance: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AlertsSection {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatusSection {
    pub enabled: bool,
    pub port: u16,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check every constraint and report all violations at once.
    pub fn validate(&self) -> Result<(), SniperError> {
        let mut problems = Vec::new();
        let m = &self.monitor;

        if self.accounts.hunters.len() < m.min_hunters {
            problems.push(format!(
                "{} hunter(s) configured, at least {} required",
                self.accounts.hunters.len(),
                m.min_hunters
            ));
        }
        if self.accounts.buyers.is_empty() {
            problems.push("no buyer accounts configured".to_string());
        }
        if self.accounts.targets.is_empty() {
            problems.push("no purchase targets configured".to_string());
        }
        if self.purchase.criteria.is_empty() {
            problems.push("no purchase criteria configured".to_string());
        }
        for (i, raw) in self.purchase.criteria.iter().enumerate() {
            if let Err(e) = Criterion::try_from(*raw) {
                problems.push(format!("criterion #{}: {e}", i + 1));
            }
        }
        if m.min_interval_ms > m.max_interval_ms {
            problems.push(format!(
                "min_interval_ms ({}) exceeds max_interval_ms ({})",
                m.min_interval_ms, m.max_interval_ms
            ));
        } else if !(m.min_interval_ms..=m.max_interval_ms).contains(&m.check_interval_ms) {
            problems.push(format!(
                "check_interval_ms ({}) outside [{}, {}]",
                m.check_interval_ms, m.min_interval_ms, m.max_interval_ms
            ));
        }
        if m.cleanup_interval_secs == 0 || m.degradation_check_interval_secs == 0 {
            problems.push("maintenance intervals must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SniperError::Config(problems.join("; ")))
        }
    }

    pub fn criteria(&self) -> Result<Vec<Criterion>, SniperError> {
        self.purchase
            .criteria
            .iter()
            .map(|raw| Criterion::try_from(*raw))
            .collect()
    }

    pub fn interval_config(&self) -> IntervalConfig {
        let m = &self.monitor;
        IntervalConfig {
            base: Duration::from_millis(m.check_interval_ms),
            min: Duration::from_millis(m.min_interval_ms),
            max: Duration::from_millis(m.max_interval_ms),
            adaptive: m.adaptive_interval,
            ..IntervalConfig::default()
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        let m = &self.monitor;
        let check_every = Duration::from_secs(m.degradation_check_interval_secs);
        MonitorConfig {
            interval: self.interval_config(),
            random_delay_max: Duration::from_millis(m.random_delay_max_ms),
            min_balance: self.purchase.min_balance,
            cleanup_interval: Duration::from_secs(m.cleanup_interval_secs),
            max_processed: self.purchase.max_processed,
            degradation_check_interval: check_every,
            degradation: DegradationConfig {
                min_checks_per_minute: m.min_checks_per_minute,
                min_total_checks: m.degradation_min_total_checks,
                window: check_every,
            },
            restart_cooldown: Duration::from_secs(m.restart_cooldown_secs),
            ..MonitorConfig::default()
        }
    }

    pub fn coordinator_config(&self) -> Result<CoordinatorConfig, SniperError> {
        Ok(CoordinatorConfig {
            criteria: self.criteria()?,
            purchase_non_limited: self.purchase.purchase_non_limited,
            fallback_purchase: self.purchase.fallback_purchase,
            max_processed: self.purchase.max_processed,
        })
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

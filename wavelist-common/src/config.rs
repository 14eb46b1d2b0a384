//! Multi-tier configuration resolution: ENV -> TOML -> built-in default.
//!
//! Modeled on the teacher's `resolve_acoustid_api_key` (tiered lookup,
//! warn on conflicting sources) but collapsed to two tiers since this
//! core has no running database to hold an authoritative third tier.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Budget-gating mode (spec §4.3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetMode {
    Hard,
    Suggested,
}

impl Default for BudgetMode {
    fn default() -> Self {
        BudgetMode::Suggested
    }
}

impl std::str::FromStr for BudgetMode {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hard" => Ok(BudgetMode::Hard),
            "suggested" => Ok(BudgetMode::Suggested),
            other => Err(Error::Config(format!(
                "PLAYLIST_COST_BUDGET_MODE must be 'hard' or 'suggested', got '{other}'"
            ))),
        }
    }
}

/// Per-daypart budget allocation strategy (spec §4.3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStrategy {
    Equal,
    Dynamic,
    Weighted,
}

impl Default for AllocationStrategy {
    fn default() -> Self {
        AllocationStrategy::Dynamic
    }
}

impl std::str::FromStr for AllocationStrategy {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "equal" => Ok(AllocationStrategy::Equal),
            "dynamic" => Ok(AllocationStrategy::Dynamic),
            "weighted" => Ok(AllocationStrategy::Weighted),
            other => Err(Error::Config(format!(
                "PLAYLIST_COST_ALLOCATION_STRATEGY must be 'equal', 'dynamic', or 'weighted', \
                 got '{other}'"
            ))),
        }
    }
}

/// The optional `wavelist.toml` shape. Every field is also settable via
/// the environment variables named in spec.md §6, which always win.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub budget_mode: Option<BudgetMode>,
    pub allocation_strategy: Option<AllocationStrategy>,
    pub lastfm_api_key: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub decision_log_dir: Option<PathBuf>,
}

pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
}

/// Resolve one string-valued setting via ENV (highest priority) then a
/// TOML-extracted fallback, matching spec §6's "names fixed for
/// compatibility" environment variables.
pub fn resolve_str(env_var: &str, toml_value: Option<&str>) -> Option<String> {
    if let Ok(v) = std::env::var(env_var) {
        if !v.trim().is_empty() {
            if toml_value.is_some_and(|t| t != v) {
                warn!(
                    "{env_var} is set in both the environment and TOML config with different \
                     values; using the environment value"
                );
            }
            return Some(v);
        }
    }
    toml_value.map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub lastfm_api_key: Option<String>,
}

/// Resolve the enricher's web-lookup API key from `LASTFM_API_KEY`,
/// falling back to `toml.lastfm_api_key` (spec §1, §4.2's web
/// enrichment collaborator). `None` means the enricher falls back to
/// cache and local audio analysis only.
pub fn resolve_enrichment_config(toml: &TomlConfig) -> EnrichmentConfig {
    EnrichmentConfig {
        lastfm_api_key: resolve_str("LASTFM_API_KEY", toml.lastfm_api_key.as_deref()),
    }
}

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub mode: BudgetMode,
    pub allocation_strategy: AllocationStrategy,
    pub total_budget: Option<rust_decimal::Decimal>,
}

/// Assemble the budget configuration from ENV (spec §6:
/// `PLAYLIST_COST_BUDGET_MODE`, `PLAYLIST_COST_ALLOCATION_STRATEGY`,
/// `PLAYLIST_TOTAL_COST_BUDGET`) falling back to `toml`.
pub fn resolve_budget_config(toml: &TomlConfig) -> Result<BudgetConfig> {
    let mode = match std::env::var("PLAYLIST_COST_BUDGET_MODE") {
        Ok(v) => v.parse()?,
        Err(_) => toml.budget_mode.unwrap_or_default(),
    };
    let allocation_strategy = match std::env::var("PLAYLIST_COST_ALLOCATION_STRATEGY") {
        Ok(v) => v.parse()?,
        Err(_) => toml.allocation_strategy.unwrap_or_default(),
    };
    let total_budget = match std::env::var("PLAYLIST_TOTAL_COST_BUDGET") {
        Ok(v) => Some(
            v.parse::<rust_decimal::Decimal>()
                .map_err(|e| Error::Config(format!("PLAYLIST_TOTAL_COST_BUDGET: {e}")))?,
        ),
        Err(_) => None,
    };
    Ok(BudgetConfig {
        mode,
        allocation_strategy,
        total_budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_budget_mode_overrides_toml_default() {
        std::env::set_var("PLAYLIST_COST_BUDGET_MODE", "hard");
        let cfg = resolve_budget_config(&TomlConfig::default()).unwrap();
        assert_eq!(cfg.mode, BudgetMode::Hard);
        std::env::remove_var("PLAYLIST_COST_BUDGET_MODE");
    }

    #[test]
    #[serial]
    fn falls_back_to_toml_default_mode() {
        std::env::remove_var("PLAYLIST_COST_BUDGET_MODE");
        let toml = TomlConfig {
            budget_mode: Some(BudgetMode::Hard),
            ..Default::default()
        };
        let cfg = resolve_budget_config(&toml).unwrap();
        assert_eq!(cfg.mode, BudgetMode::Hard);
    }

    #[test]
    #[serial]
    fn defaults_to_suggested_with_dynamic_allocation() {
        std::env::remove_var("PLAYLIST_COST_BUDGET_MODE");
        std::env::remove_var("PLAYLIST_COST_ALLOCATION_STRATEGY");
        let cfg = resolve_budget_config(&TomlConfig::default()).unwrap();
        assert_eq!(cfg.mode, BudgetMode::Suggested);
        assert_eq!(cfg.allocation_strategy, AllocationStrategy::Dynamic);
    }

    #[test]
    #[serial]
    fn enrichment_config_falls_back_to_toml_key() {
        std::env::remove_var("LASTFM_API_KEY");
        let toml = TomlConfig {
            lastfm_api_key: Some("toml-key".to_string()),
            ..Default::default()
        };
        let cfg = resolve_enrichment_config(&toml);
        assert_eq!(cfg.lastfm_api_key.as_deref(), Some("toml-key"));
    }

    #[test]
    #[serial]
    fn enrichment_config_is_none_without_any_source() {
        std::env::remove_var("LASTFM_API_KEY");
        let cfg = resolve_enrichment_config(&TomlConfig::default());
        assert!(cfg.lastfm_api_key.is_none());
    }
}

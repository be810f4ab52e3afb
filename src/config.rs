//! Configuration for the scriptforge gateway.
//!
//! One explicit `Config` struct, deserialized from a TOML file at startup
//! and passed by reference to every component. Components never reach into
//! process environment variables themselves.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the ledger database.
    pub data_dir: PathBuf,
    pub ledger: LedgerConfig,
    pub generator: GeneratorConfig,
    pub payment: PaymentConfig,
    pub gateway: GatewayConfig,
}

/// Credit ledger tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Credits granted when an account is first seen.
    pub initial_grant: u32,
    /// Credits granted per bonus claim.
    pub bonus_grant: u32,
    /// Hours between bonus claims.
    pub bonus_period_hours: u32,
}

/// External text-generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// API key for the generation provider.
    pub api_key: Option<String>,
    /// Chat-completions endpoint URL.
    pub api_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// System prompt prepended to every generation.
    pub system_prompt: String,
    /// Upper bound on a single generation call, in seconds.
    pub timeout_secs: u64,
}

/// Payment provider (invoice creation + webhook reconciliation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Merchant identifier at the payment provider.
    pub merchant_id: Option<String>,
    /// Shared secret used to sign outbound invoice requests and verify
    /// inbound webhook signatures.
    pub signing_key: Option<String>,
    /// Invoice-creation endpoint URL.
    pub invoice_url: String,
    /// Invoice currency code.
    pub currency: String,
    /// Upper bound on an invoice-creation call, in seconds.
    pub timeout_secs: u64,
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Per-IP generation requests per minute (0 = unlimited).
    pub generate_rate_limit_per_minute: u32,
    /// Per-IP webhook deliveries per minute (0 = unlimited).
    pub webhook_rate_limit_per_minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            ledger: LedgerConfig::default(),
            generator: GeneratorConfig::default(),
            payment: PaymentConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_grant: 10,
            bonus_grant: 5,
            bonus_period_hours: 24,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://openrouter.ai/api/v1/chat/completions".into(),
            model: "openai/gpt-5-nano".into(),
            system_prompt: "You are a viral scriptwriter. Write a short, engaging script in English.".into(),
            timeout_secs: 60,
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            merchant_id: None,
            signing_key: None,
            invoice_url: "https://api.pay.example.com/v1/invoice".into(),
            currency: "USDT".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            generate_rate_limit_per_minute: 30,
            webhook_rate_limit_per_minute: 120,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults
    /// so a fresh checkout can run without ceremony.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Path of the ledger database inside `data_dir`.
    pub fn ledger_db_path(&self) -> PathBuf {
        self.data_dir.join("ledger.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.ledger.initial_grant, 10);
        assert_eq!(cfg.ledger.bonus_grant, 5);
        assert_eq!(cfg.ledger.bonus_period_hours, 24);
        assert_eq!(cfg.gateway.port, 8000);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/scriptforge.toml")).unwrap();
        assert_eq!(cfg.ledger.initial_grant, 10);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[ledger]\ninitial_grant = 3\n\n[gateway]\nport = 9000\n",
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.ledger.initial_grant, 3);
        assert_eq!(cfg.ledger.bonus_grant, 5);
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.gateway.host, "127.0.0.1");
    }

    #[test]
    fn invalid_toml_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "ledger = not-a-table").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn ledger_db_path_joins_data_dir() {
        let cfg = Config {
            data_dir: PathBuf::from("/tmp/sf"),
            ..Config::default()
        };
        assert_eq!(cfg.ledger_db_path(), PathBuf::from("/tmp/sf/ledger.db"));
    }
}

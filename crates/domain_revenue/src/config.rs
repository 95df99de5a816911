//! Engine configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use domain_billing::BillingRules;

/// Payment matching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Claims within this percentage of a payment are suggested as matches
    pub match_tolerance_percent: Decimal,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            match_tolerance_percent: dec!(5),
        }
    }
}

/// Configuration shared by all engine components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rules: BillingRules,
    pub reconciliation: ReconciliationConfig,
    /// Upper bound for one operation, transaction included
    pub operation_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: BillingRules::default(),
            reconciliation: ReconciliationConfig::default(),
            operation_timeout_ms: 30_000,
        }
    }
}

impl EngineConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn with_rules(mut self, rules: BillingRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.rules.default_filing_limit_days, 365);
        assert_eq!(config.reconciliation.match_tolerance_percent, dec!(5));
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"operation_timeout_ms": 500, "rules": {"default_filing_limit_days": 90}}"#,
        )
        .unwrap();
        assert_eq!(config.operation_timeout_ms, 500);
        assert_eq!(config.rules.default_filing_limit_days, 90);
        assert_eq!(config.rules.filing_warning_window_days, 30);
        assert_eq!(config.reconciliation, ReconciliationConfig::default());
    }
}

//! Billing readiness rules
//!
//! Pure checks deciding whether a service may go onto a claim. The engine
//! loads the service, its type, its authorization and the duplicate count
//! inside a transaction and hands them here; nothing in this module touches
//! storage.
//!
//! Checks run in a fixed order:
//!
//! 1. Documentation completeness
//! 2. Authorization conformance
//! 3. Numeric sanity
//! 4. Timely filing
//! 5. Duplicate detection
//!
//! Only structural problems (an eligibility or reference mismatch that makes
//! the remaining checks meaningless) stop evaluation early.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use core_kernel::{temporal::days_between, PayerId, Timezone};
use crate::authorization::{Authorization, UtilizationThresholds};
use crate::service::{documentation_gaps, BillingStatus, DocumentationStatus, Service, ServiceType};
use crate::validation::ValidationResult;

/// Tunable billing rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingRules {
    /// Filing limit applied when a payer has no override
    pub default_filing_limit_days: i64,
    /// Per-payer filing limits
    pub payer_filing_limits: HashMap<PayerId, i64>,
    /// Days before the limit at which a warning is raised
    pub filing_warning_window_days: i64,
    /// Remaining units after deduction below which a warning is raised
    pub low_units_threshold: Decimal,
    pub utilization: UtilizationThresholds,
    /// Timezone used to resolve "today"
    pub timezone: Timezone,
}

impl Default for BillingRules {
    fn default() -> Self {
        Self {
            default_filing_limit_days: 365,
            payer_filing_limits: HashMap::new(),
            filing_warning_window_days: 30,
            low_units_threshold: dec!(10),
            utilization: UtilizationThresholds::default(),
            timezone: Timezone::default(),
        }
    }
}

impl BillingRules {
    pub fn filing_limit_for(&self, payer: Option<PayerId>) -> i64 {
        payer
            .and_then(|p| self.payer_filing_limits.get(&p).copied())
            .unwrap_or(self.default_filing_limit_days)
    }

    pub fn with_payer_limit(mut self, payer: PayerId, days: i64) -> Self {
        self.payer_filing_limits.insert(payer, days);
        self
    }
}

/// Everything the readiness check needs about one service
#[derive(Debug, Clone, Copy)]
pub struct ReadinessInput<'a> {
    pub service: &'a Service,
    pub service_type: &'a ServiceType,
    /// The referenced authorization; `None` with a reference set means it is missing
    pub authorization: Option<&'a Authorization>,
    /// Other live services with the same client, date and service type
    pub duplicate_count: usize,
    /// Calendar date in the billing timezone
    pub today: NaiveDate,
    /// Moment of validation, for signature timestamps
    pub now: DateTime<Utc>,
}

/// Runs every readiness check against one service
pub fn check_readiness(rules: &BillingRules, input: ReadinessInput<'_>) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let service = input.service;

    if !matches!(
        service.billing_status,
        BillingStatus::Unbilled | BillingStatus::ReadyForBilling | BillingStatus::Denied
    ) {
        result.add_error(format!(
            "service {} is {} and cannot be validated for billing",
            service.id, service.billing_status
        ));
        return result;
    }
    if service.service_type_id != input.service_type.id {
        result.add_error(format!(
            "service type {} does not match service {}",
            input.service_type.id, service.id
        ));
        return result;
    }
    if service.authorization_id.is_some() && input.authorization.is_none() {
        result.add_error("referenced authorization was not found");
        return result;
    }

    check_documentation(input, &mut result);
    if let Some(authorization) = input.authorization {
        check_authorization(rules, service, authorization, &mut result);
    }
    check_numbers(service, input.today, &mut result);
    check_timely_filing(rules, service, input.today, &mut result);

    if input.duplicate_count > 0 {
        result.add_warning(format!(
            "{} other service(s) share client, date {} and service type",
            input.duplicate_count, service.service_date
        ));
    }

    result
}

fn check_documentation(input: ReadinessInput<'_>, result: &mut ValidationResult) {
    if input.service.documentation_status != DocumentationStatus::Complete {
        result.add_error("documentation status is INCOMPLETE");
    }
    let gaps = documentation_gaps(input.service_type.category, &input.service.documents, input.now);
    for gap in gaps {
        result.add_error(gap.to_string());
    }
}

fn check_authorization(
    rules: &BillingRules,
    service: &Service,
    authorization: &Authorization,
    result: &mut ValidationResult,
) {
    if !authorization.covers(service.service_date) {
        result.add_error(format!(
            "service date {} is outside authorization window {}",
            service.service_date, authorization.validity
        ));
    }
    if authorization.service_type_id != service.service_type_id {
        result.add_error("service type does not match the authorization");
    }
    if authorization.client_id != service.client_id {
        result.add_error("client does not match the authorization");
    }
    if !authorization.is_active() {
        result.add_error(format!("authorization is {}", authorization.status));
    }

    // Units this service already holds count as available to it.
    let available = authorization.remaining_units() + service.reserved_units;
    if available < service.units {
        result.add_error(format!(
            "insufficient authorization units: needs {}, has {} remaining",
            service.units, available
        ));
    } else {
        let after = available - service.units;
        if after < rules.low_units_threshold {
            result.add_warning(format!("only {} authorized units will remain", after));
        }
    }
}

fn check_numbers(service: &Service, today: NaiveDate, result: &mut ValidationResult) {
    if !service.rate.is_positive() {
        result.add_error(format!("rate must be positive, got {}", service.rate));
    }
    if service.units <= Decimal::ZERO {
        result.add_error(format!("units must be positive, got {}", service.units));
    }
    if service.service_date > today {
        result.add_error(format!("service date {} is in the future", service.service_date));
    }
    if !service.amount_is_consistent() {
        result.add_error("amount does not equal units times rate");
    }
}

fn check_timely_filing(
    rules: &BillingRules,
    service: &Service,
    today: NaiveDate,
    result: &mut ValidationResult,
) {
    let limit = rules.filing_limit_for(service.payer_id);
    let elapsed = days_between(service.service_date, today);
    if elapsed > limit {
        result.add_error(format!(
            "timely filing limit of {} days exceeded ({} days since service)",
            limit, elapsed
        ));
    } else if elapsed >= limit - rules.filing_warning_window_days {
        result.add_warning(format!(
            "{} days left before the {}-day filing limit",
            limit - elapsed,
            limit
        ));
    }
}

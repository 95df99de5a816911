//! Authorizations - payer-granted unit allowances
//!
//! Unit arithmetic lives here as pure methods; the engine's ledger applies
//! them to a row it has locked inside the caller's transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AuthorizationId, ClientId, DateRange, ProgramId, ServiceTypeId};
use crate::error::BillingError;

/// Lifecycle status of an authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationStatus {
    Active,
    Suspended,
    Expired,
    Cancelled,
}

impl AuthorizationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorizationStatus::Active => "ACTIVE",
            AuthorizationStatus::Suspended => "SUSPENDED",
            AuthorizationStatus::Expired => "EXPIRED",
            AuthorizationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(AuthorizationStatus::Active),
            "SUSPENDED" => Some(AuthorizationStatus::Suspended),
            "EXPIRED" => Some(AuthorizationStatus::Expired),
            "CANCELLED" => Some(AuthorizationStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Utilization percentages at which the ledger raises signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilizationThresholds {
    pub warning_percent: Decimal,
    pub critical_percent: Decimal,
}

impl Default for UtilizationThresholds {
    fn default() -> Self {
        Self {
            warning_percent: dec!(80),
            critical_percent: dec!(90),
        }
    }
}

/// Utilization band of an authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationLevel {
    Normal,
    Warning,
    Critical,
}

/// Snapshot of an authorization's units after a ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitBalance {
    pub authorization_id: AuthorizationId,
    pub authorized_units: Decimal,
    pub used_units: Decimal,
    pub remaining_units: Decimal,
}

/// A unit-of-service grant for a client over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub id: AuthorizationId,
    pub client_id: ClientId,
    pub program_id: ProgramId,
    pub service_type_id: ServiceTypeId,
    pub authorized_units: Decimal,
    pub used_units: Decimal,
    /// Inclusive validity window
    pub validity: DateRange,
    pub status: AuthorizationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Authorization {
    /// Creates an ACTIVE authorization with no units used
    pub fn new(
        client_id: ClientId,
        program_id: ProgramId,
        service_type_id: ServiceTypeId,
        authorized_units: Decimal,
        validity: DateRange,
    ) -> Result<Self, BillingError> {
        if authorized_units < Decimal::ZERO {
            return Err(BillingError::InvalidUnits(authorized_units));
        }
        let now = Utc::now();
        Ok(Self {
            id: AuthorizationId::new_v7(),
            client_id,
            program_id,
            service_type_id,
            authorized_units,
            used_units: Decimal::ZERO,
            validity,
            status: AuthorizationStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn remaining_units(&self) -> Decimal {
        self.authorized_units - self.used_units
    }

    pub fn is_active(&self) -> bool {
        self.status == AuthorizationStatus::Active
    }

    /// Returns true if `day` falls inside the validity window
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.validity.contains(day)
    }

    /// Percentage of authorized units consumed
    pub fn utilization_percent(&self) -> Decimal {
        if self.authorized_units.is_zero() {
            return dec!(100);
        }
        (self.used_units / self.authorized_units).saturating_mul(dec!(100)).round_dp(2)
    }

    pub fn utilization_level(&self, thresholds: &UtilizationThresholds) -> UtilizationLevel {
        let pct = self.utilization_percent();
        if pct >= thresholds.critical_percent {
            UtilizationLevel::Critical
        } else if pct >= thresholds.warning_percent {
            UtilizationLevel::Warning
        } else {
            UtilizationLevel::Normal
        }
    }

    pub fn balance(&self) -> UnitBalance {
        UnitBalance {
            authorization_id: self.id,
            authorized_units: self.authorized_units,
            used_units: self.used_units,
            remaining_units: self.remaining_units(),
        }
    }

    /// Consumes `units`, refusing if the grant would be exceeded
    ///
    /// State is untouched on error.
    pub fn reserve(&mut self, units: Decimal) -> Result<UnitBalance, BillingError> {
        if units <= Decimal::ZERO {
            return Err(BillingError::InvalidUnits(units));
        }
        if !self.is_active() {
            return Err(BillingError::AuthorizationInactive { status: self.status });
        }
        let used = match self.used_units.checked_add(units) {
            Some(used) if used <= self.authorized_units => used,
            _ => {
                return Err(BillingError::InsufficientUnits {
                    requested: units,
                    remaining: self.remaining_units(),
                })
            }
        };
        self.used_units = used;
        self.updated_at = Utc::now();
        Ok(self.balance())
    }

    /// Returns `units`, clamping used units at zero
    pub fn release(&mut self, units: Decimal) -> Result<UnitBalance, BillingError> {
        if units <= Decimal::ZERO {
            return Err(BillingError::InvalidUnits(units));
        }
        self.used_units = (self.used_units - units).max(Decimal::ZERO);
        self.updated_at = Utc::now();
        Ok(self.balance())
    }

    /// Checks `0 <= used <= authorized`; stores call this before persisting
    pub fn check_bounds(&self) -> Result<(), BillingError> {
        if self.used_units < Decimal::ZERO || self.used_units > self.authorized_units {
            return Err(BillingError::UnitBoundsViolated {
                used: self.used_units,
                authorized: self.authorized_units,
            });
        }
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u32),
        Release(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..20).prop_map(Op::Reserve),
            (1u32..20).prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn used_units_stay_in_bounds(
            authorized in 0u32..100,
            ops in proptest::collection::vec(op(), 0..50),
        ) {
            let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let mut a = Authorization::new(
                ClientId::new(),
                ProgramId::new(),
                ServiceTypeId::new(),
                Decimal::from(authorized),
                DateRange::single(start),
            )
            .unwrap();

            for op in ops {
                let before = a.used_units;
                match op {
                    Op::Reserve(u) => {
                        if a.reserve(Decimal::from(u)).is_err() {
                            prop_assert_eq!(a.used_units, before);
                        }
                    }
                    Op::Release(u) => {
                        a.release(Decimal::from(u)).unwrap();
                    }
                }
                prop_assert!(a.check_bounds().is_ok());
            }
        }
    }
}

//! Test Data Builders
//!
//! Builder patterns for constructing domain entities with sensible defaults.
//! Tests set only the fields they care about. Defaults produce entities that
//! pass every billing readiness check.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{AuthorizationId, ClientId, DateRange, Money, PayerId, ProgramId, ServiceId};
use domain_billing::{
    Authorization, AuthorizationStatus, BillingStatus, Service, ServiceDocument, ServiceType,
};
use domain_claims::{Claim, ClaimStatus};
use domain_payment::{Payment, PaymentMethod};

use crate::fixtures::{DateFixtures, DocumentFixtures, IdFixtures, ServiceTypeFixtures};

/// Builder for services
pub struct ServiceBuilder {
    service_type: ServiceType,
    client_id: ClientId,
    payer_id: Option<PayerId>,
    service_date: NaiveDate,
    units: Decimal,
    rate: Money,
    authorization_id: Option<AuthorizationId>,
    documents: Option<Vec<ServiceDocument>>,
    billing_status: BillingStatus,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            service_type: ServiceTypeFixtures::general(),
            client_id: IdFixtures::client_id(),
            payer_id: None,
            service_date: DateFixtures::recent_service_date(),
            units: dec!(2),
            rate: Money::usd(dec!(50)),
            authorization_id: None,
            documents: None,
            billing_status: BillingStatus::Unbilled,
        }
    }

    pub fn with_service_type(mut self, service_type: &ServiceType) -> Self {
        self.service_type = service_type.clone();
        self
    }

    pub fn with_client(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_payer(mut self, payer_id: PayerId) -> Self {
        self.payer_id = Some(payer_id);
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.service_date = date;
        self
    }

    pub fn with_units(mut self, units: Decimal) -> Self {
        self.units = units;
        self
    }

    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.rate = Money::usd(rate);
        self
    }

    /// References an authorization; the service holds all its units
    pub fn with_authorization(mut self, authorization_id: AuthorizationId) -> Self {
        self.authorization_id = Some(authorization_id);
        self
    }

    /// Replaces the default signed document set
    pub fn with_documents(mut self, documents: Vec<ServiceDocument>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Sets the status directly, bypassing the status graph
    pub fn with_status(mut self, status: BillingStatus) -> Self {
        self.billing_status = status;
        self
    }

    pub fn build(self) -> Service {
        let mut service = Service::new(
            self.client_id,
            &self.service_type,
            self.service_date,
            self.units,
            self.rate,
        )
        .expect("units * rate within range");
        service.payer_id = self.payer_id;
        if let Some(authorization_id) = self.authorization_id {
            service.authorization_id = Some(authorization_id);
            service.reserved_units = self.units;
        }
        service.documents = self
            .documents
            .unwrap_or_else(|| DocumentFixtures::complete_set(self.service_type.category));
        service.refresh_documentation(self.service_type.category, chrono::Utc::now());
        service.billing_status = self.billing_status;
        service
    }
}

/// Builder for authorizations
pub struct AuthorizationBuilder {
    client_id: ClientId,
    program_id: ProgramId,
    service_type: ServiceType,
    authorized_units: Decimal,
    used_units: Decimal,
    validity: DateRange,
    status: AuthorizationStatus,
}

impl Default for AuthorizationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationBuilder {
    pub fn new() -> Self {
        Self {
            client_id: IdFixtures::client_id(),
            program_id: IdFixtures::program_id(),
            service_type: ServiceTypeFixtures::general(),
            authorized_units: dec!(100),
            used_units: Decimal::ZERO,
            validity: DateFixtures::authorization_window(),
            status: AuthorizationStatus::Active,
        }
    }

    pub fn for_client(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn for_service_type(mut self, service_type: &ServiceType) -> Self {
        self.service_type = service_type.clone();
        self
    }

    pub fn with_units(mut self, authorized: Decimal) -> Self {
        self.authorized_units = authorized;
        self
    }

    pub fn with_used(mut self, used: Decimal) -> Self {
        self.used_units = used;
        self
    }

    pub fn with_validity(mut self, validity: DateRange) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_status(mut self, status: AuthorizationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn build(self) -> Authorization {
        let mut authorization = Authorization::new(
            self.client_id,
            self.program_id,
            self.service_type.id,
            self.authorized_units,
            self.validity,
        )
        .expect("non-negative authorized units");
        authorization.used_units = self.used_units;
        authorization.status = self.status;
        authorization
    }
}

/// Builder for claims, for seeding stores directly
pub struct ClaimBuilder {
    client_id: ClientId,
    payer_id: PayerId,
    total: Money,
    service_ids: Vec<ServiceId>,
    status: ClaimStatus,
    claim_number: Option<String>,
    submission_date: Option<NaiveDate>,
}

impl Default for ClaimBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimBuilder {
    pub fn new() -> Self {
        Self {
            client_id: IdFixtures::client_id(),
            payer_id: IdFixtures::payer_id(),
            total: Money::usd(dec!(200)),
            service_ids: vec![ServiceId::new()],
            status: ClaimStatus::Draft,
            claim_number: None,
            submission_date: None,
        }
    }

    pub fn for_payer(mut self, payer_id: PayerId) -> Self {
        self.payer_id = payer_id;
        self
    }

    pub fn for_client(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_total(mut self, total: Decimal) -> Self {
        self.total = Money::usd(total);
        self
    }

    pub fn with_services(mut self, service_ids: Vec<ServiceId>) -> Self {
        self.service_ids = service_ids;
        self
    }

    pub fn with_number(mut self, claim_number: impl Into<String>) -> Self {
        self.claim_number = Some(claim_number.into());
        self
    }

    /// Puts the claim in `status` directly; submitted statuses get a submission date
    pub fn with_status(mut self, status: ClaimStatus) -> Self {
        self.status = status;
        if status.is_submitted() && self.submission_date.is_none() {
            self.submission_date = Some(DateFixtures::days_ago(5));
        }
        self
    }

    pub fn submitted_on(mut self, date: NaiveDate) -> Self {
        self.submission_date = Some(date);
        self
    }

    pub fn build(self) -> Claim {
        let period = DateRange::single(DateFixtures::recent_service_date());
        let mut claim = Claim::new_original(
            self.client_id,
            self.payer_id,
            self.total,
            period,
            self.service_ids,
        )
        .expect("at least one service");
        claim.status = self.status;
        claim.submission_date = self.submission_date;
        if let Some(number) = self.claim_number {
            claim.claim_number = number;
        }
        claim
    }
}

/// Builder for payments
pub struct PaymentBuilder {
    payer_id: PayerId,
    amount: Money,
    method: PaymentMethod,
    payment_date: NaiveDate,
    reference: Option<String>,
}

impl Default for PaymentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentBuilder {
    pub fn new() -> Self {
        Self {
            payer_id: IdFixtures::payer_id(),
            amount: Money::usd(dec!(200)),
            method: PaymentMethod::Eft,
            payment_date: DateFixtures::days_ago(1),
            reference: None,
        }
    }

    pub fn for_payer(mut self, payer_id: PayerId) -> Self {
        self.payer_id = payer_id;
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Money::usd(amount);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn build(self) -> Payment {
        let payment = Payment::new(self.payer_id, self.amount, self.method, self.payment_date)
            .expect("positive payment amount");
        match self.reference {
            Some(reference) => payment.with_reference(reference),
            None => payment,
        }
    }
}

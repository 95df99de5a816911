//! Pre-built Test Fixtures
//!
//! Ready-to-use dates, identifiers, documents and reference data. Dates are
//! relative to today so readiness checks (future dates, filing limits,
//! authorization windows) behave the same whenever the suite runs.

use chrono::{Duration, NaiveDate, Utc};
use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::Name;
use fake::Fake;
use once_cell::sync::Lazy;

use core_kernel::{ClientId, DateRange, PayerId, ProgramId};
use domain_billing::{DocumentType, ServiceCategory, ServiceDocument, ServiceType};

/// Pinned once per test binary so a run crossing midnight stays consistent
static TODAY: Lazy<NaiveDate> = Lazy::new(|| Utc::now().date_naive());

/// Fixture for dates relative to today
pub struct DateFixtures;

impl DateFixtures {
    pub fn today() -> NaiveDate {
        *TODAY
    }

    /// A date comfortably in the past and inside every filing limit
    pub fn recent_service_date() -> NaiveDate {
        Self::today() - Duration::days(10)
    }

    pub fn days_ago(days: i64) -> NaiveDate {
        Self::today() - Duration::days(days)
    }

    pub fn days_ahead(days: i64) -> NaiveDate {
        Self::today() + Duration::days(days)
    }

    /// Authorization window covering 90 days either side of today
    pub fn authorization_window() -> DateRange {
        DateRange::new(Self::days_ago(90), Self::days_ahead(90)).expect("valid window")
    }
}

/// Fixture for identifiers and parties
pub struct IdFixtures;

impl IdFixtures {
    pub fn client_id() -> ClientId {
        ClientId::new()
    }

    pub fn payer_id() -> PayerId {
        PayerId::new()
    }

    pub fn program_id() -> ProgramId {
        ProgramId::new()
    }

    /// A random person name for directory entries
    pub fn person_name() -> String {
        Name().fake()
    }
}

/// Fixture for clinical documents
pub struct DocumentFixtures;

impl DocumentFixtures {
    /// A signed, well-formed document of the given type
    pub fn signed(document_type: DocumentType) -> ServiceDocument {
        let content: String = Sentence(6..12).fake();
        ServiceDocument::signed(
            document_type,
            content,
            IdFixtures::person_name(),
            Utc::now() - Duration::hours(2),
        )
    }

    /// Every document `category` requires, all signed
    pub fn complete_set(category: ServiceCategory) -> Vec<ServiceDocument> {
        category
            .required_documents()
            .iter()
            .map(|t| Self::signed(*t))
            .collect()
    }

    /// A document whose signature is missing
    pub fn unsigned(document_type: DocumentType) -> ServiceDocument {
        let mut document = Self::signed(document_type);
        document.signed_by = None;
        document.signed_at = None;
        document
    }
}

/// Fixture for service types
pub struct ServiceTypeFixtures;

impl ServiceTypeFixtures {
    /// Requires a progress note only
    pub fn general() -> ServiceType {
        ServiceType::new("H2014", "Skills training", ServiceCategory::General)
    }

    /// Requires a progress note and an assessment
    pub fn therapy() -> ServiceType {
        ServiceType::new("90837", "Psychotherapy, 60 minutes", ServiceCategory::Therapy)
    }
}
